// failsched: Connectivity-Preserving Link-Failure Schedules for Network Simulation Experiments
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Module containing the scenarios for which schedules are generated.

use std::path::PathBuf;

use clap::Subcommand;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cdf::{Cdf, CdfError},
    failures::{traffic_pairs, FailureSelector, SelectionError},
    schedule::{
        random_pair, Schedule, ScheduleBuilder, ScheduleError, WorkloadGenerator, WorkloadKind,
    },
    topology::{Edge, Topology, TopologyError},
};

/// Time at which links fail in query scenarios.
pub const DEFAULT_QUERY_FAIL_TIME: f64 = 50.0;
/// Bytes transferred by every flow of a throughput scenario.
pub const DEFAULT_FLOW_LENGTH: u64 = 1 << 30;

/// Number of links that fail together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCount {
    /// Sampled from [`Cdf::link_group`].
    Sampled,
    Fixed(usize),
}

/// Scenario for which a schedule is generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scenario {
    /// Queries throughout the trial, some links fail at `fail_time` and are repaired after a
    /// sampled delay.
    Query {
        fanout: usize,
        fail_time: f64,
        failures: FailureCount,
        interarrival: Cdf,
        repair: Cdf,
    },
    /// `nlinks` links fail one by one at sampled times, each failure together with `nflows` bulk
    /// flows of sampled size.
    Wan {
        nlinks: usize,
        nflows: usize,
        size: Cdf,
        fail_time: Cdf,
    },
    /// `nflows` long flows start at `flow_start`, and `nlinks` links fail at `fail_time`.
    Throughput {
        nlinks: usize,
        nflows: usize,
        fail_time: f64,
        flow_start: f64,
        flow_length: u64,
    },
}

impl Scenario {
    pub fn query(interarrival: Cdf, repair: Cdf, fanout: usize) -> Self {
        Self::Query {
            fanout,
            fail_time: DEFAULT_QUERY_FAIL_TIME,
            failures: FailureCount::Sampled,
            interarrival,
            repair,
        }
    }

    pub fn wan(size: Cdf, fail_time: Cdf, nlinks: usize, nflows: usize) -> Self {
        Self::Wan {
            nlinks,
            nflows,
            size,
            fail_time,
        }
    }

    pub fn throughput(nlinks: usize, nflows: usize) -> Self {
        Self::Throughput {
            nlinks,
            nflows,
            fail_time: 1.5,
            flow_start: 1.0,
            flow_length: DEFAULT_FLOW_LENGTH,
        }
    }

    /// Return a human-readable name for this scenario.
    pub fn name(&self) -> String {
        match self {
            Self::Query {
                fanout, failures, ..
            } => match failures {
                FailureCount::Sampled => format!("Query_Fanout{fanout}"),
                FailureCount::Fixed(k) => format!("Query_Fanout{fanout}_Fail{k}"),
            },
            Self::Wan { nlinks, nflows, .. } => format!("Wan_Links{nlinks}_Flows{nflows}"),
            Self::Throughput { nlinks, nflows, .. } => {
                format!("Throughput_Links{nlinks}_Flows{nflows}")
            }
        }
    }

    pub fn workload_kind(&self) -> WorkloadKind {
        match self {
            Self::Query { .. } => WorkloadKind::Query,
            Self::Wan { .. } | Self::Throughput { .. } => WorkloadKind::Flow,
        }
    }

    /// Generate the schedule of one trial, using a fresh rng seeded with `seed`.
    pub fn run_trial(
        &self,
        topo: &Topology,
        trial: usize,
        seed: u64,
    ) -> Result<GeneratedSchedule, ScenarioError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut phase = TrialState::new(trial);
        match self.build(topo, &mut rng, &mut phase) {
            Ok(mut generated) => {
                phase.advance(TrialPhase::Emit);
                generated.trial = trial;
                generated.seed = seed;
                Ok(generated)
            }
            Err(e) => {
                phase.advance(TrialPhase::Abort);
                log::debug!("trial {trial} of {} aborted: {e}", self.name());
                Err(e)
            }
        }
    }

    /// Generate a schedule for the given topology.
    pub fn build<R: Rng + ?Sized>(
        &self,
        topo: &Topology,
        rng: &mut R,
        phase: &mut TrialState,
    ) -> Result<GeneratedSchedule, ScenarioError> {
        let hosts = topo.hosts();
        let pairs = traffic_pairs(topo);
        let selector = FailureSelector::new(topo, &pairs);
        let mut builder = ScheduleBuilder::new();

        let (failed, repair_time) = match self {
            Self::Query {
                fanout,
                fail_time,
                failures,
                interarrival,
                repair,
            } => {
                let workload = WorkloadGenerator::new(&hosts, interarrival, *fanout)?;

                phase.advance(TrialPhase::SelectFailures);
                let k = match failures {
                    FailureCount::Sampled => Cdf::link_group().sample(rng) as usize,
                    FailureCount::Fixed(k) => *k,
                };
                let failed = selector.select(k, rng)?;
                builder.failure(*fail_time, &failed);
                let repair_time = fail_time + repair.sample(rng);

                phase.advance(TrialPhase::GenerateWorkload);
                workload.generate(0.0, repair_time + fail_time, rng, &mut builder);
                (failed, Some(repair_time))
            }
            Self::Wan {
                nlinks,
                nflows,
                size,
                fail_time,
            } => {
                check_flow_hosts(&hosts, *nflows)?;
                if size.points().iter().any(|(v, _)| *v < 0.0) {
                    return Err(ScheduleError::Degenerate(
                        "flow sizes must not be negative".to_string(),
                    )
                    .into());
                }

                phase.advance(TrialPhase::SelectFailures);
                let failed = selector.select(*nlinks, rng)?;

                phase.advance(TrialPhase::GenerateWorkload);
                for edge in failed.iter() {
                    let time = fail_time.sample(rng);
                    builder.failure(time, &[*edge]);
                    for _ in 0..*nflows {
                        let (client, server) = pick_flow(&hosts, rng)?;
                        builder.flow(time, client, server, size.sample(rng) as u64);
                    }
                }
                (failed, None)
            }
            Self::Throughput {
                nlinks,
                nflows,
                fail_time,
                flow_start,
                flow_length,
            } => {
                check_flow_hosts(&hosts, *nflows)?;

                phase.advance(TrialPhase::SelectFailures);
                let failed = selector.select(*nlinks, rng)?;
                builder.failure(*fail_time, &failed);

                phase.advance(TrialPhase::GenerateWorkload);
                for _ in 0..*nflows {
                    let (client, server) = pick_flow(&hosts, rng)?;
                    builder.flow(*flow_start, client, server, *flow_length);
                }
                (failed, None)
            }
        };

        phase.advance(TrialPhase::MergeAndSort);
        Ok(GeneratedSchedule {
            trial: phase.trial,
            seed: 0,
            failed,
            repair_time,
            schedule: builder.build(),
        })
    }
}

/// Command line description of a scenario, shared by the schedule generators.
#[derive(Subcommand, Debug, Clone)]
pub enum ScenarioArgs {
    /// Queries with a group of links failing and being repaired
    Query {
        topology: PathBuf,
        /// CDF of query inter-arrival times
        interarrival_cdf: PathBuf,
        /// Number of servers per query
        fanout: usize,
        /// CDF of link repair times
        repair_cdf: PathBuf,
        /// Fail this many links instead of sampling the group size
        #[arg(long)]
        failures: Option<usize>,
        #[arg(long, default_value_t = DEFAULT_QUERY_FAIL_TIME)]
        fail_time: f64,
    },
    /// Single link failures at sampled times, each with bulk flows
    Wan {
        topology: PathBuf,
        /// CDF of flow sizes in bytes
        size_cdf: PathBuf,
        /// CDF of link failure times
        fail_time_cdf: PathBuf,
        nlinks: usize,
        nflows: usize,
    },
    /// Long flows with one group of links failing
    Throughput {
        topology: PathBuf,
        nlinks: usize,
        nflows: usize,
    },
}

impl ScenarioArgs {
    pub fn topology(&self) -> &PathBuf {
        match self {
            Self::Query { topology, .. }
            | Self::Wan { topology, .. }
            | Self::Throughput { topology, .. } => topology,
        }
    }

    /// Load all distributions and build the scenario.
    pub fn to_scenario(&self) -> Result<Scenario, ScenarioError> {
        Ok(match self {
            Self::Query {
                interarrival_cdf,
                fanout,
                repair_cdf,
                failures,
                fail_time,
                ..
            } => Scenario::Query {
                fanout: *fanout,
                fail_time: *fail_time,
                failures: failures.map_or(FailureCount::Sampled, FailureCount::Fixed),
                interarrival: Cdf::from_file(interarrival_cdf)?,
                repair: Cdf::from_file(repair_cdf)?,
            },
            Self::Wan {
                size_cdf,
                fail_time_cdf,
                nlinks,
                nflows,
                ..
            } => Scenario::wan(
                Cdf::from_file(size_cdf)?,
                Cdf::from_file(fail_time_cdf)?,
                *nlinks,
                *nflows,
            ),
            Self::Throughput { nlinks, nflows, .. } => Scenario::throughput(*nlinks, *nflows),
        })
    }
}

fn check_flow_hosts(hosts: &[crate::NodeId], nflows: usize) -> Result<(), ScenarioError> {
    if nflows > 0 && hosts.len() < 2 {
        return Err(ScenarioError::Configuration(format!(
            "flows need at least two hosts, but the topology has {}",
            hosts.len()
        )));
    }
    Ok(())
}

fn pick_flow<R: Rng + ?Sized>(
    hosts: &[crate::NodeId],
    rng: &mut R,
) -> Result<(crate::NodeId, crate::NodeId), ScenarioError> {
    random_pair(hosts, rng)
        .ok_or_else(|| ScenarioError::Configuration("not enough hosts for a flow".to_string()))
}

/// Phases of generating the schedule of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum TrialPhase {
    Init,
    SelectFailures,
    GenerateWorkload,
    MergeAndSort,
    Emit,
    Abort,
}

/// Tracks (and logs) the phase of a trial.
#[derive(Debug, Clone)]
pub struct TrialState {
    trial: usize,
    phase: TrialPhase,
}

impl TrialState {
    pub fn new(trial: usize) -> Self {
        log::trace!("trial {trial}: {}", TrialPhase::Init);
        Self {
            trial,
            phase: TrialPhase::Init,
        }
    }

    pub fn phase(&self) -> TrialPhase {
        self.phase
    }

    pub fn advance(&mut self, next: TrialPhase) {
        log::trace!("trial {}: {} -> {next}", self.trial, self.phase);
        self.phase = next;
    }
}

/// Schedule of one trial, together with what was chosen for it.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedSchedule {
    pub trial: usize,
    pub seed: u64,
    pub failed: Vec<Edge>,
    pub repair_time: Option<f64>,
    #[serde(skip)]
    pub schedule: Schedule,
}

/// Seed of a trial, derived from the seed of the whole batch.
pub fn trial_seed(base_seed: u64, trial: usize) -> u64 {
    base_seed.wrapping_add(trial as u64)
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Topology Error: {0}")]
    Topology(#[from] TopologyError),
    #[error("CDF Error: {0}")]
    Cdf(#[from] CdfError),
    #[error("Selection Error: {0}")]
    Selection(#[from] SelectionError),
    #[error("Schedule Error: {0}")]
    Schedule(#[from] ScheduleError),
    #[error("Invalid scenario: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod test {
    use itertools::Itertools;

    use super::*;
    use crate::schedule::ScheduleEvent;

    /// Ring of four switches with a chord and one host per switch.
    fn topo() -> Topology {
        Topology::parse("1 2\n2 3\n3 4\n4 1\n1 3\n1 5 h\n2 6 h\n3 7 h\n4 8 h\n").unwrap()
    }

    #[test]
    fn query_trial() {
        let scenario = Scenario::Query {
            fanout: 2,
            fail_time: DEFAULT_QUERY_FAIL_TIME,
            failures: FailureCount::Fixed(2),
            interarrival: Cdf::new(vec![(0.1, 0.5), (5.0, 1.0)]).unwrap(),
            repair: Cdf::constant(10.0),
        };
        let generated = scenario.run_trial(&topo(), 3, 42).unwrap();
        assert_eq!(generated.trial, 3);
        assert_eq!(generated.repair_time, Some(60.0));
        assert!(topo().is_connected(&generated.failed));
        let events = generated.schedule.events();
        assert!(events
            .iter()
            .tuple_windows()
            .all(|(a, b)| a.time() <= b.time()));
        assert!(events.last().unwrap().time() >= 110.0);
        assert_eq!(generated.failed.len(), 2);
        assert_eq!(
            generated.schedule.failures().collect_vec(),
            vec![(50.0, generated.failed.as_slice())]
        );
    }

    #[test]
    fn trials_are_reproducible() {
        let scenario = Scenario::Query {
            fanout: 1,
            fail_time: 5.0,
            failures: FailureCount::Fixed(1),
            interarrival: Cdf::constant(1.0),
            repair: Cdf::constant(1.0),
        };
        let a = scenario.run_trial(&topo(), 0, 7).unwrap();
        let b = scenario.run_trial(&topo(), 0, 7).unwrap();
        assert_eq!(a.failed, b.failed);
        assert_eq!(a.schedule, b.schedule);
    }

    #[test]
    fn wan_trial() {
        let scenario = Scenario::wan(
            Cdf::constant(1000.0),
            Cdf::new(vec![(1.0, 0.5), (2.0, 1.0)]).unwrap(),
            2,
            3,
        );
        let generated = scenario.run_trial(&topo(), 0, 1).unwrap();
        assert_eq!(generated.failed.len(), 2);
        let events = generated.schedule.events();
        assert_eq!(events.len(), 2 * 4);
        for e in events {
            match e {
                ScheduleEvent::Failure { edges, .. } => assert_eq!(edges.len(), 1),
                ScheduleEvent::Flow {
                    client,
                    server,
                    length,
                    ..
                } => {
                    assert_ne!(client, server);
                    assert_eq!(*length, 1000);
                }
                ScheduleEvent::Query { .. } => panic!("unexpected query"),
            }
        }
    }

    #[test]
    fn throughput_trial() {
        let generated = Scenario::throughput(1, 2)
            .run_trial(&topo(), 0, 5)
            .unwrap();
        assert_eq!(
            generated.schedule.to_string().lines().count(),
            3,
            "{}",
            generated.schedule
        );
        let first = &generated.schedule.events()[0];
        assert!(matches!(
            first,
            ScheduleEvent::Flow {
                time,
                length: DEFAULT_FLOW_LENGTH,
                ..
            } if *time == 1.0
        ));
        assert!(matches!(
            generated.schedule.events()[2],
            ScheduleEvent::Failure { time, .. } if time == 1.5
        ));
    }

    #[test]
    fn unsatisfiable_trial_aborts() {
        // the ring with chord has only two links to spare
        let err = Scenario::throughput(3, 1).run_trial(&topo(), 0, 5);
        assert!(matches!(
            err,
            Err(ScenarioError::Selection(SelectionError::Unsatisfiable { .. }))
        ));
    }

    #[test]
    fn flows_need_hosts() {
        let no_hosts = Topology::parse("1 2\n2 3\n3 1\n").unwrap();
        assert!(matches!(
            Scenario::throughput(1, 1).run_trial(&no_hosts, 0, 0),
            Err(ScenarioError::Configuration(_))
        ));
        assert!(matches!(
            Scenario::query(Cdf::constant(1.0), Cdf::constant(1.0), 1).run_trial(&no_hosts, 0, 0),
            Err(ScenarioError::Schedule(ScheduleError::Configuration(_)))
        ));
    }

    #[test]
    fn trial_phases() {
        let mut state = TrialState::new(0);
        assert_eq!(state.phase(), TrialPhase::Init);
        state.advance(TrialPhase::SelectFailures);
        assert_eq!(state.phase(), TrialPhase::SelectFailures);
        assert_eq!(TrialPhase::MergeAndSort.to_string(), "MergeAndSort");
    }

    #[test]
    fn scenario_args() {
        let args = ScenarioArgs::Throughput {
            topology: PathBuf::from("topo.txt"),
            nlinks: 2,
            nflows: 4,
        };
        assert_eq!(args.topology(), &PathBuf::from("topo.txt"));
        assert_eq!(args.to_scenario().unwrap(), Scenario::throughput(2, 4));
        let missing = ScenarioArgs::Wan {
            topology: PathBuf::from("topo.txt"),
            size_cdf: PathBuf::from("/nonexistent/size.cdf"),
            fail_time_cdf: PathBuf::from("/nonexistent/fail.cdf"),
            nlinks: 1,
            nflows: 1,
        };
        assert!(matches!(
            missing.to_scenario(),
            Err(ScenarioError::Cdf(CdfError::Io(_)))
        ));
    }

    #[test]
    fn names() {
        assert_eq!(Scenario::throughput(2, 4).name(), "Throughput_Links2_Flows4");
        assert_eq!(trial_seed(10, 5), 15);
        assert_eq!(trial_seed(u64::MAX, 1), 0);
    }
}

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
//! Module that executes the simulator multiple times and collects its output in a result log.

use std::{
    fs::{File, OpenOptions},
    io::{BufReader, BufWriter, Write},
    path::PathBuf,
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use indicatif::ProgressBar;
use itertools::Itertools;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::scenarios::trial_seed;
use crate::{
    failures::{
        sample_test_pairs, ConstraintFilter, FailurePolicy, FailureSelector, IncrementalFailures,
        SelectionError, FILTER_ATTEMPTS,
    },
    records::{
        delay_annotation, failed_annotation, trial_annotation, CompletedRuns, RecordError,
    },
    topology::{Edge, Topology, TopologyError},
    util::PathBufExt,
    NodeId,
};

/// Simulator program that is run by default.
pub const DEFAULT_PROGRAM: &str = "examples/apanda/traffic-sim-latency";

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Topology Error: {0}")]
    Topology(#[from] TopologyError),
    #[error("Selection Error: {0}")]
    Selection(#[from] SelectionError),
    #[error("Record Error: {0}")]
    Record(#[from] RecordError),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid sweep configuration: {0}")]
    Configuration(String),
}

/// Delays `start, start + step, ...` strictly below `end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelaySweep {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl DelaySweep {
    pub fn new(start: f64, end: f64, step: f64) -> Result<Self, RunnerError> {
        if step.is_nan() || step <= 0.0 || !start.is_finite() || !end.is_finite() {
            return Err(RunnerError::Configuration(format!(
                "cannot sweep delays from {start} to {end} in steps of {step}"
            )));
        }
        Ok(Self { start, end, step })
    }

    pub fn values(&self) -> Vec<f64> {
        std::iter::successors(Some(self.start), |d| Some(d + self.step))
            .take_while(|d| *d < self.end)
            .collect()
    }
}

/// One run of the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub program: String,
    pub topology: PathBuf,
    pub links: Vec<Edge>,
    pub paths: Vec<(NodeId, NodeId)>,
    pub delay: f64,
    pub packets: usize,
    pub latency: Option<f64>,
}

impl Invocation {
    /// Command passed to `waf --run`. The links are omitted for runs without failures.
    pub fn command_line(&self) -> String {
        let mut cmd = self.program.clone();
        if !self.links.is_empty() {
            cmd.push_str(&format!(" --links=\"{}\"", self.links.iter().join(",")));
        }
        cmd.push_str(&format!(
            " --paths=\"{}\" --delay=\"{}\" --topology={} --packets={}",
            self.paths.iter().map(|(s, d)| format!("{s}={d}")).join(","),
            self.delay,
            self.topology.display(),
            self.packets,
        ));
        if let Some(latency) = self.latency {
            cmd.push_str(&format!(" --latency={latency}"));
        }
        cmd
    }
}

/// Result of a single simulator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum RunStatus {
    Success,
    Failed,
    TimedOut,
}

/// External simulator driven by the sweep.
#[async_trait]
pub trait Simulator: Send + Sync {
    /// Run the simulator and append everything it prints to `sink`.
    async fn run(
        &self,
        invocation: &Invocation,
        sink: &mut (dyn Write + Send),
    ) -> Result<RunStatus, RunnerError>;
}

/// Runs ns-3 programs with `./waf --run` inside the ns-3 directory.
#[derive(Debug, Clone)]
pub struct WafSimulator {
    pub ns3_dir: PathBuf,
    pub timeout: Option<Duration>,
}

#[async_trait]
impl Simulator for WafSimulator {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: &mut (dyn Write + Send),
    ) -> Result<RunStatus, RunnerError> {
        let cmd = invocation.command_line();
        log::debug!("./waf --run {cmd}");
        let mut command = tokio::process::Command::new("./waf");
        command
            .arg("--run")
            .arg(&cmd)
            .current_dir(&self.ns3_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let output = command.output();

        let output = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, output).await {
                Ok(output) => output?,
                Err(_) => {
                    log::warn!("Simulator timed out after {timeout:?}: {cmd}");
                    return Ok(RunStatus::TimedOut);
                }
            },
            None => output.await?,
        };

        sink.write_all(&output.stdout)?;
        sink.flush()?;

        if output.status.success() {
            Ok(RunStatus::Success)
        } else {
            log::warn!("Simulator exited with {}: {cmd}", output.status);
            Ok(RunStatus::Failed)
        }
    }
}

/// Parameters of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub topology: PathBuf,
    /// Number of source-destination pairs tested per trial
    pub test_pairs: usize,
    /// Smallest number of failed links
    pub min_failures: usize,
    /// Number of failed links at which to stop (exclusive)
    pub max_failures: usize,
    pub trials: usize,
    pub delays: DelaySweep,
    pub packets: usize,
    pub latency: Option<f64>,
    pub program: String,
    pub seed: u64,
    pub policy: FailurePolicy,
    /// Only use failed links whose removal affects the shortest paths of at least this fraction
    /// of all switch pairs
    #[serde(default)]
    pub min_constrained: Option<f64>,
    pub output: PathBuf,
    pub resume: bool,
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.min_failures > self.max_failures {
            return Err(RunnerError::Configuration(format!(
                "min_failures ({}) is larger than max_failures ({})",
                self.min_failures, self.max_failures
            )));
        }
        if self.test_pairs == 0 {
            return Err(RunnerError::Configuration(
                "at least one test pair is needed".to_string(),
            ));
        }
        if let Some(fraction) = self.min_constrained {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(RunnerError::Configuration(format!(
                    "min_constrained ({fraction}) is not a fraction in [0, 1]"
                )));
            }
        }
        Ok(())
    }

    /// Whether every trial starts with a run without failures.
    pub fn runs_baseline(&self) -> bool {
        self.min_failures == 0 && self.max_failures > 0
    }

    /// Failure counts run after the baseline. Zero failures are covered by the baseline.
    pub fn failure_counts(&self) -> impl Iterator<Item = usize> {
        self.min_failures.max(1)..self.max_failures
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output.clone().with_appended(".summary.csv")
    }

    pub fn config_path(&self) -> PathBuf {
        self.output.clone().with_appended(".config.json")
    }
}

/// Outcome of one failure count of one trial, as written to the summary CSV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRecord {
    pub trial: usize,
    pub failures: usize,
    pub links: String,
    pub runs: usize,
    pub skipped: usize,
    pub status: String,
}

/// Totals of a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub runs: usize,
    pub skipped: usize,
    pub failed_runs: usize,
    pub unsatisfiable: usize,
    pub unconstrained: usize,
}

/// Drives the simulator across trials, failure counts and delays.
pub struct SweepRunner<S> {
    config: SweepConfig,
    topo: Topology,
    simulator: S,
    completed: CompletedRuns,
    bar: ProgressBar,
}

impl<S: Simulator> SweepRunner<S> {
    pub fn new(config: SweepConfig, topo: Topology, simulator: S) -> Result<Self, RunnerError> {
        config.validate()?;
        if config.resume {
            check_previous_config(&config)?;
        }
        let completed = if config.resume && config.output.exists() {
            let completed = CompletedRuns::from_file(&config.output)?;
            log::info!("Resuming sweep, skipping {} completed runs", completed.len());
            completed
        } else {
            CompletedRuns::default()
        };
        Ok(Self {
            config,
            topo,
            simulator,
            completed,
            bar: ProgressBar::hidden(),
        })
    }

    /// Report progress on `bar`.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.bar = bar;
        self
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Total number of simulator runs, assuming every selection succeeds.
    pub fn num_runs(&self) -> usize {
        let rounds =
            usize::from(self.config.runs_baseline()) + self.config.failure_counts().count();
        self.config.trials * rounds * self.config.delays.values().len()
    }

    pub async fn run(&mut self) -> Result<SweepSummary, RunnerError> {
        let config = &self.config;
        serde_json::to_writer_pretty(File::create(config.config_path())?, config)?;

        let file = if config.resume {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.output)?
        } else {
            File::create(&config.output)?
        };
        let mut out = BufWriter::new(file);

        let summary_path = config.summary_path();
        let mut summary_csv = if config.resume && summary_path.exists() {
            let file = OpenOptions::new().append(true).open(&summary_path)?;
            csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file)
        } else {
            csv::Writer::from_path(&summary_path)?
        };

        let nodes = self.topo.nodes();
        let filter = config.min_constrained.map(|fraction| {
            let filter = ConstraintFilter::new(&self.topo, fraction);
            log::info!(
                "Failed links must constrain at least {} switch pairs",
                filter.min_pairs()
            );
            filter
        });
        let delays = config.delays.values();
        let mut summary = SweepSummary::default();
        self.bar.set_length(self.num_runs() as u64);

        for trial in 0..config.trials {
            let mut rng = StdRng::seed_from_u64(trial_seed(config.seed, trial));
            let pairs = sample_test_pairs(&nodes, config.test_pairs, &mut rng)?;

            // selection is deterministic per trial, so it is repeated even for completed runs
            let mut failures = IncrementalFailures::new(
                FailureSelector::new(&self.topo, &pairs),
                config.policy,
            );
            let mut rounds = Vec::new();
            if config.runs_baseline() {
                rounds.push((0, Ok(Vec::new())));
            }
            for k in config.failure_counts() {
                let selection = match &filter {
                    Some(filter) => {
                        failures.next_round_where(k, &mut rng, FILTER_ATTEMPTS, |links| {
                            filter.accepts(links)
                        })
                    }
                    None => failures.next_round(k, &mut rng),
                };
                match selection {
                    Ok(links) => rounds.push((k, Ok(links.to_vec()))),
                    Err(e) => {
                        log::warn!("Trial {trial}: {e}. Continuing with the next trial");
                        rounds.push((k, Err(e)));
                        break;
                    }
                }
            }

            let mut trial_started = false;
            for (k, links) in rounds {
                let links = match links {
                    Ok(links) => links,
                    Err(e) => {
                        let status = match e {
                            SelectionError::Rejected { .. } => {
                                summary.unconstrained += 1;
                                format!("unconstrained: {e}")
                            }
                            _ => {
                                summary.unsatisfiable += 1;
                                format!("unsatisfiable: {e}")
                            }
                        };
                        summary_csv.serialize(SummaryRecord {
                            trial,
                            failures: k,
                            links: String::new(),
                            runs: 0,
                            skipped: 0,
                            status,
                        })?;
                        summary_csv.flush()?;
                        continue;
                    }
                };

                let pending = delays
                    .iter()
                    .copied()
                    .filter(|d| !self.completed.contains(trial, k, *d))
                    .collect_vec();
                let skipped = delays.len() - pending.len();
                summary.skipped += skipped;
                self.bar.inc(skipped as u64);

                if !pending.is_empty() && !trial_started {
                    writeln!(out, "{}", trial_annotation(trial))?;
                    trial_started = true;
                }
                if !pending.is_empty() && k > 0 {
                    log::info!("Trial {trial}: failing {k} links {links:?}");
                    writeln!(out, "{}", failed_annotation(&links))?;
                }
                out.flush()?;

                let mut statuses = Vec::new();
                for delay in pending.iter().copied() {
                    writeln!(out, "{}", delay_annotation(delay))?;
                    out.flush()?;
                    let invocation = Invocation {
                        program: config.program.clone(),
                        topology: config.topology.clone(),
                        links: links.clone(),
                        paths: pairs.clone(),
                        delay,
                        packets: config.packets,
                        latency: config.latency,
                    };
                    let status = self.simulator.run(&invocation, &mut out).await?;
                    out.flush()?;
                    if status != RunStatus::Success {
                        summary.failed_runs += 1;
                    }
                    summary.runs += 1;
                    statuses.push(status);
                    self.bar.inc(1);
                }

                summary_csv.serialize(SummaryRecord {
                    trial,
                    failures: k,
                    links: links.iter().join(","),
                    runs: pending.len(),
                    skipped,
                    status: statuses
                        .iter()
                        .find(|s| **s != RunStatus::Success)
                        .unwrap_or(&RunStatus::Success)
                        .to_string(),
                })?;
                summary_csv.flush()?;
            }
        }

        self.bar.finish();
        log::info!(
            "Sweep done: {} runs ({} failed), {} skipped, {} unsatisfiable and {} unconstrained selections",
            summary.runs,
            summary.failed_runs,
            summary.skipped,
            summary.unsatisfiable,
            summary.unconstrained
        );
        Ok(summary)
    }
}

/// Refuse to resume a sweep whose stored configuration differs from `config`.
fn check_previous_config(config: &SweepConfig) -> Result<(), RunnerError> {
    let path = config.config_path();
    if !path.exists() {
        return Ok(());
    }
    let mut previous: SweepConfig = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
    previous.resume = config.resume;
    if previous != *config {
        return Err(RunnerError::Configuration(format!(
            "cannot resume, {path:?} was written by a different sweep configuration"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::{fs, path::Path, sync::Mutex};

    use super::*;
    use crate::records::{parse_log, LogLine};

    /// Records all invocations and prints the delay.
    #[derive(Default)]
    struct MockSimulator {
        invocations: Mutex<Vec<Invocation>>,
    }

    #[async_trait]
    impl Simulator for MockSimulator {
        async fn run(
            &self,
            invocation: &Invocation,
            sink: &mut (dyn Write + Send),
        ) -> Result<RunStatus, RunnerError> {
            writeln!(sink, "simulated {}", invocation.delay)?;
            self.invocations.lock().unwrap().push(invocation.clone());
            Ok(RunStatus::Success)
        }
    }

    fn tmp_output(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().then(format!("failsched-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.then(name)
    }

    fn config(output: PathBuf, min_failures: usize, max_failures: usize) -> SweepConfig {
        SweepConfig {
            topology: PathBuf::from("topo.txt"),
            test_pairs: 2,
            min_failures,
            max_failures,
            trials: 2,
            delays: DelaySweep::new(0.0, 1.0, 0.5).unwrap(),
            packets: 10,
            latency: None,
            program: DEFAULT_PROGRAM.to_string(),
            seed: 3,
            policy: FailurePolicy::Persist,
            min_constrained: None,
            output,
            resume: false,
        }
    }

    /// Ring of six nodes with two chords.
    fn topo() -> Topology {
        Topology::parse("1 2\n2 3\n3 4\n4 5\n5 6\n6 1\n1 4\n2 5\n").unwrap()
    }

    #[test]
    fn delay_sweep() {
        assert_eq!(DelaySweep::new(0.0, 1.0, 0.25).unwrap().values(), vec![0.0, 0.25, 0.5, 0.75]);
        assert!(DelaySweep::new(1.0, 1.0, 0.5).unwrap().values().is_empty());
        assert!(DelaySweep::new(0.0, 1.0, 0.0).is_err());
        assert!(DelaySweep::new(0.0, 1.0, -1.0).is_err());
        assert!(DelaySweep::new(0.0, f64::NAN, 1.0).is_err());
    }

    #[test]
    fn command_line() {
        let mut inv = Invocation {
            program: "examples/apanda/tcp-burst".to_string(),
            topology: PathBuf::from("topo.txt"),
            links: vec![],
            paths: vec![(1, 5), (2, 6)],
            delay: 0.5,
            packets: 100,
            latency: None,
        };
        assert_eq!(
            inv.command_line(),
            "examples/apanda/tcp-burst --paths=\"1=5,2=6\" --delay=\"0.5\" --topology=topo.txt --packets=100"
        );
        inv.links = vec![Edge::new(2, 1), Edge::new(3, 4)];
        inv.latency = Some(2.0);
        assert_eq!(
            inv.command_line(),
            "examples/apanda/tcp-burst --links=\"1=2,3=4\" --paths=\"1=5,2=6\" --delay=\"0.5\" --topology=topo.txt --packets=100 --latency=2"
        );
    }

    #[test]
    fn config_validation() {
        let out = PathBuf::from("out.log");
        assert!(config(out.clone(), 3, 2).validate().is_err());
        let mut c = config(out.clone(), 0, 3);
        assert!(c.validate().is_ok());
        assert!(c.runs_baseline());
        assert_eq!(c.failure_counts().collect_vec(), vec![1, 2]);
        assert!(!config(out.clone(), 1, 3).runs_baseline());
        assert!(!config(out.clone(), 0, 0).runs_baseline());
        c.min_constrained = Some(1.5);
        assert!(c.validate().is_err());
        c.min_constrained = Some(0.025);
        assert!(c.validate().is_ok());
        c.test_pairs = 0;
        assert!(c.validate().is_err());
        assert_eq!(c.summary_path(), PathBuf::from("out.log.summary.csv"));
    }

    #[tokio::test]
    async fn sweep_writes_annotations() {
        let output = tmp_output("sweep.log");
        let mut runner =
            SweepRunner::new(config(output.clone(), 0, 3), topo(), MockSimulator::default())
                .unwrap();
        assert_eq!(runner.num_runs(), 2 * 3 * 2);
        let summary = runner.run().await.unwrap();
        assert_eq!(summary.runs, 12);
        assert_eq!(summary.unsatisfiable, 0);

        let invocations = runner.simulator.invocations.lock().unwrap().clone();
        assert_eq!(invocations.len(), 12);
        for inv in invocations.iter() {
            assert!(topo().is_connected(&inv.links));
            assert_eq!(inv.paths.len(), 2);
        }
        // failures persist between rounds
        assert_eq!(invocations[2].links.len(), 1);
        assert_eq!(invocations[4].links.len(), 2);
        assert_eq!(invocations[4].links[0], invocations[2].links[0]);

        let content = fs::read_to_string(&output).unwrap();
        let lines = parse_log(&content);
        assert_eq!(lines[0], LogLine::Trial(0));
        assert_eq!(lines[1], LogLine::Delay(0.0));
        assert_eq!(lines[2], LogLine::Output("simulated 0".to_string()));
        assert_eq!(
            lines
                .iter()
                .filter(|l| matches!(l, LogLine::Failed(_)))
                .count(),
            4
        );
        let summary_csv = fs::read_to_string(runner.config().summary_path()).unwrap();
        assert_eq!(summary_csv.lines().count(), 1 + 2 * 3);
        assert!(Path::new(&runner.config().config_path()).exists());
    }

    #[tokio::test]
    async fn sweep_resumes() {
        let output = tmp_output("resume.log");
        let mut first =
            SweepRunner::new(config(output.clone(), 0, 3), topo(), MockSimulator::default())
                .unwrap();
        first.run().await.unwrap();
        let full = fs::read_to_string(&output).unwrap();

        // cut the log in the middle of the second trial
        let cut = full.find("trial = 1").unwrap() + "trial = 1\ndelay = 0.0\nsimulated 0\n".len();
        fs::write(&output, &full[..cut]).unwrap();

        let mut c = config(output.clone(), 0, 3);
        c.resume = true;
        let mut second = SweepRunner::new(c, topo(), MockSimulator::default()).unwrap();
        let summary = second.run().await.unwrap();
        // the last run of the log is repeated
        assert_eq!(summary.skipped, 6);
        assert_eq!(summary.runs, 6);
        let invocations = second.simulator.invocations.lock().unwrap().clone();
        assert_eq!(invocations[0].delay, 0.0);
        assert!(invocations[0].links.is_empty());

        let runs = CompletedRuns::from_log(&fs::read_to_string(&output).unwrap());
        // everything but the very last run is complete
        assert_eq!(runs.len(), 11);

        // the summary of the first run is kept
        let summary_csv = fs::read_to_string(second.config().summary_path()).unwrap();
        assert_eq!(summary_csv.lines().count(), 1 + 2 * 2 * 3);
        assert_eq!(summary_csv.lines().filter(|l| l.starts_with("trial,")).count(), 1);
    }

    #[tokio::test]
    async fn resume_requires_the_same_config() {
        let output = tmp_output("changed.log");
        let mut first =
            SweepRunner::new(config(output.clone(), 0, 2), topo(), MockSimulator::default())
                .unwrap();
        first.run().await.unwrap();

        let mut c = config(output.clone(), 0, 2);
        c.resume = true;
        c.seed = 4;
        assert!(matches!(
            SweepRunner::new(c, topo(), MockSimulator::default()),
            Err(RunnerError::Configuration(_))
        ));
        let stored: SweepConfig =
            serde_json::from_str(&fs::read_to_string(first.config().config_path()).unwrap())
                .unwrap();
        assert_eq!(stored.seed, 3);

        let mut c = config(output.clone(), 0, 2);
        c.resume = true;
        assert!(SweepRunner::new(c, topo(), MockSimulator::default()).is_ok());
    }

    #[tokio::test]
    async fn sweep_without_baseline() {
        let output = tmp_output("no-baseline.log");
        let mut runner =
            SweepRunner::new(config(output.clone(), 1, 3), topo(), MockSimulator::default())
                .unwrap();
        assert_eq!(runner.num_runs(), 2 * 2 * 2);
        let summary = runner.run().await.unwrap();
        assert_eq!(summary.runs, 8);

        let invocations = runner.simulator.invocations.lock().unwrap().clone();
        assert!(invocations.iter().all(|inv| !inv.links.is_empty()));
        assert_eq!(invocations[0].links.len(), 1);
        assert_eq!(invocations[2].links.len(), 2);

        let lines = parse_log(&fs::read_to_string(&output).unwrap());
        assert_eq!(lines[0], LogLine::Trial(0));
        assert!(matches!(lines[1], LogLine::Failed(_)));
    }

    #[tokio::test]
    async fn constrained_sweep() {
        let output = tmp_output("constrained.log");
        // a single link never lies on the shortest paths of all switch pairs
        let mut c = config(output.clone(), 0, 3);
        c.min_constrained = Some(1.0);
        let mut runner = SweepRunner::new(c, topo(), MockSimulator::default()).unwrap();
        let summary = runner.run().await.unwrap();
        assert_eq!(summary.unconstrained, 2);
        assert_eq!(summary.unsatisfiable, 0);
        // only the baseline is run
        assert_eq!(summary.runs, 2 * 2);
        let summary_csv = fs::read_to_string(runner.config().summary_path()).unwrap();
        assert_eq!(summary_csv.matches("unconstrained").count(), 2);

        // every link constrains at least the pair of its own endpoints
        let mut c = config(output.clone(), 0, 3);
        c.min_constrained = Some(0.1);
        let mut runner = SweepRunner::new(c, topo(), MockSimulator::default()).unwrap();
        let summary = runner.run().await.unwrap();
        assert_eq!(summary.runs, 12);
        let filter = ConstraintFilter::new(&runner.topo, 0.1);
        assert_eq!(filter.min_pairs(), 1);
        let invocations = runner.simulator.invocations.lock().unwrap().clone();
        assert!(invocations
            .iter()
            .filter(|inv| !inv.links.is_empty())
            .all(|inv| filter.accepts(&inv.links)));
    }

    #[tokio::test]
    async fn unsatisfiable_trials_are_skipped() {
        let output = tmp_output("unsat.log");
        // the cycle can lose one link, but never two
        let cycle = Topology::parse("1 2\n2 3\n3 4\n4 1\n").unwrap();
        let mut runner =
            SweepRunner::new(config(output.clone(), 0, 4), cycle, MockSimulator::default())
                .unwrap();
        let summary = runner.run().await.unwrap();
        assert_eq!(summary.unsatisfiable, 2);
        // baseline and one failure for both trials
        assert_eq!(summary.runs, 2 * 2 * 2);
    }
}

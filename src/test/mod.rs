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
//! Test cases that combine topologies, failure selection and schedules.
//!
//! ```shell
//! cargo test --release -- --nocapture
//! ```

use itertools::Itertools;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    cdf::Cdf,
    experiments::Scenario,
    failures::{max_removable, FailureSelector, SelectionError},
    schedule::{Schedule, ScheduleBuilder, ScheduleEvent, WorkloadGenerator, WorkloadKind},
    topology::Topology,
    NodeId,
};

/// Random connected graph: a random spanning tree plus `extra` random links.
fn random_topology(n: NodeId, extra: usize, rng: &mut StdRng) -> Topology {
    let mut edges = (2..=n).map(|v| (rng.gen_range(1..v), v)).collect_vec();
    for _ in 0..extra {
        let a = rng.gen_range(1..=n);
        let b = rng.gen_range(1..=n);
        if a != b {
            edges.push((a, b));
        }
    }
    Topology::from_edges(edges).unwrap()
}

#[test]
fn selection_keeps_random_graphs_connected() {
    for seed in 0..30 {
        let mut rng = StdRng::seed_from_u64(seed);
        let topo = random_topology(rng.gen_range(4..12), rng.gen_range(0..10), &mut rng);
        let pairs = topo.nodes().into_iter().tuple_combinations().collect_vec();
        let selector = FailureSelector::new(&topo, &pairs);
        let limit = max_removable(&topo);
        for k in 0..=limit {
            let failed = selector.select(k, &mut rng).unwrap();
            assert_eq!(failed.len(), k, "seed {seed}");
            assert_eq!(failed.iter().unique().count(), k, "seed {seed}");
            assert!(failed.iter().all(|e| topo.contains_edge(*e)));
            assert!(topo.is_connected(&failed), "seed {seed}: {failed:?}");
        }
        assert!(matches!(
            selector.select(limit + 1, &mut rng),
            Err(SelectionError::Unsatisfiable { .. })
        ));
    }
}

#[test]
fn query_workload_end_to_end() {
    let topo = Topology::parse("1 2\n2 3\n3 4\n4 1\n").unwrap();
    let hosts = topo.nodes();
    let cdf = Cdf::new(vec![(0.1, 0.5), (5.0, 1.0)]).unwrap();
    let generator = WorkloadGenerator::new(&hosts, &cdf, 1).unwrap();

    for seed in 0..10 {
        let mut rng = StdRng::seed_from_u64(seed);
        let pairs = topo.nodes().into_iter().tuple_combinations().collect_vec();
        let failed = FailureSelector::new(&topo, &pairs)
            .select(1, &mut rng)
            .unwrap();
        let mut builder = ScheduleBuilder::new();
        builder.failure(50.0, &failed);
        generator.generate(0.0, 100.0, &mut rng, &mut builder);

        let queries = builder
            .events()
            .iter()
            .filter_map(|e| match e {
                ScheduleEvent::Query {
                    time,
                    client,
                    servers,
                } => Some((*time, *client, servers.clone())),
                _ => None,
            })
            .collect_vec();
        assert!(!queries.is_empty());
        assert!(queries.iter().tuple_windows().all(|(a, b)| a.0 <= b.0));
        for (_, client, servers) in queries.iter() {
            assert_eq!(servers.len(), 1);
            assert_ne!(*client, servers[0]);
        }

        let schedule = builder.build();
        assert!(schedule
            .events()
            .iter()
            .tuple_windows()
            .all(|(a, b)| a.time() <= b.time()));
        assert_eq!(schedule.failures().count(), 1);
    }
}

#[test]
fn generated_schedules_parse_back() {
    let topo = Topology::parse("1 2\n2 3\n3 4\n4 1\n1 3\n1 5 h\n2 6 h\n3 7 h\n4 8 h\n").unwrap();
    let scenarios = [
        Scenario::query(Cdf::constant(0.5), Cdf::constant(2.0), 2),
        Scenario::wan(
            Cdf::parse("1000,0.5\n209715200,1.0\n").unwrap(),
            Cdf::parse("1.0,0.5\n3.0,1.0\n").unwrap(),
            2,
            2,
        ),
        Scenario::throughput(2, 3),
    ];
    for scenario in scenarios.iter() {
        for trial in 0..5 {
            let generated = match scenario.run_trial(&topo, trial, trial as u64) {
                Ok(g) => g,
                // link groups of more than two links cannot be removed from this topology
                Err(_) if scenario.workload_kind() == WorkloadKind::Query => continue,
                Err(e) => panic!("{}: {e}", scenario.name()),
            };
            let text = generated.schedule.to_string();
            let parsed = Schedule::parse(&text, scenario.workload_kind()).unwrap();
            let lines =
                |s: &Schedule| s.events().iter().map(|e| e.to_string()).sorted().collect_vec();
            assert_eq!(lines(&generated.schedule), lines(&parsed));
        }
    }
}

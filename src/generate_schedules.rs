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
use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use itertools::Itertools;
use rayon::prelude::*;
use serde::Serialize;

use failsched::{
    experiments::{trial_seed, GeneratedSchedule, Scenario, ScenarioArgs, ScenarioError},
    failures::SelectionError,
    topology::Topology,
    util::{self, PathBufExt},
};

/// Generate the schedules of many trials in parallel, together with an index and a manifest of
/// the failed links.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    scenario: ScenarioArgs,
    /// Number of trials
    #[arg(long, global = true, default_value_t = 10)]
    trials: usize,
    /// Directory for the schedules, the index and the manifest
    #[arg(long, global = true, default_value = "schedules")]
    out_dir: PathBuf,
    /// Seed of the first trial; trial `i` uses `seed + i`
    #[arg(long, global = true, default_value_t = 0)]
    seed: u64,
    /// Number of worker threads (defaults to the number of cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

#[derive(Debug, Serialize)]
struct IndexRecord {
    trial: usize,
    seed: u64,
    file: String,
    status: String,
    failed: String,
    repair_time: Option<f64>,
    events: usize,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    created: String,
    topology: &'a PathBuf,
    scenario: &'a Scenario,
    seed: u64,
    trials: Vec<&'a GeneratedSchedule>,
}

fn main() -> Result<()> {
    let multi = util::init_logging_with_progress()?;

    let args: Args = util::parse_args();
    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads.unwrap_or_else(num_cpus::get))
        .build_global()?;

    let scenario = args
        .scenario
        .to_scenario()
        .context("Cannot load the scenario distributions")?;
    let topology = args.scenario.topology();
    let topo = Topology::from_file(topology)
        .with_context(|| format!("Cannot load the topology {topology:?}"))?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Cannot create {:?}", args.out_dir))?;

    log::info!(
        "Generating {} schedules for {} on {topology:?}",
        args.trials,
        scenario.name()
    );

    let pb = multi.add(
        ProgressBar::new(args.trials as u64).with_style(
            ProgressStyle::with_template(
                "[{bar:80}] trial: {pos:>7}/{len:7}, elapsed: {elapsed}, eta: {eta}",
            )?
            .progress_chars("##-"),
        ),
    );

    let results = (0..args.trials)
        .into_par_iter()
        .progress_with(pb)
        .map(|trial| generate_trial(&scenario, &topo, &args, trial))
        .collect::<Result<Vec<_>>>()?;

    let mut index = csv::Writer::from_path(args.out_dir.as_path().then("index.csv"))?;
    for (trial, result) in results.iter().enumerate() {
        let file = schedule_file(trial);
        let record = match result {
            Some(g) => IndexRecord {
                trial,
                seed: g.seed,
                file,
                status: "ok".to_string(),
                failed: g.failed.iter().join(" "),
                repair_time: g.repair_time,
                events: g.schedule.len(),
            },
            None => IndexRecord {
                trial,
                seed: trial_seed(args.seed, trial),
                file: String::new(),
                status: "unsatisfiable".to_string(),
                failed: String::new(),
                repair_time: None,
                events: 0,
            },
        };
        index.serialize(record)?;
    }
    index.flush()?;

    let manifest = Manifest {
        created: util::get_timestamp(),
        topology,
        scenario: &scenario,
        seed: args.seed,
        trials: results.iter().flatten().collect(),
    };
    let manifest_path = args.out_dir.as_path().then("manifest.json");
    serde_json::to_writer_pretty(fs::File::create(&manifest_path)?, &manifest)?;

    let generated = manifest.trials.len();
    if generated < args.trials {
        log::warn!(
            "Only {generated} of {} trials could keep the network connected",
            args.trials
        );
    }
    log::info!("Wrote {generated} schedules to {:?}", args.out_dir);

    Ok(())
}

fn schedule_file(trial: usize) -> String {
    format!("schedule_{trial:04}.txt")
}

/// Generate and write the schedule of one trial. Returns `None` if the failures cannot be
/// selected without disconnecting the network.
fn generate_trial(
    scenario: &Scenario,
    topo: &Topology,
    args: &Args,
    trial: usize,
) -> Result<Option<GeneratedSchedule>> {
    let seed = trial_seed(args.seed, trial);
    match scenario.run_trial(topo, trial, seed) {
        Ok(generated) => {
            let path = args.out_dir.as_path().then(schedule_file(trial));
            let file =
                fs::File::create(&path).with_context(|| format!("Cannot create {path:?}"))?;
            generated.schedule.write_to(file)?;
            Ok(Some(generated))
        }
        Err(ScenarioError::Selection(e @ SelectionError::Unsatisfiable { .. })) => {
            log::warn!("Skipping trial {trial} (seed {seed}): {e}");
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("Cannot generate trial {trial}")),
    }
}

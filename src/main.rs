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
use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use failsched::{
    experiments::{DelaySweep, SweepConfig, SweepRunner, WafSimulator, DEFAULT_PROGRAM},
    failures::FailurePolicy,
    topology::Topology,
    util,
};

/// Run a simulator program for a growing number of failed links and a sweep of delays, writing
/// all simulator output into one result log.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Topology file
    topology: PathBuf,
    /// Number of source-destination pairs tested in every trial
    test_pairs: usize,
    /// Smallest number of failed links
    min_failures: usize,
    /// Number of failed links at which to stop (exclusive)
    max_failures: usize,
    /// Number of trials
    trials: usize,
    delay_start: f64,
    /// End of the delay sweep (exclusive)
    delay_end: f64,
    delay_step: f64,
    /// Result log
    output: PathBuf,
    /// Packets sent per source-destination pair
    #[arg(long, default_value_t = 100)]
    packets: usize,
    /// Link latency passed to the simulator
    #[arg(long)]
    latency: Option<f64>,
    /// Simulator program, relative to the ns-3 directory
    #[arg(long, default_value = DEFAULT_PROGRAM)]
    program: String,
    /// ns-3 directory containing `waf`
    #[arg(long, default_value = ".")]
    ns3_dir: PathBuf,
    /// Timeout of a single simulator run in seconds
    #[arg(long)]
    timeout: Option<f64>,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Whether failed links persist when the number of failures grows
    #[arg(long, value_enum, default_value_t = FailurePolicy::Persist)]
    policy: FailurePolicy,
    /// Only fail links that lie on the shortest paths of at least this fraction of all switch
    /// pairs, e.g., 0.025
    #[arg(long)]
    min_constrained: Option<f64>,
    /// Skip the runs already present in the result log, and append to it
    #[arg(long)]
    resume: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let multi = util::init_logging_with_progress()?;
    let args: Args = util::parse_args();

    let topo = Topology::from_file(&args.topology)
        .with_context(|| format!("Cannot load the topology {:?}", args.topology))?;
    let timeout = args
        .timeout
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("Invalid timeout")?;

    let config = SweepConfig {
        topology: args.topology,
        test_pairs: args.test_pairs,
        min_failures: args.min_failures,
        max_failures: args.max_failures,
        trials: args.trials,
        delays: DelaySweep::new(args.delay_start, args.delay_end, args.delay_step)?,
        packets: args.packets,
        latency: args.latency,
        program: args.program,
        seed: args.seed,
        policy: args.policy,
        min_constrained: args.min_constrained,
        output: args.output,
        resume: args.resume,
    };
    log::info!("Sweep configuration: {}", serde_json::to_string(&config)?);

    let simulator = WafSimulator {
        ns3_dir: args.ns3_dir,
        timeout,
    };
    let bar = multi.add(ProgressBar::new(0).with_style(
        ProgressStyle::with_template("{wide_bar} {pos}/{len} runs, elapsed: {elapsed}, eta: {eta}")?,
    ));
    let mut runner = SweepRunner::new(config, topo, simulator)?.with_progress(bar);
    let summary = runner.run().await?;

    let stopped = summary.unsatisfiable + summary.unconstrained;
    if stopped > 0 {
        log::warn!(
            "{stopped} trials stopped early, see {:?}",
            runner.config().summary_path()
        );
    }

    Ok(())
}

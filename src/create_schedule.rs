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
use std::{fs::File, io, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use failsched::{experiments::ScenarioArgs, topology::Topology, util};

/// Generate the schedule of a single trial and print it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    scenario: ScenarioArgs,
    #[arg(long, global = true, default_value_t = 0)]
    seed: u64,
    /// Write the schedule to this file instead of stdout
    #[arg(long, global = true)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    util::init_logging();
    let args: Args = util::parse_args();

    let scenario = args
        .scenario
        .to_scenario()
        .context("Cannot load the scenario distributions")?;
    let topology = args.scenario.topology();
    let topo = Topology::from_file(topology)
        .with_context(|| format!("Cannot load the topology {topology:?}"))?;

    let generated = scenario
        .run_trial(&topo, 0, args.seed)
        .with_context(|| format!("Cannot generate a schedule for {}", scenario.name()))?;
    log::info!(
        "{}: failed {:?}, {} events",
        scenario.name(),
        generated.failed,
        generated.schedule.len()
    );

    match args.output {
        Some(path) => generated
            .schedule
            .write_to(File::create(&path).with_context(|| format!("Cannot create {path:?}"))?)?,
        None => generated.schedule.write_to(io::stdout().lock())?,
    }

    Ok(())
}

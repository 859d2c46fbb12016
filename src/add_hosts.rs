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
use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use failsched::{topology::Topology, util};

/// Print a topology with one host attached to every switch. Hosts are numbered after the
/// largest node id.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Topology file
    topology: PathBuf,
}

fn main() -> Result<()> {
    util::init_logging();
    let args: Args = util::parse_args();

    let topo = Topology::from_file(&args.topology)
        .with_context(|| format!("Cannot load the topology {:?}", args.topology))?;
    let with_hosts = topo.attach_hosts();
    log::debug!(
        "attached {} hosts to {:?}",
        with_hosts.host_attachments().len() - topo.host_attachments().len(),
        args.topology
    );

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(with_hosts.to_topology_string().as_bytes())?;
    stdout.flush()?;
    Ok(())
}

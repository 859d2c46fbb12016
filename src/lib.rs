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
//! Library for generating link-failure schedules that keep the network connected, and for
//! driving network simulations across them.

/// Identifier of a switch or host in a topology file.
pub type NodeId = u32;

pub mod cdf;
pub mod experiments;
pub mod failures;
pub mod records;
pub mod schedule;
pub mod topology;
pub mod util;

#[cfg(test)]
mod test;

pub mod prelude {
    pub use super::{
        cdf::Cdf,
        experiments::{DelaySweep, Scenario, SweepConfig, SweepRunner},
        failures::{FailurePolicy, FailureSelector, IncrementalFailures},
        schedule::{Schedule, ScheduleEvent, WorkloadKind},
        topology::{Edge, Topology},
        NodeId,
    };
}

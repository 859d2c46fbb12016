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
//! Module defining the event schedule consumed by the simulator, and the workload generator that
//! fills it with queries.
//!
//! Every event is one line, starting with the time in seconds and a tag:
//!
//! ```text
//! 50.0 f 1=2 3=4        # links 1=2 and 3=4 fail
//! 50.3 q 10 11 12       # client 10 queries servers 11 and 12
//! 1.0 q 10 11 1048576   # client 10 starts a flow of 1 MiB to server 11
//! ```
//!
//! Queries and flows share the `q` tag, hence parsing needs to know which [`WorkloadKind`] the
//! schedule contains.
use std::{
    fmt::Display,
    io::{self, Write},
    str::FromStr,
};

use itertools::Itertools;
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    cdf::{Cdf, CdfError},
    topology::Edge,
    NodeId,
};

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("CDF Error: {0}")]
    Cdf(#[from] CdfError),
    #[error("Malformed schedule line {line}: {content:?} ({reason})")]
    Parse {
        line: usize,
        content: String,
        reason: String,
    },
    #[error("Invalid workload configuration: {0}")]
    Configuration(String),
    #[error("Degenerate distribution: {0}")]
    Degenerate(String),
}

/// Tag in the second column of a schedule line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum_macros::EnumString)]
pub enum EventTag {
    #[strum(serialize = "f")]
    Failure,
    #[strum(serialize = "q")]
    Request,
}

/// Kind of workload events in a schedule, needed to tell flows from two-server queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadKind {
    Query,
    Flow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScheduleEvent {
    /// All `edges` fail at `time`.
    Failure { time: f64, edges: Vec<Edge> },
    /// `client` sends a query to each of the `servers`.
    Query {
        time: f64,
        client: NodeId,
        servers: Vec<NodeId>,
    },
    /// `client` starts a flow of `length` bytes towards `server`.
    Flow {
        time: f64,
        client: NodeId,
        server: NodeId,
        length: u64,
    },
}

impl ScheduleEvent {
    pub fn time(&self) -> f64 {
        match self {
            Self::Failure { time, .. } | Self::Query { time, .. } | Self::Flow { time, .. } => {
                *time
            }
        }
    }

    pub fn tag(&self) -> EventTag {
        match self {
            Self::Failure { .. } => EventTag::Failure,
            Self::Query { .. } | Self::Flow { .. } => EventTag::Request,
        }
    }

    /// Parse a single schedule line. `kind` decides how `q` lines are read.
    pub fn parse_line(line: &str, kind: WorkloadKind) -> Result<Self, String> {
        let parts = line.split_whitespace().collect_vec();
        let [time, tag, rest @ ..] = parts.as_slice() else {
            return Err("expected at least a time and a tag".to_string());
        };
        let time = time
            .parse::<f64>()
            .map_err(|e| format!("invalid time {time:?}: {e}"))?;
        let tag = EventTag::from_str(tag).map_err(|_| format!("unknown tag {tag:?}"))?;
        let node = |s: &&str| {
            s.parse::<NodeId>()
                .map_err(|e| format!("invalid node {s:?}: {e}"))
        };

        match (tag, kind) {
            (EventTag::Failure, _) => {
                if rest.is_empty() {
                    return Err("failure without links".to_string());
                }
                let edges = rest
                    .iter()
                    .map(|e| Edge::from_str(e))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Failure { time, edges })
            }
            (EventTag::Request, WorkloadKind::Query) => {
                let [client, servers @ ..] = rest else {
                    return Err("query without client".to_string());
                };
                if servers.is_empty() {
                    return Err("query without servers".to_string());
                }
                Ok(Self::Query {
                    time,
                    client: node(client)?,
                    servers: servers.iter().map(node).collect::<Result<_, _>>()?,
                })
            }
            (EventTag::Request, WorkloadKind::Flow) => {
                let [client, server, length] = rest else {
                    return Err("flow needs a client, a server and a length".to_string());
                };
                Ok(Self::Flow {
                    time,
                    client: node(client)?,
                    server: node(server)?,
                    length: length
                        .parse()
                        .map_err(|e| format!("invalid flow length {length:?}: {e}"))?,
                })
            }
        }
    }
}

/// Writes the event as a schedule line (without newline).
impl Display for ScheduleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} {}", self.time(), self.tag())?;
        match self {
            Self::Failure { edges, .. } => {
                for e in edges {
                    write!(f, " {e}")?;
                }
            }
            Self::Query {
                client, servers, ..
            } => {
                write!(f, " {client}")?;
                for s in servers {
                    write!(f, " {s}")?;
                }
            }
            Self::Flow {
                client,
                server,
                length,
                ..
            } => write!(f, " {client} {server} {length}")?,
        }
        Ok(())
    }
}

/// Time-ordered list of events. Events with equal times keep the order in which they were
/// generated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    events: Vec<ScheduleEvent>,
}

impl Schedule {
    pub fn events(&self) -> &[ScheduleEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = (f64, &[Edge])> {
        self.events.iter().filter_map(|e| match e {
            ScheduleEvent::Failure { time, edges } => Some((*time, edges.as_slice())),
            _ => None,
        })
    }

    /// Parse a schedule, one event per line. Blank lines are skipped.
    pub fn parse(content: &str, kind: WorkloadKind) -> Result<Self, ScheduleError> {
        let mut builder = ScheduleBuilder::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event =
                ScheduleEvent::parse_line(line, kind).map_err(|reason| ScheduleError::Parse {
                    line: idx + 1,
                    content: line.to_string(),
                    reason,
                })?;
            builder.push(event);
        }
        Ok(builder.build())
    }

    /// Write the schedule line by line, flushing after every event.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for event in self.events.iter() {
            writeln!(writer, "{event}")?;
            writer.flush()?;
        }
        Ok(())
    }
}

impl Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for event in self.events.iter() {
            writeln!(f, "{event}")?;
        }
        Ok(())
    }
}

/// Collects events in generation order and merges them into a [`Schedule`].
#[derive(Debug, Clone, Default)]
pub struct ScheduleBuilder {
    events: Vec<ScheduleEvent>,
}

impl ScheduleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events in generation order.
    pub fn events(&self) -> &[ScheduleEvent] {
        &self.events
    }

    pub fn push(&mut self, event: ScheduleEvent) -> &mut Self {
        self.events.push(event);
        self
    }

    /// Add a failure of all `edges` at `time`. An empty set of edges adds nothing.
    pub fn failure(&mut self, time: f64, edges: &[Edge]) -> &mut Self {
        if edges.is_empty() {
            log::trace!("skipping failure event at {time} without links");
            return self;
        }
        self.push(ScheduleEvent::Failure {
            time,
            edges: edges.to_vec(),
        })
    }

    pub fn flow(&mut self, time: f64, client: NodeId, server: NodeId, length: u64) -> &mut Self {
        self.push(ScheduleEvent::Flow {
            time,
            client,
            server,
            length,
        })
    }

    /// Stable sort of all events by time.
    pub fn build(mut self) -> Schedule {
        self.events.sort_by(|a, b| a.time().total_cmp(&b.time()));
        Schedule {
            events: self.events,
        }
    }
}

/// Generates queries from uniformly chosen clients to `fanout` distinct servers, with
/// inter-arrival times sampled from an empirical distribution.
#[derive(Debug, Clone)]
pub struct WorkloadGenerator<'a> {
    hosts: &'a [NodeId],
    interarrival: &'a Cdf,
    fanout: usize,
}

impl<'a> WorkloadGenerator<'a> {
    pub fn new(
        hosts: &'a [NodeId],
        interarrival: &'a Cdf,
        fanout: usize,
    ) -> Result<Self, ScheduleError> {
        if fanout == 0 {
            return Err(ScheduleError::Configuration(
                "the fanout must be at least 1".to_string(),
            ));
        }
        if fanout >= hosts.len() {
            return Err(ScheduleError::Configuration(format!(
                "a fanout of {fanout} needs more than {} hosts",
                hosts.len()
            )));
        }
        if let Some((value, _)) = interarrival.points().iter().find(|(v, _)| *v < 0.0) {
            return Err(ScheduleError::Degenerate(format!(
                "negative inter-arrival time {value}"
            )));
        }
        if !interarrival.can_yield(|v| v > 0.0) {
            return Err(ScheduleError::Degenerate(
                "inter-arrival times are never positive".to_string(),
            ));
        }
        Ok(Self {
            hosts,
            interarrival,
            fanout,
        })
    }

    /// Add queries starting from `start` until the accumulated time reaches `horizon`. The last
    /// query is the first one at or beyond the horizon. Returns the number of queries added.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        start: f64,
        horizon: f64,
        rng: &mut R,
        schedule: &mut ScheduleBuilder,
    ) -> usize {
        let mut now = start;
        let mut generated = 0;
        while now < horizon {
            now += self.interarrival.sample(rng);
            let (client, servers) = self.pick(rng);
            schedule.push(ScheduleEvent::Query {
                time: now,
                client,
                servers,
            });
            generated += 1;
        }
        log::trace!("generated {generated} queries up to {now}");
        generated
    }

    /// Choose a client and `fanout` servers, excluding the client.
    fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> (NodeId, Vec<NodeId>) {
        let client = self.hosts[rng.gen_range(0..self.hosts.len())];
        let others = self
            .hosts
            .iter()
            .copied()
            .filter(|h| *h != client)
            .collect_vec();
        let servers = others
            .choose_multiple(rng, self.fanout)
            .copied()
            .collect();
        (client, servers)
    }
}

/// Pick a random client and a different random server among `hosts`.
pub fn random_pair<R: Rng + ?Sized>(hosts: &[NodeId], rng: &mut R) -> Option<(NodeId, NodeId)> {
    let client = *hosts.choose(rng)?;
    let others = hosts.iter().filter(|h| **h != client).collect_vec();
    let server = **others.choose(rng)?;
    Some((client, server))
}

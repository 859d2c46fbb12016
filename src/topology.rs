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
//! Module to load simulator topologies and to answer connectivity and shortest-path queries.
use std::{
    fmt::{Display, Write as _},
    fs,
    path::Path,
    str::FromStr,
};

use itertools::Itertools;
use petgraph::{
    algo::astar,
    graphmap::UnGraphMap,
    visit::{Dfs, EdgeFiltered, EdgeRef},
};
use serde::{Deserialize, Serialize};

use crate::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed topology line {line}: {content:?} ({reason})")]
    Parse {
        line: usize,
        content: String,
        reason: &'static str,
    },
    #[error("Self-loop on node {0} is not a valid link")]
    SelfLoop(NodeId),
    #[error("The topology does not contain any links")]
    Empty,
}

/// Undirected link between two nodes, always stored in canonical `(min, max)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge(NodeId, NodeId);

impl Edge {
    pub fn new(a: NodeId, b: NodeId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn a(&self) -> NodeId {
        self.0
    }

    pub fn b(&self) -> NodeId {
        self.1
    }

    pub fn endpoints(&self) -> (NodeId, NodeId) {
        (self.0, self.1)
    }
}

impl From<(NodeId, NodeId)> for Edge {
    fn from((a, b): (NodeId, NodeId)) -> Self {
        Self::new(a, b)
    }
}

/// Simulator notation of a link, `a=b`.
impl Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.0, self.1)
    }
}

impl FromStr for Edge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((a, b)) = s.split_once('=') else {
            return Err(format!("expected `a=b`, got {s:?}"));
        };
        let a = a.trim().parse().map_err(|e| format!("{a:?}: {e}"))?;
        let b = b.trim().parse().map_err(|e| format!("{b:?}: {e}"))?;
        Ok(Self::new(a, b))
    }
}

/// Switch-level graph of a simulator topology, together with the hosts attached to switches.
///
/// Failures only ever apply to switch links, so host attachments are kept next to the graph
/// instead of inside it.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    graph: UnGraphMap<NodeId, ()>,
    /// `(switch, host)` attachments in file order
    hosts: Vec<(NodeId, NodeId)>,
}

impl Topology {
    /// Build a topology from a list of switch links.
    pub fn from_edges(
        edges: impl IntoIterator<Item = (NodeId, NodeId)>,
    ) -> Result<Self, TopologyError> {
        let mut graph = UnGraphMap::new();
        for (a, b) in edges {
            if a == b {
                return Err(TopologyError::SelfLoop(a));
            }
            graph.add_edge(a, b, ());
        }
        Ok(Self {
            graph,
            hosts: Vec::new(),
        })
    }

    /// Read a topology file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        log::debug!("Loading topology from {:?}", path.as_ref());
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Parse the topology file format: `a b` for a link, `s h h` to attach host `h` to switch `s`.
    pub fn parse(content: &str) -> Result<Self, TopologyError> {
        let mut graph = UnGraphMap::new();
        let mut hosts = Vec::new();

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let err = |reason| TopologyError::Parse {
                line: idx + 1,
                content: raw.to_string(),
                reason,
            };
            let parts = line.split_whitespace().collect_vec();
            let (a, b) = match parts.as_slice() {
                [a, b] | [a, b, "h"] => (
                    a.parse::<NodeId>().map_err(|_| err("invalid node id"))?,
                    b.parse::<NodeId>().map_err(|_| err("invalid node id"))?,
                ),
                [_, _, _] => return Err(err("third column must be `h`")),
                _ => return Err(err("expected two or three columns")),
            };
            if a == b {
                return Err(err("self-loop"));
            }
            if parts.len() == 3 {
                hosts.push((a, b));
            } else {
                graph.add_edge(a, b, ());
            }
        }

        if graph.edge_count() == 0 {
            return Err(TopologyError::Empty);
        }

        log::trace!(
            "parsed topology with {} switches, {} links and {} hosts",
            graph.node_count(),
            graph.edge_count(),
            hosts.len()
        );

        Ok(Self { graph, hosts })
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// All switches, sorted by id.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.graph.nodes().sorted().collect()
    }

    /// All switch links in canonical form, sorted.
    pub fn edges(&self) -> Vec<Edge> {
        self.graph
            .all_edges()
            .map(|(a, b, _)| Edge::new(a, b))
            .sorted()
            .collect()
    }

    pub fn contains_edge(&self, edge: Edge) -> bool {
        self.graph.contains_edge(edge.a(), edge.b())
    }

    /// All host ids in file order.
    pub fn hosts(&self) -> Vec<NodeId> {
        self.hosts.iter().map(|(_, h)| *h).collect()
    }

    pub fn host_attachments(&self) -> &[(NodeId, NodeId)] {
        &self.hosts
    }

    /// Switch the given host is attached to.
    pub fn host_switch(&self, host: NodeId) -> Option<NodeId> {
        self.hosts.iter().find(|(_, h)| *h == host).map(|(s, _)| *s)
    }

    /// Switches that have at least one host attached, sorted and deduplicated.
    pub fn edge_switches(&self) -> Vec<NodeId> {
        self.hosts.iter().map(|(s, _)| *s).sorted().dedup().collect()
    }

    /// Check whether all switches are still reachable from an arbitrary switch once `removed` are
    /// taken out of the graph.
    pub fn is_connected(&self, removed: &[Edge]) -> bool {
        let Some(start) = self.graph.nodes().next() else {
            return true;
        };
        let filtered = EdgeFiltered::from_fn(&self.graph, |e: (NodeId, NodeId, &())| {
            !removed.contains(&Edge::new(e.source(), e.target()))
        });
        let mut dfs = Dfs::new(&filtered, start);
        let mut reached = 0;
        while dfs.next(&filtered).is_some() {
            reached += 1;
        }
        reached == self.graph.node_count()
    }

    /// Copy of this topology with `edges` removed. Nodes are kept, even if they become isolated.
    pub fn copy_without(&self, edges: &[Edge]) -> Self {
        let mut copy = self.clone();
        for e in edges {
            copy.graph.remove_edge(e.a(), e.b());
        }
        copy
    }

    /// Compute a shortest path (in hops) from `src` to `dst`, ignoring the `removed` links.
    /// Returns the sequence of nodes including both ends.
    pub fn shortest_path(&self, src: NodeId, dst: NodeId, removed: &[Edge]) -> Option<Vec<NodeId>> {
        if !self.graph.contains_node(src) || !self.graph.contains_node(dst) {
            return None;
        }
        let filtered = EdgeFiltered::from_fn(&self.graph, |e: (NodeId, NodeId, &())| {
            !removed.contains(&Edge::new(e.source(), e.target()))
        });
        astar(&filtered, src, |n| n == dst, |_| 1usize, |_| 0).map(|(_, path)| path)
    }

    /// Return a copy where every switch gets one fresh host attached. New host ids start right
    /// after the largest id in use.
    pub fn attach_hosts(&self) -> Self {
        let mut next = self
            .graph
            .nodes()
            .chain(self.hosts.iter().map(|(_, h)| *h))
            .max()
            .map(|x| x + 1)
            .unwrap_or_default();
        let mut copy = self.clone();
        for switch in self.nodes() {
            copy.hosts.push((switch, next));
            next += 1;
        }
        copy
    }

    /// Write the topology back in the file format read by [`Topology::parse`].
    pub fn to_topology_string(&self) -> String {
        let mut s = String::new();
        for e in self.edges() {
            let _ = writeln!(s, "{} {}", e.a(), e.b());
        }
        for (switch, host) in self.hosts.iter() {
            let _ = writeln!(s, "{switch} {host} h");
        }
        s
    }
}

/// Convert a node path into the links it traverses.
pub fn path_edges(path: &[NodeId]) -> Vec<Edge> {
    path.iter()
        .tuple_windows()
        .map(|(a, b)| Edge::new(*a, *b))
        .collect()
}

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
//! Module selecting sets of links to fail, such that the network stays connected.
//!
//! Links are ranked by their *relevance*, i.e., by how many of the tested source-destination
//! pairs route over them. Links of equal relevance are shuffled, and candidates are drawn from a
//! small window at the top of the ranking. This keeps the selection random while still failing
//! links that matter for the traffic under test.
use std::{cmp::Reverse, collections::HashMap};

use itertools::Itertools;
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    topology::{path_edges, Edge, Topology},
    NodeId,
};

/// Upper bound on the sampling window at the top of the priority list.
pub const WINDOW_CAP: usize = 10;
/// Fraction of the priority list covered by the sampling window.
pub const WINDOW_FRACTION: f64 = 0.15;
/// Number of windowed draws per accepted link before falling back to a full scan.
pub const DEFAULT_MAX_ATTEMPTS: usize = 64;
/// Number of selections drawn for a round before giving up on a filter.
pub const FILTER_ATTEMPTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error(
        "Cannot fail {requested} links while keeping the network connected (only found {selected})"
    )]
    Unsatisfiable { requested: usize, selected: usize },
    #[error("Cannot sample {requested} test pairs out of {available}")]
    NotEnoughPairs { requested: usize, available: usize },
    #[error("No selection of {requested} links passed the filter in {attempts} attempts")]
    Rejected { requested: usize, attempts: usize },
}

/// What happens to the failed links of a trial when the number of failures grows.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum FailurePolicy {
    /// Links failed with `k` failures stay failed with `k + 1` failures.
    #[default]
    Persist,
    /// Every failure count selects its links from scratch.
    Resample,
}

/// Largest index (inclusive) that may be drawn from a priority list of length `len`.
pub fn window_size(len: usize) -> usize {
    let window = WINDOW_CAP.min((WINDOW_FRACTION * len as f64) as usize);
    window.min(len.saturating_sub(1))
}

/// Maximum number of links that can be removed from `topo` without disconnecting it.
pub fn max_removable(topo: &Topology) -> usize {
    topo.num_edges()
        .saturating_sub(topo.num_nodes().saturating_sub(1))
}

/// Selects links to fail while keeping the topology connected, preferring links that carry many
/// of the given test pairs.
#[derive(Debug, Clone)]
pub struct FailureSelector<'a> {
    topo: &'a Topology,
    pairs: &'a [(NodeId, NodeId)],
    max_attempts: usize,
}

impl<'a> FailureSelector<'a> {
    pub fn new(topo: &'a Topology, pairs: &'a [(NodeId, NodeId)]) -> Self {
        Self {
            topo,
            pairs,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Number of windowed draws per accepted link before scanning the entire priority list.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn topology(&self) -> &Topology {
        self.topo
    }

    /// Compute the relevance of all links that are not yet `failed`, i.e., the number of test
    /// pairs whose shortest path (in the topology without `failed`) traverses the link.
    pub fn relevance(&self, failed: &[Edge]) -> Vec<(usize, Edge)> {
        let mut counts: HashMap<Edge, usize> = HashMap::new();
        for (src, dst) in self.pairs {
            match self.topo.shortest_path(*src, *dst, failed) {
                Some(path) => {
                    for e in path_edges(&path) {
                        *counts.entry(e).or_default() += 1;
                    }
                }
                None => log::trace!("no path between {src} and {dst}, pair ignored"),
            }
        }
        self.topo
            .edges()
            .into_iter()
            .filter(|e| !failed.contains(e))
            .map(|e| (counts.get(&e).copied().unwrap_or_default(), e))
            .collect()
    }

    /// Candidate list: links grouped by relevance in descending order, shuffled within each group.
    pub fn priority_list<R: Rng + ?Sized>(&self, failed: &[Edge], rng: &mut R) -> Vec<Edge> {
        let mut scored = self.relevance(failed);
        scored.sort_by_key(|(score, _)| Reverse(*score));

        let mut candidates = Vec::with_capacity(scored.len());
        for (_, group) in &scored.into_iter().group_by(|(score, _)| *score) {
            let mut group = group.map(|(_, e)| e).collect_vec();
            group.shuffle(rng);
            candidates.extend(group);
        }
        candidates
    }

    /// Select `k` links from scratch.
    pub fn select<R: Rng + ?Sized>(&self, k: usize, rng: &mut R) -> Result<Vec<Edge>, SelectionError> {
        self.extend(Vec::new(), k, rng)
    }

    /// Extend an already `failed` set of links (in order) until it contains `k` links. If `failed`
    /// already has `k` or more links, its first `k` links are returned.
    pub fn extend<R: Rng + ?Sized>(
        &self,
        mut failed: Vec<Edge>,
        k: usize,
        rng: &mut R,
    ) -> Result<Vec<Edge>, SelectionError> {
        if failed.len() >= k {
            failed.truncate(k);
            return Ok(failed);
        }
        if k > max_removable(self.topo) {
            log::debug!(
                "{k} failures requested, but at most {} links can be removed",
                max_removable(self.topo)
            );
            return Err(SelectionError::Unsatisfiable {
                requested: k,
                selected: failed.len(),
            });
        }

        let candidates = self.priority_list(&failed, rng);
        if candidates.is_empty() {
            return Err(SelectionError::Unsatisfiable {
                requested: k,
                selected: failed.len(),
            });
        }
        let window = window_size(candidates.len());
        log::trace!(
            "selecting {} more links from {} candidates (window {window})",
            k - failed.len(),
            candidates.len()
        );

        while failed.len() < k {
            let mut accepted = None;
            for _ in 0..self.max_attempts {
                let edge = candidates[rng.gen_range(0..=window)];
                if self.acceptable(&mut failed, edge) {
                    accepted = Some(edge);
                    break;
                }
                log::trace!("rejected {edge}");
            }

            if accepted.is_none() {
                log::debug!(
                    "no acceptable link within {} draws, scanning all candidates",
                    self.max_attempts
                );
                accepted = candidates
                    .iter()
                    .copied()
                    .find(|e| self.acceptable(&mut failed, *e));
            }

            match accepted {
                Some(edge) => {
                    log::trace!("accepted {edge}");
                    failed.push(edge);
                }
                None => {
                    return Err(SelectionError::Unsatisfiable {
                        requested: k,
                        selected: failed.len(),
                    })
                }
            }
        }

        Ok(failed)
    }

    /// A link is acceptable if it is not chosen yet and failing it together with `chosen` keeps the
    /// network connected.
    fn acceptable(&self, chosen: &mut Vec<Edge>, edge: Edge) -> bool {
        if chosen.contains(&edge) {
            return false;
        }
        chosen.push(edge);
        let connected = self.topo.is_connected(chosen);
        chosen.pop();
        connected
    }
}

/// Failed links of one trial across a growing number of failures.
#[derive(Debug, Clone)]
pub struct IncrementalFailures<'a> {
    selector: FailureSelector<'a>,
    policy: FailurePolicy,
    current: Vec<Edge>,
}

impl<'a> IncrementalFailures<'a> {
    pub fn new(selector: FailureSelector<'a>, policy: FailurePolicy) -> Self {
        Self {
            selector,
            policy,
            current: Vec::new(),
        }
    }

    /// Links failed in the last successful round.
    pub fn current(&self) -> &[Edge] {
        &self.current
    }

    /// Select the links for a round with `k` failures.
    pub fn next_round<R: Rng + ?Sized>(
        &mut self,
        k: usize,
        rng: &mut R,
    ) -> Result<&[Edge], SelectionError> {
        self.current = self.candidate(k, rng)?;
        Ok(&self.current)
    }

    /// Like [`IncrementalFailures::next_round`], but draw up to `attempts` selections until one
    /// is accepted. The current links are kept if all of them are rejected.
    pub fn next_round_where<R, F>(
        &mut self,
        k: usize,
        rng: &mut R,
        attempts: usize,
        mut accept: F,
    ) -> Result<&[Edge], SelectionError>
    where
        R: Rng + ?Sized,
        F: FnMut(&[Edge]) -> bool,
    {
        for attempt in 0..attempts {
            let failed = self.candidate(k, rng)?;
            if accept(&failed) {
                log::trace!("accepted {failed:?} after {} attempts", attempt + 1);
                self.current = failed;
                return Ok(&self.current);
            }
        }
        Err(SelectionError::Rejected {
            requested: k,
            attempts,
        })
    }

    fn candidate<R: Rng + ?Sized>(
        &self,
        k: usize,
        rng: &mut R,
    ) -> Result<Vec<Edge>, SelectionError> {
        match self.policy {
            FailurePolicy::Persist => self.selector.extend(self.current.clone(), k, rng),
            FailurePolicy::Resample => self.selector.select(k, rng),
        }
    }
}

/// Sample `n` distinct unordered pairs of `nodes` to test.
pub fn sample_test_pairs<R: Rng + ?Sized>(
    nodes: &[NodeId],
    n: usize,
    rng: &mut R,
) -> Result<Vec<(NodeId, NodeId)>, SelectionError> {
    let all = nodes
        .iter()
        .copied()
        .sorted()
        .dedup()
        .tuple_combinations::<(NodeId, NodeId)>()
        .collect_vec();
    if n > all.len() {
        return Err(SelectionError::NotEnoughPairs {
            requested: n,
            available: all.len(),
        });
    }
    Ok(rand::seq::index::sample(rng, all.len(), n)
        .into_iter()
        .map(|i| all[i])
        .collect())
}

/// Pairs of switches whose traffic is under test in generated schedules: all pairs of switches
/// with hosts attached, or all pairs of switches if there are no hosts.
pub fn traffic_pairs(topo: &Topology) -> Vec<(NodeId, NodeId)> {
    let ends = if topo.host_attachments().is_empty() {
        topo.nodes()
    } else {
        topo.edge_switches()
    };
    ends.into_iter().tuple_combinations().collect()
}

/// Pairs whose shortest path in the intact topology crosses any of the `failed` links.
pub fn constrained_pairs(
    topo: &Topology,
    pairs: &[(NodeId, NodeId)],
    failed: &[Edge],
) -> Vec<(NodeId, NodeId)> {
    pairs
        .iter()
        .copied()
        .filter(|(src, dst)| {
            topo.shortest_path(*src, *dst, &[])
                .map(|p| path_edges(&p).iter().any(|e| failed.contains(e)))
                .unwrap_or(false)
        })
        .collect()
}

/// Accepts failed links only if they constrain enough pairs of switches, i.e., the shortest
/// paths of at least a given fraction of all switch pairs cross a failed link.
#[derive(Debug, Clone)]
pub struct ConstraintFilter<'a> {
    topo: &'a Topology,
    pairs: Vec<(NodeId, NodeId)>,
    min_pairs: usize,
}

impl<'a> ConstraintFilter<'a> {
    pub fn new(topo: &'a Topology, fraction: f64) -> Self {
        let pairs = topo.nodes().into_iter().tuple_combinations().collect_vec();
        let min_pairs = (fraction * pairs.len() as f64) as usize;
        Self {
            topo,
            pairs,
            min_pairs,
        }
    }

    /// Smallest number of constrained pairs that is accepted.
    pub fn min_pairs(&self) -> usize {
        self.min_pairs
    }

    pub fn accepts(&self, failed: &[Edge]) -> bool {
        constrained_pairs(self.topo, &self.pairs, failed).len() >= self.min_pairs
    }
}

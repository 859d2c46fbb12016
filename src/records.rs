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
//! Module defining the annotations of a sweep's result log, and reading them back.
//!
//! The simulator output is interleaved with annotation lines:
//!
//! ```text
//! trial = 0
//! delay = 0.0
//! <simulator output>
//! failed = [(1, 2), (3, 4)]
//! delay = 0.0
//! <simulator output>
//! ```
use std::{collections::HashSet, fs, path::Path};

use itertools::Itertools;
use lazy_static::lazy_static;
use ordered_float::NotNan;
use regex::Regex;

use crate::topology::Edge;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed annotation on line {line}: {content:?}")]
    Malformed { line: usize, content: String },
}

lazy_static! {
    static ref TRIAL: Regex = Regex::new(r"^trial = (?P<trial>\d+)\s*$").unwrap();
    static ref FAILED: Regex = Regex::new(r"^failed = \[(?P<edges>.*)\]\s*$").unwrap();
    static ref EDGE: Regex = Regex::new(r"\(\s*(?P<a>\d+)\s*,\s*(?P<b>\d+)\s*\)").unwrap();
    static ref DELAY: Regex = Regex::new(r"^delay = (?P<delay>\S+)\s*$").unwrap();
}

/// One line of a result log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogLine {
    /// Start of a trial.
    Trial(usize),
    /// Links failed for all following runs of the trial.
    Failed(Vec<Edge>),
    /// Start of a simulator run with the given delay.
    Delay(f64),
    /// Anything the simulator printed.
    Output(String),
}

impl LogLine {
    /// Parse a line. Lines that start like an annotation but do not parse are an error, everything
    /// else is simulator output.
    pub fn parse(line: &str, line_nr: usize) -> Result<Self, RecordError> {
        let malformed = || RecordError::Malformed {
            line: line_nr,
            content: line.to_string(),
        };

        if line.starts_with("trial =") {
            let caps = TRIAL.captures(line).ok_or_else(malformed)?;
            let trial = caps["trial"].parse().map_err(|_| malformed())?;
            Ok(Self::Trial(trial))
        } else if line.starts_with("failed =") {
            let caps = FAILED.captures(line).ok_or_else(malformed)?;
            let list = &caps["edges"];
            // everything except the tuples must be separators
            if EDGE
                .replace_all(list, "")
                .chars()
                .any(|c| c != ',' && !c.is_whitespace())
            {
                return Err(malformed());
            }
            let edges = EDGE
                .captures_iter(list)
                .map(|c| Some(Edge::new(c["a"].parse().ok()?, c["b"].parse().ok()?)))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(malformed)?;
            Ok(Self::Failed(edges))
        } else if line.starts_with("delay =") {
            let caps = DELAY.captures(line).ok_or_else(malformed)?;
            let delay: f64 = caps["delay"].parse().map_err(|_| malformed())?;
            if delay.is_nan() {
                return Err(malformed());
            }
            Ok(Self::Delay(delay))
        } else {
            Ok(Self::Output(line.to_string()))
        }
    }
}

pub fn trial_annotation(trial: usize) -> String {
    format!("trial = {trial}")
}

/// `failed = [(a, b), ...]`
pub fn failed_annotation(edges: &[Edge]) -> String {
    format!(
        "failed = [{}]",
        edges
            .iter()
            .map(|e| format!("({}, {})", e.a(), e.b()))
            .join(", ")
    )
}

pub fn delay_annotation(delay: f64) -> String {
    format!("delay = {delay:?}")
}

/// Parse all lines of a result log. Malformed annotations are skipped with a warning.
pub fn parse_log(content: &str) -> Vec<LogLine> {
    content
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| match LogLine::parse(line, idx + 1) {
            Ok(l) => Some(l),
            Err(e) => {
                log::warn!("Skipping line: {e}");
                None
            }
        })
        .collect()
}

/// Identifies one simulator run of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunKey {
    pub trial: usize,
    pub failures: usize,
    pub delay: NotNan<f64>,
}

impl RunKey {
    /// Returns `None` if the delay is NaN.
    pub fn new(trial: usize, failures: usize, delay: f64) -> Option<Self> {
        Some(Self {
            trial,
            failures,
            delay: NotNan::new(delay).ok()?,
        })
    }
}

/// Runs that completed in a previous (interrupted) sweep.
#[derive(Debug, Clone, Default)]
pub struct CompletedRuns {
    runs: HashSet<RunKey>,
}

impl CompletedRuns {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        log::info!("Reading completed runs from {:?}", path.as_ref());
        Ok(Self::from_log(&fs::read_to_string(path)?))
    }

    /// Collect the runs of a result log. A run is complete once the next annotation follows it,
    /// hence the last run of the log always counts as incomplete.
    pub fn from_log(content: &str) -> Self {
        let mut runs = HashSet::new();
        let mut trial = None;
        let mut failures = 0;
        let mut pending: Option<RunKey> = None;

        for line in parse_log(content) {
            if !matches!(line, LogLine::Output(_)) {
                runs.extend(pending.take());
            }
            match line {
                LogLine::Trial(t) => {
                    trial = Some(t);
                    failures = 0;
                }
                LogLine::Failed(edges) => failures = edges.len(),
                LogLine::Delay(d) => match trial {
                    Some(t) => pending = RunKey::new(t, failures, d),
                    None => log::warn!("Ignoring delay {d} outside of any trial"),
                },
                LogLine::Output(_) => {}
            }
        }
        if let Some(run) = pending {
            log::info!("Last run {run:?} may be incomplete and will be repeated");
        }

        Self { runs }
    }

    pub fn contains(&self, trial: usize, failures: usize, delay: f64) -> bool {
        RunKey::new(trial, failures, delay)
            .map(|k| self.runs.contains(&k))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

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
//! Empirical cumulative distribution functions and inverse-transform sampling.
use std::{fs, path::Path};

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CdfError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed CDF line {line}: {content:?}")]
    Parse { line: usize, content: String },
    #[error("Degenerate CDF: {0}")]
    Degenerate(String),
}

/// Empirical CDF as `(value, cumulative probability)` pairs with non-decreasing probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cdf {
    points: Vec<(f64, f64)>,
}

impl Cdf {
    /// Create a CDF after checking that it can always be sampled.
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self, CdfError> {
        if points.is_empty() {
            return Err(CdfError::Degenerate("the CDF has no entries".to_string()));
        }
        let mut last = 0.0;
        for (value, p) in points.iter() {
            if !value.is_finite() {
                return Err(CdfError::Degenerate(format!("non-finite value {value}")));
            }
            if !(0.0..=1.0).contains(p) {
                return Err(CdfError::Degenerate(format!(
                    "probability {p} of value {value} is outside [0, 1]"
                )));
            }
            if *p < last {
                return Err(CdfError::Degenerate(format!(
                    "probability {p} of value {value} is smaller than the previous {last}"
                )));
            }
            last = *p;
        }
        if last < 0.999 {
            log::warn!("CDF ends at probability {last}; the remaining mass goes to the last value");
        }
        Ok(Self { points })
    }

    /// CDF that always yields `value`.
    pub fn constant(value: f64) -> Self {
        Self {
            points: vec![(value, 1.0)],
        }
    }

    /// Distribution of the number of links that fail together.
    pub fn link_group() -> Self {
        Self {
            points: vec![(1.0, 0.6), (2.0, 0.7), (3.0, 0.8), (5.0, 0.9)],
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CdfError> {
        log::debug!("Loading CDF from {:?}", path.as_ref());
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Parse one `value,probability` pair per line.
    pub fn parse(content: &str) -> Result<Self, CdfError> {
        let points = content
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(idx, l)| {
                let err = || CdfError::Parse {
                    line: idx + 1,
                    content: l.to_string(),
                };
                let (value, p) = l.trim().split_once(',').ok_or_else(err)?;
                Ok((
                    value.trim().parse::<f64>().map_err(|_| err())?,
                    p.trim().parse::<f64>().map_err(|_| err())?,
                ))
            })
            .collect::<Result<Vec<_>, CdfError>>()?;
        Self::new(points)
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Probability with which [`Cdf::sample`] yields each point. The last point also takes the
    /// mass above its cumulative probability.
    pub fn masses(&self) -> Vec<(f64, f64)> {
        let mut prev = 0.0;
        let mut masses = self
            .points
            .iter()
            .map(|(v, p)| {
                let mass = p - prev;
                prev = *p;
                (*v, mass)
            })
            .collect::<Vec<_>>();
        if let Some((_, mass)) = masses.last_mut() {
            *mass += 1.0 - prev;
        }
        masses
    }

    /// Whether sampling yields a value accepted by `accept` with nonzero probability.
    pub fn can_yield(&self, mut accept: impl FnMut(f64) -> bool) -> bool {
        self.masses().into_iter().any(|(v, m)| m > 0.0 && accept(v))
    }

    /// Inverse-transform sampling: return the first value whose cumulative probability exceeds a
    /// uniform draw in `[0, 1)`, or the last value if none does.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.gen();
        self.lookup(u)
    }

    /// Value of the CDF's inverse at `u`.
    pub fn lookup(&self, u: f64) -> f64 {
        self.points
            .iter()
            .find(|(_, p)| *p > u)
            .or(self.points.last())
            .map(|(v, _)| *v)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn parse_file_format() {
        let cdf = Cdf::parse("0.1,0.5\n\n5.0, 1.0\n").unwrap();
        assert_eq!(cdf.points(), &[(0.1, 0.5), (5.0, 1.0)]);
    }

    #[test]
    fn masses_follow_lookup() {
        let cdf = Cdf::parse("0.0,1.0\n5.0,1.0\n").unwrap();
        assert_eq!(cdf.masses(), vec![(0.0, 1.0), (5.0, 0.0)]);
        assert!(!cdf.can_yield(|v| v > 0.0));
        assert!(cdf.can_yield(|v| v == 0.0));

        let open = Cdf::new(vec![(1.0, 0.25), (2.0, 0.25), (3.0, 0.5)]).unwrap();
        assert_eq!(open.masses(), vec![(1.0, 0.25), (2.0, 0.0), (3.0, 0.75)]);
        assert!(!open.can_yield(|v| v == 2.0));
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            assert_ne!(open.sample(&mut rng), 2.0);
        }
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            Cdf::parse("0.1,0.5\n0.2;1.0\n"),
            Err(CdfError::Parse { line: 2, .. })
        ));
        assert!(matches!(
            Cdf::parse("a,0.5\n"),
            Err(CdfError::Parse { line: 1, .. })
        ));
        assert!(matches!(Cdf::parse("\n\n"), Err(CdfError::Degenerate(_))));
        assert!(matches!(
            Cdf::parse("1,0.7\n2,0.5\n"),
            Err(CdfError::Degenerate(_))
        ));
        assert!(matches!(Cdf::parse("1,1.5\n"), Err(CdfError::Degenerate(_))));
    }

    #[test]
    fn lookup_edges() {
        let cdf = Cdf::link_group();
        assert_eq!(cdf.lookup(0.0), 1.0);
        assert_eq!(cdf.lookup(0.59), 1.0);
        // strictly greater
        assert_eq!(cdf.lookup(0.6), 2.0);
        assert_eq!(cdf.lookup(0.85), 5.0);
        // falls through to the last value
        assert_eq!(cdf.lookup(0.95), 5.0);
        assert_eq!(cdf.lookup(1.0), 5.0);
        assert_eq!(Cdf::constant(3.0).lookup(0.999), 3.0);
    }

    #[test]
    fn sampling_is_reproducible() {
        let cdf = Cdf::parse("0.1,0.5\n5.0,1.0\n").unwrap();
        let a: Vec<f64> = {
            let mut rng = StdRng::seed_from_u64(42);
            (0..100).map(|_| cdf.sample(&mut rng)).collect()
        };
        let b: Vec<f64> = {
            let mut rng = StdRng::seed_from_u64(42);
            (0..100).map(|_| cdf.sample(&mut rng)).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn sampling_converges() {
        let cdf = Cdf::new(vec![(1.0, 0.2), (2.0, 0.5), (4.0, 0.9), (8.0, 1.0)]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let n = 100_000;
        let mut counts: HashMap<u64, usize> = HashMap::new();
        for _ in 0..n {
            let v = cdf.sample(&mut rng);
            assert!(cdf.points().iter().any(|(x, _)| *x == v));
            *counts.entry(v as u64).or_default() += 1;
        }
        for (value, expected) in [(1, 0.2), (2, 0.3), (4, 0.4), (8, 0.1)] {
            let freq = counts[&value] as f64 / n as f64;
            assert!(
                (freq - expected).abs() < 0.01,
                "value {value}: {freq} vs {expected}"
            );
        }
    }

    #[test]
    fn independent_cdfs_compose() {
        let count = Cdf::link_group();
        let repair = Cdf::parse("0.5,0.5\n2.0,1.0\n").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            assert!([1.0, 2.0, 3.0, 5.0].contains(&count.sample(&mut rng)));
            assert!([0.5, 2.0].contains(&repair.sample(&mut rng)));
        }
    }
}

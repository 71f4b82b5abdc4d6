//! Posterior mode files
//!
//! An MPD file stores the point estimate and the covariance matrix found by
//! an optimiser, and is used as the starting point of a chain:
//!
//! ```text
//! * MPD
//! estimate_values:
//! r0 q
//! 13.2 0.25
//! covariance_matrix:
//! 1.5 0.01
//! 0.01 0.002
//! ```
//!
//! Tabs and repeated spaces are treated as a single separator.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use itertools::Itertools;
use thiserror::Error;

use crate::{math::CovarianceMatrix, model::ParameterRegistry};

const MPD_HEADER: &str = "* MPD";
const VALUES_HEADER: &str = "estimate_values:";
const COVARIANCE_HEADER: &str = "covariance_matrix:";

#[derive(Error, Debug)]
pub enum MpdError {
    #[error("Unable to open the MPD file {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read the MPD file")]
    Read(#[from] io::Error),
    #[error("Line {line} of the MPD file should be '{expected}' but was '{found}'")]
    Header {
        line: usize,
        expected: &'static str,
        found: String,
    },
    #[error("The MPD file has {found} estimate values when {expected} were expected")]
    ValueCount { expected: usize, found: usize },
    #[error("Could not convert the value '{token}' on line {line} of the MPD file to a number")]
    InvalidNumber { line: usize, token: String },
    #[error(
        "Line {} of the covariance matrix has {found} values when {expected} were expected",
        .row + 1
    )]
    CovarianceRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Estimate {0} was defined in the MPD file but was not found")]
    UnknownLabel(String),
}

/// Contents of a posterior mode file.
#[derive(Debug, Clone, PartialEq)]
pub struct MpdFile {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    /// `None` if the file has no covariance section.
    pub covariance: Option<CovarianceMatrix>,
}

impl MpdFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MpdError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| MpdError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, MpdError> {
        let mut lines = Lines {
            inner: reader.lines(),
            number: 0,
        };

        lines.expect_header(MPD_HEADER)?;
        lines.expect_header(VALUES_HEADER)?;

        let labels = lines.next_tokens()?.unwrap_or_default();
        if labels.is_empty() {
            return Err(MpdError::Header {
                line: lines.number,
                expected: "a list of estimate labels",
                found: String::new(),
            });
        }

        let tokens = lines.next_tokens()?.unwrap_or_default();
        if tokens.len() != labels.len() {
            return Err(MpdError::ValueCount {
                expected: labels.len(),
                found: tokens.len(),
            });
        }
        let values = lines.parse_numbers(&tokens)?;

        let marker = lines.next_tokens()?.map(|tokens| tokens.join(" "));
        if marker.as_deref() != Some(COVARIANCE_HEADER) {
            log::warn!("Could not find '{COVARIANCE_HEADER}' in the MPD file");
            return Ok(Self {
                labels,
                values,
                covariance: None,
            });
        }

        let dim = labels.len();
        let mut covariance = CovarianceMatrix::zeros(dim);
        for row in 0..dim {
            let tokens = lines.next_tokens()?.unwrap_or_default();
            if tokens.len() != dim {
                return Err(MpdError::CovarianceRow {
                    row,
                    expected: dim,
                    found: tokens.len(),
                });
            }
            for (col, value) in lines.parse_numbers(&tokens)?.into_iter().enumerate() {
                covariance[(row, col)] = value;
            }
        }
        if !covariance.is_symmetric() {
            log::warn!("The covariance matrix in the MPD file is not symmetric");
        }

        Ok(Self {
            labels,
            values,
            covariance: Some(covariance),
        })
    }

    /// Set the estimates in `registry` to the values of this file.
    ///
    /// Estimates that are not in the file keep their value.
    pub fn apply_to<P: ParameterRegistry + ?Sized>(&self, registry: &mut P) -> Result<(), MpdError> {
        let mut values = registry.values();
        for (label, &value) in self.labels.iter().zip(&self.values) {
            let index = registry
                .find(label)
                .ok_or_else(|| MpdError::UnknownLabel(label.clone()))?;
            values[index] = value;
        }
        registry.set_values(&values);
        Ok(())
    }
}

impl FromStr for MpdFile {
    type Err = MpdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_reader(s.as_bytes())
    }
}

impl fmt::Display for MpdFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{MPD_HEADER}")?;
        writeln!(f, "{VALUES_HEADER}")?;
        writeln!(f, "{}", self.labels.iter().join(" "))?;
        writeln!(f, "{}", self.values.iter().join(" "))?;
        if let Some(covariance) = &self.covariance {
            writeln!(f, "{COVARIANCE_HEADER}")?;
            for row in covariance.rows() {
                writeln!(f, "{}", row.iter().join(" "))?;
            }
        }
        Ok(())
    }
}

struct Lines<L> {
    inner: L,
    number: usize,
}

impl<L: Iterator<Item = io::Result<String>>> Lines<L> {
    /// The whitespace separated tokens of the next line, `None` at the end of the file.
    fn next_tokens(&mut self) -> Result<Option<Vec<String>>, MpdError> {
        let Some(line) = self.inner.next().transpose()? else {
            return Ok(None);
        };
        self.number += 1;
        Ok(Some(line.split_whitespace().map(String::from).collect()))
    }

    fn expect_header(&mut self, expected: &'static str) -> Result<(), MpdError> {
        let found = self
            .next_tokens()?
            .map(|tokens| tokens.join(" "))
            .unwrap_or_default();
        if found != expected {
            return Err(MpdError::Header {
                line: self.number.max(1),
                expected,
                found,
            });
        }
        Ok(())
    }

    fn parse_numbers(&self, tokens: &[String]) -> Result<Vec<f64>, MpdError> {
        tokens
            .iter()
            .map(|token| {
                token.parse::<f64>().map_err(|_| MpdError::InvalidNumber {
                    line: self.number,
                    token: token.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance::{condition_covariance, ConditionerOptions, CovarianceAdjustment};
    use crate::model::{Estimate, EstimateRegistry};
    use pretty_assertions::assert_eq;

    const FILE: &str = "* MPD\n\
                        estimate_values:\n\
                        r0\tq  sigma\n\
                        13.2 0.25\t-1e-3\n\
                        covariance_matrix:\n\
                        1.5 0.01 0\n\
                        0.01 0.002 0\n\
                        0 0 4\n";

    #[test]
    fn parses_values_and_covariance() {
        let mpd: MpdFile = FILE.parse().unwrap();
        assert_eq!(mpd.labels, vec!["r0", "q", "sigma"]);
        assert_eq!(mpd.values, vec![13.2, 0.25, -1e-3]);
        let covariance = mpd.covariance.unwrap();
        assert_eq!(covariance.row(1), &[0.01, 0.002, 0.]);
        assert_eq!(covariance[(2, 2)], 4.);
    }

    #[test]
    fn missing_covariance_is_not_fatal() {
        let mpd: MpdFile = "* MPD\nestimate_values:\na b\n1 2\n".parse().unwrap();
        assert_eq!(mpd.values, vec![1., 2.]);
        assert!(mpd.covariance.is_none());
    }

    #[test]
    fn rejects_bad_files() {
        let err = "* MCMC\n".parse::<MpdFile>().unwrap_err();
        assert!(matches!(err, MpdError::Header { line: 1, .. }));

        let err = "".parse::<MpdFile>().unwrap_err();
        assert!(matches!(err, MpdError::Header { line: 1, .. }));

        let err = "* MPD\nestimate_values:\na b\n1\n".parse::<MpdFile>().unwrap_err();
        assert!(matches!(err, MpdError::ValueCount { expected: 2, found: 1 }));

        let err = "* MPD\nestimate_values:\na b\n1 x\n".parse::<MpdFile>().unwrap_err();
        assert!(matches!(err, MpdError::InvalidNumber { line: 4, ref token } if token == "x"));

        let err = "* MPD\nestimate_values:\na b\n1 2\ncovariance_matrix:\n1 0\n0\n"
            .parse::<MpdFile>()
            .unwrap_err();
        assert!(matches!(err, MpdError::CovarianceRow { row: 1, expected: 2, found: 1 }));
        assert_eq!(
            err.to_string(),
            "Line 2 of the covariance matrix has 1 values when 2 were expected"
        );
    }

    #[test]
    fn written_file_reads_back() {
        let mpd: MpdFile = FILE.parse().unwrap();
        let text = mpd.to_string();
        assert!(text.starts_with("* MPD\nestimate_values:\nr0 q sigma\n"));
        assert_eq!(text.parse::<MpdFile>().unwrap(), mpd);
    }

    #[test]
    fn covariance_unchanged_without_conditioning() {
        let mpd: MpdFile = FILE.parse().unwrap();
        let parsed = mpd.covariance.unwrap();
        let mut conditioned = parsed.clone();
        let options = ConditionerOptions {
            method: CovarianceAdjustment::None,
            ..Default::default()
        };
        condition_covariance(&mut conditioned, &[1.; 3], &options);
        assert_eq!(conditioned, parsed);
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mpd.out");
        std::fs::write(&path, FILE).unwrap();
        assert_eq!(MpdFile::load(&path).unwrap(), FILE.parse().unwrap());
        assert!(matches!(
            MpdFile::load(dir.path().join("missing")),
            Err(MpdError::Open { .. })
        ));
    }

    #[test]
    fn applies_values_by_label() {
        let mut registry: EstimateRegistry = [
            Estimate::new("q", 0.1, 0., 1.),
            Estimate::new("r0", 10., 1., 100.),
            Estimate::new("m", 0.2, 0., 1.),
        ]
        .into_iter()
        .collect();
        let mpd: MpdFile = "* MPD\nestimate_values:\nr0 q\n13.2 0.25\n".parse().unwrap();
        mpd.apply_to(&mut registry).unwrap();
        assert_eq!(registry.values(), vec![0.25, 13.2, 0.2]);

        let unknown: MpdFile = "* MPD\nestimate_values:\nzz\n1\n".parse().unwrap();
        let err = unknown.apply_to(&mut registry).unwrap_err();
        assert!(matches!(err, MpdError::UnknownLabel(ref label) if label == "zz"));
    }
}

//! CSV output for MCMC chains
//!
//! Writes one row per retained chain link with the objective decomposition,
//! the acceptance rates, the step size and the parameter values. If the
//! covariance matrix was recalculated during the run, the modified matrix is
//! written to a second file when the chain finishes.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::chain::ChainLink;
use crate::report::{ChainReporter, ChainSummary};

const SAMPLES_FILE: &str = "samples.csv";
const COVARIANCE_FILE: &str = "modified_covariance_matrix.csv";

const OBJECTIVE_COLUMNS: [&str; 10] = [
    "iteration",
    "score",
    "prior",
    "likelihood",
    "penalty",
    "additional_priors",
    "jacobians",
    "step_size",
    "acceptance_rate",
    "acceptance_rate_since_adapt",
];

/// Writes the chain into a directory of CSV files.
pub struct CsvChainReporter {
    output_dir: PathBuf,
    /// Number of decimal places for floating point values
    precision: usize,
    writer: Option<BufWriter<File>>,
}

impl CsvChainReporter {
    /// Create a reporter writing to `output_dir`.
    ///
    /// The directory is created when the chain starts.
    ///
    /// # Example
    ///
    /// ```rust
    /// use adaptive_metropolis::CsvChainReporter;
    /// let reporter = CsvChainReporter::new("mcmc_output").with_precision(8);
    /// ```
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            precision: 6,
            writer: None,
        }
    }

    /// Set the precision (number of decimal places) for floating point values.
    ///
    /// Default is 6 decimal places.
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    pub fn samples_path(&self) -> PathBuf {
        self.output_dir.join(SAMPLES_FILE)
    }

    pub fn covariance_path(&self) -> PathBuf {
        self.output_dir.join(COVARIANCE_FILE)
    }

    fn write_header(writer: &mut impl Write, labels: &[String]) -> Result<()> {
        let mut headers: Vec<&str> = OBJECTIVE_COLUMNS.to_vec();
        headers.extend(labels.iter().map(|label| label.as_str()));
        writeln!(writer, "{}", headers.join(","))?;
        Ok(())
    }

    fn create_output_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory: {:?}", self.output_dir)
        })
    }

    fn format_value(&self, value: f64) -> String {
        if value.is_nan() {
            "NA".to_string()
        } else if value == f64::INFINITY {
            "Inf".to_string()
        } else if value == f64::NEG_INFINITY {
            "-Inf".to_string()
        } else {
            format!("{:.prec$}", value, prec = self.precision)
        }
    }

    fn format_row(&self, values: &[f64]) -> String {
        values
            .iter()
            .map(|&v| self.format_value(v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl ChainReporter for CsvChainReporter {
    fn chain_started(&mut self, labels: &[String]) -> Result<()> {
        self.create_output_dir()?;

        let file_path = self.samples_path();
        let file = File::create(&file_path)
            .with_context(|| format!("Failed to create CSV file: {:?}", file_path))?;
        let mut writer = BufWriter::new(file);
        Self::write_header(&mut writer, labels)?;

        self.writer = Some(writer);
        Ok(())
    }

    /// Append to the samples of the earlier run, keeping its rows.
    fn chain_resumed(&mut self, labels: &[String], iteration: u64) -> Result<()> {
        self.create_output_dir()?;

        let file_path = self.samples_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .with_context(|| format!("Failed to open CSV file: {:?}", file_path))?;
        let is_empty = file
            .metadata()
            .with_context(|| format!("Failed to read metadata of {:?}", file_path))?
            .len()
            == 0;
        let mut writer = BufWriter::new(file);
        if is_empty {
            log::warn!(
                "No samples found in {:?}, rows before iteration {} are missing",
                file_path,
                iteration
            );
            Self::write_header(&mut writer, labels)?;
        }

        self.writer = Some(writer);
        Ok(())
    }

    fn iteration_complete(&mut self, link: &ChainLink) -> Result<()> {
        let score = &link.score;
        let objective = self.format_row(&[
            score.score,
            score.prior,
            score.likelihood,
            score.penalty,
            score.additional_prior,
            score.jacobian,
            link.step_size,
            link.acceptance_rate,
            link.acceptance_rate_since_adapt,
        ]);
        let values = self.format_row(&link.values);

        let writer = self
            .writer
            .as_mut()
            .context("CSV reporter received a link before the chain started")?;
        if values.is_empty() {
            writeln!(writer, "{},{}", link.iteration, objective)?;
        } else {
            writeln!(writer, "{},{},{}", link.iteration, objective, values)?;
        }
        Ok(())
    }

    fn chain_finished(&mut self, summary: &ChainSummary) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().context("Failed to flush CSV samples")?;
        }

        if !summary.run.covariance_recalculated {
            return Ok(());
        }

        let file_path = self.covariance_path();
        let file = File::create(&file_path)
            .with_context(|| format!("Failed to create CSV file: {:?}", file_path))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", summary.labels.join(","))?;
        for row in summary.covariance.rows() {
            writeln!(writer, "{}", self.format_row(row))?;
        }
        writer.flush()?;
        Ok(())
    }
}

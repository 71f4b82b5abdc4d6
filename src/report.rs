use anyhow::Result;

use crate::{chain::ChainLink, math::CovarianceMatrix, state::RunState};

/// State of the chain handed to the reporter when sampling is done.
#[derive(Debug, Clone, Copy)]
pub struct ChainSummary<'a> {
    pub run: RunState,
    pub covariance: &'a CovarianceMatrix,
    pub labels: &'a [String],
}

/// Receives the chain as it is built.
///
/// `iteration_complete` is called for the starting point of a new chain and
/// for every retained link after it. A resumed chain calls `chain_resumed`
/// instead of `chain_started` and does not report its starting point again.
pub trait ChainReporter {
    fn chain_started(&mut self, _labels: &[String]) -> Result<()> {
        Ok(())
    }

    /// Continue a chain whose links up to `iteration` were reported by an
    /// earlier run.
    fn chain_resumed(&mut self, labels: &[String], _iteration: u64) -> Result<()> {
        self.chain_started(labels)
    }

    fn iteration_complete(&mut self, link: &ChainLink) -> Result<()>;

    fn chain_finished(&mut self, _summary: &ChainSummary) -> Result<()> {
        Ok(())
    }
}

/// Ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl ChainReporter for NullReporter {
    fn iteration_complete(&mut self, _link: &ChainLink) -> Result<()> {
        Ok(())
    }
}

/// Keeps a copy of everything that was reported.
#[derive(Debug, Clone, Default)]
pub struct ChainRecorder {
    pub labels: Vec<String>,
    pub links: Vec<ChainLink>,
    pub final_state: Option<RunState>,
    pub final_covariance: Option<CovarianceMatrix>,
}

impl ChainRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iterations(&self) -> Vec<u64> {
        self.links.iter().map(|link| link.iteration).collect()
    }
}

impl ChainReporter for ChainRecorder {
    fn chain_started(&mut self, labels: &[String]) -> Result<()> {
        self.labels = labels.to_vec();
        Ok(())
    }

    fn iteration_complete(&mut self, link: &ChainLink) -> Result<()> {
        self.links.push(link.clone());
        Ok(())
    }

    fn chain_finished(&mut self, summary: &ChainSummary) -> Result<()> {
        self.final_state = Some(summary.run);
        self.final_covariance = Some(summary.covariance.clone());
        Ok(())
    }
}

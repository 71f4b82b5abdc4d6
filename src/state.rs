use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{chain::ChainLink, math::CovarianceMatrix};

/// Counters and step size that evolve during a run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunState {
    pub jumps: u64,
    pub successful_jumps: u64,
    pub jumps_since_adapt: u64,
    pub successful_jumps_since_adapt: u64,
    pub step_size: f64,
    pub covariance_recalculated: bool,
}

impl RunState {
    pub fn new(step_size: f64) -> Self {
        Self {
            step_size,
            ..Default::default()
        }
    }

    /// Count the starting point of a chain. It is not a proposed jump, so the
    /// counters since the last adaptation stay untouched.
    pub fn record_start(&mut self) {
        self.jumps += 1;
    }

    pub fn record_jump(&mut self) {
        self.jumps += 1;
        self.jumps_since_adapt += 1;
    }

    pub fn record_success(&mut self) {
        self.successful_jumps += 1;
        self.successful_jumps_since_adapt += 1;
    }

    pub fn reset_since_adapt(&mut self) {
        self.jumps_since_adapt = 0;
        self.successful_jumps_since_adapt = 0;
    }

    pub fn acceptance_rate(&self) -> f64 {
        ratio(self.successful_jumps, self.jumps)
    }

    pub fn acceptance_rate_since_adapt(&self) -> f64 {
        ratio(self.successful_jumps_since_adapt, self.jumps_since_adapt)
    }
}

fn ratio(num: u64, denom: u64) -> f64 {
    if denom == 0 {
        0.
    } else {
        num as f64 / denom as f64
    }
}

/// Everything needed to continue a chain in a later run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeState {
    pub run: RunState,
    /// The working covariance matrix, already conditioned.
    pub covariance: CovarianceMatrix,
    /// Parameter values of the current state of the chain.
    pub values: Vec<f64>,
}

impl ResumeState {
    /// Rebuild a resume state from the last recorded link of a chain.
    ///
    /// Only the acceptance rate since the last adaptation is known, so the
    /// counters since adaptation are reconstructed from the last step size
    /// trigger before the link.
    pub fn from_chain_link(
        link: &ChainLink,
        covariance: CovarianceMatrix,
        adapt_stepsize_at: &[u64],
        covariance_recalculated: bool,
    ) -> Self {
        let last_adapt = adapt_stepsize_at
            .iter()
            .copied()
            .filter(|&at| at < link.iteration)
            .max()
            .unwrap_or(1);
        let jumps_since_adapt = link.iteration.saturating_sub(last_adapt);
        let successful_jumps_since_adapt =
            (jumps_since_adapt as f64 * link.acceptance_rate_since_adapt).floor() as u64;
        let successful_jumps = (link.iteration as f64 * link.acceptance_rate).round() as u64;
        Self {
            run: RunState {
                jumps: link.iteration,
                successful_jumps,
                jumps_since_adapt,
                successful_jumps_since_adapt,
                step_size: link.step_size,
                covariance_recalculated,
            },
            covariance,
            values: link.values.clone(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create resume file: {:?}", path))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("Failed to write resume file: {:?}", path))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open resume file: {:?}", path))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse resume file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectiveScore;
    use pretty_assertions::assert_eq;

    #[test]
    fn counters() {
        let mut state = RunState::new(0.5);
        assert_eq!(state.acceptance_rate(), 0.);
        state.record_jump();
        state.record_jump();
        state.record_success();
        assert_eq!(state.acceptance_rate(), 0.5);
        state.reset_since_adapt();
        assert_eq!(state.acceptance_rate_since_adapt(), 0.);
        assert_eq!(state.jumps, 2);
    }

    #[test]
    fn start_is_not_a_proposed_jump() {
        let mut state = RunState::new(0.5);
        state.record_start();
        assert_eq!(state.jumps, 1);
        assert_eq!(state.jumps_since_adapt, 0);
        assert_eq!(state.acceptance_rate(), 0.);
        state.record_jump();
        state.record_success();
        assert_eq!(state.jumps, 2);
        assert_eq!(state.acceptance_rate_since_adapt(), 1.);
    }

    #[test]
    fn from_link() {
        let link = ChainLink {
            iteration: 300,
            score: ObjectiveScore::default(),
            step_size: 0.7,
            acceptance_rate: 0.25,
            acceptance_rate_since_adapt: 0.3,
            values: vec![1., 2.],
        };
        let state =
            ResumeState::from_chain_link(&link, CovarianceMatrix::identity(2), &[100, 200, 400], false);
        assert_eq!(state.run.jumps, 300);
        assert_eq!(state.run.jumps_since_adapt, 100);
        assert_eq!(state.run.successful_jumps_since_adapt, 30);
        assert_eq!(state.run.successful_jumps, 75);
        assert_eq!(state.run.step_size, 0.7);
        assert_eq!(state.values, vec![1., 2.]);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.json");
        let state = ResumeState {
            run: RunState {
                jumps: 10,
                successful_jumps: 4,
                jumps_since_adapt: 3,
                successful_jumps_since_adapt: 1,
                step_size: 0.125,
                covariance_recalculated: true,
            },
            covariance: CovarianceMatrix::from_rows(&[[1., 0.5], [0.5, 2.]]).unwrap(),
            values: vec![0.25, -3.5],
        };
        state.save(&path).unwrap();
        assert_eq!(ResumeState::load(&path).unwrap(), state);
        assert!(ResumeState::load(dir.path().join("missing.json")).is_err());
    }
}

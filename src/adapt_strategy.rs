use std::collections::BTreeSet;

use crate::{
    chain::Chain,
    cholesky::{CholeskyError, CholeskyFactor},
    covariance::{condition_covariance, empirical_covariance, ConditionerOptions},
    math::CovarianceMatrix,
    state::RunState,
    stepsize::StepSizeAdaptMethod,
};

/// Rescales the step size at configured iterations.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSizeStrategy {
    adapt_at: BTreeSet<u64>,
    method: StepSizeAdaptMethod,
}

impl StepSizeStrategy {
    pub fn new(adapt_at: impl IntoIterator<Item = u64>, method: StepSizeAdaptMethod) -> Self {
        Self {
            adapt_at: adapt_at.into_iter().collect(),
            method,
        }
    }

    /// Adapt the step size if the current jump count is a trigger and a jump
    /// was proposed since the last adaptation.
    ///
    /// Returns whether the step size was changed.
    pub fn adapt(&self, state: &mut RunState) -> bool {
        if state.jumps_since_adapt == 0 || !self.adapt_at.contains(&state.jumps) {
            return false;
        }
        let old = state.step_size;
        state.step_size = self.method.adapt(
            old,
            state.successful_jumps_since_adapt,
            state.jumps_since_adapt,
            state.acceptance_rate(),
        );
        log::info!(
            "Adapted step size at iteration {} from {} to {} (acceptance since last adaptation {})",
            state.jumps,
            old,
            state.step_size,
            state.acceptance_rate_since_adapt(),
        );
        state.reset_since_adapt();
        true
    }
}

/// Replaces the proposal covariance by the empirical covariance of the chain, once.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceStrategy {
    adapt_at: BTreeSet<u64>,
    min_jumps: u64,
    conditioner: ConditionerOptions,
    ranges: Vec<f64>,
    labels: Vec<String>,
}

impl CovarianceStrategy {
    pub fn new(
        adapt_at: impl IntoIterator<Item = u64>,
        min_jumps: u64,
        conditioner: ConditionerOptions,
        ranges: Vec<f64>,
        labels: Vec<String>,
    ) -> Self {
        assert!(ranges.len() == labels.len());
        Self {
            adapt_at: adapt_at.into_iter().collect(),
            min_jumps,
            conditioner,
            ranges,
            labels,
        }
    }

    /// Recompute, condition and factorize the covariance if the current jump
    /// count is a trigger.
    ///
    /// Returns whether the covariance was replaced. A failed factorization
    /// leaves `covariance` and `factor` untouched.
    pub fn adapt(
        &self,
        state: &mut RunState,
        chain: &Chain,
        covariance: &mut CovarianceMatrix,
        factor: &mut CholeskyFactor,
    ) -> Result<bool, CholeskyError> {
        if state.covariance_recalculated
            || state.jumps < self.min_jumps
            || !self.adapt_at.contains(&state.jumps)
        {
            return Ok(false);
        }
        let Some(mut empirical) = empirical_covariance(chain) else {
            log::warn!(
                "Not enough links in the chain ({}) to recalculate the covariance matrix",
                chain.len()
            );
            return Ok(false);
        };
        log::info!(
            "Recalculating the covariance matrix at iteration {} from {} links",
            state.jumps,
            chain.len() - 1
        );
        condition_covariance(&mut empirical, &self.ranges, &self.conditioner);
        let new_factor = CholeskyFactor::factorize(&empirical, &self.labels)?;

        *covariance = empirical;
        *factor = new_factor;
        state.covariance_recalculated = true;
        Ok(true)
    }
}

/// Both adaptation mechanisms, invoked at the top of every iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptationController {
    pub step_size: StepSizeStrategy,
    pub covariance: CovarianceStrategy,
}

impl AdaptationController {
    pub fn new(step_size: StepSizeStrategy, covariance: CovarianceStrategy) -> Self {
        Self {
            step_size,
            covariance,
        }
    }

    pub fn adapt(
        &self,
        state: &mut RunState,
        chain: &Chain,
        covariance: &mut CovarianceMatrix,
        factor: &mut CholeskyFactor,
    ) -> Result<(), CholeskyError> {
        self.step_size.adapt(state);
        self.covariance.adapt(state, chain, covariance, factor)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainLink;
    use crate::covariance::CovarianceAdjustment;
    use crate::model::ObjectiveScore;
    use crate::stepsize::MIN_STEP_SIZE;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn state(jumps: u64, since: u64, accepted_since: u64) -> RunState {
        RunState {
            jumps,
            successful_jumps: accepted_since,
            jumps_since_adapt: since,
            successful_jumps_since_adapt: accepted_since,
            step_size: 0.5,
            covariance_recalculated: false,
        }
    }

    #[test]
    fn step_size_only_at_triggers() {
        let strategy = StepSizeStrategy::new([100, 200], StepSizeAdaptMethod::Ratio);
        let mut st = state(150, 100, 48);
        assert!(!strategy.adapt(&mut st));
        assert_eq!(st.step_size, 0.5);

        let mut st = state(200, 100, 48);
        assert!(strategy.adapt(&mut st));
        assert_relative_eq!(st.step_size, 1.0, max_relative = 1e-12);
        assert_eq!(st.jumps_since_adapt, 0);
        assert_eq!(st.successful_jumps_since_adapt, 0);
        assert_eq!(st.successful_jumps, 48);
    }

    #[test]
    fn step_size_needs_jumps() {
        let strategy = StepSizeStrategy::new([1], StepSizeAdaptMethod::DoubleHalf);
        let mut st = state(1, 0, 0);
        assert!(!strategy.adapt(&mut st));
    }

    #[test]
    fn no_acceptance_halves_step_size() {
        let strategy = StepSizeStrategy::new([100], StepSizeAdaptMethod::DoubleHalf);
        let mut st = state(100, 99, 0);
        st.step_size = 1.;
        assert!(strategy.adapt(&mut st));
        assert_eq!(st.step_size, 0.5);
        assert_eq!(st.jumps_since_adapt, 0);
    }

    #[test]
    fn no_acceptance_floors_ratio_step_size() {
        let strategy = StepSizeStrategy::new([100], StepSizeAdaptMethod::Ratio);
        let mut st = state(100, 99, 0);
        assert!(strategy.adapt(&mut st));
        assert!(st.step_size > 0.);
        assert!(st.step_size <= MIN_STEP_SIZE);
    }

    fn chain_on_line(n: usize) -> Chain {
        let mut chain = Chain::new();
        for k in 0..n {
            let x = k as f64;
            chain.push(ChainLink {
                iteration: k as u64,
                score: ObjectiveScore::default(),
                step_size: 1.,
                acceptance_rate: 0.,
                acceptance_rate_since_adapt: 0.,
                values: vec![x, (x * 7.).sin()],
            });
        }
        chain
    }

    fn covariance_strategy(min_jumps: u64) -> CovarianceStrategy {
        CovarianceStrategy::new(
            [50],
            min_jumps,
            ConditionerOptions {
                max_correlation: 0.9,
                method: CovarianceAdjustment::Correlation,
                min_variance_fraction: 0.,
            },
            vec![100., 2.],
            vec!["x".into(), "y".into()],
        )
    }

    #[test]
    fn covariance_replaced_once() {
        let strategy = covariance_strategy(10);
        let chain = chain_on_line(50);
        let mut cov = CovarianceMatrix::identity(2);
        let mut factor = CholeskyFactor::factorize(&cov, &["x", "y"]).unwrap();
        let mut st = state(50, 10, 5);

        assert!(strategy.adapt(&mut st, &chain, &mut cov, &mut factor).unwrap());
        assert!(st.covariance_recalculated);
        assert_relative_eq!(cov[(0, 0)], empirical_covariance(&chain).unwrap()[(0, 0)]);
        assert_eq!(factor.reconstruct().dim(), 2);

        let before = cov.clone();
        assert!(!strategy.adapt(&mut st, &chain, &mut cov, &mut factor).unwrap());
        assert_eq!(cov, before);
    }

    #[test]
    fn covariance_gated_by_jumps() {
        let strategy = covariance_strategy(1000);
        let chain = chain_on_line(50);
        let mut cov = CovarianceMatrix::identity(2);
        let mut factor = CholeskyFactor::factorize(&cov, &["x", "y"]).unwrap();
        let mut st = state(50, 10, 5);
        assert!(!strategy.adapt(&mut st, &chain, &mut cov, &mut factor).unwrap());
        assert_eq!(cov, CovarianceMatrix::identity(2));
    }

    #[test]
    fn covariance_failure_propagates() {
        let strategy = covariance_strategy(0);
        let mut chain = Chain::new();
        for k in 0..10 {
            chain.push(ChainLink {
                iteration: k,
                score: ObjectiveScore::default(),
                step_size: 1.,
                acceptance_rate: 0.,
                acceptance_rate_since_adapt: 0.,
                values: vec![1., k as f64],
            });
        }
        let mut cov = CovarianceMatrix::identity(2);
        let mut factor = CholeskyFactor::factorize(&cov, &["x", "y"]).unwrap();
        let mut st = state(50, 10, 5);
        let err = strategy
            .adapt(&mut st, &chain, &mut cov, &mut factor)
            .unwrap_err();
        assert!(matches!(err, CholeskyError::NotPositiveDefinite { row: 0, .. }));
        assert!(!st.covariance_recalculated);
        assert_eq!(cov, CovarianceMatrix::identity(2));
    }
}

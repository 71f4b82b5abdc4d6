use std::error::Error as StdError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    adapt_strategy::{AdaptationController, CovarianceStrategy, StepSizeStrategy},
    chain::{Chain, ChainLink},
    cholesky::{CholeskyError, CholeskyFactor},
    covariance::{condition_covariance, ConditionerOptions, CovarianceAdjustment},
    math::CovarianceMatrix,
    model::{ObjectiveEvaluator, ObjectiveScore, ParameterRegistry},
    proposal::{fill_multivariate_normal, Proposal, ProposalKind},
    report::{ChainReporter, ChainSummary},
    rng::RandomStream,
    state::{ResumeState, RunState},
    stepsize::{default_step_size, StepSizeAdaptMethod},
};

/// Number of proposals tried before giving up on a random starting point.
pub const MAX_START_ATTEMPTS: usize = 1000;

/// Settings for the adaptive Metropolis sampler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetropolisSettings {
    /// Total number of jumps in the chain, including the starting point.
    pub length: u64,
    /// Record every `keep`-th jump.
    pub keep: u64,
    /// Covariance multiplier for a random starting point. Zero starts at the
    /// current estimate values.
    pub start: f64,
    /// Initial step size. Zero picks `2.4 / sqrt(active estimates)`.
    pub step_size: f64,
    /// Maximum absolute correlation in the proposal covariance.
    pub max_correlation: f64,
    pub covariance_adjustment_method: CovarianceAdjustment,
    /// Minimum non-zero variance as a fraction of the range between the bounds.
    pub correlation_adjustment_diff: f64,
    pub proposal_distribution: ProposalKind,
    /// Degrees of freedom of the t proposal.
    pub df: f64,
    /// Jump counts at which the step size is adapted. Empty means `[1]`.
    pub adapt_stepsize_at: Vec<u64>,
    /// Jump count at which the covariance is recalculated from the chain.
    pub adapt_covariance_at: Vec<u64>,
    pub adapt_stepsize_method: StepSizeAdaptMethod,
    /// Jumps required before the covariance may be recalculated.
    pub covariance_adapt_min_jumps: u64,
}

impl Default for MetropolisSettings {
    fn default() -> Self {
        Self {
            length: 10_000,
            keep: 1,
            start: 0.,
            step_size: 0.,
            max_correlation: 0.8,
            covariance_adjustment_method: CovarianceAdjustment::Correlation,
            correlation_adjustment_diff: 1e-4,
            proposal_distribution: ProposalKind::T,
            df: 4.,
            adapt_stepsize_at: vec![],
            adapt_covariance_at: vec![],
            adapt_stepsize_method: StepSizeAdaptMethod::Ratio,
            covariance_adapt_min_jumps: 1000,
        }
    }
}

/// All problems found while validating [`MetropolisSettings`].
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid MCMC settings: {}", .problems.join("; "))]
pub struct SettingsError {
    pub problems: Vec<String>,
}

impl MetropolisSettings {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let mut problems = Vec::new();

        if self.length == 0 {
            problems.push("length (0) cannot be less than or equal to 0".to_string());
        }
        if self.keep == 0 {
            problems.push("keep (0) cannot be less than 1".to_string());
        }
        if !(self.start >= 0.) {
            problems.push(format!("start ({}) cannot be less than 0", self.start));
        }
        if !(self.step_size >= 0.) {
            problems.push(format!("step_size ({}) cannot be less than 0", self.step_size));
        }
        if !(self.max_correlation > 0. && self.max_correlation <= 1.) {
            problems.push(format!(
                "max_correlation ({}) must be between 0.0 (exclusive) and 1.0 (inclusive)",
                self.max_correlation
            ));
        }
        if !(self.correlation_adjustment_diff >= 0.) {
            problems.push(format!(
                "correlation_adjustment_diff ({}) cannot be less than 0",
                self.correlation_adjustment_diff
            ));
        }
        if !(self.df > 0.) {
            problems.push(format!("df ({}) cannot be less than or equal to 0", self.df));
        }
        for &at in &self.adapt_stepsize_at {
            if at < 1 || at > self.length {
                problems.push(format!(
                    "adapt_stepsize_at ({at}) must be between 1 and length ({})",
                    self.length
                ));
            }
        }
        if self.adapt_covariance_at.len() > 1 {
            problems
                .push("adapt_covariance_at: the covariance matrix can be adapted once only".into());
        }
        for &at in &self.adapt_covariance_at {
            if at < 1 || at > self.length {
                problems.push(format!(
                    "adapt_covariance_at ({at}) must be between 1 and length ({})",
                    self.length
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SettingsError { problems })
        }
    }

    pub fn conditioner_options(&self) -> ConditionerOptions {
        ConditionerOptions {
            max_correlation: self.max_correlation,
            method: self.covariance_adjustment_method,
            min_variance_fraction: self.correlation_adjustment_diff,
        }
    }

    fn stepsize_triggers(&self) -> Vec<u64> {
        if self.adapt_stepsize_at.is_empty() {
            vec![1]
        } else {
            self.adapt_stepsize_at.clone()
        }
    }
}

#[derive(Error, Debug)]
pub enum MetropolisError {
    #[error(transparent)]
    InvalidSettings(#[from] SettingsError),
    #[error(
        "The number of active estimates is 0. At least one non-fixed estimated \
         parameter is required to run MCMC"
    )]
    NoActiveEstimates,
    #[error("The {what} has {found} entries but there are {expected} estimates")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Cannot continue MCMC: {0}")]
    Cholesky(#[from] CholeskyError),
    #[error("Failed to generate random start after {attempts} attempts")]
    RandomStartFailed { attempts: usize },
    #[error("Objective function evaluation failed at iteration {iteration}")]
    Evaluator {
        iteration: u64,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("Objective score {score} at iteration {iteration} is not finite")]
    NonFiniteScore { iteration: u64, score: f64 },
    #[error("Reporting failed: {0:#}")]
    Report(anyhow::Error),
    #[error("The sampler must be initialized before sampling")]
    NotInitialized,
}

pub type Result<T, E = MetropolisError> = std::result::Result<T, E>;

/// Where the sampler is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Sampling,
    Finished,
}

/// Working data that only exists once the sampler knows its estimates.
#[derive(Debug)]
struct Active {
    controller: AdaptationController,
    factor: CholeskyFactor,
    labels: Vec<String>,
    is_active: Vec<bool>,
    bounds: Vec<(f64, f64)>,
    current: Vec<f64>,
    current_score: ObjectiveScore,
}

/// Single chain adaptive Metropolis sampler.
///
/// The sampler proposes correlated jumps from a conditioned covariance
/// matrix, evaluates each in-bounds candidate with an external
/// [`ObjectiveEvaluator`] and accepts it with the Metropolis rule. The step
/// size and the covariance can be adapted at configured jump counts.
#[derive(Debug)]
pub struct MetropolisSampler<S: RandomStream> {
    settings: MetropolisSettings,
    proposal: Proposal,
    rng: S,
    state: RunState,
    covariance: CovarianceMatrix,
    resume_values: Option<Vec<f64>>,
    chain: Chain,
    phase: Phase,
    active: Option<Active>,
}

impl<S: RandomStream> MetropolisSampler<S> {
    /// Create a sampler for a new chain.
    ///
    /// `covariance` is the raw covariance, usually from an optimiser. It is
    /// conditioned before use.
    pub fn new(settings: MetropolisSettings, covariance: CovarianceMatrix, rng: S) -> Result<Self> {
        settings.validate()?;
        let proposal = Proposal::new(settings.proposal_distribution, settings.df);
        Ok(Self {
            state: RunState::new(settings.step_size),
            proposal,
            rng,
            covariance,
            resume_values: None,
            chain: Chain::new(),
            phase: Phase::Initializing,
            active: None,
            settings,
        })
    }

    /// Create a sampler that continues a chain from `resume`.
    ///
    /// The covariance in `resume` is used as is, and no random start is drawn.
    pub fn resume(settings: MetropolisSettings, resume: ResumeState, rng: S) -> Result<Self> {
        settings.validate()?;
        let proposal = Proposal::new(settings.proposal_distribution, settings.df);
        Ok(Self {
            state: resume.run,
            proposal,
            rng,
            covariance: resume.covariance,
            resume_values: Some(resume.values),
            chain: Chain::new(),
            phase: Phase::Initializing,
            active: None,
            settings,
        })
    }

    pub fn is_resuming(&self) -> bool {
        self.resume_values.is_some()
    }

    /// Run the chain until `length` jumps have been attempted.
    pub fn run<P, E, R>(
        &mut self,
        registry: &mut P,
        evaluator: &mut E,
        reporter: &mut R,
    ) -> Result<()>
    where
        P: ParameterRegistry + ?Sized,
        E: ObjectiveEvaluator + ?Sized,
        R: ChainReporter + ?Sized,
    {
        if self.phase == Phase::Initializing {
            self.initialize(registry, evaluator, reporter)?;
        }
        while self.phase == Phase::Sampling && self.state.jumps < self.settings.length {
            self.step(registry, evaluator, reporter)?;
        }
        if self.phase == Phase::Sampling {
            self.finish(registry, reporter)?;
        }
        Ok(())
    }

    /// Prepare the covariance, pick the starting point and record it.
    pub fn initialize<P, E, R>(
        &mut self,
        registry: &mut P,
        evaluator: &mut E,
        reporter: &mut R,
    ) -> Result<()>
    where
        P: ParameterRegistry + ?Sized,
        E: ObjectiveEvaluator + ?Sized,
        R: ChainReporter + ?Sized,
    {
        let estimates = registry.estimates();
        let dim = estimates.len();
        if self.covariance.dim() != dim {
            return Err(MetropolisError::DimensionMismatch {
                what: "covariance matrix",
                expected: dim,
                found: self.covariance.dim(),
            });
        }

        let labels: Vec<String> = estimates.iter().map(|e| e.label.clone()).collect();
        let ranges: Vec<f64> = estimates.iter().map(|e| e.range()).collect();
        let bounds: Vec<(f64, f64)> = estimates
            .iter()
            .map(|e| (e.lower_bound, e.upper_bound))
            .collect();
        let is_active: Vec<bool> = estimates.iter().map(|e| e.is_active()).collect();
        let active_count = is_active.iter().filter(|&&a| a).count();
        if active_count == 0 {
            return Err(MetropolisError::NoActiveEstimates);
        }

        let mut current = match self.resume_values.as_ref() {
            Some(values) => {
                if values.len() != dim {
                    return Err(MetropolisError::DimensionMismatch {
                        what: "resumed parameter vector",
                        expected: dim,
                        found: values.len(),
                    });
                }
                values.clone()
            }
            None => estimates.iter().map(|e| e.value).collect(),
        };

        let resuming = self.is_resuming();
        if !resuming {
            log::debug!("Building covariance matrix");
            condition_covariance(
                &mut self.covariance,
                &ranges,
                &self.settings.conditioner_options(),
            );
        }
        if self.state.step_size == 0. {
            self.state.step_size = default_step_size(active_count);
        }

        log::debug!("Applying Cholesky decomposition");
        let factor = CholeskyFactor::factorize(&self.covariance, &labels)?;

        if !resuming && self.settings.start > 0. {
            current = self.random_start(&factor, &is_active, &bounds, &current)?;
        }

        let controller = AdaptationController::new(
            StepSizeStrategy::new(
                self.settings.stepsize_triggers(),
                self.settings.adapt_stepsize_method,
            ),
            CovarianceStrategy::new(
                self.settings.adapt_covariance_at.iter().copied(),
                self.settings.covariance_adapt_min_jumps,
                self.settings.conditioner_options(),
                ranges,
                labels.clone(),
            ),
        );

        if resuming {
            log::info!("Resuming MCMC chain at iteration {}", self.state.jumps);
            reporter
                .chain_resumed(&labels, self.state.jumps)
                .map_err(MetropolisError::Report)?;
        } else {
            reporter
                .chain_started(&labels)
                .map_err(MetropolisError::Report)?;
            self.state.record_start();
        }

        registry.set_values(&current);
        let score = evaluate(evaluator, &current, self.state.jumps)?;
        let link = ChainLink {
            iteration: self.state.jumps,
            score,
            step_size: self.state.step_size,
            acceptance_rate: self.state.acceptance_rate(),
            acceptance_rate_since_adapt: self.state.acceptance_rate_since_adapt(),
            values: current.clone(),
        };
        // the starting point of a resumed chain was reported by the previous run
        if !resuming {
            reporter
                .iteration_complete(&link)
                .map_err(MetropolisError::Report)?;
        }
        self.chain.push(link);

        log::info!(
            "MCMC starting with {} estimates ({} active), step size {}",
            dim,
            active_count,
            self.state.step_size
        );
        self.active = Some(Active {
            controller,
            factor,
            labels,
            is_active,
            bounds,
            current,
            current_score: score,
        });
        self.phase = Phase::Sampling;
        Ok(())
    }

    fn random_start(
        &mut self,
        factor: &CholeskyFactor,
        is_active: &[bool],
        bounds: &[(f64, f64)],
        original: &[f64],
    ) -> Result<Vec<f64>> {
        let mut candidate = original.to_vec();
        for attempt in 1..=MAX_START_ATTEMPTS {
            candidate.copy_from_slice(original);
            fill_multivariate_normal(
                &mut self.rng,
                factor,
                self.settings.start,
                is_active,
                &mut candidate,
            );
            if within_bounds(&candidate, bounds, is_active) {
                log::debug!("Found random start after {attempt} attempts");
                return Ok(candidate);
            }
        }
        Err(MetropolisError::RandomStartFailed {
            attempts: MAX_START_ATTEMPTS,
        })
    }

    /// Perform a single jump of the chain.
    pub fn step<P, E, R>(
        &mut self,
        registry: &mut P,
        evaluator: &mut E,
        reporter: &mut R,
    ) -> Result<()>
    where
        P: ParameterRegistry + ?Sized,
        E: ObjectiveEvaluator + ?Sized,
        R: ChainReporter + ?Sized,
    {
        let active = self.active.as_mut().ok_or(MetropolisError::NotInitialized)?;
        let state = &mut self.state;

        active
            .controller
            .adapt(state, &self.chain, &mut self.covariance, &mut active.factor)?;

        let mut candidate = active.current.clone();
        self.proposal.fill_candidate(
            &mut self.rng,
            &active.factor,
            state.step_size,
            &active.is_active,
            &mut candidate,
        );

        state.record_jump();

        if within_bounds(&candidate, &active.bounds, &active.is_active) {
            registry.set_values(&candidate);
            let score = evaluate(evaluator, &candidate, state.jumps)?;
            let previous = active.current_score.score;

            let accept =
                score.score <= previous || self.rng.uniform() < (previous - score.score).exp();
            if accept {
                log::trace!(
                    "Accept: iteration {}, score {} previous score {}",
                    state.jumps,
                    score.score,
                    previous
                );
                state.record_success();
                active.current = candidate;
                active.current_score = score;
            } else {
                log::trace!(
                    "Reject: iteration {}, score {} previous score {}",
                    state.jumps,
                    score.score,
                    previous
                );
            }
        } else {
            log::trace!("Reject: bounds, iteration {}", state.jumps);
        }

        if state.jumps % self.settings.keep == 0 {
            let link = ChainLink {
                iteration: state.jumps,
                score: active.current_score,
                step_size: state.step_size,
                acceptance_rate: state.acceptance_rate(),
                acceptance_rate_since_adapt: state.acceptance_rate_since_adapt(),
                values: active.current.clone(),
            };
            reporter
                .iteration_complete(&link)
                .map_err(MetropolisError::Report)?;
            self.chain.push(link);
        }
        Ok(())
    }

    /// Hand the final state to the reporter and leave the estimates at the
    /// current state of the chain.
    pub fn finish<P, R>(&mut self, registry: &mut P, reporter: &mut R) -> Result<()>
    where
        P: ParameterRegistry + ?Sized,
        R: ChainReporter + ?Sized,
    {
        let active = self.active.as_ref().ok_or(MetropolisError::NotInitialized)?;
        registry.set_values(&active.current);
        let summary = ChainSummary {
            run: self.state,
            covariance: &self.covariance,
            labels: &active.labels,
        };
        reporter
            .chain_finished(&summary)
            .map_err(MetropolisError::Report)?;
        log::info!(
            "MCMC finished after {} jumps, acceptance rate {}",
            self.state.jumps,
            self.state.acceptance_rate()
        );
        self.phase = Phase::Finished;
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &MetropolisSettings {
        &self.settings
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn run_state(&self) -> &RunState {
        &self.state
    }

    /// The working covariance. Conditioned once the sampler is initialized.
    pub fn covariance(&self) -> &CovarianceMatrix {
        &self.covariance
    }

    pub fn factor(&self) -> Option<&CholeskyFactor> {
        self.active.as_ref().map(|a| &a.factor)
    }

    pub fn current_values(&self) -> Option<&[f64]> {
        self.active.as_ref().map(|a| a.current.as_slice())
    }

    /// Snapshot that lets a later run continue this chain.
    pub fn resume_state(&self) -> Option<ResumeState> {
        let active = self.active.as_ref()?;
        Some(ResumeState {
            run: self.state,
            covariance: self.covariance.clone(),
            values: active.current.clone(),
        })
    }

    pub fn rng_mut(&mut self) -> &mut S {
        &mut self.rng
    }

    pub fn into_rng(self) -> S {
        self.rng
    }

    pub fn into_chain(self) -> Chain {
        self.chain
    }
}

/// Bounds are inclusive. Fixed estimates are never moved, so they are not checked.
fn within_bounds(candidate: &[f64], bounds: &[(f64, f64)], is_active: &[bool]) -> bool {
    candidate
        .iter()
        .zip(bounds)
        .zip(is_active)
        .all(|((&val, &(lower, upper)), &active)| !active || (lower <= val && val <= upper))
}

fn evaluate<E: ObjectiveEvaluator + ?Sized>(
    evaluator: &mut E,
    values: &[f64],
    iteration: u64,
) -> Result<ObjectiveScore> {
    let score = evaluator
        .evaluate(values)
        .map_err(|err| MetropolisError::Evaluator {
            iteration,
            source: Box::new(err),
        })?;
    if !score.score.is_finite() {
        return Err(MetropolisError::NonFiniteScore {
            iteration,
            score: score.score,
        });
    }
    Ok(score)
}

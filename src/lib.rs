//! Adaptive Metropolis MCMC for models with bounded parameters.
//!
//! The sampler draws correlated proposals from a conditioned covariance
//! matrix, scores each candidate with an external [`ObjectiveEvaluator`]
//! (smaller is better) and accepts it with the Metropolis rule. The step size
//! and the proposal covariance adapt at configured jump counts.
//!
//! ```
//! use adaptive_metropolis::{
//!     ChainRecorder, CovarianceMatrix, Estimate, EstimateRegistry, MetropolisSampler,
//!     MetropolisSettings, ObjectiveEvaluator, ObjectiveScore, RngStream,
//! };
//! use rand::SeedableRng;
//!
//! struct Quadratic(Vec<f64>);
//!
//! impl ObjectiveEvaluator for Quadratic {
//!     type Err = std::convert::Infallible;
//!
//!     fn set_parameter_values(&mut self, values: &[f64]) -> Result<(), Self::Err> {
//!         self.0 = values.to_vec();
//!         Ok(())
//!     }
//!
//!     fn run_full_iteration(&mut self) -> Result<(), Self::Err> {
//!         Ok(())
//!     }
//!
//!     fn objective_score(&mut self) -> Result<ObjectiveScore, Self::Err> {
//!         let nll = self.0.iter().map(|x| 0.5 * x * x).sum();
//!         Ok(ObjectiveScore::from_likelihood(nll))
//!     }
//! }
//!
//! let mut registry: EstimateRegistry = [
//!     Estimate::new("a", 0.1, -10., 10.),
//!     Estimate::new("b", -0.2, -10., 10.),
//! ]
//! .into_iter()
//! .collect();
//!
//! let settings = MetropolisSettings {
//!     length: 500,
//!     keep: 10,
//!     ..Default::default()
//! };
//! let rng = RngStream::new(rand_chacha::ChaCha8Rng::seed_from_u64(42));
//! let mut sampler =
//!     MetropolisSampler::new(settings, CovarianceMatrix::identity(2), rng).unwrap();
//!
//! let mut recorder = ChainRecorder::new();
//! sampler
//!     .run(&mut registry, &mut Quadratic(vec![]), &mut recorder)
//!     .unwrap();
//! assert_eq!(recorder.links.len(), 51);
//! ```

pub(crate) mod adapt_strategy;
pub(crate) mod chain;
pub(crate) mod cholesky;
pub(crate) mod covariance;
pub(crate) mod csv_report;
pub(crate) mod math;
pub(crate) mod model;
pub(crate) mod mpd;
pub(crate) mod proposal;
pub(crate) mod report;
pub(crate) mod rng;
pub(crate) mod sampler;
pub(crate) mod state;
pub(crate) mod stepsize;

pub use adapt_strategy::{AdaptationController, CovarianceStrategy, StepSizeStrategy};
pub use chain::{Chain, ChainLink};
pub use cholesky::{CholeskyError, CholeskyFactor};
pub use covariance::{
    condition_covariance, empirical_covariance, ConditionerOptions, CovarianceAdjustment,
};
pub use csv_report::CsvChainReporter;
pub use math::{zero_fun, CovarianceMatrix};
pub use model::{Estimate, EstimateRegistry, ObjectiveEvaluator, ObjectiveScore, ParameterRegistry};
pub use mpd::{MpdError, MpdFile};
pub use proposal::{fill_multivariate_normal, fill_multivariate_t, Proposal, ProposalKind};
pub use report::{ChainRecorder, ChainReporter, ChainSummary, NullReporter};
pub use rng::{RandomStream, RngStream};
pub use sampler::{
    MetropolisError, MetropolisSampler, MetropolisSettings, Phase, SettingsError,
    MAX_START_ATTEMPTS,
};
pub use state::{ResumeState, RunState};
pub use stepsize::{default_step_size, StepSizeAdaptMethod, MIN_STEP_SIZE, TARGET_ACCEPTANCE};

//! Interfaces to the model whose parameters are sampled.
//!
//! The sampler never looks inside the model. It reads the estimates from a
//! [`ParameterRegistry`], writes candidate values back into it and asks an
//! [`ObjectiveEvaluator`] for the objective score at those values.

use serde::{Deserialize, Serialize};

/// A free parameter of the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub label: String,
    pub value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Estimated by the optimiser but held constant during MCMC.
    #[serde(default)]
    pub mcmc_fixed: bool,
}

impl Estimate {
    pub fn new(label: impl Into<String>, value: f64, lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            label: label.into(),
            value,
            lower_bound,
            upper_bound,
            mcmc_fixed: false,
        }
    }

    pub fn fixed(mut self) -> Self {
        self.mcmc_fixed = true;
        self
    }

    pub fn range(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }

    /// Whether the sampler may move this parameter.
    pub fn is_active(&self) -> bool {
        !self.mcmc_fixed && self.upper_bound != self.lower_bound
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower_bound <= value && value <= self.upper_bound
    }
}

/// The components of an objective function evaluation.
///
/// Smaller scores are better; the score is a negative log posterior.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectiveScore {
    pub score: f64,
    pub prior: f64,
    pub likelihood: f64,
    pub penalty: f64,
    pub additional_prior: f64,
    pub jacobian: f64,
}

impl ObjectiveScore {
    /// A score consisting only of a likelihood term.
    pub fn from_likelihood(likelihood: f64) -> Self {
        Self {
            score: likelihood,
            likelihood,
            ..Default::default()
        }
    }
}

/// The ordered set of estimates.
///
/// The order defines the rows of the covariance matrix and the entries of
/// every candidate vector.
pub trait ParameterRegistry {
    fn estimates(&self) -> &[Estimate];

    /// Write `values` into the estimates, in registry order.
    fn set_values(&mut self, values: &[f64]);

    fn find(&self, label: &str) -> Option<usize> {
        self.estimates().iter().position(|e| e.label == label)
    }

    fn len(&self) -> usize {
        self.estimates().len()
    }

    fn is_empty(&self) -> bool {
        self.estimates().is_empty()
    }

    fn values(&self) -> Vec<f64> {
        self.estimates().iter().map(|e| e.value).collect()
    }

    fn labels(&self) -> Vec<String> {
        self.estimates().iter().map(|e| e.label.clone()).collect()
    }
}

/// Runs the model and scores the result.
///
/// Every error is fatal to the sampling run.
pub trait ObjectiveEvaluator {
    type Err: std::error::Error + Send + Sync + 'static;

    fn set_parameter_values(&mut self, values: &[f64]) -> Result<(), Self::Err>;

    fn run_full_iteration(&mut self) -> Result<(), Self::Err>;

    fn objective_score(&mut self) -> Result<ObjectiveScore, Self::Err>;

    /// Set the parameters, run the model and return the score.
    fn evaluate(&mut self, values: &[f64]) -> Result<ObjectiveScore, Self::Err> {
        self.set_parameter_values(values)?;
        self.run_full_iteration()?;
        self.objective_score()
    }
}

/// A [`ParameterRegistry`] holding its estimates in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimateRegistry {
    estimates: Vec<Estimate>,
}

impl EstimateRegistry {
    pub fn new(estimates: Vec<Estimate>) -> Self {
        Self { estimates }
    }

    pub fn push(&mut self, estimate: Estimate) {
        self.estimates.push(estimate);
    }

    pub fn get(&self, label: &str) -> Option<&Estimate> {
        self.estimates.iter().find(|e| e.label == label)
    }

    pub fn get_mut(&mut self, label: &str) -> Option<&mut Estimate> {
        self.estimates.iter_mut().find(|e| e.label == label)
    }
}

impl ParameterRegistry for EstimateRegistry {
    fn estimates(&self) -> &[Estimate] {
        &self.estimates
    }

    fn set_values(&mut self, values: &[f64]) {
        assert!(values.len() == self.estimates.len());
        self.estimates
            .iter_mut()
            .zip(values)
            .for_each(|(estimate, &value)| estimate.value = value);
    }
}

impl FromIterator<Estimate> for EstimateRegistry {
    fn from_iter<T: IntoIterator<Item = Estimate>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

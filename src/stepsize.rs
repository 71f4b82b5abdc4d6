use serde::{Deserialize, Serialize};

use crate::math::zero_fun;

/// Acceptance rate the ratio rule steers towards.
pub const TARGET_ACCEPTANCE: f64 = 0.24;

/// Smallest step size the ratio rule produces.
pub const MIN_STEP_SIZE: f64 = 1e-10;

/// How the step size reacts to the acceptance rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSizeAdaptMethod {
    /// Multiply by the ratio of the observed to the target acceptance rate.
    #[default]
    Ratio,
    /// Double above 50% acceptance, halve below 20%.
    DoubleHalf,
}

impl StepSizeAdaptMethod {
    /// The step size after an adaptation block.
    ///
    /// `lifetime_rate` is used by the double/half rule when nothing was
    /// accepted since the last adaptation.
    pub fn adapt(
        &self,
        step_size: f64,
        accepted_since_adapt: u64,
        attempted_since_adapt: u64,
        lifetime_rate: f64,
    ) -> f64 {
        debug_assert!(attempted_since_adapt > 0);
        let rate_since_adapt = accepted_since_adapt as f64 / attempted_since_adapt as f64;
        match self {
            StepSizeAdaptMethod::Ratio => {
                zero_fun(step_size * rate_since_adapt / TARGET_ACCEPTANCE, MIN_STEP_SIZE)
            }
            StepSizeAdaptMethod::DoubleHalf => {
                let rate = if accepted_since_adapt == 0 {
                    lifetime_rate
                } else {
                    rate_since_adapt
                };
                if rate > 0.5 {
                    step_size * 2.
                } else if rate < 0.2 {
                    step_size / 2.
                } else {
                    step_size
                }
            }
        }
    }
}

/// Initial step size for `active` free parameters.
pub fn default_step_size(active: usize) -> f64 {
    2.4 / (active as f64).sqrt()
}

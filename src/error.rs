//! Error taxonomy for the fitting engine.
//!
//! Every failure carries a process exit code so the `growth` binary can map
//! errors to statuses without inspecting messages:
//!
//! - `2` configuration / io problems (bad priors, missing columns, unreadable files)
//! - `3` data problems (a filter left nothing to fit)
//! - `4` sampling problems (the model has no finite starting point)
//!
//! Poor mixing is *not* an error. Divergences and low acceptance are recorded
//! on the [`Trace`](crate::fit::Trace) as [`NumericalWarning`]s and judged
//! later by the diagnostics predicates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrowthError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("sampling error: {0}")]
    Sampling(String),
}

impl GrowthError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    pub fn sampling(message: impl Into<String>) -> Self {
        Self::Sampling(message.into())
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            GrowthError::Configuration(_) | GrowthError::Io(_) => 2,
            GrowthError::Data(_) => 3,
            GrowthError::Sampling(_) => 4,
        }
    }
}

pub type Result<T> = std::result::Result<T, GrowthError>;

/// Non-fatal numerical conditions observed while sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NumericalWarning {
    /// Post-warmup transitions whose energy error exceeded the divergence threshold.
    Divergences { chain: usize, count: usize },
    /// Mean acceptance probability far below the adaptation target.
    LowAcceptance { chain: usize, mean_accept: f64, target: f64 },
    /// Transitions that stopped because the tree hit `max_treedepth`.
    TreeDepthSaturated { chain: usize, count: usize },
}

impl std::fmt::Display for NumericalWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumericalWarning::Divergences { chain, count } => {
                write!(f, "chain {chain}: {count} divergent transitions")
            }
            NumericalWarning::LowAcceptance {
                chain,
                mean_accept,
                target,
            } => write!(
                f,
                "chain {chain}: mean acceptance {mean_accept:.3} well below target {target:.3}"
            ),
            NumericalWarning::TreeDepthSaturated { chain, count } => {
                write!(f, "chain {chain}: {count} transitions saturated the tree depth")
            }
        }
    }
}

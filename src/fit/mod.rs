//! Bayesian fitting and model comparison.
//!
//! Responsibilities:
//!
//! - assemble a model graph from a declarative `ModelSpec` and design arrays
//! - sample its posterior with NUTS (parallel chains)
//! - derive posterior predictions, summaries and acceptance checks
//! - rank competing fits with information criteria

pub mod adapt;
pub mod builder;
pub mod comparison;
pub mod diagnostics;
pub mod driver;
pub mod predictive;
pub mod sampler;
pub mod trace;

pub use builder::{ModelGraph, build};
pub use comparison::{ComparisonResult, ComparisonRow, compare};
pub use diagnostics::{SummaryRow, SummaryTable, evaluate_estimate, evaluate_threshold, summarize};
pub use driver::run;
pub use predictive::{PosteriorPredictive, predict, sample_posterior_predictive};
pub use sampler::LogDensity;
pub use trace::{ChainDraws, Trace, TraceStore};

//! Numerical utilities: log densities, posterior statistics and least squares.

pub mod density;
pub mod ols;
pub mod stats;

pub use ols::*;

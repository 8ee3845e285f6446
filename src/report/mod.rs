//! Reporting utilities: residuals against the posterior mean curve and
//! plain-text tables for the terminal.

mod format;

pub use format::*;

use crate::error::{GrowthError, Result};
use crate::fit::PosteriorPredictive;

/// Observed minus posterior-mean fitted value for one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Residual {
    pub index: usize,
    pub observed: f64,
    pub fitted: f64,
    pub residual: f64,
}

/// Residuals of `y` against the posterior mean of `fitted`.
pub fn compute_residuals(y: &[f64], fitted: &PosteriorPredictive) -> Result<Vec<Residual>> {
    if y.len() != fitted.n_observations() {
        return Err(GrowthError::config(format!(
            "{} observations but {} fitted values",
            y.len(),
            fitted.n_observations()
        )));
    }
    let means = fitted.mean();
    y.iter()
        .zip(means)
        .enumerate()
        .map(|(index, (&observed, fitted))| {
            if !fitted.is_finite() {
                return Err(GrowthError::sampling(format!(
                    "non-finite fitted value for observation {index}"
                )));
            }
            Ok(Residual {
                index,
                observed,
                fitted,
                residual: observed - fitted,
            })
        })
        .collect()
}

/// Posterior predictive mean and highest-density interval at one observed age.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictiveBand {
    pub index: usize,
    pub age: f64,
    pub mean: f64,
    pub hdi_low: f64,
    pub hdi_high: f64,
}

/// One band per age in `x`, from posterior predictive draws at those ages.
pub fn predictive_bands(
    x: &[f64],
    predictive: &PosteriorPredictive,
    prob: f64,
) -> Result<Vec<PredictiveBand>> {
    if x.len() != predictive.n_observations() {
        return Err(GrowthError::config(format!(
            "{} ages but {} predictive columns",
            x.len(),
            predictive.n_observations()
        )));
    }
    let means = predictive.mean();
    let intervals = predictive.hdi(prob);
    Ok(x
        .iter()
        .zip(means)
        .zip(intervals)
        .enumerate()
        .map(|(index, ((&age, mean), (hdi_low, hdi_high)))| PredictiveBand {
            index,
            age,
            mean,
            hdi_low,
            hdi_high,
        })
        .collect())
}

/// Share of observations inside their predictive band.
pub fn band_coverage(y: &[f64], bands: &[PredictiveBand]) -> f64 {
    if bands.is_empty() {
        return 0.0;
    }
    let inside = y
        .iter()
        .zip(bands)
        .filter(|(v, b)| **v >= b.hdi_low && **v <= b.hdi_high)
        .count();
    inside as f64 / bands.len() as f64
}

/// Root-mean-square of the residuals; zero when there are none.
pub fn rmse(residuals: &[Residual]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    let sse: f64 = residuals.iter().map(|r| r.residual * r.residual).sum();
    (sse / residuals.len() as f64).sqrt()
}

/// The `top_n` residuals with the largest magnitude, largest first.
pub fn largest_residuals(residuals: &[Residual], top_n: usize) -> Vec<Residual> {
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| b.residual.abs().total_cmp(&a.residual.abs()));
    sorted.truncate(top_n);
    sorted
}

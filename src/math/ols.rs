//! Ordinary least squares for chain initialisation.
//!
//! Linear models start their chains at the least-squares line so warmup does
//! not have to walk in from the prior. The design is tiny (two columns), so an
//! SVD solve is cheap and tolerates near-collinear ages.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Looser tolerances only if the strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Least-squares line through `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub intercept: f64,
    pub slope: f64,
    /// Residual standard deviation (`n - 2` denominator, floored at a small positive value).
    pub residual_sd: f64,
}

pub fn fit_line(x: &[f64], y: &[f64]) -> Option<LineFit> {
    let n = x.len();
    if n < 2 || y.len() != n {
        return None;
    }
    let mut design = DMatrix::zeros(n, 2);
    for (i, &xi) in x.iter().enumerate() {
        design[(i, 0)] = 1.0;
        design[(i, 1)] = xi;
    }
    let beta = solve_least_squares(&design, &DVector::from_column_slice(y))?;
    let (intercept, slope) = (beta[0], beta[1]);

    let rss: f64 = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let r = yi - intercept - slope * xi;
            r * r
        })
        .sum();
    let dof = (n.saturating_sub(2)).max(1) as f64;
    Some(LineFit {
        intercept,
        slope,
        residual_sd: (rss / dof).sqrt().max(1e-3),
    })
}

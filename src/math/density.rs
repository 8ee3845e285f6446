//! Log densities (and their partial derivatives) used by the model graph.
//!
//! Normalising constants are kept so pointwise log-likelihoods are comparable
//! across models. The standard normal log-CDF switches to its asymptotic
//! expansion deep in the lower tail where `erfc` underflows.

use statrs::function::erf::erfc;
use statrs::function::gamma::ln_gamma;

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;
const LN_2: f64 = std::f64::consts::LN_2;

/// Below this point `log Φ(u)` uses the asymptotic series.
const LOG_NDTR_TAIL: f64 = -30.0;

pub fn normal_lpdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let r = (x - mu) / sigma;
    -0.5 * r * r - sigma.ln() - LN_SQRT_2PI
}

/// `(log p, ∂/∂mu, ∂/∂sigma)`.
pub fn normal_lpdf_grad(x: f64, mu: f64, sigma: f64) -> (f64, f64, f64) {
    let r = (x - mu) / sigma;
    let lp = -0.5 * r * r - sigma.ln() - LN_SQRT_2PI;
    (lp, r / sigma, (r * r - 1.0) / sigma)
}

fn student_t_norm(nu: f64) -> f64 {
    ln_gamma(0.5 * (nu + 1.0)) - ln_gamma(0.5 * nu) - 0.5 * (nu * std::f64::consts::PI).ln()
}

pub fn student_t_lpdf(x: f64, nu: f64, mu: f64, sigma: f64) -> f64 {
    let r = (x - mu) / sigma;
    student_t_norm(nu) - sigma.ln() - 0.5 * (nu + 1.0) * (r * r / nu).ln_1p()
}

/// `(log p, ∂/∂mu, ∂/∂sigma)`.
pub fn student_t_lpdf_grad(x: f64, nu: f64, mu: f64, sigma: f64) -> (f64, f64, f64) {
    let r = (x - mu) / sigma;
    let lp = student_t_norm(nu) - sigma.ln() - 0.5 * (nu + 1.0) * (r * r / nu).ln_1p();
    let w = (nu + 1.0) / (nu + r * r);
    (lp, w * r / sigma, (w * r * r - 1.0) / sigma)
}

/// Half-Student-t on `x >= 0`.
pub fn half_student_t_lpdf(x: f64, nu: f64, scale: f64) -> f64 {
    if x < 0.0 {
        return f64::NEG_INFINITY;
    }
    LN_2 + student_t_lpdf(x, nu, 0.0, scale)
}

/// `(log p, ∂/∂x)` for the half-Student-t.
pub fn half_student_t_lpdf_grad(x: f64, nu: f64, scale: f64) -> (f64, f64) {
    if x < 0.0 {
        return (f64::NEG_INFINITY, 0.0);
    }
    let (lp, d_mu, _) = student_t_lpdf_grad(x, nu, 0.0, scale);
    // ∂/∂x = -∂/∂mu for a location family.
    (LN_2 + lp, -d_mu)
}

/// `log Φ(u)` for the standard normal CDF.
pub fn log_ndtr(u: f64) -> f64 {
    if u < LOG_NDTR_TAIL {
        let u2 = u * u;
        -0.5 * u2 - (-u).ln() - LN_SQRT_2PI + (-1.0 / u2 + 3.0 / (u2 * u2)).ln_1p()
    } else {
        (0.5 * erfc(-u / std::f64::consts::SQRT_2)).ln()
    }
}

/// `(log Φ(u), φ(u) / Φ(u))`.
pub fn log_ndtr_grad(u: f64) -> (f64, f64) {
    let log_cdf = log_ndtr(u);
    let log_pdf = -0.5 * u * u - LN_SQRT_2PI;
    (log_cdf, (log_pdf - log_cdf).exp())
}

pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

pub fn log_mean_exp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    log_sum_exp(values) - (values.len() as f64).ln()
}

//! Model comparison with information criteria.
//!
//! All scores are expected log pointwise predictive densities (elpd): higher
//! is better and rank 0 is the best model. Two criteria are available:
//!
//! - PSIS-LOO: leave-one-out via Pareto-smoothed importance sampling. The
//!   fitted Pareto shape `k̂` per observation flags unreliable estimates.
//! - WAIC: `lppd - p_waic` with the posterior variance of each observation's
//!   log-likelihood as penalty.
//!
//! Relative weights come from stacking, pseudo-BMA or Bayesian-bootstrap
//! pseudo-BMA.

use std::collections::BTreeSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp1};
use serde::{Deserialize, Serialize};

use crate::domain::{InformationCriterion, WeightingMethod};
use crate::error::{GrowthError, Result};
use crate::fit::trace::Trace;
use crate::math::density::{log_mean_exp, log_sum_exp};

/// Pareto shape above which a LOO estimate is considered unreliable.
pub const PARETO_K_THRESHOLD: f64 = 0.7;
/// Pointwise log-likelihood variance above which WAIC is considered unreliable.
pub const WAIC_VARIANCE_THRESHOLD: f64 = 0.4;

const BOOTSTRAP_SAMPLES: usize = 1000;
const BOOTSTRAP_SEED: u64 = 42;
const STACKING_MAX_ITERS: usize = 2000;
const STACKING_TOLERANCE: f64 = 1e-10;

/// Criterion of one model with its pointwise contributions.
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionEstimate {
    pub elpd: f64,
    pub p_eff: f64,
    pub standard_error: f64,
    pub pointwise: Vec<f64>,
    /// Per-observation Pareto shape (LOO only).
    pub pareto_k: Vec<f64>,
    pub warning: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub model: String,
    pub elpd: f64,
    pub p_eff: f64,
    pub standard_error: f64,
    /// `elpd(best) - elpd(this)`; zero for the best model.
    pub elpd_diff: f64,
    /// Standard error of `elpd_diff`.
    pub dse: f64,
    pub weight: f64,
    pub rank: usize,
    pub warning: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub criterion: InformationCriterion,
    pub method: WeightingMethod,
    /// Sorted by rank.
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonResult {
    pub fn best(&self) -> Option<&ComparisonRow> {
        self.rows.first()
    }

    pub fn get(&self, model: &str) -> Option<&ComparisonRow> {
        self.rows.iter().find(|r| r.model == model)
    }
}

fn population_variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

fn standard_error(pointwise: &[f64]) -> f64 {
    (pointwise.len() as f64 * population_variance(pointwise)).sqrt()
}

/// Fit a generalized Pareto distribution to sorted exceedances (Zhang & Stephens),
/// with weak shrinkage of `k` towards 0.5. Returns `(k, sigma)`.
fn gpd_fit(sorted: &[f64]) -> (f64, f64) {
    const PRIOR_BS: f64 = 3.0;
    const PRIOR_K: f64 = 10.0;

    let n = sorted.len();
    let nf = n as f64;
    let m = 30 + (nf.sqrt() as usize);
    let quartile = sorted[((nf / 4.0 + 0.5) as usize).saturating_sub(1)];
    let largest = sorted[n - 1];

    let b: Vec<f64> = (1..=m)
        .map(|j| {
            let raw = 1.0 - (m as f64 / (j as f64 - 0.5)).sqrt();
            raw / (PRIOR_BS * quartile) + 1.0 / largest
        })
        .collect();
    let k: Vec<f64> = b
        .iter()
        .map(|&bj| sorted.iter().map(|&x| (-bj * x).ln_1p()).sum::<f64>() / nf)
        .collect();
    let len_scale: Vec<f64> = b
        .iter()
        .zip(&k)
        .map(|(&bj, &kj)| nf * ((-(bj / kj)).ln() - kj - 1.0))
        .collect();

    let mut weights: Vec<f64> = len_scale
        .iter()
        .map(|&li| 1.0 / len_scale.iter().map(|&lj| (lj - li).exp()).sum::<f64>())
        .collect();
    let mut b_kept: Vec<f64> = Vec::with_capacity(m);
    let mut w_kept: Vec<f64> = Vec::with_capacity(m);
    for (&w, &bj) in weights.iter().zip(&b) {
        if w >= 10.0 * f64::EPSILON && w.is_finite() {
            w_kept.push(w);
            b_kept.push(bj);
        }
    }
    let total: f64 = w_kept.iter().sum();
    weights = w_kept.iter().map(|w| w / total).collect();

    let b_post: f64 = b_kept.iter().zip(&weights).map(|(b, w)| b * w).sum();
    let k_post = sorted.iter().map(|&x| (-b_post * x).ln_1p()).sum::<f64>() / nf;
    let sigma = -k_post / b_post;
    let k_post = (nf * k_post + PRIOR_K * 0.5) / (nf + PRIOR_K);
    (k_post, sigma)
}

/// Generalized Pareto quantile function.
fn gpd_quantile(p: f64, k: f64, sigma: f64) -> f64 {
    if sigma <= 0.0 {
        return f64::NAN;
    }
    if k.abs() < f64::EPSILON {
        -sigma * (-p).ln_1p()
    } else {
        ((-k) * (-p).ln_1p()).exp_m1() / k * sigma
    }
}

/// Pareto-smooth the log importance weights of one observation in place.
///
/// Returns the fitted shape `k̂`; weights come back normalised on the log scale.
fn psis_smooth(log_weights: &mut [f64]) -> f64 {
    let s = log_weights.len();
    let max = log_weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    for w in log_weights.iter_mut() {
        *w -= max;
    }

    let tail_len_target = (0.2 * s as f64).min(3.0 * (s as f64).sqrt()).ceil() as usize;
    let mut sorted = log_weights.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let cutoff_index = s.saturating_sub(tail_len_target + 1);
    let cutoff = sorted[cutoff_index].max(f64::MIN_POSITIVE.ln());
    let exp_cutoff = cutoff.exp();

    let mut tail: Vec<usize> = (0..s).filter(|&i| log_weights[i] > cutoff).collect();
    let k = if tail.len() <= 4 {
        f64::INFINITY
    } else {
        tail.sort_by(|&a, &b| log_weights[a].total_cmp(&log_weights[b]));
        let exceedances: Vec<f64> = tail
            .iter()
            .map(|&i| log_weights[i].exp() - exp_cutoff)
            .collect();
        let (k, sigma) = gpd_fit(&exceedances);
        if k.is_finite() {
            let m = tail.len() as f64;
            for (rank, &i) in tail.iter().enumerate() {
                let p = (rank as f64 + 0.5) / m;
                let smoothed = (gpd_quantile(p, k, sigma) + exp_cutoff).ln();
                log_weights[i] = smoothed.min(0.0);
            }
        }
        k
    };

    let norm = log_sum_exp(log_weights);
    for w in log_weights.iter_mut() {
        *w -= norm;
    }
    k
}

/// PSIS-LOO estimate of a trace.
pub fn loo(trace: &Trace) -> CriterionEstimate {
    let n = trace.n_observations();
    let mut pointwise = Vec::with_capacity(n);
    let mut lppd = 0.0;
    let mut pareto_k = Vec::with_capacity(n);
    for i in 0..n {
        let ll = trace.observation_log_likelihood(i);
        lppd += log_mean_exp(&ll);
        let mut log_weights: Vec<f64> = ll.iter().map(|v| -v).collect();
        let k = psis_smooth(&mut log_weights);
        let terms: Vec<f64> = log_weights.iter().zip(&ll).map(|(w, l)| w + l).collect();
        pointwise.push(log_sum_exp(&terms));
        pareto_k.push(k);
    }
    let elpd: f64 = pointwise.iter().sum();
    let warning = pareto_k.iter().any(|k| *k > PARETO_K_THRESHOLD);
    CriterionEstimate {
        elpd,
        p_eff: lppd - elpd,
        standard_error: standard_error(&pointwise),
        pointwise,
        pareto_k,
        warning,
    }
}

/// WAIC estimate of a trace.
pub fn waic(trace: &Trace) -> CriterionEstimate {
    let n = trace.n_observations();
    let mut pointwise = Vec::with_capacity(n);
    let mut p_eff = 0.0;
    let mut warning = false;
    for i in 0..n {
        let ll = trace.observation_log_likelihood(i);
        let penalty = crate::math::stats::variance(&ll);
        warning |= penalty > WAIC_VARIANCE_THRESHOLD;
        p_eff += penalty;
        pointwise.push(log_mean_exp(&ll) - penalty);
    }
    CriterionEstimate {
        elpd: pointwise.iter().sum(),
        p_eff,
        standard_error: standard_error(&pointwise),
        pointwise,
        pareto_k: Vec::new(),
        warning,
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

/// Weights maximising `Σ_i log Σ_k w_k exp(elpd_ik)` over the simplex.
///
/// Multiplicative (EM) updates keep the iterate on the simplex.
fn stacking_weights(pointwise: &[Vec<f64>]) -> Vec<f64> {
    let k = pointwise.len();
    let n = pointwise[0].len();
    // Row-wise rescaled densities.
    let dens: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let max = (0..k).map(|m| pointwise[m][i]).fold(f64::NEG_INFINITY, f64::max);
            (0..k).map(|m| (pointwise[m][i] - max).exp()).collect()
        })
        .collect();

    let mut w = vec![1.0 / k as f64; k];
    for _ in 0..STACKING_MAX_ITERS {
        let mut next = vec![0.0; k];
        for row in &dens {
            let mix: f64 = row.iter().zip(&w).map(|(d, w)| d * w).sum();
            if mix <= 0.0 {
                continue;
            }
            for m in 0..k {
                next[m] += w[m] * row[m] / mix;
            }
        }
        let total: f64 = next.iter().sum();
        for v in next.iter_mut() {
            *v /= total;
        }
        let change: f64 = next.iter().zip(&w).map(|(a, b)| (a - b).abs()).sum();
        w = next;
        if change < STACKING_TOLERANCE {
            break;
        }
    }
    w
}

/// Pseudo-BMA with Bayesian-bootstrap regularisation of the elpd estimates.
fn pseudo_bma_plus_weights(pointwise: &[Vec<f64>], seed: u64) -> Vec<f64> {
    let k = pointwise.len();
    let n = pointwise[0].len();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut acc = vec![0.0; k];
    let mut alpha = vec![0.0; n];
    for _ in 0..BOOTSTRAP_SAMPLES {
        for a in alpha.iter_mut() {
            *a = Exp1.sample(&mut rng);
        }
        let total: f64 = alpha.iter().sum();
        let z: Vec<f64> = pointwise
            .iter()
            .map(|elpd| n as f64 * elpd.iter().zip(&alpha).map(|(e, a)| e * a / total).sum::<f64>())
            .collect();
        for (a, w) in acc.iter_mut().zip(softmax(&z)) {
            *a += w;
        }
    }
    acc.iter().map(|a| a / BOOTSTRAP_SAMPLES as f64).collect()
}

/// Rank named traces by `criterion` and weight them by `method`.
pub fn compare(
    traces: &[(String, &Trace)],
    criterion: InformationCriterion,
    method: WeightingMethod,
) -> Result<ComparisonResult> {
    if traces.len() < 2 {
        return Err(GrowthError::config(format!(
            "model comparison needs at least two traces, got {}",
            traces.len()
        )));
    }
    let mut seen = BTreeSet::new();
    for (name, _) in traces {
        if !seen.insert(name.as_str()) {
            return Err(GrowthError::config(format!("duplicate model name `{name}`")));
        }
    }
    let n = traces[0].1.n_observations();
    if let Some((name, t)) = traces.iter().find(|(_, t)| t.n_observations() != n) {
        return Err(GrowthError::config(format!(
            "`{name}` has {} observations, `{}` has {n}",
            t.n_observations(),
            traces[0].0
        )));
    }

    let estimates: Vec<CriterionEstimate> = traces
        .iter()
        .map(|(_, t)| match criterion {
            InformationCriterion::Loo => loo(t),
            InformationCriterion::Waic => waic(t),
        })
        .collect();
    let pointwise: Vec<Vec<f64>> = estimates.iter().map(|e| e.pointwise.clone()).collect();
    let weights = match method {
        WeightingMethod::Stacking => stacking_weights(&pointwise),
        WeightingMethod::PseudoBma => {
            softmax(&estimates.iter().map(|e| e.elpd).collect::<Vec<_>>())
        }
        WeightingMethod::PseudoBmaPlus => pseudo_bma_plus_weights(&pointwise, BOOTSTRAP_SEED),
    };

    let mut order: Vec<usize> = (0..traces.len()).collect();
    order.sort_by(|&a, &b| estimates[b].elpd.total_cmp(&estimates[a].elpd));
    let best = order[0];

    let rows = order
        .iter()
        .enumerate()
        .map(|(rank, &m)| {
            let e = &estimates[m];
            let diffs: Vec<f64> = estimates[best]
                .pointwise
                .iter()
                .zip(&e.pointwise)
                .map(|(b, x)| b - x)
                .collect();
            ComparisonRow {
                model: traces[m].0.clone(),
                elpd: e.elpd,
                p_eff: e.p_eff,
                standard_error: e.standard_error,
                elpd_diff: estimates[best].elpd - e.elpd,
                dse: standard_error(&diffs),
                weight: weights[m],
                rank,
                warning: e.warning,
            }
        })
        .collect();

    log::info!(
        "compared {} models by {:?} ({:?} weights); best `{}`",
        traces.len(),
        criterion,
        method,
        traces[best].0
    );
    Ok(ComparisonResult {
        criterion,
        method,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::trace::tests::fixture;
    use rand_distr::Normal;

    /// Trace whose pointwise log-likelihood is Gaussian noise around `centre`.
    fn synthetic(centre: f64, spread: f64, n_obs: usize, seed: u64) -> Trace {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, spread).unwrap();
        let draws = 400;
        let ll: Vec<Vec<f64>> = (0..draws)
            .map(|_| (0..n_obs).map(|_| centre + noise.sample(&mut rng)).collect())
            .collect();
        fixture(vec![vec![vec![0.0, 1.0, 1.0]; draws]], vec![ll])
    }

    #[test]
    fn identical_traces_tie_with_equal_weights() {
        let t = synthetic(-1.0, 0.1, 20, 1);
        for method in [
            WeightingMethod::Stacking,
            WeightingMethod::PseudoBma,
            WeightingMethod::PseudoBmaPlus,
        ] {
            let res = compare(
                &[("a".into(), &t), ("b".into(), &t)],
                InformationCriterion::Loo,
                method,
            )
            .unwrap();
            assert_eq!(res.rows[0].elpd, res.rows[1].elpd);
            for row in &res.rows {
                assert!((row.weight - 0.5).abs() < 1e-9, "{method:?}: {}", row.weight);
            }
        }
    }

    #[test]
    fn better_model_ranks_first() {
        let good = synthetic(-1.0, 0.1, 30, 2);
        let bad = synthetic(-2.0, 0.1, 30, 3);
        for criterion in [InformationCriterion::Loo, InformationCriterion::Waic] {
            let res = compare(
                &[("bad".into(), &bad), ("good".into(), &good)],
                criterion,
                WeightingMethod::PseudoBma,
            )
            .unwrap();
            assert_eq!(res.best().unwrap().model, "good");
            assert_eq!(res.get("good").unwrap().rank, 0);
            assert_eq!(res.get("good").unwrap().elpd_diff, 0.0);
            assert!(res.get("bad").unwrap().elpd_diff > 20.0);
            let total: f64 = res.rows.iter().map(|r| r.weight).sum();
            assert!((total - 1.0).abs() < 1e-12);
            assert!(res.get("good").unwrap().weight > 0.99);
        }
    }

    #[test]
    fn comparison_input_is_validated() {
        let t = synthetic(-1.0, 0.1, 10, 4);
        let other = synthetic(-1.0, 0.1, 11, 5);
        let single = compare(
            &[("a".into(), &t)],
            InformationCriterion::Waic,
            WeightingMethod::Stacking,
        );
        assert_eq!(single.unwrap_err().exit_code(), 2);
        let dup = compare(
            &[("a".into(), &t), ("a".into(), &t)],
            InformationCriterion::Waic,
            WeightingMethod::Stacking,
        );
        assert!(dup.unwrap_err().to_string().contains("duplicate"));
        let ragged = compare(
            &[("a".into(), &t), ("b".into(), &other)],
            InformationCriterion::Waic,
            WeightingMethod::Stacking,
        );
        assert!(ragged.is_err());
    }

    #[test]
    fn well_behaved_weights_have_small_pareto_k() {
        let t = synthetic(-1.0, 0.1, 5, 6);
        let est = loo(&t);
        assert!(est.pareto_k.iter().all(|k| *k < PARETO_K_THRESHOLD));
        assert!(!est.warning);
        assert!(est.p_eff.abs() < 0.1);
    }

    #[test]
    fn heavy_tailed_weights_raise_warning() {
        let mut rng = StdRng::seed_from_u64(8);
        let noise = Normal::new(0.0, 6.0).unwrap();
        let ll: Vec<Vec<f64>> = (0..400).map(|_| vec![noise.sample(&mut rng)]).collect();
        let t = fixture(vec![vec![vec![0.0, 1.0, 1.0]; 400]], vec![ll]);
        let est = loo(&t);
        assert!(est.warning);
        assert!(waic(&t).warning);
    }

    #[test]
    fn gpd_quantile_is_exponential_at_zero_shape() {
        let q = gpd_quantile(0.5, 0.0, 2.0);
        assert!((q - 2.0 * std::f64::consts::LN_2).abs() < 1e-12);
    }
}

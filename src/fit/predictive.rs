//! Posterior predictive engine.
//!
//! Substitutes every retained draw into the response mean (linear or growth
//! curve) at new explanatory values, and optionally draws fresh observations
//! from the fitted response distribution.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, StandardNormal, StudentT};
use statrs::distribution::{ContinuousCDF, Normal as StdNormal};

use crate::domain::{FactorLevels, Likelihood, ModelSpec, ModelType};
use crate::error::{GrowthError, Result};
use crate::fit::builder::{STUDENT_T_NU, factor_mu_name, factor_offset_name, factor_sigma_name};
use crate::fit::trace::Trace;
use crate::math::stats;
use crate::models::evaluate;

/// Predictions as `chain × draw × observation`.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorPredictive {
    values: Vec<Vec<Vec<f64>>>,
    n_observations: usize,
}

impl PosteriorPredictive {
    pub fn values(&self) -> &[Vec<Vec<f64>>] {
        &self.values
    }

    pub fn n_observations(&self) -> usize {
        self.n_observations
    }

    /// All draws (chains concatenated) for observation `i`.
    pub fn observation(&self, i: usize) -> Vec<f64> {
        self.values.iter().flatten().map(|row| row[i]).collect()
    }

    /// Posterior mean per observation.
    pub fn mean(&self) -> Vec<f64> {
        (0..self.n_observations)
            .map(|i| stats::mean(&self.observation(i)))
            .collect()
    }

    /// Highest-density interval per observation.
    pub fn hdi(&self, prob: f64) -> Vec<(f64, f64)> {
        (0..self.n_observations)
            .map(|i| stats::hdi(&self.observation(i), prob))
            .collect()
    }
}

/// Effect of one factor on one coefficient: `mu + offset[level] * sigma`.
struct EffectColumns {
    mu: usize,
    sigma: usize,
    /// Per-observation offset column; empty for the population curve.
    offsets: Vec<usize>,
}

struct Columns {
    coefficients: Vec<(usize, Vec<EffectColumns>)>,
    sigma: usize,
}

fn column(trace: &Trace, name: &str) -> Result<usize> {
    trace.parameter_index(name).ok_or_else(|| {
        GrowthError::config(format!("trace has no parameter `{name}`"))
    })
}

fn resolve(
    trace: &Trace,
    spec: &ModelSpec,
    n: usize,
    levels: Option<&FactorLevels>,
) -> Result<Columns> {
    let fitted = trace.spec();
    if fitted.model_type != spec.model_type
        || (spec.model_type == ModelType::Nonlinear && fitted.growth_curve != spec.growth_curve)
    {
        return Err(GrowthError::config(format!(
            "trace was fit as {} {}, not {} {}",
            fitted.model_type.as_str(),
            fitted.growth_curve.as_str(),
            spec.model_type.as_str(),
            spec.growth_curve.as_str()
        )));
    }

    let mut coefficients = Vec::new();
    for &name in spec.required_parameters() {
        let base = column(trace, name)?;
        let mut effects = Vec::new();
        for factor in spec.factors.factors_for(name) {
            let mu = column(trace, &factor_mu_name(name, factor))?;
            let sigma = column(trace, &factor_sigma_name(name, factor))?;
            let offsets = match levels {
                None => Vec::new(),
                Some(levels) => {
                    let index = levels.get(factor).ok_or_else(|| {
                        GrowthError::config(format!("no level indices supplied for `{factor}`"))
                    })?;
                    if index.indices.len() != n {
                        return Err(GrowthError::config(format!(
                            "factor `{factor}` has {} level indices for {n} ages",
                            index.indices.len()
                        )));
                    }
                    index
                        .indices
                        .iter()
                        .map(|&level| {
                            trace
                                .parameter_index(&factor_offset_name(name, factor, level))
                                .ok_or_else(|| {
                                    GrowthError::config(format!(
                                        "level {level} of `{factor}` was not present when fitting"
                                    ))
                                })
                        })
                        .collect::<Result<Vec<_>>>()?
                }
            };
            effects.push(EffectColumns { mu, sigma, offsets });
        }
        coefficients.push((base, effects));
    }
    Ok(Columns {
        coefficients,
        sigma: column(trace, "sigma")?,
    })
}

fn response_mean(
    spec: &ModelSpec,
    cols: &Columns,
    draw: &[f64],
    i: usize,
    t: f64,
    params: &mut [f64],
) -> f64 {
    for (j, (base, effects)) in cols.coefficients.iter().enumerate() {
        let mut value = draw[*base];
        for eff in effects {
            value += draw[eff.mu];
            if let Some(&offset) = eff.offsets.get(i) {
                value += draw[offset] * draw[eff.sigma];
            }
        }
        params[j] = value;
    }
    match spec.model_type {
        ModelType::Linear => params[0] + params[1] * t,
        ModelType::Nonlinear => evaluate(spec.growth_curve, spec.biphasic_form, params, t),
    }
}

/// Mean response for every draw at ages `x`.
///
/// Without `levels` the population curve is returned: each factor contributes
/// its `mu` but no level offset.
pub fn predict(
    trace: &Trace,
    spec: &ModelSpec,
    x: &[f64],
    levels: Option<&FactorLevels>,
) -> Result<PosteriorPredictive> {
    let cols = resolve(trace, spec, x.len(), levels)?;
    let mut params = vec![0.0; cols.coefficients.len()];
    let values = trace
        .chains()
        .iter()
        .map(|chain| {
            chain
                .draws
                .iter()
                .map(|draw| {
                    x.iter()
                        .enumerate()
                        .map(|(i, &t)| response_mean(spec, &cols, draw, i, t, &mut params))
                        .collect()
                })
                .collect()
        })
        .collect();
    Ok(PosteriorPredictive {
        values,
        n_observations: x.len(),
    })
}

fn draw_response<R: Rng>(spec: &ModelSpec, mu: f64, sigma: f64, rng: &mut R) -> Result<f64> {
    match (spec.likelihood, spec.model_type) {
        (Likelihood::StudentT, _) => {
            let t = StudentT::new(STUDENT_T_NU)
                .map_err(|e| GrowthError::sampling(format!("student-t: {e}")))?;
            Ok(mu + sigma * t.sample(rng))
        }
        (Likelihood::Gaussian, ModelType::Linear) => {
            let z: f64 = StandardNormal.sample(rng);
            Ok(mu + sigma * z)
        }
        (Likelihood::Gaussian, ModelType::Nonlinear) => {
            Ok((mu + sigma * truncated_standard_normal(-mu / sigma, rng)?).max(0.0))
        }
    }
}

/// Above this lower bound the inverse-CDF draw loses precision.
const INVERSE_CDF_LIMIT: f64 = 8.0;

/// Standard normal draw conditioned on `z > alpha`.
///
/// Inverse CDF through the upper tail for moderate `alpha`, exponential
/// rejection (Robert 1995) beyond [`INVERSE_CDF_LIMIT`].
fn truncated_standard_normal<R: Rng>(alpha: f64, rng: &mut R) -> Result<f64> {
    if alpha < INVERSE_CDF_LIMIT {
        let std = StdNormal::new(0.0, 1.0)
            .map_err(|e| GrowthError::sampling(format!("normal: {e}")))?;
        let tail = std.cdf(-alpha);
        let u: f64 = rng.r#gen();
        let p = (u * tail).clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON);
        return Ok((-std.inverse_cdf(p)).max(alpha));
    }
    let lambda = 0.5 * (alpha + (alpha * alpha + 4.0).sqrt());
    let step = Exp::new(lambda).map_err(|e| GrowthError::sampling(format!("exponential: {e}")))?;
    loop {
        let z = alpha + step.sample(rng);
        let u: f64 = rng.r#gen();
        if u <= (-0.5 * (z - lambda) * (z - lambda)).exp() {
            return Ok(z);
        }
    }
}

/// New observations at ages `x`, one per retained draw.
pub fn sample_posterior_predictive(
    trace: &Trace,
    spec: &ModelSpec,
    x: &[f64],
    levels: Option<&FactorLevels>,
    seed: u64,
) -> Result<PosteriorPredictive> {
    let cols = resolve(trace, spec, x.len(), levels)?;
    let mut params = vec![0.0; cols.coefficients.len()];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut values = Vec::with_capacity(trace.n_chains());
    for chain in trace.chains() {
        let mut rows = Vec::with_capacity(chain.len());
        for draw in &chain.draws {
            let sigma = draw[cols.sigma];
            let row = x
                .iter()
                .enumerate()
                .map(|(i, &t)| {
                    let mu = response_mean(spec, &cols, draw, i, t, &mut params);
                    draw_response(spec, mu, sigma, &mut rng)
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }
        values.push(rows);
    }
    Ok(PosteriorPredictive {
        values,
        n_observations: x.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GrowthCurve, LevelIndex, PriorDescriptor};
    use crate::fit::trace::tests::fixture;
    use crate::fit::trace::{ChainDraws, Trace};

    fn linear_trace() -> Trace {
        fixture(
            vec![vec![vec![2.0, 3.0, 0.5], vec![2.2, 2.8, 0.5]]],
            vec![vec![vec![-1.0, -1.0], vec![-1.0, -1.0]]],
        )
    }

    fn hierarchical_trace() -> (ModelSpec, Trace) {
        let spec = ModelSpec::builder(ModelType::Nonlinear)
            .prior("l_inf", PriorDescriptor::normal(100.0, 10.0))
            .prior("k", PriorDescriptor::normal(0.5, 0.1))
            .prior("t0", PriorDescriptor::normal(0.0, 1.0))
            .factor("l_inf", "year")
            .build()
            .unwrap();
        let names: Vec<String> = [
            "l_inf",
            "l_inf_year_mu",
            "l_inf_year_sigma",
            "l_inf_year_offset[0]",
            "l_inf_year_offset[1]",
            "k",
            "t0",
            "sigma",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let draw = vec![100.0, 5.0, 2.0, 1.0, -1.0, 0.5, 0.0, 1.0];
        let chain = ChainDraws {
            draws: vec![draw],
            log_likelihood: vec![vec![-1.0]],
            accept_prob: vec![0.9],
            divergent: vec![false],
            tree_depth: vec![1],
            step_size: 0.1,
        };
        let trace = Trace::new(spec.clone(), names, vec![chain], vec![]).unwrap();
        (spec, trace)
    }

    #[test]
    fn linear_prediction_substitutes_each_draw() {
        let trace = linear_trace();
        let pred = predict(&trace, trace.spec(), &[0.0, 1.0], None).unwrap();
        assert_eq!(pred.values()[0][0], vec![2.0, 5.0]);
        assert_eq!(pred.values()[0][1], vec![2.2, 5.0]);
        let mean = pred.mean();
        assert!((mean[0] - 2.1).abs() < 1e-12);
    }

    #[test]
    fn population_curve_includes_factor_mean_only() {
        let (spec, trace) = hierarchical_trace();
        let t = 3.0;
        let pop = predict(&trace, &spec, &[t], None).unwrap();
        let expected = 105.0 * (1.0 - (-0.5_f64 * t).exp());
        assert!((pop.values()[0][0][0] - expected).abs() < 1e-9);

        let levels = FactorLevels::new().with(
            "year",
            LevelIndex {
                labels: vec!["2019".into(), "2020".into()],
                indices: vec![1],
            },
        );
        let by_level = predict(&trace, &spec, &[t], Some(&levels)).unwrap();
        let expected = 103.0 * (1.0 - (-0.5_f64 * t).exp());
        assert!((by_level.values()[0][0][0] - expected).abs() < 1e-9);
    }

    #[test]
    fn unknown_level_is_rejected() {
        let (spec, trace) = hierarchical_trace();
        let levels = FactorLevels::new().with(
            "year",
            LevelIndex {
                labels: vec!["a".into(), "b".into(), "c".into()],
                indices: vec![2],
            },
        );
        assert!(predict(&trace, &spec, &[1.0], Some(&levels)).is_err());
    }

    #[test]
    fn mismatched_spec_is_rejected() {
        let trace = linear_trace();
        let (spec, _) = hierarchical_trace();
        assert!(predict(&trace, &spec, &[1.0], None).is_err());
        let mut biphasic = spec;
        biphasic.growth_curve = GrowthCurve::Biphasic;
        let (_, nonlinear) = hierarchical_trace();
        assert!(predict(&nonlinear, &biphasic, &[1.0], None).is_err());
    }

    #[test]
    fn predictive_intervals_widen_with_probability() {
        let trace = fixture(
            vec![vec![vec![10.0, 1.0, 2.0]; 400]],
            vec![vec![vec![-1.0, -1.0]; 400]],
        );
        let pred =
            sample_posterior_predictive(&trace, trace.spec(), &[0.0, 5.0], None, 11).unwrap();
        let mean = pred.mean();
        let narrow = pred.hdi(0.5);
        let wide = pred.hdi(0.9);
        for i in 0..2 {
            let (lo, hi) = narrow[i];
            assert!(lo < mean[i] && mean[i] < hi, "obs {i}: {lo}..{hi} vs {}", mean[i]);
            assert!(wide[i].1 - wide[i].0 > hi - lo);
            assert!(wide[i].0 <= lo && hi <= wide[i].1);
        }
        assert!((mean[1] - 15.0).abs() < 0.5);
    }

    #[test]
    fn truncated_draws_keep_their_tail_mass() {
        let mut rng = StdRng::seed_from_u64(3);
        // E[Z | Z > a] = phi(a) / (1 - Phi(a)); about a + 1/a deep in the tail.
        for (alpha, expected, tol) in [
            (0.0, (2.0 / std::f64::consts::PI).sqrt(), 0.03),
            (5.0, 5.1865, 0.01),
            (30.0, 30.0 + 1.0 / 30.0, 0.002),
        ] {
            let draws: Vec<f64> = (0..4000)
                .map(|_| truncated_standard_normal(alpha, &mut rng).unwrap())
                .collect();
            assert!(draws.iter().all(|z| *z > alpha), "alpha {alpha}");
            let mean = stats::mean(&draws);
            assert!((mean - expected).abs() < tol, "alpha {alpha}: mean {mean}");
        }
    }

    #[test]
    fn predictive_mean_far_below_zero_stays_positive() {
        let mut rng = StdRng::seed_from_u64(5);
        let spec = hierarchical_trace().0;
        let draws: Vec<f64> = (0..2000)
            .map(|_| draw_response(&spec, -30.0, 1.0, &mut rng).unwrap())
            .collect();
        assert!(draws.iter().all(|v| *v > 0.0));
        let mean = stats::mean(&draws);
        assert!(mean > 0.02 && mean < 0.05, "mean {mean}");
    }

    #[test]
    fn truncated_predictive_draws_are_positive_and_seeded() {
        let (spec, trace) = hierarchical_trace();
        let ages = [-5.0, 0.0, 0.1, 4.0];
        let a = sample_posterior_predictive(&trace, &spec, &ages, None, 7).unwrap();
        let b = sample_posterior_predictive(&trace, &spec, &ages, None, 7).unwrap();
        assert_eq!(a, b);
        assert!(a.values()[0][0].iter().all(|v| *v >= 0.0));
    }
}

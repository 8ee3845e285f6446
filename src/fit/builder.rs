//! Model builder: declarative [`ModelSpec`] + design arrays -> [`ModelGraph`].
//!
//! The graph owns everything the sampler needs:
//!
//! - a flat unconstrained parameter vector (bounded parameters go through
//!   log / logit transforms, Jacobian included)
//! - the joint log density and its analytic gradient
//! - the constrained parameter names written into the trace
//! - per-observation log-likelihood for model comparison
//!
//! Parameter layout, in order: for every regression coefficient its base
//! value followed by the random intercepts declared on it
//! (`{p}_{factor}_mu`, `{p}_{factor}_sigma`, `{p}_{factor}_offset[level]`),
//! then the shared dispersion `sigma`.

use crate::domain::{FactorLevels, Likelihood, ModelSpec, ModelType, PriorDescriptor};
use crate::error::{GrowthError, Result};
use crate::fit::sampler::LogDensity;
use crate::math::density::{
    half_student_t_lpdf_grad, log_ndtr_grad, normal_lpdf_grad, student_t_lpdf_grad,
};
use crate::math::{fit_line, stats};
use crate::models::evaluate_with_gradient;

/// `sigma ~ HalfStudentT(3, 10)` for every model type.
const SIGMA_NU: f64 = 3.0;
const SIGMA_SCALE: f64 = 10.0;
/// Degrees of freedom of the random-intercept scale prior.
const FACTOR_SIGMA_NU: f64 = 4.0;
/// Degrees of freedom of the Student-t response.
pub const STUDENT_T_NU: f64 = 3.0;

pub fn factor_mu_name(parameter: &str, factor: &str) -> String {
    format!("{parameter}_{factor}_mu")
}

pub fn factor_sigma_name(parameter: &str, factor: &str) -> String {
    format!("{parameter}_{factor}_sigma")
}

pub fn factor_offset_name(parameter: &str, factor: &str, level: usize) -> String {
    format!("{parameter}_{factor}_offset[{level}]")
}

/// Support of a parameter and its map from the real line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Free,
    Lower(f64),
    Upper(f64),
    Interval(f64, f64),
}

/// Result of mapping one unconstrained coordinate.
#[derive(Debug, Clone, Copy)]
struct Mapped {
    value: f64,
    log_jacobian: f64,
    /// `d log|J| / dz`.
    d_log_jacobian: f64,
    /// `dθ / dz`.
    jacobian: f64,
}

fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

impl Bound {
    pub fn from_limits(lower: f64, upper: f64) -> Self {
        match (lower.is_finite(), upper.is_finite()) {
            (false, false) => Bound::Free,
            (true, false) => Bound::Lower(lower),
            (false, true) => Bound::Upper(upper),
            (true, true) => Bound::Interval(lower, upper),
        }
    }

    fn map(self, z: f64) -> Mapped {
        match self {
            Bound::Free => Mapped {
                value: z,
                log_jacobian: 0.0,
                d_log_jacobian: 0.0,
                jacobian: 1.0,
            },
            Bound::Lower(a) => {
                let e = z.exp();
                Mapped {
                    value: a + e,
                    log_jacobian: z,
                    d_log_jacobian: 1.0,
                    jacobian: e,
                }
            }
            Bound::Upper(b) => {
                let e = z.exp();
                Mapped {
                    value: b - e,
                    log_jacobian: z,
                    d_log_jacobian: 1.0,
                    jacobian: -e,
                }
            }
            Bound::Interval(a, b) => {
                let width = b - a;
                let s = 1.0 / (1.0 + (-z).exp());
                Mapped {
                    value: a + width * s,
                    log_jacobian: width.ln() - softplus(-z) - softplus(z),
                    d_log_jacobian: 1.0 - 2.0 * s,
                    jacobian: width * s * (1.0 - s),
                }
            }
        }
    }

    pub fn constrain(self, z: f64) -> f64 {
        self.map(z).value
    }

    /// Inverse of [`constrain`](Self::constrain); `theta` must lie strictly inside the support.
    pub fn unconstrain(self, theta: f64) -> f64 {
        match self {
            Bound::Free => theta,
            Bound::Lower(a) => (theta - a).ln(),
            Bound::Upper(b) => (b - theta).ln(),
            Bound::Interval(a, b) => {
                let s = (theta - a) / (b - a);
                (s / (1.0 - s)).ln()
            }
        }
    }

    /// Move `value` strictly inside the support.
    fn interior(self, value: f64, scale: f64) -> f64 {
        let margin = (0.1 * scale).max(1e-6);
        match self {
            Bound::Free => value,
            Bound::Lower(a) if value > a => value,
            Bound::Lower(a) => a + margin,
            Bound::Upper(b) if value < b => value,
            Bound::Upper(b) => b - margin,
            Bound::Interval(a, b) if value > a && value < b => value,
            Bound::Interval(a, b) => 0.5 * (a + b),
        }
    }
}

#[derive(Debug, Clone)]
struct RandomIntercept {
    mu_slot: usize,
    sigma_slot: usize,
    offset_start: usize,
    n_levels: usize,
    /// Prior scale inherited from the base parameter.
    scale: f64,
    levels: Vec<usize>,
}

#[derive(Debug, Clone)]
struct Term {
    prior: PriorDescriptor,
    slot: usize,
    effects: Vec<RandomIntercept>,
}

#[derive(Default)]
struct Layout {
    names: Vec<String>,
    bounds: Vec<Bound>,
}

impl Layout {
    fn push(&mut self, name: String, bound: Bound) -> usize {
        self.names.push(name);
        self.bounds.push(bound);
        self.names.len() - 1
    }
}

/// An assembled model: joint density over an unconstrained parameter vector.
#[derive(Debug, Clone)]
pub struct ModelGraph {
    spec: ModelSpec,
    x: Vec<f64>,
    y: Vec<f64>,
    terms: Vec<Term>,
    sigma_slot: usize,
    names: Vec<String>,
    bounds: Vec<Bound>,
    init: Vec<f64>,
}

/// Assemble the model described by `spec` over the design `(x, y, levels)`.
///
/// Fails with a configuration error when a required prior is missing, when a
/// declared factor has no (or mis-sized) level indices, or when the design
/// arrays are empty, mismatched or non-finite.
pub fn build(spec: &ModelSpec, x: &[f64], y: &[f64], levels: &FactorLevels) -> Result<ModelGraph> {
    spec.validate()?;
    if x.len() != y.len() {
        return Err(GrowthError::config(format!(
            "explanatory and response arrays differ in length ({} vs {})",
            x.len(),
            y.len()
        )));
    }
    if x.is_empty() {
        return Err(GrowthError::config("cannot build a model without observations"));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(GrowthError::config("design arrays contain non-finite values"));
    }
    let n = x.len();

    let mut layout = Layout::default();
    let mut terms = Vec::new();
    for &name in spec.required_parameters() {
        let prior = spec.priors.require(name)?.clone();
        let (lo, hi) = prior.bounds();
        let slot = layout.push(name.to_string(), Bound::from_limits(lo, hi));

        let mut effects = Vec::new();
        for factor in spec.factors.factors_for(name) {
            let index = levels.get(factor).ok_or_else(|| {
                GrowthError::config(format!(
                    "factor `{factor}` on `{name}` has no level indices in the dataset"
                ))
            })?;
            if index.indices.len() != n {
                return Err(GrowthError::config(format!(
                    "factor `{factor}` has {} level indices for {n} observations",
                    index.indices.len()
                )));
            }
            let n_levels = index.n_levels();
            if let Some(&bad) = index.indices.iter().find(|&&l| l >= n_levels) {
                return Err(GrowthError::config(format!(
                    "factor `{factor}` level index {bad} out of range ({n_levels} levels)"
                )));
            }

            let mu_slot = layout.push(factor_mu_name(name, factor), Bound::Free);
            let sigma_slot = layout.push(factor_sigma_name(name, factor), Bound::Lower(0.0));
            let offset_start = layout.names.len();
            for level in 0..n_levels {
                layout.push(factor_offset_name(name, factor, level), Bound::Free);
            }
            effects.push(RandomIntercept {
                mu_slot,
                sigma_slot,
                offset_start,
                n_levels,
                scale: prior.sigma,
                levels: index.indices.clone(),
            });
        }
        terms.push(Term {
            prior,
            slot,
            effects,
        });
    }
    let sigma_slot = layout.push("sigma".to_string(), Bound::Lower(0.0));

    let mut graph = ModelGraph {
        spec: spec.clone(),
        x: x.to_vec(),
        y: y.to_vec(),
        terms,
        sigma_slot,
        names: layout.names,
        bounds: layout.bounds,
        init: Vec::new(),
    };
    graph.init = graph.default_initial_position();
    log::debug!(
        "built {} {} model: {} parameters, {} observations",
        spec.model_type.as_str(),
        spec.growth_curve.as_str(),
        graph.names.len(),
        n
    );
    Ok(graph)
}

impl ModelGraph {
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn n_observations(&self) -> usize {
        self.y.len()
    }

    /// Constrained parameter names, one per coordinate.
    pub fn parameter_names(&self) -> &[String] {
        &self.names
    }

    pub fn constrain(&self, z: &[f64]) -> Vec<f64> {
        self.bounds.iter().zip(z).map(|(b, &v)| b.constrain(v)).collect()
    }

    pub fn unconstrain(&self, theta: &[f64]) -> Vec<f64> {
        self.bounds.iter().zip(theta).map(|(b, &v)| b.unconstrain(v)).collect()
    }

    /// Log-likelihood of every observation at constrained parameters `theta`.
    pub fn pointwise_log_likelihood(&self, theta: &[f64]) -> Vec<f64> {
        let k = self.terms.len();
        let mut params = vec![0.0; k];
        let mut dmu = vec![0.0; k];
        let sigma = theta[self.sigma_slot];
        (0..self.y.len())
            .map(|i| {
                self.effective_parameters(theta, i, &mut params);
                let mu = self.mean_with_gradient(&params, self.x[i], &mut dmu);
                self.observation_lpdf(self.y[i], mu, sigma).0
            })
            .collect()
    }

    fn effective_parameters(&self, theta: &[f64], i: usize, out: &mut [f64]) {
        for (j, term) in self.terms.iter().enumerate() {
            let mut value = theta[term.slot];
            for eff in &term.effects {
                let offset = theta[eff.offset_start + eff.levels[i]];
                value += theta[eff.mu_slot] + offset * theta[eff.sigma_slot];
            }
            out[j] = value;
        }
    }

    fn mean_with_gradient(&self, params: &[f64], t: f64, dmu: &mut [f64]) -> f64 {
        match self.spec.model_type {
            ModelType::Linear => {
                dmu[0] = 1.0;
                dmu[1] = t;
                params[0] + params[1] * t
            }
            ModelType::Nonlinear => evaluate_with_gradient(
                self.spec.growth_curve,
                self.spec.biphasic_form,
                params,
                t,
                dmu,
            ),
        }
    }

    /// `(log p(y | mu, sigma), ∂/∂mu, ∂/∂sigma)` for one observation.
    fn observation_lpdf(&self, y: f64, mu: f64, sigma: f64) -> (f64, f64, f64) {
        match (self.spec.likelihood, self.spec.model_type) {
            (Likelihood::StudentT, _) => student_t_lpdf_grad(y, STUDENT_T_NU, mu, sigma),
            (Likelihood::Gaussian, ModelType::Linear) => normal_lpdf_grad(y, mu, sigma),
            (Likelihood::Gaussian, ModelType::Nonlinear) => {
                // Lengths are positive: renormalise the normal on (0, inf).
                let (lp, d_mu, d_sigma) = normal_lpdf_grad(y, mu, sigma);
                let (log_cdf, mills) = log_ndtr_grad(mu / sigma);
                (
                    lp - log_cdf,
                    d_mu - mills / sigma,
                    d_sigma + mills * mu / (sigma * sigma),
                )
            }
        }
    }

    /// Joint log density at constrained `theta`; writes `∂/∂θ` into `grad`.
    fn log_density(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
        grad.fill(0.0);
        let mut lp = 0.0;

        for term in &self.terms {
            // Truncation constants do not depend on θ and are dropped.
            let (l, d_mu, _) = normal_lpdf_grad(theta[term.slot], term.prior.mu, term.prior.sigma);
            lp += l;
            grad[term.slot] -= d_mu;
            for eff in &term.effects {
                let (l, d_mu, _) = normal_lpdf_grad(theta[eff.mu_slot], 0.0, eff.scale);
                lp += l;
                grad[eff.mu_slot] -= d_mu;
                let (l, d_x) =
                    half_student_t_lpdf_grad(theta[eff.sigma_slot], FACTOR_SIGMA_NU, eff.scale);
                lp += l;
                grad[eff.sigma_slot] += d_x;
                for slot in eff.offset_start..eff.offset_start + eff.n_levels {
                    let (l, d_mu, _) = normal_lpdf_grad(theta[slot], 0.0, 1.0);
                    lp += l;
                    grad[slot] -= d_mu;
                }
            }
        }

        let sigma = theta[self.sigma_slot];
        let (l, d_x) = half_student_t_lpdf_grad(sigma, SIGMA_NU, SIGMA_SCALE);
        lp += l;
        grad[self.sigma_slot] += d_x;

        let k = self.terms.len();
        let mut params = vec![0.0; k];
        let mut dmu = vec![0.0; k];
        for i in 0..self.y.len() {
            self.effective_parameters(theta, i, &mut params);
            let mu = self.mean_with_gradient(&params, self.x[i], &mut dmu);
            let (l, d_mu, d_sigma) = self.observation_lpdf(self.y[i], mu, sigma);
            lp += l;
            grad[self.sigma_slot] += d_sigma;
            for (j, term) in self.terms.iter().enumerate() {
                let g = d_mu * dmu[j];
                grad[term.slot] += g;
                for eff in &term.effects {
                    let offset = eff.offset_start + eff.levels[i];
                    grad[eff.mu_slot] += g;
                    grad[offset] += g * theta[eff.sigma_slot];
                    grad[eff.sigma_slot] += g * theta[offset];
                }
            }
        }
        lp
    }

    /// Deterministic starting point on the unconstrained scale.
    ///
    /// Linear models start at the least-squares line; nonlinear models at the
    /// prior means with zero random effects.
    fn default_initial_position(&self) -> Vec<f64> {
        let mut theta = vec![0.0; self.names.len()];
        for term in &self.terms {
            theta[term.slot] = term.prior.mu;
            for eff in &term.effects {
                theta[eff.mu_slot] = 0.0;
                theta[eff.sigma_slot] = 0.1 * eff.scale;
            }
        }

        let fallback_sigma = stats::sd(&self.y).max(1.0);
        theta[self.sigma_slot] = match self.spec.model_type {
            ModelType::Linear => match fit_line(&self.x, &self.y) {
                Some(line) => {
                    theta[self.terms[0].slot] = line.intercept;
                    theta[self.terms[1].slot] = line.slope;
                    line.residual_sd
                }
                None => fallback_sigma,
            },
            ModelType::Nonlinear => {
                let params: Vec<f64> = self.terms.iter().map(|t| t.prior.mu).collect();
                let mut scratch = vec![0.0; params.len()];
                let residuals: Vec<f64> = self
                    .x
                    .iter()
                    .zip(&self.y)
                    .map(|(&t, &y)| y - self.mean_with_gradient(&params, t, &mut scratch))
                    .collect();
                let rms = (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64)
                    .sqrt();
                if rms.is_finite() && rms > 1e-3 { rms } else { fallback_sigma }
            }
        };

        let scales: Vec<f64> = self
            .names
            .iter()
            .enumerate()
            .map(|(slot, _)| {
                self.terms
                    .iter()
                    .find(|t| t.slot == slot)
                    .map(|t| t.prior.sigma)
                    .unwrap_or(1.0)
            })
            .collect();
        self.bounds
            .iter()
            .zip(theta.iter().zip(&scales))
            .map(|(b, (&v, &s))| b.unconstrain(b.interior(v, s)))
            .collect()
    }
}

impl LogDensity for ModelGraph {
    fn dim(&self) -> usize {
        self.names.len()
    }

    fn logp_and_grad(&self, z: &[f64], grad: &mut [f64]) -> f64 {
        let mapped: Vec<Mapped> = self.bounds.iter().zip(z).map(|(b, &v)| b.map(v)).collect();
        let theta: Vec<f64> = mapped.iter().map(|m| m.value).collect();
        if theta.iter().any(|v| !v.is_finite()) || theta[self.sigma_slot] <= 0.0 {
            grad.fill(0.0);
            return f64::NEG_INFINITY;
        }

        let lp = self.log_density(&theta, grad);
        if !lp.is_finite() || grad.iter().any(|g| !g.is_finite()) {
            grad.fill(0.0);
            return f64::NEG_INFINITY;
        }

        let mut log_jacobian = 0.0;
        for (g, m) in grad.iter_mut().zip(&mapped) {
            *g = *g * m.jacobian + m.d_log_jacobian;
            log_jacobian += m.log_jacobian;
        }
        lp + log_jacobian
    }

    fn initial_position(&self) -> Vec<f64> {
        self.init.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BiphasicForm, GrowthCurve, LevelIndex, ModelSpecBuilder};

    fn linear_spec(likelihood: Likelihood) -> ModelSpec {
        ModelSpec::builder(ModelType::Linear)
            .likelihood(likelihood)
            .prior("intercept", PriorDescriptor::normal(0.0, 10.0))
            .prior("slope", PriorDescriptor::truncated(1.0, 5.0, Some(0.0), None))
            .build()
            .unwrap()
    }

    fn biphasic_builder() -> ModelSpecBuilder {
        ModelSpec::builder(ModelType::Nonlinear)
            .growth_curve(GrowthCurve::Biphasic)
            .prior("l_inf", PriorDescriptor::truncated(180.0, 40.0, Some(0.0), None))
            .prior("k", PriorDescriptor::truncated(0.3, 0.2, Some(0.0), Some(2.0)))
            .prior("t0", PriorDescriptor::normal(-1.0, 1.0))
            .prior("h", PriorDescriptor::truncated(0.3, 0.2, Some(0.0), Some(1.0)))
            .prior("t_h", PriorDescriptor::normal(5.0, 2.0))
    }

    fn ages() -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..12).map(|i| 0.5 + i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &t)| 170.0 * (1.0 - (-0.3 * (t + 1.0)).exp()) + (i % 3) as f64 * 4.0 - 4.0)
            .collect();
        (x, y)
    }

    fn year_levels(n: usize) -> FactorLevels {
        let years: Vec<String> = (0..n).map(|i| (2015 + i % 3).to_string()).collect();
        FactorLevels::new().with("year", LevelIndex::from_values(&years))
    }

    fn assert_gradient_matches(graph: &ModelGraph, z: &[f64]) {
        let mut grad = vec![0.0; graph.dim()];
        let lp = graph.logp_and_grad(z, &mut grad);
        assert!(lp.is_finite());
        let mut scratch = vec![0.0; graph.dim()];
        for j in 0..z.len() {
            let h = 1e-5;
            let mut up = z.to_vec();
            let mut down = z.to_vec();
            up[j] += h;
            down[j] -= h;
            let fd = (graph.logp_and_grad(&up, &mut scratch)
                - graph.logp_and_grad(&down, &mut scratch))
                / (2.0 * h);
            assert!(
                (fd - grad[j]).abs() < 1e-4 * fd.abs().max(1.0),
                "{}: analytic {} vs fd {fd}",
                graph.parameter_names()[j],
                grad[j]
            );
        }
    }

    #[test]
    fn missing_prior_names_the_parameter() {
        let spec = ModelSpec::builder(ModelType::Nonlinear)
            .prior("l_inf", PriorDescriptor::normal(180.0, 40.0))
            .prior("t0", PriorDescriptor::normal(-1.0, 1.0))
            .build()
            .unwrap();
        let (x, y) = ages();
        let err = build(&spec, &x, &y, &FactorLevels::new()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("`k`"));
    }

    #[test]
    fn factor_without_levels_is_rejected() {
        let spec = biphasic_builder().factor("l_inf", "year").build().unwrap();
        let (x, y) = ages();
        let err = build(&spec, &x, &y, &FactorLevels::new()).unwrap_err();
        assert!(err.to_string().contains("year"));

        let short = FactorLevels::new().with("year", LevelIndex::from_values(&["a", "b"]));
        assert!(build(&spec, &x, &y, &short).is_err());
    }

    #[test]
    fn mismatched_design_is_rejected() {
        let spec = linear_spec(Likelihood::Gaussian);
        assert!(build(&spec, &[1.0, 2.0], &[1.0], &FactorLevels::new()).is_err());
        assert!(build(&spec, &[], &[], &FactorLevels::new()).is_err());
        assert!(build(&spec, &[1.0, f64::NAN], &[1.0, 2.0], &FactorLevels::new()).is_err());
    }

    #[test]
    fn parameter_layout_expands_random_intercepts() {
        let spec = biphasic_builder().factor("l_inf", "year").build().unwrap();
        let (x, y) = ages();
        let graph = build(&spec, &x, &y, &year_levels(x.len())).unwrap();
        let names = graph.parameter_names();
        assert_eq!(names[0], "l_inf");
        assert_eq!(names[1], "l_inf_year_mu");
        assert_eq!(names[2], "l_inf_year_sigma");
        assert_eq!(names[3], "l_inf_year_offset[0]");
        assert_eq!(names[5], "l_inf_year_offset[2]");
        assert_eq!(names[6], "k");
        assert_eq!(names.last().map(String::as_str), Some("sigma"));
        assert_eq!(graph.dim(), 3 + 3 + 4 + 1);
    }

    #[test]
    fn bounds_round_trip() {
        for bound in [
            Bound::Free,
            Bound::Lower(0.0),
            Bound::Upper(3.0),
            Bound::Interval(-1.0, 2.0),
        ] {
            for &z in &[-2.0, 0.0, 1.5] {
                let theta = bound.constrain(z);
                assert!((bound.unconstrain(theta) - z).abs() < 1e-9, "{bound:?}");
            }
        }
        assert!(Bound::Interval(0.0, 1.0).constrain(40.0) <= 1.0);
    }

    #[test]
    fn linear_initial_point_is_least_squares() {
        let x: Vec<f64> = (0..20).map(f64::from).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|v| 2.0 + 3.0 * v + if v % 2.0 == 0.0 { 0.5 } else { -0.5 })
            .collect();
        let graph =
            build(&linear_spec(Likelihood::Gaussian), &x, &y, &FactorLevels::new()).unwrap();
        let theta = graph.constrain(&graph.initial_position());
        assert!((theta[1] - 3.0).abs() < 0.05);
        assert!(theta[2] > 0.0);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let (x, y) = ages();
        let levels = year_levels(x.len());
        let graphs = vec![
            build(&linear_spec(Likelihood::Gaussian), &x, &y, &FactorLevels::new()).unwrap(),
            build(&linear_spec(Likelihood::StudentT), &x, &y, &FactorLevels::new()).unwrap(),
            build(
                &biphasic_builder().factor("l_inf", "year").build().unwrap(),
                &x,
                &y,
                &levels,
            )
            .unwrap(),
            build(
                &biphasic_builder()
                    .likelihood(Likelihood::StudentT)
                    .biphasic_form(BiphasicForm::DecayInside)
                    .factor("k", "year")
                    .build()
                    .unwrap(),
                &x,
                &y,
                &levels,
            )
            .unwrap(),
        ];
        for graph in &graphs {
            let z: Vec<f64> = graph
                .initial_position()
                .iter()
                .enumerate()
                .map(|(j, v)| v + 0.05 * ((j % 5) as f64 - 2.0))
                .collect();
            assert_gradient_matches(graph, &z);
        }
    }

    #[test]
    fn pointwise_log_likelihood_has_one_entry_per_observation() {
        let (x, y) = ages();
        let spec = biphasic_builder().build().unwrap();
        let graph = build(&spec, &x, &y, &FactorLevels::new()).unwrap();
        let theta = graph.constrain(&graph.initial_position());
        let ll = graph.pointwise_log_likelihood(&theta);
        assert_eq!(ll.len(), x.len());
        assert!(ll.iter().all(|v| v.is_finite()));
    }
}

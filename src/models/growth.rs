//! Von Bertalanffy growth curves.
//!
//! - monophasic: `L(t) = l_inf * (1 - exp(-k (t - t0)))`
//! - biphasic:   `L(t) = l_inf * A(t) * (1 - exp(-k a (t - t0)))` with
//!   `A(t) = 1 - h / (1 + (t - t_h)^2)` and `a = 1` (decay outside, canonical)
//!   or `a = A(t)` (decay inside), see [`BiphasicForm`].
//!
//! Parameters are passed as slices in [`GrowthCurve::parameter_names`] order so
//! the sampler and the predictive engine can stay generic over the curve.

use crate::domain::{BiphasicForm, GrowthCurve};

pub fn monophasic(l_inf: f64, k: f64, t0: f64, t: f64) -> f64 {
    l_inf * -(-k * (t - t0)).exp_m1()
}

pub fn biphasic(l_inf: f64, k: f64, t0: f64, h: f64, t_h: f64, form: BiphasicForm, t: f64) -> f64 {
    let d = t - t_h;
    let a = 1.0 - h / (1.0 + d * d);
    let rate = match form {
        BiphasicForm::DecayOutside => k,
        BiphasicForm::DecayInside => k * a,
    };
    l_inf * a * -(-rate * (t - t0)).exp_m1()
}

/// Monophasic curve over many ages.
pub fn monophasic_curve(l_inf: f64, k: f64, t0: f64, ages: &[f64]) -> Vec<f64> {
    ages.iter().map(|&t| monophasic(l_inf, k, t0, t)).collect()
}

/// Biphasic curve over many ages.
pub fn biphasic_curve(
    l_inf: f64,
    k: f64,
    t0: f64,
    h: f64,
    t_h: f64,
    form: BiphasicForm,
    ages: &[f64],
) -> Vec<f64> {
    ages.iter()
        .map(|&t| biphasic(l_inf, k, t0, h, t_h, form, t))
        .collect()
}

/// Evaluate `curve` at age `t`.
///
/// # Panics
/// Panics if `params` is shorter than `curve.parameter_names().len()`.
pub fn evaluate(curve: GrowthCurve, form: BiphasicForm, params: &[f64], t: f64) -> f64 {
    match curve {
        GrowthCurve::Monophasic => monophasic(params[0], params[1], params[2], t),
        GrowthCurve::Biphasic => {
            biphasic(params[0], params[1], params[2], params[3], params[4], form, t)
        }
    }
}

/// Evaluate `curve` at `t` and write `∂L/∂param` into `grad`.
///
/// Returns the curve value. `grad` must have one slot per curve parameter.
pub fn evaluate_with_gradient(
    curve: GrowthCurve,
    form: BiphasicForm,
    params: &[f64],
    t: f64,
    grad: &mut [f64],
) -> f64 {
    let (l_inf, k, t0) = (params[0], params[1], params[2]);
    let dt = t - t0;
    match curve {
        GrowthCurve::Monophasic => {
            let e = (-k * dt).exp();
            let one_minus_e = -(-k * dt).exp_m1();
            grad[0] = one_minus_e;
            grad[1] = l_inf * dt * e;
            grad[2] = -l_inf * k * e;
            l_inf * one_minus_e
        }
        GrowthCurve::Biphasic => {
            let (h, t_h) = (params[3], params[4]);
            let d = t - t_h;
            let q = 1.0 + d * d;
            let a = 1.0 - h / q;
            let da_dh = -1.0 / q;
            let da_dth = -2.0 * h * d / (q * q);

            // Effective multiplier of k inside the exponential.
            let a_eff = match form {
                BiphasicForm::DecayOutside => 1.0,
                BiphasicForm::DecayInside => a,
            };
            let e = (-k * a_eff * dt).exp();
            let one_minus_e = -(-k * a_eff * dt).exp_m1();

            // ∂L/∂A, including the path through the exponent for the inside form.
            let dl_da = match form {
                BiphasicForm::DecayOutside => l_inf * one_minus_e,
                BiphasicForm::DecayInside => l_inf * one_minus_e + l_inf * a * k * dt * e,
            };

            grad[0] = a * one_minus_e;
            grad[1] = l_inf * a * a_eff * dt * e;
            grad[2] = -l_inf * a * k * a_eff * e;
            grad[3] = dl_da * da_dh;
            grad[4] = dl_da * da_dth;
            l_inf * a * one_minus_e
        }
    }
}

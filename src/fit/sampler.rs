//! No-U-Turn sampler over any [`LogDensity`].
//!
//! Multinomial NUTS: trajectory states are weighted by `exp(-H)`, subtrees are
//! merged uniformly and the top-level doubling uses biased progressive
//! sampling, so proposals favour the newest half of the trajectory. A subtree
//! whose energy error exceeds [`DIVERGENCE_THRESHOLD`] stops the transition
//! and is recorded as divergent.

use rand::Rng;
use rand_distr::StandardNormal;

use crate::domain::SamplerConfig;
use crate::error::{GrowthError, Result};
use crate::fit::adapt::{WindowedAdaptation, find_reasonable_step_size};

/// Maximum energy error before a trajectory is declared divergent.
pub const DIVERGENCE_THRESHOLD: f64 = 1000.0;

/// Attempts at finding a finite jittered starting point per chain.
const INIT_ATTEMPTS: usize = 100;
/// Half-width of the uniform jitter added to the initial point (unconstrained scale).
const INIT_JITTER: f64 = 0.2;

/// Differentiable log density on the real line.
pub trait LogDensity: Sync {
    fn dim(&self) -> usize;

    /// Log density at `q`; writes the gradient into `grad`.
    ///
    /// Returns `-inf` (gradient zeroed) outside the support.
    fn logp_and_grad(&self, q: &[f64], grad: &mut [f64]) -> f64;

    fn initial_position(&self) -> Vec<f64>;
}

/// Position, momentum and cached density of one phase-space point.
#[derive(Debug, Clone)]
pub struct State {
    pub q: Vec<f64>,
    pub p: Vec<f64>,
    pub logp: f64,
    pub grad: Vec<f64>,
}

impl State {
    pub fn at<M: LogDensity + ?Sized>(model: &M, q: Vec<f64>) -> Self {
        let mut grad = vec![0.0; q.len()];
        let logp = model.logp_and_grad(&q, &mut grad);
        let p = vec![0.0; q.len()];
        Self { q, p, logp, grad }
    }

    pub fn hamiltonian(&self, inv_mass: &[f64]) -> f64 {
        let kinetic: f64 = self
            .p
            .iter()
            .zip(inv_mass)
            .map(|(p, m)| p * p * m)
            .sum::<f64>()
            * 0.5;
        let h = kinetic - self.logp;
        if h.is_nan() { f64::INFINITY } else { h }
    }
}

/// One leapfrog step of size `direction * eps`.
pub fn leapfrog<M: LogDensity + ?Sized>(
    model: &M,
    state: &State,
    eps: f64,
    inv_mass: &[f64],
    direction: f64,
) -> State {
    let h = direction * eps;
    let mut next = state.clone();
    for i in 0..next.q.len() {
        next.p[i] += 0.5 * h * next.grad[i];
        next.q[i] += h * inv_mass[i] * next.p[i];
    }
    next.logp = model.logp_and_grad(&next.q, &mut next.grad);
    for i in 0..next.p.len() {
        next.p[i] += 0.5 * h * next.grad[i];
    }
    next
}

fn log_add_exp(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == f64::NEG_INFINITY {
        f64::NEG_INFINITY
    } else {
        max + ((a - max).exp() + (b - max).exp()).ln()
    }
}

fn is_turning(left: &State, right: &State, inv_mass: &[f64]) -> bool {
    let mut dot_left = 0.0;
    let mut dot_right = 0.0;
    for i in 0..left.q.len() {
        let dq = right.q[i] - left.q[i];
        dot_left += dq * inv_mass[i] * left.p[i];
        dot_right += dq * inv_mass[i] * right.p[i];
    }
    dot_left < 0.0 || dot_right < 0.0
}

/// Outcome of one NUTS transition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: State,
    /// Number of trajectory doublings.
    pub depth: usize,
    pub divergent: bool,
    pub accept_prob: f64,
    pub n_leapfrog: usize,
}

struct Tree {
    left: State,
    right: State,
    proposal: State,
    log_sum_weight: f64,
    n_leapfrog: usize,
    sum_accept_prob: f64,
    divergent: bool,
    turning: bool,
}

struct Integrator<'a, M: ?Sized> {
    model: &'a M,
    eps: f64,
    inv_mass: &'a [f64],
    h0: f64,
}

impl<M: LogDensity + ?Sized> Integrator<'_, M> {
    fn leaf(&self, edge: &State, direction: f64) -> Tree {
        let next = leapfrog(self.model, edge, self.eps, self.inv_mass, direction);
        let energy_error = next.hamiltonian(self.inv_mass) - self.h0;
        let divergent = !energy_error.is_finite() || energy_error > DIVERGENCE_THRESHOLD;
        let (log_weight, accept) = if energy_error.is_finite() {
            (-energy_error, (-energy_error).exp().min(1.0))
        } else {
            (f64::NEG_INFINITY, 0.0)
        };
        Tree {
            left: next.clone(),
            right: next.clone(),
            proposal: next,
            log_sum_weight: log_weight,
            n_leapfrog: 1,
            sum_accept_prob: accept,
            divergent,
            turning: false,
        }
    }

    fn build<R: Rng>(&self, edge: &State, depth: usize, direction: f64, rng: &mut R) -> Tree {
        if depth == 0 {
            return self.leaf(edge, direction);
        }
        let mut inner = self.build(edge, depth - 1, direction, rng);
        if inner.divergent || inner.turning {
            return inner;
        }
        let next_edge = if direction > 0.0 { &inner.right } else { &inner.left };
        let outer = self.build(next_edge, depth - 1, direction, rng);

        inner.n_leapfrog += outer.n_leapfrog;
        inner.sum_accept_prob += outer.sum_accept_prob;
        if outer.divergent || outer.turning {
            inner.divergent |= outer.divergent;
            inner.turning |= outer.turning;
            return inner;
        }

        let combined = log_add_exp(inner.log_sum_weight, outer.log_sum_weight);
        if rng.r#gen::<f64>() < (outer.log_sum_weight - combined).exp() {
            inner.proposal = outer.proposal;
        }
        inner.log_sum_weight = combined;
        if direction > 0.0 {
            inner.right = outer.right;
        } else {
            inner.left = outer.left;
        }
        inner.turning = is_turning(&inner.left, &inner.right, self.inv_mass);
        inner
    }
}

/// Run one NUTS transition from `current` (whose momentum is resampled).
pub fn transition<M: LogDensity + ?Sized, R: Rng>(
    model: &M,
    current: &State,
    eps: f64,
    inv_mass: &[f64],
    max_treedepth: usize,
    rng: &mut R,
) -> Transition {
    let mut start = current.clone();
    for (p, m) in start.p.iter_mut().zip(inv_mass) {
        let z: f64 = rng.sample(StandardNormal);
        *p = z / m.sqrt();
    }
    let integrator = Integrator {
        model,
        eps,
        inv_mass,
        h0: start.hamiltonian(inv_mass),
    };

    let mut tree = Tree {
        left: start.clone(),
        right: start.clone(),
        proposal: start,
        log_sum_weight: 0.0,
        n_leapfrog: 0,
        sum_accept_prob: 0.0,
        divergent: false,
        turning: false,
    };

    let mut depth = 0;
    while depth < max_treedepth {
        let direction = if rng.r#gen::<bool>() { 1.0 } else { -1.0 };
        let edge = if direction > 0.0 { &tree.right } else { &tree.left };
        let subtree = integrator.build(edge, depth, direction, rng);
        depth += 1;

        tree.n_leapfrog += subtree.n_leapfrog;
        tree.sum_accept_prob += subtree.sum_accept_prob;
        if subtree.divergent {
            tree.divergent = true;
            break;
        }
        if subtree.turning {
            break;
        }

        if rng.r#gen::<f64>() < (subtree.log_sum_weight - tree.log_sum_weight).exp() {
            tree.proposal = subtree.proposal;
        }
        tree.log_sum_weight = log_add_exp(tree.log_sum_weight, subtree.log_sum_weight);
        if direction > 0.0 {
            tree.right = subtree.right;
        } else {
            tree.left = subtree.left;
        }
        if is_turning(&tree.left, &tree.right, inv_mass) {
            break;
        }
    }

    Transition {
        state: tree.proposal,
        depth,
        divergent: tree.divergent,
        accept_prob: tree.sum_accept_prob / tree.n_leapfrog.max(1) as f64,
        n_leapfrog: tree.n_leapfrog,
    }
}

/// Retained draws of one chain, unconstrained scale.
#[derive(Debug, Clone)]
pub struct ChainSamples {
    pub draws: Vec<Vec<f64>>,
    pub accept_prob: Vec<f64>,
    pub divergent: Vec<bool>,
    pub tree_depth: Vec<usize>,
    pub step_size: f64,
    pub inv_mass: Vec<f64>,
}

fn initial_state<M: LogDensity + ?Sized, R: Rng>(
    model: &M,
    chain: usize,
    rng: &mut R,
) -> Result<State> {
    let base = model.initial_position();
    if base.len() != model.dim() {
        return Err(GrowthError::sampling(format!(
            "initial position has {} coordinates, model has {}",
            base.len(),
            model.dim()
        )));
    }
    for _ in 0..INIT_ATTEMPTS {
        let q: Vec<f64> = base
            .iter()
            .map(|v| v + rng.gen_range(-INIT_JITTER..INIT_JITTER))
            .collect();
        let state = State::at(model, q);
        if state.logp.is_finite() {
            return Ok(state);
        }
    }
    let state = State::at(model, base);
    if state.logp.is_finite() {
        Ok(state)
    } else {
        Err(GrowthError::sampling(format!(
            "chain {chain}: log density is not finite at the initial point"
        )))
    }
}

/// Warm up and sample one chain.
pub fn sample_chain<M: LogDensity + ?Sized, R: Rng>(
    model: &M,
    config: &SamplerConfig,
    chain: usize,
    rng: &mut R,
) -> Result<ChainSamples> {
    let dim = model.dim();
    let mut state = initial_state(model, chain, rng)?;
    let eps0 = find_reasonable_step_size(model, &state, &vec![1.0; dim]);
    let mut adaptation = WindowedAdaptation::new(dim, config.tune, config.target_accept, eps0);

    let mut warmup_divergences = 0;
    for iter in 0..config.tune {
        let step = transition(
            model,
            &state,
            adaptation.step_size(),
            adaptation.inv_mass(),
            config.max_treedepth,
            rng,
        );
        warmup_divergences += usize::from(step.divergent);
        state = step.state;
        if adaptation.update(iter, &state.q, step.accept_prob) {
            let eps = find_reasonable_step_size(model, &state, adaptation.inv_mass());
            adaptation.restart_step_size(eps);
        }
    }
    let eps = adaptation.final_step_size();
    let inv_mass = adaptation.inv_mass().to_vec();
    log::debug!(
        "chain {chain}: warmup done, step size {eps:.4}, {warmup_divergences} warmup divergences"
    );

    let mut out = ChainSamples {
        draws: Vec::with_capacity(config.draws),
        accept_prob: Vec::with_capacity(config.draws),
        divergent: Vec::with_capacity(config.draws),
        tree_depth: Vec::with_capacity(config.draws),
        step_size: eps,
        inv_mass: inv_mass.clone(),
    };
    for _ in 0..config.draws {
        let step = transition(model, &state, eps, &inv_mass, config.max_treedepth, rng);
        state = step.state;
        out.draws.push(state.q.clone());
        out.accept_prob.push(step.accept_prob);
        out.divergent.push(step.divergent);
        out.tree_depth.push(step.depth);
    }
    Ok(out)
}

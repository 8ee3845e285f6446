//! Warmup adaptation: dual-averaging step size and windowed diagonal mass matrix.
//!
//! Warmup is split into an initial fast buffer (step size only), a series of
//! doubling slow windows (step size + variance estimation) and a terminal fast
//! buffer. After each slow window the inverse mass matrix is replaced by the
//! regularised sample variance of the window and step-size adaptation restarts.

use crate::fit::sampler::{LogDensity, State, leapfrog};

const INIT_BUFFER: usize = 75;
const TERM_BUFFER: usize = 50;
const BASE_WINDOW: usize = 25;
/// Below this many warmup iterations only the step size is adapted.
const MIN_TUNE_FOR_MASS: usize = 20;

/// Nesterov dual averaging of `log(step size)` towards a target acceptance rate.
#[derive(Debug, Clone)]
pub struct DualAveraging {
    target: f64,
    mu: f64,
    log_eps: f64,
    log_eps_bar: f64,
    h_bar: f64,
    counter: f64,
}

impl DualAveraging {
    const GAMMA: f64 = 0.05;
    const T0: f64 = 10.0;
    const KAPPA: f64 = 0.75;

    pub fn new(eps: f64, target: f64) -> Self {
        Self {
            target,
            mu: (10.0 * eps).ln(),
            log_eps: eps.ln(),
            log_eps_bar: 0.0,
            h_bar: 0.0,
            counter: 0.0,
        }
    }

    pub fn update(&mut self, accept_prob: f64) {
        let accept = if accept_prob.is_finite() { accept_prob.clamp(0.0, 1.0) } else { 0.0 };
        self.counter += 1.0;
        let eta = 1.0 / (self.counter + Self::T0);
        self.h_bar = (1.0 - eta) * self.h_bar + eta * (self.target - accept);
        self.log_eps = self.mu - self.counter.sqrt() / Self::GAMMA * self.h_bar;
        let weight = self.counter.powf(-Self::KAPPA);
        self.log_eps_bar = weight * self.log_eps + (1.0 - weight) * self.log_eps_bar;
    }

    /// Step size to use for the next iteration.
    pub fn current(&self) -> f64 {
        self.log_eps.exp()
    }

    /// Averaged step size used after warmup.
    pub fn averaged(&self) -> f64 {
        if self.counter == 0.0 { self.current() } else { self.log_eps_bar.exp() }
    }
}

/// Streaming mean/variance (Welford).
#[derive(Debug, Clone)]
pub struct WelfordVariance {
    n: usize,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl WelfordVariance {
    pub fn new(dim: usize) -> Self {
        Self {
            n: 0,
            mean: vec![0.0; dim],
            m2: vec![0.0; dim],
        }
    }

    pub fn add(&mut self, x: &[f64]) {
        self.n += 1;
        let n = self.n as f64;
        for i in 0..x.len() {
            let delta = x[i] - self.mean[i];
            self.mean[i] += delta / n;
            self.m2[i] += delta * (x[i] - self.mean[i]);
        }
    }

    /// Sample variance shrunk towards `1e-3`.
    pub fn regularized_variance(&self) -> Vec<f64> {
        let n = self.n as f64;
        self.m2
            .iter()
            .map(|m2| {
                let var = if self.n > 1 { m2 / (n - 1.0) } else { 1.0 };
                (n / (n + 5.0)) * var + 1e-3 * (5.0 / (n + 5.0))
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.n = 0;
        self.mean.fill(0.0);
        self.m2.fill(0.0);
    }
}

/// First slow-window iteration and the end (exclusive) of every slow window.
pub fn slow_windows(tune: usize) -> (usize, Vec<usize>) {
    if tune < MIN_TUNE_FOR_MASS {
        return (tune, Vec::new());
    }
    let (init, term, base) = if INIT_BUFFER + TERM_BUFFER + BASE_WINDOW > tune {
        let init = (0.15 * tune as f64) as usize;
        let term = (0.1 * tune as f64) as usize;
        (init, term, tune - init - term)
    } else {
        (INIT_BUFFER, TERM_BUFFER, BASE_WINDOW)
    };

    let stop = tune - term;
    let mut ends = Vec::new();
    let mut start = init;
    let mut size = base;
    while start < stop {
        let mut end = start + size;
        if end + 2 * size > stop {
            end = stop;
        }
        ends.push(end);
        start = end;
        size *= 2;
    }
    (init, ends)
}

/// Full warmup schedule for one chain.
#[derive(Debug, Clone)]
pub struct WindowedAdaptation {
    step: DualAveraging,
    target: f64,
    variance: WelfordVariance,
    inv_mass: Vec<f64>,
    window_start: usize,
    window_ends: Vec<usize>,
}

impl WindowedAdaptation {
    pub fn new(dim: usize, tune: usize, target_accept: f64, eps: f64) -> Self {
        let (window_start, window_ends) = slow_windows(tune);
        Self {
            step: DualAveraging::new(eps, target_accept),
            target: target_accept,
            variance: WelfordVariance::new(dim),
            inv_mass: vec![1.0; dim],
            window_start,
            window_ends,
        }
    }

    pub fn step_size(&self) -> f64 {
        self.step.current()
    }

    pub fn inv_mass(&self) -> &[f64] {
        &self.inv_mass
    }

    /// Feed warmup iteration `iter`. Returns `true` when the mass matrix changed.
    pub fn update(&mut self, iter: usize, q: &[f64], accept_prob: f64) -> bool {
        self.step.update(accept_prob);

        let Some(&last) = self.window_ends.last() else {
            return false;
        };
        if iter < self.window_start || iter >= last {
            return false;
        }
        self.variance.add(q);
        if self.window_ends.contains(&(iter + 1)) {
            self.inv_mass = self.variance.regularized_variance();
            self.variance.reset();
            return true;
        }
        false
    }

    /// Restart dual averaging around a fresh step-size guess.
    pub fn restart_step_size(&mut self, eps: f64) {
        self.step = DualAveraging::new(eps, self.target);
    }

    pub fn final_step_size(&self) -> f64 {
        self.step.averaged()
    }
}

/// Heuristic initial step size: double or halve until the one-step
/// acceptance ratio crosses 0.8.
pub fn find_reasonable_step_size<M: LogDensity + ?Sized>(
    model: &M,
    state: &State,
    inv_mass: &[f64],
) -> f64 {
    let mut start = state.clone();
    for (p, m) in start.p.iter_mut().zip(inv_mass) {
        *p = 1.0 / m.sqrt();
    }
    let h0 = start.hamiltonian(inv_mass);
    let log_ratio = |eps: f64| {
        let next = leapfrog(model, &start, eps, inv_mass, 1.0);
        let delta = h0 - next.hamiltonian(inv_mass);
        if delta.is_finite() { delta } else { f64::NEG_INFINITY }
    };

    let threshold = 0.8_f64.ln();
    let mut eps = 1.0;
    let direction = if log_ratio(eps) > threshold { 1.0 } else { -1.0 };
    for _ in 0..100 {
        let ratio = log_ratio(eps);
        if direction > 0.0 && ratio <= threshold {
            break;
        }
        if direction < 0.0 && ratio > threshold {
            break;
        }
        eps = if direction > 0.0 { eps * 2.0 } else { eps * 0.5 };
    }
    eps.clamp(1e-8, 1e3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_cover_default_warmup() {
        let (start, ends) = slow_windows(1000);
        assert_eq!(start, 75);
        assert_eq!(ends, vec![100, 150, 250, 450, 950]);
    }

    #[test]
    fn short_warmup_uses_proportional_buffers() {
        let (start, ends) = slow_windows(100);
        assert_eq!((start, ends), (15, vec![90]));
        assert!(slow_windows(10).1.is_empty());
    }

    #[test]
    fn dual_averaging_shrinks_step_on_rejection() {
        let mut da = DualAveraging::new(1.0, 0.8);
        for _ in 0..50 {
            da.update(0.1);
        }
        assert!(da.current() < 1.0);
        let mut da = DualAveraging::new(0.01, 0.8);
        for _ in 0..50 {
            da.update(1.0);
        }
        assert!(da.averaged() > 0.01);
    }

    #[test]
    fn welford_matches_two_pass_variance() {
        let mut w = WelfordVariance::new(1);
        let xs = [1.0, 4.0, 2.0, 8.0, 5.0];
        for x in xs {
            w.add(&[x]);
        }
        let var = crate::math::stats::variance(&xs);
        let expected = (5.0 / 10.0) * var + 1e-3 * 0.5;
        assert!((w.regularized_variance()[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn mass_updates_once_per_window() {
        let mut adapt = WindowedAdaptation::new(1, 1000, 0.8, 0.1);
        let updates = (0..1000)
            .filter(|&i| adapt.update(i, &[i as f64 % 7.0], 0.8))
            .count();
        assert_eq!(updates, 5);
        assert!(adapt.inv_mass()[0] > 1.0);
    }
}

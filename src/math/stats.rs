//! Posterior summary statistics over `chain × draw` sample arrays.
//!
//! Convergence diagnostics follow the split-chain formulation: every chain is
//! cut in half so that within-chain drift shows up as between-chain variance.
//! The effective sample size uses Geyer's initial monotone positive sequence
//! to truncate the autocorrelation sum.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (`n - 1` denominator); zero for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (n - 1) as f64
}

pub fn sd(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Highest-density interval: the narrowest window holding `prob` of the draws.
pub fn hdi(values: &[f64], prob: f64) -> (f64, f64) {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let span = ((prob * n as f64).floor() as usize).min(n - 1);

    let mut best = (sorted[0], sorted[span]);
    for i in 1..(n - span) {
        let width = sorted[i + span] - sorted[i];
        if width < best.1 - best.0 {
            best = (sorted[i], sorted[i + span]);
        }
    }
    best
}

fn split_chains(chains: &[Vec<f64>]) -> Vec<&[f64]> {
    let n = chains.iter().map(Vec::len).min().unwrap_or(0);
    let half = n / 2;
    let mut out = Vec::with_capacity(chains.len() * 2);
    for chain in chains {
        out.push(&chain[..half]);
        out.push(&chain[half..2 * half]);
    }
    out
}

struct SplitMoments {
    means: Vec<f64>,
    within: f64,
    var_plus: f64,
}

fn split_moments(split: &[&[f64]]) -> Option<SplitMoments> {
    let m = split.len();
    let n = split.first().map(|c| c.len()).unwrap_or(0);
    if m < 2 || n < 2 {
        return None;
    }
    let means: Vec<f64> = split.iter().map(|c| mean(c)).collect();
    let within = split.iter().map(|c| variance(c)).sum::<f64>() / m as f64;
    let between_over_n = variance(&means);
    let var_plus = within * (n as f64 - 1.0) / n as f64 + between_over_n;
    Some(SplitMoments {
        means,
        within,
        var_plus,
    })
}

/// Split-chain potential scale reduction factor.
pub fn split_r_hat(chains: &[Vec<f64>]) -> f64 {
    let split = split_chains(chains);
    match split_moments(&split) {
        Some(mo) if mo.within > 1e-300 => (mo.var_plus / mo.within).sqrt(),
        Some(_) => 1.0,
        None => f64::NAN,
    }
}

/// Split-chain effective sample size.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    let split = split_chains(chains);
    let m = split.len();
    let n = split.first().map(|c| c.len()).unwrap_or(0);
    let total = (m * n) as f64;
    let Some(mo) = split_moments(&split) else {
        return total;
    };
    if n < 4 || mo.var_plus <= 1e-300 {
        return total;
    }

    // Mean (over split chains) autocovariance at `lag`, biased estimator.
    let acov = |lag: usize| -> f64 {
        let mut acc = 0.0;
        for (c, chain) in split.iter().enumerate() {
            let mu = mo.means[c];
            let mut s = 0.0;
            for t in 0..(n - lag) {
                s += (chain[t] - mu) * (chain[t + lag] - mu);
            }
            acc += s / n as f64;
        }
        acc / m as f64
    };
    let rho = |lag: usize| 1.0 - (mo.within - acov(lag)) / mo.var_plus;

    // Geyer: sum consecutive pairs while positive, forcing them non-increasing.
    let mut tau = -1.0;
    let mut prev_pair = f64::INFINITY;
    let mut lag = 0;
    while lag + 1 < n {
        let mut pair = if lag == 0 { 1.0 + rho(1) } else { rho(lag) + rho(lag + 1) };
        if pair <= 0.0 {
            break;
        }
        pair = pair.min(prev_pair);
        tau += 2.0 * pair;
        prev_pair = pair;
        lag += 2;
    }

    let ceiling = total * total.log10().max(1.0);
    (total / tau.max(1.0 / ceiling)).clamp(1.0, ceiling)
}

//! Inference driver: runs the sampler over a [`ModelGraph`] and assembles a [`Trace`].
//!
//! - one RNG per chain, seeded from `(seed, chain index)`
//! - chains run on a dedicated rayon pool of `cores_used` threads, results
//!   are collected in chain order (parallel and sequential runs agree)
//! - poor mixing is reported as [`NumericalWarning`]s on the trace

use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::domain::SamplerConfig;
use crate::error::{GrowthError, NumericalWarning, Result};
use crate::fit::builder::ModelGraph;
use crate::fit::sampler::{ChainSamples, sample_chain};
use crate::fit::trace::{ChainDraws, Trace};

/// Acceptance this far below the target is reported.
const LOW_ACCEPTANCE_MARGIN: f64 = 0.2;

/// Per-chain seed derived from the run seed (splitmix64 finaliser).
pub fn chain_seed(seed: u64, chain: usize) -> u64 {
    let mut z = seed.wrapping_add((chain as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn run_chain(graph: &ModelGraph, config: &SamplerConfig, chain: usize) -> Result<ChainSamples> {
    let mut rng = StdRng::seed_from_u64(chain_seed(config.seed, chain));
    sample_chain(graph, config, chain, &mut rng)
}

/// Run `op` on a dedicated pool of `cores` threads; nested rayon work stays on it.
fn with_pool<T: Send>(cores: usize, op: impl FnOnce() -> T + Send) -> Result<T> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cores)
        .build()
        .map_err(|e| GrowthError::sampling(format!("failed to start worker pool: {e}")))?;
    Ok(pool.install(op))
}

/// Sample the posterior of `graph`.
pub fn run(graph: &ModelGraph, config: &SamplerConfig) -> Result<Trace> {
    config.validate()?;
    let cores = config.cores_used();
    info!(
        "sampling {} chains x {} draws ({} tune) on {} thread(s)",
        config.chains, config.draws, config.tune, cores
    );

    let (samples, chains) = with_pool(cores, || -> Result<_> {
        let samples = (0..config.chains)
            .into_par_iter()
            .map(|c| run_chain(graph, config, c))
            .collect::<Result<Vec<_>>>()?;
        let chains = samples
            .par_iter()
            .map(|s| to_chain_draws(graph, s))
            .collect::<Vec<_>>();
        Ok((samples, chains))
    })??;

    let mut warnings = Vec::new();
    for (chain, s) in samples.iter().enumerate() {
        warnings.extend(chain_warnings(chain, s, config));
    }
    for w in &warnings {
        warn!("{w}");
    }

    let trace = Trace::new(
        graph.spec().clone(),
        graph.parameter_names().to_vec(),
        chains,
        warnings,
    )?;
    info!(
        "sampling finished: {} draws, {} divergences",
        trace.n_chains() * trace.n_draws(),
        trace.divergences()
    );
    Ok(trace)
}

fn to_chain_draws(graph: &ModelGraph, samples: &ChainSamples) -> ChainDraws {
    let draws: Vec<Vec<f64>> = samples.draws.iter().map(|z| graph.constrain(z)).collect();
    let log_likelihood = draws
        .iter()
        .map(|theta| graph.pointwise_log_likelihood(theta))
        .collect();
    ChainDraws {
        draws,
        log_likelihood,
        accept_prob: samples.accept_prob.clone(),
        divergent: samples.divergent.clone(),
        tree_depth: samples.tree_depth.clone(),
        step_size: samples.step_size,
    }
}

fn chain_warnings(chain: usize, s: &ChainSamples, config: &SamplerConfig) -> Vec<NumericalWarning> {
    let mut out = Vec::new();
    let divergences = s.divergent.iter().filter(|d| **d).count();
    if divergences > 0 {
        out.push(NumericalWarning::Divergences {
            chain,
            count: divergences,
        });
    }
    let mean_accept = s.accept_prob.iter().sum::<f64>() / s.accept_prob.len().max(1) as f64;
    if mean_accept < config.target_accept - LOW_ACCEPTANCE_MARGIN {
        out.push(NumericalWarning::LowAcceptance {
            chain,
            mean_accept,
            target: config.target_accept,
        });
    }
    let saturated = s
        .tree_depth
        .iter()
        .filter(|&&d| d >= config.max_treedepth)
        .count();
    if saturated > 0 {
        out.push(NumericalWarning::TreeDepthSaturated {
            chain,
            count: saturated,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FactorLevels, ModelSpec, ModelType, PriorDescriptor};
    use crate::fit::builder::build;

    fn small_graph() -> ModelGraph {
        let spec = ModelSpec::builder(ModelType::Linear)
            .prior("intercept", PriorDescriptor::normal(0.0, 10.0))
            .prior("slope", PriorDescriptor::normal(0.0, 10.0))
            .build()
            .unwrap();
        let x: Vec<f64> = (0..15).map(f64::from).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, v)| 1.0 + 0.5 * v + [0.3, -0.2, 0.1][i % 3])
            .collect();
        build(&spec, &x, &y, &FactorLevels::new()).unwrap()
    }

    #[test]
    fn chain_seeds_differ() {
        assert_ne!(chain_seed(42, 0), chain_seed(42, 1));
        assert_eq!(chain_seed(42, 3), chain_seed(42, 3));
    }

    #[test]
    fn work_stays_on_a_pool_of_the_requested_size() {
        assert_eq!(with_pool(1, rayon::current_num_threads).unwrap(), 1);
        assert_eq!(with_pool(3, rayon::current_num_threads).unwrap(), 3);
        let spread = with_pool(1, || {
            (0..64)
                .into_par_iter()
                .map(|_| rayon::current_thread_index())
                .collect::<Vec<_>>()
        })
        .unwrap();
        assert!(spread.iter().all(|i| *i == Some(0)));
    }

    #[test]
    fn parallel_and_sequential_runs_agree() {
        let graph = small_graph();
        let mut config = SamplerConfig {
            chains: 2,
            draws: 50,
            tune: 50,
            ..SamplerConfig::default()
        };
        let parallel = run(&graph, &config).unwrap();
        config.parallel = false;
        let sequential = run(&graph, &config).unwrap();
        assert_eq!(parallel.chains(), sequential.chains());
    }

    #[test]
    fn trace_carries_log_likelihood_per_observation() {
        let graph = small_graph();
        let config = SamplerConfig {
            chains: 1,
            draws: 20,
            tune: 20,
            ..SamplerConfig::default()
        };
        let trace = run(&graph, &config).unwrap();
        assert_eq!(trace.n_draws(), 20);
        assert_eq!(trace.n_observations(), 15);
        assert_eq!(trace.parameter_names().len(), 3);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SamplerConfig {
            chains: 0,
            ..SamplerConfig::default()
        };
        assert_eq!(run(&small_graph(), &config).unwrap_err().exit_code(), 2);
    }
}

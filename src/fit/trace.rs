//! Posterior draws of one fit, and the caller-owned store of fitted candidates.

use std::collections::BTreeMap;

use crate::domain::{ModelSpec, TraceKey};
use crate::error::{GrowthError, NumericalWarning, Result};

/// Retained draws of one chain on the constrained scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainDraws {
    /// `draw × parameter`.
    pub draws: Vec<Vec<f64>>,
    /// `draw × observation`.
    pub log_likelihood: Vec<Vec<f64>>,
    pub accept_prob: Vec<f64>,
    pub divergent: Vec<bool>,
    pub tree_depth: Vec<usize>,
    pub step_size: f64,
}

impl ChainDraws {
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }
}

/// Posterior sample of one fitted model.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    spec: ModelSpec,
    parameter_names: Vec<String>,
    chains: Vec<ChainDraws>,
    warnings: Vec<NumericalWarning>,
}

impl Trace {
    /// Assemble a trace, checking that every chain has the same shape.
    pub fn new(
        spec: ModelSpec,
        parameter_names: Vec<String>,
        chains: Vec<ChainDraws>,
        warnings: Vec<NumericalWarning>,
    ) -> Result<Self> {
        let Some(first) = chains.first() else {
            return Err(GrowthError::sampling("trace has no chains"));
        };
        let n_draws = first.len();
        let n_obs = first.log_likelihood.first().map(Vec::len).unwrap_or(0);
        for (c, chain) in chains.iter().enumerate() {
            let ragged = chain.len() != n_draws
                || chain.log_likelihood.len() != n_draws
                || chain.draws.iter().any(|d| d.len() != parameter_names.len())
                || chain.log_likelihood.iter().any(|ll| ll.len() != n_obs);
            if ragged {
                return Err(GrowthError::sampling(format!("chain {c} has an inconsistent shape")));
            }
        }
        Ok(Self {
            spec,
            parameter_names,
            chains,
            warnings,
        })
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    pub fn chains(&self) -> &[ChainDraws] {
        &self.chains
    }

    pub fn warnings(&self) -> &[NumericalWarning] {
        &self.warnings
    }

    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    /// Draws per chain.
    pub fn n_draws(&self) -> usize {
        self.chains.first().map(ChainDraws::len).unwrap_or(0)
    }

    pub fn n_observations(&self) -> usize {
        self.chains
            .first()
            .and_then(|c| c.log_likelihood.first())
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameter_names.iter().position(|n| n == name)
    }

    /// `chain × draw` values of one parameter.
    pub fn values(&self, name: &str) -> Option<Vec<Vec<f64>>> {
        let j = self.parameter_index(name)?;
        Some(self.column(j))
    }

    pub(crate) fn column(&self, j: usize) -> Vec<Vec<f64>> {
        self.chains
            .iter()
            .map(|c| c.draws.iter().map(|d| d[j]).collect())
            .collect()
    }

    /// Every retained draw (chains concatenated) as `(parameter vector, pointwise log-likelihood)`.
    pub fn samples(&self) -> impl Iterator<Item = (&[f64], &[f64])> {
        self.chains.iter().flat_map(|c| {
            c.draws
                .iter()
                .zip(&c.log_likelihood)
                .map(|(d, ll)| (d.as_slice(), ll.as_slice()))
        })
    }

    /// Log-likelihood of observation `i` across all retained draws.
    pub fn observation_log_likelihood(&self, i: usize) -> Vec<f64> {
        self.samples().map(|(_, ll)| ll[i]).collect()
    }

    pub fn divergences(&self) -> usize {
        self.chains
            .iter()
            .map(|c| c.divergent.iter().filter(|d| **d).count())
            .sum()
    }
}

/// Fitted candidates keyed by identity. Owned by the caller; one fit per key.
#[derive(Debug, Clone, Default)]
pub struct TraceStore(BTreeMap<TraceKey, Trace>);

impl TraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new fit; an existing fit under `key` is never overwritten.
    pub fn insert(&mut self, key: TraceKey, trace: Trace) -> Result<()> {
        if self.0.contains_key(&key) {
            return Err(GrowthError::config(format!("a trace for `{key}` already exists")));
        }
        self.0.insert(key, trace);
        Ok(())
    }

    /// Insert or overwrite, returning the previous fit.
    pub fn replace(&mut self, key: TraceKey, trace: Trace) -> Option<Trace> {
        self.0.insert(key, trace)
    }

    pub fn get(&self, key: &TraceKey) -> Option<&Trace> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &TraceKey) -> Option<Trace> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TraceKey, &Trace)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Traces named by their key, ready for comparison.
    pub fn named(&self) -> Vec<(String, &Trace)> {
        self.0.iter().map(|(k, t)| (k.to_string(), t)).collect()
    }
}

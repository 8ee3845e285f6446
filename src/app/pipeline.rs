//! Shared fit pipeline used by the `fit` and `compare` commands.
//!
//! dataset CSV -> ingest -> filter -> design -> model graph -> sampler ->
//! summary + posterior-mean residuals + predictive bands
//!
//! The commands only add presentation and exports on top.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::info;

use crate::data::{Dataset, Design};
use crate::domain::{Comparator, InformationCriterion, RunConfig, TraceKey, WeightingMethod};
use crate::error::{GrowthError, Result};
use crate::fit::{
    ComparisonResult, SummaryTable, Trace, TraceStore, build, compare, evaluate_estimate,
    evaluate_threshold, predict, sample_posterior_predictive, summarize,
};
use crate::io::{IngestedData, load_dataset};
use crate::report::{PredictiveBand, Residual, compute_residuals, predictive_bands};

/// Environment variable naming the dataset root directory.
pub const DATA_DIR_ENV: &str = "GROWTH_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "data";

/// All computed outputs of a single fit.
#[derive(Debug, Clone)]
pub struct FitOutput {
    pub key: TraceKey,
    pub ingest: IngestedData,
    pub dataset: Dataset,
    pub design: Design,
    pub trace: Trace,
    pub summary: SummaryTable,
    pub residuals: Vec<Residual>,
    /// Posterior predictive HDI at each fitted age, at the model's `hdi_prob`.
    pub bands: Vec<PredictiveBand>,
}

/// Dataset root: `GROWTH_DATA_DIR` (a `.env` file is honoured), else `data`.
pub fn data_dir() -> PathBuf {
    dotenvy::dotenv().ok();
    std::env::var(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR))
}

/// `<data_dir>/<class>/<order>/<species>/<data_file>`.
pub fn dataset_path(data_dir: &Path, config: &RunConfig) -> PathBuf {
    data_dir
        .join(&config.taxonomy.class_)
        .join(&config.taxonomy.order)
        .join(&config.taxonomy.species)
        .join(&config.data_file)
}

/// Load the configured dataset and fit it.
pub fn run_fit(config: &RunConfig, data_dir: &Path) -> Result<FitOutput> {
    config.validate()?;
    let path = dataset_path(data_dir, config);
    info!("loading dataset '{}'", path.display());
    let ingest = load_dataset(&path, &config.columns)?;
    fit_dataset(config, ingest)
}

/// Fit an already ingested dataset.
pub fn fit_dataset(config: &RunConfig, ingest: IngestedData) -> Result<FitOutput> {
    config.validate()?;
    let key = config.trace_key();
    let dataset = ingest.dataset.apply_filter(&config.filter)?;
    let design = dataset.design(&config.spec.factors)?;
    info!("fitting {key} on {} observations", design.x.len());

    let graph = build(&config.spec, &design.x, &design.y, &design.levels)?;
    let trace = crate::fit::run(&graph, &config.sampler)?;
    let summary = summarize(&trace, config.spec.hdi_prob)?;
    let fitted = predict(&trace, &config.spec, &design.x, Some(&design.levels))?;
    let residuals = compute_residuals(&design.y, &fitted)?;
    let replicated = sample_posterior_predictive(
        &trace,
        &config.spec,
        &design.x,
        Some(&design.levels),
        config.sampler.seed,
    )?;
    let bands = predictive_bands(&design.x, &replicated, config.spec.hdi_prob)?;

    Ok(FitOutput {
        key,
        ingest,
        dataset,
        design,
        trace,
        summary,
        residuals,
        bands,
    })
}

/// Fit every configuration into a fresh store and compare the results.
///
/// Two configurations with the same identity key are rejected.
pub fn run_compare(
    configs: &[RunConfig],
    data_dir: &Path,
    criterion: InformationCriterion,
    method: WeightingMethod,
) -> Result<(TraceStore, ComparisonResult)> {
    if configs.len() < 2 {
        return Err(GrowthError::config("comparison needs at least two run configs"));
    }
    let mut store = TraceStore::new();
    for config in configs {
        let output = run_fit(config, data_dir)?;
        store.insert(output.key, output.trace)?;
    }
    let result = compare_store(&store, criterion, method)?;
    Ok((store, result))
}

/// Compare every trace held by `store`.
pub fn compare_store(
    store: &TraceStore,
    criterion: InformationCriterion,
    method: WeightingMethod,
) -> Result<ComparisonResult> {
    let named = store.named();
    let result = compare(&named, criterion, method)?;
    if let Some(best) = result.best() {
        info!("best model: {} (weight {:.3})", best.model, best.weight);
    }
    Ok(result)
}

/// Acceptance predicate over a summary table.
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    /// Every row satisfies `diagnostic <comparator> baseline`, e.g. `r_hat < 1.05`.
    Threshold {
        diagnostic: String,
        comparator: Comparator,
        baseline: f64,
    },
    /// Posterior mean of `parameter` within `expected ± |expected * proportion|`,
    /// written `slope=3.0:0.1`.
    Estimate {
        parameter: String,
        expected: f64,
        proportion: f64,
    },
}

impl Check {
    pub fn evaluate(&self, table: &SummaryTable) -> Result<bool> {
        match self {
            Check::Threshold {
                diagnostic,
                comparator,
                baseline,
            } => evaluate_threshold(table, diagnostic, *comparator, *baseline),
            Check::Estimate {
                parameter,
                expected,
                proportion,
            } => evaluate_estimate(table, parameter, *expected, *proportion),
        }
    }
}

fn parse_number(text: &str, what: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| GrowthError::config(format!("invalid {what} '{}'", text.trim())))
}

impl FromStr for Check {
    type Err = GrowthError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some((parameter, rest)) = s.split_once('=') {
            if !rest.starts_with('=') && !parameter.ends_with(['<', '>']) {
                let (expected, proportion) = rest.split_once(':').ok_or_else(|| {
                    GrowthError::config(format!(
                        "estimate check '{s}' must look like `name=value:proportion`"
                    ))
                })?;
                return Ok(Check::Estimate {
                    parameter: parameter.trim().to_string(),
                    expected: parse_number(expected, "expected value")?,
                    proportion: parse_number(proportion, "error proportion")?,
                });
            }
        }
        for op in ["==", "<", ">"] {
            if let Some((diagnostic, baseline)) = s.split_once(op) {
                return Ok(Check::Threshold {
                    diagnostic: diagnostic.trim().to_string(),
                    comparator: op.parse()?,
                    baseline: parse_number(baseline, "baseline")?,
                });
            }
        }
        Err(GrowthError::config(format!(
            "check '{s}' must look like `r_hat < 1.05` or `slope=3.0:0.1`"
        )))
    }
}

//! Posterior summary table and acceptance predicates over it.

use serde::{Deserialize, Serialize};

use crate::domain::{Comparator, Diagnostic};
use crate::error::{GrowthError, Result};
use crate::fit::trace::Trace;
use crate::math::stats;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub parameter: String,
    pub mean: f64,
    pub sd: f64,
    pub hdi_low: f64,
    pub hdi_high: f64,
    pub ess: f64,
    pub r_hat: f64,
}

impl SummaryRow {
    pub fn value(&self, diagnostic: Diagnostic) -> f64 {
        match diagnostic {
            Diagnostic::Mean => self.mean,
            Diagnostic::Sd => self.sd,
            Diagnostic::HdiLow => self.hdi_low,
            Diagnostic::HdiHigh => self.hdi_high,
            Diagnostic::Ess => self.ess,
            Diagnostic::RHat => self.r_hat,
        }
    }
}

/// One row per scalar parameter, in trace order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryTable {
    pub hdi_prob: f64,
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn get(&self, parameter: &str) -> Option<&SummaryRow> {
        self.rows.iter().find(|r| r.parameter == parameter)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Summarise every parameter of `trace`.
pub fn summarize(trace: &Trace, hdi_prob: f64) -> Result<SummaryTable> {
    if !(hdi_prob > 0.0 && hdi_prob < 1.0) {
        return Err(GrowthError::config(format!(
            "hdi_prob must lie in (0, 1), got {hdi_prob}"
        )));
    }
    let rows = trace
        .parameter_names()
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let chains = trace.column(j);
            let pooled: Vec<f64> = chains.iter().flatten().copied().collect();
            let (hdi_low, hdi_high) = stats::hdi(&pooled, hdi_prob);
            SummaryRow {
                parameter: name.clone(),
                mean: stats::mean(&pooled),
                sd: stats::sd(&pooled),
                hdi_low,
                hdi_high,
                ess: stats::effective_sample_size(&chains),
                r_hat: stats::split_r_hat(&chains),
            }
        })
        .collect();
    Ok(SummaryTable { hdi_prob, rows })
}

/// `true` iff every row satisfies `row[diagnostic] <comparator> baseline`.
///
/// An empty table passes.
pub fn evaluate_threshold(
    table: &SummaryTable,
    diagnostic: &str,
    comparator: Comparator,
    baseline: f64,
) -> Result<bool> {
    let diagnostic: Diagnostic = diagnostic.parse()?;
    Ok(table
        .rows
        .iter()
        .all(|row| comparator.holds(row.value(diagnostic), baseline)))
}

/// `true` iff the posterior mean of `parameter` lies strictly inside
/// `expected ± |expected * error_proportion|`.
pub fn evaluate_estimate(
    table: &SummaryTable,
    parameter: &str,
    expected: f64,
    error_proportion: f64,
) -> Result<bool> {
    let row = table.get(parameter).ok_or_else(|| {
        GrowthError::config(format!("no parameter `{parameter}` in the summary table"))
    })?;
    let half_width = (expected * error_proportion).abs();
    Ok(row.mean > expected - half_width && row.mean < expected + half_width)
}

//! Formatted terminal output.
//!
//! Formatting lives here so fitting code never prints and output changes
//! stay localized.

use crate::domain::{ModelType, RunConfig};
use crate::fit::{ComparisonResult, SummaryTable, Trace};
use crate::io::IngestedData;
use crate::report::Residual;

/// Header block for one fit: identity, data accounting, sampler settings and warnings.
pub fn format_run_summary(
    config: &RunConfig,
    ingest: &IngestedData,
    n_fitted: usize,
    trace: &Trace,
    residuals: &[Residual],
) -> String {
    let mut out = String::new();
    let spec = &config.spec;

    out.push_str("=== growth - Bayesian growth curve fit ===\n");
    out.push_str(&format!("Key: {}\n", config.trace_key()));
    let model = match spec.model_type {
        ModelType::Linear => "linear regression".to_string(),
        ModelType::Nonlinear => format!(
            "{} ({:?} likelihood)",
            spec.growth_curve.display_name(),
            spec.likelihood
        ),
    };
    out.push_str(&format!("Model: {model}\n"));
    out.push_str(&format!(
        "Rows: read={} | ingested={} | skipped={} | fitted={}\n",
        ingest.rows_read,
        ingest.rows_used,
        ingest.row_errors.len(),
        n_fitted
    ));
    out.push_str(&format!(
        "Sampler: chains={} | draws={} | tune={} | target_accept={:.2} | seed={}\n",
        config.sampler.chains,
        config.sampler.draws,
        config.sampler.tune,
        config.sampler.target_accept,
        config.sampler.seed
    ));
    out.push_str(&format!(
        "Divergences: {} | residual RMSE: {:.3}\n",
        trace.divergences(),
        crate::report::rmse(residuals)
    ));
    for w in trace.warnings() {
        out.push_str(&format!("  warning: {w}\n"));
    }
    out.push('\n');
    out
}

/// Posterior summary as an aligned table.
pub fn format_summary_table(table: &SummaryTable) -> String {
    let mut out = String::new();
    let hdi = format!("{:.0}%", table.hdi_prob * 100.0);
    push_line(
        &mut out,
        format!(
            "{:<28} {:>12} {:>10} {:>12} {:>12} {:>8} {:>7}",
            "parameter",
            "mean",
            "sd",
            format!("hdi{hdi}_lo"),
            format!("hdi{hdi}_hi"),
            "ess",
            "r_hat"
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<28} {:-<12} {:-<10} {:-<12} {:-<12} {:-<8} {:-<7}",
            "", "", "", "", "", "", ""
        ),
    );
    for r in &table.rows {
        push_line(
            &mut out,
            format!(
                "{:<28} {:>12.4} {:>10.4} {:>12.4} {:>12.4} {:>8.0} {:>7.3}",
                truncate(&r.parameter, 28),
                r.mean,
                r.sd,
                r.hdi_low,
                r.hdi_high,
                r.ess,
                r.r_hat
            ),
        );
    }
    out
}

/// Comparison rows in rank order; `!` marks an unreliable criterion estimate.
pub fn format_comparison(result: &ComparisonResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Criterion: {:?} | weights: {:?}\n",
        result.criterion, result.method
    ));
    push_line(
        &mut out,
        format!(
            "{:>4} {:<48} {:>10} {:>8} {:>8} {:>9} {:>8} {:>7}",
            "rank", "model", "elpd", "p_eff", "se", "elpd_diff", "dse", "weight"
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<4} {:-<48} {:-<10} {:-<8} {:-<8} {:-<9} {:-<8} {:-<7}",
            "", "", "", "", "", "", "", ""
        ),
    );
    for r in &result.rows {
        let flag = if r.warning { " !" } else { "" };
        push_line(
            &mut out,
            format!(
                "{:>4} {:<48} {:>10.2} {:>8.2} {:>8.2} {:>9.2} {:>8.2} {:>7.3}{flag}",
                r.rank,
                truncate(&r.model, 48),
                r.elpd,
                r.p_eff,
                r.standard_error,
                r.elpd_diff,
                r.dse,
                r.weight
            ),
        );
    }
    out
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InformationCriterion, WeightingMethod};
    use crate::fit::{ComparisonRow, SummaryRow};

    #[test]
    fn truncate_marks_cut_names() {
        assert_eq!(truncate("l_inf", 28), "l_inf");
        assert_eq!(truncate("abcdefgh", 5), "abcd.");
    }

    #[test]
    fn summary_table_lists_each_parameter() {
        let table = SummaryTable {
            hdi_prob: 0.94,
            rows: ["l_inf", "k", "sigma"]
                .iter()
                .map(|p| SummaryRow {
                    parameter: p.to_string(),
                    mean: 1.0,
                    sd: 0.1,
                    hdi_low: 0.8,
                    hdi_high: 1.2,
                    ess: 900.0,
                    r_hat: 1.0,
                })
                .collect(),
        };
        let text = format_summary_table(&table);
        assert_eq!(text.lines().count(), 5);
        assert!(text.lines().next().unwrap().contains("hdi94%_lo"));
        assert!(text.lines().nth(3).unwrap().starts_with("k "));
    }

    #[test]
    fn comparison_flags_warnings() {
        let row = |model: &str, rank, warning| ComparisonRow {
            model: model.to_string(),
            elpd: -100.0,
            p_eff: 4.0,
            standard_error: 5.0,
            elpd_diff: 0.0,
            dse: 0.0,
            weight: 0.5,
            rank,
            warning,
        };
        let result = ComparisonResult {
            criterion: InformationCriterion::Loo,
            method: WeightingMethod::PseudoBma,
            rows: vec![row("a", 0, false), row("b", 1, true)],
        };
        let text = format_comparison(&result);
        let lines: Vec<_> = text.lines().collect();
        assert!(!lines[3].ends_with('!'));
        assert!(lines[4].ends_with('!'));
    }
}

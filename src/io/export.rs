//! CSV exports of fit results.
//!
//! Plain comma-separated files meant for spreadsheets and downstream scripts.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::data::Dataset;
use crate::error::{GrowthError, Result};
use crate::fit::{ComparisonResult, SummaryTable};
use crate::report::PredictiveBand;

fn create(path: &Path, what: &str) -> Result<File> {
    File::create(path).map_err(|e| {
        GrowthError::io(format!("failed to create {what} '{}': {e}", path.display()))
    })
}

fn write_err(e: std::io::Error) -> GrowthError {
    GrowthError::io(format!("failed to write export: {e}"))
}

fn csv_err(e: csv::Error) -> GrowthError {
    GrowthError::io(format!("failed to write export: {e}"))
}

/// Write a summary table to `path`.
pub fn write_summary_csv(path: &Path, table: &SummaryTable) -> Result<()> {
    let mut file = create(path, "summary CSV")?;
    write_summary(&mut file, table)
}

pub fn write_summary<W: Write>(out: &mut W, table: &SummaryTable) -> Result<()> {
    writeln!(out, "parameter,mean,sd,hdi_low,hdi_high,ess,r_hat").map_err(write_err)?;
    for r in &table.rows {
        writeln!(
            out,
            "{},{:.6},{:.6},{:.6},{:.6},{:.1},{:.4}",
            r.parameter, r.mean, r.sd, r.hdi_low, r.hdi_high, r.ess, r.r_hat
        )
        .map_err(write_err)?;
    }
    Ok(())
}

/// Write a comparison table to `path`, rows in rank order.
pub fn write_comparison_csv(path: &Path, result: &ComparisonResult) -> Result<()> {
    let file = create(path, "comparison CSV")?;
    write_comparison(file, result)
}

pub fn write_comparison<W: Write>(out: W, result: &ComparisonResult) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record([
            "model", "elpd", "p_eff", "se", "elpd_diff", "dse", "weight", "rank", "warning",
        ])
        .map_err(csv_err)?;
    for r in &result.rows {
        writer
            .write_record([
                r.model.clone(),
                format!("{:.6}", r.elpd),
                format!("{:.6}", r.p_eff),
                format!("{:.6}", r.standard_error),
                format!("{:.6}", r.elpd_diff),
                format!("{:.6}", r.dse),
                format!("{:.6}", r.weight),
                r.rank.to_string(),
                r.warning.to_string(),
            ])
            .map_err(csv_err)?;
    }
    writer.flush().map_err(write_err)
}

/// Write per-observation predictive intervals to `path`.
pub fn write_bands_csv(path: &Path, bands: &[PredictiveBand]) -> Result<()> {
    let mut file = create(path, "predictive band CSV")?;
    write_bands(&mut file, bands)
}

pub fn write_bands<W: Write>(out: &mut W, bands: &[PredictiveBand]) -> Result<()> {
    writeln!(out, "index,age,mean,hdi_low,hdi_high").map_err(write_err)?;
    for b in bands {
        writeln!(
            out,
            "{},{:.4},{:.6},{:.6},{:.6}",
            b.index, b.age, b.mean, b.hdi_low, b.hdi_high
        )
        .map_err(write_err)?;
    }
    Ok(())
}

/// Write a dataset with the default column names (`age,fl,sex,source,year`).
pub fn write_dataset_csv(path: &Path, dataset: &Dataset) -> Result<()> {
    let file = create(path, "dataset CSV")?;
    write_dataset(file, dataset)
}

/// Text fields are quoted as needed, so any location label reads back unchanged.
pub fn write_dataset<W: Write>(out: W, dataset: &Dataset) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record(["age", "fl", "sex", "source", "year"])
        .map_err(csv_err)?;
    for o in dataset.observations() {
        writer
            .write_record([
                o.age.map(|v| format!("{v:.4}")).unwrap_or_default(),
                o.size.map(|v| format!("{v:.4}")).unwrap_or_default(),
                o.sex.map(|s| s.code()).unwrap_or("").to_string(),
                o.location.clone().unwrap_or_default(),
                o.year.map(|y| y.to_string()).unwrap_or_default(),
            ])
            .map_err(csv_err)?;
    }
    writer.flush().map_err(write_err)
}

//! Run configuration files and fit snapshots (JSON).
//!
//! A snapshot records what produced a fit: the full [`RunConfig`], when it
//! ran, the posterior summary and any sampler warnings. Reading a snapshot's
//! `config` back reproduces the run.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::RunConfig;
use crate::error::{GrowthError, NumericalWarning, Result};
use crate::fit::SummaryTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub tool: String,
    pub created_at: DateTime<Utc>,
    pub key: String,
    pub config: RunConfig,
    pub summary: SummaryTable,
    #[serde(default)]
    pub warnings: Vec<NumericalWarning>,
}

impl RunSnapshot {
    pub fn new(config: &RunConfig, summary: &SummaryTable, warnings: &[NumericalWarning]) -> Self {
        Self {
            tool: "growth".to_string(),
            created_at: Utc::now(),
            key: config.trace_key().to_string(),
            config: config.clone(),
            summary: summary.clone(),
            warnings: warnings.to_vec(),
        }
    }
}

/// Read and validate a run configuration.
pub fn read_run_config(path: &Path) -> Result<RunConfig> {
    let file = File::open(path).map_err(|e| {
        GrowthError::io(format!("failed to open run config '{}': {e}", path.display()))
    })?;
    let config: RunConfig = serde_json::from_reader(file)
        .map_err(|e| GrowthError::config(format!("invalid run config JSON: {e}")))?;
    config.validate()?;
    Ok(config)
}

pub fn write_snapshot(path: &Path, snapshot: &RunSnapshot) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        GrowthError::io(format!("failed to create snapshot '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(file, snapshot)
        .map_err(|e| GrowthError::io(format!("failed to write snapshot JSON: {e}")))
}

pub fn read_snapshot(path: &Path) -> Result<RunSnapshot> {
    let file = File::open(path).map_err(|e| {
        GrowthError::io(format!("failed to open snapshot '{}': {e}", path.display()))
    })?;
    serde_json::from_reader(file)
        .map_err(|e| GrowthError::config(format!("invalid snapshot JSON: {e}")))
}

//! Command-line parsing for the `growth` binary.
//!
//! Argument parsing and command dispatch stay separate from the
//! modelling/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{InformationCriterion, WeightingMethod};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "growth", version, about = "Bayesian growth-curve fitting and model comparison")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit one run config, print the posterior summary and optionally export it.
    Fit(FitArgs),
    /// Fit several run configs on the same data and rank them.
    Compare(CompareArgs),
    /// Write a synthetic dataset CSV.
    Simulate(SimulateArgs),
}

/// Overrides shared by commands that sample.
#[derive(Debug, Parser, Clone)]
pub struct SamplerArgs {
    /// Dataset root; defaults to $GROWTH_DATA_DIR or `data`.
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[arg(long)]
    pub chains: Option<usize>,

    /// Retained draws per chain.
    #[arg(long)]
    pub draws: Option<usize>,

    /// Warmup iterations per chain.
    #[arg(long)]
    pub tune: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Run chains one after another on a single thread.
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Run configuration JSON.
    #[arg(long, value_name = "JSON")]
    pub config: PathBuf,

    #[command(flatten)]
    pub sampler: SamplerArgs,

    /// Restrict to sampling locations, e.g. "QueenslandA, and NewSouthWalesA".
    #[arg(long, value_name = "LIST")]
    pub locations: Option<String>,

    /// Toggle the configured year range (`enabled` or `disabled`).
    #[arg(long, value_name = "STATE")]
    pub year_range: Option<String>,

    /// Acceptance check, e.g. `r_hat < 1.05` or `slope=3.0:0.1` (repeatable).
    #[arg(long = "check", value_name = "PREDICATE")]
    pub checks: Vec<String>,

    /// Print the N largest residuals.
    #[arg(long, default_value_t = 0)]
    pub top: usize,

    /// Export the summary table to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    /// Export per-observation posterior predictive intervals to CSV.
    #[arg(long, value_name = "CSV")]
    pub bands: Option<PathBuf>,

    /// Write a JSON snapshot of config, summary and warnings.
    #[arg(long, value_name = "JSON")]
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct CompareArgs {
    /// Run configuration JSON of one candidate (repeat for each).
    #[arg(long = "config", value_name = "JSON", required = true, num_args = 1)]
    pub configs: Vec<PathBuf>,

    #[command(flatten)]
    pub sampler: SamplerArgs,

    #[arg(long, value_enum, default_value_t = InformationCriterion::Loo)]
    pub criterion: InformationCriterion,

    #[arg(long, value_enum, default_value_t = WeightingMethod::Stacking)]
    pub method: WeightingMethod,

    /// Export the comparison table to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Simulation config JSON; when absent a linear dataset is generated from the flags below.
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Output CSV.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,

    #[arg(long, default_value_t = 2.0, allow_negative_numbers = true)]
    pub intercept: f64,

    #[arg(long, default_value_t = 3.0, allow_negative_numbers = true)]
    pub slope: f64,

    #[arg(short = 'n', long, default_value_t = 50)]
    pub count: usize,

    #[arg(long, default_value_t = 1.0)]
    pub noise_sd: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

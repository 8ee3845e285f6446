//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads run configs and applies sampler overrides
//! - runs the fit / comparison pipeline
//! - prints reports and writes optional exports

use std::fs::File;
use std::path::PathBuf;

use clap::Parser;
use log::info;

use crate::cli::{Command, CompareArgs, FitArgs, SamplerArgs, SimulateArgs};
use crate::data::{SimulationConfig, simulate};
use crate::domain::RunConfig;
use crate::domain::vocab::{location_codes, parse_comma_list, parse_enabled_disabled};
use crate::error::{GrowthError, Result};
use crate::io::{
    RunSnapshot, read_run_config, write_bands_csv, write_comparison_csv, write_dataset_csv,
    write_snapshot, write_summary_csv,
};
use crate::report::{
    band_coverage, format_comparison, format_run_summary, format_summary_table, largest_residuals,
};

use pipeline::Check;

pub mod pipeline;

/// Entry point for the `growth` binary.
pub fn run() -> Result<()> {
    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Compare(args) => handle_compare(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn data_dir(args: &SamplerArgs) -> PathBuf {
    args.data_dir.clone().unwrap_or_else(pipeline::data_dir)
}

/// Apply command-line sampler overrides on top of a run config.
pub fn apply_overrides(config: &mut RunConfig, args: &SamplerArgs) {
    let sampler = &mut config.sampler;
    if let Some(chains) = args.chains {
        sampler.chains = chains;
    }
    if let Some(draws) = args.draws {
        sampler.draws = draws;
    }
    if let Some(tune) = args.tune {
        sampler.tune = tune;
    }
    if let Some(seed) = args.seed {
        sampler.seed = seed;
    }
    if args.sequential {
        sampler.parallel = false;
    }
}

/// Apply the prose filter flags of `fit` (location names, year range toggle).
pub fn apply_filter_overrides(
    config: &mut RunConfig,
    locations: Option<&str>,
    year_range: Option<&str>,
) -> Result<()> {
    if let Some(list) = locations {
        config.filter.locations = location_codes(&parse_comma_list(list))?;
    }
    if let Some(state) = year_range {
        if !parse_enabled_disabled(state)? {
            config.filter.years = None;
        } else if config.filter.years.is_none() {
            return Err(GrowthError::config(
                "year range enabled but the run config has no `years`",
            ));
        }
    }
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<()> {
    // Parse checks before spending time sampling.
    let checks = args
        .checks
        .iter()
        .map(|c| c.parse::<Check>())
        .collect::<Result<Vec<_>>>()?;

    let mut config = read_run_config(&args.config)?;
    apply_overrides(&mut config, &args.sampler);
    apply_filter_overrides(&mut config, args.locations.as_deref(), args.year_range.as_deref())?;
    let run = pipeline::run_fit(&config, &data_dir(&args.sampler))?;

    println!(
        "{}",
        format_run_summary(&config, &run.ingest, run.design.x.len(), &run.trace, &run.residuals)
    );
    println!("{}", format_summary_table(&run.summary));
    println!(
        "Posterior predictive {:.0}% HDI covers {:.1}% of observations\n",
        run.summary.hdi_prob * 100.0,
        band_coverage(&run.design.y, &run.bands) * 100.0
    );

    if args.top > 0 {
        println!("Largest residuals:");
        for r in largest_residuals(&run.residuals, args.top) {
            println!(
                "  #{:<5} observed={:>10.3} fitted={:>10.3} residual={:>9.3}",
                r.index, r.observed, r.fitted, r.residual
            );
        }
        println!();
    }

    if let Some(path) = &args.export {
        write_summary_csv(path, &run.summary)?;
        info!("wrote summary to '{}'", path.display());
    }
    if let Some(path) = &args.bands {
        write_bands_csv(path, &run.bands)?;
        info!("wrote predictive bands to '{}'", path.display());
    }
    if let Some(path) = &args.snapshot {
        write_snapshot(path, &RunSnapshot::new(&config, &run.summary, run.trace.warnings()))?;
        info!("wrote snapshot to '{}'", path.display());
    }

    let mut failed = 0usize;
    for (text, check) in args.checks.iter().zip(&checks) {
        let ok = check.evaluate(&run.summary)?;
        println!("check {:<32} {}", text, if ok { "PASS" } else { "FAIL" });
        if !ok {
            failed += 1;
        }
    }
    if failed > 0 {
        return Err(GrowthError::sampling(format!("{failed} acceptance check(s) failed")));
    }
    Ok(())
}

fn handle_compare(args: CompareArgs) -> Result<()> {
    let configs = args
        .configs
        .iter()
        .map(|path| {
            let mut config = read_run_config(path)?;
            apply_overrides(&mut config, &args.sampler);
            Ok(config)
        })
        .collect::<Result<Vec<_>>>()?;

    let (_, result) = pipeline::run_compare(
        &configs,
        &data_dir(&args.sampler),
        args.criterion,
        args.method,
    )?;
    println!("{}", format_comparison(&result));

    if let Some(path) = &args.export {
        write_comparison_csv(path, &result)?;
        info!("wrote comparison to '{}'", path.display());
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => {
            let file = File::open(path).map_err(|e| {
                GrowthError::io(format!(
                    "failed to open simulation config '{}': {e}",
                    path.display()
                ))
            })?;
            serde_json::from_reader::<_, SimulationConfig>(file)
                .map_err(|e| GrowthError::config(format!("invalid simulation config JSON: {e}")))?
        }
        None => SimulationConfig::linear(
            args.intercept,
            args.slope,
            args.count,
            args.noise_sd,
            args.seed,
        ),
    };
    let dataset = simulate(&config)?;
    write_dataset_csv(&args.out, &dataset)?;
    println!("wrote {} observations to '{}'", dataset.len(), args.out.display());
    Ok(())
}

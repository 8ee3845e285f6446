//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - model configuration (`ModelSpec`, `PriorSpec`, `FactorSpec`, `SamplerConfig`)
//! - dataset records and filters (`Observation`, `DataFilter`, `ColumnMap`)
//! - run identity and configuration (`TraceKey`, `RunConfig`)
//! - vocabulary lookups for human-written configuration (`vocab`)

pub mod types;
pub mod vocab;

pub use types::*;

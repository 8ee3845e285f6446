//! Input/output helpers.
//!
//! - dataset CSV ingest + row validation (`ingest`)
//! - summary / comparison / dataset CSV exports (`export`)
//! - run config and snapshot JSON (`snapshot`)

pub mod export;
pub mod ingest;
pub mod snapshot;

pub use export::*;
pub use ingest::*;
pub use snapshot::*;

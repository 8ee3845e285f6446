//! Dataset handling between ingest and the model builder.
//!
//! - `filter`: row selection and design arrays
//! - `sample`: seeded synthetic datasets

pub mod filter;
pub mod sample;

pub use filter::{Dataset, Design};
pub use sample::{SimulationConfig, Truth, simulate};

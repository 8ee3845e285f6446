//! `shark-growth` library crate.
//!
//! The binary (`growth`) is a thin wrapper around this library so that:
//!
//! - the fitting engine is testable without spawning processes
//! - the core API (build, sample, predict, compare, diagnose) is pure data
//!   in and out, usable from other front-ends
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;

//! Growth curve implementations.
//!
//! Curves are small, pure functions so that the model builder and the
//! predictive engine can stay generic over the curve family.

pub mod growth;

pub use growth::*;

//! Aggregation modules.
//!
//! Pure merge logic that turns submissions into aggregate documents.

pub mod merger;

pub use merger::*;

//! QuizTally - monthly aggregation of quiz responses.
//!
//! Raw submissions are captured into a response bucket, then merged into
//! one tally document per quiz per processing month in an aggregate bucket.

pub mod analysis;
pub mod bucket;
pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod processor;
pub mod report;
pub mod store;

pub use error::{TallyError, TallyResult};

//! The analysis pipeline: retrieve relevant policy excerpts, classify each
//! against the new regulation, aggregate the verdicts into a persisted report.

mod error;
pub use error::{DroppedExcerpt, PipelineError};

pub mod retriever;
pub use retriever::Retriever;

pub mod aggregator;
pub use aggregator::Aggregator;

pub mod controller;
pub use controller::{Pipeline, PipelineConfig, PipelineOutcome, PipelineState};

#[cfg(test)]
pub(crate) mod testing;

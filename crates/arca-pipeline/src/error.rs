use arca_ai::AiError;
use arca_core::ComplianceReport;
use arca_store::StoreError;
use thiserror::Error;

use crate::PipelineState;

/// An excerpt whose classification call hard-failed and produced no verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedExcerpt {
    pub policy_id: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The policy index could not be loaded or queried.
    #[error("policy index unavailable: {0}")]
    IndexUnavailable(#[source] StoreError),

    /// The index was built with a different embedding dimension than the
    /// query embedder produces. Rebuild the index with the current model.
    #[error("query embedding does not match the policy index: {0}")]
    IncompatibleIndex(#[source] StoreError),

    #[error("could not embed regulation text: {0}")]
    Embedding(#[source] AiError),

    /// Retrieval returned nothing. Not the same as "no conflicts".
    #[error("no relevant internal policies found")]
    EmptyRetrieval,

    /// Every classification call failed; nothing to aggregate.
    #[error("all {attempted} classification calls failed")]
    NoVerdictsProduced {
        attempted: usize,
        failures: Vec<DroppedExcerpt>,
    },

    /// The report was assembled but could not be written. It is carried here
    /// so the caller can retry persistence.
    #[error("compliance report could not be saved: {source}")]
    Persistence {
        report: Box<ComplianceReport>,
        #[source]
        source: StoreError,
    },
}

impl PipelineError {
    /// State the pipeline was in when it stopped with this error.
    pub fn terminal_state(&self) -> PipelineState {
        match self {
            Self::InvalidInput(_)
            | Self::IndexUnavailable(_)
            | Self::IncompatibleIndex(_)
            | Self::Embedding(_) => PipelineState::Retrieving,
            Self::EmptyRetrieval => PipelineState::NoPoliciesFound,
            Self::NoVerdictsProduced { .. } => PipelineState::NoVerdictsProduced,
            Self::Persistence { .. } => PipelineState::Aggregating,
        }
    }

    /// The assembled report, for errors raised after aggregation.
    pub fn report(&self) -> Option<&ComplianceReport> {
        match self {
            Self::Persistence { report, .. } => Some(&**report),
            _ => None,
        }
    }
}

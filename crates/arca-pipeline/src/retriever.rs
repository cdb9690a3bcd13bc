//! Regulation text to ranked internal-policy excerpts.

use std::sync::Arc;

use arca_ai::EmbeddingProvider;
use arca_core::PolicyExcerpt;
use arca_store::{StoreError, VectorIndex};
use tracing::info;

use crate::PipelineError;

/// Decimal places kept in relevance scores.
pub const SCORE_DECIMALS: i32 = 4;

/// Embeds a regulation and looks up its nearest policy chunks.
///
/// The embedder should come from [`arca_ai::EmbedderCell`] so that queries and
/// the indexed chunks share one embedding configuration.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Up to `k` excerpts, best first, with ids `POL-001`, `POL-002`, ...
    ///
    /// The index's ordering is kept as returned; scores are only rounded.
    pub async fn retrieve(
        &self,
        regulation_text: &str,
        k: usize,
    ) -> Result<Vec<PolicyExcerpt>, PipelineError> {
        if regulation_text.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "regulation text is empty".into(),
            ));
        }
        if k == 0 {
            return Err(PipelineError::InvalidInput("k must be at least 1".into()));
        }

        let vector = self
            .embedder
            .embed(regulation_text)
            .map_err(PipelineError::Embedding)?;
        let matches = self
            .index
            .query(&vector, k)
            .await
            .map_err(|e| match e {
                StoreError::DimensionMismatch { .. } => PipelineError::IncompatibleIndex(e),
                e => PipelineError::IndexUnavailable(e),
            })?;

        let excerpts: Vec<PolicyExcerpt> = matches
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(rank, m)| PolicyExcerpt {
                id: PolicyExcerpt::rank_id(rank),
                text: m.text,
                source_document: m.source.replace('\\', "/"),
                page_number: m.page,
                relevance_score: round_score(m.score),
            })
            .collect();

        info!(k, returned = excerpts.len(), "retrieval finished");
        Ok(excerpts)
    }
}

/// Round a relevance score to [`SCORE_DECIMALS`] places.
pub fn round_score(score: f32) -> f32 {
    let scale = 10f64.powi(SCORE_DECIMALS);
    ((score as f64 * scale).round() / scale) as f32
}

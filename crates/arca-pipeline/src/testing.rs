//! Deterministic stand-ins for the embedding model, the index, and the oracle.

use std::sync::Arc;
use std::time::Duration;

use arca_ai::{AiError, EmbeddingConfig, EmbeddingProvider, OracleError, TextOracle};
use arca_store::{IndexEntry, MemoryIndex};
use async_trait::async_trait;

pub const REGULATION: &str = "All personal data must be deleted after 12 months of inactivity.";

/// Embeds every text to the same unit vector, so index scores are the
/// entries' first component.
pub struct StubEmbedder {
    config: EmbeddingConfig,
}

impl StubEmbedder {
    pub fn new() -> Arc<dyn EmbeddingProvider> {
        Arc::new(Self {
            config: EmbeddingConfig::default(),
        })
    }
}

impl EmbeddingProvider for StubEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, AiError> {
        Ok(vec![1.0, 0.0])
    }

    fn dim(&self) -> usize {
        2
    }

    fn config(&self) -> &EmbeddingConfig {
        &self.config
    }
}

/// Index whose entries score `scores[i]` against the stub query vector.
pub fn index_with(texts: &[(&str, f32)]) -> MemoryIndex {
    let entries = texts
        .iter()
        .enumerate()
        .map(|(i, (text, score))| IndexEntry {
            text: text.to_string(),
            source: format!("policies/doc{}.pdf", i + 1),
            page: Some(i as u32 + 1),
            vector: vec![*score, (1.0 - score * score).max(0.0).sqrt()],
        })
        .collect();
    MemoryIndex::from_entries(entries).unwrap()
}

#[derive(Clone)]
pub enum Reply {
    Severity(&'static str),
    Garbage,
    Empty,
    Fail,
    Delayed(Duration, &'static str),
    Hang,
}

/// Answers according to the first rule whose key appears in the prompt.
pub struct ScriptedOracle {
    rules: Vec<(&'static str, Reply)>,
}

impl ScriptedOracle {
    pub fn new(rules: Vec<(&'static str, Reply)>) -> Arc<dyn TextOracle> {
        Arc::new(Self { rules })
    }
}

pub fn verdict_json(severity: &str) -> String {
    format!(
        r#"```json
{{
  "severity": "{severity}",
  "divergence_summary": "Retention periods differ.",
  "conflicting_policy_excerpt": "kept for 36 months",
  "new_rule_excerpt": "deleted after 12 months",
  "recommendation": "Align retention with the regulation."
}}
```"#
    )
}

#[async_trait]
impl TextOracle for ScriptedOracle {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        let reply = self
            .rules
            .iter()
            .find(|(key, _)| prompt.contains(key))
            .map(|(_, reply)| reply.clone())
            .unwrap_or(Reply::Severity("LOW"));

        match reply {
            Reply::Severity(s) => Ok(verdict_json(s)),
            Reply::Garbage => Ok("I could not decide.".into()),
            Reply::Empty => Ok(String::new()),
            Reply::Fail => Err(OracleError::Transport("connection refused".into())),
            Reply::Delayed(d, s) => {
                tokio::time::sleep(d).await;
                Ok(verdict_json(s))
            }
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(verdict_json("LOW"))
            }
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

//! LLM-backed conflict classification of a policy excerpt against a new regulation.
//!
//! One oracle call per excerpt. The response is expected to be a JSON object
//! with `severity`, `divergence_summary`, `conflicting_policy_excerpt`,
//! `new_rule_excerpt` and `recommendation`. Markdown code fences are stripped
//! before parsing. Output that still does not parse becomes a MEDIUM fallback
//! verdict built from the inputs; only a failed call (transport, status,
//! timeout) is an error.

use std::sync::Arc;
use std::time::Duration;

use arca_core::{ConflictVerdict, PolicyExcerpt, Severity};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{OracleError, TextOracle};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Characters of each input quoted in a fallback verdict.
pub const FALLBACK_QUOTE_CHARS: usize = 200;
pub const FALLBACK_SUMMARY: &str = "Analysis failed - manual review required";
pub const FALLBACK_RECOMMENDATION: &str = "Manual legal review required due to analysis error";

/// Outcome of classifying one excerpt.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// The oracle answered with a well-formed verdict.
    Verdict(ConflictVerdict),
    /// The oracle answered but its output was unusable; `verdict` is the
    /// MEDIUM fallback and `reason` says why parsing failed.
    Fallback {
        verdict: ConflictVerdict,
        reason: String,
    },
}

impl Classification {
    pub fn verdict(&self) -> &ConflictVerdict {
        match self {
            Self::Verdict(v) | Self::Fallback { verdict: v, .. } => v,
        }
    }

    pub fn into_verdict(self) -> ConflictVerdict {
        match self {
            Self::Verdict(v) | Self::Fallback { verdict: v, .. } => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// The JSON object the oracle is asked to produce.
#[derive(Debug, Deserialize)]
struct OracleVerdict {
    severity: Severity,
    divergence_summary: String,
    conflicting_policy_excerpt: String,
    new_rule_excerpt: String,
    recommendation: String,
}

/// Classifies excerpts with a [`TextOracle`], one call per excerpt.
pub struct ConflictClassifier {
    oracle: Arc<dyn TextOracle>,
    timeout: Duration,
}

impl ConflictClassifier {
    pub fn new(oracle: Arc<dyn TextOracle>) -> Self {
        Self {
            oracle,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Per-call deadline. A call that exceeds it fails with
    /// [`OracleError::Timeout`] and is not retried.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Classify `excerpt` against `regulation_text`.
    pub async fn classify(
        &self,
        excerpt: &PolicyExcerpt,
        regulation_text: &str,
    ) -> Result<Classification, OracleError> {
        let prompt = build_prompt(&excerpt.text, regulation_text);

        let raw = tokio::time::timeout(self.timeout, self.oracle.generate(&prompt))
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))??;

        match parse_response(&raw) {
            Ok(parsed) => {
                let verdict = ConflictVerdict {
                    policy_id: excerpt.id.clone(),
                    severity: parsed.severity,
                    summary: parsed.divergence_summary,
                    conflicting_policy_quote: parsed.conflicting_policy_excerpt,
                    new_rule_quote: parsed.new_rule_excerpt,
                    recommendation: parsed.recommendation,
                    source_document: excerpt.source_document.clone(),
                    page_number: excerpt.page_number,
                };
                info!(
                    policy_id = %verdict.policy_id,
                    severity = %verdict.severity,
                    model = self.oracle.model(),
                    "excerpt classified"
                );
                Ok(Classification::Verdict(verdict))
            }
            Err(reason) => {
                warn!(
                    policy_id = %excerpt.id,
                    error = %reason,
                    raw = %truncate_chars(&raw, FALLBACK_QUOTE_CHARS),
                    "malformed oracle output, using fallback verdict"
                );
                Ok(Classification::Fallback {
                    verdict: fallback_verdict(excerpt, regulation_text),
                    reason,
                })
            }
        }
    }
}

/// Build the comparison task sent to the oracle.
pub fn build_prompt(policy_text: &str, regulation_text: &str) -> String {
    format!(
        "You are a legal compliance expert. Decide whether the company's internal policy \
         conflicts with the new regulation.\n\
         \n\
         Internal policy excerpt:\n\
         {policy_text}\n\
         \n\
         New regulation:\n\
         {regulation_text}\n\
         \n\
         Compare the two texts and determine:\n\
         1. severity: HIGH (direct contradiction, immediate action required), \
         MEDIUM (potential conflict, needs review) or LOW (minor discrepancy or no conflict)\n\
         2. divergence_summary: one or two sentences on the nature of the conflict, if any\n\
         3. conflicting_policy_excerpt: the exact words of the internal policy that conflict\n\
         4. new_rule_excerpt: the exact words of the new regulation that conflict\n\
         5. recommendation: a clear action item for the legal team\n\
         \n\
         Respond ONLY with a JSON object in exactly this format:\n\
         {{\n\
         \x20 \"severity\": \"HIGH|MEDIUM|LOW\",\n\
         \x20 \"divergence_summary\": \"brief explanation\",\n\
         \x20 \"conflicting_policy_excerpt\": \"exact quote from policy\",\n\
         \x20 \"new_rule_excerpt\": \"exact quote from regulation\",\n\
         \x20 \"recommendation\": \"specific action to take\"\n\
         }}"
    )
}

/// Remove Markdown code-fence markers (```` ```json ```` and ```` ``` ````).
pub fn strip_code_fences(raw: &str) -> String {
    raw.trim()
        .replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

fn parse_response(raw: &str) -> Result<OracleVerdict, String> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(&cleaned).map_err(|e| e.to_string())
}

/// MEDIUM verdict quoting the inputs directly, for unusable oracle output.
pub fn fallback_verdict(excerpt: &PolicyExcerpt, regulation_text: &str) -> ConflictVerdict {
    ConflictVerdict {
        policy_id: excerpt.id.clone(),
        severity: Severity::Medium,
        summary: FALLBACK_SUMMARY.to_string(),
        conflicting_policy_quote: truncate_chars(&excerpt.text, FALLBACK_QUOTE_CHARS),
        new_rule_quote: truncate_chars(regulation_text, FALLBACK_QUOTE_CHARS),
        recommendation: FALLBACK_RECOMMENDATION.to_string(),
        source_document: excerpt.source_document.clone(),
        page_number: excerpt.page_number,
    }
}

/// First `max` characters of `s` (by `char`, never splitting a code point).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

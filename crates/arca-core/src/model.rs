//! Shared types passed between retrieval, classification, and aggregation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ordinal conflict strength assigned to one policy excerpt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown severity {0:?}, expected HIGH, MEDIUM or LOW")]
pub struct UnknownSeverity(pub String);

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::High, Severity::Medium, Severity::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownSeverity;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = UnknownSeverity;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Severity> for String {
    fn from(value: Severity) -> Self {
        value.as_str().to_string()
    }
}

/// An internal-policy passage returned by retrieval.
///
/// `id` is rank-based (`POL-001` is the best match of one retrieval call) and
/// is not unique across calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyExcerpt {
    #[serde(rename = "policy_id")]
    pub id: String,
    #[serde(rename = "excerpt")]
    pub text: String,
    #[serde(rename = "source")]
    pub source_document: String,
    #[serde(rename = "page")]
    pub page_number: Option<u32>,
    #[serde(rename = "similarity_score")]
    pub relevance_score: f32,
}

impl PolicyExcerpt {
    /// Rank-based identifier for the excerpt at 0-based position `rank`.
    pub fn rank_id(rank: usize) -> String {
        format!("POL-{:03}", rank + 1)
    }
}

/// The classifier's judgement of one excerpt against the regulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictVerdict {
    pub policy_id: String,
    pub severity: Severity,
    #[serde(rename = "divergence_summary")]
    pub summary: String,
    #[serde(rename = "conflicting_policy_excerpt")]
    pub conflicting_policy_quote: String,
    #[serde(rename = "new_rule_excerpt")]
    pub new_rule_quote: String,
    pub recommendation: String,
    #[serde(rename = "source")]
    pub source_document: String,
    #[serde(rename = "page")]
    pub page_number: Option<u32>,
}

//! Pipeline controller: Retriever, then Conflict Classifier once per excerpt,
//! then Aggregator.
//!
//! ```text
//! Retrieving ──► Classifying ──► Aggregating ──► Done
//!     │               │
//!     ▼               ▼
//! NoPoliciesFound  NoVerdictsProduced
//! ```
//!
//! Transitions only move forward and nothing is retried here. Classification
//! calls may overlap up to `concurrency`, but verdicts always come out in
//! retrieval order.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use arca_ai::{Classification, ConflictClassifier};
use arca_core::{ComplianceReport, PolicyExcerpt};
use futures::StreamExt;
use futures::stream;
use tracing::{debug, info, warn};

use crate::{Aggregator, DroppedExcerpt, PipelineError, Retriever};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Excerpts retrieved per regulation.
    pub top_k: usize,
    /// Classification calls in flight at once. 1 means strictly sequential.
    pub concurrency: usize,
    /// Deadline for a single oracle call.
    pub oracle_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            concurrency: 1,
            oracle_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Retrieving,
    Classifying,
    Aggregating,
    Done,
    NoPoliciesFound,
    NoVerdictsProduced,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::NoPoliciesFound | Self::NoVerdictsProduced
        )
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        matches!(
            (self, next),
            (Self::Retrieving, Self::Classifying)
                | (Self::Retrieving, Self::NoPoliciesFound)
                | (Self::Classifying, Self::Aggregating)
                | (Self::Classifying, Self::NoVerdictsProduced)
                | (Self::Aggregating, Self::Done)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Retrieving => "RETRIEVING",
            Self::Classifying => "CLASSIFYING",
            Self::Aggregating => "AGGREGATING",
            Self::Done => "DONE",
            Self::NoPoliciesFound => "NO_POLICIES_FOUND",
            Self::NoVerdictsProduced => "NO_VERDICTS_PRODUCED",
        })
    }
}

/// Current state of one run.
struct Run {
    state: PipelineState,
}

impl Run {
    fn start() -> Self {
        debug!(state = %PipelineState::Retrieving, "pipeline started");
        Self {
            state: PipelineState::Retrieving,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {next}",
            self.state
        );
        debug!(from = %self.state, to = %next, "pipeline transition");
        self.state = next;
    }
}

/// Result of a completed run.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub report: ComplianceReport,
    pub report_path: PathBuf,
    /// Every excerpt retrieval returned, in rank order.
    pub retrieved: Vec<PolicyExcerpt>,
    /// Excerpts whose classification call failed; absent from the report.
    pub dropped: Vec<DroppedExcerpt>,
    /// Verdicts in the report that are fallbacks for malformed oracle output.
    pub fallbacks: usize,
}

impl PipelineOutcome {
    /// True when every retrieved excerpt got a verdict.
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// The three components wired together. Build once, run many times.
pub struct Pipeline {
    retriever: Retriever,
    classifier: ConflictClassifier,
    aggregator: Aggregator,
    config: PipelineConfig,
}

impl Pipeline {
    /// `config.oracle_timeout` replaces the classifier's own timeout.
    pub fn new(
        retriever: Retriever,
        classifier: ConflictClassifier,
        aggregator: Aggregator,
        config: PipelineConfig,
    ) -> Self {
        let classifier = classifier.with_timeout(config.oracle_timeout);
        Self {
            retriever,
            classifier,
            aggregator,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Analyse one regulation and persist its report.
    pub async fn run(
        &self,
        regulation_text: &str,
        law_date: Option<&str>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut run = Run::start();

        let retrieved = self
            .retriever
            .retrieve(regulation_text, self.config.top_k)
            .await?;
        if retrieved.is_empty() {
            run.advance(PipelineState::NoPoliciesFound);
            warn!("no relevant policies found, skipping classification");
            return Err(PipelineError::EmptyRetrieval);
        }

        run.advance(PipelineState::Classifying);
        let concurrency = self.config.concurrency.max(1);
        let results: Vec<_> = stream::iter(&retrieved)
            .map(|excerpt| async move {
                let result = self.classifier.classify(excerpt, regulation_text).await;
                (excerpt, result)
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut verdicts = Vec::with_capacity(results.len());
        let mut dropped = Vec::new();
        let mut fallbacks = 0;
        for (excerpt, result) in results {
            match result {
                Ok(classification) => {
                    if let Classification::Fallback { .. } = classification {
                        fallbacks += 1;
                    }
                    verdicts.push(classification.into_verdict());
                }
                Err(e) => {
                    warn!(policy_id = %excerpt.id, error = %e, "oracle call failed, excerpt dropped");
                    dropped.push(DroppedExcerpt {
                        policy_id: excerpt.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if verdicts.is_empty() {
            run.advance(PipelineState::NoVerdictsProduced);
            return Err(PipelineError::NoVerdictsProduced {
                attempted: retrieved.len(),
                failures: dropped,
            });
        }

        run.advance(PipelineState::Aggregating);
        let (report, report_path) =
            self.aggregator
                .aggregate(verdicts, regulation_text, law_date)?;

        run.advance(PipelineState::Done);
        info!(
            regulation_id = %report.regulation_id,
            retrieved = retrieved.len(),
            analysed = report.total_risks_flagged,
            dropped = dropped.len(),
            fallbacks,
            "pipeline finished"
        );

        Ok(PipelineOutcome {
            report,
            report_path,
            retrieved,
            dropped,
            fallbacks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{REGULATION, Reply, ScriptedOracle, StubEmbedder, index_with};
    use arca_core::Severity;
    use arca_store::{MemoryIndex, ReportStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    const RETENTION: &str = "Customer records are kept for 36 months after last login.";
    const ARCHIVE: &str = "Inactive accounts are archived, not deleted.";
    const TRAVEL: &str = "Staff book economy class for flights under six hours.";

    fn pipeline(
        dir: &TempDir,
        index: MemoryIndex,
        rules: Vec<(&'static str, Reply)>,
        config: PipelineConfig,
    ) -> Pipeline {
        Pipeline::new(
            Retriever::new(StubEmbedder::new(), Arc::new(index)),
            ConflictClassifier::new(ScriptedOracle::new(rules)),
            Aggregator::new(ReportStore::open(dir.path()).unwrap()),
            config,
        )
    }

    fn severities(report: &ComplianceReport) -> Vec<Severity> {
        report.verdicts.iter().map(|v| v.severity).collect()
    }

    fn ids(report: &ComplianceReport) -> Vec<&str> {
        report.verdicts.iter().map(|v| v.policy_id.as_str()).collect()
    }

    #[tokio::test]
    async fn high_and_low_scenario() {
        let dir = TempDir::new().unwrap();
        let p = pipeline(
            &dir,
            index_with(&[(RETENTION, 0.9), (TRAVEL, 0.4)]),
            vec![(RETENTION, Reply::Severity("HIGH")), (TRAVEL, Reply::Severity("LOW"))],
            PipelineConfig::default(),
        );

        let outcome = p.run(REGULATION, Some("2025-12-06")).await.unwrap();
        let report = &outcome.report;

        assert_eq!(report.total_risks_flagged, 2);
        assert_eq!(report.risk_breakdown.high, 1);
        assert_eq!(report.risk_breakdown.medium, 0);
        assert_eq!(report.risk_breakdown.low, 1);
        assert!(report.overall_recommendation.starts_with("URGENT: 1 high-priority conflicts"));
        assert_eq!(report.law_date, "2025-12-06");
        assert_eq!(ids(report), ["POL-001", "POL-002"]);
        assert_eq!(report.verdicts[0].source_document, "policies/doc1.pdf");
        assert!(outcome.is_complete());
        assert_eq!(outcome.fallbacks, 0);

        assert!(outcome.report_path.exists());
        let names = p.aggregator().store().list().unwrap();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(&format!("_{}.json", report.regulation_id)));
    }

    #[tokio::test]
    async fn empty_retrieval_never_aggregates() {
        let dir = TempDir::new().unwrap();
        let p = pipeline(&dir, MemoryIndex::default(), vec![], PipelineConfig::default());

        let err = p.run(REGULATION, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyRetrieval));
        assert_eq!(err.terminal_state(), PipelineState::NoPoliciesFound);
        assert!(p.aggregator().store().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_calls_failing_is_no_verdicts() {
        let dir = TempDir::new().unwrap();
        let p = pipeline(
            &dir,
            index_with(&[(RETENTION, 0.9), (ARCHIVE, 0.7)]),
            vec![(RETENTION, Reply::Fail), (ARCHIVE, Reply::Fail)],
            PipelineConfig::default(),
        );

        let err = p.run(REGULATION, None).await.unwrap_err();
        let PipelineError::NoVerdictsProduced { attempted, failures } = &err else {
            panic!("expected NoVerdictsProduced, got {err:?}");
        };
        assert_eq!(*attempted, 2);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].policy_id, "POL-001");
        assert_eq!(err.terminal_state(), PipelineState::NoVerdictsProduced);
        assert!(p.aggregator().store().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_failure_still_reports() {
        let dir = TempDir::new().unwrap();
        let p = pipeline(
            &dir,
            index_with(&[(RETENTION, 0.9), (ARCHIVE, 0.7), (TRAVEL, 0.3)]),
            vec![
                (RETENTION, Reply::Severity("MEDIUM")),
                (ARCHIVE, Reply::Fail),
                (TRAVEL, Reply::Garbage),
            ],
            PipelineConfig::default(),
        );

        let outcome = p.run(REGULATION, None).await.unwrap();
        assert_eq!(outcome.retrieved.len(), 3);
        assert_eq!(ids(&outcome.report), ["POL-001", "POL-003"]);
        assert_eq!(severities(&outcome.report), [Severity::Medium, Severity::Medium]);
        assert_eq!(outcome.fallbacks, 1);
        assert_eq!(
            outcome.dropped,
            [DroppedExcerpt {
                policy_id: "POL-002".into(),
                reason: "oracle request failed: connection refused".into(),
            }]
        );
        assert!(!outcome.is_complete());
        assert!(
            outcome
                .report
                .overall_recommendation
                .starts_with("ACTION REQUIRED: 2 medium-priority")
        );
    }

    #[tokio::test]
    async fn empty_reply_is_a_fallback_not_a_drop() {
        let dir = TempDir::new().unwrap();
        let p = pipeline(
            &dir,
            index_with(&[(RETENTION, 0.9)]),
            vec![(RETENTION, Reply::Empty)],
            PipelineConfig::default(),
        );

        let outcome = p.run(REGULATION, None).await.unwrap();
        assert!(outcome.dropped.is_empty());
        assert_eq!(outcome.fallbacks, 1);
        assert_eq!(ids(&outcome.report), ["POL-001"]);
        assert_eq!(severities(&outcome.report), [Severity::Medium]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_classification_keeps_retrieval_order() {
        let dir = TempDir::new().unwrap();
        let p = pipeline(
            &dir,
            index_with(&[(RETENTION, 0.9), (ARCHIVE, 0.7), (TRAVEL, 0.3)]),
            vec![
                (RETENTION, Reply::Delayed(Duration::from_secs(3), "HIGH")),
                (ARCHIVE, Reply::Delayed(Duration::from_secs(2), "MEDIUM")),
                (TRAVEL, Reply::Delayed(Duration::from_secs(1), "LOW")),
            ],
            PipelineConfig {
                concurrency: 3,
                ..PipelineConfig::default()
            },
        );

        let started = tokio::time::Instant::now();
        let outcome = p.run(REGULATION, None).await.unwrap();
        assert_eq!(ids(&outcome.report), ["POL-001", "POL-002", "POL-003"]);
        assert_eq!(
            severities(&outcome.report),
            [Severity::High, Severity::Medium, Severity::Low]
        );
        // Overlapped, so bounded by the slowest call rather than the sum.
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_call_is_dropped() {
        let dir = TempDir::new().unwrap();
        let p = pipeline(
            &dir,
            index_with(&[(RETENTION, 0.9), (ARCHIVE, 0.7)]),
            vec![(RETENTION, Reply::Hang), (ARCHIVE, Reply::Severity("LOW"))],
            PipelineConfig {
                oracle_timeout: Duration::from_secs(5),
                ..PipelineConfig::default()
            },
        );

        let outcome = p.run(REGULATION, None).await.unwrap();
        assert_eq!(ids(&outcome.report), ["POL-002"]);
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].policy_id, "POL-001");
        assert!(outcome.dropped[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn persistence_failure_carries_report() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("reports");
        let p = Pipeline::new(
            Retriever::new(StubEmbedder::new(), Arc::new(index_with(&[(RETENTION, 0.9)]))),
            ConflictClassifier::new(ScriptedOracle::new(vec![(RETENTION, Reply::Severity("HIGH"))])),
            Aggregator::new(ReportStore::open(&out).unwrap()),
            PipelineConfig::default(),
        );
        std::fs::remove_dir_all(&out).unwrap();

        let err = p.run(REGULATION, None).await.unwrap_err();
        assert_eq!(err.terminal_state(), PipelineState::Aggregating);
        let report = err.report().expect("report carried on persistence failure");
        assert_eq!(report.risk_breakdown.high, 1);
    }

    #[test]
    fn transitions_only_move_forward() {
        use PipelineState::*;
        assert!(Retrieving.can_advance_to(Classifying));
        assert!(Classifying.can_advance_to(Aggregating));
        assert!(Aggregating.can_advance_to(Done));
        assert!(!Classifying.can_advance_to(Retrieving));
        assert!(!Retrieving.can_advance_to(Aggregating));
        assert!(!Done.can_advance_to(Retrieving));
        assert!(NoPoliciesFound.is_terminal());
        assert!(!Classifying.is_terminal());
    }
}

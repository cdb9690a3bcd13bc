//! Compliance report assembly.
//!
//! Pure aggregation of classifier verdicts into a [`ComplianceReport`]. Writing
//! the report to disk lives in `arca-store`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{ConflictVerdict, Severity};
use crate::regulation_id::regulation_id;

/// Value of `date_of_law` when the caller gives no law date.
pub const LAW_DATE_NOT_SPECIFIED: &str = "Not specified";

/// Verdict counts per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskBreakdown {
    #[serde(rename = "HIGH")]
    pub high: usize,
    #[serde(rename = "MEDIUM")]
    pub medium: usize,
    #[serde(rename = "LOW")]
    pub low: usize,
}

impl RiskBreakdown {
    /// Count verdicts by the severity they carry. Severity is never re-derived.
    pub fn count(verdicts: &[ConflictVerdict]) -> Self {
        let mut breakdown = Self::default();
        for verdict in verdicts {
            match verdict.severity {
                Severity::High => breakdown.high += 1,
                Severity::Medium => breakdown.medium += 1,
                Severity::Low => breakdown.low += 1,
            }
        }
        breakdown
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

/// The aggregated result of one pipeline run.
///
/// Invariant: `total_risks_flagged == verdicts.len() == risk_breakdown.total()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub regulation_id: String,
    #[serde(rename = "date_of_law")]
    pub law_date: String,
    #[serde(rename = "date_processed")]
    pub processed_date: String,
    #[serde(rename = "time_processed")]
    pub processed_time: String,
    pub total_risks_flagged: usize,
    pub risk_breakdown: RiskBreakdown,
    #[serde(rename = "risks")]
    pub verdicts: Vec<ConflictVerdict>,
    #[serde(rename = "recommendation")]
    pub overall_recommendation: String,
}

impl ComplianceReport {
    /// Build a report from verdicts in retrieval order.
    ///
    /// `processed_at` is stamped into the date/time fields only; it never feeds
    /// the regulation identifier.
    pub fn assemble(
        verdicts: Vec<ConflictVerdict>,
        regulation_text: &str,
        law_date: Option<&str>,
        processed_at: NaiveDateTime,
    ) -> Self {
        let regulation_id = regulation_id(regulation_text, law_date);
        let risk_breakdown = RiskBreakdown::count(&verdicts);
        let overall_recommendation = overall_recommendation(&risk_breakdown);

        debug!(
            regulation_id = %regulation_id,
            high = risk_breakdown.high,
            medium = risk_breakdown.medium,
            low = risk_breakdown.low,
            "assembled compliance report"
        );

        Self {
            regulation_id,
            law_date: law_date.unwrap_or(LAW_DATE_NOT_SPECIFIED).to_string(),
            processed_date: processed_at.format("%Y-%m-%d").to_string(),
            processed_time: processed_at.format("%H:%M:%S").to_string(),
            total_risks_flagged: verdicts.len(),
            risk_breakdown,
            verdicts,
            overall_recommendation,
        }
    }

    /// Check the count invariant. Reports loaded from disk may have been edited.
    pub fn is_consistent(&self) -> bool {
        self.total_risks_flagged == self.verdicts.len()
            && self.risk_breakdown.total() == self.verdicts.len()
            && self.risk_breakdown == RiskBreakdown::count(&self.verdicts)
    }
}

/// Overall recommendation; the first matching rule wins (HIGH, then MEDIUM).
pub fn overall_recommendation(breakdown: &RiskBreakdown) -> String {
    if breakdown.high > 0 {
        format!(
            "URGENT: {} high-priority conflicts require immediate legal review and policy updates.",
            breakdown.high
        )
    } else if breakdown.medium > 0 {
        format!(
            "ACTION REQUIRED: {} medium-priority conflicts need review within 30 days.",
            breakdown.medium
        )
    } else {
        "No critical conflicts detected. Minor discrepancies should be reviewed during next policy update cycle.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const TEXT: &str = "All personal data must be deleted after 12 months of inactivity.";

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 12, 6)
            .unwrap()
            .and_hms_opt(14, 3, 9)
            .unwrap()
    }

    fn verdict(id: &str, severity: Severity) -> ConflictVerdict {
        ConflictVerdict {
            policy_id: id.into(),
            severity,
            summary: format!("{severity} finding"),
            conflicting_policy_quote: "policy".into(),
            new_rule_quote: "rule".into(),
            recommendation: "review".into(),
            source_document: "policies/handbook.pdf".into(),
            page_number: Some(3),
        }
    }

    #[test]
    fn high_and_low_scenario() {
        let report = ComplianceReport::assemble(
            vec![verdict("POL-001", Severity::High), verdict("POL-002", Severity::Low)],
            TEXT,
            Some("2025-12-06"),
            at(),
        );

        assert_eq!(report.total_risks_flagged, 2);
        assert_eq!(
            report.risk_breakdown,
            RiskBreakdown {
                high: 1,
                medium: 0,
                low: 1
            }
        );
        assert!(
            report
                .overall_recommendation
                .starts_with("URGENT: 1 high-priority conflicts")
        );
        assert_eq!(report.law_date, "2025-12-06");
        assert_eq!(report.regulation_id, regulation_id(TEXT, Some("2025-12-06")));
        assert!(report.is_consistent());
    }

    #[test]
    fn verdict_order_is_kept() {
        let report = ComplianceReport::assemble(
            vec![
                verdict("POL-001", Severity::Low),
                verdict("POL-002", Severity::High),
                verdict("POL-003", Severity::Medium),
            ],
            TEXT,
            None,
            at(),
        );
        let ids: Vec<&str> = report.verdicts.iter().map(|v| v.policy_id.as_str()).collect();
        assert_eq!(ids, ["POL-001", "POL-002", "POL-003"]);
    }

    #[test]
    fn missing_law_date_is_not_specified() {
        let report = ComplianceReport::assemble(vec![], TEXT, None, at());
        assert_eq!(report.law_date, LAW_DATE_NOT_SPECIFIED);
        assert_eq!(report.processed_date, "2025-12-06");
        assert_eq!(report.processed_time, "14:03:09");
    }

    #[test]
    fn id_ignores_processing_time() {
        let later = at() + chrono::Duration::hours(30);
        let a = ComplianceReport::assemble(vec![], TEXT, Some("2025-12-06"), at());
        let b = ComplianceReport::assemble(vec![], TEXT, Some("2025-12-06"), later);
        assert_eq!(a.regulation_id, b.regulation_id);
        assert_ne!(a.processed_date, b.processed_date);
    }

    #[test]
    fn recommendation_priority() {
        let medium = RiskBreakdown {
            high: 0,
            medium: 2,
            low: 5,
        };
        assert_eq!(
            overall_recommendation(&medium),
            "ACTION REQUIRED: 2 medium-priority conflicts need review within 30 days."
        );

        let high_wins = RiskBreakdown {
            high: 3,
            medium: 2,
            low: 0,
        };
        assert!(overall_recommendation(&high_wins).starts_with("URGENT: 3 "));

        let low_only = RiskBreakdown {
            high: 0,
            medium: 0,
            low: 4,
        };
        assert!(overall_recommendation(&low_only).starts_with("No critical conflicts detected."));
        assert!(overall_recommendation(&RiskBreakdown::default()).starts_with("No critical"));
    }

    #[test]
    fn breakdown_sums_to_total() {
        let verdicts: Vec<ConflictVerdict> = [
            Severity::High,
            Severity::Medium,
            Severity::Medium,
            Severity::Low,
            Severity::High,
        ]
        .iter()
        .enumerate()
        .map(|(i, s)| verdict(&format!("POL-{:03}", i + 1), *s))
        .collect();

        let report = ComplianceReport::assemble(verdicts, TEXT, None, at());
        for severity in Severity::ALL {
            assert!(report.risk_breakdown.get(severity) > 0);
        }
        assert_eq!(report.risk_breakdown.total(), report.total_risks_flagged);
        assert_eq!(report.total_risks_flagged, report.verdicts.len());
    }

    #[test]
    fn wire_format_keys() {
        let report = ComplianceReport::assemble(
            vec![verdict("POL-001", Severity::Medium)],
            TEXT,
            Some("2025-12-06"),
            at(),
        );
        let value = serde_json::to_value(&report).unwrap();
        for key in [
            "regulation_id",
            "date_of_law",
            "date_processed",
            "time_processed",
            "total_risks_flagged",
            "risk_breakdown",
            "risks",
            "recommendation",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(value["risk_breakdown"]["MEDIUM"], 1);
        assert_eq!(value["risks"][0]["severity"], "MEDIUM");

        let back: ComplianceReport = serde_json::from_value(value).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn edited_report_is_inconsistent() {
        let mut report = ComplianceReport::assemble(
            vec![verdict("POL-001", Severity::High)],
            TEXT,
            None,
            at(),
        );
        report.total_risks_flagged = 4;
        assert!(!report.is_consistent());
    }
}

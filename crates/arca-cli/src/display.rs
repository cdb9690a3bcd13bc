//! Terminal rendering for retrieval results and compliance reports.

use arca_core::{ComplianceReport, ConflictVerdict, PolicyExcerpt, Severity};
use arca_pipeline::DroppedExcerpt;

const EXCERPT_PREVIEW: usize = 160;

/// Print a compliance report as a card: header, breakdown, then one block per verdict.
pub fn print_report_card(report: &ComplianceReport) {
    println!("=== Compliance report {} ===", report.regulation_id);
    println!("{}", report.overall_recommendation);
    println!();

    println!("Summary");
    println!("  {:<20} {}", "date_of_law", report.law_date);
    println!(
        "  {:<20} {} {}",
        "processed", report.processed_date, report.processed_time
    );
    println!("  {:<20} {}", "total_risks_flagged", report.total_risks_flagged);
    for severity in Severity::ALL {
        println!(
            "  {:<20} {}",
            severity.as_str(),
            report.risk_breakdown.get(severity)
        );
    }
    println!();

    if report.verdicts.is_empty() {
        return;
    }
    println!("Risks ({}):", report.verdicts.len());
    for verdict in &report.verdicts {
        print_verdict(verdict);
    }
}

fn print_verdict(v: &ConflictVerdict) {
    print!("  [{:<6}] {}  {}", v.severity.as_str(), v.policy_id, v.source_document);
    if let Some(page) = v.page_number {
        print!(" p.{page}");
    }
    println!();
    println!("      {}", v.summary);
    if !v.conflicting_policy_quote.is_empty() {
        println!("      policy: \"{}\"", preview(&v.conflicting_policy_quote));
    }
    if !v.new_rule_quote.is_empty() {
        println!("      rule:   \"{}\"", preview(&v.new_rule_quote));
    }
    println!("      -> {}", v.recommendation);
}

/// Print ranked excerpts as returned by retrieval.
pub fn print_excerpts(excerpts: &[PolicyExcerpt]) {
    if excerpts.is_empty() {
        println!("No matching policy excerpts.");
        return;
    }
    for e in excerpts {
        let page = e
            .page_number
            .map(|p| format!("p.{p}"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{}  {:.4}  {} {}",
            e.id, e.relevance_score, e.source_document, page
        );
        println!("    {}", preview(&e.text));
    }
}

pub fn print_dropped(dropped: &[DroppedExcerpt]) {
    if dropped.is_empty() {
        return;
    }
    println!("Not analysed ({}):", dropped.len());
    for d in dropped {
        println!("  {}  {}", d.policy_id, d.reason);
    }
    println!();
}

/// Single-line preview, cut on a char boundary.
fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > EXCERPT_PREVIEW {
        let cut: String = flat.chars().take(EXCERPT_PREVIEW - 3).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

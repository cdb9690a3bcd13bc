pub mod model;
pub mod regulation_id;
pub mod report;

pub use model::{ConflictVerdict, PolicyExcerpt, Severity, UnknownSeverity};
pub use regulation_id::regulation_id;
pub use report::{ComplianceReport, LAW_DATE_NOT_SPECIFIED, RiskBreakdown, overall_recommendation};

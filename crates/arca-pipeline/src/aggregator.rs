//! Verdicts to a persisted [`ComplianceReport`].

use std::path::PathBuf;

use arca_core::{ComplianceReport, ConflictVerdict};
use arca_store::ReportStore;
use chrono::{Local, NaiveDateTime};

use crate::PipelineError;

/// Assembles reports and writes them to a [`ReportStore`]. No network access.
pub struct Aggregator {
    store: ReportStore,
}

impl Aggregator {
    pub fn new(store: ReportStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Aggregate and persist, stamped with the local time.
    pub fn aggregate(
        &self,
        verdicts: Vec<ConflictVerdict>,
        regulation_text: &str,
        law_date: Option<&str>,
    ) -> Result<(ComplianceReport, PathBuf), PipelineError> {
        self.aggregate_at(verdicts, regulation_text, law_date, Local::now().naive_local())
    }

    /// Aggregate and persist with an explicit processing time.
    ///
    /// Only an empty `law_date` counts as absent; any other value is kept and
    /// hashed verbatim. On a write failure the assembled report is returned
    /// inside [`PipelineError::Persistence`].
    pub fn aggregate_at(
        &self,
        verdicts: Vec<ConflictVerdict>,
        regulation_text: &str,
        law_date: Option<&str>,
        processed_at: NaiveDateTime,
    ) -> Result<(ComplianceReport, PathBuf), PipelineError> {
        let law_date = law_date.filter(|d| !d.is_empty());
        let report = ComplianceReport::assemble(verdicts, regulation_text, law_date, processed_at);

        match self.store.write(&report, processed_at) {
            Ok(path) => Ok((report, path)),
            Err(source) => Err(PipelineError::Persistence {
                report: Box::new(report),
                source,
            }),
        }
    }
}

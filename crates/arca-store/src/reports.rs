//! Flat-file storage for compliance report artifacts.
//!
//! Reports are written as 2-space indented UTF-8 JSON named
//! `compliance_report_<YYYYMMDD_HHMMSS>_<regulation_id>.json`. Each write goes
//! to a temporary file in the same directory and is linked into place, so a
//! reader never observes a partial report even with concurrent writers. An
//! existing artifact is never replaced: a second write for the same second and
//! regulation id fails with a persistence error.

use std::io::Write;
use std::path::{Path, PathBuf};

use arca_core::ComplianceReport;
use chrono::NaiveDateTime;
use tracing::info;

use crate::StoreError;

const PREFIX: &str = "compliance_report_";
const EXTENSION: &str = ".json";

/// Directory of persisted compliance reports.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    /// Open the output directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::persistence(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Artifact filename for a report written at `at`.
    pub fn filename(at: NaiveDateTime, regulation_id: &str) -> String {
        format!("{PREFIX}{}_{regulation_id}{EXTENSION}", at.format("%Y%m%d_%H%M%S"))
    }

    /// Persist `report` atomically and return the final path. Fails if the
    /// target file already exists.
    pub fn write(&self, report: &ComplianceReport, at: NaiveDateTime) -> Result<PathBuf, StoreError> {
        let path = self.dir.join(Self::filename(at, &report.regulation_id));
        let json = serde_json::to_string_pretty(report)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".report-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| StoreError::persistence(&self.dir, e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StoreError::persistence(tmp.path(), e))?;
        tmp.persist_noclobber(&path)
            .map_err(|e| StoreError::persistence(&path, e.error))?;

        info!(
            path = %path.display(),
            regulation_id = %report.regulation_id,
            high = report.risk_breakdown.high,
            medium = report.risk_breakdown.medium,
            low = report.risk_breakdown.low,
            "compliance report saved"
        );
        Ok(path)
    }

    /// Report filenames, most recent first (descending lexicographic order).
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::persistence(&self.dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::persistence(&self.dir, e))?;
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(EXTENSION) && !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Load a stored report by filename.
    pub fn load(&self, name: &str) -> Result<ComplianceReport, StoreError> {
        if name.contains(['/', '\\']) {
            return Err(StoreError::ReportNotFound(name.to_string()));
        }
        let path = self.dir.join(name);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::ReportNotFound(name.to_string()));
            }
            Err(e) => return Err(StoreError::persistence(&path, e)),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Filenames of reports for `regulation_id`, most recent first.
    pub fn find_by_regulation_id(&self, regulation_id: &str) -> Result<Vec<String>, StoreError> {
        let suffix = format!("_{regulation_id}{EXTENSION}");
        Ok(self
            .list()?
            .into_iter()
            .filter(|name| name.starts_with(PREFIX) && name.ends_with(&suffix))
            .collect())
    }
}

//! Decoding of the analyzer's JSON report.

use tracing::{debug, info};

use crate::ingest::traits::ReportError;
use crate::model::FileViolationReport;

/// Turns captured analyzer stdout into per-file reports.
///
/// Decoding is all-or-nothing: a single malformed entry rejects the whole
/// report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportParser;

impl ReportParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses the analyzer's JSON array of file reports.
    ///
    /// A top-level `null` (Go's encoding of an empty result) yields no reports.
    ///
    /// # Errors
    ///
    /// - [`ReportError::Empty`] if the text is blank
    /// - [`ReportError::Malformed`] on any syntax or schema violation
    pub fn parse(&self, json: &str) -> Result<Vec<FileViolationReport>, ReportError> {
        if json.trim().is_empty() {
            return Err(ReportError::Empty);
        }

        debug!(bytes = json.len(), "Decoding analyzer report");
        let reports: Option<Vec<FileViolationReport>> = serde_json::from_str(json)?;
        let reports = reports.unwrap_or_default();

        info!(
            files = reports.len(),
            violations = reports.iter().map(|r| r.violations.len()).sum::<usize>(),
            "Decoded analyzer report"
        );
        Ok(reports)
    }
}

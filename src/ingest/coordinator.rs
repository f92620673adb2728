//! Merges analyzer reports into the host's metric and issue sinks.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::ingest::registry::FileRegistry;
use crate::model::{FileViolationReport, Metric, NewIssue, RuleKey, Violation};
use crate::traits::{IssueSink, MetricSink};

const REPOSITORY_SUFFIX: &str = "go";
const REPOSITORY_NAME: &str = "Go";

/// Rule repository key for a language, e.g. `"go"` → `"go-go"`.
pub fn repository_key_for_language(language: &str) -> String {
    format!("{}-{}", language.to_lowercase(), REPOSITORY_SUFFIX)
}

/// Display name of the rule repository, e.g. `"go"` → `"GO Go"`.
pub fn repository_name_for_language(language: &str) -> String {
    format!("{} {}", language.to_uppercase(), REPOSITORY_NAME)
}

/// Counts for one ingestion pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestionSummary {
    /// Reports decoded from the analyzer
    pub files_reported: usize,

    /// Reports whose path matched a tracked file
    pub files_matched: usize,

    /// Reports skipped because the host does not track the path
    pub files_skipped: usize,

    pub metrics_applied: usize,
    pub issues_applied: usize,

    /// Issues the host declined or refused
    pub issues_rejected: usize,
}

/// Applies reports to tracked files.
#[derive(Debug, Clone)]
pub struct IngestionCoordinator {
    repository_key: String,
}

impl IngestionCoordinator {
    pub fn new(repository_key: impl Into<String>) -> Self {
        Self {
            repository_key: repository_key.into(),
        }
    }

    pub fn for_language(language: &str) -> Self {
        Self::new(repository_key_for_language(language))
    }

    pub fn repository_key(&self) -> &str {
        &self.repository_key
    }

    /// Records `NCLOC` and one issue per violation for every report whose
    /// path the registry knows. Unknown paths are skipped; rejected issues
    /// are logged and counted without stopping the pass.
    ///
    /// `NCLOC` is saved once per tracked file: when several reports resolve
    /// to the same file, the first one's value is kept.
    #[instrument(skip_all, fields(repository = %self.repository_key, reports = reports.len()))]
    pub fn ingest<H, K>(
        &self,
        reports: &[FileViolationReport],
        registry: &FileRegistry<H>,
        sink: &mut K,
    ) -> IngestionSummary
    where
        K: MetricSink<H> + IssueSink<H> + ?Sized,
    {
        let mut summary = IngestionSummary {
            files_reported: reports.len(),
            ..IngestionSummary::default()
        };

        let mut measured: HashSet<&str> = HashSet::new();

        for report in reports {
            let Some((key, handle)) = registry.lookup(&report.file_path) else {
                debug!(path = %report.file_path, "No tracked file for report, skipping");
                summary.files_skipped += 1;
                continue;
            };
            summary.files_matched += 1;

            if measured.insert(key) {
                sink.save_measure(handle, Metric::Ncloc, report.lines_of_code);
                summary.metrics_applied += 1;
            } else {
                warn!(
                    path = %report.file_path,
                    file = key,
                    lines_of_code = report.lines_of_code,
                    "File reported more than once, keeping its first NCLOC"
                );
            }

            for violation in &report.violations {
                let issue = self.issue_for(violation);
                match sink.add_issue(handle, issue) {
                    Ok(true) => {
                        summary.issues_applied += 1;
                        debug!(issue = %describe(violation, &report.file_path), "Saved issue");
                    }
                    Ok(false) => {
                        summary.issues_rejected += 1;
                        debug!(issue = %describe(violation, &report.file_path), "Host declined issue");
                    }
                    Err(e) => {
                        summary.issues_rejected += 1;
                        error!(
                            path = %report.file_path,
                            line = violation.src_line,
                            error = %e,
                            "Can't add issue"
                        );
                    }
                }
            }
        }

        info!(
            matched = summary.files_matched,
            skipped = summary.files_skipped,
            metrics = summary.metrics_applied,
            issues = summary.issues_applied,
            rejected = summary.issues_rejected,
            "Ingested analyzer report"
        );
        summary
    }

    fn issue_for(&self, violation: &Violation) -> NewIssue {
        NewIssue {
            rule: RuleKey::of(&self.repository_key, &violation.rule_type),
            message: violation.description.clone(),
            line: violation.line(),
        }
    }
}

/// `type|description|path(line)`
fn describe(violation: &Violation, path: &str) -> String {
    format!(
        "{}|{}|{}({})",
        violation.rule_type, violation.description, path, violation.src_line
    )
}

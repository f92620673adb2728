//! In-memory host used by the command-line front end and by tests.
//!
//! [`RecordingHost`] tracks the source files found under a directory and
//! keeps every measure and issue the ingestion stage hands it.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::model::{Metric, NewIssue, RuleKey};
use crate::traits::{IssueRejected, IssueSink, MetricSink, SourceFiles, TrackedFile};

/// How tracked paths are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathStyle {
    /// Relative to the scanned root, `/`-separated
    #[default]
    Relative,
    /// Absolute path as found on disk
    Absolute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedMeasure {
    pub file: String,
    pub metric: Metric,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedIssue {
    pub file: String,
    pub rule: RuleKey,
    pub message: String,
    pub line: Option<u32>,
}

impl fmt::Display for RecordedIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}({})",
            self.rule.rule,
            self.message,
            self.file,
            self.line.unwrap_or(0)
        )
    }
}

/// Host that records measures and issues in memory.
///
/// Issues anchored past the end of a file with a known line count are
/// refused, the way a real host rejects out-of-range lines.
#[derive(Debug, Default)]
pub struct RecordingHost {
    language: String,
    files: Vec<String>,
    line_counts: HashMap<String, u32>,
    measures: Vec<RecordedMeasure>,
    issues: Vec<RecordedIssue>,
}

impl RecordingHost {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Self::default()
        }
    }

    /// Tracks `path` without a known line count.
    pub fn track(mut self, path: impl Into<String>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Walks `root` and tracks every file whose extension is in `suffixes`.
    pub fn scan(
        language: impl Into<String>,
        root: &Path,
        suffixes: &[String],
        style: PathStyle,
    ) -> std::io::Result<Self> {
        let mut host = Self::new(language);
        let suffixes: Vec<&str> = suffixes.iter().map(|s| s.trim_start_matches('.')).collect();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| suffixes.contains(&ext));
            if !matches {
                continue;
            }

            let key = match style {
                PathStyle::Absolute => entry.path().to_string_lossy().into_owned(),
                PathStyle::Relative => entry
                    .path()
                    .strip_prefix(root)
                    .unwrap_or(entry.path())
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
            };
            let lines = count_lines(&std::fs::read(entry.path())?);
            host.line_counts.insert(key.clone(), lines);
            host.files.push(key);
        }

        debug!(root = %root.display(), files = host.files.len(), "Scanned source files");
        Ok(host)
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn measures(&self) -> &[RecordedMeasure] {
        &self.measures
    }

    pub fn issues(&self) -> &[RecordedIssue] {
        &self.issues
    }
}

impl SourceFiles for RecordingHost {
    type Handle = String;

    fn source_files(&self, language: &str) -> Vec<TrackedFile<String>> {
        if !language.eq_ignore_ascii_case(&self.language) {
            return Vec::new();
        }
        self.files
            .iter()
            .map(|path| TrackedFile {
                path: path.clone(),
                handle: path.clone(),
            })
            .collect()
    }
}

impl MetricSink<String> for RecordingHost {
    fn save_measure(&mut self, file: &String, metric: Metric, value: i64) {
        self.measures
            .retain(|m| !(m.file == *file && m.metric == metric));
        self.measures.push(RecordedMeasure {
            file: file.clone(),
            metric,
            value,
        });
    }
}

impl IssueSink<String> for RecordingHost {
    fn add_issue(&mut self, file: &String, issue: NewIssue) -> Result<bool, IssueRejected> {
        if let (Some(line), Some(&max)) = (issue.line, self.line_counts.get(file)) {
            if line > max {
                return Err(IssueRejected(format!(
                    "line {line} is out of range in {file}, which has {max} lines"
                )));
            }
        }
        self.issues.push(RecordedIssue {
            file: file.clone(),
            rule: issue.rule,
            message: issue.message,
            line: issue.line,
        });
        Ok(true)
    }
}

fn count_lines(bytes: &[u8]) -> u32 {
    if bytes.is_empty() {
        return 0;
    }
    let newlines = bytes.iter().filter(|&&b| b == b'\n').count() as u32;
    if bytes.ends_with(b"\n") {
        newlines
    } else {
        newlines + 1
    }
}

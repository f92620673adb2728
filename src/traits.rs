use crate::model::{Metric, NewIssue};
use thiserror::Error;

/// Host refused an issue outright (as opposed to quietly not accepting it).
#[derive(Error, Debug)]
#[error("Issue rejected by host: {0}")]
pub struct IssueRejected(pub String);

/// A source file the host currently tracks, with the handle used to attach
/// measures and issues to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile<H> {
    pub path: String,
    pub handle: H,
}

/// Host file system view: enumerates the source files known for a language.
pub trait SourceFiles {
    type Handle;

    /// Returns every file the host recognizes for `language` (e.g., "go").
    fn source_files(&self, language: &str) -> Vec<TrackedFile<Self::Handle>>;
}

pub trait MetricSink<H> {
    /// Stores `value` for `metric` on `file`. Called at most once per file and metric.
    fn save_measure(&mut self, file: &H, metric: Metric, value: i64);
}

pub trait IssueSink<H> {
    /// Submits an issue; `Ok(false)` means the host declined it without error.
    fn add_issue(&mut self, file: &H, issue: NewIssue) -> Result<bool, IssueRejected>;
}

/// Everything an analysis pass needs from the host, in one value.
pub trait Host:
    SourceFiles + MetricSink<<Self as SourceFiles>::Handle> + IssueSink<<Self as SourceFiles>::Handle>
{
}

impl<T> Host for T where
    T: SourceFiles
        + MetricSink<<T as SourceFiles>::Handle>
        + IssueSink<<T as SourceFiles>::Handle>
        + ?Sized
{
}

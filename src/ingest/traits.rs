//! Error types for each stage of an analysis pass.
//!
//! Every stage returns its own error; [`PipelineError`](super::PipelineError)
//! wraps them so the caller can abort the current pass and keep running.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while resolving or materializing the analyzer binary.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The OS key has no entry in the executable descriptor
    #[error("OS '{os_name}' is not supported: no bundled analyzer for key '{key}'")]
    UnsupportedPlatform { os_name: String, key: String },

    /// The bundle does not contain the binary for this platform
    #[error("Cannot find file '{entry}' in bundle '{}'", bundle.display())]
    NotFound { entry: String, bundle: PathBuf },

    /// The bundle archive is corrupted or unreadable
    #[error("Bundle archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Generic I/O error while locating or copying the binary
    #[error("I/O error during extraction: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while running the analyzer subprocess.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The subprocess could not be started
    #[error("Failed to launch '{}': {source}", program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The analyzer wrote to its error stream
    #[error("Analyzer reported errors: {0}")]
    AnalyzerReported(String),

    /// The analyzer did not finish within the configured bound
    #[error("Analyzer timed out after {limit:?}")]
    TimedOut { limit: Duration },

    /// A stream drain task failed to complete
    #[error("Output drain task failed: {0}")]
    Drain(String),

    /// Waiting on the subprocess or reading its pipes failed
    #[error("I/O error while running analyzer: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while decoding the analyzer's JSON report.
#[derive(Error, Debug)]
pub enum ReportError {
    /// The analyzer produced no output at all
    #[error("Analyzer produced an empty report")]
    Empty,

    /// Syntax or schema violation in the report
    #[error("Malformed analyzer report: {0}")]
    Malformed(#[from] serde_json::Error),
}

// ============================================================================
// Tests
// ============================================================================

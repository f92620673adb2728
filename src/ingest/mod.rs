//! Ingest module - analyzer extraction, execution and report ingestion.
//!
//! This module provides the stages of one analysis pass:
//! - **Platform**: OS key → bundled binary via [`ExecutableDescriptor`]
//! - **Archive**: Materializes the binary via [`ArchiveExtractor`]
//! - **Report**: Decodes analyzer JSON via [`ReportParser`]
//! - **Coordinator**: Applies reports to tracked files via [`IngestionCoordinator`]
//! - **Pipeline**: Async pass executor via [`pipeline::IngestionPipeline`]

pub mod archive;
pub mod coordinator;
pub mod pipeline;
pub mod platform;
pub mod registry;
pub mod report;
pub mod traits;

// Re-export commonly used types
pub use archive::{ArchiveExtractor, ExtractedBinary};
pub use coordinator::{
    repository_key_for_language, repository_name_for_language, IngestionCoordinator,
    IngestionSummary,
};
pub use platform::ExecutableDescriptor;
pub use registry::FileRegistry;
pub use report::ReportParser;
pub use traits::{ExtractionError, ProcessError, ReportError};

pub use pipeline::{
    AnalyzerRunner, BinaryExtractor, IngestionPipeline, PassResult, PassStats, PipelineError,
};

//! One analysis pass: extract the analyzer, run it, decode, ingest.
//!
//! This module provides the [`IngestionPipeline`] coordinator that executes
//! the stages (Extractor → Runner → Parser → Coordinator) with:
//! - Async execution via `tokio`
//! - Structured logging via `tracing`
//! - Typed errors: a failing stage aborts only the current pass
//! - Automatic cleanup of the extracted binary via RAII (`Drop` on `ExtractedBinary`)

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::executor::{CapturedOutput, ProcessInvocation};
use crate::ingest::archive::ExtractedBinary;
use crate::ingest::coordinator::{IngestionCoordinator, IngestionSummary};
use crate::ingest::platform::{current_arch, current_os_name};
use crate::ingest::registry::FileRegistry;
use crate::ingest::report::ReportParser;
use crate::ingest::traits::{ExtractionError, ProcessError, ReportError};
use crate::traits::Host;

// ============================================================================
// Pipeline Types
// ============================================================================

/// Outcome of a completed pass.
#[derive(Debug, Clone)]
pub struct PassResult {
    /// What was applied to the host
    pub summary: IngestionSummary,

    /// Timing statistics
    pub stats: PassStats,
}

/// Statistics about the pass.
#[derive(Debug, Default, Clone)]
pub struct PassStats {
    /// Total time spent on the entire pass (milliseconds)
    pub total_duration_ms: u64,

    /// Time spent locating and materializing the binary (milliseconds)
    pub extraction_duration_ms: u64,

    /// Time the analyzer subprocess ran (milliseconds)
    pub analysis_duration_ms: u64,

    /// Time spent decoding and ingesting the report (milliseconds)
    pub ingestion_duration_ms: u64,

    /// Source files the host tracked for the language
    pub tracked_files: usize,
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Errors that abort an analysis pass.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Platform resolution or binary extraction failed
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// The analyzer could not be run or reported errors
    #[error("Analysis failed: {0}")]
    Process(#[from] ProcessError),

    /// The analyzer's output could not be decoded
    #[error("Report decoding failed: {0}")]
    Report(#[from] ReportError),

    /// A blocking stage task panicked or was cancelled
    #[error("Stage '{stage}' task failed: {message}")]
    Task { stage: String, message: String },
}

// ============================================================================
// Stage Traits
// ============================================================================

/// Extraction stage: resolves and materializes the analyzer for an OS name.
pub trait BinaryExtractor: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ExtractionError::UnsupportedPlatform`] before touching the
    /// file system when `os_name` has no bundled binary.
    fn extract(&self, os_name: &str) -> Result<ExtractedBinary, ExtractionError>;

    /// Returns the name of this extractor stage.
    fn stage_name(&self) -> &'static str;
}

/// Analysis stage: runs the analyzer and captures its output.
#[async_trait]
pub trait AnalyzerRunner: Send + Sync {
    /// # Errors
    ///
    /// Fails when the process cannot be launched or reports errors.
    async fn run(&self, invocation: &ProcessInvocation) -> Result<CapturedOutput, ProcessError>;

    /// Returns the name of this runner stage.
    fn stage_name(&self) -> &'static str;
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Runs one analysis pass per [`IngestionPipeline::execute`] call.
///
/// # Example
///
/// ```ignore
/// use goanalyzer_bridge::executor::ProcessRunner;
/// use goanalyzer_bridge::host::{PathStyle, RecordingHost};
/// use goanalyzer_bridge::ingest::{ArchiveExtractor, ExecutableDescriptor, IngestionPipeline};
///
/// let extractor = ArchiveExtractor::new("plugin.zip", ExecutableDescriptor::default());
/// let pipeline = IngestionPipeline::new(extractor, ProcessRunner::new());
/// let mut host = RecordingHost::scan("go", root, &["go".into()], PathStyle::Relative)?;
/// let result = pipeline.execute(root, &mut host).await?;
/// println!("{} issues", result.summary.issues_applied);
/// ```
pub struct IngestionPipeline<E, R>
where
    E: BinaryExtractor,
    R: AnalyzerRunner,
{
    /// Extraction stage implementation
    extractor: Arc<E>,

    /// Analysis stage implementation
    runner: R,

    parser: ReportParser,
    coordinator: IngestionCoordinator,

    /// OS name used to pick the analyzer binary
    os_name: String,

    /// Language whose files are matched against the report
    language: String,
}

impl<E, R> IngestionPipeline<E, R>
where
    E: BinaryExtractor + 'static,
    R: AnalyzerRunner,
{
    /// Creates a pipeline for the `go` language on the running OS.
    pub fn new(extractor: E, runner: R) -> Self {
        Self {
            extractor: Arc::new(extractor),
            runner,
            parser: ReportParser::new(),
            coordinator: IngestionCoordinator::for_language("go"),
            os_name: current_os_name(),
            language: "go".to_string(),
        }
    }

    /// Overrides the detected OS name.
    pub fn with_os_name(mut self, os_name: impl Into<String>) -> Self {
        self.os_name = os_name.into();
        self
    }

    /// Sets the language key; the rule repository follows it.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self.coordinator = IngestionCoordinator::for_language(&self.language);
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn repository_key(&self) -> &str {
        self.coordinator.repository_key()
    }

    /// Runs the analyzer against `target_dir` and applies its findings to `host`.
    ///
    /// Exactly one extraction and one subprocess launch happen per call. The
    /// extracted binary is removed before the report is ingested.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if:
    /// - The OS has no bundled analyzer, or extraction fails
    /// - The analyzer cannot be launched, times out, or writes to stderr
    /// - The report is not valid JSON in the expected schema
    #[instrument(skip_all, fields(target = %target_dir.display()))]
    pub async fn execute<K>(&self, target_dir: &Path, host: &mut K) -> Result<PassResult, PipelineError>
    where
        K: Host + ?Sized,
    {
        let start = std::time::Instant::now();
        let mut stats = PassStats::default();

        let registry = FileRegistry::from_host(&*host, &self.language);
        stats.tracked_files = registry.len();
        info!(
            os = %self.os_name,
            arch = current_arch(),
            tracked_files = stats.tracked_files,
            "Starting analysis pass"
        );

        // ====================================================================
        // Stage 1: Extraction
        // ====================================================================

        let extraction_start = std::time::Instant::now();
        let extractor = Arc::clone(&self.extractor);
        let os_name = self.os_name.clone();
        let binary = tokio::task::spawn_blocking(move || extractor.extract(&os_name))
            .await
            .map_err(|e| PipelineError::Task {
                stage: self.extractor.stage_name().to_string(),
                message: e.to_string(),
            })??;
        stats.extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;
        info!(
            duration_ms = stats.extraction_duration_ms,
            path = %binary.path().display(),
            "Extraction completed"
        );

        // ====================================================================
        // Stage 2: Analysis
        // ====================================================================

        let analysis_start = std::time::Instant::now();
        let invocation = ProcessInvocation::for_binary(&binary, target_dir);
        let output = self.runner.run(&invocation).await?;
        // The binary is only needed while the analyzer runs.
        drop(binary);
        stats.analysis_duration_ms = analysis_start.elapsed().as_millis() as u64;
        info!(
            duration_ms = stats.analysis_duration_ms,
            stage = self.runner.stage_name(),
            "Analysis completed"
        );

        // ====================================================================
        // Stage 3: Decode and ingest
        // ====================================================================

        let ingestion_start = std::time::Instant::now();
        let reports = self.parser.parse(&output.stdout)?;
        let summary = self.coordinator.ingest(&reports, &registry, host);
        stats.ingestion_duration_ms = ingestion_start.elapsed().as_millis() as u64;
        stats.total_duration_ms = start.elapsed().as_millis() as u64;

        info!(
            files = summary.files_reported,
            metrics = summary.metrics_applied,
            issues = summary.issues_applied,
            total_ms = stats.total_duration_ms,
            "Analysis pass completed"
        );

        Ok(PassResult { summary, stats })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingHost;
    use crate::ingest::archive::ArchiveExtractor;
    use crate::ingest::platform::ExecutableDescriptor;
    use crate::model::{Metric, RuleKey};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const A_GO_REPORT: &str = r#"[{"FilePath":"a.go","LinesOfCode":10,"LinesOfComments":2,"Violations":[{"Type":"CC","Description":"too complex","SrcLine":5}]}]"#;

    // Mock runner returning canned output
    struct MockRunner {
        stdout: String,
        stderr: String,
        launches: Arc<AtomicUsize>,
        seen: Mutex<Vec<ProcessInvocation>>,
    }

    impl MockRunner {
        fn new(stdout: &str, stderr: &str) -> Self {
            Self {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                launches: Arc::new(AtomicUsize::new(0)),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AnalyzerRunner for MockRunner {
        async fn run(&self, invocation: &ProcessInvocation) -> Result<CapturedOutput, ProcessError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(invocation.clone());
            if !self.stderr.is_empty() {
                return Err(ProcessError::AnalyzerReported(self.stderr.clone()));
            }
            Ok(CapturedOutput {
                stdout: self.stdout.clone(),
                stderr: String::new(),
                exit_code: Some(0),
            })
        }

        fn stage_name(&self) -> &'static str {
            "mock_runner"
        }
    }

    // Mock extractor counting attempts, backed by a real file
    struct MockExtractor {
        bundle: PathBuf,
        attempts: Arc<AtomicUsize>,
    }

    impl BinaryExtractor for MockExtractor {
        fn extract(&self, os_name: &str) -> Result<ExtractedBinary, ExtractionError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            ArchiveExtractor::new(&self.bundle, ExecutableDescriptor::default()).extract(os_name)
        }

        fn stage_name(&self) -> &'static str {
            "mock_extractor"
        }
    }

    fn directory_bundle(root: &Path) -> PathBuf {
        let dir = root.join("bundle");
        std::fs::create_dir_all(dir.join("analyzer")).unwrap();
        std::fs::write(dir.join("analyzer/GoAnalyzerLinux"), b"binary").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_end_to_end_single_file() {
        let root = tempfile::tempdir().unwrap();
        let bundle = directory_bundle(root.path());
        let runner = MockRunner::new(A_GO_REPORT, "");
        let pipeline = IngestionPipeline::new(
            ArchiveExtractor::new(&bundle, ExecutableDescriptor::default()),
            runner,
        )
        .with_os_name("Linux");

        let mut host = RecordingHost::new("go").track("a.go");
        let result = pipeline
            .execute(Path::new("/work/project"), &mut host)
            .await
            .unwrap();

        assert_eq!(result.summary.metrics_applied, 1);
        assert_eq!(result.summary.issues_applied, 1);
        assert_eq!(result.stats.tracked_files, 1);

        assert_eq!(host.measures().len(), 1);
        assert_eq!(host.measures()[0].file, "a.go");
        assert_eq!(host.measures()[0].metric, Metric::Ncloc);
        assert_eq!(host.measures()[0].value, 10);

        assert_eq!(host.issues().len(), 1);
        let issue = &host.issues()[0];
        assert_eq!(issue.file, "a.go");
        assert_eq!(issue.rule, RuleKey::of("go-go", "CC"));
        assert_eq!(issue.message, "too complex");
        assert_eq!(issue.line, Some(5));

        let seen = pipeline.runner.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let command = seen[0].command_line();
        assert_eq!(&command[1..], &["-json", "-dir", "/work/project"]);
        assert_eq!(seen[0].working_dir(), Path::new(&command[0]).parent().unwrap());
    }

    #[tokio::test]
    async fn test_unsupported_platform_launches_nothing() {
        let root = tempfile::tempdir().unwrap();
        let bundle = directory_bundle(root.path());
        let runner = MockRunner::new(A_GO_REPORT, "");
        let launches = Arc::clone(&runner.launches);
        let pipeline = IngestionPipeline::new(
            ArchiveExtractor::new(&bundle, ExecutableDescriptor::default()),
            runner,
        )
        .with_os_name("OS/2 Warp");

        let mut host = RecordingHost::new("go").track("a.go");
        let err = pipeline.execute(root.path(), &mut host).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Extraction(ExtractionError::UnsupportedPlatform { .. })
        ));
        assert_eq!(launches.load(Ordering::SeqCst), 0);
        assert!(host.measures().is_empty());
        assert!(host.issues().is_empty());
    }

    #[tokio::test]
    async fn test_one_extraction_and_launch_per_pass() {
        let root = tempfile::tempdir().unwrap();
        let bundle = directory_bundle(root.path());
        let attempts = Arc::new(AtomicUsize::new(0));
        let runner = MockRunner::new("[]", "");
        let launches = Arc::clone(&runner.launches);
        let pipeline = IngestionPipeline::new(
            MockExtractor {
                bundle,
                attempts: Arc::clone(&attempts),
            },
            runner,
        )
        .with_os_name("Linux");

        let mut host = RecordingHost::new("go");
        pipeline.execute(root.path(), &mut host).await.unwrap();
        pipeline.execute(root.path(), &mut host).await.unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_analyzer_errors_abort_the_pass() {
        let root = tempfile::tempdir().unwrap();
        let bundle = directory_bundle(root.path());
        let pipeline = IngestionPipeline::new(
            ArchiveExtractor::new(&bundle, ExecutableDescriptor::default()),
            MockRunner::new(A_GO_REPORT, "open a.go: permission denied"),
        )
        .with_os_name("Linux");

        let mut host = RecordingHost::new("go").track("a.go");
        let err = pipeline.execute(root.path(), &mut host).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Process(ProcessError::AnalyzerReported(_))
        ));
        assert!(host.measures().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_report_applies_nothing() {
        let root = tempfile::tempdir().unwrap();
        let bundle = directory_bundle(root.path());
        let truncated = &A_GO_REPORT[..A_GO_REPORT.len() - 3];
        let pipeline = IngestionPipeline::new(
            ArchiveExtractor::new(&bundle, ExecutableDescriptor::default()),
            MockRunner::new(truncated, ""),
        )
        .with_os_name("Linux");

        let mut host = RecordingHost::new("go").track("a.go");
        let err = pipeline.execute(root.path(), &mut host).await.unwrap_err();

        assert!(matches!(err, PipelineError::Report(ReportError::Malformed(_))));
        assert!(host.measures().is_empty());
        assert!(host.issues().is_empty());
    }

    #[tokio::test]
    async fn test_other_language_tracks_nothing() {
        let root = tempfile::tempdir().unwrap();
        let bundle = directory_bundle(root.path());
        let pipeline = IngestionPipeline::new(
            ArchiveExtractor::new(&bundle, ExecutableDescriptor::default()),
            MockRunner::new(A_GO_REPORT, ""),
        )
        .with_os_name("Linux")
        .with_language("gox");

        assert_eq!(pipeline.repository_key(), "gox-go");

        let mut host = RecordingHost::new("go").track("a.go");
        let result = pipeline.execute(root.path(), &mut host).await.unwrap();
        assert_eq!(result.stats.tracked_files, 0);
        assert_eq!(result.summary.files_skipped, 1);
        assert!(host.measures().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_archive_bundle_with_real_subprocess() {
        use crate::executor::ProcessRunner;
        use std::io::Write;

        let root = tempfile::tempdir().unwrap();
        let archive = root.path().join("plugin.zip");
        let script = format!("#!/bin/sh\ncat <<'EOF'\n{A_GO_REPORT}\nEOF\n");
        {
            let file = std::fs::File::create(&archive).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file(
                "analyzer/GoAnalyzerLinux",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            zip.write_all(script.as_bytes()).unwrap();
            zip.finish().unwrap();
        }

        let pipeline = IngestionPipeline::new(
            ArchiveExtractor::new(&archive, ExecutableDescriptor::default())
                .with_temp_dir(root.path()),
            ProcessRunner::new(),
        )
        .with_os_name("Linux");

        let mut host = RecordingHost::new("go").track("a.go").track("b.go");
        let result = pipeline.execute(root.path(), &mut host).await.unwrap();

        assert_eq!(result.summary.files_matched, 1);
        assert_eq!(result.summary.issues_applied, 1);
        assert_eq!(host.issues()[0].line, Some(5));

        // Only the archive is left behind once the pass ends.
        let leftovers: Vec<_> = std::fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("plugin.zip")]);
    }
}

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::ingest::archive::ExtractedBinary;
use crate::ingest::pipeline::AnalyzerRunner;
use crate::ingest::traits::ProcessError;

/// Command line for one analyzer run: `<binary> -json -dir <target>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    program: PathBuf,
    args: Vec<OsString>,
    working_dir: PathBuf,
}

impl ProcessInvocation {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>, target_dir: &Path) -> Self {
        Self {
            program: program.into(),
            args: vec![
                OsString::from("-json"),
                OsString::from("-dir"),
                target_dir.as_os_str().to_os_string(),
            ],
            working_dir: working_dir.into(),
        }
    }

    /// Invocation of an extracted binary, run from its own directory.
    pub fn for_binary(binary: &ExtractedBinary, target_dir: &Path) -> Self {
        Self::new(binary.path(), binary.working_dir(), target_dir)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Full argument vector, program first, for logging.
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }
}

/// Everything the analyzer wrote, available only once it has exited and both
/// streams reached end-of-stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CapturedOutput {
    /// Whether the analyzer reported errors.
    ///
    /// Only the error stream counts; the exit status is not consulted.
    /// Line terminators alone are not an error, any other character is.
    pub fn has_errors(&self) -> bool {
        !self
            .stderr
            .trim_matches(|c| c == '\n' || c == '\r')
            .is_empty()
    }
}

/// Runs the analyzer as a subprocess and captures both of its streams.
///
/// Each stream gets its own drain task so a child filling one pipe never
/// blocks on the other. The runner waits for the child to exit and then
/// joins both drains before any output is read.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// Runner that waits for the analyzer without a bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Kills the analyzer and fails with [`ProcessError::TimedOut`] if it has
    /// not finished (and closed its streams) within `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Runs the analyzer and fails if it wrote anything to its error stream.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::AnalyzerReported`] with the captured error text
    /// in addition to every error [`ProcessRunner::capture`] can return.
    #[instrument(skip(self, invocation), fields(program = %invocation.program().display()))]
    pub async fn run(&self, invocation: &ProcessInvocation) -> Result<CapturedOutput, ProcessError> {
        let output = self.capture(invocation).await?;

        if output.has_errors() {
            error!(stderr = %output.stderr, "Analyzer reported errors");
            return Err(ProcessError::AnalyzerReported(output.stderr));
        }
        Ok(output)
    }

    /// Runs the analyzer and returns both streams regardless of content.
    ///
    /// # Errors
    ///
    /// - [`ProcessError::Launch`] if the process cannot be started
    /// - [`ProcessError::TimedOut`] if a bound is set and exceeded
    /// - [`ProcessError::Io`] / [`ProcessError::Drain`] if waiting or reading fails
    pub async fn capture(&self, invocation: &ProcessInvocation) -> Result<CapturedOutput, ProcessError> {
        info!(
            command = ?invocation.command_line(),
            working_dir = %invocation.working_dir().display(),
            "Launching analyzer"
        );

        let mut child = Command::new(invocation.program())
            .args(invocation.args())
            .current_dir(invocation.working_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Launch {
                program: invocation.program().to_path_buf(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProcessError::Drain("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProcessError::Drain("stderr was not captured".to_string()))?;

        let stdout_task = tokio::spawn(drain(stdout, "stdout"));
        let stderr_task = tokio::spawn(drain(stderr, "stderr"));
        let drains = [stdout_task.abort_handle(), stderr_task.abort_handle()];

        info!("Analyzer performs inspection, waiting for it to finish");
        let completion = wait_and_join(&mut child, stdout_task, stderr_task);

        let (status, stdout, stderr) = match self.timeout {
            Some(limit) => {
                let outcome = timeout(limit, completion).await;
                match outcome {
                    Ok(result) => result?,
                    Err(_) => {
                        if let Err(e) = child.start_kill() {
                            warn!(error = %e, "Failed to kill timed out analyzer");
                        }
                        // A surviving grandchild may still hold the pipes open.
                        for handle in &drains {
                            handle.abort();
                        }
                        return Err(ProcessError::TimedOut { limit });
                    }
                }
            }
            None => completion.await?,
        };

        if !status.success() {
            warn!(
                exit_code = ?status.code(),
                "Analyzer exited with non-zero status; only its error stream is treated as failure"
            );
        }
        info!(
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            "Analyzer finished"
        );

        Ok(CapturedOutput {
            stdout,
            stderr,
            exit_code: status.code(),
        })
    }
}

#[async_trait]
impl AnalyzerRunner for ProcessRunner {
    async fn run(&self, invocation: &ProcessInvocation) -> Result<CapturedOutput, ProcessError> {
        ProcessRunner::run(self, invocation).await
    }

    fn stage_name(&self) -> &'static str {
        "process_runner"
    }
}

/// Waits for exit, then for both drains. Output is only handed back once all
/// three have completed.
async fn wait_and_join(
    child: &mut Child,
    stdout_task: JoinHandle<std::io::Result<String>>,
    stderr_task: JoinHandle<std::io::Result<String>>,
) -> Result<(ExitStatus, String, String), ProcessError> {
    let status = child.wait().await?;
    debug!(exit_code = ?status.code(), "Analyzer exited, joining output drains");

    let (stdout, stderr) = tokio::try_join!(stdout_task, stderr_task)
        .map_err(|e| ProcessError::Drain(e.to_string()))?;
    Ok((status, stdout?, stderr?))
}

async fn drain<R>(mut stream: R, name: &'static str) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    debug!(stream = name, bytes = buf.len(), "Drained analyzer stream");
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

// ============================================================================
// Tests
// ============================================================================

//! Materializes the bundled analyzer binary as an executable file.
//!
//! A bundle is either a plain directory (development layout) holding the
//! binaries at their relative paths, or a zip archive with the same layout.
//! Directory bundles are used in place; archive entries are copied into a
//! fresh temporary file owned by the returned [`ExtractedBinary`].

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{info, instrument, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::ingest::pipeline::BinaryExtractor;
use crate::ingest::platform::ExecutableDescriptor;
use crate::ingest::traits::ExtractionError;

/// Analyzer binary ready to be executed.
///
/// When the binary was copied out of an archive, this value owns the
/// temporary file and removes it on drop. It intentionally does **not**
/// implement `Clone`.
#[derive(Debug)]
pub struct ExtractedBinary {
    path: PathBuf,
    working_dir: PathBuf,
    temp: Option<TempPath>,
}

impl ExtractedBinary {
    /// Absolute path of the executable.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the analyzer should run in (the binary's parent).
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Whether the binary is a temporary copy that is deleted on drop.
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    fn new(path: PathBuf, temp: Option<TempPath>) -> Self {
        let working_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            path,
            working_dir,
            temp,
        }
    }
}

impl Drop for ExtractedBinary {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            if let Err(e) = temp.close() {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove extracted analyzer"
                );
            }
        }
    }
}

/// Finds the platform binary inside a bundle and makes it runnable.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    bundle: PathBuf,
    descriptor: ExecutableDescriptor,
    temp_dir: Option<PathBuf>,
}

impl ArchiveExtractor {
    /// Creates an extractor for the bundle at `bundle` (directory or zip).
    pub fn new(bundle: impl Into<PathBuf>, descriptor: ExecutableDescriptor) -> Self {
        Self {
            bundle: bundle.into(),
            descriptor,
            temp_dir: None,
        }
    }

    /// Creates an extractor for the directory the running executable lives in.
    pub fn for_current_exe(descriptor: ExecutableDescriptor) -> Result<Self, ExtractionError> {
        Ok(Self::new(current_bundle_location()?, descriptor))
    }

    /// Places archive copies in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn bundle(&self) -> &Path {
        &self.bundle
    }

    /// Resolves the binary for `os_name` and materializes it.
    ///
    /// The platform is resolved before the bundle is touched, so an
    /// unsupported OS never reads the file system.
    ///
    /// # Errors
    ///
    /// - [`ExtractionError::UnsupportedPlatform`] if `os_name` has no entry
    /// - [`ExtractionError::NotFound`] if the bundle lacks the binary
    /// - [`ExtractionError::Archive`] / [`ExtractionError::Io`] on read or copy failures
    #[instrument(skip(self), fields(bundle = %self.bundle.display()))]
    pub fn extract(&self, os_name: &str) -> Result<ExtractedBinary, ExtractionError> {
        let relative = self.descriptor.resolve(os_name)?;
        info!(analyzer_file = relative, "Resolved analyzer for platform");

        let binary = if fs::metadata(&self.bundle)?.is_dir() {
            self.locate_in_directory(relative)?
        } else {
            self.extract_from_archive(relative)?
        };

        info!(
            path = %binary.path().display(),
            temporary = binary.is_temporary(),
            "Analyzer binary ready"
        );
        Ok(binary)
    }

    fn locate_in_directory(&self, relative: &str) -> Result<ExtractedBinary, ExtractionError> {
        let path = self.bundle.join(relative);
        if !path.is_file() {
            return Err(ExtractionError::NotFound {
                entry: relative.to_string(),
                bundle: self.bundle.clone(),
            });
        }
        let path = path.canonicalize()?;
        Ok(ExtractedBinary::new(path, None))
    }

    fn extract_from_archive(&self, relative: &str) -> Result<ExtractedBinary, ExtractionError> {
        let file = File::open(&self.bundle)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;
        let mut entry = match archive.by_name(relative) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(ExtractionError::NotFound {
                    entry: relative.to_string(),
                    bundle: self.bundle.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let entry_path = Path::new(relative);
        let prefix = entry_path
            .file_stem()
            .map(|s| format!("{}-", s.to_string_lossy()))
            .unwrap_or_else(|| "analyzer-".to_string());
        // Windows only runs files with an executable extension.
        let suffix = entry_path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(&suffix);
        let mut temp = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        io::copy(&mut entry, temp.as_file_mut())?;
        temp.as_file().sync_all()?;

        // Close the write handle before executing, or Linux reports ETXTBSY.
        let temp_path = temp.into_temp_path();
        make_executable(&temp_path)?;

        let path = temp_path.to_path_buf();
        Ok(ExtractedBinary::new(path, Some(temp_path)))
    }
}

impl BinaryExtractor for ArchiveExtractor {
    fn extract(&self, os_name: &str) -> Result<ExtractedBinary, ExtractionError> {
        ArchiveExtractor::extract(self, os_name)
    }

    fn stage_name(&self) -> &'static str {
        "archive_extractor"
    }
}

/// Directory holding the running executable.
pub fn current_bundle_location() -> Result<PathBuf, ExtractionError> {
    let exe = std::env::current_exe()?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        ExtractionError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("executable '{}' has no parent directory", exe.display()),
        ))
    })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o555);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(path: &Path) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}

// ============================================================================
// Tests
// ============================================================================

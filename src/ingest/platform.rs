//! Platform detection and the table of bundled analyzer binaries.

use std::collections::BTreeMap;
use tracing::debug;

use crate::ingest::traits::ExtractionError;

/// Maps a platform key to the relative path of the bundled analyzer.
///
/// The key is the first whitespace-delimited token of the OS name, so
/// `"Mac OS X"` resolves through `"Mac"` and `"Windows 10"` through
/// `"Windows"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableDescriptor {
    entries: BTreeMap<String, String>,
}

impl Default for ExecutableDescriptor {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("Linux".to_string(), "analyzer/GoAnalyzerLinux".to_string());
        entries.insert("Mac".to_string(), "analyzer/GoAnalyzerMac".to_string());
        entries.insert(
            "Windows".to_string(),
            "analyzer/GoAnalyzerWindows.exe".to_string(),
        );
        Self { entries }
    }
}

impl ExecutableDescriptor {
    /// Default table extended (or overridden) by `extra` entries.
    pub fn with_entries<I>(extra: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut descriptor = Self::default();
        descriptor.entries.extend(extra);
        descriptor
    }

    /// Returns the platform key for an OS name.
    pub fn platform_key(os_name: &str) -> &str {
        os_name.split_whitespace().next().unwrap_or("")
    }

    /// Resolves the relative binary path for `os_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::UnsupportedPlatform`] when the key has no entry.
    pub fn resolve(&self, os_name: &str) -> Result<&str, ExtractionError> {
        let key = Self::platform_key(os_name);
        match self.entries.get(key) {
            Some(path) => {
                debug!(os_name, key, path = %path, "Resolved analyzer binary");
                Ok(path.as_str())
            }
            None => Err(ExtractionError::UnsupportedPlatform {
                os_name: os_name.to_string(),
                key: key.to_string(),
            }),
        }
    }
}

/// OS name of the running host, in the same form the descriptor keys use.
pub fn current_os_name() -> String {
    match std::env::consts::OS {
        "linux" => "Linux".to_string(),
        "macos" => "Mac OS X".to_string(),
        "windows" => "Windows".to_string(),
        other => other.to_string(),
    }
}

pub fn current_arch() -> &'static str {
    std::env::consts::ARCH
}

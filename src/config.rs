//! Bridge configuration and effective settings resolution.
//!
//! Settings come from an optional `goanalyzer.toml` and from command-line
//! flags. Precedence: CLI > config file > defaults.
//!
//! Defaults:
//! - `bundle`: directory of the running executable
//! - `os_name`: detected from the build target
//! - `timeout_secs`: none (wait for the analyzer indefinitely)
//! - `language`: `go`
//! - `file_suffixes`: `["go"]`

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::ingest::platform::{current_os_name, ExecutableDescriptor};

pub const CONFIG_FILE_NAME: &str = "goanalyzer.toml";
pub const DEFAULT_LANGUAGE: &str = "go";
const DEFAULT_FILE_SUFFIXES: &str = "go";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Contents of `goanalyzer.toml`; every key is optional.
#[derive(Debug, Default, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    pub bundle: Option<PathBuf>,
    pub os_name: Option<String>,
    pub timeout_secs: Option<u64>,
    pub language: Option<String>,
    pub file_suffixes: Option<Vec<String>>,
    /// Extra platform key → relative binary path entries.
    #[serde(default)]
    pub analyzers: BTreeMap<String, String>,
}

impl BridgeConfig {
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Loads `goanalyzer.toml` from `dir` if present, defaults otherwise.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }
}

/// Values supplied on the command line; `None` defers to the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub bundle: Option<PathBuf>,
    pub os_name: Option<String>,
    pub timeout_secs: Option<u64>,
    pub language: Option<String>,
}

/// Fully resolved settings for one pass.
#[derive(Debug, Clone)]
pub struct Effective {
    /// `None` means "next to the running executable".
    pub bundle: Option<PathBuf>,
    pub os_name: String,
    pub timeout: Option<Duration>,
    pub language: String,
    pub file_suffixes: Vec<String>,
    pub descriptor: ExecutableDescriptor,
}

impl Effective {
    pub fn resolve(file: BridgeConfig, cli: Overrides) -> Self {
        let suffixes = file
            .file_suffixes
            .map(|s| filter_blank(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(default_suffixes);

        Self {
            bundle: cli.bundle.or(file.bundle),
            os_name: cli.os_name.or(file.os_name).unwrap_or_else(current_os_name),
            timeout: cli
                .timeout_secs
                .or(file.timeout_secs)
                .map(Duration::from_secs),
            language: cli
                .language
                .or(file.language)
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            file_suffixes: suffixes,
            descriptor: ExecutableDescriptor::with_entries(file.analyzers),
        }
    }
}

fn default_suffixes() -> Vec<String> {
    DEFAULT_FILE_SUFFIXES
        .split(',')
        .map(str::to_string)
        .collect()
}

/// Trims entries and drops the blank ones.
fn filter_blank(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let eff = Effective::resolve(BridgeConfig::default(), Overrides::default());
        assert_eq!(eff.bundle, None);
        assert_eq!(eff.os_name, current_os_name());
        assert_eq!(eff.timeout, None);
        assert_eq!(eff.language, "go");
        assert_eq!(eff.file_suffixes, vec!["go"]);
        assert_eq!(eff.descriptor, ExecutableDescriptor::default());
    }

    #[test]
    fn test_file_values() {
        let text = r#"
bundle = "/opt/goanalyzer/plugin.zip"
os_name = "Linux"
timeout_secs = 120
file_suffixes = [" go ", "", "gox"]

[analyzers]
FreeBSD = "analyzer/GoAnalyzerFreeBSD"
"#;
        let file = BridgeConfig::from_toml_str(text, Path::new("goanalyzer.toml")).unwrap();
        let eff = Effective::resolve(file, Overrides::default());

        assert_eq!(eff.bundle, Some(PathBuf::from("/opt/goanalyzer/plugin.zip")));
        assert_eq!(eff.os_name, "Linux");
        assert_eq!(eff.timeout, Some(Duration::from_secs(120)));
        assert_eq!(eff.file_suffixes, vec!["go", "gox"]);
        assert_eq!(
            eff.descriptor.resolve("FreeBSD 14").unwrap(),
            "analyzer/GoAnalyzerFreeBSD"
        );
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = BridgeConfig {
            os_name: Some("Linux".to_string()),
            timeout_secs: Some(10),
            language: Some("go".to_string()),
            ..BridgeConfig::default()
        };
        let cli = Overrides {
            os_name: Some("Mac OS X".to_string()),
            timeout_secs: Some(30),
            bundle: Some(PathBuf::from("bundle")),
            language: None,
        };
        let eff = Effective::resolve(file, cli);
        assert_eq!(eff.os_name, "Mac OS X");
        assert_eq!(eff.timeout, Some(Duration::from_secs(30)));
        assert_eq!(eff.bundle, Some(PathBuf::from("bundle")));
        assert_eq!(eff.language, "go");
    }

    #[test]
    fn test_blank_suffixes_fall_back_to_default() {
        let file = BridgeConfig {
            file_suffixes: Some(vec!["  ".to_string(), String::new()]),
            ..BridgeConfig::default()
        };
        let eff = Effective::resolve(file, Overrides::default());
        assert_eq!(eff.file_suffixes, vec!["go"]);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = BridgeConfig::from_toml_str("bundel = \"x\"", Path::new("goanalyzer.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_discover_without_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(BridgeConfig::discover(dir.path()).unwrap(), BridgeConfig::default());

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "language = \"go\"\n").unwrap();
        let cfg = BridgeConfig::discover(dir.path()).unwrap();
        assert_eq!(cfg.language.as_deref(), Some("go"));
    }
}

//! goanalyzer-bridge CLI entry point.
//!
//! Runs one analysis pass over a directory: the bundled analyzer is
//! extracted and executed, and its findings are printed as measures and
//! issues against the source files found under the directory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use goanalyzer_bridge::config::{BridgeConfig, Effective, Overrides};
use goanalyzer_bridge::host::{PathStyle, RecordedIssue, RecordedMeasure, RecordingHost};
use goanalyzer_bridge::ingest::{ArchiveExtractor, IngestionPipeline, IngestionSummary};
use goanalyzer_bridge::ProcessRunner;

const EXIT_PASS_FAILED: u8 = 1;
const EXIT_USAGE: u8 = 2;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "goanalyzer-bridge", version, about)]
struct Cli {
    /// Project directory to analyze
    dir: PathBuf,

    /// Config file (defaults to goanalyzer.toml in DIR, if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bundle holding the analyzers: a directory or a zip archive
    #[arg(long)]
    bundle: Option<PathBuf>,

    /// OS name used to pick the analyzer (e.g. "Linux", "Mac OS X")
    #[arg(long)]
    os_name: Option<String>,

    /// Kill the analyzer if it runs longer than this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Language key of the tracked files
    #[arg(long)]
    language: Option<String>,

    /// Key tracked files by absolute path instead of relative to DIR
    #[arg(long)]
    absolute_paths: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    summary: IngestionSummary,
    measures: &'a [RecordedMeasure],
    issues: &'a [RecordedIssue],
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => BridgeConfig::load(path),
        None => BridgeConfig::discover(&cli.dir),
    };
    let file_config = match file_config {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let settings = Effective::resolve(
        file_config,
        Overrides {
            bundle: cli.bundle.clone(),
            os_name: cli.os_name.clone(),
            timeout_secs: cli.timeout,
            language: cli.language.clone(),
        },
    );

    match run(&cli, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_PASS_FAILED)
        }
    }
}

async fn run(cli: &Cli, settings: Effective) -> Result<(), Box<dyn std::error::Error>> {
    let dir = cli.dir.canonicalize()?;
    let style = if cli.absolute_paths {
        PathStyle::Absolute
    } else {
        PathStyle::Relative
    };
    let mut host = RecordingHost::scan(&settings.language, &dir, &settings.file_suffixes, style)?;

    let extractor = match &settings.bundle {
        Some(bundle) => ArchiveExtractor::new(bundle, settings.descriptor.clone()),
        None => ArchiveExtractor::for_current_exe(settings.descriptor.clone())?,
    };
    let runner = match settings.timeout {
        Some(limit) => ProcessRunner::new().with_timeout(limit),
        None => ProcessRunner::new(),
    };

    let pipeline = IngestionPipeline::new(extractor, runner)
        .with_os_name(settings.os_name.clone())
        .with_language(settings.language.clone());
    let result = pipeline.execute(&dir, &mut host).await?;

    match cli.format {
        OutputFormat::Json => {
            let output = JsonOutput {
                summary: result.summary,
                measures: host.measures(),
                issues: host.issues(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            for measure in host.measures() {
                println!("{} {} = {}", measure.file, measure.metric, measure.value);
            }
            for issue in host.issues() {
                println!("{}", issue);
            }
            println!(
                "{} files reported, {} matched, {} issues saved, {} rejected",
                result.summary.files_reported,
                result.summary.files_matched,
                result.summary.issues_applied,
                result.summary.issues_rejected
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from([
            "goanalyzer-bridge",
            "--bundle",
            "plugin.zip",
            "--timeout",
            "30",
            "--format",
            "json",
            "src",
        ]);
        assert_eq!(cli.dir, PathBuf::from("src"));
        assert_eq!(cli.bundle, Some(PathBuf::from("plugin.zip")));
        assert_eq!(cli.timeout, Some(30));
        assert!(matches!(cli.format, OutputFormat::Json));
        assert!(!cli.absolute_paths);
    }
}

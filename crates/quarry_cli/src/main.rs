//! Quarry CLI
//!
//! Runs and validates pipeline files against the local filesystem.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result, WrapErr};
use quarry_plan::Pipeline;
use quarry_runtime::{EngineConfig, ExecutionEngine};
use quarry_table::CsvStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configured temp directory
const TEMP_DIR_ENV: &str = "QUARRY_TEMP_DIR";

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Quarry - node-based tabular transform pipelines", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline
    Run {
        /// Path to pipeline JSON
        #[arg(short, long)]
        pipeline: PathBuf,
        /// Path to engine config JSON
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write the audit trail to this CSV file
        #[arg(short, long)]
        audit: Option<PathBuf>,
    },
    /// Validate a pipeline without running it
    Validate {
        /// Path to pipeline JSON
        #[arg(short, long)]
        pipeline: PathBuf,
    },
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Engine config from an optional file, with the temp dir override applied
fn load_config(path: Option<&Path>, temp_dir: Option<String>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("reading config {}", path.display()))?;
            EngineConfig::from_json(&json)?
        }
        None => EngineConfig::new(),
    };
    if let Some(dir) = temp_dir.filter(|d| !d.trim().is_empty()) {
        config = config.with_temp_dir(dir);
    }
    Ok(config)
}

fn load_pipeline(path: &Path) -> Result<Pipeline> {
    Pipeline::from_file(path).wrap_err_with(|| format!("loading pipeline {}", path.display()))
}

fn run(pipeline: &Path, config: Option<&Path>, audit: Option<&Path>) -> Result<()> {
    let config = load_config(config, std::env::var(TEMP_DIR_ENV).ok())?;
    let pipeline = load_pipeline(pipeline)?;
    let store = Arc::new(CsvStore::new());
    let mut engine = ExecutionEngine::new(store.clone(), config);

    let result = engine.run(&pipeline);
    if let Some(path) = audit {
        if engine.audit().write(store.as_ref(), path)? {
            info!(path = %path.display(), "audit trail written");
        }
    }

    match result {
        Ok(report) => {
            println!("{}", report.summary());
            for output in &report.outputs {
                println!("  {}", output.display());
            }
            Ok(())
        }
        Err(e) => {
            error!(run = %engine.run_id(), "{}", e);
            println!("{} {}", engine.run_id(), engine.state());
            Err(eyre!(e))
        }
    }
}

fn validate(pipeline: &Path) -> Result<()> {
    let pipeline = load_pipeline(pipeline)?;
    let config = load_config(None, None)?;
    let engine = ExecutionEngine::new(Arc::new(CsvStore::new()), config);
    engine.validate(&pipeline)?;
    println!(
        "pipeline valid: {} nodes, {} edges",
        pipeline.node_count(),
        pipeline.edge_count()
    );
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match cli.command {
        Commands::Run {
            pipeline,
            config,
            audit,
        } => run(&pipeline, config.as_deref(), audit.as_deref()),
        Commands::Validate { pipeline } => validate(&pipeline),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_runtime::EdgeOrder;

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config, EngineConfig::new());
    }

    #[test]
    fn test_load_config_file_and_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"edge_order": "topological", "temp_dir": "/var/tmp"}"#).unwrap();

        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.edge_order, EdgeOrder::Topological);
        assert_eq!(config.temp_dir, PathBuf::from("/var/tmp"));

        let config = load_config(Some(&path), Some("/scratch".to_string())).unwrap();
        assert_eq!(config.temp_dir, PathBuf::from("/scratch"));
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config(Some(Path::new("/no/such/engine.json")), None).is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "quarry",
            "--log-format",
            "json",
            "run",
            "--pipeline",
            "p.json",
            "--audit",
            "audit.csv",
        ])
        .unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
        match cli.command {
            Commands::Run { pipeline, config, audit } => {
                assert_eq!(pipeline, PathBuf::from("p.json"));
                assert!(config.is_none());
                assert_eq!(audit, Some(PathBuf::from("audit.csv")));
            }
            Commands::Validate { .. } => panic!("expected run"),
        }
    }
}

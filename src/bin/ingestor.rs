//! Thin batch-runner executable exercising spec.md §6's exit codes.
//!
//! No argument-grammar library here: arguments are parsed by hand, the
//! same shape `src/bin/noet/main.rs` uses but stripped of `clap` (CLI
//! parsing is out of scope per spec.md §1). `ctrlc` is dropped too --
//! `tokio::signal::ctrl_c` covers the one signal this runner cares about.
//!
//! This crate ships no production parser or embedding backend (spec.md's
//! Non-goals), so the runner wires up the same `DemoScopeParser` /
//! `DeterministicEmbedder` pair the test suite uses. A downstream
//! application registers its own parsers and embedding provider instead of
//! using this binary directly.
//!
//! Usage: `ingestor <path> [--project <id>] [--config <file>]`

use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use ingestor_core::config::{ConfigProvider, EnvOverrideConfigProvider, IngestConfig, TomlConfigProvider};
use ingestor_core::graphstore::InMemoryGraphStore;
use ingestor_core::orchestrator::IngestionOrchestrator;
use ingestor_core::parser::ParserRegistry;
use ingestor_core::testing::{DemoScopeParser, DeterministicEmbedder};
use ingestor_core::IngestError;

struct Args {
    path: String,
    project: String,
    config: Option<String>,
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut path = None;
    let mut project = "default".to_string();
    let mut config = None;

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--project" => project = argv.next().ok_or("--project requires a value")?,
            "--config" => config = Some(argv.next().ok_or("--config requires a value")?),
            other if path.is_none() => path = Some(other.to_string()),
            other => return Err(format!("unexpected argument: {other}")),
        }
    }

    let path = path.ok_or_else(|| "usage: ingestor <path> [--project <id>] [--config <file>]".to_string())?;
    Ok(Args { path, project, config })
}

fn load_config(path: Option<&str>) -> Result<IngestConfig, IngestError> {
    match path {
        Some(path) => EnvOverrideConfigProvider::new(TomlConfigProvider::new(path)).get_config(),
        None => Ok(IngestConfig::default()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(1);
        }
    };

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "fatal configuration error");
            return ExitCode::from(1);
        }
    };

    let parsers = ParserRegistry::new();
    parsers.register("demo", || Box::new(DemoScopeParser));

    let orchestrator = IngestionOrchestrator::new(
        args.project.clone(),
        config,
        InMemoryGraphStore::new(),
        parsers,
        DeterministicEmbedder::default(),
    );

    let interrupted = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let cancel_handle = orchestrator.cancel_handle();
    tokio::spawn({
        let interrupted = interrupted.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::SeqCst);
                cancel_handle.store(true, Ordering::SeqCst);
            }
        }
    });

    let stats = match orchestrator.crawl_and_ingest(&args.path).await {
        Ok(stats) => stats,
        Err(err) => {
            tracing::error!(error = %err, "fatal error during ingestion");
            return ExitCode::from(1);
        }
    };

    let project_stats = orchestrator.state_store().stats(&args.project);
    println!(
        "processed {} files, {} errored, {} edges resolved, {} pending, {} embeddings generated, {} restored",
        stats.files_processed,
        stats.files_errored,
        stats.edges_resolved,
        stats.edges_pending,
        stats.embeddings_generated,
        stats.embeddings_restored,
    );
    println!(
        "state counts: discovered={} parsed={} linked={} embedded={} error={}",
        project_stats.discovered, project_stats.parsed, project_stats.linked, project_stats.embedded, project_stats.error,
    );

    if interrupted.load(Ordering::SeqCst) {
        return ExitCode::from(3);
    }
    if project_stats.error > 0 {
        return ExitCode::from(2);
    }
    ExitCode::from(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_path_and_flags() {
        let args = parse_args(
            ["./docs", "--project", "demo", "--config", "ingest.toml"]
                .into_iter()
                .map(String::from),
        )
        .unwrap();
        assert_eq!(args.path, "./docs");
        assert_eq!(args.project, "demo");
        assert_eq!(args.config.as_deref(), Some("ingest.toml"));
    }

    #[test]
    fn defaults_project_when_omitted() {
        let args = parse_args(["./docs"].into_iter().map(String::from)).unwrap();
        assert_eq!(args.project, "default");
        assert!(args.config.is_none());
    }

    #[test]
    fn missing_path_is_an_error() {
        assert!(parse_args(std::iter::empty()).is_err());
    }

    #[test]
    fn unexpected_trailing_argument_is_an_error() {
        assert!(parse_args(["./docs", "extra"].into_iter().map(String::from)).is_err());
    }
}

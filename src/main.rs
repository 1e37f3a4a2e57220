//! Thin CLI entry point for the log-viewer session engine.
//!
//! This binary does the minimum a UI-facing host needs: load configuration,
//! initialize logging, open whatever paths were given on the command line,
//! and drain the [`Bridge`]'s event stream to the console. A real UI shell
//! embeds the engine directly rather than going through this binary; it
//! exists for smoke-testing the engine standalone and as a reference
//! integration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use loglayer_engine::bridge::{Bridge, EngineEvent};
use loglayer_engine::config::Config;
use tracing::{info, Level};

/// Log Layer Engine - backend session engine for an interactive log viewer.
#[derive(Parser, Debug)]
#[command(name = "loglayer-engine")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log files to open on startup.
    paths: Vec<PathBuf>,

    /// Override the UI-facing request/event surface port.
    #[arg(long)]
    port: Option<u16>,

    /// Path to a TOML config file; falls back to the default search order.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run the engine without opening any interactive UI surface (useful
    /// for scripted indexing/stat runs piped through stdout).
    #[arg(long)]
    no_ui: bool,

    /// Write a template config file to the given path and exit.
    #[arg(long)]
    init_config: Option<PathBuf>,

    /// Minimum log level, used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.init_config {
        Config::write_template(path)?;
        println!("Wrote template config to {}", path.display());
        return Ok(());
    }

    let log_level = args.log_level.parse::<Level>().unwrap_or(Level::INFO);
    loglayer_engine::telemetry::init_telemetry(log_level)?;

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_default_locations()?
            .map(|(config, path)| {
                info!(path = %path.display(), "loaded config file");
                config
            })
            .unwrap_or_default(),
    }
    .with_overrides(args.port);

    info!(port = config.server.port, no_ui = args.no_ui, "starting loglayer engine");

    let bridge = Bridge::new(&config.engine).context("failed to initialize engine bridge")?;

    for (i, path) in args.paths.iter().enumerate() {
        if path.is_dir() {
            // A directory argument sets the workspace root rather than
            // opening a file directly; directory listing is a UI-shell
            // concern the engine doesn't implement.
            info!(path = %path.display(), "workspace root set");
            continue;
        }
        let file_id = format!("file-{i}");
        bridge
            .open_file(&file_id, path.clone())
            .with_context(|| format!("failed to open {}", path.display()))?;
    }

    if args.no_ui {
        return Ok(());
    }

    loop {
        match bridge.recv_event(Duration::from_secs(1)) {
            Some(EngineEvent::FileLoaded { file_id, name, size, line_count }) => {
                info!(file_id, name, size, line_count, "file loaded");
            }
            Some(EngineEvent::PipelineFinished { file_id, visible_count, match_count }) => {
                info!(file_id, visible_count, match_count, "pipeline finished");
            }
            Some(EngineEvent::StatsFinished { file_id, stats }) => {
                info!(file_id, layer_count = stats.len(), "stats finished");
            }
            Some(EngineEvent::OperationStarted { file_id, operation }) => {
                info!(file_id, operation, "operation started");
            }
            Some(EngineEvent::OperationProgress { file_id, operation, fraction }) => {
                info!(file_id, operation, fraction, "operation progress");
            }
            Some(EngineEvent::OperationError { file_id, operation, message }) => {
                tracing::error!(file_id, operation, message, "operation failed");
            }
            Some(EngineEvent::OperationStatusChanged { file_id, status, percent }) => {
                info!(file_id, status, percent, "status changed");
            }
            None => {
                if args.paths.is_empty() {
                    continue;
                }
            }
        }
    }
}

//! oneflow-export: regenerate the oneflow Python package tree.
//!
//! # Usage
//!
//! ```bash
//! # Export ./oneflow/python and friends into ./python
//! oneflow-export export
//!
//! # Export, then clean up with autoflake, isort and black
//! oneflow-export export -a -i -b
//!
//! # Count torch imports in a model zoo
//! oneflow-export compat path/to/models
//!
//! # Print a default config
//! oneflow-export init > .oneflow-export.toml
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use flow_export::cli::{CensusFormat, Cli, Commands};
use flow_export::compat::{census_dir, render_json, render_text};
use flow_export::config::{discover_and_load_config, ExportConfig};
use flow_export::export::{run_export, ExportOptions};
use flow_export::postprocess::selected_tools;
use flow_export::{exit_code, ExportError};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        Level::WARN
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        std::process::exit(exit_code::INTERNAL_ERROR);
    }

    if let Err(err) = run(cli) {
        eprintln!("Error: {:#}", err);
        let code = err
            .downcast_ref::<ExportError>()
            .map_or(exit_code::INTERNAL_ERROR, ExportError::exit_code);
        std::process::exit(code);
    }
    std::process::exit(exit_code::SUCCESS);
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Export {
            out_dir,
            debug,
            autoflake,
            isort,
            black,
            ast,
            jobs,
            source_root,
        } => {
            let config = load_config(cli.config.as_ref())?;
            let post = &config.postprocess;
            let mut options = ExportOptions::new(source_root, out_dir);
            options.debug = debug;
            options.verbose = cli.verbose;
            options.dump_ast = ast;
            options.jobs = jobs;
            options.tools = selected_tools(
                autoflake || post.autoflake,
                isort || post.isort,
                black || post.black,
            );
            let summary = run_export(&config, &options).with_context(|| {
                format!("export into {} failed", options.out_dir.display())
            })?;
            info!(
                sources = summary.sources,
                skipped_tests = summary.skipped_tests,
                written = summary.written.len(),
                "done"
            );
        }
        Commands::Compat {
            dir,
            prefix,
            format,
        } => {
            let census = census_dir(&dir, &prefix)
                .with_context(|| format!("census of {} failed", dir.display()))?;
            let entries = census.most_common();
            match format {
                CensusFormat::Text => print!("{}", render_text(&entries)),
                CensusFormat::Json => println!("{}", render_json(&entries)?),
            }
        }
        Commands::Init => print!("{}", ExportConfig::default_toml()),
    }
    Ok(())
}

/// Load the config file, respecting `--config`, else discover it from the
/// working directory, else fall back to the defaults.
fn load_config(explicit: Option<&PathBuf>) -> Result<ExportConfig, ExportError> {
    if let Some(path) = explicit {
        let config = ExportConfig::load(path)?;
        info!("Loaded config from {}", path.display());
        return Ok(config);
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match discover_and_load_config(&cwd)? {
        Some((config, path)) => {
            info!("Using config: {}", path.display());
            Ok(config)
        }
        None => {
            warn!("no config file found, using defaults");
            Ok(ExportConfig::default())
        }
    }
}

//! CLI argument definitions for oneflow-export.
//!
//! Kept in the library so tests can use [`Cli::try_parse_from`] without
//! spawning a subprocess.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// `--jobs`: a worker count of at least one.
fn parse_jobs(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("value must be at least 1".to_string()),
        Ok(jobs) => Ok(jobs),
        Err(e) => Err(format!("invalid worker count: {}", e)),
    }
}

/// oneflow-export: regenerate the oneflow Python package tree.
///
/// Reads export-annotated sources, resolves every `@oneflow_export`
/// directive and writes the public package layout to an output directory.
///
/// Quick start:
///   oneflow-export export                 Build ./python from ./oneflow
///   oneflow-export export -a -i -b        Also run autoflake, isort, black
///   oneflow-export compat ./models        Count torch imports under ./models
///   oneflow-export init                   Print the default config
#[derive(Parser, Debug)]
#[command(name = "oneflow-export")]
#[command(author)]
#[command(version)]
#[command(about = "Regenerate the oneflow Python package from export-annotated sources", long_about = None)]
#[command(after_help = "\
CONFIGURATION:
  oneflow-export looks for a .oneflow-export.toml config file, searching from\n\
  the current directory up to the nearest .git root. Use `oneflow-export init`\n\
  to print a default config. CLI flags override config file settings.\n\
\n\
EXAMPLES:\n\
  oneflow-export export --out-dir build/python     Write the tree elsewhere\n\
  oneflow-export export --debug                    Only export the debug inputs\n\
  oneflow-export export --ast                      Dump a syntax tree per file\n\
  oneflow-export compat . --format json            Import census as JSON")]
pub struct Cli {
    /// Suppress informational output.
    #[arg(short, long, global = true, help_heading = "Global Options")]
    pub quiet: bool,

    /// Show debug output and let external tools print.
    #[arg(short, long, global = true, help_heading = "Global Options")]
    pub verbose: bool,

    /// Path to a .oneflow-export.toml config file.
    ///
    /// By default, oneflow-export searches from the current directory up
    /// to the nearest .git root. This flag overrides that discovery.
    #[arg(long, global = true, help_heading = "Global Options")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the package tree.
    Export {
        /// Output directory. Its contents are replaced.
        #[arg(long, default_value = "python")]
        out_dir: PathBuf,

        /// Export only the `[debug] sources` inputs.
        #[arg(short, long)]
        debug: bool,

        /// Remove unused imports with autoflake.
        #[arg(short, long)]
        autoflake: bool,

        /// Sort imports with isort.
        #[arg(short, long)]
        isort: bool,

        /// Format with black.
        #[arg(short, long)]
        black: bool,

        /// Write the syntax tree of every output file next to it.
        #[arg(long)]
        ast: bool,

        /// Number of worker threads (default: available parallelism).
        #[arg(long, value_parser = parse_jobs)]
        jobs: Option<usize>,

        /// Directory the configured source paths are relative to.
        #[arg(long, default_value = ".")]
        source_root: PathBuf,
    },

    /// Count imports of a module prefix across a Python tree.
    Compat {
        /// Directory to scan.
        dir: PathBuf,

        /// Module prefix to count.
        #[arg(long, default_value = "torch")]
        prefix: String,

        /// Output format.
        #[arg(long, value_enum, default_value_t)]
        format: CensusFormat,
    },

    /// Print a default .oneflow-export.toml.
    Init,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum CensusFormat {
    /// `count module` lines.
    #[default]
    Text,
    /// A JSON array of `{module, count}` objects.
    Json,
}

//! Export compiler for the oneflow Python package.
//!
//! Turns a tree of export-annotated Python sources into the public package
//! layout, plus a small import census tool and the client session wrapper
//! used by the generated package.

pub mod cli;
pub mod compat;
pub mod config;
pub mod error;
pub mod export;
pub mod postprocess;
pub mod session;
pub mod syntax;

pub use cli::{CensusFormat, Cli, Commands};
pub use compat::{census_dir, CensusEntry, ImportCensus};
pub use config::{
    discover_and_load_config, discover_config, ConfigError, ExportConfig, RelocationPolicy,
    CONFIG_FILE_NAME,
};
pub use error::{exit_code, ExportError, Result};
pub use export::{run_export, ExportOptions, ExportSummary};
pub use postprocess::{selected_tools, PostProcessor, Tool};
pub use session::{MultiClientSession, SessionError, SessionRuntime, SessionStatus};

//! Central error types for oneflow-export.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic
//! `Display` and `From` implementations. Every variant is terminal for the
//! current run: the tool is a one-shot batch compiler and never retries.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ConfigError;

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

/// Process exit codes for the oneflow-export CLI.
pub mod exit_code {
    /// Run completed.
    pub const SUCCESS: i32 = 0;
    /// Configuration error (bad config file, invalid CLI args).
    pub const CONFIG_ERROR: i32 = 2;
    /// I/O error (file not found, permission denied, output collision).
    pub const IO_ERROR: i32 = 3;
    /// The source tree violates a contract (parse error, duplicate module,
    /// duplicate export target, failed post-processing).
    pub const INTERNAL_ERROR: i32 = 4;
}

/// Main error type for the export pipeline.
#[derive(Error, Debug)]
pub enum ExportError {
    /// IO operation failed (prefer IoWithPath when a path is available)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO operation failed with path context
    #[error("IO error at {path}: {error}")]
    IoWithPath {
        error: std::io::Error,
        path: PathBuf,
    },

    /// Source file does not parse
    #[error("parse error in {path} at line {line}, column {column}")]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
    },

    /// Tree-sitter could not be set up
    #[error("tree-sitter error: {0}")]
    TreeSitter(String),

    /// Two source files map onto the same destination module
    #[error("duplicate destination module {module}: {new} collides with {existing}")]
    DuplicateModule {
        module: String,
        new: PathBuf,
        existing: PathBuf,
    },

    /// An export directive lists its first target again
    #[error("export of `{symbol}` in {module} repeats its first target `{target}`")]
    DuplicateExportTarget {
        module: String,
        symbol: String,
        target: String,
    },

    /// An export decorator whose arguments are not dotted string literals
    #[error("malformed export directive on `{symbol}` in {module}: {reason}")]
    MalformedDirective {
        module: String,
        symbol: String,
        reason: String,
    },

    /// `oneflow_export_value` used on a function that is not `docstring; return expr`
    #[error("value export `{symbol}` in {module} must contain a docstring and a single return")]
    MalformedValueExport { module: String, symbol: String },

    /// The `__init__.py` directly under a source root must be empty
    #[error("package marker {0} under a source root must be empty")]
    NonEmptyRootMarker(PathBuf),

    /// A module path does not live under the namespace tree root
    #[error("module {module} is outside the `{root}` namespace")]
    ModuleOutsideNamespace { module: String, root: String },

    /// A destination path cannot be turned into a module path
    #[error("not a python module path: {0}")]
    InvalidModulePath(PathBuf),

    /// Refusing to overwrite an already written destination
    #[error("destination already exists: {0}")]
    OutputExists(PathBuf),

    /// Refusing to clear a dangerous output directory
    #[error("refusing to use {0:?} as output directory")]
    UnsafeOutputDir(String),

    /// A post-processing tool exited unsuccessfully
    #[error("post-processing with {tool} failed: {status}")]
    PostProcess { tool: String, status: String },

    /// A required external executable is missing
    #[error("executable not found: {0}")]
    ToolNotFound(String),

    /// The worker pool could not be built
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience type alias for Results using ExportError.
pub type Result<T> = std::result::Result<T, ExportError>;

impl ExportError {
    /// Create an IO error with path context.
    ///
    /// ```ignore
    /// let source = std::fs::read_to_string(path)
    ///     .map_err(|e| ExportError::io_with_path(e, path))?;
    /// ```
    #[inline]
    pub fn io_with_path(error: std::io::Error, path: impl AsRef<Path>) -> Self {
        ExportError::IoWithPath {
            error,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Map the error onto a process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExportError::Config(_) | ExportError::UnsafeOutputDir(_) => exit_code::CONFIG_ERROR,
            ExportError::Io(_)
            | ExportError::IoWithPath { .. }
            | ExportError::OutputExists(_)
            | ExportError::ToolNotFound(_) => exit_code::IO_ERROR,
            _ => exit_code::INTERNAL_ERROR,
        }
    }
}

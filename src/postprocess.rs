//! External formatting tools run over the output tree.
//!
//! Each tool runs as `<python> -m <tool>` in the output directory, in the
//! fixed order autoflake, isort, black. A non-zero exit aborts the run.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::error::{ExportError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tool {
    Autoflake,
    Isort,
    Black,
}

impl Tool {
    /// Python module name of the tool.
    pub fn module(self) -> &'static str {
        match self {
            Tool::Autoflake => "autoflake",
            Tool::Isort => "isort",
            Tool::Black => "black",
        }
    }

    /// Arguments after `-m <tool>`.
    pub fn args(self, verbose: bool) -> Vec<&'static str> {
        match self {
            Tool::Autoflake => vec![
                "--in-place",
                "--remove-all-unused-imports",
                "--exclude",
                "**/*.ast",
                "--recursive",
                ".",
            ],
            Tool::Isort | Tool::Black if verbose => vec!["."],
            Tool::Isort | Tool::Black => vec![".", "--quiet"],
        }
    }
}

/// Tools enabled by the given toggles, in execution order.
pub fn selected_tools(autoflake: bool, isort: bool, black: bool) -> Vec<Tool> {
    [
        (autoflake, Tool::Autoflake),
        (isort, Tool::Isort),
        (black, Tool::Black),
    ]
    .into_iter()
    .filter_map(|(enabled, tool)| enabled.then_some(tool))
    .collect()
}

/// A located interpreter that runs the tools.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    python: PathBuf,
    verbose: bool,
}

impl PostProcessor {
    /// Resolve `python` on `PATH`.
    pub fn locate(python: &str, verbose: bool) -> Result<Self> {
        let python =
            which::which(python).map_err(|_| ExportError::ToolNotFound(python.to_string()))?;
        debug!(python = %python.display(), "located interpreter");
        Ok(Self { python, verbose })
    }

    pub fn run(&self, tool: Tool, out_dir: &Path) -> Result<()> {
        info!("[postprocess] {}", tool.module());
        let status = Command::new(&self.python)
            .arg("-m")
            .arg(tool.module())
            .args(tool.args(self.verbose))
            .current_dir(out_dir)
            .status()
            .map_err(|e| ExportError::io_with_path(e, &self.python))?;
        if !status.success() {
            return Err(ExportError::PostProcess {
                tool: tool.module().to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }

    pub fn run_all(&self, tools: &[Tool], out_dir: &Path) -> Result<()> {
        for &tool in tools {
            self.run(tool, out_dir)?;
        }
        Ok(())
    }
}

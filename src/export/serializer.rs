//! Rendering and writing of the output tree.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};

use super::builder::ModulePlan;
use super::paths::{is_dunder, path_from_module};
use crate::error::{ExportError, Result};
use crate::syntax::{sexp, SyntaxModule};

/// Render every tree contributed to one module, in contribution order.
pub fn render(trees: &[SyntaxModule]) -> String {
    let joined = trees
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    normalize(&joined)
}

/// Trim whatever follows the last statement and end with a single newline
/// (or nothing for an empty module). Statement text, including the inside of
/// string literals, is left as written.
pub fn normalize(text: &str) -> String {
    let body = text.trim_end();
    if body.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(body.len() + 1);
    out.push_str(body);
    out.push('\n');
    out
}

/// Refuse dangerous output directories, then create the directory and
/// clear whatever it contains.
pub fn prepare_output_dir(out_dir: &Path) -> Result<()> {
    let shown = out_dir.to_string_lossy();
    if shown.trim().is_empty() || shown == "/" || shown == "~" {
        return Err(ExportError::UnsafeOutputDir(shown.into_owned()));
    }

    fs::create_dir_all(out_dir).map_err(|e| ExportError::io_with_path(e, out_dir))?;
    let entries = fs::read_dir(out_dir).map_err(|e| ExportError::io_with_path(e, out_dir))?;
    for entry in entries {
        let path = entry.map_err(|e| ExportError::io_with_path(e, out_dir))?.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| ExportError::io_with_path(e, &path))?;
    }
    Ok(())
}

/// Write `text` to a file that must not exist yet.
pub fn write_new(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ExportError::io_with_path(e, parent))?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => ExportError::OutputExists(path.to_path_buf()),
            _ => ExportError::io_with_path(e, path),
        })?;
    file.write_all(text.as_bytes())
        .map_err(|e| ExportError::io_with_path(e, path))
}

/// Write one module and, optionally, the S-expression of its output.
fn write_module(out_dir: &Path, rel: &Path, trees: &[SyntaxModule], dump_ast: bool) -> Result<PathBuf> {
    let path = out_dir.join(rel);
    let text = render(trees);
    write_new(&path, &text)?;
    if dump_ast {
        let mut ast_name = path.as_os_str().to_owned();
        ast_name.push(".ast");
        write_new(Path::new(&ast_name), &sexp(&text, &path)?)?;
    }
    debug!(path = %path.display(), trees = trees.len(), "wrote module");
    Ok(path)
}

/// Serialize every module of the plan in parallel. Returns the written
/// paths in contribution order.
pub fn write_plan(plan: &ModulePlan, out_dir: &Path, dump_ast: bool) -> Result<Vec<PathBuf>> {
    let layout = plan.layout();
    let jobs: Vec<(PathBuf, &[SyntaxModule])> = plan
        .contributions
        .iter()
        .map(|(module, trees)| {
            if is_dunder(module) {
                info!("[magic] {}", module);
            } else if layout.is_package(module) {
                info!("[init] {}", module);
            }
            (layout.destination(module), trees)
        })
        .collect();

    jobs.par_iter()
        .map(|(rel, trees)| write_module(out_dir, rel, trees, dump_ast))
        .collect()
}

/// Create the auxiliary packages as empty `__init__.py` files. Existing
/// files are left as they are.
pub fn write_aux_packages(out_dir: &Path, packages: &[String]) -> Result<()> {
    for package in packages {
        let path = out_dir.join(path_from_module(package, true));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ExportError::io_with_path(e, parent))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ExportError::io_with_path(e, &path))?;
    }
    Ok(())
}

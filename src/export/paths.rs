//! Conversions between module paths (`a.b.c`) and file paths (`a/b/c.py`).

use std::path::{Component, Path, PathBuf};

use crate::error::{ExportError, Result};

pub const PACKAGE_MARKER: &str = "__init__.py";

/// `a.b.f` -> `a.b`; `f` -> ``.
pub fn parent_module(value: &str) -> &str {
    value.rsplit_once('.').map_or("", |(parent, _)| parent)
}

/// `a.b.f` -> `f`.
pub fn last_segment(value: &str) -> &str {
    value.rsplit_once('.').map_or(value, |(_, last)| last)
}

/// Join a child path onto a parent; an empty child yields the parent.
pub fn join_module(parent: &str, child: &str) -> String {
    match (parent.is_empty(), child.is_empty()) {
        (_, true) => parent.to_string(),
        (true, false) => child.to_string(),
        (false, false) => format!("{}.{}", parent, child),
    }
}

/// Dunder-style final segment (`oneflow.__main__`).
pub fn is_dunder(module: &str) -> bool {
    let last = last_segment(module);
    last.len() > 4 && last.starts_with("__") && last.ends_with("__")
}

/// `oneflow/ops/nn_ops.py` -> `oneflow.ops.nn_ops`,
/// `oneflow/nn/__init__.py` -> `oneflow.nn`.
pub fn module_from_path(path: &Path) -> Result<String> {
    let invalid = || ExportError::InvalidModulePath(path.to_path_buf());

    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(invalid)?),
            Component::CurDir => {}
            _ => return Err(invalid()),
        }
    }

    let file = parts.pop().ok_or_else(invalid)?;
    if file != PACKAGE_MARKER {
        let stem = file.strip_suffix(".py").ok_or_else(invalid)?;
        parts.push(stem);
    }
    if parts.is_empty() || parts.iter().any(|p| p.is_empty()) {
        return Err(invalid());
    }
    Ok(parts.join("."))
}

/// `a.b` -> `a/b.py`, or `a/b/__init__.py` for packages.
pub fn path_from_module(module: &str, is_package: bool) -> PathBuf {
    let mut path: PathBuf = module.split('.').collect();
    if is_package {
        path.push(PACKAGE_MARKER);
    } else {
        path.set_extension("py");
    }
    path
}

//! Source discovery and per-file loading.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use globset::GlobSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::buckets::ExportBuckets;
use super::paths::{module_from_path, PACKAGE_MARKER};
use super::rules::ExportRules;
use super::visitor::ExportVisitor;
use crate::config::{EntryPoint, ExportConfig, SourceRoot};
use crate::error::{ExportError, Result};
use crate::syntax::{parse_source, SyntaxModule};

/// One input file and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub src: PathBuf,
    /// Destination, relative to the output directory.
    pub dst: PathBuf,
    pub namespace: String,
    pub is_test: bool,
    /// The `__init__.py` directly under a source root.
    pub is_root_marker: bool,
}

impl SourceSpec {
    fn entry(source_root: &Path, entry: &EntryPoint) -> Self {
        Self {
            src: source_root.join(&entry.src),
            dst: entry.dst.clone(),
            namespace: entry.namespace.clone(),
            is_test: false,
            is_root_marker: false,
        }
    }
}

/// Enumerate every input of a run, in load order: each source root's
/// files in sorted order, then the entry points. Debug mode replaces the
/// whole list with `[debug] sources`.
pub fn collect_specs(config: &ExportConfig, source_root: &Path, debug: bool) -> Result<Vec<SourceSpec>> {
    if debug {
        return Ok(config
            .debug
            .sources
            .iter()
            .map(|entry| SourceSpec::entry(source_root, entry))
            .collect());
    }

    let exclude = config.build_exclude_matcher()?;
    let mut specs = Vec::new();
    for root in &config.sources {
        scan_root(source_root, root, &exclude, &mut specs)?;
    }
    for entry in &config.entry_points {
        if exclude.is_match(&entry.src) {
            debug!(src = %entry.src.display(), "excluded entry point");
            continue;
        }
        specs.push(SourceSpec::entry(source_root, entry));
    }
    Ok(specs)
}

fn scan_root(
    source_root: &Path,
    root: &SourceRoot,
    exclude: &GlobSet,
    specs: &mut Vec<SourceSpec>,
) -> Result<()> {
    let dir = source_root.join(&root.dir);
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "source root does not exist, skipping");
        return Ok(());
    }

    for entry in WalkDir::new(&dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| dir.clone(), Path::to_path_buf);
            ExportError::io_with_path(e.into(), path)
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension() != Some(OsStr::new("py")) {
            continue;
        }
        let rel = path
            .strip_prefix(&dir)
            .map_err(|_| ExportError::InvalidModulePath(path.to_path_buf()))?;
        if exclude.is_match(root.dir.join(rel)) {
            debug!(path = %path.display(), "excluded");
            continue;
        }

        specs.push(SourceSpec {
            src: path.to_path_buf(),
            dst: root.destination.join(rel),
            namespace: root.namespace.clone(),
            is_test: rel
                .components()
                .next()
                .is_some_and(|first| first.as_os_str() == "test"),
            is_root_marker: rel == Path::new(PACKAGE_MARKER),
        });
    }
    Ok(())
}

/// A loaded and visited input file.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub src: PathBuf,
    pub dst: PathBuf,
    /// Destination module path.
    pub module: String,
    pub namespace: String,
    pub is_test: bool,
    pub is_root_marker: bool,
    /// Rewritten statements; `None` for test units that are not retained.
    pub tree: Option<SyntaxModule>,
    pub exports: ExportBuckets,
}

/// Read, parse and visit one file.
///
/// Test units are always parsed so a syntax error still aborts the run,
/// but only contribute output when `verbose` is set.
pub fn load_unit(spec: &SourceSpec, rules: &ExportRules, verbose: bool) -> Result<SourceUnit> {
    let module = module_from_path(&spec.dst)?;
    let source =
        fs::read_to_string(&spec.src).map_err(|e| ExportError::io_with_path(e, &spec.src))?;
    if spec.is_root_marker && !source.is_empty() {
        return Err(ExportError::NonEmptyRootMarker(spec.src.clone()));
    }
    let parsed = parse_source(&source, &spec.src)?;

    let mut unit = SourceUnit {
        src: spec.src.clone(),
        dst: spec.dst.clone(),
        module,
        namespace: spec.namespace.clone(),
        is_test: spec.is_test,
        is_root_marker: spec.is_root_marker,
        tree: None,
        exports: ExportBuckets::new(),
    };
    if spec.is_test && !verbose {
        info!("[skip test] {}", spec.src.display());
        return Ok(unit);
    }

    let outcome = ExportVisitor::new(rules, &spec.namespace, &unit.module, &source).visit(&parsed)?;
    unit.tree = Some(outcome.module);
    unit.exports = outcome.exports;
    Ok(unit)
}

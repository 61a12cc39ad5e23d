//! Import census over a Python tree.
//!
//! Counts how often modules under a prefix (`torch` by default) are
//! imported, to gauge how much of that API surface a code base depends on.

use std::ffi::OsStr;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::debug;
use tree_sitter::Node;
use walkdir::WalkDir;

use crate::error::{ExportError, Result};
use crate::syntax::{parse_source, Import, ImportFrom};

/// One row of the census.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CensusEntry {
    pub module: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ImportCensus {
    prefix: String,
    counts: FxHashMap<String, usize>,
}

impl ImportCensus {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counts: FxHashMap::default(),
        }
    }

    /// Count the imports of one source file, at every nesting depth.
    pub fn scan_source(&mut self, source: &str, path: &Path) -> Result<()> {
        let tree = parse_source(source, path)?;
        let mut cursor = tree.walk();
        loop {
            let node = cursor.node();
            self.record(node, source);
            if cursor.goto_first_child() {
                continue;
            }
            while !cursor.goto_next_sibling() {
                if !cursor.goto_parent() {
                    return Ok(());
                }
            }
        }
    }

    fn record(&mut self, node: Node, source: &str) {
        match node.kind() {
            "import_from_statement" => {
                let import = ImportFrom::from_node(node, source);
                if let Some(module) = import.module {
                    if module == self.prefix || module.contains(&format!("{}.", self.prefix)) {
                        *self.counts.entry(module).or_default() += 1;
                    }
                }
            }
            "import_statement" => {
                let dotted = format!("{}.", self.prefix);
                for alias in Import::from_node(node, source).names {
                    if alias.name.starts_with(&dotted) {
                        *self.counts.entry(alias.name).or_default() += 1;
                    }
                }
            }
            _ => {}
        }
    }

    pub fn merge(&mut self, other: ImportCensus) {
        for (module, count) in other.counts {
            *self.counts.entry(module).or_default() += count;
        }
    }

    pub fn get(&self, module: &str) -> usize {
        self.counts.get(module).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Entries by descending count, ties broken by module name.
    pub fn most_common(&self) -> Vec<CensusEntry> {
        let mut entries: Vec<CensusEntry> = self
            .counts
            .iter()
            .map(|(module, &count)| CensusEntry {
                module: module.clone(),
                count,
            })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.module.cmp(&b.module)));
        entries
    }
}

/// Run the census over every `*.py` file under `dir` in parallel.
pub fn census_dir(dir: &Path, prefix: &str) -> Result<ImportCensus> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
            ExportError::io_with_path(e.into(), path)
        })?;
        if entry.file_type().is_file() && entry.path().extension() == Some(OsStr::new("py")) {
            files.push(entry.into_path());
        }
    }
    debug!(count = files.len(), dir = %dir.display(), "census files");

    let partials = files
        .par_iter()
        .map(|path| {
            let source =
                fs::read_to_string(path).map_err(|e| ExportError::io_with_path(e, path))?;
            let mut census = ImportCensus::new(prefix);
            census.scan_source(&source, path)?;
            Ok(census)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut total = ImportCensus::new(prefix);
    for partial in partials {
        total.merge(partial);
    }
    Ok(total)
}

/// `count module` per line.
pub fn render_text(entries: &[CensusEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(out, "{:>6} {}", entry.count, entry.module);
    }
    out
}

pub fn render_json(entries: &[CensusEntry]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(entries)
}

//! Ordered module accumulators.
//!
//! [`ExportBuckets`] is what one visitor pass produces for other modules;
//! [`ModuleContributions`] is the run-wide reduction of every unit's own
//! tree and buckets. Both keep first-insertion order, which fixes the
//! declaration order of the emitted files.

use rustc_hash::FxHashMap;

use crate::syntax::{Stmt, SyntaxModule};

#[derive(Debug, Clone)]
struct OrderedMap<V> {
    entries: Vec<(String, V)>,
    index: FxHashMap<String, usize>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }
}

impl<V: Default> OrderedMap<V> {
    fn entry(&mut self, key: &str) -> &mut V {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                self.entries.push((key.to_string(), V::default()));
                self.index.insert(key.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[slot].1
    }
}

impl<V> OrderedMap<V> {
    fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&slot| &self.entries[slot].1)
    }
}

/// Statements synthesized by one visitor pass, keyed by destination module.
#[derive(Debug, Clone, Default)]
pub struct ExportBuckets {
    map: OrderedMap<SyntaxModule>,
}

impl ExportBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, module: &str, stmt: impl Into<Stmt>) {
        self.map.entry(module).push(stmt);
    }

    pub fn extend(&mut self, module: &str, stmts: impl IntoIterator<Item = Stmt>) {
        self.map.entry(module).body.extend(stmts);
    }

    pub fn get(&self, module: &str) -> Option<&SyntaxModule> {
        self.map.get(module)
    }

    pub fn len(&self) -> usize {
        self.map.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.entries.is_empty()
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.map.entries.iter().map(|(module, _)| module.as_str())
    }
}

impl IntoIterator for ExportBuckets {
    type Item = (String, SyntaxModule);
    type IntoIter = std::vec::IntoIter<(String, SyntaxModule)>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.entries.into_iter()
    }
}

/// Every tree destined for each output module, in contribution order.
/// Trees are appended, never merged.
#[derive(Debug, Clone, Default)]
pub struct ModuleContributions {
    map: OrderedMap<Vec<SyntaxModule>>,
}

impl ModuleContributions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, module: &str, tree: SyntaxModule) {
        self.map.entry(module).push(tree);
    }

    /// Fold one unit's buckets in, bucket by bucket.
    pub fn merge(&mut self, buckets: ExportBuckets) {
        for (module, tree) in buckets {
            self.append(&module, tree);
        }
    }

    pub fn get(&self, module: &str) -> Option<&[SyntaxModule]> {
        self.map.get(module).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.map.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SyntaxModule])> {
        self.map
            .entries
            .iter()
            .map(|(module, trees)| (module.as_str(), trees.as_slice()))
    }
}

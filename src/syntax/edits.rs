//! Byte-range edits over a source buffer.
//!
//! Used for statements the export visitor rewrites in place (module-level
//! `if`/`try`/`with` blocks) where rebuilding the statement from the model
//! would lose the author's layout.

use std::ops::Range;

/// A single replacement. An empty `replacement` deletes the range; an empty
/// range inserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub replacement: String,
}

/// A set of non-overlapping edits.
#[derive(Debug, Clone, Default)]
pub struct EditSet {
    edits: Vec<TextEdit>,
}

impl EditSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, range: Range<usize>, replacement: impl Into<String>) {
        self.edits.push(TextEdit {
            range,
            replacement: replacement.into(),
        });
    }

    pub fn delete(&mut self, range: Range<usize>) {
        self.replace(range, String::new());
    }

    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.replace(at..at, text);
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply the edits falling inside `window` to `source[window]`.
    ///
    /// Edits are applied in source order. An edit overlapping one that was
    /// already applied is skipped; insertions at the same offset keep their
    /// push order.
    pub fn apply(&self, source: &str, window: Range<usize>) -> String {
        let mut ordered: Vec<&TextEdit> = self
            .edits
            .iter()
            .filter(|e| e.range.start >= window.start && e.range.end <= window.end)
            .collect();
        ordered.sort_by_key(|e| (e.range.start, e.range.end));

        let mut out = String::with_capacity(window.len());
        let mut cursor = window.start;
        for edit in ordered {
            if edit.range.start < cursor {
                continue;
            }
            out.push_str(&source[cursor..edit.range.start]);
            out.push_str(&edit.replacement);
            cursor = edit.range.end;
        }
        out.push_str(&source[cursor..window.end]);
        out
    }
}

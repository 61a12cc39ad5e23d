//! Python syntax support.
//!
//! Parsing is delegated to tree-sitter-python. The export pipeline never
//! mutates the concrete syntax tree: it reads nodes and produces a
//! [`SyntaxModule`], a small statement model that owns its text and knows
//! how to unparse itself.

pub mod edits;
pub mod module;

use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use crate::error::{ExportError, Result};

pub use edits::EditSet;
pub use module::{Alias, Assign, DefKind, Definition, Import, ImportFrom, Stmt, SyntaxModule};

/// Get a configured tree-sitter parser for Python.
pub fn parser() -> Result<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| ExportError::TreeSitter(e.to_string()))?;
    Ok(parser)
}

/// Parse `source`, failing on any syntax error.
///
/// tree-sitter recovers from errors by inserting `ERROR`/`MISSING` nodes;
/// the first such node is reported with a 1-based position.
pub fn parse_source(source: &str, path: &Path) -> Result<Tree> {
    let mut parser = parser()?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ExportError::TreeSitter(format!("parser gave up on {}", path.display())))?;

    let root = tree.root_node();
    if root.has_error() {
        let at = first_error(root).unwrap_or(root);
        let pos = at.start_position();
        return Err(ExportError::Parse {
            path: path.to_path_buf(),
            line: pos.row + 1,
            column: pos.column + 1,
        });
    }
    Ok(tree)
}

/// Render the S-expression of a parsed source, used for `--ast` dumps.
pub fn sexp(source: &str, path: &Path) -> Result<String> {
    let tree = parse_source(source, path)?;
    Ok(tree.root_node().to_sexp())
}

/// Find the first `ERROR` or `MISSING` node in document order.
fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() || child.is_missing() {
            if let Some(found) = first_error(child) {
                return Some(found);
            }
        }
    }
    None
}

/// Get text from a node.
pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// The source line prefix in front of `node` (its indentation when the node
/// starts a line).
pub fn line_prefix<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    let start = node.start_byte();
    let line_start = source[..start].rfind('\n').map_or(0, |i| i + 1);
    &source[line_start..start]
}

/// Named children of `node` with comments filtered out.
pub fn statements<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node
        .named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect();
    children
}

/// Value of a plain string literal (`"a.b"`, `'a.b'`, `r"a.b"`, triple
/// quoted). Returns `None` for f-strings, byte strings and concatenations.
pub fn string_literal_value(text: &str) -> Option<&str> {
    let quote_at = text.find(['"', '\''])?;
    let prefix = &text[..quote_at];
    if !prefix
        .chars()
        .all(|c| matches!(c, 'r' | 'R' | 'u' | 'U'))
    {
        return None;
    }
    let body = &text[quote_at..];
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= 2 * quote.len() && body.starts_with(quote) && body.ends_with(quote) {
            return Some(&body[quote.len()..body.len() - quote.len()]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_source() {
        let tree = parse_source("def f():\n    return 1\n", Path::new("m.py")).unwrap();
        assert_eq!(tree.root_node().kind(), "module");
    }

    #[test]
    fn parse_error_reports_position() {
        let err = parse_source("x = 1\ndef f(:\n    pass\n", Path::new("bad.py")).unwrap_err();
        match err {
            ExportError::Parse { path, line, .. } => {
                assert_eq!(path, Path::new("bad.py"));
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn string_literals() {
        assert_eq!(string_literal_value("\"nn.Conv2d\""), Some("nn.Conv2d"));
        assert_eq!(string_literal_value("'relu'"), Some("relu"));
        assert_eq!(string_literal_value("r\"a.b\""), Some("a.b"));
        assert_eq!(string_literal_value("\"\"\"doc\"\"\""), Some("doc"));
        assert_eq!(string_literal_value("f\"{x}\""), None);
        assert_eq!(string_literal_value("b'x'"), None);
        assert_eq!(string_literal_value("name"), None);
    }

    #[test]
    fn line_prefix_is_indentation() {
        let source = "if x:\n    import os\n";
        let tree = parse_source(source, Path::new("m.py")).unwrap();
        let if_stmt = tree.root_node().named_child(0).unwrap();
        let block = if_stmt.child_by_field_name("consequence").unwrap();
        let import = block.named_child(0).unwrap();
        assert_eq!(line_prefix(import, source), "    ");
    }

    #[test]
    fn sexp_dump() {
        let dump = sexp("import os\n", Path::new("m.py")).unwrap();
        assert!(dump.starts_with("(module (import_statement"));
    }
}

//! Declaration tags.
//!
//! Each decorator is classified once into a closed set of [`Tag`]s, so the
//! visitor matches on variants instead of comparing decorator names at
//! every decision point.

use tree_sitter::Node;

use super::paths::{join_module, last_segment, parent_module};
use super::rules::{Channel, ExportRules};
use crate::error::{ExportError, Result};
use crate::syntax::{node_text, string_literal_value};

/// One export destination: `module.symbol`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTarget {
    pub module: String,
    pub symbol: String,
}

impl ExportTarget {
    /// `"nn.functional.relu"` under `oneflow` -> (`oneflow.nn.functional`, `relu`).
    pub fn from_dotted(namespace: &str, dotted: &str) -> Self {
        Self {
            module: join_module(namespace, parent_module(dotted)),
            symbol: last_segment(dotted).to_string(),
        }
    }
}

/// Ordered, non-empty export targets. The first is authoritative; the rest
/// become re-export aliases of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDirective {
    targets: Vec<ExportTarget>,
}

impl ExportDirective {
    /// Build from the decorator's string arguments.
    ///
    /// A later argument equal to the first is a contract violation in the
    /// source tree and aborts the run.
    pub fn parse(args: &[String], namespace: &str, module: &str, symbol: &str) -> Result<Self> {
        let Some(first) = args.first() else {
            return Err(ExportError::MalformedDirective {
                module: module.to_string(),
                symbol: symbol.to_string(),
                reason: "no export target".to_string(),
            });
        };
        if let Some(repeated) = args[1..].iter().find(|arg| *arg == first) {
            return Err(ExportError::DuplicateExportTarget {
                module: module.to_string(),
                symbol: symbol.to_string(),
                target: repeated.clone(),
            });
        }
        Ok(Self {
            targets: args
                .iter()
                .map(|arg| ExportTarget::from_dotted(namespace, arg))
                .collect(),
        })
    }

    pub fn first(&self) -> &ExportTarget {
        &self.targets[0]
    }

    /// Targets after the first.
    pub fn aliases(&self) -> &[ExportTarget] {
        &self.targets[1..]
    }

}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Exported(ExportDirective),
    /// The function's return expression becomes a module-level value.
    ExportedValue(ExportTarget),
    Deprecated,
    ExperimentalOnly,
    StableOnly,
}

/// A function or class definition together with its tags.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub name: String,
    /// Module the declaration is written in.
    pub module: String,
    pub tags: Vec<Tag>,
    pub has_reserved_keyword: bool,
}

impl Declaration {
    /// Whether the declaration belongs in the given channel's output.
    pub fn ships_in(&self, channel: Channel) -> bool {
        !self.tags.iter().any(|tag| {
            matches!(
                (tag, channel),
                (Tag::ExperimentalOnly, Channel::Compat) | (Tag::StableOnly, Channel::Modern)
            )
        })
    }

    pub fn is_deprecated(&self) -> bool {
        self.tags.iter().any(|tag| matches!(tag, Tag::Deprecated))
    }

    /// The first export-like tag in decorator order, which decides the
    /// declaration's fate.
    pub fn primary_export(&self) -> Option<&Tag> {
        self.tags
            .iter()
            .find(|tag| matches!(tag, Tag::Exported(_) | Tag::ExportedValue(_)))
    }
}

/// Name of a decorator of the form `@name` or `@name(...)`.
pub fn decorator_callee<'a>(expr: Node<'_>, source: &'a str) -> Option<&'a str> {
    match expr.kind() {
        "identifier" => Some(node_text(expr, source)),
        "call" => {
            let function = expr.child_by_field_name("function")?;
            (function.kind() == "identifier").then(|| node_text(function, source))
        }
        _ => None,
    }
}

/// Identifier at the root of a call chain: `f`, `f(x)` and `f(x)(y)` all
/// yield `f`.
pub fn call_root<'a>(expr: Node<'_>, source: &'a str) -> Option<&'a str> {
    match expr.kind() {
        "identifier" => Some(node_text(expr, source)),
        "call" => call_root(expr.child_by_field_name("function")?, source),
        _ => None,
    }
}

/// Whether a decorator expression references an export-machinery marker.
pub fn is_marker_decorator(expr: Node<'_>, source: &str, rules: &ExportRules) -> bool {
    call_root(expr, source).is_some_and(|root| rules.is_marker(root))
}

/// The expression of a `decorator` node.
pub fn decorator_expression(decorator: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = decorator.walk();
    let expr = decorator
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment");
    expr
}

/// Classify one decorator expression.
pub fn classify_decorator(
    expr: Node<'_>,
    source: &str,
    rules: &ExportRules,
    namespace: &str,
    module: &str,
    symbol: &str,
) -> Result<Option<Tag>> {
    let Some(callee) = decorator_callee(expr, source) else {
        return Ok(None);
    };
    let markers = &rules.markers;

    let tag = if callee == markers.export {
        let args = string_arguments(expr, source, module, symbol)?;
        Some(Tag::Exported(ExportDirective::parse(
            &args, namespace, module, symbol,
        )?))
    } else if callee == markers.export_value {
        let args = string_arguments(expr, source, module, symbol)?;
        if args.len() != 1 {
            return Err(ExportError::MalformedDirective {
                module: module.to_string(),
                symbol: symbol.to_string(),
                reason: format!("{} takes exactly one target", markers.export_value),
            });
        }
        Some(Tag::ExportedValue(ExportTarget::from_dotted(namespace, &args[0])))
    } else if callee == markers.deprecated {
        Some(Tag::Deprecated)
    } else if callee == markers.experimental {
        Some(Tag::ExperimentalOnly)
    } else if callee == markers.stable {
        Some(Tag::StableOnly)
    } else {
        None
    };
    Ok(tag)
}

/// Positional string-literal arguments of a decorator call.
fn string_arguments(expr: Node<'_>, source: &str, module: &str, symbol: &str) -> Result<Vec<String>> {
    let malformed = |reason: String| ExportError::MalformedDirective {
        module: module.to_string(),
        symbol: symbol.to_string(),
        reason,
    };

    let Some(arguments) = expr.child_by_field_name("arguments") else {
        return Err(malformed("missing call arguments".to_string()));
    };

    let mut args = Vec::new();
    let mut cursor = arguments.walk();
    for arg in arguments.named_children(&mut cursor) {
        if arg.kind() == "comment" {
            continue;
        }
        let text = node_text(arg, source);
        match (arg.kind(), string_literal_value(text)) {
            ("string", Some(value)) => args.push(value.to_string()),
            _ => return Err(malformed(format!("expected a string literal, found `{}`", text))),
        }
    }
    Ok(args)
}

/// Whether any identifier inside `node` is one of the reserved words.
pub fn uses_reserved_word(node: Node<'_>, source: &str, rules: &ExportRules) -> bool {
    let mut cursor = node.walk();
    loop {
        let current = cursor.node();
        if current.kind() == "identifier" && rules.is_reserved(node_text(current, source)) {
            return true;
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() || cursor.node() == node {
                return false;
            }
        }
    }
}

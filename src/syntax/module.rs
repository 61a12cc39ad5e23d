//! Statement model and unparser.
//!
//! A [`SyntaxModule`] is an ordered list of top-level statements. Imports,
//! assignments and definitions are structured because the export visitor
//! synthesizes or renames them; everything else is carried as verbatim
//! source text. `Display` renders a module back to Python source.

use std::fmt;

use tree_sitter::Node;

use super::node_text;

/// `name [as asname]` in an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
}

impl Alias {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            asname: None,
        }
    }

    /// An alias that renders without `as` when both names agree.
    pub fn aliased(name: impl Into<String>, asname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            asname: Some(asname.into()),
        }
    }

    fn from_node(node: Node, source: &str) -> Option<Self> {
        match node.kind() {
            "dotted_name" | "identifier" => Some(Self::new(dotted(node, source))),
            "aliased_import" => {
                let name = node.child_by_field_name("name")?;
                let alias = node.child_by_field_name("alias")?;
                Some(Self::aliased(
                    dotted(name, source),
                    node_text(alias, source).to_string(),
                ))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.asname {
            Some(asname) if asname != &self.name => write!(f, "{} as {}", self.name, asname),
            _ => f.write_str(&self.name),
        }
    }
}

/// `import a.b, c as d`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub names: Vec<Alias>,
}

impl Import {
    /// Build from an `import_statement` node.
    pub fn from_node(node: Node, source: &str) -> Self {
        let mut cursor = node.walk();
        let names = node
            .children_by_field_name("name", &mut cursor)
            .filter_map(|child| Alias::from_node(child, source))
            .collect();
        Self { names }
    }
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("import ")?;
        write_aliases(f, &self.names)
    }
}

/// `from [.]module import a, b as c` (or `*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFrom {
    pub module: Option<String>,
    pub names: Vec<Alias>,
    /// Number of leading dots of a relative import.
    pub level: usize,
}

impl ImportFrom {
    pub fn new(module: impl Into<String>, names: Vec<Alias>) -> Self {
        Self {
            module: Some(module.into()),
            names,
            level: 0,
        }
    }

    /// `from module import *`
    pub fn wildcard(module: impl Into<String>) -> Self {
        Self::new(module, vec![Alias::new("*")])
    }

    /// Build from an `import_from_statement` or `future_import_statement`.
    pub fn from_node(node: Node, source: &str) -> Self {
        let mut module = None;
        let mut level = 0;

        if node.kind() == "future_import_statement" {
            module = Some("__future__".to_string());
        } else if let Some(module_node) = node.child_by_field_name("module_name") {
            match module_node.kind() {
                "relative_import" => {
                    let mut cursor = module_node.walk();
                    for part in module_node.named_children(&mut cursor) {
                        match part.kind() {
                            "import_prefix" => {
                                level = node_text(part, source)
                                    .chars()
                                    .filter(|&c| c == '.')
                                    .count();
                            }
                            "dotted_name" => module = Some(dotted(part, source)),
                            _ => {}
                        }
                    }
                }
                _ => module = Some(dotted(module_node, source)),
            }
        }

        let mut names: Vec<Alias> = Vec::new();
        let mut cursor = node.walk();
        for child in node.children_by_field_name("name", &mut cursor) {
            if let Some(alias) = Alias::from_node(child, source) {
                names.push(alias);
            }
        }
        let mut cursor = node.walk();
        if node
            .named_children(&mut cursor)
            .any(|child| child.kind() == "wildcard_import")
        {
            names.push(Alias::new("*"));
        }

        Self {
            module,
            names,
            level,
        }
    }
}

impl fmt::Display for ImportFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "from {}{} import ",
            ".".repeat(self.level),
            self.module.as_deref().unwrap_or("")
        )?;
        write_aliases(f, &self.names)
    }
}

/// `target = value`, where `value` is expression source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assign {
    pub target: String,
    pub value: String,
}

impl fmt::Display for Assign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.target, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefKind {
    Function,
    AsyncFunction,
    Class,
}

impl DefKind {
    fn keyword(self) -> &'static str {
        match self {
            DefKind::Function => "def",
            DefKind::AsyncFunction => "async def",
            DefKind::Class => "class",
        }
    }
}

/// A function or class definition.
///
/// `tail` is the source text following the name up to the end of the
/// definition (parameters or bases, colon and body), so renaming only
/// touches `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub kind: DefKind,
    pub name: String,
    /// Decorator expressions without the leading `@`.
    pub decorators: Vec<String>,
    pub tail: String,
}

impl Definition {
    /// Build from a `function_definition` or `class_definition` node.
    /// Decorators are supplied by the caller, which filters them.
    pub fn from_node(node: Node, source: &str, decorators: Vec<String>) -> Option<Self> {
        let kind = match node.kind() {
            "class_definition" => DefKind::Class,
            "function_definition" => {
                let mut cursor = node.walk();
                let is_async = node.children(&mut cursor).any(|c| c.kind() == "async");
                if is_async {
                    DefKind::AsyncFunction
                } else {
                    DefKind::Function
                }
            }
            _ => return None,
        };
        let name = node.child_by_field_name("name")?;
        Some(Self {
            kind,
            name: node_text(name, source).to_string(),
            decorators,
            tail: source.get(name.end_byte()..node.end_byte())?.to_string(),
        })
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for decorator in &self.decorators {
            writeln!(f, "@{}", decorator)?;
        }
        write!(f, "{} {}{}", self.kind.keyword(), self.name, self.tail)
    }
}

/// One top-level statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Import(Import),
    ImportFrom(ImportFrom),
    Assign(Assign),
    Def(Definition),
    /// Source text kept as written.
    Verbatim(String),
}

impl Stmt {
    fn is_block(&self) -> bool {
        match self {
            Stmt::Def(_) => true,
            Stmt::Verbatim(text) => text.trim_end().contains('\n'),
            _ => false,
        }
    }
}

impl From<Import> for Stmt {
    fn from(import: Import) -> Self {
        Stmt::Import(import)
    }
}

impl From<ImportFrom> for Stmt {
    fn from(import: ImportFrom) -> Self {
        Stmt::ImportFrom(import)
    }
}

impl From<Definition> for Stmt {
    fn from(def: Definition) -> Self {
        Stmt::Def(def)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Import(s) => fmt::Display::fmt(s, f),
            Stmt::ImportFrom(s) => fmt::Display::fmt(s, f),
            Stmt::Assign(s) => fmt::Display::fmt(s, f),
            Stmt::Def(s) => fmt::Display::fmt(s, f),
            Stmt::Verbatim(s) => f.write_str(s.trim_end()),
        }
    }
}

/// An ordered sequence of top-level statements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntaxModule {
    pub body: Vec<Stmt>,
}

impl SyntaxModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stmt: impl Into<Stmt>) {
        self.body.push(stmt.into());
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }
}

impl fmt::Display for SyntaxModule {
    /// Blocks (definitions, compound statements) are separated from their
    /// neighbours by one blank line; simple statements are not.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut previous_was_block = false;
        for (i, stmt) in self.body.iter().enumerate() {
            let is_block = stmt.is_block();
            if i > 0 && (is_block || previous_was_block) {
                f.write_str("\n")?;
            }
            writeln!(f, "{}", stmt)?;
            previous_was_block = is_block;
        }
        Ok(())
    }
}

fn write_aliases(f: &mut fmt::Formatter<'_>, names: &[Alias]) -> fmt::Result {
    for (i, alias) in names.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        fmt::Display::fmt(alias, f)?;
    }
    Ok(())
}

/// Dotted name text with any interior whitespace removed.
fn dotted(node: Node, source: &str) -> String {
    node_text(node, source)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

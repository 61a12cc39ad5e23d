//! The export visitor.
//!
//! Walks the top-level statements of one parsed file and produces the
//! file's rewritten [`SyntaxModule`] together with the [`ExportBuckets`]
//! it contributes to other modules. The tree-sitter tree is only read.

use phf::phf_set;
use tracing::debug;
use tree_sitter::{Node, Tree};

use super::buckets::ExportBuckets;
use super::imports::{rewrite_import, rewrite_import_from};
use super::rules::{Channel, ExportRules};
use super::tags::{
    call_root, classify_decorator, decorator_expression, is_marker_decorator, uses_reserved_word,
    Declaration, ExportDirective, ExportTarget, Tag,
};
use crate::config::RelocationPolicy;
use crate::error::{ExportError, Result};
use crate::syntax::{
    line_prefix, node_text, statements, Alias, Assign, Definition, EditSet, Import, ImportFrom,
    Stmt, SyntaxModule,
};

/// Module-level statements rewritten in place with byte-range edits.
static COMPOUND_STATEMENTS: phf::Set<&'static str> = phf_set! {
    "if_statement",
    "for_statement",
    "while_statement",
    "try_statement",
    "with_statement",
    "match_statement",
};

static DEFINITIONS: phf::Set<&'static str> = phf_set! {
    "function_definition",
    "class_definition",
    "decorated_definition",
};

/// What one file contributes to the output.
#[derive(Debug, Clone, Default)]
pub struct VisitOutcome {
    /// The file's own rewritten statements.
    pub module: SyntaxModule,
    /// Statements synthesized for other modules.
    pub exports: ExportBuckets,
}

/// A definition node with its decorators split out.
struct DefinitionSite<'t> {
    /// `decorated_definition`, or the definition itself when undecorated.
    outer: Node<'t>,
    definition: Node<'t>,
    decorators: Vec<Node<'t>>,
}

impl<'t> DefinitionSite<'t> {
    fn new(node: Node<'t>) -> Option<Self> {
        if node.kind() != "decorated_definition" {
            return Some(Self {
                outer: node,
                definition: node,
                decorators: Vec::new(),
            });
        }
        let definition = node.child_by_field_name("definition")?;
        let mut cursor = node.walk();
        let decorators = node
            .named_children(&mut cursor)
            .filter(|child| child.kind() == "decorator")
            .collect();
        Some(Self {
            outer: node,
            definition,
            decorators,
        })
    }
}

pub struct ExportVisitor<'a> {
    rules: &'a ExportRules,
    namespace: &'a str,
    channel: Channel,
    /// Destination module of the visited file.
    module: &'a str,
    source: &'a str,
    /// Surviving imports seen so far, copied into relocated declarations'
    /// target modules.
    top_imports: Vec<Stmt>,
    output: SyntaxModule,
    exports: ExportBuckets,
}

impl<'a> ExportVisitor<'a> {
    pub fn new(rules: &'a ExportRules, namespace: &'a str, module: &'a str, source: &'a str) -> Self {
        Self {
            rules,
            namespace,
            channel: rules.channel(namespace),
            module,
            source,
            top_imports: Vec::new(),
            output: SyntaxModule::new(),
            exports: ExportBuckets::new(),
        }
    }

    pub fn visit(mut self, tree: &Tree) -> Result<VisitOutcome> {
        let root = tree.root_node();
        let mut cursor = root.walk();
        let children: Vec<Node> = root.named_children(&mut cursor).collect();
        for node in children {
            self.visit_statement(node)?;
        }
        Ok(VisitOutcome {
            module: self.output,
            exports: self.exports,
        })
    }

    fn visit_statement(&mut self, node: Node) -> Result<()> {
        match node.kind() {
            "import_statement" => {
                if let Some(import) = rewrite_import(Import::from_node(node, self.source), self.rules) {
                    self.top_imports.push(import.clone().into());
                    self.output.push(import);
                }
            }
            "import_from_statement" | "future_import_statement" => {
                let import = ImportFrom::from_node(node, self.source);
                if let Some(import) = rewrite_import_from(import, self.rules) {
                    self.top_imports.push(import.clone().into());
                    self.output.push(import);
                }
            }
            "expression_statement" if self.is_elided_expression(node) => {
                debug!(module = self.module, line = node.start_position().row + 1, "eliding expression");
            }
            kind if DEFINITIONS.contains(kind) => self.visit_definition(node)?,
            kind if COMPOUND_STATEMENTS.contains(kind) => self.visit_compound(node)?,
            _ => self
                .output
                .push(Stmt::Verbatim(node_text(node, self.source).to_string())),
        }
        Ok(())
    }

    /// The copyright banner, or an expression rooted at a marker identifier.
    fn is_elided_expression(&self, node: Node) -> bool {
        let Some(expr) = node.named_child(0) else {
            return false;
        };
        match expr.kind() {
            "string" => node_text(expr, self.source).contains(&self.rules.markers.copyright),
            _ => call_root(expr, self.source).is_some_and(|root| self.rules.is_marker(root)),
        }
    }

    fn declare(&self, site: &DefinitionSite) -> Result<Declaration> {
        let name = site
            .definition
            .child_by_field_name("name")
            .map(|name| node_text(name, self.source).to_string())
            .ok_or_else(|| {
                ExportError::TreeSitter(format!("definition without a name in {}", self.module))
            })?;

        let mut tags = Vec::new();
        for decorator in &site.decorators {
            let Some(expr) = decorator_expression(*decorator) else {
                continue;
            };
            if let Some(tag) =
                classify_decorator(expr, self.source, self.rules, self.namespace, self.module, &name)?
            {
                tags.push(tag);
            }
        }

        Ok(Declaration {
            has_reserved_keyword: uses_reserved_word(site.outer, self.source, self.rules),
            name,
            module: self.module.to_string(),
            tags,
        })
    }

    fn visit_definition(&mut self, node: Node) -> Result<()> {
        let site = DefinitionSite::new(node).ok_or_else(|| {
            ExportError::TreeSitter(format!("decorated definition without body in {}", self.module))
        })?;
        let decl = self.declare(&site)?;
        if !decl.ships_in(self.channel) {
            debug!(module = self.module, name = %decl.name, "dropping gated definition");
            return Ok(());
        }

        let decorators = site
            .decorators
            .iter()
            .filter_map(|decorator| decorator_expression(*decorator))
            .filter(|expr| !is_marker_decorator(*expr, self.source, self.rules))
            .map(|expr| node_text(expr, self.source).to_string())
            .collect();
        let definition = Definition::from_node(site.definition, self.source, decorators)
            .ok_or_else(|| {
                ExportError::TreeSitter(format!("unsupported definition in {}", self.module))
            })?;

        match decl.primary_export() {
            Some(Tag::ExportedValue(target)) => {
                let assign = self.value_assignment(&site, &decl, target)?;
                self.exports.append(&target.module, Stmt::Assign(assign));
            }
            Some(Tag::Exported(directive)) if self.keeps_in_source(&decl, directive) => {
                if decl.is_deprecated() {
                    let import = self.deprecation_import();
                    self.output.push(import);
                }
                self.output.push(definition);
                self.export_from_source(&decl, directive);
            }
            Some(Tag::Exported(directive)) => self.relocate(&decl, directive, definition),
            _ => {
                if decl.is_deprecated() {
                    let import = self.deprecation_import();
                    self.output.push(import);
                }
                self.output.push(definition);
            }
        }
        Ok(())
    }

    fn keeps_in_source(&self, decl: &Declaration, directive: &ExportDirective) -> bool {
        match self.rules.policy {
            RelocationPolicy::KeepInSource => true,
            RelocationPolicy::Heuristic => {
                let first = directive.first();
                decl.has_reserved_keyword
                    || first.module == self.module
                    || self.rules.keeps_module(&first.module)
            }
        }
    }

    /// Bucket imports for a declaration that stays in its own module.
    fn export_from_source(&mut self, decl: &Declaration, directive: &ExportDirective) {
        let first = directive.first();
        if first.module != self.module || first.symbol != decl.name {
            self.exports.append(
                &first.module,
                ImportFrom::new(self.module, vec![Alias::aliased(&decl.name, &first.symbol)]),
            );
        }
        self.forward_aliases(directive);
    }

    /// Every later target re-exports the first one.
    fn forward_aliases(&mut self, directive: &ExportDirective) {
        let first = directive.first();
        for alias in directive.aliases() {
            self.exports.append(
                &alias.module,
                ImportFrom::new(
                    first.module.as_str(),
                    vec![Alias::aliased(&first.symbol, &alias.symbol)],
                ),
            );
        }
    }

    /// Move the definition itself into its first target module.
    fn relocate(&mut self, decl: &Declaration, directive: &ExportDirective, mut definition: Definition) {
        let first = directive.first();
        debug!(module = self.module, name = %decl.name, target = %first.module, "relocating definition");

        if decl.is_deprecated() {
            let import = self.deprecation_import();
            self.exports.append(&first.module, import);
        }
        self.exports
            .extend(&first.module, self.top_imports.iter().cloned());
        if first.module != self.rules.root {
            self.exports
                .append(&first.module, ImportFrom::wildcard(self.module));
        }
        let original = std::mem::replace(&mut definition.name, first.symbol.clone());
        self.exports.append(&first.module, definition);

        let asname = (original != first.symbol).then_some(original);
        self.output.push(ImportFrom::new(
            first.module.as_str(),
            vec![Alias {
                name: first.symbol.clone(),
                asname,
            }],
        ));
        self.forward_aliases(directive);
    }

    /// `symbol = <expr>` from a function whose body is a docstring followed
    /// by `return <expr>`.
    fn value_assignment(
        &self,
        site: &DefinitionSite,
        decl: &Declaration,
        target: &ExportTarget,
    ) -> Result<Assign> {
        let malformed = || ExportError::MalformedValueExport {
            module: self.module.to_string(),
            symbol: decl.name.clone(),
        };
        let body = site
            .definition
            .child_by_field_name("body")
            .ok_or_else(malformed)?;
        let body = statements(body);
        if body.len() != 2 {
            return Err(malformed());
        }
        let value = match body[1].kind() {
            "return_statement" | "expression_statement" => body[1].named_child(0),
            _ => None,
        }
        .ok_or_else(malformed)?;
        Ok(Assign {
            target: target.symbol.clone(),
            value: node_text(value, self.source).to_string(),
        })
    }

    fn deprecation_import(&self) -> ImportFrom {
        let markers = &self.rules.markers;
        ImportFrom::new(
            markers.deprecation_module.as_str(),
            vec![Alias::new(markers.deprecated.as_str())],
        )
    }

    fn visit_compound(&mut self, node: Node) -> Result<()> {
        let mut edits = EditSet::new();
        self.rewrite_nested(node, &mut edits)?;
        let text = if edits.is_empty() {
            node_text(node, self.source).to_string()
        } else {
            edits.apply(self.source, node.byte_range())
        };
        self.output.push(Stmt::Verbatim(text));
        Ok(())
    }

    /// Collect edits for statements nested in a module-level compound
    /// statement. Function and class bodies are left alone.
    fn rewrite_nested(&mut self, node: Node, edits: &mut EditSet) -> Result<()> {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "import_statement" => {
                    let rewritten =
                        rewrite_import(Import::from_node(child, self.source), self.rules);
                    self.edit_import(child, rewritten.map(Stmt::Import), edits);
                }
                "import_from_statement" | "future_import_statement" => {
                    let rewritten =
                        rewrite_import_from(ImportFrom::from_node(child, self.source), self.rules);
                    self.edit_import(child, rewritten.map(Stmt::ImportFrom), edits);
                }
                "expression_statement" if self.is_elided_expression(child) => {
                    edits.replace(child.byte_range(), "pass");
                }
                kind if DEFINITIONS.contains(kind) => self.visit_nested_definition(child, edits)?,
                _ => self.rewrite_nested(child, edits)?,
            }
        }
        Ok(())
    }

    fn edit_import(&mut self, node: Node, rewritten: Option<Stmt>, edits: &mut EditSet) {
        match rewritten {
            Some(import) => {
                let text = import.to_string();
                if text != node_text(node, self.source) {
                    edits.replace(node.byte_range(), text);
                }
                self.top_imports.push(import);
            }
            None => edits.replace(node.byte_range(), "pass"),
        }
    }

    /// Nested definitions always stay where they are.
    fn visit_nested_definition(&mut self, node: Node, edits: &mut EditSet) -> Result<()> {
        let site = DefinitionSite::new(node).ok_or_else(|| {
            ExportError::TreeSitter(format!("decorated definition without body in {}", self.module))
        })?;
        let decl = self.declare(&site)?;
        if !decl.ships_in(self.channel) {
            debug!(module = self.module, name = %decl.name, "dropping gated nested definition");
            edits.replace(node.byte_range(), "pass");
            return Ok(());
        }

        match decl.primary_export() {
            Some(Tag::ExportedValue(target)) => {
                let assign = self.value_assignment(&site, &decl, target)?;
                self.exports.append(&target.module, Stmt::Assign(assign));
                edits.replace(node.byte_range(), "pass");
                return Ok(());
            }
            Some(Tag::Exported(directive)) => self.export_from_source(&decl, directive),
            _ => {}
        }

        for decorator in &site.decorators {
            let Some(expr) = decorator_expression(*decorator) else {
                continue;
            };
            if is_marker_decorator(expr, self.source, self.rules) {
                let end = decorator
                    .next_sibling()
                    .map_or(decorator.end_byte(), |next| next.start_byte());
                edits.delete(decorator.start_byte()..end);
            }
        }

        if decl.is_deprecated() {
            let indent = line_prefix(node, self.source);
            edits.insert(
                node.start_byte(),
                format!("{}\n{}", self.deprecation_import(), indent),
            );
        }
        Ok(())
    }
}

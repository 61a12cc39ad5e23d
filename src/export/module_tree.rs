//! Namespace tree used to decide which modules become packages.

use std::path::PathBuf;

use rustc_hash::{FxHashMap, FxHashSet};

use super::paths::{is_dunder, path_from_module};
use crate::error::{ExportError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub name: String,
    pub parent: Option<NodeId>,
    /// Declared a package by an `__init__.py` or an auxiliary package
    /// below it, whether or not anything is inserted under it.
    pub package: bool,
    children: FxHashMap<String, NodeId>,
    /// Children in insertion order, for deterministic walks.
    order: Vec<NodeId>,
}

impl ModuleNode {
    fn new(name: &str, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            package: false,
            children: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Arena of module nodes rooted at the top-level namespace.
#[derive(Debug, Clone)]
pub struct ModuleTree {
    nodes: Vec<ModuleNode>,
}

impl ModuleTree {
    pub fn new(root_name: &str) -> Self {
        Self {
            nodes: vec![ModuleNode::new(root_name, None)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &ModuleNode {
        &self.nodes[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Return the child named `name`, creating it if absent.
    pub fn add_or_get_child(&mut self, parent: NodeId, name: &str) -> NodeId {
        if let Some(&existing) = self.nodes[parent.0].children.get(name) {
            return existing;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(ModuleNode::new(name, Some(parent)));
        let parent_node = &mut self.nodes[parent.0];
        parent_node.children.insert(name.to_string(), id);
        parent_node.order.push(id);
        id
    }

    /// Insert every segment of a dotted module path. The first segment must
    /// be the root's name.
    pub fn add_module(&mut self, module: &str) -> Result<NodeId> {
        let mut parts = module.split('.');
        let root = self.root();
        if parts.next() != Some(self.node(root).name.as_str()) {
            return Err(ExportError::ModuleOutsideNamespace {
                module: module.to_string(),
                root: self.node(root).name.clone(),
            });
        }
        let mut current = root;
        for part in parts {
            current = self.add_or_get_child(current, part);
        }
        Ok(current)
    }

    /// Insert a module that is a package regardless of its children.
    pub fn add_package(&mut self, module: &str) -> Result<NodeId> {
        let id = self.add_module(module)?;
        self.nodes[id.0].package = true;
        Ok(id)
    }

    pub fn find(&self, module: &str) -> Option<NodeId> {
        let mut parts = module.split('.');
        let root = self.root();
        if parts.next() != Some(self.node(root).name.as_str()) {
            return None;
        }
        parts.try_fold(root, |current, part| {
            self.node(current).children.get(part).copied()
        })
    }

    pub fn full_name(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            segments.push(node.name.as_str());
            current = node.parent;
        }
        segments.reverse();
        segments.join(".")
    }

    /// Pre-order walk from the root.
    pub fn walk(&self, mut visit: impl FnMut(NodeId, &ModuleNode)) {
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            visit(id, node);
            stack.extend(node.order.iter().rev().copied());
        }
    }

    /// Full names of every leaf that is not a declared package. Only
    /// meaningful once all modules of the run have been inserted.
    pub fn leaves(&self) -> FxHashSet<String> {
        let mut leaves = FxHashSet::default();
        self.walk(|id, node| {
            if node.is_leaf() && !node.package {
                leaves.insert(self.full_name(id));
            }
        });
        leaves
    }

    /// Freeze the tree into a package/leaf classification.
    pub fn layout(&self) -> ModuleLayout {
        ModuleLayout {
            leaves: self.leaves(),
        }
    }
}

/// Package/leaf decisions for a completed tree.
#[derive(Debug, Clone)]
pub struct ModuleLayout {
    leaves: FxHashSet<String>,
}

impl ModuleLayout {
    /// A module is a package iff it has children or was declared one, and
    /// its last segment is not dunder-style.
    pub fn is_package(&self, module: &str) -> bool {
        !self.leaves.contains(module) && !is_dunder(module)
    }

    /// Output path of a module, relative to the output directory.
    pub fn destination(&self, module: &str) -> PathBuf {
        path_from_module(module, self.is_package(module))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_is_idempotent() {
        let mut tree = ModuleTree::new("oneflow");
        let first = tree.add_module("oneflow.nn.functional").unwrap();
        let size = tree.node_count();
        let second = tree.add_module("oneflow.nn.functional").unwrap();
        assert_eq!(first, second);
        assert_eq!(tree.node_count(), size);
        assert_eq!(tree.full_name(first), "oneflow.nn.functional");
        assert_eq!(tree.find("oneflow.nn"), Some(tree.node(first).parent.unwrap()));
        assert_eq!(tree.find("oneflow.missing"), None);
    }

    #[test]
    fn module_outside_root_is_rejected() {
        let mut tree = ModuleTree::new("oneflow");
        let err = tree.add_module("torch.nn").unwrap_err();
        assert!(matches!(err, ExportError::ModuleOutsideNamespace { .. }));
    }

    #[test]
    fn package_classification() {
        let mut tree = ModuleTree::new("oneflow");
        tree.add_module("oneflow.nn").unwrap();
        tree.add_module("oneflow.nn.functional").unwrap();
        tree.add_module("oneflow.__main__").unwrap();
        tree.add_module("oneflow.ops.nn_ops").unwrap();

        let layout = tree.layout();
        assert!(layout.is_package("oneflow"));
        assert!(layout.is_package("oneflow.nn"));
        // Never targeted directly, but has a child.
        assert!(layout.is_package("oneflow.ops"));
        assert!(!layout.is_package("oneflow.nn.functional"));
        assert!(!layout.is_package("oneflow.__main__"));
        assert_eq!(
            layout.destination("oneflow.nn"),
            PathBuf::from("oneflow/nn/__init__.py")
        );
        assert_eq!(
            layout.destination("oneflow.__main__"),
            PathBuf::from("oneflow/__main__.py")
        );
    }

    #[test]
    fn declared_package_without_children() {
        let mut tree = ModuleTree::new("oneflow");
        let root = tree.add_package("oneflow").unwrap();
        assert_eq!(root, tree.root());
        assert!(tree.node(root).is_leaf());

        let layout = tree.layout();
        assert!(layout.is_package("oneflow"));
        assert_eq!(layout.destination("oneflow"), PathBuf::from("oneflow/__init__.py"));
    }

    #[test]
    fn walk_is_preorder_in_insertion_order() {
        let mut tree = ModuleTree::new("oneflow");
        tree.add_module("oneflow.b.x").unwrap();
        tree.add_module("oneflow.a").unwrap();
        let mut names = Vec::new();
        tree.walk(|id, _| names.push(tree.full_name(id)));
        assert_eq!(names, ["oneflow", "oneflow.b", "oneflow.b.x", "oneflow.a"]);
    }
}

//! Immutable rule set shared by every export worker.

use rustc_hash::FxHashSet;

use crate::config::{ExportConfig, MarkerConfig, RelocationPolicy};

/// Distribution channel a source file is compiled for.
///
/// Stable-only declarations ship only in the modern namespace and
/// experimental-only declarations only in the compatibility namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Modern,
    Compat,
}

#[derive(Debug, Clone)]
pub struct ExportRules {
    /// Modern namespace (`oneflow`).
    pub root: String,
    /// Compatibility namespace (`oneflow.compatible.single_client`).
    pub compat: String,
    /// Legacy import prefix folded into `root` (`oneflow.python`).
    pub legacy_prefix: String,
    pub markers: MarkerConfig,
    pub policy: RelocationPolicy,
    reserved_words: FxHashSet<String>,
    keep_modules: FxHashSet<String>,
}

impl ExportRules {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            root: config.namespace.root.clone(),
            compat: config.namespace.compat.clone(),
            legacy_prefix: config.namespace.legacy_prefix.clone(),
            markers: config.markers.clone(),
            policy: config.relocation.policy,
            reserved_words: config.relocation.reserved_words.iter().cloned().collect(),
            keep_modules: config.relocation.keep_modules.iter().cloned().collect(),
        }
    }

    pub fn with_policy(mut self, policy: RelocationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn channel(&self, namespace: &str) -> Channel {
        if namespace == self.compat {
            Channel::Compat
        } else {
            Channel::Modern
        }
    }

    /// Identifiers whose every reference is elided from the output.
    pub fn is_marker(&self, ident: &str) -> bool {
        ident == self.markers.export
            || ident == self.markers.stable
            || ident == self.markers.experimental
    }

    pub fn is_reserved(&self, ident: &str) -> bool {
        self.reserved_words.contains(ident)
    }

    pub fn keeps_module(&self, module: &str) -> bool {
        self.keep_modules.contains(module)
    }

    /// Rewrite a dotted path under the legacy prefix into the root namespace.
    pub fn strip_legacy_prefix(&self, path: &str) -> Option<String> {
        if path == self.legacy_prefix {
            return Some(self.root.clone());
        }
        path.strip_prefix(&self.legacy_prefix)
            .and_then(|rest| rest.strip_prefix('.'))
            .map(|rest| format!("{}.{}", self.root, rest))
    }
}

impl Default for ExportRules {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

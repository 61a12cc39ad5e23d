//! Sequential reduce of loaded units into the run's output plan.

use std::ffi::OsStr;
use std::path::PathBuf;

use rustc_hash::FxHashMap;
use tracing::info;

use super::buckets::ModuleContributions;
use super::loader::SourceUnit;
use super::module_tree::{ModuleLayout, ModuleTree};
use super::paths::PACKAGE_MARKER;
use crate::error::{ExportError, Result};

/// Everything the serializer needs.
#[derive(Debug, Clone)]
pub struct ModulePlan {
    pub contributions: ModuleContributions,
    pub tree: ModuleTree,
}

impl ModulePlan {
    /// Package/leaf decisions. Only valid once building is complete, which
    /// holds for any plan returned by [`build_plan`].
    pub fn layout(&self) -> ModuleLayout {
        self.tree.layout()
    }
}

/// Fold every unit's own tree, then every unit's export buckets, into one
/// ordered contribution map and namespace tree. `aux_packages` are placed in
/// the tree so their parents come out as packages; they contribute nothing.
pub fn build_plan(
    mut units: Vec<SourceUnit>,
    root_name: &str,
    aux_packages: &[String],
) -> Result<ModulePlan> {
    let mut contributions = ModuleContributions::new();
    let mut tree = ModuleTree::new(root_name);
    let mut claimed: FxHashMap<String, PathBuf> = FxHashMap::default();

    for unit in &mut units {
        let Some(own) = unit.tree.take() else {
            continue;
        };
        contributions.append(&unit.module, own);
        if !unit.is_root_marker {
            info!("[src] {} <= {}", unit.module, unit.src.display());
            if let Some(existing) = claimed.get(&unit.module) {
                return Err(ExportError::DuplicateModule {
                    module: unit.module.clone(),
                    new: unit.src.clone(),
                    existing: existing.clone(),
                });
            }
            claimed.insert(unit.module.clone(), unit.src.clone());
        }
        if unit.dst.file_name() == Some(OsStr::new(PACKAGE_MARKER)) {
            tree.add_package(&unit.module)?;
        } else {
            tree.add_module(&unit.module)?;
        }
    }

    for unit in units {
        for module in unit.exports.modules() {
            info!("[export] {}", module);
            tree.add_module(module)?;
        }
        contributions.merge(unit.exports);
    }

    for package in aux_packages {
        tree.add_package(package)?;
    }

    Ok(ModulePlan {
        contributions,
        tree,
    })
}

//! Import statement rewriting.
//!
//! Imports of the export machinery vanish from the output, and imports
//! under the legacy prefix are folded into the root namespace.

use super::rules::ExportRules;
use crate::syntax::{Alias, Import, ImportFrom};

/// Rewrite a plain `import` statement. `None` deletes it.
pub fn rewrite_import(mut import: Import, rules: &ExportRules) -> Option<Import> {
    if import.names.iter().any(|alias| references_machinery(alias, rules)) {
        return None;
    }
    for alias in &mut import.names {
        rewrite_alias(alias, rules);
    }
    Some(import)
}

/// Rewrite a `from ... import ...` statement. `None` deletes it.
pub fn rewrite_import_from(mut import: ImportFrom, rules: &ExportRules) -> Option<ImportFrom> {
    if import.names.iter().any(|alias| references_machinery(alias, rules)) {
        return None;
    }
    if import.level == 0 {
        if let Some(module) = import.module.as_deref() {
            if module == "__future__" || starts_with_module(module, &rules.markers.export_machinery)
            {
                return None;
            }
            if let Some(rewritten) = rules.strip_legacy_prefix(module) {
                import.module = Some(rewritten);
            }
        }
    }
    for alias in &mut import.names {
        rewrite_alias(alias, rules);
    }
    Some(import)
}

fn references_machinery(alias: &Alias, rules: &ExportRules) -> bool {
    let markers = &rules.markers;
    alias.name == markers.export
        || alias.name.contains(&markers.export_symbols)
        || starts_with_module(&alias.name, &markers.export_machinery)
}

fn rewrite_alias(alias: &mut Alias, rules: &ExportRules) {
    if let Some(rewritten) = rules.strip_legacy_prefix(&alias.name) {
        alias.name = rewritten;
    }
}

/// `module` is `prefix` or a submodule of it.
fn starts_with_module(module: &str, prefix: &str) -> bool {
    module
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from(module: &str, names: &[&str]) -> ImportFrom {
        ImportFrom::new(module, names.iter().map(|n| Alias::new(*n)).collect())
    }

    #[test]
    fn future_and_machinery_imports_are_deleted() {
        let rules = ExportRules::default();
        assert!(rewrite_import_from(from("__future__", &["annotations"]), &rules).is_none());
        assert!(rewrite_import_from(
            from("oneflow.python.oneflow_export", &["oneflow_export", "stable_api"]),
            &rules
        )
        .is_none());
        assert!(rewrite_import_from(from("oneflow.python.framework", &["oneflow_export"]), &rules)
            .is_none());
        assert!(
            rewrite_import_from(from("oneflow", &["__export_symbols__"]), &rules).is_none()
        );
    }

    #[test]
    fn legacy_prefix_is_folded() {
        let rules = ExportRules::default();
        let rewritten =
            rewrite_import_from(from("oneflow.python.framework.tensor", &["Tensor"]), &rules)
                .unwrap();
        assert_eq!(
            rewritten.to_string(),
            "from oneflow.framework.tensor import Tensor"
        );

        let import = Import {
            names: vec![
                Alias::aliased("oneflow.python.framework.id_util", "id_util"),
                Alias::new("oneflow.python"),
            ],
        };
        assert_eq!(
            rewrite_import(import, &rules).unwrap().to_string(),
            "import oneflow.framework.id_util as id_util, oneflow"
        );
    }

    #[test]
    fn relative_and_unrelated_imports_survive() {
        let rules = ExportRules::default();
        let mut relative = from("python", &["x"]);
        relative.level = 1;
        assert_eq!(
            rewrite_import_from(relative, &rules).unwrap().to_string(),
            "from .python import x"
        );
        let numpy = Import {
            names: vec![Alias::aliased("numpy", "np")],
        };
        assert!(rewrite_import(numpy, &rules).is_some());
        assert!(rewrite_import_from(from("oneflow.python_ext", &["x"]), &rules)
            .map(|i| i.module.as_deref() == Some("oneflow.python_ext"))
            .unwrap());
    }
}

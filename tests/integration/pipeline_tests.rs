//! End-to-end export runs over temporary source trees.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use flow_export::config::{EntryPoint, ExportConfig, RelocationPolicy, SourceRoot};
use flow_export::export::{run_export, ExportOptions};
use flow_export::ExportError;

const COMPAT: &str = "oneflow.compatible.single_client";

/// A source tree with a modern root at `pkg/` and a compatibility root at
/// `compat/`, exported into `out/`.
struct Fixture {
    dir: TempDir,
    config: ExportConfig,
}

impl Fixture {
    fn new() -> Self {
        let config = ExportConfig {
            sources: vec![
                SourceRoot {
                    dir: PathBuf::from("pkg"),
                    destination: PathBuf::from("oneflow"),
                    namespace: "oneflow".to_string(),
                },
                SourceRoot {
                    dir: PathBuf::from("compat"),
                    destination: PathBuf::from("oneflow/compatible/single_client"),
                    namespace: COMPAT.to_string(),
                },
            ],
            entry_points: Vec::new(),
            ..ExportConfig::default()
        };
        let fixture = Self {
            dir: TempDir::new().unwrap(),
            config,
        };
        fixture.write("pkg/__init__.py", "");
        fixture
    }

    fn write(&self, rel: &str, text: &str) {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn options(&self) -> ExportOptions {
        let mut options = ExportOptions::new(self.dir.path(), self.out_dir());
        options.jobs = Some(2);
        options
    }

    fn run(&self) -> flow_export::Result<flow_export::ExportSummary> {
        run_export(&self.config, &self.options())
    }

    fn output(&self, rel: &str) -> String {
        let path = self.out_dir().join(rel);
        fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {}", path.display(), e))
    }

    fn exists(&self, rel: &str) -> bool {
        self.out_dir().join(rel).exists()
    }
}

fn normalized(path: &Path) -> PathBuf {
    path.components().collect()
}

// =============================================================================
// Export directives
// =============================================================================

#[test]
fn test_keep_in_source_forwards_from_defining_module() {
    let fx = Fixture::new();
    fx.write(
        "pkg/ops/util.py",
        "\
from oneflow.python.oneflow_export import oneflow_export


@oneflow_export(\"a.b.f\")
def f():
    return 1
",
    );

    let summary = fx.run().unwrap();
    assert_eq!(summary.sources, 2);
    assert_eq!(summary.skipped_tests, 0);

    assert_eq!(fx.output("oneflow/ops/util.py"), "def f():\n    return 1\n");
    assert_eq!(fx.output("oneflow/a/b.py"), "from oneflow.ops.util import f\n");
    assert_eq!(fx.output("oneflow/__init__.py"), "");
}

#[test]
fn test_later_targets_forward_from_first_target() {
    let fx = Fixture::new();
    fx.write(
        "pkg/ops/activation.py",
        "@oneflow_export(\"nn.functional.relu\", \"relu\")\ndef _relu(x):\n    return x\n",
    );

    fx.run().unwrap();

    assert_eq!(
        fx.output("oneflow/nn/functional.py"),
        "from oneflow.ops.activation import _relu as relu\n"
    );
    let init = fx.output("oneflow/__init__.py");
    assert!(init.contains("from oneflow.nn.functional import relu\n"));
    assert!(!init.contains("oneflow.ops.activation"));
}

#[test]
fn test_channel_gating_across_namespaces() {
    let fx = Fixture::new();
    let source = "\
@oneflow_export(\"exp\")
@experimental_api
def exp():
    pass


@oneflow_export(\"stab\")
@stable_api
def stab():
    pass
";
    fx.write("pkg/ops/gated.py", source);
    fx.write("compat/ops/gated.py", source);

    fx.run().unwrap();

    let modern = fx.output("oneflow/ops/gated.py");
    assert!(modern.contains("def exp():"));
    assert!(!modern.contains("stab"));
    assert!(!modern.contains("experimental_api"));

    let compat = fx.output("oneflow/compatible/single_client/ops/gated.py");
    assert!(compat.contains("def stab():"));
    assert!(!compat.contains("def exp"));

    let compat_init = fx.output("oneflow/compatible/single_client/__init__.py");
    assert!(compat_init.contains("from oneflow.compatible.single_client.ops.gated import stab"));
    assert!(!compat_init.contains("exp"));
    assert!(fx.output("oneflow/__init__.py").contains("from oneflow.ops.gated import exp"));
}

#[test]
fn test_deprecated_export_imports_marker() {
    let fx = Fixture::new();
    fx.write(
        "pkg/ops/old.py",
        "@oneflow_deprecate()\n@oneflow_export(\"old_api\")\ndef old_api():\n    pass\n",
    );

    fx.run().unwrap();

    let module = fx.output("oneflow/ops/old.py");
    let import = module.find("from oneflow import oneflow_deprecate").unwrap();
    let decorator = module.find("@oneflow_deprecate()").unwrap();
    assert!(import < decorator);
    assert!(!module.contains("@oneflow_export"));
}

#[test]
fn test_value_export_becomes_assignment() {
    let fx = Fixture::new();
    fx.write(
        "pkg/ops/consts.py",
        "@oneflow_export_value(\"nn.zero\")\ndef _zero():\n    \"\"\"Zero.\"\"\"\n    return 0\n",
    );

    fx.run().unwrap();

    assert_eq!(fx.output("oneflow/nn.py"), "zero = 0\n");
    assert!(!fx.output("oneflow/ops/consts.py").contains("_zero"));
}

#[test]
fn test_heuristic_policy_moves_definition() {
    let mut fx = Fixture::new();
    fx.config.relocation.policy = RelocationPolicy::Heuristic;
    fx.write(
        "pkg/ops/math.py",
        "import numpy as np\n\n\n@oneflow_export(\"math.add\")\ndef _add(a, b):\n    return a + b\n",
    );

    fx.run().unwrap();

    let target = fx.output("oneflow/math.py");
    let import = target.find("import numpy as np").unwrap();
    let wildcard = target.find("from oneflow.ops.math import *").unwrap();
    let def = target.find("def add(a, b):").unwrap();
    assert!(import < wildcard && wildcard < def);

    let source = fx.output("oneflow/ops/math.py");
    assert!(source.contains("from oneflow.math import add as _add"));
    assert!(!source.contains("def "));
}

// =============================================================================
// Rewriting
// =============================================================================

#[test]
fn test_legacy_prefix_banner_and_future_are_rewritten() {
    let fx = Fixture::new();
    fx.write(
        "pkg/framework/session.py",
        "\
\"\"\"
Copyright 2020 The OneFlow Authors. All rights reserved.
\"\"\"
from __future__ import absolute_import
import oneflow.python.framework.id_util as id_util
from oneflow.python.framework import dtype

X = 1
",
    );

    fx.run().unwrap();

    let text = fx.output("oneflow/framework/session.py");
    assert!(!text.contains("Copyright"));
    assert!(!text.contains("__future__"));
    assert!(!text.contains("oneflow.python"));
    assert!(text.contains("import oneflow.framework.id_util as id_util\n"));
    assert!(text.contains("from oneflow.framework import dtype\n"));
    assert!(text.contains("X = 1\n"));
}

// =============================================================================
// Layout and output directory
// =============================================================================

#[test]
fn test_packages_and_leaves() {
    let fx = Fixture::new();
    fx.write("pkg/nn/__init__.py", "from oneflow.python.nn.module import Module\n");
    fx.write("pkg/nn/module.py", "class Module:\n    pass\n");
    fx.write("pkg/__main__.py", "print(1)\n");

    let summary = fx.run().unwrap();

    assert_eq!(
        fx.output("oneflow/nn/__init__.py"),
        "from oneflow.nn.module import Module\n"
    );
    assert!(fx.exists("oneflow/nn/module.py"));
    assert!(fx.exists("oneflow/__main__.py"));
    assert!(!fx.exists("oneflow/__main__/__init__.py"));

    let written: Vec<PathBuf> = summary.written.iter().map(|p| normalized(p)).collect();
    assert!(written.contains(&normalized(&fx.out_dir().join("oneflow/nn/__init__.py"))));
}

#[test]
fn test_aux_packages_are_created() {
    let fx = Fixture::new();
    fx.run().unwrap();
    assert_eq!(fx.output("oneflow/F/__init__.py"), "");
    assert_eq!(fx.output("oneflow/experimental/F/__init__.py"), "");
}

#[test]
fn test_lone_root_marker_is_a_package() {
    let fx = Fixture::new();
    fx.run().unwrap();
    assert_eq!(fx.output("oneflow/__init__.py"), "");
    assert!(!fx.exists("oneflow.py"));
    assert!(!fx.exists("oneflow/experimental.py"));
    assert!(!fx.exists("oneflow/F.py"));
}

#[test]
fn test_string_literals_are_written_verbatim() {
    let fx = Fixture::new();
    fx.write(
        "pkg/ops/text.py",
        "TEMPLATE = \"\"\"line one   \nline two\t\n\"\"\"\n\n\n",
    );
    fx.run().unwrap();
    assert_eq!(
        fx.output("oneflow/ops/text.py"),
        "TEMPLATE = \"\"\"line one   \nline two\t\n\"\"\"\n"
    );
}

#[test]
fn test_exclude_globs_match_file_names_only() {
    let fx = Fixture::new();
    fx.write("pkg/oneflow_export_tools/nn_ops.py", "X = 1\n");
    fx.write("pkg/oneflow_export_tools/oneflow_export.py", "this is not python (\n");
    fx.run().unwrap();
    assert_eq!(fx.output("oneflow/oneflow_export_tools/nn_ops.py"), "X = 1\n");
    assert!(!fx.exists("oneflow/oneflow_export_tools/oneflow_export.py"));
}

#[test]
fn test_output_directory_is_cleared() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.out_dir().join("oneflow/stale")).unwrap();
    fs::write(fx.out_dir().join("oneflow/stale/gone.py"), "x = 1\n").unwrap();
    fs::write(fx.out_dir().join("stale.py"), "y = 2\n").unwrap();

    fx.run().unwrap();

    assert!(!fx.exists("stale.py"));
    assert!(!fx.exists("oneflow/stale"));
    assert!(fx.exists("oneflow/__init__.py"));
}

#[test]
fn test_ast_dump() {
    let fx = Fixture::new();
    fx.write("pkg/ops/util.py", "def f():\n    return 1\n");
    let mut options = fx.options();
    options.dump_ast = true;

    run_export(&fx.config, &options).unwrap();

    let ast = fx.output("oneflow/ops/util.py.ast");
    assert!(ast.starts_with("(module"));
    assert!(ast.contains("function_definition"));
}

#[test]
fn test_test_units_are_skipped_unless_verbose() {
    let fx = Fixture::new();
    fx.write("pkg/test/test_ops.py", "def test_add():\n    pass\n");

    let summary = fx.run().unwrap();
    assert_eq!(summary.skipped_tests, 1);
    assert!(!fx.exists("oneflow/test/test_ops.py"));

    let mut options = fx.options();
    options.verbose = true;
    let summary = run_export(&fx.config, &options).unwrap();
    assert_eq!(summary.skipped_tests, 0);
    assert!(fx.exists("oneflow/test/test_ops.py"));
}

#[test]
fn test_excluded_files_are_not_loaded() {
    let fx = Fixture::new();
    fx.write("pkg/version.py", "this is not python (\n");
    fx.write("pkg/ops/util.py", "X = 1\n");

    let summary = fx.run().unwrap();
    assert_eq!(summary.sources, 2);
    assert!(!fx.exists("oneflow/version.py"));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_duplicate_destination_module() {
    let mut fx = Fixture::new();
    fx.write("pkg/nn.py", "X = 1\n");
    fx.write("nn_entry.py", "Y = 2\n");
    fx.config
        .entry_points
        .push(EntryPoint::new("nn_entry.py", "oneflow/nn.py", "oneflow"));

    let err = fx.run().unwrap_err();
    match err {
        ExportError::DuplicateModule { module, new, .. } => {
            assert_eq!(module, "oneflow.nn");
            assert!(new.ends_with("nn_entry.py"));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_non_empty_root_marker() {
    let fx = Fixture::new();
    fx.write("pkg/__init__.py", "import os\n");
    assert!(matches!(
        fx.run().unwrap_err(),
        ExportError::NonEmptyRootMarker(_)
    ));
}

#[test]
fn test_parse_error_aborts() {
    let fx = Fixture::new();
    fx.write("pkg/ops/broken.py", "def f(:\n    pass\n");
    assert!(matches!(fx.run().unwrap_err(), ExportError::Parse { .. }));
}

#[test]
fn test_unsafe_output_dir() {
    let fx = Fixture::new();
    let options = ExportOptions::new(fx.dir.path(), "");
    assert!(matches!(
        run_export(&fx.config, &options).unwrap_err(),
        ExportError::UnsafeOutputDir(_)
    ));
}

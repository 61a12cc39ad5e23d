//! CLI integration tests.
//!
//! Runs the built binary against temporary trees.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

use flow_export::config::ExportConfig;
use flow_export::exit_code;

const CONFIG: &str = r#"
entry_points = []

[[sources]]
dir = "pkg"
destination = "oneflow"
namespace = "oneflow"

[output]
aux_packages = []
"#;

/// Run the binary in `cwd` and return its output.
fn run_cli(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_oneflow-export"))
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("failed to spawn oneflow-export")
}

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

// =============================================================================
// init
// =============================================================================

#[test]
fn test_init_prints_loadable_config() {
    let dir = TempDir::new().unwrap();
    let output = run_cli(dir.path(), &["init"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let config = ExportConfig::parse(&stdout).unwrap();
    config.validate().unwrap();
    assert_eq!(config, ExportConfig::default());
}

// =============================================================================
// export
// =============================================================================

#[test]
fn test_export_with_explicit_config() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "export.toml", CONFIG);
    write(dir.path(), "pkg/__init__.py", "");
    write(
        dir.path(),
        "pkg/ops/util.py",
        "@oneflow_export(\"a.f\")\ndef f():\n    return 1\n",
    );

    let output = run_cli(
        dir.path(),
        &[
            "--config",
            "export.toml",
            "export",
            "--out-dir",
            "build",
            "--jobs",
            "2",
            "-q",
        ],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    assert_eq!(
        fs::read_to_string(dir.path().join("build/oneflow/a.py")).unwrap(),
        "from oneflow.ops.util import f\n"
    );
    assert!(dir.path().join("build/oneflow/__init__.py").is_file());
    assert!(!dir.path().join("build/oneflow/F").exists());
}

#[test]
fn test_export_discovers_config_file() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join(".git")).unwrap();
    write(dir.path(), ".oneflow-export.toml", CONFIG);
    write(dir.path(), "pkg/__init__.py", "");
    write(dir.path(), "pkg/nn.py", "X = 1\n");

    let output = run_cli(dir.path(), &["export", "-q"]);
    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(dir.path().join("python/oneflow/nn.py")).unwrap(),
        "X = 1\n"
    );
}

#[test]
fn test_export_contract_error_exit_code() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "export.toml", CONFIG);
    write(dir.path(), "pkg/__init__.py", "print(1)\n");

    let output = run_cli(dir.path(), &["--config", "export.toml", "export", "-q"]);
    assert_eq!(output.status.code(), Some(exit_code::INTERNAL_ERROR));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("must be empty"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_exit_code() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "export.toml", "[namespace]\nroot = \"one flow\"\n");

    let output = run_cli(dir.path(), &["--config", "export.toml", "export"]);
    assert_eq!(output.status.code(), Some(exit_code::CONFIG_ERROR));
}

#[test]
fn test_zero_jobs_is_rejected() {
    let dir = TempDir::new().unwrap();
    let output = run_cli(dir.path(), &["export", "--jobs", "0"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("at least 1"));
}

// =============================================================================
// compat
// =============================================================================

#[test]
fn test_compat_text_and_json() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "models/a.py", "import torch.nn\nfrom torch.nn import Linear\n");
    write(dir.path(), "models/b.py", "from torch import Tensor\n");

    let output = run_cli(dir.path(), &["compat", "models"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "     2 torch.nn\n     1 torch\n"
    );

    let output = run_cli(dir.path(), &["compat", "models", "--format", "json"]);
    assert!(output.status.success());
    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(entries[0]["module"], "torch.nn");
    assert_eq!(entries[0]["count"], 2);
}

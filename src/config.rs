//! `.oneflow-export.toml` configuration file support.
//!
//! Provides deserialization, discovery (walk up to `.git` root), and merging
//! with CLI flags. CLI flags always take precedence over file config. An
//! absent file, or an absent table, yields the layout of the oneflow
//! repository.
//!
//! # Example config
//!
//! ```toml
//! [namespace]
//! root = "oneflow"
//! compat = "oneflow.compatible.single_client"
//! legacy_prefix = "oneflow.python"
//!
//! [[sources]]
//! dir = "oneflow/python"
//! destination = "oneflow"
//! namespace = "oneflow"
//!
//! [[entry_points]]
//! src = "oneflow/init.py"
//! dst = "oneflow/__init__.py"
//! namespace = "oneflow"
//!
//! [relocation]
//! policy = "keep-in-source"
//! reserved_words = ["int", "float"]
//!
//! [files]
//! exclude = ["**/version.py", "**/*oneflow_export*"]
//!
//! [output]
//! aux_packages = ["oneflow.F", "oneflow.experimental.F"]
//!
//! [postprocess]
//! python = "python3"
//! black = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the config file.
pub const CONFIG_FILE_NAME: &str = ".oneflow-export.toml";

/// Top-level `.oneflow-export.toml` configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    /// Namespace names used to classify and rewrite modules.
    #[serde(default)]
    pub namespace: NamespaceConfig,

    /// Source directories scanned recursively for `*.py` files.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceRoot>,

    /// Fixed single-file mappings appended after the directory scan.
    #[serde(default = "default_entry_points")]
    pub entry_points: Vec<EntryPoint>,

    /// Decorator and module names recognized by the export visitor.
    #[serde(default)]
    pub markers: MarkerConfig,

    /// Where exported declarations end up.
    #[serde(default)]
    pub relocation: RelocationConfig,

    /// File exclusion patterns.
    #[serde(default)]
    pub files: FilesConfig,

    /// Output tree settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// Inputs used instead of the full scan in debug mode.
    #[serde(default)]
    pub debug: DebugConfig,

    /// External formatting tools run over the output tree.
    #[serde(default)]
    pub postprocess: PostProcessConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            namespace: NamespaceConfig::default(),
            sources: default_sources(),
            entry_points: default_entry_points(),
            markers: MarkerConfig::default(),
            relocation: RelocationConfig::default(),
            files: FilesConfig::default(),
            output: OutputConfig::default(),
            debug: DebugConfig::default(),
            postprocess: PostProcessConfig::default(),
        }
    }
}

/// The modern namespace, the legacy compatibility namespace and the legacy
/// import prefix that is folded into the modern namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NamespaceConfig {
    pub root: String,
    pub compat: String,
    pub legacy_prefix: String,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            root: "oneflow".to_string(),
            compat: "oneflow.compatible.single_client".to_string(),
            legacy_prefix: "oneflow.python".to_string(),
        }
    }
}

/// A directory of sources rebased onto a destination prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourceRoot {
    pub dir: PathBuf,
    pub destination: PathBuf,
    pub namespace: String,
}

/// A single file mapped onto a fixed destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EntryPoint {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub namespace: String,
}

impl EntryPoint {
    pub fn new(src: &str, dst: &str, namespace: &str) -> Self {
        Self {
            src: PathBuf::from(src),
            dst: PathBuf::from(dst),
            namespace: namespace.to_string(),
        }
    }
}

/// Identifiers of the export machinery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct MarkerConfig {
    /// Decorator relocating a declaration (`@oneflow_export("a.b.f")`).
    pub export: String,
    /// Decorator turning a function's return expression into a module value.
    pub export_value: String,
    /// Decorator limiting a declaration to the modern namespace.
    pub stable: String,
    /// Decorator limiting a declaration to the compatibility namespace.
    pub experimental: String,
    /// Decorator marking a declaration deprecated.
    pub deprecated: String,
    /// Module the deprecation decorator is imported from.
    pub deprecation_module: String,
    /// Module implementing the export machinery; imports from it are dropped.
    pub export_machinery: String,
    /// Substring of imported names generated by the export machinery.
    pub export_symbols: String,
    /// License banner text; a module-level string containing it is dropped.
    pub copyright: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            export: "oneflow_export".to_string(),
            export_value: "oneflow_export_value".to_string(),
            stable: "stable_api".to_string(),
            experimental: "experimental_api".to_string(),
            deprecated: "oneflow_deprecate".to_string(),
            deprecation_module: "oneflow".to_string(),
            export_machinery: "oneflow.python.oneflow_export".to_string(),
            export_symbols: "__export_symbols__".to_string(),
            copyright: "Copyright 2020 The OneFlow Authors".to_string(),
        }
    }
}

/// Whether an exported declaration stays in its originating module.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RelocationPolicy {
    /// Always keep the definition in place and forward from the targets.
    #[default]
    KeepInSource,
    /// Move the definition unless it uses a reserved identifier, targets its
    /// own module, or targets one of `keep_modules`.
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct RelocationConfig {
    pub policy: RelocationPolicy,
    pub reserved_words: Vec<String>,
    pub keep_modules: Vec<String>,
}

impl Default for RelocationConfig {
    fn default() -> Self {
        Self {
            policy: RelocationPolicy::KeepInSource,
            reserved_words: vec!["int".to_string(), "float".to_string()],
            keep_modules: vec![
                "oneflow".to_string(),
                "oneflow.scope".to_string(),
                "oneflow.compatible.single_client".to_string(),
            ],
        }
    }
}

/// Glob patterns (matched against paths relative to the source root) for
/// files that are never loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct FilesConfig {
    pub exclude: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            exclude: vec!["**/version.py".to_string(), "**/*oneflow_export*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct OutputConfig {
    /// Packages created empty in every run.
    pub aux_packages: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            aux_packages: vec!["oneflow.F".to_string(), "oneflow.experimental.F".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct DebugConfig {
    pub sources: Vec<EntryPoint>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                EntryPoint::new(
                    "oneflow/python/ops/nn_ops.py",
                    "oneflow/ops/nn_ops.py",
                    "oneflow",
                ),
                EntryPoint::new(
                    "oneflow/python/advanced/distribute_ops.py",
                    "oneflow/advanced/distribute_ops.py",
                    "oneflow",
                ),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct PostProcessConfig {
    /// Interpreter used as `<python> -m <tool>`.
    pub python: String,
    pub autoflake: bool,
    pub isort: bool,
    pub black: bool,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            autoflake: false,
            isort: false,
            black: false,
        }
    }
}

fn default_sources() -> Vec<SourceRoot> {
    vec![
        SourceRoot {
            dir: PathBuf::from("oneflow/python"),
            destination: PathBuf::from("oneflow"),
            namespace: "oneflow".to_string(),
        },
        SourceRoot {
            dir: PathBuf::from("oneflow/compatible_single_client_python"),
            destination: PathBuf::from("oneflow/compatible/single_client"),
            namespace: "oneflow.compatible.single_client".to_string(),
        },
    ]
}

fn default_entry_points() -> Vec<EntryPoint> {
    const COMPAT: &str = "oneflow.compatible.single_client";
    vec![
        EntryPoint::new("oneflow/init.py", "oneflow/__init__.py", "oneflow"),
        EntryPoint::new("oneflow/__main__.py", "oneflow/__main__.py", "oneflow"),
        EntryPoint::new(
            "oneflow/single_client_init.py",
            "oneflow/compatible/single_client/__init__.py",
            COMPAT,
        ),
        EntryPoint::new(
            "oneflow/single_client_main.py",
            "oneflow/compatible/single_client/__main__.py",
            COMPAT,
        ),
    ]
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl ExportConfig {
    /// Parse a `.oneflow-export.toml` file from a string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Parse)
    }

    /// Load and validate a `.oneflow-export.toml` file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate semantic constraints that TOML schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ns = &self.namespace;
        for name in [&ns.root, &ns.compat, &ns.legacy_prefix] {
            if !is_dotted_identifier(name) {
                return Err(ConfigError::InvalidModule(name.clone()));
            }
        }
        if !ns.compat.starts_with(&format!("{}.", ns.root)) {
            return Err(ConfigError::CompatOutsideRoot {
                root: ns.root.clone(),
                compat: ns.compat.clone(),
            });
        }

        let namespaces = self
            .sources
            .iter()
            .map(|s| &s.namespace)
            .chain(self.entry_points.iter().map(|e| &e.namespace))
            .chain(self.debug.sources.iter().map(|e| &e.namespace));
        for namespace in namespaces {
            if namespace != &ns.root && namespace != &ns.compat {
                return Err(ConfigError::UnknownNamespace(namespace.clone()));
            }
        }

        for pattern in &self.files.exclude {
            globset::Glob::new(pattern)
                .map_err(|e| ConfigError::InvalidGlob(pattern.clone(), e.to_string()))?;
        }

        for package in &self.output.aux_packages {
            if !is_dotted_identifier(package) {
                return Err(ConfigError::InvalidModule(package.clone()));
            }
            if !package.starts_with(&format!("{}.", ns.root)) {
                return Err(ConfigError::AuxPackageOutsideRoot {
                    root: ns.root.clone(),
                    package: package.clone(),
                });
            }
        }

        if self.relocation.reserved_words.iter().any(|w| w.is_empty()) {
            return Err(ConfigError::InvalidModule("<empty reserved word>".to_string()));
        }

        if self.postprocess.python.trim().is_empty() {
            return Err(ConfigError::EmptyInterpreter);
        }

        Ok(())
    }

    /// Build the compiled matcher for `[files] exclude`. `*` and `?` stay
    /// within one path segment; only `**` crosses directories.
    pub fn build_exclude_matcher(&self) -> Result<globset::GlobSet, ConfigError> {
        let mut builder = globset::GlobSetBuilder::new();
        for pattern in &self.files.exclude {
            builder.add(
                globset::GlobBuilder::new(pattern)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| ConfigError::InvalidGlob(pattern.clone(), e.to_string()))?,
            );
        }
        builder
            .build()
            .map_err(|e| ConfigError::InvalidGlob("(build)".into(), e.to_string()))
    }

    /// Generate a default `.oneflow-export.toml` as a string.
    pub fn default_toml() -> &'static str {
        r#"# oneflow-export configuration file

[namespace]
root = "oneflow"
compat = "oneflow.compatible.single_client"
legacy_prefix = "oneflow.python"

[[sources]]
dir = "oneflow/python"
destination = "oneflow"
namespace = "oneflow"

[[sources]]
dir = "oneflow/compatible_single_client_python"
destination = "oneflow/compatible/single_client"
namespace = "oneflow.compatible.single_client"

[[entry_points]]
src = "oneflow/init.py"
dst = "oneflow/__init__.py"
namespace = "oneflow"

[[entry_points]]
src = "oneflow/__main__.py"
dst = "oneflow/__main__.py"
namespace = "oneflow"

[[entry_points]]
src = "oneflow/single_client_init.py"
dst = "oneflow/compatible/single_client/__init__.py"
namespace = "oneflow.compatible.single_client"

[[entry_points]]
src = "oneflow/single_client_main.py"
dst = "oneflow/compatible/single_client/__main__.py"
namespace = "oneflow.compatible.single_client"

# "keep-in-source" leaves exported definitions where they are written and
# forwards them from their targets. "heuristic" moves them into the first
# target unless they use a reserved word or target one of keep_modules.
[relocation]
policy = "keep-in-source"
reserved_words = ["int", "float"]
keep_modules = ["oneflow", "oneflow.scope", "oneflow.compatible.single_client"]

[files]
exclude = ["**/version.py", "**/*oneflow_export*"]

[output]
aux_packages = ["oneflow.F", "oneflow.experimental.F"]

[postprocess]
python = "python3"
autoflake = false
isort = false
black = false
"#
    }
}

fn is_dotted_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
                && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        })
}

// ---------------------------------------------------------------------------
// Config file discovery
// ---------------------------------------------------------------------------

/// Find `.oneflow-export.toml` in `start_dir` or one of its ancestors. The
/// search stops at the first directory holding `.git`.
pub fn discover_config(start_dir: &Path) -> Option<PathBuf> {
    let start = if start_dir.is_file() {
        start_dir.parent()?
    } else {
        start_dir
    };
    for dir in start.ancestors() {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if dir.join(".git").exists() {
            break;
        }
    }
    None
}

/// Discover and load the config file, returning the parsed config and
/// its path. Returns `Ok(None)` if no config file is found.
pub fn discover_and_load_config(
    start_dir: &Path,
) -> Result<Option<(ExportConfig, PathBuf)>, ConfigError> {
    match discover_config(start_dir) {
        Some(path) => {
            let config = ExportConfig::load(&path)?;
            Ok(Some((config, path)))
        }
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from config file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(toml::de::Error),

    #[error("invalid module name '{0}'")]
    InvalidModule(String),

    #[error("compatibility namespace '{compat}' is not inside '{root}'")]
    CompatOutsideRoot { root: String, compat: String },

    #[error("auxiliary package '{package}' is not inside '{root}'")]
    AuxPackageOutsideRoot { root: String, package: String },

    #[error("namespace '{0}' is neither the root nor the compatibility namespace")]
    UnknownNamespace(String),

    #[error("invalid glob pattern '{0}': {1}")]
    InvalidGlob(String, String),

    #[error("postprocess.python must not be empty")]
    EmptyInterpreter,
}

//! The full export run: load and visit in parallel, reduce, write in
//! parallel, then post-process.

use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{debug, info};

use super::builder::build_plan;
use super::loader::{collect_specs, load_unit, SourceUnit};
use super::rules::ExportRules;
use super::serializer::{prepare_output_dir, write_aux_packages, write_plan};
use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use crate::postprocess::{PostProcessor, Tool};

/// Per-invocation settings that do not live in the config file.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Directory that `[[sources]]` and `[[entry_points]]` are relative to.
    pub source_root: PathBuf,
    pub out_dir: PathBuf,
    pub debug: bool,
    pub verbose: bool,
    pub dump_ast: bool,
    /// Worker threads; `None` uses the available parallelism.
    pub jobs: Option<usize>,
    pub tools: Vec<Tool>,
}

impl ExportOptions {
    pub fn new(source_root: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            out_dir: out_dir.into(),
            debug: false,
            verbose: false,
            dump_ast: false,
            jobs: None,
            tools: Vec::new(),
        }
    }
}

/// What a run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Input files loaded, including skipped test units.
    pub sources: usize,
    pub skipped_tests: usize,
    /// Files written, in contribution order.
    pub written: Vec<PathBuf>,
}

pub fn run_export(config: &ExportConfig, options: &ExportOptions) -> Result<ExportSummary> {
    config.validate()?;
    let rules = ExportRules::from_config(config);
    let specs = collect_specs(config, &options.source_root, options.debug)?;
    debug!(count = specs.len(), "collected sources");

    prepare_output_dir(&options.out_dir)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs.unwrap_or(0))
        .build()
        .map_err(|e| ExportError::ThreadPool(e.to_string()))?;

    let units: Vec<SourceUnit> = pool.install(|| {
        specs
            .par_iter()
            .map(|spec| load_unit(spec, &rules, options.verbose))
            .collect::<Result<Vec<_>>>()
    })?;
    let sources = units.len();
    let skipped_tests = units.iter().filter(|unit| unit.tree.is_none()).count();

    let root_name = rules.root.split('.').next().unwrap_or(&rules.root);
    let plan = build_plan(units, root_name, &config.output.aux_packages)?;

    let written = pool.install(|| write_plan(&plan, &options.out_dir, options.dump_ast))?;
    write_aux_packages(&options.out_dir, &config.output.aux_packages)?;
    info!(
        files = written.len(),
        out_dir = %options.out_dir.display(),
        "export complete"
    );

    if !options.tools.is_empty() {
        let processor = PostProcessor::locate(&config.postprocess.python, options.verbose)?;
        processor.run_all(&options.tools, &options.out_dir)?;
    }

    Ok(ExportSummary {
        sources,
        skipped_tests,
        written,
    })
}


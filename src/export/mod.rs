//! The export compiler.
//!
//! Four stages:
//!
//! 1. [`loader`] discovers and parses every source file,
//! 2. [`visitor`] rewrites each file and emits export buckets,
//! 3. [`builder`] reduces all contributions into one plan,
//! 4. [`serializer`] writes the plan to the output directory.
//!
//! Stages 1+2 and 4 run on a rayon pool; stage 3 is sequential and sits
//! between two full barriers. [`pipeline::run_export`] drives a run.

pub mod buckets;
pub mod builder;
pub mod imports;
pub mod loader;
pub mod module_tree;
pub mod paths;
pub mod pipeline;
pub mod rules;
pub mod serializer;
pub mod tags;
pub mod visitor;

pub use buckets::{ExportBuckets, ModuleContributions};
pub use builder::{build_plan, ModulePlan};
pub use loader::{collect_specs, load_unit, SourceSpec, SourceUnit};
pub use module_tree::{ModuleLayout, ModuleTree, NodeId};
pub use pipeline::{run_export, ExportOptions, ExportSummary};
pub use rules::{Channel, ExportRules};
pub use tags::{Declaration, ExportDirective, ExportTarget, Tag};
pub use visitor::{ExportVisitor, VisitOutcome};

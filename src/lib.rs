pub mod backends;
pub mod config;
pub mod error;
pub mod eval;
pub mod frontend;
pub mod fs;
pub mod names;
pub mod valtree;
pub mod value;

use anyhow::Result;
use std::path::Path;

// Public re-exports
pub use error::{Diagnostic, InterpreterError};
pub use eval::{
    Analysis, Evaluation, ExprEvaluator, HclEvaluator, Passthrough, ResourceState, SchemaCoercer,
};
pub use frontend::{LoadOptions, ModuleRegistry, ModuleTree};
pub use fs::{Filesystem, MemoryFilesystem, OsFilesystem};
pub use names::{Accessor, FullName};
pub use value::Value;

use crate::config::ResourceFilter;

// Pure API: load, analyze and evaluate the module tree rooted at `root`.
pub fn load_evaluation(root: &Path, fs: &dyn Filesystem, options: &LoadOptions) -> Result<Evaluation> {
    let registry = ModuleRegistry::load(fs, root);
    let tree = ModuleTree::load_dir(fs, &registry, root, options)?;
    let analysis = Analysis::new(&tree);
    Evaluation::new(analysis, &HclEvaluator)
}

/// Apply resource filters to materialized records (string-based for TOML config)
pub fn apply_resource_filters(
    resources: Vec<ResourceState>,
    include: &[String],
    exclude: &[String],
) -> Vec<ResourceState> {
    let filter = ResourceFilter::new(include.to_vec(), exclude.to_vec());
    resources
        .into_iter()
        .filter(|r| filter.keeps(&r.resource_type))
        .collect()
}

pub fn render_with_backend(backend: &str, resources: &[ResourceState]) -> Result<String> {
    let be = backends::get_backend(backend)
        .ok_or_else(|| anyhow::anyhow!(format!("unknown backend '{backend}'")))?;
    be.render(resources)
}

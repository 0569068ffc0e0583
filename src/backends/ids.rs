use anyhow::Result;

use super::Backend;
use crate::eval::ResourceState;

/// One `id<TAB>type` line per resource.
pub struct IdsBackend;

impl Backend for IdsBackend {
    fn name(&self) -> &'static str {
        "ids"
    }
    fn file_extension(&self) -> &'static str {
        "txt"
    }
    fn render(&self, resources: &[ResourceState]) -> Result<String> {
        let mut out = String::new();
        for r in resources {
            out.push_str(&r.id);
            out.push('\t');
            out.push_str(&r.resource_type);
            out.push('\n');
        }
        Ok(out)
    }
}

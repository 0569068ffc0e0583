use anyhow::Result;
use serde_json::json;

use super::Backend;
use crate::eval::ResourceState;

pub struct JsonBackend;

impl Backend for JsonBackend {
    fn name(&self) -> &'static str {
        "json"
    }
    fn file_extension(&self) -> &'static str {
        "json"
    }
    fn render(&self, resources: &[ResourceState]) -> Result<String> {
        let output = json!({
            "backend": self.name(),
            "resources": resources,
        });
        serde_json::to_string_pretty(&output).map_err(Into::into)
    }
}

use anyhow::Result;

use crate::eval::ResourceState;

pub mod ids;
pub mod json;

pub trait Backend {
    fn name(&self) -> &'static str;
    fn file_extension(&self) -> &'static str;
    fn render(&self, resources: &[ResourceState]) -> Result<String>;
}

pub fn get_backend(name: &str) -> Option<Box<dyn Backend>> {
    match name.to_lowercase().as_str() {
        "json" => Some(Box::new(json::JsonBackend)),
        "ids" | "id" => Some(Box::new(ids::IdsBackend)),
        _ => None,
    }
}

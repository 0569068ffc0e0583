use serde_json::{Map, Value as Json};

/// Shapes a materialized resource's attributes for its type.
pub trait SchemaCoercer {
    fn coerce(&self, resource_type: &str, attributes: Map<String, Json>) -> Map<String, Json>;
}

/// Returns attributes unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl SchemaCoercer for Passthrough {
    fn coerce(&self, _resource_type: &str, attributes: Map<String, Json>) -> Map<String, Json> {
        attributes
    }
}

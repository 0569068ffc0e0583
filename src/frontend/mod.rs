pub mod moduletree;
pub mod registry;
pub mod source;
pub mod varfiles;

pub use moduletree::{LoadOptions, ModuleMeta, ModuleTree, ResourceMeta, Visitor};
pub use registry::ModuleRegistry;
pub use source::{SourceBlock, SourceBody, SourceRange};

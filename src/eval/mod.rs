pub mod analysis;
pub mod builtins;
pub mod evaluation;
pub mod expr;
pub mod phantom;
pub mod schema;
pub mod term;
pub mod topsort;

// Re-export commonly used types for convenience
pub use analysis::{Analysis, Dependency};
pub use builtins::create_context;
pub use evaluation::{Evaluation, ResourceState};
pub use expr::{ExprEvaluator, HclEvaluator};
pub use schema::{Passthrough, SchemaCoercer};
pub use term::{Term, TermTree};

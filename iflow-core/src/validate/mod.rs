//! Pre-generation validation: structural checks on the raw DTO, then graph
//! checks on the lowered blueprint.

pub mod schema;
pub mod semantic;

pub use schema::{validate_structure, SchemaOutcome, SchemaValidator};
pub use semantic::{validate, validate_semantics};

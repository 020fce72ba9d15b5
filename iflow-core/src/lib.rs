//! iFlow compiler core
//!
//! Compiles a declarative integration blueprint into an SAP Cloud Integration
//! iFlow document (BPMN 2.0 XML with platform extensions):
//!
//! ```text
//! BlueprintDto → schema validator → Blueprint → semantic validator
//!              → ValidatedBlueprint → generator → GeneratedDocument → sanitizer
//! ```
//!
//! Validators collect every finding of a stage before failing. The sanitizer
//! never fails and is idempotent. The component template catalog is built
//! once and shared read-only by every stage that needs it.

pub mod blueprint;
pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod generate;
pub mod graph;
pub mod pipeline;
pub mod sanitize;
pub mod validate;

pub use blueprint::{
    load_blueprint, parse_blueprint_json, parse_blueprint_yaml, Blueprint, BlueprintDto,
    ComponentKind, ValidatedBlueprint,
};
pub use catalog::TemplateCatalog;
pub use config::{GeneratorConfig, LayoutConfig, PipelineConfig};
pub use diagnostics::{Finding, FindingCode, Severity, ValidationResult};
pub use error::{CatalogError, CompileError, XmlError};
pub use generate::{generate, GeneratedDocument, Generator};
pub use pipeline::{CompileMetadata, CompileOutput, Pipeline, Validated};
pub use sanitize::{sanitize, AppliedFix, SanitizationCode, SanitizationFinding, SanitizeReport};
pub use validate::{validate, validate_semantics, validate_structure};

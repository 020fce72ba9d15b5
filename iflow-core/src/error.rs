//! Error types for the compilation pipeline.

use crate::blueprint::ComponentKind;
use crate::catalog::StructuralHandling;
use crate::diagnostics::ValidationResult;
use thiserror::Error;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Fatal outcome of a compilation stage.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Schema validation rejected the blueprint. Carries the full batch.
    #[error("blueprint failed structural validation with {} error(s)", .0.error_count())]
    Structural(ValidationResult),

    /// Graph validation rejected the blueprint. Carries the full batch.
    #[error("blueprint failed semantic validation with {} error(s)", .0.error_count())]
    Semantic(ValidationResult),

    /// A validated component has no template. Indicates a catalog defect, not bad input.
    #[error("no component template registered for '{kind}' (component '{component}')")]
    CatalogMismatch {
        kind: ComponentKind,
        component: String,
    },

    #[error(transparent)]
    Xml(#[from] XmlError),
}

impl CompileError {
    /// The findings behind a validation failure, if this is one.
    pub fn findings(&self) -> Option<&ValidationResult> {
        match self {
            CompileError::Structural(result) | CompileError::Semantic(result) => Some(result),
            _ => None,
        }
    }
}

/// Catalog override could not be loaded.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid catalog YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown component kind '{0}' in catalog")]
    UnknownKind(String),

    #[error("template for '{0}' uses adapter-trio handling but has no message_flow block")]
    MissingMessageFlow(ComponentKind),

    #[error("template for '{kind}' cannot change handling from {builtin:?} to {requested:?}")]
    HandlingOverride {
        kind: ComponentKind,
        builtin: StructuralHandling,
        requested: StructuralHandling,
    },
}

/// XML serialization or ingestion failure.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("malformed document: {0}")]
    Malformed(String),
}

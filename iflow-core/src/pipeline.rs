//! End-to-end compilation: validate, lower, validate graph, generate, sanitize.

use crate::blueprint::{Blueprint, BlueprintDto, ValidatedBlueprint};
use crate::catalog::TemplateCatalog;
use crate::config::{GeneratorConfig, PipelineConfig};
use crate::diagnostics::ValidationResult;
use crate::error::CompileError;
use crate::generate::{GeneratedDocument, Generator};
use crate::sanitize::{sanitize, SanitizeReport};
use crate::validate::{validate, SchemaValidator};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything produced alongside the document.
#[derive(Debug, Clone, Serialize)]
pub struct CompileMetadata {
    pub iflow_name: String,
    /// Non-blocking findings from both validators, auto-repairs included.
    pub warnings: ValidationResult,
    pub repairs: Vec<String>,
    pub sanitizer: SanitizeReport,
    /// SHA-256 of the serialized document.
    pub digest: String,
    pub archive_path: String,
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub document: GeneratedDocument,
    pub metadata: CompileMetadata,
}

/// Blueprint validation outcome short of generation.
#[derive(Debug, Clone)]
pub struct Validated {
    pub blueprint: ValidatedBlueprint,
    /// Warnings from both validators.
    pub warnings: ValidationResult,
    pub repairs: Vec<String>,
}

/// The compiler. Catalog and generator config are read-only and shared, so a
/// `Pipeline` can be cloned across threads and used for independent calls.
#[derive(Debug, Clone)]
pub struct Pipeline {
    catalog: Arc<TemplateCatalog>,
    config: Arc<GeneratorConfig>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::from_config(PipelineConfig::default())
    }
}

impl Pipeline {
    pub fn new(catalog: Arc<TemplateCatalog>, config: Arc<GeneratorConfig>) -> Self {
        Self { catalog, config }
    }

    pub fn from_config(config: PipelineConfig) -> Self {
        Self::new(Arc::new(config.catalog), Arc::new(config.generator))
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Schema pass (with auto-repair), lowering and graph pass. Errors from a
    /// stage are returned together; a structural failure stops before the
    /// graph checks.
    pub fn validate(&self, dto: &BlueprintDto) -> Result<Validated, CompileError> {
        let schema = SchemaValidator::new(&self.catalog);

        let outcome = schema.validate_structure(dto);
        if outcome.result.has_errors() {
            warn!(
                errors = outcome.result.error_count(),
                "structural validation failed"
            );
            return Err(CompileError::Structural(outcome.result));
        }
        for repair in &outcome.repairs {
            info!(repair = %repair, "auto-repaired blueprint");
        }

        // Repairs must not introduce new structural errors.
        if !outcome.repairs.is_empty() {
            let recheck = schema.validate_structure(&outcome.blueprint);
            if recheck.result.has_errors() {
                warn!(
                    errors = recheck.result.error_count(),
                    "repaired blueprint failed structural validation"
                );
                return Err(CompileError::Structural(recheck.result));
            }
        }
        debug!(
            warnings = outcome.result.warning_count(),
            "structural validation passed"
        );

        let blueprint = Blueprint::from_dto(&outcome.blueprint).map_err(CompileError::Structural)?;
        let validated = validate(blueprint).map_err(|result| {
            warn!(errors = result.error_count(), "semantic validation failed");
            CompileError::Semantic(result)
        })?;

        let mut warnings = outcome.result.into_warnings();
        warnings.merge(validated.warnings().clone());
        info!(
            iflow = %validated.name,
            warnings = warnings.warning_count(),
            "blueprint validated"
        );

        Ok(Validated {
            blueprint: validated,
            warnings,
            repairs: outcome.repairs,
        })
    }

    /// Run every stage and return the sanitized document with its metadata.
    pub fn compile(&self, dto: &BlueprintDto) -> Result<CompileOutput, CompileError> {
        let Validated {
            blueprint,
            warnings,
            repairs,
        } = self.validate(dto)?;

        let document = Generator::new(&self.catalog, &self.config).generate(&blueprint)?;
        info!(
            processes = document.processes.len(),
            shapes = document.shapes().len(),
            edges = document.edges().len(),
            "document generated"
        );

        let (document, sanitizer) = sanitize(document);
        let digest = document.digest()?;
        let iflow_name = blueprint.name.clone();

        Ok(CompileOutput {
            metadata: CompileMetadata {
                archive_path: GeneratedDocument::archive_path(&iflow_name),
                iflow_name,
                warnings,
                repairs,
                sanitizer,
                digest,
            },
            document,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{ComponentDto, EndpointDto};
    use crate::diagnostics::FindingCode;
    use serde_json::json;

    fn modifier_only() -> BlueprintDto {
        BlueprintDto::single(EndpointDto::new(
            vec![ComponentDto::new("cm1", "Set Body", "ContentModifier")
                .with_config("body", json!("<root/>"))],
            None,
        ))
    }

    #[test]
    fn test_compile_reports_repairs_and_digest() {
        let output = Pipeline::default().compile(&modifier_only()).unwrap();
        let meta = &output.metadata;
        assert_eq!(meta.iflow_name, "IntegrationFlow");
        assert!(!meta.repairs.is_empty());
        assert!(meta.warnings.contains(FindingCode::AutoRepaired));
        assert_eq!(meta.digest, output.document.digest().unwrap());
        assert!(meta.archive_path.ends_with("IntegrationFlow.iflw"));
        assert!(meta.sanitizer.is_clean());
    }

    #[test]
    fn test_structural_errors_stop_before_graph_checks() {
        let dto = BlueprintDto::single(EndpointDto::new(
            vec![ComponentDto::new("x", "X", "NoSuchThing")],
            None,
        ));
        let err = Pipeline::default().validate(&dto).unwrap_err();
        assert!(matches!(err, CompileError::Structural(_)));
        assert!(err
            .findings()
            .unwrap()
            .contains(FindingCode::UnknownComponentType));
    }

    #[test]
    fn test_metadata_serializes() {
        let output = Pipeline::default().compile(&modifier_only()).unwrap();
        let value = serde_json::to_value(&output.metadata).unwrap();
        assert!(value["sanitizer"]["fixes_applied"].is_array());
        assert_eq!(value["digest"].as_str().unwrap().len(), 64);
    }
}

//! Generator and pipeline configuration
//!
//! Everything here has a working default, so an empty YAML document (or no
//! file at all) yields the stock SAP Integration Suite output.

use crate::catalog::{Property, TemplateCatalog};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Env var pointing at catalog override YAML.
pub const CATALOG_ENV: &str = "IFLOW_CATALOG";
/// Env var pointing at generator config YAML.
pub const GENERATOR_CONFIG_ENV: &str = "IFLOW_GENERATOR_CONFIG";

// ---------------------------------------------------------------------------
// GeneratorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Extension block on `bpmn2:collaboration` (iFlow-level settings).
    pub collaboration_properties: Vec<Property>,
    /// Extension block on every `bpmn2:process`.
    pub process_properties: Vec<Property>,
    /// Process name when an endpoint has none.
    pub process_name: String,
    pub layout: LayoutConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            collaboration_properties: [
                ("namespaceMapping", ""),
                ("httpSessionHandling", "None"),
                ("accessControlMaxAge", ""),
                ("returnExceptionToSender", "false"),
                ("log", "All events"),
                ("corsEnabled", "false"),
                ("exposedHeaders", ""),
                ("componentVersion", "1.2"),
                ("allowedHeaderList", ""),
                ("ServerTrace", "false"),
                ("allowedOrigins", ""),
                ("accessControlAllowCredentials", "false"),
                ("allowedHeaders", ""),
                ("allowedMethods", ""),
                (
                    "cmdVariantUri",
                    "ctype::IFlowVariant/cname::IFlowConfiguration/version::1.2.4",
                ),
            ]
            .iter()
            .map(|(k, v)| Property::new(k, v))
            .collect(),
            process_properties: [
                ("transactionTimeout", "30"),
                ("componentVersion", "1.1"),
                (
                    "cmdVariantUri",
                    "ctype::FlowElementVariant/cname::IntegrationProcess/version::1.1.3",
                ),
                ("transactionalHandling", "Not Required"),
            ]
            .iter()
            .map(|(k, v)| Property::new(k, v))
            .collect(),
            process_name: "Integration Process".to_string(),
            layout: LayoutConfig::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: GeneratorConfig =
            serde_yaml::from_str(yaml).context("Failed to parse generator config YAML")?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read generator config: {}", path.display()))?;
        let config = Self::from_yaml_str(&text)
            .with_context(|| format!("Failed to load generator config: {}", path.display()))?;
        info!("Loaded generator config from {}", path.display());
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// LayoutConfig
// ---------------------------------------------------------------------------

/// Diagram geometry. All values are in diagram units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub origin_x: f64,
    pub origin_y: f64,
    /// Horizontal distance between column starts.
    pub column_width: f64,
    /// Height of the main-flow band inside a process pool.
    pub lane_height: f64,
    pub pool_padding: f64,
    /// Extra band below the main flow for exception subprocesses.
    pub subprocess_height: f64,
    /// Vertical gap between a pool and the receiver participants under it.
    pub receiver_gap: f64,
    /// Vertical gap between stacked endpoints.
    pub endpoint_gap: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            origin_x: 100.0,
            origin_y: 100.0,
            column_width: 150.0,
            lane_height: 200.0,
            pool_padding: 50.0,
            subprocess_height: 150.0,
            receiver_gap: 60.0,
            endpoint_gap: 80.0,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Catalog plus generator config, resolved once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub catalog: TemplateCatalog,
    pub generator: GeneratorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog: TemplateCatalog::builtin(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Resolve from `IFLOW_CATALOG` / `IFLOW_GENERATOR_CONFIG`, falling back to builtins.
    pub fn from_env() -> Result<Self> {
        Self::resolve(None, None)
    }

    /// Explicit paths win over the env vars; unset means builtin defaults.
    pub fn resolve(catalog: Option<PathBuf>, generator: Option<PathBuf>) -> Result<Self> {
        let catalog_path = catalog.or_else(|| env_path(CATALOG_ENV));
        let generator_path = generator.or_else(|| env_path(GENERATOR_CONFIG_ENV));

        let catalog = match catalog_path {
            Some(path) => TemplateCatalog::load_overrides(&path)?,
            None => {
                debug!("Using builtin component catalog");
                TemplateCatalog::builtin()
            }
        };
        let generator = match generator_path {
            Some(path) => GeneratorConfig::load_from_file(&path)?,
            None => GeneratorConfig::default(),
        };
        Ok(Self { catalog, generator })
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config = GeneratorConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, GeneratorConfig::default());
    }

    #[test]
    fn test_partial_layout_override() {
        let yaml = "layout:\n  column_width: 200\nprocess_name: Main\n";
        let config = GeneratorConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.layout.column_width, 200.0);
        assert_eq!(config.layout.origin_x, 100.0);
        assert_eq!(config.process_name, "Main");
        assert!(!config.collaboration_properties.is_empty());
    }

    #[test]
    fn test_default_process_properties_carry_variant() {
        let config = GeneratorConfig::default();
        assert!(config
            .process_properties
            .iter()
            .any(|p| p.key == "cmdVariantUri" && p.value.contains("IntegrationProcess")));
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = GeneratorConfig::load_from_file(Path::new("/nonexistent/iflow.yaml"));
        assert!(err.is_err());
    }
}

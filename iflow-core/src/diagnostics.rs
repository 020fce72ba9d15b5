//! Validation findings
//!
//! Single finding type shared by the schema and semantic validators. Findings
//! are collected exhaustively and returned as one ordered batch; only
//! `Severity::Error` blocks generation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Finding severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// Finding codes for categorizing issues
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FindingCode {
    // =========================================================================
    // Structural (schema) findings
    // =========================================================================
    EmptyBlueprint,
    MissingComponents,
    MissingSequenceFlows,
    MissingField,
    DuplicateComponentId,
    DuplicateFlowId,
    UnknownComponentType,
    UnknownAdapter,
    MissingRequiredConfig,
    InvalidConfig,
    UnknownConfigKey,
    UnresolvedFlowReference,
    SelfLoop,
    UnknownNestedComponent,
    AutoRepaired,

    // =========================================================================
    // Semantic (graph) findings
    // =========================================================================
    MissingIncoming,
    MissingOutgoing,
    ExceptionSubprocessToEnd,
    ExceptionSubprocessToMainFlow,
    MultipleOutgoing,
    RouterWithoutConditions,
    RouterDefaultCount,
    RouterMissingFlows,
    RouterExtraFlows,
    RouterDefaultMismatch,
    Unreachable,
    CannotReachEnd,
    IsolationBreach,
}

impl FindingCode {
    /// Stable short code surfaced to callers, e.g. `S007`.
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCode::EmptyBlueprint => "S001",
            FindingCode::MissingComponents => "S002",
            FindingCode::MissingSequenceFlows => "S003",
            FindingCode::MissingField => "S004",
            FindingCode::DuplicateComponentId => "S005",
            FindingCode::DuplicateFlowId => "S006",
            FindingCode::UnknownComponentType => "S007",
            FindingCode::UnknownAdapter => "S008",
            FindingCode::MissingRequiredConfig => "S009",
            FindingCode::InvalidConfig => "S010",
            FindingCode::UnknownConfigKey => "S011",
            FindingCode::UnresolvedFlowReference => "S012",
            FindingCode::SelfLoop => "S013",
            FindingCode::UnknownNestedComponent => "S014",
            FindingCode::AutoRepaired => "S090",
            FindingCode::MissingIncoming => "G001",
            FindingCode::MissingOutgoing => "G002",
            FindingCode::ExceptionSubprocessToEnd => "G003",
            FindingCode::ExceptionSubprocessToMainFlow => "G004",
            FindingCode::MultipleOutgoing => "G005",
            FindingCode::RouterWithoutConditions => "G010",
            FindingCode::RouterDefaultCount => "G011",
            FindingCode::RouterMissingFlows => "G012",
            FindingCode::RouterExtraFlows => "G013",
            FindingCode::RouterDefaultMismatch => "G014",
            FindingCode::Unreachable => "G020",
            FindingCode::CannotReachEnd => "G021",
            FindingCode::IsolationBreach => "G030",
        }
    }
}

/// A single finding with severity, code, message and location
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub code: FindingCode,
    pub message: String,
    /// Path into the blueprint, e.g. `endpoints[0].components[router_1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Finding {
    /// Create an error finding
    pub fn error(code: FindingCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            location: None,
        }
    }

    /// Create a warning finding
    pub fn warning(code: FindingCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            location: None,
        }
    }

    /// Attach a location
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self.severity, Severity::Warning)
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}[{}]: {}", level, self.code.as_str(), self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " (at {})", loc)?;
        }
        Ok(())
    }
}

/// Ordered batch of findings produced by one validation stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub findings: Vec<Finding>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    /// Returns true if there are no errors (warnings are allowed).
    pub fn is_ok(&self) -> bool {
        !self.has_errors()
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(Finding::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_warning())
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// True if any finding carries the given code.
    pub fn contains(&self, code: FindingCode) -> bool {
        self.findings.iter().any(|f| f.code == code)
    }

    /// Merge another result into this one, preserving order.
    pub fn merge(&mut self, other: ValidationResult) {
        self.findings.extend(other.findings);
    }

    /// Keep only the warnings; used to carry non-blocking findings forward.
    pub fn into_warnings(self) -> ValidationResult {
        ValidationResult {
            findings: self
                .findings
                .into_iter()
                .filter(Finding::is_warning)
                .collect(),
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for finding in &self.findings {
            writeln!(f, "{}", finding)?;
        }
        Ok(())
    }
}

// =============================================================================
// Location helpers
// =============================================================================

pub(crate) fn endpoint_loc(endpoint: usize) -> String {
    format!("endpoints[{}]", endpoint)
}

pub(crate) fn component_loc(endpoint: usize, component: &str) -> String {
    format!("endpoints[{}].components[{}]", endpoint, component)
}

pub(crate) fn flow_loc(endpoint: usize, flow: &str) -> String {
    format!("endpoints[{}].sequence_flows[{}]", endpoint, flow)
}

/// Render a set of ids as `{a, b}` in the given order.
pub(crate) fn id_set(ids: &[&str]) -> String {
    format!("{{{}}}", ids.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_and_warning_split() {
        let mut result = ValidationResult::new();
        result.push(Finding::error(FindingCode::SelfLoop, "loop"));
        result.push(Finding::warning(FindingCode::UnknownConfigKey, "unknown key"));
        assert!(result.has_errors());
        assert!(!result.is_ok());
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.warning_count(), 1);

        let warnings = result.into_warnings();
        assert!(warnings.is_ok());
        assert_eq!(warnings.findings.len(), 1);
    }

    #[test]
    fn test_display_includes_code_and_location() {
        let finding =
            Finding::error(FindingCode::MissingField, "component missing 'name'").at("endpoints[0]");
        let text = finding.to_string();
        assert!(text.starts_with("error[S004]"));
        assert!(text.contains("(at endpoints[0])"));
    }

    #[test]
    fn test_id_set_format() {
        assert_eq!(id_set(&["c2"]), "{c2}");
        assert_eq!(id_set(&["a", "b"]), "{a, b}");
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Synthetic flow endpoint ids that always resolve.
pub const START_EVENT_ID: &str = "StartEvent";
pub const END_EVENT_ID: &str = "EndEvent";

// ── Top-level DTO ──
//
// Every field an upstream generator may omit is optional here so the schema
// validator can report the omission instead of failing deserialization.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlueprintDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<EndpointDto>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<ComponentDto>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_flows: Option<Vec<SequenceFlowDto>>,
}

// ── Component ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Value>,
    #[serde(
        default,
        alias = "adapter_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub adapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutHint>,
}

/// Absolute diagram position overriding the column layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutHint {
    pub x: f64,
    pub y: f64,
}

// ── Sequence flow ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceFlowDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, alias = "source", skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    #[serde(default, alias = "target", skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, alias = "default", skip_serializing_if = "is_false")]
    pub is_default: bool,
}

fn is_false(v: &bool) -> bool {
    !v
}

/// Treat `Some("")` and whitespace-only strings like a missing field.
pub(crate) fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ComponentDto {
    pub fn new(id: &str, name: &str, kind: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            kind: Some(kind.to_string()),
            ..Default::default()
        }
    }

    /// Builder: add a config entry.
    pub fn with_config(mut self, key: &str, value: Value) -> Self {
        self.config.insert(key.to_string(), value);
        self
    }

    /// Builder: set the adapter sub-kind.
    pub fn with_adapter(mut self, adapter: &str) -> Self {
        self.adapter = Some(adapter.to_string());
        self
    }
}

impl SequenceFlowDto {
    pub fn new(id: &str, source: &str, target: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            source_ref: Some(source.to_string()),
            target_ref: Some(target.to_string()),
            ..Default::default()
        }
    }
}

impl EndpointDto {
    pub fn new(components: Vec<ComponentDto>, sequence_flows: Option<Vec<SequenceFlowDto>>) -> Self {
        Self {
            name: None,
            components: Some(components),
            sequence_flows,
        }
    }
}

impl BlueprintDto {
    pub fn single(endpoint: EndpointDto) -> Self {
        Self {
            name: None,
            endpoints: vec![endpoint],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_aliases_accepted() {
        let json = r#"{"id": "f1", "source": "a", "target": "b", "default": true}"#;
        let flow: SequenceFlowDto = serde_json::from_str(json).unwrap();
        assert_eq!(flow.source_ref.as_deref(), Some("a"));
        assert_eq!(flow.target_ref.as_deref(), Some("b"));
        assert!(flow.is_default);
    }

    #[test]
    fn test_missing_fields_deserialize() {
        let json = r#"{"endpoints": [{"components": [{"name": "no id"}]}]}"#;
        let dto: BlueprintDto = serde_json::from_str(json).unwrap();
        let comp = &dto.endpoints[0].components.as_ref().unwrap()[0];
        assert!(comp.id.is_none());
        assert!(comp.kind.is_none());
        assert!(dto.endpoints[0].sequence_flows.is_none());
    }

    #[test]
    fn test_present_treats_blank_as_missing() {
        assert_eq!(present(&Some("  ".to_string())), None);
        assert_eq!(present(&Some("x".to_string())), Some("x"));
        assert_eq!(present(&None), None);
    }
}

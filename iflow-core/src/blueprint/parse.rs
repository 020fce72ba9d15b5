use super::dto::BlueprintDto;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse a JSON string into a BlueprintDto.
///
/// Validation is NOT performed here. Run the schema validator (or
/// `Pipeline::compile`) on the result.
pub fn parse_blueprint_json(json_str: &str) -> Result<BlueprintDto> {
    let dto: BlueprintDto = serde_json::from_str(json_str)?;
    Ok(dto)
}

/// Parse a YAML string into a BlueprintDto.
pub fn parse_blueprint_yaml(yaml_str: &str) -> Result<BlueprintDto> {
    let dto: BlueprintDto = serde_yaml::from_str(yaml_str)?;
    Ok(dto)
}

/// Read a blueprint file, picking the format from the extension
/// (`.yaml` / `.yml` is YAML, anything else JSON).
pub fn load_blueprint(path: &Path) -> Result<BlueprintDto> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read blueprint: {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let parsed = if is_yaml {
        parse_blueprint_yaml(&text)
    } else {
        parse_blueprint_json(&text)
    };
    parsed.with_context(|| format!("Failed to parse blueprint: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_json_parse() {
        let json = r#"{
            "endpoints": [{
                "components": [
                    {"id": "cm1", "name": "Set Headers", "type": "ContentModifier"}
                ]
            }]
        }"#;
        let dto = parse_blueprint_json(json).unwrap();
        assert_eq!(dto.endpoints.len(), 1);
        let comps = dto.endpoints[0].components.as_ref().unwrap();
        assert_eq!(comps[0].kind.as_deref(), Some("ContentModifier"));
        assert!(dto.endpoints[0].sequence_flows.is_none());
    }

    #[test]
    fn test_yaml_with_router_conditions() {
        let yaml = r#"
name: Orders_Replication
endpoints:
  - name: Main
    components:
      - id: r1
        name: Route
        type: Router
        config:
          conditions:
            - id: c1
              expr: "x>1"
            - id: c2
              default: true
    sequence_flows:
      - id: c1
        source_ref: r1
        target_ref: EndEvent
"#;
        let dto = parse_blueprint_yaml(yaml).unwrap();
        assert_eq!(dto.name.as_deref(), Some("Orders_Replication"));
        let comp = &dto.endpoints[0].components.as_ref().unwrap()[0];
        assert!(comp.config.contains_key("conditions"));
        assert_eq!(dto.endpoints[0].sequence_flows.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(parse_blueprint_json("{ not json").is_err());
    }
}

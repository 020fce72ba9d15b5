//! Structural (schema) validation with limited auto-repair.
//!
//! Repairs applied before checking:
//! - no start-event component declared: inject `StartEvent` at the front
//! - no end-event component declared: inject `EndEvent` at the back
//! - components present but `sequence_flows` absent: synthesize the linear
//!   chain start → c0 → c1 → … → end over main-flow components
//!
//! Each repair is reported as an `AutoRepaired` warning. The returned DTO is
//! the repaired one; callers re-validate it before lowering.

use crate::blueprint::dto::{
    present, BlueprintDto, ComponentDto, EndpointDto, SequenceFlowDto, END_EVENT_ID,
    START_EVENT_ID,
};
use crate::blueprint::model::{parse_members, parse_router_conditions};
use crate::blueprint::{ComponentKind, KindParseError};
use crate::catalog::TemplateCatalog;
use crate::diagnostics::{
    component_loc, endpoint_loc, flow_loc, Finding, FindingCode, ValidationResult,
};
use serde_json::Value;
use std::collections::HashSet;

/// Result of one schema pass.
#[derive(Debug, Clone)]
pub struct SchemaOutcome {
    /// The blueprint after auto-repair (unchanged if nothing was repaired).
    pub blueprint: BlueprintDto,
    pub result: ValidationResult,
    /// Human-readable description of each repair applied.
    pub repairs: Vec<String>,
}

pub struct SchemaValidator<'a> {
    catalog: &'a TemplateCatalog,
}

impl<'a> SchemaValidator<'a> {
    pub fn new(catalog: &'a TemplateCatalog) -> Self {
        Self { catalog }
    }

    pub fn validate_structure(&self, dto: &BlueprintDto) -> SchemaOutcome {
        let mut result = ValidationResult::new();
        let mut repairs = Vec::new();
        let mut repaired = dto.clone();

        for (idx, ep) in repaired.endpoints.iter_mut().enumerate() {
            for repair in repair_endpoint(ep) {
                result.push(
                    Finding::warning(FindingCode::AutoRepaired, repair.clone()).at(endpoint_loc(idx)),
                );
                repairs.push(format!("{}: {}", endpoint_loc(idx), repair));
            }
        }

        if repaired.endpoints.is_empty() {
            result.push(Finding::error(
                FindingCode::EmptyBlueprint,
                "Blueprint must contain at least one endpoint",
            ));
        }
        for (idx, ep) in repaired.endpoints.iter().enumerate() {
            self.check_endpoint(idx, ep, &mut result);
        }

        SchemaOutcome {
            blueprint: repaired,
            result,
            repairs,
        }
    }

    fn check_endpoint(&self, idx: usize, ep: &EndpointDto, result: &mut ValidationResult) {
        let components = match &ep.components {
            Some(c) if !c.is_empty() => c.as_slice(),
            _ => {
                result.push(
                    Finding::error(FindingCode::MissingComponents, "Endpoint has no components")
                        .at(endpoint_loc(idx)),
                );
                &[]
            }
        };

        // ── components ──
        let mut ids: HashSet<&str> = HashSet::new();
        for (pos, comp) in components.iter().enumerate() {
            let id = present(&comp.id);
            let loc = match id {
                Some(id) => component_loc(idx, id),
                None => format!("{}.components[#{}]", endpoint_loc(idx), pos),
            };
            if id.is_none() {
                result.push(
                    Finding::error(FindingCode::MissingField, "Component is missing 'id'")
                        .at(loc.clone()),
                );
            }
            if present(&comp.name).is_none() {
                result.push(
                    Finding::error(FindingCode::MissingField, "Component is missing 'name'")
                        .at(loc.clone()),
                );
            }
            if let Some(id) = id {
                if !ids.insert(id) {
                    result.push(
                        Finding::error(
                            FindingCode::DuplicateComponentId,
                            format!("Duplicate component id: {}", id),
                        )
                        .at(loc.clone()),
                    );
                }
            }
            let Some(type_str) = present(&comp.kind) else {
                result.push(
                    Finding::error(FindingCode::MissingField, "Component is missing 'type'")
                        .at(loc),
                );
                continue;
            };
            match ComponentKind::parse(type_str, comp.adapter.as_deref()) {
                Ok(kind) => self.check_config(kind, comp, components, &loc, result),
                Err(KindParseError::UnknownAdapter(a)) => result.push(
                    Finding::error(
                        FindingCode::UnknownAdapter,
                        format!("Unknown adapter type '{}'", a),
                    )
                    .at(loc),
                ),
                Err(KindParseError::UnknownType(t)) => result.push(
                    Finding::error(
                        FindingCode::UnknownComponentType,
                        format!("Unknown component type '{}'", t),
                    )
                    .at(loc),
                ),
            }
        }

        // ── sequence flows ──
        let Some(flows) = &ep.sequence_flows else {
            if !components.is_empty() {
                result.push(
                    Finding::error(
                        FindingCode::MissingSequenceFlows,
                        "Endpoint has no sequence_flows",
                    )
                    .at(endpoint_loc(idx)),
                );
            }
            return;
        };

        let mut flow_ids: HashSet<&str> = HashSet::new();
        for (pos, flow) in flows.iter().enumerate() {
            let flow_id = present(&flow.id);
            let loc = match flow_id {
                Some(fid) => flow_loc(idx, fid),
                None => format!("{}.sequence_flows[#{}]", endpoint_loc(idx), pos),
            };
            match flow_id {
                None => result.push(
                    Finding::error(FindingCode::MissingField, "Sequence flow is missing 'id'")
                        .at(loc.clone()),
                ),
                Some(fid) if !flow_ids.insert(fid) => result.push(
                    Finding::error(
                        FindingCode::DuplicateFlowId,
                        format!("Duplicate sequence flow id: {}", fid),
                    )
                    .at(loc.clone()),
                ),
                Some(_) => {}
            }

            let source = present(&flow.source_ref);
            let target = present(&flow.target_ref);
            for (field, value) in [("source_ref", source), ("target_ref", target)] {
                match value {
                    None => result.push(
                        Finding::error(
                            FindingCode::MissingField,
                            format!("Sequence flow is missing '{}'", field),
                        )
                        .at(loc.clone()),
                    ),
                    Some(r) if !resolves(r, &ids) => result.push(
                        Finding::error(
                            FindingCode::UnresolvedFlowReference,
                            format!("Sequence flow {} '{}' does not match any component", field, r),
                        )
                        .at(loc.clone()),
                    ),
                    Some(_) => {}
                }
            }
            if let (Some(s), Some(t)) = (source, target) {
                if s == t {
                    result.push(
                        Finding::error(
                            FindingCode::SelfLoop,
                            format!("Sequence flow connects '{}' to itself", s),
                        )
                        .at(loc),
                    );
                }
            }
        }
    }

    fn check_config(
        &self,
        kind: ComponentKind,
        comp: &ComponentDto,
        siblings: &[ComponentDto],
        loc: &str,
        result: &mut ValidationResult,
    ) {
        let Some(template) = self.catalog.get(kind) else {
            result.push(
                Finding::error(
                    FindingCode::UnknownComponentType,
                    format!("No template registered for component type '{}'", kind),
                )
                .at(loc),
            );
            return;
        };

        for key in &template.required_config {
            if !has_value(comp.config.get(key)) {
                result.push(
                    Finding::error(
                        FindingCode::MissingRequiredConfig,
                        format!("{} requires config '{}'", kind, key),
                    )
                    .at(loc),
                );
            }
        }

        for key in comp.config.keys() {
            if !template.recognizes(key) {
                result.push(
                    Finding::warning(
                        FindingCode::UnknownConfigKey,
                        format!("Config key '{}' is not used by {}", key, kind),
                    )
                    .at(loc),
                );
            }
        }

        if kind.is_router() {
            if let Err(e) = parse_router_conditions(&comp.config) {
                result.push(Finding::error(FindingCode::InvalidConfig, e).at(loc));
            }
        }

        if kind.is_exception_subprocess() {
            match parse_members(&comp.config) {
                Err(e) => result.push(Finding::error(FindingCode::InvalidConfig, e).at(loc)),
                Ok(members) => {
                    for member in members {
                        let known = siblings
                            .iter()
                            .any(|c| present(&c.id) == Some(member.as_str()));
                        if !known {
                            result.push(
                                Finding::error(
                                    FindingCode::UnknownNestedComponent,
                                    format!("Nested component '{}' is not declared", member),
                                )
                                .at(loc),
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Free-function form of [`SchemaValidator::validate_structure`].
pub fn validate_structure(dto: &BlueprintDto, catalog: &TemplateCatalog) -> SchemaOutcome {
    SchemaValidator::new(catalog).validate_structure(dto)
}

fn resolves(reference: &str, ids: &HashSet<&str>) -> bool {
    ids.contains(reference) || reference == START_EVENT_ID || reference == END_EVENT_ID
}

fn has_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

fn declared_kind(comp: &ComponentDto) -> Option<ComponentKind> {
    present(&comp.kind).and_then(|t| ComponentKind::parse(t, comp.adapter.as_deref()).ok())
}

/// Apply the auto-repair policy to one endpoint; returns the repairs made.
fn repair_endpoint(ep: &mut EndpointDto) -> Vec<String> {
    let mut repairs = Vec::new();
    let Some(components) = ep.components.as_mut().filter(|c| !c.is_empty()) else {
        return repairs;
    };

    let has_start = components
        .iter()
        .any(|c| declared_kind(c).is_some_and(|k| k.is_start()));
    if !has_start {
        let id = unused_id(components, START_EVENT_ID);
        components.insert(0, ComponentDto::new(&id, "Start", "StartEvent"));
        repairs.push(format!("Injected missing start event '{}'", id));
    }

    let has_end = components
        .iter()
        .any(|c| declared_kind(c).is_some_and(|k| k.is_end()));
    if !has_end {
        let id = unused_id(components, END_EVENT_ID);
        components.push(ComponentDto::new(&id, "End", "EndEvent"));
        repairs.push(format!("Injected missing end event '{}'", id));
    }

    if ep.sequence_flows.is_none() {
        let chain = linear_chain(components);
        repairs.push(format!(
            "Synthesized {} sequence flow(s) as a linear chain",
            chain.len()
        ));
        ep.sequence_flows = Some(chain);
    }
    repairs
}

fn unused_id(components: &[ComponentDto], preferred: &str) -> String {
    let taken: HashSet<&str> = components.iter().filter_map(|c| present(&c.id)).collect();
    if !taken.contains(preferred) {
        return preferred.to_string();
    }
    (1..)
        .map(|n| format!("{}_{}", preferred, n))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| preferred.to_string())
}

/// start → main-flow components in declaration order → first end.
/// Exception subprocesses and their members stay off the chain.
fn linear_chain(components: &[ComponentDto]) -> Vec<SequenceFlowDto> {
    let nested: HashSet<String> = components
        .iter()
        .filter(|c| declared_kind(c).is_some_and(|k| k.is_exception_subprocess()))
        .flat_map(|c| parse_members(&c.config).unwrap_or_default())
        .collect();

    let mut start = None;
    let mut end = None;
    let mut middle = Vec::new();
    for comp in components {
        let (Some(id), Some(kind)) = (present(&comp.id), declared_kind(comp)) else {
            continue;
        };
        if kind.is_start() {
            start.get_or_insert(id);
        } else if kind.is_end() {
            end.get_or_insert(id);
        } else if !kind.is_exception_subprocess() && !nested.contains(id) {
            middle.push(id);
        }
    }

    let order: Vec<&str> = start
        .into_iter()
        .chain(middle)
        .chain(end)
        .collect();
    order
        .windows(2)
        .enumerate()
        .map(|(n, pair)| SequenceFlowDto::new(&format!("SequenceFlow_{}", n + 1), pair[0], pair[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> TemplateCatalog {
        TemplateCatalog::builtin()
    }

    fn modifier_only() -> BlueprintDto {
        BlueprintDto::single(EndpointDto::new(
            vec![ComponentDto::new("cm1", "Set Headers", "ContentModifier")],
            None,
        ))
    }

    #[test]
    fn test_repairs_missing_flows_and_events() {
        let outcome = validate_structure(&modifier_only(), &catalog());
        assert!(outcome.result.is_ok(), "{}", outcome.result);
        assert_eq!(outcome.repairs.len(), 3);

        let ep = &outcome.blueprint.endpoints[0];
        let comps = ep.components.as_ref().unwrap();
        assert_eq!(comps.first().unwrap().id.as_deref(), Some("StartEvent"));
        assert_eq!(comps.last().unwrap().id.as_deref(), Some("EndEvent"));

        let flows = ep.sequence_flows.as_ref().unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].source_ref.as_deref(), Some("StartEvent"));
        assert_eq!(flows[0].target_ref.as_deref(), Some("cm1"));
        assert_eq!(flows[1].target_ref.as_deref(), Some("EndEvent"));
    }

    #[test]
    fn test_revalidating_repaired_is_clean() {
        let first = validate_structure(&modifier_only(), &catalog());
        let second = validate_structure(&first.blueprint, &catalog());
        assert!(second.repairs.is_empty());
        assert!(second.result.findings.is_empty(), "{}", second.result);
        assert_eq!(second.blueprint, first.blueprint);
    }

    #[test]
    fn test_empty_flow_list_is_not_repaired() {
        let dto = BlueprintDto::single(EndpointDto::new(
            vec![
                ComponentDto::new("s", "Start", "StartEvent"),
                ComponentDto::new("e", "End", "EndEvent"),
            ],
            Some(vec![]),
        ));
        let outcome = validate_structure(&dto, &catalog());
        assert!(outcome.repairs.is_empty());
        assert!(outcome.blueprint.endpoints[0]
            .sequence_flows
            .as_ref()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_empty_blueprint() {
        let outcome = validate_structure(&BlueprintDto::default(), &catalog());
        assert!(outcome.result.contains(FindingCode::EmptyBlueprint));
    }

    #[test]
    fn test_missing_components() {
        let dto = BlueprintDto::single(EndpointDto::default());
        let outcome = validate_structure(&dto, &catalog());
        assert!(outcome.result.contains(FindingCode::MissingComponents));
    }

    #[test]
    fn test_missing_fields_all_reported() {
        let dto = BlueprintDto::single(EndpointDto::new(
            vec![ComponentDto {
                name: Some("Nameless".to_string()),
                ..Default::default()
            }],
            Some(vec![]),
        ));
        let outcome = validate_structure(&dto, &catalog());
        let missing: Vec<_> = outcome
            .result
            .errors()
            .filter(|f| f.code == FindingCode::MissingField)
            .collect();
        assert_eq!(missing.len(), 2); // id + type
    }

    #[test]
    fn test_unknown_type_and_adapter() {
        let dto = BlueprintDto::single(EndpointDto::new(
            vec![
                ComponentDto::new("x", "X", "Teleporter"),
                ComponentDto::new("y", "Y", "ExternalCall").with_adapter("pigeon"),
            ],
            None,
        ));
        let outcome = validate_structure(&dto, &catalog());
        assert!(outcome.result.contains(FindingCode::UnknownComponentType));
        assert!(outcome.result.contains(FindingCode::UnknownAdapter));
    }

    #[test]
    fn test_duplicate_ids() {
        let dto = BlueprintDto::single(EndpointDto::new(
            vec![
                ComponentDto::new("a", "A", "ContentModifier"),
                ComponentDto::new("a", "A2", "ContentModifier"),
            ],
            Some(vec![
                SequenceFlowDto::new("f", "StartEvent", "a"),
                SequenceFlowDto::new("f", "a", "EndEvent"),
            ]),
        ));
        let outcome = validate_structure(&dto, &catalog());
        assert!(outcome.result.contains(FindingCode::DuplicateComponentId));
        assert!(outcome.result.contains(FindingCode::DuplicateFlowId));
    }

    #[test]
    fn test_required_config() {
        let dto = BlueprintDto::single(EndpointDto::new(
            vec![
                ComponentDto::new("s1", "Script", "Script"),
                ComponentDto::new("call", "Call", "HTTP").with_config("address", json!("  ")),
            ],
            None,
        ));
        let outcome = validate_structure(&dto, &catalog());
        let missing: Vec<_> = outcome
            .result
            .errors()
            .filter(|f| f.code == FindingCode::MissingRequiredConfig)
            .collect();
        assert_eq!(missing.len(), 2);
    }

    #[test]
    fn test_unknown_config_key_is_warning() {
        let dto = BlueprintDto::single(EndpointDto::new(
            vec![ComponentDto::new("cm1", "CM", "ContentModifier").with_config("colour", json!("red"))],
            None,
        ));
        let outcome = validate_structure(&dto, &catalog());
        assert!(outcome.result.is_ok());
        let warning = outcome
            .result
            .warnings()
            .find(|f| f.code == FindingCode::UnknownConfigKey)
            .unwrap();
        assert_eq!(
            warning.location.as_deref(),
            Some("endpoints[0].components[cm1]")
        );
    }

    #[test]
    fn test_unresolved_and_self_loop() {
        let dto = BlueprintDto::single(EndpointDto::new(
            vec![ComponentDto::new("a", "A", "ContentModifier")],
            Some(vec![
                SequenceFlowDto::new("f1", "StartEvent", "ghost"),
                SequenceFlowDto::new("f2", "a", "a"),
                SequenceFlowDto {
                    id: Some("f3".to_string()),
                    source_ref: Some("a".to_string()),
                    ..Default::default()
                },
            ]),
        ));
        let outcome = validate_structure(&dto, &catalog());
        assert!(outcome.result.contains(FindingCode::UnresolvedFlowReference));
        assert!(outcome.result.contains(FindingCode::SelfLoop));
        assert!(outcome.result.contains(FindingCode::MissingField));
    }

    #[test]
    fn test_router_conditions_must_parse() {
        let dto = BlueprintDto::single(EndpointDto::new(
            vec![ComponentDto::new("r", "R", "Router").with_config("conditions", json!(7))],
            None,
        ));
        let outcome = validate_structure(&dto, &catalog());
        assert!(outcome.result.contains(FindingCode::InvalidConfig));
    }

    #[test]
    fn test_exception_members_must_exist() {
        let dto = BlueprintDto::single(EndpointDto::new(
            vec![
                ComponentDto::new("a", "A", "ContentModifier"),
                ComponentDto::new("ex", "Errors", "ExceptionSubprocess")
                    .with_config("components", json!(["ghost"])),
            ],
            None,
        ));
        let outcome = validate_structure(&dto, &catalog());
        assert!(outcome.result.contains(FindingCode::UnknownNestedComponent));
    }

    #[test]
    fn test_chain_skips_exception_branch() {
        let dto = BlueprintDto::single(EndpointDto::new(
            vec![
                ComponentDto::new("a", "A", "ContentModifier"),
                ComponentDto::new("ex", "Errors", "ExceptionSubprocess")
                    .with_config("components", json!(["log"])),
                ComponentDto::new("log", "Log", "Script").with_config("script", json!("log.groovy")),
            ],
            None,
        ));
        let outcome = validate_structure(&dto, &catalog());
        let flows = outcome.blueprint.endpoints[0].sequence_flows.as_ref().unwrap();
        assert_eq!(flows.len(), 2);
        assert!(flows
            .iter()
            .all(|f| f.source_ref.as_deref() != Some("ex") && f.target_ref.as_deref() != Some("log")));
    }
}

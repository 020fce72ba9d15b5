//! Graph-level validation over the typed blueprint.
//!
//! Rules, per endpoint:
//! - no self-loops once synthetic start/end references are resolved
//! - continuity: incoming/outgoing edges present where the flow needs them
//! - forbidden connections out of exception subprocesses; fan-out only on gateways
//! - router completeness: outgoing flow ids match the declared conditions 1:1
//! - reachability (warnings): forward from start, backward from end
//! - isolation: flows touching exception-subprocess members stay inside the set

use crate::blueprint::{Blueprint, Component, Endpoint, SequenceFlow, ValidatedBlueprint};
use crate::diagnostics::{component_loc, flow_loc, id_set, Finding, FindingCode, ValidationResult};
use crate::graph::FlowGraph;
use std::collections::{HashMap, HashSet};

/// Run every graph rule over every endpoint.
pub fn validate_semantics(blueprint: &Blueprint) -> ValidationResult {
    let mut result = ValidationResult::new();
    for (idx, ep) in blueprint.endpoints.iter().enumerate() {
        EndpointCheck::new(idx, ep).run(&mut result);
    }
    result
}

/// Validate and, if no errors were found, seal the blueprint for generation.
pub fn validate(blueprint: Blueprint) -> Result<ValidatedBlueprint, ValidationResult> {
    let result = validate_semantics(&blueprint);
    if result.has_errors() {
        return Err(result);
    }
    Ok(ValidatedBlueprint::new(blueprint, result))
}

struct EndpointCheck<'a> {
    idx: usize,
    ep: &'a Endpoint,
    outgoing: HashMap<&'a str, Vec<&'a SequenceFlow>>,
    incoming: HashMap<&'a str, Vec<&'a SequenceFlow>>,
    /// member id → owning exception subprocess
    members: HashMap<&'a str, &'a str>,
}

impl<'a> EndpointCheck<'a> {
    fn new(idx: usize, ep: &'a Endpoint) -> Self {
        let mut outgoing: HashMap<&str, Vec<&SequenceFlow>> = HashMap::new();
        let mut incoming: HashMap<&str, Vec<&SequenceFlow>> = HashMap::new();
        for flow in &ep.flows {
            outgoing.entry(flow.source.as_str()).or_default().push(flow);
            incoming.entry(flow.target.as_str()).or_default().push(flow);
        }
        Self {
            idx,
            ep,
            outgoing,
            incoming,
            members: ep.exception_members(),
        }
    }

    fn run(&self, result: &mut ValidationResult) {
        self.check_self_loops(result);
        self.check_continuity(result);
        self.check_forbidden_connections(result);
        for router in self.ep.components.iter().filter(|c| c.kind.is_router()) {
            self.check_router(router, result);
        }
        self.check_reachability(result);
        self.check_isolation(result);
    }

    fn outgoing_of(&self, id: &str) -> &[&'a SequenceFlow] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn incoming_to(&self, id: &str) -> &[&'a SequenceFlow] {
        self.incoming.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Exception subprocesses and their nested members live off the main flow.
    fn is_exception_branch(&self, comp: &Component) -> bool {
        comp.kind.is_exception_subprocess() || self.members.contains_key(comp.id.as_str())
    }

    /// First main-flow component declared after the start event.
    fn first_after_start(&self) -> Option<&'a str> {
        let start_pos = self.ep.components.iter().position(|c| c.kind.is_start())?;
        self.ep.components[start_pos + 1..]
            .iter()
            .find(|c| !self.is_exception_branch(c))
            .map(|c| c.id.as_str())
    }

    /// `e -> EndEvent` passes the raw-reference check but lowers to `e -> e`.
    fn check_self_loops(&self, result: &mut ValidationResult) {
        for flow in self.ep.flows.iter().filter(|f| f.source == f.target) {
            result.push(
                Finding::error(
                    FindingCode::SelfLoop,
                    format!("Sequence flow connects '{}' to itself", flow.source),
                )
                .at(flow_loc(self.idx, &flow.id)),
            );
        }
    }

    fn check_continuity(&self, result: &mut ValidationResult) {
        let first = self.first_after_start();
        for comp in &self.ep.components {
            if self.is_exception_branch(comp) {
                continue;
            }
            let id = comp.id.as_str();
            if !comp.kind.is_start() && Some(id) != first && self.incoming_to(id).is_empty() {
                result.push(
                    Finding::error(
                        FindingCode::MissingIncoming,
                        format!("Component '{}' has no incoming sequence flow", id),
                    )
                    .at(component_loc(self.idx, id)),
                );
            }
            if !comp.kind.is_end() && self.outgoing_of(id).is_empty() {
                result.push(
                    Finding::error(
                        FindingCode::MissingOutgoing,
                        format!("Component '{}' has no outgoing sequence flow", id),
                    )
                    .at(component_loc(self.idx, id)),
                );
            }
        }
    }

    fn check_forbidden_connections(&self, result: &mut ValidationResult) {
        for comp in &self.ep.components {
            let flows = self.outgoing_of(&comp.id);

            if comp.kind.is_exception_subprocess() {
                for flow in flows {
                    let Some(target) = self.ep.component(&flow.target) else {
                        continue;
                    };
                    if target.kind.is_end() {
                        result.push(
                            Finding::error(
                                FindingCode::ExceptionSubprocessToEnd,
                                "Exception subprocess cannot connect to main EndEvent",
                            )
                            .at(flow_loc(self.idx, &flow.id)),
                        );
                    } else if !self.is_exception_branch(target) {
                        result.push(
                            Finding::error(
                                FindingCode::ExceptionSubprocessToMainFlow,
                                format!(
                                    "Exception subprocess '{}' cannot connect to main flow component '{}'",
                                    comp.id, target.id
                                ),
                            )
                            .at(flow_loc(self.idx, &flow.id)),
                        );
                    }
                }
                continue;
            }

            if !comp.kind.allows_fan_out() && flows.len() > 1 {
                let ids: Vec<&str> = flows.iter().map(|f| f.id.as_str()).collect();
                result.push(
                    Finding::error(
                        FindingCode::MultipleOutgoing,
                        format!(
                            "{} '{}' has {} outgoing sequence flows {}; only gateways may branch",
                            comp.kind,
                            comp.id,
                            flows.len(),
                            id_set(&ids)
                        ),
                    )
                    .at(component_loc(self.idx, &comp.id)),
                );
            }
        }
    }

    fn check_router(&self, router: &Component, result: &mut ValidationResult) {
        let loc = component_loc(self.idx, &router.id);
        if router.conditions.is_empty() {
            result.push(
                Finding::error(
                    FindingCode::RouterWithoutConditions,
                    format!("Router '{}' declares no conditions", router.id),
                )
                .at(loc),
            );
            return;
        }

        let defaults = router.conditions.iter().filter(|c| c.is_default).count();
        if defaults != 1 {
            result.push(
                Finding::error(
                    FindingCode::RouterDefaultCount,
                    format!(
                        "Router '{}' must declare exactly one default condition, found {}",
                        router.id, defaults
                    ),
                )
                .at(loc.clone()),
            );
        }

        let flows = self.outgoing_of(&router.id);
        let flow_ids: HashSet<&str> = flows.iter().map(|f| f.id.as_str()).collect();
        let condition_ids: HashSet<&str> = router.conditions.iter().map(|c| c.id.as_str()).collect();

        let missing: Vec<&str> = router
            .conditions
            .iter()
            .map(|c| c.id.as_str())
            .filter(|id| !flow_ids.contains(id))
            .collect();
        if !missing.is_empty() {
            result.push(
                Finding::error(
                    FindingCode::RouterMissingFlows,
                    format!(
                        "Router missing sequence flows for conditions: {}",
                        id_set(&missing)
                    ),
                )
                .at(loc.clone()),
            );
        }

        let extra: Vec<&str> = flows
            .iter()
            .map(|f| f.id.as_str())
            .filter(|id| !condition_ids.contains(id))
            .collect();
        if !extra.is_empty() {
            result.push(
                Finding::error(
                    FindingCode::RouterExtraFlows,
                    format!(
                        "Router has sequence flows without matching conditions: {}",
                        id_set(&extra)
                    ),
                )
                .at(loc.clone()),
            );
        }

        for cond in &router.conditions {
            let Some(flow) = flows.iter().find(|f| f.id == cond.id) else {
                continue;
            };
            if flow.is_default != cond.is_default {
                result.push(
                    Finding::warning(
                        FindingCode::RouterDefaultMismatch,
                        format!(
                            "Sequence flow '{}' default flag disagrees with its router condition; the condition wins",
                            flow.id
                        ),
                    )
                    .at(flow_loc(self.idx, &flow.id)),
                );
            }
        }
    }

    fn check_reachability(&self, result: &mut ValidationResult) {
        let graph = FlowGraph::new(
            self.ep.components.iter().map(|c| c.id.as_str()),
            self.ep
                .flows
                .iter()
                .map(|f| (f.source.as_str(), f.target.as_str())),
        );
        let starts: Vec<&str> = self.ep.start_components().map(|c| c.id.as_str()).collect();
        let ends: Vec<&str> = self.ep.end_components().map(|c| c.id.as_str()).collect();
        let forward = graph.reachable_from(&starts);
        let backward = graph.reaching(&ends);

        for comp in &self.ep.components {
            if self.is_exception_branch(comp) {
                continue;
            }
            if !starts.is_empty() && !forward.contains(&comp.id) {
                result.push(
                    Finding::warning(
                        FindingCode::Unreachable,
                        format!("Component '{}' is not reachable from the start event", comp.id),
                    )
                    .at(component_loc(self.idx, &comp.id)),
                );
            }
            if !ends.is_empty() && !backward.contains(&comp.id) {
                result.push(
                    Finding::warning(
                        FindingCode::CannotReachEnd,
                        format!("Component '{}' cannot reach an end event", comp.id),
                    )
                    .at(component_loc(self.idx, &comp.id)),
                );
            }
        }
    }

    fn check_isolation(&self, result: &mut ValidationResult) {
        for flow in &self.ep.flows {
            let source_owner = self.members.get(flow.source.as_str()).copied();
            let target_owner = self.members.get(flow.target.as_str()).copied();
            let breach = match (source_owner, target_owner) {
                (Some(a), Some(b)) => a != b,
                // error-trigger boundary: subprocess into its own member
                (None, Some(owner)) => flow.source != owner,
                (Some(_), None) => true,
                (None, None) => false,
            };
            if breach {
                result.push(
                    Finding::error(
                        FindingCode::IsolationBreach,
                        format!(
                            "Sequence flow '{}' crosses the boundary of an exception subprocess ({} -> {})",
                            flow.id, flow.source, flow.target
                        ),
                    )
                    .at(flow_loc(self.idx, &flow.id)),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::dto::{BlueprintDto, ComponentDto, EndpointDto, SequenceFlowDto};
    use serde_json::json;

    fn lower(components: Vec<ComponentDto>, flows: Vec<SequenceFlowDto>) -> Blueprint {
        let dto = BlueprintDto::single(EndpointDto::new(components, Some(flows)));
        Blueprint::from_dto(&dto).unwrap()
    }

    fn start_end() -> Vec<ComponentDto> {
        vec![
            ComponentDto::new("start", "Start", "StartEvent"),
            ComponentDto::new("end", "End", "EndEvent"),
        ]
    }

    fn router(conditions: serde_json::Value) -> ComponentDto {
        ComponentDto::new("r", "Route", "Router").with_config("conditions", conditions)
    }

    #[test]
    fn test_linear_flow_is_clean() {
        let mut comps = start_end();
        comps.insert(1, ComponentDto::new("m", "M", "ContentModifier"));
        let bp = lower(
            comps,
            vec![
                SequenceFlowDto::new("f1", "start", "m"),
                SequenceFlowDto::new("f2", "m", "end"),
            ],
        );
        let result = validate_semantics(&bp);
        assert!(result.findings.is_empty(), "{}", result);
        assert!(validate(bp).is_ok());
    }

    #[test]
    fn test_missing_incoming_and_outgoing() {
        let mut comps = start_end();
        comps.insert(1, ComponentDto::new("a", "A", "ContentModifier"));
        comps.insert(2, ComponentDto::new("b", "B", "ContentModifier"));
        // `a` is first after start and exempt from the incoming check
        let bp = lower(comps, vec![SequenceFlowDto::new("f1", "b", "end")]);
        let result = validate_semantics(&bp);
        let incoming: Vec<_> = result
            .errors()
            .filter(|f| f.code == FindingCode::MissingIncoming)
            .collect();
        assert_eq!(incoming.len(), 1);
        assert!(incoming[0].message.contains("'b'"));
        let outgoing: Vec<_> = result
            .errors()
            .filter(|f| f.code == FindingCode::MissingOutgoing)
            .collect();
        assert_eq!(outgoing.len(), 2); // start and a
    }

    #[test]
    fn test_self_loop_through_synthetic_end() {
        let mut comps = start_end();
        comps.insert(1, ComponentDto::new("m", "M", "ContentModifier"));
        let bp = lower(
            comps,
            vec![
                SequenceFlowDto::new("f1", "start", "m"),
                SequenceFlowDto::new("f2", "m", "end"),
                SequenceFlowDto::new("f3", "end", "EndEvent"),
            ],
        );
        let result = validate_semantics(&bp);
        let err = result
            .errors()
            .find(|f| f.code == FindingCode::SelfLoop)
            .unwrap();
        assert_eq!(err.message, "Sequence flow connects 'end' to itself");
        assert!(validate(bp).is_err());
    }

    #[test]
    fn test_exception_subprocess_to_end() {
        let mut comps = start_end();
        comps.push(ComponentDto::new("SubProcess_1", "Errors", "ExceptionSubprocess"));
        let bp = lower(
            comps,
            vec![
                SequenceFlowDto::new("f1", "start", "end"),
                SequenceFlowDto::new("f2", "SubProcess_1", "EndEvent"),
            ],
        );
        let result = validate_semantics(&bp);
        let err = result
            .errors()
            .find(|f| f.code == FindingCode::ExceptionSubprocessToEnd)
            .unwrap();
        assert_eq!(err.message, "Exception subprocess cannot connect to main EndEvent");
    }

    #[test]
    fn test_exception_subprocess_to_main_flow() {
        let mut comps = start_end();
        comps.insert(1, ComponentDto::new("m", "M", "ContentModifier"));
        comps.push(ComponentDto::new("ex", "Errors", "ExceptionSubprocess"));
        let bp = lower(
            comps,
            vec![
                SequenceFlowDto::new("f1", "start", "m"),
                SequenceFlowDto::new("f2", "m", "end"),
                SequenceFlowDto::new("f3", "ex", "m"),
            ],
        );
        assert!(validate_semantics(&bp).contains(FindingCode::ExceptionSubprocessToMainFlow));
    }

    #[test]
    fn test_fan_out_only_on_gateways() {
        let mut comps = start_end();
        comps.insert(1, ComponentDto::new("a", "A", "ContentModifier"));
        comps.insert(2, ComponentDto::new("b", "B", "ContentModifier"));
        let bp = lower(
            comps,
            vec![
                SequenceFlowDto::new("f1", "start", "a"),
                SequenceFlowDto::new("f2", "a", "b"),
                SequenceFlowDto::new("f3", "a", "end"),
                SequenceFlowDto::new("f4", "b", "end"),
            ],
        );
        let result = validate_semantics(&bp);
        assert!(result.contains(FindingCode::MultipleOutgoing));
    }

    #[test]
    fn test_router_missing_condition_flow() {
        let mut comps = start_end();
        comps.insert(
            1,
            router(json!([
                {"id": "c1", "default": false, "expr": "x>1"},
                {"id": "c2", "default": true}
            ])),
        );
        let bp = lower(
            comps,
            vec![
                SequenceFlowDto::new("f1", "start", "r"),
                SequenceFlowDto::new("c1", "r", "end"),
            ],
        );
        let result = validate_semantics(&bp);
        let err = result
            .errors()
            .find(|f| f.code == FindingCode::RouterMissingFlows)
            .unwrap();
        assert_eq!(err.message, "Router missing sequence flows for conditions: {c2}");
    }

    #[test]
    fn test_router_extra_flow_and_default_count() {
        let mut comps = start_end();
        comps.insert(1, router(json!([{"id": "c1", "expr": "x>1"}])));
        let bp = lower(
            comps,
            vec![
                SequenceFlowDto::new("f1", "start", "r"),
                SequenceFlowDto::new("c1", "r", "end"),
                SequenceFlowDto::new("stray", "r", "end"),
            ],
        );
        let result = validate_semantics(&bp);
        assert!(result.contains(FindingCode::RouterDefaultCount));
        assert!(result.contains(FindingCode::RouterExtraFlows));
    }

    #[test]
    fn test_router_without_conditions() {
        let mut comps = start_end();
        comps.insert(1, ComponentDto::new("r", "Route", "Router"));
        let bp = lower(
            comps,
            vec![
                SequenceFlowDto::new("f1", "start", "r"),
                SequenceFlowDto::new("f2", "r", "end"),
            ],
        );
        assert!(validate_semantics(&bp).contains(FindingCode::RouterWithoutConditions));
    }

    #[test]
    fn test_router_default_flag_mismatch_is_warning() {
        let mut comps = start_end();
        comps.insert(
            1,
            router(json!([{"id": "c1", "expr": "x>1"}, {"id": "c2", "default": true}])),
        );
        let mut c1 = SequenceFlowDto::new("c1", "r", "end");
        c1.is_default = true;
        let bp = lower(
            comps,
            vec![
                SequenceFlowDto::new("f1", "start", "r"),
                c1,
                SequenceFlowDto::new("c2", "r", "end"),
            ],
        );
        let result = validate_semantics(&bp);
        assert!(result.is_ok(), "{}", result);
        assert!(result.contains(FindingCode::RouterDefaultMismatch));
    }

    #[test]
    fn test_unreachable_is_warning_only() {
        let mut comps = start_end();
        comps.insert(1, ComponentDto::new("a", "A", "ContentModifier"));
        comps.insert(2, ComponentDto::new("b", "B", "ContentModifier"));
        comps.insert(3, ComponentDto::new("c", "C", "ContentModifier"));
        // b -> c -> b loop never connects to start
        let bp = lower(
            comps,
            vec![
                SequenceFlowDto::new("f1", "start", "a"),
                SequenceFlowDto::new("f2", "a", "end"),
                SequenceFlowDto::new("f3", "b", "c"),
                SequenceFlowDto::new("f4", "c", "b"),
            ],
        );
        let result = validate_semantics(&bp);
        assert!(result.is_ok(), "{}", result);
        assert_eq!(
            result
                .warnings()
                .filter(|f| f.code == FindingCode::Unreachable)
                .count(),
            2
        );
        assert!(result.contains(FindingCode::CannotReachEnd));
    }

    #[test]
    fn test_isolation_allows_boundary_and_inner_flows() {
        let mut comps = start_end();
        comps.push(
            ComponentDto::new("ex", "Errors", "ExceptionSubprocess")
                .with_config("components", json!(["log", "notify"])),
        );
        comps.push(ComponentDto::new("log", "Log", "Script").with_config("script", json!("a.groovy")));
        comps.push(ComponentDto::new("notify", "Notify", "HTTP").with_config("address", json!("https://x")));
        let bp = lower(
            comps,
            vec![
                SequenceFlowDto::new("f1", "start", "end"),
                SequenceFlowDto::new("f2", "ex", "log"),
                SequenceFlowDto::new("f3", "log", "notify"),
            ],
        );
        let result = validate_semantics(&bp);
        assert!(result.is_ok(), "{}", result);
    }

    #[test]
    fn test_isolation_breach() {
        let mut comps = start_end();
        comps.insert(1, ComponentDto::new("m", "M", "ContentModifier"));
        comps.push(
            ComponentDto::new("ex", "Errors", "ExceptionSubprocess")
                .with_config("components", json!(["log"])),
        );
        comps.push(ComponentDto::new("log", "Log", "Script").with_config("script", json!("a.groovy")));
        let bp = lower(
            comps,
            vec![
                SequenceFlowDto::new("f1", "start", "m"),
                SequenceFlowDto::new("f2", "m", "end"),
                SequenceFlowDto::new("f3", "log", "end"),
            ],
        );
        let result = validate_semantics(&bp);
        let breach = result
            .errors()
            .find(|f| f.code == FindingCode::IsolationBreach)
            .unwrap();
        assert_eq!(
            breach.location.as_deref(),
            Some("endpoints[0].sequence_flows[f3]")
        );
    }
}

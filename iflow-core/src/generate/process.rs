//! Per-endpoint emission: one `bpmn2:process`, its collaboration
//! participant, and any adapter-trio receivers and message flows.

use super::ids::IdScheme;
use super::layout::{LayoutPlan, PlannedNode, PlannedSubprocess, ShapeKind};
use super::xml::{extension_elements, XmlElement};
use crate::blueprint::model::config_value_text;
use crate::blueprint::{Component, Endpoint, SequenceFlow};
use crate::catalog::{
    ComponentTemplate, ConfigMapping, ElementKind, EventDefinition, Property, StructuralHandling,
    TemplateCatalog, RECEIVER_NAME_KEY,
};
use crate::config::GeneratorConfig;
use crate::error::CompileError;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// Misspelling is the platform's own and must be preserved.
pub const RECEIVER_PARTICIPANT_TYPE: &str = "EndpointRecevier";
pub const PROCESS_PARTICIPANT_TYPE: &str = "IntegrationProcess";

const ERROR_START_PROPERTIES: &[(&str, &str)] = &[
    (
        "cmdVariantUri",
        "ctype::FlowstepVariant/cname::ErrorStartEvent/version::1.0",
    ),
    ("activityType", "StartErrorEvent"),
];

const ERROR_END_PROPERTIES: &[(&str, &str)] = &[
    ("componentVersion", "1.1"),
    (
        "cmdVariantUri",
        "ctype::FlowstepVariant/cname::ErrorEndEvent/version::1.1.0",
    ),
];

const DEFAULT_ROUTE_PROPERTIES: &[(&str, &str)] = &[
    ("componentVersion", "1.0"),
    ("activityType", "GatewayRoute"),
    ("expressionType", "NonXML"),
    ("conditionExpression", ""),
    (
        "cmdVariantUri",
        "ctype::FlowstepVariant/cname::GatewayRoute/version::1.0.0",
    ),
];

/// Output of one endpoint.
#[derive(Debug)]
pub struct EmittedEndpoint {
    pub process: XmlElement,
    pub participant: XmlElement,
    pub receivers: Vec<XmlElement>,
    pub message_flows: Vec<XmlElement>,
    pub plan: LayoutPlan,
}

#[derive(Debug, Clone, PartialEq)]
enum Route {
    Default,
    Conditional(String),
}

#[derive(Debug, Clone)]
struct FlowSpec {
    id: String,
    source: String,
    target: String,
    name: Option<String>,
    route: Option<Route>,
}

/// Error start/end ids of one exception subprocess.
struct ErrorEvents {
    start: String,
    end: String,
}

pub fn emit_endpoint(
    catalog: &TemplateCatalog,
    config: &GeneratorConfig,
    ep: &Endpoint,
    index: usize,
    process_name: &str,
    ids: &mut IdScheme,
) -> Result<EmittedEndpoint, CompileError> {
    Emitter::new(catalog, ep, ids).emit(config, index, process_name)
}

struct Emitter<'a> {
    catalog: &'a TemplateCatalog,
    ep: &'a Endpoint,
    ids: &'a mut IdScheme,
    /// blueprint id → document id
    node_ids: HashMap<&'a str, String>,
    flow_ids: HashMap<&'a str, String>,
    members: HashMap<&'a str, &'a str>,
    error_events: HashMap<&'a str, ErrorEvents>,
    incoming: HashMap<String, Vec<String>>,
    outgoing: HashMap<String, Vec<String>>,
    receivers: Vec<XmlElement>,
    message_flows: Vec<XmlElement>,
    plan: LayoutPlan,
}

impl<'a> Emitter<'a> {
    fn new(catalog: &'a TemplateCatalog, ep: &'a Endpoint, ids: &'a mut IdScheme) -> Self {
        Self {
            catalog,
            ep,
            ids,
            node_ids: HashMap::new(),
            flow_ids: HashMap::new(),
            members: ep.exception_members(),
            error_events: HashMap::new(),
            incoming: HashMap::new(),
            outgoing: HashMap::new(),
            receivers: Vec::new(),
            message_flows: Vec::new(),
            plan: LayoutPlan::default(),
        }
    }

    fn emit(
        mut self,
        config: &GeneratorConfig,
        index: usize,
        process_name: &str,
    ) -> Result<EmittedEndpoint, CompileError> {
        let ep = self.ep;

        // Blueprint ids are claimed before anything is synthesized.
        for comp in &ep.components {
            let id = self.ids.claim(&comp.id);
            self.node_ids.insert(comp.id.as_str(), id);
        }
        for flow in &ep.flows {
            let id = self.ids.claim(&flow.id);
            self.flow_ids.insert(flow.id.as_str(), id);
        }
        for sub in ep.components.iter().filter(|c| c.kind.is_exception_subprocess()) {
            let base = self.node(&sub.id);
            let events = ErrorEvents {
                start: self.ids.claim(&format!("{}_ErrorStart", base)),
                end: self.ids.claim(&format!("{}_ErrorEnd", base)),
            };
            self.error_events.insert(sub.id.as_str(), events);
        }
        let process_id = self.ids.claim(&format!("Process_{}", index + 1));
        let participant_id = self.ids.next("Participant");
        self.plan.participant = participant_id.clone();

        // ── flows ──
        let mut top_flows = Vec::new();
        let mut inner_flows: HashMap<&str, Vec<FlowSpec>> = HashMap::new();
        for flow in &ep.flows {
            match self.inner_owner(flow) {
                Some(owner) => {
                    let spec = self.inner_flow(flow, owner);
                    inner_flows.entry(owner).or_default().push(spec);
                }
                None => top_flows.push(self.top_flow(flow)),
            }
        }
        let subprocesses: Vec<&Component> = ep
            .components
            .iter()
            .filter(|c| c.kind.is_exception_subprocess())
            .collect();
        for sub in &subprocesses {
            let flows = inner_flows.entry(sub.id.as_str()).or_default();
            self.close_subprocess(sub, flows);
        }
        let ordered = top_flows.iter().chain(
            subprocesses
                .iter()
                .filter_map(|s| inner_flows.get(s.id.as_str()))
                .flatten(),
        );
        for spec in ordered {
            self.outgoing
                .entry(spec.source.clone())
                .or_default()
                .push(spec.id.clone());
            self.incoming
                .entry(spec.target.clone())
                .or_default()
                .push(spec.id.clone());
            self.plan
                .sequence_flows
                .push((spec.id.clone(), spec.source.clone(), spec.target.clone()));
        }

        // ── nodes ──
        let mut process = XmlElement::new("bpmn2:process")
            .attr("id", process_id.as_str())
            .attr("name", process_name)
            .child(extension_elements(
                config
                    .process_properties
                    .iter()
                    .map(|p| (p.key.as_str(), p.value.as_str())),
            ));

        for comp in &ep.components {
            if self.members.contains_key(comp.id.as_str()) {
                continue;
            }
            if comp.kind.is_exception_subprocess() {
                let flows = inner_flows.remove(comp.id.as_str()).unwrap_or_default();
                process.push(self.exception_subprocess(comp, &flows)?);
            } else {
                let template = self.template(comp)?;
                self.plan.main.push(PlannedNode {
                    id: self.node(&comp.id),
                    kind: shape_kind(template.element),
                    hint: comp.layout,
                });
                process.push(self.component_element(comp)?);
            }
        }
        for spec in &top_flows {
            process.push(flow_element(spec));
        }

        let participant = XmlElement::new("bpmn2:participant")
            .attr("id", participant_id.as_str())
            .attr("ifl:type", PROCESS_PARTICIPANT_TYPE)
            .attr("name", process_name)
            .attr("processRef", process_id.as_str())
            .child(XmlElement::new("bpmn2:extensionElements"));

        trace!(
            process = %process_id,
            receivers = self.receivers.len(),
            "endpoint emitted"
        );

        Ok(EmittedEndpoint {
            process,
            participant,
            receivers: self.receivers,
            message_flows: self.message_flows,
            plan: self.plan,
        })
    }

    // ── id helpers ──

    fn node(&self, blueprint_id: &str) -> String {
        self.node_ids
            .get(blueprint_id)
            .cloned()
            .unwrap_or_else(|| blueprint_id.to_string())
    }

    fn flow(&self, blueprint_id: &str) -> String {
        self.flow_ids
            .get(blueprint_id)
            .cloned()
            .unwrap_or_else(|| blueprint_id.to_string())
    }

    fn template(&self, comp: &Component) -> Result<&'a ComponentTemplate, CompileError> {
        self.catalog
            .get(comp.kind)
            .ok_or_else(|| CompileError::CatalogMismatch {
                kind: comp.kind,
                component: comp.id.clone(),
            })
    }

    // ── flow classification ──

    /// The exception subprocess a flow belongs inside, if any: member to
    /// member, or the subprocess into one of its own members.
    fn inner_owner(&self, flow: &SequenceFlow) -> Option<&'a str> {
        let owner = *self.members.get(flow.target.as_str())?;
        let source_owner = self.members.get(flow.source.as_str()).copied();
        if flow.source == owner || source_owner == Some(owner) {
            Some(owner)
        } else {
            None
        }
    }

    fn inner_flow(&self, flow: &SequenceFlow, owner: &str) -> FlowSpec {
        let source = if flow.source == owner {
            self.error_events
                .get(owner)
                .map(|e| e.start.clone())
                .unwrap_or_else(|| self.node(owner))
        } else {
            self.node(&flow.source)
        };
        let (route, name) = self.route(flow);
        FlowSpec {
            id: self.flow(&flow.id),
            source,
            target: self.node(&flow.target),
            name,
            route,
        }
    }

    fn top_flow(&self, flow: &SequenceFlow) -> FlowSpec {
        let (route, name) = self.route(flow);
        FlowSpec {
            id: self.flow(&flow.id),
            source: self.node(&flow.source),
            target: self.node(&flow.target),
            name,
            route,
        }
    }

    /// Route marker and display name. Every flow out of a router, nested or
    /// not, is either the default route or carries a condition expression.
    fn route(&self, flow: &SequenceFlow) -> (Option<Route>, Option<String>) {
        let router = self
            .ep
            .component(&flow.source)
            .filter(|c| c.kind.is_router());
        match router {
            Some(router) => {
                let cond = router.conditions.iter().find(|c| c.id == flow.id);
                let is_default = cond.map(|c| c.is_default).unwrap_or(flow.is_default);
                let route = if is_default {
                    Route::Default
                } else {
                    Route::Conditional(
                        cond.and_then(|c| c.expression.clone())
                            .or_else(|| flow.condition.clone())
                            .unwrap_or_default(),
                    )
                };
                let name = flow
                    .name
                    .clone()
                    .or_else(|| cond.and_then(|c| c.name.clone()));
                (Some(route), name)
            }
            None => (None, flow.name.clone()),
        }
    }

    /// Add the synthesized inner flows: error start into entry members,
    /// exit members into error end, or start straight to end when empty.
    fn close_subprocess(&mut self, sub: &Component, flows: &mut Vec<FlowSpec>) {
        let Some(events) = self.error_events.get(sub.id.as_str()) else {
            return;
        };
        let (start, end) = (events.start.clone(), events.end.clone());
        let members: Vec<String> = sub
            .members
            .iter()
            .filter(|m| self.node_ids.contains_key(m.as_str()))
            .map(|m| self.node(m))
            .collect();

        if members.is_empty() {
            let id = self.ids.next("SequenceFlow");
            flows.push(plain_flow(id, start, end));
            return;
        }

        if !flows.iter().any(|f| f.source == start) {
            let entries: Vec<String> = members
                .iter()
                .filter(|m| !flows.iter().any(|f| &f.target == *m))
                .cloned()
                .collect();
            for member in entries {
                let id = self.ids.next("SequenceFlow");
                flows.push(plain_flow(id, start.clone(), member));
            }
        }
        let exits: Vec<String> = members
            .iter()
            .filter(|m| !flows.iter().any(|f| &f.source == *m))
            .cloned()
            .collect();
        for member in exits {
            let id = self.ids.next("SequenceFlow");
            flows.push(plain_flow(id, member, end.clone()));
        }
    }

    // ── elements ──

    fn refs(&self, id: &str) -> Vec<XmlElement> {
        let mut refs = Vec::new();
        for flow in self.incoming.get(id).into_iter().flatten() {
            refs.push(XmlElement::new("bpmn2:incoming").with_text(flow.as_str()));
        }
        for flow in self.outgoing.get(id).into_iter().flatten() {
            refs.push(XmlElement::new("bpmn2:outgoing").with_text(flow.as_str()));
        }
        refs
    }

    fn component_element(&mut self, comp: &Component) -> Result<XmlElement, CompileError> {
        let template = self.template(comp)?;
        let id = self.node(&comp.id);
        let mut el = XmlElement::new(template.element.tag())
            .attr("id", id.as_str())
            .attr("name", comp.name.as_str());

        if comp.kind.is_router() {
            let ep = self.ep;
            let default_flow = comp
                .conditions
                .iter()
                .find(|c| c.is_default)
                .and_then(|c| ep.flows.iter().find(|f| f.id == c.id && f.source == comp.id));
            if let Some(flow) = default_flow {
                el.set("default", self.flow(&flow.id));
            }
        }

        let props = merged_properties(&template.properties, &template.config_mapping, &comp.config);
        el.push(extension_elements(
            props.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ));
        el.children.extend(self.refs(&id));
        if let Some(def) = template.event_definition {
            el.push(XmlElement::new(def.tag()));
        }

        if template.handling == StructuralHandling::AdapterTrio {
            self.adapter_trio(comp, template, &id);
        }
        Ok(el)
    }

    /// Receiver participant and message flow for an external call.
    fn adapter_trio(&mut self, comp: &Component, template: &ComponentTemplate, activity_id: &str) {
        let Some(mf) = &template.message_flow else {
            return;
        };
        let receiver_id = self.ids.next("Participant");
        let receiver_name = comp
            .config
            .get(RECEIVER_NAME_KEY)
            .map(config_value_text)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{}_Receiver", activity_id));

        self.receivers.push(
            XmlElement::new("bpmn2:participant")
                .attr("id", receiver_id.as_str())
                .attr("ifl:type", RECEIVER_PARTICIPANT_TYPE)
                .attr("name", receiver_name)
                .child(extension_elements([("ifl:type", RECEIVER_PARTICIPANT_TYPE)])),
        );

        let flow_id = self.ids.next("MessageFlow");
        let props = merged_properties(&mf.properties, &mf.config_mapping, &comp.config);
        self.message_flows.push(
            XmlElement::new("bpmn2:messageFlow")
                .attr("id", flow_id.as_str())
                .attr("name", mf.name.as_str())
                .attr("sourceRef", activity_id)
                .attr("targetRef", receiver_id.as_str())
                .child(extension_elements(
                    props.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                )),
        );

        self.plan
            .receivers
            .push((receiver_id.clone(), activity_id.to_string()));
        self.plan
            .message_flows
            .push((flow_id, activity_id.to_string(), receiver_id));
    }

    /// `bpmn2:subProcess` with, in order: extension block, error end,
    /// error start, nested members, inner flows.
    fn exception_subprocess(
        &mut self,
        sub: &Component,
        flows: &[FlowSpec],
    ) -> Result<XmlElement, CompileError> {
        let template = self.template(sub)?;
        let id = self.node(&sub.id);
        let (start, end) = match self.error_events.get(sub.id.as_str()) {
            Some(e) => (e.start.clone(), e.end.clone()),
            None => (format!("{}_ErrorStart", id), format!("{}_ErrorEnd", id)),
        };

        let props = merged_properties(&template.properties, &template.config_mapping, &sub.config);
        let mut el = XmlElement::new(template.element.tag())
            .attr("id", id.as_str())
            .attr("name", sub.name.as_str())
            .attr("triggeredByEvent", "true")
            .child(extension_elements(
                props.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            ));

        let mut error_end = XmlElement::new(ElementKind::EndEvent.tag())
            .attr("id", end.as_str())
            .attr("name", "Error End")
            .child(extension_elements(ERROR_END_PROPERTIES.iter().copied()));
        error_end.children.extend(self.refs(&end));
        error_end.push(XmlElement::new(EventDefinition::Error.tag()));
        el.push(error_end);

        let mut error_start = XmlElement::new(ElementKind::StartEvent.tag())
            .attr("id", start.as_str())
            .attr("name", "Error Start");
        error_start.children.extend(self.refs(&start));
        error_start.push(
            XmlElement::new(EventDefinition::Error.tag())
                .child(extension_elements(ERROR_START_PROPERTIES.iter().copied())),
        );
        el.push(error_start);

        let ep = self.ep;
        let mut planned_members = Vec::new();
        for member_id in &sub.members {
            let Some(member) = ep.component(member_id) else {
                continue;
            };
            let member_template = self.template(member)?;
            planned_members.push(PlannedNode {
                id: self.node(&member.id),
                kind: shape_kind(member_template.element),
                hint: None,
            });
            el.push(self.component_element(member)?);
        }
        for spec in flows {
            el.push(flow_element(spec));
        }

        self.plan.subprocesses.push(PlannedSubprocess {
            id,
            error_start: start,
            error_end: end,
            members: planned_members,
        });
        Ok(el)
    }
}

fn plain_flow(id: String, source: String, target: String) -> FlowSpec {
    FlowSpec {
        id,
        source,
        target,
        name: None,
        route: None,
    }
}

fn flow_element(spec: &FlowSpec) -> XmlElement {
    let mut el = XmlElement::new("bpmn2:sequenceFlow").attr("id", spec.id.as_str());
    if let Some(name) = &spec.name {
        el.set("name", name.as_str());
    }
    el.set("sourceRef", spec.source.as_str());
    el.set("targetRef", spec.target.as_str());
    el.set("isImmediate", "true");

    match &spec.route {
        Some(Route::Default) => {
            el.push(extension_elements(DEFAULT_ROUTE_PROPERTIES.iter().copied()));
        }
        Some(Route::Conditional(expr)) => {
            el.push(
                XmlElement::new("bpmn2:conditionExpression")
                    .attr("id", format!("FormalExpression_{}", spec.id))
                    .attr("xsi:type", "bpmn2:tFormalExpression")
                    .with_text(expr.as_str()),
            );
        }
        None => {}
    }
    el
}

fn shape_kind(element: ElementKind) -> ShapeKind {
    if element.is_event() {
        ShapeKind::Event
    } else if element.is_gateway() {
        ShapeKind::Gateway
    } else {
        ShapeKind::Activity
    }
}

/// Template properties with mapped config values applied: a mapped key
/// overrides the property of the same name in place, otherwise it is appended.
/// Config keys without a mapping are dropped.
pub fn merged_properties(
    properties: &[Property],
    mapping: &BTreeMap<String, ConfigMapping>,
    config: &BTreeMap<String, Value>,
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = properties
        .iter()
        .map(|p| (p.key.clone(), p.value.clone()))
        .collect();
    for (key, value) in config {
        let Some(target) = mapping.get(key) else {
            continue;
        };
        let rendered = target.format.render(value);
        match merged.iter_mut().find(|(k, _)| *k == target.property) {
            Some((_, v)) => *v = rendered,
            None => merged.push((target.property.clone(), rendered)),
        }
    }
    merged
}

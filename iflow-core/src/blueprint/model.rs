//! Typed blueprint model
//!
//! The raw [`BlueprintDto`] is lowered into this model once the schema
//! validator has accepted it. Component kinds are a closed sum type, so every
//! downstream dispatch (catalog lookup, generation, graph rules) is exhaustive.

use super::dto::{present, BlueprintDto, LayoutHint, END_EVENT_ID, START_EVENT_ID};
use crate::diagnostics::{component_loc, flow_loc, Finding, FindingCode, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// Config key carrying a router's branch conditions.
pub const CONDITIONS_KEY: &str = "conditions";
/// Config key listing the component ids nested in an exception subprocess.
pub const MEMBERS_KEY: &str = "components";

// ─── Kinds ────────────────────────────────────────────────────

/// Protocol of an external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdapterKind {
    OData,
    Sftp,
    Http,
    SuccessFactors,
    Generic,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 5] = [
        AdapterKind::OData,
        AdapterKind::Sftp,
        AdapterKind::Http,
        AdapterKind::SuccessFactors,
        AdapterKind::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::OData => "OData",
            AdapterKind::Sftp => "SFTP",
            AdapterKind::Http => "HTTP",
            AdapterKind::SuccessFactors => "SuccessFactors",
            AdapterKind::Generic => "Generic",
        }
    }

    /// Case- and separator-insensitive parse.
    pub fn parse(s: &str) -> Option<Self> {
        match normalize(s).as_str() {
            "odata" | "odatav2" | "odatav4" => Some(AdapterKind::OData),
            "sftp" => Some(AdapterKind::Sftp),
            "http" | "https" => Some(AdapterKind::Http),
            "successfactors" | "sf" | "sfsf" => Some(AdapterKind::SuccessFactors),
            "generic" | "" => Some(AdapterKind::Generic),
            _ => None,
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed enumeration of blueprint component types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ComponentKind {
    StartEvent,
    EndEvent,
    ContentModifier,
    ContentEnricher,
    Script,
    /// Exclusive gateway with declared conditions.
    Router,
    /// Parallel gateway.
    JoinGateway,
    MessageMapping,
    /// External call / request-reply through a receiver adapter.
    ExternalCall(AdapterKind),
    Subprocess,
    ExceptionSubprocess,
}

/// Why a type string did not map onto a [`ComponentKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindParseError {
    UnknownType(String),
    UnknownAdapter(String),
}

impl fmt::Display for KindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KindParseError::UnknownType(t) => write!(f, "unknown component type '{}'", t),
            KindParseError::UnknownAdapter(a) => write!(f, "unknown adapter type '{}'", a),
        }
    }
}

impl std::error::Error for KindParseError {}

impl ComponentKind {
    /// Every kind with a template in the builtin catalog.
    pub fn all() -> Vec<ComponentKind> {
        let mut kinds = vec![
            ComponentKind::StartEvent,
            ComponentKind::EndEvent,
            ComponentKind::ContentModifier,
            ComponentKind::ContentEnricher,
            ComponentKind::Script,
            ComponentKind::Router,
            ComponentKind::JoinGateway,
            ComponentKind::MessageMapping,
        ];
        kinds.extend(AdapterKind::ALL.iter().map(|a| ComponentKind::ExternalCall(*a)));
        kinds.push(ComponentKind::Subprocess);
        kinds.push(ComponentKind::ExceptionSubprocess);
        kinds
    }

    /// Parse a blueprint `type` string plus optional adapter sub-kind.
    ///
    /// Matching ignores case and separators, so `content_modifier`,
    /// `ContentModifier` and `content-modifier` are equivalent. Adapter names
    /// (`OData`, `SFTP`, ...) are accepted directly as types. An explicit
    /// `adapter` field wins over the adapter implied by the type.
    pub fn parse(type_str: &str, adapter: Option<&str>) -> Result<Self, KindParseError> {
        let explicit_adapter = match adapter.map(str::trim).filter(|a| !a.is_empty()) {
            Some(a) => Some(
                AdapterKind::parse(a).ok_or_else(|| KindParseError::UnknownAdapter(a.to_string()))?,
            ),
            None => None,
        };
        let kind = match normalize(type_str).as_str() {
            "startevent" | "start" | "messagestartevent" => ComponentKind::StartEvent,
            "endevent" | "end" | "messageendevent" => ComponentKind::EndEvent,
            "contentmodifier" | "modifier" => ComponentKind::ContentModifier,
            "contentenricher" => ComponentKind::ContentEnricher,
            "script" | "groovyscript" => ComponentKind::Script,
            "router" | "exclusivegateway" => ComponentKind::Router,
            "joingateway" | "join" | "parallelgateway" => ComponentKind::JoinGateway,
            "messagemapping" | "mapping" => ComponentKind::MessageMapping,
            "externalcall" | "requestreply" => {
                ComponentKind::ExternalCall(explicit_adapter.unwrap_or(AdapterKind::Generic))
            }
            "subprocess" | "processcall" | "localintegrationprocess" => ComponentKind::Subprocess,
            "exceptionsubprocess" | "errorsubprocess" => ComponentKind::ExceptionSubprocess,
            other => match AdapterKind::parse(other) {
                Some(implied) if !other.is_empty() && other != "generic" => {
                    ComponentKind::ExternalCall(explicit_adapter.unwrap_or(implied))
                }
                _ => return Err(KindParseError::UnknownType(type_str.to_string())),
            },
        };
        Ok(kind)
    }

    pub fn is_start(&self) -> bool {
        matches!(self, ComponentKind::StartEvent)
    }

    pub fn is_end(&self) -> bool {
        matches!(self, ComponentKind::EndEvent)
    }

    pub fn is_exception_subprocess(&self) -> bool {
        matches!(self, ComponentKind::ExceptionSubprocess)
    }

    /// Branching component whose outgoing edges must match declared conditions.
    pub fn is_router(&self) -> bool {
        matches!(self, ComponentKind::Router)
    }

    /// Kinds permitted more than one outgoing sequence flow.
    pub fn allows_fan_out(&self) -> bool {
        matches!(self, ComponentKind::Router | ComponentKind::JoinGateway)
    }

    pub fn adapter(&self) -> Option<AdapterKind> {
        match self {
            ComponentKind::ExternalCall(a) => Some(*a),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::StartEvent => f.write_str("StartEvent"),
            ComponentKind::EndEvent => f.write_str("EndEvent"),
            ComponentKind::ContentModifier => f.write_str("ContentModifier"),
            ComponentKind::ContentEnricher => f.write_str("ContentEnricher"),
            ComponentKind::Script => f.write_str("Script"),
            ComponentKind::Router => f.write_str("Router"),
            ComponentKind::JoinGateway => f.write_str("JoinGateway"),
            ComponentKind::MessageMapping => f.write_str("MessageMapping"),
            ComponentKind::ExternalCall(a) => write!(f, "ExternalCall:{}", a),
            ComponentKind::Subprocess => f.write_str("Subprocess"),
            ComponentKind::ExceptionSubprocess => f.write_str("ExceptionSubprocess"),
        }
    }
}

impl FromStr for ComponentKind {
    type Err = KindParseError;

    /// Accepts the `Display` form (`ExternalCall:OData`) as well as plain type names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((base, adapter)) => ComponentKind::parse(base, Some(adapter)),
            None => ComponentKind::parse(s, None),
        }
    }
}

impl TryFrom<String> for ComponentKind {
    type Error = KindParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ComponentKind> for String {
    fn from(kind: ComponentKind) -> Self {
        kind.to_string()
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ─── Kind-specific configuration ──────────────────────────────

/// One declared router branch. `id` names the sequence flow implementing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterCondition {
    pub id: String,
    #[serde(
        default,
        alias = "expr",
        alias = "condition",
        skip_serializing_if = "Option::is_none"
    )]
    pub expression: Option<String>,
    #[serde(default, alias = "default")]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Parse `config.conditions` into router conditions.
pub fn parse_router_conditions(
    config: &BTreeMap<String, Value>,
) -> Result<Vec<RouterCondition>, String> {
    match config.get(CONDITIONS_KEY) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value @ Value::Array(_)) => serde_json::from_value(value.clone())
            .map_err(|e| format!("invalid '{}' entry: {}", CONDITIONS_KEY, e)),
        Some(_) => Err(format!("'{}' must be a list", CONDITIONS_KEY)),
    }
}

/// Parse `config.components` (exception subprocess members) into ids.
pub fn parse_members(config: &BTreeMap<String, Value>) -> Result<Vec<String>, String> {
    match config.get(MEMBERS_KEY) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Object(obj) => obj
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| format!("'{}' entries need an 'id'", MEMBERS_KEY)),
                _ => Err(format!("'{}' entries must be ids", MEMBERS_KEY)),
            })
            .collect(),
        Some(_) => Err(format!("'{}' must be a list of component ids", MEMBERS_KEY)),
    }
}

// ─── Typed model ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub id: String,
    pub name: String,
    pub kind: ComponentKind,
    pub config: BTreeMap<String, Value>,
    pub layout: Option<LayoutHint>,
    /// Router branches; empty for every other kind.
    pub conditions: Vec<RouterCondition>,
    /// Nested member ids; empty unless this is an exception subprocess.
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceFlow {
    pub id: String,
    pub source: String,
    pub target: String,
    pub condition: Option<String>,
    pub name: Option<String>,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    /// Process name; the generator falls back to its configured default.
    pub name: Option<String>,
    pub components: Vec<Component>,
    pub flows: Vec<SequenceFlow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    pub name: String,
    pub endpoints: Vec<Endpoint>,
}

impl Endpoint {
    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn start_components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|c| c.kind.is_start())
    }

    pub fn end_components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|c| c.kind.is_end())
    }

    /// member id → owning exception subprocess id
    pub fn exception_members(&self) -> HashMap<&str, &str> {
        let mut owners = HashMap::new();
        for sub in self
            .components
            .iter()
            .filter(|c| c.kind.is_exception_subprocess())
        {
            for member in &sub.members {
                owners.insert(member.as_str(), sub.id.as_str());
            }
        }
        owners
    }

    /// Components on the main flow: not exception subprocesses, not nested in one.
    pub fn main_flow_components(&self) -> Vec<&Component> {
        let members = self.exception_members();
        self.components
            .iter()
            .filter(|c| !c.kind.is_exception_subprocess() && !members.contains_key(c.id.as_str()))
            .collect()
    }
}

impl Blueprint {
    /// Lower a structurally valid DTO into the typed model.
    ///
    /// The synthetic `StartEvent` / `EndEvent` flow references are rewritten to
    /// the endpoint's declared start / first end component. Returns the error
    /// findings if the DTO still has structural defects.
    pub fn from_dto(dto: &BlueprintDto) -> Result<Blueprint, ValidationResult> {
        let mut result = ValidationResult::new();
        let mut endpoints = Vec::with_capacity(dto.endpoints.len());

        if dto.endpoints.is_empty() {
            result.push(Finding::error(
                FindingCode::EmptyBlueprint,
                "Blueprint has no endpoints",
            ));
        }

        for (idx, ep) in dto.endpoints.iter().enumerate() {
            let mut components = Vec::new();
            for comp in ep.components.iter().flatten() {
                let (Some(id), Some(name), Some(type_str)) =
                    (present(&comp.id), present(&comp.name), present(&comp.kind))
                else {
                    result.push(
                        Finding::error(
                            FindingCode::MissingField,
                            "Component is missing id, name or type",
                        )
                        .at(format!("endpoints[{}]", idx)),
                    );
                    continue;
                };
                let kind = match ComponentKind::parse(type_str, comp.adapter.as_deref()) {
                    Ok(kind) => kind,
                    Err(e) => {
                        result.push(
                            Finding::error(FindingCode::UnknownComponentType, e.to_string())
                                .at(component_loc(idx, id)),
                        );
                        continue;
                    }
                };
                let conditions = if kind.is_router() {
                    parse_router_conditions(&comp.config).unwrap_or_else(|e| {
                        result.push(
                            Finding::error(FindingCode::InvalidConfig, e).at(component_loc(idx, id)),
                        );
                        Vec::new()
                    })
                } else {
                    Vec::new()
                };
                let members = if kind.is_exception_subprocess() {
                    parse_members(&comp.config).unwrap_or_else(|e| {
                        result.push(
                            Finding::error(FindingCode::InvalidConfig, e).at(component_loc(idx, id)),
                        );
                        Vec::new()
                    })
                } else {
                    Vec::new()
                };
                components.push(Component {
                    id: id.to_string(),
                    name: name.to_string(),
                    kind,
                    config: comp.config.clone(),
                    layout: comp.layout,
                    conditions,
                    members,
                });
            }

            let ids: HashSet<&str> = components.iter().map(|c| c.id.as_str()).collect();
            let start_id = components.iter().find(|c| c.kind.is_start()).map(|c| c.id.clone());
            let end_id = components.iter().find(|c| c.kind.is_end()).map(|c| c.id.clone());
            let resolve = |reference: &str| -> Option<String> {
                if ids.contains(reference) {
                    Some(reference.to_string())
                } else if reference == START_EVENT_ID {
                    start_id.clone()
                } else if reference == END_EVENT_ID {
                    end_id.clone()
                } else {
                    None
                }
            };

            let mut flows = Vec::new();
            for flow in ep.sequence_flows.iter().flatten() {
                let Some(flow_id) = present(&flow.id) else {
                    result.push(
                        Finding::error(FindingCode::MissingField, "Sequence flow is missing id")
                            .at(format!("endpoints[{}]", idx)),
                    );
                    continue;
                };
                let source = present(&flow.source_ref).and_then(&resolve);
                let target = present(&flow.target_ref).and_then(&resolve);
                match (source, target) {
                    (Some(source), Some(target)) => flows.push(SequenceFlow {
                        id: flow_id.to_string(),
                        source,
                        target,
                        condition: present(&flow.condition).map(str::to_string),
                        name: present(&flow.name).map(str::to_string),
                        is_default: flow.is_default,
                    }),
                    _ => result.push(
                        Finding::error(
                            FindingCode::UnresolvedFlowReference,
                            format!("Sequence flow '{}' has an unresolvable endpoint", flow_id),
                        )
                        .at(flow_loc(idx, flow_id)),
                    ),
                }
            }

            endpoints.push(Endpoint {
                name: present(&ep.name).map(str::to_string),
                components,
                flows,
            });
        }

        if result.has_errors() {
            return Err(result);
        }
        Ok(Blueprint {
            name: present(&dto.name)
                .map(str::to_string)
                .unwrap_or_else(|| "IntegrationFlow".to_string()),
            endpoints,
        })
    }
}

/// A blueprint the semantic validator accepted. Only obtainable through
/// [`crate::validate::semantic::validate`], so generation cannot run on an
/// unchecked graph.
#[derive(Debug, Clone)]
pub struct ValidatedBlueprint {
    blueprint: Blueprint,
    warnings: ValidationResult,
}

impl ValidatedBlueprint {
    pub(crate) fn new(blueprint: Blueprint, warnings: ValidationResult) -> Self {
        Self {
            blueprint,
            warnings,
        }
    }

    /// Non-blocking findings from semantic validation.
    pub fn warnings(&self) -> &ValidationResult {
        &self.warnings
    }

    pub fn into_inner(self) -> Blueprint {
        self.blueprint
    }
}

impl Deref for ValidatedBlueprint {
    type Target = Blueprint;

    fn deref(&self) -> &Blueprint {
        &self.blueprint
    }
}

/// Render a config value as extension-property text.
pub fn config_value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

//! Component template catalog
//!
//! One [`ComponentTemplate`] per [`ComponentKind`]: which BPMN element it
//! becomes, the mandatory `ifl:property` block the platform insists on, and how
//! blueprint config keys map onto property keys. The catalog is built once and
//! shared read-only between the validators and the generator.

use crate::blueprint::model::{config_value_text, CONDITIONS_KEY, MEMBERS_KEY};
use crate::blueprint::{AdapterKind, ComponentKind};
use crate::error::CatalogError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::info;

/// Config key naming the receiver participant of an adapter trio.
pub const RECEIVER_NAME_KEY: &str = "receiver_name";

// ─── Template vocabulary ──────────────────────────────────────

/// BPMN element a component is emitted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementKind {
    StartEvent,
    EndEvent,
    CallActivity,
    ServiceTask,
    ExclusiveGateway,
    ParallelGateway,
    SubProcess,
}

impl ElementKind {
    /// Qualified tag in the generated document.
    pub fn tag(&self) -> &'static str {
        match self {
            ElementKind::StartEvent => "bpmn2:startEvent",
            ElementKind::EndEvent => "bpmn2:endEvent",
            ElementKind::CallActivity => "bpmn2:callActivity",
            ElementKind::ServiceTask => "bpmn2:serviceTask",
            ElementKind::ExclusiveGateway => "bpmn2:exclusiveGateway",
            ElementKind::ParallelGateway => "bpmn2:parallelGateway",
            ElementKind::SubProcess => "bpmn2:subProcess",
        }
    }

    pub fn is_event(&self) -> bool {
        matches!(self, ElementKind::StartEvent | ElementKind::EndEvent)
    }

    pub fn is_gateway(&self) -> bool {
        matches!(
            self,
            ElementKind::ExclusiveGateway | ElementKind::ParallelGateway
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructuralHandling {
    #[default]
    None,
    ExceptionSubprocess,
    AdapterTrio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventDefinition {
    Message,
    Error,
}

impl EventDefinition {
    pub fn tag(&self) -> &'static str {
        match self {
            EventDefinition::Message => "bpmn2:messageEventDefinition",
            EventDefinition::Error => "bpmn2:errorEventDefinition",
        }
    }
}

/// One mandatory `ifl:property` key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl Property {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    /// Scalar rendered as text.
    #[default]
    Plain,
    /// JSON object rendered as the platform's `<row><cell/>` table.
    Table,
}

impl ValueFormat {
    pub fn render(&self, value: &Value) -> String {
        match (self, value) {
            (ValueFormat::Table, Value::Object(entries)) => entries
                .iter()
                .map(|(name, v)| table_row(name, &config_value_text(v)))
                .collect(),
            _ => config_value_text(value),
        }
    }
}

fn table_row(name: &str, value: &str) -> String {
    format!(
        "<row><cell id='Action'>Create</cell><cell id='Type'>constant</cell>\
         <cell id='Value'>{}</cell><cell id='Default'></cell>\
         <cell id='Name'>{}</cell><cell id='Datatype'></cell></row>",
        value, name
    )
}

/// Where a config key lands in the property block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMapping {
    pub property: String,
    #[serde(default)]
    pub format: ValueFormat,
}

/// Message-flow half of an adapter trio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlowTemplate {
    /// Display name of the message flow (`HTTP`, `OData`, ...).
    pub name: String,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub config_mapping: BTreeMap<String, ConfigMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentTemplate {
    pub kind: ComponentKind,
    pub element: ElementKind,
    #[serde(default)]
    pub handling: StructuralHandling,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_definition: Option<EventDefinition>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub config_mapping: BTreeMap<String, ConfigMapping>,
    #[serde(default)]
    pub required_config: Vec<String>,
    /// Keys consumed by structural handling rather than mapped to properties.
    #[serde(default)]
    pub structural_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_flow: Option<MessageFlowTemplate>,
}

impl ComponentTemplate {
    fn new(kind: ComponentKind, element: ElementKind) -> Self {
        Self {
            kind,
            element,
            handling: StructuralHandling::None,
            event_definition: None,
            properties: Vec::new(),
            config_mapping: BTreeMap::new(),
            required_config: Vec::new(),
            structural_keys: Vec::new(),
            message_flow: None,
        }
    }

    fn props(mut self, pairs: &[(&str, &str)]) -> Self {
        self.properties = pairs.iter().map(|(k, v)| Property::new(k, v)).collect();
        self
    }

    fn map(mut self, config_key: &str, property: &str, format: ValueFormat) -> Self {
        self.config_mapping.insert(
            config_key.to_string(),
            ConfigMapping {
                property: property.to_string(),
                format,
            },
        );
        self
    }

    fn require(mut self, keys: &[&str]) -> Self {
        self.required_config = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    fn structural(mut self, keys: &[&str]) -> Self {
        self.structural_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Every config key this template consumes.
    pub fn known_keys(&self) -> BTreeSet<&str> {
        let mut keys: BTreeSet<&str> = self.config_mapping.keys().map(String::as_str).collect();
        keys.extend(self.required_config.iter().map(String::as_str));
        keys.extend(self.structural_keys.iter().map(String::as_str));
        if let Some(mf) = &self.message_flow {
            keys.extend(mf.config_mapping.keys().map(String::as_str));
        }
        keys
    }

    pub fn recognizes(&self, key: &str) -> bool {
        self.known_keys().contains(key)
    }
}

// ─── Catalog ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: HashMap<ComponentKind, ComponentTemplate>,
}

impl TemplateCatalog {
    /// Empty catalog. Mostly useful in tests; real callers start from [`Self::builtin`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing any existing one for the same kind.
    pub fn register(&mut self, template: ComponentTemplate) {
        self.templates.insert(template.kind, template);
    }

    pub fn get(&self, kind: ComponentKind) -> Option<&ComponentTemplate> {
        self.templates.get(&kind)
    }

    pub fn contains(&self, kind: ComponentKind) -> bool {
        self.templates.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Apply per-kind replacements from `other`.
    pub fn merge(&mut self, other: TemplateCatalog) {
        self.templates.extend(other.templates);
    }

    /// Builtin catalog with YAML overrides merged on top.
    ///
    /// ```yaml
    /// templates:
    ///   - kind: Script
    ///     element: callActivity
    ///     properties:
    ///       - { key: activityType, value: Script }
    ///     config_mapping:
    ///       script: { property: script }
    ///     required_config: [script]
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let raw: CatalogYaml = serde_yaml::from_str(yaml)?;
        let mut catalog = Self::builtin();
        for t in raw.templates {
            let kind: ComponentKind = t
                .kind
                .parse()
                .map_err(|_| CatalogError::UnknownKind(t.kind.clone()))?;
            // Handling follows the kind: the generator and both validators
            // shape the graph around it.
            let handling = catalog.get(kind).map(|b| b.handling).unwrap_or_default();
            if let Some(requested) = t.handling {
                if requested != handling {
                    return Err(CatalogError::HandlingOverride {
                        kind,
                        builtin: handling,
                        requested,
                    });
                }
            }
            if handling == StructuralHandling::AdapterTrio && t.message_flow.is_none() {
                return Err(CatalogError::MissingMessageFlow(kind));
            }
            catalog.register(ComponentTemplate {
                kind,
                element: t.element,
                handling,
                event_definition: t.event_definition,
                properties: t.properties,
                config_mapping: t.config_mapping,
                required_config: t.required_config,
                structural_keys: t.structural_keys,
                message_flow: t.message_flow,
            });
        }
        Ok(catalog)
    }

    /// Load overrides from a YAML file.
    pub fn load_overrides(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog overrides: {}", path.display()))?;
        let catalog = Self::from_yaml_str(&text)
            .with_context(|| format!("Failed to parse catalog overrides: {}", path.display()))?;
        info!(
            "Loaded component catalog from {} ({} templates)",
            path.display(),
            catalog.len()
        );
        Ok(catalog)
    }

    /// The SAP Integration Suite catalog.
    pub fn builtin() -> Self {
        use ValueFormat::{Plain, Table};

        let mut catalog = Self::new();

        let mut start = ComponentTemplate::new(ComponentKind::StartEvent, ElementKind::StartEvent)
            .props(&[
                ("componentVersion", "1.0"),
                (
                    "cmdVariantUri",
                    "ctype::FlowstepVariant/cname::MessageStartEvent/version::1.0",
                ),
            ]);
        start.event_definition = Some(EventDefinition::Message);
        catalog.register(start);

        let mut end = ComponentTemplate::new(ComponentKind::EndEvent, ElementKind::EndEvent).props(&[
            ("componentVersion", "1.1"),
            (
                "cmdVariantUri",
                "ctype::FlowstepVariant/cname::MessageEndEvent/version::1.1.0",
            ),
        ]);
        end.event_definition = Some(EventDefinition::Message);
        catalog.register(end);

        catalog.register(
            ComponentTemplate::new(ComponentKind::ContentModifier, ElementKind::CallActivity)
                .props(&[
                    ("bodyType", "constant"),
                    ("propertyTable", ""),
                    ("headerTable", ""),
                    ("wrapContent", ""),
                    ("componentVersion", "1.5"),
                    ("activityType", "Enricher"),
                    (
                        "cmdVariantUri",
                        "ctype::FlowstepVariant/cname::Enricher/version::1.5.1",
                    ),
                ])
                .map("body", "wrapContent", Plain)
                .map("body_type", "bodyType", Plain)
                .map("headers", "headerTable", Table)
                .map("properties", "propertyTable", Table),
        );

        catalog.register(
            ComponentTemplate::new(ComponentKind::ContentEnricher, ElementKind::CallActivity)
                .props(&[
                    ("aggregationAlgorithm", "combine"),
                    ("componentVersion", "1.1"),
                    ("activityType", "contentEnricherWithLookup"),
                    (
                        "cmdVariantUri",
                        "ctype::FlowstepVariant/cname::contentEnricherWithLookup/version::1.1.0",
                    ),
                ])
                .map("aggregation", "aggregationAlgorithm", Plain)
                .map("original_path", "originalMessageNodePath", Plain)
                .map("lookup_path", "lookupMessageNodePath", Plain),
        );

        catalog.register(
            ComponentTemplate::new(ComponentKind::Script, ElementKind::CallActivity)
                .props(&[
                    ("scriptFunction", ""),
                    ("scriptBundleId", ""),
                    ("componentVersion", "1.1"),
                    ("activityType", "Script"),
                    (
                        "cmdVariantUri",
                        "ctype::FlowstepVariant/cname::GroovyScript/version::1.1.2",
                    ),
                    ("subActivityType", "GroovyScript"),
                ])
                .map("script", "script", Plain)
                .map("function", "scriptFunction", Plain)
                .require(&["script"]),
        );

        catalog.register(
            ComponentTemplate::new(ComponentKind::Router, ElementKind::ExclusiveGateway)
                .props(&[
                    ("throwException", "false"),
                    ("componentVersion", "1.1"),
                    ("activityType", "ExclusiveGateway"),
                    (
                        "cmdVariantUri",
                        "ctype::FlowstepVariant/cname::ExclusiveGateway/version::1.1.2",
                    ),
                ])
                .map("throw_exception", "throwException", Plain)
                .structural(&[CONDITIONS_KEY]),
        );

        catalog.register(
            ComponentTemplate::new(ComponentKind::JoinGateway, ElementKind::ParallelGateway).props(
                &[
                    ("componentVersion", "1.0"),
                    ("activityType", "Join"),
                    (
                        "cmdVariantUri",
                        "ctype::FlowstepVariant/cname::Join/version::1.0.0",
                    ),
                ],
            ),
        );

        catalog.register(
            ComponentTemplate::new(ComponentKind::MessageMapping, ElementKind::CallActivity)
                .props(&[
                    ("mappinguri", ""),
                    ("mappingname", ""),
                    ("mappingpath", ""),
                    ("componentVersion", "1.1"),
                    ("activityType", "Mapping"),
                    (
                        "cmdVariantUri",
                        "ctype::FlowstepVariant/cname::MessageMapping/version::1.1.0",
                    ),
                    ("subActivityType", "MessageMapping"),
                ])
                .map("mapping_name", "mappingname", Plain)
                .map("mapping_path", "mappingpath", Plain)
                .map("mapping_uri", "mappinguri", Plain)
                .require(&["mapping_name"]),
        );

        for adapter in AdapterKind::ALL {
            catalog.register(external_call_template(adapter));
        }

        catalog.register(
            ComponentTemplate::new(ComponentKind::Subprocess, ElementKind::CallActivity)
                .props(&[
                    ("processId", ""),
                    ("componentVersion", "1.0"),
                    ("activityType", "ProcessCallElement"),
                    (
                        "cmdVariantUri",
                        "ctype::FlowstepVariant/cname::NonLoopingProcess/version::1.0.3",
                    ),
                    ("subActivityType", "NonLoopingProcess"),
                ])
                .map("process_id", "processId", Plain)
                .require(&["process_id"]),
        );

        let mut exception =
            ComponentTemplate::new(ComponentKind::ExceptionSubprocess, ElementKind::SubProcess)
                .props(&[
                    ("componentVersion", "1.1"),
                    ("activityType", "ErrorEventSubProcessTemplate"),
                    (
                        "cmdVariantUri",
                        "ctype::FlowstepVariant/cname::ErrorEventSubProcessTemplate/version::1.1.0",
                    ),
                ])
                .structural(&[MEMBERS_KEY]);
        exception.handling = StructuralHandling::ExceptionSubprocess;
        catalog.register(exception);

        catalog
    }
}

fn external_call_template(adapter: AdapterKind) -> ComponentTemplate {
    let mut template = ComponentTemplate::new(
        ComponentKind::ExternalCall(adapter),
        ElementKind::ServiceTask,
    )
    .props(&[
        ("componentVersion", "1.0"),
        ("activityType", "ExternalCall"),
        (
            "cmdVariantUri",
            "ctype::FlowstepVariant/cname::ExternalCall/version::1.0.4",
        ),
    ])
    .require(&["address"])
    .structural(&[RECEIVER_NAME_KEY]);
    template.handling = StructuralHandling::AdapterTrio;
    template.message_flow = Some(adapter_message_flow(adapter));
    template
}

fn adapter_message_flow(adapter: AdapterKind) -> MessageFlowTemplate {
    use ValueFormat::Plain;

    let (name, pairs): (&str, &[(&str, &str)]) = match adapter {
        AdapterKind::OData => (
            "OData",
            &[
                ("ComponentType", "HCIOData"),
                ("Description", ""),
                ("address", ""),
                ("resourcePath", ""),
                ("operation", "Query(GET)"),
                ("authenticationMethod", "None"),
                ("credentialName", ""),
                ("Name", "OData"),
                ("TransportProtocol", "HTTP"),
                ("MessageProtocol", "OData V2"),
                ("direction", "Receiver"),
                ("ComponentNS", "sap"),
                ("componentVersion", "1.25"),
                (
                    "cmdVariantUri",
                    "ctype::AdapterVariant/cname::sap:HCIOData/tp::HTTP/mp::OData V2/direction::Receiver/version::1.25.0",
                ),
            ],
        ),
        AdapterKind::Sftp => (
            "SFTP",
            &[
                ("ComponentType", "SFTP"),
                ("Description", ""),
                ("host", ""),
                ("path", ""),
                ("fileName", ""),
                ("authentication", "public_key"),
                ("credential_name", ""),
                ("Name", "SFTP"),
                ("TransportProtocol", "SFTP"),
                ("MessageProtocol", "File"),
                ("direction", "Receiver"),
                ("ComponentNS", "sap"),
                ("componentVersion", "1.11"),
                (
                    "cmdVariantUri",
                    "ctype::AdapterVariant/cname::sap:SFTP/tp::SFTP/mp::File/direction::Receiver/version::1.11.2",
                ),
            ],
        ),
        AdapterKind::SuccessFactors => (
            "SuccessFactors",
            &[
                ("ComponentType", "SuccessFactors"),
                ("Description", ""),
                ("address", ""),
                ("resourcePath", ""),
                ("operation", "Query(GET)"),
                ("authenticationMethod", "Basic"),
                ("credentialName", ""),
                ("Name", "SuccessFactors"),
                ("TransportProtocol", "HTTPS"),
                ("MessageProtocol", "OData V2"),
                ("direction", "Receiver"),
                ("ComponentNS", "sap"),
                ("componentVersion", "1.4"),
                (
                    "cmdVariantUri",
                    "ctype::AdapterVariant/cname::sap:SuccessFactors/tp::HTTPS/mp::OData V2/direction::Receiver/version::1.4.0",
                ),
            ],
        ),
        AdapterKind::Http | AdapterKind::Generic => (
            "HTTP",
            &[
                ("ComponentType", "HTTP"),
                ("Description", ""),
                ("address", ""),
                ("httpMethod", "POST"),
                ("authenticationMethod", "None"),
                ("credentialName", ""),
                ("httpRequestTimeout", "60000"),
                ("throwExceptionOnFailure", "true"),
                ("Name", "HTTP"),
                ("TransportProtocol", "HTTP"),
                ("MessageProtocol", "None"),
                ("direction", "Receiver"),
                ("ComponentNS", "sap"),
                ("componentVersion", "1.9"),
                (
                    "cmdVariantUri",
                    "ctype::AdapterVariant/cname::sap:HTTP/tp::HTTP/mp::None/direction::Receiver/version::1.9.0",
                ),
            ],
        ),
    };

    let mut mf = MessageFlowTemplate {
        name: name.to_string(),
        properties: pairs.iter().map(|(k, v)| Property::new(k, v)).collect(),
        config_mapping: BTreeMap::new(),
    };
    let mut map = |key: &str, property: &str| {
        mf.config_mapping.insert(
            key.to_string(),
            ConfigMapping {
                property: property.to_string(),
                format: Plain,
            },
        );
    };
    match adapter {
        AdapterKind::Sftp => {
            map("address", "host");
            map("path", "path");
            map("file_name", "fileName");
            map("auth_method", "authentication");
            map("credential_name", "credential_name");
        }
        AdapterKind::OData | AdapterKind::SuccessFactors => {
            map("address", "address");
            map("resource_path", "resourcePath");
            map("entity", "resourcePath");
            map("operation", "operation");
            map("auth_method", "authenticationMethod");
            map("credential_name", "credentialName");
        }
        AdapterKind::Http | AdapterKind::Generic => {
            map("address", "address");
            map("method", "httpMethod");
            map("operation", "httpMethod");
            map("auth_method", "authenticationMethod");
            map("credential_name", "credentialName");
            map("timeout", "httpRequestTimeout");
        }
    }
    mf
}

// ─── YAML shape ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CatalogYaml {
    #[serde(default)]
    templates: Vec<TemplateYaml>,
}

#[derive(Debug, Deserialize)]
struct TemplateYaml {
    kind: String,
    element: ElementKind,
    #[serde(default)]
    handling: Option<StructuralHandling>,
    #[serde(default)]
    event_definition: Option<EventDefinition>,
    #[serde(default)]
    properties: Vec<Property>,
    #[serde(default)]
    config_mapping: BTreeMap<String, ConfigMapping>,
    #[serde(default)]
    required_config: Vec<String>,
    #[serde(default)]
    structural_keys: Vec<String>,
    #[serde(default)]
    message_flow: Option<MessageFlowTemplate>,
}

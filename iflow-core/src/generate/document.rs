//! The generated iFlow document: collaboration, process(es), diagram.

use super::ids::artifact_name;
use super::xml::{parse_document, write_document, XmlElement};
use crate::error::XmlError;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

pub const NS_BPMN2: &str = "http://www.omg.org/spec/BPMN/20100524/MODEL";
pub const NS_BPMNDI: &str = "http://www.omg.org/spec/BPMN/20100524/DI";
pub const NS_DC: &str = "http://www.omg.org/spec/DD/20100524/DC";
pub const NS_DI: &str = "http://www.omg.org/spec/DD/20100524/DI";
pub const NS_IFL: &str = "http:///com.sap.ifl.model/Ifl.xsd";
pub const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Archive location the packaging step expects.
const ARCHIVE_DIR: &str = "src/main/resources/scenarioflows/integrationflow";

/// Local names of elements that take part in sequence flow.
const FLOW_NODE_TAGS: &[&str] = &[
    "startEvent",
    "endEvent",
    "intermediateCatchEvent",
    "intermediateThrowEvent",
    "callActivity",
    "serviceTask",
    "scriptTask",
    "task",
    "exclusiveGateway",
    "parallelGateway",
    "inclusiveGateway",
    "subProcess",
];

pub fn is_flow_node(el: &XmlElement) -> bool {
    FLOW_NODE_TAGS.contains(&el.local_name())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    /// Attributes of `bpmn2:definitions` (namespace declarations, id).
    pub root_attributes: Vec<(String, String)>,
    pub collaboration: XmlElement,
    pub processes: Vec<XmlElement>,
    /// Root children other than the three sections, kept for ingested documents.
    pub extras: Vec<XmlElement>,
    pub diagram: XmlElement,
}

impl GeneratedDocument {
    /// Standard `bpmn2:definitions` attributes.
    pub fn default_root_attributes() -> Vec<(String, String)> {
        [
            ("xmlns:bpmn2", NS_BPMN2),
            ("xmlns:bpmndi", NS_BPMNDI),
            ("xmlns:dc", NS_DC),
            ("xmlns:di", NS_DI),
            ("xmlns:ifl", NS_IFL),
            ("xmlns:xsi", NS_XSI),
            ("id", "Definitions_1"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// Assemble the `bpmn2:definitions` root.
    pub fn to_element(&self) -> XmlElement {
        let mut root = XmlElement::new("bpmn2:definitions");
        root.attributes = self.root_attributes.clone();
        root.push(self.collaboration.clone());
        for process in &self.processes {
            root.push(process.clone());
        }
        for extra in &self.extras {
            root.push(extra.clone());
        }
        root.push(self.diagram.clone());
        root
    }

    pub fn to_xml(&self) -> Result<String, XmlError> {
        write_document(&self.to_element())
    }

    /// Ingest an iFlow document produced elsewhere.
    pub fn from_xml(xml: &str) -> Result<Self, XmlError> {
        let root = parse_document(xml)?;
        if !root.is("definitions") {
            return Err(XmlError::Malformed(format!(
                "expected a definitions root, found '{}'",
                root.name
            )));
        }

        let mut collaboration = None;
        let mut diagram = None;
        let mut processes = Vec::new();
        let mut extras = Vec::new();
        for child in root.children {
            match child.local_name() {
                "collaboration" if collaboration.is_none() => collaboration = Some(child),
                "BPMNDiagram" if diagram.is_none() => diagram = Some(child),
                "process" => processes.push(child),
                _ => extras.push(child),
            }
        }

        Ok(Self {
            root_attributes: root.attributes,
            collaboration: collaboration
                .ok_or_else(|| XmlError::Malformed("document has no collaboration".to_string()))?,
            processes,
            extras,
            diagram: diagram
                .ok_or_else(|| XmlError::Malformed("document has no BPMNDiagram".to_string()))?,
        })
    }

    /// `src/main/resources/scenarioflows/integrationflow/<name>.iflw`, with
    /// the name reduced to a single safe path segment.
    pub fn archive_path(name: &str) -> String {
        format!("{}/{}.iflw", ARCHIVE_DIR, artifact_name(name))
    }

    /// SHA-256 of the serialized document, lowercase hex.
    pub fn digest(&self) -> Result<String, XmlError> {
        let xml = self.to_xml()?;
        Ok(format!("{:x}", Sha256::digest(xml.as_bytes())))
    }

    // ── Queries ──

    pub fn plane(&self) -> Option<&XmlElement> {
        self.diagram.find("BPMNPlane")
    }

    pub fn plane_mut(&mut self) -> Option<&mut XmlElement> {
        self.diagram.find_mut("BPMNPlane")
    }

    pub fn participants(&self) -> Vec<&XmlElement> {
        self.collaboration.children_named("participant").collect()
    }

    pub fn message_flows(&self) -> Vec<&XmlElement> {
        self.collaboration.children_named("messageFlow").collect()
    }

    /// Flow nodes at any depth, process by process, in document order.
    pub fn flow_nodes(&self) -> Vec<&XmlElement> {
        let mut nodes = Vec::new();
        for process in &self.processes {
            process.walk(&mut |el| {
                if is_flow_node(el) {
                    nodes.push(el);
                }
            });
        }
        nodes
    }

    /// Sequence flows at any depth, in document order.
    pub fn sequence_flows(&self) -> Vec<&XmlElement> {
        self.processes
            .iter()
            .flat_map(|p| p.descendants_named("sequenceFlow"))
            .collect()
    }

    pub fn shapes(&self) -> Vec<&XmlElement> {
        self.plane()
            .map(|p| p.children_named("BPMNShape").collect())
            .unwrap_or_default()
    }

    pub fn edges(&self) -> Vec<&XmlElement> {
        self.plane()
            .map(|p| p.children_named("BPMNEdge").collect())
            .unwrap_or_default()
    }

    /// Every `id` declared in the collaboration and processes.
    pub fn element_ids(&self) -> HashSet<String> {
        let mut ids = HashSet::new();
        let mut collect = |el: &XmlElement| {
            if let Some(id) = el.id() {
                ids.insert(id.to_string());
            }
        };
        self.collaboration.walk(&mut collect);
        for process in &self.processes {
            process.walk(&mut collect);
        }
        ids
    }

    /// Element by id in the collaboration or any process.
    pub fn find_element(&self, id: &str) -> Option<&XmlElement> {
        self.collaboration
            .find_by_id(id)
            .or_else(|| self.processes.iter().find_map(|p| p.find_by_id(id)))
    }
}

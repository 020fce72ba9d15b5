//! Document Generator
//!
//! Turns a validated blueprint into an SAP Cloud Integration BPMN2 document:
//! one collaboration, one process per endpoint, and a diagram with a shape
//! for every flow node and participant and an edge for every flow.

pub mod document;
pub mod ids;
pub mod layout;
pub mod process;
pub mod xml;

pub use document::GeneratedDocument;
pub use ids::IdScheme;
pub use xml::XmlElement;

use crate::blueprint::ValidatedBlueprint;
use crate::catalog::TemplateCatalog;
use crate::config::GeneratorConfig;
use crate::error::CompileError;
use layout::DiagramBuilder;
use process::emit_endpoint;
use tracing::debug;
use xml::extension_elements;

pub struct Generator<'a> {
    catalog: &'a TemplateCatalog,
    config: &'a GeneratorConfig,
}

impl<'a> Generator<'a> {
    pub fn new(catalog: &'a TemplateCatalog, config: &'a GeneratorConfig) -> Self {
        Self { catalog, config }
    }

    /// Generate the document. Fails only when the catalog has no template
    /// for a kind the blueprint uses.
    pub fn generate(&self, blueprint: &ValidatedBlueprint) -> Result<GeneratedDocument, CompileError> {
        let mut ids = IdScheme::new();
        let collaboration_id = ids.claim("Collaboration_1");
        ids.claim("Definitions_1");
        ids.claim("BPMNDiagram_1");
        ids.claim("BPMNPlane_1");

        let mut collaboration = XmlElement::new("bpmn2:collaboration")
            .attr("id", collaboration_id.as_str())
            .attr("name", "Default Collaboration")
            .child(extension_elements(
                self.config
                    .collaboration_properties
                    .iter()
                    .map(|p| (p.key.as_str(), p.value.as_str())),
            ));

        let mut participants = Vec::new();
        let mut message_flows = Vec::new();
        let mut processes = Vec::new();
        let mut diagram = DiagramBuilder::new();
        let layout = &self.config.layout;
        let mut top = layout.origin_y;
        let multiple = blueprint.endpoints.len() > 1;

        for (index, endpoint) in blueprint.endpoints.iter().enumerate() {
            let process_name = match &endpoint.name {
                Some(name) if !name.trim().is_empty() => name.clone(),
                _ if multiple => format!("{} {}", self.config.process_name, index + 1),
                _ => self.config.process_name.clone(),
            };
            let emitted = emit_endpoint(
                self.catalog,
                self.config,
                endpoint,
                index,
                &process_name,
                &mut ids,
            )?;
            debug!(
                endpoint = index,
                process = %process_name,
                components = endpoint.components.len(),
                flows = emitted.plan.sequence_flows.len(),
                "endpoint generated"
            );

            top += diagram.layout_endpoint(&emitted.plan, top, layout);
            participants.push(emitted.participant);
            participants.extend(emitted.receivers);
            message_flows.extend(emitted.message_flows);
            processes.push(emitted.process);
        }

        collaboration.children.extend(participants);
        collaboration.children.extend(message_flows);

        Ok(GeneratedDocument {
            root_attributes: GeneratedDocument::default_root_attributes(),
            collaboration,
            processes,
            extras: Vec::new(),
            diagram: diagram.into_diagram(&collaboration_id),
        })
    }
}

/// One-shot generation.
pub fn generate(
    blueprint: &ValidatedBlueprint,
    catalog: &TemplateCatalog,
    config: &GeneratorConfig,
) -> Result<GeneratedDocument, CompileError> {
    Generator::new(catalog, config).generate(blueprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{BlueprintDto, ComponentDto, EndpointDto, SequenceFlowDto};
    use crate::validate::{validate, validate_structure};
    use layout::Bounds;
    use serde_json::json;

    fn compile(dto: &BlueprintDto) -> GeneratedDocument {
        let catalog = TemplateCatalog::builtin();
        let outcome = validate_structure(dto, &catalog);
        assert!(outcome.result.is_ok(), "{}", outcome.result);
        let bp = crate::blueprint::Blueprint::from_dto(&outcome.blueprint).unwrap();
        let validated = validate(bp).unwrap();
        generate(&validated, &catalog, &GeneratorConfig::default()).unwrap()
    }

    fn http_call() -> BlueprintDto {
        BlueprintDto::single(EndpointDto::new(
            vec![
                ComponentDto::new("StartEvent", "Start", "StartEvent"),
                ComponentDto::new("call", "Call API", "ExternalCall")
                    .with_adapter("HTTP")
                    .with_config("address", json!("https://example.com/api"))
                    .with_config("receiver_name", json!("Backend")),
                ComponentDto::new("EndEvent", "End", "EndEvent"),
            ],
            Some(vec![
                SequenceFlowDto::new("f1", "StartEvent", "call"),
                SequenceFlowDto::new("f2", "call", "EndEvent"),
            ]),
        ))
    }

    #[test]
    fn test_adapter_trio() {
        let doc = compile(&http_call());

        let call = doc.find_element("call").unwrap();
        assert_eq!(call.name, "bpmn2:serviceTask");

        let receiver = doc
            .participants()
            .into_iter()
            .find(|p| p.get("ifl:type") == Some(process::RECEIVER_PARTICIPANT_TYPE))
            .unwrap();
        assert_eq!(receiver.get("name"), Some("Backend"));

        let flows = doc.message_flows();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].get("sourceRef"), Some("call"));
        assert_eq!(flows[0].get("targetRef"), receiver.id());
        let props = xml::read_properties(flows[0].find("extensionElements").unwrap());
        assert!(props
            .iter()
            .any(|(k, v)| k == "address" && v == "https://example.com/api"));

        // Receiver sits below the pool.
        let shape = |id: &str| {
            doc.shapes()
                .into_iter()
                .find(|s| s.get("bpmnElement") == Some(id))
                .and_then(Bounds::from_shape)
                .unwrap()
        };
        let pool = shape(doc.participants()[0].id().unwrap());
        assert!(shape(receiver.id().unwrap()).y > pool.bottom());
    }

    #[test]
    fn test_every_node_and_flow_has_diagram_element() {
        let doc = compile(&http_call());
        // 3 flow nodes + 2 participants
        assert_eq!(doc.shapes().len(), 5);
        // 2 sequence flows + 1 message flow
        assert_eq!(doc.edges().len(), 3);
        assert_eq!(
            doc.plane().unwrap().get("bpmnElement"),
            Some("Collaboration_1")
        );
    }

    #[test]
    fn test_sequence_flow_refs_line_up() {
        let doc = compile(&http_call());
        for flow in doc.sequence_flows() {
            let id = flow.id().unwrap();
            let source = doc.find_element(flow.get("sourceRef").unwrap()).unwrap();
            let target = doc.find_element(flow.get("targetRef").unwrap()).unwrap();
            assert!(source
                .children_named("outgoing")
                .any(|o| o.text() == id));
            assert!(target
                .children_named("incoming")
                .any(|i| i.text() == id));
            assert_eq!(flow.get("isImmediate"), Some("true"));
        }
    }

    #[test]
    fn test_output_is_deterministic() {
        let a = compile(&http_call()).to_xml().unwrap();
        let b = compile(&http_call()).to_xml().unwrap();
        assert_eq!(a, b);
    }
}

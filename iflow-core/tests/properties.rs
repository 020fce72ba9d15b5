//! Property tests over generated and damaged documents.

use iflow_core::blueprint::{BlueprintDto, ComponentDto, EndpointDto, SequenceFlowDto};
use iflow_core::generate::XmlElement;
use iflow_core::{sanitize, GeneratedDocument, Pipeline};
use proptest::prelude::*;
use serde_json::json;

// -- Strategy helpers --

fn step(kind: usize, id: String) -> ComponentDto {
    match kind {
        0 => ComponentDto::new(&id, &id, "ContentModifier").with_config("body", json!("x")),
        1 => ComponentDto::new(&id, &id, "Script").with_config("script", json!("step.groovy")),
        2 => ComponentDto::new(&id, &id, "ExternalCall")
            .with_adapter("HTTP")
            .with_config("address", json!("https://example.com")),
        3 => ComponentDto::new(&id, &id, "OData").with_config("address", json!("https://erp/odata")),
        _ => ComponentDto::new(&id, &id, "SFTP").with_config("address", json!("sftp.example.com")),
    }
}

/// Linear blueprint of 1..6 steps drawn from five component kinds.
fn arb_linear() -> impl Strategy<Value = BlueprintDto> {
    prop::collection::vec(0usize..5, 1..6).prop_map(|kinds| {
        let components = kinds
            .into_iter()
            .enumerate()
            .map(|(i, k)| step(k, format!("step_{}", i)))
            .collect();
        BlueprintDto::single(EndpointDto::new(components, None))
    })
}

/// Router with `n` conditions (the last one default), each branch through
/// its own modifier to the end event.
fn router_blueprint(n: usize) -> BlueprintDto {
    let conditions: Vec<serde_json::Value> = (0..n)
        .map(|i| {
            if i + 1 == n {
                json!({"id": format!("c{}", i), "default": true})
            } else {
                json!({"id": format!("c{}", i), "expr": format!("${{header.n}} = {}", i)})
            }
        })
        .collect();

    let mut components = vec![
        ComponentDto::new("StartEvent", "Start", "StartEvent"),
        ComponentDto::new("route", "Route", "Router").with_config("conditions", json!(conditions)),
    ];
    let mut flows = vec![SequenceFlowDto::new("in", "StartEvent", "route")];
    for i in 0..n {
        let branch = format!("branch_{}", i);
        components.push(ComponentDto::new(&branch, &branch, "ContentModifier"));
        flows.push(SequenceFlowDto::new(&format!("c{}", i), "route", &branch));
        flows.push(SequenceFlowDto::new(&format!("out_{}", i), &branch, "EndEvent"));
    }
    components.push(ComponentDto::new("EndEvent", "End", "EndEvent"));
    BlueprintDto::single(EndpointDto::new(components, Some(flows)))
}

#[derive(Debug, Clone)]
enum Damage {
    DuplicateFlow(usize),
    ExactCopy(usize),
    EmptyTarget(usize),
    OrphanSource(usize),
    DropEdge(usize),
}

fn arb_damage() -> impl Strategy<Value = Damage> {
    prop_oneof![
        (0usize..16).prop_map(Damage::DuplicateFlow),
        (0usize..16).prop_map(Damage::ExactCopy),
        (0usize..16).prop_map(Damage::EmptyTarget),
        (0usize..16).prop_map(Damage::OrphanSource),
        (0usize..16).prop_map(Damage::DropEdge),
    ]
}

fn apply(doc: &mut GeneratedDocument, damage: &Damage, serial: usize) {
    let flows: Vec<XmlElement> = doc.processes[0]
        .children_named("sequenceFlow")
        .cloned()
        .collect();
    if flows.is_empty() {
        return;
    }
    let pick = |i: usize| &flows[i % flows.len()];
    match damage {
        Damage::DuplicateFlow(i) => {
            let mut dup = pick(*i).clone();
            dup.set("id", format!("Dup_{}", serial));
            doc.processes[0].push(dup);
        }
        Damage::ExactCopy(i) => {
            let copy = pick(*i).clone();
            doc.processes[0].push(copy);
        }
        Damage::EmptyTarget(i) => {
            let mut bad = pick(*i).clone();
            bad.set("id", format!("Empty_{}", serial));
            bad.set("targetRef", "");
            doc.processes[0].push(bad);
        }
        Damage::OrphanSource(i) => {
            let mut bad = pick(*i).clone();
            bad.set("id", format!("Orphan_{}", serial));
            bad.set("sourceRef", "NoSuchNode");
            doc.processes[0].push(bad);
        }
        Damage::DropEdge(i) => {
            let Some(id) = pick(*i).id().map(str::to_string) else {
                return;
            };
            if let Some(plane) = doc.plane_mut() {
                plane
                    .children
                    .retain(|c| c.get("bpmnElement") != Some(id.as_str()));
            }
        }
    }
}

proptest! {
    #[test]
    fn one_shape_per_node_and_participant_one_edge_per_flow(dto in arb_linear()) {
        let doc = Pipeline::default().compile(&dto).unwrap().document;
        let nodes = doc.flow_nodes().len();
        let participants = doc.participants().len();
        let flows = doc.sequence_flows().len() + doc.message_flows().len();
        prop_assert_eq!(doc.shapes().len(), nodes + participants);
        prop_assert_eq!(doc.edges().len(), flows);
    }

    #[test]
    fn sanitize_is_idempotent_on_damaged_documents(
        dto in arb_linear(),
        damage in prop::collection::vec(arb_damage(), 0..6),
    ) {
        let mut doc = Pipeline::default().compile(&dto).unwrap().document;
        for (serial, d) in damage.iter().enumerate() {
            apply(&mut doc, d, serial);
        }
        let (once, _) = sanitize(doc);
        let (twice, report) = sanitize(once.clone());
        prop_assert_eq!(&twice, &once);
        prop_assert!(report.is_clean(), "{:?}", report.fixes_applied);
        prop_assert_eq!(
            once.edges().len(),
            once.sequence_flows().len() + once.message_flows().len()
        );
    }

    #[test]
    fn router_yields_one_flow_per_condition(n in 2usize..6) {
        let doc = Pipeline::default().compile(&router_blueprint(n)).unwrap().document;
        let outgoing: Vec<&XmlElement> = doc
            .sequence_flows()
            .into_iter()
            .filter(|f| f.get("sourceRef") == Some("route"))
            .collect();
        prop_assert_eq!(outgoing.len(), n);
        let defaults = outgoing
            .iter()
            .filter(|f| f.find("extensionElements").is_some())
            .count();
        let expressions = outgoing
            .iter()
            .filter(|f| f.find("conditionExpression").is_some())
            .count();
        prop_assert_eq!(defaults, 1);
        prop_assert_eq!(expressions, n - 1);
    }

    #[test]
    fn exception_subprocess_orders_error_end_first(members in 0usize..4) {
        let ids: Vec<String> = (0..members).map(|i| format!("handler_{}", i)).collect();
        let mut components = vec![
            ComponentDto::new("main", "Main", "ContentModifier"),
            ComponentDto::new("Errors", "Errors", "ExceptionSubprocess")
                .with_config("components", json!(ids)),
        ];
        for id in &ids {
            components.push(ComponentDto::new(id, id, "Script").with_config("script", json!("h.groovy")));
        }
        let dto = BlueprintDto::single(EndpointDto::new(components, None));
        let doc = Pipeline::default().compile(&dto).unwrap().document;

        let sub = doc.find_element("Errors").unwrap();
        let names: Vec<&str> = sub.children.iter().map(|c| c.local_name()).collect();
        let end = names.iter().position(|n| *n == "endEvent").unwrap();
        let start = names.iter().position(|n| *n == "startEvent").unwrap();
        prop_assert!(end < start);
        prop_assert!(sub.children_named("sequenceFlow").count() >= 1);
    }
}

//! Document Sanitizer
//!
//! Post-generation repair over a [`GeneratedDocument`]. The passes run in a
//! fixed order and each one is safe to rerun, so a sanitized document comes
//! back unchanged:
//!
//! 1. orphan flows (a reference that resolves to nothing), then diagram
//!    shapes/edges whose `bpmnElement` no longer resolves
//! 2. flows with an empty source or target reference
//! 3. duplicate flows between the same pair, keeping the first
//! 4. missing diagram edges, synthesized from the endpoint shapes
//! 5. isolated / unreachable / dead-end diagnostics (report only)
//!
//! Sanitization never fails. Everything it finds goes into the
//! [`SanitizeReport`].

use crate::generate::document::is_flow_node;
use crate::generate::layout::{message_edge, sequence_edge, Bounds};
use crate::generate::{GeneratedDocument, XmlElement};
use crate::graph::FlowGraph;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizationCode {
    OrphanFlow,
    EmptyReference,
    DuplicateFlow,
    DanglingDiagramElement,
    MissingEdge,
    Isolated,
    Unreachable,
    DeadEnd,
}

impl SanitizationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SanitizationCode::OrphanFlow => "orphan_flow",
            SanitizationCode::EmptyReference => "empty_reference",
            SanitizationCode::DuplicateFlow => "duplicate_flow",
            SanitizationCode::DanglingDiagramElement => "dangling_diagram_element",
            SanitizationCode::MissingEdge => "missing_edge",
            SanitizationCode::Isolated => "isolated",
            SanitizationCode::Unreachable => "unreachable",
            SanitizationCode::DeadEnd => "dead_end",
        }
    }
}

impl fmt::Display for SanitizationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizationFinding {
    pub code: SanitizationCode,
    pub message: String,
    /// Id of the element concerned.
    pub element: String,
}

/// A change made to the document, tied to the issue it resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedFix {
    /// Index into [`SanitizeReport::issues_found`].
    pub issue: usize,
    pub element: String,
    pub description: String,
}

impl fmt::Display for AppliedFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SanitizeReport {
    pub issues_found: Vec<SanitizationFinding>,
    pub fixes_applied: Vec<AppliedFix>,
}

impl SanitizeReport {
    /// True when no pass changed the document.
    pub fn is_clean(&self) -> bool {
        self.fixes_applied.is_empty()
    }

    pub fn count(&self, code: SanitizationCode) -> usize {
        self.issues_found.iter().filter(|f| f.code == code).count()
    }

    pub fn flags(&self, code: SanitizationCode, element: &str) -> bool {
        self.issues_found
            .iter()
            .any(|f| f.code == code && f.element == element)
    }

    /// Each fix with the issue it resolved.
    pub fn resolved(&self) -> impl Iterator<Item = (&SanitizationFinding, &AppliedFix)> {
        self.fixes_applied
            .iter()
            .filter_map(|fix| Some((self.issues_found.get(fix.issue)?, fix)))
    }

    fn issue(&mut self, code: SanitizationCode, element: &str, message: String) {
        self.issues_found.push(SanitizationFinding {
            code,
            message,
            element: element.to_string(),
        });
    }

    fn fixed(&mut self, code: SanitizationCode, element: &str, message: String, fix: String) {
        self.issue(code, element, message);
        self.fixes_applied.push(AppliedFix {
            issue: self.issues_found.len() - 1,
            element: element.to_string(),
            description: fix,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum FlowKind {
    Sequence,
    Message,
}

impl FlowKind {
    fn label(&self) -> &'static str {
        match self {
            FlowKind::Sequence => "sequence flow",
            FlowKind::Message => "message flow",
        }
    }
}

/// Snapshot of one flow's references and where it sits in the tree.
#[derive(Debug, Clone)]
struct FlowRef {
    kind: FlowKind,
    id: String,
    source: String,
    target: String,
    /// Child-index path. Sequence flows: process index, then the path inside
    /// it. Message flows: index among the collaboration's children.
    position: Vec<usize>,
}

impl FlowRef {
    fn from_element(kind: FlowKind, el: &XmlElement, position: Vec<usize>) -> Option<Self> {
        let id = el.id().filter(|id| !id.is_empty())?;
        Some(Self {
            kind,
            id: id.to_string(),
            source: el.get("sourceRef").unwrap_or("").trim().to_string(),
            target: el.get("targetRef").unwrap_or("").trim().to_string(),
            position,
        })
    }
}

/// Sequence flows under `el` in document order, with their paths.
fn collect_sequence_flows(el: &XmlElement, path: &mut Vec<usize>, out: &mut Vec<FlowRef>) {
    for (i, child) in el.children.iter().enumerate() {
        path.push(i);
        if child.is("sequenceFlow") {
            out.extend(FlowRef::from_element(FlowKind::Sequence, child, path.clone()));
        } else {
            collect_sequence_flows(child, path, out);
        }
        path.pop();
    }
}

/// Detach the element at `path` below `root`.
fn take_at(root: &mut XmlElement, path: &[usize]) -> Option<XmlElement> {
    let (last, parents) = path.split_last()?;
    let mut el = root;
    for i in parents {
        el = el.children.get_mut(*i)?;
    }
    (*last < el.children.len()).then(|| el.children.remove(*last))
}

/// Run every pass. Never fails; findings land in the report.
pub fn sanitize(document: GeneratedDocument) -> (GeneratedDocument, SanitizeReport) {
    let mut sanitizer = Sanitizer {
        doc: document,
        report: SanitizeReport::default(),
    };
    sanitizer.remove_orphans();
    sanitizer.remove_dangling_diagram_elements();
    sanitizer.remove_empty_references();
    sanitizer.collapse_duplicates();
    sanitizer.synthesize_missing_edges();
    sanitizer.diagnose();

    let report = sanitizer.report;
    info!(
        issues = report.issues_found.len(),
        fixes = report.fixes_applied.len(),
        "sanitization complete"
    );
    (sanitizer.doc, report)
}

struct Sanitizer {
    doc: GeneratedDocument,
    report: SanitizeReport,
}

impl Sanitizer {
    fn flows(&self) -> Vec<FlowRef> {
        let mut flows = Vec::new();
        for (p, process) in self.doc.processes.iter().enumerate() {
            let mut path = vec![p];
            collect_sequence_flows(process, &mut path, &mut flows);
        }
        for (i, child) in self.doc.collaboration.children.iter().enumerate() {
            if child.is("messageFlow") {
                flows.extend(FlowRef::from_element(FlowKind::Message, child, vec![i]));
            }
        }
        flows
    }

    fn flow_node_ids(&self) -> HashSet<String> {
        self.doc
            .flow_nodes()
            .into_iter()
            .filter_map(|n| n.id())
            .map(str::to_string)
            .collect()
    }

    // ── pass 1 ──

    fn remove_orphans(&mut self) {
        let nodes = self.flow_node_ids();
        let elements = self.doc.element_ids();
        let mut removed = Vec::new();
        for flow in self.flows() {
            if flow.source.is_empty() || flow.target.is_empty() {
                continue;
            }
            let resolvable = match flow.kind {
                FlowKind::Sequence => &nodes,
                FlowKind::Message => &elements,
            };
            let missing: Vec<&str> = [flow.source.as_str(), flow.target.as_str()]
                .into_iter()
                .filter(|r| !resolvable.contains(*r))
                .collect();
            if missing.is_empty() {
                continue;
            }
            self.report.fixed(
                SanitizationCode::OrphanFlow,
                &flow.id,
                format!(
                    "{} '{}' references unknown element(s): {}",
                    flow.kind.label(),
                    flow.id,
                    missing.join(", ")
                ),
                format!("removed orphan {} '{}'", flow.kind.label(), flow.id),
            );
            removed.push((flow, None));
        }
        self.remove_flows(removed);
    }

    fn remove_dangling_diagram_elements(&mut self) {
        let known = self.doc.element_ids();
        let Some(plane) = self.doc.plane() else {
            return;
        };
        let dangling: Vec<(String, String)> = plane
            .children
            .iter()
            .filter(|c| c.is("BPMNShape") || c.is("BPMNEdge"))
            .filter(|c| !c.get("bpmnElement").map_or(false, |e| known.contains(e)))
            .map(|c| {
                (
                    c.id().unwrap_or_default().to_string(),
                    c.get("bpmnElement").unwrap_or_default().to_string(),
                )
            })
            .collect();
        if dangling.is_empty() {
            return;
        }

        if let Some(plane) = self.doc.plane_mut() {
            plane.children.retain(|c| {
                !(c.is("BPMNShape") || c.is("BPMNEdge"))
                    || c.get("bpmnElement").map_or(false, |e| known.contains(e))
            });
        }
        for (id, element) in dangling {
            self.report.fixed(
                SanitizationCode::DanglingDiagramElement,
                &id,
                format!("diagram element '{}' points at missing '{}'", id, element),
                format!("removed diagram element '{}'", id),
            );
        }
    }

    // ── pass 2 ──

    fn remove_empty_references(&mut self) {
        let mut removed = Vec::new();
        for flow in self.flows() {
            let empty = match (flow.source.is_empty(), flow.target.is_empty()) {
                (true, true) => "source and target",
                (true, false) => "source",
                (false, true) => "target",
                (false, false) => continue,
            };
            self.report.fixed(
                SanitizationCode::EmptyReference,
                &flow.id,
                format!("{} '{}' has an empty {}", flow.kind.label(), flow.id, empty),
                format!("removed {} '{}' with empty {}", flow.kind.label(), flow.id, empty),
            );
            removed.push((flow, None));
        }
        self.remove_flows(removed);
    }

    // ── pass 3 ──

    fn collapse_duplicates(&mut self) {
        let mut seen: HashMap<(FlowKind, String, String), String> = HashMap::new();
        let mut removed = Vec::new();
        for flow in self.flows() {
            let key = (flow.kind, flow.source.clone(), flow.target.clone());
            match seen.get(&key) {
                Some(kept) => {
                    let kept = kept.clone();
                    self.report.fixed(
                        SanitizationCode::DuplicateFlow,
                        &flow.id,
                        format!(
                            "{} '{}' duplicates '{}' ({} -> {})",
                            flow.kind.label(),
                            flow.id,
                            kept,
                            flow.source,
                            flow.target
                        ),
                        format!("collapsed duplicate {} '{}' into '{}'", flow.kind.label(), flow.id, kept),
                    );
                    removed.push((flow, Some(kept)));
                }
                None => {
                    seen.insert(key, flow.id);
                }
            }
        }
        self.remove_flows(removed);
    }

    /// Remove flows by position, all taken from one snapshot. Node references,
    /// diagram edge and gateway defaults follow only when no surviving flow
    /// still carries the id; a default then moves to the replacement, or is
    /// dropped.
    fn remove_flows(&mut self, removed: Vec<(FlowRef, Option<String>)>) {
        if removed.is_empty() {
            return;
        }
        let mut by_position: Vec<&FlowRef> = removed.iter().map(|(flow, _)| flow).collect();
        // back to front, so earlier paths stay valid
        by_position.sort_by(|a, b| (b.kind, &b.position).cmp(&(a.kind, &a.position)));
        for flow in by_position {
            debug!(flow = %flow.id, position = ?flow.position, "removing flow");
            match flow.kind {
                FlowKind::Sequence => {
                    if let Some((p, path)) = flow.position.split_first() {
                        if let Some(process) = self.doc.processes.get_mut(*p) {
                            take_at(process, path);
                        }
                    }
                }
                FlowKind::Message => {
                    take_at(&mut self.doc.collaboration, &flow.position);
                }
            }
        }

        let surviving: HashSet<(FlowKind, String)> =
            self.flows().into_iter().map(|f| (f.kind, f.id)).collect();
        for (flow, replacement) in &removed {
            if !surviving.contains(&(flow.kind, flow.id.clone())) {
                self.detach(flow, replacement.as_deref());
            }
        }
    }

    fn detach(&mut self, flow: &FlowRef, replacement: Option<&str>) {
        let id = flow.id.as_str();
        match flow.kind {
            FlowKind::Sequence => {
                for process in &mut self.doc.processes {
                    process.retain_descendants(&mut |el| {
                        !((el.is("incoming") || el.is("outgoing")) && el.text() == id)
                    });
                    process.walk_mut(&mut |el| {
                        if el.get("default") == Some(id) {
                            match replacement {
                                Some(kept) => el.set("default", kept),
                                None => {
                                    el.remove_attr("default");
                                }
                            }
                        }
                    });
                }
            }
            FlowKind::Message => {}
        }
        if let Some(plane) = self.doc.plane_mut() {
            plane
                .children
                .retain(|c| !(c.is("BPMNEdge") && c.get("bpmnElement") == Some(id)));
        }
    }

    // ── pass 4 ──

    fn synthesize_missing_edges(&mut self) {
        let Some(plane) = self.doc.plane() else {
            return;
        };
        let mut shapes: HashMap<String, Bounds> = HashMap::new();
        let mut edged: HashSet<String> = HashSet::new();
        for child in &plane.children {
            let Some(element) = child.get("bpmnElement") else {
                continue;
            };
            if child.is("BPMNShape") {
                if let Some(bounds) = Bounds::from_shape(child) {
                    shapes.insert(element.to_string(), bounds);
                }
            } else if child.is("BPMNEdge") {
                edged.insert(element.to_string());
            }
        }

        let mut synthesized = Vec::new();
        for flow in self.flows() {
            if edged.contains(&flow.id) {
                continue;
            }
            match (shapes.get(&flow.source), shapes.get(&flow.target)) {
                (Some(s), Some(t)) => {
                    let edge = match flow.kind {
                        FlowKind::Sequence => sequence_edge(&flow.id, &flow.source, &flow.target, s, t),
                        FlowKind::Message => message_edge(&flow.id, &flow.source, &flow.target, s, t),
                    };
                    synthesized.push(edge);
                    self.report.fixed(
                        SanitizationCode::MissingEdge,
                        &flow.id,
                        format!("{} '{}' has no diagram edge", flow.kind.label(), flow.id),
                        format!("synthesized diagram edge for '{}'", flow.id),
                    );
                }
                _ => self.report.issue(
                    SanitizationCode::MissingEdge,
                    &flow.id,
                    format!(
                        "{} '{}' has no diagram edge and its endpoints have no shapes",
                        flow.kind.label(),
                        flow.id
                    ),
                ),
            }
        }
        if let Some(plane) = self.doc.plane_mut() {
            plane.children.extend(synthesized);
        }
    }

    // ── pass 5 ──

    /// Per process, over the top-level flow nodes. Event subprocesses are
    /// entered by error, not by sequence flow, so they stay out of the graph.
    fn diagnose(&mut self) {
        let mut findings = Vec::new();
        for process in &self.doc.processes {
            let nodes: Vec<&XmlElement> = process
                .children
                .iter()
                .filter(|c| is_flow_node(c) && !is_event_subprocess(c))
                .collect();
            let ids: Vec<&str> = nodes.iter().filter_map(|n| n.id()).collect();
            let edges: Vec<(&str, &str)> = process
                .children_named("sequenceFlow")
                .filter_map(|f| Some((f.get("sourceRef")?, f.get("targetRef")?)))
                .collect();
            let graph = FlowGraph::new(ids.iter().copied(), edges);

            let starts: Vec<&str> = nodes
                .iter()
                .filter(|n| n.is("startEvent"))
                .filter_map(|n| n.id())
                .collect();
            let ends: Vec<&str> = nodes
                .iter()
                .filter(|n| n.is("endEvent"))
                .filter_map(|n| n.id())
                .collect();
            let reachable = graph.reachable_from(&starts);
            let reaching = graph.reaching(&ends);

            for id in &ids {
                if graph.is_isolated(id) {
                    findings.push((
                        SanitizationCode::Isolated,
                        id.to_string(),
                        format!("'{}' has no incoming or outgoing flow", id),
                    ));
                }
                if !starts.contains(id) && !reachable.contains(*id) {
                    findings.push((
                        SanitizationCode::Unreachable,
                        id.to_string(),
                        format!("'{}' is not reachable from a start event", id),
                    ));
                }
                if !ends.contains(id) && !reaching.contains(*id) {
                    findings.push((
                        SanitizationCode::DeadEnd,
                        id.to_string(),
                        format!("'{}' has no path to an end event", id),
                    ));
                }
            }
        }
        for (code, element, message) in findings {
            self.report.issue(code, &element, message);
        }
    }
}

fn is_event_subprocess(el: &XmlElement) -> bool {
    el.is("subProcess") && el.get("triggeredByEvent") == Some("true")
}

//! Diagram geometry: shape sizes, bounds, anchors and the column layout.

use super::ids::{edge_id, shape_id};
use super::xml::XmlElement;
use crate::blueprint::LayoutHint;
use crate::config::LayoutConfig;
use std::collections::HashMap;

/// Shape family, which fixes the default size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// Start/end events (circles).
    Event,
    Gateway,
    Activity,
    /// Receiver participant box.
    Participant,
}

impl ShapeKind {
    pub fn size(&self) -> (f64, f64) {
        match self {
            ShapeKind::Event => (32.0, 32.0),
            ShapeKind::Gateway => (40.0, 40.0),
            ShapeKind::Activity => (100.0, 60.0),
            ShapeKind::Participant => (100.0, 140.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Shape of `kind` centred on `(cx, cy)`.
    pub fn centered(kind: ShapeKind, cx: f64, cy: f64) -> Self {
        let (w, h) = kind.size();
        Self::new(cx - w / 2.0, cy - h / 2.0, w, h)
    }

    pub fn right_center(&self) -> (f64, f64) {
        (self.x + self.width, self.y + self.height / 2.0)
    }

    pub fn left_center(&self) -> (f64, f64) {
        (self.x, self.y + self.height / 2.0)
    }

    pub fn bottom_center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height)
    }

    pub fn top_center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y)
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Read `dc:Bounds` from a `BPMNShape`.
    pub fn from_shape(shape: &XmlElement) -> Option<Self> {
        let b = shape.find("Bounds")?;
        let num = |key: &str| b.get(key).and_then(|v| v.trim().parse::<f64>().ok());
        Some(Self::new(num("x")?, num("y")?, num("width")?, num("height")?))
    }
}

// ── Diagram elements ──

pub fn shape(element_id: &str, bounds: Bounds) -> XmlElement {
    XmlElement::new("bpmndi:BPMNShape")
        .attr("bpmnElement", element_id)
        .attr("id", shape_id(element_id))
        .child(
            XmlElement::new("dc:Bounds")
                .attr("height", bounds.height.to_string())
                .attr("width", bounds.width.to_string())
                .attr("x", bounds.x.to_string())
                .attr("y", bounds.y.to_string()),
        )
}

fn waypoint((x, y): (f64, f64)) -> XmlElement {
    XmlElement::new("di:waypoint")
        .attr("x", x.to_string())
        .attr("xsi:type", "dc:Point")
        .attr("y", y.to_string())
}

fn edge(flow_id: &str, source_id: &str, target_id: &str, points: Vec<(f64, f64)>) -> XmlElement {
    let mut el = XmlElement::new("bpmndi:BPMNEdge")
        .attr("bpmnElement", flow_id)
        .attr("id", edge_id(flow_id))
        .attr("sourceElement", shape_id(source_id))
        .attr("targetElement", shape_id(target_id));
    for point in points {
        el.push(waypoint(point));
    }
    el
}

/// Sequence-flow edge: source right-center to target left-center, with an
/// orthogonal elbow when the two anchors sit on different rows.
pub fn sequence_edge(
    flow_id: &str,
    source_id: &str,
    target_id: &str,
    source: &Bounds,
    target: &Bounds,
) -> XmlElement {
    let from = source.right_center();
    let to = target.left_center();
    let mut points = vec![from];
    if (from.1 - to.1).abs() > 0.5 {
        let mid_x = (from.0 + to.0) / 2.0;
        points.push((mid_x, from.1));
        points.push((mid_x, to.1));
    }
    points.push(to);
    edge(flow_id, source_id, target_id, points)
}

/// Message-flow edge: activity bottom-center down to receiver top-center.
pub fn message_edge(
    flow_id: &str,
    source_id: &str,
    target_id: &str,
    source: &Bounds,
    target: &Bounds,
) -> XmlElement {
    edge(
        flow_id,
        source_id,
        target_id,
        vec![source.bottom_center(), target.top_center()],
    )
}

// ── Column layout ──

/// What the layout needs to know about one endpoint.
#[derive(Debug, Default)]
pub struct LayoutPlan {
    /// Process participant id.
    pub participant: String,
    /// Main-flow nodes in declaration order.
    pub main: Vec<PlannedNode>,
    pub subprocesses: Vec<PlannedSubprocess>,
    /// (receiver participant id, owning activity id)
    pub receivers: Vec<(String, String)>,
    /// (flow id, source id, target id)
    pub sequence_flows: Vec<(String, String, String)>,
    /// (message flow id, activity id, receiver id)
    pub message_flows: Vec<(String, String, String)>,
}

#[derive(Debug)]
pub struct PlannedNode {
    pub id: String,
    pub kind: ShapeKind,
    pub hint: Option<LayoutHint>,
}

/// Inner row: error start, members, error end.
#[derive(Debug)]
pub struct PlannedSubprocess {
    pub id: String,
    pub error_start: String,
    pub error_end: String,
    pub members: Vec<PlannedNode>,
}

/// Accumulates shapes/edges for the diagram plane and remembers bounds.
#[derive(Debug, Default)]
pub struct DiagramBuilder {
    pub shapes: Vec<XmlElement>,
    pub edges: Vec<XmlElement>,
    bounds: HashMap<String, Bounds>,
}

impl DiagramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_shape(&mut self, element_id: &str, bounds: Bounds) {
        self.shapes.push(shape(element_id, bounds));
        self.bounds.insert(element_id.to_string(), bounds);
    }

    pub fn bounds(&self, element_id: &str) -> Option<&Bounds> {
        self.bounds.get(element_id)
    }

    /// Lay out one endpoint with its top edge at `top`; returns the height consumed.
    pub fn layout_endpoint(&mut self, plan: &LayoutPlan, top: f64, cfg: &LayoutConfig) -> f64 {
        let left = cfg.origin_x;
        let column_left = |col: usize| left + cfg.pool_padding + col as f64 * cfg.column_width;
        let column_center = |col: usize| column_left(col) + ShapeKind::Activity.size().0 / 2.0;

        // Node shapes first; the pool shape is sized from them and goes first
        // in the plane, so buffer these.
        let mut node_shapes: Vec<(String, Bounds)> = Vec::new();

        let main_cy = top + cfg.lane_height / 2.0;
        for (col, node) in plan.main.iter().enumerate() {
            let bounds = match node.hint {
                Some(hint) => {
                    let (w, h) = node.kind.size();
                    Bounds::new(hint.x, hint.y, w, h)
                }
                None => Bounds::centered(node.kind, column_center(col), main_cy),
            };
            node_shapes.push((node.id.clone(), bounds));
        }
        let mut width_cols = plan.main.len();

        let sub_box_height = cfg.subprocess_height - cfg.pool_padding / 2.0;
        let sub_top = top + cfg.lane_height;
        let mut sub_left = column_left(0);
        for sub in &plan.subprocesses {
            let inner_cols = sub.members.len() + 2;
            let box_width = inner_cols as f64 * cfg.column_width;
            let sub_bounds = Bounds::new(sub_left, sub_top, box_width, sub_box_height);
            node_shapes.push((sub.id.clone(), sub_bounds));

            let inner_cy = sub_top + sub_box_height / 2.0;
            let inner_center =
                |col: usize| sub_left + col as f64 * cfg.column_width + cfg.column_width / 2.0;
            node_shapes.push((
                sub.error_start.clone(),
                Bounds::centered(ShapeKind::Event, inner_center(0), inner_cy),
            ));
            for (i, member) in sub.members.iter().enumerate() {
                node_shapes.push((
                    member.id.clone(),
                    Bounds::centered(member.kind, inner_center(i + 1), inner_cy),
                ));
            }
            node_shapes.push((
                sub.error_end.clone(),
                Bounds::centered(ShapeKind::Event, inner_center(inner_cols - 1), inner_cy),
            ));
            sub_left += box_width + cfg.pool_padding;
        }
        let sub_extent = sub_left - column_left(0);

        width_cols = width_cols.max(1);
        let main_extent = width_cols as f64 * cfg.column_width;
        let pool_width = main_extent.max(sub_extent) + 2.0 * cfg.pool_padding;
        let pool_height = if plan.subprocesses.is_empty() {
            cfg.lane_height
        } else {
            cfg.lane_height + cfg.subprocess_height
        };
        let pool = Bounds::new(left, top, pool_width, pool_height);
        self.add_shape(&plan.participant, pool);
        for (id, bounds) in node_shapes {
            self.add_shape(&id, bounds);
        }

        // Receivers hang below the pool under their activity.
        let receiver_top = pool.bottom() + cfg.receiver_gap;
        for (receiver, owner) in &plan.receivers {
            let cx = self
                .bounds(owner)
                .map(|b| b.bottom_center().0)
                .unwrap_or(left + pool_width / 2.0);
            let (w, h) = ShapeKind::Participant.size();
            self.add_shape(receiver, Bounds::new(cx - w / 2.0, receiver_top, w, h));
        }

        for (flow, source, target) in &plan.sequence_flows {
            if let (Some(s), Some(t)) = (self.bounds(source), self.bounds(target)) {
                let el = sequence_edge(flow, source, target, s, t);
                self.edges.push(el);
            }
        }
        for (flow, activity, receiver) in &plan.message_flows {
            if let (Some(s), Some(t)) = (self.bounds(activity), self.bounds(receiver)) {
                let el = message_edge(flow, activity, receiver, s, t);
                self.edges.push(el);
            }
        }

        let mut height = pool_height;
        if !plan.receivers.is_empty() {
            height += cfg.receiver_gap + ShapeKind::Participant.size().1;
        }
        height + cfg.endpoint_gap
    }

    /// The `bpmndi:BPMNDiagram` section: shapes first, then edges.
    pub fn into_diagram(self, collaboration_id: &str) -> XmlElement {
        let mut plane = XmlElement::new("bpmndi:BPMNPlane")
            .attr("bpmnElement", collaboration_id)
            .attr("id", "BPMNPlane_1");
        plane.children.extend(self.shapes);
        plane.children.extend(self.edges);
        XmlElement::new("bpmndi:BPMNDiagram")
            .attr("id", "BPMNDiagram_1")
            .attr("name", "Default Collaboration Diagram")
            .child(plane)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, kind: ShapeKind) -> PlannedNode {
        PlannedNode {
            id: id.to_string(),
            kind,
            hint: None,
        }
    }

    #[test]
    fn test_anchors() {
        let b = Bounds::new(100.0, 100.0, 100.0, 60.0);
        assert_eq!(b.right_center(), (200.0, 130.0));
        assert_eq!(b.left_center(), (100.0, 130.0));
        assert_eq!(b.bottom_center(), (150.0, 160.0));
        assert_eq!(b.top_center(), (150.0, 100.0));
    }

    #[test]
    fn test_bounds_from_shape() {
        let el = shape("cm1", Bounds::new(250.0, 170.0, 100.0, 60.0));
        assert_eq!(el.get("id"), Some("BPMNShape_cm1"));
        assert_eq!(
            Bounds::from_shape(&el),
            Some(Bounds::new(250.0, 170.0, 100.0, 60.0))
        );
    }

    #[test]
    fn test_sequence_edge_same_row_is_straight() {
        let s = Bounds::centered(ShapeKind::Event, 200.0, 200.0);
        let t = Bounds::centered(ShapeKind::Activity, 350.0, 200.0);
        let el = sequence_edge("f1", "s", "t", &s, &t);
        let points = el.children_named("waypoint").count();
        assert_eq!(points, 2);
        assert_eq!(el.get("sourceElement"), Some("BPMNShape_s"));
        let first = el.find("waypoint").unwrap();
        assert_eq!(first.get("x"), Some("216"));
        assert_eq!(first.get("xsi:type"), Some("dc:Point"));
    }

    #[test]
    fn test_layout_columns_and_receivers() {
        let plan = LayoutPlan {
            participant: "Participant_1".to_string(),
            main: vec![
                node("start", ShapeKind::Event),
                node("call", ShapeKind::Activity),
                node("end", ShapeKind::Event),
            ],
            receivers: vec![("Participant_2".to_string(), "call".to_string())],
            sequence_flows: vec![
                ("f1".into(), "start".into(), "call".into()),
                ("f2".into(), "call".into(), "end".into()),
            ],
            message_flows: vec![("MessageFlow_1".into(), "call".into(), "Participant_2".into())],
            ..Default::default()
        };
        let mut diagram = DiagramBuilder::new();
        diagram.layout_endpoint(&plan, 100.0, &LayoutConfig::default());
        assert_eq!(diagram.shapes.len(), 5);
        assert_eq!(diagram.edges.len(), 3);

        let start = diagram.bounds("start").unwrap();
        let call = diagram.bounds("call").unwrap();
        let end = diagram.bounds("end").unwrap();
        assert!(start.x < call.x && call.x < end.x);
        let receiver = diagram.bounds("Participant_2").unwrap();
        let pool = diagram.bounds("Participant_1").unwrap();
        assert!(receiver.y > pool.bottom());
        assert_eq!(receiver.top_center().0, call.bottom_center().0);
    }

    #[test]
    fn test_subprocess_inner_row() {
        let plan = LayoutPlan {
            participant: "P".to_string(),
            main: vec![node("start", ShapeKind::Event)],
            subprocesses: vec![PlannedSubprocess {
                id: "ex".to_string(),
                error_start: "ex_ErrorStart".to_string(),
                error_end: "ex_ErrorEnd".to_string(),
                members: vec![node("log", ShapeKind::Activity)],
            }],
            ..Default::default()
        };
        let mut diagram = DiagramBuilder::new();
        diagram.layout_endpoint(&plan, 0.0, &LayoutConfig::default());
        let sub = *diagram.bounds("ex").unwrap();
        for inner in ["ex_ErrorStart", "log", "ex_ErrorEnd"] {
            let b = diagram.bounds(inner).unwrap();
            assert!(b.x >= sub.x && b.right() <= sub.right(), "{} outside box", inner);
        }
        let pool = diagram.bounds("P").unwrap();
        assert!(sub.bottom() <= pool.bottom());
    }
}

//! The flow graph core: raw extraction → typed graph → validated graph → document.
//!
//! ## Data Flow
//!
//! ```text
//! RawExtraction ──▶ builder ──▶ FlowGraph ──▶ validator ──▶ render ──▶ OutputDocument
//!  (untyped)       (classify,   (arena of     (invariants,  (BFS from
//!                   ids, dedup)  nodes+edges)  fixed order)  Start)
//! ```
//!
//! The graph is an arena: nodes and edges live in two id-keyed maps and refer
//! to each other by id only, so loops back to an earlier step need no shared
//! ownership. Insertion order is recorded separately and is the only order
//! anything observable depends on.

pub mod builder;
pub mod classify;
pub mod ids;
pub mod raw;
pub mod render;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use builder::build;
pub use raw::{BoundingBox, RawConnector, RawExtraction, RawShape};
pub use render::render;
pub use validator::validate;

/// Semantic kind of a flow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    End,
    Action,
    Decision,
    Terminator,
    /// Only produced when deserializing a graph with a kind this version
    /// does not know. The builder never creates it.
    #[serde(other)]
    Unrecognized,
}

impl NodeKind {
    /// Short tag used as the id prefix and the output `type`.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::Action => "action",
            NodeKind::Decision => "decision",
            NodeKind::Terminator => "terminator",
            NodeKind::Unrecognized => "unrecognized",
        }
    }

    /// End and Terminator nodes end the flow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeKind::End | NodeKind::Terminator)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A step in the flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Outgoing edge ids in insertion order.
    #[serde(default)]
    pub outgoing: Vec<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            description: None,
            actor: None,
            outgoing: Vec::new(),
        }
    }
}

/// A directed transition between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        label: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            label,
        }
    }

    /// Label compared case-insensitively with whitespace collapsed.
    pub fn label_key(&self) -> Option<String> {
        self.label.as_deref().map(label_key).filter(|k| !k.is_empty())
    }
}

/// Collapse internal whitespace and trim.
pub fn normalise_label(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison key for branch labels.
pub fn label_key(text: &str) -> String {
    normalise_label(text).to_lowercase()
}

/// Non-fatal repairs the builder made while constructing a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum BuildWarning {
    /// A connector repeated an earlier (source, target, label) triple.
    DuplicateConnector {
        source: String,
        target: String,
        label: Option<String>,
    },
    /// A shape with no connectors at all was dropped.
    OrphanShapeDropped { shape: String, label: String },
    /// A note, legend or title was dropped.
    DecorationDropped { shape: String, label: String },
    /// A connector touching a dropped decoration was dropped.
    DecorationConnectorDropped { source: String, target: String },
    /// A decision branch label was taken from the connector's nearby caption.
    BranchLabelInferred {
        node_id: String,
        target: String,
        label: String,
    },
    /// A second start-like shape lost the start designation.
    StartCandidateDemoted { node_id: String, kind: NodeKind },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::DuplicateConnector {
                source,
                target,
                label,
            } => write!(
                f,
                "duplicate connector {source} -> {target} ({}) ignored",
                label.as_deref().unwrap_or("unlabeled")
            ),
            BuildWarning::OrphanShapeDropped { shape, label } => {
                write!(f, "orphan shape '{shape}' ({label:?}) dropped")
            }
            BuildWarning::DecorationDropped { shape, label } => {
                write!(f, "decoration '{shape}' ({label:?}) dropped")
            }
            BuildWarning::DecorationConnectorDropped { source, target } => {
                write!(f, "connector {source} -> {target} touches a decoration, dropped")
            }
            BuildWarning::BranchLabelInferred {
                node_id,
                target,
                label,
            } => write!(f, "branch {node_id} -> {target} labeled {label:?} from nearby caption"),
            BuildWarning::StartCandidateDemoted { node_id, kind } => {
                write!(f, "extra start candidate '{node_id}' demoted to {kind}")
            }
        }
    }
}

/// The typed flow: two id-keyed maps plus the designated start node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    start: String,
    nodes: BTreeMap<String, Node>,
    edges: BTreeMap<String, Edge>,
    node_order: Vec<String>,
    edge_order: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<BuildWarning>,
}

impl FlowGraph {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            node_order: Vec::new(),
            edge_order: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Designated start node id.
    pub fn start(&self) -> &str {
        &self.start
    }

    /// Insert a node. Re-inserting an id replaces it in place.
    pub fn insert_node(&mut self, node: Node) {
        if !self.nodes.contains_key(&node.id) {
            self.node_order.push(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
    }

    /// Insert an edge and append it to its source's outgoing list.
    pub fn insert_edge(&mut self, edge: Edge) {
        if let Some(source) = self.nodes.get_mut(&edge.source) {
            if !source.outgoing.contains(&edge.id) {
                source.outgoing.push(edge.id.clone());
            }
        }
        if !self.edges.contains_key(&edge.id) {
            self.edge_order.push(edge.id.clone());
        }
        self.edges.insert(edge.id.clone(), edge);
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.node_order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edge_order.iter().filter_map(|id| self.edges.get(id))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Outgoing edges of `node_id` in insertion order. Unknown ids are skipped.
    pub fn outgoing(&self, node_id: &str) -> Vec<&Edge> {
        self.nodes
            .get(node_id)
            .map(|n| n.outgoing.iter().filter_map(|e| self.edges.get(e)).collect())
            .unwrap_or_default()
    }

    /// Number of edges targeting `node_id`.
    pub fn incoming_count(&self, node_id: &str) -> usize {
        self.edges.values().filter(|e| e.target == node_id).count()
    }

    pub fn warnings(&self) -> &[BuildWarning] {
        &self.warnings
    }

    pub(crate) fn push_warning(&mut self, warning: BuildWarning) {
        self.warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> FlowGraph {
        let mut g = FlowGraph::new("start");
        g.insert_node(Node::new("start", NodeKind::Start, "Start"));
        g.insert_node(Node::new("end", NodeKind::End, "End"));
        g.insert_edge(Edge::new("start->end", "start", "end", None));
        g
    }

    #[test]
    fn insert_edge_tracks_outgoing() {
        let g = tiny();
        assert_eq!(g.node("start").unwrap().outgoing, vec!["start->end"]);
        assert_eq!(g.outgoing("start").len(), 1);
        assert_eq!(g.incoming_count("end"), 1);
        assert_eq!(g.incoming_count("start"), 0);
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut g = FlowGraph::new("z");
        g.insert_node(Node::new("z", NodeKind::Start, ""));
        g.insert_node(Node::new("a", NodeKind::End, ""));
        let ids: Vec<&str> = g.nodes().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a"]);
    }

    #[test]
    fn graph_serde_roundtrip_keeps_order() {
        let g = tiny();
        let json = serde_json::to_string(&g).unwrap();
        let back: FlowGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn unknown_kind_deserialises_as_unrecognized() {
        let node: Node =
            serde_json::from_str(r#"{"id":"x","kind":"swimlane","label":"X"}"#).unwrap();
        assert_eq!(node.kind, NodeKind::Unrecognized);
    }

    #[test]
    fn label_keys_ignore_case_and_spacing() {
        assert_eq!(label_key("  Yes  "), "yes");
        assert_eq!(label_key("Not   now"), "not now");
        let e = Edge::new("e", "a", "b", Some("   ".into()));
        assert_eq!(e.label_key(), None);
    }

    #[test]
    fn warning_display() {
        let w = BuildWarning::DuplicateConnector {
            source: "a".into(),
            target: "b".into(),
            label: Some("Yes".into()),
        };
        assert!(w.to_string().contains("duplicate connector a -> b (Yes)"));
    }
}

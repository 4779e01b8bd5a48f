//! Output types: the rendered document plus run statistics.
//!
//! ## Document schema
//!
//! ```json
//! {
//!   "steps": [
//!     { "id": "start", "type": "start", "label": "Start",
//!       "next": { "next": "decision-valid" } },
//!     { "id": "decision-valid", "type": "decision", "label": "Valid?",
//!       "next": { "Yes": "action-approve", "No": "action-reject" } },
//!     { "id": "end", "type": "end", "label": "End", "next": {} }
//!   ]
//! }
//! ```
//!
//! Branch mappings are JSON objects whose key order is the edge insertion
//! order; [`Branches`] keeps that order through serialization and parsing.

use crate::graph::{FlowGraph, NodeKind, RawExtraction};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Key used for the single implicit transition of non-decision steps.
pub const NEXT_KEY: &str = "next";

/// The `type` tag of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Start,
    End,
    Action,
    Decision,
    Terminator,
}

impl StepType {
    /// Map a node kind; `None` for kinds the schema has no tag for.
    pub fn from_kind(kind: NodeKind) -> Option<Self> {
        match kind {
            NodeKind::Start => Some(StepType::Start),
            NodeKind::End => Some(StepType::End),
            NodeKind::Action => Some(StepType::Action),
            NodeKind::Decision => Some(StepType::Decision),
            NodeKind::Terminator => Some(StepType::Terminator),
            NodeKind::Unrecognized => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepType::End | StepType::Terminator)
    }
}

/// Ordered branch-label → step-id mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Branches(Vec<(String, String)>);

impl Branches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a branch. A repeated label replaces the earlier target in place.
    pub fn insert(&mut self, label: impl Into<String>, target: impl Into<String>) {
        let label = label.into();
        let target = target.into();
        match self.0.iter_mut().find(|(l, _)| *l == label) {
            Some(slot) => slot.1 = target,
            None => self.0.push((label, target)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, t)| t.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(l, t)| (l.as_str(), t.as_str()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(l, _)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Branches {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, target) in &self.0 {
            map.serialize_entry(label, target)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Branches {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BranchesVisitor;

        impl<'de> Visitor<'de> for BranchesVisitor {
            type Value = Branches;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of branch label to step id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Branches, A::Error> {
                let mut branches = Branches(Vec::with_capacity(access.size_hint().unwrap_or(0)));
                while let Some((label, target)) = access.next_entry::<String, String>()? {
                    branches.insert(label, target);
                }
                Ok(branches)
            }
        }

        deserializer.deserialize_map(BranchesVisitor)
    }
}

/// One step object of the output document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Branch label → next step id. Empty for terminal steps.
    #[serde(default)]
    pub next: Branches,
}

/// The rendered flow: steps in breadth-first order from the start step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputDocument {
    pub steps: Vec<Step>,
}

impl OutputDocument {
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Total number of transitions across all steps.
    pub fn transition_count(&self) -> usize {
        self.steps.iter().map(|s| s.next.len()).sum()
    }

    /// Serialize, with a trailing newline when pretty-printed.
    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            let mut text = serde_json::to_string_pretty(self)?;
            text.push('\n');
            Ok(text)
        } else {
            serde_json::to_string(self)
        }
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Counts and timings for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Shapes in the raw extraction.
    pub shape_count: usize,
    /// Connectors in the raw extraction.
    pub connector_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub step_count: usize,
    /// Orphan and decoration shapes dropped by the builder.
    pub dropped_shapes: usize,
    pub duplicate_connectors: usize,
    /// Decision branch labels taken from nearby captions.
    pub inferred_labels: usize,
    /// Zero when the raw extraction was loaded rather than extracted.
    pub extraction_ms: u64,
    pub build_ms: u64,
    pub validate_ms: u64,
    pub render_ms: u64,
    pub total_ms: u64,
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub document: OutputDocument,
    /// The validated graph the document was rendered from.
    pub graph: FlowGraph,
    /// The extraction the graph was built from.
    pub raw: RawExtraction,
    pub stats: PipelineStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OutputDocument {
        let mut next = Branches::new();
        next.insert("Yes", "action-approve");
        next.insert("No", "action-reject");
        OutputDocument {
            steps: vec![Step {
                id: "decision-valid".into(),
                step_type: StepType::Decision,
                label: "Valid?".into(),
                description: None,
                actor: None,
                next,
            }],
        }
    }

    #[test]
    fn branches_keep_insertion_order() {
        let json = sample().to_json(false).unwrap();
        assert!(json.contains(r#""next":{"Yes":"action-approve","No":"action-reject"}"#));
        assert!(json.contains(r#""type":"decision""#));
        assert!(!json.contains("description"));
    }

    #[test]
    fn parse_back_preserves_order() {
        let doc = sample();
        let back = OutputDocument::from_json(&doc.to_json(true).unwrap()).unwrap();
        assert_eq!(back, doc);
        let labels: Vec<&str> = back.steps[0].next.labels().collect();
        assert_eq!(labels, vec!["Yes", "No"]);
    }

    #[test]
    fn pretty_output_ends_with_newline() {
        assert!(sample().to_json(true).unwrap().ends_with("}\n"));
    }

    #[test]
    fn missing_next_defaults_to_empty() {
        let doc = OutputDocument::from_json(
            r#"{"steps":[{"id":"end","type":"end","label":"End"}]}"#,
        )
        .unwrap();
        assert!(doc.steps[0].next.is_empty());
        assert!(doc.steps[0].step_type.is_terminal());
    }

    #[test]
    fn branch_insert_replaces_same_label() {
        let mut b = Branches::new();
        b.insert("next", "a");
        b.insert("next", "b");
        assert_eq!(b.len(), 1);
        assert_eq!(b.get("next"), Some("b"));
    }

    #[test]
    fn transition_count_sums_branches() {
        assert_eq!(sample().transition_count(), 2);
        assert_eq!(OutputDocument::default().transition_count(), 0);
    }
}

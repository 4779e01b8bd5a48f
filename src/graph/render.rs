//! JsonRenderer: validated [`FlowGraph`] → [`OutputDocument`].
//!
//! Steps come out breadth-first from Start, following each node's outgoing
//! edges in insertion order. Decision steps key their branches by edge label;
//! every other step uses the implicit `"next"` key (`"next_2"`, … if an action
//! fans out). Terminal steps get an empty mapping.

use super::{FlowGraph, Node, NodeKind};
use crate::error::FlowError;
use crate::output::{Branches, OutputDocument, Step, StepType, NEXT_KEY};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Render a graph. Call [`super::validate`] first; rendering an invalid graph
/// is not an error but the document will carry the same defects.
pub fn render(graph: &FlowGraph) -> Result<OutputDocument, FlowError> {
    let mut steps = Vec::with_capacity(graph.node_count());
    for node in traversal_order(graph) {
        steps.push(render_step(graph, node)?);
    }
    debug!("Rendered {} steps", steps.len());
    Ok(OutputDocument { steps })
}

/// BFS from Start; anything left over follows in insertion order so every
/// node yields exactly one step.
fn traversal_order(graph: &FlowGraph) -> Vec<&Node> {
    let mut order = Vec::with_capacity(graph.node_count());
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    if graph.node(graph.start()).is_some() {
        visited.insert(graph.start());
        queue.push_back(graph.start());
    }
    while let Some(id) = queue.pop_front() {
        let Some(node) = graph.node(id) else { continue };
        order.push(node);
        for edge in graph.outgoing(id) {
            if graph.node(&edge.target).is_some() && visited.insert(edge.target.as_str()) {
                queue.push_back(edge.target.as_str());
            }
        }
    }
    order.extend(graph.nodes().filter(|n| !visited.contains(n.id.as_str())));
    order
}

fn render_step(graph: &FlowGraph, node: &Node) -> Result<Step, FlowError> {
    let step_type = StepType::from_kind(node.kind).ok_or_else(|| {
        FlowError::UnsupportedNodeKind {
            node_id: node.id.clone(),
            kind: node.kind.to_string(),
        }
    })?;

    let mut next = Branches::new();
    if !step_type.is_terminal() {
        for (i, edge) in graph.outgoing(&node.id).into_iter().enumerate() {
            let key = match (&node.kind, &edge.label) {
                (NodeKind::Decision, Some(label)) => label.clone(),
                _ if i == 0 => NEXT_KEY.to_string(),
                _ => format!("{NEXT_KEY}_{}", i + 1),
            };
            next.insert(key, edge.target.clone());
        }
    }

    Ok(Step {
        id: node.id.clone(),
        step_type,
        label: node.label.clone(),
        description: node.description.clone(),
        actor: node.actor.clone(),
        next,
    })
}

//! GraphValidator: structural invariants checked before anything is rendered.
//!
//! Checks run in a fixed order and stop at the first violation, so the same
//! broken graph always yields the same diagnostic:
//!
//! 1. exactly one Start, with no incoming edge
//! 2. every edge endpoint exists
//! 3. every node is reachable from Start
//! 4. every Decision has ≥ 2 uniquely labeled branches
//! 5. no self-loops
//! 6. terminal nodes have no outgoing edges, all other nodes have one

use super::{FlowGraph, NodeKind};
use crate::error::{FlowError, InvariantKind};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Check every invariant, failing on the first violation.
pub fn validate(graph: &FlowGraph) -> Result<(), FlowError> {
    check_start(graph)?;
    check_endpoints(graph)?;
    check_reachability(graph)?;
    check_decisions(graph)?;
    check_self_loops(graph)?;
    check_terminals(graph)?;
    debug!(
        "Graph valid: {} nodes, {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    Ok(())
}

fn violation(kind: InvariantKind, element_id: &str) -> FlowError {
    FlowError::GraphInvariant {
        kind,
        element_id: element_id.to_string(),
    }
}

fn check_start(graph: &FlowGraph) -> Result<(), FlowError> {
    let starts: Vec<&str> = graph
        .nodes()
        .filter(|n| n.kind == NodeKind::Start)
        .map(|n| n.id.as_str())
        .collect();

    let designated = graph.node(graph.start());
    if starts.is_empty() || !designated.is_some_and(|n| n.kind == NodeKind::Start) {
        return Err(violation(InvariantKind::MissingStart, graph.start()));
    }
    if let Some(extra) = starts.iter().find(|&&id| id != graph.start()) {
        return Err(violation(InvariantKind::MultipleStarts, extra));
    }
    if let Some(edge) = graph.edges().find(|e| e.target == graph.start()) {
        return Err(violation(InvariantKind::StartHasIncoming, &edge.id));
    }
    Ok(())
}

fn check_endpoints(graph: &FlowGraph) -> Result<(), FlowError> {
    for edge in graph.edges() {
        if graph.node(&edge.source).is_none() || graph.node(&edge.target).is_none() {
            return Err(violation(InvariantKind::DanglingEdge, &edge.id));
        }
    }
    for node in graph.nodes() {
        if let Some(missing) = node.outgoing.iter().find(|id| graph.edge(id).is_none()) {
            return Err(violation(InvariantKind::DanglingEdge, missing));
        }
    }
    Ok(())
}

fn check_reachability(graph: &FlowGraph) -> Result<(), FlowError> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    visited.insert(graph.start());
    queue.push_back(graph.start());

    while let Some(id) = queue.pop_front() {
        for edge in graph.outgoing(id) {
            if visited.insert(edge.target.as_str()) {
                queue.push_back(edge.target.as_str());
            }
        }
    }

    match graph.nodes().find(|n| !visited.contains(n.id.as_str())) {
        Some(node) => Err(violation(InvariantKind::Unreachable, &node.id)),
        None => Ok(()),
    }
}

fn check_decisions(graph: &FlowGraph) -> Result<(), FlowError> {
    for node in graph.nodes().filter(|n| n.kind == NodeKind::Decision) {
        let branches = graph.outgoing(&node.id);
        if branches.len() < 2 {
            return Err(violation(InvariantKind::TooFewBranches, &node.id));
        }
        let mut labels = HashSet::new();
        for edge in branches {
            let Some(key) = edge.label_key() else {
                return Err(violation(InvariantKind::MissingBranchLabel, &edge.id));
            };
            if !labels.insert(key) {
                return Err(violation(InvariantKind::DuplicateBranchLabel, &edge.id));
            }
        }
    }
    Ok(())
}

fn check_self_loops(graph: &FlowGraph) -> Result<(), FlowError> {
    match graph.edges().find(|e| e.source == e.target) {
        Some(edge) => Err(violation(InvariantKind::SelfLoop, &edge.id)),
        None => Ok(()),
    }
}

fn check_terminals(graph: &FlowGraph) -> Result<(), FlowError> {
    if let Some(node) = graph
        .nodes()
        .find(|n| n.kind.is_terminal() && !n.outgoing.is_empty())
    {
        return Err(violation(InvariantKind::TerminalHasOutgoing, &node.id));
    }
    if let Some(node) = graph
        .nodes()
        .find(|n| !n.kind.is_terminal() && n.outgoing.is_empty())
    {
        return Err(violation(InvariantKind::DeadEnd, &node.id));
    }
    Ok(())
}

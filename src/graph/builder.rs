//! GraphBuilder: turn a [`RawExtraction`] into a typed [`FlowGraph`].
//!
//! ## Steps
//!
//! 1. Order shapes by reading order (top-to-bottom, then left-to-right).
//! 2. Classify each shape; drop decorations and the connectors touching them.
//! 3. Fail on any connected shape that could not be classified.
//! 4. Designate exactly one start shape, demote other start candidates.
//! 5. Drop orphan shapes (no connectors, not the start).
//! 6. Allocate content-derived node ids in reading order.
//! 7. Turn connectors into edges: resolve branch labels, skip duplicates.
//!
//! The builder repairs what it safely can and records each repair as a
//! [`BuildWarning`]. Defects it cannot judge locally (dangling endpoints,
//! unreachable islands, duplicate branch labels) are carried into the graph
//! for [`super::validate`] to report.

use super::classify::{classify, Ambiguity, ShapeClass};
use super::ids::{edge_base, node_base, IdAllocator};
use super::raw::{RawConnector, RawExtraction, RawShape};
use super::{label_key, normalise_label, BuildWarning, Edge, FlowGraph, Node, NodeKind};
use crate::error::FlowError;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Prefix for edge endpoints that reference a shape the extraction lacks.
pub const UNRESOLVED_PREFIX: &str = "unresolved:";

/// Build a flow graph from a raw extraction.
///
/// # Errors
/// - [`FlowError::ExtractionIncomplete`] when there are no shapes
/// - [`FlowError::AmbiguousShape`] when a connected shape cannot be classified,
///   a shape reference is duplicated, or no start-like shape exists
/// - [`FlowError::UnlabeledBranch`] when a decision connector has neither a
///   label nor a nearby caption
pub fn build(raw: &RawExtraction) -> Result<FlowGraph, FlowError> {
    if raw.shapes.is_empty() {
        return Err(FlowError::ExtractionIncomplete);
    }
    let graph = GraphBuilder::new(raw)?.run()?;
    info!(
        "Built flow graph: {} nodes, {} edges, {} warning(s)",
        graph.node_count(),
        graph.edge_count(),
        graph.warnings().len()
    );
    Ok(graph)
}

/// Per-shape working state, indexed like `raw.shapes`.
struct ShapeInfo<'a> {
    shape: &'a RawShape,
    label: String,
    class: Result<ShapeClass, Ambiguity>,
    incoming: usize,
    outgoing: usize,
}

impl ShapeInfo<'_> {
    fn connected(&self) -> bool {
        self.incoming > 0 || self.outgoing > 0
    }

    fn is_decoration(&self) -> bool {
        matches!(self.class, Ok(ShapeClass::Decoration))
    }

    /// Explicit start shapes, and terminal symbols nothing points into.
    fn is_start_candidate(&self) -> bool {
        match self.class {
            Ok(ShapeClass::Node(NodeKind::Start)) => true,
            Ok(ShapeClass::Terminal) => self.incoming == 0,
            _ => false,
        }
    }
}

struct GraphBuilder<'a> {
    raw: &'a RawExtraction,
    /// Shape indices in reading order.
    order: Vec<usize>,
    shapes: Vec<ShapeInfo<'a>>,
    /// Connectors that survive decoration removal, in extraction order.
    connectors: Vec<&'a RawConnector>,
    warnings: Vec<BuildWarning>,
}

impl<'a> GraphBuilder<'a> {
    fn new(raw: &'a RawExtraction) -> Result<Self, FlowError> {
        let mut seen = HashSet::new();
        for shape in &raw.shapes {
            if !seen.insert(shape.id.as_str()) {
                return Err(FlowError::AmbiguousShape {
                    shape: shape.id.clone(),
                    reason: "shape reference is used by more than one shape".into(),
                });
            }
        }

        let mut order: Vec<usize> = (0..raw.shapes.len()).collect();
        order.sort_by(|&a, &b| {
            raw.shapes[a]
                .bbox
                .reading_order(&raw.shapes[b].bbox)
                .then(a.cmp(&b))
        });

        let shapes = raw
            .shapes
            .iter()
            .map(|shape| {
                let label = normalise_label(&shape.label);
                let class = classify(&shape.kind, &label);
                ShapeInfo {
                    shape,
                    label,
                    class,
                    incoming: 0,
                    outgoing: 0,
                }
            })
            .collect();

        Ok(Self {
            raw,
            order,
            shapes,
            connectors: Vec::new(),
            warnings: Vec::new(),
        })
    }

    fn warn(&mut self, warning: BuildWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    fn run(mut self) -> Result<FlowGraph, FlowError> {
        let raw = self.raw;
        let index: HashMap<&str, usize> = raw
            .shapes
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        self.drop_decorations(&index);
        self.count_connectivity(&index);
        self.reject_ambiguous()?;
        let start = self.designate_start()?;
        let (kinds, demoted) = self.resolve_kinds(start);
        let (mut graph, node_ids) = self.place_nodes(start, &kinds, &demoted);
        self.place_edges(&mut graph, &index, &node_ids)?;

        for warning in self.warnings {
            graph.push_warning(warning);
        }
        Ok(graph)
    }

    fn drop_decorations(&mut self, index: &HashMap<&str, usize>) {
        let decorations: Vec<usize> = self
            .order
            .iter()
            .copied()
            .filter(|&i| self.shapes[i].is_decoration())
            .collect();
        for &i in &decorations {
            let warning = BuildWarning::DecorationDropped {
                shape: self.shapes[i].shape.id.clone(),
                label: self.shapes[i].label.clone(),
            };
            self.warn(warning);
        }

        let touches_decoration = |id: &str| {
            index
                .get(id)
                .is_some_and(|&i| decorations.contains(&i))
        };
        let raw = self.raw;
        for connector in &raw.connectors {
            if touches_decoration(&connector.source) || touches_decoration(&connector.target) {
                self.warn(BuildWarning::DecorationConnectorDropped {
                    source: connector.source.clone(),
                    target: connector.target.clone(),
                });
            } else {
                self.connectors.push(connector);
            }
        }
    }

    fn count_connectivity(&mut self, index: &HashMap<&str, usize>) {
        for connector in &self.connectors {
            if let Some(&i) = index.get(connector.source.as_str()) {
                self.shapes[i].outgoing += 1;
            }
            if let Some(&i) = index.get(connector.target.as_str()) {
                self.shapes[i].incoming += 1;
            }
        }
    }

    /// A connected shape that cannot be classified aborts the build.
    /// Unconnected ones are decoration-like and get dropped as orphans later.
    fn reject_ambiguous(&self) -> Result<(), FlowError> {
        for &i in &self.order {
            let info = &self.shapes[i];
            if let Err(Ambiguity(reason)) = &info.class {
                if info.connected() {
                    return Err(FlowError::AmbiguousShape {
                        shape: info.shape.id.clone(),
                        reason: (*reason).to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Pick the start shape. Preference, each tier in reading order:
    /// candidates with no incoming but some outgoing connectors, then
    /// candidates with no incoming connectors, then any candidate.
    fn designate_start(&self) -> Result<usize, FlowError> {
        let candidates: Vec<usize> = self
            .order
            .iter()
            .copied()
            .filter(|&i| self.shapes[i].is_start_candidate())
            .collect();

        let entry = candidates
            .iter()
            .copied()
            .find(|&i| self.shapes[i].incoming == 0 && self.shapes[i].outgoing > 0)
            .or_else(|| {
                candidates
                    .iter()
                    .copied()
                    .find(|&i| self.shapes[i].incoming == 0)
            })
            .or_else(|| candidates.first().copied());

        match entry {
            Some(i) => {
                debug!(
                    "Start designated: shape '{}' ({} candidate(s))",
                    self.shapes[i].shape.id,
                    candidates.len()
                );
                Ok(i)
            }
            None => Err(FlowError::AmbiguousShape {
                shape: "(none)".into(),
                reason: "no start-like shape present".into(),
            }),
        }
    }

    /// Final node kind per shape; `None` for shapes that do not become nodes.
    /// Also returns the start candidates that lost the designation.
    fn resolve_kinds(&mut self, start: usize) -> (Vec<Option<NodeKind>>, Vec<usize>) {
        let mut kinds = vec![None; self.shapes.len()];
        let mut demoted = Vec::new();
        let mut orphans = Vec::new();

        for &i in &self.order {
            let info = &self.shapes[i];
            if info.is_decoration() {
                continue;
            }
            if i == start {
                kinds[i] = Some(NodeKind::Start);
                continue;
            }
            if !info.connected() {
                orphans.push(i);
                continue;
            }
            let kind = match info.class {
                Ok(ShapeClass::Node(NodeKind::Start)) => {
                    demoted.push(i);
                    if info.outgoing == 0 {
                        NodeKind::Terminator
                    } else {
                        NodeKind::Action
                    }
                }
                Ok(ShapeClass::Terminal) => {
                    if info.incoming == 0 {
                        demoted.push(i);
                    }
                    NodeKind::Terminator
                }
                // An end-worded box that still leads somewhere is a step.
                Ok(ShapeClass::Node(NodeKind::Terminator)) if info.outgoing > 0 => {
                    NodeKind::Action
                }
                Ok(ShapeClass::Node(kind)) => kind,
                // Connected ambiguous shapes were rejected already.
                Ok(ShapeClass::Decoration) | Err(_) => continue,
            };
            kinds[i] = Some(kind);
        }

        for i in orphans {
            let warning = BuildWarning::OrphanShapeDropped {
                shape: self.shapes[i].shape.id.clone(),
                label: self.shapes[i].label.clone(),
            };
            self.warn(warning);
        }
        (kinds, demoted)
    }

    /// Allocate ids in reading order and insert the nodes.
    fn place_nodes(
        &mut self,
        start: usize,
        kinds: &[Option<NodeKind>],
        demoted: &[usize],
    ) -> (FlowGraph, HashMap<usize, String>) {
        let mut ids = IdAllocator::new();
        let mut node_ids = HashMap::new();
        for &i in &self.order {
            let Some(kind) = kinds[i] else { continue };
            let info = &self.shapes[i];
            let id = ids.allocate(&node_base(kind.tag(), &info.label));
            node_ids.insert(i, id);
        }

        let mut graph = FlowGraph::new(node_ids[&start].clone());
        for &i in &self.order {
            let (Some(kind), Some(id)) = (kinds[i], node_ids.get(&i)) else {
                continue;
            };
            let info = &self.shapes[i];
            let mut node = Node::new(id.clone(), kind, info.label.clone());
            node.description = info
                .shape
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string);
            node.actor = info
                .shape
                .actor
                .as_deref()
                .map(|a| a.trim().to_lowercase())
                .filter(|a| !a.is_empty());
            graph.insert_node(node);
        }

        for &i in demoted {
            if let (Some(kind), Some(id)) = (kinds[i], node_ids.get(&i)) {
                self.warn(BuildWarning::StartCandidateDemoted {
                    node_id: id.clone(),
                    kind,
                });
            }
        }
        (graph, node_ids)
    }

    fn place_edges(
        &mut self,
        graph: &mut FlowGraph,
        index: &HashMap<&str, usize>,
        node_ids: &HashMap<usize, String>,
    ) -> Result<(), FlowError> {
        let endpoint = |reference: &str| -> String {
            index
                .get(reference)
                .and_then(|i| node_ids.get(i))
                .cloned()
                .unwrap_or_else(|| format!("{UNRESOLVED_PREFIX}{reference}"))
        };

        let mut ids = IdAllocator::new();
        let mut seen: HashSet<(String, String, Option<String>)> = HashSet::new();
        let connectors = std::mem::take(&mut self.connectors);

        for connector in connectors {
            let source = endpoint(&connector.source);
            let target = endpoint(&connector.target);
            let mut label = non_empty(connector.label.as_deref());

            let from_decision = graph
                .node(&source)
                .is_some_and(|n| n.kind == NodeKind::Decision);
            if from_decision && label.is_none() {
                match non_empty(connector.label_hint.as_deref()) {
                    Some(hint) => {
                        self.warn(BuildWarning::BranchLabelInferred {
                            node_id: source.clone(),
                            target: target.clone(),
                            label: hint.clone(),
                        });
                        label = Some(hint);
                    }
                    None => {
                        return Err(FlowError::UnlabeledBranch {
                            node_id: source,
                            target,
                        })
                    }
                }
            }

            let key = (
                source.clone(),
                target.clone(),
                label.as_deref().map(label_key),
            );
            if !seen.insert(key) {
                self.warn(BuildWarning::DuplicateConnector {
                    source,
                    target,
                    label,
                });
                continue;
            }

            let id = ids.allocate(&edge_base(&source, &target, label.as_deref()));
            graph.insert_edge(Edge::new(id, source, target, label));
        }
        Ok(())
    }
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(normalise_label).filter(|t| !t.is_empty())
}

//! Property tests for the graph core over generated flowcharts.
//!
//! Every generated flow is a chain Start → n₀ → … → nₖ₋₁ → End where any
//! node may be a decision whose "No" branch jumps forward or loops back.

use flowchart2json::{
    process_extraction, FlowConfig, OutputDocument, RawConnector, RawExtraction, RawShape,
    StepType,
};
use proptest::prelude::*;
use std::collections::{HashSet, VecDeque};

const LABELS: [&str; 5] = ["Check balance", "Play prompt", "Retry", "Ask caller", "Log call"];

#[derive(Debug, Clone)]
struct NodeSpec {
    decision: bool,
    label: usize,
    jump: usize,
}

fn node_spec() -> impl Strategy<Value = NodeSpec> {
    (any::<bool>(), 0..LABELS.len(), any::<usize>()).prop_map(|(decision, label, jump)| NodeSpec {
        decision,
        label,
        jump,
    })
}

fn flow_strategy() -> impl Strategy<Value = Vec<NodeSpec>> {
    prop::collection::vec(node_spec(), 1..8)
}

fn build_raw(nodes: &[NodeSpec]) -> RawExtraction {
    let k = nodes.len();
    let id = |i: usize| if i == k { "e".to_string() } else { format!("n{i}") };

    let mut shapes = vec![RawShape::new("s", "oval", "Start").at(0.0, 0.0)];
    for (i, spec) in nodes.iter().enumerate() {
        let y = (i as f64 + 1.0) * 100.0;
        let shape = if spec.decision {
            RawShape::new(id(i), "diamond", format!("{}?", LABELS[spec.label]))
        } else {
            RawShape::new(id(i), "rectangle", LABELS[spec.label])
        };
        shapes.push(shape.at(0.0, y));
    }
    shapes.push(RawShape::new("e", "oval", "End").at(0.0, (k as f64 + 1.0) * 100.0));

    let mut connectors = vec![RawConnector::new("s", id(0))];
    for (i, spec) in nodes.iter().enumerate() {
        if spec.decision {
            let others: Vec<usize> = (0..=k).filter(|&j| j != i).collect();
            let no_target = others[spec.jump % others.len()];
            connectors.push(RawConnector::new(id(i), id(i + 1)).labeled("Yes"));
            connectors.push(RawConnector::new(id(i), id(no_target)).labeled("No"));
        } else {
            connectors.push(RawConnector::new(id(i), id(i + 1)));
        }
    }
    RawExtraction { shapes, connectors }
}

fn document(raw: RawExtraction) -> OutputDocument {
    process_extraction(raw, &FlowConfig::default())
        .expect("generated flows are valid")
        .document
}

fn reachable(doc: &OutputDocument) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([doc.steps[0].id.clone()]);
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(step) = doc.step(&id) {
            for (_, target) in step.next.iter() {
                queue.push_back(target.to_string());
            }
        }
    }
    seen
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn output_is_deterministic(nodes in flow_strategy()) {
        let a = document(build_raw(&nodes)).to_json(true).unwrap();
        let b = document(build_raw(&nodes)).to_json(true).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn exactly_one_start_listed_first(nodes in flow_strategy()) {
        let doc = document(build_raw(&nodes));
        let starts = doc.steps.iter().filter(|s| s.step_type == StepType::Start).count();
        prop_assert_eq!(starts, 1);
        prop_assert_eq!(doc.steps[0].step_type, StepType::Start);
        prop_assert_eq!(doc.steps.len(), nodes.len() + 2);
    }

    #[test]
    fn every_step_reachable_and_targets_exist(nodes in flow_strategy()) {
        let doc = document(build_raw(&nodes));
        let ids: HashSet<String> = doc.steps.iter().map(|s| s.id.clone()).collect();
        prop_assert_eq!(ids.len(), doc.steps.len());
        for step in &doc.steps {
            for (_, target) in step.next.iter() {
                prop_assert!(ids.contains(target), "dangling target {}", target);
            }
        }
        prop_assert_eq!(reachable(&doc), ids);
    }

    #[test]
    fn decisions_have_distinct_labelled_branches(nodes in flow_strategy()) {
        let doc = document(build_raw(&nodes));
        for step in doc.steps.iter().filter(|s| s.step_type == StepType::Decision) {
            prop_assert!(step.next.len() >= 2);
            let keys: HashSet<String> = step.next.labels().map(str::to_lowercase).collect();
            prop_assert_eq!(keys.len(), step.next.len());
            prop_assert!(step.next.labels().all(|l| !l.trim().is_empty()));
        }
    }

    #[test]
    fn only_terminals_end_the_flow(nodes in flow_strategy()) {
        let doc = document(build_raw(&nodes));
        for step in &doc.steps {
            prop_assert_eq!(step.step_type.is_terminal(), step.next.is_empty(), "step {}", &step.id);
        }
    }

    #[test]
    fn json_round_trip_keeps_every_transition(nodes in flow_strategy()) {
        let raw = build_raw(&nodes);
        let output = process_extraction(raw, &FlowConfig::default()).unwrap();
        let text = output.document.to_json(false).unwrap();
        let back = OutputDocument::from_json(&text).unwrap();
        prop_assert_eq!(back.transition_count(), output.graph.edge_count());
        prop_assert_eq!(back, output.document);
    }

    #[test]
    fn shape_listing_order_is_irrelevant(
        nodes in flow_strategy(),
        keys in prop::collection::vec(any::<u32>(), 10),
    ) {
        let raw = build_raw(&nodes);
        let mut shuffled = raw.clone();
        let mut order: Vec<usize> = (0..shuffled.shapes.len()).collect();
        order.sort_by_key(|&i| (keys[i], i));
        shuffled.shapes = order.iter().map(|&i| raw.shapes[i].clone()).collect();
        prop_assert_eq!(document(raw), document(shuffled));
    }

    #[test]
    fn repeated_connectors_are_ignored(
        nodes in flow_strategy(),
        picks in prop::collection::vec(any::<usize>(), 1..5),
    ) {
        let raw = build_raw(&nodes);
        let mut noisy = raw.clone();
        for p in &picks {
            let dup = raw.connectors[p % raw.connectors.len()].clone();
            noisy.connectors.push(dup);
        }
        let clean = process_extraction(raw, &FlowConfig::default()).unwrap();
        let repeated = process_extraction(noisy, &FlowConfig::default()).unwrap();
        prop_assert_eq!(repeated.stats.duplicate_connectors, picks.len());
        prop_assert_eq!(repeated.document, clean.document);
    }
}

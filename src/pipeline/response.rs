//! Response cleanup: turn a vision model's text answer into a [`RawExtraction`].
//!
//! ## Why is cleanup necessary?
//!
//! Even with "output ONLY JSON" in the prompt, models wrap answers in
//! ```` ```json ```` fences, prepend a sentence, leave a trailing comma or
//! slip in a zero-width space. None of that changes what the model saw, so
//! it is repaired here with cheap deterministic rules before parsing.
//!
//! Models also drift between two shapes of answer: separate `connectors`, or
//! per-shape `connections: ["id", …]` lists. Both are accepted.
//!
//! ## Rule Order
//!
//! 1. Strip invisible Unicode (BOM, zero-width characters)
//! 2. Strip outer markdown fences
//! 3. Cut to the outermost `{…}` object
//! 4. Drop trailing commas before `}` / `]`
//! 5. Lift inline `connections` lists into connectors, then deserialize

use crate::graph::raw::{RawConnector, RawExtraction};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Clean a raw model answer and parse it.
pub fn parse_extraction(text: &str) -> serde_json::Result<RawExtraction> {
    let cleaned = clean_response(text);
    let mut value: Value = serde_json::from_str(&cleaned)?;
    let lifted = lift_inline_connections(&mut value);
    if lifted > 0 {
        debug!("Lifted {} inline connections into connectors", lifted);
    }
    serde_json::from_value(value)
}

/// Apply the text rules (1–4) and return the JSON candidate.
pub fn clean_response(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = strip_fences(&s);
    let s = outermost_object(&s);
    remove_trailing_commas(s)
}

// ── Rule 1: Strip invisible Unicode ──────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 2: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

fn strip_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

// ── Rule 3: Cut to the outermost object ──────────────────────────────────────

/// Slice from the first `{` to the last `}`; unchanged if there is no pair.
fn outermost_object(input: &str) -> &str {
    match (input.find('{'), input.rfind('}')) {
        (Some(start), Some(end)) if start < end => &input[start..=end],
        _ => input,
    }
}

// ── Rule 4: Trailing commas ──────────────────────────────────────────────────

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());

fn remove_trailing_commas(input: &str) -> String {
    RE_TRAILING_COMMA.replace_all(input, "$1").into_owned()
}

// ── Rule 5: Inline connections ───────────────────────────────────────────────

/// Move `shapes[*].connections` (or `nodes[*].connections`) into the
/// top-level connector list. Entries are either target ids or objects with
/// `target`/`to` and an optional `label`. Returns how many were lifted.
fn lift_inline_connections(value: &mut Value) -> usize {
    let Some(root) = value.as_object_mut() else {
        return 0;
    };
    let shapes_key = ["shapes", "nodes", "boxes"]
        .into_iter()
        .find(|k| root.get(*k).is_some_and(Value::is_array));
    let Some(shapes_key) = shapes_key else {
        return 0;
    };

    let mut lifted = Vec::new();
    if let Some(shapes) = root.get_mut(shapes_key).and_then(Value::as_array_mut) {
        for shape in shapes.iter_mut().filter_map(Value::as_object_mut) {
            let Some(Value::Array(entries)) = shape.remove("connections") else {
                continue;
            };
            let source = match shape.get("id") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => continue,
            };
            for entry in entries {
                if let Some(connector) = inline_connector(&source, entry) {
                    lifted.push(connector);
                }
            }
        }
    }
    if lifted.is_empty() {
        return 0;
    }

    let count = lifted.len();
    let key = ["connectors", "edges", "arrows", "connections"]
        .into_iter()
        .find(|k| root.contains_key(*k))
        .unwrap_or("connectors");
    let entry = root
        .entry(key)
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(list) = entry {
        for connector in lifted {
            if let Ok(v) = serde_json::to_value(connector) {
                list.push(v);
            }
        }
    }
    count
}

fn inline_connector(source: &str, entry: Value) -> Option<RawConnector> {
    match entry {
        Value::String(target) => Some(RawConnector::new(source, target)),
        Value::Number(n) => Some(RawConnector::new(source, n.to_string())),
        Value::Object(map) => {
            let target = map
                .get("target")
                .or_else(|| map.get("to"))
                .or_else(|| map.get("id"))
                .and_then(Value::as_str)?;
            let mut connector = RawConnector::new(source, target);
            connector.label = map.get("label").and_then(Value::as_str).map(str::to_string);
            Some(connector)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"shapes":[{"id":"a","kind":"oval","label":"Start"}],"connectors":[]}"#;

    #[test]
    fn plain_json_parses() {
        let raw = parse_extraction(BODY).unwrap();
        assert_eq!(raw.shapes.len(), 1);
    }

    #[test]
    fn strips_json_fences() {
        let fenced = format!("```json\n{BODY}\n```");
        assert_eq!(clean_response(&fenced), BODY);
        let bare = format!("```\n{BODY}\n```\n");
        assert_eq!(clean_response(&bare), BODY);
    }

    #[test]
    fn cuts_surrounding_prose() {
        let chatty = format!("Here is the flowchart:\n{BODY}\nLet me know if you need more.");
        assert_eq!(clean_response(&chatty), BODY);
    }

    #[test]
    fn removes_bom_and_zero_width() {
        let dirty = format!("\u{FEFF}{}\u{200B}", BODY);
        assert_eq!(clean_response(&dirty), BODY);
    }

    #[test]
    fn drops_trailing_commas() {
        let text = r#"{"shapes":[{"id":"a","kind":"oval","label":"Start",},],}"#;
        let raw = parse_extraction(text).unwrap();
        assert_eq!(raw.shapes[0].label, "Start");
    }

    #[test]
    fn lifts_inline_connections() {
        let text = r#"{"nodes":[
            {"id":"1","type":"start","name":"Start","connections":["2"]},
            {"id":"2","type":"decision","name":"Valid?","connections":[
                {"to":"3","label":"Yes"},{"to":"4","label":"No"}]},
            {"id":"3","type":"end","name":"Done","connections":[]},
            {"id":"4","type":"end","name":"Fail"}
        ]}"#;
        let raw = parse_extraction(text).unwrap();
        assert_eq!(raw.shapes.len(), 4);
        assert_eq!(raw.connectors.len(), 3);
        assert_eq!(raw.connectors[1].source, "2");
        assert_eq!(raw.connectors[1].target, "3");
        assert_eq!(raw.connectors[1].label.as_deref(), Some("Yes"));
    }

    #[test]
    fn numeric_ids_in_connections() {
        let text = r#"{"shapes":[{"id":"7","kind":"oval","label":"Start","connections":[8]}]}"#;
        let raw = parse_extraction(text).unwrap();
        assert_eq!(raw.connectors[0].target, "8");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_extraction("I cannot see a flowchart in this image.").is_err());
        assert!(parse_extraction("").is_err());
    }
}

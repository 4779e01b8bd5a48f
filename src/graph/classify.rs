//! Shape classification: `(shape-kind hint, label text)` → node kind.
//!
//! The classifier is total over its inputs. Every combination either maps to
//! a [`ShapeClass`] or to an [`Ambiguity`] explaining why no confident choice
//! exists; there is no silent best guess.
//!
//! Terminal-shaped symbols (ovals, stadiums) whose text is not an obvious
//! start or end keyword are returned as [`ShapeClass::Terminal`]. The builder
//! resolves those by connectivity: with no incoming connector the shape is an
//! entry point, otherwise it is a [`NodeKind::Terminator`].

use super::NodeKind;

/// Result of classifying one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeClass {
    /// A definite node kind.
    Node(NodeKind),
    /// A terminal symbol; start or terminator depending on connectivity.
    Terminal,
    /// Not part of the flow (notes, legends, titles).
    Decoration,
}

/// Why a shape could not be classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ambiguity(pub &'static str);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Terminal,
    Decision,
    Process,
    Decoration,
    ExplicitStart,
    ExplicitEnd,
    Unknown,
}

fn family(hint: &str) -> Family {
    let hint = hint.trim().to_lowercase().replace(['-', ' '], "_");
    match hint.as_str() {
        "oval" | "ellipse" | "stadium" | "pill" | "capsule" | "rounded_rectangle"
        | "rounded_rect" | "terminal" | "terminator" => Family::Terminal,
        "diamond" | "rhombus" | "decision" | "condition" => Family::Decision,
        "rectangle" | "rect" | "box" | "process" | "action" | "api" | "parallelogram"
        | "input" | "output" | "io" | "data" | "document" | "subroutine"
        | "predefined_process" | "hexagon" | "preparation" | "manual_input" | "database"
        | "cylinder" => Family::Process,
        "note" | "annotation" | "comment" | "text" | "legend" | "title" => Family::Decoration,
        "start" | "begin" => Family::ExplicitStart,
        "end" | "stop" => Family::ExplicitEnd,
        _ => Family::Unknown,
    }
}

const START_WORDS: &[&str] = &["start", "begin"];
const END_WORDS: &[&str] = &["end", "stop", "finish", "exit", "done"];
const MAX_KEYWORD_LABEL_WORDS: usize = 3;

fn keyword_label(label: &str, words: &[&str]) -> bool {
    let lowered = label.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    match tokens.first() {
        Some(first) => tokens.len() <= MAX_KEYWORD_LABEL_WORDS && words.contains(first),
        None => false,
    }
}

pub fn is_start_label(label: &str) -> bool {
    keyword_label(label, START_WORDS)
}

pub fn is_end_label(label: &str) -> bool {
    keyword_label(label, END_WORDS)
}

/// Classify a shape from its kind hint and (already normalised) label.
pub fn classify(kind_hint: &str, label: &str) -> Result<ShapeClass, Ambiguity> {
    let label = label.trim();
    match family(kind_hint) {
        Family::Decoration => Ok(ShapeClass::Decoration),
        Family::ExplicitStart => Ok(ShapeClass::Node(NodeKind::Start)),
        Family::ExplicitEnd => Ok(ShapeClass::Node(NodeKind::End)),
        Family::Decision => {
            if label.is_empty() {
                Err(Ambiguity("decision shape has no text"))
            } else {
                Ok(ShapeClass::Node(NodeKind::Decision))
            }
        }
        Family::Terminal => {
            if label.is_empty() {
                Err(Ambiguity("terminal shape has no text"))
            } else if is_start_label(label) {
                Ok(ShapeClass::Node(NodeKind::Start))
            } else if is_end_label(label) {
                Ok(ShapeClass::Node(NodeKind::End))
            } else {
                Ok(ShapeClass::Terminal)
            }
        }
        Family::Process => {
            if label.is_empty() {
                Err(Ambiguity("process shape has no text"))
            } else if is_start_label(label) {
                Ok(ShapeClass::Node(NodeKind::Start))
            } else if is_end_label(label) {
                Ok(ShapeClass::Node(NodeKind::Terminator))
            } else {
                Ok(ShapeClass::Node(NodeKind::Action))
            }
        }
        Family::Unknown => {
            if is_start_label(label) {
                Ok(ShapeClass::Node(NodeKind::Start))
            } else if is_end_label(label) {
                Ok(ShapeClass::Node(NodeKind::End))
            } else if label.ends_with('?') {
                Ok(ShapeClass::Node(NodeKind::Decision))
            } else {
                Err(Ambiguity("unrecognised shape kind and no telling label"))
            }
        }
    }
}

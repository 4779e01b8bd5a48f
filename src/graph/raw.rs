//! The raw, untyped extraction produced by a [`crate::pipeline::extract::VisionExtractor`].
//!
//! Nothing here is trusted: shape kinds are free-form guesses, labels may be
//! empty, and connectors may reference shapes that do not exist. Field aliases
//! accept the spellings vision models commonly drift to (`from`/`to`,
//! `text`/`name`, `edges`/`arrows`) so a slightly off-schema answer still
//! parses.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Everything the vision model reported about one flowchart image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawExtraction {
    /// Detected shapes, in the order the model listed them.
    #[serde(default, alias = "nodes", alias = "boxes")]
    pub shapes: Vec<RawShape>,
    /// Detected connectors, in the order the model listed them.
    #[serde(default, alias = "edges", alias = "arrows", alias = "connections")]
    pub connectors: Vec<RawConnector>,
}

/// A detected shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawShape {
    /// Reference used by connectors. Only meaningful inside one extraction.
    pub id: String,
    /// Guessed shape kind, e.g. "rectangle", "diamond", "oval".
    #[serde(default, alias = "shape", alias = "type")]
    pub kind: String,
    /// Text inside the shape.
    #[serde(default, alias = "text", alias = "name")]
    pub label: String,
    /// Where the shape sits in the image.
    #[serde(default, alias = "bounds", alias = "box")]
    pub bbox: BoundingBox,
    /// Longer text attached to the shape, e.g. a prompt to be spoken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Who performs the step: caller, agent or system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

/// Axis-aligned bounding region in image coordinates (origin top-left).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    #[serde(default, alias = "w")]
    pub width: f64,
    #[serde(default, alias = "h")]
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Reading order: top-to-bottom, then left-to-right, on the top-left corner.
    pub fn reading_order(&self, other: &BoundingBox) -> Ordering {
        self.y
            .total_cmp(&other.y)
            .then_with(|| self.x.total_cmp(&other.x))
    }
}

/// A detected arrow between two shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawConnector {
    /// Shape id the arrow leaves.
    #[serde(alias = "from")]
    pub source: String,
    /// Shape id the arrow points to.
    #[serde(alias = "to")]
    pub target: String,
    /// Text written on the arrow, e.g. "Yes".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Caption seen near the arrow but not attached to it.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "hint")]
    pub label_hint: Option<String>,
}

impl RawShape {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.bbox = BoundingBox::new(x, y, 100.0, 40.0);
        self
    }
}

impl RawConnector {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: None,
            label_hint: None,
        }
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn hinted(mut self, hint: impl Into<String>) -> Self {
        self.label_hint = Some(hint.into());
        self
    }
}

//! Content-derived identifiers.
//!
//! Node ids are `<kind>-<label slug>` with a `-N` ordinal appended for the
//! second and later nodes sharing that base, so re-running extraction on a
//! re-rendered image yields the same ids as long as the labels are unchanged.
//! Pixel coordinates never enter an id.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

const MAX_SLUG_CHARS: usize = 48;

static RE_NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").unwrap());

/// Lowercase, collapse every run of non-alphanumerics to `-`, trim dashes.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let dashed = RE_NON_WORD.replace_all(&lowered, "-");
    let trimmed = dashed.trim_matches('-');
    let truncated: String = trimmed.chars().take(MAX_SLUG_CHARS).collect();
    truncated.trim_end_matches('-').to_string()
}

/// Hands out unique ids, suffixing repeats of a base with `-2`, `-3`, …
#[derive(Debug, Default)]
pub struct IdAllocator {
    seen: HashMap<String, usize>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, base: &str) -> String {
        let count = self.seen.entry(base.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            return base.to_string();
        }
        let mut ordinal = *count;
        loop {
            let candidate = format!("{base}-{ordinal}");
            // "a-2" may already exist as a literal base; keep counting past it.
            if !self.seen.contains_key(&candidate) {
                self.seen.insert(base.to_string(), ordinal);
                self.seen.insert(candidate.clone(), 1);
                return candidate;
            }
            ordinal += 1;
        }
    }
}

/// Base id for a node: `<kind>-<label slug>`, or just `<kind>` when the label
/// is blank or only repeats the kind ("Start", "END").
pub fn node_base(kind_tag: &str, label: &str) -> String {
    let slug = slugify(label);
    if slug.is_empty() || slug == kind_tag {
        kind_tag.to_string()
    } else {
        format!("{kind_tag}-{slug}")
    }
}

/// Base id for an edge: `<source>-><target>` plus `[label]` when labeled.
pub fn edge_base(source: &str, target: &str, label: Option<&str>) -> String {
    match label.map(slugify).filter(|s| !s.is_empty()) {
        Some(slug) => format!("{source}-[{slug}]->{target}"),
        None => format!("{source}->{target}"),
    }
}

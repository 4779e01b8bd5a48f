//! Prompts for VLM-based flowchart extraction.
//!
//! The model is asked for *what it sees*, not for a finished flow: shapes with
//! their outline and text, arrows with their endpoints and captions. Deciding
//! which shape is the start, what a diamond's branches are called and which
//! boxes are decoration is left to [`crate::graph::build`], where it is
//! deterministic and testable.
//!
//! Callers can override the system prompt via
//! [`crate::config::FlowConfig::system_prompt`]; the constants here are used
//! only when no override is provided.

/// Default system prompt for reading one flowchart image.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert at reading flowchart diagrams. Describe the flowchart in the image as JSON.

Report every shape and every arrow you see. Do not interpret, simplify or complete the flow.

1. SHAPES
   For each shape output an object with:
   - "id": a short unique reference you choose, e.g. "s1", "s2"
   - "kind": the outline, one of: oval, rounded_rectangle, rectangle, diamond,
     parallelogram, document, cylinder, hexagon, note, legend, title
   - "label": the text inside the shape, exactly as written ("" if none)
   - "bbox": {"x", "y", "width", "height"} in image pixels, origin top-left
   - "description": optional longer text attached to the shape
   - "actor": optional, who performs the step: "caller", "agent" or "system"

2. ARROWS
   For each arrow output an object with:
   - "source": id of the shape the arrow leaves
   - "target": id of the shape the arrow points to
   - "label": the text written on the arrow, e.g. "Yes", "No" (omit if none)
   - "label_hint": text written near the arrow that is not clearly attached to it (omit if none)
   Report an arrow once even if it bends. Arrows that merge into another arrow
   point to the shape the merged arrow reaches.

3. OUTPUT FORMAT
   - Output ONLY a JSON object: {"shapes": [...], "connectors": [...]}
   - Do NOT wrap the JSON in ``` fences
   - Do NOT add commentary or explanations
   - Start your response with { and end with }"#;

/// User message sent alongside the image.
pub const EXTRACTION_INSTRUCTION: &str =
    "Extract all shapes and arrows of this flowchart as JSON.";

/// Sent on a retry after the previous answer could not be parsed.
pub fn retry_instruction(parse_error: &str) -> String {
    format!(
        "{EXTRACTION_INSTRUCTION}\nYour previous answer was not valid JSON ({parse_error}). \
         Answer with the JSON object only."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_schema_field() {
        for field in [
            "\"shapes\"",
            "\"connectors\"",
            "\"id\"",
            "\"kind\"",
            "\"label\"",
            "\"bbox\"",
            "\"source\"",
            "\"target\"",
            "\"label_hint\"",
        ] {
            assert!(DEFAULT_SYSTEM_PROMPT.contains(field), "missing {field}");
        }
    }

    #[test]
    fn retry_instruction_carries_error() {
        let msg = retry_instruction("EOF while parsing");
        assert!(msg.starts_with(EXTRACTION_INSTRUCTION));
        assert!(msg.contains("EOF while parsing"));
    }
}

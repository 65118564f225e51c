//! Rendering of named input sections into a user message.
//!
//! Each section becomes `# name` followed by its value:
//! - strings are inserted verbatim
//! - arrays render each element as pretty JSON, separated by blank lines
//! - anything else renders as pretty JSON
//!
//! Object members that are `null` or empty strings are dropped before
//! rendering, so optional fields never reach the prompt.

use serde_json::Value;

use crate::cache::canonicalize;

/// Ordered, named input data for a structured generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptData {
    sections: Vec<(String, Value)>,
}

impl PromptData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a section. Sections render in insertion order.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.sections.push((name.into(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Renders every section into one message body.
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(|(name, value)| format!("# {}\n\n{}", name, render_value(value)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_pretty)
            .collect::<Vec<_>>()
            .join("\n\n"),
        other => render_pretty(other),
    }
}

fn render_pretty(value: &Value) -> String {
    let cleaned = canonicalize(value);
    serde_json::to_string_pretty(&cleaned).unwrap_or_else(|_| cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_terms_list() {
        let data = PromptData::new().with("terms", json!(["a thoughtful gift", "a great present"]));
        assert_eq!(
            data.render(),
            "# terms\n\n\"a thoughtful gift\"\n\n\"a great present\""
        );
    }

    #[test]
    fn test_render_multiple_sections_in_order() {
        let data = PromptData::new()
            .with("choiceType", json!("a gift"))
            .with("listOfPolicies", json!([["p1"], ["p2", "p3"]]));

        let rendered = data.render();
        assert!(rendered.starts_with("# choiceType\n\na gift\n\n# listOfPolicies\n\n"));
        assert!(rendered.contains("[\n  \"p2\",\n  \"p3\"\n]"));
        assert!(rendered.find("p1").unwrap() < rendered.find("p2").unwrap());
    }

    #[test]
    fn test_render_object_strips_empty_members() {
        let data = PromptData::new().with("record", json!({"name": "x", "note": "", "extra": null}));
        assert_eq!(data.render(), "# record\n\n{\n  \"name\": \"x\"\n}");
    }

    #[test]
    fn test_empty_data() {
        let data = PromptData::new();
        assert!(data.is_empty());
        assert_eq!(data.render(), "");
    }
}

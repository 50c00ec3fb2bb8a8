//! Structured tool descriptions.
//!
//! A [`ToolDescription`] assembles the text the model reads when choosing a
//! tool: what it does, when to reach for it, when not to, an example call,
//! and the shape of its output.

use crate::ToolDef;

/// Builder for a tool definition with usage guidance.
///
/// ```
/// use palaver::tools::describe::ToolDescription;
///
/// let def = ToolDescription::new("sql_query", "Run one SQL statement")
///     .when_to_use("After checking the schema with sql_schema")
///     .when_not_to_use("To discover table names; use sql_list_tables")
///     .parameters(serde_json::json!({"type": "object", "properties": {}}))
///     .into_def();
///
/// assert_eq!(def.name(), "sql_query");
/// assert!(def.function.description.contains("When NOT to use:"));
/// ```
#[derive(Debug, Clone)]
pub struct ToolDescription {
    name: String,
    purpose: String,
    when_to_use: Option<String>,
    when_not_to_use: Option<String>,
    parameters: serde_json::Value,
    examples: Vec<(String, String)>,
    output_format: Option<String>,
}

impl ToolDescription {
    pub fn new(name: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            purpose: purpose.into(),
            when_to_use: None,
            when_not_to_use: None,
            parameters: serde_json::json!({"type": "object", "properties": {}}),
            examples: Vec::new(),
            output_format: None,
        }
    }

    pub fn when_to_use(mut self, text: impl Into<String>) -> Self {
        self.when_to_use = Some(text.into());
        self
    }

    pub fn when_not_to_use(mut self, text: impl Into<String>) -> Self {
        self.when_not_to_use = Some(text.into());
        self
    }

    pub fn parameters(mut self, schema: serde_json::Value) -> Self {
        self.parameters = schema;
        self
    }

    /// Derive the parameter schema from the argument type.
    pub fn parameters_for<T: schemars::JsonSchema>(self) -> Self {
        self.parameters(crate::json_schema_for::<T>())
    }

    pub fn example(mut self, call: impl Into<String>, result: impl Into<String>) -> Self {
        self.examples.push((call.into(), result.into()));
        self
    }

    pub fn output_format(mut self, text: impl Into<String>) -> Self {
        self.output_format = Some(text.into());
        self
    }

    /// Render the description text.
    pub fn text(&self) -> String {
        let mut lines = vec![format!("{}.", self.purpose.trim_end_matches('.'))];
        if let Some(when) = &self.when_to_use {
            lines.push(format!("When to use: {when}"));
        }
        if let Some(when_not) = &self.when_not_to_use {
            lines.push(format!("When NOT to use: {when_not}"));
        }
        if !self.examples.is_empty() {
            lines.push("Examples:".into());
            lines.extend(
                self.examples
                    .iter()
                    .map(|(call, result)| format!("  - {call} → {result}")),
            );
        }
        if let Some(format) = &self.output_format {
            lines.push(format!("Output format: {format}"));
        }
        lines.join("\n")
    }

    pub fn into_def(self) -> ToolDef {
        let description = self.text();
        ToolDef::new(self.name, description, self.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_description_is_just_the_purpose() {
        let def = ToolDescription::new("ping", "Check connectivity.").into_def();
        assert_eq!(def.function.description, "Check connectivity.");
        assert_eq!(def.function.parameters["type"], "object");
    }

    #[test]
    fn full_description_lists_sections_in_order() {
        let text = ToolDescription::new("web_search", "Search the web")
            .when_to_use("For current events")
            .when_not_to_use("For arithmetic")
            .example("web_search(query='rust 2024')", "two results")
            .output_format("Numbered list")
            .text();

        let when = text.find("When to use:").unwrap();
        let when_not = text.find("When NOT to use:").unwrap();
        let examples = text.find("Examples:").unwrap();
        let output = text.find("Output format:").unwrap();
        assert!(when < when_not && when_not < examples && examples < output);
        assert!(text.contains("web_search(query='rust 2024') → two results"));
    }
}

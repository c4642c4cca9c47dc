//! Tool definitions and schema helpers
//!
//! Provides the listing type handed to MCP clients, helpers for building
//! input schemas, and the argument validator the dispatcher runs before any
//! tool executes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

use crate::{Error, Result};

/// Tool listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: JsonValue,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Property of an object schema
pub struct Property<'a> {
    pub name: &'a str,
    pub schema: JsonValue,
    pub required: bool,
}

impl<'a> Property<'a> {
    pub fn string(name: &'a str, description: &str) -> Self {
        Self {
            name,
            schema: json!({"type": "string", "description": description}),
            required: true,
        }
    }

    pub fn string_enum(name: &'a str, values: &[&str], description: &str) -> Self {
        Self {
            name,
            schema: json!({"type": "string", "enum": values, "description": description}),
            required: true,
        }
    }

    pub fn boolean(name: &'a str, description: &str, default: bool) -> Self {
        Self {
            name,
            schema: json!({"type": "boolean", "description": description, "default": default}),
            required: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Helper functions for creating tool schemas
pub struct SchemaBuilder;

impl SchemaBuilder {
    /// Create an object schema from properties, in declaration order
    pub fn object(properties: Vec<Property<'_>>) -> JsonValue {
        let required: Vec<&str> = properties
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        let props: Map<String, JsonValue> = properties
            .into_iter()
            .map(|p| (p.name.to_string(), p.schema))
            .collect();

        json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }

    /// Check `input` against an object schema built by [`SchemaBuilder::object`].
    ///
    /// Verifies required keys are present and declared types match. Enum
    /// membership is left to the tool so it can report a specific error.
    pub fn validate(schema: &JsonValue, input: &JsonValue) -> Result<()> {
        let Some(object) = input.as_object() else {
            return Err(Error::InvalidArguments(
                "arguments must be a JSON object".to_string(),
            ));
        };

        if let Some(required) = schema["required"].as_array() {
            for name in required.iter().filter_map(JsonValue::as_str) {
                match object.get(name) {
                    None | Some(JsonValue::Null) => {
                        return Err(Error::InvalidArguments(format!(
                            "missing required parameter '{}'",
                            name
                        )));
                    }
                    Some(_) => {}
                }
            }
        }

        if let Some(properties) = schema["properties"].as_object() {
            for (name, value) in object {
                let Some(expected) = properties
                    .get(name)
                    .and_then(|p| p["type"].as_str())
                else {
                    continue;
                };
                if value.is_null() {
                    continue;
                }
                if !type_matches(expected, value) {
                    return Err(Error::invalid_argument(name, &article(expected)));
                }
            }
        }

        Ok(())
    }
}

fn type_matches(expected: &str, value: &JsonValue) -> bool {
    match expected {
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn article(type_name: &str) -> String {
    match type_name {
        "integer" | "object" | "array" => format!("an {}", type_name),
        other => format!("a {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> JsonValue {
        SchemaBuilder::object(vec![
            Property::string("driver_id", "Driver ID"),
            Property::string("statement", "Statement to verify"),
            Property::boolean("vision", "Use screenshot", false),
        ])
    }

    #[test]
    fn test_object_schema() {
        let schema = schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["driver_id", "statement"]));
        assert_eq!(schema["properties"]["vision"]["default"], false);
    }

    #[test]
    fn test_validate_accepts_valid_input() {
        let input = json!({"driver_id": "abc", "statement": "title is X", "vision": true});
        assert!(SchemaBuilder::validate(&schema(), &input).is_ok());

        let without_optional = json!({"driver_id": "abc", "statement": "title is X"});
        assert!(SchemaBuilder::validate(&schema(), &without_optional).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_required() {
        let err = SchemaBuilder::validate(&schema(), &json!({"driver_id": "abc"})).unwrap_err();
        assert_eq!(err.category(), "invalid_arguments");
        assert!(err.to_string().contains("statement"));
    }

    #[test]
    fn test_validate_rejects_wrong_type() {
        let input = json!({"driver_id": 42, "statement": "x"});
        let err = SchemaBuilder::validate(&schema(), &input).unwrap_err();
        assert!(err.to_string().contains("'driver_id' must be a string"));

        let input = json!({"driver_id": "a", "statement": "x", "vision": "yes"});
        assert!(SchemaBuilder::validate(&schema(), &input).is_err());
    }

    #[test]
    fn test_validate_rejects_non_object() {
        assert!(SchemaBuilder::validate(&schema(), &json!(["a"])).is_err());
    }
}

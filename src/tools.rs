//! Tool schemas carried on a [`Request`](crate::wire). The core never
//! executes tools — a policy only ever sees tool-call blocks assembled from
//! deltas and may inspect, transform, or block them. This module is
//! trimmed from the schema/handler pair the teacher's SDK carries down to
//! just the schema half: the handler/executor machinery (`ToolHandler`,
//! `Tool::execute`) has no place in a proxy core that forwards tool calls
//! rather than running them.

use serde_json::Value;

/// A tool's name, description, and JSON Schema for its parameters.
///
/// Accepts the same flexible schema notations the builder supports: a
/// simple `{"param": "type"}` map, an extended map with per-param metadata,
/// or a full JSON Schema object — all normalized to a single JSON Schema
/// shape via [`convert_schema_to_json_schema`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Tool {
    name: String,
    description: String,
    input_schema: Value,
}

impl Tool {
    /// Create a new tool, normalizing `schema` into JSON Schema form.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: convert_schema_to_json_schema(schema),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

/// Builder for [`Tool`], mirroring the teacher SDK's `.param()`/`.schema()`
/// ergonomics without the handler half.
#[derive(Debug, Default)]
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
}

pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder {
        name: name.into(),
        description: description.into(),
        schema: Value::Object(Default::default()),
    }
}

impl ToolBuilder {
    /// Add a simple `name: type` parameter, e.g. `.param("path", "string")`.
    pub fn param(mut self, name: impl Into<String>, type_str: impl Into<String>) -> Self {
        if !self.schema.is_object() {
            self.schema = Value::Object(Default::default());
        }
        self.schema[name.into()] = Value::String(type_str.into());
        self
    }

    /// Replace the schema wholesale with an already-built JSON Schema
    /// (or one of the simplified notations `Tool::new` accepts).
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    pub fn build(self) -> Tool {
        Tool::new(self.name, self.description, self.schema)
    }
}

/// Normalize a tool schema to JSON Schema: a full schema (has `"type":
/// "object"` and `"properties"`) passes through; a simple `{"param":
/// "type"}` or extended `{"param": {"type": ..., "description": ...}}` map
/// is converted.
pub fn convert_schema_to_json_schema(schema: Value) -> Value {
    use serde_json::Map;

    if schema.is_object() {
        let obj = schema.as_object().unwrap();
        if obj.get("type").and_then(|t| t.as_str()) == Some("object")
            && obj.contains_key("properties")
        {
            return schema;
        }

        let mut properties = Map::new();
        let mut required = Vec::new();

        for (param_name, param_schema) in obj {
            match param_schema {
                Value::String(type_str) => {
                    properties.insert(param_name.clone(), type_to_json_schema(type_str));
                    required.push(Value::String(param_name.clone()));
                }
                Value::Object(prop_obj) => {
                    let mut cleaned = prop_obj.clone();
                    let is_optional = cleaned
                        .remove("optional")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    cleaned.remove("required");
                    properties.insert(param_name.clone(), Value::Object(cleaned));
                    if !is_optional {
                        required.push(Value::String(param_name.clone()));
                    }
                }
                other => {
                    properties.insert(param_name.clone(), other.clone());
                    required.push(Value::String(param_name.clone()));
                }
            }
        }

        let mut result = Map::new();
        result.insert("type".to_string(), Value::String("object".to_string()));
        result.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            result.insert("required".to_string(), Value::Array(required));
        }
        return Value::Object(result);
    }

    serde_json::json!({ "type": "object", "properties": {} })
}

fn type_to_json_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "i32" | "i64" | "u32" | "u64" | "integer" | "int" => "integer",
        "f32" | "f64" | "number" | "float" => "number",
        "bool" | "boolean" => "boolean",
        "vec" | "array" | "list" => "array",
        "object" | "map" => "object",
        _ => "string",
    };
    serde_json::json!({ "type": json_type })
}

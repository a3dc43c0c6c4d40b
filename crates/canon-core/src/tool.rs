use serde::{Deserialize, Serialize};

/// A tool the caller made available to the model.
///
/// Only consulted by the embedded-markup assembler, to look tools up by name
/// and to coerce parameter values to their declared JSON types.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The declared JSON type of parameter `name`, if the schema names one.
    pub fn parameter_type(&self, name: &str) -> Option<ParameterType> {
        self.parameters
            .get("properties")?
            .get(name)?
            .get("type")?
            .as_str()
            .map(ParameterType::from)
    }

    /// Parameter names and declared types, undeclared types as strings.
    pub fn parameters(&self) -> Vec<(&str, ParameterType)> {
        let Some(properties) = self
            .parameters
            .get("properties")
            .and_then(serde_json::Value::as_object)
        else {
            return Vec::new();
        };

        properties
            .iter()
            .map(|(name, schema)| {
                let ty = schema
                    .get("type")
                    .and_then(serde_json::Value::as_str)
                    .map(ParameterType::from)
                    .unwrap_or_default();
                (name.as_str(), ty)
            })
            .collect()
    }
}

/// How tool calls reach the stream.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    /// The provider streams structured tool-call deltas.
    #[default]
    Native,
    /// Tool calls are written as `<function_calls>` markup inside the text.
    Embedded,
}

/// JSON schema primitive type of a tool parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParameterType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Number => "number",
            ParameterType::Integer => "integer",
            ParameterType::Boolean => "boolean",
            ParameterType::Array => "array",
            ParameterType::Object => "object",
            ParameterType::Null => "null",
        }
    }
}

impl From<&str> for ParameterType {
    fn from(value: &str) -> Self {
        match value {
            "number" => ParameterType::Number,
            "integer" => ParameterType::Integer,
            "boolean" => ParameterType::Boolean,
            "array" => ParameterType::Array,
            "object" => ParameterType::Object,
            "null" => ParameterType::Null,
            _ => ParameterType::String,
        }
    }
}

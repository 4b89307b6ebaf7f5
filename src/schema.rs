//! Endpoint schema model and deterministic fallback payloads
//!
//! A schema file describes one mock route: the path, the verb, an optional
//! free-text context for the LLM and the expected response shape. The shape
//! comes in two flavors, a flat `field -> descriptor` mapping or a
//! JSON-Schema-like object with a nested `properties` mapping. Both are
//! normalized into a single [`FieldSpec`] list before anything looks at them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Message returned when there is nothing to fall back on
pub const FALLBACK_ERROR_MESSAGE: &str = "Failed to generate mock response from LLM.";

/// Numeric placeholder for `"number"` fields
const SAMPLE_NUMBER: i64 = 123;

/// Declarative description of one mock API route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSchema {
    /// Route path, e.g. `/users/:id`
    pub endpoint: String,
    /// HTTP verb, compared case-insensitively
    #[serde(default = "default_method")]
    pub method: String,
    /// Free-text description handed to the LLM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Expected response shape
    #[serde(
        rename = "responseSchema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub response_schema: Option<Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl EndpointSchema {
    pub fn new(method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            context: None,
            response_schema: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn with_response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Normalized field list of the response schema, empty when absent
    pub fn fields(&self) -> Vec<FieldSpec> {
        self.response_schema
            .as_ref()
            .map(FieldSpec::from_response_schema)
            .unwrap_or_default()
    }

    /// Placeholder payload derived from the response schema alone
    ///
    /// Without a response schema this is the generic error payload.
    pub fn fallback_response(&self) -> Value {
        let Some(response_schema) = &self.response_schema else {
            return json!({ "error": FALLBACK_ERROR_MESSAGE });
        };

        let object: Map<String, Value> = FieldSpec::from_response_schema(response_schema)
            .into_iter()
            .map(|field| {
                let value = field.sample_value();
                (field.name, value)
            })
            .collect();

        Value::Object(object)
    }
}

/// One response field after normalization
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub type_name: Option<String>,
    pub enum_values: Vec<Value>,
}

impl FieldSpec {
    /// Flatten either schema shape into declaration-ordered field specs
    pub fn from_response_schema(response_schema: &Value) -> Vec<Self> {
        let entries = match response_schema.get("properties").and_then(Value::as_object) {
            Some(properties) => properties,
            None => match response_schema.as_object() {
                Some(object) => object,
                None => return Vec::new(),
            },
        };

        entries
            .iter()
            .map(|(name, descriptor)| Self::from_descriptor(name, descriptor))
            .collect()
    }

    fn from_descriptor(name: &str, descriptor: &Value) -> Self {
        let (type_name, enum_values) = match descriptor {
            Value::String(type_name) => (Some(type_name.clone()), Vec::new()),
            Value::Object(object) => (
                object
                    .get("type")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
                object
                    .get("enum")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
            ),
            _ => (None, Vec::new()),
        };

        Self {
            name: name.to_string(),
            type_name,
            enum_values,
        }
    }

    /// Deterministic placeholder for this field
    pub fn sample_value(&self) -> Value {
        if let Some(first) = self.enum_values.first() {
            return first.clone();
        }

        match self.type_name.as_deref() {
            Some("number") => json!(SAMPLE_NUMBER),
            Some("boolean") => Value::Bool(true),
            _ => Value::String(format!("sample_{}", self.name)),
        }
    }
}

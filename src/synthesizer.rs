//! Response synthesis
//!
//! Turns an [`EndpointSchema`] plus the caller's input into a JSON payload.
//! The LLM gets the first shot; anything that goes wrong on the way
//! (transport, status, missing JSON, bad JSON) collapses into the schema's
//! deterministic fallback. [`ResponseSynthesizer::generate`] never fails.

use serde_json::Value;
use std::sync::Arc;

use crate::extract::{JsonExtractor, Strategy};
use crate::llm::{GenerationError, TextGenerator};
use crate::schema::EndpointSchema;
use crate::{log_debug, log_warn};

const NO_CONTEXT: &str = "No additional context provided.";

/// Produces mock responses for endpoint schemas
#[derive(Clone)]
pub struct ResponseSynthesizer {
    generator: Arc<dyn TextGenerator>,
    extractor: JsonExtractor,
}

impl ResponseSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            extractor: JsonExtractor::default(),
        }
    }

    /// Replace the extraction strategy order
    #[must_use]
    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.extractor = JsonExtractor::new(strategies);
        self
    }

    pub fn extractor(&self) -> &JsonExtractor {
        &self.extractor
    }

    /// Generate a response for `schema`, falling back to placeholder data
    pub async fn generate(&self, schema: &EndpointSchema, input: &Value) -> Value {
        match self.try_generate(schema, input).await {
            Ok(value) => value,
            Err(e) => {
                log_warn!(
                    "Generation failed for {} {}, using fallback: {}",
                    schema.method,
                    schema.endpoint,
                    e
                );
                schema.fallback_response()
            }
        }
    }

    /// One LLM round trip without the fallback
    pub async fn try_generate(
        &self,
        schema: &EndpointSchema,
        input: &Value,
    ) -> Result<Value, GenerationError> {
        let prompt = build_prompt(schema, input);
        let raw = self.generator.generate_text(&prompt).await?;
        log_debug!("Raw LLM response: {}", raw);
        self.extractor.extract_json(&raw)
    }
}

/// Prompt asking the model for a JSON payload matching `schema`
pub fn build_prompt(schema: &EndpointSchema, input: &Value) -> String {
    let context = schema
        .context
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(NO_CONTEXT);
    let response_schema = schema
        .response_schema
        .as_ref()
        .map_or_else(|| "{}".to_string(), pretty);

    format!(
        "You are a mock API server. Generate a realistic response for the endpoint {method} {endpoint}.\n\
         Return ONLY valid JSON. Do not include explanations, markdown or any text outside the JSON.\n\n\
         Context: {context}\n\n\
         Response schema:\n{response_schema}\n\n\
         Request input:\n{input}\n",
        method = schema.method.to_uppercase(),
        endpoint = schema.endpoint,
        input = pretty(input),
    )
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

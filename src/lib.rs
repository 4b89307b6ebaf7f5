//! schema-mock - LLM-backed mock API server
//!
//! Endpoint schema files describe REST routes and the shape of their
//! responses. The server answers those routes with payloads synthesized by a
//! language model, falling back to deterministic sample data derived from
//! the schema whenever generation fails.

#![allow(clippy::uninlined_format_args)] // Style preference
#![allow(clippy::format_push_string)] // Performance improvement but stylistic
#![allow(clippy::return_self_not_must_use)] // Builder pattern is clear enough

pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod logger;
pub mod routing;
pub mod schema;
pub mod server;
pub mod store;
pub mod synthesizer;

// Re-export important structs and functions for easier testing
pub use config::Config;
pub use extract::{Extraction, JsonExtractor, Strategy};
pub use llm::{GenerationError, OllamaClient, TextGenerator};
pub use schema::{EndpointSchema, FieldSpec};
pub use store::{SchemaStore, StoredSchema};
pub use synthesizer::ResponseSynthesizer;

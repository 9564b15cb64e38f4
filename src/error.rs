//! Error types for the federation gateway.

use std::collections::HashMap;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// A single validation error produced during schema composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionError {
    /// Human-readable description of the problem
    pub message: String,
    /// Service the error originates from, when attributable
    pub service: Option<String>,
}

impl std::fmt::Display for CompositionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.service {
            Some(service) => write!(f, "[{}] {}", service, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Main error type for the gateway
///
/// Fatal bootstrap errors (`Composition`, `InvalidConfig`) abort `load()` and
/// construction. `Registry` failures are fatal at first load but swallowed and
/// logged when they occur during a background poll tick.
#[derive(Error, Debug)]
pub enum Error {
    /// Schema composition validation failure; aggregates every underlying error
    #[error("schema composition failed:\n{}", format_composition_errors(.0))]
    Composition(Vec<CompositionError>),

    /// Invalid gateway configuration (missing credential, missing service URL, ...)
    #[error("invalid gateway configuration: {0}")]
    InvalidConfig(String),

    /// Service registry or endpoint introspection failure
    #[error("service registry error: {0}")]
    Registry(String),

    /// A request arrived before the first successful `load()`
    #[error("schema is not loaded; call load() before executing requests")]
    SchemaNotLoaded,

    /// The requested operation name does not exist in the document
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// HTTP transport errors
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other error
    #[error("error: {0}")]
    Other(#[from] anyhow::Error),
}

fn format_composition_errors(errors: &[CompositionError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// GraphQL error as carried in an execution result
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extensions: HashMap<String, serde_json::Value>,
}

impl GraphQLError {
    /// Create an error with a bare message and no extensions
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: HashMap::new(),
        }
    }
}

//! Query planning and execution collaborator seams
//!
//! The plan compiler and the distributed plan executor are external
//! collaborators; this module defines their interfaces plus the request-side
//! value types the dispatcher threads through them. A [`QueryPlan`] is opaque
//! to the gateway: it is compiled once per distinct operation fingerprint,
//! cached, and handed to the executor together with the live service map.

use async_trait::async_trait;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::{GraphQLError, Result};
use crate::schema::UnifiedSchema;
use crate::transport::ServiceMap;

/// Opaque compiled execution plan, produced by the external plan compiler.
/// Immutable once built; serialized both for approximate cache sizing and for
/// the experimental debug-trace extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan(pub Value);

/// A parsed operation normalized against a specific published schema.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub schema: Arc<UnifiedSchema>,
    pub document: String,
    pub operation_name: Option<String>,
}

/// Per-request input to the dispatcher.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The parsed operation document
    pub document: String,
    /// Requested operation name, when the document holds more than one
    pub operation_name: Option<String>,
    /// Stable content hash of the operation; the plan cache key
    pub fingerprint: String,
    /// Transport-level request metadata
    pub headers: HeaderMap,
}

impl RequestContext {
    /// Build a request context, fingerprinting the operation.
    pub fn new(
        document: impl Into<String>,
        operation_name: Option<String>,
        headers: HeaderMap,
    ) -> Self {
        let document = document.into();
        let fingerprint = Self::fingerprint_of(&document, operation_name.as_deref());
        Self {
            document,
            operation_name,
            fingerprint,
            headers,
        }
    }

    /// SHA-256 fingerprint of a whitespace-normalized operation document plus
    /// the operation name.
    pub fn fingerprint_of(document: &str, operation_name: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        let normalized: String = document.split_whitespace().collect::<Vec<_>>().join(" ");
        hasher.update(normalized.as_bytes());
        if let Some(name) = operation_name {
            hasher.update(name.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Result of executing a plan across the federation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Map<String, Value>>,
}

/// External query-plan compiler collaborator.
#[async_trait]
pub trait QueryPlanner: Send + Sync {
    /// Parse/validate the requested operation against the schema and
    /// normalize it for planning.
    async fn build_operation_context(
        &self,
        schema: Arc<UnifiedSchema>,
        document: &str,
        operation_name: Option<&str>,
    ) -> Result<OperationContext>;

    /// Compile an execution plan for a normalized operation.
    async fn build_query_plan(&self, ctx: &OperationContext) -> Result<Arc<QueryPlan>>;
}

/// External distributed plan executor collaborator.
#[async_trait]
pub trait PlanExecutor: Send + Sync {
    async fn execute(
        &self,
        plan: Arc<QueryPlan>,
        service_map: Arc<ServiceMap>,
        request: &RequestContext,
        ctx: &OperationContext,
    ) -> Result<ExecutionResult>;
}

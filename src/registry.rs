//! Service registry resolution
//!
//! The [`ServiceRegistry`] turns the gateway configuration into the current
//! list of service definitions and a change signal:
//!
//! - **Local**: the embedded list, verbatim; `changed` is always false.
//! - **Concrete**: each endpoint's schema is re-fetched; change is detected by
//!   content-hashing the fetched definitions against the last resolution.
//! - **Managed**: the remote registry is re-fetched; the registry response
//!   itself carries the change signal.
//!
//! Resolution failures are fatal at first load but recoverable during
//! background polling (the caller logs and retries on the next tick).
//!
//! A resolution only becomes the comparison baseline once the caller
//! [confirms](ServiceRegistry::confirm) it after a successful recomposition.
//! Until then every pass keeps reporting the pending change, so a transient
//! composition failure never swallows the signal.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::{GatewayConfig, ServiceDefinition};
use crate::error::{Error, Result};

/// Outcome of one resolution pass.
#[derive(Debug, Clone)]
pub struct ResolvedServices {
    pub services: Vec<ServiceDefinition>,
    /// Whether the definitions differ from the previous resolution
    pub changed: bool,
    /// Registry composition id, or a content hash for concrete mode
    pub composition_id: Option<String>,
}

/// Managed-registry fetch response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryResponse {
    pub services: Vec<ServiceDefinition>,
    pub composition_id: String,
    pub changed_since_last_fetch: bool,
}

/// Remote fetch operations backing the resolver. Pluggable so tests and
/// embedders can substitute their own registry protocol.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch the service list for a managed graph variant.
    async fn fetch_managed(
        &self,
        api_key: &str,
        graph_variant: &str,
        protocol_version: Option<&str>,
        last_composition_id: Option<&str>,
    ) -> Result<RegistryResponse>;

    /// Fetch the schema definition language document of one concrete endpoint.
    async fn fetch_sdl(&self, name: &str, url: &str) -> Result<String>;
}

/// Resolves the current service definitions for a fixed gateway config,
/// tracking the last-seen composition across calls.
pub struct ServiceRegistry {
    config: GatewayConfig,
    client: Arc<dyn RegistryClient>,
    /// Composition id (managed) or content hash (concrete) of the last
    /// confirmed resolution
    last_seen: Mutex<Option<String>>,
}

impl ServiceRegistry {
    /// Validates the config; managed mode without a resolvable credential
    /// fails here, before the gateway ever reports ready.
    pub fn new(config: GatewayConfig, client: Arc<dyn RegistryClient>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            client,
            last_seen: Mutex::new(None),
        })
    }

    pub fn is_local(&self) -> bool {
        self.config.is_local()
    }

    /// Produce the current service definitions and whether they changed since
    /// the previous resolution.
    pub async fn resolve(&self) -> Result<ResolvedServices> {
        match &self.config {
            GatewayConfig::Local { services } => Ok(ResolvedServices {
                services: services.clone(),
                changed: false,
                composition_id: None,
            }),
            GatewayConfig::Concrete { services } => {
                let mut definitions = Vec::with_capacity(services.len());
                for endpoint in services {
                    let sdl = self
                        .client
                        .fetch_sdl(&endpoint.name, &endpoint.url)
                        .await
                        .map_err(|err| {
                            Error::Registry(format!(
                                "failed to fetch schema for service '{}': {}",
                                endpoint.name, err
                            ))
                        })?;
                    definitions.push(ServiceDefinition {
                        name: endpoint.name.clone(),
                        url: Some(endpoint.url.clone()),
                        type_defs: sdl,
                    });
                }

                let hash = content_hash(&definitions);
                let changed = self.last_seen.lock().as_deref() != Some(hash.as_str());
                Ok(ResolvedServices {
                    services: definitions,
                    changed,
                    composition_id: Some(hash),
                })
            }
            GatewayConfig::Managed {
                graph_variant,
                protocol_version,
                ..
            } => {
                let api_key = self.config.resolve_credential()?;
                let last_seen = self.last_seen.lock().clone();
                let response = self
                    .client
                    .fetch_managed(
                        &api_key,
                        graph_variant,
                        protocol_version.as_deref(),
                        last_seen.as_deref(),
                    )
                    .await?;

                Ok(ResolvedServices {
                    services: response.services,
                    changed: response.changed_since_last_fetch,
                    composition_id: Some(response.composition_id),
                })
            }
        }
    }

    /// Record a resolution as applied, making it the baseline for change
    /// detection. Callers confirm only after the resolved definitions have
    /// been composed and published; a failed recomposition leaves the change
    /// pending and the next pass reports it again.
    pub fn confirm(&self, resolved: &ResolvedServices) {
        if let Some(id) = &resolved.composition_id {
            *self.last_seen.lock() = Some(id.clone());
        }
    }
}

/// Stable hash of a definition list, used for concrete-mode change detection.
fn content_hash(definitions: &[ServiceDefinition]) -> String {
    let mut hasher = Sha256::new();
    for definition in definitions {
        hasher.update(definition.name.as_bytes());
        hasher.update([0]);
        if let Some(url) = &definition.url {
            hasher.update(url.as_bytes());
        }
        hasher.update([0]);
        hasher.update(definition.type_defs.as_bytes());
        hasher.update([0]);
    }
    hex::encode(hasher.finalize())
}

/// Default registry client speaking JSON over HTTP.
pub struct HttpRegistryClient {
    registry_url: String,
    client: reqwest::Client,
}

/// Introspection query used to pull a federated service's SDL.
const SDL_QUERY: &str = "query __FederationSdl { _service { sdl } }";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManagedFetchBody<'a> {
    api_key: &'a str,
    graph_variant: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol_version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_composition_id: Option<&'a str>,
}

impl HttpRegistryClient {
    pub fn new(registry_url: impl Into<String>) -> Self {
        Self {
            registry_url: registry_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn fetch_managed(
        &self,
        api_key: &str,
        graph_variant: &str,
        protocol_version: Option<&str>,
        last_composition_id: Option<&str>,
    ) -> Result<RegistryResponse> {
        let body = ManagedFetchBody {
            api_key,
            graph_variant,
            protocol_version,
            last_composition_id,
        };
        let response = self
            .client
            .post(&self.registry_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<RegistryResponse>()
            .await?;
        Ok(response)
    }

    async fn fetch_sdl(&self, name: &str, url: &str) -> Result<String> {
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "query": SDL_QUERY }))
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;

        response
            .pointer("/data/_service/sdl")
            .and_then(|sdl| sdl.as_str())
            .map(String::from)
            .ok_or_else(|| {
                Error::Registry(format!(
                    "service '{}' returned no sdl from {}",
                    name, url
                ))
            })
    }
}

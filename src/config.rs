//! Gateway configuration
//!
//! A gateway runs in exactly one of three modes, fixed at construction:
//!
//! - **Local**: an explicit, static list of service definitions with embedded
//!   type definitions. Never polled.
//! - **Concrete**: a static list of named service endpoints whose schemas are
//!   fetched (and re-fetched on poll) over the network.
//! - **Managed**: service definitions come from a remote registry, keyed by an
//!   API credential and graph variant. The registry drives change detection.
//!
//! All downstream logic switches on the [`GatewayConfig`] variant rather than
//! re-deriving the mode from field presence.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable consulted for the managed-mode credential when the
/// config does not carry one.
pub const CREDENTIAL_ENV_VAR: &str = "FEDERATION_API_KEY";

/// Default interval between background registry polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default approximate byte budget for the query plan cache (30 MiB).
pub const DEFAULT_PLAN_CACHE_MAX_BYTES: usize = 30 * 1024 * 1024;

/// One backend service participating in the federation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    /// Service name, unique within a composition
    pub name: String,
    /// Endpoint URL; required unless the gateway runs in local mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Schema definition language document for this service
    pub type_defs: String,
}

/// A named service endpoint for concrete mode; its schema is fetched over
/// the network rather than supplied inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub url: String,
}

/// Gateway operating mode, fixed for the lifetime of the gateway.
#[derive(Debug, Clone)]
pub enum GatewayConfig {
    /// Static service definitions with embedded type definitions; never polled
    Local { services: Vec<ServiceDefinition> },
    /// Static endpoint list; polling re-fetches each endpoint's schema
    Concrete { services: Vec<ServiceEndpoint> },
    /// Definitions fetched from a remote registry; polling re-fetches the registry
    Managed {
        /// API credential; falls back to [`CREDENTIAL_ENV_VAR`] when `None`
        api_key: Option<String>,
        /// Variant tag selecting which published composition to serve
        graph_variant: String,
        /// Optional pinned registry protocol version
        protocol_version: Option<String>,
    },
}

impl GatewayConfig {
    /// Whether this is the local (never-polled) mode
    pub fn is_local(&self) -> bool {
        matches!(self, GatewayConfig::Local { .. })
    }

    /// Validate the configuration; fatal errors surface here, at construction.
    pub fn validate(&self) -> Result<()> {
        match self {
            GatewayConfig::Local { .. } => Ok(()),
            GatewayConfig::Concrete { services } => {
                for endpoint in services {
                    if endpoint.url.is_empty() {
                        return Err(Error::InvalidConfig(format!(
                            "service '{}' has no url; a url is required outside local mode",
                            endpoint.name
                        )));
                    }
                }
                Ok(())
            }
            GatewayConfig::Managed { .. } => {
                self.resolve_credential()?;
                Ok(())
            }
        }
    }

    /// Resolve the managed-mode credential from config or the process
    /// environment. Errors for non-managed configs or when neither is present.
    pub fn resolve_credential(&self) -> Result<String> {
        let GatewayConfig::Managed { api_key, .. } = self else {
            return Err(Error::InvalidConfig(
                "credential resolution only applies to managed mode".to_string(),
            ));
        };
        if let Some(key) = api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }
        match std::env::var(CREDENTIAL_ENV_VAR) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(Error::InvalidConfig(format!(
                "managed mode requires an API key in the config or the {} environment variable",
                CREDENTIAL_ENV_VAR
            ))),
        }
    }
}

/// Tunables with defaults; the mode itself lives in [`GatewayConfig`].
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Enable verbose gateway debugging
    pub debug: bool,
    /// Allow clients to request a serialized query plan in response extensions
    pub expose_query_plan_experimental: bool,
    /// Interval between background registry polls
    pub poll_interval: Duration,
    /// Approximate byte budget for the query plan cache
    pub plan_cache_max_bytes: usize,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            debug: false,
            expose_query_plan_experimental: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            plan_cache_max_bytes: DEFAULT_PLAN_CACHE_MAX_BYTES,
        }
    }
}

//! Backend transports and the service map
//!
//! Each service in the federation is reached through a [`ServiceTransport`]
//! handle. The service map is rebuilt from scratch on every schema change,
//! never mutated in place. Transport construction performs no network I/O;
//! connections happen at first use.

use async_trait::async_trait;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ServiceDefinition;
use crate::error::{Error, Result};

/// A sub-request sent to one backend service.
#[derive(Debug, Clone, Serialize)]
pub struct SubRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    /// Propagated transport-level metadata; not part of the JSON body
    #[serde(skip)]
    pub headers: HeaderMap,
}

/// Raw result from one backend service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubResponse {
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// Transport handle capable of executing a sub-request against one service.
#[async_trait]
pub trait ServiceTransport: Send + Sync {
    async fn send(&self, request: SubRequest) -> Result<SubResponse>;
}

/// Mapping from service name to its transport handle. Rebuilt wholesale on
/// every schema change.
pub type ServiceMap = HashMap<String, Arc<dyn ServiceTransport>>;

/// Pluggable constructor for per-service transports.
pub trait TransportFactory: Send + Sync {
    fn build(&self, service: &ServiceDefinition) -> Result<Arc<dyn ServiceTransport>>;
}

/// Default transport: posts the sub-request JSON to the service URL.
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl ServiceTransport for HttpTransport {
    async fn send(&self, request: SubRequest) -> Result<SubResponse> {
        let mut builder = self.client.post(&self.url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name.as_str(), value.as_bytes());
        }
        let response = builder
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<SubResponse>()
            .await?;
        Ok(response)
    }
}

/// Default factory producing [`HttpTransport`] handles over a shared client.
pub struct HttpTransportFactory {
    client: reqwest::Client,
}

impl HttpTransportFactory {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for HttpTransportFactory {
    fn build(&self, service: &ServiceDefinition) -> Result<Arc<dyn ServiceTransport>> {
        let Some(url) = service.url.as_deref().filter(|u| !u.is_empty()) else {
            return Err(Error::InvalidConfig(format!(
                "service '{}' has no url; provide one or configure a custom transport factory",
                service.name
            )));
        };
        Ok(Arc::new(HttpTransport::new(url, self.client.clone())))
    }
}

/// Build the service map for a list of definitions.
///
/// Outside local mode, a definition without a URL is a construction-time
/// fatal error naming the offending service.
pub fn build_service_map(
    services: &[ServiceDefinition],
    factory: &dyn TransportFactory,
    local: bool,
) -> Result<ServiceMap> {
    let mut map = ServiceMap::with_capacity(services.len());
    for service in services {
        if !local && service.url.as_deref().map_or(true, str::is_empty) {
            return Err(Error::InvalidConfig(format!(
                "service '{}' has no url; a url is required outside local mode",
                service.name
            )));
        }
        map.insert(service.name.clone(), factory.build(service)?);
    }
    Ok(map)
}

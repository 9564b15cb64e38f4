//! Gateway orchestration: bootstrap, hot reload, and request dispatch
//!
//! The [`Gateway`] ties the pieces together. `load()` resolves the service
//! registry, builds the service map, composes the unified schema, and
//! publishes the `{schema, service map}` bundle as a single atomic snapshot.
//! Every dispatch reads that snapshot exactly once, so an in-flight request
//! always completes against the bundle it started with, even across a
//! hot-reload swap. Schema-change listeners drive the background poller:
//! the first listener on a non-local config starts it, the last one stops it.
//!
//! # Example
//!
//! ```rust,no_run
//! use federation_gateway::{Gateway, GatewayConfig, RequestContext, ServiceEndpoint};
//! use http::HeaderMap;
//!
//! # async fn example(
//! #     composer: std::sync::Arc<dyn federation_gateway::SchemaComposer>,
//! #     planner: std::sync::Arc<dyn federation_gateway::QueryPlanner>,
//! #     executor: std::sync::Arc<dyn federation_gateway::PlanExecutor>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = Gateway::builder()
//!     .with_config(GatewayConfig::Concrete {
//!         services: vec![ServiceEndpoint {
//!             name: "accounts".to_string(),
//!             url: "http://accounts.internal/graphql".to_string(),
//!         }],
//!     })
//!     .with_composer_arc(composer)
//!     .with_planner_arc(planner)
//!     .with_executor_arc(executor)
//!     .build()?;
//!
//! gateway.load().await?;
//! let request = RequestContext::new("{ me { name } }", None, HeaderMap::new());
//! let result = gateway.execute(&request).await?;
//! # Ok(())
//! # }
//! ```

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{GatewayConfig, GatewayOptions};
use crate::error::{Error, Result};
use crate::plan::{ExecutionResult, PlanExecutor, QueryPlanner, RequestContext};
use crate::plan_cache::{PlanCacheStats, QueryPlanCache};
use crate::poller::Poller;
use crate::registry::{HttpRegistryClient, RegistryClient, ResolvedServices, ServiceRegistry};
use crate::schema::{compose_and_finalize, SchemaComposer, UnifiedSchema};
use crate::transport::{build_service_map, HttpTransportFactory, ServiceMap, TransportFactory};

/// Request header that asks for a serialized query plan in the response
/// extensions. Honored only when
/// [`GatewayOptions::expose_query_plan_experimental`] is enabled.
pub const QUERY_PLAN_HEADER: &str = "federation-query-plan-experimental";

/// Extension key under which the serialized plan is attached.
pub const QUERY_PLAN_EXTENSION_KEY: &str = "__queryPlanExperimental";

/// Registry endpoint used when no custom [`RegistryClient`] is configured.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.federation.dev/api/graphs";

/// Payload delivered to schema-change listeners after each publication.
pub struct SchemaChange {
    pub schema: Arc<UnifiedSchema>,
    pub service_map: Arc<ServiceMap>,
}

/// A registered schema-change callback. Registration deduplicates by `Arc`
/// pointer identity: re-registering the identical handle is a no-op.
pub type SchemaChangeListener = Arc<dyn Fn(&SchemaChange) + Send + Sync>;

/// The published bundle. Swapped as a whole, never field by field.
struct GatewayState {
    schema: Arc<UnifiedSchema>,
    service_map: Arc<ServiceMap>,
}

pub(crate) struct GatewayInner {
    options: GatewayOptions,
    registry: ServiceRegistry,
    composer: Arc<dyn SchemaComposer>,
    planner: Arc<dyn QueryPlanner>,
    executor: Arc<dyn PlanExecutor>,
    transport_factory: Arc<dyn TransportFactory>,
    local: bool,
    state: ArcSwapOption<GatewayState>,
    plan_cache: Arc<QueryPlanCache>,
    listeners: Mutex<Vec<SchemaChangeListener>>,
    poller: Mutex<Poller>,
    /// Serializes concurrent `load()` calls so composition happens once
    load_lock: tokio::sync::Mutex<()>,
}

impl GatewayInner {
    /// One poll cycle: resolve, and on change flush the plan cache, rebuild,
    /// recompose, publish, notify. Called from the poller task.
    pub(crate) async fn poll_once(&self) -> Result<()> {
        let resolved = self.registry.resolve().await?;
        if !resolved.changed {
            tracing::debug!("service registry unchanged");
            return Ok(());
        }
        tracing::info!(
            composition_id = ?resolved.composition_id,
            "service registry changed; recomposing schema"
        );
        // Flush strictly precedes publication: no plan compiled against the
        // old schema may be served once the new one is live.
        self.plan_cache.flush();
        let state = self.rebuild_and_publish(&resolved).await?;
        // Only a published resolution becomes the change-detection baseline;
        // a failed rebuild leaves the change pending for the next tick.
        self.registry.confirm(&resolved);
        self.notify_listeners(&state);
        Ok(())
    }

    /// Build the full replacement bundle, then swap it in atomically.
    /// The previous bundle is only discarded once this one is complete.
    async fn rebuild_and_publish(&self, resolved: &ResolvedServices) -> Result<Arc<GatewayState>> {
        let service_map = Arc::new(build_service_map(
            &resolved.services,
            self.transport_factory.as_ref(),
            self.local,
        )?);
        let mut schema = compose_and_finalize(self.composer.as_ref(), &resolved.services).await?;
        schema.composition_id = resolved.composition_id.clone();

        let state = Arc::new(GatewayState {
            schema: Arc::new(schema),
            service_map,
        });
        self.state.store(Some(Arc::clone(&state)));
        tracing::info!(
            services = state.service_map.len(),
            composition_id = ?state.schema.composition_id,
            "published new schema"
        );
        if self.options.debug {
            let mut names: Vec<&str> =
                state.service_map.keys().map(String::as_str).collect();
            names.sort_unstable();
            tracing::debug!(services = ?names, "service map rebuilt");
        }
        Ok(state)
    }

    /// Notification strictly follows publication; ordering across listeners
    /// is not guaranteed.
    fn notify_listeners(&self, state: &GatewayState) {
        let listeners: Vec<SchemaChangeListener> = self.listeners.lock().clone();
        if listeners.is_empty() {
            return;
        }
        let change = SchemaChange {
            schema: Arc::clone(&state.schema),
            service_map: Arc::clone(&state.service_map),
        };
        for listener in &listeners {
            listener(&change);
        }
    }

    fn remove_listener(&self, listener: &SchemaChangeListener) {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|registered| !Arc::ptr_eq(registered, listener));
        if before > 0 && listeners.is_empty() {
            self.poller.lock().stop();
        }
    }
}

/// Handle returned by [`Gateway::on_schema_change`]; call
/// [`ListenerHandle::unsubscribe`] to deregister. Dropping the handle keeps
/// the listener registered.
pub struct ListenerHandle {
    inner: Arc<GatewayInner>,
    listener: SchemaChangeListener,
}

impl ListenerHandle {
    pub fn unsubscribe(self) {
        self.inner.remove_listener(&self.listener);
    }
}

/// Federated gateway orchestrator. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    /// Create a new gateway builder
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Idempotent bootstrap: resolve, compose, and publish the initial
    /// bundle. A second call without an intervening registry change returns
    /// the already-published schema without recomposing.
    pub async fn load(&self) -> Result<Arc<UnifiedSchema>> {
        let _guard = self.inner.load_lock.lock().await;

        let (resolved, is_reload) = match self.inner.state.load_full() {
            Some(state) => {
                let resolved = self.inner.registry.resolve().await?;
                if !resolved.changed {
                    tracing::debug!("load(): published schema is current");
                    return Ok(Arc::clone(&state.schema));
                }
                self.inner.plan_cache.flush();
                (resolved, true)
            }
            None => (self.inner.registry.resolve().await?, false),
        };

        let state = self.inner.rebuild_and_publish(&resolved).await?;
        self.inner.registry.confirm(&resolved);
        if is_reload {
            self.inner.notify_listeners(&state);
        }
        Ok(Arc::clone(&state.schema))
    }

    /// Dispatch one request against the currently published bundle.
    ///
    /// The snapshot is taken exactly once; a hot-reload swap mid-flight does
    /// not affect this request. Plan-cache population is fire-and-forget and
    /// can never fail the request.
    pub async fn execute(&self, request: &RequestContext) -> Result<ExecutionResult> {
        let Some(state) = self.inner.state.load_full() else {
            return Err(Error::SchemaNotLoaded);
        };

        let op_ctx = self
            .inner
            .planner
            .build_operation_context(
                Arc::clone(&state.schema),
                &request.document,
                request.operation_name.as_deref(),
            )
            .await?;

        let plan = match self.inner.plan_cache.get(&request.fingerprint) {
            Some(plan) => plan,
            None => {
                tracing::debug!(
                    fingerprint = %request.fingerprint,
                    "query plan cache miss; compiling plan"
                );
                let plan = self.inner.planner.build_query_plan(&op_ctx).await?;
                self.inner
                    .plan_cache
                    .spawn_insert(request.fingerprint.clone(), Arc::clone(&plan));
                plan
            }
        };

        let mut result = self
            .inner
            .executor
            .execute(
                Arc::clone(&plan),
                Arc::clone(&state.service_map),
                request,
                &op_ctx,
            )
            .await?;

        if self.inner.options.expose_query_plan_experimental
            && request.headers.contains_key(QUERY_PLAN_HEADER)
        {
            let serialized = serde_json::to_value(plan.as_ref())?;
            result
                .extensions
                .get_or_insert_with(serde_json::Map::new)
                .insert(QUERY_PLAN_EXTENSION_KEY.to_string(), serialized);
        }

        Ok(result)
    }

    /// Register a schema-change listener.
    ///
    /// The transition from zero to one listener starts the background poller
    /// (unless the config is local, which is never polled); the transition
    /// back to zero stops it.
    pub fn on_schema_change(&self, listener: SchemaChangeListener) -> ListenerHandle {
        let mut listeners = self.inner.listeners.lock();
        let duplicate = listeners
            .iter()
            .any(|registered| Arc::ptr_eq(registered, &listener));
        if !duplicate {
            let was_empty = listeners.is_empty();
            listeners.push(Arc::clone(&listener));
            if was_empty && !self.inner.local {
                self.inner
                    .poller
                    .lock()
                    .start(Arc::clone(&self.inner), self.inner.options.poll_interval);
            }
        }
        ListenerHandle {
            inner: Arc::clone(&self.inner),
            listener,
        }
    }

    /// Halt polling and release the timer task. Idempotent.
    pub fn stop(&self) {
        self.inner.poller.lock().stop();
    }

    /// Whether the background poller is currently running
    pub fn is_polling(&self) -> bool {
        self.inner.poller.lock().is_running()
    }

    /// The currently published schema, if any
    pub fn schema(&self) -> Option<Arc<UnifiedSchema>> {
        self.inner
            .state
            .load_full()
            .map(|state| Arc::clone(&state.schema))
    }

    /// Names of the services in the currently published service map, sorted
    pub fn service_names(&self) -> Vec<String> {
        let Some(state) = self.inner.state.load_full() else {
            return Vec::new();
        };
        let mut names: Vec<String> = state.service_map.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Point-in-time plan cache statistics
    pub fn plan_cache_stats(&self) -> PlanCacheStats {
        self.inner.plan_cache.stats()
    }
}

/// Builder for creating a [`Gateway`].
///
/// The composition, planning, and execution collaborators are required; the
/// transport factory and registry client have HTTP defaults.
pub struct GatewayBuilder {
    config: Option<GatewayConfig>,
    options: GatewayOptions,
    composer: Option<Arc<dyn SchemaComposer>>,
    planner: Option<Arc<dyn QueryPlanner>>,
    executor: Option<Arc<dyn PlanExecutor>>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
    registry_client: Option<Arc<dyn RegistryClient>>,
    registry_url: String,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            options: GatewayOptions::default(),
            composer: None,
            planner: None,
            executor: None,
            transport_factory: None,
            registry_client: None,
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
        }
    }

    /// Set the gateway operating mode (required)
    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Enable verbose gateway debugging
    pub fn debug(mut self, enabled: bool) -> Self {
        self.options.debug = enabled;
        self
    }

    /// Allow clients carrying the [`QUERY_PLAN_HEADER`] header to receive a
    /// serialized query plan in response extensions
    pub fn expose_query_plan_experimental(mut self, enabled: bool) -> Self {
        self.options.expose_query_plan_experimental = enabled;
        self
    }

    /// Override the background poll interval (default 10s)
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    /// Override the plan cache byte budget (default 30 MiB)
    pub fn plan_cache_max_bytes(mut self, max_bytes: usize) -> Self {
        self.options.plan_cache_max_bytes = max_bytes;
        self
    }

    /// Set the schema-composition collaborator (required)
    pub fn with_composer<C: SchemaComposer + 'static>(self, composer: C) -> Self {
        self.with_composer_arc(Arc::new(composer))
    }

    pub fn with_composer_arc(mut self, composer: Arc<dyn SchemaComposer>) -> Self {
        self.composer = Some(composer);
        self
    }

    /// Set the query-plan compiler collaborator (required)
    pub fn with_planner<P: QueryPlanner + 'static>(self, planner: P) -> Self {
        self.with_planner_arc(Arc::new(planner))
    }

    pub fn with_planner_arc(mut self, planner: Arc<dyn QueryPlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Set the distributed plan executor collaborator (required)
    pub fn with_executor<E: PlanExecutor + 'static>(self, executor: E) -> Self {
        self.with_executor_arc(Arc::new(executor))
    }

    pub fn with_executor_arc(mut self, executor: Arc<dyn PlanExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Replace the default HTTP transport factory
    pub fn with_transport_factory<F: TransportFactory + 'static>(mut self, factory: F) -> Self {
        self.transport_factory = Some(Arc::new(factory));
        self
    }

    /// Replace the default HTTP registry client
    pub fn with_registry_client<R: RegistryClient + 'static>(self, client: R) -> Self {
        self.with_registry_client_arc(Arc::new(client))
    }

    pub fn with_registry_client_arc(mut self, client: Arc<dyn RegistryClient>) -> Self {
        self.registry_client = Some(client);
        self
    }

    /// Point the default registry client at a different endpoint
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    /// Build the gateway. Configuration problems (missing credential,
    /// endpoint without a URL) fail here — the gateway never reaches a ready
    /// state on a fatal config error.
    pub fn build(self) -> Result<Gateway> {
        let config = self
            .config
            .ok_or_else(|| Error::InvalidConfig("a gateway configuration is required".to_string()))?;
        let composer = self
            .composer
            .ok_or_else(|| Error::InvalidConfig("a schema composer is required".to_string()))?;
        let planner = self
            .planner
            .ok_or_else(|| Error::InvalidConfig("a query planner is required".to_string()))?;
        let executor = self
            .executor
            .ok_or_else(|| Error::InvalidConfig("a plan executor is required".to_string()))?;

        let local = config.is_local();
        let registry_client = self
            .registry_client
            .unwrap_or_else(|| Arc::new(HttpRegistryClient::new(self.registry_url)));
        let registry = ServiceRegistry::new(config, registry_client)?;

        let plan_cache = Arc::new(QueryPlanCache::new(self.options.plan_cache_max_bytes));
        let inner = Arc::new(GatewayInner {
            options: self.options,
            registry,
            composer,
            planner,
            executor,
            transport_factory: self
                .transport_factory
                .unwrap_or_else(|| Arc::new(HttpTransportFactory::new())),
            local,
            state: ArcSwapOption::from(None),
            plan_cache,
            listeners: Mutex::new(Vec::new()),
            poller: Mutex::new(Poller::new()),
            load_lock: tokio::sync::Mutex::new(()),
        });

        Ok(Gateway { inner })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! # federation-gateway
//!
//! Orchestration core for a federated GraphQL gateway: it unifies several
//! independently-operated backend services behind one schema-driven query
//! interface and keeps that schema current as backends evolve, without
//! interrupting in-flight traffic.
//!
//! ## Features
//!
//! - **Three operating modes**: local definitions, concrete endpoint lists,
//!   or a managed remote registry — see [`GatewayConfig`]
//! - **Atomic hot reload**: the `{schema, service map}` bundle is swapped as
//!   a whole; in-flight requests finish against the snapshot they started with
//! - **Bounded plan caching**: a byte-budgeted LRU [`QueryPlanCache`] with
//!   fire-and-forget population and a wholesale flush on every schema change
//! - **Subscriber-scoped polling**: the background poller runs exactly while
//!   at least one schema-change listener is registered
//! - **Alias-aware resolution**: every composed object field resolves by
//!   response key, so aliased queries return correctly keyed data
//!
//! ## Main Components
//!
//! - [`Gateway`]: lifecycle owner and per-request dispatcher
//! - [`GatewayBuilder`]: configuration builder for the gateway
//! - [`ServiceRegistry`]: resolves the current service definitions per mode
//! - [`QueryPlanCache`]: size-bounded LRU cache of compiled plans
//!
//! The schema-merge algorithm, the plan compiler, and the distributed plan
//! executor are external collaborators supplied through the
//! [`SchemaComposer`], [`QueryPlanner`], and [`PlanExecutor`] traits.

pub mod config;
pub mod error;
pub mod gateway;
pub mod plan;
pub mod plan_cache;
mod poller;
pub mod registry;
pub mod schema;
pub mod transport;

pub use config::{
    GatewayConfig, GatewayOptions, ServiceDefinition, ServiceEndpoint, CREDENTIAL_ENV_VAR,
    DEFAULT_PLAN_CACHE_MAX_BYTES, DEFAULT_POLL_INTERVAL,
};
pub use error::{CompositionError, Error, GraphQLError, Result};
pub use gateway::{
    Gateway, GatewayBuilder, ListenerHandle, SchemaChange, SchemaChangeListener,
    DEFAULT_REGISTRY_URL, QUERY_PLAN_EXTENSION_KEY, QUERY_PLAN_HEADER,
};
pub use plan::{
    ExecutionResult, OperationContext, PlanExecutor, QueryPlan, QueryPlanner, RequestContext,
};
pub use plan_cache::{PlanCacheStats, QueryPlanCache};
pub use registry::{
    HttpRegistryClient, RegistryClient, RegistryResponse, ResolvedServices, ServiceRegistry,
};
pub use schema::{
    resolve_field, CompositionResult, FieldDefinition, FieldResolution, ObjectType,
    SchemaComposer, UnifiedSchema,
};
pub use transport::{
    build_service_map, HttpTransport, HttpTransportFactory, ServiceMap, ServiceTransport,
    SubRequest, SubResponse, TransportFactory,
};

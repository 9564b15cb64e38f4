//! Unified schema and the composition collaborator seam
//!
//! The merge algorithm itself lives behind the [`SchemaComposer`] trait; this
//! module owns the composition *lifecycle*: collecting validation errors into
//! a single fatal failure and finalizing the schema before publication.
//!
//! ## Alias-aware resolution
//!
//! Sub-service responses key results by the *response key* — the alias when
//! the client supplied one, otherwise the field name. A unified schema whose
//! fields resolve by field name alone would silently drop aliased data, so
//! [`compose_and_finalize`] installs [`FieldResolution::AliasAware`] on every
//! field of every object type (introspection types excluded) before the
//! schema is ever published. A published [`UnifiedSchema`] is immutable; a new
//! composition produces a new instance.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::ServiceDefinition;
use crate::error::{CompositionError, Error, Result};

/// How a field's value is pulled out of a sub-service response object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldResolution {
    /// Look up by field name only
    Default,
    /// Look up by response key: the alias when present, else the field name
    AliasAware,
}

/// One field of an object type in the unified schema.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    /// Rendered type of the field, e.g. `"[Review!]!"`
    pub field_type: String,
    pub resolution: FieldResolution,
}

impl FieldDefinition {
    pub fn new(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            resolution: FieldResolution::Default,
        }
    }
}

/// An object type in the unified schema.
#[derive(Debug, Clone, Default)]
pub struct ObjectType {
    pub fields: HashMap<String, FieldDefinition>,
}

/// The single composed schema used for request validation and as input to the
/// plan compiler. Immutable once published.
#[derive(Debug, Clone)]
pub struct UnifiedSchema {
    /// Rendered schema definition language for the whole federation
    pub sdl: String,
    /// Object types by name
    pub types: HashMap<String, ObjectType>,
    /// Identifier of the composition this schema was built from, when known
    pub composition_id: Option<String>,
}

impl UnifiedSchema {
    pub fn new(sdl: impl Into<String>, types: HashMap<String, ObjectType>) -> Self {
        Self {
            sdl: sdl.into(),
            types,
            composition_id: None,
        }
    }
}

/// Outcome of the external composition collaborator: either a schema or a
/// non-empty list of validation errors.
#[derive(Debug, Default)]
pub struct CompositionResult {
    pub schema: Option<UnifiedSchema>,
    pub errors: Vec<CompositionError>,
}

/// External schema-composition collaborator (the merge algorithm is out of
/// scope for this crate).
#[async_trait]
pub trait SchemaComposer: Send + Sync {
    async fn compose(&self, services: &[ServiceDefinition]) -> CompositionResult;
}

/// Run composition and finalize the result for publication.
///
/// Any non-empty error list is fatal and aggregated into a single
/// [`Error::Composition`] — no error is dropped. On success the alias-aware
/// resolution fix-up is applied uniformly before the schema is returned.
pub async fn compose_and_finalize(
    composer: &dyn SchemaComposer,
    services: &[ServiceDefinition],
) -> Result<UnifiedSchema> {
    let result = composer.compose(services).await;
    if !result.errors.is_empty() {
        return Err(Error::Composition(result.errors));
    }
    let mut schema = result.schema.ok_or_else(|| {
        Error::Composition(vec![CompositionError {
            message: "composer returned neither a schema nor errors".to_string(),
            service: None,
        }])
    })?;
    install_alias_resolution(&mut schema);
    Ok(schema)
}

/// Switch every object field to alias-aware resolution, skipping
/// introspection types (names starting with `__`).
fn install_alias_resolution(schema: &mut UnifiedSchema) {
    for (type_name, object) in schema.types.iter_mut() {
        if type_name.starts_with("__") {
            continue;
        }
        for field in object.fields.values_mut() {
            field.resolution = FieldResolution::AliasAware;
        }
    }
}

/// Alias-aware default field resolution: pull a field's value out of a parent
/// response object by its response key.
pub fn resolve_field<'a>(
    parent: &'a serde_json::Value,
    field_name: &str,
    alias: Option<&str>,
) -> Option<&'a serde_json::Value> {
    let response_key = alias.unwrap_or(field_name);
    parent.as_object()?.get(response_key)
}

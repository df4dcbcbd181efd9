//! Component shapes and instances.
//!
//! Components are data-defined rather than Rust types: a component type is a
//! name plus a [`ComponentShape`] (field name → default value). An instance
//! is the shape's defaults overlaid with caller-supplied values and tagged
//! with the entity that owns it.
//!
//! Field maps are `serde_json::Map`, which keeps keys sorted, so field order
//! is identical across runs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::entity::Entity;

/// Field name → value map used for shapes, overrides and instances.
pub type Fields = Map<String, Value>;

/// Errors produced while interpreting component payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComponentError {
    /// A payload that should describe fields was not a JSON object.
    #[error("component payload must be a JSON object or null, got {0}")]
    NotAnObject(&'static str),
}

/// Interpret a JSON payload as a field map.
///
/// `null` is accepted as "no fields", matching the empty-override default.
///
/// # Errors
///
/// Returns [`ComponentError::NotAnObject`] for any other non-object value.
pub fn into_fields(value: Value) -> Result<Fields, ComponentError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Fields::new()),
        other => Err(ComponentError::NotAnObject(kind_of(&other))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The declared fields of a component type and their default values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentShape(Fields);

impl ComponentShape {
    /// Wrap a field map as a shape.
    #[must_use]
    pub fn new(fields: Fields) -> Self {
        Self(fields)
    }

    /// Build a shape from a JSON object (or `null` for a tag component).
    ///
    /// # Errors
    ///
    /// Fails when `value` is neither an object nor `null`.
    pub fn from_value(value: Value) -> Result<Self, ComponentError> {
        into_fields(value).map(Self)
    }

    /// The default field values.
    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.0
    }

    /// Whether the shape declares no fields (a tag component).
    #[must_use]
    pub fn is_tag(&self) -> bool {
        self.0.is_empty()
    }

    /// Build instance fields from the defaults, taking any value present in
    /// `overrides` instead of the default.
    ///
    /// Only declared fields end up in the instance. The names of override
    /// keys the shape does not declare are returned so callers can report
    /// them.
    #[must_use]
    pub fn instantiate(&self, overrides: &Fields) -> (Fields, Vec<String>) {
        let fields = self
            .0
            .iter()
            .map(|(key, default)| {
                let value = overrides.get(key).unwrap_or(default).clone();
                (key.clone(), value)
            })
            .collect();
        (fields, self.undeclared(overrides))
    }

    /// Add every declared field missing from `fields`, using its default.
    ///
    /// Fields already present are left untouched. Returns how many fields
    /// were added.
    pub fn migrate(&self, fields: &mut Fields) -> usize {
        let mut added = 0;
        for (key, default) in &self.0 {
            if !fields.contains_key(key) {
                fields.insert(key.clone(), default.clone());
                added += 1;
            }
        }
        added
    }

    fn undeclared(&self, values: &Fields) -> Vec<String> {
        values
            .keys()
            .filter(|key| !self.0.contains_key(*key))
            .cloned()
            .collect()
    }
}

/// One component attached to one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInstance {
    /// The entity owning this instance.
    pub entity: Entity,
    /// Current field values.
    pub fields: Fields,
}

impl ComponentInstance {
    /// Create an instance owned by `entity`.
    #[must_use]
    pub fn new(entity: Entity, fields: Fields) -> Self {
        Self { entity, fields }
    }

    /// Overwrite the fields named in `values` that this instance already
    /// has.
    ///
    /// Defaults are never re-applied and no new field is introduced; keys
    /// the instance does not have are returned instead.
    pub fn merge(&mut self, values: &Fields) -> Vec<String> {
        let mut ignored = Vec::new();
        for (key, value) in values {
            match self.fields.get_mut(key) {
                Some(slot) => *slot = value.clone(),
                None => ignored.push(key.clone()),
            }
        }
        ignored
    }

    /// Read a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

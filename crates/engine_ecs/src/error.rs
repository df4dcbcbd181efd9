//! World error types.

use engine_component::{ComponentError, Entity};
use thiserror::Error;

/// Coarse classification of a [`WorldError`], for drivers deciding whether
/// a failure should abort the current tick or the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Misuse of types: unregistered names, malformed requirement lists.
    Configuration,
    /// Two-phase ordering violated (used before `compile()`).
    Lifecycle,
    /// Unknown entity or missing component.
    NotFound,
    /// Internal consistency broken. Never expected; indicates a bug.
    Invariant,
    /// Snapshot encoding or decoding failed.
    Snapshot,
}

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("component type '{0}' is not registered")]
    UnregisteredComponent(String),

    #[error("component type '{component}' listed twice in requirement for {context}")]
    DuplicateRequirement {
        component: String,
        context: String,
    },

    #[error("{0} requires at least one component type")]
    EmptyRequirement(String),

    #[error("invalid payload for '{component}': {source}")]
    InvalidPayload {
        component: String,
        #[source]
        source: ComponentError,
    },

    #[error("{operation} called before compile()")]
    NotCompiled { operation: &'static str },

    #[error("entity {0} not found")]
    EntityNotFound(Entity),

    #[error("entity {0} was removed and cannot be added again")]
    EntityRetired(Entity),

    #[error("component '{0}' not found on entity {1}")]
    ComponentNotFound(String, Entity),

    #[error("view {0} not found")]
    ViewNotFound(usize),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("snapshot version {found} is not supported (expected {expected})")]
    SnapshotVersion { found: u32, expected: u32 },

    #[error("snapshot json error: {0}")]
    SnapshotJson(#[from] serde_json::Error),

    #[error("snapshot encode error: {0}")]
    SnapshotEncode(#[from] rmp_serde::encode::Error),

    #[error("snapshot decode error: {0}")]
    SnapshotDecode(#[from] rmp_serde::decode::Error),
}

impl WorldError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorldError::UnregisteredComponent(_)
            | WorldError::DuplicateRequirement { .. }
            | WorldError::EmptyRequirement(_)
            | WorldError::InvalidPayload { .. } => ErrorKind::Configuration,
            WorldError::NotCompiled { .. } => ErrorKind::Lifecycle,
            WorldError::EntityNotFound(_)
            | WorldError::EntityRetired(_)
            | WorldError::ComponentNotFound(..)
            | WorldError::ViewNotFound(_) => ErrorKind::NotFound,
            WorldError::InvariantViolation(_) => ErrorKind::Invariant,
            WorldError::SnapshotVersion { .. }
            | WorldError::SnapshotJson(_)
            | WorldError::SnapshotEncode(_)
            | WorldError::SnapshotDecode(_) => ErrorKind::Snapshot,
        }
    }

    /// Lifecycle errors are a refinement of configuration errors; this is
    /// true for both.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration | ErrorKind::Lifecycle)
    }

    /// Whether this is a not-found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type WorldResult<T> = Result<T, WorldError>;

//! World configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a [`World`](crate::World).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Run the full invariant check after every mutation drain. Debug
    /// builds panic when it fails; release builds log the violation.
    pub check_invariants: bool,
    /// Log a warning when values name fields a component does not declare.
    pub warn_unknown_fields: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            check_invariants: cfg!(debug_assertions),
            warn_unknown_fields: true,
        }
    }
}

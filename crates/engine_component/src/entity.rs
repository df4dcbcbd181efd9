//! Entity identifiers and allocation.
//!
//! An [`Entity`] is an opaque `u64` with no data of its own. Which components
//! an entity owns is derived from its membership mask in the world, never
//! stored on the entity.

use serde::{Deserialize, Serialize};

/// A unique entity identifier.
///
/// Identifiers are handed out in increasing order and are never reused
/// within the lifetime of the allocator that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(pub u64);

impl Entity {
    /// The null / invalid entity sentinel.
    pub const INVALID: Entity = Entity(0);

    /// Create an entity from a raw `u64` identifier.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is a valid (non-zero) entity.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Allocates monotonically increasing entity IDs.
///
/// There is deliberately no free-list: an id handed out once is never handed
/// out again, even after the entity is removed.
#[derive(Debug, Clone)]
pub struct EntityAllocator {
    next_id: u64,
}

impl EntityAllocator {
    /// Creates a new allocator. IDs start at 1 (0 is reserved for [`Entity::INVALID`]).
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Creates an allocator whose next id is `next_id`.
    ///
    /// Used when rebuilding a world from a snapshot. Values below 1 are
    /// clamped so the invalid sentinel is never produced.
    #[must_use]
    pub fn starting_at(next_id: u64) -> Self {
        Self {
            next_id: next_id.max(1),
        }
    }

    /// Allocates a fresh entity ID.
    pub fn allocate(&mut self) -> Entity {
        let id = self.next_id;
        self.next_id += 1;
        Entity(id)
    }

    /// Marks `entity` as used so later allocations never return it.
    ///
    /// Ids supplied from outside the allocator (e.g. `add_entity` with a
    /// caller-chosen id) go through here.
    pub fn reserve(&mut self, entity: Entity) {
        if entity.0 >= self.next_id {
            self.next_id = entity.0 + 1;
        }
    }

    /// The id the next call to [`allocate`](Self::allocate) will return.
    #[must_use]
    pub fn peek(&self) -> Entity {
        Entity(self.next_id)
    }

    /// Returns the number of entities allocated so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.next_id - 1
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

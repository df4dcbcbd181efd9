//! Entity table: live entities and their membership masks.

use std::collections::{BTreeMap, BTreeSet};

use engine_component::{ComponentFlag, Entity, EntityAllocator, Mask};

use crate::error::{WorldError, WorldResult};

/// Owns id allocation and the id → mask mapping.
///
/// An id returned by [`allocate`](Self::allocate) is pending until
/// [`admit`](Self::admit) makes it live. Once removed it is retired for good.
/// Masks live in a `BTreeMap` so every walk over entities happens in id
/// order.
#[derive(Debug, Default)]
pub struct EntityTable {
    allocator: EntityAllocator,
    masks: BTreeMap<Entity, Mask>,
    /// Allocated, not yet live.
    pending: BTreeSet<Entity>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table whose allocator resumes at `next`.
    pub fn resuming_at(next: Entity) -> Self {
        Self {
            allocator: EntityAllocator::starting_at(next.id()),
            masks: BTreeMap::new(),
            pending: BTreeSet::new(),
        }
    }

    pub fn allocate(&mut self) -> Entity {
        let entity = self.allocator.allocate();
        self.pending.insert(entity);
        entity
    }

    /// Make a pending id live with an empty mask.
    ///
    /// Returns `Ok(false)` when it is already live.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityRetired`] for an id that was live once and has
    /// been removed, [`WorldError::EntityNotFound`] for an id this table
    /// never handed out.
    pub fn admit(&mut self, entity: Entity) -> WorldResult<bool> {
        if self.masks.contains_key(&entity) {
            return Ok(false);
        }
        if self.pending.remove(&entity) {
            self.masks.insert(entity, Mask::new());
            return Ok(true);
        }
        if entity.is_valid() && entity < self.allocator.peek() {
            Err(WorldError::EntityRetired(entity))
        } else {
            Err(WorldError::EntityNotFound(entity))
        }
    }

    /// Mark `entity` live with an empty mask, whether or not it came from
    /// [`allocate`](Self::allocate). Used when rebuilding from a snapshot.
    ///
    /// Returns `false` when it was already live; its mask is left alone.
    pub fn insert(&mut self, entity: Entity) -> bool {
        self.allocator.reserve(entity);
        self.pending.remove(&entity);
        if self.masks.contains_key(&entity) {
            return false;
        }
        self.masks.insert(entity, Mask::new());
        true
    }

    /// Drop the entity record, returning its last mask.
    pub fn remove(&mut self, entity: Entity) -> Option<Mask> {
        self.masks.remove(&entity)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.masks.contains_key(&entity)
    }

    pub fn mask(&self, entity: Entity) -> Option<&Mask> {
        self.masks.get(&entity)
    }

    /// Like [`mask`](Self::mask) but reports unknown ids as errors.
    pub fn require(&self, entity: Entity) -> WorldResult<&Mask> {
        self.masks
            .get(&entity)
            .ok_or(WorldError::EntityNotFound(entity))
    }

    pub fn set_flag(&mut self, entity: Entity, flag: ComponentFlag) -> WorldResult<&Mask> {
        let mask = self
            .masks
            .get_mut(&entity)
            .ok_or(WorldError::EntityNotFound(entity))?;
        mask.set(flag);
        Ok(mask)
    }

    pub fn clear_flag(&mut self, entity: Entity, flag: ComponentFlag) -> WorldResult<&Mask> {
        let mask = self
            .masks
            .get_mut(&entity)
            .ok_or(WorldError::EntityNotFound(entity))?;
        mask.clear(flag);
        Ok(mask)
    }

    /// Live entities with their masks, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &Mask)> {
        self.masks.iter().map(|(&entity, mask)| (entity, mask))
    }

    /// The id the allocator will hand out next.
    pub fn next_id(&self) -> Entity {
        self.allocator.peek()
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

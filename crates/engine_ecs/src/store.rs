//! Dense per-type component storage.
//!
//! Each component type owns one [`ComponentStore`]: a contiguous `Vec` of
//! instances plus an entity → slot index. Removal is a swap-remove, so the
//! last instance may change slot; callers receive that move and must
//! re-point any cached slot references (views do this).

use std::collections::HashMap;

use engine_component::{ComponentInstance, ComponentShape, Entity, Fields};

/// An instance that changed slot because of a swap-remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub entity: Entity,
    pub slot: usize,
}

#[derive(Debug, Default)]
pub struct ComponentStore {
    instances: Vec<ComponentInstance>,
    index: HashMap<Entity, usize>,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instance for `entity`, returning its slot.
    ///
    /// The caller guarantees `entity` has no instance here yet.
    pub fn insert(&mut self, entity: Entity, fields: Fields) -> usize {
        debug_assert!(!self.index.contains_key(&entity), "duplicate instance for {entity}");
        let slot = self.instances.len();
        self.instances.push(ComponentInstance::new(entity, fields));
        self.index.insert(entity, slot);
        slot
    }

    /// Swap-remove the instance owned by `entity`.
    ///
    /// Returns the removed instance and, if another instance was moved into
    /// the vacated slot, where it went.
    pub fn remove(&mut self, entity: Entity) -> Option<(ComponentInstance, Option<Relocation>)> {
        let slot = self.index.remove(&entity)?;
        let removed = self.instances.swap_remove(slot);

        let moved = self.instances.get(slot).map(|instance| Relocation {
            entity: instance.entity,
            slot,
        });
        if let Some(relocation) = moved {
            self.index.insert(relocation.entity, slot);
        }
        Some((removed, moved))
    }

    pub fn slot_of(&self, entity: Entity) -> Option<usize> {
        self.index.get(&entity).copied()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.index.contains_key(&entity)
    }

    pub fn get(&self, entity: Entity) -> Option<&ComponentInstance> {
        self.slot_of(entity).map(|slot| &self.instances[slot])
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut ComponentInstance> {
        let slot = self.slot_of(entity)?;
        Some(&mut self.instances[slot])
    }

    /// Instance at a dense slot.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range; slots come from views, which keep
    /// them in range.
    pub fn at(&self, slot: usize) -> &ComponentInstance {
        &self.instances[slot]
    }

    /// Mutable instance at a dense slot. Same panics as [`at`](Self::at).
    pub fn at_mut(&mut self, slot: usize) -> &mut ComponentInstance {
        &mut self.instances[slot]
    }

    /// Apply additive migration to every instance; returns the number of
    /// instances that gained at least one field.
    pub fn migrate(&mut self, shape: &ComponentShape) -> usize {
        self.instances
            .iter_mut()
            .map(|instance| shape.migrate(&mut instance.fields))
            .filter(|&added| added > 0)
            .count()
    }

    /// Stable-partition instances so those whose owner satisfies `front`
    /// come first, rebuilding the slot index.
    ///
    /// Returns `true` if any instance changed slot.
    pub fn partition_by<F>(&mut self, mut front: F) -> bool
    where
        F: FnMut(Entity) -> bool,
    {
        let (mut head, tail): (Vec<_>, Vec<_>) = self
            .instances
            .drain(..)
            .partition(|instance| front(instance.entity));
        head.extend(tail);
        self.instances = head;

        let mut moved = false;
        for (slot, instance) in self.instances.iter().enumerate() {
            if self.index.insert(instance.entity, slot) != Some(slot) {
                moved = true;
            }
        }
        moved
    }

    /// Instances in dense order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentInstance> {
        self.instances.iter()
    }

    /// Owning entities in dense order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.instances.iter().map(|instance| instance.entity)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

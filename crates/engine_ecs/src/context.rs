//! Per-entity access handed to system update functions.

use engine_component::{Entity, Fields, into_fields};
use serde_json::Value;
use tracing::debug;

use crate::commands::{Mutation, MutationQueue};
use crate::entities::EntityTable;
use crate::error::{WorldError, WorldResult};
use crate::events::{Event, EventBus};
use crate::registry::ComponentRegistry;
use crate::store::ComponentStore;
use crate::time::Time;
use crate::view::View;

/// One matched entity and its components, in the order the system
/// declared its required types.
///
/// A row borrows the stores for the duration of one update call; nothing
/// obtained through it can outlive that call.
pub struct Row<'a> {
    pub(crate) stores: &'a mut [ComponentStore],
    pub(crate) view: &'a View,
    /// System arity index → view column.
    pub(crate) order: &'a [usize],
    pub(crate) index: usize,
    pub(crate) entity: Entity,
}

impl Row<'_> {
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Number of components in the row (the system's arity).
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn locate(&self, k: usize) -> (usize, usize) {
        let column = self.order[k];
        let flag = self.view.types()[column];
        (flag.index(), self.view.column(column)[self.index])
    }

    /// Fields of the `k`-th required component.
    ///
    /// # Panics
    ///
    /// Panics if `k >= self.len()`.
    pub fn get(&self, k: usize) -> &Fields {
        let (store, slot) = self.locate(k);
        &self.stores[store].at(slot).fields
    }

    /// Mutable fields of the `k`-th required component.
    ///
    /// # Panics
    ///
    /// Panics if `k >= self.len()`.
    pub fn get_mut(&mut self, k: usize) -> &mut Fields {
        let (store, slot) = self.locate(k);
        &mut self.stores[store].at_mut(slot).fields
    }

    pub fn field(&self, k: usize, key: &str) -> Option<&Value> {
        self.get(k).get(key)
    }

    /// Numeric field as `f64`, if present and numeric.
    pub fn number(&self, k: usize, key: &str) -> Option<f64> {
        self.field(k, key).and_then(Value::as_f64)
    }

    /// Overwrite a field the component already declares.
    ///
    /// Returns `false` and leaves the instance untouched when `key` is not
    /// one of its fields.
    pub fn set_field(&mut self, k: usize, key: &str, value: impl Into<Value>) -> bool {
        match self.get_mut(k).get_mut(key) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }
}

/// World access available to a system while it runs.
///
/// Additions requested here are applied as soon as the requesting system
/// returns, so systems later in the same tick observe them. Removals are
/// queued and applied after the whole pass.
pub struct SystemContext<'a> {
    pub(crate) time: Time,
    pub(crate) entities: &'a mut EntityTable,
    pub(crate) registry: &'a ComponentRegistry,
    pub(crate) additions: &'a mut Vec<Mutation>,
    pub(crate) queue: &'a mut MutationQueue,
    pub(crate) events: &'a mut EventBus,
}

impl SystemContext<'_> {
    pub fn tick(&self) -> u64 {
        self.time.tick
    }

    /// Seconds since the previous tick.
    pub fn delta(&self) -> f64 {
        self.time.delta
    }

    /// Allocate an entity and make it live immediately.
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.entities.allocate();
        self.events.emit(Event::EntityCreated(entity));
        self.entities.insert(entity);
        self.events.emit(Event::EntityAdded(entity));
        debug!(%entity, tick = self.time.tick, "entity spawned by system");
        entity
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    /// Attach `component` to `entity` once the current system returns.
    ///
    /// # Errors
    ///
    /// Fails right away for unknown types, unknown entities or non-object
    /// values.
    pub fn add_component(&mut self, entity: Entity, component: &str, values: Value) -> WorldResult<()> {
        self.registry.require(component)?;
        self.entities.require(entity)?;
        let values = into_fields(values).map_err(|source| WorldError::InvalidPayload {
            component: component.to_string(),
            source,
        })?;
        self.additions.push(Mutation::AddComponent {
            entity,
            component: component.to_string(),
            values,
        });
        Ok(())
    }

    /// Detach `component` from `entity` after the system pass.
    ///
    /// # Errors
    ///
    /// Fails right away for unknown types or unknown entities.
    pub fn remove_component(&mut self, entity: Entity, component: &str) -> WorldResult<()> {
        self.registry.require(component)?;
        self.entities.require(entity)?;
        self.queue.push(Mutation::RemoveComponent {
            entity,
            component: component.to_string(),
        });
        Ok(())
    }

    /// Remove `entity` and all its components after the system pass.
    ///
    /// # Errors
    ///
    /// Fails if `entity` is not live.
    pub fn remove_entity(&mut self, entity: Entity) -> WorldResult<()> {
        let mask = self.entities.require(entity)?;
        for flag in mask.flags() {
            self.queue.push(Mutation::RemoveComponent {
                entity,
                component: self.registry.name_of(flag).to_string(),
            });
        }
        self.queue.push(Mutation::RemoveEntity { entity });
        self.events.emit(Event::EntityRemoving(entity));
        Ok(())
    }
}

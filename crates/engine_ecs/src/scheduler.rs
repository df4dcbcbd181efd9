//! System registration and ordering.
//!
//! Systems live in an ordered `Vec` that defines execution order, plus a
//! name → index map used to replace a system in place when it is registered
//! again under the same name.

use std::collections::HashMap;

use engine_component::{ComponentFlag, Entity};

use crate::context::{Row, SystemContext};
use crate::view::{EntityHook, ViewId};

/// Per-entity update function.
pub type UpdateFn = Box<dyn FnMut(&mut Row<'_>, &mut SystemContext<'_>)>;

/// The callbacks produced by a system's setup function.
pub struct SystemHooks {
    pub(crate) update: UpdateFn,
    pub(crate) on_enter: Option<EntityHook>,
    pub(crate) on_exit: Option<EntityHook>,
}

impl SystemHooks {
    pub fn new<F>(update: F) -> Self
    where
        F: FnMut(&mut Row<'_>, &mut SystemContext<'_>) + 'static,
    {
        Self {
            update: Box::new(update),
            on_enter: None,
            on_exit: None,
        }
    }

    /// Called when an entity starts matching the system's requirements.
    #[must_use]
    pub fn on_enter(mut self, hook: impl FnMut(Entity) + 'static) -> Self {
        self.on_enter = Some(Box::new(hook));
        self
    }

    /// Called when an entity stops matching the system's requirements.
    #[must_use]
    pub fn on_exit(mut self, hook: impl FnMut(Entity) + 'static) -> Self {
        self.on_exit = Some(Box::new(hook));
        self
    }
}

impl std::fmt::Debug for SystemHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemHooks")
            .field("on_enter", &self.on_enter.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish_non_exhaustive()
    }
}

/// A system bound to its view.
pub struct RegisteredSystem {
    pub name: String,
    /// Required type names in declared order.
    pub types: Vec<String>,
    pub flags: Vec<ComponentFlag>,
    pub view: ViewId,
    /// Declared position → view column.
    pub(crate) order: Vec<usize>,
    pub(crate) update: UpdateFn,
}

impl std::fmt::Debug for RegisteredSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredSystem")
            .field("name", &self.name)
            .field("types", &self.types)
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct SystemScheduler {
    systems: Vec<RegisteredSystem>,
    by_name: HashMap<String, usize>,
}

impl SystemScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `system`, or replace the system of the same name without moving
    /// it. Returns the replaced system.
    pub fn insert(&mut self, system: RegisteredSystem) -> Option<RegisteredSystem> {
        match self.by_name.get(&system.name) {
            Some(&index) => Some(std::mem::replace(&mut self.systems[index], system)),
            None => {
                self.by_name.insert(system.name.clone(), self.systems.len());
                self.systems.push(system);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredSystem> {
        self.by_name.get(name).map(|&index| &self.systems[index])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn get_index_mut(&mut self, index: usize) -> Option<&mut RegisteredSystem> {
        self.systems.get_mut(index)
    }

    /// Systems in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSystem> {
        self.systems.iter()
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

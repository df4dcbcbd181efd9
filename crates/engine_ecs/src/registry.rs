//! Component type registry.
//!
//! Maps component type names to their shape and membership flag. Flags are
//! handed out sequentially in registration order, so the same registration
//! sequence always yields the same flags.

use std::collections::HashMap;

use engine_component::{ComponentFlag, ComponentShape, Mask};

use crate::error::{WorldError, WorldResult};

/// A registered component type.
#[derive(Debug, Clone)]
pub struct ComponentType {
    pub name: String,
    pub flag: ComponentFlag,
    pub shape: ComponentShape,
}

/// Outcome of [`ComponentRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First registration; a new flag was allocated.
    New(ComponentFlag),
    /// The type already existed; its shape was replaced and the flag kept.
    Migrated(ComponentFlag),
}

impl Registration {
    pub fn flag(self) -> ComponentFlag {
        match self {
            Registration::New(flag) | Registration::Migrated(flag) => flag,
        }
    }
}

#[derive(Debug, Default)]
pub struct ComponentRegistry {
    /// Indexed by flag.
    types: Vec<ComponentType>,
    by_name: HashMap<String, ComponentFlag>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with `shape`, or replace the shape of an existing
    /// type. Migrating existing instances is the caller's job.
    pub fn register(&mut self, name: &str, shape: ComponentShape) -> Registration {
        if let Some(&flag) = self.by_name.get(name) {
            self.types[flag.index()].shape = shape;
            return Registration::Migrated(flag);
        }

        let flag = ComponentFlag(self.types.len() as u32);
        self.types.push(ComponentType {
            name: name.to_string(),
            flag,
            shape,
        });
        self.by_name.insert(name.to_string(), flag);
        Registration::New(flag)
    }

    pub fn flag_of(&self, name: &str) -> Option<ComponentFlag> {
        self.by_name.get(name).copied()
    }

    /// Like [`flag_of`](Self::flag_of) but reports unknown names as errors.
    pub fn require(&self, name: &str) -> WorldResult<ComponentFlag> {
        self.flag_of(name)
            .ok_or_else(|| WorldError::UnregisteredComponent(name.to_string()))
    }

    /// Resolve an ordered requirement list into flags and the combined mask.
    ///
    /// Rejects empty lists and repeated names; `context` names the caller
    /// in the resulting error.
    pub fn resolve<S: AsRef<str>>(
        &self,
        names: &[S],
        context: &str,
    ) -> WorldResult<(Vec<ComponentFlag>, Mask)> {
        if names.is_empty() {
            return Err(WorldError::EmptyRequirement(context.to_string()));
        }

        let mut flags = Vec::with_capacity(names.len());
        let mut mask = Mask::new();
        for name in names {
            let flag = self.require(name.as_ref())?;
            if mask.has(flag) {
                return Err(WorldError::DuplicateRequirement {
                    component: name.as_ref().to_string(),
                    context: context.to_string(),
                });
            }
            mask.set(flag);
            flags.push(flag);
        }
        Ok((flags, mask))
    }

    pub fn get(&self, flag: ComponentFlag) -> Option<&ComponentType> {
        self.types.get(flag.index())
    }

    pub fn name_of(&self, flag: ComponentFlag) -> &str {
        self.types
            .get(flag.index())
            .map(|ty| ty.name.as_str())
            .unwrap_or("<unregistered>")
    }

    pub fn shape(&self, flag: ComponentFlag) -> Option<&ComponentShape> {
        self.get(flag).map(|ty| &ty.shape)
    }

    /// Names of the types whose flags are set in `mask`, in flag order.
    pub fn names_in<'a>(&'a self, mask: &'a Mask) -> impl Iterator<Item = &'a str> + 'a {
        mask.flags().map(|flag| self.name_of(flag))
    }

    /// Every registered type, in flag order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

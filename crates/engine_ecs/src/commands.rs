//! Deferred structural mutations.
//!
//! Removals requested while a tick is in progress (and any mutation queued
//! explicitly) are recorded as [`Mutation`] commands and applied in FIFO
//! order once the system pass has finished.

use std::collections::VecDeque;

use engine_component::{Entity, Fields};

/// A structural change waiting to be applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    AddComponent {
        entity: Entity,
        component: String,
        values: Fields,
    },
    RemoveComponent {
        entity: Entity,
        component: String,
    },
    RemoveEntity {
        entity: Entity,
    },
}

impl Mutation {
    pub fn entity(&self) -> Entity {
        match self {
            Mutation::AddComponent { entity, .. }
            | Mutation::RemoveComponent { entity, .. }
            | Mutation::RemoveEntity { entity } => *entity,
        }
    }
}

#[derive(Debug, Default)]
pub struct MutationQueue {
    pending: VecDeque<Mutation>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.pending.push_back(mutation);
    }

    /// Take everything queued so far, oldest first.
    ///
    /// Mutations pushed while the returned batch is being applied land in
    /// the queue again and wait for the next drain.
    pub fn take(&mut self) -> VecDeque<Mutation> {
        std::mem::take(&mut self.pending)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

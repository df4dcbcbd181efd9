//! Data-only world snapshots.
//!
//! A [`Snapshot`] carries entities, component stores and the descriptors of
//! views and systems. System code is never serialized: after
//! [`World::restore`] the host registers its systems again, by name, using
//! [`Snapshot::systems`].

use engine_component::{ComponentFlag, ComponentInstance, ComponentShape, Entity};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::WorldConfig;
use crate::entities::EntityTable;
use crate::error::{WorldError, WorldResult};
use crate::registry::Registration;
use crate::store::ComponentStore;
use crate::time::Time;
use crate::world::World;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity: Entity,
    /// Attached component types, in flag order.
    pub components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub name: String,
    pub flag: ComponentFlag,
    pub shape: ComponentShape,
    /// Instances in dense store order.
    pub instances: Vec<ComponentInstance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDescriptor {
    pub types: Vec<String>,
    /// Iteration order at snapshot time.
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemDescriptor {
    pub name: String,
    pub types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub next_entity: Entity,
    pub time: Time,
    pub entities: Vec<EntityRecord>,
    pub components: Vec<ComponentRecord>,
    pub views: Vec<ViewDescriptor>,
    pub systems: Vec<SystemDescriptor>,
}

impl Snapshot {
    pub fn to_json(&self) -> WorldResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> WorldResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// MessagePack with named fields, so the document stays
    /// self-describing.
    pub fn to_msgpack(&self) -> WorldResult<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> WorldResult<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

impl World {
    /// Capture the world's data. Pending mutations are not included; flush
    /// first if they matter.
    pub fn snapshot(&self) -> Snapshot {
        let components = self
            .registry
            .iter()
            .map(|ty| ComponentRecord {
                name: ty.name.clone(),
                flag: ty.flag,
                shape: ty.shape.clone(),
                instances: self.stores[ty.flag.index()].iter().cloned().collect(),
            })
            .collect();

        let entities = self
            .entities
            .iter()
            .map(|(entity, mask)| EntityRecord {
                entity,
                components: self.registry.names_in(mask).map(String::from).collect(),
            })
            .collect();

        let views = self
            .views
            .iter()
            .map(|(_, view)| ViewDescriptor {
                types: view
                    .types()
                    .iter()
                    .map(|&flag| self.registry.name_of(flag).to_string())
                    .collect(),
                entities: view.entities().to_vec(),
            })
            .collect();

        let systems = self
            .scheduler
            .iter()
            .map(|system| SystemDescriptor {
                name: system.name.clone(),
                types: system.types.clone(),
            })
            .collect();

        Snapshot {
            version: SNAPSHOT_VERSION,
            next_entity: self.entities.next_id(),
            time: self.time,
            entities,
            components,
            views,
            systems,
        }
    }

    /// Rebuild a compiled world from `snapshot`, with no systems bound.
    ///
    /// # Errors
    ///
    /// Fails on a version mismatch, or with
    /// [`WorldError::InvariantViolation`] when the document contradicts
    /// itself (instances of dead entities, component lists disagreeing with
    /// the stores, reused flags).
    pub fn restore(snapshot: &Snapshot, config: WorldConfig) -> WorldResult<World> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(WorldError::SnapshotVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let mut world = World::with_config(config);
        world.compiled = true;
        world.time = snapshot.time;
        world.entities = EntityTable::resuming_at(snapshot.next_entity);

        for record in &snapshot.components {
            match world.registry.register(&record.name, record.shape.clone()) {
                Registration::New(flag) if flag == record.flag => {
                    world.stores.push(ComponentStore::new());
                }
                _ => {
                    return Err(WorldError::InvariantViolation(format!(
                        "component '{}' cannot take {}",
                        record.name, record.flag
                    )));
                }
            }
        }

        for record in &snapshot.entities {
            if !world.entities.insert(record.entity) {
                return Err(WorldError::InvariantViolation(format!(
                    "{} listed twice",
                    record.entity
                )));
            }
        }

        for record in &snapshot.components {
            let store = &mut world.stores[record.flag.index()];
            for instance in &record.instances {
                if store.contains(instance.entity) {
                    return Err(WorldError::InvariantViolation(format!(
                        "{} has two '{}' instances",
                        instance.entity, record.name
                    )));
                }
                store.insert(instance.entity, instance.fields.clone());
                world.entities.set_flag(instance.entity, record.flag).map_err(|_| {
                    WorldError::InvariantViolation(format!(
                        "'{}' instance belongs to unknown {}",
                        record.name, instance.entity
                    ))
                })?;
            }
        }

        for record in &snapshot.entities {
            let mask = world.entities.require(record.entity)?;
            let attached: Vec<&str> = world.registry.names_in(mask).collect();
            if attached != record.components {
                return Err(WorldError::InvariantViolation(format!(
                    "{} lists {:?} but owns {:?}",
                    record.entity, record.components, attached
                )));
            }
        }

        for descriptor in &snapshot.views {
            let (flags, mask) = world.registry.resolve(&descriptor.types, "restored view")?;
            let id = world
                .views
                .get_or_create(&flags, mask, &world.stores, &world.entities);
            world
                .views
                .restore_order(id, &descriptor.entities, &world.stores);
        }

        world.check_invariants()?;
        info!(
            entities = world.entities.len(),
            components = world.registry.len(),
            views = world.views.len(),
            tick = world.time.tick,
            "world restored"
        );
        Ok(world)
    }
}

//! # engine_ecs
//!
//! Bitmask ECS storage and query core.
//!
//! A [`World`] owns everything: the component registry, the entity table,
//! one dense store per component type, the cached views systems iterate
//! over, the system scheduler and the deferred mutation queue.
//!
//! ## Usage
//!
//! ```rust
//! use engine_ecs::{SystemHooks, World};
//! use serde_json::json;
//!
//! let mut world = World::new();
//! world.register_component("position", json!({"x": 0.0})).unwrap();
//! world.register_component("velocity", json!({"dx": 0.0})).unwrap();
//! world
//!     .register_system("movement", &["position", "velocity"], || {
//!         SystemHooks::new(|row, ctx| {
//!             let x = row.number(0, "x").unwrap_or(0.0);
//!             let dx = row.number(1, "dx").unwrap_or(0.0);
//!             row.set_field(0, "x", x + dx * ctx.delta());
//!         })
//!     })
//!     .unwrap();
//! world.compile().unwrap();
//!
//! let e = world.spawn();
//! world.add_component(e, "position", json!({})).unwrap();
//! world.add_component(e, "velocity", json!({"dx": 2.0})).unwrap();
//! world.process_tick(0.5).unwrap();
//!
//! assert_eq!(world.get_component(e, "position").unwrap()["x"], json!(1.0));
//! ```

pub mod commands;
pub mod config;
pub mod context;
pub mod entities;
pub mod error;
pub mod events;
pub mod registry;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod time;
pub mod view;
pub mod world;

pub use commands::{Mutation, MutationQueue};
pub use config::WorldConfig;
pub use context::{Row, SystemContext};
pub use entities::EntityTable;
pub use error::{ErrorKind, WorldError, WorldResult};
pub use events::{Event, EventBus, EventSink};
pub use registry::{ComponentRegistry, ComponentType, Registration};
pub use scheduler::{RegisteredSystem, SystemHooks, SystemScheduler};
pub use snapshot::{
    ComponentRecord, EntityRecord, SNAPSHOT_VERSION, Snapshot, SystemDescriptor, ViewDescriptor,
};
pub use store::{ComponentStore, Relocation};
pub use time::{Clock, ManualClock, SystemClock, Time};
pub use view::{View, ViewCache, ViewHooks, ViewId};
pub use world::{Plugin, World};

pub use engine_component::{ComponentFlag, ComponentInstance, ComponentShape, Entity, Fields, Mask};

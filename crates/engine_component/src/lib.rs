//! # engine_component
//!
//! The "E" and "C" of the ECS: identifiers, membership masks and the
//! data-defined component model shared by the world and its collaborators.
//!
//! This crate provides:
//!
//! - [`Entity`]: opaque `u64` entity identifiers.
//! - [`EntityAllocator`]: monotonically increasing, never-reused ID allocator.
//! - [`Mask`] / [`ComponentFlag`]: growable membership bit-sets.
//! - [`ComponentShape`]: a component type's fields and their defaults.
//! - [`ComponentInstance`]: one component's field values, tagged with its owner.

pub mod component;
pub mod entity;
pub mod mask;

pub use component::{ComponentError, ComponentInstance, ComponentShape, Fields, into_fields};
pub use entity::{Entity, EntityAllocator};
pub use mask::{ComponentFlag, Mask};

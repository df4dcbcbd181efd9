//! Demo simulation: particles that drift and expire.
//!
//! `movement` integrates velocity into position. `aging` counts each
//! particle's lifetime down and removes the particle once it runs out, which
//! goes through the deferred removal path.

use engine_ecs::{Entity, SystemHooks, World, WorldResult};
use serde_json::json;
use tracing::{debug, warn};

/// Register the demo components and systems, compile, and spawn
/// `particles` entities.
pub fn install(world: &mut World, particles: usize) -> WorldResult<()> {
    world.register_component("position", json!({"x": 0.0, "y": 0.0}))?;
    world.register_component("velocity", json!({"dx": 0.0, "dy": 0.0}))?;
    world.register_component("lifetime", json!({"remaining": 1.0}))?;

    world.register_system("movement", &["position", "velocity"], || {
        SystemHooks::new(|row, ctx| {
            let dt = ctx.delta();
            let x = row.number(0, "x").unwrap_or(0.0) + row.number(1, "dx").unwrap_or(0.0) * dt;
            let y = row.number(0, "y").unwrap_or(0.0) + row.number(1, "dy").unwrap_or(0.0) * dt;
            row.set_field(0, "x", x);
            row.set_field(0, "y", y);
        })
    })?;

    world.register_system("aging", &["lifetime"], || {
        SystemHooks::new(|row, ctx| {
            let remaining = row.number(0, "remaining").unwrap_or(0.0) - ctx.delta();
            row.set_field(0, "remaining", remaining);
            if remaining <= 0.0 {
                let entity = row.entity();
                if let Err(err) = ctx.remove_entity(entity) {
                    warn!(%entity, %err, "could not expire particle");
                }
            }
        })
        .on_exit(|entity| debug!(%entity, "particle expired"))
    })?;

    world.compile()?;

    for i in 0..particles {
        spawn_particle(world, i)?;
    }
    Ok(())
}

fn spawn_particle(world: &mut World, i: usize) -> WorldResult<Entity> {
    let entity = world.spawn();
    let n = i as f64;
    world.add_component(entity, "position", json!({"x": n, "y": 0.0}))?;
    world.add_component(
        entity,
        "velocity",
        json!({"dx": (i % 5) as f64 + 1.0, "dy": (i % 3) as f64 - 1.0}),
    )?;
    world.add_component(entity, "lifetime", json!({"remaining": 0.5 + (i % 4) as f64 * 0.25}))?;
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particles_move_and_expire() {
        let mut world = World::new();
        install(&mut world, 8).unwrap();
        assert_eq!(world.entity_count(), 8);

        world.process_tick(0.25).unwrap();
        let first = world.entities().next().unwrap();
        let position = world.get_component(first, "position").unwrap();
        assert_eq!(position["x"], json!(0.25));
        assert_eq!(position["y"], json!(-0.25));

        // Lifetimes are 0.5, 0.75, 1.0 and 1.25 seconds.
        world.process_tick(0.25).unwrap();
        assert_eq!(world.entity_count(), 6);
        world.process_tick(0.5).unwrap();
        assert_eq!(world.entity_count(), 2);
        world.process_tick(0.25).unwrap();
        assert_eq!(world.entity_count(), 0);
        world.check_invariants().unwrap();
    }
}

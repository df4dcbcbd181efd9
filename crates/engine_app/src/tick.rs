//! Fixed-timestep tick loop.
//!
//! Each tick:
//!
//! 1. Read the clock.
//! 2. Step the world: systems run in registration order, then deferred
//!    removals are applied.
//! 3. Sleep for whatever is left of the tick budget.

use std::time::{Duration, Instant};

use engine_ecs::{Clock, SystemClock, World, WorldResult};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Configuration for the tick loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20.0,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    fn budget(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(0.001))
    }
}

/// Drives a [`World`] from a [`Clock`].
#[derive(Debug)]
pub struct TickLoop<C: Clock = SystemClock> {
    config: TickConfig,
    world: World,
    clock: C,
    started: bool,
}

impl<C: Clock> TickLoop<C> {
    #[must_use]
    pub fn new(config: TickConfig, world: World, clock: C) -> Self {
        Self {
            config,
            world,
            clock,
            started: false,
        }
    }

    /// Number of ticks completed so far.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.world.time().tick
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Compile the world and take the current clock reading as baseline.
    /// Later calls do nothing.
    pub fn start(&mut self) -> WorldResult<()> {
        if !self.started {
            self.world.start(self.clock.now_ms())?;
            self.started = true;
        }
        Ok(())
    }

    /// Run one tick at the current clock reading.
    pub fn tick(&mut self) -> WorldResult<()> {
        self.start()?;
        self.world.step(self.clock.now_ms())?;

        let time = self.world.time();
        debug!(
            tick_id = time.tick,
            dt = time.delta,
            entities = self.world.entity_count(),
            "tick complete"
        );
        Ok(())
    }

    /// Run the tick loop for the configured number of ticks, or
    /// indefinitely. Blocks the calling thread.
    pub fn run(&mut self) -> WorldResult<()> {
        let tick_duration = self.config.budget();
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );
        self.start()?;

        loop {
            let start = Instant::now();

            self.tick()?;

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
        Ok(())
    }
}

//! # engine_app
//!
//! Runs the particle demo on a fixed-timestep loop.
//!
//! ## Startup Sequence
//!
//! 1. Parse flags and load the optional world configuration file.
//! 2. Register the demo components and systems, compile, spawn particles.
//! 3. Run the tick loop until `--ticks` ticks have elapsed.
//! 4. Optionally write a snapshot of the final world.

mod demo;
mod tick;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use engine_ecs::{Event, Snapshot, World, WorldConfig};
use tracing::{info, trace};
use tracing_subscriber::EnvFilter;

use tick::{TickConfig, TickLoop};

#[derive(Parser)]
#[command(name = "engine_app", about = "Fixed-step driver for the bitmask ECS core")]
struct Args {
    /// Number of ticks to run (0 = run until interrupted)
    #[arg(short, long, default_value_t = 100)]
    ticks: u64,

    /// Target ticks per second
    #[arg(short = 'r', long, default_value_t = 20.0)]
    tick_rate: f64,

    /// Number of particles to spawn
    #[arg(short, long, default_value_t = 64)]
    entities: usize,

    /// JSON file holding a world configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a snapshot of the final world here (`.msgpack` for MessagePack,
    /// JSON otherwise)
    #[arg(short, long)]
    snapshot: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => WorldConfig::default(),
    };
    info!(?config, "engine starting");

    let mut world = World::with_config(config);
    world.subscribe(|event: &Event| trace!(event = event.name(), "world event"));
    demo::install(&mut world, args.entities).context("failed to set up demo world")?;

    let tick_config = TickConfig {
        tick_rate: args.tick_rate,
        max_ticks: args.ticks,
    };
    let mut tick_loop = TickLoop::new(tick_config, world, engine_ecs::SystemClock::new());
    tick_loop.run().context("tick loop failed")?;

    let world = tick_loop.world();
    info!(
        ticks = world.time().tick,
        entities = world.entity_count(),
        views = world.views().len(),
        "simulation finished"
    );

    if let Some(path) = &args.snapshot {
        write_snapshot(&world.snapshot(), path)?;
        info!(path = %path.display(), "snapshot written");
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<WorldConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn write_snapshot(snapshot: &Snapshot, path: &Path) -> Result<()> {
    let bytes = match path.extension().and_then(|ext| ext.to_str()) {
        Some("msgpack") => snapshot.to_msgpack()?,
        _ => snapshot.to_json()?.into_bytes(),
    };
    std::fs::write(path, bytes).with_context(|| format!("writing snapshot {}", path.display()))
}

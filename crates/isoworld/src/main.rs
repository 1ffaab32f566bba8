mod config;

use std::time::Instant;

use clap::Parser;
use glam::{IVec2, Vec2};
use isoworld_core::world::{Camera, DrawKind, FileChunkStorage, World, WorldMetadata};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// World name (directory under the data dir)
    #[arg(long)]
    world: Option<String>,

    /// Seed for a fresh world
    #[arg(long)]
    seed: Option<u64>,

    /// Root directory for saved worlds
    #[arg(long)]
    data_dir: Option<String>,

    /// Number of ticks to walk
    #[arg(long)]
    steps: Option<usize>,

    /// Generation preset: default, meadow, archipelago
    #[arg(long)]
    preset: Option<String>,

    /// Config file to layer over the defaults (without extension)
    #[arg(long)]
    config: Option<String>,

    /// Delete existing world and generate fresh
    #[arg(long)]
    regenerate: bool,

    /// Log at debug level
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Debug, Default)]
struct WalkStats {
    loaded: usize,
    unloaded: usize,
    evicted: usize,
    save_failures: usize,
    placed: usize,
    placement_misses: usize,
    draw_commands: usize,
    structure_draws: usize,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut app = AppConfig::load(args.config.as_deref())?;
    if let Some(world) = args.world {
        app.world.id = world;
    }
    if let Some(seed) = args.seed {
        app.world.seed = seed;
    }
    if let Some(data_dir) = args.data_dir {
        app.storage.data_dir = data_dir;
    }
    if let Some(steps) = args.steps {
        app.walk.steps = steps;
    }
    if let Some(preset) = args.preset {
        app.world.preset = preset;
    }

    let world_config = app.world_config()?;
    let storage = FileChunkStorage::new(&app.storage.data_dir);
    let world_id = app.world.id.clone();

    // Handle --regenerate flag
    if args.regenerate {
        log::info!("--regenerate flag detected, deleting existing world");
        storage.delete_world(&world_id)?;
    }

    let mut metadata = match storage.load_metadata(&world_id)? {
        Some(existing) => {
            log::info!(
                "[LOAD] Opening world '{}' (seed {}, last played {})",
                world_id,
                existing.seed,
                existing.last_played
            );
            if args.seed.is_some_and(|seed| seed != existing.seed) {
                log::warn!(
                    "Ignoring --seed for existing world '{}', use --regenerate to reseed",
                    world_id
                );
            }
            existing
        }
        None => {
            log::info!("[GEN] Creating world '{}' (seed {})", world_id, app.world.seed);
            WorldMetadata::new(&world_id, app.world.seed, &world_config.name)
        }
    };

    let started = Instant::now();
    let mut world = World::new(
        &world_id,
        metadata.seed,
        world_config,
        Box::new(FileChunkStorage::new(&app.storage.data_dir)),
    )?;
    storage.save_metadata(&world_id, &metadata)?;

    let stats = walk(&mut world, &app);

    let saved = world.save_all();
    metadata.touch(started.elapsed().as_secs());
    storage.save_metadata(&world_id, &metadata)?;

    log::info!(
        "[SAVE] Saved {} chunks, {} structures live, {} chunks loaded",
        saved,
        world.structures().count(),
        world.loaded_chunk_count()
    );
    println!("world:             {}", world_id);
    println!("seed:              {}", world.seed());
    println!("ticks:             {}", app.walk.steps);
    println!("chunks loaded:     {}", stats.loaded);
    println!("chunks unloaded:   {}", stats.unloaded);
    println!("chunks evicted:    {}", stats.evicted);
    println!("save failures:     {}", stats.save_failures);
    println!("structures placed: {} ({} misses)", stats.placed, stats.placement_misses);
    println!(
        "draw commands:     {} ({} structures)",
        stats.draw_commands, stats.structure_draws
    );
    println!("chunks saved:      {}", saved);

    Ok(())
}

/// Move a virtual camera across the world, building and drawing as it goes
fn walk(world: &mut World, app: &AppConfig) -> WalkStats {
    let walk = &app.walk;
    let viewport = Vec2::new(app.view.width, app.view.height);
    let step = IVec2::new(walk.step_x, walk.step_y);
    let mut stats = WalkStats::default();
    let mut position = IVec2::ZERO;
    let mut next_template = 0;

    for tick in 0..walk.steps {
        let camera = Camera::new(world.grid_to_world(position), viewport).with_zoom(app.view.zoom);
        if let Some(report) = world.update(&camera) {
            stats.loaded += report.loaded.len();
            stats.unloaded += report.unloaded.len();
            stats.evicted += report.evicted;
            stats.save_failures += report.save_failures;
        }

        if walk.place_every > 0 && tick % walk.place_every == 0 && !walk.templates.is_empty() {
            let template = &walk.templates[next_template % walk.templates.len()];
            next_template += 1;
            match world.find_valid_placement(position, template) {
                Some(site) => match world.place(site, template) {
                    Ok(id) => {
                        stats.placed += 1;
                        world.toggle_light(id);
                    }
                    Err(e) => log::warn!("[PLACE] {}", e),
                },
                None => stats.placement_misses += 1,
            }
        }

        world.tick(walk.tick_seconds);

        let sequence = world.visible_draw_sequence(&camera);
        stats.draw_commands += sequence.len();
        stats.structure_draws += sequence
            .iter()
            .filter(|c| matches!(c.kind, DrawKind::Structure(_)))
            .count();

        position += step;
    }

    stats
}

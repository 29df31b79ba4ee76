//! Skirmish dedicated server.
//!
//! Builds a small two-team arena, issues an opening order for each side and
//! then runs the tick loop until Ctrl-C or the tick limit.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p skirmish_server -- --map-size 48x32 --ticks 600 --verbose
//! cargo run -p skirmish_server -- --config server.ron
//! ```

use std::path::PathBuf;
use std::result::Result;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skirmish_core::prelude::*;
use skirmish_server::queue::{command_queue, CommandSender};
use skirmish_server::scheduler::TickScheduler;
use skirmish_server::{ServerConfig, ServerError};

/// Smallest arena the opening layout fits in.
const MIN_MAP_SIDE: u32 = 16;

#[derive(Parser)]
#[command(name = "skirmish_server")]
#[command(about = "Authoritative tick-driven RTS simulation server")]
#[command(version)]
struct Cli {
    /// RON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ticks per second
    #[arg(long)]
    tick_rate: Option<u32>,

    /// Arena size as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_map_size)]
    map_size: Option<(u32, u32)>,

    /// Stop after this many ticks
    #[arg(long)]
    ticks: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_map_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let width: u32 = w.trim().parse().map_err(|_| format!("bad width '{w}'"))?;
    let height: u32 = h.trim().parse().map_err(|_| format!("bad height '{h}'"))?;
    if width < MIN_MAP_SIDE || height < MIN_MAP_SIDE {
        return Err(format!(
            "map must be at least {MIN_MAP_SIDE}x{MIN_MAP_SIDE}"
        ));
    }
    Ok((width, height))
}

/// Apply CLI overrides on top of the file (or default) config.
fn resolve_config(cli: &Cli) -> Result<ServerConfig, ServerError> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(rate) = cli.tick_rate {
        config.sim.tick_rate = rate;
    }
    if let Some((width, height)) = cli.map_size {
        config.map_width = width;
        config.map_height = height;
    }
    if cli.ticks.is_some() {
        config.max_ticks = cli.ticks;
    }
    config.sim.validate()?;
    Ok(config)
}

/// Open field split by a rock ridge with gaps at both ends.
fn build_arena(config: &ServerConfig) -> Result<TerrainGrid, GameError> {
    let mut terrain = TerrainGrid::new(config.map_width, config.map_height, 1)?;
    let ridge_x = i32::try_from(config.map_width / 2).unwrap_or(i32::MAX);
    let height = i32::try_from(config.map_height).unwrap_or(i32::MAX);
    for y in 3..height - 3 {
        terrain.set_terrain(TilePos::new(ridge_x, y), CellType::Blocked);
    }
    Ok(terrain)
}

/// Spawn both teams and return each team's units.
fn deploy(sim: &mut Simulation) -> Result<(Vec<EntityId>, Vec<EntityId>), GameError> {
    let width = i32::try_from(sim.terrain().width()).unwrap_or(i32::MAX);
    let mid_y = i32::try_from(sim.terrain().height() / 2).unwrap_or(0);

    let mut west = Vec::new();
    let mut east = Vec::new();
    for i in 0..6 {
        let unit = if i % 3 == 0 {
            UnitType::Scout
        } else {
            UnitType::Soldier
        };
        west.push(sim.spawn_unit(unit, 1, 2 + i % 2, mid_y - 3 + i)?);
        east.push(sim.spawn_unit(unit, 2, width - 3 - i % 2, mid_y - 3 + i)?);
    }
    sim.spawn_building(BuildingType::Barracks, 1, 0, 0)?;
    sim.spawn_building(BuildingType::Barracks, 2, width - 2, 0)?;
    Ok((west, east))
}

/// West advances in a box, east answers by attacking the west's lead unit.
fn issue_opening_orders(
    sender: &CommandSender,
    sim: &Simulation,
    west: &[EntityId],
    east: &[EntityId],
) -> Result<(), ServerError> {
    let target = TilePos::new(
        i32::try_from(sim.terrain().width() * 3 / 4).unwrap_or(0),
        i32::try_from(sim.terrain().height() / 2).unwrap_or(0),
    );
    sender.try_submit(CommandEnvelope::from_team(
        1,
        Command::Move {
            units: west.to_vec(),
            target,
            formation: FormationKind::Box,
        },
    ))?;
    if let Some(&lead) = west.first() {
        sender.try_submit(CommandEnvelope::from_team(
            2,
            Command::Attack {
                units: east.to_vec(),
                target: lead,
            },
        ))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(
                    tracing_subscriber::filter::LevelFilter::from_level(log_level).into(),
                )
                .from_env_lossy(),
        )
        .init();

    tracing::info!("Starting Skirmish server");

    let config = resolve_config(&cli)?;
    let mut sim = Simulation::with_config(build_arena(&config)?, config.sim.clone());
    let (west, east) = deploy(&mut sim)?;
    tracing::info!(
        width = config.map_width,
        height = config.map_height,
        entities = sim.entities().len(),
        "Arena ready"
    );

    let (sender, receiver) = command_queue(config.queue_capacity);
    issue_opening_orders(&sender, &sim, &west, &east)?;

    let scheduler = TickScheduler::new(sim, receiver, &config);
    let mut events = scheduler.subscribe_events();
    let observer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(tick) => {
                    for death in &tick.deaths {
                        tracing::info!(tick = tick.tick, entity = death, "Entity destroyed");
                    }
                    for unit in &tick.abandoned {
                        tracing::info!(tick = tick.tick, unit, "Unit gave up its order");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event observer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let (sim, reason) = scheduler.run(shutdown).await;
    drop(sender);
    if let Err(e) = observer.await {
        tracing::warn!(error = %e, "Event observer failed");
    }

    for team in [1, 2] {
        let alive = sim
            .entities()
            .iter()
            .filter(|e| e.team == team)
            .count();
        tracing::info!(team, alive, "Final strength");
    }
    tracing::info!(
        tick = sim.get_tick(),
        hash = sim.state_hash(),
        ?reason,
        "Server stopped"
    );
    Ok(())
}

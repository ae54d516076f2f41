//! Headless host binary.
//!
//! Usage:
//!   cargo run -p bolo_server -- [--addr 0.0.0.0:19014] [--name Host] [--players 2] [--countdown 5]
//!
//! Waits in the lobby until `--players` clients have joined, starts the game
//! on a small generated map, then relays and applies commands every tick
//! until interrupted.

use std::env;

use anyhow::Context;
use bolo_server::{Incoming, Server};
use bolo_shared::{
    command::CommandContext,
    config::NetConfig,
    math::Transform,
    notifier::NetworkObserverNotifier,
    world::{Entity, EntityId, EntityKind, World},
};
use tracing::info;

struct Args {
    cfg: NetConfig,
    players: usize,
}

fn parse_args() -> Args {
    let mut cfg = NetConfig::default();
    let mut players = 1;
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--players" if i + 1 < args.len() => {
                players = args[i + 1].parse().unwrap_or(1);
                i += 2;
            }
            "--countdown" if i + 1 < args.len() => {
                cfg.countdown_secs = args[i + 1].parse().unwrap_or(cfg.countdown_secs);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Args {
        cfg,
        players: players.max(1),
    }
}

/// A bordered arena with one spawn point per requested player.
fn arena(players: usize) -> (World, Vec<Transform>) {
    const SIZE: u16 = 16;
    const TILE: f32 = 32.0;

    let mut world = World::new(SIZE, SIZE);
    for col in 0..SIZE {
        for row in 0..SIZE {
            let edge = col == 0 || row == 0 || col == SIZE - 1 || row == SIZE - 1;
            let kind = if edge { EntityKind::Wall } else { EntityKind::Grass };
            let at = Transform::new(col as f32 * TILE, row as f32 * TILE, 0.0);
            world.insert(Entity::new(EntityId::new_random(), kind, at));
        }
    }

    let spawns = (0..players)
        .map(|i| Transform::new(TILE * 2.0, TILE * (2.0 + 2.0 * i as f32), 0.0))
        .collect();
    (world, spawns)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let Args { cfg, players } = parse_args();
    info!(addr = %cfg.server_addr, name = %cfg.player_name, players, "Starting host");

    let mut server = Server::bind(&cfg.server_addr, &cfg.player_name, &cfg)
        .await
        .context("bind server")?;
    let notifier = NetworkObserverNotifier::new();
    let (mut world, spawns) = arena(players);

    let mut ticker = tokio::time::interval(cfg.tick_interval());
    loop {
        ticker.tick().await;

        for event in server.poll() {
            match event {
                Incoming::Joined { index, name } => info!(index, player = %name, "Lobby join"),
                Incoming::Left { index, name } => info!(index, player = %name, "Lobby leave"),
                Incoming::Command { command, .. } => {
                    let mut ctx = CommandContext::new(&notifier, &cfg.player_name);
                    command.execute(&mut world, &mut ctx);
                }
            }
        }

        if server.state() == bolo_server::ServerState::Lobby && server.client_count() >= players {
            server
                .start_game(&world, &spawns, cfg.countdown_secs)
                .context("start game")?;
        }
    }
}

//! Headless client binary.
//!
//! Usage:
//!   cargo run -p bolo_client -- [--addr 127.0.0.1:19014] [--name Player]
//!
//! Joins a host, prints lobby and game events, and sends each stdin line as
//! a chat message. Once the game starts the client drops its tank at the
//! assigned spawn and replicates it to the other players.
//!
//! Console commands:
//!   <text>  - Send a chat message
//!   quit    - Leave the session

use std::env;
use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use bolo_client::NetworkSystem;
use bolo_shared::{
    command::{Command, MessageKind},
    config::{NetConfig, GAME_PORT},
    notifier::NetworkObserver,
    world::{Entity, EntityId, EntityKind, World},
};
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> (String, NetConfig) {
    let mut cfg = NetConfig::default();
    let mut addr = format!("127.0.0.1:{GAME_PORT}");
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                addr = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    (addr, cfg)
}

/// Prints session events to the terminal.
struct ConsoleObserver;

impl NetworkObserver for ConsoleObserver {
    fn on_connect(&self, client_name: &str, server_name: &str) {
        println!("Joined {server_name}'s game as {client_name}.");
    }

    fn on_client_connected(&self, client_name: &str) {
        println!("{client_name} joined.");
    }

    fn on_client_disconnected(&self, client_name: &str) {
        println!("{client_name} left.");
    }

    fn on_game_start(&self, seconds_until_start: u32) {
        println!("Game starts in {seconds_until_start} seconds.");
    }

    fn on_message_received(&self, kind: MessageKind, message: &str) {
        match kind {
            MessageKind::Chat => println!("{message}"),
            MessageKind::LobbyHistory => {
                for line in message.lines() {
                    println!("  {line}");
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let (addr, cfg) = parse_args();
    let player_name = cfg.player_name.clone();
    info!(server = %addr, player = %player_name, "Starting client");

    let mut net = NetworkSystem::new(cfg);
    net.add_observer(Arc::new(ConsoleObserver));
    net.connect(&addr, &player_name).await.context("connect")?;

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut world = World::default();
    let mut ticker = tokio::time::interval(net.config().tick_interval());

    loop {
        ticker.tick().await;

        while let Ok(line) = console_rx.try_recv() {
            if line == "quit" {
                net.dispose();
                return Ok(());
            }
            net.send_message(&line)?;
        }

        net.update(&mut world)?;

        if let (Some(spawn), None) = (world.local_spawn(), world.local_player()) {
            let id = EntityId::new_random();
            world.set_local_player(Some(id));
            let mut tank = Entity::new(id, EntityKind::Tank, spawn);
            tank.is_local = true;
            world.insert(tank);
            net.send(Command::CreateTank { id, transform: spawn })?;
            info!(tank = %id, ?spawn, "Tank spawned");
        }

        if !net.is_connected() {
            println!("Disconnected from server.");
            break;
        }
    }

    net.dispose();
    Ok(())
}

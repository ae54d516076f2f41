//! Shared helpers for the socket-level scenario tests.
//!
//! A `Peer` bundles one `NetworkSystem`, the world it updates and a
//! `RecordingObserver`. Tests drive several peers from one tokio runtime
//! with `pump_until`, which ticks them until a condition holds.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{bail, Context};
use bolo_client::NetworkSystem;
use bolo_shared::{
    command::MessageKind, config::NetConfig, notifier::NetworkObserver, world::World,
};

/// How long a scenario waits for a condition before failing.
pub const WAIT: Duration = Duration::from_secs(5);

/// One observed lifecycle callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect { client: String, server: String },
    ClientConnected(String),
    ClientDisconnected(String),
    ClientReady(String),
    GameStart(u32),
    Message(MessageKind, String),
}

/// Observer that records every callback in order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, event: Event) {
        self.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    pub fn saw(&self, event: &Event) -> bool {
        self.lock().contains(event)
    }

    pub fn count(&self, event: &Event) -> usize {
        self.lock().iter().filter(|e| *e == event).count()
    }

    /// Text of every received message of `kind`, in arrival order.
    pub fn messages(&self, kind: MessageKind) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                Event::Message(k, text) if *k == kind => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl NetworkObserver for RecordingObserver {
    fn on_connect(&self, client_name: &str, server_name: &str) {
        self.push(Event::Connect {
            client: client_name.to_string(),
            server: server_name.to_string(),
        });
    }

    fn on_client_connected(&self, client_name: &str) {
        self.push(Event::ClientConnected(client_name.to_string()));
    }

    fn on_client_disconnected(&self, client_name: &str) {
        self.push(Event::ClientDisconnected(client_name.to_string()));
    }

    fn on_client_ready(&self, client_name: &str) {
        self.push(Event::ClientReady(client_name.to_string()));
    }

    fn on_game_start(&self, seconds_until_start: u32) {
        self.push(Event::GameStart(seconds_until_start));
    }

    fn on_message_received(&self, kind: MessageKind, message: &str) {
        self.push(Event::Message(kind, message.to_string()));
    }
}

/// Loopback config with an ephemeral port.
pub fn test_config() -> NetConfig {
    NetConfig {
        server_addr: "127.0.0.1:0".to_string(),
        handshake_timeout_ms: 2000,
        ..NetConfig::default()
    }
}

/// A session plus the world it updates.
pub struct Peer {
    pub net: NetworkSystem,
    pub world: World,
    pub events: Arc<RecordingObserver>,
}

impl Peer {
    pub fn new(cfg: NetConfig) -> Self {
        let events = Arc::new(RecordingObserver::default());
        let mut net = NetworkSystem::new(cfg);
        net.add_observer(events.clone());
        Self {
            net,
            world: World::new(16, 16),
            events,
        }
    }

    /// Starts a host on loopback and returns it with its bound address.
    pub async fn host(name: &str) -> anyhow::Result<(Self, SocketAddr)> {
        let mut peer = Peer::new(test_config());
        let addr = peer.net.start_server(name).await.context("start server")?;
        Ok((peer, addr))
    }

    pub async fn join(addr: SocketAddr, name: &str) -> anyhow::Result<Self> {
        let mut peer = Peer::new(test_config());
        peer.net
            .connect(&addr.to_string(), name)
            .await
            .with_context(|| format!("{name} connect"))?;
        Ok(peer)
    }

    /// Runs one simulation tick.
    pub fn tick(&mut self) -> anyhow::Result<()> {
        self.net.update(&mut self.world).context("update")?;
        Ok(())
    }

    /// Live clients on this peer's server. Zero when not hosting.
    pub fn client_count(&self) -> usize {
        self.net.server().map_or(0, |s| s.client_count())
    }
}

/// Calls `step` every few milliseconds until it returns true.
///
/// `step` is expected to tick the peers involved and then check its
/// condition. Fails after `WAIT`.
pub async fn pump_until<F>(what: &str, mut step: F) -> anyhow::Result<()>
where
    F: FnMut() -> anyhow::Result<bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if step()? {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(condition = %what, "Scenario timed out");
            bail!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Installs a test-friendly tracing subscriber. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

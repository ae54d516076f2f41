//! Session facade used by the simulation loop.
//!
//! `NetworkSystem` is the single entry point the game talks to. It is
//! constructed explicitly and passed by reference; there is no global.
//!
//! Lifecycle (one-way):
//!
//! ```text
//! Idle ──start_server──▶ Server ─┐
//!   ├───connect──────▶ Client ───┼──dispose──▶ Disposed
//!   └───start_offline▶ Offline ──┘
//! ```
//!
//! `update` is the only method that touches the world. It must be called
//! once per tick from the simulation thread and never blocks on the network.

use std::{net::SocketAddr, sync::Arc};

use bolo_server::{Incoming, Server};
use bolo_shared::{
    command::{Command, CommandContext},
    config::NetConfig,
    connection::DrainStatus,
    error::NetError,
    math::Transform,
    notifier::{NetworkObserver, NetworkObserverNotifier},
    world::{World, WorldOwner},
};
use tracing::{debug, info};

use crate::client::{ClientLink, ClientState};

enum Role {
    Idle,
    Server(Server),
    Client(ClientLink),
    /// Single player: no sockets, only locally posted commands.
    Offline,
    Disposed,
}

impl Role {
    fn name(&self) -> &'static str {
        match self {
            Role::Idle => "idle",
            Role::Server(_) => "server",
            Role::Client(_) => "client",
            Role::Offline => "offline",
            Role::Disposed => "disposed",
        }
    }
}

pub struct NetworkSystem {
    config: NetConfig,
    role: Role,
    player_name: Option<String>,
    notifier: NetworkObserverNotifier,
    posted: Vec<Command>,
}

impl NetworkSystem {
    pub fn new(config: NetConfig) -> Self {
        Self {
            config,
            role: Role::Idle,
            player_name: None,
            notifier: NetworkObserverNotifier::new(),
            posted: Vec::new(),
        }
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Hosts a session on `config.server_addr`. Returns the bound address.
    pub async fn start_server(&mut self, player_name: &str) -> Result<SocketAddr, NetError> {
        self.ensure_idle()?;
        let server = Server::bind(&self.config.server_addr, player_name, &self.config).await?;
        let addr = server.local_addr();
        self.role = Role::Server(server);
        self.player_name = Some(player_name.to_string());
        Ok(addr)
    }

    /// Joins a host. Resolves once the host has accepted the handshake.
    pub async fn connect(&mut self, addr: &str, player_name: &str) -> Result<(), NetError> {
        self.ensure_idle()?;
        let link = ClientLink::connect(addr, player_name, &self.config).await?;
        self.role = Role::Client(link);
        self.player_name = Some(player_name.to_string());
        Ok(())
    }

    /// Single-player mode: this peer is authoritative and sends go nowhere.
    pub fn start_offline(&mut self, player_name: &str) -> Result<(), NetError> {
        self.ensure_idle()?;
        self.role = Role::Offline;
        self.player_name = Some(player_name.to_string());
        info!(player = %player_name, "Offline session started");
        Ok(())
    }

    /// True for the host, and in single player.
    pub fn is_server(&self) -> bool {
        matches!(self.role, Role::Server(_) | Role::Offline)
    }

    /// False once a client has lost its host, and before any role is chosen.
    pub fn is_connected(&self) -> bool {
        match &self.role {
            Role::Server(_) | Role::Offline => true,
            Role::Client(link) => link.state() == ClientState::Connected,
            Role::Idle | Role::Disposed => false,
        }
    }

    pub fn player_name(&self) -> Option<&str> {
        self.player_name.as_deref()
    }

    /// The hosted server, when this peer is the host.
    pub fn server(&self) -> Option<&Server> {
        match &self.role {
            Role::Server(server) => Some(server),
            _ => None,
        }
    }

    /// Replicates a command to the other peers. The command is not executed
    /// locally. A command too large for the wire is refused with
    /// `NetError::Codec` and every connection stays up.
    pub fn send(&mut self, command: Command) -> Result<(), NetError> {
        match &mut self.role {
            Role::Idle => Err(NetError::NotStarted),
            Role::Disposed => Err(NetError::IllegalState("network system disposed")),
            Role::Server(server) => server.send(command),
            Role::Client(link) => Ok(link.send(&command)?),
            Role::Offline => Ok(()),
        }
    }

    /// Sends a command to one client by player index. Host only.
    pub fn send_to_client(&mut self, index: usize, command: Command) -> Result<(), NetError> {
        match &mut self.role {
            Role::Server(server) => server.send_to_client(index, command),
            Role::Idle => Err(NetError::NotStarted),
            _ => Err(NetError::IllegalState("send_to_client requires the server role")),
        }
    }

    /// Sends a chat line prefixed with this player's name, and shows it to
    /// local observers on the next `update`.
    pub fn send_message(&mut self, text: &str) -> Result<(), NetError> {
        let name = self.player_name.as_deref().ok_or(NetError::NotStarted)?;
        let command = Command::chat(name, text);
        self.send(command.clone())?;
        self.post(command);
        Ok(())
    }

    /// Queues a command to run on the simulation thread during the next
    /// `update`. Nothing is sent.
    pub fn post(&mut self, command: Command) {
        self.posted.push(command);
    }

    /// Applies everything received since the last tick. Never blocks.
    ///
    /// Locally posted commands run first, then network events in the order
    /// they were observed. Commands from one connection keep their send
    /// order; there is no ordering between connections.
    pub fn update(&mut self, owner: &mut dyn WorldOwner) -> Result<(), NetError> {
        match self.role {
            Role::Idle => return Err(NetError::NotStarted),
            Role::Disposed => return Err(NetError::IllegalState("network system disposed")),
            _ => {}
        }

        let name = self.player_name.clone().unwrap_or_default();
        let mut ctx = CommandContext::new(&self.notifier, &name);
        let mut applied = 0usize;
        for command in self.posted.drain(..) {
            command.execute(owner, &mut ctx);
            applied += 1;
        }

        match &mut self.role {
            Role::Server(server) => {
                for event in server.poll() {
                    match event {
                        Incoming::Joined { name, .. } => {
                            self.notifier.notify_client_connected(&name);
                        }
                        Incoming::Command { command, .. } => {
                            command.execute(owner, &mut ctx);
                            applied += 1;
                        }
                        Incoming::Left { name, .. } => {
                            self.notifier.notify_client_disconnected(&name);
                        }
                    }
                }
            }
            Role::Client(link) => {
                let mut batch = Vec::new();
                let status = link.drain(&mut batch);
                for command in &batch {
                    command.execute(owner, &mut ctx);
                }
                applied += batch.len();
                if status == DrainStatus::Closed {
                    self.notifier.notify_client_disconnected(link.server_name());
                }
            }
            Role::Offline | Role::Idle | Role::Disposed => {}
        }

        let replies = ctx.take_replies();
        if applied > 0 {
            debug!(commands = applied, replies = replies.len(), "Applied commands");
        }
        for reply in replies {
            self.send(reply)?;
        }
        Ok(())
    }

    /// Starts the game as host: each live client gets one spawn from
    /// `spawns` plus a snapshot of `world`. Local observers are told the
    /// countdown.
    pub fn start_game(&mut self, world: &World, spawns: &[Transform]) -> Result<(), NetError> {
        let countdown = self.config.countdown_secs;
        match &mut self.role {
            Role::Server(server) => {
                server.start_game(world, spawns, countdown)?;
            }
            Role::Idle => return Err(NetError::NotStarted),
            other => {
                debug!(role = other.name(), "start_game called without the server role");
                return Err(NetError::IllegalState("start_game requires the server role"));
            }
        }
        self.notifier.notify_game_start(countdown);
        Ok(())
    }

    pub fn add_observer(&mut self, observer: Arc<dyn NetworkObserver>) {
        self.notifier.add_observer(observer);
    }

    pub fn remove_observer(&mut self, observer: &Arc<dyn NetworkObserver>) -> bool {
        self.notifier.remove_observer(observer)
    }

    pub fn observer_count(&self) -> usize {
        self.notifier.observer_count()
    }

    /// Closes every socket and ends the session. Idempotent.
    pub fn dispose(&mut self) {
        match std::mem::replace(&mut self.role, Role::Disposed) {
            Role::Server(mut server) => server.dispose(),
            Role::Client(mut link) => link.close(),
            Role::Disposed => return,
            Role::Idle | Role::Offline => {}
        }
        self.player_name = None;
        self.posted.clear();
        info!("Network system disposed");
    }

    fn ensure_idle(&self) -> Result<(), NetError> {
        match self.role {
            Role::Idle => Ok(()),
            Role::Disposed => Err(NetError::IllegalState("network system disposed")),
            _ => Err(NetError::IllegalState("network role already chosen")),
        }
    }
}

impl Drop for NetworkSystem {
    fn drop(&mut self) {
        self.dispose();
    }
}

//! Authoritative host.
//!
//! The server is owned by the simulation thread. One listener task accepts
//! sockets and performs the handshake; everything else happens in `poll`,
//! which the owner calls once per tick. It supports:
//! - Hello/Rejected handshake with a protocol version check
//! - Index-stable roster with tombstones for departed players
//! - Star relay: commands from one client are forwarded to the others
//! - Lobby chat history replayed to late joiners
//! - `start_game`: one spawn per live client, each sent a `StartGame`
//!
//! Threading notes:
//! - Only the listener task assigns player indices, so they follow accept
//!   order without a lock.
//! - Only `poll` mutates the roster; reader and writer tasks hold their own
//!   channel ends, never the roster.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use bolo_shared::{
    command::{Command, MessageKind},
    config::NetConfig,
    connection::{Connection, DrainStatus},
    error::{CodecError, NetError},
    math::Transform,
    net::{encode_command_frame, Message, ReliableConn, PROTOCOL_VERSION},
    world::World,
};
use tokio::{
    net::TcpListener,
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::roster::Roster;

/// Something that happened on the server since the last `poll`.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A player completed the handshake.
    Joined { index: usize, name: String },
    /// A command from a client, to be executed on the host.
    Command { index: usize, command: Command },
    /// A player's connection died. Its index is now a tombstone.
    Left { index: usize, name: String },
}

/// Server lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Lobby,
    InGame,
    Disposed,
}

pub struct Server {
    name: String,
    local_addr: SocketAddr,
    roster: Roster,
    joins: mpsc::UnboundedReceiver<Connection>,
    listener: JoinHandle<()>,
    game_started: Arc<AtomicBool>,
    lobby_log: Vec<String>,
    state: ServerState,
    max_frame: usize,
}

impl Server {
    /// Binds the listen socket and starts accepting players.
    pub async fn bind(addr: &str, server_name: &str, cfg: &NetConfig) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let (join_tx, join_rx) = mpsc::unbounded_channel();
        let game_started = Arc::new(AtomicBool::new(false));
        let accept = AcceptLoop {
            listener,
            server_name: server_name.to_string(),
            handshake_timeout: cfg.handshake_timeout(),
            max_frame: cfg.max_frame_bytes,
            game_started: game_started.clone(),
            joins: join_tx,
        };
        let listener = tokio::spawn(accept.run());

        info!(server = %server_name, %local_addr, "Server listening");
        Ok(Self {
            name: server_name.to_string(),
            local_addr,
            roster: Roster::new(),
            joins: join_rx,
            listener,
            game_started,
            lobby_log: Vec::new(),
            state: ServerState::Lobby,
            max_frame: cfg.max_frame_bytes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Number of live client connections.
    pub fn client_count(&self) -> usize {
        self.roster.live_count()
    }

    /// Chat lines seen before the game started.
    pub fn lobby_log(&self) -> &[String] {
        &self.lobby_log
    }

    /// Broadcasts a command to every live client.
    ///
    /// A command that cannot be encoded is returned as an error and nothing
    /// is sent.
    pub fn send(&mut self, command: Command) -> Result<(), NetError> {
        self.ensure_open()?;
        self.broadcast(&command, None)?;
        self.record_chat(&command);
        Ok(())
    }

    /// Sends a command to one client by player index.
    ///
    /// A departed player's index is accepted and the command dropped.
    pub fn send_to_client(&mut self, index: usize, command: Command) -> Result<(), NetError> {
        self.ensure_open()?;
        if !self.roster.is_assigned(index) {
            return Err(NetError::UnknownPlayer(index));
        }
        match self.roster.get(index) {
            Some(conn) => {
                conn.send(&command)?;
            }
            None => {
                warn!(index, command = command.name(), "Dropping command for departed player");
            }
        }
        Ok(())
    }

    /// Admits new players and drains every live connection. Never blocks.
    ///
    /// Client commands are relayed to the other clients here and returned
    /// for the host to execute; joins and departures are returned in the
    /// order they were observed.
    pub fn poll(&mut self) -> Vec<Incoming> {
        let mut events = Vec::new();
        if self.state == ServerState::Disposed {
            return events;
        }

        loop {
            match self.joins.try_recv() {
                Ok(conn) => self.admit(conn, &mut events),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("Listener task stopped; no further players can join");
                    break;
                }
            }
        }

        let mut buf = Vec::new();
        for index in 0..self.roster.len() {
            let Some(conn) = self.roster.get_mut(index) else {
                continue;
            };
            let status = conn.drain(&mut buf);

            for command in buf.drain(..) {
                self.on_client_command(index, &command);
                events.push(Incoming::Command { index, command });
            }

            if status == DrainStatus::Closed {
                if let Some(name) = self.roster.tombstone(index) {
                    info!(index, player = %name, "Player disconnected");
                    let notice = Command::ClientDisconnected {
                        player_name: name.clone(),
                    };
                    if let Err(e) = self.broadcast(&notice, None) {
                        warn!(index, error = %e, "Could not announce departure");
                    }
                    events.push(Incoming::Left { index, name });
                }
            }
        }
        events
    }

    /// Starts the game: assigns `spawns[i]` to the i-th live client and sends
    /// each a `StartGame` carrying the host's world.
    ///
    /// Clients whose connection has died count as gone even if `poll` has
    /// not reaped them yet. Every `StartGame` is encoded before the state
    /// changes, so a failure leaves the lobby open.
    ///
    /// Returns the `(player index, spawn)` assignments.
    pub fn start_game(
        &mut self,
        world: &World,
        spawns: &[Transform],
        countdown_secs: u32,
    ) -> Result<Vec<(usize, Transform)>, NetError> {
        self.ensure_open()?;
        if self.state == ServerState::InGame {
            return Err(NetError::IllegalState("game already started"));
        }
        let live = self.roster.live_count();
        if live == 0 {
            return Err(NetError::IllegalState(
                "cannot start a game with no connected clients",
            ));
        }
        if spawns.len() < live {
            return Err(NetError::IllegalState("fewer spawn points than players"));
        }

        let map = world.snapshot();
        let mut frames = Vec::with_capacity(live);
        for (conn, spawn) in self.roster.live().zip(spawns) {
            let start = Command::StartGame {
                countdown_secs,
                map: map.clone(),
                spawn: Some(*spawn),
            };
            frames.push((conn.index(), *spawn, encode_command_frame(&start, self.max_frame)?));
        }

        self.game_started.store(true, Ordering::Release);
        self.state = ServerState::InGame;

        let mut assigned = Vec::with_capacity(live);
        for (index, spawn, frame) in frames {
            if let Some(conn) = self.roster.get_mut(index) {
                conn.send_frame(frame);
                conn.set_in_game();
                assigned.push((index, spawn));
            }
        }

        info!(players = live, countdown_secs, entities = map.entities.len(), "Game started");
        Ok(assigned)
    }

    /// Closes every connection and the listen socket. Idempotent.
    pub fn dispose(&mut self) {
        if self.state == ServerState::Disposed {
            return;
        }
        self.listener.abort();
        self.roster.close_all();
        self.state = ServerState::Disposed;
        info!(server = %self.name, "Server disposed");
    }

    fn ensure_open(&self) -> Result<(), NetError> {
        match self.state {
            ServerState::Disposed => Err(NetError::IllegalState("server disposed")),
            _ => Ok(()),
        }
    }

    fn admit(&mut self, conn: Connection, events: &mut Vec<Incoming>) {
        let name = conn.name().to_string();
        let index = self.roster.push(conn);

        let joined = Command::ClientConnected {
            player_name: name.clone(),
        };
        if let Err(e) = self.broadcast(&joined, Some(index)) {
            warn!(index, error = %e, "Could not announce join");
        }

        // Roll call first, then the lobby transcript one line per command.
        let mut welcome: Vec<Command> = self
            .roster
            .live()
            .filter(|c| c.index() != index)
            .map(|other| Command::ClientConnected {
                player_name: other.name().to_string(),
            })
            .collect();
        welcome.extend(self.lobby_log.iter().map(|line| Command::SendMessage {
            kind: MessageKind::LobbyHistory,
            text: line.clone(),
        }));

        if let Some(newcomer) = self.roster.get(index) {
            for cmd in &welcome {
                if let Err(e) = newcomer.send(cmd) {
                    warn!(index, command = cmd.name(), error = %e, "Skipping welcome command");
                }
            }
        }

        info!(index, player = %name, "Player joined");
        events.push(Incoming::Joined { index, name });
    }

    fn on_client_command(&mut self, from: usize, command: &Command) {
        if let Command::MapDownloadComplete { player_name } = command {
            if let Some(conn) = self.roster.get_mut(from) {
                conn.set_ready(true);
            }
            debug!(index = from, player = %player_name, "Player ready");
        }
        if command.is_session_bookkeeping() {
            return;
        }

        self.record_chat(command);
        if let Err(e) = self.broadcast(command, Some(from)) {
            warn!(index = from, command = command.name(), error = %e, "Relay failed");
        }
    }

    /// Encodes once and queues the frame on every live connection except
    /// `except`.
    fn broadcast(&self, command: &Command, except: Option<usize>) -> Result<(), CodecError> {
        let frame = encode_command_frame(command, self.max_frame)?;
        for conn in self.roster.live().filter(|c| Some(c.index()) != except) {
            conn.send_frame(frame.clone());
        }
        Ok(())
    }

    fn record_chat(&mut self, command: &Command) {
        if self.state != ServerState::Lobby {
            return;
        }
        if let Command::SendMessage {
            kind: MessageKind::Chat,
            text,
        } = command
        {
            self.lobby_log.push(text.clone());
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Pause after a failed `accept`, e.g. when out of file descriptors.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// State owned by the listener task.
struct AcceptLoop {
    listener: TcpListener,
    server_name: String,
    handshake_timeout: Duration,
    max_frame: usize,
    game_started: Arc<AtomicBool>,
    joins: mpsc::UnboundedSender<Connection>,
}

impl AcceptLoop {
    async fn run(self) {
        let mut next_index = 0usize;
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };
            let conn = ReliableConn::new(stream, self.max_frame);

            match tokio::time::timeout(self.handshake_timeout, self.handshake(conn, next_index))
                .await
            {
                Ok(Ok(Some(connection))) => {
                    next_index += 1;
                    if self.joins.send(connection).is_err() {
                        debug!("Server dropped; listener exiting");
                        return;
                    }
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!(%peer, error = %e, "Handshake failed"),
                Err(_) => warn!(%peer, "Handshake timed out"),
            }
        }
    }

    /// Returns `Ok(None)` when the peer was turned away.
    async fn handshake(
        &self,
        mut conn: ReliableConn,
        index: usize,
    ) -> Result<Option<Connection>, NetError> {
        let player_name = match conn.recv().await? {
            Some(Message::Hello {
                protocol,
                player_name,
            }) => {
                if protocol != PROTOCOL_VERSION {
                    let reason = format!(
                        "protocol version mismatch: server {PROTOCOL_VERSION}, client {protocol}"
                    );
                    warn!(player = %player_name, %reason, "Rejecting player");
                    conn.send(&Message::Rejected { reason }).await?;
                    return Ok(None);
                }
                player_name
            }
            Some(other) => return Err(NetError::UnexpectedHandshake(format!("{other:?}"))),
            None => return Err(NetError::UnexpectedHandshake("closed before Hello".into())),
        };

        if self.game_started.load(Ordering::Acquire) {
            info!(player = %player_name, "Rejecting player; game already started");
            conn.send(&Message::Rejected {
                reason: "game already started".into(),
            })
            .await?;
            return Ok(None);
        }

        conn.send(&Message::Command(Command::ConnectedToServer {
            client_name: player_name.clone(),
            server_name: self.server_name.clone(),
        }))
        .await?;

        Ok(Some(Connection::spawn(conn, player_name, index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn bind_local() -> Server {
        Server::bind("127.0.0.1:0", "Host", &NetConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn start_game_without_clients_is_illegal() {
        let mut server = bind_local().await;
        let err = server
            .start_game(&World::new(4, 4), &[Transform::ZERO], 5)
            .unwrap_err();
        assert!(err.is_illegal_state());
        assert_eq!(server.state(), ServerState::Lobby);
    }

    #[tokio::test]
    async fn unassigned_index_is_unknown_player() {
        let mut server = bind_local().await;
        let err = server
            .send_to_client(3, Command::chat("Host", "hi"))
            .unwrap_err();
        assert!(matches!(err, NetError::UnknownPlayer(3)));
    }

    #[tokio::test]
    async fn host_chat_is_logged_only_in_lobby() {
        let mut server = bind_local().await;
        server.send(Command::chat("Host", "welcome")).unwrap();
        server
            .send(Command::SendMessage {
                kind: MessageKind::LobbyHistory,
                text: "ignored".into(),
            })
            .unwrap();
        assert_eq!(server.lobby_log(), ["Host: welcome".to_string()]);
    }

    #[tokio::test]
    async fn oversized_chat_is_refused_and_not_logged() {
        let mut server = bind_local().await;
        let err = server
            .send(Command::chat("Host", &"x".repeat(70_000)))
            .unwrap_err();
        assert!(matches!(err, NetError::Codec(CodecError::TooLong { .. })));
        assert!(server.lobby_log().is_empty());
        assert_eq!(server.state(), ServerState::Lobby);
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let mut server = bind_local().await;
        server.dispose();
        server.dispose();
        assert_eq!(server.state(), ServerState::Disposed);
        assert!(server.poll().is_empty());
        assert!(server.send(Command::chat("Host", "late")).unwrap_err().is_illegal_state());
    }
}

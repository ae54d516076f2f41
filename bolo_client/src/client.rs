//! Client role connection.
//!
//! The client keeps a single reliable stream to the host:
//! - `Hello` goes out first, carrying the protocol version and player name
//! - the host answers `Rejected`, or the first command `ConnectedToServer`
//! - after that the stream is handed to a `Connection` (reader task plus
//!   ordered writer worker)

use bolo_shared::{
    command::Command,
    config::NetConfig,
    connection::{Connection, DrainStatus},
    error::{CodecError, NetError},
    net::{Message, ReliableConn},
};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connected,
    /// The host went away. Nothing more will be received.
    Disconnected,
}

/// A client's link to the host.
pub struct ClientLink {
    conn: Connection,
    server_name: String,
    /// `ConnectedToServer`, held back so that it runs on the first drain.
    greeting: Option<Command>,
    state: ClientState,
}

impl ClientLink {
    /// Connects to a server and performs the handshake.
    pub async fn connect(addr: &str, player_name: &str, cfg: &NetConfig) -> Result<Self, NetError> {
        info!(server = %addr, player = %player_name, "Connecting to server");

        let handshake = async {
            let stream = TcpStream::connect(addr).await?;
            let mut conn = ReliableConn::new(stream, cfg.max_frame_bytes);
            conn.send(&Message::hello(player_name)).await?;
            let answer = conn.recv().await?;
            Ok::<_, NetError>((conn, answer))
        };
        let (conn, answer) = tokio::time::timeout(cfg.handshake_timeout(), handshake)
            .await
            .map_err(|_| NetError::HandshakeTimeout)??;

        let (greeting, server_name) = match answer {
            Some(Message::Command(Command::ConnectedToServer {
                client_name,
                server_name,
            })) => (
                Command::ConnectedToServer {
                    client_name,
                    server_name: server_name.clone(),
                },
                server_name,
            ),
            Some(Message::Rejected { reason }) => {
                warn!(server = %addr, %reason, "Connection rejected");
                return Err(NetError::Rejected(reason));
            }
            Some(other) => return Err(NetError::UnexpectedHandshake(format!("{other:?}"))),
            None => {
                return Err(NetError::UnexpectedHandshake(
                    "server closed the connection".into(),
                ))
            }
        };
        info!(server = %server_name, "Connected to server");
        Ok(Self {
            conn: Connection::spawn(conn, server_name.clone(), 0),
            server_name,
            greeting: Some(greeting),
            state: ClientState::Connected,
        })
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Queues a command for the host. Dropped if the host is gone; a
    /// command that cannot be encoded is returned as an error.
    pub fn send(&self, command: &Command) -> Result<(), CodecError> {
        if !self.conn.send(command)? {
            debug!(server = %self.server_name, "Server connection dead; command dropped");
        }
        Ok(())
    }

    /// Moves received commands into `out`, in receipt order.
    ///
    /// Returns `DrainStatus::Closed` exactly once, on the drain that first
    /// observes the host going away.
    pub fn drain(&mut self, out: &mut Vec<Command>) -> DrainStatus {
        if let Some(greeting) = self.greeting.take() {
            out.push(greeting);
        }
        if self.state == ClientState::Disconnected {
            return DrainStatus::Open;
        }
        let status = self.conn.drain(out);
        if status == DrainStatus::Closed {
            info!(server = %self.server_name, "Lost connection to server");
            self.state = ClientState::Disconnected;
        }
        status
    }

    pub fn close(&mut self) {
        self.conn.close();
        self.state = ClientState::Disconnected;
    }
}

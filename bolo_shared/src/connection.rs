//! One peer's socket after the handshake.
//!
//! Each `Connection` owns two tokio tasks:
//! - a reader that decodes inbound commands into an unbounded queue until
//!   the stream ends or fails;
//! - a writer worker that drains an ordered outbound queue through a
//!   `NetworkSender`.
//!
//! The owning thread never awaits: `send` encodes and enqueues, and `drain`
//! only calls `try_recv`. A command that cannot be encoded is returned to the
//! caller and the connection stays up. Either task failing marks the
//! connection dead. A dead connection is never revived.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use bytes::Bytes;
use tokio::{
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    command::Command,
    error::CodecError,
    net::{encode_command_frame, read_message, Message, ReliableConn},
    sender::NetworkSender,
};

/// Result of draining a connection's inbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    Open,
    /// The connection died. Commands it delivered before dying were still
    /// returned by this drain.
    Closed,
}

pub struct Connection {
    name: String,
    index: usize,
    max_frame: usize,
    outbound: mpsc::UnboundedSender<Bytes>,
    inbound: mpsc::UnboundedReceiver<Command>,
    alive: Arc<AtomicBool>,
    ready: bool,
    in_game: bool,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    /// Splits a handshaken stream and starts its reader and writer tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(conn: ReliableConn, name: impl Into<String>, index: usize) -> Self {
        let name = name.into();
        let max_frame = conn.max_frame();
        let (mut read_half, write_half) = conn.into_split();
        let alive = Arc::new(AtomicBool::new(true));

        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let reader_alive = alive.clone();
        let reader_name = name.clone();
        let reader = tokio::spawn(async move {
            loop {
                match read_message(&mut read_half, max_frame).await {
                    Ok(Some(Message::Command(cmd))) => {
                        if in_tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Ok(Some(other)) => {
                        warn!(
                            peer = %reader_name,
                            message = ?other,
                            "Unexpected message after handshake"
                        );
                        break;
                    }
                    Ok(None) => {
                        info!(peer = %reader_name, "Connection closed by peer");
                        break;
                    }
                    Err(e) => {
                        warn!(peer = %reader_name, error = %e, "Connection read failed");
                        break;
                    }
                }
            }
            reader_alive.store(false, Ordering::Release);
        });

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Bytes>();
        let writer_alive = alive.clone();
        let writer_name = name.clone();
        let writer = tokio::spawn(async move {
            let mut sender = NetworkSender::new(write_half, max_frame);
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = sender.send(&frame).await {
                    warn!(peer = %writer_name, error = %e, "Send failed; marking connection dead");
                    writer_alive.store(false, Ordering::Release);
                    break;
                }
            }
        });

        debug!(peer = %name, index, "Connection tasks started");
        Self {
            name,
            index,
            max_frame,
            outbound: out_tx,
            inbound: in_rx,
            alive,
            ready: false,
            in_game: false,
            reader,
            writer,
        }
    }

    /// Player name of the peer (the server's name, on a client).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Whether the peer has finished loading the map.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn in_game(&self) -> bool {
        self.in_game
    }

    pub fn set_in_game(&mut self) {
        self.in_game = true;
    }

    pub fn max_frame(&self) -> usize {
        self.max_frame
    }

    /// Encodes a command and queues it for the writer worker.
    ///
    /// `Ok(false)` means the connection is already dead and the command was
    /// dropped. An encoding error leaves the connection untouched.
    pub fn send(&self, command: &Command) -> Result<bool, CodecError> {
        let frame = encode_command_frame(command, self.max_frame)?;
        Ok(self.send_frame(frame))
    }

    /// Queues an already encoded command. Used to broadcast one encoding
    /// to many connections.
    pub fn send_frame(&self, frame: Bytes) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.outbound.send(frame).is_ok()
    }

    /// Moves every buffered inbound command into `out`, in receipt order.
    /// Never blocks.
    pub fn drain(&mut self, out: &mut Vec<Command>) -> DrainStatus {
        // Sampled first: once the reader has flagged death, everything it
        // queued is visible to the loop below.
        let alive = self.is_alive();
        let mut disconnected = false;
        loop {
            match self.inbound.try_recv() {
                Ok(cmd) => out.push(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        if alive && !disconnected {
            DrainStatus::Open
        } else {
            self.close();
            DrainStatus::Closed
        }
    }

    /// Stops both tasks, which closes the socket. Idempotent.
    pub fn close(&mut self) {
        self.alive.store(false, Ordering::Release);
        self.reader.abort();
        self.writer.abort();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

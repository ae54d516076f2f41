//! Framing and handshake messages.
//!
//! Goals:
//! - One reliable ordered channel (TCP) per peer.
//! - Length-prefixed frames: a u32 BE byte count followed by the payload.
//! - Keep serialization explicit and versionable (see `codec`).
//!
//! Every frame carries exactly one `Message`. Before the handshake completes
//! only `Hello` and `Rejected` are legal; afterwards every frame is a
//! `Message::Command`.

use std::net::SocketAddr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
};

use crate::{
    codec::{self, decode_command, encode_command},
    command::Command,
    error::{CodecError, NetError},
};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default cap on a single frame's payload.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

mod tag {
    pub const HELLO: u8 = 0x01;
    pub const REJECTED: u8 = 0x02;
    pub const COMMAND: u8 = 0x10;
}

/// High-level message envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    // ─── Connection handshake ───
    /// Client -> server: first frame on a new connection.
    Hello { protocol: u32, player_name: String },
    /// Server -> client: the connection is refused and will be closed.
    Rejected { reason: String },

    // ─── Session ───
    Command(Command),
}

impl Message {
    pub fn hello(player_name: &str) -> Self {
        Message::Hello {
            protocol: PROTOCOL_VERSION,
            player_name: player_name.to_string(),
        }
    }
}

pub fn encode_message(msg: &Message) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    match msg {
        Message::Hello {
            protocol,
            player_name,
        } => {
            buf.put_u8(tag::HELLO);
            buf.put_u32(*protocol);
            codec::put_str(&mut buf, player_name)?;
        }
        Message::Rejected { reason } => {
            buf.put_u8(tag::REJECTED);
            codec::put_str(&mut buf, reason)?;
        }
        Message::Command(cmd) => return encode_command_message(cmd),
    }
    Ok(buf.freeze())
}

/// Encodes `Message::Command(cmd)` without taking ownership of `cmd`.
pub fn encode_command_message(cmd: &Command) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    buf.put_u8(tag::COMMAND);
    encode_command(cmd, &mut buf)?;
    Ok(buf.freeze())
}

/// Encodes a command into a frame payload no larger than `max_frame`.
///
/// Connections call this before queuing, so a command that cannot be
/// encoded is returned to the caller and never reaches a writer.
pub fn encode_command_frame(cmd: &Command, max_frame: usize) -> Result<Bytes, CodecError> {
    let payload = encode_command_message(cmd)?;
    if payload.len() > max_frame {
        return Err(CodecError::TooLong {
            what: "frame",
            len: payload.len(),
            max: max_frame,
        });
    }
    Ok(payload)
}

/// Decodes a whole frame payload. Leftover bytes are an error.
pub fn decode_message(mut payload: &[u8]) -> Result<Message, CodecError> {
    let msg = match codec::get_u8(&mut payload)? {
        tag::HELLO => Message::Hello {
            protocol: codec::get_u32(&mut payload)?,
            player_name: codec::get_str(&mut payload)?,
        },
        tag::REJECTED => Message::Rejected {
            reason: codec::get_str(&mut payload)?,
        },
        tag::COMMAND => Message::Command(decode_command(&mut payload)?),
        other => {
            return Err(CodecError::UnknownTag {
                what: "message",
                tag: other,
            })
        }
    };
    if payload.has_remaining() {
        return Err(CodecError::TrailingBytes(payload.remaining()));
    }
    Ok(msg)
}

/// Writes one length-prefixed frame and flushes.
pub async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
    max_frame: usize,
) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > max_frame {
        return Err(CodecError::TooLong {
            what: "frame",
            len: payload.len(),
            max: max_frame,
        }
        .into());
    }
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame payload.
///
/// Returns `Ok(None)` on a clean end of stream at a frame boundary.
pub async fn read_frame<R>(
    reader: &mut R,
    max_frame: usize,
) -> Result<Option<Vec<u8>>, NetError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_frame {
        return Err(CodecError::TooLong {
            what: "frame",
            len,
            max: max_frame,
        }
        .into());
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Reads and decodes one message. `Ok(None)` means the peer closed.
pub async fn read_message<R>(
    reader: &mut R,
    max_frame: usize,
) -> Result<Option<Message>, NetError>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader, max_frame).await? {
        Some(payload) => Ok(Some(decode_message(&payload)?)),
        None => Ok(None),
    }
}

pub async fn write_message<W>(
    writer: &mut W,
    msg: &Message,
    max_frame: usize,
) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    let payload = encode_message(msg)?;
    write_frame(writer, &payload, max_frame).await
}

/// Reliable connection over TCP used during the handshake, before the
/// stream is split into a reader task and a writer worker.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
    max_frame: usize,
}

impl ReliableConn {
    pub fn new(stream: TcpStream, max_frame: usize) -> Self {
        Self { stream, max_frame }
    }

    pub async fn send(&mut self, msg: &Message) -> Result<(), NetError> {
        write_message(&mut self.stream, msg, self.max_frame).await
    }

    pub async fn recv(&mut self) -> Result<Option<Message>, NetError> {
        read_message(&mut self.stream, self.max_frame).await
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.stream.peer_addr()?)
    }

    pub fn max_frame(&self) -> usize {
        self.max_frame
    }

    pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
        self.stream.into_split()
    }
}

//! Error types for the network core.
//!
//! Three failure categories exist:
//! - connection-level I/O failures, recovered locally by marking the
//!   connection dead (`Io`, `Codec` when they surface from a socket);
//! - protocol/state errors, which are programming errors surfaced at the call
//!   site (`IllegalState`, `UnknownPlayer`, `NotStarted`);
//! - command application errors, which never become a `NetError` at all:
//!   they are logged inside `Command::execute` and skipped.

use std::io;

use thiserror::Error;

/// Main error type returned by the network core.
#[derive(Error, Debug)]
pub enum NetError {
    /// The session is in the wrong state for the requested operation.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// `send`/`update` was called before `connect`/`start_server`.
    #[error("network system not started")]
    NotStarted,

    /// `send_to_client` named a player index that was never assigned.
    #[error("unknown player index {0}")]
    UnknownPlayer(usize),

    /// The server refused the handshake.
    #[error("connection rejected: {0}")]
    Rejected(String),

    /// No handshake answer arrived in time.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// The peer answered the handshake with something unexpected.
    #[error("unexpected handshake message: {0}")]
    UnexpectedHandshake(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while decoding a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload truncated: needed {needed} more bytes")]
    Truncated { needed: usize },

    #[error("unknown {what} tag {tag:#04x}")]
    UnknownTag { what: &'static str, tag: u8 },

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("{what} too long: {len} (max {max})")]
    TooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
}

impl NetError {
    /// Returns true for protocol/state programming errors.
    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            NetError::IllegalState(_) | NetError::NotStarted | NetError::UnknownPlayer(_)
        )
    }
}

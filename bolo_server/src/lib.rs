//! `bolo_server`
//!
//! Host-side systems:
//! - Listener task with the Hello/Rejected handshake
//! - Index-stable player roster
//! - Broadcast, per-player sends and the star relay between clients
//! - Game start sequencing
//!
//! Networking model:
//! - One TCP stream per client, length-prefixed frames
//! - Per-connection reader task and ordered writer worker

pub mod roster;
pub mod server;

pub use roster::Roster;
pub use server::{Incoming, Server, ServerState};

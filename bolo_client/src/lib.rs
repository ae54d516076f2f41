//! `bolo_client`
//!
//! Peer-side systems:
//! - `ClientLink`: handshake and the single stream to the host
//! - `NetworkSystem`: the session facade the simulation loop talks to, in
//!   host, client or offline role

pub mod client;
pub mod session;

pub use client::ClientLink;
pub use session::NetworkSystem;

//! `bolo_shared`
//!
//! Network synchronization core shared by host and client.
//!
//! Design goals:
//! - Replicate world changes as small immutable commands, applied once per
//!   receipt on the simulation thread.
//! - Never block the simulation thread on socket I/O.
//! - Keep the wire format explicit and versionable.
//! - No `unsafe`.

pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod math;
pub mod net;
pub mod notifier;
pub mod sender;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::command::*;
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::math::*;
    pub use crate::notifier::*;
    pub use crate::world::*;
}

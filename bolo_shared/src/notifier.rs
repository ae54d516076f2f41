//! Session-lifecycle observers.
//!
//! `NetworkObserverNotifier` is a plain multi-subscriber broadcast that keeps
//! transport code independent of lobby UI and game-state-machine code.
//!
//! - List semantics: the same observer may be registered more than once and
//!   is then notified once per registration.
//! - Observers are called in registration order.
//! - Each callback is isolated: a panicking observer is logged and the
//!   remaining observers are still notified.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use crate::command::MessageKind;

/// Listener for session-lifecycle events. Every method defaults to a no-op.
pub trait NetworkObserver: Send + Sync {
    /// This client finished its handshake with a server.
    fn on_connect(&self, _client_name: &str, _server_name: &str) {}

    /// Another player joined the session.
    fn on_client_connected(&self, _client_name: &str) {}

    /// A player left the session, or this client lost its server.
    fn on_client_disconnected(&self, _client_name: &str) {}

    /// A player finished loading the map.
    fn on_client_ready(&self, _client_name: &str) {}

    /// The host started the game; play begins after the countdown.
    fn on_game_start(&self, _seconds_until_start: u32) {}

    fn on_message_received(&self, _kind: MessageKind, _message: &str) {}
}

/// Broadcasts lifecycle events to registered observers.
#[derive(Default)]
pub struct NetworkObserverNotifier {
    observers: Vec<Arc<dyn NetworkObserver>>,
}

impl NetworkObserverNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Arc<dyn NetworkObserver>) {
        self.observers.push(observer);
    }

    /// Removes one registration of `observer`. Returns false if it was not
    /// registered.
    pub fn remove_observer(&mut self, observer: &Arc<dyn NetworkObserver>) -> bool {
        let target = Arc::as_ptr(observer) as *const ();
        match self
            .observers
            .iter()
            .position(|o| Arc::as_ptr(o) as *const () == target)
        {
            Some(pos) => {
                self.observers.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn notify_connect(&self, client_name: &str, server_name: &str) {
        self.dispatch("on_connect", |o| o.on_connect(client_name, server_name));
    }

    pub fn notify_client_connected(&self, client_name: &str) {
        self.dispatch("on_client_connected", |o| o.on_client_connected(client_name));
    }

    pub fn notify_client_disconnected(&self, client_name: &str) {
        self.dispatch("on_client_disconnected", |o| {
            o.on_client_disconnected(client_name)
        });
    }

    pub fn notify_client_ready(&self, client_name: &str) {
        self.dispatch("on_client_ready", |o| o.on_client_ready(client_name));
    }

    pub fn notify_game_start(&self, seconds_until_start: u32) {
        self.dispatch("on_game_start", |o| o.on_game_start(seconds_until_start));
    }

    pub fn notify_message_received(&self, kind: MessageKind, message: &str) {
        self.dispatch("on_message_received", |o| {
            o.on_message_received(kind, message)
        });
    }

    fn dispatch(&self, event: &'static str, f: impl Fn(&dyn NetworkObserver)) {
        for (slot, observer) in self.observers.iter().enumerate() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(observer.as_ref())));
            if result.is_err() {
                error!(event, slot, "Network observer panicked; continuing with the rest");
            }
        }
    }
}

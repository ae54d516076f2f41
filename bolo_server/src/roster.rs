//! Index-stable player roster.
//!
//! Indices are handed out once, in connection order, and never reused. A
//! disconnected player's slot becomes a tombstone so that any command still
//! in flight that names its index stays unambiguous.

use bolo_shared::connection::Connection;

enum Slot {
    Live(Connection),
    Gone { name: String },
}

#[derive(Default)]
pub struct Roster {
    slots: Vec<Slot>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a connection. Its index must be the next unassigned one.
    pub fn push(&mut self, conn: Connection) -> usize {
        let index = self.slots.len();
        debug_assert_eq!(conn.index(), index, "roster indices follow accept order");
        self.slots.push(Slot::Live(conn));
        index
    }

    /// Number of indices ever assigned, tombstones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of connections that are still up.
    pub fn live_count(&self) -> usize {
        self.live().count()
    }

    pub fn is_assigned(&self, index: usize) -> bool {
        index < self.slots.len()
    }

    /// The live connection at `index`; `None` for tombstones and unassigned
    /// indices.
    pub fn get(&self, index: usize) -> Option<&Connection> {
        match self.slots.get(index) {
            Some(Slot::Live(conn)) => Some(conn),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Connection> {
        match self.slots.get_mut(index) {
            Some(Slot::Live(conn)) => Some(conn),
            _ => None,
        }
    }

    /// Player name at `index`, live or departed.
    pub fn name(&self, index: usize) -> Option<&str> {
        match self.slots.get(index)? {
            Slot::Live(conn) => Some(conn.name()),
            Slot::Gone { name } => Some(name),
        }
    }

    /// Closes the connection at `index` and leaves a tombstone in its place.
    /// Returns the player's name, or `None` if the slot was not live.
    pub fn tombstone(&mut self, index: usize) -> Option<String> {
        let slot = self.slots.get_mut(index)?;
        let Slot::Live(conn) = slot else {
            return None;
        };
        conn.close();
        let name = conn.name().to_string();
        *slot = Slot::Gone { name: name.clone() };
        Some(name)
    }

    /// Connections that are still up. A connection that died since the last
    /// `Server::poll` is skipped here even though its slot is not yet a
    /// tombstone.
    pub fn live(&self) -> impl Iterator<Item = &Connection> {
        self.slots.iter().filter_map(|s| match s {
            Slot::Live(conn) if conn.is_alive() => Some(conn),
            _ => None,
        })
    }

    pub fn live_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.slots.iter_mut().filter_map(|s| match s {
            Slot::Live(conn) if conn.is_alive() => Some(conn),
            _ => None,
        })
    }

    /// Tombstones every live slot.
    pub fn close_all(&mut self) {
        for index in 0..self.slots.len() {
            self.tombstone(index);
        }
    }
}

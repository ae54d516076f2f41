//! Replicated command vocabulary.
//!
//! A `Command` is an immutable unit of world or session change. Every peer
//! that receives one calls `Command::execute` exactly once on its simulation
//! thread. The set of variants is closed so that adding one forces every
//! `match` (execute, codec) to handle it.
//!
//! Application rules:
//! - Create* commands insert only when the id is absent, so duplicate
//!   delivery is a no-op.
//! - Move/Update commands are last-write-wins; each entity has a single
//!   authoritative writer at a time.
//! - Ownership commands derive `is_local` from this peer's own identity,
//!   never from a flag shipped over the wire.
//! - Unknown target ids are logged and skipped. `execute` cannot fail, so a
//!   stale command never blocks the rest of a tick's batch.

use tracing::{debug, info, warn};

use crate::{
    math::Transform,
    notifier::NetworkObserverNotifier,
    world::{Entity, EntityId, EntityKind, MapSnapshot, TankAttributes, World, WorldOwner},
};

/// Kind of text carried by `Command::SendMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A chat line, already prefixed with the sender's name.
    Chat = 0,
    /// The host's lobby transcript, sent once to a joining player.
    LobbyHistory = 1,
}

impl MessageKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(MessageKind::Chat),
            1 => Some(MessageKind::LobbyHistory),
            _ => None,
        }
    }
}

/// A replicated unit of change.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateEntity {
        kind: EntityKind,
        id: EntityId,
        transform: Transform,
    },
    /// A tank driven by a remote player.
    CreateTank {
        id: EntityId,
        transform: Transform,
    },
    CreateBullet {
        id: EntityId,
        transform: Transform,
        parent: EntityId,
    },
    CreateOwnable {
        kind: EntityKind,
        id: EntityId,
        transform: Transform,
        owner: EntityId,
    },
    /// Ownership transfer, e.g. a captured pillbox.
    ChangeOwner {
        id: EntityId,
        owner: Option<EntityId>,
    },
    UpdateOwnable {
        id: EntityId,
        owner: Option<EntityId>,
    },
    UpdateTankAttributes {
        id: EntityId,
        transform: Transform,
        attributes: TankAttributes,
    },
    MoveEntity {
        id: EntityId,
        transform: Transform,
    },
    DestroyEntity {
        id: EntityId,
    },
    SendMessage {
        kind: MessageKind,
        text: String,
    },
    SendMap(MapSnapshot),
    StartGame {
        countdown_secs: u32,
        map: MapSnapshot,
        spawn: Option<Transform>,
    },
    ClientConnected {
        player_name: String,
    },
    /// First command a client receives after its handshake.
    ConnectedToServer {
        client_name: String,
        server_name: String,
    },
    ClientDisconnected {
        player_name: String,
    },
    /// A client finished building the map it was sent.
    MapDownloadComplete {
        player_name: String,
    },
}

/// Per-peer state a command may need while executing.
pub struct CommandContext<'a> {
    notifier: &'a NetworkObserverNotifier,
    player_name: &'a str,
    replies: Vec<Command>,
}

impl<'a> CommandContext<'a> {
    pub fn new(notifier: &'a NetworkObserverNotifier, player_name: &'a str) -> Self {
        Self {
            notifier,
            player_name,
            replies: Vec::new(),
        }
    }

    /// This peer's player name.
    pub fn player_name(&self) -> &str {
        self.player_name
    }

    /// Queues a command to be sent back out once execution finishes.
    pub fn reply(&mut self, command: Command) {
        self.replies.push(command);
    }

    pub fn take_replies(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.replies)
    }
}

impl Command {
    /// Builds a chat line prefixed with the sender's name.
    pub fn chat(sender: &str, text: &str) -> Self {
        Command::SendMessage {
            kind: MessageKind::Chat,
            text: format!("{sender}: {text}"),
        }
    }

    /// Short variant name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateEntity { .. } => "CreateEntity",
            Command::CreateTank { .. } => "CreateTank",
            Command::CreateBullet { .. } => "CreateBullet",
            Command::CreateOwnable { .. } => "CreateOwnable",
            Command::ChangeOwner { .. } => "ChangeOwner",
            Command::UpdateOwnable { .. } => "UpdateOwnable",
            Command::UpdateTankAttributes { .. } => "UpdateTankAttributes",
            Command::MoveEntity { .. } => "MoveEntity",
            Command::DestroyEntity { .. } => "DestroyEntity",
            Command::SendMessage { .. } => "SendMessage",
            Command::SendMap(_) => "SendMap",
            Command::StartGame { .. } => "StartGame",
            Command::ClientConnected { .. } => "ClientConnected",
            Command::ConnectedToServer { .. } => "ConnectedToServer",
            Command::ClientDisconnected { .. } => "ClientDisconnected",
            Command::MapDownloadComplete { .. } => "MapDownloadComplete",
        }
    }

    /// Session bookkeeping is addressed to the host alone and is not relayed
    /// to other players.
    pub fn is_session_bookkeeping(&self) -> bool {
        matches!(
            self,
            Command::ClientConnected { .. }
                | Command::ConnectedToServer { .. }
                | Command::ClientDisconnected { .. }
                | Command::MapDownloadComplete { .. }
        )
    }

    /// Applies this command to the peer's world and observers.
    pub fn execute(&self, owner: &mut dyn WorldOwner, ctx: &mut CommandContext<'_>) {
        match self {
            Command::CreateEntity {
                kind,
                id,
                transform,
            } => {
                create(owner.world(), Entity::new(*id, *kind, *transform));
            }
            Command::CreateTank { id, transform } => {
                let mut tank = Entity::new(*id, EntityKind::Tank, *transform);
                tank.network_controlled = true;
                create(owner.world(), tank);
            }
            Command::CreateBullet {
                id,
                transform,
                parent,
            } => {
                let world = owner.world();
                if !world.contains(*parent) {
                    warn!(bullet = %id, parent = %parent, "CreateBullet: unknown parent entity");
                }
                let mut bullet = Entity::new(*id, EntityKind::Bullet, *transform);
                bullet.parent = Some(*parent);
                create(world, bullet);
            }
            Command::CreateOwnable {
                kind,
                id,
                transform,
                owner: owner_id,
            } => {
                let world = owner.world();
                create(world, Entity::new(*id, *kind, *transform));
                world.set_owner(*id, Some(*owner_id));
            }
            Command::ChangeOwner { id, owner: owner_id }
            | Command::UpdateOwnable { id, owner: owner_id } => {
                if !owner.world().set_owner(*id, *owner_id) {
                    warn!(entity = %id, command = self.name(), "Unable to find ownable entity");
                }
            }
            Command::UpdateTankAttributes {
                id,
                transform,
                attributes,
            } => match owner.world().entity_mut(*id) {
                Some(entity) if entity.tank.is_some() => {
                    entity.transform = *transform;
                    entity.tank = Some(*attributes);
                }
                Some(entity) => {
                    warn!(
                        entity = %id,
                        kind = ?entity.kind,
                        "UpdateTankAttributes: entity is not a tank"
                    );
                }
                None => warn!(entity = %id, "UpdateTankAttributes: unable to find tank"),
            },
            Command::MoveEntity { id, transform } => match owner.world().entity_mut(*id) {
                Some(entity) => entity.transform = *transform,
                None => warn!(entity = %id, "MoveEntity: unable to find entity"),
            },
            Command::DestroyEntity { id } => {
                if owner.world().remove(*id).is_none() {
                    debug!(entity = %id, "DestroyEntity: entity already gone");
                }
            }
            Command::SendMessage { kind, text } => {
                ctx.notifier.notify_message_received(*kind, text);
            }
            Command::SendMap(map) => {
                apply_map(owner, map, ctx);
            }
            Command::StartGame {
                countdown_secs,
                map,
                spawn,
            } => {
                apply_map(owner, map, ctx);
                owner.world().set_local_spawn(*spawn);
                info!(countdown_secs, spawn = ?spawn, "Game starting");
                ctx.notifier.notify_game_start(*countdown_secs);
            }
            Command::ClientConnected { player_name } => {
                ctx.notifier.notify_client_connected(player_name);
            }
            Command::ConnectedToServer {
                client_name,
                server_name,
            } => {
                ctx.notifier.notify_connect(client_name, server_name);
            }
            Command::ClientDisconnected { player_name } => {
                ctx.notifier.notify_client_disconnected(player_name);
            }
            Command::MapDownloadComplete { player_name } => {
                ctx.notifier.notify_client_ready(player_name);
            }
        }
    }
}

fn create(world: &mut World, entity: Entity) {
    let (id, kind) = (entity.id, entity.kind);
    if !world.insert(entity) {
        debug!(entity = %id, ?kind, "Entity already exists; create ignored");
    }
}

/// Replaces the world with the snapshot and tells the host the map is in.
fn apply_map(owner: &mut dyn WorldOwner, map: &MapSnapshot, ctx: &mut CommandContext<'_>) {
    let local_player = owner.world().local_player();
    owner.set_world(World::from_snapshot(map, local_player));
    info!(
        entities = map.entities.len(),
        columns = map.columns,
        rows = map.rows,
        "Map received"
    );

    let player_name = ctx.player_name.to_string();
    ctx.notifier.notify_client_ready(&player_name);
    ctx.reply(Command::MapDownloadComplete { player_name });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::notifier::NetworkObserver;

    fn run(cmd: &Command, world: &mut World) -> Vec<Command> {
        let notifier = NetworkObserverNotifier::new();
        let mut ctx = CommandContext::new(&notifier, "Tester");
        cmd.execute(world, &mut ctx);
        ctx.take_replies()
    }

    fn at(x: f32, y: f32) -> Transform {
        Transform::new(x, y, 0.0)
    }

    #[test]
    fn create_commands_are_idempotent() {
        let tank = EntityId::new_random();
        let owner_tank = EntityId::new_random();
        let commands = vec![
            Command::CreateEntity {
                kind: EntityKind::Wall,
                id: EntityId::new_random(),
                transform: at(1.0, 1.0),
            },
            Command::CreateTank {
                id: tank,
                transform: at(2.0, 2.0),
            },
            Command::CreateBullet {
                id: EntityId::new_random(),
                transform: at(3.0, 3.0),
                parent: tank,
            },
            Command::CreateOwnable {
                kind: EntityKind::Mine,
                id: EntityId::new_random(),
                transform: at(4.0, 4.0),
                owner: owner_tank,
            },
        ];

        for cmd in &commands {
            let mut once = World::new(8, 8);
            run(cmd, &mut once);

            let mut twice = once.clone();
            run(cmd, &mut twice);
            assert_eq!(once, twice, "{} replay changed the world", cmd.name());
        }
    }

    #[test]
    fn move_and_attribute_updates_replay_cleanly() {
        let tank = EntityId::new_random();
        let mut base = World::new(8, 8);
        base.insert(Entity::new(tank, EntityKind::Tank, Transform::ZERO));

        let commands = [
            Command::MoveEntity {
                id: tank,
                transform: Transform::new(3.0, 4.0, 1.5),
            },
            Command::UpdateTankAttributes {
                id: tank,
                transform: Transform::new(5.0, 6.0, 0.25),
                attributes: TankAttributes {
                    speed: 2.0,
                    hit_points: 75.0,
                    drowned: false,
                },
            },
        ];

        for cmd in &commands {
            let mut once = base.clone();
            run(cmd, &mut once);
            assert_ne!(once, base, "{} had no effect", cmd.name());

            let mut twice = once.clone();
            run(cmd, &mut twice);
            assert_eq!(once, twice, "{} replay changed the world", cmd.name());
        }
    }

    #[test]
    fn create_does_not_overwrite_existing_entity() {
        let id = EntityId::new_random();
        let mut world = World::new(8, 8);
        run(
            &Command::CreateEntity {
                kind: EntityKind::Tree,
                id,
                transform: at(1.0, 1.0),
            },
            &mut world,
        );
        run(
            &Command::CreateEntity {
                kind: EntityKind::Tree,
                id,
                transform: at(9.0, 9.0),
            },
            &mut world,
        );
        assert_eq!(world.entity(id).unwrap().transform, at(1.0, 1.0));
    }

    #[test]
    fn remote_tanks_are_network_controlled() {
        let id = EntityId::new_random();
        let mut world = World::new(8, 8);
        run(&Command::CreateTank { id, transform: at(0.0, 0.0) }, &mut world);

        let tank = world.entity(id).unwrap();
        assert!(tank.network_controlled);
        assert!(!tank.is_local);
    }

    #[test]
    fn change_owner_uses_receiving_peer_identity() {
        let pillbox = EntityId::new_random();
        let tank_x = EntityId::new_random();
        let cmd = Command::ChangeOwner {
            id: pillbox,
            owner: Some(tank_x),
        };

        let mut remote_peer = World::new(8, 8);
        remote_peer.set_local_player(Some(EntityId::new_random()));
        remote_peer.insert(Entity::new(pillbox, EntityKind::Pillbox, Transform::ZERO));
        run(&cmd, &mut remote_peer);
        let p = remote_peer.entity(pillbox).unwrap();
        assert_eq!(p.owner_id, Some(tank_x));
        assert!(!p.is_local);

        let mut owning_peer = World::new(8, 8);
        owning_peer.set_local_player(Some(tank_x));
        owning_peer.insert(Entity::new(pillbox, EntityKind::Pillbox, Transform::ZERO));
        run(&cmd, &mut owning_peer);
        let p = owning_peer.entity(pillbox).unwrap();
        assert_eq!(p.owner_id, Some(tank_x));
        assert!(p.is_local);

        // Replay leaves the state unchanged.
        let before = owning_peer.clone();
        run(&cmd, &mut owning_peer);
        assert_eq!(before, owning_peer);
    }

    #[test]
    fn unknown_targets_are_skipped() {
        let mut world = World::new(8, 8);
        let ghost = EntityId::new_random();
        for cmd in [
            Command::MoveEntity {
                id: ghost,
                transform: at(1.0, 1.0),
            },
            Command::UpdateOwnable {
                id: ghost,
                owner: None,
            },
            Command::UpdateTankAttributes {
                id: ghost,
                transform: at(1.0, 1.0),
                attributes: TankAttributes::default(),
            },
            Command::DestroyEntity { id: ghost },
        ] {
            run(&cmd, &mut world);
        }
        assert!(world.is_empty());
    }

    #[test]
    fn tank_attributes_are_last_write_wins() {
        let id = EntityId::new_random();
        let mut world = World::new(8, 8);
        world.insert(Entity::new(id, EntityKind::Tank, Transform::ZERO));

        for (x, hp) in [(1.0, 90.0), (2.0, 40.0)] {
            run(
                &Command::UpdateTankAttributes {
                    id,
                    transform: at(x, 0.0),
                    attributes: TankAttributes {
                        speed: 1.5,
                        hit_points: hp,
                        drowned: false,
                    },
                },
                &mut world,
            );
        }

        let tank = world.entity(id).unwrap();
        assert_eq!(tank.transform, at(2.0, 0.0));
        assert_eq!(tank.tank.unwrap().hit_points, 40.0);
    }

    #[test]
    fn start_game_replaces_world_and_notifies() {
        #[derive(Default)]
        struct Seen(Mutex<Vec<String>>);
        impl NetworkObserver for Seen {
            fn on_client_ready(&self, name: &str) {
                self.0.lock().unwrap().push(format!("ready {name}"));
            }
            fn on_game_start(&self, secs: u32) {
                self.0.lock().unwrap().push(format!("start {secs}"));
            }
        }

        let mut host = World::new(20, 10);
        let wall = EntityId::new_random();
        host.insert(Entity::new(wall, EntityKind::Wall, at(3.0, 4.0)));

        let me = EntityId::new_random();
        let mut peer = World::new(1, 1);
        peer.set_local_player(Some(me));
        peer.insert(Entity::new(EntityId::new_random(), EntityKind::Grass, Transform::ZERO));

        let seen = Arc::new(Seen::default());
        let mut notifier = NetworkObserverNotifier::new();
        notifier.add_observer(seen.clone());

        let spawn = at(7.0, 7.0);
        let mut ctx = CommandContext::new(&notifier, "Alice");
        Command::StartGame {
            countdown_secs: 3,
            map: host.snapshot(),
            spawn: Some(spawn),
        }
        .execute(&mut peer, &mut ctx);

        assert_eq!(peer.len(), 1);
        assert!(peer.contains(wall));
        assert_eq!(peer.columns(), 20);
        assert_eq!(peer.local_spawn(), Some(spawn));
        assert_eq!(peer.local_player(), Some(me));
        assert_eq!(
            ctx.take_replies(),
            vec![Command::MapDownloadComplete {
                player_name: "Alice".into()
            }]
        );
        assert_eq!(*seen.0.lock().unwrap(), vec!["ready Alice", "start 3"]);
    }

    #[test]
    fn chat_is_sender_prefixed() {
        assert_eq!(
            Command::chat("Alice", "hi"),
            Command::SendMessage {
                kind: MessageKind::Chat,
                text: "Alice: hi".into()
            }
        );
    }
}

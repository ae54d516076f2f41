//! Replicated world model.
//!
//! This is the slice of the simulation that the network core reads and
//! writes: entity identity, kind, transform, ownership and tank attributes.
//! Rendering, AI and collision live elsewhere and are not modelled here.
//!
//! Ordering: entities are kept in a `BTreeMap` so that snapshots and
//! iteration are stable across peers.
//!
//! Ownership: the simulation thread exclusively owns a `World`. The network
//! core only touches it through a `WorldOwner` for the duration of one
//! `Command::execute` call.

use std::collections::BTreeMap;
use std::fmt;

use uuid::Uuid;

use crate::math::Transform;

/// Globally unique entity id, shared by every peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new_random() -> Self {
        EntityId(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        EntityId(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of a replicated entity. The discriminant is the wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Tank = 0,
    Bullet = 1,
    Pillbox = 2,
    Base = 3,
    Mine = 4,
    Spawn = 5,
    Wall = 6,
    Tree = 7,
    Grass = 8,
    Road = 9,
    Water = 10,
    DeepWater = 11,
    Swamp = 12,
    Crater = 13,
    Rubble = 14,
    Building = 15,
}

impl EntityKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(EntityKind::Tank),
            1 => Some(EntityKind::Bullet),
            2 => Some(EntityKind::Pillbox),
            3 => Some(EntityKind::Base),
            4 => Some(EntityKind::Mine),
            5 => Some(EntityKind::Spawn),
            6 => Some(EntityKind::Wall),
            7 => Some(EntityKind::Tree),
            8 => Some(EntityKind::Grass),
            9 => Some(EntityKind::Road),
            10 => Some(EntityKind::Water),
            11 => Some(EntityKind::DeepWater),
            12 => Some(EntityKind::Swamp),
            13 => Some(EntityKind::Crater),
            14 => Some(EntityKind::Rubble),
            15 => Some(EntityKind::Building),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether entities of this kind carry an owner.
    pub fn is_ownable(self) -> bool {
        matches!(
            self,
            EntityKind::Tank | EntityKind::Pillbox | EntityKind::Base | EntityKind::Mine
        )
    }
}

/// Tank state that is replicated on top of the transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TankAttributes {
    pub speed: f32,
    pub hit_points: f32,
    pub drowned: bool,
}

impl Default for TankAttributes {
    fn default() -> Self {
        Self {
            speed: 0.0,
            hit_points: 100.0,
            drowned: false,
        }
    }
}

/// One replicated entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub transform: Transform,
    /// Owning tank, for ownable kinds.
    pub owner_id: Option<EntityId>,
    /// True on exactly one peer: the one whose local player owns this entity.
    pub is_local: bool,
    /// Entity that fired this one (bullets).
    pub parent: Option<EntityId>,
    pub tank: Option<TankAttributes>,
    /// Driven by commands from a remote peer rather than local input.
    pub network_controlled: bool,
}

impl Entity {
    pub fn new(id: EntityId, kind: EntityKind, transform: Transform) -> Self {
        Self {
            id,
            kind,
            transform,
            owner_id: None,
            is_local: false,
            parent: None,
            tank: (kind == EntityKind::Tank).then(TankAttributes::default),
            network_controlled: false,
        }
    }

    pub fn record(&self) -> EntityRecord {
        EntityRecord {
            kind: self.kind,
            id: self.id,
            transform: self.transform,
            owner_id: self.owner_id,
        }
    }
}

/// Minimal per-entity data carried by a map snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub kind: EntityKind,
    pub id: EntityId,
    pub transform: Transform,
    pub owner_id: Option<EntityId>,
}

/// Full world snapshot sent at session start.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapSnapshot {
    pub columns: u16,
    pub rows: u16,
    pub entities: Vec<EntityRecord>,
}

/// Replicated world state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct World {
    columns: u16,
    rows: u16,
    entities: BTreeMap<EntityId, Entity>,
    local_player: Option<EntityId>,
    local_spawn: Option<Transform>,
}

impl World {
    /// Creates an empty world of the given size in tiles.
    pub fn new(columns: u16, rows: u16) -> Self {
        Self {
            columns,
            rows,
            ..Default::default()
        }
    }

    /// Rebuilds a world from a snapshot. `local_player` is this peer's own
    /// tank id, used to derive `is_local` on ownable entities.
    pub fn from_snapshot(snapshot: &MapSnapshot, local_player: Option<EntityId>) -> Self {
        let mut world = World::new(snapshot.columns, snapshot.rows);
        world.local_player = local_player;
        for rec in &snapshot.entities {
            let mut entity = Entity::new(rec.id, rec.kind, rec.transform);
            entity.owner_id = rec.owner_id;
            entity.is_local = rec.owner_id.is_some() && rec.owner_id == local_player;
            world.insert(entity);
        }
        world
    }

    pub fn columns(&self) -> u16 {
        self.columns
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Inserts an entity unless its id is already present.
    ///
    /// Returns false, leaving the world untouched, for a duplicate id.
    pub fn insert(&mut self, entity: Entity) -> bool {
        if self.entities.contains_key(&entity.id) {
            return false;
        }
        self.entities.insert(entity.id, entity);
        true
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Iterates entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// This peer's own tank, if it has one.
    pub fn local_player(&self) -> Option<EntityId> {
        self.local_player
    }

    pub fn set_local_player(&mut self, id: Option<EntityId>) {
        self.local_player = id;
    }

    pub fn is_local_player(&self, id: EntityId) -> bool {
        self.local_player == Some(id)
    }

    /// Spawn point assigned to this peer by the host.
    pub fn local_spawn(&self) -> Option<Transform> {
        self.local_spawn
    }

    pub fn set_local_spawn(&mut self, spawn: Option<Transform>) {
        self.local_spawn = spawn;
    }

    /// Sets an entity's owner and recomputes its local flag against this
    /// peer's own identity. Returns false if the entity is unknown.
    pub fn set_owner(&mut self, id: EntityId, owner: Option<EntityId>) -> bool {
        let is_local = owner.is_some_and(|o| self.is_local_player(o));
        match self.entities.get_mut(&id) {
            Some(entity) => {
                entity.owner_id = owner;
                entity.is_local = is_local;
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> MapSnapshot {
        MapSnapshot {
            columns: self.columns,
            rows: self.rows,
            entities: self.entities.values().map(Entity::record).collect(),
        }
    }
}

/// Capability handed to the network core: the current world, and a way to
/// replace it wholesale when a map arrives.
pub trait WorldOwner {
    fn world(&mut self) -> &mut World;

    fn set_world(&mut self, world: World);
}

impl WorldOwner for World {
    fn world(&mut self) -> &mut World {
        self
    }

    fn set_world(&mut self, world: World) {
        *self = world;
    }
}

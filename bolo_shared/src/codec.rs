//! Explicit binary encoding of `Command`.
//!
//! Layout: one tag byte per variant followed by the variant's fields in
//! declaration order.
//! - strings: u16 BE byte length + UTF-8
//! - entity ids: 16 raw bytes
//! - optional values: a 0/1 presence byte
//! - floats: f32 BE
//! - collections: u32 BE element count
//!
//! Tags are part of the protocol: never renumber one, only append.

use bytes::{Buf, BufMut};

use crate::{
    command::{Command, MessageKind},
    error::CodecError,
    math::Transform,
    world::{EntityId, EntityKind, EntityRecord, MapSnapshot, TankAttributes},
};

mod tag {
    pub const CREATE_ENTITY: u8 = 0x01;
    pub const CREATE_TANK: u8 = 0x02;
    pub const CREATE_BULLET: u8 = 0x03;
    pub const CREATE_OWNABLE: u8 = 0x04;
    pub const CHANGE_OWNER: u8 = 0x05;
    pub const UPDATE_OWNABLE: u8 = 0x06;
    pub const UPDATE_TANK_ATTRIBUTES: u8 = 0x07;
    pub const MOVE_ENTITY: u8 = 0x08;
    pub const DESTROY_ENTITY: u8 = 0x09;
    pub const SEND_MESSAGE: u8 = 0x0a;
    pub const SEND_MAP: u8 = 0x0b;
    pub const START_GAME: u8 = 0x0c;
    pub const CLIENT_CONNECTED: u8 = 0x0d;
    pub const CONNECTED_TO_SERVER: u8 = 0x0e;
    pub const CLIENT_DISCONNECTED: u8 = 0x0f;
    pub const MAP_DOWNLOAD_COMPLETE: u8 = 0x10;
}

/// Smallest possible encoding of one `EntityRecord`.
const MIN_RECORD_BYTES: usize = 1 + 16 + 12 + 1;

/// Appends the encoding of `cmd` to `buf`.
pub fn encode_command(cmd: &Command, buf: &mut impl BufMut) -> Result<(), CodecError> {
    match cmd {
        Command::CreateEntity {
            kind,
            id,
            transform,
        } => {
            buf.put_u8(tag::CREATE_ENTITY);
            buf.put_u8(kind.as_u8());
            put_id(buf, id);
            put_transform(buf, transform);
        }
        Command::CreateTank { id, transform } => {
            buf.put_u8(tag::CREATE_TANK);
            put_id(buf, id);
            put_transform(buf, transform);
        }
        Command::CreateBullet {
            id,
            transform,
            parent,
        } => {
            buf.put_u8(tag::CREATE_BULLET);
            put_id(buf, id);
            put_transform(buf, transform);
            put_id(buf, parent);
        }
        Command::CreateOwnable {
            kind,
            id,
            transform,
            owner,
        } => {
            buf.put_u8(tag::CREATE_OWNABLE);
            buf.put_u8(kind.as_u8());
            put_id(buf, id);
            put_transform(buf, transform);
            put_id(buf, owner);
        }
        Command::ChangeOwner { id, owner } => {
            buf.put_u8(tag::CHANGE_OWNER);
            put_id(buf, id);
            put_opt_id(buf, owner.as_ref());
        }
        Command::UpdateOwnable { id, owner } => {
            buf.put_u8(tag::UPDATE_OWNABLE);
            put_id(buf, id);
            put_opt_id(buf, owner.as_ref());
        }
        Command::UpdateTankAttributes {
            id,
            transform,
            attributes,
        } => {
            buf.put_u8(tag::UPDATE_TANK_ATTRIBUTES);
            put_id(buf, id);
            put_transform(buf, transform);
            buf.put_f32(attributes.speed);
            buf.put_f32(attributes.hit_points);
            buf.put_u8(attributes.drowned as u8);
        }
        Command::MoveEntity { id, transform } => {
            buf.put_u8(tag::MOVE_ENTITY);
            put_id(buf, id);
            put_transform(buf, transform);
        }
        Command::DestroyEntity { id } => {
            buf.put_u8(tag::DESTROY_ENTITY);
            put_id(buf, id);
        }
        Command::SendMessage { kind, text } => {
            buf.put_u8(tag::SEND_MESSAGE);
            buf.put_u8(*kind as u8);
            put_str(buf, text)?;
        }
        Command::SendMap(map) => {
            buf.put_u8(tag::SEND_MAP);
            put_map(buf, map)?;
        }
        Command::StartGame {
            countdown_secs,
            map,
            spawn,
        } => {
            buf.put_u8(tag::START_GAME);
            buf.put_u32(*countdown_secs);
            put_map(buf, map)?;
            match spawn {
                Some(t) => {
                    buf.put_u8(1);
                    put_transform(buf, t);
                }
                None => buf.put_u8(0),
            }
        }
        Command::ClientConnected { player_name } => {
            buf.put_u8(tag::CLIENT_CONNECTED);
            put_str(buf, player_name)?;
        }
        Command::ConnectedToServer {
            client_name,
            server_name,
        } => {
            buf.put_u8(tag::CONNECTED_TO_SERVER);
            put_str(buf, client_name)?;
            put_str(buf, server_name)?;
        }
        Command::ClientDisconnected { player_name } => {
            buf.put_u8(tag::CLIENT_DISCONNECTED);
            put_str(buf, player_name)?;
        }
        Command::MapDownloadComplete { player_name } => {
            buf.put_u8(tag::MAP_DOWNLOAD_COMPLETE);
            put_str(buf, player_name)?;
        }
    }
    Ok(())
}

/// Decodes one command from the front of `buf`.
pub fn decode_command(buf: &mut impl Buf) -> Result<Command, CodecError> {
    let cmd = match get_u8(buf)? {
        tag::CREATE_ENTITY => Command::CreateEntity {
            kind: get_kind(buf)?,
            id: get_id(buf)?,
            transform: get_transform(buf)?,
        },
        tag::CREATE_TANK => Command::CreateTank {
            id: get_id(buf)?,
            transform: get_transform(buf)?,
        },
        tag::CREATE_BULLET => Command::CreateBullet {
            id: get_id(buf)?,
            transform: get_transform(buf)?,
            parent: get_id(buf)?,
        },
        tag::CREATE_OWNABLE => Command::CreateOwnable {
            kind: get_kind(buf)?,
            id: get_id(buf)?,
            transform: get_transform(buf)?,
            owner: get_id(buf)?,
        },
        tag::CHANGE_OWNER => Command::ChangeOwner {
            id: get_id(buf)?,
            owner: get_opt_id(buf)?,
        },
        tag::UPDATE_OWNABLE => Command::UpdateOwnable {
            id: get_id(buf)?,
            owner: get_opt_id(buf)?,
        },
        tag::UPDATE_TANK_ATTRIBUTES => Command::UpdateTankAttributes {
            id: get_id(buf)?,
            transform: get_transform(buf)?,
            attributes: TankAttributes {
                speed: get_f32(buf)?,
                hit_points: get_f32(buf)?,
                drowned: get_u8(buf)? != 0,
            },
        },
        tag::MOVE_ENTITY => Command::MoveEntity {
            id: get_id(buf)?,
            transform: get_transform(buf)?,
        },
        tag::DESTROY_ENTITY => Command::DestroyEntity { id: get_id(buf)? },
        tag::SEND_MESSAGE => {
            let raw = get_u8(buf)?;
            let kind = MessageKind::from_u8(raw).ok_or(CodecError::UnknownTag {
                what: "message kind",
                tag: raw,
            })?;
            Command::SendMessage {
                kind,
                text: get_str(buf)?,
            }
        }
        tag::SEND_MAP => Command::SendMap(get_map(buf)?),
        tag::START_GAME => {
            let countdown_secs = get_u32(buf)?;
            let map = get_map(buf)?;
            let spawn = match get_u8(buf)? {
                0 => None,
                _ => Some(get_transform(buf)?),
            };
            Command::StartGame {
                countdown_secs,
                map,
                spawn,
            }
        }
        tag::CLIENT_CONNECTED => Command::ClientConnected {
            player_name: get_str(buf)?,
        },
        tag::CONNECTED_TO_SERVER => Command::ConnectedToServer {
            client_name: get_str(buf)?,
            server_name: get_str(buf)?,
        },
        tag::CLIENT_DISCONNECTED => Command::ClientDisconnected {
            player_name: get_str(buf)?,
        },
        tag::MAP_DOWNLOAD_COMPLETE => Command::MapDownloadComplete {
            player_name: get_str(buf)?,
        },
        other => {
            return Err(CodecError::UnknownTag {
                what: "command",
                tag: other,
            })
        }
    };
    Ok(cmd)
}

// ─── Field writers ───

pub(crate) fn put_str(buf: &mut impl BufMut, s: &str) -> Result<(), CodecError> {
    let len = s.len();
    if len > u16::MAX as usize {
        return Err(CodecError::TooLong {
            what: "string",
            len,
            max: u16::MAX as usize,
        });
    }
    buf.put_u16(len as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn put_id(buf: &mut impl BufMut, id: &EntityId) {
    buf.put_slice(id.as_bytes());
}

fn put_opt_id(buf: &mut impl BufMut, id: Option<&EntityId>) {
    match id {
        Some(id) => {
            buf.put_u8(1);
            put_id(buf, id);
        }
        None => buf.put_u8(0),
    }
}

fn put_transform(buf: &mut impl BufMut, t: &Transform) {
    buf.put_f32(t.x);
    buf.put_f32(t.y);
    buf.put_f32(t.rotation);
}

fn put_map(buf: &mut impl BufMut, map: &MapSnapshot) -> Result<(), CodecError> {
    let count = map.entities.len();
    if count > u32::MAX as usize {
        return Err(CodecError::TooLong {
            what: "entity list",
            len: count,
            max: u32::MAX as usize,
        });
    }
    buf.put_u16(map.columns);
    buf.put_u16(map.rows);
    buf.put_u32(count as u32);
    for rec in &map.entities {
        buf.put_u8(rec.kind.as_u8());
        put_id(buf, &rec.id);
        put_transform(buf, &rec.transform);
        put_opt_id(buf, rec.owner_id.as_ref());
    }
    Ok(())
}

// ─── Field readers ───

fn ensure(buf: &impl Buf, n: usize) -> Result<(), CodecError> {
    let have = buf.remaining();
    if have < n {
        return Err(CodecError::Truncated { needed: n - have });
    }
    Ok(())
}

pub(crate) fn get_u8(buf: &mut impl Buf) -> Result<u8, CodecError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_u32(buf: &mut impl Buf) -> Result<u32, CodecError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32())
}

fn get_f32(buf: &mut impl Buf) -> Result<f32, CodecError> {
    ensure(buf, 4)?;
    Ok(buf.get_f32())
}

pub(crate) fn get_str(buf: &mut impl Buf) -> Result<String, CodecError> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure(buf, len)?;
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    String::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)
}

fn get_id(buf: &mut impl Buf) -> Result<EntityId, CodecError> {
    ensure(buf, 16)?;
    let mut raw = [0u8; 16];
    buf.copy_to_slice(&mut raw);
    Ok(EntityId::from_bytes(raw))
}

fn get_opt_id(buf: &mut impl Buf) -> Result<Option<EntityId>, CodecError> {
    match get_u8(buf)? {
        0 => Ok(None),
        _ => get_id(buf).map(Some),
    }
}

fn get_kind(buf: &mut impl Buf) -> Result<EntityKind, CodecError> {
    let raw = get_u8(buf)?;
    EntityKind::from_u8(raw).ok_or(CodecError::UnknownTag {
        what: "entity kind",
        tag: raw,
    })
}

fn get_transform(buf: &mut impl Buf) -> Result<Transform, CodecError> {
    Ok(Transform::new(get_f32(buf)?, get_f32(buf)?, get_f32(buf)?))
}

fn get_map(buf: &mut impl Buf) -> Result<MapSnapshot, CodecError> {
    ensure(buf, 8)?;
    let columns = buf.get_u16();
    let rows = buf.get_u16();
    let count = buf.get_u32() as usize;

    // Reject counts the payload cannot possibly hold before allocating.
    let max = buf.remaining() / MIN_RECORD_BYTES;
    if count > max {
        return Err(CodecError::TooLong {
            what: "entity list",
            len: count,
            max,
        });
    }

    let mut entities = Vec::with_capacity(count);
    for _ in 0..count {
        entities.push(EntityRecord {
            kind: get_kind(buf)?,
            id: get_id(buf)?,
            transform: get_transform(buf)?,
            owner_id: get_opt_id(buf)?,
        });
    }
    Ok(MapSnapshot {
        columns,
        rows,
        entities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn encode(cmd: &Command) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_command(cmd, &mut buf).unwrap();
        buf
    }

    fn sample_map() -> MapSnapshot {
        let owner = EntityId::new_random();
        MapSnapshot {
            columns: 32,
            rows: 24,
            entities: vec![
                EntityRecord {
                    kind: EntityKind::Base,
                    id: EntityId::new_random(),
                    transform: Transform::new(64.0, 96.0, 0.0),
                    owner_id: Some(owner),
                },
                EntityRecord {
                    kind: EntityKind::Water,
                    id: EntityId::new_random(),
                    transform: Transform::new(0.0, 32.0, 0.0),
                    owner_id: None,
                },
            ],
        }
    }

    #[test]
    fn start_game_carries_map_and_spawn() {
        let cmd = Command::StartGame {
            countdown_secs: 5,
            map: sample_map(),
            spawn: Some(Transform::new(10.0, 20.0, 1.5)),
        };
        let mut bytes = encode(&cmd).freeze();
        assert_eq!(bytes[0], tag::START_GAME);

        let back = decode_command(&mut bytes).unwrap();
        assert_eq!(back, cmd);
        assert!(bytes.is_empty());
    }

    #[test]
    fn layout_is_tag_then_fields() {
        let id = EntityId::new_random();
        let bytes = encode(&Command::MoveEntity {
            id,
            transform: Transform::new(1.0, 2.0, 3.0),
        });

        assert_eq!(bytes.len(), 1 + 16 + 12);
        assert_eq!(bytes[0], tag::MOVE_ENTITY);
        assert_eq!(&bytes[1..17], id.as_bytes());
        assert_eq!(&bytes[17..21], &1.0f32.to_be_bytes());
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let bytes = encode(&Command::ConnectedToServer {
            client_name: "Alice".into(),
            server_name: "Server player".into(),
        });
        let mut short = &bytes[..bytes.len() - 3];
        assert_eq!(
            decode_command(&mut short),
            Err(CodecError::Truncated { needed: 3 })
        );
    }

    #[test]
    fn unknown_tags_are_rejected() {
        let mut unknown = &[0xeeu8][..];
        assert_eq!(
            decode_command(&mut unknown),
            Err(CodecError::UnknownTag {
                what: "command",
                tag: 0xee
            })
        );

        let mut bad_kind = BytesMut::new();
        bad_kind.put_u8(tag::CREATE_ENTITY);
        bad_kind.put_u8(200);
        bad_kind.put_slice(&[0u8; 28]);
        assert!(matches!(
            decode_command(&mut bad_kind.freeze()),
            Err(CodecError::UnknownTag {
                what: "entity kind",
                tag: 200
            })
        ));
    }

    #[test]
    fn absurd_entity_count_fails_without_allocating() {
        let mut buf = BytesMut::new();
        buf.put_u8(tag::SEND_MAP);
        buf.put_u16(8);
        buf.put_u16(8);
        buf.put_u32(u32::MAX);
        assert!(matches!(
            decode_command(&mut buf.freeze()),
            Err(CodecError::TooLong { what: "entity list", .. })
        ));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(tag::CLIENT_CONNECTED);
        buf.put_u16(2);
        buf.put_slice(&[0xc3, 0x28]);
        assert_eq!(
            decode_command(&mut buf.freeze()),
            Err(CodecError::InvalidUtf8)
        );
    }

    #[test]
    fn oversized_string_is_rejected_on_encode() {
        let text = "x".repeat(u16::MAX as usize + 1);
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_command(&Command::chat("Alice", &text), &mut buf),
            Err(CodecError::TooLong { what: "string", .. })
        ));
    }
}

use anyhow::Result;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::Packet;
use crate::component::Component;
use crate::protocol::buffer::{BufExt, BufMutExt};
use crate::protocol::ProtocolVersion;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAlive {
    pub id: i64,
}

impl Packet for KeepAlive {
    fn from_bytes(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self> {
        let id = if version >= ProtocolVersion::V1_12_2 {
            buf.try_get_i64()?
        } else {
            buf.get_varint()? as i64
        };
        Ok(Self { id })
    }

    fn put_buf(&self, buf: &mut BytesMut, version: ProtocolVersion) {
        if version >= ProtocolVersion::V1_12_2 {
            buf.put_i64(self.id);
        } else {
            buf.put_varint(self.id as i32);
        }
    }
}

/// The packet that moves a client into the play state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGame {
    pub entity_id: i32,
    pub game_mode: u8,
    pub dimension: i32,
    pub hashed_seed: i64,
    pub difficulty: u8,
    pub max_players: u8,
    pub level_type: String,
    pub view_distance: i32,
    pub reduced_debug_info: bool,
    pub enable_respawn_screen: bool,
}

impl Packet for JoinGame {
    fn from_bytes(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self> {
        let entity_id = buf.try_get_i32()?;
        let game_mode = buf.try_get_u8()?;
        let dimension = if version >= ProtocolVersion::V1_9_1 {
            buf.try_get_i32()?
        } else {
            buf.try_get_i8()? as i32
        };
        let hashed_seed = if version >= ProtocolVersion::V1_15 { buf.try_get_i64()? } else { 0 };
        let difficulty = if version < ProtocolVersion::V1_14 { buf.try_get_u8()? } else { 0 };
        let max_players = buf.try_get_u8()?;
        let level_type = buf.get_string(16)?;
        let view_distance = if version >= ProtocolVersion::V1_14 { buf.get_varint()? } else { 0 };
        let reduced_debug_info = buf.get_bool()?;
        let enable_respawn_screen = if version >= ProtocolVersion::V1_15 { buf.get_bool()? } else { true };

        Ok(Self {
            entity_id,
            game_mode,
            dimension,
            hashed_seed,
            difficulty,
            max_players,
            level_type,
            view_distance,
            reduced_debug_info,
            enable_respawn_screen,
        })
    }

    fn put_buf(&self, buf: &mut BytesMut, version: ProtocolVersion) {
        buf.put_i32(self.entity_id);
        buf.put_u8(self.game_mode);
        if version >= ProtocolVersion::V1_9_1 {
            buf.put_i32(self.dimension);
        } else {
            buf.put_i8(self.dimension as i8);
        }
        if version >= ProtocolVersion::V1_15 {
            buf.put_i64(self.hashed_seed);
        }
        if version < ProtocolVersion::V1_14 {
            buf.put_u8(self.difficulty);
        }
        buf.put_u8(self.max_players);
        buf.put_string(&self.level_type);
        if version >= ProtocolVersion::V1_14 {
            buf.put_varint(self.view_distance);
        }
        buf.put_bool(self.reduced_debug_info);
        if version >= ProtocolVersion::V1_15 {
            buf.put_bool(self.enable_respawn_screen);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Respawn {
    pub dimension: i32,
    pub hashed_seed: i64,
    pub difficulty: u8,
    pub game_mode: u8,
    pub level_type: String,
}

impl Respawn {
    /// Respawn that puts a client in the world described by `join`.
    pub fn from_join(join: &JoinGame) -> Self {
        Self {
            dimension: join.dimension,
            hashed_seed: join.hashed_seed,
            difficulty: join.difficulty,
            game_mode: join.game_mode,
            level_type: join.level_type.clone(),
        }
    }
}

impl Packet for Respawn {
    fn from_bytes(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self> {
        let dimension = buf.try_get_i32()?;
        let hashed_seed = if version >= ProtocolVersion::V1_15 { buf.try_get_i64()? } else { 0 };
        let difficulty = if version < ProtocolVersion::V1_14 { buf.try_get_u8()? } else { 0 };
        Ok(Self {
            dimension,
            hashed_seed,
            difficulty,
            game_mode: buf.try_get_u8()?,
            level_type: buf.get_string(16)?,
        })
    }

    fn put_buf(&self, buf: &mut BytesMut, version: ProtocolVersion) {
        buf.put_i32(self.dimension);
        if version >= ProtocolVersion::V1_15 {
            buf.put_i64(self.hashed_seed);
        }
        if version < ProtocolVersion::V1_14 {
            buf.put_u8(self.difficulty);
        }
        buf.put_u8(self.game_mode);
        buf.put_string(&self.level_type);
    }
}

/// Clientbound teleport.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub flags: u8,
    pub teleport_id: i32,
}

impl Packet for PlayerPosition {
    fn from_bytes(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            x: buf.try_get_f64()?,
            y: buf.try_get_f64()?,
            z: buf.try_get_f64()?,
            yaw: buf.try_get_f32()?,
            pitch: buf.try_get_f32()?,
            flags: buf.try_get_u8()?,
            teleport_id: if version >= ProtocolVersion::V1_9 { buf.get_varint()? } else { 0 },
        })
    }

    fn put_buf(&self, buf: &mut BytesMut, version: ProtocolVersion) {
        buf.put_f64(self.x);
        buf.put_f64(self.y);
        buf.put_f64(self.z);
        buf.put_f32(self.yaw);
        buf.put_f32(self.pitch);
        buf.put_u8(self.flags);
        if version >= ProtocolVersion::V1_9 {
            buf.put_varint(self.teleport_id);
        }
    }
}

pub const CHAT: i8 = 0;
pub const SYSTEM: i8 = 1;

/// Clientbound chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub json: String,
    pub position: i8,
}

impl ChatMessage {
    pub fn system(message: &Component) -> Self {
        Self { json: message.to_json(), position: SYSTEM }
    }
}

impl Packet for ChatMessage {
    fn from_bytes(buf: &mut impl Buf, _: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            json: buf.get_string(262144)?,
            position: buf.try_get_i8()?,
        })
    }

    fn put_buf(&self, buf: &mut BytesMut, _: ProtocolVersion) {
        buf.put_string(&self.json);
        buf.put_i8(self.position);
    }
}

/// Serverbound chat line or command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientChat {
    pub message: String,
}

impl Packet for ClientChat {
    fn from_bytes(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self> {
        let cap = if version >= ProtocolVersion::V1_11 { 256 } else { 100 };
        Ok(Self { message: buf.get_string(cap)? })
    }

    fn put_buf(&self, buf: &mut BytesMut, _: ProtocolVersion) {
        buf.put_string(&self.message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMessage {
    pub channel: String,
    pub data: Bytes,
}

impl Packet for PluginMessage {
    fn from_bytes(buf: &mut impl Buf, _: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            channel: buf.get_identifier()?,
            data: buf.copy_to_bytes(buf.remaining()),
        })
    }

    fn put_buf(&self, buf: &mut BytesMut, _: ProtocolVersion) {
        buf.put_string(&self.channel);
        buf.extend_from_slice(&self.data);
    }
}

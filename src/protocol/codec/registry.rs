use std::collections::HashMap;

use anyhow::{bail, ensure, Result};
use bytes::{Buf, BytesMut};
use strum::IntoEnumIterator;

use crate::error::ProtocolError;
use crate::protocol::{
    buffer::{BufExt, BufMutExt},
    packet::{PacketKind, PacketType, RawPacket},
    Direction, Negotiated, ProtocolVersion, State,
};

use ProtocolVersion::*;

/// Id table of one (state, direction, version).
#[derive(Clone, Default)]
pub struct ProtocolRegistry {
    packet_to_id: HashMap<PacketKind, i32>,
    id_to_packet: HashMap<i32, PacketKind>,
}

impl ProtocolRegistry {
    fn insert(&mut self, kind: PacketKind, id: i32) -> Result<()> {
        if let Some(existing) = self.id_to_packet.get(&id) {
            bail!("packet id {:#04x} is taken by {} and {}", id, existing.name(), kind.name());
        }
        self.packet_to_id.insert(kind, id);
        self.id_to_packet.insert(id, kind);
        Ok(())
    }

    pub fn get_packet(&self, id: i32) -> Option<PacketKind> {
        self.id_to_packet.get(&id).copied()
    }

    pub fn get_id(&self, kind: PacketKind) -> Option<i32> {
        self.packet_to_id.get(&kind).copied()
    }
}

/// Tables of one (state, direction), one per supported version.
struct StateRegistry {
    protocols: Vec<ProtocolRegistry>,
    /// Version thresholds each packet was registered with, for monotonicity checks.
    mappings: HashMap<PacketKind, Vec<(ProtocolVersion, i32)>>,
}

impl StateRegistry {
    fn new() -> Self {
        Self {
            protocols: vec![ProtocolRegistry::default(); ProtocolVersion::count()],
            mappings: HashMap::new(),
        }
    }

    fn insert(&mut self, kind: PacketKind, mut list: Vec<(ProtocolVersion, i32)>) -> Result<()> {
        ensure!(!list.is_empty(), "{} registered without ids", kind.name());
        ensure!(!self.mappings.contains_key(&kind), "{} registered twice", kind.name());
        list.sort_by_key(|(version, _)| *version);
        ensure!(
            list.windows(2).all(|w| w[0].0 != w[1].0),
            "{} has two ids for the same version",
            kind.name()
        );

        for (version, registry) in ProtocolVersion::iter().zip(self.protocols.iter_mut()) {
            let active = list.iter().rev().find(|(from, _)| *from <= version);
            if let Some((_, id)) = active {
                registry.insert(kind, *id)?;
            }
        }

        self.mappings.insert(kind, list);
        Ok(())
    }

    fn get(&self, version: ProtocolVersion) -> &ProtocolRegistry {
        &self.protocols[version.index()]
    }
}

pub struct PacketRegistry {
    states: HashMap<(State, Direction), StateRegistry>,
}

impl PacketRegistry {
    pub fn empty() -> Self {
        Self { states: HashMap::new() }
    }

    pub fn register(
        &mut self,
        kind: PacketKind,
        direction: Direction,
        state: State,
        ids: &[(ProtocolVersion, i32)],
    ) -> Result<()> {
        self.states
            .entry((state, direction))
            .or_insert_with(StateRegistry::new)
            .insert(kind, ids.to_vec())
    }

    /// Id table for a connection. Play needs an exact version; the other states
    /// barely change between releases and fall back to the oldest table.
    pub fn table(&self, state: State, direction: Direction, version: Negotiated) -> Option<&ProtocolRegistry> {
        let registry = self.states.get(&(state, direction))?;
        match (state, version) {
            (_, Negotiated::Supported(version)) => Some(registry.get(version)),
            (State::Play, Negotiated::Unsupported(_)) => None,
            (_, Negotiated::Unsupported(_)) => Some(registry.get(ProtocolVersion::OLDEST)),
        }
    }

    pub fn resolve(&self, state: State, direction: Direction, version: Negotiated, id: i32) -> Option<PacketKind> {
        self.table(state, direction, version)?.get_packet(id)
    }

    pub fn id_for(&self, state: State, direction: Direction, version: Negotiated, kind: PacketKind) -> Option<i32> {
        self.table(state, direction, version)?.get_id(kind)
    }

    /// Registered `(from_version, id)` steps of a packet, sorted by version.
    pub fn mapping(&self, state: State, direction: Direction, kind: PacketKind) -> Option<&[(ProtocolVersion, i32)]> {
        self.states.get(&(state, direction))?.mappings.get(&kind).map(Vec::as_slice)
    }

    /// Turns a decompressed frame into a packet. Unknown ids become [`PacketType::Raw`].
    pub fn decode(&self, state: State, direction: Direction, version: Negotiated, mut frame: BytesMut) -> Result<PacketType> {
        let table = self
            .table(state, direction, version)
            .ok_or(ProtocolError::NoMapping { state, direction })?;
        let id = frame.get_varint()?;

        let Some(kind) = table.get_packet(id) else {
            return Ok(PacketType::Raw(RawPacket { id, data: frame.freeze() }));
        };

        // Layouts are only defined for supported versions; status pings from
        // unknown clients are read with the oldest layout.
        let layout = version.supported().unwrap_or(ProtocolVersion::OLDEST);
        let packet = PacketType::read(kind, &mut frame, layout)?;
        ensure!(
            !frame.has_remaining(),
            ProtocolError::TrailingBytes { packet: kind.name(), remaining: frame.remaining() }
        );
        Ok(packet)
    }

    /// Serialises a packet with its id prefix, ready for the encoder.
    pub fn encode(&self, state: State, direction: Direction, version: Negotiated, packet: &PacketType) -> Result<BytesMut> {
        let id = match packet {
            PacketType::Raw(raw) => raw.id,
            packet => packet
                .kind()
                .and_then(|kind| self.id_for(state, direction, version, kind))
                .ok_or_else(|| ProtocolError::UnmappedPacket {
                    packet: packet.kind().map(PacketKind::name).unwrap_or("Raw"),
                    state,
                    direction,
                })?,
        };

        let mut buf = BytesMut::with_capacity(64);
        buf.put_varint(id);
        packet.write(&mut buf, version.supported().unwrap_or(ProtocolVersion::OLDEST));
        Ok(buf)
    }

    /// Every packet this server understands, for the supported version range.
    pub fn standard() -> Result<Self> {
        use Direction::{Clientbound, Serverbound};
        use PacketKind as P;
        use State::*;

        let mut registry = Self::empty();

        registry.register(P::Handshake, Serverbound, Handshake, &[(V1_8, 0x00)])?;

        registry.register(P::StatusRequest, Serverbound, Status, &[(V1_8, 0x00)])?;
        registry.register(P::Ping, Serverbound, Status, &[(V1_8, 0x01)])?;
        registry.register(P::StatusResponse, Clientbound, Status, &[(V1_8, 0x00)])?;
        registry.register(P::Ping, Clientbound, Status, &[(V1_8, 0x01)])?;

        registry.register(P::LoginStart, Serverbound, Login, &[(V1_8, 0x00)])?;
        registry.register(P::EncryptionResponse, Serverbound, Login, &[(V1_8, 0x01)])?;
        registry.register(P::LoginPluginResponse, Serverbound, Login, &[(V1_13, 0x02)])?;
        registry.register(P::Disconnect, Clientbound, Login, &[(V1_8, 0x00)])?;
        registry.register(P::EncryptionRequest, Clientbound, Login, &[(V1_8, 0x01)])?;
        registry.register(P::LoginSuccess, Clientbound, Login, &[(V1_8, 0x02)])?;
        registry.register(P::SetCompression, Clientbound, Login, &[(V1_8, 0x03)])?;
        registry.register(P::LoginPluginRequest, Clientbound, Login, &[(V1_13, 0x04)])?;

        registry.register(P::KeepAlive, Clientbound, Play, &[(V1_8, 0x00), (V1_9, 0x1F), (V1_13, 0x21), (V1_14, 0x20), (V1_15, 0x21)])?;
        registry.register(P::JoinGame, Clientbound, Play, &[(V1_8, 0x01), (V1_9, 0x23), (V1_13, 0x25), (V1_15, 0x26)])?;
        registry.register(P::ChatMessage, Clientbound, Play, &[(V1_8, 0x02), (V1_9, 0x0F), (V1_13, 0x0E), (V1_15, 0x0F)])?;
        registry.register(P::Respawn, Clientbound, Play, &[(V1_8, 0x07), (V1_9, 0x33), (V1_12, 0x34), (V1_12_1, 0x35), (V1_13, 0x38), (V1_14, 0x3A), (V1_15, 0x3B)])?;
        registry.register(P::PlayerPosition, Clientbound, Play, &[(V1_8, 0x08), (V1_9, 0x2E), (V1_12_1, 0x2F), (V1_13, 0x32), (V1_14, 0x35), (V1_15, 0x36)])?;
        registry.register(P::PluginMessage, Clientbound, Play, &[(V1_8, 0x3F), (V1_9, 0x18), (V1_13, 0x19), (V1_14, 0x18), (V1_15, 0x19)])?;
        registry.register(P::Disconnect, Clientbound, Play, &[(V1_8, 0x40), (V1_9, 0x1A), (V1_13, 0x1B), (V1_14, 0x1A), (V1_15, 0x1B)])?;

        registry.register(P::KeepAlive, Serverbound, Play, &[(V1_8, 0x00), (V1_9, 0x0B), (V1_12, 0x0C), (V1_12_1, 0x0B), (V1_13, 0x0E), (V1_14, 0x0F)])?;
        registry.register(P::ClientChat, Serverbound, Play, &[(V1_8, 0x01), (V1_9, 0x02), (V1_12, 0x03), (V1_12_1, 0x02), (V1_14, 0x03)])?;
        registry.register(P::PluginMessage, Serverbound, Play, &[(V1_8, 0x17), (V1_9, 0x09), (V1_12, 0x0A), (V1_12_1, 0x09), (V1_13, 0x0A), (V1_14, 0x0B)])?;

        Ok(registry)
    }
}

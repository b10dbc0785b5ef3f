use anyhow::Result;
use bytes::{Buf, Bytes, BytesMut};

use self::{
    handshake::Handshake,
    login::{
        Disconnect, EncryptionRequest, EncryptionResponse, LoginPluginRequest, LoginPluginResponse, LoginStart,
        LoginSuccess, SetCompression,
    },
    play::{ChatMessage, ClientChat, JoinGame, KeepAlive, PlayerPosition, PluginMessage, Respawn},
    status::{Ping, StatusRequest, StatusResponse},
};

use super::ProtocolVersion;

pub mod handshake;
pub mod login;
pub mod play;
pub mod status;

pub trait Packet: Sized {
    fn from_bytes(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self>;

    fn put_buf(&self, buf: &mut BytesMut, version: ProtocolVersion);
}

/// A packet with a fixed tag in [`PacketType`].
pub trait Typed: Packet + Into<PacketType> + TryFrom<PacketType, Error = PacketType> {
    const KIND: PacketKind;
}

/// Packet the registry has no type for. Kept verbatim so it can be relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub id: i32,
    pub data: Bytes,
}

macro_rules! packets {
    ( $( $packet:ident ),* $(,)? ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum PacketKind {
            $( $packet, )*
        }

        impl PacketKind {
            pub const fn name(self) -> &'static str {
                match self {
                    $( PacketKind::$packet => stringify!($packet), )*
                }
            }
        }

        #[derive(Debug, Clone, PartialEq)]
        pub enum PacketType {
            $( $packet($packet), )*
            Raw(RawPacket),
        }

        impl PacketType {
            pub fn kind(&self) -> Option<PacketKind> {
                match self {
                    $( PacketType::$packet(_) => Some(PacketKind::$packet), )*
                    PacketType::Raw(_) => None,
                }
            }

            pub fn name(&self) -> String {
                match self {
                    $( PacketType::$packet(_) => stringify!($packet).to_owned(), )*
                    PacketType::Raw(raw) => format!("Raw({:#04x})", raw.id),
                }
            }

            pub fn read(kind: PacketKind, buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self> {
                Ok(match kind {
                    $( PacketKind::$packet => PacketType::$packet($packet::from_bytes(buf, version)?), )*
                })
            }

            pub fn write(&self, buf: &mut BytesMut, version: ProtocolVersion) {
                match self {
                    $( PacketType::$packet(packet) => packet.put_buf(buf, version), )*
                    PacketType::Raw(raw) => buf.extend_from_slice(&raw.data),
                }
            }
        }

        $(
            impl From<$packet> for PacketType {
                fn from(packet: $packet) -> Self {
                    PacketType::$packet(packet)
                }
            }

            impl TryFrom<PacketType> for $packet {
                type Error = PacketType;

                fn try_from(packet: PacketType) -> Result<Self, Self::Error> {
                    match packet {
                        PacketType::$packet(packet) => Ok(packet),
                        other => Err(other),
                    }
                }
            }

            impl Typed for $packet {
                const KIND: PacketKind = PacketKind::$packet;
            }
        )*
    };
}

packets! {
    Handshake,

    StatusRequest,
    StatusResponse,
    Ping,

    LoginStart,
    EncryptionRequest,
    EncryptionResponse,
    LoginSuccess,
    SetCompression,
    LoginPluginRequest,
    LoginPluginResponse,
    Disconnect,

    KeepAlive,
    JoinGame,
    Respawn,
    PlayerPosition,
    ChatMessage,
    ClientChat,
    PluginMessage,
}

impl From<RawPacket> for PacketType {
    fn from(packet: RawPacket) -> Self {
        PacketType::Raw(packet)
    }
}

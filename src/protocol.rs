use std::fmt;

use strum::{EnumIter, IntoEnumIterator};

use crate::error::ProtocolError;

pub mod buffer;
pub mod codec;
pub mod crypto;
pub mod packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Handshake,
    Status,
    Login,
    Play,
}

impl State {
    /// Next state requested by the handshake packet.
    pub const fn from_intent(intent: i32) -> Option<Self> {
        match intent {
            1 => Some(State::Status),
            2 => Some(State::Login),
            _ => None,
        }
    }

    pub const fn intent(self) -> i32 {
        match self {
            State::Status => 1,
            State::Login => 2,
            _ => 0,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Travel direction of a packet, seen from the game server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Clientbound,
    Serverbound,
}

impl Direction {
    pub const fn opposite(self) -> Self {
        match self {
            Direction::Clientbound => Direction::Serverbound,
            Direction::Serverbound => Direction::Clientbound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
#[repr(i32)]
pub enum ProtocolVersion {
    V1_8 = 47,
    V1_9 = 107,
    V1_9_1 = 108,
    V1_9_2 = 109,
    V1_9_4 = 110,
    V1_10 = 210,
    V1_11 = 315,
    V1_11_1 = 316,
    V1_12 = 335,
    V1_12_1 = 338,
    V1_12_2 = 340,
    V1_13 = 393,
    V1_13_1 = 401,
    V1_13_2 = 404,
    V1_14 = 477,
    V1_14_1 = 480,
    V1_14_2 = 485,
    V1_14_3 = 490,
    V1_14_4 = 498,
    V1_15 = 573,
    V1_15_1 = 575,
    V1_15_2 = 578,
}

impl ProtocolVersion {
    pub const OLDEST: ProtocolVersion = ProtocolVersion::V1_8;
    pub const NEWEST: ProtocolVersion = ProtocolVersion::V1_15_2;

    pub const fn id(self) -> i32 {
        self as i32
    }

    /// Position in the ordered table of supported versions.
    pub fn index(self) -> usize {
        ProtocolVersion::iter()
            .position(|v| v == self)
            .unwrap_or_default()
    }

    pub fn count() -> usize {
        ProtocolVersion::iter().count()
    }

    pub const fn name(self) -> &'static str {
        match self {
            ProtocolVersion::V1_8 => "1.8",
            ProtocolVersion::V1_9 => "1.9",
            ProtocolVersion::V1_9_1 => "1.9.1",
            ProtocolVersion::V1_9_2 => "1.9.2",
            ProtocolVersion::V1_9_4 => "1.9.4",
            ProtocolVersion::V1_10 => "1.10",
            ProtocolVersion::V1_11 => "1.11",
            ProtocolVersion::V1_11_1 => "1.11.1",
            ProtocolVersion::V1_12 => "1.12",
            ProtocolVersion::V1_12_1 => "1.12.1",
            ProtocolVersion::V1_12_2 => "1.12.2",
            ProtocolVersion::V1_13 => "1.13",
            ProtocolVersion::V1_13_1 => "1.13.1",
            ProtocolVersion::V1_13_2 => "1.13.2",
            ProtocolVersion::V1_14 => "1.14",
            ProtocolVersion::V1_14_1 => "1.14.1",
            ProtocolVersion::V1_14_2 => "1.14.2",
            ProtocolVersion::V1_14_3 => "1.14.3",
            ProtocolVersion::V1_14_4 => "1.14.4",
            ProtocolVersion::V1_15 => "1.15",
            ProtocolVersion::V1_15_1 => "1.15.1",
            ProtocolVersion::V1_15_2 => "1.15.2",
        }
    }
}

impl TryFrom<i32> for ProtocolVersion {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        ProtocolVersion::iter()
            .find(|v| v.id() == value)
            .ok_or(ProtocolError::UnsupportedVersion(value))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}

/// The protocol version a connection negotiated. Handshakes may carry numbers we
/// do not support, which still need to be answered in the status and login states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiated {
    Supported(ProtocolVersion),
    Unsupported(i32),
}

impl Negotiated {
    pub fn from_id(id: i32) -> Self {
        match ProtocolVersion::try_from(id) {
            Ok(version) => Negotiated::Supported(version),
            Err(_) => Negotiated::Unsupported(id),
        }
    }

    pub const fn supported(self) -> Option<ProtocolVersion> {
        match self {
            Negotiated::Supported(version) => Some(version),
            Negotiated::Unsupported(_) => None,
        }
    }

    pub const fn id(self) -> i32 {
        match self {
            Negotiated::Supported(version) => version.id(),
            Negotiated::Unsupported(id) => id,
        }
    }
}

impl From<ProtocolVersion> for Negotiated {
    fn from(version: ProtocolVersion) -> Self {
        Negotiated::Supported(version)
    }
}

use anyhow::Result;
use bytes::{Buf, BufMut, BytesMut};

use super::Packet;
use crate::protocol::buffer::{BufExt, BufMutExt};
use crate::protocol::ProtocolVersion;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol: i32,
    pub server_address: String,
    pub port: u16,
    pub next_state: i32,
}

impl Packet for Handshake {
    fn from_bytes(buf: &mut impl Buf, _: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            protocol: buf.get_varint()?,
            server_address: buf.get_string(255)?,
            port: buf.try_get_u16()?,
            next_state: buf.get_varint()?,
        })
    }

    fn put_buf(&self, buf: &mut BytesMut, _: ProtocolVersion) {
        buf.put_varint(self.protocol);
        buf.put_string(&self.server_address);
        buf.put_u16(self.port);
        buf.put_varint(self.next_state);
    }
}

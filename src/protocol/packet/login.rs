use anyhow::Result;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::Packet;
use crate::component::Component;
use crate::protocol::buffer::{BufExt, BufMutExt};
use crate::protocol::ProtocolVersion;

/// Names longer than the protocol allows are still read so that the login
/// handler can answer them with a proper disconnect.
const LOGIN_NAME_READ_CAP: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    pub username: String,
}

impl Packet for LoginStart {
    fn from_bytes(buf: &mut impl Buf, _: ProtocolVersion) -> Result<Self> {
        Ok(Self { username: buf.get_string(LOGIN_NAME_READ_CAP)? })
    }

    fn put_buf(&self, buf: &mut BytesMut, _: ProtocolVersion) {
        buf.put_string(&self.username);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    pub uuid: Uuid,
    pub username: String,
}

impl Packet for LoginSuccess {
    fn from_bytes(buf: &mut impl Buf, _: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            uuid: buf.get_uuid_str()?,
            username: buf.get_string(16)?,
        })
    }

    fn put_buf(&self, buf: &mut BytesMut, _: ProtocolVersion) {
        buf.put_uuid_str(self.uuid);
        buf.put_string(&self.username);
    }
}

/// Kick packet, shared by the login and play states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub reason: String,
}

impl Disconnect {
    pub fn new(reason: &Component) -> Self {
        Self { reason: reason.to_json() }
    }

    pub fn text(reason: &str) -> Self {
        Self::new(&Component::text(reason))
    }

    pub fn component(&self) -> Component {
        Component::parse(&self.reason).unwrap_or_else(|_| Component::text(&self.reason))
    }
}

impl Packet for Disconnect {
    fn from_bytes(buf: &mut impl Buf, _: ProtocolVersion) -> Result<Self> {
        Ok(Self { reason: buf.get_string(262144)? })
    }

    fn put_buf(&self, buf: &mut BytesMut, _: ProtocolVersion) {
        buf.put_string(&self.reason);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCompression {
    pub threshold: i32,
}

impl Packet for SetCompression {
    fn from_bytes(buf: &mut impl Buf, _: ProtocolVersion) -> Result<Self> {
        Ok(Self { threshold: buf.get_varint()? })
    }

    fn put_buf(&self, buf: &mut BytesMut, _: ProtocolVersion) {
        buf.put_varint(self.threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionRequest {
    pub server_id: String,
    pub public_key: Bytes,
    pub verify_token: Bytes,
}

impl Packet for EncryptionRequest {
    fn from_bytes(buf: &mut impl Buf, _: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            server_id: buf.get_string(20)?,
            public_key: buf.get_byte_array()?,
            verify_token: buf.get_byte_array()?,
        })
    }

    fn put_buf(&self, buf: &mut BytesMut, _: ProtocolVersion) {
        buf.put_string(&self.server_id);
        buf.put_byte_array(&self.public_key);
        buf.put_byte_array(&self.verify_token);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResponse {
    pub shared_secret: Bytes,
    pub verify_token: Bytes,
}

impl Packet for EncryptionResponse {
    fn from_bytes(buf: &mut impl Buf, _: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            shared_secret: buf.get_byte_array()?,
            verify_token: buf.get_byte_array()?,
        })
    }

    fn put_buf(&self, buf: &mut BytesMut, _: ProtocolVersion) {
        buf.put_byte_array(&self.shared_secret);
        buf.put_byte_array(&self.verify_token);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPluginRequest {
    pub message_id: i32,
    pub channel: String,
    pub data: Bytes,
}

impl Packet for LoginPluginRequest {
    fn from_bytes(buf: &mut impl Buf, _: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            message_id: buf.get_varint()?,
            channel: buf.get_identifier()?,
            data: buf.copy_to_bytes(buf.remaining()),
        })
    }

    fn put_buf(&self, buf: &mut BytesMut, _: ProtocolVersion) {
        buf.put_varint(self.message_id);
        buf.put_string(&self.channel);
        buf.extend_from_slice(&self.data);
    }
}

/// `data` is `None` when the client did not understand the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPluginResponse {
    pub message_id: i32,
    pub data: Option<Bytes>,
}

impl Packet for LoginPluginResponse {
    fn from_bytes(buf: &mut impl Buf, _: ProtocolVersion) -> Result<Self> {
        let message_id = buf.get_varint()?;
        let successful = buf.get_bool()?;
        Ok(Self {
            message_id,
            data: successful.then(|| buf.copy_to_bytes(buf.remaining())),
        })
    }

    fn put_buf(&self, buf: &mut BytesMut, _: ProtocolVersion) {
        buf.put_varint(self.message_id);
        buf.put_bool(self.data.is_some());

        if let Some(data) = &self.data {
            buf.extend_from_slice(data);
        }
    }
}

use anyhow::Result;
use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use uuid::Uuid;

use super::Packet;
use crate::component::Component;
use crate::protocol::buffer::{BufExt, BufMutExt};
use crate::protocol::ProtocolVersion;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRequest;

impl Packet for StatusRequest {
    fn from_bytes(_: &mut impl Buf, _: ProtocolVersion) -> Result<Self> {
        Ok(Self)
    }

    fn put_buf(&self, _: &mut BytesMut, _: ProtocolVersion) {}
}

#[derive(Serialize)]
pub struct Version {
    pub name: String,
    pub protocol: i32,
}

#[derive(Serialize)]
pub struct Players {
    pub max: usize,
    pub online: usize,
    pub sample: Vec<SamplePlayer>,
}

#[derive(Serialize)]
pub struct SamplePlayer {
    pub name: String,
    pub id: Uuid,
}

/// Server list document sent in [`StatusResponse`].
#[derive(Serialize)]
pub struct Status {
    pub version: Version,
    pub players: Players,
    pub description: Component,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub json: String,
}

impl StatusResponse {
    pub fn new(status: &Status) -> Result<Self> {
        Ok(Self { json: serde_json::to_string(status)? })
    }
}

impl Packet for StatusResponse {
    fn from_bytes(buf: &mut impl Buf, _: ProtocolVersion) -> Result<Self> {
        Ok(Self { json: buf.get_string(32767)? })
    }

    fn put_buf(&self, buf: &mut BytesMut, _: ProtocolVersion) {
        buf.put_string(&self.json)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    pub payload: i64,
}

impl Packet for Ping {
    fn from_bytes(buf: &mut impl Buf, _: ProtocolVersion) -> Result<Self> {
        Ok(Self { payload: buf.try_get_i64()? })
    }

    fn put_buf(&self, buf: &mut BytesMut, _: ProtocolVersion) {
        buf.put_i64(self.payload);
    }
}

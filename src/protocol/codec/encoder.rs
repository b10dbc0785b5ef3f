use std::cell::RefCell;

use anyhow::{anyhow, ensure, Result};
use bytes::{BufMut, BytesMut};
use libdeflater::{CompressionLvl, Compressor};
use tokio_util::codec::Encoder;

use super::cipher::Encrypter;
use super::MAX_PACKET_SIZE;
use crate::error::ProtocolError;
use crate::protocol::buffer::{varint_length, BufMutExt};

thread_local!(
    static COMPRESSOR: RefCell<Compressor> = RefCell::new(Compressor::new(CompressionLvl::default()))
);

/// Inverse of the decoder: deflate above the threshold, frame, encrypt.
pub struct MinecraftEncoder {
    threshold: Option<usize>,
    encrypter: Option<Encrypter>,
}

impl MinecraftEncoder {
    pub fn new() -> Self {
        Self { threshold: None, encrypter: None }
    }

    pub fn enable_compression(&mut self, threshold: usize) {
        self.threshold = Some(threshold)
    }

    pub fn disable_compression(&mut self) {
        self.threshold = None;
    }

    pub fn enable_encryption(&mut self, key: &[u8; 16]) {
        self.encrypter = Some(Encrypter::new(key));
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypter.is_some()
    }
}

impl Default for MinecraftEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<BytesMut> for MinecraftEncoder {
    type Error = anyhow::Error;

    fn encode(&mut self, packet: BytesMut, dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();
        let data_length = packet.len();

        match self.threshold {
            Some(threshold) if data_length >= threshold => {
                let payload = compress(&packet)?;
                let frame_length = payload.len() + varint_length(data_length as i32);
                ensure!(frame_length <= MAX_PACKET_SIZE, ProtocolError::FrameTooBig(frame_length));

                dst.reserve(frame_length + 3);
                dst.put_varint(frame_length as i32);
                dst.put_varint(data_length as i32);
                dst.extend_from_slice(&payload);
            }
            Some(_) => {
                ensure!(data_length < MAX_PACKET_SIZE, ProtocolError::FrameTooBig(data_length + 1));

                dst.reserve(data_length + 4);
                dst.put_varint(data_length as i32 + 1);
                dst.put_u8(0x00);
                dst.extend_from_slice(&packet);
            }
            None => {
                ensure!(data_length <= MAX_PACKET_SIZE, ProtocolError::FrameTooBig(data_length));

                dst.reserve(data_length + 3);
                dst.put_varint(data_length as i32);
                dst.extend_from_slice(&packet);
            }
        }

        if let Some(encrypter) = &mut self.encrypter {
            encrypter.encrypt(&mut dst[start..]);
        }

        Ok(())
    }
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    COMPRESSOR.with(|c| {
        let mut compressor = c.borrow_mut();
        let mut payload = vec![0; compressor.zlib_compress_bound(data.len())];
        let written = compressor
            .zlib_compress(data, &mut payload)
            .map_err(|err| anyhow!("zlib: {}", err))?;
        payload.truncate(written);
        Ok(payload)
    })
}

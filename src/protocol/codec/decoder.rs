use anyhow::{anyhow, ensure, Result};
use bytes::{Buf, BytesMut};
use libdeflater::Decompressor;
use tokio_util::codec::Decoder;

use super::cipher::Decrypter;
use super::{MAX_HEADER_LENGTH, MAX_PACKET_SIZE, MAX_UNCOMPRESSED_SIZE};
use crate::error::ProtocolError;
use crate::protocol::buffer::BufExt;

/// First byte of the pre-netty server list ping.
pub const LEGACY_PING: u8 = 0xFE;

/// A framed packet of 254 bytes also starts with `FE 01`, so the legacy ping is
/// only recognised as `FE` at end of input, `FE 01` alone or `FE 01 FA`.
#[derive(Debug, PartialEq, Eq)]
enum Opening {
    Legacy,
    Framed,
    NeedMore,
}

fn classify_opening(src: &[u8], eof: bool) -> Opening {
    match src {
        [] if eof => Opening::Framed,
        [] => Opening::NeedMore,
        [first, ..] if *first != LEGACY_PING => Opening::Framed,
        [_] if eof => Opening::Legacy,
        [_] => Opening::NeedMore,
        [_, 0x01] | [_, 0x01, 0xFA, ..] => Opening::Legacy,
        _ => Opening::Framed,
    }
}

pub enum DecodeState {
    Length(i32, usize),
    Data(usize),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    /// Decompressed packet: varint id followed by the body.
    Packet(BytesMut),
    LegacyPing,
}

struct Decompression {
    threshold: usize,
    decompressor: Decompressor,
}

/// Splits the inbound stream into packets: decrypt, unframe, inflate.
pub struct MinecraftDecoder {
    state: DecodeState,
    /// Decrypted bytes that do not form a whole frame yet.
    pending: BytesMut,
    decompression: Option<Decompression>,
    decrypter: Option<Decrypter>,
    check_legacy: bool,
}

impl MinecraftDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Length(0, 0),
            pending: BytesMut::with_capacity(1024),
            decompression: None,
            decrypter: None,
            check_legacy: false,
        }
    }

    /// Decoder for an accepted socket, which may open with a legacy ping.
    pub fn accepting() -> Self {
        Self { check_legacy: true, ..Self::new() }
    }

    pub fn enable_compression(&mut self, threshold: usize) {
        self.decompression = Some(Decompression { threshold, decompressor: Decompressor::new() })
    }

    pub fn disable_compression(&mut self) {
        self.decompression = None;
    }

    /// The peer switches ciphers right after the frame that was just decoded, so
    /// whatever is already buffered is ciphertext too.
    pub fn enable_encryption(&mut self, key: &[u8; 16]) {
        let mut decrypter = Decrypter::new(key);
        decrypter.decrypt(&mut self.pending);
        self.decrypter = Some(decrypter);
    }

    pub fn is_encrypted(&self) -> bool {
        self.decrypter.is_some()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn legacy_ping(&mut self, src: &mut BytesMut) -> Frame {
        self.check_legacy = false;
        src.clear();
        Frame::LegacyPing
    }

    fn take_frame(&mut self) -> Result<Option<BytesMut>> {
        let length = match self.state {
            DecodeState::Length(value, read) => {
                self.state = read_varint(value, read, &mut self.pending)?;

                match self.state {
                    DecodeState::Data(length) => length,
                    DecodeState::Length(_, _) => return Ok(None),
                }
            }
            DecodeState::Data(length) => length,
        };

        if self.pending.len() < length {
            self.pending.reserve(length - self.pending.len());
            return Ok(None);
        }

        self.state = DecodeState::Length(0, 0);
        Ok(Some(self.pending.split_to(length)))
    }

    fn decompress(&mut self, mut data: BytesMut) -> Result<BytesMut> {
        let Some(Decompression { threshold, decompressor }) = &mut self.decompression else {
            return Ok(data);
        };

        let data_length = data.get_varint()?;
        ensure!(data_length >= 0, "negative uncompressed size");
        let data_length = data_length as usize;

        if data_length == 0 {
            return Ok(data);
        }

        ensure!(
            data_length >= *threshold,
            ProtocolError::BelowThreshold { declared: data_length, threshold: *threshold }
        );
        ensure!(data_length <= MAX_UNCOMPRESSED_SIZE, ProtocolError::FrameTooBig(data_length));

        let mut buf = BytesMut::zeroed(data_length);
        let actual = decompressor
            .zlib_decompress(&data, &mut buf)
            .map_err(|err| anyhow!("zlib: {}", err))?;
        ensure!(
            actual == data_length,
            ProtocolError::SizeMismatch { expected: data_length, actual }
        );

        Ok(buf)
    }
}

impl Default for MinecraftDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MinecraftDecoder {
    type Item = Frame;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if self.check_legacy {
            match classify_opening(src, false) {
                Opening::NeedMore => return Ok(None),
                Opening::Legacy => return Ok(Some(self.legacy_ping(src))),
                Opening::Framed => self.check_legacy = false,
            }
        }

        if !src.is_empty() {
            let mut incoming = src.split();
            if let Some(decrypter) = &mut self.decrypter {
                decrypter.decrypt(&mut incoming);
            }
            self.pending.unsplit(incoming);
        }

        match self.take_frame()? {
            Some(frame) => Ok(Some(Frame::Packet(self.decompress(frame)?))),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if self.check_legacy && classify_opening(src, true) == Opening::Legacy {
            return Ok(Some(self.legacy_ping(src)));
        }

        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if self.pending.is_empty() => Ok(None),
            None => Err(anyhow!("{} bytes remaining on stream", self.pending.len())),
        }
    }
}

#[inline(always)]
pub fn read_varint(mut value: i32, mut read: usize, src: &mut BytesMut) -> Result<DecodeState> {
    while read < MAX_HEADER_LENGTH {
        if !src.has_remaining() {
            return Ok(DecodeState::Length(value, read));
        }

        let byte = src.get_u8();
        value |= ((byte & 0x7F) as i32) << (read * 7);
        read += 1;

        if (byte & 0x80) != 128 {
            let length = value as usize;
            ensure!(length > 0, "empty frame");
            ensure!(length <= MAX_PACKET_SIZE, ProtocolError::FrameTooBig(length));
            return Ok(DecodeState::Data(length));
        }
    }

    Err(ProtocolError::VarintTooLong.into())
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;
    use crate::protocol::buffer::BufMutExt;

    fn frame(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_varint(payload.len() as i32);
        buf.put_slice(payload);
        buf
    }

    fn packet(frame: Option<Frame>) -> BytesMut {
        match frame {
            Some(Frame::Packet(packet)) => packet,
            other => panic!("expected packet, got {:?}", other),
        }
    }

    #[test]
    fn partial_frames_wait_for_more_input() {
        let mut decoder = MinecraftDecoder::new();
        let whole = frame(&[0x01; 300]);

        let mut src = BytesMut::from(&whole[..1]);
        assert!(decoder.decode(&mut src).unwrap().is_none());
        let mut src = BytesMut::from(&whole[1..100]);
        assert!(decoder.decode(&mut src).unwrap().is_none());
        assert!(decoder.has_pending());

        let mut src = BytesMut::from(&whole[100..]);
        assert_eq!(&packet(decoder.decode(&mut src).unwrap())[..], &[0x01; 300][..]);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn several_frames_in_one_read() {
        let mut decoder = MinecraftDecoder::new();
        let mut src = frame(b"\x00one");
        src.unsplit(frame(b"\x01two"));
        src.put_slice(&[0x05, 0x02]);

        assert_eq!(&packet(decoder.decode(&mut src).unwrap())[..], b"\x00one");
        assert_eq!(&packet(decoder.decode(&mut src).unwrap())[..], b"\x01two");
        assert!(decoder.decode(&mut src).unwrap().is_none());
        assert!(decoder.has_pending());
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut decoder = MinecraftDecoder::new();
        let mut src = BytesMut::from(&[0xFF, 0xFF, 0xFF, 0x01][..]);
        assert!(decoder.decode(&mut src).is_err());
    }

    #[test]
    fn legacy_ping_is_detected_before_framing() {
        let mut decoder = MinecraftDecoder::accepting();
        let mut src = BytesMut::from(&[0xFE, 0x01, 0xFA][..]);
        assert_eq!(decoder.decode(&mut src).unwrap(), Some(Frame::LegacyPing));
    }

    #[test]
    fn handshake_of_254_bytes_is_framed() {
        let mut decoder = MinecraftDecoder::accepting();
        let mut payload = vec![0x00];
        payload.resize(254, b'a');
        let mut src = frame(&payload);
        assert_eq!(&src[..2], &[LEGACY_PING, 0x01]);

        assert_eq!(&packet(decoder.decode(&mut src).unwrap())[..], &payload[..]);
    }

    #[test]
    fn lone_legacy_byte_waits_for_more() {
        let mut decoder = MinecraftDecoder::accepting();
        let mut src = BytesMut::from(&[LEGACY_PING][..]);
        assert_eq!(decoder.decode(&mut src).unwrap(), None);
        assert_eq!(src.len(), 1);

        src.put_u8(0x01);
        assert_eq!(decoder.decode(&mut src).unwrap(), Some(Frame::LegacyPing));

        let mut decoder = MinecraftDecoder::accepting();
        let mut src = BytesMut::from(&[LEGACY_PING][..]);
        assert_eq!(decoder.decode_eof(&mut src).unwrap(), Some(Frame::LegacyPing));
    }

    #[test]
    fn legacy_check_leaves_normal_handshake_alone() {
        let mut decoder = MinecraftDecoder::accepting();
        let mut src = frame(b"\x00hello");
        assert_eq!(&packet(decoder.decode(&mut src).unwrap())[..], b"\x00hello");

        // only the opening bytes of a connection are checked
        let mut decoder = MinecraftDecoder::accepting();
        let mut src = frame(b"\x00a");
        packet(decoder.decode(&mut src).unwrap());
        let mut src = frame(&[LEGACY_PING]);
        assert_eq!(&packet(decoder.decode(&mut src).unwrap())[..], &[LEGACY_PING]);
    }

    #[test]
    fn uncompressed_frame_below_threshold() {
        let mut decoder = MinecraftDecoder::new();
        decoder.enable_compression(256);

        let mut src = frame(b"\x00\x07raw");
        assert_eq!(&packet(decoder.decode(&mut src).unwrap())[..], b"\x07raw");
    }

    #[test]
    fn compressed_frame_claiming_small_size_is_rejected() {
        let mut decoder = MinecraftDecoder::new();
        decoder.enable_compression(256);

        let mut src = frame(b"\x05garbage");
        assert!(decoder.decode(&mut src).is_err());
    }
}

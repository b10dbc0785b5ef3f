use std::{io, net::SocketAddr, sync::Arc};

use anyhow::{anyhow, Result};
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpStream,
};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::{
    decoder::{Frame, MinecraftDecoder},
    encoder::MinecraftEncoder,
    registry::PacketRegistry,
};
use crate::{
    component::Component,
    error::ProtocolError,
    protocol::{
        packet::{login::Disconnect, PacketType, Typed},
        Direction, Negotiated, ProtocolVersion, State,
    },
};

/// One socket speaking the game protocol, either accepted from a client or
/// dialled to a backend. Owned by a single task.
pub struct Connection {
    pub protocol: Negotiated,
    state: State,
    /// Direction of the packets this side receives.
    inbound: Direction,
    closed: bool,
    peer: SocketAddr,
    registry: Arc<PacketRegistry>,

    framed_read: FramedRead<OwnedReadHalf, MinecraftDecoder>,
    framed_write: FramedWrite<OwnedWriteHalf, MinecraftEncoder>,
}

impl Connection {
    fn create(
        stream: TcpStream,
        protocol: Negotiated,
        inbound: Direction,
        decoder: MinecraftDecoder,
        registry: Arc<PacketRegistry>,
    ) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();

        Ok(Self {
            protocol,
            state: State::Handshake,
            inbound,
            closed: false,
            peer,
            registry,

            framed_read: FramedRead::new(reader, decoder),
            framed_write: FramedWrite::new(writer, MinecraftEncoder::new()),
        })
    }

    /// Wraps a socket accepted from a client.
    pub fn accept(stream: TcpStream, registry: Arc<PacketRegistry>) -> io::Result<Self> {
        Self::create(
            stream,
            Negotiated::Supported(ProtocolVersion::OLDEST),
            Direction::Serverbound,
            MinecraftDecoder::accepting(),
            registry,
        )
    }

    /// Dials a backend server, speaking as a client of `version`.
    pub async fn connect(addr: SocketAddr, version: ProtocolVersion, registry: Arc<PacketRegistry>) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::create(stream, version.into(), Direction::Clientbound, MinecraftDecoder::new(), registry)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn change_state(&mut self, state: State) {
        self.state = state;
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn version(&self) -> Option<ProtocolVersion> {
        self.protocol.supported()
    }

    pub fn is_encrypted(&self) -> bool {
        self.framed_read.decoder().is_encrypted() && self.framed_write.encoder().is_encrypted()
    }

    pub async fn next_frame(&mut self) -> Result<Frame> {
        if self.closed {
            return Err(ProtocolError::ConnectionClosed.into());
        }

        match self.framed_read.next().await {
            Some(result) => result,
            None => Err(ProtocolError::ConnectionClosed.into()),
        }
    }

    pub fn decode(&self, frame: BytesMut) -> Result<PacketType> {
        self.registry.decode(self.state, self.inbound, self.protocol, frame)
    }

    pub async fn next_packet(&mut self) -> Result<PacketType> {
        match self.next_frame().await? {
            Frame::Packet(frame) => self.decode(frame),
            Frame::LegacyPing => Err(anyhow!("legacy ping after handshake")),
        }
    }

    /// Reads the next packet, which must be a `T`.
    pub async fn read_packet<T: Typed>(&mut self) -> Result<T> {
        let packet = self.next_packet().await?;

        T::try_from(packet).map_err(|other| {
            ProtocolError::UnexpectedPacket { expected: T::KIND.name(), got: other.name() }.into()
        })
    }

    fn serialize_packet(&self, packet: &PacketType) -> Result<BytesMut> {
        self.registry.encode(self.state, self.inbound.opposite(), self.protocol, packet)
    }

    /// Buffers a packet without flushing the socket.
    pub async fn queue_packet(&mut self, packet: impl Into<PacketType>) -> Result<()> {
        if self.closed {
            return Err(ProtocolError::ConnectionClosed.into());
        }

        let frame = self.serialize_packet(&packet.into())?;
        self.framed_write.feed(frame).await
    }

    pub async fn write_packet(&mut self, packet: impl Into<PacketType>) -> Result<()> {
        self.queue_packet(packet).await?;
        self.flush().await
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.framed_write.flush().await
    }

    /// Writes bytes around the codec, for the legacy ping reply.
    pub async fn write_unframed(&mut self, bytes: &[u8]) -> Result<()> {
        self.framed_write.flush().await?;
        self.framed_write.get_mut().write_all(bytes).await?;
        Ok(())
    }

    /// Negative thresholds leave compression off.
    pub fn enable_compression(&mut self, threshold: i32) {

        if threshold > -1 {
            let threshold = threshold as usize;
            self.framed_read.decoder_mut().enable_compression(threshold);
            self.framed_write.encoder_mut().enable_compression(threshold);
        } else {
            self.framed_read.decoder_mut().disable_compression();
            self.framed_write.encoder_mut().disable_compression();
        }
    }

    pub fn enable_encryption(&mut self, key: &[u8; 16]) {
        self.framed_read.decoder_mut().enable_encryption(key);
        self.framed_write.encoder_mut().enable_encryption(key);
    }

    /// Sends a kick in the states that have one, then closes.
    pub async fn disconnect(&mut self, reason: &Component) -> Result<()> {
        if !self.closed && matches!(self.state, State::Login | State::Play) {
            // the socket is going away either way
            let _ = self.write_packet(Disconnect::new(reason)).await;
        }
        self.close().await
    }

    /// Flushes and shuts the socket down. Later calls do nothing.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.framed_write.close().await
    }
}

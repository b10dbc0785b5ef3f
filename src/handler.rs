//! Per-connection state machine. Every accepted socket walks
//! handshake -> status, or handshake -> login -> play, where play is either
//! served by the [`World`](crate::world::World) or relayed to a backend.

use std::sync::Arc;

use anyhow::Result;
use log::debug;
use tokio::net::TcpStream;

use crate::{
    error::ProtocolError,
    protocol::{
        codec::{connection::Connection, decoder::Frame},
        packet::handshake::Handshake,
        Negotiated, State,
    },
    relay,
    server::Context,
};

pub mod game;
pub mod login;
pub mod status;

pub async fn handle(stream: TcpStream, context: Arc<Context>) -> Result<()> {
    let mut client = Connection::accept(stream, context.registry.clone())?;
    let result = dispatch(&mut client, &context).await;
    // already closed on most paths
    let closed = client.close().await;
    result.and(closed)
}

async fn dispatch(client: &mut Connection, context: &Context) -> Result<()> {
    let handshake = match client.next_frame().await? {
        Frame::LegacyPing => return status::legacy_ping(client, context).await,
        Frame::Packet(frame) => client.decode(frame)?,
    };
    let handshake = Handshake::try_from(handshake).map_err(|other| ProtocolError::UnexpectedPacket {
        expected: "Handshake",
        got: other.name(),
    })?;

    client.protocol = Negotiated::from_id(handshake.protocol);
    debug!(
        "{} handshake: protocol {}, address {}:{}, next state {}",
        client.peer(),
        handshake.protocol,
        handshake.server_address,
        handshake.port,
        handshake.next_state
    );

    match State::from_intent(handshake.next_state) {
        Some(State::Status) => {
            client.change_state(State::Status);
            status::handle(client, context).await
        }
        Some(State::Login) => {
            client.change_state(State::Login);
            let Some(session) = login::login(client, context).await? else {
                return Ok(());
            };

            if context.is_proxy() {
                relay::run(client, context, session).await
            } else {
                game::play(client, context, session).await
            }
        }
        _ => Err(ProtocolError::InvalidIntent(handshake.next_state).into()),
    }
}

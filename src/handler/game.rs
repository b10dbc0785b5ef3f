use anyhow::Result;
use log::{debug, info};
use tokio::sync::mpsc;

use super::login::Session;
use crate::{
    protocol::{
        codec::connection::Connection,
        packet::{play::ClientChat, PacketType},
    },
    server::{Context, Player},
};

/// Serves a player from the local [`World`](crate::world::World) until either side hangs up.
pub async fn play(client: &mut Connection, context: &Context, session: Session) -> Result<()> {
    let Session { player, registration: _registration, mut outbound } = session;

    for packet in context.world.connect(&player).await? {
        client.queue_packet(packet).await?;
    }
    client.flush().await?;

    let result = run(client, context, &player, &mut outbound).await;
    context.world.disconnect(&player).await;
    info!("{} left the game", player.name);
    result
}

async fn run(
    client: &mut Connection,
    context: &Context,
    player: &Player,
    outbound: &mut mpsc::UnboundedReceiver<PacketType>,
) -> Result<()> {
    loop {
        tokio::select! {
            packet = client.next_packet() => {
                let replies = match packet? {
                    // answers to our own keep alives
                    PacketType::KeepAlive(_) => continue,
                    PacketType::ClientChat(ClientChat { message }) if message.starts_with('/') => {
                        debug!("{} issued /{}", player.name, &message[1..]);
                        context.world.command(player, &message[1..]).await?
                    }
                    packet => context.world.handle(player, packet).await?,
                };

                for reply in replies {
                    client.queue_packet(reply).await?;
                }
                client.flush().await?;
            }
            message = outbound.recv() => match message {
                Some(packet) => client.write_packet(packet).await?,
                None => return client.close().await,
            }
        }
    }
}

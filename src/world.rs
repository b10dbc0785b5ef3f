use std::sync::atomic::{AtomicI32, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use log::info;

use crate::{
    component::{Color, Component},
    protocol::packet::{
        play::{ChatMessage, ClientChat, JoinGame, PlayerPosition, CHAT},
        PacketType,
    },
    server::Player,
};

/// Everything beyond the protocol itself: spawn data, gameplay, commands.
/// Each method returns the packets to send back to the player, in order.
#[async_trait]
pub trait World: Send + Sync {
    /// Called once the player entered play. Must start with a [`JoinGame`].
    async fn connect(&self, player: &Player) -> Result<Vec<PacketType>>;

    async fn disconnect(&self, player: &Player);

    async fn handle(&self, player: &Player, packet: PacketType) -> Result<Vec<PacketType>>;

    /// Chat starting with `/`, without the slash.
    async fn command(&self, player: &Player, command: &str) -> Result<Vec<PacketType>>;
}

/// An empty void. Players float at spawn and can chat with themselves.
pub struct Limbo {
    next_entity_id: AtomicI32,
    max_players: u8,
}

impl Limbo {
    pub fn new(max_players: usize) -> Self {
        Self {
            next_entity_id: AtomicI32::new(1),
            max_players: max_players.min(u8::MAX as usize) as u8,
        }
    }
}

#[async_trait]
impl World for Limbo {
    async fn connect(&self, player: &Player) -> Result<Vec<PacketType>> {
        let join = JoinGame {
            entity_id: self.next_entity_id.fetch_add(1, Ordering::Relaxed),
            game_mode: 2,
            dimension: 0,
            hashed_seed: 0,
            difficulty: 0,
            max_players: self.max_players,
            level_type: String::from("flat"),
            view_distance: 2,
            reduced_debug_info: false,
            enable_respawn_screen: true,
        };
        let spawn = PlayerPosition { x: 0.5, y: 64.0, z: 0.5, yaw: 0.0, pitch: 0.0, flags: 0, teleport_id: 1 };

        let mut welcome = Component::colored("Welcome, ", Color::Gray);
        welcome.push(Component::colored(&player.name, Color::Gold));

        info!("{} entered limbo", player.name);
        Ok(vec![join.into(), spawn.into(), ChatMessage::system(&welcome).into()])
    }

    async fn disconnect(&self, player: &Player) {
        info!("{} left limbo", player.name);
    }

    async fn handle(&self, player: &Player, packet: PacketType) -> Result<Vec<PacketType>> {
        match packet {
            PacketType::ClientChat(ClientChat { message }) => {
                let line = Component::text(&format!("<{}> {}", player.name, message));
                Ok(vec![ChatMessage { json: line.to_json(), position: CHAT }.into()])
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn command(&self, player: &Player, command: &str) -> Result<Vec<PacketType>> {
        let reply = match command.split_whitespace().next() {
            Some("help") => Component::colored("Commands: /help, /whoami", Color::Yellow),
            Some("whoami") => Component::text(&format!("{} ({}) on {}", player.name, player.uuid, player.version)),
            _ => Component::colored("Unknown command", Color::Red),
        };
        Ok(vec![ChatMessage::system(&reply).into()])
    }
}

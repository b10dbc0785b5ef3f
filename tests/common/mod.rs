#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use async_trait::async_trait;
use ferry::{
    component::Component,
    config::Config,
    error::AuthError,
    online::{AuthClient, Credential, GameProfile},
    protocol::{
        codec::{connection::Connection, registry::PacketRegistry},
        packet::{
            handshake::Handshake,
            login::{LoginStart, LoginSuccess},
            play::{ChatMessage, JoinGame},
            PacketType,
        },
        ProtocolVersion, State,
    },
    server::{self, Context, Player},
    world::World,
};
use parking_lot::Mutex;
use tokio::{net::TcpListener, sync::mpsc, time::timeout};
use uuid::Uuid;

pub const WAIT: Duration = Duration::from_secs(10);

/// Session service that never vouches for anyone.
pub struct NoSessions;

#[async_trait]
impl AuthClient for NoSessions {
    async fn has_joined(&self, _: &str, _: &str) -> Result<Option<GameProfile>, AuthError> {
        Ok(None)
    }

    async fn join(&self, _: &Credential, _: &str) -> Result<bool, AuthError> {
        Ok(false)
    }
}

/// Vouches for everyone, remembering the hashes it was asked about.
#[derive(Default)]
pub struct Trusting {
    pub hashes: Mutex<Vec<String>>,
    pub joins: Mutex<Vec<(Uuid, String)>>,
}

#[async_trait]
impl AuthClient for Trusting {
    async fn has_joined(&self, name: &str, server_hash: &str) -> Result<Option<GameProfile>, AuthError> {
        self.hashes.lock().push(server_hash.to_owned());
        Ok(Some(GameProfile { id: Uuid::from_u128(42), name: name.to_owned(), properties: Vec::new() }))
    }

    async fn join(&self, credential: &Credential, server_hash: &str) -> Result<bool, AuthError> {
        self.joins.lock().push((credential.profile_id, server_hash.to_owned()));
        Ok(true)
    }
}

/// World that hands every packet it gets to the test.
pub struct Recorder {
    pub packets: mpsc::UnboundedSender<PacketType>,
}

pub fn join_game(dimension: i32) -> JoinGame {
    JoinGame {
        entity_id: 1,
        game_mode: 1,
        dimension,
        hashed_seed: 0,
        difficulty: 0,
        max_players: 10,
        level_type: "flat".to_owned(),
        view_distance: 4,
        reduced_debug_info: false,
        enable_respawn_screen: true,
    }
}

#[async_trait]
impl World for Recorder {
    async fn connect(&self, _: &Player) -> Result<Vec<PacketType>> {
        Ok(vec![join_game(0).into()])
    }

    async fn disconnect(&self, _: &Player) {}

    async fn handle(&self, _: &Player, packet: PacketType) -> Result<Vec<PacketType>> {
        let _ = self.packets.send(packet);
        Ok(Vec::new())
    }

    async fn command(&self, _: &Player, command: &str) -> Result<Vec<PacketType>> {
        Ok(vec![ChatMessage::system(&Component::text(&format!("ran {}", command))).into()])
    }
}

pub fn config() -> Config {
    Config {
        address: "127.0.0.1:0".parse().unwrap(),
        compression_threshold: 64,
        favicon: None,
        ..Config::default()
    }
}

pub async fn spawn(config: Config, auth: Arc<dyn AuthClient>, world: Arc<dyn World>) -> (SocketAddr, Arc<Context>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let context = Context::new(config, auth, world).unwrap();

    tokio::spawn(server::serve(listener, context.clone()));
    (addr, context)
}

/// Server whose world records packets, in offline mode.
pub async fn spawn_recorded(config: Config) -> (SocketAddr, Arc<Context>, mpsc::UnboundedReceiver<PacketType>) {
    let (packets, received) = mpsc::unbounded_channel();
    let (addr, context) = spawn(config, Arc::new(NoSessions), Arc::new(Recorder { packets })).await;
    (addr, context, received)
}

pub fn registry() -> Arc<PacketRegistry> {
    Arc::new(PacketRegistry::standard().unwrap())
}

pub async fn handshake(addr: SocketAddr, version: ProtocolVersion, protocol: i32, next: State) -> Result<Connection> {
    let mut connection = Connection::connect(addr, version, registry()).await?;
    connection
        .write_packet(Handshake {
            protocol,
            server_address: "localhost".to_owned(),
            port: addr.port(),
            next_state: next.intent(),
        })
        .await?;
    connection.change_state(next);
    Ok(connection)
}

pub enum Outcome {
    Joined(Connection, LoginSuccess),
    Kicked(String),
}

impl Outcome {
    pub fn joined(self) -> (Connection, LoginSuccess) {
        match self {
            Outcome::Joined(connection, success) => (connection, success),
            Outcome::Kicked(reason) => panic!("kicked: {}", reason),
        }
    }

    pub fn kicked(self) -> String {
        match self {
            Outcome::Kicked(reason) => reason,
            Outcome::Joined(_, success) => panic!("joined as {}", success.username),
        }
    }
}

pub async fn login(addr: SocketAddr, version: ProtocolVersion, name: &str) -> Outcome {
    let connection = handshake(addr, version, version.id(), State::Login).await.unwrap();
    finish_login(connection, name).await.unwrap()
}

pub async fn finish_login(mut connection: Connection, name: &str) -> Result<Outcome> {
    connection.write_packet(LoginStart { username: name.to_owned() }).await?;

    loop {
        match timeout(WAIT, connection.next_packet()).await?? {
            PacketType::SetCompression(packet) => connection.enable_compression(packet.threshold),
            PacketType::LoginSuccess(success) => {
                connection.change_state(State::Play);
                return Ok(Outcome::Joined(connection, success));
            }
            PacketType::Disconnect(kick) => return Ok(Outcome::Kicked(kick.component().plain_text())),
            other => bail!("unexpected {} during login", other.name()),
        }
    }
}

/// Reads packets until `pick` accepts one.
pub async fn next_matching<T>(connection: &mut Connection, mut pick: impl FnMut(PacketType) -> Option<T>) -> T {
    timeout(WAIT, async {
        loop {
            let packet = connection.next_packet().await.unwrap();
            if let Some(found) = pick(packet) {
                return found;
            }
        }
    })
    .await
    .expect("timed out waiting for a packet")
}

pub fn chat_text(packet: PacketType) -> Option<String> {
    match packet {
        PacketType::ChatMessage(chat) => Some(Component::parse(&chat.json).unwrap().plain_text()),
        _ => None,
    }
}

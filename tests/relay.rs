mod common;

use std::{collections::BTreeMap, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use common::*;
use ferry::{
    component::Component,
    config::{AccountConfig, Config, ProxyConfig},
    online::generate_offline_uuid,
    protocol::{
        codec::connection::Connection,
        crypto::{self, EncryptionContext},
        packet::{
            handshake::Handshake,
            login::{EncryptionRequest, EncryptionResponse, LoginStart, LoginSuccess, SetCompression},
            play::{ChatMessage, ClientChat},
            PacketKind, PacketType, RawPacket,
        },
        Direction, Negotiated, ProtocolVersion, State,
    },
    world::Limbo,
};
use tokio::{
    net::TcpListener,
    sync::mpsc,
    time::timeout,
};
use uuid::Uuid;

const MARKER_KICK: &str = "If you wish to use IP forwarding, please enable it in your BungeeCord config as well!";

async fn limbo_backend() -> SocketAddr {
    spawn(config(), Arc::new(NoSessions), Arc::new(Limbo::new(20))).await.0
}

async fn proxy(servers: &[(&str, SocketAddr)], default: &str) -> SocketAddr {
    let proxy = ProxyConfig {
        servers: servers.iter().map(|(name, addr)| (name.to_string(), *addr)).collect::<BTreeMap<_, _>>(),
        default: default.to_owned(),
        ..ProxyConfig::default()
    };
    spawn_recorded(Config { proxy: Some(proxy), ..config() }).await.0
}

#[derive(Clone, Copy)]
enum Script {
    /// Refuses logins whose handshake has no forwarded identity.
    RequireForwarding,
    /// Joins the player, then kicks them.
    JoinThenKick,
    /// Demands online-mode encryption with a key the proxy cannot use.
    Encrypt,
    /// Runs a real online-mode handshake and compresses, then greets the player.
    Online,
    /// Joins the player, then sends a join packet cut short.
    JoinThenGarbage,
}

/// A backend that follows `script` and reports every handshake host it sees,
/// plus the server hash when it encrypts.
async fn fake_backend(script: Script) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (hosts, seen) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let hosts = hosts.clone();
            tokio::spawn(async move {
                let mut connection = Connection::accept(stream, registry()).unwrap();
                let handshake: Handshake = connection.read_packet().await.unwrap();
                connection.protocol = Negotiated::from_id(handshake.protocol);
                connection.change_state(State::Login);
                let LoginStart { username } = connection.read_packet().await.unwrap();
                let _ = hosts.send(handshake.server_address.clone());

                match script {
                    Script::RequireForwarding if !handshake.server_address.contains('\0') => {
                        connection.disconnect(&Component::text(MARKER_KICK)).await.unwrap();
                        return;
                    }
                    Script::Online => {
                        let encryption = EncryptionContext::generate().unwrap();
                        let session = encryption.challenge();
                        let server_id = session.server_id.clone();
                        connection
                            .write_packet(EncryptionRequest {
                                server_id: server_id.clone(),
                                public_key: Bytes::copy_from_slice(encryption.public_key_der()),
                                verify_token: Bytes::copy_from_slice(&session.verify_token),
                            })
                            .await
                            .unwrap();

                        let response: EncryptionResponse = connection.read_packet().await.unwrap();
                        let secret = encryption
                            .complete_handshake(session, &response.verify_token, &response.shared_secret)
                            .unwrap();
                        connection.enable_encryption(&secret);
                        let _ = hosts.send(crypto::server_hash(&server_id, &secret, encryption.public_key_der()));

                        connection.write_packet(SetCompression { threshold: 32 }).await.unwrap();
                        connection.enable_compression(32);
                    }
                    Script::Encrypt => {
                        connection
                            .write_packet(EncryptionRequest {
                                server_id: String::new(),
                                public_key: Bytes::from_static(b"not a key"),
                                verify_token: Bytes::from_static(&[1, 2, 3, 4]),
                            })
                            .await
                            .unwrap();
                        let _ = connection.next_packet().await;
                        return;
                    }
                    _ => {}
                }

                let uuid = generate_offline_uuid(&username);
                connection.write_packet(LoginSuccess { uuid, username }).await.unwrap();
                connection.change_state(State::Play);
                connection.write_packet(join_game(0)).await.unwrap();

                match script {
                    Script::JoinThenKick => {
                        connection.disconnect(&Component::text("bye")).await.unwrap();
                        return;
                    }
                    Script::Online => {
                        let greeting = ChatMessage::system(&Component::text(&"x".repeat(100)));
                        connection.write_packet(greeting).await.unwrap();
                    }
                    Script::JoinThenGarbage => {
                        let version = connection.protocol;
                        let id = registry().id_for(State::Play, Direction::Clientbound, version, PacketKind::JoinGame).unwrap();
                        let cut = RawPacket { id, data: Bytes::from_static(&[1]) };
                        connection.write_packet(PacketType::Raw(cut)).await.unwrap();
                    }
                    _ => {}
                }
                while connection.next_packet().await.is_ok() {}
            });
        }
    });

    (addr, seen)
}

fn respawn_dimension(packet: PacketType) -> Option<i32> {
    match packet {
        PacketType::Respawn(respawn) => Some(respawn.dimension),
        _ => None,
    }
}

#[tokio::test]
async fn switching_backends_moves_through_another_dimension() {
    let lobby = limbo_backend().await;
    let games = limbo_backend().await;
    let proxy = proxy(&[("lobby", lobby), ("games", games)], "lobby").await;

    let (mut client, success) = login(proxy, ProtocolVersion::V1_12_2, "Alice").await.joined();
    assert_eq!(success.uuid, generate_offline_uuid("Alice"));

    let join = next_matching(&mut client, |packet| match packet {
        PacketType::JoinGame(join) => Some(join),
        _ => None,
    })
    .await;
    assert_eq!(join.dimension, 0);
    let welcome = next_matching(&mut client, chat_text).await;
    assert_eq!(welcome, "Welcome, Alice");

    client.write_packet(ClientChat { message: "/server games".to_owned() }).await.unwrap();

    assert_eq!(next_matching(&mut client, respawn_dimension).await, -1);
    assert_eq!(next_matching(&mut client, respawn_dimension).await, 0);
}

#[tokio::test]
async fn chat_is_relayed_and_server_command_lists_backends() {
    let lobby = limbo_backend().await;
    let games = limbo_backend().await;
    let proxy = proxy(&[("lobby", lobby), ("games", games)], "lobby").await;

    let (mut client, _) = login(proxy, ProtocolVersion::V1_15_2, "Bob").await.joined();
    assert_eq!(next_matching(&mut client, chat_text).await, "Welcome, Bob");

    client.write_packet(ClientChat { message: "hello".to_owned() }).await.unwrap();
    assert_eq!(next_matching(&mut client, chat_text).await, "<Bob> hello");

    client.write_packet(ClientChat { message: "/server".to_owned() }).await.unwrap();
    assert_eq!(next_matching(&mut client, chat_text).await, "You are on lobby. Servers: games, lobby");

    // anything else starting with a slash belongs to the backend
    client.write_packet(ClientChat { message: "/help".to_owned() }).await.unwrap();
    assert_eq!(next_matching(&mut client, chat_text).await, "Commands: /help, /whoami");
}

#[tokio::test]
async fn forwarding_kick_triggers_a_forwarded_reconnect() {
    let (backend, mut hosts) = fake_backend(Script::RequireForwarding).await;
    let proxy = proxy(&[("lobby", backend)], "lobby").await;

    let (mut client, _) = login(proxy, ProtocolVersion::V1_12_2, "Carol").await.joined();
    let join = next_matching(&mut client, |packet| match packet {
        PacketType::JoinGame(join) => Some(join),
        _ => None,
    })
    .await;
    assert_eq!(join.dimension, 0);

    let first = timeout(WAIT, hosts.recv()).await.unwrap().unwrap();
    assert_eq!(first, "127.0.0.1");

    let second = timeout(WAIT, hosts.recv()).await.unwrap().unwrap();
    let fields: Vec<&str> = second.split('\0').collect();
    assert_eq!(fields.len(), 4);
    assert_eq!(fields[0], "127.0.0.1");
    assert_eq!(fields[1], "127.0.0.1");
    assert_eq!(fields[2], generate_offline_uuid("Carol").simple().to_string());
    assert_eq!(fields[3], "[]");
}

#[tokio::test]
async fn kicked_players_fall_back_to_the_default_backend() {
    let lobby = limbo_backend().await;
    let (games, _hosts) = fake_backend(Script::JoinThenKick).await;
    let proxy = proxy(&[("lobby", lobby), ("games", games)], "lobby").await;

    let (mut client, _) = login(proxy, ProtocolVersion::V1_14_4, "Dave").await.joined();
    assert_eq!(next_matching(&mut client, chat_text).await, "Welcome, Dave");

    client.write_packet(ClientChat { message: "/server games".to_owned() }).await.unwrap();
    assert_eq!(next_matching(&mut client, respawn_dimension).await, -1);
    assert_eq!(next_matching(&mut client, respawn_dimension).await, 0);

    let notice = next_matching(&mut client, |packet| chat_text(packet).filter(|text| text.starts_with("Moved")))
        .await;
    assert_eq!(notice, "Moved to lobby: bye");

    // back in the lobby, which greets again
    assert_eq!(next_matching(&mut client, chat_text).await, "Welcome, Dave");
}

#[tokio::test]
async fn malformed_backend_packets_fall_back_to_the_default_backend() {
    let lobby = limbo_backend().await;
    let (games, _hosts) = fake_backend(Script::JoinThenGarbage).await;
    let proxy = proxy(&[("lobby", lobby), ("games", games)], "lobby").await;

    let (mut client, _) = login(proxy, ProtocolVersion::V1_12_2, "Hana").await.joined();
    assert_eq!(next_matching(&mut client, chat_text).await, "Welcome, Hana");

    client.write_packet(ClientChat { message: "/server games".to_owned() }).await.unwrap();
    assert_eq!(next_matching(&mut client, respawn_dimension).await, -1);
    assert_eq!(next_matching(&mut client, respawn_dimension).await, 0);

    let notice = next_matching(&mut client, |packet| chat_text(packet).filter(|text| text.starts_with("Moved")))
        .await;
    assert!(notice.starts_with("Moved to lobby: backend protocol mismatch"), "{}", notice);
    assert_eq!(next_matching(&mut client, chat_text).await, "Welcome, Hana");
}

#[tokio::test]
async fn malformed_packets_from_the_default_backend_disconnect_with_a_reason() {
    let (lobby, _hosts) = fake_backend(Script::JoinThenGarbage).await;
    let proxy = proxy(&[("lobby", lobby)], "lobby").await;

    let (mut client, _) = login(proxy, ProtocolVersion::V1_15_2, "Ivan").await.joined();
    let reason = next_matching(&mut client, |packet| match packet {
        PacketType::Disconnect(kick) => Some(kick.component().plain_text()),
        _ => None,
    })
    .await;
    assert!(reason.starts_with("backend protocol mismatch"), "{}", reason);
}

#[tokio::test]
async fn online_backend_is_joined_with_the_configured_account() {
    let (lobby, mut seen) = fake_backend(Script::Online).await;
    let proxy_config = ProxyConfig {
        servers: BTreeMap::from([("lobby".to_owned(), lobby)]),
        default: "lobby".to_owned(),
        account: Some(AccountConfig { access_token: "token".to_owned(), profile_id: Uuid::from_u128(7) }),
        ..ProxyConfig::default()
    };
    let auth = Arc::new(Trusting::default());
    let (proxy, _context) = spawn(Config { proxy: Some(proxy_config), ..config() }, auth.clone(), Arc::new(Limbo::new(20))).await;

    let (mut client, _) = login(proxy, ProtocolVersion::V1_12_2, "Judy").await.joined();
    let join = next_matching(&mut client, |packet| match packet {
        PacketType::JoinGame(join) => Some(join),
        _ => None,
    })
    .await;
    assert_eq!(join.dimension, 0);
    // larger than the backend's threshold, so it crossed the link compressed and encrypted
    assert_eq!(next_matching(&mut client, chat_text).await, "x".repeat(100));

    let host = timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(host, "127.0.0.1");
    let hash = timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(auth.joins.lock().as_slice(), &[(Uuid::from_u128(7), hash)]);
}

#[tokio::test]
async fn kick_from_the_default_backend_reaches_the_client() {
    let (lobby, _hosts) = fake_backend(Script::JoinThenKick).await;
    let proxy = proxy(&[("lobby", lobby)], "lobby").await;

    let (mut client, _) = login(proxy, ProtocolVersion::V1_12_2, "Erin").await.joined();
    let reason = next_matching(&mut client, |packet| match packet {
        PacketType::Disconnect(kick) => Some(kick.component().plain_text()),
        _ => None,
    })
    .await;
    assert_eq!(reason, "bye");
}

#[tokio::test]
async fn online_backend_without_account_is_refused() {
    let (lobby, _hosts) = fake_backend(Script::Encrypt).await;
    let proxy = proxy(&[("lobby", lobby)], "lobby").await;

    let (mut client, _) = login(proxy, ProtocolVersion::V1_12_2, "Frank").await.joined();
    let reason = next_matching(&mut client, |packet| match packet {
        PacketType::Disconnect(kick) => Some(kick.component().plain_text()),
        _ => None,
    })
    .await;
    assert!(reason.contains("no account is configured"), "{}", reason);
}

#[tokio::test]
async fn unreachable_backend_disconnects_the_client() {
    // bound then dropped, so nothing listens there
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let proxy = proxy(&[("lobby", dead)], "lobby").await;

    let (mut client, _) = login(proxy, ProtocolVersion::V1_8, "Gina").await.joined();
    let reason = next_matching(&mut client, |packet| match packet {
        PacketType::Disconnect(kick) => Some(kick.component().plain_text()),
        _ => None,
    })
    .await;
    assert!(reason.starts_with("Could not connect to a server"), "{}", reason);
}

//! Proxy mode: the client's play connection is bridged to a backend server.
//! The relay logs into backends on the player's behalf and hides backend
//! switches from the client behind respawn packets.

use std::net::{IpAddr, SocketAddr};

use anyhow::Result;
use bytes::Bytes;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    component::{Color, Component},
    config::ProxyConfig,
    error::{is_closed, AuthError, RelayError},
    handler::login::Session,
    online::{Credential, Property},
    protocol::{
        codec::connection::Connection,
        crypto,
        packet::{
            handshake::Handshake,
            login::{EncryptionRequest, EncryptionResponse, LoginPluginResponse, LoginStart},
            play::{ChatMessage, ClientChat, JoinGame, Respawn},
            PacketType,
        },
        State,
    },
    server::{Context, Player},
};

/// Hostname field carrying the client's identity, in the legacy BungeeCord layout.
pub fn forwarding_host(host: &str, client: IpAddr, uuid: Uuid, properties: &[Property]) -> Result<String> {
    let properties = serde_json::to_string(properties)?;
    Ok(format!("{}\0{}\0{}\0{}", host, client, uuid.simple(), properties))
}

/// What to send the client for a backend's join packet. A client that is
/// already playing gets respawns instead; when the dimension does not change it
/// is moved through another dimension first, since clients ignore a respawn
/// into the dimension they are in.
pub fn translate_join(current_dimension: Option<i32>, join: JoinGame) -> Vec<PacketType> {
    let Some(current) = current_dimension else {
        return vec![join.into()];
    };

    let respawn = Respawn::from_join(&join);
    if current != join.dimension {
        return vec![respawn.into()];
    }

    let detour = Respawn { dimension: if join.dimension >= 0 { -1 } else { 0 }, ..respawn.clone() };
    vec![detour.into(), respawn.into()]
}

struct Backend {
    name: String,
    connection: Connection,
    forwarded: bool,
}

enum Flow {
    Continue,
    Stop,
}

struct Relay<'a> {
    context: &'a Context,
    proxy: &'a ProxyConfig,
    player: Player,
    /// Dimension the client is in, once any backend put it into play.
    dimension: Option<i32>,
}

pub async fn run(client: &mut Connection, context: &Context, session: Session) -> Result<()> {
    let Some(proxy) = context.config.proxy.as_ref() else {
        return Err(RelayError::UnknownBackend(String::from("<none>")).into());
    };
    let Session { player, registration: _registration, mut outbound } = session;

    let mut relay = Relay { context, proxy, player, dimension: None };

    let mut backend = match relay.connect(&proxy.default).await {
        Ok(backend) => backend,
        Err(err) => {
            warn!("{} could not join {}: {:#}", relay.player.name, proxy.default, err);
            return client.disconnect(&failure_reason(&err)).await;
        }
    };

    let result = relay.bridge(client, &mut backend, &mut outbound).await;
    backend.connection.close().await?;
    info!("{} left {}", relay.player.name, backend.name);
    result
}

fn failure_reason(err: &anyhow::Error) -> Component {
    match err.downcast_ref::<RelayError>() {
        Some(RelayError::Kicked(reason)) => Component::text(reason),
        _ => Component::text(&format!("Could not connect to a server: {}", err)),
    }
}

impl Relay<'_> {
    /// Logs into a backend, retrying once with forwarding when the backend
    /// asks for it.
    async fn connect(&self, name: &str) -> Result<Backend> {
        match self.login(name, self.proxy.forwarding).await {
            Err(err) if !self.proxy.forwarding && self.wants_forwarding(&err) => {
                info!("{} asks for forwarding, reconnecting {}", name, self.player.name);
                self.login(name, true).await
            }
            result => result,
        }
    }

    fn wants_forwarding(&self, err: &anyhow::Error) -> bool {
        match err.downcast_ref::<RelayError>() {
            Some(RelayError::Kicked(reason)) => reason.contains(&self.proxy.reconnect_marker),
            _ => false,
        }
    }

    async fn login(&self, name: &str, forwarded: bool) -> Result<Backend> {
        let address = *self
            .proxy
            .servers
            .get(name)
            .ok_or_else(|| RelayError::UnknownBackend(name.to_owned()))?;

        let mut connection = Connection::connect(address, self.player.version, self.context.registry.clone())
            .await
            .map_err(|source| RelayError::Unreachable { name: name.to_owned(), source })?;

        connection
            .queue_packet(Handshake {
                protocol: self.player.version.id(),
                server_address: self.host(address, forwarded)?,
                port: address.port(),
                next_state: State::Login.intent(),
            })
            .await?;
        connection.change_state(State::Login);
        connection.write_packet(LoginStart { username: self.player.name.clone() }).await?;

        loop {
            match connection.next_packet().await? {
                PacketType::EncryptionRequest(request) => self.encrypt(&mut connection, request).await?,
                PacketType::SetCompression(packet) => connection.enable_compression(packet.threshold),
                PacketType::LoginPluginRequest(request) => {
                    debug!("{} sent login plugin request on {}", name, request.channel);
                    connection
                        .write_packet(LoginPluginResponse { message_id: request.message_id, data: None })
                        .await?;
                }
                PacketType::LoginSuccess(success) => {
                    debug!("{} accepted {} as {}", name, success.username, success.uuid);
                    connection.change_state(State::Play);
                    return Ok(Backend { name: name.to_owned(), connection, forwarded });
                }
                PacketType::Disconnect(kick) => {
                    return Err(RelayError::Kicked(kick.component().plain_text()).into());
                }
                other => {
                    return Err(RelayError::Protocol(format!("{} sent {} during login", name, other.name())).into());
                }
            }
        }
    }

    fn host(&self, address: SocketAddr, forwarded: bool) -> Result<String> {
        let host = address.ip().to_string();
        if !forwarded {
            return Ok(host);
        }
        forwarding_host(&host, self.player.address.ip(), self.player.uuid, &self.player.properties)
    }

    /// Client side of an online-mode backend login, using the proxy's own account.
    async fn encrypt(&self, connection: &mut Connection, request: EncryptionRequest) -> Result<()> {
        let credential = self
            .proxy
            .account
            .as_ref()
            .map(Credential::from)
            .ok_or(RelayError::EncryptionUnsupported)?;

        let response = crypto::encrypt_for(&request.public_key, &request.verify_token).map_err(RelayError::Auth)?;
        let hash = crypto::server_hash(&request.server_id, &response.secret, &request.public_key);

        let joined = self
            .context
            .auth
            .join(&credential, &hash)
            .await
            .map_err(RelayError::Auth)?;
        if !joined {
            return Err(RelayError::Auth(AuthError::Rejected(credential.profile_id.to_string())).into());
        }

        connection
            .write_packet(EncryptionResponse {
                shared_secret: Bytes::from(response.encrypted_secret),
                verify_token: Bytes::from(response.encrypted_verify_token),
            })
            .await?;
        connection.enable_encryption(&response.secret);
        Ok(())
    }

    async fn bridge(
        &mut self,
        client: &mut Connection,
        backend: &mut Backend,
        outbound: &mut mpsc::UnboundedReceiver<PacketType>,
    ) -> Result<()> {
        info!("{} joined {}", self.player.name, backend.name);

        loop {
            let flow = tokio::select! {
                packet = client.next_packet() => match packet {
                    Ok(packet) => self.from_client(client, backend, packet).await?,
                    Err(err) => return Err(err),
                },
                packet = backend.connection.next_packet() => match packet {
                    Ok(packet) => self.from_backend(client, backend, packet).await?,
                    Err(err) if is_closed(&err) => {
                        let reason = Component::text("Lost connection to the server");
                        self.backend_gone(client, backend, reason).await?
                    }
                    Err(err) => {
                        warn!("{} sent bad data to {}: {:#}", backend.name, self.player.name, err);
                        let err = RelayError::Protocol(format!("{:#}", err));
                        self.backend_gone(client, backend, Component::text(&err.to_string())).await?
                    }
                },
                message = outbound.recv() => match message {
                    Some(packet) => {
                        client.write_packet(packet).await?;
                        Flow::Continue
                    }
                    None => Flow::Stop,
                },
            };

            if let Flow::Stop = flow {
                return Ok(());
            }
        }
    }

    async fn from_client(&mut self, client: &mut Connection, backend: &mut Backend, packet: PacketType) -> Result<Flow> {
        if let PacketType::ClientChat(ClientChat { message }) = &packet {
            if message == "/server" || message.starts_with("/server ") {
                let target = message["/server".len()..].trim().to_owned();
                self.server_command(client, backend, &target).await?;
                return Ok(Flow::Continue);
            }
        }

        if client.state() != backend.connection.state() {
            debug!("dropping {} from {}, states diverged", packet.name(), self.player.name);
            return Ok(Flow::Continue);
        }
        backend.connection.write_packet(packet).await?;
        Ok(Flow::Continue)
    }

    async fn from_backend(&mut self, client: &mut Connection, backend: &mut Backend, packet: PacketType) -> Result<Flow> {
        match packet {
            PacketType::JoinGame(join) => {
                let packets = translate_join(self.dimension, join.clone());
                self.dimension = Some(join.dimension);
                for packet in packets {
                    client.queue_packet(packet).await?;
                }
                client.flush().await?;
                Ok(Flow::Continue)
            }
            PacketType::Disconnect(kick) => {
                let reason = kick.component();
                if !backend.forwarded && reason.plain_text().contains(&self.proxy.reconnect_marker) {
                    info!("{} asks for forwarding, reconnecting {}", backend.name, self.player.name);
                    let name = backend.name.clone();
                    return match self.login(&name, true).await {
                        Ok(next) => {
                            self.replace(backend, next).await?;
                            Ok(Flow::Continue)
                        }
                        Err(err) => self.backend_gone(client, backend, failure_reason(&err)).await,
                    };
                }
                self.backend_gone(client, backend, reason).await
            }
            packet => {
                if let PacketType::Respawn(respawn) = &packet {
                    self.dimension = Some(respawn.dimension);
                }

                if client.state() != backend.connection.state() {
                    debug!("dropping {} for {}, states diverged", packet.name(), self.player.name);
                    return Ok(Flow::Continue);
                }
                client.write_packet(packet).await?;
                Ok(Flow::Continue)
            }
        }
    }

    /// The backend kicked the player or went away. Falls back to the default
    /// backend when the player is somewhere else, otherwise passes the kick on.
    async fn backend_gone(&mut self, client: &mut Connection, backend: &mut Backend, reason: Component) -> Result<Flow> {
        info!("{} lost {}: {}", self.player.name, backend.name, reason.plain_text());

        let default = self.proxy.default.clone();
        if backend.name != default {
            match self.connect(&default).await {
                Ok(next) => {
                    self.replace(backend, next).await?;

                    let mut notice = Component::colored(&format!("Moved to {}: ", default), Color::Red);
                    notice.push(reason);
                    client.write_packet(ChatMessage::system(&notice)).await?;
                    return Ok(Flow::Continue);
                }
                Err(err) => warn!("fallback to {} failed: {:#}", default, err),
            }
        }

        client.disconnect(&reason).await?;
        Ok(Flow::Stop)
    }

    async fn server_command(&mut self, client: &mut Connection, backend: &mut Backend, target: &str) -> Result<()> {
        if target.is_empty() {
            let names: Vec<&str> = self.proxy.servers.keys().map(String::as_str).collect();
            let mut line = Component::colored(&format!("You are on {}. Servers: ", backend.name), Color::Gold);
            line.push(Component::text(&names.join(", ")));
            return client.write_packet(ChatMessage::system(&line)).await;
        }

        if target == backend.name {
            let line = Component::colored(&format!("Already connected to {}", target), Color::Red);
            return client.write_packet(ChatMessage::system(&line)).await;
        }

        match self.connect(target).await {
            Ok(next) => self.replace(backend, next).await,
            Err(err) => {
                let line = Component::colored(&format!("Could not connect to {}: {}", target, err), Color::Red);
                client.write_packet(ChatMessage::system(&line)).await
            }
        }
    }

    /// Swaps the upstream connection. The client keeps its socket; the new
    /// backend's join packet is translated once it arrives.
    async fn replace(&mut self, backend: &mut Backend, next: Backend) -> Result<()> {
        info!("{} switched from {} to {}", self.player.name, backend.name, next.name);
        let mut previous = std::mem::replace(backend, next);
        previous.connection.close().await
    }
}

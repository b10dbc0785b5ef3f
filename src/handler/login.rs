use std::fmt::Display;

use anyhow::Result;
use bytes::Bytes;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::{
    component::Component,
    config::AuthMode,
    error::{AuthError, LoginError, ProtocolError},
    online::{generate_offline_uuid, GameProfile},
    protocol::{
        codec::connection::Connection,
        crypto::{self, EncryptionContext},
        packet::{
            login::{EncryptionRequest, EncryptionResponse, LoginStart, LoginSuccess, SetCompression},
            PacketType,
        },
        State,
    },
    server::{Context, Player, Registration},
};

pub const MAX_NAME_LENGTH: usize = 16;

/// A player that made it into play.
pub struct Session {
    pub player: Player,
    pub registration: Registration,
    pub outbound: mpsc::UnboundedReceiver<PacketType>,
}

pub fn validate_name(name: &str) -> Result<(), LoginError> {
    let length = name.chars().count();
    if length == 0 || length > MAX_NAME_LENGTH || name.contains('.') {
        return Err(LoginError::InvalidName);
    }
    Ok(())
}

/// Runs the login state. `None` means the client was turned away with a
/// disconnect and the connection is closed.
pub async fn login(client: &mut Connection, context: &Context) -> Result<Option<Session>> {
    let username = match client.read_packet::<LoginStart>().await {
        Ok(LoginStart { username }) => username,
        // typed errors are framing or state problems; the rest is an unreadable name
        Err(err) if err.downcast_ref::<ProtocolError>().is_none() => {
            debug!("{} sent an unreadable login name: {:#}", client.peer(), err);
            return reject(client, LoginError::InvalidName).await;
        }
        Err(err) => return Err(err),
    };

    let Some(version) = client.version() else {
        return reject(client, LoginError::UnsupportedVersion(client.protocol.id())).await;
    };
    if let Err(err) = validate_name(&username) {
        return reject(client, err).await;
    }

    let (sink, outbound) = mpsc::unbounded_channel();
    let offline_id = generate_offline_uuid(&username);
    let registration = match context.players.register(&username, offline_id, sink, context.is_proxy()) {
        Ok(registration) => registration,
        Err(err) => return reject(client, err).await,
    };

    let profile = match context.config.auth {
        AuthMode::Offline => None,
        mode => {
            let hash = match encrypt(client, &context.encryption).await {
                Ok(hash) => hash,
                Err(err) => match err.downcast::<AuthError>() {
                    Ok(err) => return reject(client, err).await,
                    Err(err) => return Err(err),
                },
            };

            match context.auth.has_joined(&username, &hash).await {
                Ok(Some(profile)) => Some(profile),
                Ok(None) if mode == AuthMode::Auto => None,
                Err(err) if mode == AuthMode::Auto => {
                    warn!("{} joins offline, session server failed: {}", username, err);
                    None
                }
                Ok(None) => return reject(client, AuthError::Rejected(username)).await,
                Err(err) => return reject(client, err).await,
            }
        }
    };

    let (uuid, name, properties) = match profile {
        Some(GameProfile { id, name, properties }) => (id, name, properties),
        None => (offline_id, username, Vec::new()),
    };
    registration.set_uuid(uuid);

    let threshold = context.config.compression_threshold;
    if threshold >= 0 {
        client.queue_packet(SetCompression { threshold }).await?;
        client.enable_compression(threshold);
    }
    client.write_packet(LoginSuccess { uuid, username: name.clone() }).await?;
    client.change_state(State::Play);

    info!("{} logged in as {} ({})", client.peer(), name, uuid);
    let player = Player { name, uuid, properties, version, address: client.peer() };
    Ok(Some(Session { player, registration, outbound }))
}

/// Encryption request and response. Returns the hash the session server knows
/// the client by, with the cipher already installed.
async fn encrypt(client: &mut Connection, encryption: &EncryptionContext) -> Result<String> {
    let session = encryption.challenge();
    let server_id = session.server_id.clone();

    client
        .write_packet(EncryptionRequest {
            server_id: server_id.clone(),
            public_key: Bytes::copy_from_slice(encryption.public_key_der()),
            verify_token: Bytes::copy_from_slice(&session.verify_token),
        })
        .await?;

    let response: EncryptionResponse = client.read_packet().await?;
    let secret = encryption.complete_handshake(session, &response.verify_token, &response.shared_secret)?;
    client.enable_encryption(&secret);

    Ok(crypto::server_hash(&server_id, &secret, encryption.public_key_der()))
}

async fn reject(client: &mut Connection, reason: impl Display) -> Result<Option<Session>> {
    info!("{} was refused: {}", client.peer(), reason);
    client.disconnect(&Component::text(&reason.to_string())).await?;
    Ok(None)
}

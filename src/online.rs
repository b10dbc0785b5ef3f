use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

pub const SESSION_SERVER: &str = "https://sessionserver.mojang.com/session/minecraft";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct GameProfile {
    #[serde(serialize_with = "uuid::serde::simple::serialize")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Account used to log into online-mode backends.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: String,
    pub profile_id: Uuid,
}

/// Session service that vouches for players. Errors mean the service could not
/// be asked; a negative answer is `Ok(None)` / `Ok(false)`.
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn has_joined(&self, name: &str, server_hash: &str) -> Result<Option<GameProfile>, AuthError>;

    async fn join(&self, credential: &Credential, server_hash: &str) -> Result<bool, AuthError>;
}

pub struct SessionService {
    client: reqwest::Client,
    base: String,
}

impl SessionService {
    pub fn new() -> Result<Self, AuthError> {
        Self::with_base(SESSION_SERVER)
    }

    pub fn with_base(base: &str) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self { client, base: base.trim_end_matches('/').to_owned() })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest<'a> {
    access_token: &'a str,
    #[serde(serialize_with = "uuid::serde::simple::serialize")]
    selected_profile: Uuid,
    server_id: &'a str,
}

#[async_trait]
impl AuthClient for SessionService {
    async fn has_joined(&self, name: &str, server_hash: &str) -> Result<Option<GameProfile>, AuthError> {
        let response = self
            .client
            .get(format!("{}/hasJoined", self.base))
            .query(&[("username", name), ("serverId", server_hash)])
            .send()
            .await?;

        match response.status().as_u16() {
            200 => Ok(Some(response.json().await?)),
            204 => Ok(None),
            status => Err(AuthError::Status(status)),
        }
    }

    async fn join(&self, credential: &Credential, server_hash: &str) -> Result<bool, AuthError> {
        let request = JoinRequest {
            access_token: &credential.access_token,
            selected_profile: credential.profile_id,
            server_id: server_hash,
        };
        let response = self
            .client
            .post(format!("{}/join", self.base))
            .json(&request)
            .send()
            .await?;

        match response.status().as_u16() {
            200..=299 => Ok(true),
            401 | 403 => Ok(false),
            status => Err(AuthError::Status(status)),
        }
    }
}

/// Identity given to players the session service has not vouched for.
pub fn generate_offline_uuid(username: &str) -> Uuid {
    let hash = Md5::new_with_prefix(b"OfflinePlayer:")
        .chain_update(username.as_bytes())
        .finalize();

    uuid::Builder::from_md5_bytes(hash.into()).into_uuid()
}

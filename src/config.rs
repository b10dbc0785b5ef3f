use std::{
    collections::BTreeMap,
    fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::online::Credential;

pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;

        return Ok(config);
    }

    let config = Config::default();
    fs::write(path, toml::to_string(&config)?)?;
    Ok(config)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Offline,
    Online,
    /// Online, but players the session service cannot vouch for join as offline players.
    Auto,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "bind")]
    pub address: SocketAddr,
    pub compression_threshold: i32,
    pub auth: AuthMode,
    pub max_players: usize,
    pub motd: String,
    /// 64x64 png shown in the server list, skipped when missing.
    pub favicon: Option<PathBuf>,
    /// Seconds between keep alives.
    pub keep_alive_interval: u64,
    pub log_level: String,
    pub proxy: Option<ProxyConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 25565),
            compression_threshold: 256,
            auth: AuthMode::Offline,
            max_players: 20,
            motd: String::from("A ferry server"),
            favicon: Some(PathBuf::from("server-icon.png")),
            keep_alive_interval: 15,
            log_level: String::from("info"),
            proxy: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.keep_alive_interval > 0, "keep_alive_interval must be positive");
        if let Some(proxy) = &self.proxy {
            ensure!(!proxy.servers.is_empty(), "proxy mode needs at least one server");
            ensure!(
                proxy.servers.contains_key(&proxy.default),
                "default server {} is not in the server list",
                proxy.default
            );
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ProxyConfig {
    /// Server players join first and fall back to.
    pub default: String,
    /// Append client address and identity to the handshake host.
    pub forwarding: bool,
    /// Kick text that makes the relay retry with forwarding enabled.
    pub reconnect_marker: String,
    pub servers: BTreeMap<String, SocketAddr>,
    pub account: Option<AccountConfig>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            default: String::from("lobby"),
            forwarding: false,
            reconnect_marker: String::from("IP forwarding"),
            servers: BTreeMap::from([(
                String::from("lobby"),
                SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 25566),
            )]),
            account: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AccountConfig {
    pub access_token: String,
    pub profile_id: Uuid,
}

impl From<&AccountConfig> for Credential {
    fn from(account: &AccountConfig) -> Self {
        Credential { access_token: account.access_token.clone(), profile_id: account.profile_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_uses_defaults() {
        let config: Config = toml::from_str("auth = \"auto\"\nmax_players = 2\n").unwrap();
        assert_eq!(config.auth, AuthMode::Auto);
        assert_eq!(config.max_players, 2);
        assert_eq!(config.compression_threshold, 256);
        assert!(config.proxy.is_none());
    }

    #[test]
    fn proxy_section() {
        let config: Config = toml::from_str(
            r#"
            [proxy]
            default = "hub"
            forwarding = true
            [proxy.servers]
            hub = "127.0.0.1:25570"
            games = "127.0.0.1:25571"
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        let proxy = config.proxy.unwrap();
        assert_eq!(proxy.servers.len(), 2);
        assert_eq!(proxy.reconnect_marker, "IP forwarding");
    }

    #[test]
    fn default_must_be_listed() {
        let config: Config = toml::from_str("[proxy]\ndefault = \"missing\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string(&Config::default()).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.address, Config::default().address);
    }
}

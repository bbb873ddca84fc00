use std::time::Duration;

use crate::error::ConfigError;
use crate::session::Role;

pub const DEFAULT_RELAY_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:8080";
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";
const DEFAULT_PING_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub addr: String,
    pub ping_interval: Duration,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let addr = lookup("RELAY_ADDR").unwrap_or_else(|| DEFAULT_RELAY_ADDR.to_string());
        let ping_secs = match lookup("RELAY_PING_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "RELAY_PING_SECS",
                        value,
                    });
                }
            },
            None => DEFAULT_PING_SECS,
        };
        Ok(Self {
            addr,
            ping_interval: Duration::from_secs(ping_secs),
        })
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_RELAY_ADDR.to_string(),
            ping_interval: Duration::from_secs(DEFAULT_PING_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub role: Role,
    pub relay_url: String,
    pub ice_servers: Vec<String>,
}

impl PeerConfig {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            relay_url: DEFAULT_RELAY_URL.to_string(),
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let role = match lookup("PEER_ROLE") {
            Some(value) => parse_role(&value).ok_or(ConfigError::Invalid {
                key: "PEER_ROLE",
                value,
            })?,
            None => return Err(ConfigError::Missing("PEER_ROLE")),
        };
        let mut config = Self::new(role);
        if let Some(url) = lookup("RELAY_URL") {
            config.relay_url = url;
        }
        if let Some(list) = lookup("ICE_SERVERS") {
            config.ice_servers = list
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(config)
    }
}

fn parse_role(value: &str) -> Option<Role> {
    match value.trim().to_ascii_lowercase().as_str() {
        "sender" | "publisher" => Some(Role::Sender),
        "receiver" | "subscriber" => Some(Role::Receiver),
        _ => None,
    }
}

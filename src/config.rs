use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use teloxide::types::{ChatId, Recipient};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub channel: ChannelConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// The single administrator who receives relayed messages.
    pub admin_id: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    pub id: ChannelId,
    /// When true, senders must be members of the channel before their
    /// message is relayed.
    #[serde(default)]
    pub lock: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL registered with Telegram as the
    /// webhook target, e.g. "https://bot.example.com".
    pub public_url: String,
}

/// Channel identifier: either a public "@username" or a numeric chat id.
#[derive(Debug, Clone)]
pub enum ChannelId {
    Username(String),
    Chat(i64),
}

impl ChannelId {
    pub fn recipient(&self) -> Recipient {
        match self {
            ChannelId::Username(name) => Recipient::ChannelUsername(name.clone()),
            ChannelId::Chat(id) => Recipient::Id(ChatId(*id)),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::Username(name) => write!(f, "{name}"),
            ChannelId::Chat(id) => write!(f, "{id}"),
        }
    }
}

impl<'de> Deserialize<'de> for ChannelId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw.starts_with('@') {
            return Ok(ChannelId::Username(raw));
        }
        raw.parse::<i64>().map(ChannelId::Chat).map_err(|_| {
            serde::de::Error::custom(format!(
                "channel id must be numeric or start with '@', got {raw:?}"
            ))
        })
    }
}

fn default_port() -> u16 {
    10000
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// The administrator's private chat as a sendable recipient.
    pub fn admin_chat(&self) -> Recipient {
        Recipient::Id(ChatId(self.telegram.admin_id as i64))
    }
}

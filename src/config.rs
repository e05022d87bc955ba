use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default = "default_shortener_config")]
    pub shortener: ShortenerConfig,
    #[serde(default = "default_storage_config")]
    pub storage: StorageConfig,
    #[serde(default = "default_channel_config")]
    pub channel: ChannelConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Empty means the bot answers everyone.
    #[serde(default)]
    pub allowed_user_ids: Vec<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShortenerConfig {
    #[serde(default = "default_shortener_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ShortenerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    /// Canonical public-link prefix rewritten by the channel substitution step
    #[serde(default = "default_link_prefix")]
    pub link_prefix: String,
}

fn default_shortener_base_url() -> String {
    "https://bdshortner.com".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_db_path() -> PathBuf {
    PathBuf::from("linkbot.db")
}

fn default_link_prefix() -> String {
    "t.me/".to_string()
}

fn default_shortener_config() -> ShortenerConfig {
    ShortenerConfig {
        base_url: default_shortener_base_url(),
        timeout_secs: default_timeout_secs(),
    }
}

fn default_storage_config() -> StorageConfig {
    StorageConfig {
        database_path: default_db_path(),
    }
}

fn default_channel_config() -> ChannelConfig {
    ChannelConfig {
        link_prefix: default_link_prefix(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        if config.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token must not be empty");
        }
        if config.channel.link_prefix.is_empty() {
            anyhow::bail!("channel.link_prefix must not be empty");
        }
        if config.shortener.timeout_secs == 0 {
            anyhow::bail!("shortener.timeout_secs must be greater than zero");
        }

        Ok(config)
    }

    pub fn is_user_allowed(&self, user_id: u64) -> bool {
        self.telegram.allowed_user_ids.is_empty()
            || self.telegram.allowed_user_ids.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(
            r#"
            [telegram]
            bot_token = "123:abc"
            "#,
        )
        .unwrap();

        assert!(config.telegram.allowed_user_ids.is_empty());
        assert_eq!(config.shortener.base_url, "https://bdshortner.com");
        assert_eq!(config.shortener.timeout(), Duration::from_secs(15));
        assert_eq!(config.storage.database_path, PathBuf::from("linkbot.db"));
        assert_eq!(config.channel.link_prefix, "t.me/");
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            [telegram]
            bot_token = "t"
            allowed_user_ids = [111, 222]

            [shortener]
            base_url = "https://short.example"
            timeout_secs = 3

            [storage]
            database_path = "/var/lib/linkbot/prefs.db"

            [channel]
            link_prefix = "telegram.me/"
            "#,
        )
        .unwrap();

        assert_eq!(config.telegram.allowed_user_ids, vec![111, 222]);
        assert_eq!(config.shortener.base_url, "https://short.example");
        assert_eq!(config.shortener.timeout_secs, 3);
        assert_eq!(config.channel.link_prefix, "telegram.me/");
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = Config::parse("[telegram]\nbot_token = \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("bot_token"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = Config::parse(
            "[telegram]\nbot_token = \"t\"\n[shortener]\ntimeout_secs = 0\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_allow_list() {
        let open = Config::parse("[telegram]\nbot_token = \"t\"\n").unwrap();
        assert!(open.is_user_allowed(42));

        let closed =
            Config::parse("[telegram]\nbot_token = \"t\"\nallowed_user_ids = [7]\n").unwrap();
        assert!(closed.is_user_allowed(7));
        assert!(!closed.is_user_allowed(42));
    }
}

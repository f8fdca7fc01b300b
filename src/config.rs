use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Listen address, `host:port`
    pub bind: String,
    /// Allowed CORS origin; any origin is mirrored when unset
    pub frontend_origin: Option<String>,
    pub storage: StorageConfig,
    pub news: NewsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:4000".to_string(),
            frontend_origin: None,
            storage: StorageConfig::default(),
            news: NewsConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageKind,
    /// Favorites document for the json backend
    pub path: PathBuf,
    /// Connection string for the sqlite backend
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageKind::Json,
            path: PathBuf::from("favorites.json"),
            database_url: "sqlite:favorites.db?mode=rwc".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NewsStrategy {
    #[default]
    Reddit,
    Rss,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NewsConfig {
    pub strategy: NewsStrategy,
    /// Maximum number of articles per request
    pub limit: u32,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub reddit: RedditConfig,
    pub rss: RssConfig,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            strategy: NewsStrategy::Reddit,
            limit: 30,
            user_agent: "veille-marketing/1.0".to_string(),
            timeout_secs: 30,
            reddit: RedditConfig::default(),
            rss: RssConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RedditConfig {
    pub subreddit: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub oauth_url: String,
    pub api_base: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            subreddit: "marketing".to_string(),
            client_id: None,
            client_secret: None,
            oauth_url: "https://www.reddit.com/api/v1/access_token".to_string(),
            api_base: "https://oauth.reddit.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RssConfig {
    pub url: String,
    pub source_name: String,
}

impl Default for RssConfig {
    fn default() -> Self {
        Self {
            url: "https://www.reddit.com/r/marketing/.rss".to_string(),
            source_name: "Reddit".to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(content) => Self::from_str(&content)
                .with_context(|| format!("invalid config file {}", path.as_ref().display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `PORT`, `FRONTEND_ORIGIN`, `REDDIT_CLIENT_ID`,
    /// `REDDIT_CLIENT_SECRET`, `FAVORITES_PATH` and `DATABASE_URL`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .with_context(|| format!("invalid PORT value {:?}", port))?;
            self.bind = match self.bind.rsplit_once(':') {
                Some((host, _)) => format!("{}:{}", host, port),
                None => format!("{}:{}", self.bind, port),
            };
        }
        if let Some(origin) = lookup("FRONTEND_ORIGIN") {
            self.frontend_origin = Some(origin);
        }
        if let Some(id) = lookup("REDDIT_CLIENT_ID") {
            self.news.reddit.client_id = Some(id);
        }
        if let Some(secret) = lookup("REDDIT_CLIENT_SECRET") {
            self.news.reddit.client_secret = Some(secret);
        }
        if let Some(path) = lookup("FAVORITES_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.storage.database_url = url;
        }
        Ok(())
    }
}

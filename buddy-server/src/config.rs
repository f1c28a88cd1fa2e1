use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::credentials::DEFAULT_SESSION_TTL;
use crate::ranker::Weights;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory of the sled database.
    pub db_path: PathBuf,
    /// JSON array of users loaded by `POST /load_json`.
    pub feed_path: PathBuf,
    pub log_level: String,
    /// Webhook told about every new friendship, after it is committed.
    pub notify_url: Option<String>,
    /// Seconds a login token stays valid.
    pub session_ttl_secs: u64,
    pub weights: Weights,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 8000,
            db_path: PathBuf::from("sled8000"),
            feed_path: PathBuf::from("data/users.json"),
            log_level: String::from("info"),
            notify_url: None,
            session_ttl_secs: DEFAULT_SESSION_TTL.as_secs(),
            weights: Weights::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.weights.validated()?;
        Ok(config)
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::from_toml(&text).with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

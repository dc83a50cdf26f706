use crate::session::StreamConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub payment: PaymentConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub url: String,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub minutes: u32,
    pub auto_extend: bool,
    pub extend_minutes: u32,
    pub handshake_timeout_secs: u64,
    pub drain_timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            minutes: 5,
            auto_extend: true,
            extend_minutes: 5,
            handshake_timeout_secs: 30,
            drain_timeout_secs: 10,
        }
    }
}

/// Static payment header, e.g. a pre-signed authorization
#[derive(Debug, Default, Deserialize)]
pub struct PaymentConfig {
    pub header: Option<String>,
    pub value: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

impl Config {
    /// Load `path` (any format the config crate detects from the extension),
    /// overridden by `STT__SECTION__KEY` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("STT").separator("__"))
            .build()
            .with_context(|| format!("Failed to load config from {path}"))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            language: self.server.language.clone(),
            auto_extend: self.session.auto_extend,
            extend_minutes: self.session.extend_minutes,
            handshake_timeout: Duration::from_secs(self.session.handshake_timeout_secs),
            drain_timeout: Duration::from_secs(self.session.drain_timeout_secs),
            ..StreamConfig::default()
        }
    }
}

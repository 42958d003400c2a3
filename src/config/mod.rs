use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::gate::RateConfig;
use crate::models::DeviceClass;
use crate::session::SessionOptions;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,
}

/// Session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_capacity")]
    pub capacity: u32,

    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub device: DeviceClass,

    #[serde(default)]
    pub cookie_file: Option<PathBuf>,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_capacity() -> u32 {
    1
}
fn default_window_ms() -> u64 {
    5000
}
fn default_timeout_secs() -> u64 {
    15
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            capacity: default_capacity(),
            window_ms: default_window_ms(),
            timeout_secs: default_timeout_secs(),
            user_agent: None,
            device: DeviceClass::default(),
            cookie_file: None,
        }
    }
}

impl SessionConfig {
    pub fn rate(&self) -> RateConfig {
        RateConfig::new(self.capacity, Duration::from_millis(self.window_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Session options for this config. Cookies are left to the caller.
    pub fn options(&self) -> SessionOptions {
        let mut options = SessionOptions::new(self.host.clone())
            .rate(self.rate())
            .device(self.device);
        if let Some(ua) = &self.user_agent {
            options = options.user_agent(ua.clone());
        }
        options
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("TSESSION").separator("__"))
            .build()?;

        let app_cfg = cfg.try_deserialize().unwrap_or_else(|e| {
            warn!("Ignoring unreadable configuration, using defaults: {}", e);
            AppConfig::default()
        });
        Ok(app_cfg)
    }
}

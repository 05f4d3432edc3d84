//! Gateway configuration, read once at startup from defaults, an optional
//! `fieldgate.toml` and then the environment (`PORT`, `MONGO_URI`, ...).

use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Config file looked up in the working directory, extension optional
pub const CONFIG_FILE: &str = "fieldgate";

/// Overrides [`CONFIG_FILE`]
pub const CONFIG_PATH_VAR: &str = "FIELDGATE_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub listen_host: String,
    pub port: u16,

    /// Base URL of the inference backend
    pub ml_service_url: String,

    /// MongoDB connection string. Unset disables the result store.
    #[serde(default)]
    pub mongo_uri: Option<String>,
    pub mongo_database: String,

    pub inference_timeout_secs: u64,
    pub store_timeout_secs: u64,
    pub max_image_bytes: usize,

    /// `tracing_subscriber::EnvFilter` directives
    pub rust_log: String,
}

impl Settings {
    /// Load from the default file location and the process environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| CONFIG_FILE.to_string());
        Self::from_sources(File::with_name(&path).required(false), Environment::default())
    }

    pub fn from_sources<F>(file: F, env: Environment) -> Result<Self>
    where
        F: config::Source + Send + Sync + 'static,
    {
        let settings: Settings = Config::builder()
            .set_default("listen_host", "0.0.0.0")?
            .set_default("port", 5000)?
            .set_default("ml_service_url", "http://localhost:5001")?
            .set_default("mongo_database", "fieldgate")?
            .set_default("inference_timeout_secs", 10)?
            .set_default("store_timeout_secs", 3)?
            .set_default("max_image_bytes", 10 * 1024 * 1024)?
            .set_default("rust_log", "info,actix_web=info")?
            .add_source(file)
            .add_source(env.try_parsing(true))
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        settings.validated()
    }

    fn validated(mut self) -> Result<Self> {
        if self.mongo_uri.as_deref().map_or(false, |uri| uri.trim().is_empty()) {
            self.mongo_uri = None;
        }

        let url = reqwest::Url::parse(&self.ml_service_url)
            .with_context(|| format!("ml_service_url {:?} is not a URL", self.ml_service_url))?;
        ensure!(
            matches!(url.scheme(), "http" | "https"),
            "ml_service_url must be http(s), got {}",
            url.scheme()
        );
        ensure!(self.inference_timeout_secs > 0, "inference_timeout_secs must be positive");
        ensure!(self.store_timeout_secs > 0, "store_timeout_secs must be positive");
        ensure!(
            self.store_timeout_secs < self.inference_timeout_secs,
            "store_timeout_secs ({}) must be shorter than inference_timeout_secs ({})",
            self.store_timeout_secs,
            self.inference_timeout_secs
        );
        ensure!(self.max_image_bytes > 0, "max_image_bytes must be positive");

        Ok(self)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.listen_host.clone(), self.port)
    }
}

//! Runtime configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `easydent.toml` (or the file given with `--config`), then `EASYDENT_*`
//! environment variables using `__` as the section separator, e.g.
//! `EASYDENT_SERVER__PORT=9000`.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::outbox::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub outbox: OutboxConfig,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8082)?
            .set_default("outbox.max_attempts", 5)?
            .set_default("outbox.base_backoff_ms", 500)?
            .set_default("outbox.poll_interval_ms", 1000)?
            .set_default("log.filter", "info")?;

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("easydent").required(false)),
        };
        builder = builder.add_source(
            Environment::with_prefix("EASYDENT")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;
        let app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        if app.outbox.max_attempts == 0 {
            anyhow::bail!("outbox.max_attempts must be at least 1");
        }
        Ok(app)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    self.server.host, self.server.port
                )
            })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.outbox.max_attempts,
            base_backoff: Duration::from_millis(self.outbox.base_backoff_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.outbox.poll_interval_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8082,
            },
            outbox: OutboxConfig {
                max_attempts: 5,
                base_backoff_ms: 500,
                poll_interval_ms: 1000,
            },
            log: LogConfig {
                filter: "info".to_string(),
            },
        }
    }
}

//! Environment-driven configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::forward::ForwarderConfig;
use crate::session::DEFAULT_COMMIT_TIMEOUT;

/// Relay configuration, built from `MAILWAY_*` environment variables.
#[derive(Debug)]
pub struct Config {
    /// Domain aliases are provisioned under (`MAILWAY_DOMAIN`, required).
    pub domain: String,
    /// SMTP listener address (`MAILWAY_SMTP_ADDR`, default `0.0.0.0:2525`).
    pub smtp_addr: SocketAddr,
    /// Management API address (`MAILWAY_HTTP_ADDR`, default `0.0.0.0:8080`).
    pub http_addr: SocketAddr,
    /// Registry database path (`MAILWAY_DB`, default `mailway.db`).
    pub db_path: PathBuf,
    /// Commit pipeline deadline (`MAILWAY_COMMIT_TIMEOUT_SECS`, default 10).
    pub commit_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let domain = std::env::var("MAILWAY_DOMAIN").map_err(|_| ConfigError::MissingRequired {
            key: "MAILWAY_DOMAIN".to_string(),
            hint: "set it to the domain aliases live under, e.g. relay.example.com".to_string(),
        })?;

        Ok(Self {
            domain,
            smtp_addr: parse_env("MAILWAY_SMTP_ADDR", "0.0.0.0:2525")?,
            http_addr: parse_env("MAILWAY_HTTP_ADDR", "0.0.0.0:8080")?,
            db_path: std::env::var("MAILWAY_DB")
                .unwrap_or_else(|_| "mailway.db".to_string())
                .into(),
            commit_timeout: std::env::var("MAILWAY_COMMIT_TIMEOUT_SECS")
                .ok()
                .map(|s| {
                    s.parse::<u64>()
                        .map(Duration::from_secs)
                        .map_err(|e| ConfigError::InvalidValue {
                            key: "MAILWAY_COMMIT_TIMEOUT_SECS".to_string(),
                            message: e.to_string(),
                        })
                })
                .transpose()?
                .unwrap_or(DEFAULT_COMMIT_TIMEOUT),
        })
    }

    /// Optional forwarding hook configuration.
    ///
    /// Enabled when `MAILWAY_FORWARD_HOST` is set; recipients come from the
    /// comma-separated `MAILWAY_FORWARD_TO`.
    pub fn forwarder_from_env() -> Option<ForwarderConfig> {
        let host = std::env::var("MAILWAY_FORWARD_HOST").ok()?;

        let port = std::env::var("MAILWAY_FORWARD_PORT")
            .ok()
            .and_then(|s| s.parse().ok());
        let credentials = match (
            std::env::var("MAILWAY_FORWARD_USER"),
            std::env::var("MAILWAY_FORWARD_PASSWORD"),
        ) {
            (Ok(user), Ok(password)) => Some((user, password)),
            _ => None,
        };
        let recipients: Vec<String> = std::env::var("MAILWAY_FORWARD_TO")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Some(ForwarderConfig {
            host,
            port,
            credentials,
            recipients,
        })
    }
}

fn parse_env(key: &str, default: &str) -> Result<SocketAddr, ConfigError> {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: "expected a socket address like 0.0.0.0:2525".to_string(),
        })
}

//! Process configuration from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::LifecycleSettings;
use crate::pipeline::PipelineSettings;

pub const BIND_ADDR: &str = "RDPSTORE_BIND_ADDR";
pub const JWT_SECRET: &str = "RDPSTORE_JWT_SECRET";
pub const CURRENCY: &str = "RDPSTORE_CURRENCY";
pub const RESTART_SETTLE_MS: &str = "RDPSTORE_RESTART_SETTLE_MS";
pub const RECONCILE_GRACE_SECS: &str = "RDPSTORE_RECONCILE_GRACE_SECS";
pub const INVOICE_SENDER: &str = "RDPSTORE_INVOICE_SENDER";
pub const PROVISION_DELAY_MS: &str = "RDPSTORE_PROVISION_DELAY_MS";

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub currency: String,
    pub restart_settle: Duration,
    pub reconcile_grace: Duration,
    pub invoice_sender: String,
    /// How long the sandbox provisioner takes to bring a machine up.
    pub provision_delay: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = parse_or(&lookup, BIND_ADDR, SocketAddr::from(([0, 0, 0, 0], 8080)))?;

        let jwt_secret = match lookup(JWT_SECRET).filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                tracing::warn!("{JWT_SECRET} not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let currency = lookup(CURRENCY).unwrap_or_else(|| "USD".to_string());
        if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ConfigError::Invalid {
                key: CURRENCY,
                value: currency,
            });
        }

        let restart_settle = Duration::from_millis(parse_or(&lookup, RESTART_SETTLE_MS, 3000u64)?);
        let reconcile_grace = Duration::from_secs(parse_or(&lookup, RECONCILE_GRACE_SECS, 300u64)?);
        let invoice_sender = lookup(INVOICE_SENDER).unwrap_or_else(|| "billing@rdpstore.local".to_string());
        let provision_delay = Duration::from_millis(parse_or(&lookup, PROVISION_DELAY_MS, 2000u64)?);

        Ok(Self {
            bind_addr,
            jwt_secret,
            currency,
            restart_settle,
            reconcile_grace,
            invoice_sender,
            provision_delay,
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            currency: self.currency.clone(),
            invoice_sender: self.invoice_sender.clone(),
        }
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            restart_settle: self.restart_settle,
        }
    }

    /// Grace period as a calendar duration, saturating on overflow.
    pub fn reconcile_grace(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.reconcile_grace).unwrap_or(chrono::Duration::MAX)
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

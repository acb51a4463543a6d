//! Configuration for pitlink-core.
//!
//! Loaded from multiple sources with the following precedence, matching the
//! teacher's `config` crate usage:
//!
//! 1. Environment variables (prefix `PITLINK_`, double-underscore nesting,
//!    e.g. `PITLINK_BROKER__HOST`) — highest priority.
//! 2. `config.toml` in the working directory.
//! 3. Defaults below — lowest priority.

use serde::Deserialize;
use std::sync::OnceLock;

use crate::errors::{CoreError, CoreResult};

static CONFIG: OnceLock<CoreConfig> = OnceLock::new();

/// Root configuration, mirroring the recognized keys in spec §6.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub broker: BrokerConfig,
    pub db: DbConfig,
    pub auth: AuthConfig,
    pub sensors: SensorsConfig,
    pub subscriptions: SubscriptionsConfig,
    pub firmware: FirmwareConfig,
    pub server: ServerConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            db: DbConfig::default(),
            auth: AuthConfig::default(),
            sensors: SensorsConfig::default(),
            subscriptions: SubscriptionsConfig::default(),
            firmware: FirmwareConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub keepalive_s: u64,
    pub qos: u8,
    pub reconnect_backoff_s: u64,
    pub tls: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            user: String::new(),
            password: String::new(),
            keepalive_s: 60,
            qos: 1,
            reconnect_backoff_s: 5,
            tls: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub url: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub echo: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/pitlink".to_string(),
            pool_size: 10,
            max_overflow: 5,
            echo: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub access_token_ttl_h: u64,
    pub owner_token_ttl_h: u64,
    pub customer_token_ttl_h: u64,
    pub max_login_attempts: u32,
    pub lockout_minutes: u32,
    pub bcrypt_cost: u32,
    /// HMAC secret the issuing auth service signs bearer tokens with; the
    /// hub upgrade only ever decodes, never mints, tokens (spec §4.9).
    pub jwt_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_ttl_h: 12,
            owner_token_ttl_h: 168,
            customer_token_ttl_h: 24,
            max_login_attempts: 5,
            lockout_minutes: 15,
            bcrypt_cost: 12,
            jwt_secret: "change-me".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    pub device_offline_s: u64,
    pub camera_offline_s: u64,
    pub retention_days: u32,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            device_offline_s: 60,
            camera_offline_s: 30,
            retention_days: 365,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriptionsConfig {
    pub trial_days: u32,
    pub grace_period_days: u32,
}

impl Default for SubscriptionsConfig {
    fn default() -> Self {
        Self {
            trial_days: 14,
            grace_period_days: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FirmwareConfig {
    pub upload_dir: String,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            upload_dir: "./firmware".to_string(),
        }
    }
}

/// Ambient HTTP surface: only the real-time hub upgrade and health probe.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
        }
    }
}

/// Load configuration from `config.toml` plus `PITLINK_`-prefixed
/// environment variables, falling back to defaults for anything unset.
pub fn load_config() -> CoreResult<CoreConfig> {
    let builder = config::Config::builder()
        .add_source(config::Config::try_from(&CoreConfig::default()).map_err(|e| {
            CoreError::InternalError(format!("failed to seed config defaults: {e}"))
        })?)
        .add_source(config::File::with_name("config").required(false))
        .add_source(
            config::Environment::with_prefix("PITLINK")
                .separator("__")
                .try_parsing(true),
        );

    builder
        .build()
        .map_err(|e| CoreError::InternalError(format!("failed to build config: {e}")))?
        .try_deserialize()
        .map_err(|e| CoreError::InternalError(format!("failed to deserialize config: {e}")))
}

/// Access the process-wide configuration singleton, initializing it from
/// `load_config()` on first call.
pub fn get_config() -> CoreResult<&'static CoreConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let cfg = load_config()?;
    Ok(CONFIG.get_or_init(|| cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.broker.qos, 1);
        assert_eq!(cfg.broker.reconnect_backoff_s, 5);
        assert_eq!(cfg.sensors.device_offline_s, 60);
        assert_eq!(cfg.sensors.camera_offline_s, 30);
        assert_eq!(cfg.subscriptions.trial_days, 14);
        assert_eq!(cfg.subscriptions.grace_period_days, 7);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `4000` |
//! | `APP_ENV` | Environment name reported by the healthcheck | `development` |
//! | `DATA_DIR` | Directory holding `campus.redb` | `./data` |
//! | `LIMITER_ENABLED` | Per-IP rate limiting on/off | `true` |
//! | `LIMITER_RPS` | Token bucket refill rate per second | `2` |
//! | `LIMITER_BURST` | Token bucket capacity | `4` |
//! | `SWEEP_INTERVAL_SECS` | Activation sweeper period | `3600` |
//! | `MAIL_SENDER` | From address for outgoing email | `Campus <no-reply@campus.local>` |
//! | `MAX_CONCURRENT_EMAILS` | Concurrent background sends | `8` |
//! | `SEED_ADMIN_EMAIL` | Admin account created at startup | unset |
//! | `SEED_ADMIN_PASSWORD` | Password for the seeded admin | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const APP_ENV_ENV: &str = "APP_ENV";

/// Environment variable name for the data directory path.
///
/// The redb file `campus.redb` is created inside it on first start.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const LIMITER_ENABLED_ENV: &str = "LIMITER_ENABLED";
pub const LIMITER_RPS_ENV: &str = "LIMITER_RPS";
pub const LIMITER_BURST_ENV: &str = "LIMITER_BURST";
pub const SWEEP_INTERVAL_ENV: &str = "SWEEP_INTERVAL_SECS";
pub const MAIL_SENDER_ENV: &str = "MAIL_SENDER";
pub const MAX_CONCURRENT_EMAILS_ENV: &str = "MAX_CONCURRENT_EMAILS";
pub const SEED_ADMIN_EMAIL_ENV: &str = "SEED_ADMIN_EMAIL";
pub const SEED_ADMIN_PASSWORD_ENV: &str = "SEED_ADMIN_PASSWORD";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Database file name inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "campus.redb";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} is set but {1} is missing")]
    Incomplete(&'static str, &'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterConfig {
    pub enabled: bool,
    pub rps: f64,
    pub burst: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub env: String,
    pub data_dir: PathBuf,
    pub limiter: LimiterConfig,
    pub sweep_interval: Duration,
    pub mail_sender: String,
    pub max_concurrent_emails: usize,
    pub seed_admin: Option<SeedAdmin>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let seed_admin = match (
            lookup(SEED_ADMIN_EMAIL_ENV),
            lookup(SEED_ADMIN_PASSWORD_ENV),
        ) {
            (Some(email), Some(password)) => Some(SeedAdmin { email, password }),
            (Some(_), None) => {
                return Err(ConfigError::Incomplete(
                    SEED_ADMIN_EMAIL_ENV,
                    SEED_ADMIN_PASSWORD_ENV,
                ))
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete(
                    SEED_ADMIN_PASSWORD_ENV,
                    SEED_ADMIN_EMAIL_ENV,
                ))
            }
            (None, None) => None,
        };

        let rps: f64 = parse(&lookup, LIMITER_RPS_ENV, 2.0)?;
        if !rps.is_finite() || rps <= 0.0 {
            return Err(ConfigError::Invalid {
                name: LIMITER_RPS_ENV,
                value: rps.to_string(),
                reason: "must be a positive number".to_string(),
            });
        }

        let burst: u32 = parse(&lookup, LIMITER_BURST_ENV, 4)?;
        if burst == 0 {
            return Err(ConfigError::Invalid {
                name: LIMITER_BURST_ENV,
                value: burst.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let sweep_secs: u64 = parse(&lookup, SWEEP_INTERVAL_ENV, 3600)?;
        if sweep_secs == 0 {
            return Err(ConfigError::Invalid {
                name: SWEEP_INTERVAL_ENV,
                value: sweep_secs.to_string(),
                reason: "must be at least 1 second".to_string(),
            });
        }

        Ok(Self {
            host: parse(&lookup, HOST_ENV, IpAddr::from([0, 0, 0, 0]))?,
            port: parse(&lookup, PORT_ENV, 4000)?,
            env: lookup(APP_ENV_ENV).unwrap_or_else(|| "development".to_string()),
            data_dir: lookup(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            limiter: LimiterConfig {
                enabled: parse(&lookup, LIMITER_ENABLED_ENV, true)?,
                rps,
                burst,
            },
            sweep_interval: Duration::from_secs(sweep_secs),
            mail_sender: lookup(MAIL_SENDER_ENV)
                .unwrap_or_else(|| "Campus <no-reply@campus.local>".to_string()),
            max_concurrent_emails: parse(&lookup, MAX_CONCURRENT_EMAILS_ENV, 8)?,
            seed_admin,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn parse<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

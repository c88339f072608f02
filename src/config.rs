// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at start-up and validated
//! before anything else runs.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ETH_ATTESTOR_KEY` | Attestor private key, hex (optional `0x`) | one of the key variables is required |
//! | `ETH_ATTESTOR_KEY_FILE` | Path to a PEM attestor key (SEC1 or PKCS#8) | |
//! | `DATA_DIR` | Directory holding the attestation database | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `3010` |
//! | `ETH_RPC_URL` | Source chain RPC endpoint; enables the relay | relay disabled |
//! | `TRANSPORTER` | Contract emitting `MessageSent(bytes)` | required with `ETH_RPC_URL` |
//! | `RELAY_START_BLOCK` | First block to scan | chain head |
//! | `RELAY_POLL_INTERVAL_SECS` | Log poll interval | `5` |
//! | `ATTESTOR_URL` | Remote attestor the relay posts to | in-process service |
//! | `ATTESTOR_CALL_TIMEOUT_SECS` | Deadline for signing, storage and forwarding calls | `10` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::Address;

pub const ATTESTOR_KEY_ENV: &str = "ETH_ATTESTOR_KEY";
pub const ATTESTOR_KEY_FILE_ENV: &str = "ETH_ATTESTOR_KEY_FILE";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const RPC_URL_ENV: &str = "ETH_RPC_URL";
pub const TRANSPORTER_ENV: &str = "TRANSPORTER";
pub const START_BLOCK_ENV: &str = "RELAY_START_BLOCK";
pub const POLL_INTERVAL_ENV: &str = "RELAY_POLL_INTERVAL_SECS";
pub const ATTESTOR_URL_ENV: &str = "ATTESTOR_URL";
pub const CALL_TIMEOUT_ENV: &str = "ATTESTOR_CALL_TIMEOUT_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3010;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// File name of the attestation database inside `DATA_DIR`.
pub const DB_FILE_NAME: &str = "attestor.redb";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing configuration: set {0}")]
    Missing(String),

    #[error("invalid {name}: {reason}")]
    Invalid { name: String, reason: String },
}

fn invalid(name: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Where the attestor key comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum KeySource {
    Hex(String),
    PemFile(PathBuf),
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hex(_) => f.write_str("Hex(<redacted>)"),
            Self::PemFile(path) => f.debug_tuple("PemFile").field(path).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub rpc_url: url::Url,
    pub transporter: Address,
    pub start_block: Option<u64>,
    pub poll_interval: Duration,
    /// Remote attestor; `None` forwards to the in-process service.
    pub attestor_url: Option<url::Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestorConfig {
    pub key: KeySource,
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub call_timeout: Duration,
    pub relay: Option<RelaySettings>,
}

impl AttestorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let key = match (optional(ATTESTOR_KEY_ENV), optional(ATTESTOR_KEY_FILE_ENV)) {
            (Some(hex), _) => KeySource::Hex(hex),
            (None, Some(path)) => KeySource::PemFile(PathBuf::from(path)),
            (None, None) => {
                return Err(ConfigError::Missing(format!(
                    "{ATTESTOR_KEY_ENV} or {ATTESTOR_KEY_FILE_ENV}"
                )))
            }
        };

        let data_dir =
            PathBuf::from(optional(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));

        let host = optional(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match optional(PORT_ENV) {
            Some(port) => port.parse::<u16>().map_err(|e| invalid(PORT_ENV, e))?,
            None => DEFAULT_PORT,
        };
        let bind_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| invalid(HOST_ENV, e))?;

        let call_timeout = Duration::from_secs(parse_secs(
            optional(CALL_TIMEOUT_ENV),
            CALL_TIMEOUT_ENV,
            DEFAULT_CALL_TIMEOUT_SECS,
        )?);

        let relay = match optional(RPC_URL_ENV) {
            None => None,
            Some(rpc_url) => {
                let rpc_url: url::Url = rpc_url.parse().map_err(|e| invalid(RPC_URL_ENV, e))?;
                let transporter = optional(TRANSPORTER_ENV)
                    .ok_or_else(|| ConfigError::Missing(TRANSPORTER_ENV.to_string()))?
                    .parse::<Address>()
                    .map_err(|e| invalid(TRANSPORTER_ENV, e))?;
                let start_block = optional(START_BLOCK_ENV)
                    .map(|v| v.parse::<u64>().map_err(|e| invalid(START_BLOCK_ENV, e)))
                    .transpose()?;
                let poll_interval = Duration::from_secs(parse_secs(
                    optional(POLL_INTERVAL_ENV),
                    POLL_INTERVAL_ENV,
                    DEFAULT_POLL_INTERVAL_SECS,
                )?);
                let attestor_url = optional(ATTESTOR_URL_ENV)
                    .map(|v| v.parse::<url::Url>().map_err(|e| invalid(ATTESTOR_URL_ENV, e)))
                    .transpose()?;

                Some(RelaySettings {
                    rpc_url,
                    transporter,
                    start_block,
                    poll_interval,
                    attestor_url,
                })
            }
        };

        Ok(Self {
            key,
            data_dir,
            bind_addr,
            call_timeout,
            relay,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }
}

fn parse_secs(value: Option<String>, name: &str, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => match v.parse::<u64>() {
            Ok(0) => Err(invalid(name, "must be greater than zero")),
            Ok(secs) => Ok(secs),
            Err(e) => Err(invalid(name, e)),
        },
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Root directory for the vault database and key vault | `/data` |
//! | `RPC_URL` | EVM JSON-RPC endpoint | Monad testnet RPC |
//! | `CHAIN_ID` | Expected chain id (verified against the endpoint) | `10143` |
//! | `CONTRACT_ADDRESS` | Mint contract | Required |
//! | `RELAYER_PRIVATE_KEY` | Relayer key as hex | One of the two key variables is required |
//! | `RELAYER_KEY_PEM` | Path to a PEM file holding the relayer key | |
//! | `MINT_QUANTITY` | Tokens minted per redemption | `1` |
//! | `MINT_VALUE_WEI` | Native value sent with each mint | `0` |
//! | `GAS_LIMIT` | Gas limit per mint | `150000` |
//! | `PRIORITY_FEE_MARGIN_WEI` | Added to the oracle's priority fee | `0` |
//! | `CLAIM_LEASE_SECS` | Claim lease length | `300` |
//! | `SWEEP_INTERVAL_SECS` | Lease sweep period | `30` |
//! | `REDEEM_DEADLINE_SECS` | Wait for confirmation before answering pending | `30` |
//! | `RPC_TIMEOUT_SECS` | Timeout of every RPC call | `10` |
//! | `SUBMIT_MAX_ATTEMPTS` | Broadcast attempts for transient failures | `3` |
//! | `CONFIRM_MAX_POLLS` | Receipt polls before giving up | `12` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;

use crate::blockchain::signing::{signer_from_hex, signer_from_pem, KeyError};
use crate::blockchain::types::{NetworkConfig, MONAD_TESTNET_CHAIN_ID, MONAD_TESTNET_RPC};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the data directory path.
///
/// Holds `vault.redb` and the `keys/` directory of binding wallets.
///
/// # Default
/// `/data`
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const RPC_URL_ENV: &str = "RPC_URL";
pub const CHAIN_ID_ENV: &str = "CHAIN_ID";
pub const CONTRACT_ADDRESS_ENV: &str = "CONTRACT_ADDRESS";
pub const RELAYER_PRIVATE_KEY_ENV: &str = "RELAYER_PRIVATE_KEY";
pub const RELAYER_KEY_PEM_ENV: &str = "RELAYER_KEY_PEM";
pub const MINT_QUANTITY_ENV: &str = "MINT_QUANTITY";
pub const MINT_VALUE_WEI_ENV: &str = "MINT_VALUE_WEI";
pub const GAS_LIMIT_ENV: &str = "GAS_LIMIT";
pub const PRIORITY_FEE_MARGIN_WEI_ENV: &str = "PRIORITY_FEE_MARGIN_WEI";
pub const CLAIM_LEASE_SECS_ENV: &str = "CLAIM_LEASE_SECS";
pub const SWEEP_INTERVAL_SECS_ENV: &str = "SWEEP_INTERVAL_SECS";
pub const REDEEM_DEADLINE_SECS_ENV: &str = "REDEEM_DEADLINE_SECS";
pub const RPC_TIMEOUT_SECS_ENV: &str = "RPC_TIMEOUT_SECS";
pub const SUBMIT_MAX_ATTEMPTS_ENV: &str = "SUBMIT_MAX_ATTEMPTS";
pub const CONFIRM_MAX_POLLS_ENV: &str = "CONFIRM_MAX_POLLS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default `RUST_LOG` filter when the variable is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },

    #[error("cannot read relayer key file: {0}")]
    KeyFile(#[from] std::io::Error),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("expected `json` or `pretty`, got `{other}`")),
        }
    }
}

/// Where the relayer key comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum RelayerKey {
    Hex(String),
    PemFile(PathBuf),
}

impl fmt::Debug for RelayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayerKey::Hex(_) => f.write_str("RelayerKey::Hex(<redacted>)"),
            RelayerKey::PemFile(path) => write!(f, "RelayerKey::PemFile({})", path.display()),
        }
    }
}

impl RelayerKey {
    pub fn signer(&self) -> Result<PrivateKeySigner, ConfigError> {
        match self {
            RelayerKey::Hex(hex) => Ok(signer_from_hex(hex)?),
            RelayerKey::PemFile(path) => {
                let pem = std::fs::read(path)?;
                Ok(signer_from_pem(&pem)?)
            }
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub network: NetworkConfig,
    pub contract: Address,
    pub relayer_key: RelayerKey,
    pub mint_quantity: U256,
    pub mint_value: U256,
    pub gas_limit: u64,
    pub priority_fee_margin: u128,
    pub claim_lease: Duration,
    pub sweep_interval: Duration,
    pub redeem_deadline: Duration,
    pub rpc_timeout: Duration,
    pub submit_max_attempts: u32,
    pub confirm_max_polls: u32,
    pub log_format: LogFormat,
}

impl RelayConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let relayer_key = match (get(RELAYER_PRIVATE_KEY_ENV), get(RELAYER_KEY_PEM_ENV)) {
            (Some(hex), _) => RelayerKey::Hex(hex.trim().to_string()),
            (None, Some(path)) => RelayerKey::PemFile(PathBuf::from(path.trim())),
            (None, None) => return Err(ConfigError::Missing(RELAYER_PRIVATE_KEY_ENV)),
        };

        let contract: Address = get(CONTRACT_ADDRESS_ENV)
            .ok_or(ConfigError::Missing(CONTRACT_ADDRESS_ENV))
            .and_then(|raw| parse_var(CONTRACT_ADDRESS_ENV, &raw))?;

        let chain_id = parse_or(&get, CHAIN_ID_ENV, MONAD_TESTNET_CHAIN_ID)?;
        let rpc_url = get(RPC_URL_ENV).unwrap_or_else(|| MONAD_TESTNET_RPC.to_string());

        let mint_quantity: u64 = parse_or(&get, MINT_QUANTITY_ENV, 1)?;
        if mint_quantity == 0 {
            return Err(ConfigError::Invalid {
                var: MINT_QUANTITY_ENV,
                message: "must be positive".to_string(),
            });
        }

        let log_format = match get(LOG_FORMAT_ENV) {
            Some(raw) => raw.parse().map_err(|message| ConfigError::Invalid {
                var: LOG_FORMAT_ENV,
                message,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, PORT_ENV, 8080)?,
            data_dir: PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| "/data".to_string())),
            network: NetworkConfig::custom(chain_id, rpc_url),
            contract,
            relayer_key,
            mint_quantity: U256::from(mint_quantity),
            mint_value: U256::from(parse_or::<u128>(&get, MINT_VALUE_WEI_ENV, 0)?),
            gas_limit: parse_or(&get, GAS_LIMIT_ENV, 150_000)?,
            priority_fee_margin: parse_or(&get, PRIORITY_FEE_MARGIN_WEI_ENV, 0)?,
            claim_lease: secs_or(&get, CLAIM_LEASE_SECS_ENV, 300)?,
            sweep_interval: secs_or(&get, SWEEP_INTERVAL_SECS_ENV, 30)?,
            redeem_deadline: secs_or(&get, REDEEM_DEADLINE_SECS_ENV, 30)?,
            rpc_timeout: secs_or(&get, RPC_TIMEOUT_SECS_ENV, 10)?,
            submit_max_attempts: parse_or(&get, SUBMIT_MAX_ATTEMPTS_ENV, 3)?,
            confirm_max_polls: parse_or(&get, CONFIRM_MAX_POLLS_ENV, 12)?,
            log_format,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        message: e.to_string(),
    })
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(var) {
        Some(raw) => parse_var(var, &raw),
        None => Ok(default),
    }
}

fn secs_or(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    parse_or(get, var, default).map(Duration::from_secs)
}

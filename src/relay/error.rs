// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use alloy::primitives::U256;

use crate::blockchain::{GasError, SubmitError};
use crate::storage::VaultError;

/// Failure of a relayed redemption.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("fee query failed: {0}")]
    FeeQuery(String),

    #[error("relayer has insufficient funds: requires {required} wei, has {available} wei")]
    InsufficientFunds { required: U256, available: U256 },

    #[error("transaction rejected by node: {0}")]
    SubmissionRejected(String),

    #[error("chain unreachable: {0}")]
    TransientNetwork(String),

    #[error("mint transaction {0} reverted")]
    Reverted(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<VaultError> for RelayError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::NotFound(_) => RelayError::NotFound("Unknown code".to_string()),
            VaultError::AlreadyClaimed => {
                RelayError::Conflict("Code is already being redeemed".to_string())
            }
            VaultError::NotAvailable(state) => {
                RelayError::Conflict(format!("Code is not available ({state})"))
            }
            VaultError::InvalidTransition { .. } | VaultError::StaleClaim => {
                RelayError::Conflict(e.to_string())
            }
            VaultError::Unavailable(_) | VaultError::Corrupt(_) | VaultError::Keys(_) => {
                RelayError::StoreUnavailable(e.to_string())
            }
            VaultError::AlreadyExists(_) => RelayError::Internal(e.to_string()),
        }
    }
}

impl From<GasError> for RelayError {
    fn from(e: GasError) -> Self {
        match e {
            GasError::FeeQueryFailed(inner) => RelayError::FeeQuery(inner.to_string()),
            GasError::InsufficientFunds {
                required,
                available,
            } => RelayError::InsufficientFunds {
                required,
                available,
            },
            GasError::Unreachable(inner) => RelayError::TransientNetwork(inner.to_string()),
            GasError::ChainMismatch { .. } | GasError::Signing(_) => {
                RelayError::Internal(e.to_string())
            }
        }
    }
}

impl From<SubmitError> for RelayError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Rejected(message) => RelayError::SubmissionRejected(message),
            SubmitError::Timeout { .. }
            | SubmitError::Network { .. }
            | SubmitError::Indeterminate(_) => {
                RelayError::TransientNetwork(e.to_string())
            }
        }
    }
}

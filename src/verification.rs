// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Read-only check that a code's mint really landed for a given address.
//!
//! Local records are not trusted on their own: a Matched answer requires a
//! successful receipt for the recorded transaction and a non-zero
//! `balanceOf(address)` on the mint contract.

use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{ChainClient, ChainError};
use crate::relay::parse_address;
use crate::storage::{normalize_code_hash, CodeState, MintJobStatus, Role, VaultError, VaultStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    Matched,
    Mismatched,
    NotYetConfirmed,
    NotFound,
}

/// Verification answer; `role` is set only for a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub status: VerifyStatus,
    pub role: Option<Role>,
}

impl Verification {
    fn of(status: VerifyStatus) -> Self {
        Self { status, role: None }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Store(#[from] VaultError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

pub struct VerificationService {
    store: Arc<VaultStore>,
    chain: Arc<dyn ChainClient>,
    contract: Address,
}

impl VerificationService {
    pub fn new(store: Arc<VaultStore>, chain: Arc<dyn ChainClient>, contract: Address) -> Self {
        Self {
            store,
            chain,
            contract,
        }
    }

    pub async fn verify(
        &self,
        code_raw: &str,
        claimed_raw: &str,
    ) -> Result<Verification, VerificationError> {
        let claimed = parse_address(claimed_raw)
            .map_err(|_| VerificationError::InvalidAddress(claimed_raw.to_string()))?;

        let Some(code_hash) = normalize_code_hash(code_raw) else {
            return Ok(Verification::of(VerifyStatus::NotFound));
        };
        let record = match self.store.get(&code_hash) {
            Ok(record) => record,
            Err(VaultError::NotFound(_)) => return Ok(Verification::of(VerifyStatus::NotFound)),
            Err(e) => return Err(e.into()),
        };

        let job = match self.store.mint_job(&code_hash)? {
            Some(job) if job.status == MintJobStatus::Confirmed => job,
            _ => return Ok(Verification::of(VerifyStatus::NotYetConfirmed)),
        };
        if record.state != CodeState::Consumed {
            return Ok(Verification::of(VerifyStatus::NotYetConfirmed));
        }

        let bound_matches = parse_address(&record.binding.address).is_ok_and(|a| a == claimed);
        let dest_matches = parse_address(&job.dest_address).is_ok_and(|a| a == claimed);
        if !bound_matches || !dest_matches {
            return Ok(Verification::of(VerifyStatus::Mismatched));
        }

        let Some(tx_hash) = job.tx_hash.as_deref().and_then(|h| h.parse::<TxHash>().ok()) else {
            return Ok(Verification::of(VerifyStatus::Mismatched));
        };

        match self.chain.receipt(tx_hash).await? {
            None => return Ok(Verification::of(VerifyStatus::NotYetConfirmed)),
            Some(receipt) if !receipt.success => {
                return Ok(Verification::of(VerifyStatus::Mismatched))
            }
            Some(_) => {}
        }

        let balance = self.chain.minted_balance(self.contract, claimed).await?;
        if balance.is_zero() {
            tracing::warn!(
                code_hash = %code_hash,
                address = %claimed,
                tx_hash = %tx_hash,
                "Confirmed mint not reflected in contract balance"
            );
            return Ok(Verification::of(VerifyStatus::Mismatched));
        }

        Ok(Verification {
            status: VerifyStatus::Matched,
            role: Some(record.role),
        })
    }
}

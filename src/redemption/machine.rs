// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Lifecycle guards for redemption codes.
//!
//! ```text
//! Available --claim--> Claimed --commit--> Consumed
//!                         |
//!                         +--release / lease expiry--> Available
//! ```
//!
//! A Claimed code whose lease has lapsed is reconciled against the chain
//! before it is reopened: if its last mint actually landed, the code is
//! committed instead of released.

use std::sync::Arc;

use alloy::primitives::TxHash;
use chrono::{DateTime, Duration, Utc};

use crate::blockchain::ChainClient;
use crate::storage::{
    ClaimLease, ClaimToken, CodeRecord, CodeState, MintJobStatus, VaultError, VaultResult,
    VaultStore,
};

/// What reconciling a lapsed claim did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The mint landed on-chain; the code is now Consumed
    Consumed,
    /// No successful mint; the code is Available again
    Released,
    /// Nothing done (lease still live, state moved on, or chain unreachable)
    Skipped,
}

pub struct RedemptionStateMachine {
    store: Arc<VaultStore>,
    chain: Arc<dyn ChainClient>,
    lease: Duration,
}

impl RedemptionStateMachine {
    pub fn new(store: Arc<VaultStore>, chain: Arc<dyn ChainClient>, lease: Duration) -> Self {
        Self {
            store,
            chain,
            lease,
        }
    }

    pub fn store(&self) -> &Arc<VaultStore> {
        &self.store
    }

    /// Claim a code for one redemption attempt.
    ///
    /// A code held by a lapsed lease is reconciled on the spot rather than
    /// waiting for the next sweep.
    pub async fn claim(&self, code_hash: &str) -> VaultResult<ClaimLease> {
        match self.store.try_claim(code_hash, self.lease) {
            Err(VaultError::AlreadyClaimed) => {
                match self.reconcile_expired(code_hash, Utc::now()).await? {
                    Reconciliation::Released => self.store.try_claim(code_hash, self.lease),
                    Reconciliation::Consumed => Err(VaultError::NotAvailable(CodeState::Consumed)),
                    Reconciliation::Skipped => Err(VaultError::AlreadyClaimed),
                }
            }
            other => other,
        }
    }

    pub fn commit(&self, code_hash: &str, token: ClaimToken) -> VaultResult<CodeRecord> {
        let record = self.store.commit_consumed(code_hash, token)?;
        tracing::info!(code_hash = %code_hash, "Code consumed");
        Ok(record)
    }

    pub fn release(&self, code_hash: &str, token: ClaimToken) -> VaultResult<CodeRecord> {
        let record = self.store.release_claim(code_hash, token)?;
        tracing::info!(code_hash = %code_hash, "Claim released");
        Ok(record)
    }

    /// Resolve a Claimed code whose lease has run out at `now`.
    pub async fn reconcile_expired(
        &self,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> VaultResult<Reconciliation> {
        let record = self.store.get(code_hash)?;
        let lease = match (&record.state, &record.lease) {
            (CodeState::Claimed, Some(lease)) if lease.is_expired(now) => lease.clone(),
            (CodeState::Claimed, None) => return self.reopen(code_hash, now, None),
            _ => return Ok(Reconciliation::Skipped),
        };

        let mut job = self.store.mint_job(code_hash)?;
        let submitted = job
            .as_ref()
            .filter(|job| job.status != MintJobStatus::Failed)
            .and_then(|job| job.tx_hash.as_deref())
            .and_then(|hash| hash.parse::<TxHash>().ok());

        let Some(tx_hash) = submitted else {
            return self.reopen(code_hash, now, job.map(|mut job| {
                job.mark_failed("lease expired before broadcast");
                job
            }));
        };

        match self.chain.receipt(tx_hash).await {
            Ok(Some(receipt)) if receipt.success => {
                match self.store.commit_consumed(code_hash, lease.token) {
                    Ok(_) => {}
                    Err(VaultError::StaleClaim | VaultError::InvalidTransition { .. }) => {
                        return Ok(Reconciliation::Skipped)
                    }
                    Err(e) => return Err(e),
                }
                if let Some(job) = job.as_mut() {
                    job.mark_confirmed(receipt.block_number);
                    self.store.record_mint_job(job)?;
                }
                tracing::info!(
                    code_hash = %code_hash,
                    tx_hash = %tx_hash,
                    "Lapsed claim reconciled: mint confirmed on-chain"
                );
                Ok(Reconciliation::Consumed)
            }
            Ok(Some(_)) => self.reopen(
                code_hash,
                now,
                job.map(|mut job| {
                    job.mark_failed("transaction reverted");
                    job
                }),
            ),
            Ok(None) => {
                tracing::warn!(
                    code_hash = %code_hash,
                    tx_hash = %tx_hash,
                    "Lapsed claim has no receipt, reopening code"
                );
                self.reopen(
                    code_hash,
                    now,
                    job.map(|mut job| {
                        job.mark_failed("no receipt at lease expiry");
                        job
                    }),
                )
            }
            Err(e) => {
                tracing::warn!(
                    code_hash = %code_hash,
                    tx_hash = %tx_hash,
                    error = %e,
                    "Receipt lookup failed, leaving claim for next sweep"
                );
                Ok(Reconciliation::Skipped)
            }
        }
    }

    fn reopen(
        &self,
        code_hash: &str,
        now: DateTime<Utc>,
        failed_job: Option<crate::storage::MintJob>,
    ) -> VaultResult<Reconciliation> {
        if !self.store.expire_claim(code_hash, now)? {
            return Ok(Reconciliation::Skipped);
        }
        if let Some(job) = failed_job {
            self.store.record_mint_job(&job)?;
        }
        tracing::info!(code_hash = %code_hash, "Lapsed claim released");
        Ok(Reconciliation::Released)
    }
}

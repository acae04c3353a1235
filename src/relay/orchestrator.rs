// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Relay Orchestrator
//!
//! Runs one redemption end to end and is the only place that decides
//! between committing and releasing a claim.
//!
//! ## Pipeline
//!
//! 1. Validate the code hash and destination address
//! 2. Claim the code (conflict if it is claimed or consumed)
//! 3. Quote fees and check relayer funds (release on failure)
//! 4. Allocate a nonce, record a pending mint job
//! 5. Sign and broadcast
//! 6. Await the receipt: commit on success, release on revert
//!
//! A broadcast that never reached a node (rejection, or retries exhausted)
//! fails the job and releases the claim; its nonce is handed back unless the
//! node reported it spent. When a retry finds the nonce spent without a
//! receipt for our hash, the claim is kept for the lease sweep.
//!
//! Step 6 runs in a spawned task. If it outlives the request deadline the
//! caller gets [`RedeemOutcome::Pending`] while the task keeps resolving
//! the job; lapsed claims are picked up by the lease sweep.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256};
use tracing::{info, warn};

use super::error::RelayError;
use crate::blockchain::{
    ChainSubmitter, Confirmation, GasRelayer, NonceSequencer, SignedMint, SubmitError,
};
use crate::redemption::RedemptionStateMachine;
use crate::storage::{normalize_code_hash, ClaimToken, MintJob, Role, VaultStore};

#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    /// Tokens minted per redemption
    pub quantity: U256,
    /// How long a request waits for confirmation before answering "pending"
    pub deadline: Duration,
}

/// Result of a redemption that was broadcast successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// Mined and the code is consumed
    Confirmed { tx_hash: TxHash, role: Role },
    /// Broadcast but not yet resolved
    Pending { tx_hash: TxHash, role: Role },
}

impl RedeemOutcome {
    pub fn tx_hash(&self) -> TxHash {
        match self {
            RedeemOutcome::Confirmed { tx_hash, .. } | RedeemOutcome::Pending { tx_hash, .. } => {
                *tx_hash
            }
        }
    }

    pub fn role(&self) -> Role {
        match self {
            RedeemOutcome::Confirmed { role, .. } | RedeemOutcome::Pending { role, .. } => *role,
        }
    }
}

/// Parse a user-supplied EVM address.
pub fn parse_address(raw: &str) -> Result<Address, RelayError> {
    Address::from_str(raw.trim())
        .map_err(|_| RelayError::Validation(format!("Invalid address: {raw}")))
}

#[derive(Clone)]
pub struct RelayOrchestrator {
    store: Arc<VaultStore>,
    machine: Arc<RedemptionStateMachine>,
    gas: Arc<GasRelayer>,
    nonces: Arc<NonceSequencer>,
    submitter: Arc<ChainSubmitter>,
    settings: RelaySettings,
}

impl RelayOrchestrator {
    pub fn new(
        machine: Arc<RedemptionStateMachine>,
        gas: Arc<GasRelayer>,
        nonces: Arc<NonceSequencer>,
        submitter: Arc<ChainSubmitter>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            store: machine.store().clone(),
            machine,
            gas,
            nonces,
            submitter,
            settings,
        }
    }

    /// Redeem `code_raw` by minting to `dest_raw` with relayer-paid gas.
    pub async fn redeem(&self, code_raw: &str, dest_raw: &str) -> Result<RedeemOutcome, RelayError> {
        let code_hash = normalize_code_hash(code_raw).ok_or_else(|| {
            RelayError::Validation("codeHash must be 32 hex-encoded bytes".to_string())
        })?;
        let dest = parse_address(dest_raw)?;

        let record = self.store.get(&code_hash)?;
        let bound = parse_address(&record.binding.address)
            .map_err(|_| RelayError::Internal("stored binding address is invalid".to_string()))?;
        if dest != bound {
            return Err(RelayError::Validation(
                "dest does not match the address bound to this code".to_string(),
            ));
        }
        let role = record.role;

        let claim = self.machine.claim(&code_hash).await?;
        info!(code_hash = %code_hash, dest = %dest, "Code claimed for redemption");

        // Fees are checked before a nonce is taken so a fee failure costs nothing
        let quote = match self.gas.quote().await {
            Ok(quote) => quote,
            Err(e) => {
                self.release_quietly(&code_hash, claim.token);
                return Err(e.into());
            }
        };

        let nonce = self.nonces.allocate().await;
        let mut job = MintJob::new_pending(&code_hash, dest.to_checksum(None), nonce);
        if let Err(e) = self.store.record_mint_job(&job) {
            self.nonces.abandon(nonce).await;
            self.release_quietly(&code_hash, claim.token);
            return Err(e.into());
        }

        let signed = match self.gas.sign(dest, self.settings.quantity, nonce, &quote) {
            Ok(signed) => signed,
            Err(e) => {
                self.fail_job(&mut job, e.to_string());
                self.nonces.abandon(nonce).await;
                self.release_quietly(&code_hash, claim.token);
                return Err(e.into());
            }
        };

        match self.submitter.submit(&signed).await {
            Ok(receipt) => {
                job.mark_submitted(receipt.tx_hash.to_string());
                self.store.record_mint_job(&job)?;
            }
            Err(e @ SubmitError::Indeterminate(_)) => {
                // Our earlier attempt may have been mined: keep the claim and
                // let the lease sweep decide from the receipt.
                job.mark_submitted(signed.tx_hash().to_string());
                self.store.record_mint_job(&job)?;
                warn!(
                    code_hash = %code_hash,
                    nonce,
                    tx_hash = %signed.tx_hash(),
                    error = %e,
                    "Broadcast outcome unknown, deferring to lease sweep"
                );
                self.spawn_resync();
                return Err(e.into());
            }
            Err(e) => {
                self.fail_job(&mut job, e.to_string());
                if e.frees_nonce() {
                    self.nonces.abandon(nonce).await;
                } else {
                    self.spawn_resync();
                }
                self.release_quietly(&code_hash, claim.token);
                warn!(
                    code_hash = %code_hash,
                    nonce,
                    error = %e,
                    "Broadcast failed, code released"
                );
                return Err(e.into());
            }
        }

        let tx_hash = signed.tx_hash();
        let finalizer = self.clone();
        let handle = tokio::spawn(async move {
            finalizer
                .finalize(code_hash, claim.token, job, signed, role)
                .await
        });

        match tokio::time::timeout(self.settings.deadline, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => Err(RelayError::Internal(join_error.to_string())),
            Err(_) => {
                info!(tx_hash = %tx_hash, "Redemption deadline reached, answering pending");
                Ok(RedeemOutcome::Pending { tx_hash, role })
            }
        }
    }

    /// Await the receipt and commit or release the claim.
    async fn finalize(
        &self,
        code_hash: String,
        token: ClaimToken,
        mut job: MintJob,
        signed: SignedMint,
        role: Role,
    ) -> Result<RedeemOutcome, RelayError> {
        let tx_hash = signed.tx_hash();

        match self.submitter.await_confirmation(tx_hash).await {
            Ok(Confirmation::Confirmed { block_number, gas_used }) => {
                job.mark_confirmed(block_number);
                self.store.record_mint_job(&job)?;
                self.nonces.reconcile(signed.nonce()).await;
                self.machine.commit(&code_hash, token)?;
                info!(
                    code_hash = %code_hash,
                    tx_hash = %tx_hash,
                    block_number = ?block_number,
                    gas_used,
                    "Redemption confirmed"
                );
                Ok(RedeemOutcome::Confirmed { tx_hash, role })
            }
            Ok(Confirmation::Reverted { block_number }) => {
                self.fail_job(&mut job, "transaction reverted");
                self.release_quietly(&code_hash, token);
                warn!(
                    code_hash = %code_hash,
                    tx_hash = %tx_hash,
                    block_number = ?block_number,
                    "Mint reverted, code released"
                );
                Err(RelayError::Reverted(tx_hash.to_string()))
            }
            Err(e) => {
                warn!(
                    code_hash = %code_hash,
                    tx_hash = %tx_hash,
                    error = %e,
                    "Mint unconfirmed, leaving claim to lease sweep"
                );
                Ok(RedeemOutcome::Pending { tx_hash, role })
            }
        }
    }

    fn fail_job(&self, job: &mut MintJob, error: impl Into<String>) {
        job.mark_failed(error);
        if let Err(e) = self.store.record_mint_job(job) {
            warn!(code_hash = %job.code_hash, error = %e, "Failed to record mint job failure");
        }
    }

    fn release_quietly(&self, code_hash: &str, token: ClaimToken) {
        // A failed release is left to the lease sweep
        if let Err(e) = self.machine.release(code_hash, token) {
            warn!(code_hash = %code_hash, error = %e, "Failed to release claim");
        }
    }

    fn spawn_resync(&self) {
        let nonces = self.nonces.clone();
        tokio::spawn(async move {
            if let Err(e) = nonces.resync().await {
                warn!(error = %e, "Nonce resync failed");
            }
        });
    }
}

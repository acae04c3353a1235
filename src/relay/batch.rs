// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Batch minting from the relayer account.
//!
//! Nonces for the whole batch are taken from the sequencer in one step up
//! front. Jobs then run in groups of at most `concurrency`, each group fully
//! resolved before the next is admitted, so the number of outstanding chain
//! requests stays bounded. A failed job is recorded and never aborts its
//! siblings.

use std::sync::Arc;

use alloy::primitives::{TxHash, U256};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::error::RelayError;
use crate::blockchain::{
    ChainSubmitter, Confirmation, GasRelayer, NonceSequencer, SubmitError,
};

/// Upper bound on jobs per batch.
pub const MAX_BATCH_COUNT: u64 = 1_000;

/// Upper bound on in-flight jobs per group.
pub const MAX_BATCH_CONCURRENCY: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct BatchRequest {
    pub count: u64,
    pub concurrency: usize,
    pub quantity: U256,
}

/// Outcome of one batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BatchTxStatus {
    /// Mined successfully
    Confirmed,
    /// Broadcast, no receipt within the poll budget
    Submitted,
    /// Mined but reverted
    Reverted,
    /// Never broadcast
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchTxResult {
    pub nonce: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub status: BatchTxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub requested: u64,
    /// Jobs that reached the node
    pub submitted: u64,
    pub confirmed: u64,
    /// Jobs that were never broadcast or reverted
    pub failed: u64,
    /// Per-nonce results, ordered by nonce
    pub results: Vec<BatchTxResult>,
}

#[derive(Clone)]
pub struct BatchMinter {
    gas: Arc<GasRelayer>,
    nonces: Arc<NonceSequencer>,
    submitter: Arc<ChainSubmitter>,
}

impl BatchMinter {
    pub fn new(
        gas: Arc<GasRelayer>,
        nonces: Arc<NonceSequencer>,
        submitter: Arc<ChainSubmitter>,
    ) -> Self {
        Self {
            gas,
            nonces,
            submitter,
        }
    }

    /// Mint `count` times to the relayer's own account.
    pub async fn run(&self, request: BatchRequest) -> Result<BatchSummary, RelayError> {
        validate(&request)?;

        // Fail fast on fees or funds before any nonce is taken
        self.gas.quote().await?;

        let nonces = self.nonces.allocate_batch(request.count).await;
        info!(
            count = request.count,
            concurrency = request.concurrency,
            first_nonce = nonces.first().copied(),
            "Batch mint starting"
        );

        let mut results = Vec::with_capacity(nonces.len());
        let mut needs_resync = false;

        for group in nonces.chunks(request.concurrency) {
            let mut tasks = JoinSet::new();
            for &nonce in group {
                let minter = self.clone();
                let quantity = request.quantity;
                tasks.spawn(async move { minter.mint_one(nonce, quantity).await });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((result, resync)) => {
                        needs_resync |= resync;
                        results.push(result);
                    }
                    Err(e) => return Err(RelayError::Internal(e.to_string())),
                }
            }
        }

        if needs_resync {
            if let Err(e) = self.nonces.resync().await {
                warn!(error = %e, "Nonce resync after batch rejection failed");
            }
        }

        results.sort_by_key(|r| r.nonce);
        let summary = summarize(request.count, results);
        info!(
            requested = summary.requested,
            submitted = summary.submitted,
            confirmed = summary.confirmed,
            failed = summary.failed,
            "Batch mint finished"
        );
        Ok(summary)
    }

    /// Build, broadcast and confirm one job. The flag asks for a nonce resync.
    async fn mint_one(&self, nonce: u64, quantity: U256) -> (BatchTxResult, bool) {
        let failed = |error: String| BatchTxResult {
            nonce,
            tx_hash: None,
            status: BatchTxStatus::Failed,
            error: Some(error),
        };

        let signed = match self
            .gas
            .build_and_sign(self.gas.address(), quantity, nonce)
            .await
        {
            Ok(signed) => signed,
            Err(e) => {
                warn!(nonce, error = %e, "Batch job could not be signed");
                self.nonces.abandon(nonce).await;
                return (failed(e.to_string()), false);
            }
        };

        let tx_hash: TxHash = match self.submitter.submit(&signed).await {
            Ok(receipt) => receipt.tx_hash,
            Err(SubmitError::Indeterminate(message)) => {
                warn!(nonce, error = %message, "Batch job outcome unknown");
                let result = BatchTxResult {
                    nonce,
                    tx_hash: Some(signed.tx_hash().to_string()),
                    status: BatchTxStatus::Submitted,
                    error: Some(message),
                };
                return (result, true);
            }
            Err(e) => {
                warn!(nonce, error = %e, "Batch job broadcast failed");
                let frees_nonce = e.frees_nonce();
                if frees_nonce {
                    self.nonces.abandon(nonce).await;
                }
                return (failed(e.to_string()), !frees_nonce);
            }
        };

        let (status, error) = match self.submitter.await_confirmation(tx_hash).await {
            Ok(Confirmation::Confirmed { .. }) => (BatchTxStatus::Confirmed, None),
            Ok(Confirmation::Reverted { .. }) => {
                (BatchTxStatus::Reverted, Some("transaction reverted".to_string()))
            }
            Err(e) => (BatchTxStatus::Submitted, Some(e.to_string())),
        };

        (
            BatchTxResult {
                nonce,
                tx_hash: Some(tx_hash.to_string()),
                status,
                error,
            },
            false,
        )
    }
}

fn validate(request: &BatchRequest) -> Result<(), RelayError> {
    if request.count == 0 || request.count > MAX_BATCH_COUNT {
        return Err(RelayError::Validation(format!(
            "count must be between 1 and {MAX_BATCH_COUNT}"
        )));
    }
    if request.concurrency == 0 || request.concurrency > MAX_BATCH_CONCURRENCY {
        return Err(RelayError::Validation(format!(
            "concurrency must be between 1 and {MAX_BATCH_CONCURRENCY}"
        )));
    }
    if request.quantity.is_zero() {
        return Err(RelayError::Validation("quantity must be positive".to_string()));
    }
    Ok(())
}

fn summarize(requested: u64, results: Vec<BatchTxResult>) -> BatchSummary {
    let count = |pred: fn(&BatchTxResult) -> bool| results.iter().filter(|r| pred(r)).count() as u64;
    BatchSummary {
        requested,
        submitted: count(|r| r.tx_hash.is_some()),
        confirmed: count(|r| r.status == BatchTxStatus::Confirmed),
        failed: count(|r| matches!(r.status, BatchTxStatus::Failed | BatchTxStatus::Reverted)),
        results,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::test_support::{test_state_with_nonce, SendOutcome};

    fn request(count: u64, concurrency: usize) -> BatchRequest {
        BatchRequest {
            count,
            concurrency,
            quantity: U256::from(1),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fifty_jobs_use_each_nonce_once() {
        let h = test_state_with_nonce(7).await;
        let summary = h.state.batch.run(request(50, 10)).await.unwrap();

        assert_eq!(summary.requested, 50);
        assert_eq!(summary.submitted, 50);
        assert_eq!(summary.confirmed, 50);
        assert_eq!(summary.failed, 0);

        let nonces: Vec<u64> = summary.results.iter().map(|r| r.nonce).collect();
        assert_eq!(nonces, (7..=56).collect::<Vec<_>>());

        let accepted = h.chain.accepted_nonces();
        assert_eq!(accepted.len(), 50);
        assert_eq!(
            accepted.into_iter().collect::<BTreeSet<_>>(),
            (7..=56).collect::<BTreeSet<_>>()
        );
        assert!(h.chain.max_in_flight_sends() <= 10);
        assert_eq!(h.nonces.peek().await, 57);
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let h = test_state_with_nonce(0).await;
        h.chain.script_sends([
            SendOutcome::Accept,
            SendOutcome::Rejected("nonce too low".to_string()),
        ]);

        let summary = h.state.batch.run(request(4, 1)).await.unwrap();
        assert_eq!(summary.submitted, 3);
        assert_eq!(summary.confirmed, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.results[1].status, BatchTxStatus::Failed);
        assert_eq!(summary.results[1].nonce, 1);
    }

    #[tokio::test]
    async fn invalid_requests_take_no_nonces() {
        let h = test_state_with_nonce(3).await;
        for bad in [request(0, 1), request(1, 0), request(MAX_BATCH_COUNT + 1, 1)] {
            assert!(matches!(
                h.state.batch.run(bad).await,
                Err(RelayError::Validation(_))
            ));
        }
        let zero_quantity = BatchRequest {
            quantity: U256::ZERO,
            ..request(1, 1)
        };
        assert!(matches!(
            h.state.batch.run(zero_quantity).await,
            Err(RelayError::Validation(_))
        ));

        h.chain.fail_fee_queries(true);
        assert!(matches!(
            h.state.batch.run(request(5, 2)).await,
            Err(RelayError::FeeQuery(_))
        ));
        assert_eq!(h.nonces.peek().await, 3);
    }

    #[tokio::test]
    async fn unused_nonce_returns_to_sequencer() {
        let h = test_state_with_nonce(0).await;
        h.chain.script_sends([
            SendOutcome::Accept,
            SendOutcome::Rejected("insufficient funds for gas * price + value".to_string()),
        ]);

        let summary = h.state.batch.run(request(3, 1)).await.unwrap();
        assert_eq!(summary.confirmed, 2);
        assert_eq!(summary.results[1].status, BatchTxStatus::Failed);

        // Nonce 1 never reached the node and is handed out next
        assert_eq!(h.nonces.allocate().await, 1);
        assert_eq!(h.nonces.allocate().await, 3);
    }
}

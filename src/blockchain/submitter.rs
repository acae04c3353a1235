// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Broadcast and confirmation of signed mints.
//!
//! ## Retry rules
//!
//! - A JSON-RPC error response is a rejection and is never retried.
//! - Timeouts and transport errors are retried with the *same* signed bytes,
//!   so a retry can never consume a second nonce.
//! - A node answering "already known" to a retry has the transaction; that
//!   counts as accepted.
//! - A node answering "nonce too low" to a retry may have mined the earlier
//!   attempt. With a receipt for our hash it counts as accepted, otherwise
//!   the outcome is [`SubmitError::Indeterminate`].

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::TxHash;

use super::client::{ChainClient, ChainError};
use super::gas::SignedMint;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1` (attempts are 1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

/// Broadcast acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub tx_hash: TxHash,
    pub attempts: u32,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitError {
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("broadcast timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("network error after {attempts} attempts: {message}")]
    Network { attempts: u32, message: String },

    /// The nonce was consumed but not provably by this transaction.
    #[error("broadcast outcome unknown: {0}")]
    Indeterminate(String),
}

impl SubmitError {
    /// Whether the nonce is certainly unused and may be handed out again.
    ///
    /// Exhausted retries count as unused: if an attempt did land, the reused
    /// nonce is refused and the chain is resynced from that refusal.
    pub fn frees_nonce(&self) -> bool {
        match self {
            SubmitError::Rejected(message) => !is_nonce_taken(message),
            SubmitError::Timeout { .. } | SubmitError::Network { .. } => true,
            SubmitError::Indeterminate(_) => false,
        }
    }
}

/// Final outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed { block_number: Option<u64>, gas_used: u64 },
    Reverted { block_number: Option<u64> },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfirmError {
    #[error("no receipt after {polls} polls")]
    NotConfirmed { polls: u32 },
}

fn is_already_known(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("already known") || lower.contains("known transaction")
}

fn is_nonce_too_low(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("nonce too low") || lower.contains("nonce has already been used")
}

/// Rejections that mean some transaction already holds the nonce.
fn is_nonce_taken(message: &str) -> bool {
    is_nonce_too_low(message)
        || is_already_known(message)
        || message.to_ascii_lowercase().contains("replacement transaction underpriced")
}

pub struct ChainSubmitter {
    chain: Arc<dyn ChainClient>,
    submit_policy: RetryPolicy,
    confirm_policy: RetryPolicy,
}

impl ChainSubmitter {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        submit_policy: RetryPolicy,
        confirm_policy: RetryPolicy,
    ) -> Self {
        Self {
            chain,
            submit_policy,
            confirm_policy,
        }
    }

    /// Broadcast a signed mint, retrying transient failures with the same bytes.
    pub async fn submit(&self, mint: &SignedMint) -> Result<SubmitReceipt, SubmitError> {
        let max_attempts = self.submit_policy.max_attempts.max(1);
        let mut last_error = ChainError::Network("no attempt made".to_string());

        for attempt in 1..=max_attempts {
            match self.chain.send_raw(mint.raw()).await {
                Ok(tx_hash) => {
                    tracing::info!(
                        nonce = mint.nonce(),
                        tx_hash = %tx_hash,
                        attempt,
                        "Mint broadcast"
                    );
                    return Ok(SubmitReceipt { tx_hash, attempts: attempt });
                }
                Err(ChainError::Rejected(message)) if attempt > 1 && is_already_known(&message) => {
                    // An earlier timed-out attempt did reach the node
                    tracing::info!(
                        nonce = mint.nonce(),
                        tx_hash = %mint.tx_hash(),
                        attempt,
                        "Mint already known to node"
                    );
                    return Ok(SubmitReceipt {
                        tx_hash: mint.tx_hash(),
                        attempts: attempt,
                    });
                }
                Err(ChainError::Rejected(message)) if attempt > 1 && is_nonce_too_low(&message) => {
                    return self.resolve_nonce_too_low(mint, attempt, message).await;
                }
                Err(ChainError::Rejected(message)) => {
                    tracing::warn!(
                        nonce = mint.nonce(),
                        error = %message,
                        "Mint rejected by node"
                    );
                    return Err(SubmitError::Rejected(message));
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        nonce = mint.nonce(),
                        attempt,
                        max_attempts,
                        error = %e,
                        "Mint broadcast failed, retrying with same payload"
                    );
                    last_error = e;
                    if attempt < max_attempts {
                        tokio::time::sleep(self.submit_policy.backoff(attempt)).await;
                    }
                }
                Err(e) => return Err(SubmitError::Rejected(e.to_string())),
            }
        }

        Err(match last_error {
            ChainError::Timeout(_) => SubmitError::Timeout {
                attempts: max_attempts,
            },
            other => SubmitError::Network {
                attempts: max_attempts,
                message: other.to_string(),
            },
        })
    }

    /// A retry was refused for a spent nonce: find out whether our own
    /// earlier attempt spent it.
    async fn resolve_nonce_too_low(
        &self,
        mint: &SignedMint,
        attempt: u32,
        message: String,
    ) -> Result<SubmitReceipt, SubmitError> {
        let tx_hash = mint.tx_hash();
        match self.chain.receipt(tx_hash).await {
            Ok(Some(_)) => {
                tracing::info!(
                    nonce = mint.nonce(),
                    tx_hash = %tx_hash,
                    attempt,
                    "Earlier broadcast attempt was mined"
                );
                Ok(SubmitReceipt {
                    tx_hash,
                    attempts: attempt,
                })
            }
            Ok(None) | Err(_) => {
                tracing::warn!(
                    nonce = mint.nonce(),
                    tx_hash = %tx_hash,
                    error = %message,
                    "Nonce spent after a timed-out attempt, outcome unknown"
                );
                Err(SubmitError::Indeterminate(message))
            }
        }
    }

    /// Poll for a receipt until it appears or the poll budget is spent.
    ///
    /// RPC errors while polling count as "not yet" rather than failing.
    pub async fn await_confirmation(&self, tx_hash: TxHash) -> Result<Confirmation, ConfirmError> {
        let polls = self.confirm_policy.max_attempts.max(1);

        for poll in 1..=polls {
            match self.chain.receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.success => {
                    return Ok(Confirmation::Confirmed {
                        block_number: receipt.block_number,
                        gas_used: receipt.gas_used,
                    });
                }
                Ok(Some(receipt)) => {
                    return Ok(Confirmation::Reverted {
                        block_number: receipt.block_number,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(tx_hash = %tx_hash, poll, error = %e, "Receipt poll failed");
                }
            }
            if poll < polls {
                tokio::time::sleep(self.confirm_policy.backoff(poll)).await;
            }
        }

        Err(ConfirmError::NotConfirmed { polls })
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, U256};

    use super::*;
    use crate::blockchain::gas::GasRelayer;
    use crate::test_support::{
        fast_policy, relayer_signer, test_gas_settings, MockChain, ReceiptMode, SendOutcome,
    };

    async fn setup() -> (Arc<MockChain>, GasRelayer, ChainSubmitter) {
        let chain = Arc::new(MockChain::monad());
        let relayer = GasRelayer::connect(chain.clone(), relayer_signer(), test_gas_settings())
            .await
            .unwrap();
        let submitter = ChainSubmitter::new(chain.clone(), fast_policy(3), fast_policy(3));
        (chain, relayer, submitter)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn transient_failures_retry_same_payload() {
        let (chain, relayer, submitter) = setup().await;
        let mint = relayer
            .build_and_sign(Address::repeat_byte(0x42), U256::from(1), 0)
            .await
            .unwrap();

        chain.script_sends([SendOutcome::Timeout, SendOutcome::Network]);
        let receipt = submitter.submit(&mint).await.unwrap();
        assert_eq!(receipt.attempts, 3);
        assert_eq!(receipt.tx_hash, mint.tx_hash());

        let sent = chain.sent_raw();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|raw| raw.as_slice() == mint.raw()));
    }

    #[tokio::test]
    async fn retry_answered_already_known_is_accepted() {
        let (chain, relayer, submitter) = setup().await;
        let mint = relayer
            .build_and_sign(Address::repeat_byte(0x42), U256::from(1), 0)
            .await
            .unwrap();

        chain.script_sends([
            SendOutcome::Timeout,
            SendOutcome::Rejected("already known".to_string()),
        ]);
        let receipt = submitter.submit(&mint).await.unwrap();
        assert_eq!(receipt.attempts, 2);
        assert_eq!(receipt.tx_hash, mint.tx_hash());
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let (chain, relayer, submitter) = setup().await;
        let mint = relayer
            .build_and_sign(Address::repeat_byte(0x42), U256::from(1), 0)
            .await
            .unwrap();

        chain.script_sends([SendOutcome::Rejected("nonce too low".to_string())]);
        assert!(matches!(
            submitter.submit(&mint).await,
            Err(SubmitError::Rejected(_))
        ));
        assert_eq!(chain.sent_raw().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_timeouts_surface_as_timeout() {
        let (chain, relayer, submitter) = setup().await;
        let mint = relayer
            .build_and_sign(Address::repeat_byte(0x42), U256::from(1), 0)
            .await
            .unwrap();

        chain.script_sends([SendOutcome::Timeout, SendOutcome::Timeout, SendOutcome::Timeout]);
        assert!(matches!(
            submitter.submit(&mint).await,
            Err(SubmitError::Timeout { attempts: 3 })
        ));
    }

    #[tokio::test]
    async fn confirmation_outcomes() {
        let (chain, relayer, submitter) = setup().await;
        let dest = Address::repeat_byte(0x42);

        let ok = relayer.build_and_sign(dest, U256::from(1), 0).await.unwrap();
        submitter.submit(&ok).await.unwrap();
        assert!(matches!(
            submitter.await_confirmation(ok.tx_hash()).await,
            Ok(Confirmation::Confirmed { .. })
        ));

        chain.set_receipt_mode(ReceiptMode::Revert);
        let reverted = relayer.build_and_sign(dest, U256::from(1), 1).await.unwrap();
        submitter.submit(&reverted).await.unwrap();
        assert!(matches!(
            submitter.await_confirmation(reverted.tx_hash()).await,
            Ok(Confirmation::Reverted { .. })
        ));

        chain.set_receipt_mode(ReceiptMode::Never);
        let stuck = relayer.build_and_sign(dest, U256::from(1), 2).await.unwrap();
        submitter.submit(&stuck).await.unwrap();
        assert!(matches!(
            submitter.await_confirmation(stuck.tx_hash()).await,
            Err(ConfirmError::NotConfirmed { polls: 3 })
        ));
    }

    #[tokio::test]
    async fn nonce_too_low_on_retry_checks_for_our_receipt() {
        let (chain, relayer, submitter) = setup().await;
        let mint = relayer
            .build_and_sign(Address::repeat_byte(0x42), U256::from(1), 0)
            .await
            .unwrap();

        // The timed-out attempt was mined after all
        chain.insert_receipt(mint.tx_hash(), true, Some(7));
        chain.script_sends([
            SendOutcome::Timeout,
            SendOutcome::Rejected("nonce too low".to_string()),
        ]);
        let receipt = submitter.submit(&mint).await.unwrap();
        assert_eq!(receipt.tx_hash, mint.tx_hash());
        assert_eq!(receipt.attempts, 2);
    }

    #[tokio::test]
    async fn nonce_too_low_on_retry_without_receipt_is_indeterminate() {
        let (chain, relayer, submitter) = setup().await;
        let mint = relayer
            .build_and_sign(Address::repeat_byte(0x42), U256::from(1), 0)
            .await
            .unwrap();

        chain.script_sends([
            SendOutcome::Timeout,
            SendOutcome::Rejected("nonce too low".to_string()),
        ]);
        let err = submitter.submit(&mint).await.unwrap_err();
        assert!(matches!(err, SubmitError::Indeterminate(_)));
        assert!(!err.frees_nonce());
    }

    #[test]
    fn nonce_reuse_classification() {
        assert!(SubmitError::Rejected("insufficient funds for gas".into()).frees_nonce());
        assert!(SubmitError::Rejected("max fee per gas less than block base fee".into()).frees_nonce());
        assert!(!SubmitError::Rejected("nonce too low".into()).frees_nonce());
        assert!(!SubmitError::Rejected("replacement transaction underpriced".into()).frees_nonce());
        assert!(SubmitError::Timeout { attempts: 3 }.frees_nonce());
    }
}

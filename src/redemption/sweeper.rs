// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Lease Sweeper
//!
//! Background task that resolves Claimed codes whose lease ran out. This is
//! the backstop for redemptions that crashed, timed out or were abandoned
//! between claim and commit.
//!
//! Every `interval` the sweeper lists lapsed claims and reconciles each one
//! against the chain (see [`RedemptionStateMachine::reconcile_expired`]).
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::machine::{Reconciliation, RedemptionStateMachine};

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub consumed: usize,
    pub released: usize,
    pub skipped: usize,
    pub errors: usize,
}

pub struct LeaseSweeper {
    machine: Arc<RedemptionStateMachine>,
    interval: Duration,
}

impl LeaseSweeper {
    pub fn new(machine: Arc<RedemptionStateMachine>, interval: Duration) -> Self {
        Self { machine, interval }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Lease sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let report = self.sweep_once(Utc::now()).await;
            if report.examined > 0 {
                info!(
                    examined = report.examined,
                    consumed = report.consumed,
                    released = report.released,
                    skipped = report.skipped,
                    errors = report.errors,
                    "Lease sweep finished"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Lease sweeper shutting down");
    }

    /// Reconcile every claim that has lapsed at `now`.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let lapsed = match self.machine.store().expired_claims(now) {
            Ok(codes) => codes,
            Err(e) => {
                warn!(error = %e, "Lease sweep could not list claims");
                report.errors += 1;
                return report;
            }
        };

        for code_hash in &lapsed {
            report.examined += 1;
            match self.machine.reconcile_expired(code_hash, now).await {
                Ok(Reconciliation::Consumed) => report.consumed += 1,
                Ok(Reconciliation::Released) => report.released += 1,
                Ok(Reconciliation::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(code_hash = %code_hash, error = %e, "Lease sweep failed for code");
                    report.errors += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::TxHash;
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::storage::{CodeState, MintJob, Role};
    use crate::test_support::{temp_store, MockChain};

    #[tokio::test]
    async fn sweep_reverts_expired_and_keeps_live_claims() {
        let (store, keys, _dir) = temp_store();
        let expired = store.provision(&keys, Role::Reader, None).unwrap().code_hash;
        let live = store.provision(&keys, Role::Author, None).unwrap().code_hash;
        let landed = store.provision(&keys, Role::Publisher, None).unwrap().code_hash;
        let store = Arc::new(store);

        let now = Utc::now();
        store
            .try_claim_at(&expired, ChronoDuration::seconds(10), now)
            .unwrap();
        store
            .try_claim_at(&landed, ChronoDuration::seconds(10), now)
            .unwrap();
        store
            .try_claim_at(&live, ChronoDuration::seconds(600), now)
            .unwrap();

        let chain = Arc::new(MockChain::monad());
        let tx_hash = TxHash::repeat_byte(0x5e);
        chain.insert_receipt(tx_hash, true, Some(3));
        let mut job = MintJob::new_pending(&landed, "0xdest".to_string(), 4);
        job.mark_submitted(tx_hash.to_string());
        store.record_mint_job(&job).unwrap();

        let machine = Arc::new(RedemptionStateMachine::new(
            store.clone(),
            chain,
            ChronoDuration::seconds(10),
        ));
        let sweeper = LeaseSweeper::new(machine, Duration::from_secs(30));

        let report = sweeper.sweep_once(now + ChronoDuration::seconds(11)).await;
        assert_eq!(report.examined, 2);
        assert_eq!(report.released, 1);
        assert_eq!(report.consumed, 1);

        assert_eq!(store.get(&expired).unwrap().state, CodeState::Available);
        assert_eq!(store.get(&landed).unwrap().state, CodeState::Consumed);
        assert_eq!(store.get(&live).unwrap().state, CodeState::Claimed);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (store, _keys, _dir) = temp_store();
        let machine = Arc::new(RedemptionStateMachine::new(
            Arc::new(store),
            Arc::new(MockChain::monad()),
            ChronoDuration::seconds(10),
        ));
        let sweeper = LeaseSweeper::new(machine, Duration::from_secs(3600));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(sweeper.run(shutdown.clone()));
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

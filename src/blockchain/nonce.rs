// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Single-owner nonce allocation for the relayer account.
//!
//! The counter is seeded once from the chain's pending nonce and then
//! served from memory under a mutex; the chain is only consulted again on
//! explicit resync. The counter never moves backwards.
//!
//! A nonce that was allocated but provably never reached a node is handed
//! back with [`NonceSequencer::abandon`] and reused by the next allocation,
//! so later transactions never queue behind a hole.

use std::collections::BTreeSet;
use std::sync::Arc;

use alloy::primitives::Address;
use tokio::sync::Mutex;

use super::client::{ChainClient, ChainError};

#[derive(Debug)]
struct Counter {
    /// Next fresh nonce
    next: u64,
    /// Abandoned nonces below `next`, reused lowest first
    gaps: BTreeSet<u64>,
}

impl Counter {
    fn take(&mut self) -> u64 {
        if let Some(nonce) = self.gaps.pop_first() {
            return nonce;
        }
        let nonce = self.next;
        self.next += 1;
        nonce
    }
}

pub struct NonceSequencer {
    chain: Arc<dyn ChainClient>,
    account: Address,
    counter: Mutex<Counter>,
}

impl NonceSequencer {
    /// Seed the counter from the account's pending transaction count.
    pub async fn seed(chain: Arc<dyn ChainClient>, account: Address) -> Result<Self, ChainError> {
        let start = chain.pending_nonce(account).await?;
        tracing::info!(%account, nonce = start, "Nonce sequencer seeded");
        Ok(Self {
            chain,
            account,
            counter: Mutex::new(Counter {
                next: start,
                gaps: BTreeSet::new(),
            }),
        })
    }

    pub fn account(&self) -> Address {
        self.account
    }

    /// Take the next nonce, filling abandoned ones first.
    pub async fn allocate(&self) -> u64 {
        self.counter.lock().await.take()
    }

    /// Take `count` nonces in one step, ascending.
    pub async fn allocate_batch(&self, count: u64) -> Vec<u64> {
        let mut counter = self.counter.lock().await;
        (0..count).map(|_| counter.take()).collect()
    }

    /// Nonce the next allocation would return.
    pub async fn peek(&self) -> u64 {
        let counter = self.counter.lock().await;
        counter.gaps.first().copied().unwrap_or(counter.next)
    }

    /// Hand back a nonce whose transaction never reached a node.
    pub async fn abandon(&self, nonce: u64) {
        let mut counter = self.counter.lock().await;
        if nonce < counter.next && counter.gaps.insert(nonce) {
            tracing::info!(account = %self.account, nonce, "Nonce abandoned, queued for reuse");
        }
    }

    /// Account for a nonce seen confirmed on-chain.
    ///
    /// A confirmed nonce at or beyond the local counter means another sender
    /// used the account; skip past it.
    pub async fn reconcile(&self, confirmed: u64) {
        let mut counter = self.counter.lock().await;
        counter.gaps.remove(&confirmed);
        if confirmed >= counter.next {
            tracing::warn!(
                account = %self.account,
                local = counter.next,
                confirmed,
                "Confirmed nonce ahead of local counter, fast-forwarding"
            );
            counter.next = confirmed + 1;
        }
    }

    /// Re-query the chain and fast-forward if it is ahead.
    ///
    /// Abandoned nonces below the chain's pending nonce were used by someone
    /// else and are dropped. Holds the lock across the query so no
    /// allocation races the update.
    pub async fn resync(&self) -> Result<u64, ChainError> {
        let mut counter = self.counter.lock().await;
        let remote = self.chain.pending_nonce(self.account).await?;
        counter.gaps = counter.gaps.split_off(&remote);
        if remote > counter.next {
            tracing::info!(
                account = %self.account,
                local = counter.next,
                remote,
                "Nonce resync fast-forwarded"
            );
            counter.next = remote;
        } else if remote < counter.next && counter.gaps.first() != Some(&remote) {
            tracing::debug!(
                account = %self.account,
                local = counter.next,
                remote,
                "Chain pending nonce behind local counter"
            );
        }
        Ok(counter.gaps.first().copied().unwrap_or(counter.next))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::test_support::MockChain;

    async fn sequencer(start: u64) -> (Arc<NonceSequencer>, Arc<MockChain>) {
        let chain = Arc::new(MockChain::monad());
        let account = Address::repeat_byte(0x01);
        chain.set_pending_nonce(start);
        let seq = NonceSequencer::seed(chain.clone(), account).await.unwrap();
        (Arc::new(seq), chain)
    }

    #[tokio::test]
    async fn seeds_from_pending_nonce() {
        let (seq, _chain) = sequencer(7).await;
        assert_eq!(seq.allocate().await, 7);
        assert_eq!(seq.allocate().await, 8);
        assert_eq!(seq.allocate_batch(3).await, vec![9, 10, 11]);
        assert_eq!(seq.peek().await, 12);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_allocations_are_contiguous() {
        let (seq, _chain) = sequencer(100).await;

        let mut handles = Vec::new();
        for _ in 0..64 {
            let seq = seq.clone();
            handles.push(tokio::spawn(async move { seq.allocate().await }));
        }

        let mut seen = BTreeSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()), "duplicate nonce");
        }
        assert_eq!(seen, (100..164).collect::<BTreeSet<_>>());
    }

    #[tokio::test]
    async fn reconcile_only_moves_forward() {
        let (seq, _chain) = sequencer(10).await;
        seq.reconcile(4).await;
        assert_eq!(seq.peek().await, 10);

        seq.reconcile(15).await;
        assert_eq!(seq.peek().await, 16);
    }

    #[tokio::test]
    async fn resync_never_rewinds() {
        let (seq, chain) = sequencer(10).await;
        seq.allocate_batch(5).await;

        chain.set_pending_nonce(12);
        assert_eq!(seq.resync().await.unwrap(), 15);

        chain.set_pending_nonce(20);
        assert_eq!(seq.resync().await.unwrap(), 20);
        assert_eq!(seq.allocate().await, 20);
    }

    #[tokio::test]
    async fn abandoned_nonce_is_reused_before_fresh_ones() {
        let (seq, _chain) = sequencer(0).await;
        assert_eq!(seq.allocate().await, 0);
        assert_eq!(seq.allocate().await, 1);

        seq.abandon(0).await;
        assert_eq!(seq.peek().await, 0);
        assert_eq!(seq.allocate().await, 0);
        assert_eq!(seq.allocate().await, 2);

        // Unallocated or duplicate hand-backs are ignored
        seq.abandon(9).await;
        seq.abandon(1).await;
        seq.abandon(1).await;
        assert_eq!(seq.allocate_batch(3).await, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn resync_drops_gaps_the_chain_has_passed() {
        let (seq, chain) = sequencer(0).await;
        seq.allocate_batch(4).await;
        seq.abandon(1).await;
        seq.abandon(3).await;

        chain.set_pending_nonce(2);
        assert_eq!(seq.resync().await.unwrap(), 3);
        assert_eq!(seq.allocate().await, 3);
        assert_eq!(seq.allocate().await, 4);
    }
}

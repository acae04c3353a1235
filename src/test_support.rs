// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests: an in-memory chain and a fully wired
//! [`AppState`] over a temporary vault.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::{
    consensus::{Transaction, TxEnvelope},
    eips::eip2718::Decodable2718,
    primitives::{Address, TxHash, U256},
    signers::local::PrivateKeySigner,
    sol_types::SolCall,
};
use async_trait::async_trait;
use tempfile::TempDir;

use crate::blockchain::contract::IMintable;
use crate::blockchain::{
    signer_from_hex, ChainClient, ChainError, ChainSubmitter, GasRelayer, GasSettings,
    NonceSequencer, ReceiptSummary, RetryPolicy, MONAD_TESTNET_CHAIN_ID,
};
use crate::relay::RelaySettings;
use crate::state::{AppState, RelayParts};
use crate::storage::{CodeRecord, KeyVault, Role, VaultStore, KEYS_DIR, VAULT_DB_FILE};

/// First well-known anvil development key.
const RELAYER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub(crate) fn relayer_signer() -> PrivateKeySigner {
    signer_from_hex(RELAYER_KEY).unwrap()
}

pub(crate) fn test_gas_settings() -> GasSettings {
    GasSettings {
        chain_id: MONAD_TESTNET_CHAIN_ID,
        contract: Address::repeat_byte(0xc0),
        gas_limit: 150_000,
        priority_fee_margin: 0,
        mint_value: U256::ZERO,
    }
}

/// Retry policy with millisecond backoff.
pub(crate) fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    }
}

pub(crate) fn temp_store() -> (VaultStore, KeyVault, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = VaultStore::open(&dir.path().join(VAULT_DB_FILE)).unwrap();
    let keys = KeyVault::open(dir.path().join(KEYS_DIR)).unwrap();
    (store, keys, dir)
}

// =============================================================================
// Mock chain
// =============================================================================

/// Scripted result for the next `send_raw` call.
#[derive(Debug, Clone)]
pub(crate) enum SendOutcome {
    Accept,
    Timeout,
    Network,
    Rejected(String),
}

/// How transactions accepted from now on resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReceiptMode {
    Success,
    Revert,
    Never,
}

struct MockState {
    base_fee: u128,
    tip: u128,
    balance: U256,
    fail_fees: bool,
    fail_receipts: bool,
    pending_nonce: u64,
    script: VecDeque<SendOutcome>,
    receipt_mode: ReceiptMode,
    receipts: HashMap<TxHash, ReceiptSummary>,
    known: HashSet<TxHash>,
    minted: HashMap<Address, U256>,
    sent: Vec<(Vec<u8>, u64)>,
    accepted: Vec<u64>,
    in_flight: usize,
    max_in_flight: usize,
    block: u64,
}

/// In-memory [`ChainClient`] that decodes what it is sent.
pub(crate) struct MockChain {
    chain_id: u64,
    relayer: Address,
    state: Mutex<MockState>,
}

impl MockChain {
    pub(crate) fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            relayer: relayer_signer().address(),
            state: Mutex::new(MockState {
                base_fee: 50_000_000_000,
                tip: 1_000_000_000,
                balance: U256::from(10u64).pow(U256::from(24u64)),
                fail_fees: false,
                fail_receipts: false,
                pending_nonce: 0,
                script: VecDeque::new(),
                receipt_mode: ReceiptMode::Success,
                receipts: HashMap::new(),
                known: HashSet::new(),
                minted: HashMap::new(),
                sent: Vec::new(),
                accepted: Vec::new(),
                in_flight: 0,
                max_in_flight: 0,
                block: 100,
            }),
        }
    }

    pub(crate) fn monad() -> Self {
        Self::new(MONAD_TESTNET_CHAIN_ID)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn set_fees(&self, base_fee: u128, tip: u128) {
        let mut s = self.lock();
        s.base_fee = base_fee;
        s.tip = tip;
    }

    pub(crate) fn set_balance(&self, balance: U256) {
        self.lock().balance = balance;
    }

    pub(crate) fn fail_fee_queries(&self, fail: bool) {
        self.lock().fail_fees = fail;
    }

    pub(crate) fn fail_receipts(&self, fail: bool) {
        self.lock().fail_receipts = fail;
    }

    pub(crate) fn set_pending_nonce(&self, nonce: u64) {
        self.lock().pending_nonce = nonce;
    }

    pub(crate) fn script_sends(&self, outcomes: impl IntoIterator<Item = SendOutcome>) {
        self.lock().script.extend(outcomes);
    }

    pub(crate) fn set_receipt_mode(&self, mode: ReceiptMode) {
        self.lock().receipt_mode = mode;
    }

    pub(crate) fn insert_receipt(&self, tx_hash: TxHash, success: bool, block_number: Option<u64>) {
        self.lock().receipts.insert(
            tx_hash,
            ReceiptSummary {
                tx_hash,
                block_number,
                gas_used: 21_000,
                success,
            },
        );
    }

    pub(crate) fn clear_minted(&self, owner: Address) {
        self.lock().minted.remove(&owner);
    }

    /// Raw payload of every send attempt, in order.
    pub(crate) fn sent_raw(&self) -> Vec<Vec<u8>> {
        self.lock().sent.iter().map(|(raw, _)| raw.clone()).collect()
    }

    /// Nonce of every send attempt, in order.
    pub(crate) fn sent_nonces(&self) -> Vec<u64> {
        self.lock().sent.iter().map(|(_, nonce)| *nonce).collect()
    }

    /// Nonces of transactions the node took.
    pub(crate) fn accepted_nonces(&self) -> Vec<u64> {
        self.lock().accepted.clone()
    }

    pub(crate) fn max_in_flight_sends(&self) -> usize {
        self.lock().max_in_flight
    }

    fn accept(&self, envelope: &TxEnvelope) -> Result<TxHash, ChainError> {
        let tx_hash = *envelope.tx_hash();
        let mut s = self.lock();
        if !s.known.insert(tx_hash) {
            return Err(ChainError::Rejected("already known".to_string()));
        }

        let nonce = envelope.nonce();
        s.pending_nonce = s.pending_nonce.max(nonce + 1);
        s.accepted.push(nonce);

        s.block += 1;
        let block_number = Some(s.block);
        match s.receipt_mode {
            ReceiptMode::Never => {}
            mode => {
                let success = mode == ReceiptMode::Success;
                s.receipts.insert(
                    tx_hash,
                    ReceiptSummary {
                        tx_hash,
                        block_number,
                        gas_used: 90_000,
                        success,
                    },
                );
                if success {
                    if let Some((owner, quantity)) = self.decode_mint(envelope.input()) {
                        *s.minted.entry(owner).or_default() += quantity;
                    }
                }
            }
        }
        Ok(tx_hash)
    }

    fn decode_mint(&self, input: &[u8]) -> Option<(Address, U256)> {
        if let Ok(call) = IMintable::mintToCall::abi_decode(input) {
            return Some((call.to, call.quantity));
        }
        IMintable::mintCall::abi_decode(input)
            .ok()
            .map(|call| (self.relayer, call.quantity))
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.chain_id)
    }

    async fn pending_nonce(&self, _account: Address) -> Result<u64, ChainError> {
        Ok(self.lock().pending_nonce)
    }

    async fn base_fee(&self) -> Result<u128, ChainError> {
        let s = self.lock();
        if s.fail_fees {
            return Err(ChainError::Network("fee oracle down".to_string()));
        }
        Ok(s.base_fee)
    }

    async fn priority_fee(&self) -> Result<u128, ChainError> {
        let s = self.lock();
        if s.fail_fees {
            return Err(ChainError::Network("fee oracle down".to_string()));
        }
        Ok(s.tip)
    }

    async fn balance(&self, _account: Address) -> Result<U256, ChainError> {
        Ok(self.lock().balance)
    }

    async fn send_raw(&self, raw: &[u8]) -> Result<TxHash, ChainError> {
        let envelope = TxEnvelope::decode_2718(&mut &raw[..])
            .map_err(|e| ChainError::Rejected(format!("undecodable transaction: {e}")))?;

        let outcome = {
            let mut s = self.lock();
            s.sent.push((raw.to_vec(), envelope.nonce()));
            s.in_flight += 1;
            s.max_in_flight = s.max_in_flight.max(s.in_flight);
            s.script.pop_front().unwrap_or(SendOutcome::Accept)
        };

        // Let concurrent senders overlap
        tokio::task::yield_now().await;

        let result = match outcome {
            SendOutcome::Accept => self.accept(&envelope),
            SendOutcome::Timeout => Err(ChainError::Timeout(Duration::from_secs(1))),
            SendOutcome::Network => Err(ChainError::Network("connection reset".to_string())),
            SendOutcome::Rejected(message) => Err(ChainError::Rejected(message)),
        };
        self.lock().in_flight -= 1;
        result
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<ReceiptSummary>, ChainError> {
        let s = self.lock();
        if s.fail_receipts {
            return Err(ChainError::Network("receipt lookup failed".to_string()));
        }
        Ok(s.receipts.get(&tx_hash).cloned())
    }

    async fn minted_balance(&self, _contract: Address, owner: Address) -> Result<U256, ChainError> {
        Ok(self.lock().minted.get(&owner).copied().unwrap_or(U256::ZERO))
    }
}

// =============================================================================
// Application harness
// =============================================================================

pub(crate) struct TestHarness {
    pub state: AppState,
    pub chain: Arc<MockChain>,
    pub nonces: Arc<NonceSequencer>,
    pub keys: KeyVault,
    _dir: TempDir,
}

impl TestHarness {
    /// Provision a fresh Available code.
    pub(crate) fn provision(&self, role: Role) -> CodeRecord {
        self.state.store.provision(&self.keys, role, None).unwrap()
    }
}

pub(crate) async fn test_state() -> TestHarness {
    test_state_with_nonce(0).await
}

pub(crate) async fn test_state_with_nonce(start_nonce: u64) -> TestHarness {
    let (store, keys, dir) = temp_store();
    let chain = Arc::new(MockChain::monad());
    chain.set_pending_nonce(start_nonce);

    let gas = GasRelayer::connect(chain.clone(), relayer_signer(), test_gas_settings())
        .await
        .unwrap();
    let nonces = Arc::new(
        NonceSequencer::seed(chain.clone(), gas.address())
            .await
            .unwrap(),
    );
    let submitter = ChainSubmitter::new(chain.clone(), fast_policy(3), fast_policy(3));

    let state = AppState::new(
        RelayParts {
            store: Arc::new(store),
            chain: chain.clone(),
            gas: Arc::new(gas),
            nonces: nonces.clone(),
            submitter: Arc::new(submitter),
        },
        chrono::Duration::seconds(60),
        RelaySettings {
            quantity: U256::from(1),
            deadline: Duration::from_secs(5),
        },
    );

    TestHarness {
        state,
        chain,
        nonces,
        keys,
        _dir: dir,
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gas-paying relayer: fee quotes and EIP-1559 mint signing.
//!
//! The relayer key pays for every mint. Fees are sampled from the chain for
//! each transaction (`base fee of the latest block + oracle tip + margin`)
//! and never cached. Quoting is split from signing so callers can abort on
//! fee or funding problems before a nonce is allocated.

use std::sync::Arc;

use alloy::{
    consensus::{SignableTransaction, TxEip1559, TxEnvelope},
    eips::eip2718::Encodable2718,
    network::TxSignerSync,
    primitives::{Address, Bytes, TxHash, TxKind, U256},
    signers::local::PrivateKeySigner,
};

use super::client::{ChainClient, ChainError};
use super::contract::mint_calldata;
use super::types::{format_amount, FeeQuote};

/// Static parameters of relayed mints.
#[derive(Debug, Clone)]
pub struct GasSettings {
    /// Chain id every transaction is signed for
    pub chain_id: u64,
    /// Mint contract
    pub contract: Address,
    /// Gas limit per mint
    pub gas_limit: u64,
    /// Fixed amount added to the oracle tip
    pub priority_fee_margin: u128,
    /// Native value attached to each (payable) mint call
    pub mint_value: U256,
}

#[derive(Debug, thiserror::Error)]
pub enum GasError {
    #[error("fee query failed: {0}")]
    FeeQueryFailed(ChainError),

    #[error("relayer has insufficient funds: requires {required} wei, has {available} wei")]
    InsufficientFunds { required: U256, available: U256 },

    #[error("chain id mismatch: configured {expected}, endpoint reports {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("chain endpoint unreachable: {0}")]
    Unreachable(ChainError),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// An EIP-1559 mint transaction, signed and encoded.
///
/// Immutable once produced: retries rebroadcast these exact bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMint {
    nonce: u64,
    dest: Address,
    raw: Bytes,
    tx_hash: TxHash,
}

impl SignedMint {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn dest(&self) -> Address {
        self.dest
    }

    /// EIP-2718 envelope bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }
}

/// Builds and signs mint transactions paid for by the relayer key.
pub struct GasRelayer {
    chain: Arc<dyn ChainClient>,
    signer: PrivateKeySigner,
    settings: GasSettings,
}

impl GasRelayer {
    /// Create a relayer after checking the endpoint serves the configured chain.
    pub async fn connect(
        chain: Arc<dyn ChainClient>,
        signer: PrivateKeySigner,
        settings: GasSettings,
    ) -> Result<Self, GasError> {
        let actual = chain.chain_id().await.map_err(GasError::Unreachable)?;
        if actual != settings.chain_id {
            return Err(GasError::ChainMismatch {
                expected: settings.chain_id,
                actual,
            });
        }

        tracing::info!(
            relayer = %signer.address(),
            chain_id = actual,
            contract = %settings.contract,
            "Gas relayer ready"
        );

        Ok(Self {
            chain,
            signer,
            settings,
        })
    }

    /// Address paying the gas.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn settings(&self) -> &GasSettings {
        &self.settings
    }

    /// Sample current fees and check the relayer can afford one mint.
    pub async fn quote(&self) -> Result<FeeQuote, GasError> {
        let base_fee = self
            .chain
            .base_fee()
            .await
            .map_err(GasError::FeeQueryFailed)?;
        let tip = self
            .chain
            .priority_fee()
            .await
            .map_err(GasError::FeeQueryFailed)?;

        let quote = FeeQuote::new(
            base_fee,
            tip.saturating_add(self.settings.priority_fee_margin),
        );

        let required = quote.max_cost(self.settings.gas_limit) + self.settings.mint_value;
        let available = self
            .chain
            .balance(self.address())
            .await
            .map_err(GasError::FeeQueryFailed)?;
        if available < required {
            tracing::warn!(
                relayer = %self.address(),
                required = %format_amount(required, 18),
                available = %format_amount(available, 18),
                "Relayer balance too low for mint"
            );
            return Err(GasError::InsufficientFunds {
                required,
                available,
            });
        }

        Ok(quote)
    }

    /// Sign a mint with a previously obtained quote.
    pub fn sign(
        &self,
        dest: Address,
        quantity: U256,
        nonce: u64,
        quote: &FeeQuote,
    ) -> Result<SignedMint, GasError> {
        let mut tx = TxEip1559 {
            chain_id: self.settings.chain_id,
            nonce,
            gas_limit: self.settings.gas_limit,
            max_fee_per_gas: quote.max_fee_per_gas,
            max_priority_fee_per_gas: quote.max_priority_fee_per_gas,
            to: TxKind::Call(self.settings.contract),
            value: self.settings.mint_value,
            access_list: Default::default(),
            input: mint_calldata(self.address(), dest, quantity),
        };

        let signature = self
            .signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| GasError::Signing(e.to_string()))?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));

        Ok(SignedMint {
            nonce,
            dest,
            raw: envelope.encoded_2718().into(),
            tx_hash: *envelope.tx_hash(),
        })
    }

    /// Quote and sign in one step.
    pub async fn build_and_sign(
        &self,
        dest: Address,
        quantity: U256,
        nonce: u64,
    ) -> Result<SignedMint, GasError> {
        let quote = self.quote().await?;
        self.sign(dest, quantity, nonce, &quote)
    }
}

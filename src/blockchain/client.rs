// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-RPC access to the EVM chain.
//!
//! Everything above this module talks to the chain through [`ChainClient`],
//! so the relay, the nonce sequencer and verification can run against a
//! scripted chain in tests.

use std::future::IntoFuture;
use std::time::Duration;

use alloy::{
    eips::BlockNumberOrTag,
    network::Ethereum,
    primitives::{Address, TxHash, U256},
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    transports::TransportError,
};
use async_trait::async_trait;

use super::contract::IMintable;
use super::types::{NetworkConfig, ReceiptSummary};

/// Errors that can occur while talking to the chain.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    /// The node answered with a JSON-RPC error (bad nonce, underpriced, revert...)
    #[error("RPC rejected request: {0}")]
    Rejected(String),

    #[error("RPC timed out after {0:?}")]
    Timeout(Duration),

    #[error("RPC transport error: {0}")]
    Network(String),

    #[error("Unexpected RPC response: {0}")]
    InvalidResponse(String),
}

impl ChainError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Timeout(_) | ChainError::Network(_))
    }
}

fn rpc_error(e: TransportError) -> ChainError {
    if e.is_error_resp() {
        ChainError::Rejected(e.to_string())
    } else {
        ChainError::Network(e.to_string())
    }
}

/// Chain operations used by the relay.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain id reported by the node.
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Next nonce for `account`, including pending transactions.
    async fn pending_nonce(&self, account: Address) -> Result<u64, ChainError>;

    /// Base fee per gas of the latest block.
    async fn base_fee(&self) -> Result<u128, ChainError>;

    /// Priority fee suggested by the node's fee oracle.
    async fn priority_fee(&self) -> Result<u128, ChainError>;

    /// Native balance of `account` in wei.
    async fn balance(&self, account: Address) -> Result<U256, ChainError>;

    /// Broadcast an EIP-2718 encoded signed transaction.
    async fn send_raw(&self, raw: &[u8]) -> Result<TxHash, ChainError>;

    /// Receipt of a mined transaction, `None` while unmined or unknown.
    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<ReceiptSummary>, ChainError>;

    /// `balanceOf(owner)` on the mint contract.
    async fn minted_balance(&self, contract: Address, owner: Address) -> Result<U256, ChainError>;
}

/// HTTP provider type (with the recommended fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// [`ChainClient`] over an alloy HTTP provider.
pub struct AlloyChainClient {
    network: NetworkConfig,
    provider: HttpProvider,
    /// Upper bound for every single RPC call
    timeout: Duration,
}

impl AlloyChainClient {
    /// Create a new client for the specified network.
    pub fn new(network: NetworkConfig, timeout: Duration) -> Result<Self, ChainError> {
        let url: url::Url = network
            .rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainError::InvalidRpcUrl(e.to_string()))?;

        let provider = ProviderBuilder::new().connect_http(url);

        Ok(Self {
            network,
            provider,
            timeout,
        })
    }

    /// Get the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    async fn timed<F: IntoFuture>(&self, fut: F) -> Result<F::Output, ChainError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ChainError::Timeout(self.timeout))
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.timed(self.provider.get_chain_id())
            .await?
            .map_err(rpc_error)
    }

    async fn pending_nonce(&self, account: Address) -> Result<u64, ChainError> {
        self.timed(self.provider.get_transaction_count(account).pending())
            .await?
            .map_err(rpc_error)
    }

    async fn base_fee(&self) -> Result<u128, ChainError> {
        let block = self
            .timed(self.provider.get_block_by_number(BlockNumberOrTag::Latest))
            .await?
            .map_err(rpc_error)?
            .ok_or_else(|| ChainError::InvalidResponse("no latest block".to_string()))?;

        block
            .header
            .base_fee_per_gas
            .map(u128::from)
            .ok_or_else(|| ChainError::InvalidResponse("latest block has no base fee".to_string()))
    }

    async fn priority_fee(&self) -> Result<u128, ChainError> {
        self.timed(self.provider.get_max_priority_fee_per_gas())
            .await?
            .map_err(rpc_error)
    }

    async fn balance(&self, account: Address) -> Result<U256, ChainError> {
        self.timed(self.provider.get_balance(account))
            .await?
            .map_err(rpc_error)
    }

    async fn send_raw(&self, raw: &[u8]) -> Result<TxHash, ChainError> {
        let pending = self
            .timed(self.provider.send_raw_transaction(raw))
            .await?
            .map_err(rpc_error)?;
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<ReceiptSummary>, ChainError> {
        let receipt = self
            .timed(self.provider.get_transaction_receipt(tx_hash))
            .await?
            .map_err(rpc_error)?;

        Ok(receipt.map(|r| ReceiptSummary {
            tx_hash,
            block_number: r.block_number,
            gas_used: r.gas_used,
            success: r.status(),
        }))
    }

    async fn minted_balance(&self, contract: Address, owner: Address) -> Result<U256, ChainError> {
        let instance = IMintable::new(contract, &self.provider);
        self.timed(instance.balanceOf(owner).call())
            .await?
            .map_err(|e| match e {
                alloy::contract::Error::TransportError(e) => rpc_error(e),
                other => ChainError::InvalidResponse(other.to_string()),
            })
    }
}

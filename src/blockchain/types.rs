// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

use alloy::primitives::{TxHash, U256};

/// EVM network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: String,
    /// Chain ID
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: String,
}

/// Monad testnet chain id.
pub const MONAD_TESTNET_CHAIN_ID: u64 = 10143;

/// Monad testnet public RPC.
pub const MONAD_TESTNET_RPC: &str = "https://testnet-rpc.monad.xyz";

impl NetworkConfig {
    pub fn monad_testnet() -> Self {
        Self {
            name: "Monad Testnet".to_string(),
            chain_id: MONAD_TESTNET_CHAIN_ID,
            rpc_url: MONAD_TESTNET_RPC.to_string(),
        }
    }

    pub fn custom(chain_id: u64, rpc_url: impl Into<String>) -> Self {
        let name = if chain_id == MONAD_TESTNET_CHAIN_ID {
            "Monad Testnet".to_string()
        } else {
            format!("EVM chain {chain_id}")
        };
        Self {
            name,
            chain_id,
            rpc_url: rpc_url.into(),
        }
    }
}

/// EIP-1559 fee parameters for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    /// Base fee of the latest block
    pub base_fee: u128,
    /// Tip offered to the block producer
    pub max_priority_fee_per_gas: u128,
    /// base_fee + max_priority_fee_per_gas
    pub max_fee_per_gas: u128,
}

impl FeeQuote {
    pub fn new(base_fee: u128, max_priority_fee_per_gas: u128) -> Self {
        Self {
            base_fee,
            max_priority_fee_per_gas,
            max_fee_per_gas: base_fee.saturating_add(max_priority_fee_per_gas),
        }
    }

    /// Worst-case cost of a transaction with the given gas limit.
    pub fn max_cost(&self, gas_limit: u64) -> U256 {
        U256::from(gas_limit) * U256::from(self.max_fee_per_gas)
    }
}

/// Subset of a transaction receipt the relay cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub tx_hash: TxHash,
    /// Block number where the transaction was included
    pub block_number: Option<u64>,
    /// Gas actually used
    pub gas_used: u64,
    /// Whether execution succeeded (status == 1)
    pub success: bool,
}

/// Format wei (or token units) to human-readable amount.
pub fn format_amount(amount: U256, decimals: u8) -> String {
    if amount.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / divisor;
    let remainder = amount % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let decimal_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = decimal_str.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, &trimmed[..trimmed.len().min(6)])
        }
    }
}

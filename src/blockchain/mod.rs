// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain integration for relayed minting on an EVM chain.
//!
//! This module provides:
//! - JSON-RPC access behind the [`ChainClient`] trait
//! - Fee quoting and EIP-1559 signing paid by the relayer key
//! - Single-owner nonce sequencing
//! - Broadcast with bounded retries and receipt polling

pub mod client;
pub mod contract;
pub mod gas;
pub mod nonce;
pub mod signing;
pub mod submitter;
pub mod types;

pub use client::{AlloyChainClient, ChainClient, ChainError};
pub use gas::{GasError, GasRelayer, GasSettings, SignedMint};
pub use nonce::NonceSequencer;
pub use signing::{generate_keypair, signer_from_hex, signer_from_pem, KeyError};
pub use submitter::{
    ChainSubmitter, Confirmation, ConfirmError, RetryPolicy, SubmitError, SubmitReceipt,
};
pub use types::*;

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Whale Vault Relay - Redemption Code Vault with Gas-Relayed Minting
//!
//! Holders present a single-use code; the service claims it atomically,
//! mints to the wallet bound to that code with gas paid by a relayer key,
//! and lets anyone verify the mint on-chain afterwards.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `blockchain` - EVM client, fee quoting, signing, nonces, submission
//! - `cli` - Command line entry points and code provisioning
//! - `redemption` - Claim/commit/release lifecycle and the lease sweep
//! - `relay` - End-to-end redemption and batch minting
//! - `storage` - Code vault (redb) and binding key vault
//! - `verification` - On-chain mint verification

pub mod api;
pub mod blockchain;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod redemption;
pub mod relay;
pub mod state;
pub mod storage;
pub mod verification;

#[cfg(test)]
pub(crate) mod test_support;

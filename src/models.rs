// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. Field names are camelCase
//! on the wire (`codeHash`, `txHash`).
//!
//! ## Model Categories
//!
//! - **Secret**: binding lookup and on-chain verification
//! - **Relay**: gas-relayed mint of a redemption code
//! - **Admin**: publisher-gated access check and batch minting

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::Role;
use crate::verification::VerifyStatus;

// =============================================================================
// Secret Models
// =============================================================================

/// Public address bound to a code. Never includes key material.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct BindingResponse {
    /// Checksummed EVM address the code mints to.
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct VerifyResponse {
    pub status: VerifyStatus,
    /// Role granted by the code, present only when `status` is `matched`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

// =============================================================================
// Relay Models
// =============================================================================

/// Request to redeem a code by minting to its bound address.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    /// Destination address; must equal the code's bound address.
    pub dest: String,
    /// The redemption code.
    pub code_hash: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MintStatus {
    /// Mined; the code is consumed.
    Confirmed,
    /// Broadcast but not yet resolved.
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MintResponse {
    pub tx_hash: String,
    pub status: MintStatus,
    pub role: Role,
}

// =============================================================================
// Admin Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CheckAccessResponse {
    pub ok: bool,
    pub role: Role,
}

/// Request to run a batch of relayer self-mints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchMintRequest {
    /// A publisher code authorizing the batch (not consumed).
    pub code_hash: String,
    /// Number of mint transactions.
    pub count: u64,
    /// Maximum transactions in flight at once.
    pub concurrency: usize,
    /// Tokens per transaction (defaults to the configured quantity).
    #[serde(default)]
    pub quantity: Option<u64>,
}

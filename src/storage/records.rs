// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted record types for the code vault.
//!
//! A [`CodeRecord`] is the single source of truth for one redemption code:
//! its role, its lifecycle state, the wallet it is bound to and, while a
//! redemption is in flight, the claim lease. A [`MintJob`] archives the most
//! recent relayed mint attempt for a code.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use k256::elliptic_curve::rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Length of a hex-encoded code hash (32 random bytes).
pub const CODE_HASH_HEX_LEN: usize = 64;

// =============================================================================
// Role / State
// =============================================================================

/// Role a code grants to its holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Author,
    Publisher,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Reader, Role::Author, Role::Publisher];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Author => "author",
            Role::Publisher => "publisher",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reader" => Ok(Role::Reader),
            "author" => Ok(Role::Author),
            "publisher" => Ok(Role::Publisher),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

/// Lifecycle state of a code.
///
/// `Available -> Claimed -> Consumed` is the only forward path. `Claimed` is
/// a leased lock and falls back to `Available` on failure or lease expiry.
/// `Consumed` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CodeState {
    Available,
    Claimed,
    Consumed,
    Expired,
}

impl fmt::Display for CodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CodeState::Available => "available",
            CodeState::Claimed => "claimed",
            CodeState::Consumed => "consumed",
            CodeState::Expired => "expired",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Claim lease
// =============================================================================

/// Opaque proof of ownership of an active claim.
///
/// Returned by `try_claim` and required by `commit_consumed` and
/// `release_claim`, so a stale claimant can never finalize someone else's
/// attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimToken(Uuid);

impl ClaimToken {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time-bounded lock held on a code during an in-flight redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimLease {
    pub token: ClaimToken,
    pub claimed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ClaimLease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// =============================================================================
// Code record
// =============================================================================

/// Public half of the wallet pre-provisioned for a code.
///
/// Key material is never stored here; `key_ref` names the entry in the
/// separate key vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WalletBinding {
    /// Checksummed EVM address
    pub address: String,
    /// Opaque reference into the key vault
    pub key_ref: String,
}

/// Persisted state of one redemption code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRecord {
    pub code_hash: String,
    pub role: Role,
    pub state: CodeState,
    pub binding: WalletBinding,
    /// Active lease, present only while `state == Claimed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease: Option<ClaimLease>,
    /// Optional hard expiry after which the code can no longer be claimed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<DateTime<Utc>>,
}

impl CodeRecord {
    pub fn new(
        code_hash: String,
        role: Role,
        binding: WalletBinding,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            code_hash,
            role,
            state: CodeState::Available,
            binding,
            lease: None,
            expires_at,
            created_at: now,
            updated_at: now,
            consumed_at: None,
        }
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

// =============================================================================
// Mint job
// =============================================================================

/// Status of a relayed mint attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MintJobStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

/// Record of the latest relayed mint for a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintJob {
    pub code_hash: String,
    pub dest_address: String,
    pub nonce: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub status: MintJobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MintJob {
    pub fn new_pending(code_hash: &str, dest_address: String, nonce: u64) -> Self {
        let now = Utc::now();
        Self {
            code_hash: code_hash.to_string(),
            dest_address,
            nonce,
            tx_hash: None,
            status: MintJobStatus::Pending,
            block_number: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_submitted(&mut self, tx_hash: String) {
        self.tx_hash = Some(tx_hash);
        self.status = MintJobStatus::Submitted;
        self.updated_at = Utc::now();
    }

    pub fn mark_confirmed(&mut self, block_number: Option<u64>) {
        self.status = MintJobStatus::Confirmed;
        self.block_number = block_number;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = MintJobStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// Code hash helpers
// =============================================================================

/// Generate a fresh code hash from the OS CSPRNG.
pub fn generate_code_hash() -> String {
    let mut bytes = [0u8; CODE_HASH_HEX_LEN / 2];
    OsRng.fill_bytes(&mut bytes);
    alloy::hex::encode(bytes)
}

/// Canonicalize a user-supplied code hash.
///
/// Accepts an optional `0x` prefix and any letter case; returns `None` for
/// anything that is not exactly 32 hex-encoded bytes.
pub fn normalize_code_hash(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex.len() != CODE_HASH_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(hex.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_hashes_are_canonical_and_distinct() {
        let a = generate_code_hash();
        let b = generate_code_hash();
        assert_eq!(a.len(), CODE_HASH_HEX_LEN);
        assert_eq!(normalize_code_hash(&a).as_deref(), Some(a.as_str()));
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_accepts_prefix_and_case() {
        let hash = "AB".repeat(32);
        let expected = "ab".repeat(32);
        assert_eq!(normalize_code_hash(&hash).as_deref(), Some(expected.as_str()));
        assert_eq!(
            normalize_code_hash(&format!("  0x{hash} ")).as_deref(),
            Some(expected.as_str())
        );
    }

    #[test]
    fn normalize_rejects_malformed() {
        assert!(normalize_code_hash("").is_none());
        assert!(normalize_code_hash("abc").is_none());
        assert!(normalize_code_hash(&"zz".repeat(32)).is_none());
        assert!(normalize_code_hash(&"a".repeat(65)).is_none());
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Publisher".parse::<Role>().unwrap(), Role::Publisher);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn past_expiry_only_when_deadline_set() {
        let binding = WalletBinding {
            address: "0x0000000000000000000000000000000000000001".to_string(),
            key_ref: Uuid::new_v4().to_string(),
        };
        let mut record = CodeRecord::new(generate_code_hash(), Role::Reader, binding, None);
        assert!(!record.is_past_expiry(Utc::now()));

        record.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(record.is_past_expiry(Utc::now()));
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Code vault backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `codes`: code_hash → serialized [`CodeRecord`] (state, role, binding, lease)
//! - `available_by_role`: multimap role → code_hash, derived from `codes`
//! - `claims`: code_hash → lease expiry (unix millis) for every Claimed code
//! - `mint_jobs`: code_hash → serialized [`MintJob`] (latest attempt)
//!
//! ## Atomicity
//!
//! redb admits one write transaction at a time. Every state change reads the
//! record, checks the guard and writes the result (plus the derived indexes)
//! inside a single write transaction, which gives compare-and-swap semantics
//! per code without any in-process lock.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use redb::{
    Database, MultimapTableDefinition, ReadableDatabase, ReadableTable,
    TableDefinition, WriteTransaction,
};

use super::key_vault::{KeyVault, KeyVaultError};
use super::records::{
    generate_code_hash, ClaimLease, ClaimToken, CodeRecord, CodeState, MintJob, Role,
    WalletBinding,
};

// =============================================================================
// Table Definitions
// =============================================================================

const CODES: TableDefinition<&str, &[u8]> = TableDefinition::new("codes");

const AVAILABLE_BY_ROLE: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("available_by_role");

const CLAIMS: TableDefinition<&str, i64> = TableDefinition::new("claims");

const MINT_JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("mint_jobs");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("code not found: {0}")]
    NotFound(String),

    #[error("code already exists: {0}")]
    AlreadyExists(String),

    #[error("code is already claimed")]
    AlreadyClaimed,

    #[error("code is not available (state: {0})")]
    NotAvailable(CodeState),

    #[error("invalid transition: cannot {action} a code in state {from}")]
    InvalidTransition {
        from: CodeState,
        action: &'static str,
    },

    #[error("claim token does not match the active claim")]
    StaleClaim,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error(transparent)]
    Keys(#[from] KeyVaultError),
}

macro_rules! unavailable_from {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for VaultError {
                fn from(e: $err) -> Self {
                    VaultError::Unavailable(e.to_string())
                }
            }
        )*
    };
}

unavailable_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

pub type VaultResult<T> = Result<T, VaultError>;

// =============================================================================
// VaultStore
// =============================================================================

/// Durable store of codes, bindings, role pools and mint jobs.
pub struct VaultStore {
    db: Database,
}

impl VaultStore {
    /// Open (or create) the vault database at the given path.
    pub fn open(path: &Path) -> VaultResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VaultError::Unavailable(format!("create {}: {e}", parent.display())))?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CODES)?;
            let _ = write_txn.open_multimap_table(AVAILABLE_BY_ROLE)?;
            let _ = write_txn.open_table(CLAIMS)?;
            let _ = write_txn.open_table(MINT_JOBS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Cheap read probe used by the health endpoint.
    pub fn health_check(&self) -> VaultResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(CODES)?;
        Ok(())
    }

    // =========================================================================
    // Provisioning
    // =========================================================================

    /// Create a fresh code bound to a newly generated wallet.
    pub fn provision(
        &self,
        keys: &KeyVault,
        role: Role,
        expires_at: Option<DateTime<Utc>>,
    ) -> VaultResult<CodeRecord> {
        self.provision_as(keys, generate_code_hash(), role, expires_at)
    }

    fn provision_as(
        &self,
        keys: &KeyVault,
        code_hash: String,
        role: Role,
        expires_at: Option<DateTime<Utc>>,
    ) -> VaultResult<CodeRecord> {
        let (key_ref, address) = keys.generate_binding()?;
        let binding = WalletBinding {
            address: address.to_checksum(None),
            key_ref,
        };
        let record = CodeRecord::new(code_hash, role, binding, expires_at);
        if let Err(e) = self.insert_record(&record) {
            if let Err(cleanup) = keys.remove(&record.binding.key_ref) {
                tracing::warn!(
                    key_ref = %record.binding.key_ref,
                    error = %cleanup,
                    "Failed to remove key of unprovisioned code"
                );
            }
            return Err(e);
        }
        tracing::info!(code_hash = %record.code_hash, role = %role, "Provisioned code");
        Ok(record)
    }

    /// Insert a new record. Existing codes are never overwritten.
    pub fn insert_record(&self, record: &CodeRecord) -> VaultResult<()> {
        let json = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        let outcome = (|| -> VaultResult<()> {
            let mut codes = write_txn.open_table(CODES)?;
            if codes.get(record.code_hash.as_str())?.is_some() {
                return Err(VaultError::AlreadyExists(record.code_hash.clone()));
            }
            codes.insert(record.code_hash.as_str(), json.as_slice())?;
            drop(codes);
            sync_indexes(&write_txn, record)
        })();
        finish(write_txn, outcome)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up a code record.
    pub fn get(&self, code_hash: &str) -> VaultResult<CodeRecord> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CODES)?;
        match table.get(code_hash)? {
            Some(value) => Ok(serde_json::from_slice(value.value())?),
            None => Err(VaultError::NotFound(code_hash.to_string())),
        }
    }

    /// Look up the wallet binding of a code.
    pub fn get_binding(&self, code_hash: &str) -> VaultResult<WalletBinding> {
        self.get(code_hash).map(|record| record.binding)
    }

    pub fn role_of(&self, code_hash: &str) -> VaultResult<Role> {
        self.get(code_hash).map(|record| record.role)
    }

    /// All currently available codes of a role.
    pub fn available_in_role(&self, role: Role) -> VaultResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_multimap_table(AVAILABLE_BY_ROLE)?;
        let mut codes = Vec::new();
        for entry in table.get(role.as_str())? {
            codes.push(entry?.value().to_string());
        }
        Ok(codes)
    }

    pub fn is_available_in_role(&self, role: Role, code_hash: &str) -> VaultResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_multimap_table(AVAILABLE_BY_ROLE)?;
        for entry in table.get(role.as_str())? {
            if entry?.value() == code_hash {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Codes whose claim lease has run out at `now`.
    pub fn expired_claims(&self, now: DateTime<Utc>) -> VaultResult<Vec<String>> {
        let cutoff = now.timestamp_millis();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CLAIMS)?;
        let mut expired = Vec::new();
        for entry in table.iter()? {
            let (code_hash, expires_at) = entry?;
            if expires_at.value() <= cutoff {
                expired.push(code_hash.value().to_string());
            }
        }
        Ok(expired)
    }

    // =========================================================================
    // State transitions
    // =========================================================================

    /// Atomically move a code from Available to Claimed.
    pub fn try_claim(&self, code_hash: &str, lease_for: Duration) -> VaultResult<ClaimLease> {
        self.try_claim_at(code_hash, lease_for, Utc::now())
    }

    /// [`Self::try_claim`] with an explicit clock.
    pub fn try_claim_at(
        &self,
        code_hash: &str,
        lease_for: Duration,
        now: DateTime<Utc>,
    ) -> VaultResult<ClaimLease> {
        let claimed = self.transition(code_hash, |record| match record.state {
            CodeState::Available if record.is_past_expiry(now) => {
                record.state = CodeState::Expired;
                Ok(None)
            }
            CodeState::Available => {
                let lease = ClaimLease {
                    token: ClaimToken::generate(),
                    claimed_at: now,
                    expires_at: now + lease_for,
                };
                record.state = CodeState::Claimed;
                record.lease = Some(lease.clone());
                Ok(Some(lease))
            }
            CodeState::Claimed => Err(VaultError::AlreadyClaimed),
            other => Err(VaultError::NotAvailable(other)),
        })?;

        claimed.ok_or(VaultError::NotAvailable(CodeState::Expired))
    }

    /// Claimed → Consumed, only for the holder of the active claim.
    pub fn commit_consumed(&self, code_hash: &str, token: ClaimToken) -> VaultResult<CodeRecord> {
        self.transition(code_hash, |record| {
            check_claim(record, token, "consume")?;
            let now = Utc::now();
            record.state = CodeState::Consumed;
            record.lease = None;
            record.consumed_at = Some(now);
            Ok(record.clone())
        })
    }

    /// Claimed → Available, only for the holder of the active claim.
    pub fn release_claim(&self, code_hash: &str, token: ClaimToken) -> VaultResult<CodeRecord> {
        self.transition(code_hash, |record| {
            check_claim(record, token, "release")?;
            record.state = CodeState::Available;
            record.lease = None;
            Ok(record.clone())
        })
    }

    /// Claimed → Available for a lease that has run out at `now`.
    ///
    /// Returns `false` (and writes nothing) if the code is no longer
    /// claimed or its lease is still live, so a sweep never steals a fresh
    /// claim.
    pub fn expire_claim(&self, code_hash: &str, now: DateTime<Utc>) -> VaultResult<bool> {
        let write_txn = self.db.begin_write()?;
        let outcome = (|| -> VaultResult<bool> {
            let mut codes = write_txn.open_table(CODES)?;
            let existing = match codes.get(code_hash)? {
                Some(value) => value.value().to_vec(),
                None => return Err(VaultError::NotFound(code_hash.to_string())),
            };
            let mut record: CodeRecord = serde_json::from_slice(&existing)?;

            let lapsed = record.state == CodeState::Claimed
                && record.lease.as_ref().is_none_or(|lease| lease.is_expired(now));
            if !lapsed {
                return Ok(false);
            }

            record.state = CodeState::Available;
            record.lease = None;
            record.updated_at = Utc::now();
            let json = serde_json::to_vec(&record)?;
            codes.insert(code_hash, json.as_slice())?;
            drop(codes);

            sync_indexes(&write_txn, &record)?;
            Ok(true)
        })();
        finish(write_txn, outcome)
    }

    // =========================================================================
    // Mint jobs
    // =========================================================================

    /// Persist the latest mint job of a code (replaces the previous one).
    pub fn record_mint_job(&self, job: &MintJob) -> VaultResult<()> {
        let json = serde_json::to_vec(job)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(MINT_JOBS)?;
            table.insert(job.code_hash.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn mint_job(&self, code_hash: &str) -> VaultResult<Option<MintJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MINT_JOBS)?;
        match table.get(code_hash)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Read-check-write a single record inside one write transaction.
    ///
    /// The transaction is committed only when `apply` succeeds; on error it
    /// is aborted and nothing is written.
    fn transition<T, F>(&self, code_hash: &str, apply: F) -> VaultResult<T>
    where
        F: FnOnce(&mut CodeRecord) -> VaultResult<T>,
    {
        let write_txn = self.db.begin_write()?;
        let outcome = (|| -> VaultResult<T> {
            let mut codes = write_txn.open_table(CODES)?;
            let existing = {
                let value = codes
                    .get(code_hash)?
                    .ok_or_else(|| VaultError::NotFound(code_hash.to_string()))?;
                value.value().to_vec()
            };

            let mut record: CodeRecord = serde_json::from_slice(&existing)?;
            let result = apply(&mut record)?;
            record.updated_at = Utc::now();

            let json = serde_json::to_vec(&record)?;
            codes.insert(code_hash, json.as_slice())?;
            drop(codes);

            sync_indexes(&write_txn, &record)?;
            Ok(result)
        })();
        finish(write_txn, outcome)
    }
}

fn check_claim(record: &CodeRecord, token: ClaimToken, action: &'static str) -> VaultResult<()> {
    if record.state != CodeState::Claimed {
        return Err(VaultError::InvalidTransition {
            from: record.state,
            action,
        });
    }
    match &record.lease {
        Some(lease) if lease.token == token => Ok(()),
        _ => Err(VaultError::StaleClaim),
    }
}

/// Keep the derived role pool and claim index in step with `record`.
fn sync_indexes(txn: &WriteTransaction, record: &CodeRecord) -> VaultResult<()> {
    let code_hash = record.code_hash.as_str();

    let mut available = txn.open_multimap_table(AVAILABLE_BY_ROLE)?;
    if record.state == CodeState::Available {
        available.insert(record.role.as_str(), code_hash)?;
    } else {
        available.remove(record.role.as_str(), code_hash)?;
    }

    let mut claims = txn.open_table(CLAIMS)?;
    match (&record.state, &record.lease) {
        (CodeState::Claimed, Some(lease)) => {
            claims.insert(code_hash, lease.expires_at.timestamp_millis())?;
        }
        _ => {
            claims.remove(code_hash)?;
        }
    }
    Ok(())
}

fn finish<T>(write_txn: WriteTransaction, outcome: VaultResult<T>) -> VaultResult<T> {
    match outcome {
        Ok(value) => {
            write_txn.commit()?;
            Ok(value)
        }
        Err(e) => {
            write_txn.abort()?;
            Err(e)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

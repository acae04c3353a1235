// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Vault Storage Module
//!
//! Persistent state of the redemption code vault.
//!
//! ## Storage Layout
//!
//! ```text
//! <DATA_DIR>/
//!   vault.redb        # Codes, role pools, claim leases, mint jobs
//!   keys/
//!     {key_ref}.pem   # Binding wallet keys (NEVER exposed via API)
//! ```
//!
//! ## Important Notes
//!
//! - The redb file is the single source of truth for code state; nothing
//!   caches it in memory
//! - Code records carry only public addresses; private keys stay in `keys/`

pub mod key_vault;
pub mod records;
pub mod vault_db;

pub use key_vault::{KeyVault, KeyVaultError};
pub use records::{
    generate_code_hash, normalize_code_hash, ClaimLease, ClaimToken, CodeRecord, CodeState,
    MintJob, MintJobStatus, Role, WalletBinding,
};
pub use vault_db::{VaultError, VaultResult, VaultStore};

/// File name of the vault database inside `DATA_DIR`.
pub const VAULT_DB_FILE: &str = "vault.redb";

/// Directory name of the key vault inside `DATA_DIR`.
pub const KEYS_DIR: &str = "keys";

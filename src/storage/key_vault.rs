// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! File-backed custody for binding wallet keys.
//!
//! Code records only carry a binding's public address and an opaque
//! `key_ref`. The private key lives here, one PEM file per reference:
//!
//! ```text
//! <DATA_DIR>/keys/
//!   {key_ref}.pem
//! ```
//!
//! Key material is never returned through the HTTP boundary.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use uuid::Uuid;

use crate::blockchain::signing::{generate_keypair, signer_from_pem, KeyError};

#[derive(Debug, thiserror::Error)]
pub enum KeyVaultError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid key reference: {0}")]
    InvalidRef(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Directory of PEM-encoded binding keys.
pub struct KeyVault {
    root: PathBuf,
}

impl KeyVault {
    /// Open (or create) the key directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, KeyVaultError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generate a new binding wallet and persist its key.
    ///
    /// Returns `(key_ref, address)`.
    pub fn generate_binding(&self) -> Result<(String, Address), KeyVaultError> {
        let (pem, address) = generate_keypair()?;
        let key_ref = Uuid::new_v4().to_string();
        self.write_pem(&key_ref, pem.as_bytes())?;
        Ok((key_ref, address))
    }

    /// Read the raw PEM bytes for a key reference.
    pub fn read_pem(&self, key_ref: &str) -> Result<Vec<u8>, KeyVaultError> {
        let path = self.key_path(key_ref)?;
        if !path.exists() {
            return Err(KeyVaultError::NotFound(key_ref.to_string()));
        }
        Ok(fs::read(path)?)
    }

    /// Load a signer for the binding wallet behind `key_ref`.
    pub fn signer(&self, key_ref: &str) -> Result<PrivateKeySigner, KeyVaultError> {
        let pem = self.read_pem(key_ref)?;
        Ok(signer_from_pem(&pem)?)
    }

    /// Delete a key that no record references.
    pub fn remove(&self, key_ref: &str) -> Result<(), KeyVaultError> {
        let path = self.key_path(key_ref)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(KeyVaultError::NotFound(key_ref.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_pem(&self, key_ref: &str, pem: &[u8]) -> Result<(), KeyVaultError> {
        let path = self.key_path(key_ref)?;
        // create_new: an existing key is never overwritten
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(pem)?;
        file.sync_all()?;
        Ok(())
    }

    fn key_path(&self, key_ref: &str) -> Result<PathBuf, KeyVaultError> {
        // References are always UUIDs, which also rules out path traversal
        let id = Uuid::parse_str(key_ref)
            .map_err(|_| KeyVaultError::InvalidRef(key_ref.to_string()))?;
        Ok(self.root.join(format!("{id}.pem")))
    }
}

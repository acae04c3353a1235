// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Command line entry points: the HTTP service and offline code provisioning.

use std::path::PathBuf;

use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};

use crate::storage::{
    CodeRecord, KeyVault, KeyVaultError, Role, VaultError, VaultStore, KEYS_DIR, VAULT_DB_FILE,
};

#[derive(Parser, Debug)]
#[command(name = "whale-vault-relay")]
#[command(about = "Redemption code vault with gas-relayed minting", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Create redemption codes bound to fresh wallets
    Provision(ProvisionArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ProvisionArgs {
    /// Role granted by the new codes (reader, author, publisher)
    #[arg(long)]
    pub role: Role,

    /// Number of codes to create
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..=10_000))]
    pub count: u32,

    /// Days until the codes expire; omit for no expiry
    #[arg(long)]
    pub expires_in_days: Option<u32>,

    /// Vault data directory
    #[arg(long, env = "DATA_DIR", default_value = "/data")]
    pub data_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Keys(#[from] KeyVaultError),
}

/// Provision `args.count` codes into the vault under `args.data_dir`.
pub fn provision(args: &ProvisionArgs) -> Result<Vec<CodeRecord>, ProvisionError> {
    let store = VaultStore::open(&args.data_dir.join(VAULT_DB_FILE))?;
    let keys = KeyVault::open(args.data_dir.join(KEYS_DIR))?;
    let expires_at = args
        .expires_in_days
        .map(|days| Utc::now() + Duration::days(i64::from(days)));

    let records = (0..args.count)
        .map(|_| store.provision(&keys, args.role, expires_at))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(
        role = %args.role,
        count = records.len(),
        data_dir = %args.data_dir.display(),
        "Provisioning finished"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CodeState;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["whale-vault-relay"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn provision_args_parse() {
        let cli = Cli::try_parse_from([
            "whale-vault-relay",
            "provision",
            "--role",
            "publisher",
            "--count",
            "3",
            "--data-dir",
            "/tmp/vault",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Provision(args)) => {
                assert_eq!(args.role, Role::Publisher);
                assert_eq!(args.count, 3);
                assert_eq!(args.expires_in_days, None);
                assert_eq!(args.data_dir, PathBuf::from("/tmp/vault"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn zero_count_and_unknown_role_are_rejected() {
        assert!(Cli::try_parse_from([
            "whale-vault-relay",
            "provision",
            "--role",
            "reader",
            "--count",
            "0",
        ])
        .is_err());
        assert!(Cli::try_parse_from(["whale-vault-relay", "provision", "--role", "editor"]).is_err());
    }

    #[test]
    fn provision_writes_codes_and_keys() {
        let dir = tempfile::tempdir().unwrap();
        let args = ProvisionArgs {
            role: Role::Author,
            count: 3,
            expires_in_days: Some(30),
            data_dir: dir.path().to_path_buf(),
        };

        let records = provision(&args).unwrap();
        assert_eq!(records.len(), 3);

        let store = VaultStore::open(&dir.path().join(VAULT_DB_FILE)).unwrap();
        let keys = KeyVault::open(dir.path().join(KEYS_DIR)).unwrap();
        assert_eq!(store.available_in_role(Role::Author).unwrap().len(), 3);
        for record in &records {
            let stored = store.get(&record.code_hash).unwrap();
            assert_eq!(stored.state, CodeState::Available);
            assert!(stored.expires_at.is_some());

            let signer = keys.signer(&record.binding.key_ref).unwrap();
            assert_eq!(signer.address().to_checksum(None), record.binding.address);
        }
    }
}

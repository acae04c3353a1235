// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use alloy::primitives::{Address, U256};

use crate::blockchain::{
    ChainClient, ChainError, ChainSubmitter, GasError, GasRelayer, GasSettings, NonceSequencer,
    RetryPolicy,
};
use crate::config::{ConfigError, RelayConfig};
use crate::redemption::{LeaseSweeper, RedemptionStateMachine};
use crate::relay::{BatchMinter, RelayOrchestrator, RelaySettings};
use crate::storage::{VaultError, VaultStore, VAULT_DB_FILE};
use crate::verification::VerificationService;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("vault store: {0}")]
    Vault(#[from] VaultError),

    #[error("chain client: {0}")]
    Chain(#[from] ChainError),

    #[error("gas relayer: {0}")]
    Gas(#[from] GasError),
}

/// Chain-facing components shared by every request.
pub struct RelayParts {
    pub store: Arc<VaultStore>,
    pub chain: Arc<dyn ChainClient>,
    pub gas: Arc<GasRelayer>,
    pub nonces: Arc<NonceSequencer>,
    pub submitter: Arc<ChainSubmitter>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<VaultStore>,
    pub chain: Arc<dyn ChainClient>,
    pub machine: Arc<RedemptionStateMachine>,
    pub orchestrator: RelayOrchestrator,
    pub batch: BatchMinter,
    pub verifier: Arc<VerificationService>,
    pub chain_id: u64,
    pub relayer: Address,
    pub mint_quantity: U256,
}

impl AppState {
    pub fn new(parts: RelayParts, claim_lease: chrono::Duration, relay: RelaySettings) -> Self {
        let RelayParts {
            store,
            chain,
            gas,
            nonces,
            submitter,
        } = parts;

        let settings = gas.settings().clone();
        let machine = Arc::new(RedemptionStateMachine::new(
            store.clone(),
            chain.clone(),
            claim_lease,
        ));
        let orchestrator = RelayOrchestrator::new(
            machine.clone(),
            gas.clone(),
            nonces.clone(),
            submitter.clone(),
            relay,
        );
        let batch = BatchMinter::new(gas.clone(), nonces, submitter);
        let verifier = Arc::new(VerificationService::new(
            store.clone(),
            chain.clone(),
            settings.contract,
        ));

        Self {
            store,
            chain,
            machine,
            orchestrator,
            batch,
            verifier,
            chain_id: settings.chain_id,
            relayer: gas.address(),
            mint_quantity: relay.quantity,
        }
    }

    /// Open the vault and connect to the chain described by `config`.
    pub async fn from_config(
        config: &RelayConfig,
        chain: Arc<dyn ChainClient>,
    ) -> Result<Self, StartupError> {
        let store = Arc::new(VaultStore::open(&config.data_dir.join(VAULT_DB_FILE))?);
        store.health_check()?;

        let signer = config.relayer_key.signer()?;
        let gas = GasRelayer::connect(
            chain.clone(),
            signer,
            GasSettings {
                chain_id: config.network.chain_id,
                contract: config.contract,
                gas_limit: config.gas_limit,
                priority_fee_margin: config.priority_fee_margin,
                mint_value: config.mint_value,
            },
        )
        .await?;
        let nonces = NonceSequencer::seed(chain.clone(), gas.address()).await?;

        let submit_policy = RetryPolicy {
            max_attempts: config.submit_max_attempts,
            ..RetryPolicy::default()
        };
        let confirm_policy = RetryPolicy {
            max_attempts: config.confirm_max_polls,
            ..RetryPolicy::default()
        };
        let submitter = ChainSubmitter::new(chain.clone(), submit_policy, confirm_policy);

        let claim_lease = chrono::Duration::from_std(config.claim_lease).map_err(|e| {
            ConfigError::Invalid {
                var: crate::config::CLAIM_LEASE_SECS_ENV,
                message: e.to_string(),
            }
        })?;

        Ok(Self::new(
            RelayParts {
                store,
                chain,
                gas: Arc::new(gas),
                nonces: Arc::new(nonces),
                submitter: Arc::new(submitter),
            },
            claim_lease,
            RelaySettings {
                quantity: config.mint_quantity,
                deadline: config.redeem_deadline,
            },
        ))
    }

    pub fn lease_sweeper(&self, interval: std::time::Duration) -> LeaseSweeper {
        LeaseSweeper::new(self.machine.clone(), interval)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use whale_vault_relay::{
    api::router,
    blockchain::{AlloyChainClient, ChainClient},
    cli::{self, Cli, Command, ProvisionArgs},
    config::{LogFormat, RelayConfig, LOG_FORMAT_ENV},
    logging,
    state::AppState,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Provision(args)) => run_provision(args),
        Some(Command::Serve) | None => serve().await,
    }
}

fn run_provision(args: ProvisionArgs) {
    let format = std::env::var(LOG_FORMAT_ENV)
        .ok()
        .and_then(|raw| raw.parse::<LogFormat>().ok())
        .unwrap_or_default();
    logging::init(format);

    let records = cli::provision(&args).expect("Failed to provision codes");
    for record in records {
        println!("{} {} {}", record.code_hash, record.binding.address, record.role);
    }
}

async fn serve() {
    let config = RelayConfig::from_env().expect("Invalid configuration");
    logging::init(config.log_format);

    info!(
        network = %config.network.name,
        chain_id = config.network.chain_id,
        contract = %config.contract,
        data_dir = %config.data_dir.display(),
        "Starting Whale Vault relay"
    );

    let chain: Arc<dyn ChainClient> = Arc::new(
        AlloyChainClient::new(config.network.clone(), config.rpc_timeout)
            .expect("Invalid RPC endpoint"),
    );
    let state = AppState::from_config(&config, chain)
        .await
        .expect("Failed to initialize relay");

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(
        state
            .lease_sweeper(config.sweep_interval)
            .run(shutdown.clone()),
    );

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .expect("Failed to bind listener");
    info!(addr = %config.bind_addr(), "Whale Vault relay listening (docs at /docs)");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await
        .expect("HTTP server failed");

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Lease sweeper task failed");
    }
}

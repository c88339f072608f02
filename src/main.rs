// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use alloy::providers::ProviderBuilder;
use tokio_util::sync::CancellationToken;

use cctp_attestor::{
    api::router,
    codec::address_to_hex,
    config::{AttestorConfig, ConfigError, KeySource},
    relay::{ChainLogSource, EventRelay, ForwardTarget, HttpAttestationSink, RelayError},
    service::{AttestationService, ServiceConfig},
    signer::{AttestationSigner, SignerError},
    state::AppState,
    storage::{AttestationDb, StoreError},
    telemetry::{init_tracing, LogFormat},
};

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("attestor key: {0}")]
    Signer(#[from] SignerError),

    #[error("attestation store: {0}")]
    Store(#[from] StoreError),

    #[error("relay: {0}")]
    Relay(#[from] RelayError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing(LogFormat::from_env());

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Attestor stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = AttestorConfig::from_env()?;

    let signer = load_signer(&config.key)?;
    tracing::info!(attestor = %address_to_hex(&signer.address()), "Attestor key loaded");

    let db_path = config.db_path();
    let store = Arc::new(AttestationDb::open(&db_path)?);
    tracing::info!(path = %db_path.display(), "Attestation database opened");

    let service = AttestationService::with_config(
        store.clone(),
        signer,
        ServiceConfig {
            call_timeout: config.call_timeout,
            ..ServiceConfig::default()
        },
    );

    let shutdown = CancellationToken::new();

    let relay_task = match &config.relay {
        Some(settings) => {
            let provider = ProviderBuilder::new().connect_http(settings.rpc_url.clone());
            let source = ChainLogSource::new(
                provider,
                settings.transporter,
                settings.start_block,
                store.clone(),
            )
            .with_poll_interval(settings.poll_interval);
            let target = match &settings.attestor_url {
                Some(url) => {
                    tracing::info!(attestor_url = %url, "Relay forwards to remote attestor");
                    ForwardTarget::Remote(HttpAttestationSink::new(url, config.call_timeout)?)
                }
                None => ForwardTarget::Local(service.clone()),
            };

            let mut relay = EventRelay::new(source, target);
            let shutdown = shutdown.clone();
            Some(tokio::spawn(async move {
                let result = relay.run(shutdown.clone()).await;
                if result.is_err() {
                    // Take the HTTP server down with the relay.
                    shutdown.cancel();
                }
                result
            }))
        }
        None => {
            tracing::info!("ETH_RPC_URL not set, event relay disabled");
            None
        }
    };

    let app = router(AppState::new(service));
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Attestor listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(task) = relay_task {
        match task.await {
            Ok(result) => result?,
            Err(e) => tracing::error!(error = %e, "Relay task panicked"),
        }
    }

    tracing::info!("Attestor stopped");
    Ok(())
}

fn load_signer(key: &KeySource) -> Result<AttestationSigner, StartupError> {
    match key {
        KeySource::Hex(hex) => Ok(AttestationSigner::from_hex(hex)?),
        KeySource::PemFile(path) => {
            let pem = std::fs::read(path)?;
            Ok(AttestationSigner::from_pem(&pem)?)
        }
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                shutdown.cancelled().await;
                return;
            }
            tracing::info!("Ctrl-C received, shutting down");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}

//! # Initialization
//!
//! Controller startup: rustls setup, tracing, metrics, the probe server,
//! the Kubernetes client, registry providers and the reconciler.

use crate::cli::LogFormat;
use crate::config::ControllerConfig;
use crate::controller::reconciler::Reconciler;
use crate::controller::scheduler::Scheduler;
use crate::observability;
use crate::provider::build_registries;
use crate::server::{start_server, ServerState};
use crate::store::KubeStore;
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Everything the watch loop and the webhook need
pub struct InitializationResult {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    pub scheduler: Scheduler<Reconciler>,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("reconciler", &self.reconciler)
            .field("server_listening", &self.server_state.is_listening())
            .finish_non_exhaustive()
    }
}

/// Install the ring crypto provider for rustls
///
/// Must run before anything opens a TLS connection or loads a certificate.
///
/// # Errors
///
/// Fails if a different provider was installed first.
pub fn install_crypto_provider() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_installed| anyhow::anyhow!("Failed to install rustls crypto provider"))
}

/// Set up the global tracing subscriber; `RUST_LOG` overrides the configured level
///
/// # Errors
///
/// Fails on an invalid filter directive or when a subscriber is already set.
pub fn init_tracing(log_level: &str, log_format: LogFormat) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .with_context(|| format!("Invalid log level '{log_level}'"))?,
    };

    let result = match log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))
}

/// Bring up everything except the watches and the webhook listener
///
/// # Errors
///
/// Fails when metrics cannot be registered, the probe server does not come
/// up, or no Kubernetes client can be built.
pub async fn initialize(config: &ControllerConfig) -> Result<InitializationResult> {
    info!("Starting Registry Secret Manager v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        registries = ?config.registries.iter().map(|kind| kind.as_str()).collect::<Vec<_>>(),
        refresh_interval_secs = config.refresh_interval.as_secs(),
        error_requeue_secs = config.error_requeue.as_secs(),
        "Configuration resolved"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let probe_port = config.probe_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(probe_port, server_state_clone).await {
            error!("Probe server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let registries = build_registries(&config.registries, &config.provider_options()).await;

    let reconciler = Arc::new(Reconciler::new(
        Arc::new(KubeStore::<Secret>::new(client.clone())),
        Arc::new(KubeStore::<ServiceAccount>::new(client.clone())),
        registries,
        config.reconciler_settings(),
    ));
    let scheduler = Scheduler::new(
        Arc::clone(&reconciler),
        config.max_concurrent_reconciliations,
    );

    info!("Controller initialized, starting webhook and watch loops...");

    Ok(InitializationResult {
        client,
        reconciler,
        scheduler,
        server_state,
    })
}

/// Wait for the probe server to bind its port
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ControllerConfig,
) -> Result<()> {
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("Probe server failed to start"));
        }

        if server_state.is_listening() {
            info!("Probe server is accepting connections");
            break;
        }

        if start_time.elapsed() > config.server_startup_timeout {
            return Err(anyhow::anyhow!(
                "Probe server failed to start within {} seconds",
                config.server_startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(config.server_poll_interval).await;
    }

    Ok(())
}

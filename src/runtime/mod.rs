//! # Runtime
//!
//! Process lifecycle: startup, the admission webhook, the watch loops and
//! shutdown.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

use crate::cli::Cli;
use crate::config::ControllerConfig;
use crate::webhook::{start_webhook_server, WebhookState};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::error;

/// Run the controller until it receives SIGINT/SIGTERM
///
/// # Errors
///
/// Fails on an invalid configuration, a failed startup step, or when the
/// admission webhook server stops.
pub async fn run(cli: Cli) -> Result<()> {
    initialization::install_crypto_provider()?;

    let config = ControllerConfig::resolve(&cli).context("Invalid configuration")?;
    initialization::init_tracing(&config.log_level, config.log_format)?;

    let init = initialization::initialize(&config).await?;

    let webhook_state = Arc::new(WebhookState::new(Arc::clone(&init.reconciler)));
    let webhook_port = config.webhook_port;
    let cert_dir = config.cert_dir.clone();
    let mut webhook = tokio::spawn(async move {
        start_webhook_server(webhook_port, cert_dir.as_deref(), webhook_state).await
    });

    let watches = watch_loop::run_watch_loop(
        init.client,
        init.scheduler,
        Arc::clone(&init.server_state),
        config.watch_restart_delay,
    );

    tokio::select! {
        result = watches => {
            webhook.abort();
            result
        }
        joined = &mut webhook => {
            init.server_state.set_ready(false);
            let result = joined.context("Admission webhook task panicked")?;
            if let Err(e) = &result {
                error!("Admission webhook stopped: {:?}", e);
            }
            result.and_then(|()| Err(anyhow::anyhow!("Admission webhook stopped unexpectedly")))
        }
    }
}

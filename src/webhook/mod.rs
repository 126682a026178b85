//! # Admission Webhook
//!
//! Mutating admission webhook that attaches the registry secret to
//! ServiceAccounts as they are created or updated.
//!
//! Served over HTTPS with the certificate pair from the configured cert dir,
//! or over plain HTTP when none is configured (local development only, the
//! API server refuses plain HTTP webhooks).

pub mod service_account;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::{routing::post, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::constants::{TLS_CERT_FILE, TLS_KEY_FILE};
use crate::controller::reconciler::Reconciler;

/// Shared state for webhook handlers
#[derive(Debug, Clone)]
pub struct WebhookState {
    pub reconciler: Arc<Reconciler>,
}

impl WebhookState {
    #[must_use]
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }
}

/// Create the webhook router
///
/// - POST /mutate - Mutate ServiceAccounts
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate", post(service_account::mutate_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the webhook until the listener fails
///
/// # Errors
///
/// Fails when the certificate pair cannot be loaded or the port cannot be
/// bound.
pub async fn start_webhook_server(
    port: u16,
    cert_dir: Option<&Path>,
    state: Arc<WebhookState>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = webhook_router(state);

    match cert_dir {
        Some(dir) => {
            let cert = dir.join(TLS_CERT_FILE);
            let key = dir.join(TLS_KEY_FILE);
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(&cert, &key)
                .await
                .with_context(|| {
                    format!(
                        "Failed to load webhook certificate {} and key {}",
                        cert.display(),
                        key.display()
                    )
                })?;

            info!(addr = %addr, "Starting HTTPS admission webhook");
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await
                .context("Admission webhook server failed")?;
        }
        None => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind admission webhook to {addr}"))?;

            info!(addr = %addr, "Starting plain HTTP admission webhook (no cert dir configured)");
            axum::serve(listener, app)
                .await
                .context("Admission webhook server failed")?;
        }
    }

    Ok(())
}

//! # Registry Secret Manager
//!
//! Kubernetes controller that logs in to container registries, stores the
//! credentials as a `registry-secret` pull secret per namespace and attaches
//! it to every ServiceAccount.
//!
//! See the library crate for the moving parts.

use clap::Parser;
use registry_secret_manager::cli::Cli;
use registry_secret_manager::runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    runtime::run(cli).await
}

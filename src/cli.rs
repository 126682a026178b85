//! # Command Line
//!
//! Flags for the `registry-secret-manager` binary.
//!
//! Every flag can also be set through an environment variable prefixed with
//! `REGISTRY_SECRET_MANAGER_`, and most through the optional YAML config file.
//! Flags and environment variables win over the file, which wins over the
//! built-in defaults.
//!
//! ## Usage
//!
//! ```bash
//! # Manage an ECR pull secret, webhook certificates mounted at /certs
//! registry-secret-manager --registry ecr --cert-dir /certs
//!
//! # Docker Hub and ECR, debug logging as JSON
//! REGISTRY_SECRET_MANAGER_REGISTRY=docker-hub,ecr \
//!   registry-secret-manager --log-level debug --log-format json
//! ```

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Keeps container registry pull secrets fresh and attached to ServiceAccounts
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "registry-secret-manager", version, about, long_about = None)]
pub struct Cli {
    /// Registries to log in to (docker-hub, ecr); repeatable or comma separated
    #[arg(
        long = "registry",
        value_name = "NAME",
        env = "REGISTRY_SECRET_MANAGER_REGISTRY",
        value_delimiter = ','
    )]
    pub registries: Vec<String>,

    /// YAML config file (defaults to config.yml in ., the executable dir or $HOME)
    #[arg(long, value_name = "PATH", env = "REGISTRY_SECRET_MANAGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG overrides it
    #[arg(long, env = "REGISTRY_SECRET_MANAGER_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, env = "REGISTRY_SECRET_MANAGER_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Directory holding tls.crt and tls.key for the admission webhook
    #[arg(long, value_name = "DIR", env = "REGISTRY_SECRET_MANAGER_CERT_DIR")]
    pub cert_dir: Option<PathBuf>,

    /// Admission webhook port
    #[arg(long, env = "REGISTRY_SECRET_MANAGER_WEBHOOK_PORT")]
    pub webhook_port: Option<u16>,

    /// Port for /healthz, /readyz and /metrics
    #[arg(long, env = "REGISTRY_SECRET_MANAGER_PROBE_PORT")]
    pub probe_port: Option<u16>,

    /// AWS region for ECR (defaults to the AWS SDK region chain)
    #[arg(long, env = "REGISTRY_SECRET_MANAGER_AWS_REGION")]
    pub aws_region: Option<String>,

    /// Seconds between refreshes of the registry secret
    #[arg(long, env = "REGISTRY_SECRET_MANAGER_REFRESH_INTERVAL_SECS")]
    pub refresh_interval_secs: Option<u64>,

    /// Seconds to wait before retrying a failed reconciliation
    #[arg(long, env = "REGISTRY_SECRET_MANAGER_ERROR_REQUEUE_SECS")]
    pub error_requeue_secs: Option<u64>,

    /// Upper bound in seconds for a registry login or cluster API call
    #[arg(long, env = "REGISTRY_SECRET_MANAGER_OPERATION_TIMEOUT_SECS")]
    pub operation_timeout_secs: Option<u64>,

    /// Seconds an admission review may wait for the registry secret before it
    /// is allowed without it
    #[arg(long, env = "REGISTRY_SECRET_MANAGER_ADMISSION_TIMEOUT_SECS")]
    pub admission_timeout_secs: Option<u64>,

    /// Maximum number of reconciliations running at once
    #[arg(long, env = "REGISTRY_SECRET_MANAGER_MAX_CONCURRENT_RECONCILIATIONS")]
    pub max_concurrent_reconciliations: Option<usize>,
}

//! # Controller Configuration
//!
//! Resolved process configuration.
//!
//! Sources, highest precedence first:
//! 1. Command line flags and their `REGISTRY_SECRET_MANAGER_*` environment variables
//! 2. The YAML config file (`--config`, or `config.yml` found by [`file::search_paths`])
//! 3. Built-in defaults
//!
//! The resolved value is validated once at startup; any [`ConfigurationError`]
//! is fatal before a single watch starts.

pub mod file;

pub use file::FileConfig;

use crate::cli::{Cli, LogFormat};
use crate::constants::{
    DEFAULT_ADMISSION_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_RECONCILIATIONS, DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_PROBE_PORT,
    DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, DEFAULT_REFRESH_INTERVAL_SECS,
    DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
    DEFAULT_WATCH_RESTART_DELAY_SECS, DEFAULT_WEBHOOK_PORT, MAX_ADMISSION_TIMEOUT_SECS,
};
use crate::controller::reconciler::ReconcilerSettings;
use crate::provider::{ProviderOptions, RegistryKind};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("at least one registry must be defined")]
    NoRegistries,

    #[error("unknown registry {0} (expected one of: docker-hub, ecr)")]
    UnknownRegistry(String),

    #[error("invalid {setting}: {reason}")]
    InvalidSetting {
        setting: &'static str,
        reason: String,
    },

    #[error("failed to read config file {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Controller-level configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Enabled registries, in login order
    pub registries: Vec<RegistryKind>,
    /// Default tracing filter level
    pub log_level: String,
    pub log_format: LogFormat,
    /// Webhook certificate directory; plain HTTP when unset
    pub cert_dir: Option<PathBuf>,
    pub webhook_port: u16,
    pub probe_port: u16,
    pub aws_region: Option<String>,
    /// How often the registry secret is rewritten with fresh credentials
    pub refresh_interval: Duration,
    /// Fixed delay before retrying a failed reconciliation
    pub error_requeue: Duration,
    /// Bound for each registry login and cluster API call
    pub operation_timeout: Duration,
    /// Deadline for ensuring the registry secret during admission
    pub admission_timeout: Duration,
    pub max_concurrent_reconciliations: usize,
    /// How long to wait for the probe server to come up
    pub server_startup_timeout: Duration,
    pub server_poll_interval: Duration,
    /// Pause before restarting a watch stream after it failed or ended
    pub watch_restart_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            registries: Vec::new(),
            log_level: "warn".to_string(),
            log_format: LogFormat::Text,
            cert_dir: None,
            webhook_port: DEFAULT_WEBHOOK_PORT,
            probe_port: DEFAULT_PROBE_PORT,
            aws_region: None,
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            error_requeue: Duration::from_secs(DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS),
            operation_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
            admission_timeout: Duration::from_secs(DEFAULT_ADMISSION_TIMEOUT_SECS),
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            server_startup_timeout: Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS),
            server_poll_interval: Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS),
            watch_restart_delay: Duration::from_secs(DEFAULT_WATCH_RESTART_DELAY_SECS),
        }
    }
}

impl ControllerConfig {
    /// Resolve configuration from the command line and the config file it
    /// points to (or the first `config.yml` found), then validate it
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for an unreadable or invalid file, an
    /// unknown or missing registry, or an invalid interval.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigurationError> {
        let path = match &cli.config {
            Some(path) => Some(path.clone()),
            None => file::find_config_file(&file::search_paths()),
        };
        let file = path.as_deref().map(FileConfig::load).transpose()?;
        Self::from_sources(cli, file.unwrap_or_default())
    }

    /// Merge command line values over file values over defaults, then validate
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` when the merged configuration is invalid.
    pub fn from_sources(cli: &Cli, file: FileConfig) -> Result<Self, ConfigurationError> {
        let defaults = Self::default();

        let registry_names = if cli.registries.is_empty() {
            file.registry
        } else {
            cli.registries.clone()
        };

        let config = Self {
            registries: parse_registries(&registry_names)?,
            log_level: cli
                .log_level
                .clone()
                .or(file.log_level)
                .unwrap_or(defaults.log_level),
            log_format: cli
                .log_format
                .or(file.log_format)
                .unwrap_or(defaults.log_format),
            cert_dir: cli.cert_dir.clone().or(file.cert_dir),
            webhook_port: cli
                .webhook_port
                .or(file.webhook_port)
                .unwrap_or(defaults.webhook_port),
            probe_port: cli
                .probe_port
                .or(file.probe_port)
                .unwrap_or(defaults.probe_port),
            aws_region: cli.aws_region.clone().or(file.aws_region),
            refresh_interval: cli
                .refresh_interval_secs
                .or(file.refresh_interval_secs)
                .map_or(defaults.refresh_interval, Duration::from_secs),
            error_requeue: cli
                .error_requeue_secs
                .or(file.error_requeue_secs)
                .map_or(defaults.error_requeue, Duration::from_secs),
            operation_timeout: cli
                .operation_timeout_secs
                .or(file.operation_timeout_secs)
                .map_or(defaults.operation_timeout, Duration::from_secs),
            admission_timeout: cli
                .admission_timeout_secs
                .or(file.admission_timeout_secs)
                .map_or(defaults.admission_timeout, Duration::from_secs),
            max_concurrent_reconciliations: cli
                .max_concurrent_reconciliations
                .or(file.max_concurrent_reconciliations)
                .unwrap_or(defaults.max_concurrent_reconciliations),
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigurationError` when no registry is enabled, an interval
    /// is zero, the admission timeout is not under the API server's webhook
    /// limit, or the refresh interval is not shorter than the lifetime of
    /// an enabled registry's credentials.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.registries.is_empty() {
            return Err(ConfigurationError::NoRegistries);
        }

        for (setting, value) in [
            ("refresh interval", self.refresh_interval),
            ("error requeue interval", self.error_requeue),
            ("operation timeout", self.operation_timeout),
            ("admission timeout", self.admission_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigurationError::InvalidSetting {
                    setting,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.admission_timeout >= Duration::from_secs(MAX_ADMISSION_TIMEOUT_SECS) {
            return Err(ConfigurationError::InvalidSetting {
                setting: "admission timeout",
                reason: format!(
                    "must be shorter than the {MAX_ADMISSION_TIMEOUT_SECS}s webhook timeout limit"
                ),
            });
        }

        if self.max_concurrent_reconciliations == 0 {
            return Err(ConfigurationError::InvalidSetting {
                setting: "max concurrent reconciliations",
                reason: "must be greater than zero".to_string(),
            });
        }

        if let Some((kind, lifetime)) = self
            .registries
            .iter()
            .filter_map(|kind| kind.token_lifetime().map(|lifetime| (kind, lifetime)))
            .min_by_key(|(_, lifetime)| *lifetime)
        {
            if self.refresh_interval >= lifetime {
                return Err(ConfigurationError::InvalidSetting {
                    setting: "refresh interval",
                    reason: format!(
                        "{}s is not shorter than the {}s lifetime of {kind} credentials",
                        self.refresh_interval.as_secs(),
                        lifetime.as_secs()
                    ),
                });
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            refresh_interval: self.refresh_interval,
            error_requeue: self.error_requeue,
            operation_timeout: self.operation_timeout,
            admission_timeout: self.admission_timeout,
        }
    }

    #[must_use]
    pub fn provider_options(&self) -> ProviderOptions {
        ProviderOptions {
            aws_region: self.aws_region.clone(),
        }
    }
}

/// Parse registry names, dropping duplicates but keeping first-seen order
fn parse_registries(names: &[String]) -> Result<Vec<RegistryKind>, ConfigurationError> {
    let mut kinds = Vec::with_capacity(names.len());
    for name in names.iter().map(|name| name.trim()).filter(|name| !name.is_empty()) {
        let kind = name
            .parse::<RegistryKind>()
            .map_err(ConfigurationError::UnknownRegistry)?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(registries: &[&str]) -> Cli {
        Cli {
            registries: registries.iter().map(|r| (*r).to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_registries_is_a_configuration_error() {
        let error = ControllerConfig::from_sources(&cli(&[]), FileConfig::default()).unwrap_err();
        assert!(matches!(error, ConfigurationError::NoRegistries));
        assert_eq!(error.to_string(), "at least one registry must be defined");
    }

    #[test]
    fn test_unknown_registry_is_rejected() {
        let error =
            ControllerConfig::from_sources(&cli(&["ecr", "quay"]), FileConfig::default())
                .unwrap_err();
        assert!(matches!(error, ConfigurationError::UnknownRegistry(name) if name == "quay"));
    }

    #[test]
    fn test_registries_keep_order_without_duplicates() {
        let config = ControllerConfig::from_sources(
            &cli(&["ecr", "docker-hub", "ecr"]),
            FileConfig::default(),
        )
        .unwrap();
        assert_eq!(
            config.registries,
            [RegistryKind::Ecr, RegistryKind::DockerHub]
        );
    }

    #[test]
    fn test_command_line_wins_over_file() {
        let file = FileConfig {
            registry: vec!["docker-hub".to_string()],
            log_level: Some("debug".to_string()),
            probe_port: Some(9000),
            refresh_interval_secs: Some(600),
            ..Default::default()
        };
        let cli = Cli {
            registries: vec!["ecr".to_string()],
            refresh_interval_secs: Some(1200),
            ..Default::default()
        };

        let config = ControllerConfig::from_sources(&cli, file).unwrap();
        assert_eq!(config.registries, [RegistryKind::Ecr]);
        assert_eq!(config.refresh_interval, Duration::from_secs(1200));
        assert_eq!(config.log_level, "debug", "File fills what the command line leaves unset");
        assert_eq!(config.probe_port, 9000);
        assert_eq!(config.webhook_port, DEFAULT_WEBHOOK_PORT);
    }

    #[test]
    fn test_refresh_interval_must_undercut_token_lifetime() {
        let cli = Cli {
            registries: vec!["ecr".to_string()],
            refresh_interval_secs: Some(12 * 60 * 60),
            ..Default::default()
        };
        let error = ControllerConfig::from_sources(&cli, FileConfig::default()).unwrap_err();
        assert!(matches!(
            error,
            ConfigurationError::InvalidSetting { setting: "refresh interval", .. }
        ));

        let cli = Cli {
            registries: vec!["docker-hub".to_string()],
            refresh_interval_secs: Some(24 * 60 * 60),
            ..Default::default()
        };
        assert!(
            ControllerConfig::from_sources(&cli, FileConfig::default()).is_ok(),
            "Static credentials do not bound the interval"
        );
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let cli = Cli {
            registries: vec!["docker-hub".to_string()],
            operation_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            ControllerConfig::from_sources(&cli, FileConfig::default()),
            Err(ConfigurationError::InvalidSetting { setting: "operation timeout", .. })
        ));
    }

    #[test]
    fn test_admission_timeout_must_fit_webhook_limit() {
        let config = ControllerConfig::from_sources(&cli(&["ecr"]), FileConfig::default()).unwrap();
        assert_eq!(config.admission_timeout, Duration::from_secs(5));

        let file = FileConfig {
            admission_timeout_secs: Some(8),
            ..Default::default()
        };
        let config = ControllerConfig::from_sources(&cli(&["ecr"]), file).unwrap();
        assert_eq!(config.reconciler_settings().admission_timeout, Duration::from_secs(8));

        let cli = Cli {
            registries: vec!["ecr".to_string()],
            admission_timeout_secs: Some(30),
            ..Default::default()
        };
        assert!(matches!(
            ControllerConfig::from_sources(&cli, FileConfig::default()),
            Err(ConfigurationError::InvalidSetting { setting: "admission timeout", .. })
        ));
    }

    #[test]
    fn test_resolve_reads_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yml");
        std::fs::write(&path, "registry: [docker-hub]\nlog-format: json\n").unwrap();

        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        let config = ControllerConfig::resolve(&cli).unwrap();
        assert_eq!(config.registries, [RegistryKind::DockerHub]);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_resolve_fails_on_missing_explicit_file() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/registry-secret-manager.yml")),
            registries: vec!["ecr".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            ControllerConfig::resolve(&cli),
            Err(ConfigurationError::ReadFile { .. })
        ));
    }
}

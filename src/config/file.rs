//! # Config File
//!
//! Optional YAML file with the same settings as the command line.
//!
//! ```yaml
//! registry:
//!   - docker-hub
//!   - ecr
//! log-level: info
//! cert-dir: /certs
//! refresh-interval-secs: 7200
//! ```

use super::ConfigurationError;
use crate::cli::LogFormat;
use crate::constants::CONFIG_FILE_NAME;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(alias = "registries")]
    pub registry: Vec<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub cert_dir: Option<PathBuf>,
    pub webhook_port: Option<u16>,
    pub probe_port: Option<u16>,
    pub aws_region: Option<String>,
    pub refresh_interval_secs: Option<u64>,
    pub error_requeue_secs: Option<u64>,
    pub operation_timeout_secs: Option<u64>,
    pub admission_timeout_secs: Option<u64>,
    pub max_concurrent_reconciliations: Option<usize>,
}

impl FileConfig {
    /// Parse a config file
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is not valid YAML for this schema.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigurationError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&contents).map_err(|source| ConfigurationError::ParseFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse config file contents; an empty document yields the defaults
    ///
    /// # Errors
    ///
    /// Fails when `contents` is not valid YAML for this schema.
    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }
}

/// Directories searched for `config.yml` when no path is given: the working
/// directory, the executable's directory and `$HOME`
#[must_use]
pub fn search_paths() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }
    if let Some(home) = std::env::var_os("HOME") {
        dirs.push(PathBuf::from(home));
    }
    dirs
}

/// First `config.yml` found in `dirs`
#[must_use]
pub fn find_config_file(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kebab_case_keys() {
        let config = FileConfig::parse(
            "registry: [docker-hub, ecr]\nlog-level: debug\nlog-format: json\nrefresh-interval-secs: 600\n",
        )
        .unwrap();

        assert_eq!(config.registry, ["docker-hub", "ecr"]);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.log_format, Some(LogFormat::Json));
        assert_eq!(config.refresh_interval_secs, Some(600));
        assert_eq!(config.cert_dir, None);
    }

    #[test]
    fn test_parse_empty_document() {
        assert_eq!(FileConfig::parse("").unwrap(), FileConfig::default());
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        assert!(FileConfig::parse("registy: [ecr]\n").is_err());
    }

    #[test]
    fn test_find_config_file_prefers_earlier_dirs() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join(CONFIG_FILE_NAME), "registry: [ecr]\n").unwrap();

        let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        assert_eq!(
            find_config_file(&dirs),
            Some(second.path().join(CONFIG_FILE_NAME))
        );

        std::fs::write(first.path().join(CONFIG_FILE_NAME), "registry: [docker-hub]\n").unwrap();
        assert_eq!(
            find_config_file(&dirs),
            Some(first.path().join(CONFIG_FILE_NAME))
        );
    }
}

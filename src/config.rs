// Layered runtime configuration — §10.L.
//
// Grounded on `builders.rs`'s `StorageConfigBuilder` (validate-on-build,
// fallible `build()` rather than a panicking constructor) combined with
// this crate's `clap`(derive+env)/`config` dependencies for the
// file/env/flag layering the spec calls for. Defaults -> TOML file ->
// `KQL_SEARCH_*` environment variables -> CLI flags, each layer
// overriding the one before it.

use crate::errors::{Error, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Embedded,
    Remote,
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "embedded" => Ok(BackendKind::Embedded),
            "remote" => Ok(BackendKind::Remote),
            other => Err(Error::Validation(format!("unknown backend kind: {other}"))),
        }
    }
}

/// CLI flags, each with an env fallback under the `KQL_SEARCH_` prefix
/// via clap's `env` feature. Anything left `None` falls through to the
/// config-file/default layers in [`AppConfig::load`].
#[derive(Debug, Parser, Default)]
#[command(name = "searchcore")]
pub struct Cli {
    #[arg(long, env = "KQL_SEARCH_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    #[arg(long, env = "KQL_SEARCH_DEBOUNCE_AFTER_MS")]
    pub debounce_after_ms: Option<u64>,

    #[arg(long, env = "KQL_SEARCH_DEBOUNCE_TIMEOUT_MS")]
    pub debounce_timeout_ms: Option<u64>,

    #[arg(long, env = "KQL_SEARCH_ACTIVITYLOG_CAP")]
    pub activitylog_cap: Option<usize>,

    #[arg(long, env = "KQL_SEARCH_ACTIVITYLOG_WRITE_BUFFER_MS")]
    pub activitylog_write_buffer_ms: Option<u64>,

    #[arg(long, env = "KQL_SEARCH_PARENT_CACHE_TTL_SECS")]
    pub parent_cache_ttl_secs: Option<u64>,

    #[arg(long, env = "KQL_SEARCH_WORKER_COUNT")]
    pub worker_count: Option<usize>,

    #[arg(long, env = "KQL_SEARCH_BACKEND")]
    pub backend: Option<String>,

    #[arg(long, env = "KQL_SEARCH_REMOTE_URL")]
    pub remote_url: Option<String>,

    #[arg(long, env = "KQL_SEARCH_PAGE_SIZE_DEFAULT")]
    pub page_size_default: Option<usize>,

    #[arg(long, env = "KQL_SEARCH_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// The file-layer shape deserialized by the `config` crate from a TOML
/// document. Every field is optional: only values present in the file
/// override the built-in defaults.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    debounce_after_ms: Option<u64>,
    debounce_timeout_ms: Option<u64>,
    activitylog_cap: Option<usize>,
    activitylog_write_buffer_ms: Option<u64>,
    parent_cache_ttl_secs: Option<u64>,
    worker_count: Option<usize>,
    backend: Option<String>,
    remote_url: Option<String>,
    page_size_default: Option<usize>,
    log_level: Option<String>,
}

/// Fully resolved, validated runtime configuration. Every tunable named
/// across §§4,5,6 lands here: debounce timings, activity-log cap and
/// write buffer, parent-id cache TTL, worker pool size, backend
/// selection, and logging.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub debounce_after: Duration,
    pub debounce_timeout: Duration,
    pub activitylog_cap: usize,
    pub activitylog_write_buffer: Duration,
    pub parent_cache_ttl: Duration,
    pub worker_count: usize,
    pub backend: BackendKind,
    pub remote_url: Option<String>,
    pub page_size_default: usize,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debounce_after: crate::debounce::DEFAULT_AFTER,
            debounce_timeout: crate::debounce::DEFAULT_TIMEOUT,
            activitylog_cap: crate::activitylog::DEFAULT_CAP,
            activitylog_write_buffer: crate::activitylog::DEFAULT_WRITE_BUFFER,
            parent_cache_ttl: crate::activitylog::DEFAULT_PARENT_CACHE_TTL,
            worker_count: 4,
            backend: BackendKind::Embedded,
            remote_url: None,
            page_size_default: crate::engine::DEFAULT_PAGE_SIZE,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load the file layer (if a path is configured), then overlay CLI
    /// flags/env vars on top of the built-in defaults, and validate the
    /// result. Never panics; every failure mode returns `Err`.
    pub fn load(cli: Cli) -> Result<Self> {
        let mut config = AppConfig::default();

        if let Some(path) = &cli.config_file {
            let file_config = load_file_config(path)?;
            apply_file_config(&mut config, file_config)?;
        }

        apply_cli(&mut config, &cli)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.debounce_after >= self.debounce_timeout {
            return Err(Error::Validation(
                "debounce_after must be less than debounce_timeout".into(),
            ));
        }
        if self.activitylog_cap == 0 {
            return Err(Error::Validation("activitylog_cap must be greater than zero".into()));
        }
        if self.worker_count == 0 {
            return Err(Error::Validation("worker_count must be greater than zero".into()));
        }
        if self.backend == BackendKind::Remote && self.remote_url.is_none() {
            return Err(Error::Validation("remote backend selected but remote_url is not set".into()));
        }
        Ok(())
    }
}

fn load_file_config(path: &PathBuf) -> Result<FileConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.as_path()))
        .build()
        .map_err(|e| Error::Validation(format!("failed to load config file {}: {e}", path.display())))?;
    settings
        .try_deserialize()
        .map_err(|e| Error::Validation(format!("failed to parse config file {}: {e}", path.display())))
}

fn apply_file_config(config: &mut AppConfig, file: FileConfig) -> Result<()> {
    if let Some(v) = file.debounce_after_ms {
        config.debounce_after = Duration::from_millis(v);
    }
    if let Some(v) = file.debounce_timeout_ms {
        config.debounce_timeout = Duration::from_millis(v);
    }
    if let Some(v) = file.activitylog_cap {
        config.activitylog_cap = v;
    }
    if let Some(v) = file.activitylog_write_buffer_ms {
        config.activitylog_write_buffer = Duration::from_millis(v);
    }
    if let Some(v) = file.parent_cache_ttl_secs {
        config.parent_cache_ttl = Duration::from_secs(v);
    }
    if let Some(v) = file.worker_count {
        config.worker_count = v;
    }
    if let Some(v) = &file.backend {
        config.backend = v.parse()?;
    }
    if file.remote_url.is_some() {
        config.remote_url = file.remote_url;
    }
    if let Some(v) = file.page_size_default {
        config.page_size_default = v;
    }
    if let Some(v) = file.log_level {
        config.log_level = v;
    }
    Ok(())
}

fn apply_cli(config: &mut AppConfig, cli: &Cli) -> Result<()> {
    if let Some(v) = cli.debounce_after_ms {
        config.debounce_after = Duration::from_millis(v);
    }
    if let Some(v) = cli.debounce_timeout_ms {
        config.debounce_timeout = Duration::from_millis(v);
    }
    if let Some(v) = cli.activitylog_cap {
        config.activitylog_cap = v;
    }
    if let Some(v) = cli.activitylog_write_buffer_ms {
        config.activitylog_write_buffer = Duration::from_millis(v);
    }
    if let Some(v) = cli.parent_cache_ttl_secs {
        config.parent_cache_ttl = Duration::from_secs(v);
    }
    if let Some(v) = cli.worker_count {
        config.worker_count = v;
    }
    if let Some(v) = &cli.backend {
        config.backend = v.parse()?;
    }
    if cli.remote_url.is_some() {
        config.remote_url = cli.remote_url.clone();
    }
    if let Some(v) = cli.page_size_default {
        config.page_size_default = v;
    }
    if let Some(v) = &cli.log_level {
        config.log_level = v.clone();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cli_overrides_defaults() {
        let cli = Cli {
            worker_count: Some(8),
            backend: Some("remote".to_string()),
            remote_url: Some("https://example.invalid".to_string()),
            ..Cli::default()
        };
        let config = AppConfig::load(cli).unwrap();
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.backend, BackendKind::Remote);
    }

    #[test]
    fn rejects_after_not_less_than_timeout() {
        let cli = Cli {
            debounce_after_ms: Some(5000),
            debounce_timeout_ms: Some(1000),
            ..Cli::default()
        };
        let err = AppConfig::load(cli).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn rejects_zero_cap() {
        let cli = Cli {
            activitylog_cap: Some(0),
            ..Cli::default()
        };
        let err = AppConfig::load(cli).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn rejects_remote_backend_without_url() {
        let cli = Cli {
            backend: Some("remote".to_string()),
            ..Cli::default()
        };
        let err = AppConfig::load(cli).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn file_layer_overrides_defaults_and_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("searchcore.toml");
        std::fs::write(&path, "worker_count = 6\nactivitylog_cap = 100\n").unwrap();

        let cli = Cli {
            config_file: Some(path),
            activitylog_cap: Some(50),
            ..Cli::default()
        };
        let config = AppConfig::load(cli).unwrap();
        assert_eq!(config.worker_count, 6);
        assert_eq!(config.activitylog_cap, 50);
    }
}

// packages/engine/src/utils/config.rs
//! Engine configuration
//!
//! Layered with the `config` crate, later sources winning:
//!
//! 1. [`EngineConfig::default`]
//! 2. A TOML file: `$PROBELOG_CONFIG`, or `probelog.toml` in the working directory (optional)
//! 3. `PROBELOG__<SECTION>__<KEY>` environment variables
//!
//! `PROBELOG_DISABLE=true` is applied last and forces [`RecordingMode::Discard`].

use crate::policy::{CapturePolicy, DetailLevel};
use crate::recording::compressor::CompressionLevel;
use crate::recording::storage::StorageConfig;
use crate::utils::errors::{EngineError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming the TOML file
pub const CONFIG_PATH_ENV: &str = "PROBELOG_CONFIG";

/// Environment variable switching recording off entirely
pub const DISABLE_ENV: &str = "PROBELOG_DISABLE";

const DEFAULT_CONFIG_FILE: &str = "probelog.toml";
const ENV_PREFIX: &str = "PROBELOG";
const ENV_SEPARATOR: &str = "__";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub capture: CaptureConfig,
    pub recording: RecordingConfig,
    pub storage: StorageConfig,
    pub identity: IdentityConfig,
    pub exclusion: ExclusionConfig,
    pub logging: LoggingConfig,
}

/// Which event categories are recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Category token string, e.g. `"EXEC,CALL,OBJECT"`, `"ALL"`, `"NONE"` or `""`
    pub events: String,

    pub detail_level: DetailLevel,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            events: String::new(),
            detail_level: DetailLevel::Normal,
        }
    }
}

/// What the engine does with each observation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingMode {
    /// Observations go to a sink that drops them
    Discard,
    /// Identity-only events, never a payload
    Identity,
    /// Identity plus selective deep serialization
    #[default]
    Detailed,
}

impl RecordingMode {
    pub fn serializes_values(&self) -> bool {
        matches!(self, RecordingMode::Detailed)
    }
}

/// Recording pipeline tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub mode: RecordingMode,

    /// Upper bound on waiting for an already-running completion (milliseconds)
    pub completion_timeout_ms: u64,

    /// Events per compressed batch
    pub batch_size: usize,

    /// Background flush interval (milliseconds)
    pub flush_interval_ms: u64,

    /// Bounded writer queue capacity
    pub max_queue_size: usize,

    pub compression_level: CompressionLevel,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            mode: RecordingMode::Detailed,
            completion_timeout_ms: 100,
            batch_size: 1000,
            flush_interval_ms: 100,
            max_queue_size: 1_000_000,
            compression_level: CompressionLevel::Fast,
        }
    }
}

/// Identity store sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Live entries before dead ones are purged
    pub capacity: usize,

    /// Distinct type names remembered for latest-instance lookups
    pub type_cache_capacity: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            capacity: 1 << 16,
            type_cache_capacity: 1024,
        }
    }
}

/// Additional exclusion prefixes on top of the built-in list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionConfig {
    pub extra_prefixes: Vec<String>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl EngineConfig {
    /// Load from defaults, the optional TOML file and the process environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let env = Environment::with_prefix(ENV_PREFIX);
        let mut config = Self::load_with(Some(&path), env)?;

        config.apply_disable_switch(std::env::var(DISABLE_ENV).ok().as_deref());

        info!("Configuration loaded (mode: {:?})", config.recording.mode);
        Ok(config)
    }

    /// Load from defaults, an optional file and the given environment source
    pub fn load_with(file: Option<&Path>, env: Environment) -> Result<Self> {
        let defaults = Config::try_from(&Self::default())?;

        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = file {
            debug!("Reading configuration file {:?}", path);
            builder = builder.add_source(File::from(path).required(false));
        }

        let settings = builder
            .add_source(
                env.prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("exclusion.extra_prefixes"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Force discard mode when the disable switch reads `true` or `1`
    pub fn apply_disable_switch(&mut self, value: Option<&str>) {
        let disabled = value
            .map(|v| v.trim().eq_ignore_ascii_case("true") || v.trim() == "1")
            .unwrap_or(false);

        if disabled {
            info!("{} set, recording disabled", DISABLE_ENV);
            self.recording.mode = RecordingMode::Discard;
        }
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.recording.batch_size == 0 {
            return Err(EngineError::ConfigError(
                "recording.batch_size must be positive".to_string(),
            ));
        }
        if self.recording.max_queue_size == 0 {
            return Err(EngineError::ConfigError(
                "recording.max_queue_size must be positive".to_string(),
            ));
        }
        if self.recording.flush_interval_ms == 0 {
            return Err(EngineError::ConfigError(
                "recording.flush_interval_ms must be positive".to_string(),
            ));
        }
        if self.identity.capacity == 0 || self.identity.type_cache_capacity == 0 {
            return Err(EngineError::ConfigError(
                "identity capacities must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Capture policy derived from `capture.events` and narrowed by `capture.detail_level`
    pub fn capture_policy(&self) -> Result<CapturePolicy> {
        let narrowed =
            CapturePolicy::derive(&self.capture.events)?.narrow(self.capture.detail_level);
        if !narrowed.is_valid() {
            return Err(EngineError::InvalidPolicy(format!(
                "'{}' enables no event category at detail level {:?}",
                self.capture.events, self.capture.detail_level
            )));
        }
        Ok(narrowed)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.recording.completion_timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.recording.flush_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Category;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file() -> NamedTempFile {
        tempfile::Builder::new().suffix(".toml").tempfile().unwrap()
    }

    fn env_from(pairs: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::load_with(None, env_from(&[])).unwrap();

        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.recording.mode, RecordingMode::Detailed);
        assert_eq!(config.completion_timeout(), Duration::from_millis(100));

        let policy = config.capture_policy().unwrap();
        assert!(policy.records_object());
        assert!(!policy.records_line_number());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = toml_file();
        writeln!(
            file,
            r#"
[capture]
events = "EXEC,CALL"
detail_level = "only_entry_exit"

[recording]
mode = "identity"
batch_size = 64

[exclusion]
extra_prefixes = ["billing.gateway"]
"#
        )
        .unwrap();

        let config = EngineConfig::load_with(Some(file.path()), env_from(&[])).unwrap();

        assert_eq!(config.recording.mode, RecordingMode::Identity);
        assert_eq!(config.recording.batch_size, 64);
        assert_eq!(config.recording.completion_timeout_ms, 100);
        assert_eq!(config.exclusion.extra_prefixes, vec!["billing.gateway"]);

        let policy = config.capture_policy().unwrap();
        assert!(policy.records_execution());
        assert!(!policy.records_method_call());
        assert!(policy.is_entry_exit_only());
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = toml_file();
        writeln!(file, "[recording]\nmode = \"identity\"\nbatch_size = 64").unwrap();

        let env = env_from(&[
            ("PROBELOG__RECORDING__MODE", "detailed"),
            ("PROBELOG__RECORDING__COMPLETION_TIMEOUT_MS", "250"),
            ("PROBELOG__EXCLUSION__EXTRA_PREFIXES", "a.b,c.d"),
        ]);

        let config = EngineConfig::load_with(Some(file.path()), env).unwrap();

        assert_eq!(config.recording.mode, RecordingMode::Detailed);
        assert_eq!(config.recording.batch_size, 64);
        assert_eq!(config.recording.completion_timeout_ms, 250);
        assert_eq!(config.exclusion.extra_prefixes, vec!["a.b", "c.d"]);
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let path = Path::new("/nonexistent/probelog.toml");
        let config = EngineConfig::load_with(Some(path), env_from(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_disable_switch() {
        let mut config = EngineConfig::default();

        config.apply_disable_switch(Some("false"));
        assert_eq!(config.recording.mode, RecordingMode::Detailed);

        config.apply_disable_switch(None);
        assert_eq!(config.recording.mode, RecordingMode::Detailed);

        config.apply_disable_switch(Some("TRUE"));
        assert_eq!(config.recording.mode, RecordingMode::Discard);
    }

    #[test]
    fn test_invalid_policy_surfaces() {
        let mut config = EngineConfig::default();
        config.capture.events = "nothing useful".to_string();

        assert!(matches!(
            config.capture_policy(),
            Err(EngineError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_narrowing_to_nothing_is_invalid() {
        let mut config = EngineConfig::default();
        config.capture.events = "CALL".to_string();
        config.capture.detail_level = DetailLevel::OnlyEntryExit;

        assert!(matches!(
            config.capture_policy(),
            Err(EngineError::InvalidPolicy(_))
        ));

        config.capture.events = "EXEC+CALL".to_string();
        let policy = config.capture_policy().unwrap();
        assert!(policy.allows(Category::Exec));
        assert!(!policy.allows(Category::Call));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = EngineConfig::default();
        config.recording.batch_size = 0;
        assert!(matches!(config.validate(), Err(EngineError::ConfigError(_))));
    }
}

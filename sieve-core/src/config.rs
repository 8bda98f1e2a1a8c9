//! Configuration system for Sieve.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/sieve/config.toml` and/or `.sieve/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::ModelProfile;

/// Top-level configuration for a research pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SieveConfig {
    pub models: ModelsConfig,
    pub retry: RetryConfig,
    pub merge: MergeConfig,
    pub filter: FilterConfig,
    pub sources: Vec<SourceConfig>,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// The fast and smart completion profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub fast: ModelConfig,
    pub smart: ModelConfig,
}

impl ModelsConfig {
    /// Look up the model configuration for a profile.
    pub fn profile(&self, profile: ModelProfile) -> &ModelConfig {
        match profile {
            ModelProfile::Fast => &self.fast,
            ModelProfile::Smart => &self.smart,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            fast: ModelConfig {
                model: "gpt-3.5-turbo-16k-0613".to_string(),
                context_window: 16_385,
            },
            smart: ModelConfig {
                model: "gpt-4-0613".to_string(),
                context_window: 8_192,
            },
        }
    }
}

/// A model identifier and its context budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier passed to the completion service.
    pub model: String,
    /// Maximum tokens usable in one completion call.
    pub context_window: usize,
}

/// Retry policy for completion calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_attempts: usize,
    /// First backoff delay; doubles on every subsequent failure.
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            initial_backoff_ms: 5_000,
        }
    }
}

/// Quality gate applied to every merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Minimum fraction of the pre-merge token count a merged result must keep.
    pub min_retention: f64,
    /// Attempt ceiling for merges during deep extraction.
    pub extract_attempts: usize,
    /// Attempt ceiling for merges during consolidation and cross-source merging.
    pub consolidate_attempts: usize,
    /// Failed attempts on the fast profile before switching to the smart profile.
    pub escalate_after: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            min_retention: 0.85,
            extract_attempts: 5,
            consolidate_attempts: 3,
            escalate_after: 1,
        }
    }
}

/// Parallel filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Number of concurrent workers per filtering pass.
    pub workers: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Settings for one document source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Name matching the registered `DocumentSource`.
    pub name: String,
    /// Maximum candidates requested per search.
    pub max_results: usize,
    /// Search attempts while the source returns nothing.
    #[serde(default = "default_search_attempts")]
    pub search_attempts: usize,
    /// Delay between search attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_search_attempts() -> usize {
    5
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, max_results: usize) -> Self {
        Self {
            name: name.into(),
            max_results,
            search_attempts: default_search_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Where final answers are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub save_results: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("research"),
            save_results: true,
        }
    }
}

/// Tracing subscriber settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive for the stderr layer.
    pub level: String,
    /// Directory for daily-rolling JSON logs; disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_dir: None,
        }
    }
}

impl Default for SieveConfig {
    fn default() -> Self {
        Self {
            models: ModelsConfig::default(),
            retry: RetryConfig::default(),
            merge: MergeConfig::default(),
            filter: FilterConfig::default(),
            sources: vec![
                SourceConfig::new("web", 100),
                SourceConfig::new("encyclopedia", 10),
            ],
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SieveConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        for profile in [ModelProfile::Fast, ModelProfile::Smart] {
            let model = self.models.profile(profile);
            if model.model.trim().is_empty() {
                problems.push(format!("models.{profile}.model is empty"));
            }
            if model.context_window < 2 {
                problems.push(format!(
                    "models.{profile}.context_window must be at least 2, got {}",
                    model.context_window
                ));
            }
        }
        if self.retry.max_attempts == 0 {
            problems.push("retry.max_attempts must be at least 1".to_string());
        }
        if !(self.merge.min_retention > 0.0 && self.merge.min_retention <= 1.0) {
            problems.push(format!(
                "merge.min_retention must be in (0, 1], got {}",
                self.merge.min_retention
            ));
        }
        if self.merge.extract_attempts == 0 || self.merge.consolidate_attempts == 0 {
            problems.push("merge attempt ceilings must be at least 1".to_string());
        }
        if self.filter.workers == 0 {
            problems.push("filter.workers must be at least 1".to_string());
        }
        for source in &self.sources {
            if source.search_attempts == 0 {
                problems.push(format!(
                    "sources.{}.search_attempts must be at least 1",
                    source.name
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                message: problems.join("; "),
            })
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `SIEVE_`)
/// 3. Workspace-local config (`.sieve/config.toml`)
/// 4. User config (`~/.config/sieve/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&SieveConfig>,
) -> Result<SieveConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(SieveConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "sieve", "sieve") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".sieve").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // SIEVE_MODELS__FAST__MODEL, SIEVE_FILTER__WORKERS, ...
    figment = figment.merge(Env::prefixed("SIEVE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: SieveConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from one explicit TOML file layered over defaults.
pub fn load_config_file(path: &Path) -> Result<SieveConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let config: SieveConfig = Figment::from(Serialized::defaults(SieveConfig::default()))
        .merge(Toml::file(path))
        .extract()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
    config.validate()?;
    Ok(config)
}

/// Write a configuration as pretty TOML, creating parent directories.
///
/// The config is validated first, so a saved file always loads back through
/// [`load_config_file`].
pub fn save_config(config: &SieveConfig, path: &Path) -> crate::error::Result<()> {
    config.validate()?;
    let toml_str = toml::to_string_pretty(config).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SieveConfig::default();
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.retry.initial_backoff_ms, 5_000);
        assert_eq!(config.filter.workers, 4);
        assert_eq!(config.merge.min_retention, 0.85);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].search_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = SieveConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: SieveConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.models.fast, config.models.fast);
        assert_eq!(deserialized.sources, config.sources);
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config.filter.workers, 4);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = SieveConfig::default();
        overrides.models.smart.model = "gpt-4o".to_string();
        overrides.filter.workers = 8;

        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.models.smart.model, "gpt-4o");
        assert_eq!(config.filter.workers, 8);
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let sieve_dir = dir.path().join(".sieve");
        std::fs::create_dir_all(&sieve_dir).unwrap();
        std::fs::write(
            sieve_dir.join("config.toml"),
            r#"
[models.fast]
model = "gpt-4o-mini"
context_window = 128000

[filter]
workers = 2

[[sources]]
name = "web"
max_results = 25
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.models.fast.model, "gpt-4o-mini");
        assert_eq!(config.models.fast.context_window, 128_000);
        assert_eq!(config.filter.workers, 2);
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].max_results, 25);
        assert_eq!(config.sources[0].search_attempts, 5);
    }

    #[test]
    fn test_save_config_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sieve.toml");
        let mut config = SieveConfig::default();
        config.filter.workers = 6;
        config.models.fast.model = "gpt-4o-mini".to_string();

        save_config(&config, &path).unwrap();
        let loaded = load_config_file(&path).unwrap();
        assert_eq!(loaded.filter.workers, 6);
        assert_eq!(loaded.models.fast.model, "gpt-4o-mini");
        assert_eq!(loaded.sources, config.sources);
    }

    #[test]
    fn test_save_config_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sieve.toml");
        let mut config = SieveConfig::default();
        config.filter.workers = 0;

        assert!(save_config(&config, &path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_load_config_file_missing() {
        let err = load_config_file(Path::new("/nonexistent/sieve.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = SieveConfig::default();
        config.filter.workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("filter.workers"));
    }

    #[test]
    fn test_validate_rejects_bad_retention() {
        let mut config = SieveConfig::default();
        config.merge.min_retention = 1.5;
        assert!(config.validate().is_err());
        config.merge.min_retention = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_profile_lookup() {
        let config = SieveConfig::default();
        assert_eq!(
            config.models.profile(ModelProfile::Smart).context_window,
            8_192
        );
    }
}

//! Configuration system for the worldbook engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{WorldbookError, WorldbookResult};

/// Default number of entry evaluations allowed per `evaluate()` call.
pub const DEFAULT_MAX_ENTRY_EVALUATIONS: usize = 10_000;
/// Default wall-clock budget per `evaluate()` call.
pub const DEFAULT_TIME_BUDGET_MS: u64 = 250;
/// Default compiled size limit for user-supplied regex keys.
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 1 << 20;
/// Default ceiling applied over every book's `max_recursion_depth`.
pub const DEFAULT_RECURSION_DEPTH_CAP: usize = 10;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the timed-effect state document.
    pub state_path: PathBuf,
    /// Entry evaluations allowed per call before the guard trips.
    pub max_entry_evaluations: usize,
    /// Wall-clock budget per call in milliseconds (None = unbounded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_budget_ms: Option<u64>,
    /// Compiled size limit for regex keys, in bytes.
    pub regex_size_limit: usize,
    /// Hard ceiling over any book's recursion depth setting.
    pub recursion_depth_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_path: default_data_dir().join("timed_effects.json"),
            max_entry_evaluations: DEFAULT_MAX_ENTRY_EVALUATIONS,
            time_budget_ms: Some(DEFAULT_TIME_BUDGET_MS),
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
            recursion_depth_cap: DEFAULT_RECURSION_DEPTH_CAP,
        }
    }
}

/// `~/.worldbook`, or `.worldbook` when no home directory is known.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".worldbook"))
        .unwrap_or_else(|| PathBuf::from(".worldbook"))
}

impl EngineConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> WorldbookResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| WorldbookError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| WorldbookError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| WorldbookError::Configuration(e.to_string()))?,
            _ => {
                return Err(WorldbookError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// Reads:
    /// - `WORLDBOOK_STATE_PATH`
    /// - `WORLDBOOK_MAX_ENTRY_EVALUATIONS`
    /// - `WORLDBOOK_TIME_BUDGET_MS` (`0` disables the wall-clock guard)
    /// - `WORLDBOOK_RECURSION_DEPTH_CAP`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("WORLDBOOK_STATE_PATH") {
            config.state_path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("WORLDBOOK_MAX_ENTRY_EVALUATIONS") {
            if let Ok(max) = max.parse::<usize>() {
                config.max_entry_evaluations = max.max(1);
            }
        }

        if let Ok(ms) = std::env::var("WORLDBOOK_TIME_BUDGET_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                config.time_budget_ms = (ms > 0).then_some(ms);
            }
        }

        if let Ok(cap) = std::env::var("WORLDBOOK_RECURSION_DEPTH_CAP") {
            if let Ok(cap) = cap.parse() {
                config.recursion_depth_cap = cap;
            }
        }

        config
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Wall-clock budget as a `Duration`.
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_ms.map(Duration::from_millis)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> WorldbookResult<()> {
        if self.max_entry_evaluations == 0 {
            return Err(WorldbookError::validation_with_suggestion(
                "max_entry_evaluations must be at least 1",
                "Raise max_entry_evaluations or omit it to use the default",
            ));
        }
        if self.time_budget_ms == Some(0) {
            return Err(WorldbookError::validation_with_suggestion(
                "time_budget_ms must be positive",
                "Omit time_budget_ms to disable the wall-clock guard",
            ));
        }
        if self.regex_size_limit == 0 {
            return Err(WorldbookError::validation(
                "regex_size_limit must be positive",
            ));
        }
        Ok(())
    }
}

/// Builder for EngineConfig.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the state document path.
    pub fn state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.state_path = path.into();
        self
    }

    /// Set the per-call entry evaluation budget.
    pub fn max_entry_evaluations(mut self, max: usize) -> Self {
        self.config.max_entry_evaluations = max;
        self
    }

    /// Set the per-call wall-clock budget.
    pub fn time_budget_ms(mut self, ms: Option<u64>) -> Self {
        self.config.time_budget_ms = ms;
        self
    }

    /// Set the regex compiled size limit.
    pub fn regex_size_limit(mut self, bytes: usize) -> Self {
        self.config.regex_size_limit = bytes;
        self
    }

    /// Set the recursion depth ceiling.
    pub fn recursion_depth_cap(mut self, cap: usize) -> Self {
        self.config.recursion_depth_cap = cap;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.state_path.ends_with("timed_effects.json"));
        assert_eq!(config.max_entry_evaluations, DEFAULT_MAX_ENTRY_EVALUATIONS);
        assert_eq!(config.time_budget(), Some(Duration::from_millis(250)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::builder()
            .state_path("/tmp/wb.json")
            .max_entry_evaluations(50)
            .time_budget_ms(None)
            .recursion_depth_cap(3)
            .build();

        assert_eq!(config.state_path, PathBuf::from("/tmp/wb.json"));
        assert_eq!(config.max_entry_evaluations, 50);
        assert!(config.time_budget().is_none());
        assert_eq!(config.recursion_depth_cap, 3);
    }

    #[test]
    fn test_validation_errors() {
        let zero_steps = EngineConfig::builder().max_entry_evaluations(0).build();
        assert!(zero_steps.validate().is_err());

        let zero_budget = EngineConfig::builder().time_budget_ms(Some(0)).build();
        assert!(zero_budget.validate().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(
            &path,
            "state_path = \"/var/lib/wb/state.json\"\nmax_entry_evaluations = 42\n",
        )
        .unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.state_path, PathBuf::from("/var/lib/wb/state.json"));
        assert_eq!(config.max_entry_evaluations, 42);
        // Unspecified fields keep their defaults
        assert_eq!(config.recursion_depth_cap, DEFAULT_RECURSION_DEPTH_CAP);
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "recursion_depth_cap: 2\ntime_budget_ms: 40\n").unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.recursion_depth_cap, 2);
        assert_eq!(config.time_budget_ms, Some(40));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(EngineConfig::from_file(&path).is_err());
    }
}

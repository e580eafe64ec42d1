//! The `RenderConfig` struct, its validation, and YAML persistence.
//!
//! Maps to `config.yaml` under the platform config directory
//! (`~/.config/puml-render/config.yaml` on Linux).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::defaults;
use crate::error::ConfigError;
use crate::types::OutputFormat;

/// Settings consumed by the rendering pipeline.
///
/// The pipeline never writes these; they are owned by whatever settings
/// surface the host provides and handed over as snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Base URL of the PlantUML server. An empty string means the public default.
    #[serde(default = "defaults::server_url")]
    pub server_url: String,

    /// Text prepended to every diagram (e.g. a shared `!include` or theme).
    #[serde(default)]
    pub header: String,

    /// Minimum interval between two renders of the same target, in seconds.
    #[serde(default = "defaults::debounce_secs")]
    pub debounce_secs: f64,

    /// Path to the local PlantUML engine (jar or native binary).
    ///
    /// Accepts an absolute path, a path relative to the project root, or `~/...`.
    /// Empty disables the local engine.
    #[serde(default)]
    pub local_jar: String,

    /// Java runtime used to launch `.jar` engines.
    #[serde(default = "defaults::java_path")]
    pub java_path: String,

    /// Graphviz `dot` executable passed via `-graphvizdot`. Omitted when empty.
    #[serde(default)]
    pub dot_path: String,

    /// Cached artifacts untouched for longer than this are evicted at startup.
    #[serde(default = "defaults::cache_retention_days")]
    pub cache_retention_days: u32,

    /// Format used for embedded `.puml` / `.pu` files.
    #[serde(default)]
    pub default_format: OutputFormat,

    /// Export folder. Relative paths resolve against the document's folder.
    #[serde(default)]
    pub export_path: String,

    /// Global timeout for remote requests, in seconds. `0` disables the timeout.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Optional deadline for a single local engine run, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_timeout_secs: Option<u64>,

    /// Treat engine exit codes other than 0 and 1 as success.
    ///
    /// Off by default: any non-zero exit is a failure.
    #[serde(default = "defaults::bool_false")]
    pub lenient_exit_codes: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            server_url: defaults::server_url(),
            header: String::new(),
            debounce_secs: defaults::debounce_secs(),
            local_jar: String::new(),
            java_path: defaults::java_path(),
            dot_path: String::new(),
            cache_retention_days: defaults::cache_retention_days(),
            default_format: OutputFormat::default(),
            export_path: String::new(),
            request_timeout_secs: defaults::request_timeout_secs(),
            process_timeout_secs: None,
            lenient_exit_codes: false,
        }
    }
}

impl RenderConfig {
    /// Server URL with the empty-string fallback applied and any trailing `/` removed.
    pub fn effective_server_url(&self) -> String {
        let url = self.server_url.trim();
        if url.is_empty() {
            return defaults::SERVER_URL.to_string();
        }
        url.trim_end_matches('/').to_string()
    }

    /// Debounce interval as a `Duration`. Negative or non-finite values become
    /// zero; values too large for a `Duration` saturate.
    pub fn debounce_interval(&self) -> Duration {
        if self.debounce_secs.is_finite() && self.debounce_secs > 0.0 {
            Duration::try_from_secs_f64(self.debounce_secs).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }

    /// Remote request timeout, `None` when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// Local engine deadline, if configured.
    pub fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Whether a local engine path has been configured.
    pub fn has_local_engine(&self) -> bool {
        !self.local_jar.trim().is_empty()
    }

    /// Check semantic constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.debounce_secs.is_finite() || self.debounce_secs < 0.0 {
            return Err(ConfigError::Validation(format!(
                "debounce_secs must be a non-negative number, got {}",
                self.debounce_secs
            )));
        }
        if self.debounce_secs > defaults::MAX_DEBOUNCE_SECS {
            return Err(ConfigError::Validation(format!(
                "debounce_secs must be at most {}, got {}",
                defaults::MAX_DEBOUNCE_SECS,
                self.debounce_secs
            )));
        }
        if self.cache_retention_days > defaults::MAX_CACHE_RETENTION_DAYS {
            return Err(ConfigError::Validation(format!(
                "cache_retention_days must be at most {}, got {}",
                defaults::MAX_CACHE_RETENTION_DAYS,
                self.cache_retention_days
            )));
        }

        let server = self.effective_server_url();
        let parsed = url::Url::parse(&server).map_err(|e| {
            ConfigError::Validation(format!("server_url '{server}' is not a valid URL: {e}"))
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(ConfigError::Validation(format!(
                "server_url must use http or https, got '{scheme}'"
            ))),
        }
    }

    /// Directory holding the config file.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("puml-render")
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.yaml")
    }

    /// Load configuration from the default location, creating it on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        log::info!("Config path: {:?}", config_path);

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            log::info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            if let Err(e) = config.save_to(&config_path) {
                log::error!("Failed to save default config: {}", e);
                return Err(e);
            }
            Ok(config)
        }
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(ConfigError::from)?;
        let config: RenderConfig = serde_yaml_ng::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::from)?;
        }

        let yaml = serde_yaml_ng::to_string(self).map_err(ConfigError::from)?;

        // Atomic save: write to temp file then rename to prevent corruption on crash
        let temp_path = path.with_extension("yaml.tmp");
        fs::write(&temp_path, &yaml).map_err(ConfigError::from)?;
        fs::rename(&temp_path, path).map_err(ConfigError::from)?;

        log::info!("Config saved to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RenderConfig::default();
        assert_eq!(config.server_url, "https://www.plantuml.com/plantuml");
        assert_eq!(config.header, "");
        assert_eq!(config.debounce_secs, 3.0);
        assert_eq!(config.java_path, "java");
        assert_eq!(config.cache_retention_days, 60);
        assert_eq!(config.default_format, OutputFormat::Png);
        assert!(!config.lenient_exit_codes);
        assert!(!config.has_local_engine());
    }

    #[test]
    fn test_empty_server_url_falls_back() {
        let config = RenderConfig {
            server_url: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(config.effective_server_url(), defaults::SERVER_URL);
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let config = RenderConfig {
            server_url: "https://example.test/plantuml/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.effective_server_url(), "https://example.test/plantuml");
    }

    #[test]
    fn test_debounce_interval_clamps() {
        let mut config = RenderConfig::default();
        assert_eq!(config.debounce_interval(), Duration::from_secs(3));
        config.debounce_secs = -1.0;
        assert_eq!(config.debounce_interval(), Duration::ZERO);
        config.debounce_secs = f64::NAN;
        assert_eq!(config.debounce_interval(), Duration::ZERO);
        config.debounce_secs = 1e30;
        assert_eq!(config.debounce_interval(), Duration::MAX);
    }

    #[test]
    fn test_validate_rejects_huge_debounce() {
        let config = RenderConfig {
            debounce_secs: 1e30,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("debounce_secs must be at most"), "{err}");
    }

    #[test]
    fn test_validate_rejects_huge_retention() {
        let config = RenderConfig {
            cache_retention_days: 200_000_000,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let config = RenderConfig {
            cache_retention_days: defaults::MAX_CACHE_RETENTION_DAYS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_request_timeout_zero_disables() {
        let config = RenderConfig {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let config = RenderConfig {
            server_url: "ftp://example.test".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http or https"), "{err}");
    }

    #[test]
    fn test_validate_rejects_negative_debounce() {
        let config = RenderConfig {
            debounce_secs: -2.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_deserialize_minimal_yaml() {
        let yaml = "local_jar: ~/tools/plantuml.jar\n";
        let config: RenderConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.local_jar, "~/tools/plantuml.jar");
        assert_eq!(config.server_url, defaults::SERVER_URL);
        assert_eq!(config.debounce_secs, 3.0);
        assert!(config.has_local_engine());
    }
}

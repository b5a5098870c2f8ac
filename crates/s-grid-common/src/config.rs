//! ---
//! sgrid_section: "01-core-functionality"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Shared primitives and utilities for the core runtime."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_orchestrator_id() -> String {
    "service-grid-orchestrator".to_owned()
}

fn default_machine_provisioner_id() -> String {
    "machine-provisioner".to_owned()
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_unreachable_threshold() -> Duration {
    Duration::from_secs(30)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the S-GRID runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "S_GRID_CONFIG";

    /// Load configuration from disk, respecting the `S_GRID_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.orchestrator_id.trim().is_empty() {
            return Err(anyhow!("orchestrator consumer id must not be empty"));
        }
        if self.orchestrator.machine_provisioner_id.trim().is_empty() {
            return Err(anyhow!("machine provisioner consumer id must not be empty"));
        }
        if self.orchestrator.orchestrator_id == self.orchestrator.machine_provisioner_id {
            return Err(anyhow!(
                "orchestrator and machine provisioner must use distinct consumer ids"
            ));
        }
        if self.orchestrator.tick_interval.is_zero() {
            return Err(anyhow!("orchestrator tick interval must be positive"));
        }
        if self.health.unreachable_threshold < Duration::from_secs(2) {
            return Err(anyhow!(
                "health unreachable threshold must be at least two seconds"
            ));
        }
        Ok(())
    }
}

/// Reconciliation loop settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Consumer id under which the orchestrator receives its own tasks.
    #[serde(default = "default_orchestrator_id")]
    pub orchestrator_id: String,
    /// Consumer id of the external machine provisioner.
    #[serde(default = "default_machine_provisioner_id")]
    pub machine_provisioner_id: String,
    /// Cadence at which reconciliation passes run.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_tick_interval", rename = "tick_interval_ms")]
    pub tick_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            orchestrator_id: default_orchestrator_id(),
            machine_provisioner_id: default_machine_provisioner_id(),
            tick_interval: default_tick_interval(),
        }
    }
}

/// Agent health probe thresholds.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// An agent without ping evidence newer than this is a candidate for
    /// the unreachable classification.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_unreachable_threshold", rename = "unreachable_threshold_secs")]
    pub unreachable_threshold: Duration,
}

impl HealthConfig {
    /// Pings are renewed once the newest response is older than half the
    /// unreachable threshold.
    pub fn renewal_threshold(&self) -> Duration {
        self.unreachable_threshold / 2
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            unreachable_threshold: default_unreachable_threshold(),
        }
    }
}

/// Logging sink settings consumed by [`crate::logging::init_tracing`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            file_prefix: None,
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = toml::from_str("").expect("defaults parse");
        assert_eq!(config.orchestrator.orchestrator_id, "service-grid-orchestrator");
        assert_eq!(config.orchestrator.machine_provisioner_id, "machine-provisioner");
        assert_eq!(config.orchestrator.tick_interval, Duration::from_millis(500));
        assert_eq!(config.health.unreachable_threshold, Duration::from_secs(30));
        config.validate().expect("defaults validate");
    }

    #[test]
    fn renewal_threshold_is_half_of_unreachable() {
        let health = HealthConfig {
            unreachable_threshold: Duration::from_secs(30),
        };
        assert_eq!(health.renewal_threshold(), Duration::from_secs(15));
    }

    #[test]
    fn overlapping_consumer_ids_are_rejected() {
        let mut config = AppConfig::default();
        config.orchestrator.machine_provisioner_id =
            config.orchestrator.orchestrator_id.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn sub_second_unreachable_threshold_is_rejected() {
        let document = r#"
[health]
unreachable_threshold_secs = 1
"#;
        let config: AppConfig = toml::from_str(document).expect("parses");
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_prefers_the_first_existing_candidate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("s-grid.toml");
        std::fs::write(
            &path,
            "[orchestrator]\norchestrator_id = \"orchestrator-a\"\n",
        )
        .expect("config written");

        let missing = dir.path().join("absent.toml");
        let loaded =
            AppConfig::load_with_source(&[missing.as_path(), path.as_path()]).expect("loads");
        assert_eq!(loaded.source, path);
        assert_eq!(loaded.config.orchestrator.orchestrator_id, "orchestrator-a");
    }

    #[test]
    fn duration_fields_parse_from_scalars() {
        let document = r#"
[orchestrator]
tick_interval_ms = 250

[health]
unreachable_threshold_secs = 60
"#;
        let config: AppConfig = toml::from_str(document).expect("parses");
        assert_eq!(config.orchestrator.tick_interval, Duration::from_millis(250));
        assert_eq!(config.health.unreachable_threshold, Duration::from_secs(60));
    }
}

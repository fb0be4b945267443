use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::controller::ControllerConfig;
use crate::reconcile::{ImmutableFieldPolicy, ReconcileSettings, RequeuePolicy};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Per-pass behavior of the reconciler
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    /// Work queue sizing and retry policy
    #[serde(default)]
    pub controller: ControllerSettings,
    /// Initial store contents
    #[serde(default)]
    pub seed: SeedConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Reconcile validations
        if self.reconcile.call_timeout_ms == 0 {
            return Err("reconcile.call_timeout_ms must be > 0".into());
        }
        // Controller validations
        if self.controller.workers == 0 {
            return Err("controller.workers must be > 0".into());
        }
        if self.controller.base_backoff_ms == 0 || self.controller.max_backoff_ms == 0 {
            return Err("controller backoffs must be > 0".into());
        }
        if self.controller.base_backoff_ms > self.controller.max_backoff_ms {
            return Err("controller.base_backoff_ms must be <= controller.max_backoff_ms".into());
        }
        if let Some(path) = &self.seed.path {
            if path.trim().is_empty() {
                return Err("seed.path must not be empty when set".into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Bound on every store call
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Re-run successful passes after this many seconds; 0 disables
    #[serde(default)]
    pub requeue_after_secs: u64,
    #[serde(default)]
    pub immutable_field_policy: ImmutableFieldPolicy,
}
fn default_call_timeout_ms() -> u64 {
    10_000
}
impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            requeue_after_secs: 0,
            immutable_field_policy: ImmutableFieldPolicy::default(),
        }
    }
}

impl ReconcileConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            requeue: RequeuePolicy::from_secs(self.requeue_after_secs),
            immutable_fields: self.immutable_field_policy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// 0 retries forever
    #[serde(default)]
    pub max_retries: u32,
}
fn default_workers() -> usize {
    2
}
fn default_base_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    60_000
}
impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_retries: 0,
        }
    }
}

impl From<&ControllerSettings> for ControllerConfig {
    fn from(settings: &ControllerSettings) -> Self {
        Self {
            workers: settings.workers,
            base_backoff: Duration::from_millis(settings.base_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            max_retries: settings.max_retries,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SeedConfig {
    /// JSON file with owners and pre-existing objects to load at startup
    #[serde(default)]
    pub path: Option<String>,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub const DEFAULT_CONFIG_PATH: &str = "rolesync.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., ROLESYNC__CONTROLLER__WORKERS=4
        builder = builder.add_source(
            Environment::with_prefix("ROLESYNC")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}

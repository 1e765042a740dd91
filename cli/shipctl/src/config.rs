//! Configuration file and environment overrides.
//!
//! Precedence: command-line flags, then `SHIPMATE_*` environment
//! variables, then `config.json` in the platform config directory, then
//! built-in defaults.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use shipmate_release::{SupervisorSettings, DEFAULT_HISTORY_MAX, DEFAULT_TIMEOUT};

use crate::duration::{format_duration, parse_duration};

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

const ENV_HELM_BIN: &str = "SHIPMATE_HELM_BIN";
const ENV_KUBE_CONTEXT: &str = "SHIPMATE_KUBE_CONTEXT";
const ENV_TIMEOUT: &str = "SHIPMATE_TIMEOUT";

/// Keys accepted by `shipctl config set`.
pub const KEYS: &[&str] = &[
    "kube_context",
    "helm_bin",
    "timeout",
    "history_max",
    "poll_interval",
    "watch_grace",
    "pending_grace",
];

/// Get the config file path.
pub fn config_path() -> Result<PathBuf> {
    ProjectDirs::from("dev", "shipmate", "shipctl")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// CLI defaults. Durations are stored as `5m`-style strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,

    /// Path or name of the helm binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_bin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_max: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_grace: Option<String>,

    /// How long a pod may sit pending on an image pull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_grace: Option<String>,
}

impl Config {
    /// Load config from disk, or return default. Environment overrides
    /// are applied on top.
    pub fn load() -> Result<Self> {
        Ok(Self::load_file()?.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Load only what is on disk, for editing.
    pub fn load_file() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        let path = config_path()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config to {:?}", path))
    }

    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(bin) = non_empty(ENV_HELM_BIN) {
            self.helm_bin = Some(bin);
        }
        if let Some(context) = non_empty(ENV_KUBE_CONTEXT) {
            self.kube_context = Some(context);
        }
        if let Some(timeout) = non_empty(ENV_TIMEOUT) {
            self.timeout = Some(timeout);
        }
        self
    }

    /// Set one key from its string form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        let duration = |v: &str| -> Result<Option<String>> {
            let parsed = parse_duration(v).map_err(|e| anyhow::anyhow!(e))?;
            Ok(Some(format_duration(parsed)))
        };
        match key {
            "kube_context" => self.kube_context = Some(value.to_string()),
            "helm_bin" => self.helm_bin = Some(value.to_string()),
            "timeout" => self.timeout = duration(value)?,
            "history_max" => {
                let n: u32 = value
                    .parse()
                    .with_context(|| format!("history_max must be a number, got {:?}", value))?;
                self.history_max = Some(n);
            }
            "poll_interval" => {
                let parsed = duration(value)?;
                if parsed.as_deref() == Some("0s") {
                    bail!("poll_interval must be greater than zero");
                }
                self.poll_interval = parsed;
            }
            "watch_grace" => self.watch_grace = duration(value)?,
            "pending_grace" => self.pending_grace = duration(value)?,
            other => bail!(
                "Unknown config key {:?} (expected one of: {})",
                other,
                KEYS.join(", ")
            ),
        }
        Ok(())
    }

    pub fn helm_bin(&self) -> &str {
        self.helm_bin.as_deref().unwrap_or("helm")
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_setting("timeout", self.timeout.as_deref(), DEFAULT_TIMEOUT)
    }

    pub fn history_max(&self) -> u32 {
        self.history_max.unwrap_or(DEFAULT_HISTORY_MAX)
    }

    /// Supervisor tuning from the configured values.
    pub fn settings(&self) -> Result<SupervisorSettings> {
        let defaults = SupervisorSettings::default();
        Ok(SupervisorSettings {
            poll_interval: parse_nonzero_setting(
                "poll_interval",
                self.poll_interval.as_deref(),
                defaults.poll_interval,
            )?,
            watch_grace: parse_setting(
                "watch_grace",
                self.watch_grace.as_deref(),
                defaults.watch_grace,
            )?,
            pending_grace: parse_setting(
                "pending_grace",
                self.pending_grace.as_deref(),
                defaults.pending_grace,
            )?,
            ..defaults
        })
    }
}

fn parse_setting(key: &str, value: Option<&str>, default: Duration) -> Result<Duration> {
    match value {
        None => Ok(default),
        Some(raw) => {
            parse_duration(raw).map_err(|e| anyhow::anyhow!("Invalid {} in config: {}", key, e))
        }
    }
}

fn parse_nonzero_setting(key: &str, value: Option<&str>, default: Duration) -> Result<Duration> {
    let parsed = parse_setting(key, value, default)?;
    if parsed.is_zero() {
        bail!("Invalid {} in config: must be greater than zero", key);
    }
    Ok(parsed)
}

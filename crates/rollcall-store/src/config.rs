//! Settings shared by the daemon and the admin CLI.

use crate::sqlite::StoreOptions;
use anyhow::Context;
use chrono::TimeDelta;
use rollcall_core::AttendancePolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Grace and cooldown longer than a day have no meaning for a per-day ledger.
const MAX_POLICY_MINUTES: i64 = 24 * 60;

/// Rollcall configuration.
///
/// Built-in defaults, overlaid by the TOML file named in `ROLLCALL_CONFIG`
/// (if set), overlaid by `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:5000).
    pub bind: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Base URL of the face embedding service.
    pub embedder_url: String,
    /// Maximum Euclidean distance for a positive match.
    pub match_threshold: f32,
    /// Minutes after session start during which an arrival counts as late.
    pub grace_minutes: i64,
    /// Minimum minutes between two accepted scans of one identity/session/day.
    pub cooldown_minutes: i64,
    /// Record `absent` for enrolled faces scanned after the session ended.
    pub mark_absent_outside_window: bool,
    /// Timeout in seconds for one database operation.
    pub db_timeout_secs: u64,
    /// Timeout in seconds for one embedding request.
    pub detect_timeout_secs: u64,
    /// Number of pooled database connections.
    pub pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            db_path: default_data_dir().join("rollcall.db"),
            embedder_url: "http://127.0.0.1:5001".to_string(),
            match_threshold: rollcall_core::matcher::DEFAULT_MATCH_THRESHOLD,
            grace_minutes: 15,
            cooldown_minutes: 30,
            mark_absent_outside_window: true,
            db_timeout_secs: 5,
            detect_timeout_secs: 10,
            pool_size: 4,
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

impl Config {
    /// Load and validate configuration from the optional config file and
    /// the environment.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var_os("ROLLCALL_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Overlay `ROLLCALL_*` values looked up through `var`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = var("ROLLCALL_BIND") {
            self.bind = bind;
        }
        if let Some(path) = var("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(url) = var("ROLLCALL_EMBEDDER_URL") {
            self.embedder_url = url;
        }
        override_parsed(&var, "ROLLCALL_MATCH_THRESHOLD", &mut self.match_threshold);
        override_parsed(&var, "ROLLCALL_GRACE_MINUTES", &mut self.grace_minutes);
        override_parsed(&var, "ROLLCALL_COOLDOWN_MINUTES", &mut self.cooldown_minutes);
        if let Some(v) = var("ROLLCALL_MARK_ABSENT_OUTSIDE_WINDOW") {
            self.mark_absent_outside_window = !matches!(v.trim(), "0" | "false" | "no" | "off");
        }
        override_parsed(&var, "ROLLCALL_DB_TIMEOUT_SECS", &mut self.db_timeout_secs);
        override_parsed(&var, "ROLLCALL_DETECT_TIMEOUT_SECS", &mut self.detect_timeout_secs);
        override_parsed(&var, "ROLLCALL_POOL_SIZE", &mut self.pool_size);
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.match_threshold.is_finite() && self.match_threshold > 0.0,
            "match_threshold must be a positive number, got {}",
            self.match_threshold
        );
        for (key, minutes) in [
            ("grace_minutes", self.grace_minutes),
            ("cooldown_minutes", self.cooldown_minutes),
        ] {
            anyhow::ensure!(
                (0..=MAX_POLICY_MINUTES).contains(&minutes),
                "{key} must be between 0 and {MAX_POLICY_MINUTES}, got {minutes}"
            );
        }
        anyhow::ensure!(self.pool_size >= 1, "pool_size must be at least 1");
        anyhow::ensure!(self.db_timeout_secs >= 1, "db_timeout_secs must be at least 1");
        anyhow::ensure!(self.detect_timeout_secs >= 1, "detect_timeout_secs must be at least 1");
        Ok(())
    }

    pub fn policy(&self) -> anyhow::Result<AttendancePolicy> {
        Ok(AttendancePolicy {
            grace: minutes(self.grace_minutes).context("grace_minutes out of range")?,
            cooldown: minutes(self.cooldown_minutes).context("cooldown_minutes out of range")?,
            mark_absent_outside_window: self.mark_absent_outside_window,
        })
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            pool_size: self.pool_size,
            op_timeout: Duration::from_secs(self.db_timeout_secs),
        }
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_secs(self.detect_timeout_secs)
    }
}

fn minutes(value: i64) -> Option<TimeDelta> {
    TimeDelta::try_minutes(value).filter(|d| *d >= TimeDelta::zero())
}

fn override_parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = var(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable setting"),
    }
}

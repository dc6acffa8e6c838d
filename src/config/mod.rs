// src/config/mod.rs
pub mod ai;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::MonitorError;
use crate::ingest::providers::eurlex::DAILY_VIEW_URL;
pub use ai::AiConfig;

pub const ENV_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";

/// Upper bounds accepted by `AppConfig::validate`.
pub const MAX_WINDOW_DAYS: u32 = 3660;
pub const MAX_INTERVAL_HOURS: u64 = 24 * 366;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub check_interval_hours: u64,
    /// Discoveries in the window needed to fire an alert.
    pub alert_threshold: usize,
    pub window_days: u32,
    pub fetch_timeout_secs: u64,
    pub dispatch_timeout_secs: u64,
    /// Fixed OJ date to query instead of today (any accepted date shape).
    pub oj_date: Option<String>,
    pub eurlex_url: String,
    /// Keep a raw JSON copy of every non-empty fetch under `<data_dir>/scraped`.
    pub archive_scrapes: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            check_interval_hours: 24,
            alert_threshold: 3,
            window_days: 7,
            fetch_timeout_secs: 60,
            dispatch_timeout_secs: 30,
            oj_date: None,
            eurlex_url: DAILY_VIEW_URL.to_string(),
            archive_scrapes: true,
        }
    }
}

impl MonitoringConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_hours.saturating_mul(3600))
    }
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Sender address; the login name when absent.
    pub from: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from: None,
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        !self.smtp_server.trim().is_empty()
            && !self.username.trim().is_empty()
            && !self.password.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitoring: MonitoringConfig,
    pub email: EmailConfig,
    pub storage: StorageConfig,
    pub deepseek: AiConfig,
}

impl AppConfig {
    /// Load from an explicit path. TOML or JSON, chosen by extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::parse(&content, &ext).with_context(|| format!("parsing {}", path.display()))
    }

    /// Resolve the config file, then apply env overrides:
    /// 1) $MONITOR_CONFIG_PATH
    /// 2) config/monitor.toml
    /// 3) config/monitor.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        Self::load(None)
    }

    /// Like `load_default`, but an explicit path wins over discovery.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = match explicit {
            Some(p) => Self::load_from(p)?,
            None => Self::discover()?,
        };
        cfg.apply_env_overrides()?;
        cfg.deepseek = cfg.deepseek.sanitized();
        Ok(cfg)
    }

    fn discover() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        for candidate in ["config/monitor.toml", "config/monitor.json"] {
            let p = Path::new(candidate);
            if p.exists() {
                return Self::load_from(p);
            }
        }
        Ok(Self::default())
    }

    fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        match hint_ext {
            "toml" => Ok(toml::from_str(s)?),
            "json" => Ok(serde_json::from_str(s)?),
            _ => serde_json::from_str(s)
                .or_else(|_| toml::from_str(s))
                .map_err(|_| anyhow!("unsupported config format")),
        }
    }

    /// Secrets and deployment knobs from the environment win over the file.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }
        fn parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
            match var(name) {
                Some(v) => v
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| anyhow!("{name} is not a valid number: {v:?}")),
                None => Ok(None),
            }
        }

        if let Some(v) = var("SMTP_HOST") {
            self.email.smtp_server = v;
        }
        if let Some(v) = parsed("SMTP_PORT")? {
            self.email.smtp_port = v;
        }
        if let Some(v) = var("SMTP_USER") {
            self.email.username = v;
        }
        if let Some(v) = var("SMTP_PASS") {
            self.email.password = v;
        }
        if let Some(v) = var("NOTIFY_EMAIL_FROM") {
            self.email.from = Some(v);
        }
        if let Some(v) = var(ai::ENV_DEEPSEEK_API_KEY) {
            self.deepseek.api_key = v;
        }
        if let Some(v) = var("MONITOR_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Some(v) = parsed("CHECK_INTERVAL_HOURS")? {
            self.monitoring.check_interval_hours = v;
        }
        if let Some(v) = parsed("ALERT_THRESHOLD")? {
            self.monitoring.alert_threshold = v;
        }
        if let Some(v) = parsed("ALERT_WINDOW_DAYS")? {
            self.monitoring.window_days = v;
        }
        Ok(())
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        let m = &self.monitoring;
        if m.check_interval_hours == 0 {
            return Err(MonitorError::Config("check_interval_hours must be > 0".into()));
        }
        if m.check_interval_hours > MAX_INTERVAL_HOURS {
            return Err(MonitorError::Config(format!(
                "check_interval_hours must be <= {MAX_INTERVAL_HOURS}"
            )));
        }
        if m.window_days > MAX_WINDOW_DAYS {
            return Err(MonitorError::Config(format!("window_days must be <= {MAX_WINDOW_DAYS}")));
        }
        if m.alert_threshold == 0 {
            return Err(MonitorError::Config("alert_threshold must be >= 1".into()));
        }
        if m.fetch_timeout_secs == 0 || m.dispatch_timeout_secs == 0 {
            return Err(MonitorError::Config("timeouts must be > 0".into()));
        }
        Ok(())
    }
}

//! Agent configuration. Loaded from a JSON file; every section has defaults.

use crate::error::{AgentError, Result};
use crate::risk::RiskLevel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Data directory (local store, outbox files)
    pub data_dir: PathBuf,
    /// CSV or JSON file holding sensor readings
    pub readings_path: PathBuf,
    /// Readings older than this are flagged as stale (0 = never)
    pub max_reading_age_minutes: u64,
    /// Daemon cycle interval; 0 runs a single cycle
    pub interval_secs: u64,
    /// Known mine sites and their alert recipients
    pub mines: Vec<MineSite>,
    /// Risk level thresholds
    pub risk: RiskConfig,
    /// Alert policy and delivery backends
    pub alerts: AlertConfig,
    /// Local assessment / alert log store
    pub store: StoreConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MineSite {
    pub mine_id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    /// Overrides `alerts.default_recipients` when non-empty
    #[serde(default)]
    pub recipients: Vec<String>,
}

/// Lower bounds (inclusive) of each risk level above `low`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub medium_threshold: f64,
    pub high_threshold: f64,
    pub critical_threshold: f64,
}

/// Which assessments produce a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AlertPolicy {
    /// Notify on every assessment regardless of level
    #[default]
    Always,
    /// Notify only when the level is at or above `level`
    AtOrAbove { level: RiskLevel },
    /// Never notify; assessments are still logged
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub policy: AlertPolicy,
    /// Used for mines without their own recipient list
    pub default_recipients: Vec<String>,
    /// Upper bound on a single backend attempt
    pub attempt_timeout_secs: u64,
    pub subject_prefix: String,
    /// Tried in order until one succeeds
    pub backends: Vec<BackendConfig>,
}

/// One delivery transport. The list order in `AlertConfig::backends` is the fallback order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Transactional email HTTP API
    EmailApi {
        name: String,
        endpoint: String,
        #[serde(default)]
        api_key: Option<String>,
        from: String,
    },
    /// Generic JSON webhook (chat relay, paging gateway)
    Webhook { name: String, url: String },
    /// Append messages to a local NDJSON file
    Outbox { name: String, path: PathBuf },
}

impl BackendConfig {
    pub fn name(&self) -> &str {
        match self {
            BackendConfig::EmailApi { name, .. } => name,
            BackendConfig::Webhook { name, .. } => name,
            BackendConfig::Outbox { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub enabled: bool,
    /// Assessments and alert rows older than this are pruned at startup (0 = keep)
    pub retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .map(|d| d.join("minewatch"))
                .unwrap_or_else(|| PathBuf::from(".minewatch")),
            readings_path: PathBuf::from("readings.csv"),
            max_reading_age_minutes: 60,
            interval_secs: 0,
            mines: Vec::new(),
            risk: RiskConfig::default(),
            alerts: AlertConfig::default(),
            store: StoreConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            medium_threshold: 0.4,
            high_threshold: 0.6,
            critical_threshold: 0.8,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            policy: AlertPolicy::default(),
            default_recipients: Vec::new(),
            attempt_timeout_secs: 10,
            subject_prefix: "[MineWatch]".to_string(),
            backends: Vec::new(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: 90,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl RiskConfig {
    /// Thresholds must be strictly ascending inside (0, 1].
    pub fn validate(&self) -> Result<()> {
        let RiskConfig {
            medium_threshold: m,
            high_threshold: h,
            critical_threshold: c,
        } = *self;
        let ordered = 0.0 < m && m < h && h < c && c <= 1.0;
        if !ordered {
            return Err(AgentError::Config(format!(
                "risk thresholds must satisfy 0 < medium < high < critical <= 1 (got {m}, {h}, {c})"
            )));
        }
        Ok(())
    }
}

impl AgentConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        Self::try_load(path).unwrap_or_default()
    }

    /// Like [`load`](Self::load) but reports unreadable or malformed files.
    /// A missing file still yields the defaults.
    pub fn try_load(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let config: AgentConfig = serde_json::from_str(&data)
            .map_err(|e| AgentError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.risk.validate()?;
        for backend in &self.alerts.backends {
            if backend.name().trim().is_empty() {
                return Err(AgentError::Config("backend name must not be empty".into()));
            }
            match backend {
                BackendConfig::EmailApi { endpoint, from, .. } => {
                    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                        return Err(AgentError::Config(format!(
                            "backend {}: endpoint must be an http(s) URL",
                            backend.name()
                        )));
                    }
                    if !from.contains('@') {
                        return Err(AgentError::Config(format!(
                            "backend {}: sender address is invalid",
                            backend.name()
                        )));
                    }
                }
                BackendConfig::Webhook { url, .. } => {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        return Err(AgentError::Config(format!(
                            "backend {}: url must be an http(s) URL",
                            backend.name()
                        )));
                    }
                }
                BackendConfig::Outbox { .. } => {}
            }
        }
        Ok(())
    }

    /// Registry entry for a mine, if configured
    pub fn mine(&self, mine_id: &str) -> Option<&MineSite> {
        self.mines.iter().find(|m| m.mine_id == mine_id)
    }

    /// Recipients for a mine: its own list, else the global default list
    pub fn recipients_for(&self, mine_id: &str) -> Vec<String> {
        match self.mine(mine_id) {
            Some(site) if !site.recipients.is_empty() => site.recipients.clone(),
            _ => self.alerts.default_recipients.clone(),
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("minewatch.db")
    }
}

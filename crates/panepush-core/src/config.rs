//! Notification configuration surface.
//!
//! Deserialized from camelCase JSON. Every field has a default so a partial
//! (or empty) document is valid. Path defaults that depend on the user's
//! environment are resolved by the runtime, not here.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{AgentKind, NotificationEventType};

pub const DEFAULT_COOLDOWN_MS: u64 = 30_000;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 500;
pub const DEFAULT_SUMMARY_WAIT_MS: u64 = 5_000;
pub const DEFAULT_SUMMARY_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PanepushConfig {
    pub notifications: NotificationsConfig,
    pub subscriptions_path: Option<PathBuf>,
    pub socket_path: Option<PathBuf>,
}

impl PanepushConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.notifications.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationsConfig {
    pub push_enabled: bool,
    pub enabled_event_types: Vec<NotificationEventType>,
    /// Minimum gap between delivery attempts for one (pane, subscription).
    pub cooldown_ms: u64,
    pub retry: RetryConfig,
    pub summary: SummaryConfig,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            push_enabled: true,
            enabled_event_types: NotificationEventType::ALL.to_vec(),
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            retry: RetryConfig::default(),
            summary: SummaryConfig::default(),
        }
    }
}

impl NotificationsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "notifications.retry.maxAttempts must be at least 1".into(),
            ));
        }
        if self.summary.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "notifications.summary.pollIntervalMs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn event_type_enabled(&self, event_type: NotificationEventType) -> bool {
        self.push_enabled && self.enabled_event_types.contains(&event_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; retry `n` waits `n * initial_delay_ms`.
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_RETRY_INITIAL_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummaryConfig {
    pub enabled: bool,
    pub rename: SummaryRenameConfig,
    pub sources: SummarySources,
    pub log_path: Option<PathBuf>,
    pub poll_interval_ms: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rename: SummaryRenameConfig::default(),
            sources: SummarySources::default(),
            log_path: None,
            poll_interval_ms: DEFAULT_SUMMARY_POLL_INTERVAL_MS,
        }
    }
}

impl SummaryConfig {
    /// Whether push payloads should wait for a summary from `agent`.
    pub fn push_source(&self, agent: AgentKind) -> Option<&SummarySourceConfig> {
        if !(self.enabled && self.rename.push) {
            return None;
        }
        self.sources.get(agent).filter(|source| source.enabled)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummaryRenameConfig {
    pub push: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySources {
    pub codex: SummarySourceConfig,
    pub claude: SummarySourceConfig,
}

impl SummarySources {
    pub fn get(&self, agent: AgentKind) -> Option<&SummarySourceConfig> {
        match agent {
            AgentKind::Codex => Some(&self.codex),
            AgentKind::Claude => Some(&self.claude),
            AgentKind::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummarySourceConfig {
    pub enabled: bool,
    pub wait_ms: u64,
}

impl Default for SummarySourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            wait_ms: DEFAULT_SUMMARY_WAIT_MS,
        }
    }
}

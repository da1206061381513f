use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Agent ────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Codex,
    Claude,
    #[default]
    Unknown,
}

impl AgentKind {
    pub const ALL: [Self; 3] = [Self::Codex, Self::Claude, Self::Unknown];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Unknown => "unknown",
        }
    }

    /// Name used in human-facing notification copy.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Codex => "Codex",
            Self::Claude => "Claude",
            Self::Unknown => "Agent",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = PanepushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "codex" => Ok(Self::Codex),
            "claude" => Ok(Self::Claude),
            "unknown" => Ok(Self::Unknown),
            _ => Err(PanepushError::InvalidValue(format!("unknown agent: {s}"))),
        }
    }
}

// ─── Session State ────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Running,
    WaitingInput,
    WaitingPermission,
    Shell,
    #[default]
    Unknown,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::WaitingInput => "WAITING_INPUT",
            Self::WaitingPermission => "WAITING_PERMISSION",
            Self::Shell => "SHELL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a transition was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionSource {
    Poll,
    Hook,
    /// Backfill replay after a monitor restart; never a live transition.
    Restore,
}

/// The subset of a pane's session detail the notifier consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    pub pane_id: String,
    #[serde(default)]
    pub agent: AgentKind,
    pub state: SessionState,
    #[serde(default)]
    pub state_reason: String,
    #[serde(default)]
    pub pane_tty: Option<String>,
    #[serde(default)]
    pub current_path: Option<String>,
    #[serde(default)]
    pub repo_root: Option<String>,
    /// Pane title, used in default notification copy when present.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub last_event_at: Option<String>,
}

/// One observed session state change, produced by the upstream monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTransitionEvent {
    pub pane_id: String,
    pub previous: Option<SessionDetail>,
    pub next: SessionDetail,
    /// RFC 3339 timestamp of the transition.
    pub at: String,
    pub source: TransitionSource,
}

// ─── Notification Event Type ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationEventType {
    #[serde(rename = "pane.waiting_permission")]
    WaitingPermission,
    #[serde(rename = "pane.task_completed")]
    TaskCompleted,
}

impl NotificationEventType {
    pub const ALL: [Self; 2] = [Self::WaitingPermission, Self::TaskCompleted];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WaitingPermission => "pane.waiting_permission",
            Self::TaskCompleted => "pane.task_completed",
        }
    }
}

impl fmt::Display for NotificationEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationEventType {
    type Err = PanepushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| PanepushError::InvalidValue(format!("unknown event type: {s}")))
    }
}

// ─── Subscription ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Per-subscription filter. `None` means "no restriction" for that axis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionScope {
    #[serde(default)]
    pub pane_ids: Option<Vec<String>>,
    #[serde(default)]
    pub event_types: Option<Vec<NotificationEventType>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub standalone: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSubscription {
    pub id: String,
    pub device_id: String,
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    #[serde(default)]
    pub scope: SubscriptionScope,
    #[serde(default)]
    pub client: ClientInfo,
    #[serde(default)]
    pub last_delivered_at: Option<DateTime<Utc>>,
}

impl NotificationSubscription {
    pub fn accepts_pane(&self, pane_id: &str) -> bool {
        match &self.scope.pane_ids {
            Some(ids) => ids.iter().any(|id| id == pane_id),
            None => true,
        }
    }

    /// The subscription's own event-type list wins; without one, the
    /// server-wide enabled set applies.
    pub fn accepts_event(
        &self,
        event_type: NotificationEventType,
        server_enabled: &[NotificationEventType],
    ) -> bool {
        match &self.scope.event_types {
            Some(types) => types.contains(&event_type),
            None => server_enabled.contains(&event_type),
        }
    }
}

/// Input for creating or replacing a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionUpsert {
    pub device_id: String,
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    #[serde(default)]
    pub scope: SubscriptionScope,
    #[serde(default)]
    pub client: ClientInfo,
}

// ─── Error ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PanepushError {
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(scope: SubscriptionScope) -> NotificationSubscription {
        NotificationSubscription {
            id: "sub-1".into(),
            device_id: "dev-1".into(),
            endpoint: "https://push.example/1".into(),
            keys: SubscriptionKeys::default(),
            scope,
            client: ClientInfo::default(),
            last_delivered_at: None,
        }
    }

    #[test]
    fn agent_display_and_parse() {
        for agent in AgentKind::ALL {
            let parsed = agent.to_string().parse::<AgentKind>().expect("parse");
            assert_eq!(agent, parsed);
        }
        assert!("gemini".parse::<AgentKind>().is_err());
    }

    #[test]
    fn session_state_uses_screaming_case_on_the_wire() {
        let json = serde_json::to_string(&SessionState::WaitingPermission).expect("serialize");
        assert_eq!(json, "\"WAITING_PERMISSION\"");
    }

    #[test]
    fn event_type_wire_names() {
        let json = serde_json::to_string(&NotificationEventType::TaskCompleted).expect("serialize");
        assert_eq!(json, "\"pane.task_completed\"");
        assert_eq!(
            "pane.waiting_permission".parse::<NotificationEventType>(),
            Ok(NotificationEventType::WaitingPermission)
        );
    }

    #[test]
    fn transition_event_parses_camel_case_json() {
        let json = r#"{
            "paneId": "%1",
            "previous": null,
            "next": {"paneId": "%1", "agent": "codex", "state": "RUNNING", "paneTty": "/dev/ttys001"},
            "at": "2026-02-01T12:00:00Z",
            "source": "poll"
        }"#;
        let event: SessionTransitionEvent = serde_json::from_str(json).expect("parse");
        assert!(event.previous.is_none());
        assert_eq!(event.next.agent, AgentKind::Codex);
        assert_eq!(event.next.pane_tty.as_deref(), Some("/dev/ttys001"));
        assert_eq!(event.source, TransitionSource::Poll);
    }

    #[test]
    fn scope_none_accepts_every_pane() {
        let sub = subscription(SubscriptionScope::default());
        assert!(sub.accepts_pane("%1"));
        assert!(sub.accepts_pane("%99"));
    }

    #[test]
    fn scope_pane_list_filters() {
        let sub = subscription(SubscriptionScope {
            pane_ids: Some(vec!["%1".into()]),
            event_types: None,
        });
        assert!(sub.accepts_pane("%1"));
        assert!(!sub.accepts_pane("%2"));
    }

    #[test]
    fn scope_event_types_override_server_set() {
        let server = [NotificationEventType::TaskCompleted];
        let unscoped = subscription(SubscriptionScope::default());
        assert!(unscoped.accepts_event(NotificationEventType::TaskCompleted, &server));
        assert!(!unscoped.accepts_event(NotificationEventType::WaitingPermission, &server));

        let scoped = subscription(SubscriptionScope {
            pane_ids: None,
            event_types: Some(vec![NotificationEventType::WaitingPermission]),
        });
        assert!(scoped.accepts_event(NotificationEventType::WaitingPermission, &server));
        assert!(!scoped.accepts_event(NotificationEventType::TaskCompleted, &server));
    }
}

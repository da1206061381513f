//! Summary event line format.
//!
//! One JSON object per line. Lines that fail to parse or violate the shape
//! below are dropped by the store; they never block later lines.

use panepush_core::types::AgentKind;
use serde::{Deserialize, Serialize};

pub const SUMMARY_EVENT_TYPE: &str = "task_completed_summary";

#[derive(Debug, thiserror::Error)]
pub enum SummaryLineError {
    #[error("summary line is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("summary line violates schema: {0}")]
    Schema(String),
}

/// Fields identifying which pane a summary belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneLocator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmux_pane: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryText {
    pub pane_title: String,
    pub notification_title: String,
    pub notification_body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEngine {
    pub agent: String,
    pub model: String,
    #[serde(default)]
    pub effort: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEvent {
    pub ts: String,
    pub summary_id: String,
    pub source_agent: AgentKind,
    pub event_type: String,
    pub source_event_at: String,
    pub pane_locator: PaneLocator,
    pub summary: SummaryText,
    pub engine: SummaryEngine,
    #[serde(default)]
    pub source: serde_json::Map<String, serde_json::Value>,
}

impl SummaryEvent {
    pub fn validate(&self) -> Result<(), SummaryLineError> {
        if self.event_type != SUMMARY_EVENT_TYPE {
            return Err(SummaryLineError::Schema(format!(
                "unexpected event_type {:?}",
                self.event_type
            )));
        }
        if self.summary_id.trim().is_empty() {
            return Err(SummaryLineError::Schema("empty summary_id".into()));
        }
        if self.source_agent == AgentKind::Unknown {
            return Err(SummaryLineError::Schema(
                "source_agent must be codex or claude".into(),
            ));
        }
        if self.source_event_at.trim().is_empty() {
            return Err(SummaryLineError::Schema("empty source_event_at".into()));
        }
        if self.summary.notification_title.trim().is_empty()
            || self.summary.notification_body.trim().is_empty()
        {
            return Err(SummaryLineError::Schema(
                "notification title and body must be non-empty".into(),
            ));
        }
        Ok(())
    }
}

/// Parse and validate one log line.
pub fn parse_summary_line(line: &str) -> Result<SummaryEvent, SummaryLineError> {
    let event: SummaryEvent = serde_json::from_str(line)?;
    event.validate()?;
    Ok(event)
}

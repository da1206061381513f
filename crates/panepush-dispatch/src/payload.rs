//! Push payload rendering.

use panepush_core::types::{NotificationEventType, SessionTransitionEvent};
use panepush_summary::SummaryEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    /// Collapses repeated notifications for the same pane and event type.
    pub tag: String,
    pub data: PayloadData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadData {
    pub event_type: NotificationEventType,
    pub pane_id: String,
    pub agent: String,
    pub transition_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryEvent>,
}

fn pane_label(event: &SessionTransitionEvent) -> &str {
    event
        .next
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(&event.next.pane_id)
}

/// Built-in title and body for an event type.
pub fn default_copy(
    event_type: NotificationEventType,
    event: &SessionTransitionEvent,
) -> (String, String) {
    let agent = event.next.agent.display_name();
    let pane = pane_label(event);
    match event_type {
        NotificationEventType::WaitingPermission => (
            "Permission requested".to_owned(),
            format!("{agent} in {pane} is waiting for permission"),
        ),
        NotificationEventType::TaskCompleted => (
            "Task completed".to_owned(),
            format!("{agent} in {pane} completed and is now waiting for input"),
        ),
    }
}

/// Summary copy wins when present; otherwise the default copy is used.
pub fn build_payload(
    event_type: NotificationEventType,
    event: &SessionTransitionEvent,
    summary: Option<SummaryEvent>,
) -> NotificationPayload {
    let (title, body) = match &summary {
        Some(s) => (
            s.summary.notification_title.clone(),
            s.summary.notification_body.clone(),
        ),
        None => default_copy(event_type, event),
    };
    NotificationPayload {
        title,
        body,
        tag: format!("{}:{}", event.next.pane_id, event_type),
        data: PayloadData {
            event_type,
            pane_id: event.next.pane_id.clone(),
            agent: event.next.agent.as_str().to_owned(),
            transition_at: event.at.clone(),
            summary,
        },
    }
}

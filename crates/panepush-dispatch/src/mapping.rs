//! Session state transition → notification event type.

use panepush_core::types::{NotificationEventType, SessionState};

/// Fixed transition table. Anything not listed produces no notification.
pub fn event_type_for(previous: SessionState, next: SessionState) -> Option<NotificationEventType> {
    match (previous, next) {
        (prev, SessionState::WaitingPermission) if prev != SessionState::WaitingPermission => {
            Some(NotificationEventType::WaitingPermission)
        }
        (SessionState::Running, SessionState::WaitingInput) => {
            Some(NotificationEventType::TaskCompleted)
        }
        _ => None,
    }
}

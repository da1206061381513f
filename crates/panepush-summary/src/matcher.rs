//! Pure correlation rules between a pane transition and buffered summaries.

use std::collections::HashSet;
use std::fmt;

use chrono::DateTime;
use panepush_core::types::AgentKind;

use crate::schema::{PaneLocator, SummaryEvent};

/// Parse an RFC 3339 timestamp into epoch milliseconds.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Acceptance window `[start_ms, deadline_ms]` for `source_event_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchWindow {
    pub start_ms: i64,
    pub deadline_ms: i64,
}

impl MatchWindow {
    pub fn new(start_ms: i64, wait_ms: u64) -> Self {
        let wait = i64::try_from(wait_ms).unwrap_or(i64::MAX);
        Self {
            start_ms,
            deadline_ms: start_ms.saturating_add(wait),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    SourceMismatch,
    /// Belongs to an earlier turn.
    Stale,
    OutOfWindow,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SourceMismatch => "source_mismatch",
            Self::Stale => "stale",
            Self::OutOfWindow => "out_of_window",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Candidate { source_event_at_ms: i64 },
    Rejected(Rejection),
}

fn set(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Locator precedence: tmux pane, then tty, then cwd. The first field the
/// event sets decides; later fields are not consulted.
pub fn locator_matches(
    locator: &PaneLocator,
    pane_id: &str,
    pane_tty: Option<&str>,
    cwd: Option<&str>,
) -> bool {
    if let Some(pane) = set(&locator.tmux_pane) {
        return pane == pane_id;
    }
    if let Some(tty) = set(&locator.tty) {
        return pane_tty.is_some_and(|t| t == tty);
    }
    if let Some(dir) = set(&locator.cwd) {
        return cwd.is_some_and(|c| c == dir);
    }
    false
}

pub fn classify(event: &SummaryEvent, source_agent: AgentKind, window: MatchWindow) -> Verdict {
    if event.source_agent != source_agent {
        return Verdict::Rejected(Rejection::SourceMismatch);
    }
    let at_ms = parse_timestamp_ms(&event.source_event_at).unwrap_or(i64::MIN);
    if at_ms < window.start_ms {
        return Verdict::Rejected(Rejection::Stale);
    }
    if at_ms > window.deadline_ms {
        return Verdict::Rejected(Rejection::OutOfWindow);
    }
    Verdict::Candidate {
        source_event_at_ms: at_ms,
    }
}

/// Query fields for one correlation pass.
#[derive(Debug, Clone, Copy)]
pub struct MatchQuery<'a> {
    pub pane_id: &'a str,
    pub pane_tty: Option<&'a str>,
    pub cwd: Option<&'a str>,
    pub source_agent: AgentKind,
    pub window: MatchWindow,
}

/// Earliest candidate wins; ties go to the lexicographically smallest id.
///
/// Rejections are logged once per `summary_id`; `logged` carries that memory
/// across polling iterations of a single wait.
pub fn select_candidate<'e>(
    events: impl IntoIterator<Item = &'e SummaryEvent>,
    query: MatchQuery<'_>,
    logged: &mut HashSet<String>,
) -> Option<&'e SummaryEvent> {
    let mut best: Option<(i64, &SummaryEvent)> = None;

    for event in events {
        if !locator_matches(&event.pane_locator, query.pane_id, query.pane_tty, query.cwd) {
            continue;
        }
        match classify(event, query.source_agent, query.window) {
            Verdict::Rejected(reason) => {
                if logged.insert(event.summary_id.clone()) {
                    tracing::debug!(
                        summary_id = %event.summary_id,
                        pane_id = %query.pane_id,
                        reason = %reason,
                        "summary candidate rejected"
                    );
                }
            }
            Verdict::Candidate { source_event_at_ms } => {
                let better = match best {
                    None => true,
                    Some((best_ms, best_event)) => {
                        (source_event_at_ms, event.summary_id.as_str())
                            < (best_ms, best_event.summary_id.as_str())
                    }
                };
                if better {
                    best = Some((source_event_at_ms, event));
                }
            }
        }
    }

    best.map(|(_, event)| event)
}

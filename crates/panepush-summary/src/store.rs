//! Summary event store: bounded in-memory buffer over the summary log with a
//! single-flight refresh and a polling correlation wait.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use panepush_core::clock::Clock;
use panepush_core::types::AgentKind;
use serde::Serialize;
use tracing::{debug, info};

use crate::matcher::{MatchQuery, MatchWindow, parse_timestamp_ms, select_candidate};
use crate::schema::{SummaryEvent, parse_summary_line};
use crate::tail::LogTail;

pub const DEFAULT_MAX_EVENTS: usize = 2000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryStoreOptions {
    pub poll_interval_ms: u64,
    pub max_events: usize,
}

impl Default for SummaryStoreOptions {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

/// What to correlate against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryWaitInput {
    pub pane_id: String,
    pub pane_tty: Option<String>,
    pub cwd: Option<String>,
    pub source_agent: AgentKind,
    /// RFC 3339; unparsable values fall back to the current time.
    pub transition_at: String,
    pub wait_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryMatch {
    pub event: SummaryEvent,
    pub waited_ms: u64,
}

#[derive(Debug)]
struct Buffer {
    tail: LogTail,
    events: VecDeque<SummaryEvent>,
    max_events: usize,
}

impl Buffer {
    async fn refresh(&mut self) {
        let read = self.tail.read_new().await;
        if read.reset {
            self.events.clear();
        }
        for line in read.lines {
            match parse_summary_line(&line) {
                Ok(event) => {
                    self.events.push_back(event);
                    while self.events.len() > self.max_events {
                        self.events.pop_front();
                    }
                }
                Err(e) => debug!(error = %e, "skipping summary log line"),
            }
        }
    }
}

type RefreshFuture = Shared<BoxFuture<'static, ()>>;

pub struct SummaryEventStore {
    buffer: Arc<tokio::sync::Mutex<Buffer>>,
    /// The refresh currently running, tagged with a sequence number so only
    /// its own awaiters clear it.
    in_flight: Mutex<Option<(u64, RefreshFuture)>>,
    refresh_seq: AtomicU64,
    clock: Arc<dyn Clock>,
    poll_interval_ms: u64,
    path: PathBuf,
}

impl SummaryEventStore {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self::with_options(path, clock, SummaryStoreOptions::default())
    }

    pub fn with_options(
        path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
        options: SummaryStoreOptions,
    ) -> Self {
        let path = path.into();
        Self {
            buffer: Arc::new(tokio::sync::Mutex::new(Buffer {
                tail: LogTail::new(path.clone()),
                events: VecDeque::new(),
                max_events: options.max_events.max(1),
            })),
            in_flight: Mutex::new(None),
            refresh_seq: AtomicU64::new(0),
            clock,
            poll_interval_ms: options.poll_interval_ms.max(1),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pull newly appended lines into the buffer.
    ///
    /// Concurrent callers share one read: whoever arrives while a refresh is
    /// running awaits that refresh instead of starting another.
    pub async fn refresh(&self) {
        let (seq, refresh) = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some((seq, running)) => (*seq, running.clone()),
                None => {
                    let seq = self.refresh_seq.fetch_add(1, Ordering::Relaxed);
                    let buffer = Arc::clone(&self.buffer);
                    let running = async move {
                        let mut buffer = buffer.lock().await;
                        buffer.refresh().await;
                    }
                    .boxed()
                    .shared();
                    *slot = Some((seq, running.clone()));
                    (seq, running)
                }
            }
        };

        refresh.await;

        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|(current, _)| *current == seq) {
            *slot = None;
        }
    }

    /// Snapshot of the buffered events, oldest first.
    pub async fn events(&self) -> Vec<SummaryEvent> {
        self.buffer.lock().await.events.iter().cloned().collect()
    }

    pub async fn buffered_len(&self) -> usize {
        self.buffer.lock().await.events.len()
    }

    /// Poll the log until a summary correlated with the transition shows up
    /// or the window `[transition_at, transition_at + wait_ms]` closes.
    pub async fn wait_for_summary(&self, input: &SummaryWaitInput) -> Option<SummaryMatch> {
        let started_at = self.clock.now_ms();
        let transition_at_ms = parse_timestamp_ms(&input.transition_at).unwrap_or(started_at);
        let window = MatchWindow::new(transition_at_ms, input.wait_ms);
        let query = MatchQuery {
            pane_id: &input.pane_id,
            pane_tty: input.pane_tty.as_deref(),
            cwd: input.cwd.as_deref(),
            source_agent: input.source_agent,
            window,
        };
        let mut logged = HashSet::new();

        loop {
            self.refresh().await;

            let found = {
                let buffer = self.buffer.lock().await;
                select_candidate(buffer.events.iter(), query, &mut logged).cloned()
            };

            let now = self.clock.now_ms();
            if let Some(event) = found {
                let waited_ms = u64::try_from(now.saturating_sub(started_at)).unwrap_or(0);
                info!(
                    pane_id = %input.pane_id,
                    summary_id = %event.summary_id,
                    waited_ms,
                    "summary matched"
                );
                return Some(SummaryMatch { event, waited_ms });
            }
            if now >= window.deadline_ms {
                debug!(pane_id = %input.pane_id, wait_ms = input.wait_ms, "summary wait timed out");
                return None;
            }

            let remaining = u64::try_from(window.deadline_ms - now).unwrap_or(u64::MAX);
            self.clock
                .sleep(remaining.min(self.poll_interval_ms).max(1))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::{summary_event, to_line};
    use panepush_core::clock::ManualClock;
    use std::io::Write;

    const T0: &str = "2026-02-01T12:00:00Z";

    fn t0_ms() -> i64 {
        parse_timestamp_ms(T0).expect("valid")
    }

    fn append_lines(path: &Path, lines: &[String]) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("open log");
        for line in lines {
            writeln!(f, "{line}").expect("append");
        }
    }

    fn input(wait_ms: u64) -> SummaryWaitInput {
        SummaryWaitInput {
            pane_id: "%1".into(),
            pane_tty: Some("/dev/ttys001".into()),
            cwd: Some("/repo".into()),
            source_agent: AgentKind::Codex,
            transition_at: T0.into(),
            wait_ms,
        }
    }

    fn store_at(path: &Path, clock: &Arc<ManualClock>) -> SummaryEventStore {
        let clock: Arc<dyn Clock> = Arc::clone(clock) as Arc<dyn Clock>;
        SummaryEventStore::new(path, clock)
    }

    #[tokio::test]
    async fn refresh_skips_invalid_lines_and_keeps_valid_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.jsonl");
        append_lines(
            &path,
            &[
                to_line(&summary_event("a", AgentKind::Codex, "%1", T0)),
                "{broken".to_owned(),
                r#"{"event_type":"task_completed_summary"}"#.to_owned(),
                to_line(&summary_event("b", AgentKind::Claude, "%2", T0)),
            ],
        );
        let clock = Arc::new(ManualClock::at_ms(t0_ms()));
        let store = store_at(&path, &clock);

        store.refresh().await;
        let ids: Vec<String> = store.events().await.into_iter().map(|e| e.summary_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn repeated_refresh_does_not_duplicate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.jsonl");
        append_lines(&path, &[to_line(&summary_event("a", AgentKind::Codex, "%1", T0))]);
        let clock = Arc::new(ManualClock::at_ms(t0_ms()));
        let store = store_at(&path, &clock);

        store.refresh().await;
        store.refresh().await;
        store.refresh().await;
        assert_eq!(store.buffered_len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_refreshes_read_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.jsonl");
        append_lines(
            &path,
            &[
                to_line(&summary_event("a", AgentKind::Codex, "%1", T0)),
                to_line(&summary_event("b", AgentKind::Codex, "%1", T0)),
            ],
        );
        let clock = Arc::new(ManualClock::at_ms(t0_ms()));
        let store = store_at(&path, &clock);

        tokio::join!(store.refresh(), store.refresh(), store.refresh());
        assert_eq!(store.buffered_len().await, 2);
        assert!(store.in_flight.lock().expect("lock").is_none());
    }

    #[tokio::test]
    async fn buffer_evicts_oldest_beyond_bound() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.jsonl");
        let lines: Vec<String> = (0..5)
            .map(|i| to_line(&summary_event(&format!("s{i}"), AgentKind::Codex, "%1", T0)))
            .collect();
        append_lines(&path, &lines);
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_ms(t0_ms()));
        let store = SummaryEventStore::with_options(
            &path,
            clock,
            SummaryStoreOptions {
                poll_interval_ms: 100,
                max_events: 3,
            },
        );

        store.refresh().await;
        let ids: Vec<String> = store.events().await.into_iter().map(|e| e.summary_id).collect();
        assert_eq!(ids, vec!["s2", "s3", "s4"]);
    }

    #[tokio::test]
    async fn truncation_clears_buffer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.jsonl");
        append_lines(
            &path,
            &[
                to_line(&summary_event("old-1", AgentKind::Codex, "%1", T0)),
                to_line(&summary_event("old-2", AgentKind::Codex, "%1", T0)),
            ],
        );
        let clock = Arc::new(ManualClock::at_ms(t0_ms()));
        let store = store_at(&path, &clock);
        store.refresh().await;
        assert_eq!(store.buffered_len().await, 2);

        std::fs::write(&path, "").expect("truncate");
        append_lines(&path, &[to_line(&summary_event("n", AgentKind::Codex, "%1", T0))]);
        store.refresh().await;

        let ids: Vec<String> = store.events().await.into_iter().map(|e| e.summary_id).collect();
        assert_eq!(ids, vec!["n"]);
    }

    #[tokio::test]
    async fn wait_returns_matching_summary_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.jsonl");
        append_lines(
            &path,
            &[
                to_line(&summary_event("prior-turn", AgentKind::Codex, "%1", "2026-02-01T11:59:00Z")),
                to_line(&summary_event("hit", AgentKind::Codex, "%1", "2026-02-01T12:00:01Z")),
            ],
        );
        let clock = Arc::new(ManualClock::at_ms(t0_ms() + 1_500));
        let store = store_at(&path, &clock);

        let found = store.wait_for_summary(&input(5_000)).await.expect("match");
        assert_eq!(found.event.summary_id, "hit");
        assert_eq!(found.waited_ms, 0);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn wait_times_out_at_deadline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.jsonl");
        append_lines(
            &path,
            &[to_line(&summary_event("other-pane", AgentKind::Codex, "%7", "2026-02-01T12:00:01Z"))],
        );
        let clock = Arc::new(ManualClock::at_ms(t0_ms()));
        let store = store_at(&path, &clock);

        assert!(store.wait_for_summary(&input(250)).await.is_none());
        assert_eq!(clock.sleeps(), vec![100, 100, 50]);
        assert_eq!(clock.now_ms(), t0_ms() + 250);
    }

    #[tokio::test]
    async fn wait_with_zero_budget_checks_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.jsonl");
        let clock = Arc::new(ManualClock::at_ms(t0_ms()));
        let store = store_at(&path, &clock);

        assert!(store.wait_for_summary(&input(0)).await.is_none());
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn wait_is_idempotent_over_unchanged_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.jsonl");
        append_lines(
            &path,
            &[
                to_line(&summary_event("b", AgentKind::Codex, "%1", "2026-02-01T12:00:02Z")),
                to_line(&summary_event("a", AgentKind::Codex, "%1", "2026-02-01T12:00:02Z")),
            ],
        );
        let clock = Arc::new(ManualClock::at_ms(t0_ms() + 3_000));
        let store = store_at(&path, &clock);

        let first = store.wait_for_summary(&input(5_000)).await.expect("match");
        let second = store.wait_for_summary(&input(5_000)).await.expect("match");
        assert_eq!(first.event.summary_id, "a");
        assert_eq!(first.event, second.event);
    }

    #[tokio::test]
    async fn wait_uses_now_when_transition_time_is_unparsable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.jsonl");
        // Before "now": stale under the fallback window.
        append_lines(
            &path,
            &[to_line(&summary_event("early", AgentKind::Codex, "%1", "2026-02-01T12:00:01Z"))],
        );
        let clock = Arc::new(ManualClock::at_ms(t0_ms() + 2_000));
        let store = store_at(&path, &clock);

        let mut req = input(100);
        req.transition_at = "garbage".into();
        assert!(store.wait_for_summary(&req).await.is_none());
    }

    #[tokio::test]
    async fn wait_picks_up_lines_appended_while_polling() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.jsonl");
        std::fs::write(&path, "").expect("create");
        let clock = Arc::new(ManualClock::at_ms(t0_ms()));
        let store = Arc::new(store_at(&path, &clock));

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.wait_for_summary(&input(60_000)).await })
        };

        // ManualClock sleeps only yield, so give the waiter a few turns first.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        append_lines(
            &path,
            &[to_line(&summary_event("late", AgentKind::Codex, "%1", "2026-02-01T12:00:04Z"))],
        );

        let found = waiter.await.expect("join").expect("match");
        assert_eq!(found.event.summary_id, "late");
    }
}

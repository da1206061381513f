//! panepush-summary: near-real-time view of agent-authored turn summaries.
//! Tails the append-only summary log, validates each line, and correlates
//! summaries back to a pane transition within a bounded time window.

pub mod matcher;
pub mod schema;
pub mod store;
pub mod tail;

pub use matcher::{
    MatchQuery, MatchWindow, Rejection, Verdict, classify, locator_matches, parse_timestamp_ms,
    select_candidate,
};
pub use schema::{
    PaneLocator, SUMMARY_EVENT_TYPE, SummaryEngine, SummaryEvent, SummaryLineError, SummaryText,
    parse_summary_line,
};
pub use store::{
    DEFAULT_MAX_EVENTS, DEFAULT_POLL_INTERVAL_MS, SummaryEventStore, SummaryMatch,
    SummaryStoreOptions, SummaryWaitInput,
};
pub use tail::{LogTail, TailRead};

//! `panepush summary wait|tail`: local probes against the summary log.
//! These never talk to the daemon.

use std::path::Path;
use std::sync::Arc;

use panepush_core::clock::{Clock, SystemClock};
use panepush_core::config::{DEFAULT_SUMMARY_WAIT_MS, NotificationsConfig};
use panepush_summary::{SummaryEventStore, SummaryWaitInput};

use crate::cli::{SummaryTailOpts, SummaryWaitOpts};
use crate::daemon::summary_store;

pub(crate) fn wait_input(
    opts: SummaryWaitOpts,
    config: &NotificationsConfig,
    now: &dyn Clock,
) -> SummaryWaitInput {
    let wait_ms = opts.wait_ms.unwrap_or_else(|| {
        config
            .summary
            .sources
            .get(opts.agent)
            .map_or(DEFAULT_SUMMARY_WAIT_MS, |source| source.wait_ms)
    });
    SummaryWaitInput {
        pane_id: opts.pane,
        pane_tty: opts.tty,
        cwd: opts.cwd,
        source_agent: opts.agent,
        transition_at: opts.at.unwrap_or_else(|| now.now().to_rfc3339()),
        wait_ms,
    }
}

/// Prints the match as JSON. Returns the process exit code: 0 on match,
/// 1 on timeout.
pub async fn cmd_summary_wait(
    log_path: &Path,
    config: &NotificationsConfig,
    opts: SummaryWaitOpts,
) -> anyhow::Result<i32> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let input = wait_input(opts, config, &*clock);
    let store = summary_store(log_path, config, clock);
    run_wait(&store, &input).await
}

async fn run_wait(store: &SummaryEventStore, input: &SummaryWaitInput) -> anyhow::Result<i32> {
    match store.wait_for_summary(input).await {
        Some(found) => {
            println!("{}", serde_json::to_string_pretty(&found)?);
            Ok(0)
        }
        None => {
            eprintln!(
                "no summary for {} within {}ms",
                input.pane_id, input.wait_ms
            );
            Ok(1)
        }
    }
}

/// One refresh, then print the buffered events as JSON Lines, oldest first.
pub async fn cmd_summary_tail(
    log_path: &Path,
    config: &NotificationsConfig,
    opts: SummaryTailOpts,
) -> anyhow::Result<()> {
    let store = summary_store(log_path, config, Arc::new(SystemClock));
    for line in tail_lines(&store, opts.limit).await? {
        println!("{line}");
    }
    Ok(())
}

async fn tail_lines(store: &SummaryEventStore, limit: Option<usize>) -> anyhow::Result<Vec<String>> {
    store.refresh().await;
    let events = store.events().await;
    let skip = limit.map_or(0, |n| events.len().saturating_sub(n));
    events
        .iter()
        .skip(skip)
        .map(|event| serde_json::to_string(event).map_err(Into::into))
        .collect()
}

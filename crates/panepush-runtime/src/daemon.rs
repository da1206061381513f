//! Daemon wiring: stores, transport, dispatcher, UDS server, shutdown.

use std::path::Path;
use std::sync::Arc;

use panepush_core::clock::{Clock, SystemClock};
use panepush_core::config::{NotificationsConfig, PanepushConfig};
use panepush_dispatch::{Dispatcher, SubscriptionStore};
use panepush_summary::{DEFAULT_MAX_EVENTS, SummaryEventStore, SummaryStoreOptions};

use crate::config::Paths;
use crate::server::{self, DaemonState};
use crate::subscriptions::JsonFileSubscriptionStore;
use crate::webhook::WebhookTransport;

pub(crate) fn summary_store(
    log_path: &Path,
    config: &NotificationsConfig,
    clock: Arc<dyn Clock>,
) -> SummaryEventStore {
    SummaryEventStore::with_options(
        log_path,
        clock,
        SummaryStoreOptions {
            poll_interval_ms: config.summary.poll_interval_ms,
            max_events: DEFAULT_MAX_EVENTS,
        },
    )
}

/// Assemble the shared daemon state from config.
pub(crate) fn build_state(config: &PanepushConfig, paths: &Paths) -> DaemonState {
    let notifications = config.notifications.clone();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let subscriptions: Arc<dyn SubscriptionStore> =
        Arc::new(JsonFileSubscriptionStore::new(&paths.subscriptions));

    let summaries = notifications.summary.enabled.then(|| {
        Arc::new(summary_store(
            &paths.summary_log,
            &notifications,
            Arc::clone(&clock),
        ))
    });

    let mut dispatcher = Dispatcher::new(
        notifications,
        Arc::clone(&subscriptions),
        Arc::new(WebhookTransport::default()),
        clock,
    );
    if let Some(store) = &summaries {
        dispatcher = dispatcher.with_summaries(Arc::clone(store) as _);
    }

    DaemonState::new(Arc::new(dispatcher), subscriptions, summaries)
}

pub async fn run_daemon(config: PanepushConfig, paths: Paths) -> anyhow::Result<()> {
    tracing::info!(
        socket = %paths.socket.display(),
        subscriptions = %paths.subscriptions.display(),
        summary_log = %paths.summary_log.display(),
        summary_enabled = config.notifications.summary.enabled,
        "panepush daemon starting"
    );

    let state = Arc::new(build_state(&config, &paths));
    let listener = server::bind_socket(&paths.socket).await?;
    let server_handle = tokio::spawn(server::serve(listener, state));

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            tokio::select! {
                _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            tracing::info!("received ctrl-c, shutting down");
        }
    };

    tokio::select! {
        () = shutdown => {}
        res = server_handle => {
            match res {
                Ok(Err(e)) => tracing::error!(error = %e, "UDS server error"),
                _ => tracing::warn!("server exited unexpectedly"),
            }
        }
    }

    let _ = std::fs::remove_file(&paths.socket);
    tracing::info!("daemon stopped");
    Ok(())
}

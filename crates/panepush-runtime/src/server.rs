//! UDS JSON-RPC server.
//! Connection-per-request, newline-delimited JSON.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use panepush_core::types::{SessionTransitionEvent, SubscriptionUpsert};
use panepush_dispatch::{Dispatcher, SubscriptionStore};
use panepush_summary::SummaryEventStore;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;

/// Shared by every connection handler.
pub struct DaemonState {
    pub dispatcher: Arc<Dispatcher>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub summaries: Option<Arc<SummaryEventStore>>,
    dispatches_accepted: AtomicU64,
}

impl DaemonState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        subscriptions: Arc<dyn SubscriptionStore>,
        summaries: Option<Arc<SummaryEventStore>>,
    ) -> Self {
        Self {
            dispatcher,
            subscriptions,
            summaries,
            dispatches_accepted: AtomicU64::new(0),
        }
    }
}

/// Create the socket directory (0700), clear a stale socket, bind (0600).
pub async fn bind_socket(socket_path: &Path) -> anyhow::Result<UnixListener> {
    let socket_dir = socket_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path {}", socket_path.display()))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    if socket_path.exists() {
        if UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!(path = %socket_path.display(), "removed stale socket");
        } else {
            anyhow::bail!("another daemon is already running at {}", socket_path.display());
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(path = %socket_path.display(), "UDS server listening");
    Ok(listener)
}

/// Accept connections until the listener fails.
pub async fn serve(listener: UnixListener, state: Arc<DaemonState>) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                tracing::debug!(error = %e, "connection error");
            }
        });
    }
}

async fn handle_connection(stream: UnixStream, state: Arc<DaemonState>) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response = match serde_json::from_str::<Value>(line.trim()) {
        Ok(request) => handle_request(&state, &request).await,
        Err(e) => error_response(Value::Null, PARSE_ERROR, &format!("parse error: {e}")),
    };

    let mut resp = serde_json::to_string(&response)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;
    Ok(())
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {"code": code, "message": message},
        "id": id,
    })
}

/// Route one request to its method and build the response envelope.
pub(crate) async fn handle_request(state: &Arc<DaemonState>, request: &Value) -> Value {
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let result = match method {
        "dispatch" => accept_dispatch(state, params),
        "subscriptions.list" => state
            .subscriptions
            .list()
            .await
            .map_err(internal)
            .and_then(|subs| serde_json::to_value(subs).map_err(internal)),
        "subscriptions.upsert" => match serde_json::from_value::<SubscriptionUpsert>(params) {
            Ok(input) => state
                .subscriptions
                .upsert(input)
                .await
                .map_err(internal)
                .and_then(|sub| serde_json::to_value(sub).map_err(internal)),
            Err(e) => Err((INVALID_PARAMS, format!("invalid subscription: {e}"))),
        },
        "subscriptions.remove_all" => state
            .subscriptions
            .remove_all()
            .await
            .map(|()| json!({"removed": true}))
            .map_err(internal),
        "status" => status(state).await,
        _ => Err((METHOD_NOT_FOUND, "method not found".to_owned())),
    };

    match result {
        Ok(result) => json!({"jsonrpc": "2.0", "result": result, "id": id}),
        Err((code, message)) => error_response(id, code, &message),
    }
}

fn internal(e: impl std::fmt::Display) -> (i64, String) {
    (INTERNAL_ERROR, e.to_string())
}

/// Validate the event, then run the dispatch detached from the connection.
fn accept_dispatch(state: &Arc<DaemonState>, params: Value) -> Result<Value, (i64, String)> {
    let event: SessionTransitionEvent = serde_json::from_value(params)
        .map_err(|e| (INVALID_PARAMS, format!("invalid transition event: {e}")))?;

    state.dispatches_accepted.fetch_add(1, Ordering::Relaxed);
    let dispatcher = Arc::clone(&state.dispatcher);
    tokio::spawn(async move {
        let report = dispatcher.dispatch_transition(&event).await;
        tracing::debug!(
            pane_id = %event.pane_id,
            skipped = ?report.skipped,
            deliveries = report.deliveries.len(),
            attempts = report.total_attempts(),
            "dispatch finished"
        );
    });
    Ok(json!({"accepted": true}))
}

async fn status(state: &Arc<DaemonState>) -> Result<Value, (i64, String)> {
    let subscriptions = state.subscriptions.list().await.map_err(internal)?;
    let config = state.dispatcher.config();
    let summary = match &state.summaries {
        Some(store) => {
            let buffered = store.buffered_len().await;
            json!({
                "logPath": store.path().display().to_string(),
                "bufferedEvents": buffered,
            })
        }
        None => Value::Null,
    };
    Ok(json!({
        "subscriptions": subscriptions.len(),
        "pushEnabled": config.push_enabled,
        "enabledEventTypes": config.enabled_event_types,
        "dispatchesAccepted": state.dispatches_accepted.load(Ordering::Relaxed),
        "summary": summary,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use panepush_core::clock::{Clock, ManualClock};
    use panepush_core::config::NotificationsConfig;
    use panepush_core::types::NotificationSubscription;
    use panepush_dispatch::{DeliveryError, MemorySubscriptionStore, PushTransport};
    use tokio::sync::mpsc;

    struct ChannelTransport(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl PushTransport for ChannelTransport {
        async fn send(
            &self,
            subscription: &NotificationSubscription,
            _payload_json: &str,
        ) -> Result<(), DeliveryError> {
            let _ = self.0.send(subscription.id.clone());
            Ok(())
        }
    }

    fn state() -> (Arc<DaemonState>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store: Arc<dyn SubscriptionStore> = Arc::new(MemorySubscriptionStore::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_ms(1_700_000_000_000));
        let dispatcher = Dispatcher::new(
            NotificationsConfig::default(),
            Arc::clone(&store),
            Arc::new(ChannelTransport(tx)),
            clock,
        );
        let state = DaemonState::new(Arc::new(dispatcher), store, None);
        (Arc::new(state), rx)
    }

    fn request(method: &str, params: Value) -> Value {
        json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 7})
    }

    fn upsert_params(endpoint: &str) -> Value {
        json!({
            "deviceId": "phone",
            "endpoint": endpoint,
            "keys": {"p256dh": "k", "auth": "a"},
        })
    }

    fn transition_params() -> Value {
        json!({
            "paneId": "%1",
            "previous": {"paneId": "%1", "agent": "codex", "state": "RUNNING"},
            "next": {"paneId": "%1", "agent": "codex", "state": "WAITING_PERMISSION"},
            "at": "2026-02-01T12:00:00Z",
            "source": "hook",
        })
    }

    #[tokio::test]
    async fn upsert_then_list() {
        let (state, _rx) = state();
        let created = handle_request(&state, &request("subscriptions.upsert", upsert_params("https://e/1"))).await;
        assert_eq!(created["id"], 7);
        assert_eq!(created["result"]["endpoint"], "https://e/1");

        let listed = handle_request(&state, &request("subscriptions.list", Value::Null)).await;
        assert_eq!(listed["result"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn dispatch_is_accepted_and_delivered_in_background() {
        let (state, mut rx) = state();
        let created = handle_request(&state, &request("subscriptions.upsert", upsert_params("https://e/1"))).await;
        let sub_id = created["result"]["id"].as_str().expect("id").to_owned();

        let reply = handle_request(&state, &request("dispatch", transition_params())).await;
        assert_eq!(reply["result"]["accepted"], true);
        assert_eq!(rx.recv().await.as_deref(), Some(sub_id.as_str()));

        let status = handle_request(&state, &request("status", Value::Null)).await;
        assert_eq!(status["result"]["dispatchesAccepted"], 1);
        assert_eq!(status["result"]["subscriptions"], 1);
        assert!(status["result"]["summary"].is_null());
    }

    #[tokio::test]
    async fn malformed_params_are_rejected() {
        let (state, _rx) = state();
        let reply = handle_request(&state, &request("dispatch", json!({"paneId": "%1"}))).await;
        assert_eq!(reply["error"]["code"], INVALID_PARAMS);

        let reply = handle_request(&state, &request("subscriptions.upsert", json!({}))).await;
        assert_eq!(reply["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_method() {
        let (state, _rx) = state();
        let reply = handle_request(&state, &request("list_panes", Value::Null)).await;
        assert_eq!(reply["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(reply["id"], 7);
    }

    #[tokio::test]
    async fn remove_all_clears() {
        let (state, _rx) = state();
        handle_request(&state, &request("subscriptions.upsert", upsert_params("https://e/1"))).await;
        handle_request(&state, &request("subscriptions.remove_all", Value::Null)).await;
        let listed = handle_request(&state, &request("subscriptions.list", Value::Null)).await;
        assert_eq!(listed["result"], json!([]));
    }

    #[tokio::test]
    async fn socket_round_trip_and_stale_socket_cleanup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("run").join("panepushd.sock");

        // A leftover socket file with nobody listening.
        std::fs::create_dir_all(socket.parent().expect("parent")).expect("mkdir");
        drop(std::os::unix::net::UnixListener::bind(&socket).expect("bind stale"));
        assert!(socket.exists());

        let (state, _rx) = state();
        let listener = bind_socket(&socket).await.expect("bind");
        let server = tokio::spawn(serve(listener, state));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&socket).expect("meta").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let result = crate::client::rpc_call(&socket, "status", Value::Null)
            .await
            .expect("rpc");
        assert_eq!(result["subscriptions"], 0);

        let err = bind_socket(&socket).await.expect_err("second daemon refused");
        assert!(err.to_string().contains("already running"));
        server.abort();
    }
}

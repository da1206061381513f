//! `panepush subscriptions list|add|clear`

use std::path::Path;

use panepush_core::types::{ClientInfo, SubscriptionKeys, SubscriptionScope, SubscriptionUpsert};

use crate::cli::{AddSubscriptionOpts, SubscriptionsCommand};
use crate::client::rpc_call;

/// Empty repeatable flags mean "no restriction".
pub(crate) fn upsert_from_opts(opts: AddSubscriptionOpts) -> SubscriptionUpsert {
    SubscriptionUpsert {
        device_id: opts.device_id,
        endpoint: opts.endpoint,
        keys: SubscriptionKeys {
            p256dh: opts.p256dh,
            auth: opts.auth,
        },
        scope: SubscriptionScope {
            pane_ids: (!opts.panes.is_empty()).then_some(opts.panes),
            event_types: (!opts.events.is_empty()).then_some(opts.events),
        },
        client: ClientInfo {
            platform: opts.platform,
            standalone: opts.standalone,
        },
    }
}

pub async fn cmd_subscriptions(socket_path: &Path, command: SubscriptionsCommand) -> anyhow::Result<()> {
    let result = match command {
        SubscriptionsCommand::List => {
            rpc_call(socket_path, "subscriptions.list", serde_json::Value::Null).await?
        }
        SubscriptionsCommand::Add(opts) => {
            let params = serde_json::to_value(upsert_from_opts(opts))?;
            rpc_call(socket_path, "subscriptions.upsert", params).await?
        }
        SubscriptionsCommand::Clear => {
            rpc_call(socket_path, "subscriptions.remove_all", serde_json::Value::Null).await?
        }
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

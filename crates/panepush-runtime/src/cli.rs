//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use panepush_core::types::{AgentKind, NotificationEventType};

#[derive(Parser)]
#[command(name = "panepush", about = "Push notifications for tmux agent panes", version)]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/panepush/config.json)
    #[arg(long, short = 'c', global = true, env = "PANEPUSH_CONFIG")]
    pub config: Option<PathBuf>,

    /// UDS socket path (default: $XDG_RUNTIME_DIR/panepush/panepushd.sock)
    #[arg(long, short = 's', global = true, env = "PANEPUSH_SOCKET")]
    pub socket_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon (UDS server + dispatcher)
    Daemon,
    /// Send session transition events (one JSON object per line) to the daemon
    Send(SendOpts),
    /// Manage push subscriptions held by the daemon
    Subscriptions {
        #[command(subcommand)]
        command: SubscriptionsCommand,
    },
    /// Show daemon status
    Status,
    /// Inspect the summary event log without a daemon
    Summary {
        #[command(subcommand)]
        command: SummaryCommand,
    },
}

#[derive(clap::Args)]
pub struct SendOpts {
    /// Input file; `-` or omitted reads stdin
    pub file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum SubscriptionsCommand {
    /// List subscriptions (JSON)
    List,
    /// Add a subscription, or replace the one with the same endpoint
    Add(AddSubscriptionOpts),
    /// Remove every subscription
    Clear,
}

#[derive(clap::Args)]
pub struct AddSubscriptionOpts {
    #[arg(long)]
    pub endpoint: String,

    #[arg(long)]
    pub device_id: String,

    #[arg(long, default_value = "")]
    pub p256dh: String,

    #[arg(long, default_value = "")]
    pub auth: String,

    /// Restrict to these panes (repeatable)
    #[arg(long = "pane")]
    pub panes: Vec<String>,

    /// Restrict to these event types (repeatable)
    #[arg(long = "event")]
    pub events: Vec<NotificationEventType>,

    #[arg(long, default_value = "cli")]
    pub platform: String,

    #[arg(long)]
    pub standalone: bool,
}

#[derive(Subcommand)]
pub enum SummaryCommand {
    /// Wait for a summary correlated with a transition; exit 1 on timeout
    Wait(SummaryWaitOpts),
    /// Print the buffered summary events
    Tail(SummaryTailOpts),
}

#[derive(clap::Args)]
pub struct SummaryWaitOpts {
    #[arg(long)]
    pub pane: String,

    #[arg(long)]
    pub agent: AgentKind,

    #[arg(long)]
    pub tty: Option<String>,

    #[arg(long)]
    pub cwd: Option<String>,

    /// Transition time, RFC 3339 (default: now)
    #[arg(long)]
    pub at: Option<String>,

    /// Wait budget in milliseconds (default: the agent's configured waitMs)
    #[arg(long)]
    pub wait_ms: Option<u64>,
}

#[derive(clap::Args)]
pub struct SummaryTailOpts {
    /// Print only the newest N events
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

//! panepush: push notifications for AI agent panes.
//! The daemon turns session transitions into web-push deliveries, optionally
//! enriched with agent-written turn summaries; the other subcommands are thin
//! clients or local probes.

use clap::Parser;

mod cli;
mod client;
mod cmd_send;
mod cmd_subscriptions;
mod cmd_summary;
mod config;
mod daemon;
mod server;
mod subscriptions;
mod webhook;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let config_path = args.config.unwrap_or_else(config::default_config_path);
    let panepush_config = config::load_config(&config_path)?;
    let paths = config::Paths::resolve(args.socket_path, &panepush_config);

    match args.command {
        cli::Command::Daemon => {
            let filter = std::env::var("PANEPUSH_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!(config = %config_path.display(), "config loaded");
            daemon::run_daemon(panepush_config, paths).await?;
        }
        cli::Command::Send(opts) => {
            cmd_send::cmd_send(&paths.socket, opts.file.as_deref()).await?;
        }
        cli::Command::Subscriptions { command } => {
            cmd_subscriptions::cmd_subscriptions(&paths.socket, command).await?;
        }
        cli::Command::Status => {
            client::cmd_status(&paths.socket).await?;
        }
        cli::Command::Summary { command } => match command {
            cli::SummaryCommand::Wait(opts) => {
                let exit_code = cmd_summary::cmd_summary_wait(
                    &paths.summary_log,
                    &panepush_config.notifications,
                    opts,
                )
                .await?;
                if exit_code != 0 {
                    std::process::exit(exit_code);
                }
            }
            cli::SummaryCommand::Tail(opts) => {
                cmd_summary::cmd_summary_tail(
                    &paths.summary_log,
                    &panepush_config.notifications,
                    opts,
                )
                .await?;
            }
        },
    }

    Ok(())
}

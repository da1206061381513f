//! `panepush send`: forward transition events to the daemon.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use panepush_core::types::SessionTransitionEvent;

use crate::client::rpc_call;

/// Parse JSON Lines input. Blank lines are skipped; a bad line aborts the
/// whole batch so nothing is half-sent.
pub(crate) fn parse_events(input: &str) -> anyhow::Result<Vec<SessionTransitionEvent>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line.trim())
                .with_context(|| format!("line {}: invalid transition event", idx + 1))
        })
        .collect()
}

fn read_input(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

pub async fn cmd_send(socket_path: &Path, file: Option<&Path>) -> anyhow::Result<()> {
    let events = parse_events(&read_input(file)?)?;
    for event in &events {
        rpc_call(socket_path, "dispatch", serde_json::to_value(event)?).await?;
    }
    eprintln!("sent {} event(s)", events.len());
    Ok(())
}

//! Per (pane, subscription) delivery debounce.

use std::collections::{HashMap, HashSet};

/// Last delivery attempt per `(pane_id, subscription_id)`, in epoch ms.
///
/// A subscription id with no entry is never blocked, so a new or rotated
/// subscription always gets at least one attempt.
#[derive(Debug, Default, Clone)]
pub struct CooldownCache {
    last_attempt: HashMap<(String, String), i64>,
}

impl CooldownCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cooling(
        &self,
        pane_id: &str,
        subscription_id: &str,
        now_ms: i64,
        cooldown_ms: u64,
    ) -> bool {
        if cooldown_ms == 0 {
            return false;
        }
        let cooldown = i64::try_from(cooldown_ms).unwrap_or(i64::MAX);
        self.last_attempt
            .get(&(pane_id.to_owned(), subscription_id.to_owned()))
            .is_some_and(|last| now_ms.saturating_sub(*last) < cooldown)
    }

    pub fn record(&mut self, pane_id: &str, subscription_id: &str, at_ms: i64) {
        self.last_attempt
            .insert((pane_id.to_owned(), subscription_id.to_owned()), at_ms);
    }

    /// Drop every entry for a subscription that no longer exists.
    pub fn forget_subscription(&mut self, subscription_id: &str) {
        self.last_attempt.retain(|(_, sub), _| sub != subscription_id);
    }

    /// Keep only entries whose subscription id is in `known`.
    pub fn retain_known(&mut self, known: &HashSet<&str>) {
        self.last_attempt
            .retain(|(_, sub), _| known.contains(sub.as_str()));
    }

    pub fn len(&self) -> usize {
        self.last_attempt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_attempt.is_empty()
    }
}

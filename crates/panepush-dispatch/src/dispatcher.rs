//! Notification dispatcher: one session transition in, zero or more push
//! deliveries out.
//!
//! Per dispatch: gate → map → server gate → resolve subscriptions →
//! (optional) wait for summary → render payload → deliver to each
//! subscription with cooldown, retry, and removal of dead endpoints.
//! Delivery failures are logged, never returned.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use panepush_core::clock::Clock;
use panepush_core::config::NotificationsConfig;
use panepush_core::types::{
    NotificationEventType, NotificationSubscription, SessionTransitionEvent, TransitionSource,
};
use panepush_summary::{SummaryEvent, SummaryWaitInput};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cooldown::CooldownCache;
use crate::mapping::event_type_for;
use crate::payload::build_payload;
use crate::store::SubscriptionStore;
use crate::summary::SummaryWaiter;
use crate::transport::{FailureKind, PushTransport};

/// Value of the `result` field on delivery log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    Success,
    Retry,
    Failed,
    Removed,
    Skipped,
}

impl DeliveryResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Retry => "retry",
            Self::Failed => "failed",
            Self::Removed => "removed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for DeliveryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a dispatch ended before any delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    FirstObservation,
    Restore,
    UnmappedTransition,
    PushDisabled,
    EventTypeDisabled,
    SubscriptionsUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    CoolingDown,
    Removed { status_code: u16 },
    Failed { attempts: u32, status_code: Option<u16> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionDelivery {
    pub subscription_id: String,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub event_type: Option<NotificationEventType>,
    pub skipped: Option<SkipReason>,
    pub summary_id: Option<String>,
    pub deliveries: Vec<SubscriptionDelivery>,
}

impl DispatchReport {
    fn skipped(event_type: Option<NotificationEventType>, reason: SkipReason) -> Self {
        Self {
            event_type,
            skipped: Some(reason),
            ..Default::default()
        }
    }

    /// Transport calls made across all subscriptions.
    pub fn total_attempts(&self) -> u32 {
        self.deliveries
            .iter()
            .map(|d| match d.outcome {
                DeliveryOutcome::Delivered { attempts } | DeliveryOutcome::Failed { attempts, .. } => {
                    attempts
                }
                DeliveryOutcome::Removed { .. } => 1,
                DeliveryOutcome::CoolingDown => 0,
            })
            .sum()
    }
}

pub struct Dispatcher {
    config: NotificationsConfig,
    subscriptions: Arc<dyn SubscriptionStore>,
    transport: Arc<dyn PushTransport>,
    clock: Arc<dyn Clock>,
    summaries: Option<Arc<dyn SummaryWaiter>>,
    cooldown: Mutex<CooldownCache>,
    /// Serializes dispatches for the same pane.
    pane_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Dispatcher {
    pub fn new(
        config: NotificationsConfig,
        subscriptions: Arc<dyn SubscriptionStore>,
        transport: Arc<dyn PushTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            subscriptions,
            transport,
            clock,
            summaries: None,
            cooldown: Mutex::new(CooldownCache::new()),
            pane_locks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_summaries(mut self, summaries: Arc<dyn SummaryWaiter>) -> Self {
        self.summaries = Some(summaries);
        self
    }

    pub fn config(&self) -> &NotificationsConfig {
        &self.config
    }

    pub fn subscriptions(&self) -> &Arc<dyn SubscriptionStore> {
        &self.subscriptions
    }

    /// Handle one transition. Resolves once every eligible subscription has
    /// been attempted (or skipped); never fails.
    pub async fn dispatch_transition(&self, event: &SessionTransitionEvent) -> DispatchReport {
        let Some(previous) = event.previous.as_ref() else {
            return DispatchReport::skipped(None, SkipReason::FirstObservation);
        };
        if event.source == TransitionSource::Restore {
            return DispatchReport::skipped(None, SkipReason::Restore);
        }
        let Some(event_type) = event_type_for(previous.state, event.next.state) else {
            return DispatchReport::skipped(None, SkipReason::UnmappedTransition);
        };
        if !self.config.push_enabled {
            return DispatchReport::skipped(Some(event_type), SkipReason::PushDisabled);
        }
        if !self.config.enabled_event_types.contains(&event_type) {
            return DispatchReport::skipped(Some(event_type), SkipReason::EventTypeDisabled);
        }

        let pane_id = event.next.pane_id.as_str();
        let pane_lock = self.pane_lock(pane_id);
        let guard = pane_lock.lock_owned().await;
        let report = self.dispatch_locked(event, event_type).await;
        drop(guard);
        self.release_pane_lock(pane_id);
        report
    }

    async fn dispatch_locked(
        &self,
        event: &SessionTransitionEvent,
        event_type: NotificationEventType,
    ) -> DispatchReport {
        let pane_id = event.next.pane_id.as_str();

        let all = match self.subscriptions.list().await {
            Ok(all) => all,
            Err(e) => {
                warn!(event = %event_type, pane_id = %pane_id, error = %e, "cannot list subscriptions");
                return DispatchReport::skipped(
                    Some(event_type),
                    SkipReason::SubscriptionsUnavailable,
                );
            }
        };
        {
            let known: HashSet<&str> = all.iter().map(|s| s.id.as_str()).collect();
            self.cooldown_cache().retain_known(&known);
        }

        let eligible: Vec<NotificationSubscription> = all
            .into_iter()
            .filter(|s| {
                s.accepts_pane(pane_id)
                    && s.accepts_event(event_type, &self.config.enabled_event_types)
            })
            .collect();

        let mut report = DispatchReport {
            event_type: Some(event_type),
            ..Default::default()
        };
        if eligible.is_empty() {
            debug!(event = %event_type, pane_id = %pane_id, "no eligible subscriptions");
            return report;
        }

        let summary = self.resolve_summary(event, event_type).await;
        report.summary_id = summary.as_ref().map(|s| s.summary_id.clone());

        let payload = build_payload(event_type, event, summary);
        let payload_json = match serde_json::to_string(&payload) {
            Ok(json) => json,
            Err(e) => {
                warn!(event = %event_type, pane_id = %pane_id, error = %e, "cannot render payload");
                return report;
            }
        };

        for subscription in &eligible {
            let outcome = self
                .deliver(event_type, pane_id, subscription, &payload_json)
                .await;
            report.deliveries.push(SubscriptionDelivery {
                subscription_id: subscription.id.clone(),
                outcome,
            });
        }
        report
    }

    async fn resolve_summary(
        &self,
        event: &SessionTransitionEvent,
        event_type: NotificationEventType,
    ) -> Option<SummaryEvent> {
        if event_type != NotificationEventType::TaskCompleted {
            return None;
        }
        let source = self.config.summary.push_source(event.next.agent)?;
        let waiter = self.summaries.as_ref()?;

        let input = SummaryWaitInput {
            pane_id: event.next.pane_id.clone(),
            pane_tty: event.next.pane_tty.clone(),
            cwd: event.next.repo_root.clone(),
            source_agent: event.next.agent,
            transition_at: event.at.clone(),
            wait_ms: source.wait_ms,
        };
        match waiter.wait_for_summary(input).await {
            Some(found) => {
                info!(
                    event = %event_type,
                    pane_id = %event.next.pane_id,
                    summary_id = %found.event.summary_id,
                    waited_ms = found.waited_ms,
                    "push enriched with summary"
                );
                Some(found.event)
            }
            None => {
                info!(
                    event = %event_type,
                    pane_id = %event.next.pane_id,
                    wait_ms = source.wait_ms,
                    "no summary within wait window; using default copy"
                );
                None
            }
        }
    }

    async fn deliver(
        &self,
        event_type: NotificationEventType,
        pane_id: &str,
        subscription: &NotificationSubscription,
        payload_json: &str,
    ) -> DeliveryOutcome {
        let sub_id = subscription.id.as_str();
        if self.cooldown_cache().is_cooling(
            pane_id,
            sub_id,
            self.clock.now_ms(),
            self.config.cooldown_ms,
        ) {
            info!(
                event = %event_type,
                pane_id = %pane_id,
                subscription_id = %sub_id,
                result = %DeliveryResult::Skipped,
                "push skipped during cooldown"
            );
            return DeliveryOutcome::CoolingDown;
        }

        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt: u32 = 1;
        loop {
            let sent = self.transport.send(subscription, payload_json).await;
            self.cooldown_cache()
                .record(pane_id, sub_id, self.clock.now_ms());

            let err = match sent {
                Ok(()) => {
                    if let Err(e) = self
                        .subscriptions
                        .mark_delivered(sub_id, self.clock.now())
                        .await
                    {
                        warn!(subscription_id = %sub_id, error = %e, "cannot record delivery time");
                    }
                    info!(
                        event = %event_type,
                        pane_id = %pane_id,
                        subscription_id = %sub_id,
                        attempt,
                        result = %DeliveryResult::Success,
                        "push delivered"
                    );
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(err) => err,
            };

            match err.kind() {
                FailureKind::Permanent => {
                    let status_code = err.status_code.unwrap_or_default();
                    if let Err(e) = self.subscriptions.remove(sub_id).await {
                        warn!(subscription_id = %sub_id, error = %e, "cannot remove subscription");
                    }
                    self.cooldown_cache().forget_subscription(sub_id);
                    warn!(
                        event = %event_type,
                        pane_id = %pane_id,
                        subscription_id = %sub_id,
                        status_code,
                        result = %DeliveryResult::Removed,
                        "push endpoint gone; subscription removed"
                    );
                    return DeliveryOutcome::Removed { status_code };
                }
                FailureKind::Transient if attempt < max_attempts => {
                    let delay_ms = self
                        .config
                        .retry
                        .initial_delay_ms
                        .saturating_mul(u64::from(attempt));
                    warn!(
                        event = %event_type,
                        pane_id = %pane_id,
                        subscription_id = %sub_id,
                        attempt,
                        status_code = ?err.status_code,
                        delay_ms,
                        result = %DeliveryResult::Retry,
                        "push delivery failed; retrying"
                    );
                    self.clock.sleep(delay_ms).await;
                    attempt += 1;
                }
                FailureKind::Transient | FailureKind::Rejected => {
                    warn!(
                        event = %event_type,
                        pane_id = %pane_id,
                        subscription_id = %sub_id,
                        attempt,
                        status_code = ?err.status_code,
                        error = %err,
                        result = %DeliveryResult::Failed,
                        "push delivery failed"
                    );
                    return DeliveryOutcome::Failed {
                        attempts: attempt,
                        status_code: err.status_code,
                    };
                }
            }
        }
    }

    fn cooldown_cache(&self) -> std::sync::MutexGuard<'_, CooldownCache> {
        self.cooldown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pane_lock(&self, pane_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.pane_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(pane_id.to_owned()).or_default())
    }

    /// Drop the pane's lock entry once nobody else holds or awaits it.
    fn release_pane_lock(&self, pane_id: &str) {
        let mut locks = self.pane_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(pane_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(pane_id);
        }
    }

    #[cfg(test)]
    fn tracked_panes(&self) -> usize {
        self.pane_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

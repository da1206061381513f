//! panepush-dispatch: decides whether a session transition warrants a push
//! notification, optionally enriches it with an agent summary, and delivers
//! it to every eligible subscription with retry and lifecycle cleanup.

pub mod cooldown;
pub mod dispatcher;
pub mod mapping;
pub mod payload;
pub mod store;
pub mod summary;
pub mod transport;

pub use cooldown::CooldownCache;
pub use dispatcher::{
    DeliveryOutcome, DeliveryResult, DispatchReport, Dispatcher, SkipReason, SubscriptionDelivery,
};
pub use mapping::event_type_for;
pub use payload::{NotificationPayload, PayloadData, build_payload};
pub use store::{MemorySubscriptionStore, StoreError, SubscriptionStore, apply_upsert};
pub use summary::SummaryWaiter;
pub use transport::{DeliveryError, FailureKind, PushTransport};

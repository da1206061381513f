//! panepush-core: shared domain types for the notification pipeline.
//! Session transitions, push subscriptions, notification configuration,
//! and the clock abstraction used for deterministic tests.

pub mod clock;
pub mod config;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ConfigError, NotificationsConfig, PanepushConfig, RetryConfig, SummaryConfig,
    SummaryRenameConfig, SummarySourceConfig, SummarySources,
};
pub use types::{
    AgentKind, ClientInfo, NotificationEventType, NotificationSubscription, PanepushError,
    SessionDetail, SessionState, SessionTransitionEvent, SubscriptionKeys, SubscriptionScope,
    SubscriptionUpsert, TransitionSource,
};

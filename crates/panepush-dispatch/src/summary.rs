//! Summary enrichment seam.

use async_trait::async_trait;
use panepush_summary::{SummaryEventStore, SummaryMatch, SummaryWaitInput};

/// Blocks until a summary correlated with a transition is available, or the
/// wait budget runs out.
#[async_trait]
pub trait SummaryWaiter: Send + Sync {
    async fn wait_for_summary(&self, input: SummaryWaitInput) -> Option<SummaryMatch>;
}

#[async_trait]
impl SummaryWaiter for SummaryEventStore {
    async fn wait_for_summary(&self, input: SummaryWaitInput) -> Option<SummaryMatch> {
        SummaryEventStore::wait_for_summary(self, &input).await
    }
}

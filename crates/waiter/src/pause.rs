use std::time::Duration;

use async_trait::async_trait;

/// Delay between a failed probe and the next attempt.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, interval: Duration);
}

/// Sleeps on the Tokio timer. The waiter runs alone on its runtime, so the
/// startup path stays blocked for the whole interval.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, interval: Duration) {
        tokio::time::sleep(interval).await;
    }
}

use async_trait::async_trait;

use super::ProbeResult;

/// A single logical database that can be asked to become reachable.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    /// Opens (or reuses) the connection and verifies it answers.
    async fn ensure_connection(&self) -> ProbeResult<()>;
}

/// Connection handles addressed by alias.
pub trait ConnectionLookup: Send + Sync {
    fn probe(&self, alias: &str) -> Option<&dyn ConnectionProbe>;
}


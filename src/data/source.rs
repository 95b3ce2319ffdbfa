use std::time::Duration;

use async_trait::async_trait;

use crate::data::cache::SourceId;

/// One upstream data collaborator. Implementations perform the actual fetch
/// (HTTP, database, file); the engine only relies on this contract. A failed
/// fetch must have no side effects beyond the returned error.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// How often this source should be refreshed. Intervals are independent
    /// across sources and need not be multiples of each other.
    fn interval(&self) -> Duration;

    async fn fetch(&self) -> anyhow::Result<serde_json::Value>;
}

/// A source that always returns the same payload. Backs the CLI's demo mode
/// and doubles as a test fixture.
pub struct StaticSource {
    id: SourceId,
    interval: Duration,
    payload: serde_json::Value,
}

impl StaticSource {
    pub fn new(id: SourceId, interval: Duration, payload: serde_json::Value) -> Self {
        Self {
            id,
            interval,
            payload,
        }
    }
}

#[async_trait]
impl DataSource for StaticSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn fetch(&self) -> anyhow::Result<serde_json::Value> {
        Ok(self.payload.clone())
    }
}

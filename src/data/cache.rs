use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

/// The fixed set of independently polled data sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    WorkItems,
    Orders,
    Revenue,
    Schedule,
    Metrics,
    /// Remotely managed slide descriptor list. Polled like any other source
    /// but excluded from the staleness predicate: stale business data is an
    /// operator-visible problem, an old slide list is not.
    SlideConfig,
}

impl SourceId {
    pub const ALL: [Self; 6] = [
        Self::WorkItems,
        Self::Orders,
        Self::Revenue,
        Self::Schedule,
        Self::Metrics,
        Self::SlideConfig,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::WorkItems => "work_items",
            Self::Orders => "orders",
            Self::Revenue => "revenue",
            Self::Schedule => "schedule",
            Self::Metrics => "metrics",
            Self::SlideConfig => "slide_config",
        }
    }

    /// Whether this source participates in `is_stale`.
    pub fn tracked_for_staleness(self) -> bool {
        !matches!(self, Self::SlideConfig)
    }

    fn index(self) -> usize {
        match self {
            Self::WorkItems => 0,
            Self::Orders => 1,
            Self::Revenue => 2,
            Self::Schedule => 3,
            Self::Metrics => 4,
            Self::SlideConfig => 5,
        }
    }
}

/// Latest known state of one source. `value` is the last successfully
/// fetched payload or the initial `None`; a failed fetch never clears it.
/// `last_updated` is set only on fetch success.
#[derive(Clone, Debug, Default)]
pub struct SourceRecord {
    pub value: Option<serde_json::Value>,
    pub last_updated: Option<Instant>,
}

/// Aggregate connection health derived from the most recent attempt per
/// source.
#[derive(Clone, Debug, Default)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub using_fallback_data: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct StatusInner {
    /// Bit set per source whose most recent attempt failed.
    failing_mask: u32,
    using_fallback_data: bool,
    last_error: Option<String>,
    any_attempt: bool,
}

/// Passive in-memory store of the latest successfully fetched value per
/// source. Written exclusively by the polling manager, read by everyone
/// else. One lock per source so a slow reader or writer on one source never
/// blocks another source or the render tick.
#[derive(Debug)]
pub struct DataCache {
    records: [RwLock<SourceRecord>; SourceId::ALL.len()],
    status: RwLock<StatusInner>,
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl DataCache {
    pub fn new() -> Self {
        Self {
            records: std::array::from_fn(|_| RwLock::new(SourceRecord::default())),
            status: RwLock::new(StatusInner::default()),
        }
    }

    /// Snapshot of one source's record.
    pub fn record(&self, id: SourceId) -> SourceRecord {
        read_lock(&self.records[id.index()]).clone()
    }

    /// Convenience: the latest payload for a source, if any.
    pub fn value(&self, id: SourceId) -> Option<serde_json::Value> {
        read_lock(&self.records[id.index()]).value.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        let inner = read_lock(&self.status);
        ConnectionStatus {
            is_connected: inner.any_attempt && inner.failing_mask == 0,
            using_fallback_data: inner.using_fallback_data,
            last_error: inner.last_error.clone(),
        }
    }

    /// Record a successful fetch: stores the payload and stamps
    /// `last_updated`.
    pub fn apply_success(&self, id: SourceId, value: serde_json::Value, now: Instant) {
        {
            let mut record = write_lock(&self.records[id.index()]);
            record.value = Some(value);
            record.last_updated = Some(now);
        }
        let mut status = write_lock(&self.status);
        status.any_attempt = true;
        status.failing_mask &= !(1 << id.index());
        if status.failing_mask == 0 {
            status.using_fallback_data = false;
        }
    }

    /// Record a failed fetch: the source's value and timestamp are left
    /// untouched, only connection status changes.
    pub fn apply_failure(&self, id: SourceId, error: &str) {
        let had_value = read_lock(&self.records[id.index()]).value.is_some();
        let mut status = write_lock(&self.status);
        status.any_attempt = true;
        status.failing_mask |= 1 << id.index();
        if had_value {
            // Still serving the previous payload for this source.
            status.using_fallback_data = true;
        }
        status.last_error = Some(format!("{}: {error}", id.name()));
    }

    /// True if `id` has never been fetched or was last updated longer than
    /// `threshold` ago.
    pub fn source_is_stale(&self, id: SourceId, threshold: Duration, now: Instant) -> bool {
        match read_lock(&self.records[id.index()]).last_updated {
            Some(at) => now.saturating_duration_since(at) > threshold,
            None => true,
        }
    }

    /// True if any staleness-tracked source among `ids` is stale.
    pub fn is_stale<I>(&self, ids: I, threshold: Duration, now: Instant) -> bool
    where
        I: IntoIterator<Item = SourceId>,
    {
        ids.into_iter()
            .filter(|id| id.tracked_for_staleness())
            .any(|id| self.source_is_stale(id, threshold, now))
    }
}

impl Default for DataCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_preserves_previous_value_and_timestamp() {
        let cache = DataCache::new();
        let t0 = Instant::now();
        cache.apply_success(SourceId::Orders, json!({"open": 7}), t0);

        cache.apply_failure(SourceId::Orders, "connection refused");

        let record = cache.record(SourceId::Orders);
        assert_eq!(record.value, Some(json!({"open": 7})));
        assert_eq!(record.last_updated, Some(t0));

        let status = cache.status();
        assert!(!status.is_connected);
        assert!(status.using_fallback_data);
        assert!(status.last_error.unwrap().contains("orders"));
    }

    #[test]
    fn failure_is_isolated_to_one_source() {
        let cache = DataCache::new();
        let t0 = Instant::now();
        cache.apply_success(SourceId::Orders, json!(1), t0);
        cache.apply_success(SourceId::Revenue, json!(2), t0);

        cache.apply_failure(SourceId::Revenue, "timeout");

        assert_eq!(cache.value(SourceId::Orders), Some(json!(1)));
        assert_eq!(cache.value(SourceId::Revenue), Some(json!(2)));
    }

    #[test]
    fn success_after_failures_restores_connected() {
        let cache = DataCache::new();
        let t0 = Instant::now();
        cache.apply_failure(SourceId::Metrics, "down");
        assert!(!cache.status().is_connected);

        cache.apply_success(SourceId::Metrics, json!(0), t0);
        assert!(cache.status().is_connected);
        assert!(!cache.status().using_fallback_data);
    }

    #[test]
    fn never_fetched_is_stale() {
        let cache = DataCache::new();
        assert!(cache.is_stale(SourceId::ALL, Duration::from_secs(3600), Instant::now()));
    }

    #[test]
    fn staleness_tracks_each_source_independently() {
        let cache = DataCache::new();
        let now = Instant::now();
        for id in SourceId::ALL {
            cache.apply_success(id, json!(null), now);
        }
        let threshold = Duration::from_millis(500);
        assert!(!cache.is_stale(SourceId::ALL, threshold, now));

        // One tracked source older than the threshold trips the predicate
        // regardless of the others being fresh.
        cache.apply_success(
            SourceId::Schedule,
            json!(null),
            now.checked_sub(Duration::from_secs(10)).unwrap(),
        );
        assert!(cache.is_stale(SourceId::ALL, threshold, now));
    }

    #[test]
    fn slide_config_is_not_tracked_for_staleness() {
        let cache = DataCache::new();
        let now = Instant::now();
        for id in SourceId::ALL {
            if id.tracked_for_staleness() {
                cache.apply_success(id, json!(null), now);
            }
        }
        // SlideConfig never fetched, yet the cache is fresh.
        assert!(!cache.is_stale(SourceId::ALL, Duration::from_secs(1), now));
    }
}

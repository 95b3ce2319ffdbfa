use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::data::{
    cache::{DataCache, SourceId},
    source::DataSource,
};

/// How long `stop` waits for in-flight fetches before aborting their tasks.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Owns one independent refresh loop per data source and the shared
/// [`DataCache`] they write into.
///
/// Overlap policy: each source's fetch is awaited inside its own loop task
/// and delayed interval ticks are skipped, so a source never has two fetches
/// in flight and ticks never queue. A slow fetch on one source cannot delay
/// another source or the render tick.
pub struct PollingManager {
    cache: Arc<DataCache>,
    sources: Vec<Arc<dyn DataSource>>,
    shutdown: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

impl PollingManager {
    pub fn new(sources: Vec<Arc<dyn DataSource>>) -> Self {
        Self {
            cache: Arc::new(DataCache::new()),
            sources,
            shutdown: None,
            tasks: Vec::new(),
        }
    }

    /// The shared cache. Callers other than the manager itself must treat
    /// it as read-only.
    pub fn cache(&self) -> Arc<DataCache> {
        Arc::clone(&self.cache)
    }

    pub fn is_started(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Performs one immediate fetch of every source, then arms one repeating
    /// timer per source at that source's configured interval.
    pub fn start(&mut self) {
        if self.shutdown.is_some() {
            debug!("polling manager already started");
            return;
        }
        let token = CancellationToken::new();
        info!(sources = self.sources.len(), "starting polling manager");
        for source in &self.sources {
            self.tasks.push(tokio::spawn(run_source(
                Arc::clone(source),
                Arc::clone(&self.cache),
                token.clone(),
            )));
        }
        self.shutdown = Some(token);
    }

    /// Disarms all timers. Idempotent; safe to call when not started. A
    /// fetch already in flight may complete but its result is discarded.
    pub async fn stop(&mut self) {
        let Some(token) = self.shutdown.take() else {
            debug!("polling manager already stopped");
            return;
        };
        token.cancel();
        for mut task in self.tasks.drain(..) {
            if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
                warn!("source task did not stop within grace period; aborting");
                task.abort();
            }
        }
        info!("polling manager stopped");
    }

    /// True if any of this manager's staleness-tracked sources has never
    /// been fetched or is older than `threshold`.
    pub fn is_data_stale(&self, threshold: Duration) -> bool {
        let ids = self.sources.iter().map(|s| s.id());
        self.cache.is_stale(ids, threshold, Instant::now())
    }
}

async fn run_source(source: Arc<dyn DataSource>, cache: Arc<DataCache>, token: CancellationToken) {
    let id = source.id();
    let mut interval = tokio::time::interval(source.interval());
    // The first tick completes immediately (the start-time fetch); ticks a
    // slow fetch ran through are dropped rather than queued.
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                debug!(source = id.name(), "source loop shutting down");
                break;
            }

            _ = interval.tick() => {
                fetch_once(source.as_ref(), &cache, &token).await;
            }
        }
    }
}

/// One isolated fetch. Errors are logged and recorded against connection
/// status only; nothing propagates out of the timer loop. Results arriving
/// after shutdown are discarded.
async fn fetch_once(source: &dyn DataSource, cache: &DataCache, token: &CancellationToken) {
    let id = source.id();
    match source.fetch().await {
        Ok(value) => {
            if token.is_cancelled() {
                debug!(source = id.name(), "discarding fetch result after stop");
                return;
            }
            debug!(source = id.name(), "fetch succeeded");
            cache.apply_success(id, value, Instant::now());
        }
        Err(err) => {
            if token.is_cancelled() {
                return;
            }
            warn!(source = id.name(), error = %err, "fetch failed; keeping previous value");
            cache.apply_failure(id, &err.to_string());
        }
    }
}

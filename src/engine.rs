use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::{EngineConfig, EngineConfigPatch, OutputSpec},
    core::Fps,
    data::{
        cache::{DataCache, SourceId},
        poll::PollingManager,
        source::DataSource,
    },
    error::{EngineError, EngineResult},
    output::{
        sink::{FrameSink, SinkMetrics},
        transport::{FfmpegStreamTransport, FrameTransport, NullTransport},
    },
    render::surface::FramePair,
    slides::{SlideFactory, manager::SlideManager, parse_descriptors},
};

/// How often the watcher compares the remotely polled slide list against
/// the one currently applied.
const CONFIG_WATCH_INTERVAL: Duration = Duration::from_secs(1);

/// How long `stop` waits for the engine tasks to wind down.
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Point-in-time snapshot for the status surface.
#[derive(Clone, Debug, serde::Serialize)]
pub struct EngineStatus {
    pub is_running: bool,
    pub uptime_ms: u64,
    pub current_slide_index: usize,
    pub total_slides: usize,
    pub actual_fps: f64,
    pub frame_count: u64,
    pub data_stale: bool,
}

type TransportFactory =
    Box<dyn Fn(&EngineConfig) -> EngineResult<Box<dyn FrameTransport>> + Send + Sync>;

/// The composition root. Owns the polling manager, slide manager, double
/// buffer and frame sink, and drives one frame tick per target-rate
/// interval: clear, draw, swap, push. Control calls mutate shared state
/// between ticks; they never touch the per-frame path directly.
pub struct Engine {
    config: EngineConfig,
    sources: Vec<Arc<dyn DataSource>>,
    transport_factory: TransportFactory,
    state: EngineState,
    poller: Option<PollingManager>,
    factory: Option<Arc<SlideFactory>>,
    manager: Option<Arc<Mutex<SlideManager>>>,
    pair: Option<Arc<Mutex<FramePair>>>,
    metrics: Option<Arc<SinkMetrics>>,
    shutdown: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
    started_at: Option<Instant>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn default_transport(config: &EngineConfig) -> EngineResult<Box<dyn FrameTransport>> {
    match &config.output {
        OutputSpec::Null => Ok(Box::new(NullTransport::new())),
        OutputSpec::Ffmpeg { dest } => Ok(Box::new(FfmpegStreamTransport::spawn(
            config.canvas,
            config.fps,
            dest,
        )?)),
    }
}

impl Engine {
    pub fn new(config: EngineConfig, sources: Vec<Arc<dyn DataSource>>) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sources,
            transport_factory: Box::new(default_transport),
            state: EngineState::Stopped,
            poller: None,
            factory: None,
            manager: None,
            pair: None,
            metrics: None,
            shutdown: None,
            tasks: Vec::new(),
            started_at: None,
        })
    }

    /// Override how the frame transport is built (tests, embedders).
    pub fn with_transport_factory(
        mut self,
        factory: impl Fn(&EngineConfig) -> EngineResult<Box<dyn FrameTransport>> + Send + Sync + 'static,
    ) -> Self {
        self.transport_factory = Box::new(factory);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Stopped → Running. Starts polling, performs the one-time asset load,
    /// builds the slide list and arms the frame timer. Starting an engine
    /// that is not stopped is a caller error.
    pub async fn start(&mut self) -> EngineResult<()> {
        if self.state != EngineState::Stopped {
            return Err(EngineError::lifecycle(format!(
                "cannot start engine in state {:?}",
                self.state
            )));
        }
        self.state = EngineState::Starting;
        info!(
            stream = %self.config.stream_name,
            width = self.config.canvas.width,
            height = self.config.canvas.height,
            fps = self.config.fps.as_f64(),
            "starting engine"
        );

        let kind = self.config.transition.parse_kind()?;
        let mut poller = PollingManager::new(self.sources.clone());
        poller.start();
        let cache = poller.cache();

        let factory = match SlideFactory::prepare(
            self.config.canvas,
            self.config.logo.as_deref().map(Path::new),
        )
        .await
        {
            Ok(factory) => Arc::new(factory),
            Err(err) => {
                poller.stop().await;
                self.state = EngineState::Stopped;
                return Err(err);
            }
        };

        let transport = match (self.transport_factory)(&self.config) {
            Ok(transport) => transport,
            Err(err) => {
                poller.stop().await;
                self.state = EngineState::Stopped;
                return Err(err);
            }
        };

        let manager = Arc::new(Mutex::new(SlideManager::new(
            self.config.canvas,
            self.config.background,
            factory.build(&self.config.slides),
            kind,
            self.config.transition.duration_ms,
        )));
        let pair = Arc::new(Mutex::new(FramePair::new(self.config.canvas)));
        let sink = FrameSink::new(
            self.config.stream_name.clone(),
            transport,
            self.config.background,
        );
        let metrics = sink.metrics();

        let token = CancellationToken::new();
        self.tasks.push(tokio::spawn(run_render_loop(
            RenderLoop {
                pair: Arc::clone(&pair),
                manager: Arc::clone(&manager),
                cache: Arc::clone(&cache),
                sink,
                background: self.config.background,
                fps: self.config.fps,
            },
            token.clone(),
        )));
        self.tasks.push(tokio::spawn(watch_slide_config(
            cache,
            Arc::clone(&manager),
            Arc::clone(&factory),
            self.config.slides.clone(),
            token.clone(),
        )));

        self.poller = Some(poller);
        self.factory = Some(factory);
        self.manager = Some(manager);
        self.pair = Some(pair);
        self.metrics = Some(metrics);
        self.shutdown = Some(token);
        self.started_at = Some(Instant::now());
        self.state = EngineState::Running;
        Ok(())
    }

    /// Running → Stopped. Disarms the frame timer before the next tick can
    /// fire, stops polling and releases the sink. Stopping an engine that
    /// is not running is a no-op.
    pub async fn stop(&mut self) -> EngineResult<()> {
        if self.state != EngineState::Running {
            debug!(state = ?self.state, "stop requested while not running");
            return Ok(());
        }
        self.state = EngineState::Stopping;

        if let Some(token) = self.shutdown.take() {
            token.cancel();
        }
        for mut task in self.tasks.drain(..) {
            if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
                warn!("engine task did not stop within grace period; aborting");
                task.abort();
            }
        }
        if let Some(mut poller) = self.poller.take() {
            poller.stop().await;
        }

        self.factory = None;
        self.manager = None;
        self.pair = None;
        self.metrics = None;
        self.started_at = None;
        self.state = EngineState::Stopped;
        info!("engine stopped");
        Ok(())
    }

    /// Stop (if running) then start.
    pub async fn restart(&mut self) -> EngineResult<()> {
        self.stop().await?;
        self.start().await
    }

    /// Control-path jump to a specific slide; bounds are validated against
    /// the active list.
    pub fn jump_to_slide(&mut self, index: usize) -> EngineResult<()> {
        let Some(manager) = &self.manager else {
            return Err(EngineError::lifecycle("engine is not running"));
        };
        lock(manager).jump_to(index)
    }

    /// Merge a partial configuration, validate the result and apply what
    /// can change live (slide list, transition, logo, stale threshold).
    /// Canvas size, frame rate, stream name and poll intervals take effect
    /// on the next restart. Returns the merged configuration.
    pub async fn update_config(
        &mut self,
        patch: &EngineConfigPatch,
    ) -> EngineResult<EngineConfig> {
        let merged = self.config.merged(patch)?;

        if self.state == EngineState::Running {
            if patch.logo.is_some() && merged.logo != self.config.logo {
                let factory = Arc::new(
                    SlideFactory::prepare(merged.canvas, merged.logo.as_deref().map(Path::new))
                        .await?,
                );
                self.factory = Some(factory);
            }
            if let Some(manager) = &self.manager {
                let kind = merged.transition.parse_kind()?;
                let mut guard = lock(manager);
                guard.set_transition(kind, merged.transition.duration_ms);
                if patch.slides.is_some()
                    && let Some(factory) = &self.factory
                {
                    guard.update_slides(factory.build(&merged.slides));
                }
            }
        }

        self.config = merged.clone();
        Ok(merged)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn status(&self) -> EngineStatus {
        let (current_slide_index, total_slides) = match &self.manager {
            Some(manager) => {
                let guard = lock(manager);
                (guard.current_index(), guard.slide_count())
            }
            None => (0, 0),
        };
        let (actual_fps, frame_count) = match &self.metrics {
            Some(metrics) => (metrics.actual_fps(), metrics.frame_count()),
            None => (0.0, 0),
        };
        let data_stale = match &self.poller {
            Some(poller) => {
                poller.is_data_stale(Duration::from_millis(self.config.stale_threshold_ms))
            }
            None => true,
        };
        EngineStatus {
            is_running: self.state == EngineState::Running,
            uptime_ms: self
                .started_at
                .map(|t| Instant::now().saturating_duration_since(t).as_millis() as u64)
                .unwrap_or(0),
            current_slide_index,
            total_slides,
            actual_fps,
            frame_count,
            data_stale,
        }
    }

    /// PNG of the frame currently exposed to the sink, for preview tooling.
    /// Encoded on demand, never on the hot path.
    pub fn snapshot(&self) -> EngineResult<Vec<u8>> {
        let Some(pair) = &self.pair else {
            return Err(EngineError::lifecycle("engine is not running"));
        };
        lock(pair).front().encode_png()
    }

    /// Shared cache handle, available while running.
    pub fn cache(&self) -> Option<Arc<DataCache>> {
        self.poller.as_ref().map(|p| p.cache())
    }
}

struct RenderLoop {
    pair: Arc<Mutex<FramePair>>,
    manager: Arc<Mutex<SlideManager>>,
    cache: Arc<DataCache>,
    sink: FrameSink,
    background: [u8; 4],
    fps: Fps,
}

impl RenderLoop {
    /// One frame: clear → draw → swap → push, strictly in that order. The
    /// surface work happens under the pair lock; the transport write does
    /// not.
    async fn tick(&mut self, dt_ms: f64) -> EngineResult<()> {
        {
            let mut pair = lock(&self.pair);
            {
                let mut manager = lock(&self.manager);
                let back = pair.back_mut();
                back.clear(self.background);
                manager.render(back, &self.cache, dt_ms);
            }
            pair.swap();
            self.sink.stage(pair.front())?;
        }
        self.sink.submit().await
    }
}

async fn run_render_loop(mut rl: RenderLoop, token: CancellationToken) {
    let mut interval = tokio::time::interval(rl.fps.frame_duration());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,

            _ = interval.tick() => {
                let now = Instant::now();
                let dt_ms = now.saturating_duration_since(last).as_secs_f64() * 1000.0;
                last = now;
                // Last line of defense: a bad tick is logged, never fatal.
                if let Err(err) = rl.tick(dt_ms).await {
                    warn!(error = %err, "render tick failed");
                }
            }
        }
    }

    if let Err(err) = rl.sink.close().await {
        warn!(error = %err, "closing frame sink failed");
    }
}

/// Applies remotely polled slide descriptors through the control path,
/// outside any render tick. Invalid payloads are logged and skipped; the
/// previous slide list keeps running.
async fn watch_slide_config(
    cache: Arc<DataCache>,
    manager: Arc<Mutex<SlideManager>>,
    factory: Arc<SlideFactory>,
    initial: Vec<crate::slides::SlideDescriptor>,
    token: CancellationToken,
) {
    let mut applied = initial;
    let mut interval = tokio::time::interval(CONFIG_WATCH_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,

            _ = interval.tick() => {
                let Some(value) = cache.value(SourceId::SlideConfig) else { continue };
                match parse_descriptors(&value) {
                    Ok(descriptors) => {
                        if descriptors == applied {
                            continue;
                        }
                        let instances = factory.build(&descriptors);
                        info!(count = instances.len(), "applying remote slide configuration");
                        lock(&manager).update_slides(instances);
                        applied = descriptors;
                    }
                    Err(err) => {
                        warn!(error = %err, "ignoring invalid remote slide configuration");
                    }
                }
            }
        }
    }
}

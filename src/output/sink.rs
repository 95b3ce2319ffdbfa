use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::{
    error::{EngineError, EngineResult},
    output::transport::FrameTransport,
    render::surface::Surface,
};

/// Span of the rolling window `actual_fps` is computed over.
const FPS_WINDOW: Duration = Duration::from_secs(2);

/// How long one transport write may take before the tick gives up on it.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(750);

/// Throughput counters shared with the status surface. Updated by the sink
/// on every staged frame, readable from any task.
#[derive(Debug, Default)]
pub struct SinkMetrics {
    frame_count: AtomicU64,
    fps_bits: AtomicU64,
}

impl SinkMetrics {
    /// Monotonic count of frames staged for delivery.
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Frames per second actually achieved over the recent window.
    pub fn actual_fps(&self) -> f64 {
        f64::from_bits(self.fps_bits.load(Ordering::Relaxed))
    }

    fn record(&self, fps: f64) {
        self.frame_count.fetch_add(1, Ordering::Relaxed);
        self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
    }
}

/// Converts front surfaces into the opaque-RGBA wire format and hands them
/// to the transport, tracking pacing metrics along the way.
///
/// `stage` runs under the frame-pair lock (pure memory work); `submit`
/// performs the bounded transport write outside it. There is no frame
/// queue: a tick that cannot keep up simply emits at the achievable rate.
pub struct FrameSink {
    stream_name: String,
    transport: Box<dyn FrameTransport>,
    background: [u8; 4],
    scratch: Vec<u8>,
    staged: bool,
    recent: VecDeque<Instant>,
    metrics: Arc<SinkMetrics>,
    send_timeout: Duration,
}

impl FrameSink {
    pub fn new(
        stream_name: impl Into<String>,
        transport: Box<dyn FrameTransport>,
        background: [u8; 4],
    ) -> Self {
        Self {
            stream_name: stream_name.into(),
            transport,
            background,
            scratch: Vec::new(),
            staged: false,
            recent: VecDeque::new(),
            metrics: Arc::new(SinkMetrics::default()),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn metrics(&self) -> Arc<SinkMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn frame_count(&self) -> u64 {
        self.metrics.frame_count()
    }

    pub fn actual_fps(&self) -> f64 {
        self.metrics.actual_fps()
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Flatten the front surface into the wire format and advance metrics.
    /// Called once per tick, after `swap`; makes no assumption that ticks
    /// arrive at exactly the target rate.
    pub fn stage(&mut self, front: &Surface) -> EngineResult<()> {
        let len = front.data().len();
        if self.scratch.len() != len {
            self.scratch.resize(len, 0);
        }
        flatten_to_opaque_rgba8(&mut self.scratch, front.data(), self.background)?;
        self.staged = true;

        let now = Instant::now();
        self.recent.push_back(now);
        while let Some(&oldest) = self.recent.front() {
            if now.saturating_duration_since(oldest) > FPS_WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        let fps = match (self.recent.front(), self.recent.len()) {
            (Some(&first), n) if n >= 2 => {
                let span = now.saturating_duration_since(first).as_secs_f64();
                if span > 0.0 { (n - 1) as f64 / span } else { 0.0 }
            }
            _ => 0.0,
        };
        self.metrics.record(fps);
        Ok(())
    }

    /// Deliver the staged frame. The write is bounded by the send timeout so
    /// a stalled transport cannot permanently wedge the render loop.
    pub async fn submit(&mut self) -> EngineResult<()> {
        if !self.staged {
            return Err(EngineError::transport("submit without a staged frame"));
        }
        self.staged = false;
        match tokio::time::timeout(self.send_timeout, self.transport.send(&self.scratch)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::transport(format!(
                "frame write to '{}' timed out after {:?}",
                self.transport.name(),
                self.send_timeout
            ))),
        }
    }

    /// Convenience for callers without a lock to straddle.
    pub async fn push_frame(&mut self, front: &Surface) -> EngineResult<()> {
        self.stage(front)?;
        self.submit().await
    }

    pub async fn close(&mut self) -> EngineResult<()> {
        debug!(
            stream = %self.stream_name,
            frames = self.metrics.frame_count(),
            "closing frame sink"
        );
        self.transport.close().await
    }
}

/// Flatten premultiplied RGBA8 over an opaque background color, producing
/// the fully opaque pixels the wire format wants.
fn flatten_to_opaque_rgba8(dst: &mut [u8], src: &[u8], bg_rgba: [u8; 4]) -> EngineResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(EngineError::transport(
            "flatten expects equal-length rgba8 buffers",
        ));
    }

    let bg_r = u16::from(bg_rgba[0]);
    let bg_g = u16::from(bg_rgba[1]);
    let bg_b = u16::from(bg_rgba[2]);

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            d[3] = 255;
            continue;
        }

        let inv = 255u16 - a;
        d[0] = (u16::from(s[0]) + mul_div255(bg_r, inv)).min(255) as u8;
        d[1] = (u16::from(s[1]) + mul_div255(bg_g, inv)).min(255) as u8;
        d[2] = (u16::from(s[2]) + mul_div255(bg_b, inv)).min(255) as u8;
        d[3] = 255;
    }

    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Canvas;
    use crate::output::transport::NullTransport;
    use async_trait::async_trait;

    fn front() -> Surface {
        let mut s = Surface::new(Canvas {
            width: 8,
            height: 4,
        });
        s.clear([10, 20, 30, 255]);
        s
    }

    #[test]
    fn flatten_premul_over_black_produces_expected_rgb() {
        // Premultiplied red @ 50% alpha flattens to its premul rgb.
        let src = vec![128u8, 0, 0, 128];
        let mut dst = vec![0u8; 4];
        flatten_to_opaque_rgba8(&mut dst, &src, [0, 0, 0, 255]).unwrap();
        assert_eq!(dst, vec![128u8, 0, 0, 255]);
    }

    #[test]
    fn flatten_rejects_mismatched_buffers() {
        let src = vec![0u8; 8];
        let mut dst = vec![0u8; 4];
        assert!(flatten_to_opaque_rgba8(&mut dst, &src, [0, 0, 0, 255]).is_err());
    }

    #[tokio::test]
    async fn push_frame_advances_monotonic_count() {
        let mut sink = FrameSink::new("test", Box::new(NullTransport::new()), [0, 0, 0, 255]);
        let front = front();
        sink.push_frame(&front).await.unwrap();
        sink.push_frame(&front).await.unwrap();
        assert_eq!(sink.frame_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn actual_fps_tracks_real_cadence() {
        let mut sink = FrameSink::new("test", Box::new(NullTransport::new()), [0, 0, 0, 255]);
        let front = front();
        for _ in 0..31 {
            sink.push_frame(&front).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await; // 20 fps
        }
        let fps = sink.actual_fps();
        assert!((fps - 20.0).abs() < 1.0, "fps was {fps}");
    }

    struct StallingTransport;

    #[async_trait]
    impl FrameTransport for StallingTransport {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn send(&mut self, _frame: &[u8]) -> EngineResult<()> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn close(&mut self) -> EngineResult<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_transport_times_out_but_counters_advance() {
        let mut sink = FrameSink::new("test", Box::new(StallingTransport), [0, 0, 0, 255])
            .with_send_timeout(Duration::from_millis(100));
        let front = front();
        let err = sink.push_frame(&front).await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));
        // The tick still counted: the frame was produced, only delivery failed.
        assert_eq!(sink.frame_count(), 1);
    }
}

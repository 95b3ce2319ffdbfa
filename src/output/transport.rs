use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::debug;

use crate::{
    core::{Canvas, Fps},
    error::{EngineError, EngineResult},
};

/// Delivers opaque RGBA8 frames to wherever the stream goes. One transport
/// instance serves one run of the engine; `close` releases it.
#[async_trait]
pub trait FrameTransport: Send {
    /// Transport name for logging and status.
    fn name(&self) -> &str;

    /// Deliver one frame of `width × height × 4` bytes.
    async fn send(&mut self, frame: &[u8]) -> EngineResult<()>;

    async fn close(&mut self) -> EngineResult<()>;
}

/// Counts and discards frames. Used for headless runs and tests.
#[derive(Debug, Default)]
pub struct NullTransport {
    frames: u64,
}

impl NullTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[async_trait]
impl FrameTransport for NullTransport {
    fn name(&self) -> &str {
        "null"
    }

    async fn send(&mut self, _frame: &[u8]) -> EngineResult<()> {
        self.frames += 1;
        Ok(())
    }

    async fn close(&mut self) -> EngineResult<()> {
        debug!(frames = self.frames, "null transport closed");
        Ok(())
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Streams rawvideo frames into the system `ffmpeg` binary, which encodes
/// and emits the live feed. Network URLs (`udp://`, `rtp://`, `srt://`)
/// produce a low-latency MPEG-TS stream; anything else is treated as an
/// output file path.
///
/// We intentionally drive the system binary rather than linking FFmpeg to
/// avoid native dev header/lib requirements.
pub struct FfmpegStreamTransport {
    dest: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl FfmpegStreamTransport {
    pub fn spawn(canvas: Canvas, fps: Fps, dest: &str) -> EngineResult<Self> {
        if !is_ffmpeg_on_path() {
            return Err(EngineError::transport(
                "ffmpeg is required for stream output, but was not found on PATH",
            ));
        }

        let is_network = dest.contains("://");
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", canvas.width, canvas.height),
            "-r",
            &format!("{}/{}", fps.num, fps.den),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
        ]);

        if is_network {
            cmd.args(["-preset", "ultrafast", "-tune", "zerolatency", "-f", "mpegts"]);
        } else {
            cmd.args(["-movflags", "+faststart"]);
        }
        cmd.arg(dest);

        let mut child = cmd.spawn().map_err(|e| {
            EngineError::transport(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::transport("failed to open ffmpeg stdin (unexpected)"))?;

        debug!(dest, "ffmpeg stream transport started");
        Ok(Self {
            dest: dest.to_string(),
            child: Some(child),
            stdin: Some(stdin),
        })
    }
}

#[async_trait]
impl FrameTransport for FfmpegStreamTransport {
    fn name(&self) -> &str {
        &self.dest
    }

    async fn send(&mut self, frame: &[u8]) -> EngineResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(EngineError::transport("ffmpeg transport already closed"));
        };
        stdin
            .write_all(frame)
            .await
            .map_err(|e| EngineError::transport(format!("write frame to ffmpeg: {e}")))
    }

    async fn close(&mut self) -> EngineResult<()> {
        drop(self.stdin.take());
        let Some(child) = self.child.take() else {
            return Ok(());
        };
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| EngineError::transport(format!("wait for ffmpeg: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::transport(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

use std::collections::BTreeMap;

use crate::{
    core::{Canvas, Fps},
    data::cache::SourceId,
    error::{EngineError, EngineResult},
    slides::SlideDescriptor,
};

/// Full engine configuration, supplied at start and replaceable at runtime
/// through [`crate::Engine::update_config`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    pub canvas: Canvas,
    pub fps: Fps,
    /// Straight (non-premultiplied) RGBA background the back buffer is
    /// cleared to before each frame.
    #[serde(default = "default_background")]
    pub background: [u8; 4],
    #[serde(default = "default_stream_name")]
    pub stream_name: String,
    #[serde(default)]
    pub transition: TransitionSpec,
    #[serde(default)]
    pub slides: Vec<SlideDescriptor>,
    #[serde(default)]
    pub poll: PollIntervals,
    #[serde(default = "default_stale_threshold_ms")]
    pub stale_threshold_ms: u64,
    #[serde(default)]
    pub output: OutputSpec,
    /// Optional logo image blitted onto every slide; loaded once at start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    /// Demo payloads per source name, served by the CLI's static sources.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,
}

fn default_background() -> [u8; 4] {
    [18, 20, 28, 255]
}

fn default_stream_name() -> String {
    "signcast".to_string()
}

fn default_stale_threshold_ms() -> u64 {
    120_000
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(EngineError::validation("canvas width/height must be > 0"));
        }
        if self.fps.num == 0 || self.fps.den == 0 {
            return Err(EngineError::validation("fps must have num>0 and den>0"));
        }
        if self.stream_name.trim().is_empty() {
            return Err(EngineError::validation("stream_name must be non-empty"));
        }
        self.transition.parse_kind()?;
        self.poll.validate()?;
        self.output.validate()?;
        for (i, slide) in self.slides.iter().enumerate() {
            if slide.duration_ms == 0 {
                return Err(EngineError::validation(format!(
                    "slide[{i}] duration_ms must be > 0"
                )));
            }
        }
        Ok(())
    }

    /// Merge a partial update over this configuration, returning the merged
    /// result after validation. `self` is left untouched on error.
    pub fn merged(&self, patch: &EngineConfigPatch) -> EngineResult<Self> {
        let mut next = self.clone();
        if let Some(canvas) = patch.canvas {
            next.canvas = canvas;
        }
        if let Some(fps) = patch.fps {
            next.fps = fps;
        }
        if let Some(background) = patch.background {
            next.background = background;
        }
        if let Some(stream_name) = &patch.stream_name {
            next.stream_name = stream_name.clone();
        }
        if let Some(transition) = &patch.transition {
            next.transition = transition.clone();
        }
        if let Some(slides) = &patch.slides {
            next.slides = slides.clone();
        }
        if let Some(poll) = &patch.poll {
            next.poll = poll.clone();
        }
        if let Some(stale_threshold_ms) = patch.stale_threshold_ms {
            next.stale_threshold_ms = stale_threshold_ms;
        }
        if let Some(output) = &patch.output {
            next.output = output.clone();
        }
        if let Some(logo) = &patch.logo {
            next.logo = logo.clone();
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial configuration accepted by `update_config`. Absent fields keep
/// their current values.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct EngineConfigPatch {
    pub canvas: Option<Canvas>,
    pub fps: Option<Fps>,
    pub background: Option<[u8; 4]>,
    pub stream_name: Option<String>,
    pub transition: Option<TransitionSpec>,
    pub slides: Option<Vec<SlideDescriptor>>,
    pub poll: Option<PollIntervals>,
    pub stale_threshold_ms: Option<u64>,
    pub output: Option<OutputSpec>,
    pub logo: Option<Option<String>>,
}

/// Cross-slide transition as configured (kind by name, duration in ms).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransitionSpec {
    pub kind: String,
    pub duration_ms: u64,
}

impl Default for TransitionSpec {
    fn default() -> Self {
        Self {
            kind: "fade".to_string(),
            duration_ms: 500,
        }
    }
}

impl TransitionSpec {
    pub fn parse_kind(&self) -> EngineResult<TransitionKind> {
        let kind = self.kind.trim().to_ascii_lowercase();
        if kind.is_empty() {
            return Err(EngineError::validation("transition kind must be non-empty"));
        }
        match kind.as_str() {
            "fade" | "crossfade" => Ok(TransitionKind::Fade),
            "push" | "slide" => Ok(TransitionKind::Push),
            "cut" => Ok(TransitionKind::Cut),
            "none" => Ok(TransitionKind::None),
            _ => Err(EngineError::validation(format!(
                "unknown transition kind '{kind}'"
            ))),
        }
    }
}

/// Parsed transition kind. `Cut` and `None` both advance without blended
/// frames; they differ only in intent when written in config.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    Fade,
    Push,
    Cut,
    None,
}

impl TransitionKind {
    /// True when the kind produces no intermediate blended frames.
    pub fn is_instant(self) -> bool {
        matches!(self, Self::Cut | Self::None)
    }
}

/// Per-source polling intervals in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PollIntervals {
    #[serde(default = "default_business_interval_ms")]
    pub work_items_ms: u64,
    #[serde(default = "default_business_interval_ms")]
    pub orders_ms: u64,
    #[serde(default = "default_business_interval_ms")]
    pub revenue_ms: u64,
    #[serde(default = "default_business_interval_ms")]
    pub schedule_ms: u64,
    #[serde(default = "default_metrics_interval_ms")]
    pub metrics_ms: u64,
    #[serde(default = "default_slide_config_interval_ms")]
    pub slide_config_ms: u64,
}

fn default_business_interval_ms() -> u64 {
    30_000
}

fn default_metrics_interval_ms() -> u64 {
    15_000
}

fn default_slide_config_interval_ms() -> u64 {
    60_000
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            work_items_ms: default_business_interval_ms(),
            orders_ms: default_business_interval_ms(),
            revenue_ms: default_business_interval_ms(),
            schedule_ms: default_business_interval_ms(),
            metrics_ms: default_metrics_interval_ms(),
            slide_config_ms: default_slide_config_interval_ms(),
        }
    }
}

impl PollIntervals {
    pub fn for_source(&self, id: SourceId) -> std::time::Duration {
        let ms = match id {
            SourceId::WorkItems => self.work_items_ms,
            SourceId::Orders => self.orders_ms,
            SourceId::Revenue => self.revenue_ms,
            SourceId::Schedule => self.schedule_ms,
            SourceId::Metrics => self.metrics_ms,
            SourceId::SlideConfig => self.slide_config_ms,
        };
        std::time::Duration::from_millis(ms)
    }

    fn validate(&self) -> EngineResult<()> {
        for id in SourceId::ALL {
            if self.for_source(id).is_zero() {
                return Err(EngineError::validation(format!(
                    "poll interval for '{}' must be > 0",
                    id.name()
                )));
            }
        }
        Ok(())
    }
}

/// Where composed frames go.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputSpec {
    /// Discard frames after pacing/metrics (headless runs, tests).
    Null,
    /// Stream rawvideo into the system `ffmpeg` binary. `dest` is a network
    /// URL (`udp://...` emits MPEG-TS) or a file path.
    Ffmpeg { dest: String },
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self::Null
    }
}

impl OutputSpec {
    fn validate(&self) -> EngineResult<()> {
        if let Self::Ffmpeg { dest } = self
            && dest.trim().is_empty()
        {
            return Err(EngineError::validation("output dest must be non-empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> EngineConfig {
        EngineConfig {
            canvas: Canvas {
                width: 640,
                height: 360,
            },
            fps: Fps { num: 30, den: 1 },
            background: default_background(),
            stream_name: default_stream_name(),
            transition: TransitionSpec::default(),
            slides: Vec::new(),
            poll: PollIntervals::default(),
            stale_threshold_ms: default_stale_threshold_ms(),
            output: OutputSpec::Null,
            logo: None,
            data: BTreeMap::new(),
        }
    }

    #[test]
    fn transition_kind_parses_aliases() {
        let spec = TransitionSpec {
            kind: " Crossfade ".to_string(),
            duration_ms: 300,
        };
        assert_eq!(spec.parse_kind().unwrap(), TransitionKind::Fade);

        let spec = TransitionSpec {
            kind: "slide".to_string(),
            duration_ms: 300,
        };
        assert_eq!(spec.parse_kind().unwrap(), TransitionKind::Push);

        let spec = TransitionSpec {
            kind: "dissolve".to_string(),
            duration_ms: 300,
        };
        assert!(spec.parse_kind().is_err());
    }

    #[test]
    fn validate_catches_bad_values() {
        let mut cfg = base_config();
        cfg.canvas.width = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base_config();
        cfg.poll.orders_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base_config();
        cfg.output = OutputSpec::Ffmpeg {
            dest: "  ".to_string(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn merged_applies_patch_and_validates() {
        let cfg = base_config();
        let patch = EngineConfigPatch {
            stale_threshold_ms: Some(5_000),
            transition: Some(TransitionSpec {
                kind: "push".to_string(),
                duration_ms: 250,
            }),
            ..EngineConfigPatch::default()
        };
        let merged = cfg.merged(&patch).unwrap();
        assert_eq!(merged.stale_threshold_ms, 5_000);
        assert_eq!(merged.transition.kind, "push");
        // Untouched fields survive.
        assert_eq!(merged.canvas, cfg.canvas);

        let bad = EngineConfigPatch {
            fps: Some(Fps { num: 0, den: 1 }),
            ..EngineConfigPatch::default()
        };
        assert!(cfg.merged(&bad).is_err());
    }

    #[test]
    fn config_roundtrips_through_json() {
        let cfg = base_config();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.canvas, cfg.canvas);
        assert_eq!(back.transition, cfg.transition);
        assert_eq!(back.output, cfg.output);
    }
}

//! Slide model: descriptors (static or remotely polled), the closed
//! [`SlideKind`] registry, constructed [`SlideInstance`]s, and the
//! [`manager::SlideManager`] rotation/transition state machine.

pub mod content;
pub mod manager;

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::{
    core::Canvas,
    data::cache::{DataCache, SourceId},
    error::{EngineError, EngineResult},
    render::surface::Surface,
};

/// One slide as configured, before construction. Both the static config
/// list and the remotely polled descriptor list normalize to this shape.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SlideDescriptor {
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub options: serde_json::Value,
}

fn default_enabled() -> bool {
    true
}

/// The closed set of slide types the engine can instantiate. Remote
/// configurations may name kinds this build does not know; those map to
/// [`SlideKind::Unknown`] and render a placeholder instead of failing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlideKind {
    WorkItems,
    Orders,
    Revenue,
    Schedule,
    Metrics,
    Ticker,
    Unknown(String),
}

impl SlideKind {
    pub fn parse(kind: &str) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "work_items" | "workitems" => Self::WorkItems,
            "orders" => Self::Orders,
            "revenue" => Self::Revenue,
            "schedule" => Self::Schedule,
            "metrics" => Self::Metrics,
            "ticker" => Self::Ticker,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::WorkItems => "work_items",
            Self::Orders => "orders",
            Self::Revenue => "revenue",
            Self::Schedule => "schedule",
            Self::Metrics => "metrics",
            Self::Ticker => "ticker",
            Self::Unknown(s) => s,
        }
    }
}

/// Per-frame rendering capability of one slide. Implementations own any
/// animation state that must persist across frames (e.g. a scroll offset)
/// and reset it in [`SlideContent::reset`] when the slide is re-entered.
pub trait SlideContent: Send {
    fn render(
        &mut self,
        surface: &mut Surface,
        cache: &DataCache,
        dt_ms: f64,
    ) -> EngineResult<()>;

    fn reset(&mut self) {}
}

/// A constructed, stateful renderer bound to one descriptor. Created when
/// slides are (re)loaded, dropped when the slide list is replaced.
pub struct SlideInstance {
    descriptor: SlideDescriptor,
    kind: SlideKind,
    content: Box<dyn SlideContent>,
}

impl SlideInstance {
    /// Bind an externally built renderer to a descriptor. This is the seam
    /// for content implementations living outside this crate.
    pub fn from_content(descriptor: SlideDescriptor, content: Box<dyn SlideContent>) -> Self {
        let kind = SlideKind::parse(&descriptor.kind);
        Self {
            descriptor,
            kind,
            content,
        }
    }

    pub fn descriptor(&self) -> &SlideDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> &SlideKind {
        &self.kind
    }

    pub fn duration_ms(&self) -> u64 {
        self.descriptor.duration_ms
    }

    pub fn render(
        &mut self,
        surface: &mut Surface,
        cache: &DataCache,
        dt_ms: f64,
    ) -> EngineResult<()> {
        self.content.render(surface, cache, dt_ms)
    }

    pub fn reset(&mut self) {
        self.content.reset();
    }
}

/// Maps descriptors to constructed slide instances. Holds the one-time
/// loaded assets (logo) shared by every instance it builds.
pub struct SlideFactory {
    canvas: Canvas,
    logo: Option<Arc<Surface>>,
}

impl SlideFactory {
    /// Performs the one-time async asset load. IO happens here, never in a
    /// render path.
    pub async fn prepare(canvas: Canvas, logo_path: Option<&Path>) -> EngineResult<Self> {
        let logo = match logo_path {
            None => None,
            Some(path) => Some(Arc::new(load_logo(path).await?)),
        };
        Ok(Self { canvas, logo })
    }

    pub fn without_assets(canvas: Canvas) -> Self {
        Self { canvas, logo: None }
    }

    /// Construct fresh instances for every enabled descriptor, in order.
    /// Unknown kinds are logged and rendered as placeholders so a remote
    /// config from a newer deployment cannot take the output down.
    pub fn build(&self, descriptors: &[SlideDescriptor]) -> Vec<SlideInstance> {
        descriptors
            .iter()
            .filter(|d| d.enabled)
            .map(|d| self.build_one(d))
            .collect()
    }

    fn build_one(&self, descriptor: &SlideDescriptor) -> SlideInstance {
        let kind = SlideKind::parse(&descriptor.kind);
        let logo = self.logo.clone();
        let content: Box<dyn SlideContent> = match &kind {
            SlideKind::WorkItems => Box::new(content::SourcePanel::new(SourceId::WorkItems, logo)),
            SlideKind::Orders => Box::new(content::SourcePanel::new(SourceId::Orders, logo)),
            SlideKind::Revenue => Box::new(content::SourcePanel::new(SourceId::Revenue, logo)),
            SlideKind::Schedule => Box::new(content::SourcePanel::new(SourceId::Schedule, logo)),
            SlideKind::Metrics => Box::new(content::SourcePanel::new(SourceId::Metrics, logo)),
            SlideKind::Ticker => Box::new(content::TickerPanel::new(&descriptor.options, logo)),
            SlideKind::Unknown(name) => {
                warn!(kind = %name, "unknown slide kind; rendering placeholder");
                Box::new(content::PlaceholderPanel::new(
                    content::PlaceholderTone::UnknownKind,
                ))
            }
        };
        SlideInstance {
            descriptor: descriptor.clone(),
            kind,
            content,
        }
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }
}

/// Decode the remotely polled slide-configuration payload into descriptors.
/// Accepts either a bare array or an object with a `slides` array.
pub fn parse_descriptors(value: &serde_json::Value) -> EngineResult<Vec<SlideDescriptor>> {
    let list = match value {
        serde_json::Value::Array(_) => value.clone(),
        serde_json::Value::Object(map) => map
            .get("slides")
            .cloned()
            .ok_or_else(|| EngineError::validation("slide config object missing 'slides'"))?,
        _ => {
            return Err(EngineError::validation(
                "slide config must be an array or an object with 'slides'",
            ));
        }
    };
    serde_json::from_value(list)
        .map_err(|e| EngineError::validation(format!("invalid slide descriptors: {e}")))
}

async fn load_logo(path: &Path) -> EngineResult<Surface> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| EngineError::validation(format!("read logo '{}': {e}", path.display())))?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| EngineError::validation(format!("decode logo '{}': {e}", path.display())))?
        .to_rgba8();
    let canvas = Canvas {
        width: img.width(),
        height: img.height(),
    };
    let mut surface = Surface::new(canvas);
    for (dst, src) in surface
        .data_mut()
        .chunks_exact_mut(4)
        .zip(img.as_raw().chunks_exact(4))
    {
        let px = crate::render::composite::premultiply([src[0], src[1], src[2], src[3]]);
        dst.copy_from_slice(&px);
    }
    Ok(surface)
}

//! Built-in slide renderers. These are deliberately minimal panels that
//! visualize source state (present / loading / error) with flat fills; the
//! full chart/table/gauge renderers live behind the same [`SlideContent`]
//! seam in their own crates.

use std::sync::Arc;

use crate::{
    data::cache::{DataCache, SourceId},
    error::EngineResult,
    render::surface::Surface,
    slides::SlideContent,
};

const HEADER_FRACTION: f32 = 0.14;
const MARGIN_FRACTION: f32 = 0.04;

fn accent_for(source: SourceId) -> [u8; 4] {
    match source {
        SourceId::WorkItems => [66, 133, 244, 255],
        SourceId::Orders => [52, 168, 83, 255],
        SourceId::Revenue => [251, 188, 4, 255],
        SourceId::Schedule => [171, 71, 188, 255],
        SourceId::Metrics => [234, 67, 53, 255],
        SourceId::SlideConfig => [120, 120, 120, 255],
    }
}

fn dim(color: [u8; 4], factor: f32) -> [u8; 4] {
    let f = factor.clamp(0.0, 1.0);
    [
        (color[0] as f32 * f) as u8,
        (color[1] as f32 * f) as u8,
        (color[2] as f32 * f) as u8,
        color[3],
    ]
}

fn blit_logo(surface: &mut Surface, logo: Option<&Arc<Surface>>) {
    if let Some(logo) = logo {
        let margin = (surface.width() as f32 * MARGIN_FRACTION) as i32;
        let x = surface.width() as i32 - logo.width() as i32 - margin;
        let y = surface.height() as i32 - logo.height() as i32 - margin;
        surface.blit(logo, x, y);
    }
}

/// How many "entry" rows a payload visually translates to.
fn entry_count(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Array(items) => items.len(),
        serde_json::Value::Object(map) => map.len(),
        serde_json::Value::Null => 0,
        _ => 1,
    }
}

/// Generic per-source status panel: accent header, one row block per data
/// entry, loading stripes while the source has never been fetched.
pub struct SourcePanel {
    source: SourceId,
    logo: Option<Arc<Surface>>,
}

impl SourcePanel {
    pub fn new(source: SourceId, logo: Option<Arc<Surface>>) -> Self {
        Self { source, logo }
    }
}

impl SlideContent for SourcePanel {
    fn render(
        &mut self,
        surface: &mut Surface,
        cache: &DataCache,
        _dt_ms: f64,
    ) -> EngineResult<()> {
        let w = surface.width();
        let h = surface.height();
        let accent = accent_for(self.source);
        let header_h = (h as f32 * HEADER_FRACTION) as u32;
        let margin = (w as f32 * MARGIN_FRACTION) as i32;

        surface.fill_rect(0, 0, w, header_h.max(1), accent);

        match cache.value(self.source) {
            Some(value) => {
                let rows = entry_count(&value).clamp(1, 8) as u32;
                let body_top = header_h as i32 + margin;
                let body_h = h as i32 - body_top - margin;
                if body_h > 0 {
                    let row_h = (body_h as u32 / rows).max(1);
                    for i in 0..rows {
                        let y = body_top + (i * row_h) as i32;
                        surface.fill_rect(
                            margin,
                            y,
                            (w as i32 - 2 * margin).max(0) as u32,
                            (row_h * 3 / 4).max(1),
                            dim(accent, 0.35),
                        );
                    }
                }
            }
            None => paint_loading(surface, header_h),
        }

        blit_logo(surface, self.logo.as_ref());
        Ok(())
    }
}

/// Horizontally scrolling ticker band. The scroll offset persists across
/// frames while the slide is showing and rewinds on re-entry.
pub struct TickerPanel {
    offset_px: f32,
    speed_px_per_sec: f32,
    logo: Option<Arc<Surface>>,
}

impl TickerPanel {
    pub fn new(options: &serde_json::Value, logo: Option<Arc<Surface>>) -> Self {
        let speed = options
            .get("speed_px_per_sec")
            .and_then(|v| v.as_f64())
            .map(|v| v.clamp(1.0, 2000.0) as f32)
            .unwrap_or(80.0);
        Self {
            offset_px: 0.0,
            speed_px_per_sec: speed,
            logo,
        }
    }

    pub fn offset_px(&self) -> f32 {
        self.offset_px
    }
}

impl SlideContent for TickerPanel {
    fn render(
        &mut self,
        surface: &mut Surface,
        cache: &DataCache,
        dt_ms: f64,
    ) -> EngineResult<()> {
        self.offset_px += self.speed_px_per_sec * (dt_ms as f32) / 1000.0;

        let w = surface.width();
        let h = surface.height();
        let band_h = (h / 4).max(1);
        let band_y = (h / 2 - band_h / 2) as i32;
        surface.fill_rect(0, band_y, w, band_h, [30, 34, 44, 255]);

        // Repeating blocks marching right-to-left; block layout derives from
        // the payload entry count so content changes are visible.
        let entries = cache
            .value(SourceId::Orders)
            .map(|v| entry_count(&v))
            .unwrap_or(3)
            .clamp(1, 12) as u32;
        let block_w = (w / 6).max(8);
        let gap = block_w / 2;
        let period = ((block_w + gap) * entries).max(1) as f32;
        let phase = self.offset_px % period;

        let mut x = -(phase as i32);
        while x < w as i32 {
            surface.fill_rect(
                x,
                band_y + (band_h / 4) as i32,
                block_w,
                (band_h / 2).max(1),
                [99, 170, 255, 255],
            );
            x += (block_w + gap) as i32;
        }

        blit_logo(surface, self.logo.as_ref());
        Ok(())
    }

    fn reset(&mut self) {
        self.offset_px = 0.0;
    }
}

/// Why a placeholder is being shown instead of real content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceholderTone {
    /// Zero enabled slides.
    NoSlides,
    /// Remote config named a kind this build does not know.
    UnknownKind,
    /// A slide's renderer failed against the current cache contents.
    Error,
}

/// Flat fallback panel. Also paintable directly via [`paint_placeholder`]
/// when there is no instance to delegate to.
pub struct PlaceholderPanel {
    tone: PlaceholderTone,
}

impl PlaceholderPanel {
    pub fn new(tone: PlaceholderTone) -> Self {
        Self { tone }
    }
}

impl SlideContent for PlaceholderPanel {
    fn render(
        &mut self,
        surface: &mut Surface,
        _cache: &DataCache,
        _dt_ms: f64,
    ) -> EngineResult<()> {
        paint_placeholder(surface, self.tone);
        Ok(())
    }
}

/// Draw the placeholder pattern for `tone` over the whole surface.
pub fn paint_placeholder(surface: &mut Surface, tone: PlaceholderTone) {
    let (base, accent) = match tone {
        PlaceholderTone::NoSlides => ([24, 26, 34, 255], [90, 96, 110, 255]),
        PlaceholderTone::UnknownKind => ([34, 30, 20, 255], [190, 150, 60, 255]),
        PlaceholderTone::Error => ([40, 20, 20, 255], [200, 70, 60, 255]),
    };
    let w = surface.width();
    let h = surface.height();
    surface.fill_rect(0, 0, w, h, base);
    let bar_w = (w / 3).max(1);
    let bar_h = (h / 8).max(1);
    surface.fill_rect(
        (w / 2 - bar_w / 2) as i32,
        (h / 2 - bar_h / 2) as i32,
        bar_w,
        bar_h,
        accent,
    );
}

/// Gray stripes shown while a source has never been fetched.
fn paint_loading(surface: &mut Surface, header_h: u32) {
    let w = surface.width();
    let h = surface.height();
    let margin = (w as f32 * MARGIN_FRACTION) as i32;
    let top = header_h as i32 + margin;
    let stripe_h = ((h as i32 - top) / 6).max(1) as u32;
    for i in 0..3 {
        surface.fill_rect(
            margin,
            top + (i as i32) * (stripe_h as i32 * 2),
            (w as i32 - 2 * margin).max(0) as u32,
            stripe_h,
            [70, 72, 80, 255],
        );
    }
}

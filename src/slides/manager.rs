use tracing::{debug, warn};

use crate::{
    config::TransitionKind,
    core::Canvas,
    data::cache::DataCache,
    error::{EngineError, EngineResult},
    render::{composite, surface::Surface},
    slides::{
        SlideInstance,
        content::{self, PlaceholderTone},
    },
};

#[derive(Clone, Copy, Debug)]
struct ActiveTransition {
    next: usize,
    progress: f32,
}

/// Owns the ordered list of enabled slides, the rotation timer, and the
/// transition state machine. `render` is the single per-frame entry point;
/// it never blocks and never fails (a broken slide renders an error
/// placeholder instead of blanking the output).
///
/// Two states per rotation cycle: Idle (rendering the current slide) and
/// Transitioning (blending current and next as a function of progress).
/// Progress is monotone while active and the commit to the next index
/// happens exactly once, when progress reaches 1.
pub struct SlideManager {
    slides: Vec<SlideInstance>,
    current: usize,
    elapsed_ms: f64,
    transition_kind: TransitionKind,
    transition_duration_ms: u64,
    active: Option<ActiveTransition>,
    scratch_current: Surface,
    scratch_next: Surface,
    background: [u8; 4],
}

impl SlideManager {
    pub fn new(
        canvas: Canvas,
        background: [u8; 4],
        slides: Vec<SlideInstance>,
        transition_kind: TransitionKind,
        transition_duration_ms: u64,
    ) -> Self {
        Self {
            slides,
            current: 0,
            elapsed_ms: 0.0,
            transition_kind,
            transition_duration_ms,
            active: None,
            scratch_current: Surface::new(canvas),
            scratch_next: Surface::new(canvas),
            background,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    pub fn is_transitioning(&self) -> bool {
        self.active.is_some()
    }

    /// Current transition progress, 0 when idle.
    pub fn progress(&self) -> f32 {
        self.active.map(|t| t.progress).unwrap_or(0.0)
    }

    /// Render one frame into the (already cleared) back surface.
    pub fn render(&mut self, back: &mut Surface, cache: &DataCache, dt_ms: f64) {
        if self.slides.is_empty() {
            content::paint_placeholder(back, PlaceholderTone::NoSlides);
            return;
        }

        match self.active {
            Some(mut transition) => {
                transition.progress += (dt_ms / self.transition_duration_ms.max(1) as f64) as f32;
                if transition.progress >= 1.0 {
                    self.commit(transition.next);
                    self.render_plain(back, cache, dt_ms);
                } else {
                    self.active = Some(transition);
                    self.render_blend(back, cache, dt_ms, transition);
                }
            }
            None => {
                self.elapsed_ms += dt_ms;
                let duration = self.slides[self.current].duration_ms() as f64;
                if self.elapsed_ms >= duration {
                    self.begin_rotation(back, cache, dt_ms, duration);
                } else {
                    self.render_plain(back, cache, dt_ms);
                }
            }
        }
    }

    fn begin_rotation(&mut self, back: &mut Surface, cache: &DataCache, dt_ms: f64, duration: f64) {
        // A single slide never transitions; the timer still rewinds so the
        // elapsed counter cannot grow without bound.
        if self.slides.len() == 1 {
            self.elapsed_ms = 0.0;
            self.render_plain(back, cache, dt_ms);
            return;
        }

        let next = (self.current + 1) % self.slides.len();
        if self.transition_kind.is_instant() || self.transition_duration_ms == 0 {
            // No blended state: this very frame already shows the new slide.
            self.commit(next);
            self.render_plain(back, cache, dt_ms);
            return;
        }

        self.slides[next].reset();
        // Seed progress with the tick's overshoot past the slide duration so
        // pacing jitter does not stretch the transition.
        let overshoot = (self.elapsed_ms - duration).max(0.0);
        let transition = ActiveTransition {
            next,
            progress: (overshoot / self.transition_duration_ms.max(1) as f64) as f32,
        };
        debug!(
            from = self.current,
            to = next,
            "starting slide transition"
        );
        self.active = Some(transition);
        self.render_blend(back, cache, dt_ms, transition);
    }

    /// The single point where `current` advances. Runs exactly once per
    /// completed transition (or instant advance).
    fn commit(&mut self, next: usize) {
        self.active = None;
        self.current = next;
        self.elapsed_ms = 0.0;
        self.slides[next].reset();
    }

    fn render_plain(&mut self, back: &mut Surface, cache: &DataCache, dt_ms: f64) {
        let idx = self.current;
        if let Err(err) = self.slides[idx].render(back, cache, dt_ms) {
            warn!(slide = idx, error = %err, "slide render failed; showing placeholder");
            content::paint_placeholder(back, PlaceholderTone::Error);
        }
    }

    fn render_blend(
        &mut self,
        back: &mut Surface,
        cache: &DataCache,
        dt_ms: f64,
        transition: ActiveTransition,
    ) {
        let background = self.background;
        self.scratch_current.clear(background);
        self.scratch_next.clear(background);

        let current = self.current;
        if let Err(err) = self.slides[current].render(&mut self.scratch_current, cache, dt_ms) {
            warn!(slide = current, error = %err, "slide render failed; showing placeholder");
            content::paint_placeholder(&mut self.scratch_current, PlaceholderTone::Error);
        }
        if let Err(err) = self.slides[transition.next].render(&mut self.scratch_next, cache, dt_ms)
        {
            warn!(slide = transition.next, error = %err, "slide render failed; showing placeholder");
            content::paint_placeholder(&mut self.scratch_next, PlaceholderTone::Error);
        }

        let blended = match self.transition_kind {
            TransitionKind::Fade => back
                .copy_from(&self.scratch_current)
                .and_then(|()| back.composite_over(&self.scratch_next, transition.progress)),
            TransitionKind::Push => composite::push_into(
                back,
                &self.scratch_current,
                &self.scratch_next,
                transition.progress,
            ),
            // Instant kinds never reach the blended state.
            TransitionKind::Cut | TransitionKind::None => back.copy_from(&self.scratch_next),
        };
        if let Err(err) = blended {
            warn!(error = %err, "transition blend failed");
        }
    }

    /// Control-path jump. Cancels any active transition and restarts the
    /// per-slide timer. Out-of-range indices are reported, not clamped.
    pub fn jump_to(&mut self, index: usize) -> EngineResult<()> {
        if index >= self.slides.len() {
            return Err(EngineError::lifecycle(format!(
                "slide index {index} out of range ({} slides)",
                self.slides.len()
            )));
        }
        self.active = None;
        self.current = index;
        self.elapsed_ms = 0.0;
        self.slides[index].reset();
        Ok(())
    }

    /// Control-path hot reload: replace the slide list with freshly
    /// constructed instances. In-flight transitions are abandoned. The
    /// current index and timer survive when still in range, otherwise both
    /// rewind to slide 0.
    pub fn update_slides(&mut self, slides: Vec<SlideInstance>) {
        self.active = None;
        self.slides = slides;
        if self.current >= self.slides.len() {
            self.current = 0;
            self.elapsed_ms = 0.0;
        }
        debug!(count = self.slides.len(), "slide list replaced");
    }

    /// Replace the transition behavior for subsequent rotations.
    pub fn set_transition(&mut self, kind: TransitionKind, duration_ms: u64) {
        self.transition_kind = kind;
        self.transition_duration_ms = duration_ms;
    }

    /// Rewind to slide 0 with fresh per-slide state.
    pub fn reset(&mut self) {
        self.active = None;
        self.current = 0;
        self.elapsed_ms = 0.0;
        for slide in &mut self.slides {
            slide.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slides::{SlideContent, SlideDescriptor, SlideFactory};

    const CANVAS: Canvas = Canvas {
        width: 32,
        height: 18,
    };
    const BG: [u8; 4] = [0, 0, 0, 255];

    fn descriptor(kind: &str, duration_ms: u64) -> SlideDescriptor {
        SlideDescriptor {
            kind: kind.to_string(),
            enabled: true,
            duration_ms,
            title: None,
            options: serde_json::Value::Null,
        }
    }

    fn manager(kinds: &[&str], duration_ms: u64, kind: TransitionKind, trans_ms: u64) -> SlideManager {
        let factory = SlideFactory::without_assets(CANVAS);
        let descriptors: Vec<_> = kinds.iter().map(|k| descriptor(k, duration_ms)).collect();
        SlideManager::new(CANVAS, BG, factory.build(&descriptors), kind, trans_ms)
    }

    fn frame(mgr: &mut SlideManager, cache: &DataCache, dt: f64) -> Surface {
        let mut back = Surface::new(CANVAS);
        back.clear(BG);
        mgr.render(&mut back, cache, dt);
        back
    }

    #[test]
    fn zero_slides_renders_placeholder() {
        let mut mgr = manager(&[], 5000, TransitionKind::Fade, 500);
        let cache = DataCache::new();
        let got = frame(&mut mgr, &cache, 33.0);

        let mut want = Surface::new(CANVAS);
        content::paint_placeholder(&mut want, PlaceholderTone::NoSlides);
        assert_eq!(got, want);
        assert_eq!(mgr.slide_count(), 0);
    }

    #[test]
    fn single_slide_never_transitions_and_timer_rewinds() {
        let mut mgr = manager(&["orders"], 1000, TransitionKind::Fade, 500);
        let cache = DataCache::new();

        frame(&mut mgr, &cache, 999.0);
        assert!(!mgr.is_transitioning());

        frame(&mut mgr, &cache, 2.0); // crosses the duration
        assert!(!mgr.is_transitioning());
        assert_eq!(mgr.current_index(), 0);
        assert_eq!(mgr.elapsed_ms, 0.0);
    }

    #[test]
    fn progress_is_monotone_and_commit_happens_once() {
        let mut mgr = manager(&["orders", "revenue"], 1000, TransitionKind::Fade, 400);
        let cache = DataCache::new();

        frame(&mut mgr, &cache, 1000.0); // enters transition at progress 0
        assert!(mgr.is_transitioning());

        let mut last = mgr.progress();
        for _ in 0..3 {
            frame(&mut mgr, &cache, 100.0);
            assert!(mgr.is_transitioning());
            assert!(mgr.progress() >= last);
            assert_eq!(mgr.current_index(), 0, "index must not change mid-transition");
            last = mgr.progress();
        }

        frame(&mut mgr, &cache, 100.0); // progress reaches 1.0
        assert!(!mgr.is_transitioning());
        assert_eq!(mgr.current_index(), 1);
        assert_eq!(mgr.progress(), 0.0);
    }

    #[test]
    fn fade_endpoints_match_plain_slides() {
        let cache = DataCache::new();

        // Entering exactly at the duration boundary blends at progress 0,
        // which must be indistinguishable from the current slide alone.
        let mut mgr = manager(&["orders", "revenue"], 5000, TransitionKind::Fade, 500);
        let entry = frame(&mut mgr, &cache, 5000.0);
        let mut plain_current = manager(&["orders"], 5000, TransitionKind::Fade, 500);
        assert_eq!(entry, frame(&mut plain_current, &cache, 33.0));

        // The frame after completion is the next slide alone.
        let committed = frame(&mut mgr, &cache, 500.0);
        assert_eq!(mgr.current_index(), 1);
        let mut plain_next = manager(&["revenue"], 5000, TransitionKind::Fade, 500);
        assert_eq!(committed, frame(&mut plain_next, &cache, 33.0));
    }

    #[test]
    fn cut_advances_without_blended_frames() {
        let mut mgr = manager(&["orders", "revenue"], 1000, TransitionKind::Cut, 500);
        let cache = DataCache::new();

        frame(&mut mgr, &cache, 500.0);
        assert_eq!(mgr.current_index(), 0);

        let advanced = frame(&mut mgr, &cache, 500.0);
        assert!(!mgr.is_transitioning());
        assert_eq!(mgr.current_index(), 1);

        let mut plain_next = manager(&["revenue"], 1000, TransitionKind::Cut, 500);
        assert_eq!(advanced, frame(&mut plain_next, &cache, 33.0));
    }

    #[test]
    fn zero_duration_fade_advances_immediately() {
        let mut mgr = manager(&["orders", "revenue"], 1000, TransitionKind::Fade, 0);
        let cache = DataCache::new();
        frame(&mut mgr, &cache, 1000.0);
        assert!(!mgr.is_transitioning());
        assert_eq!(mgr.current_index(), 1);
    }

    #[test]
    fn rotation_wraps_to_first_slide() {
        let mut mgr = manager(&["orders", "revenue"], 100, TransitionKind::Cut, 0);
        let cache = DataCache::new();
        frame(&mut mgr, &cache, 100.0);
        assert_eq!(mgr.current_index(), 1);
        frame(&mut mgr, &cache, 100.0);
        assert_eq!(mgr.current_index(), 0);
    }

    #[test]
    fn jump_validates_bounds_and_cancels_transition() {
        let mut mgr = manager(&["orders", "revenue"], 1000, TransitionKind::Fade, 400);
        let cache = DataCache::new();

        frame(&mut mgr, &cache, 1000.0);
        assert!(mgr.is_transitioning());

        assert!(matches!(
            mgr.jump_to(5),
            Err(EngineError::Lifecycle(_))
        ));

        mgr.jump_to(1).unwrap();
        assert!(!mgr.is_transitioning());
        assert_eq!(mgr.current_index(), 1);
    }

    #[test]
    fn update_slides_resets_out_of_range_index_and_abandons_transition() {
        let factory = SlideFactory::without_assets(CANVAS);
        let mut mgr = manager(
            &["orders", "revenue", "metrics"],
            1000,
            TransitionKind::Fade,
            400,
        );
        let cache = DataCache::new();

        mgr.jump_to(2).unwrap();
        frame(&mut mgr, &cache, 1000.0);
        assert!(mgr.is_transitioning());

        mgr.update_slides(factory.build(&[descriptor("orders", 1000)]));
        assert!(!mgr.is_transitioning());
        assert_eq!(mgr.current_index(), 0);
        assert_eq!(mgr.slide_count(), 1);
    }

    struct FailingContent;

    impl SlideContent for FailingContent {
        fn render(
            &mut self,
            _surface: &mut Surface,
            _cache: &DataCache,
            _dt_ms: f64,
        ) -> crate::error::EngineResult<()> {
            Err(EngineError::render("no data layout for payload"))
        }
    }

    #[test]
    fn broken_slide_renders_error_placeholder_not_blank() {
        let instance = SlideInstance::from_content(descriptor("orders", 1000), Box::new(FailingContent));
        let mut mgr = SlideManager::new(CANVAS, BG, vec![instance], TransitionKind::Fade, 400);
        let cache = DataCache::new();

        let got = frame(&mut mgr, &cache, 33.0);
        let mut want = Surface::new(CANVAS);
        content::paint_placeholder(&mut want, PlaceholderTone::Error);
        assert_eq!(got, want);
    }
}

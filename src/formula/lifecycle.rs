//! Per-occurrence formula state machine
//!
//! Every issued request gets a generation number. A computation carries the
//! generation it was started for and only writes its result back if that
//! generation is still the latest for the occurrence; otherwise the result
//! is dropped. Staging elements are released whichever way a computation
//! ends.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use image::RgbImage;
use log::{debug, info, warn};
use tokio::task::LocalSet;

use super::glyphs::GlyphFont;
use super::raster::{encode_with_fallback, Capture, EncodedImage, GlyphCapture};
use super::request::{FallbackContent, FormulaRequest, FormulaState, RenderedFormula};
use super::resolution::DeviceProfile;
use super::staging::{StagingArea, StagingElement};
use super::typeset::{KatexTypesetter, LayoutSignal, Typesetter};
use super::FormulaError;
use crate::config::FormulaSettings;

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Index of a formula occurrence within the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccurrenceId(pub usize);

/// Handle for one issued request.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub occurrence: OccurrenceId,
    pub generation: u64,
    pub request: FormulaRequest,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u64,
    request: FormulaRequest,
    state: FormulaState,
}

#[derive(Debug, Default)]
struct Registry {
    next_generation: u64,
    slots: BTreeMap<OccurrenceId, Slot>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

/// The controller used by the application.
pub type DefaultController = FormulaController<KatexTypesetter, GlyphCapture>;

/// Encodes a captured bitmap at the requested quality.
pub type EncodeFn = fn(&RgbImage, f32) -> Result<EncodedImage, FormulaError>;

/// Coordinates staging, capture and fallback for every occurrence.
///
/// Cloning is cheap and shares the registry, so clones can be moved into
/// local tasks.
pub struct FormulaController<T, C> {
    typesetter: Rc<T>,
    capture: Rc<C>,
    staging: StagingArea,
    device: DeviceProfile,
    settle_delay: Duration,
    encode: EncodeFn,
    registry: Rc<RefCell<Registry>>,
}

impl<T, C> Clone for FormulaController<T, C> {
    fn clone(&self) -> Self {
        Self {
            typesetter: Rc::clone(&self.typesetter),
            capture: Rc::clone(&self.capture),
            staging: self.staging.clone(),
            device: self.device,
            settle_delay: self.settle_delay,
            encode: self.encode,
            registry: Rc::clone(&self.registry),
        }
    }
}

impl DefaultController {
    /// KaTeX typesetting with a discovered glyph font.
    pub fn from_settings(settings: &FormulaSettings) -> Self {
        let font = GlyphFont::discover(settings.font_path.as_deref()).map(Rc::new);
        FormulaController::new(
            KatexTypesetter::new(font.clone()),
            GlyphCapture::new(font),
            settings,
        )
    }
}

impl<T: Typesetter, C: Capture> FormulaController<T, C> {
    pub fn new(typesetter: T, capture: C, settings: &FormulaSettings) -> Self {
        Self {
            typesetter: Rc::new(typesetter),
            capture: Rc::new(capture),
            staging: StagingArea::new(),
            device: DeviceProfile::new(settings.device_pixel_ratio),
            settle_delay: Duration::from_millis(settings.settle_delay_ms),
            encode: encode_with_fallback,
            registry: Rc::new(RefCell::new(Registry::default())),
        }
    }

    /// Replace the PNG-then-JPEG encoding step.
    pub fn with_encoder(mut self, encode: EncodeFn) -> Self {
        self.encode = encode;
        self
    }

    /// The staging area elements are attached to.
    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registry
    // ─────────────────────────────────────────────────────────────────────────

    /// Record `request` as the latest for `occurrence` and mark it loading.
    ///
    /// Any computation started for an earlier request of the occurrence will
    /// have its result discarded.
    pub fn issue(&self, occurrence: OccurrenceId, request: FormulaRequest) -> Ticket {
        let mut registry = self.registry.borrow_mut();
        registry.next_generation += 1;
        let generation = registry.next_generation;
        registry.slots.insert(
            occurrence,
            Slot {
                generation,
                request: request.clone(),
                state: FormulaState::Loading,
            },
        );
        Ticket {
            occurrence,
            generation,
            request,
        }
    }

    /// Current state of an occurrence.
    pub fn state(&self, occurrence: OccurrenceId) -> Option<FormulaState> {
        self.registry
            .borrow()
            .slots
            .get(&occurrence)
            .map(|slot| slot.state.clone())
    }

    /// Latest request issued for an occurrence.
    pub fn request(&self, occurrence: OccurrenceId) -> Option<FormulaRequest> {
        self.registry
            .borrow()
            .slots
            .get(&occurrence)
            .map(|slot| slot.request.clone())
    }

    /// Every occurrence with its state, in occurrence order.
    pub fn states(&self) -> Vec<(OccurrenceId, FormulaState)> {
        self.registry
            .borrow()
            .slots
            .iter()
            .map(|(id, slot)| (*id, slot.state.clone()))
            .collect()
    }

    /// Occurrences still waiting for a result.
    pub fn pending_occurrences(&self) -> Vec<OccurrenceId> {
        self.registry
            .borrow()
            .slots
            .iter()
            .filter(|(_, slot)| !slot.state.is_settled())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Forget every occurrence. In-flight results will be dropped.
    pub fn clear(&self) {
        self.registry.borrow_mut().slots.clear();
    }

    /// Write `state` back if `ticket` is still the latest request.
    fn commit(&self, ticket: &Ticket, state: FormulaState) -> bool {
        let mut registry = self.registry.borrow_mut();
        match registry.slots.get_mut(&ticket.occurrence) {
            Some(slot) if slot.generation == ticket.generation => {
                if slot.state.is_settled() {
                    warn!(
                        "Occurrence {:?} already settled; ignoring second result",
                        ticket.occurrence
                    );
                    return false;
                }
                debug!(
                    "Occurrence {:?} settled as {}",
                    ticket.occurrence,
                    state.label()
                );
                slot.state = state;
                true
            }
            _ => {
                debug!(
                    "Dropping superseded result for {:?} (generation {})",
                    ticket.occurrence, ticket.generation
                );
                false
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rendering
    // ─────────────────────────────────────────────────────────────────────────

    /// Run the pipeline for `ticket`.
    ///
    /// Returns the committed state, or `None` if a newer request for the
    /// occurrence was issued while this one was in flight.
    pub async fn render(&self, ticket: Ticket) -> Option<FormulaState> {
        let state = self.compute(&ticket.request).await;
        self.commit(&ticket, state.clone()).then_some(state)
    }

    /// Issue and render many occurrences concurrently on one thread.
    ///
    /// Returns how many results were committed.
    pub async fn render_all(&self, requests: Vec<(OccurrenceId, FormulaRequest)>) -> usize
    where
        T: 'static,
        C: 'static,
    {
        let committed = Rc::new(RefCell::new(0usize));
        let local = LocalSet::new();
        for (occurrence, request) in requests {
            let ticket = self.issue(occurrence, request);
            let controller = self.clone();
            let committed = Rc::clone(&committed);
            local.spawn_local(async move {
                if controller.render(ticket).await.is_some() {
                    *committed.borrow_mut() += 1;
                }
            });
        }
        local.await;
        let count = *committed.borrow();
        info!("Rendered {} formula(s)", count);
        count
    }

    async fn compute(&self, request: &FormulaRequest) -> FormulaState {
        if request.is_empty() {
            return FormulaState::Fallback(FallbackContent::Text(request.source.clone()));
        }

        let mut element = self.staging.attach(request);
        let result = self.rasterize(&mut element, request).await;
        if let Err(e) = element.release() {
            warn!("{}", e);
        }

        match result {
            Ok(rendered) => FormulaState::Rendered(rendered),
            Err(FormulaError::Encode(detail)) => {
                warn!("Formula image generation failed: {}", detail);
                FormulaState::Error {
                    detail,
                    fallback: FallbackContent::Text(request.source.clone()),
                }
            }
            Err(e) => {
                debug!("Falling back for {:?}: {}", request.source, e);
                FormulaState::Fallback(self.fallback(request))
            }
        }
    }

    async fn rasterize(
        &self,
        element: &mut StagingElement,
        request: &FormulaRequest,
    ) -> Result<RenderedFormula, FormulaError> {
        let signal = element.typeset(self.typesetter.as_ref(), &request.source)?;
        if signal == LayoutSignal::Pending && !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        element.recenter();

        let scale = self.device.scale_for(request.target_dpi);
        let image = self.capture.capture(element, scale).await?;
        tokio::task::yield_now().await;
        let encoded = (self.encode)(&image, request.quality)?;

        let (css_w, css_h) = element.measure().max();
        Ok(RenderedFormula {
            data_uri: encoded.data_uri(),
            width: css_w.ceil() as u32,
            height: css_h.ceil() as u32,
            pixel_width: image.width(),
            pixel_height: image.height(),
        })
    }

    /// Typeset markup if the engine accepts the source, raw text otherwise.
    fn fallback(&self, request: &FormulaRequest) -> FallbackContent {
        match self
            .typesetter
            .render_inline_markup(&request.source, request.display_mode)
        {
            Ok(markup) => FallbackContent::Markup(markup),
            Err(_) => FallbackContent::Text(request.source.clone()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::glyphs::{GlyphRun, InkBox, RunMetrics};
    use crate::formula::raster::{encode_with, ImageEncoder};
    use crate::formula::request::DisplayMode;
    use crate::formula::typeset::TypesetFormula;
    use image::RgbImage;
    use std::cell::Cell;

    /// Typesets anything except sources containing `!`.
    struct MockTypesetter;

    impl Typesetter for MockTypesetter {
        fn typeset(
            &self,
            source: &str,
            _mode: DisplayMode,
            font_size: f32,
        ) -> Result<TypesetFormula, FormulaError> {
            if source.contains('!') {
                return Err(FormulaError::Typeset("bad source".to_string()));
            }
            let width = 10.0 * source.len() as f32;
            Ok(TypesetFormula {
                markup: format!("<math>{}</math>", source),
                run: GlyphRun::new(),
                metrics: RunMetrics {
                    width,
                    height: 20.0,
                    baseline: 16.0,
                    ink: InkBox {
                        left: 0.0,
                        top: 0.0,
                        right: width,
                        bottom: 20.0,
                    },
                },
                font_size,
                signal: LayoutSignal::Pending,
            })
        }

        fn render_inline_markup(
            &self,
            source: &str,
            _mode: DisplayMode,
        ) -> Result<String, FormulaError> {
            if source.contains('!') {
                return Err(FormulaError::Typeset("bad source".to_string()));
            }
            Ok(format!("<math>{}</math>", source))
        }
    }

    /// Captures after a per-source delay; sources containing `#` fail.
    #[derive(Default)]
    struct MockCapture {
        calls: Cell<usize>,
        delays: Vec<(String, u64)>,
    }

    impl Capture for MockCapture {
        async fn capture(
            &self,
            element: &StagingElement,
            scale: f64,
        ) -> Result<RgbImage, FormulaError> {
            self.calls.set(self.calls.get() + 1);
            let source = element
                .content()
                .map(|c| c.markup.clone())
                .unwrap_or_default();
            let delay = self
                .delays
                .iter()
                .find(|(s, _)| source.contains(s.as_str()))
                .map(|(_, d)| *d)
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if source.contains('#') {
                return Err(FormulaError::Capture("capture failed".to_string()));
            }
            let (w, h) = element.measure().max();
            let width = crate::formula::resolution::capture_dimension(w as f64, scale);
            let height = crate::formula::resolution::capture_dimension(h as f64, scale);
            Ok(RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255])))
        }
    }

    fn controller(capture: MockCapture) -> FormulaController<MockTypesetter, MockCapture> {
        FormulaController::new(MockTypesetter, capture, &FormulaSettings::default())
    }

    struct BrokenEncoder(&'static str);

    impl ImageEncoder for BrokenEncoder {
        fn mime_type(&self) -> &'static str {
            self.0
        }

        fn encode(&self, _image: &RgbImage) -> Result<Vec<u8>, FormulaError> {
            Err(FormulaError::Encode(format!("{} unavailable", self.0)))
        }
    }

    fn encode_nothing(image: &RgbImage, _quality: f32) -> Result<EncodedImage, FormulaError> {
        encode_with(image, &BrokenEncoder("image/png"), &BrokenEncoder("image/jpeg"))
    }

    fn inline(source: &str) -> FormulaRequest {
        FormulaRequest::new(source, DisplayMode::Inline)
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_settles_rendered() {
        let controller = controller(MockCapture::default());
        let ticket = controller.issue(OccurrenceId(0), inline("x+y"));
        assert_eq!(controller.pending_occurrences(), vec![OccurrenceId(0)]);

        let state = controller.render(ticket).await;
        match state {
            Some(FormulaState::Rendered(r)) => {
                assert!(r.data_uri.starts_with("data:image/png;base64,"));
                assert!(r.pixel_width > 0);
            }
            other => panic!("expected rendered, got {:?}", other),
        }
        assert!(controller.pending_occurrences().is_empty());
        assert_eq!(controller.staging().attached_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_source_skips_capture() {
        let controller = controller(MockCapture::default());
        let ticket = controller.issue(OccurrenceId(0), inline(""));
        let state = controller.render(ticket).await;
        assert_eq!(
            state,
            Some(FormulaState::Fallback(FallbackContent::Text(String::new())))
        );
        assert_eq!(controller.capture.calls.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typeset_failure_falls_back_to_text() {
        let controller = controller(MockCapture::default());
        let ticket = controller.issue(OccurrenceId(0), inline("x!"));
        let state = controller.render(ticket).await;
        assert_eq!(
            state,
            Some(FormulaState::Fallback(FallbackContent::Text("x!".into())))
        );
        assert_eq!(controller.staging().attached_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failure_falls_back_to_markup() {
        let controller = controller(MockCapture::default());
        let ticket = controller.issue(OccurrenceId(0), inline("#x"));
        let state = controller.render(ticket).await;
        assert_eq!(
            state,
            Some(FormulaState::Fallback(FallbackContent::Markup(
                "<math>#x</math>".into()
            )))
        );
        assert_eq!(controller.staging().attached_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_request_wins_when_it_resolves_first() {
        let capture = MockCapture {
            delays: vec![("slow".into(), 50), ("fast".into(), 5)],
            ..MockCapture::default()
        };
        let controller = controller(capture);
        let a = controller.issue(OccurrenceId(3), inline("slow"));
        let b = controller.issue(OccurrenceId(3), inline("fast"));

        let (ra, rb) = tokio::join!(controller.render(a), controller.render(b));
        assert!(ra.is_none());
        assert!(rb.is_some());
        assert_eq!(controller.request(OccurrenceId(3)).unwrap().source, "fast");
        assert_eq!(controller.staging().attached_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_request_wins_when_it_resolves_last() {
        let capture = MockCapture {
            delays: vec![("quick".into(), 5), ("lengthy".into(), 50)],
            ..MockCapture::default()
        };
        let controller = controller(capture);
        let a = controller.issue(OccurrenceId(1), inline("quick"));
        let b = controller.issue(OccurrenceId(1), inline("lengthy"));

        let (ra, rb) = tokio::join!(controller.render(a), controller.render(b));
        assert!(ra.is_none());
        let Some(FormulaState::Rendered(rendered)) = rb else {
            panic!("expected the later request to render");
        };
        // "lengthy" is wider than "quick"
        let quick_width = (10.0 * 5.0 + 8.0) as u32;
        assert!(rendered.width > quick_width);
        assert_eq!(
            controller.state(OccurrenceId(1)),
            Some(FormulaState::Rendered(rendered))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_all_settles_everything() {
        let controller = controller(MockCapture::default());
        let committed = controller
            .render_all(vec![
                (OccurrenceId(0), inline("a")),
                (OccurrenceId(1), inline("")),
                (OccurrenceId(2), inline("b!")),
            ])
            .await;
        assert_eq!(committed, 3);
        assert!(controller.pending_occurrences().is_empty());
        assert!(controller
            .states()
            .iter()
            .all(|(_, state)| state.is_settled()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_state_is_not_overwritten() {
        let controller = controller(MockCapture::default());
        let ticket = controller.issue(OccurrenceId(0), inline("a"));
        let first = controller.render(ticket.clone()).await;
        assert!(first.is_some());
        assert!(controller.render(ticket).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_occurrences_drop_results() {
        let controller = controller(MockCapture::default());
        let ticket = controller.issue(OccurrenceId(0), inline("a"));
        controller.clear();
        assert!(controller.render(ticket).await.is_none());
        assert!(controller.state(OccurrenceId(0)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_dpi_doubles_bitmap() {
        let controller = controller(MockCapture::default());
        let t96 = controller.issue(OccurrenceId(0), inline("abc"));
        let t192 = controller.issue(OccurrenceId(1), inline("abc").with_target_dpi(192));
        let Some(FormulaState::Rendered(a)) = controller.render(t96).await else {
            panic!("expected rendered");
        };
        let Some(FormulaState::Rendered(b)) = controller.render(t192).await else {
            panic!("expected rendered");
        };
        assert_eq!(a.width, b.width);
        assert_eq!(b.pixel_width, 2 * a.pixel_width);
        assert_eq!(b.pixel_height, 2 * a.pixel_height);
    }

    #[tokio::test]
    async fn test_katex_scenario_never_errors() {
        let controller = DefaultController::from_settings(&FormulaSettings::default());
        let ticket = controller.issue(OccurrenceId(0), inline("E=mc^2"));
        match controller.render(ticket).await {
            Some(FormulaState::Rendered(r)) => assert!(r.data_uri.len() > 22),
            Some(FormulaState::Fallback(FallbackContent::Markup(m))) => {
                assert!(m.contains("<math"))
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_renders_keep_staging_bounded() {
        let controller = controller(MockCapture::default());
        for round in 0..2_000 {
            let source = if round % 3 == 0 { "#x" } else { "x+y" };
            let ticket = controller.issue(OccurrenceId(0), inline(source));
            assert!(controller.render(ticket).await.is_some());
        }
        assert_eq!(controller.staging().attached_count(), 0);
        assert_eq!(controller.staging().node_count(), 1);
        assert!(controller.staging().arena_len() <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_encoding_settles_error_with_source() {
        let controller = controller(MockCapture::default()).with_encoder(encode_nothing);
        let ticket = controller.issue(OccurrenceId(0), inline("x^2"));
        match controller.render(ticket).await {
            Some(FormulaState::Error { detail, fallback }) => {
                assert!(detail.contains("image/png unavailable"));
                assert!(detail.contains("image/jpeg unavailable"));
                assert_eq!(fallback, FallbackContent::Text("x^2".into()));
            }
            other => panic!("expected error state, got {:?}", other),
        }
        assert_eq!(controller.capture.calls.get(), 1);
        assert_eq!(controller.staging().attached_count(), 0);
        assert!(controller.pending_occurrences().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_matrix_falls_back_to_markup() {
        let controller = FormulaController::new(
            KatexTypesetter::default(),
            MockCapture::default(),
            &FormulaSettings::default(),
        );
        let source = r"\begin{pmatrix}a&b\\c&d\end{pmatrix}";
        let ticket = controller.issue(
            OccurrenceId(0),
            FormulaRequest::new(source, DisplayMode::Block),
        );
        match controller.render(ticket).await {
            Some(FormulaState::Fallback(FallbackContent::Markup(markup))) => {
                assert!(markup.contains("<math"))
            }
            other => panic!("expected markup fallback, got {:?}", other),
        }
        assert_eq!(controller.capture.calls.get(), 0);
        assert_eq!(controller.staging().attached_count(), 0);
    }
}

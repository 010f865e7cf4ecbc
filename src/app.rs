//! Application State and Logic
//!
//! This module contains the session's UI-thread state: the canvas, the stroke
//! state machine, the brush, the prompt text and the frame sync gate.
//! It's designed to be independent of the windowing system and of the async
//! runtime. Session events come in, [`Action`]s go out.

use image::RgbaImage;

use crate::backend::BackendError;
use crate::brush::BrushStyle;
use crate::canvas::{Canvas, CanvasError};
use crate::config::Config;
use crate::frame_sync::{FrameSync, OverlapPolicy, Skip, Verdict};
use crate::input::{InputQueue, PointerEvent, StrokeState};
use crate::prompt::PromptText;
use crate::renderer::Renderer;
use crate::rotator::ColorRotator;
use crate::session::{Action, SessionEvent};

/// Main application state
pub struct App {
    canvas: Canvas,
    /// Pointer events not yet drawn
    input_queue: InputQueue,
    stroke: StrokeState,
    brush: BrushStyle,
    rotator: ColorRotator,
    prompt: PromptText,
    frame_sync: FrameSync,
    /// A prompt fetch is outstanding; the next tick waits for it
    prompt_in_flight: bool,
}

impl App {
    pub fn new(canvas: Canvas, brush: BrushStyle, prompt: PromptText, overlap: OverlapPolicy) -> Self {
        Self {
            canvas,
            input_queue: InputQueue::new(),
            stroke: StrokeState::default(),
            brush,
            rotator: ColorRotator::new(),
            prompt,
            frame_sync: FrameSync::new(overlap),
            prompt_in_flight: false,
        }
    }

    /// Build the app from configuration, loading the background image
    pub fn from_config(config: &Config) -> Result<Self, CanvasError> {
        let canvas = Canvas::load_background(&config.canvas.background)?;
        Ok(Self::new(
            canvas,
            config.brush,
            PromptText::new(config.prompt.initial.clone()),
            config.timing.overlap,
        ))
    }

    pub fn with_rotator(mut self, rotator: ColorRotator) -> Self {
        self.rotator = rotator;
        self
    }

    /// Queue an input event for processing
    pub fn queue_input_event(&mut self, event: PointerEvent) {
        self.input_queue.push_event(event);
    }

    /// Check if there are pending input events
    pub fn has_pending_input(&self) -> bool {
        self.input_queue.has_events()
    }

    /// Apply queued input in order, drawing each segment with the current brush
    pub fn process_input(&mut self) -> usize {
        let mut drawn = 0;
        for event in self.input_queue.drain_events() {
            if let Some(segment) = self.stroke.apply(&event) {
                self.canvas.draw_segment(&segment, &self.brush);
                drawn += 1;
            }
        }
        if drawn > 0 {
            log::trace!("Drew {} segments", drawn);
        }
        drawn
    }

    /// Handle a timer tick or a network completion
    pub fn handle_session_event(&mut self, event: SessionEvent) -> Option<Action> {
        // Input that arrived before this event is drawn with the state it saw
        self.process_input();

        match event {
            SessionEvent::FrameTick => self.on_frame_tick(),
            SessionEvent::ColorTick => {
                let color = self.rotator.next_color();
                self.brush.set_color(color);
                log::debug!("Brush color rotated to {}", color);
                None
            }
            SessionEvent::PromptTick => self.on_prompt_tick(),
            SessionEvent::FrameReady { generation, result } => {
                self.on_frame_ready(generation, result);
                None
            }
            SessionEvent::PromptReady(result) => {
                self.on_prompt_ready(result);
                None
            }
        }
    }

    fn on_frame_tick(&mut self) -> Option<Action> {
        let generation = match self.frame_sync.begin() {
            Ok(generation) => generation,
            Err(Skip::Busy) => {
                log::debug!("Frame tick skipped, request still in flight");
                return None;
            }
            Err(reason) => {
                log::trace!("Frame tick ignored ({:?})", reason);
                return None;
            }
        };

        log::debug!("Frame {}: captured canvas", generation);
        Some(Action::SubmitFrame {
            generation,
            frame: self.canvas.image().clone(),
        })
    }

    fn on_prompt_tick(&mut self) -> Option<Action> {
        if self.frame_sync.is_closed() {
            return None;
        }
        // every fetch advances the backend's prompt, so replies must not overlap
        if self.prompt_in_flight {
            log::debug!("Prompt tick skipped, fetch still in flight");
            return None;
        }
        self.prompt_in_flight = true;
        log::debug!("Fetching prompt");
        Some(Action::FetchPrompt)
    }

    fn on_frame_ready(&mut self, generation: u64, result: Result<RgbaImage, BackendError>) {
        match result {
            Ok(image) => match self.frame_sync.succeed(generation) {
                Verdict::Apply => {
                    self.canvas.replace_with(&image);
                    log::debug!("Frame {}: composited {}x{}", generation, image.width(), image.height());
                }
                Verdict::Stale => log::debug!("Frame {}: stale response dropped", generation),
                Verdict::Closed => log::debug!("Frame {}: response after teardown dropped", generation),
            },
            Err(e) => {
                if self.frame_sync.fail(generation) != Verdict::Closed {
                    log::warn!("Frame {}: regeneration failed: {}", generation, e);
                }
            }
        }
    }

    fn on_prompt_ready(&mut self, result: Result<String, BackendError>) {
        self.prompt_in_flight = false;
        if self.frame_sync.is_closed() {
            return;
        }
        match result {
            Ok(prompt) => {
                if self.prompt.set(prompt) {
                    log::info!("Prompt updated: {}", self.prompt.as_str());
                }
            }
            Err(e) => log::warn!("Prompt fetch failed: {}", e),
        }
    }

    /// Render the application (called each frame)
    pub fn render(&mut self, renderer: &mut Renderer) {
        self.process_input();

        if self.canvas.take_dirty() {
            renderer.upload_canvas(self.canvas.image());
        }

        renderer.render();
    }

    /// Restore the initial background image
    pub fn reset_canvas(&mut self) {
        self.process_input();
        self.canvas.reset_to_background();
        log::info!("Canvas reset to background");
    }

    /// Pause or resume the frame sync loop, returning the new paused state
    pub fn toggle_sync_paused(&mut self) -> bool {
        let paused = !self.frame_sync.is_paused();
        self.frame_sync.set_paused(paused);
        log::info!("Frame sync {}", if paused { "paused" } else { "resumed" });
        paused
    }

    /// Stop reacting to session events; later completions become no-ops
    pub fn shutdown(&mut self) {
        self.frame_sync.close();
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn brush(&self) -> &BrushStyle {
        &self.brush
    }

    pub fn prompt(&self) -> &PromptText {
        &self.prompt
    }

    pub fn frame_sync(&self) -> &FrameSync {
        &self.frame_sync
    }

    pub fn stroke(&self) -> &StrokeState {
        &self.stroke
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::HexColor;
    use image::Rgba;

    const PAPER: [u8; 4] = [250, 250, 250, 255];

    fn app(width: u32, height: u32, overlap: OverlapPolicy) -> App {
        let canvas = Canvas::from_background(RgbaImage::from_pixel(width, height, Rgba(PAPER))).unwrap();
        App::new(canvas, BrushStyle::new(HexColor::BLACK, 5.0), PromptText::default(), overlap)
            .with_rotator(ColorRotator::seeded(9))
    }

    fn draw_line(app: &mut App, from: [f32; 2], to: [f32; 2]) {
        app.queue_input_event(PointerEvent::down(from[0], from[1]));
        app.queue_input_event(PointerEvent::moved(to[0], to[1]));
        app.queue_input_event(PointerEvent::up(to[0], to[1]));
    }

    fn submit(app: &mut App) -> (u64, RgbaImage) {
        match app.handle_session_event(SessionEvent::FrameTick) {
            Some(Action::SubmitFrame { generation, frame }) => (generation, frame),
            other => panic!("expected a frame submission, got {:?}", other),
        }
    }

    #[test]
    fn test_initial_load_has_background_dimensions() {
        let app = app(64, 48, OverlapPolicy::SkipIfBusy);
        assert_eq!(app.canvas().dimensions(), (64, 48));
        assert!(app.canvas().image().pixels().all(|p| p.0 == PAPER));
        assert!(!app.stroke().is_drawing());
    }

    #[test]
    fn test_pointer_events_draw_with_current_brush() {
        let canvas = Canvas::from_background(RgbaImage::from_pixel(100, 100, Rgba(PAPER))).unwrap();
        let brush = BrushStyle::new("#FF0000".parse().unwrap(), 5.0);
        let mut app = App::new(canvas, brush, PromptText::default(), OverlapPolicy::SkipIfBusy);
        draw_line(&mut app, [10.0, 10.0], [50.0, 50.0]);
        assert!(app.has_pending_input());

        assert_eq!(app.process_input(), 1);
        assert_eq!(app.canvas().pixel(30, 30), [255, 0, 0, 255]);
        assert_eq!(app.canvas().pixel(80, 20), PAPER);
    }

    #[test]
    fn test_queued_input_is_drawn_before_color_rotation() {
        let mut app = app(100, 20, OverlapPolicy::SkipIfBusy);
        app.queue_input_event(PointerEvent::down(5.0, 10.0));
        app.queue_input_event(PointerEvent::moved(40.0, 10.0));

        app.handle_session_event(SessionEvent::ColorTick);
        let rotated = app.brush().color;
        app.queue_input_event(PointerEvent::moved(90.0, 10.0));
        app.process_input();

        assert_eq!(app.canvas().pixel(20, 10), [0, 0, 0, 255]);
        assert_eq!(app.canvas().pixel(70, 10), rotated.to_rgba());
    }

    #[test]
    fn test_frame_tick_captures_current_canvas() {
        let mut app = app(32, 16, OverlapPolicy::SkipIfBusy);
        draw_line(&mut app, [2.0, 8.0], [30.0, 8.0]);

        let (_, sent) = submit(&mut app);
        assert_eq!(&sent, app.canvas().image());
        assert_eq!(sent.get_pixel(16, 8).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_successful_response_replaces_buffer() {
        let mut app = app(40, 30, OverlapPolicy::SkipIfBusy);
        draw_line(&mut app, [0.0, 0.0], [39.0, 29.0]);
        let (generation, _) = submit(&mut app);

        let generated = RgbaImage::from_pixel(10, 10, Rgba([0, 128, 255, 255]));
        app.handle_session_event(SessionEvent::FrameReady { generation, result: Ok(generated) });

        assert_eq!(app.canvas().dimensions(), (40, 30));
        let close = |a: u8, b: u8| a.abs_diff(b) <= 1;
        assert!(app
            .canvas()
            .image()
            .pixels()
            .all(|p| p.0.iter().zip([0, 128, 255, 255]).all(|(&a, b)| close(a, b))));
    }

    #[test]
    fn test_failed_response_leaves_buffer_untouched() {
        let mut app = app(40, 30, OverlapPolicy::SkipIfBusy);
        draw_line(&mut app, [5.0, 5.0], [35.0, 25.0]);
        let (generation, _) = submit(&mut app);
        let before = app.canvas().image().clone();

        app.handle_session_event(SessionEvent::FrameReady {
            generation,
            result: Err(BackendError::Transport("connection refused".into())),
        });
        assert_eq!(app.canvas().image(), &before);

        // the loop carries on with the next tick
        assert!(app.handle_session_event(SessionEvent::FrameTick).is_some());
    }

    #[test]
    fn test_skip_if_busy_suppresses_overlapping_ticks() {
        let mut app = app(8, 8, OverlapPolicy::SkipIfBusy);
        let (generation, _) = submit(&mut app);
        assert_eq!(app.handle_session_event(SessionEvent::FrameTick), None);

        app.handle_session_event(SessionEvent::FrameReady {
            generation,
            result: Err(BackendError::Status(500)),
        });
        assert!(app.handle_session_event(SessionEvent::FrameTick).is_some());
    }

    #[test]
    fn test_latest_wins_drops_out_of_order_response() {
        let mut app = app(8, 8, OverlapPolicy::LatestWins);
        let (slow, _) = submit(&mut app);
        let (fast, _) = submit(&mut app);

        let newer = RgbaImage::from_pixel(8, 8, Rgba([1, 1, 1, 255]));
        let older = RgbaImage::from_pixel(8, 8, Rgba([2, 2, 2, 255]));
        app.handle_session_event(SessionEvent::FrameReady { generation: fast, result: Ok(newer) });
        app.handle_session_event(SessionEvent::FrameReady { generation: slow, result: Ok(older) });

        assert_eq!(app.canvas().pixel(4, 4), [1, 1, 1, 255]);
    }

    #[test]
    fn test_color_rotation_yields_valid_hex() {
        let mut app = app(8, 8, OverlapPolicy::SkipIfBusy);
        for _ in 0..20 {
            assert_eq!(app.handle_session_event(SessionEvent::ColorTick), None);
            let text = app.brush().color.to_string();
            assert_eq!(text.len(), 7);
            assert_eq!(text.parse::<HexColor>().unwrap(), app.brush().color);
        }
    }

    #[test]
    fn test_prompt_updates_only_on_success() {
        let mut app = app(8, 8, OverlapPolicy::SkipIfBusy);
        assert_eq!(app.handle_session_event(SessionEvent::PromptTick), Some(Action::FetchPrompt));

        app.handle_session_event(SessionEvent::PromptReady(Ok("new prompt".to_string())));
        assert_eq!(app.prompt().as_str(), "new prompt");

        app.handle_session_event(SessionEvent::PromptReady(Err(BackendError::Timeout(
            std::time::Duration::from_secs(1),
        ))));
        assert_eq!(app.prompt().as_str(), "new prompt");
    }

    #[test]
    fn test_prompt_fetches_never_overlap() {
        let mut app = app(8, 8, OverlapPolicy::SkipIfBusy);
        assert_eq!(app.handle_session_event(SessionEvent::PromptTick), Some(Action::FetchPrompt));
        assert_eq!(app.handle_session_event(SessionEvent::PromptTick), None);

        app.handle_session_event(SessionEvent::PromptReady(Err(BackendError::Status(503))));
        assert_eq!(app.handle_session_event(SessionEvent::PromptTick), Some(Action::FetchPrompt));
        assert_eq!(app.handle_session_event(SessionEvent::PromptTick), None);

        app.handle_session_event(SessionEvent::PromptReady(Ok("next".to_string())));
        assert_eq!(app.handle_session_event(SessionEvent::PromptTick), Some(Action::FetchPrompt));
    }

    #[test]
    fn test_pause_and_reset() {
        let mut app = app(20, 20, OverlapPolicy::SkipIfBusy);
        assert!(app.toggle_sync_paused());
        assert_eq!(app.handle_session_event(SessionEvent::FrameTick), None);
        assert!(!app.toggle_sync_paused());

        draw_line(&mut app, [0.0, 10.0], [19.0, 10.0]);
        app.reset_canvas();
        assert!(app.canvas().image().pixels().all(|p| p.0 == PAPER));
    }

    #[test]
    fn test_responses_after_shutdown_are_ignored() {
        let mut app = app(8, 8, OverlapPolicy::SkipIfBusy);
        let (generation, _) = submit(&mut app);
        app.shutdown();

        let generated = RgbaImage::from_pixel(8, 8, Rgba([9, 9, 9, 255]));
        app.handle_session_event(SessionEvent::FrameReady { generation, result: Ok(generated) });
        app.handle_session_event(SessionEvent::PromptReady(Ok("late".to_string())));

        assert_eq!(app.canvas().pixel(0, 0), PAPER);
        assert_ne!(app.prompt().as_str(), "late");
        assert_eq!(app.handle_session_event(SessionEvent::FrameTick), None);
    }

    mod with_session {
        use super::*;
        use crate::backend::Backend;
        use crate::session::{Session, Timing};
        use futures::future::BoxFuture;
        use futures::FutureExt;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use std::time::Duration;
        use tokio::sync::mpsc;

        struct Unreachable;

        impl Backend for Unreachable {
            fn regenerate(&self, _raster: Vec<u8>) -> BoxFuture<'static, Result<Vec<u8>, BackendError>> {
                async { Err(BackendError::Transport("connection refused".to_string())) }.boxed()
            }

            fn current_prompt(&self) -> BoxFuture<'static, Result<String, BackendError>> {
                async { Err(BackendError::Transport("connection refused".to_string())) }.boxed()
            }
        }

        /// The first prompt request hangs far past the timeout, later ones answer at once
        struct StallsOnce {
            prompt_calls: Arc<AtomicUsize>,
        }

        impl Backend for StallsOnce {
            fn regenerate(&self, _raster: Vec<u8>) -> BoxFuture<'static, Result<Vec<u8>, BackendError>> {
                async { Err(BackendError::Status(503)) }.boxed()
            }

            fn current_prompt(&self) -> BoxFuture<'static, Result<String, BackendError>> {
                let call = self.prompt_calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        tokio::time::sleep(Duration::from_secs(600)).await;
                        Ok("older prompt".to_string())
                    } else {
                        Ok("newer prompt".to_string())
                    }
                }
                .boxed()
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_slow_prompt_never_overwrites_newer_one() {
            let mut app = app(8, 8, OverlapPolicy::SkipIfBusy);
            let prompt_calls = Arc::new(AtomicUsize::new(0));
            let (tx, mut rx) = mpsc::unbounded_channel();
            let mut session = Session::start(
                tokio::runtime::Handle::current(),
                Arc::new(StallsOnce {
                    prompt_calls: prompt_calls.clone(),
                }),
                Arc::new(tx),
                Timing::default(),
            );

            let deadline = tokio::time::Instant::now() + Duration::from_secs(650);
            while let Ok(Some(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
                if let Some(action) = app.handle_session_event(event) {
                    session.perform(action);
                }
            }

            assert!(prompt_calls.load(Ordering::SeqCst) > 1);
            assert_eq!(app.prompt().as_str(), "newer prompt");

            session.shutdown();
            app.shutdown();
        }

        #[tokio::test(start_paused = true)]
        async fn test_unreachable_backend_keeps_ticking() {
            let mut app = app(16, 16, OverlapPolicy::SkipIfBusy);
            draw_line(&mut app, [1.0, 1.0], [14.0, 14.0]);
            app.process_input();
            let before = app.canvas().image().clone();

            let (tx, mut rx) = mpsc::unbounded_channel();
            let mut session = Session::start(
                tokio::runtime::Handle::current(),
                Arc::new(Unreachable),
                Arc::new(tx),
                Timing::default(),
            );

            let started = tokio::time::Instant::now();
            let mut submitted = 0;
            let mut failed = 0;
            while submitted < 3 {
                let event = rx.recv().await.unwrap();
                if matches!(event, SessionEvent::FrameReady { result: Err(_), .. }) {
                    failed += 1;
                }
                if let Some(action) = app.handle_session_event(event) {
                    if matches!(action, Action::SubmitFrame { .. }) {
                        submitted += 1;
                    }
                    session.perform(action);
                }
            }
            // third request went out on the third tick
            assert_eq!(started.elapsed(), Duration::from_millis(750 * 3));
            assert_eq!(failed, 2);
            assert_eq!(app.canvas().image(), &before);

            session.shutdown();
            app.shutdown();
        }
    }
}

//! Session Lifecycle
//!
//! A [`Session`] binds the three recurring timers and every in-flight backend
//! call to one lifetime. Nothing here touches UI state: ticks and completions
//! are posted to an [`EventSink`] and handled on the UI thread, which answers
//! with [`Action`]s for the session to run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio::runtime::Handle;

use crate::backend::{Backend, BackendError};
use crate::canvas::{encode_raster, RasterFormat};
use crate::timer::Ticker;

/// Everything delivered to the UI thread
#[derive(Debug)]
pub enum SessionEvent {
    FrameTick,
    ColorTick,
    PromptTick,
    /// A regeneration round trip finished; the image is already decoded
    FrameReady {
        generation: u64,
        result: Result<RgbaImage, BackendError>,
    },
    PromptReady(Result<String, BackendError>),
}

/// Work the UI thread hands back to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A snapshot of the canvas; encoding happens off the UI thread
    SubmitFrame { generation: u64, frame: RgbaImage },
    FetchPrompt,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::SubmitFrame { .. } => "frame submission",
            Action::FetchPrompt => "prompt fetch",
        }
    }
}

/// Destination for session events; `false` means the receiver is gone
pub trait EventSink: Send + Sync + 'static {
    fn send(&self, event: SessionEvent) -> bool;
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<SessionEvent> {
    fn send(&self, event: SessionEvent) -> bool {
        tokio::sync::mpsc::UnboundedSender::send(self, event).is_ok()
    }
}

/// Timer periods and the bound on each backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub frame_interval: Duration,
    pub color_interval: Duration,
    pub prompt_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(750),
            color_interval: Duration::from_secs(10),
            prompt_interval: Duration::from_secs(45),
            request_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Session {
    runtime: Handle,
    backend: Arc<dyn Backend>,
    sink: Arc<dyn EventSink>,
    timers: Vec<Ticker>,
    request_timeout: Duration,
    live: Arc<AtomicBool>,
}

impl Session {
    /// Start all timers on `runtime`
    pub fn start(runtime: Handle, backend: Arc<dyn Backend>, sink: Arc<dyn EventSink>, timing: Timing) -> Self {
        let timers = vec![
            Ticker::spawn(&runtime, "frame sync", timing.frame_interval, sink.clone(), || SessionEvent::FrameTick),
            Ticker::spawn(&runtime, "color rotator", timing.color_interval, sink.clone(), || SessionEvent::ColorTick),
            Ticker::spawn(&runtime, "prompt sync", timing.prompt_interval, sink.clone(), || SessionEvent::PromptTick),
        ];
        log::info!("Session started");
        Self {
            runtime,
            backend,
            sink,
            timers,
            request_timeout: timing.request_timeout,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn perform(&self, action: Action) {
        if !self.is_live() {
            log::debug!("Session torn down, dropping {}", action.name());
            return;
        }
        match action {
            Action::SubmitFrame { generation, frame } => self.submit_frame(generation, frame),
            Action::FetchPrompt => self.fetch_prompt(),
        }
    }

    fn submit_frame(&self, generation: u64, frame: RgbaImage) {
        let backend = self.backend.clone();
        let format = backend.raster_format();
        let timeout = self.request_timeout;
        let sink = self.sink.clone();
        let live = self.live.clone();

        self.runtime.spawn(async move {
            let payload = match encode_frame(frame, format).await {
                Ok(payload) => payload,
                Err(err) => {
                    deliver(&live, sink.as_ref(), SessionEvent::FrameReady { generation, result: Err(err) });
                    return;
                }
            };
            if !live.load(Ordering::Acquire) {
                return;
            }

            log::debug!("Frame {generation}: sending {} bytes", payload.len());
            let result = match tokio::time::timeout(timeout, backend.regenerate(payload)).await {
                Ok(Ok(raster)) => decode_raster(raster).await,
                Ok(Err(err)) => Err(err),
                Err(_) => Err(BackendError::Timeout(timeout)),
            };
            deliver(&live, sink.as_ref(), SessionEvent::FrameReady { generation, result });
        });
    }

    fn fetch_prompt(&self) {
        let request = self.backend.current_prompt();
        let timeout = self.request_timeout;
        let sink = self.sink.clone();
        let live = self.live.clone();

        self.runtime.spawn(async move {
            let result = match tokio::time::timeout(timeout, request).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(timeout)),
            };
            deliver(&live, sink.as_ref(), SessionEvent::PromptReady(result));
        });
    }

    /// Stop every timer; completions still in flight are dropped on arrival
    pub fn shutdown(&mut self) {
        if !self.live.swap(false, Ordering::AcqRel) {
            return;
        }
        for timer in &mut self.timers {
            timer.stop();
        }
        self.timers.clear();
        log::info!("Session shut down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn deliver(live: &AtomicBool, sink: &dyn EventSink, event: SessionEvent) {
    if !live.load(Ordering::Acquire) {
        log::debug!("Session torn down, discarding {}", event_name(&event));
        return;
    }
    if !sink.send(event) {
        log::debug!("Event loop gone, discarding completion");
    }
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::FrameTick => "frame tick",
        SessionEvent::ColorTick => "color tick",
        SessionEvent::PromptTick => "prompt tick",
        SessionEvent::FrameReady { .. } => "frame response",
        SessionEvent::PromptReady(_) => "prompt response",
    }
}

/// Encode the canvas snapshot off the async workers
async fn encode_frame(frame: RgbaImage, format: RasterFormat) -> Result<Vec<u8>, BackendError> {
    tokio::task::spawn_blocking(move || encode_raster(&frame, format))
        .await
        .map_err(|err| BackendError::Encode(format!("encode task failed: {err}")))?
        .map_err(|err| BackendError::Encode(err.to_string()))
}

/// Decode the returned raster off the async workers
async fn decode_raster(raster: Vec<u8>) -> Result<RgbaImage, BackendError> {
    tokio::task::spawn_blocking(move || image::load_from_memory(&raster).map(|image| image.to_rgba8()))
        .await
        .map_err(|err| BackendError::Malformed(format!("decode task failed: {err}")))?
        .map_err(|err| BackendError::Malformed(format!("undecodable image: {err}")))
}

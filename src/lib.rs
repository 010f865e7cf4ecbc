//! Sketch Loop Library
//!
//! A drawing canvas that keeps a remote image generator in the loop: the
//! user sketches, the canvas is periodically sent to a backend, and the
//! regenerated image replaces the canvas when it comes back.
//!
//! The core ([`App`], [`Canvas`], [`FrameSync`]) is independent of the
//! windowing system and of the async runtime. [`Session`] owns the timers
//! and network calls, and [`AppWrapper`] wires both into winit.

mod app;
mod backend;
mod brush;
mod canvas;
mod color;
mod config;
mod frame_sync;
mod input;
mod prompt;
mod renderer;
mod rotator;
mod session;
mod timer;
mod window;
mod wire;

pub use app::App;
pub use backend::{Backend, BackendError, Endpoints, HttpBackend};
pub use brush::{BrushStyle, LineCap, LineJoin, Shadow, MITER_LIMIT};
pub use canvas::{encode_raster, Canvas, CanvasError, RasterFormat};
pub use color::{HexColor, ParseHexColorError};
pub use config::{BackendConfig, CanvasConfig, Config, PromptConfig, TimingConfig};
pub use frame_sync::{FrameSync, OverlapPolicy, Skip, Verdict};
pub use input::{InputQueue, PointerEvent, PointerEventType, Segment, StrokeState};
pub use prompt::{PromptText, DEFAULT_PROMPT};
pub use renderer::{Renderer, Viewport};
pub use rotator::ColorRotator;
pub use session::{Action, EventSink, Session, SessionEvent, Timing};
pub use timer::Ticker;
pub use window::{AppWrapper, Command, ProxySink};
pub use wire::{PayloadField, PromptResponse, WireError, WireFormat};

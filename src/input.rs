//! Input Event Handling
//!
//! This module handles pointer input events and turns them into stroke segments.
//! Events are queued in arrival order and drained by the app, which feeds them
//! through the [`StrokeState`] machine:
//!
//! ```text
//! Idle --Down--> Drawing --Move--> Drawing (emits a segment)
//!                Drawing --Up | Leave--> Idle
//! ```

use std::collections::VecDeque;

/// A pointer input event in canvas space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    /// Position in canvas space (pixels from top-left)
    pub position: [f32; 2],
    /// Type of event
    pub event_type: PointerEventType,
}

impl PointerEvent {
    pub fn down(x: f32, y: f32) -> Self {
        Self { position: [x, y], event_type: PointerEventType::Down }
    }

    pub fn moved(x: f32, y: f32) -> Self {
        Self { position: [x, y], event_type: PointerEventType::Move }
    }

    pub fn up(x: f32, y: f32) -> Self {
        Self { position: [x, y], event_type: PointerEventType::Up }
    }

    pub fn leave(x: f32, y: f32) -> Self {
        Self { position: [x, y], event_type: PointerEventType::Leave }
    }
}

/// Type of pointer event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEventType {
    /// Pointer button pressed (start of stroke)
    Down,
    /// Pointer moved
    Move,
    /// Pointer button released (end of stroke)
    Up,
    /// Pointer left the drawing surface (also ends the stroke)
    Leave,
}

/// One straight piece of a stroke, drawn with the brush style current when it is rendered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: [f32; 2],
    pub to: [f32; 2],
    /// Start of the previous segment in the same stroke, if this one continues it
    pub continues_from: Option<[f32; 2]>,
}

/// Per-gesture stroke state, owned by the drawing surface
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum StrokeState {
    #[default]
    Idle,
    Drawing {
        last_point: [f32; 2],
        /// Where the segment ending at `last_point` started
        previous_point: Option<[f32; 2]>,
    },
}

impl StrokeState {
    /// Apply one event, returning the segment to draw (if any)
    pub fn apply(&mut self, event: &PointerEvent) -> Option<Segment> {
        match (event.event_type, *self) {
            (PointerEventType::Down, _) => {
                *self = StrokeState::Drawing {
                    last_point: event.position,
                    previous_point: None,
                };
                None
            }
            (PointerEventType::Move, StrokeState::Drawing { last_point, previous_point }) => {
                let segment = Segment {
                    from: last_point,
                    to: event.position,
                    continues_from: previous_point,
                };
                // A zero-length move still paints a dot but gives no direction to join against
                if event.position != last_point {
                    *self = StrokeState::Drawing {
                        last_point: event.position,
                        previous_point: Some(last_point),
                    };
                }
                Some(segment)
            }
            (PointerEventType::Move, StrokeState::Idle) => None,
            (PointerEventType::Up | PointerEventType::Leave, _) => {
                *self = StrokeState::Idle;
                None
            }
        }
    }

    /// Check if currently drawing
    pub fn is_drawing(&self) -> bool {
        matches!(self, StrokeState::Drawing { .. })
    }

    /// Get the last recorded point of the active stroke
    pub fn last_point(&self) -> Option<[f32; 2]> {
        match self {
            StrokeState::Drawing { last_point, .. } => Some(*last_point),
            StrokeState::Idle => None,
        }
    }
}

/// FIFO of pointer events waiting to be applied to the canvas
#[derive(Debug, Default)]
pub struct InputQueue {
    events: VecDeque<PointerEvent>,
}

impl InputQueue {
    /// Create a new empty input queue
    pub fn new() -> Self {
        Self { events: VecDeque::new() }
    }

    /// Add an event to the queue
    pub fn push_event(&mut self, event: PointerEvent) {
        self.events.push_back(event);
        log::trace!("Input event queued: {:?} (queue size: {})", event.event_type, self.events.len());
    }

    /// Drain all pending events in arrival order
    pub fn drain_events(&mut self) -> impl Iterator<Item = PointerEvent> + '_ {
        self.events.drain(..)
    }

    /// Check if there are pending events
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}

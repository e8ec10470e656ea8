//! Normalized pointer/touch input payloads and admission.
//!
//! The UI layer translates raw device events into these payloads; the
//! core never sees a windowing toolkit type. Points arrive in page
//! space (the caller applies the camera transform on the way in).

use crate::error::InputAdmissionError;
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Stable identifier for one pointer (mouse, finger, stylus).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointerId(pub u32);

/// Which button/contact produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
    Touch,
}

/// Modifier keys held during the event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

/// One normalized pointer sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerInput {
    pub pointer: PointerId,
    /// Page-space position.
    pub point: Point,
    pub button: PointerButton,
    pub modifiers: Modifiers,
    /// Milliseconds since session start.
    pub time_ms: u64,
}

/// Named input events driving the interaction state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    PointedCanvas(PointerInput),
    PointedShape {
        input: PointerInput,
        target: crate::id::ShapeId,
    },
    RightPointed(PointerInput),
    MovedPointer(PointerInput),
    StoppedPointing(PointerInput),
    TouchedCanvas(PointerInput),
    /// Cancels an in-flight gesture; performs an undo when idle.
    TouchUndo,
}

impl InputEvent {
    /// The pointer sample carried by this event, if any.
    pub fn input(&self) -> Option<&PointerInput> {
        match self {
            InputEvent::PointedCanvas(i)
            | InputEvent::RightPointed(i)
            | InputEvent::MovedPointer(i)
            | InputEvent::StoppedPointing(i)
            | InputEvent::TouchedCanvas(i) => Some(i),
            InputEvent::PointedShape { input, .. } => Some(input),
            InputEvent::TouchUndo => None,
        }
    }

    /// Whether this event begins a gesture (pointer-down kind).
    pub fn is_down(&self) -> bool {
        matches!(
            self,
            InputEvent::PointedCanvas(_)
                | InputEvent::PointedShape { .. }
                | InputEvent::TouchedCanvas(_)
        )
    }
}

/// Pointer capture discipline: one primary pointer owns the gesture
/// from down to up, and events from other pointers are dropped while it
/// does. Release is guaranteed on every terminal transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerCapture {
    captured: Option<PointerId>,
}

impl PointerCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a pointer id would be admitted right now.
    pub fn can_accept(&self, pointer: PointerId) -> bool {
        self.captured.is_none_or(|captured| captured == pointer)
    }

    /// The currently captured pointer, if any.
    pub fn captured(&self) -> Option<PointerId> {
        self.captured
    }

    /// Capture the surface for this pointer.
    pub fn capture(&mut self, pointer: PointerId) -> Result<(), InputAdmissionError> {
        self.admit(pointer)?;
        self.captured = Some(pointer);
        Ok(())
    }

    /// Check admission without capturing (move/up events).
    pub fn admit(&self, pointer: PointerId) -> Result<(), InputAdmissionError> {
        if self.can_accept(pointer) {
            Ok(())
        } else {
            Err(InputAdmissionError { pointer })
        }
    }

    /// Release if this pointer holds the capture.
    pub fn release(&mut self, pointer: PointerId) {
        if self.captured == Some(pointer) {
            self.captured = None;
        }
    }

    /// Unconditional release (gesture cancel paths).
    pub fn clear(&mut self) {
        self.captured = None;
    }
}

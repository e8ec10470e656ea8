//! Pointer interaction state machine.
//!
//! Dispatch admits one captured pointer at a time, walks the state
//! machine, and drives gestures over the store's fast path: the store
//! is snapshotted when a drag crosses the threshold, per-frame updates
//! poke geometry directly (no hooks, no history, no notifications), and
//! pointer-up restores the snapshot and commits the final state as one
//! transaction. That transaction is the gesture's only history entry,
//! so one undo reverts the whole drag.

use crate::editor::{Editor, Gesture};
use crate::error::EditorResult;
use crate::id::ShapeId;
use crate::input::{InputEvent, Modifiers, PointerInput};
use crate::records::{Record, ShapeProps};
use crate::store::Store;
use kurbo::{Point, Rect};
use std::mem;

/// Screen-space distance a pointer must travel before a press becomes
/// a drag.
const DRAG_THRESHOLD: f64 = 4.0;

/// The active tool, selecting which gesture a canvas drag produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Select,
    Draw,
}

/// Where the machine currently is. `Pointing*` states are pressed but
/// not yet dragging; the rest are live gestures backed by a snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    PointingCanvas {
        origin: Point,
    },
    PointingShape {
        target: ShapeId,
        origin: Point,
    },
    TranslatingSelection {
        last: Point,
        shapes: Vec<ShapeId>,
    },
    BrushSelecting {
        origin: Point,
    },
    DrawingShape {
        shape: ShapeId,
    },
}

impl Editor {
    /// Feed one input event through admission and the state machine.
    /// Inadmissible pointers are dropped silently; internal commit
    /// failures are logged, never surfaced to the input layer.
    pub fn dispatch(&mut self, event: InputEvent) {
        if event == InputEvent::TouchUndo {
            // Mid-gesture: cancel. Mid-press: abandon the press. Idle:
            // undo.
            if self.gesture.is_some() {
                self.cancel_gesture();
            } else if self.state != InteractionState::Idle {
                self.state = InteractionState::Idle;
                self.capture.clear();
            } else {
                self.undo();
            }
            return;
        }
        let Some(input) = event.input().copied() else {
            return;
        };
        let admitted = if event.is_down() {
            self.capture.capture(input.pointer).is_ok()
        } else {
            self.capture.admit(input.pointer).is_ok()
        };
        if !admitted {
            log::trace!("dropped event from uncaptured pointer {:?}", input.pointer);
            return;
        }

        let state = mem::take(&mut self.state);
        self.state = self.transition(state, event, input);

        if !matches!(
            self.state,
            InteractionState::TranslatingSelection { .. }
                | InteractionState::BrushSelecting { .. }
                | InteractionState::DrawingShape { .. }
                | InteractionState::PointingCanvas { .. }
                | InteractionState::PointingShape { .. }
        ) {
            self.capture.release(input.pointer);
        }
    }

    fn transition(
        &mut self,
        state: InteractionState,
        event: InputEvent,
        input: PointerInput,
    ) -> InteractionState {
        use InteractionState::*;

        match (state, event) {
            (Idle, InputEvent::PointedCanvas(_)) | (Idle, InputEvent::TouchedCanvas(_)) => {
                match self.tool {
                    Tool::Select => PointingCanvas { origin: input.point },
                    Tool::Draw => self.begin_drawing(input.point),
                }
            }
            (Idle, InputEvent::PointedShape { target, .. }) => match self.tool {
                Tool::Select => PointingShape {
                    target,
                    origin: input.point,
                },
                Tool::Draw => self.begin_drawing(input.point),
            },
            (Idle, InputEvent::RightPointed(_)) => {
                // Context click: select what is under the pointer.
                let selection = self.shape_at_point(input.point).into_iter().collect();
                self.commit_or_log(|editor| editor.select(selection));
                Idle
            }

            (PointingCanvas { origin }, InputEvent::MovedPointer(_)) => {
                if self.past_drag_threshold(origin, input.point) {
                    self.begin_gesture();
                    self.update_brush(origin, input.point);
                    BrushSelecting { origin }
                } else {
                    PointingCanvas { origin }
                }
            }
            (PointingCanvas { .. }, InputEvent::StoppedPointing(_)) => {
                // A click on empty canvas clears the selection.
                self.commit_or_log(|editor| editor.select_none());
                Idle
            }

            (PointingShape { target, origin }, InputEvent::MovedPointer(_)) => {
                if self.past_drag_threshold(origin, input.point) {
                    self.begin_translate(target, origin, input.point)
                } else {
                    PointingShape { target, origin }
                }
            }
            (PointingShape { target, .. }, InputEvent::StoppedPointing(_)) => {
                self.click_select(target, input.modifiers);
                Idle
            }

            (TranslatingSelection { last, shapes }, InputEvent::MovedPointer(_)) => {
                let delta = input.point - last;
                for &id in &shapes {
                    self.store.poke_shape(id, |mut g| g.translate(delta));
                }
                self.request_redraw();
                TranslatingSelection {
                    last: input.point,
                    shapes,
                }
            }
            (TranslatingSelection { shapes, .. }, InputEvent::StoppedPointing(_)) => {
                self.finish_translate(&shapes);
                Idle
            }

            (BrushSelecting { origin }, InputEvent::MovedPointer(_)) => {
                self.update_brush(origin, input.point);
                BrushSelecting { origin }
            }
            (BrushSelecting { .. }, InputEvent::StoppedPointing(_)) => {
                self.finish_brush();
                Idle
            }

            (DrawingShape { shape }, InputEvent::MovedPointer(_)) => {
                self.store.poke_shape(shape, |mut g| {
                    let origin = g.position();
                    g.push_point(Point::new(
                        input.point.x - origin.x,
                        input.point.y - origin.y,
                    ));
                });
                self.request_redraw();
                DrawingShape { shape }
            }
            (DrawingShape { shape }, InputEvent::StoppedPointing(_)) => {
                self.finish_drawing(shape);
                Idle
            }

            // Everything else leaves the state alone (hover moves,
            // right-clicks mid-press, stray down events).
            (state, _) => state,
        }
    }

    fn past_drag_threshold(&self, origin: Point, point: Point) -> bool {
        origin.distance(point) * self.camera().z >= DRAG_THRESHOLD
    }

    /// Snapshot the store; every gesture crossing the drag threshold
    /// starts here.
    fn begin_gesture(&mut self) {
        debug_assert!(self.gesture.is_none());
        self.gesture = Some(Gesture {
            snapshot: self.store.snapshot(),
        });
    }

    /// Restore the pre-gesture records and commit the final state as
    /// one transaction.
    fn finish_gesture(&mut self, f: impl FnOnce(&mut Store) -> EditorResult<()>) {
        let Some(gesture) = self.gesture.take() else {
            return;
        };
        self.store.restore(gesture.snapshot);
        self.commit_or_log(|editor| editor.transact(f));
        self.request_redraw();
    }

    fn commit_or_log(&mut self, f: impl FnOnce(&mut Editor) -> EditorResult<()>) {
        if let Err(err) = f(self) {
            log::warn!("interaction commit rejected: {err}");
        }
    }

    // --- translate ---

    fn begin_translate(&mut self, target: ShapeId, origin: Point, point: Point) -> InteractionState {
        self.begin_gesture();
        let selected = self.selected_shapes();
        let shapes = if selected.contains(&target) {
            selected
        } else {
            // Dragging an unselected shape moves just that shape and
            // selects it; the selection change rides the consolidating
            // transaction.
            let mut instance = self.instance();
            instance.selected_shapes = vec![target];
            self.store.fast_put(Record::Instance(instance));
            vec![target]
        };
        let delta = point - origin;
        for &id in &shapes {
            self.store.poke_shape(id, |mut g| g.translate(delta));
        }
        self.request_redraw();
        InteractionState::TranslatingSelection {
            last: point,
            shapes,
        }
    }

    fn finish_translate(&mut self, shapes: &[ShapeId]) {
        let mut finals: Vec<Record> = shapes
            .iter()
            .filter_map(|&id| self.store.get_shape(id).cloned())
            .map(Record::Shape)
            .collect();
        finals.push(Record::Instance(self.instance()));
        self.finish_gesture(move |store| store.update_records(finals));
    }

    // --- brush select ---

    fn update_brush(&mut self, origin: Point, point: Point) {
        let rect = Rect::from_points(origin, point);
        let mut instance = self.instance();
        instance.selected_shapes = self.shapes_fully_inside(rect);
        self.store.fast_put(Record::Instance(instance));
        self.request_redraw();
    }

    fn finish_brush(&mut self) {
        let instance = self.instance();
        self.finish_gesture(move |store| {
            store.update_records(vec![Record::Instance(instance)])
        });
    }

    // --- draw ---

    /// Draw gestures start on pointer-down, not at the drag threshold,
    /// so a tap leaves a dot.
    fn begin_drawing(&mut self, at: Point) -> InteractionState {
        self.begin_gesture();
        let shape = self.new_shape(
            at,
            ShapeProps::Draw {
                points: vec![Point::ZERO],
            },
        );
        let id = shape.id;
        self.store.fast_put(Record::Shape(shape));
        self.request_redraw();
        InteractionState::DrawingShape { shape: id }
    }

    fn finish_drawing(&mut self, shape: ShapeId) {
        let finished = self.store.get_shape(shape).cloned();
        self.finish_gesture(move |store| match finished {
            Some(record) => store.create_records(vec![Record::Shape(record)]),
            None => Ok(()),
        });
    }

    // --- click selection ---

    fn click_select(&mut self, target: ShapeId, modifiers: Modifiers) {
        let mut selection = self.selected_shapes();
        if modifiers.shift {
            match selection.iter().position(|&id| id == target) {
                Some(at) => {
                    selection.remove(at);
                }
                None => selection.push(target),
            }
        } else {
            selection = vec![target];
        }
        self.commit_or_log(|editor| editor.select(selection));
    }
}

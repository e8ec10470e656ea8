//! The editor facade.
//!
//! [`Editor`] owns the store, the undo history, the camera manager and
//! the interaction state, and sequences them: a committed transaction
//! runs hooks, records its diff in history, then notifies listeners.
//! Undo/redo replays recorded diffs without re-running hooks. The
//! gesture fast path lives in the interaction machine and bypasses all
//! of this until consolidation.

use crate::camera::{self, Camera, CameraManager, CameraOptions};
use crate::error::{EditorResult, StoreError};
use crate::history::History;
use crate::id::{CameraId, InstanceId, PageId, RecordId, RecordKind, ShapeId};
use crate::input::PointerCapture;
use crate::machine::{InteractionState, Tool};
use crate::records::{
    AssetRecord, CameraRecord, FracIndex, InstanceRecord, PageRecord, ParentId, Record,
    ShapeProps, ShapeRecord,
};
use crate::side_effects::SideEffectManager;
use crate::store::{ListenerId, RecordChanges, Store, StoreSnapshot};
use kurbo::{Point, Rect, Vec2};
use std::fmt;

/// An in-flight gesture: the pre-gesture record set, restored on cancel
/// and immediately before the consolidating transaction.
pub(crate) struct Gesture {
    pub(crate) snapshot: StoreSnapshot,
}

/// Initial configuration for [`Editor::with_options`].
#[derive(Debug, Clone)]
pub struct EditorOptions {
    pub camera: CameraOptions,
    /// Screen bounds of the viewport.
    pub viewport: Rect,
    pub page_name: String,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            camera: CameraOptions::default(),
            viewport: Rect::new(0.0, 0.0, 800.0, 600.0),
            page_name: "Page 1".to_string(),
        }
    }
}

pub struct Editor {
    pub(crate) store: Store,
    pub(crate) history: History,
    pub(crate) camera: CameraManager,
    pub(crate) capture: PointerCapture,
    pub(crate) state: InteractionState,
    pub(crate) tool: Tool,
    pub(crate) gesture: Option<Gesture>,
    pub(crate) page_id: PageId,
    pub(crate) instance_id: InstanceId,
    pub(crate) camera_id: CameraId,
    redraw: Option<Box<dyn FnMut()>>,
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Editor")
            .field("records", &self.store.len())
            .field("tool", &self.tool)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor {
    pub fn new() -> Self {
        Self::with_options(EditorOptions::default())
    }

    pub fn with_options(options: EditorOptions) -> Self {
        let mut camera_manager = CameraManager::new();
        camera_manager.set_viewport(options.viewport);
        camera_manager.set_options(options.camera);

        let mut store = Store::new();
        let page_id = PageId::new();
        let camera_id = CameraId::new();
        let instance_id = InstanceId::new();
        // Seed the session records directly: no handlers or history
        // exist yet, so nothing can observe the writes.
        store.fast_put(Record::Page(PageRecord {
            id: page_id,
            name: options.page_name,
        }));
        store.fast_put(Record::Camera(CameraRecord {
            id: camera_id,
            // Applies `initial_zoom` so constrained sessions open fitted.
            camera: camera_manager.initial_camera(),
        }));
        store.fast_put(Record::Instance(InstanceRecord {
            id: instance_id,
            current_page: page_id,
            selected_shapes: Vec::new(),
        }));
        // Locked shapes may not be deleted until unlocked.
        store
            .side_effects()
            .register_before_delete(RecordKind::Shape, |_, record| {
                record.as_shape().is_none_or(|shape| !shape.is_locked)
            });
        Self {
            store,
            history: History::new(),
            camera: camera_manager,
            capture: PointerCapture::new(),
            state: InteractionState::default(),
            tool: Tool::default(),
            gesture: None,
            page_id,
            instance_id,
            camera_id,
            redraw: None,
        }
    }

    // --- store access ---

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn side_effects(&mut self) -> &mut SideEffectManager {
        self.store.side_effects()
    }

    pub fn listen(
        &mut self,
        listener: impl FnMut(&RecordChanges) + 'static,
    ) -> ListenerId {
        self.store.listen(listener)
    }

    pub fn unlisten(&mut self, id: ListenerId) {
        self.store.unlisten(id);
    }

    pub fn export_snapshot(&self) -> serde_json::Result<String> {
        self.store.export_snapshot()
    }

    // --- transactions ---

    /// Run an undoable transaction: hooks, then history, then
    /// notifications. Interrupts any in-flight gesture first.
    pub fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Store) -> EditorResult<T>,
    ) -> EditorResult<T> {
        self.interrupt_gesture();
        let (value, changes) = self.store.transact(f)?;
        if !changes.is_empty() {
            self.history.record(changes.clone());
            self.store.notify(&changes);
            self.request_redraw();
        }
        Ok(value)
    }

    /// Like [`Editor::transact`] but leaves no history entry. Used for
    /// state that should never be undoable, like camera pans.
    pub fn transact_ephemeral<T>(
        &mut self,
        f: impl FnOnce(&mut Store) -> EditorResult<T>,
    ) -> EditorResult<T> {
        self.interrupt_gesture();
        let (value, changes) = self.store.transact(f)?;
        if !changes.is_empty() {
            self.store.notify(&changes);
            self.request_redraw();
        }
        Ok(value)
    }

    // --- document operations ---

    /// The page the session is on, read from the instance record so
    /// undoing a page switch stays consistent.
    pub fn current_page(&self) -> PageId {
        self.instance().current_page
    }

    /// Create a shape on the current page, stacked on top of its
    /// siblings.
    pub fn create_shape(&mut self, at: Point, props: ShapeProps) -> EditorResult<ShapeId> {
        self.interrupt_gesture();
        let shape = self.new_shape(at, props);
        let id = shape.id;
        self.transact(move |store| store.create_records(vec![Record::Shape(shape)]))?;
        Ok(id)
    }

    /// Create a fully specified shape record (caller controls parent,
    /// index and lock state).
    pub fn create_shape_with(&mut self, shape: ShapeRecord) -> EditorResult<ShapeId> {
        let id = shape.id;
        self.transact(move |store| store.create_records(vec![Record::Shape(shape)]))?;
        Ok(id)
    }

    pub fn create_asset(&mut self, asset: AssetRecord) -> EditorResult<()> {
        self.transact(move |store| store.create_records(vec![Record::Asset(asset)]))
    }

    pub fn create_page(&mut self, name: &str) -> EditorResult<PageId> {
        let page = PageRecord {
            id: PageId::new(),
            name: name.to_string(),
        };
        let id = page.id;
        self.transact(move |store| store.create_records(vec![Record::Page(page)]))?;
        Ok(id)
    }

    /// Switch the session to another page and drop the selection.
    pub fn set_current_page(&mut self, page: PageId) -> EditorResult<()> {
        if !self.store.contains(&RecordId::Page(page)) {
            return Err(StoreError::UnknownId(RecordId::Page(page)).into());
        }
        let mut instance = self.instance();
        instance.current_page = page;
        instance.selected_shapes.clear();
        self.transact(move |store| store.update_records(vec![Record::Instance(instance)]))
    }

    /// Edit a shape through a mutation closure; the change flows through
    /// the full hook/history pipeline.
    pub fn update_shape(
        &mut self,
        id: ShapeId,
        f: impl FnOnce(&mut ShapeRecord),
    ) -> EditorResult<()> {
        self.interrupt_gesture();
        let Some(mut shape) = self.store.get_shape(id).cloned() else {
            return Err(StoreError::UnknownId(id.into()).into());
        };
        f(&mut shape);
        self.transact(move |store| store.update_records(vec![Record::Shape(shape)]))
    }

    /// Delete shapes (descendants cascade) and prune them from the
    /// selection in the same undoable step.
    pub fn delete_shapes(&mut self, ids: Vec<ShapeId>) -> EditorResult<()> {
        self.interrupt_gesture();
        let instance = self.instance();
        let mut pruned = instance.clone();
        pruned.selected_shapes.retain(|id| !ids.contains(id));
        self.transact(move |store| {
            if pruned != instance {
                store.update_records(vec![Record::Instance(pruned)])?;
            }
            store.delete_records(ids.into_iter().map(RecordId::Shape).collect())
        })
    }

    // --- selection ---

    pub fn selected_shapes(&self) -> Vec<ShapeId> {
        self.instance().selected_shapes
    }

    /// Replace the selection; an undoable operation because the
    /// selection lives in the instance record.
    pub fn select(&mut self, ids: Vec<ShapeId>) -> EditorResult<()> {
        let mut instance = self.instance();
        if instance.selected_shapes == ids {
            return Ok(());
        }
        instance.selected_shapes = ids;
        self.transact(move |store| store.update_records(vec![Record::Instance(instance)]))
    }

    pub fn select_none(&mut self) -> EditorResult<()> {
        self.select(Vec::new())
    }

    pub(crate) fn instance(&self) -> InstanceRecord {
        match self.store.get(&RecordId::Instance(self.instance_id)) {
            Some(Record::Instance(instance)) => instance.clone(),
            _ => InstanceRecord {
                id: self.instance_id,
                current_page: self.page_id,
                selected_shapes: Vec::new(),
            },
        }
    }

    // --- z-order ---

    /// Restack shapes above everything else on the current page,
    /// preserving their relative order. Locked shapes are skipped.
    pub fn bring_to_front(&mut self, ids: &[ShapeId]) -> EditorResult<()> {
        self.interrupt_gesture();
        let mut top = self.edge_index(true);
        let mut updates = Vec::new();
        for &id in ids {
            let Some(shape) = self.store.get_shape(id) else {
                continue;
            };
            if shape.is_locked {
                continue;
            }
            let mut next = shape.clone();
            next.index = FracIndex::between(top.as_ref(), None);
            top = Some(next.index.clone());
            updates.push(Record::Shape(next));
        }
        self.transact(move |store| store.update_records(updates))
    }

    /// Restack shapes below everything else on the current page.
    pub fn send_to_back(&mut self, ids: &[ShapeId]) -> EditorResult<()> {
        self.interrupt_gesture();
        let mut bottom = self.edge_index(false);
        let mut updates = Vec::new();
        // Reversed so the first id in `ids` ends up lowest.
        for &id in ids.iter().rev() {
            let Some(shape) = self.store.get_shape(id) else {
                continue;
            };
            if shape.is_locked {
                continue;
            }
            let mut next = shape.clone();
            next.index = FracIndex::between(None, bottom.as_ref());
            bottom = Some(next.index.clone());
            updates.push(Record::Shape(next));
        }
        self.transact(move |store| store.update_records(updates))
    }

    fn edge_index(&self, top: bool) -> Option<FracIndex> {
        let children = self.store.sorted_child_ids(ParentId::Page(self.current_page()));
        let id = if top { children.last() } else { children.first() };
        id.and_then(|id| self.store.get_shape(*id))
            .map(|shape| shape.index.clone())
    }

    pub(crate) fn new_shape(&self, at: Point, props: ShapeProps) -> ShapeRecord {
        ShapeRecord {
            id: ShapeId::new(),
            parent: ParentId::Page(self.current_page()),
            index: FracIndex::between(self.edge_index(true).as_ref(), None),
            x: at.x,
            y: at.y,
            is_locked: false,
            props,
        }
    }

    // --- history ---

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Undo one step. Returns `false` when there is nothing to undo or
    /// the entry no longer applies (in which case the stale span is
    /// dropped and the store is left untouched).
    pub fn undo(&mut self) -> bool {
        self.interrupt_gesture();
        let Some(entry) = self.history.peek_undo().cloned() else {
            return false;
        };
        match self.store.apply_diff_backward(&entry) {
            Ok(()) => {
                self.history.step_back();
                let inverse = entry.inverted();
                self.store.notify(&inverse);
                self.request_redraw();
                true
            }
            Err(err) => {
                log::warn!("undo dropped stale history: {err}");
                self.history.drop_undo_span();
                false
            }
        }
    }

    /// Redo one step; same conflict policy as [`Editor::undo`].
    pub fn redo(&mut self) -> bool {
        self.interrupt_gesture();
        let Some(entry) = self.history.peek_redo().cloned() else {
            return false;
        };
        match self.store.apply_diff_forward(&entry) {
            Ok(()) => {
                self.history.step_forward();
                self.store.notify(&entry);
                self.request_redraw();
                true
            }
            Err(err) => {
                log::warn!("redo dropped stale history: {err}");
                self.history.drop_redo_span();
                false
            }
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    // --- camera ---

    /// The live camera value.
    pub fn camera(&self) -> Camera {
        match self.store.get(&RecordId::Camera(self.camera_id)) {
            Some(Record::Camera(record)) => record.camera,
            _ => Camera::default(),
        }
    }

    pub fn camera_options(&self) -> &CameraOptions {
        self.camera.options()
    }

    /// Replace the camera options and re-clamp the current camera.
    pub fn set_camera_options(&mut self, options: CameraOptions) -> EditorResult<()> {
        self.camera.set_options(options);
        self.commit_camera(self.camera())
    }

    /// Resize the viewport and re-clamp the current camera.
    pub fn set_viewport_bounds(&mut self, bounds: Rect) -> EditorResult<()> {
        self.camera.set_viewport(bounds);
        let camera = self.camera.constrain(self.camera());
        self.write_camera(camera, false)
    }

    /// User-driven camera set; a no-op while the camera is locked.
    pub fn set_camera(&mut self, camera: Camera) -> EditorResult<()> {
        if self.camera.options().is_locked {
            return Ok(());
        }
        self.commit_camera(camera)
    }

    /// Reset to the initial camera (applies `initial_zoom`), bypassing
    /// the camera lock.
    pub fn reset_camera(&mut self) -> EditorResult<()> {
        self.commit_camera(self.camera.initial_camera())
    }

    /// Pan by a screen-space delta; a no-op while the camera is locked.
    pub fn pan_camera(&mut self, delta: Vec2) -> EditorResult<()> {
        if self.camera.options().is_locked {
            return Ok(());
        }
        self.commit_camera(self.camera.panned(self.camera(), delta))
    }

    /// Continuous zoom around a viewport anchor; a no-op while locked.
    pub fn zoom_camera(&mut self, factor: f64, anchor: Point) -> EditorResult<()> {
        if self.camera.options().is_locked {
            return Ok(());
        }
        self.commit_camera(self.camera.zoomed(self.camera(), factor, anchor))
    }

    /// Step to the next zoom stop, anchored at the viewport center.
    pub fn zoom_in(&mut self) -> EditorResult<()> {
        if self.camera.options().is_locked {
            return Ok(());
        }
        self.commit_camera(self.camera.zoom_in_step(self.camera(), self.viewport_center()))
    }

    /// Step to the previous zoom stop, anchored at the viewport center.
    pub fn zoom_out(&mut self) -> EditorResult<()> {
        if self.camera.options().is_locked {
            return Ok(());
        }
        self.commit_camera(self.camera.zoom_out_step(self.camera(), self.viewport_center()))
    }

    fn viewport_center(&self) -> Point {
        let vp = self.camera.viewport();
        Point::new(vp.width() / 2.0, vp.height() / 2.0)
    }

    fn commit_camera(&mut self, camera: Camera) -> EditorResult<()> {
        let camera = self.camera.constrain(camera);
        self.write_camera(camera, self.camera.options().record_in_history)
    }

    fn write_camera(&mut self, camera: Camera, undoable: bool) -> EditorResult<()> {
        let record = Record::Camera(CameraRecord {
            id: self.camera_id,
            camera,
        });
        if undoable {
            self.transact(move |store| store.update_records(vec![record]))
        } else {
            self.transact_ephemeral(move |store| store.update_records(vec![record]))
        }
    }

    /// Page -> viewport under the live camera.
    pub fn page_to_viewport(&self, point: Point) -> Point {
        camera::page_to_viewport(point, self.camera())
    }

    /// Viewport -> page under the live camera.
    pub fn viewport_to_page(&self, point: Point) -> Point {
        camera::viewport_to_page(point, self.camera())
    }

    // --- hit testing ---

    /// Topmost unlocked shape under a page-space point on the current
    /// page, searching front-to-back.
    pub fn shape_at_point(&self, point: Point) -> Option<ShapeId> {
        self.hit_in(ParentId::Page(self.current_page()), point)
    }

    fn hit_in(&self, parent: ParentId, point: Point) -> Option<ShapeId> {
        for id in self.store.sorted_child_ids(parent).into_iter().rev() {
            // Children render above their parent.
            if let Some(hit) = self.hit_in(ParentId::Shape(id), point) {
                return Some(hit);
            }
            if let Some(shape) = self.store.get_shape(id) {
                if !shape.is_locked && shape.bounds().contains(point) {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Unlocked shapes on the current page whose bounds lie fully inside
    /// `rect`, back-to-front.
    pub fn shapes_fully_inside(&self, rect: Rect) -> Vec<ShapeId> {
        let mut out = Vec::new();
        self.collect_inside(ParentId::Page(self.current_page()), rect, &mut out);
        out
    }

    fn collect_inside(&self, parent: ParentId, rect: Rect, out: &mut Vec<ShapeId>) {
        for id in self.store.sorted_child_ids(parent) {
            if let Some(shape) = self.store.get_shape(id) {
                let b = shape.bounds();
                let inside =
                    b.x0 >= rect.x0 && b.y0 >= rect.y0 && b.x1 <= rect.x1 && b.y1 <= rect.y1;
                if !shape.is_locked && inside {
                    out.push(id);
                }
            }
            self.collect_inside(ParentId::Shape(id), rect, out);
        }
    }

    // --- tools and gestures ---

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switch the active tool, cancelling any in-flight gesture.
    pub fn set_tool(&mut self, tool: Tool) {
        self.interrupt_gesture();
        self.tool = tool;
    }

    pub fn is_gesturing(&self) -> bool {
        self.gesture.is_some()
    }

    /// Discard an in-flight gesture: the store is restored to its
    /// pre-gesture state and the machine returns to idle. Nothing is
    /// recorded in history.
    pub fn cancel_gesture(&mut self) {
        if let Some(gesture) = self.gesture.take() {
            self.store.restore(gesture.snapshot);
            self.state = InteractionState::Idle;
            self.capture.clear();
            self.request_redraw();
        }
    }

    /// A direct store write arriving mid-gesture invalidates the
    /// gesture's snapshot, so the gesture is abandoned rather than
    /// committed over foreign changes.
    pub(crate) fn interrupt_gesture(&mut self) {
        if self.gesture.is_some() {
            log::debug!("gesture interrupted by external write");
            self.cancel_gesture();
        }
    }

    // --- redraw signalling ---

    /// Install the callback invoked whenever visible state changed.
    pub fn set_redraw_signal(&mut self, signal: impl FnMut() + 'static) {
        self.redraw = Some(Box::new(signal));
    }

    pub(crate) fn request_redraw(&mut self) {
        if let Some(signal) = &mut self.redraw {
            signal();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo(w: f64, h: f64) -> ShapeProps {
        ShapeProps::Geo { w, h }
    }

    #[test]
    fn test_create_update_undo_redo() {
        let mut editor = Editor::new();
        let id = editor.create_shape(Point::new(10.0, 10.0), geo(20.0, 20.0)).unwrap();
        editor.update_shape(id, |s| s.x = 50.0).unwrap();
        assert_eq!(editor.store().get_shape(id).unwrap().x, 50.0);

        assert!(editor.undo());
        assert_eq!(editor.store().get_shape(id).unwrap().x, 10.0);
        assert!(editor.undo());
        assert!(editor.store().get_shape(id).is_none());
        assert!(!editor.undo());

        assert!(editor.redo());
        assert!(editor.store().get_shape(id).is_some());
        assert!(editor.redo());
        assert_eq!(editor.store().get_shape(id).unwrap().x, 50.0);
        assert!(!editor.redo());
    }

    #[test]
    fn test_selection_is_undoable() {
        let mut editor = Editor::new();
        let id = editor.create_shape(Point::ZERO, geo(10.0, 10.0)).unwrap();
        editor.select(vec![id]).unwrap();
        assert_eq!(editor.selected_shapes(), vec![id]);
        assert!(editor.undo());
        assert!(editor.selected_shapes().is_empty());
        assert!(editor.redo());
        assert_eq!(editor.selected_shapes(), vec![id]);
    }

    #[test]
    fn test_delete_prunes_selection_in_one_step() {
        let mut editor = Editor::new();
        let id = editor.create_shape(Point::ZERO, geo(10.0, 10.0)).unwrap();
        editor.select(vec![id]).unwrap();
        editor.delete_shapes(vec![id]).unwrap();
        assert!(editor.selected_shapes().is_empty());
        assert!(editor.store().get_shape(id).is_none());
        // One undo restores both the shape and its selection.
        assert!(editor.undo());
        assert!(editor.store().get_shape(id).is_some());
        assert_eq!(editor.selected_shapes(), vec![id]);
    }

    #[test]
    fn test_locked_shape_cannot_be_deleted() {
        let mut editor = Editor::new();
        let id = editor.create_shape(Point::ZERO, geo(10.0, 10.0)).unwrap();
        editor.update_shape(id, |s| s.is_locked = true).unwrap();
        editor.delete_shapes(vec![id]).unwrap();
        assert!(editor.store().get_shape(id).is_some());
    }

    #[test]
    fn test_delete_cascade_spares_ancestors_of_locked_child() {
        let mut editor = Editor::new();
        let parent = editor.create_shape(Point::ZERO, geo(40.0, 40.0)).unwrap();
        let child = editor
            .create_shape_with(ShapeRecord {
                id: ShapeId::new(),
                parent: ParentId::Shape(parent),
                index: FracIndex::first(),
                x: 5.0,
                y: 5.0,
                is_locked: true,
                props: geo(10.0, 10.0),
            })
            .unwrap();

        editor.delete_shapes(vec![parent]).unwrap();
        assert!(editor.store().get_shape(parent).is_some());
        assert!(editor.store().get_shape(child).is_some());

        // The spared parent still accepts ordinary edits.
        editor.update_shape(parent, |s| s.x = 25.0).unwrap();
        assert_eq!(editor.store().get_shape(parent).unwrap().x, 25.0);

        // Unlocking the child lets the whole subtree go.
        editor.update_shape(child, |s| s.is_locked = false).unwrap();
        editor.delete_shapes(vec![parent]).unwrap();
        assert!(editor.store().get_shape(parent).is_none());
        assert!(editor.store().get_shape(child).is_none());
    }

    #[test]
    fn test_z_order_round_trip() {
        let mut editor = Editor::new();
        let a = editor.create_shape(Point::ZERO, geo(10.0, 10.0)).unwrap();
        let b = editor.create_shape(Point::ZERO, geo(10.0, 10.0)).unwrap();
        let c = editor.create_shape(Point::ZERO, geo(10.0, 10.0)).unwrap();
        let page = ParentId::Page(editor.current_page());
        assert_eq!(editor.store().sorted_child_ids(page), vec![a, b, c]);

        editor.bring_to_front(&[a]).unwrap();
        assert_eq!(editor.store().sorted_child_ids(page), vec![b, c, a]);
        editor.send_to_back(&[c]).unwrap();
        assert_eq!(editor.store().sorted_child_ids(page), vec![c, b, a]);
        // One undo per reorder.
        assert!(editor.undo());
        assert_eq!(editor.store().sorted_child_ids(page), vec![b, c, a]);
        assert!(editor.undo());
        assert_eq!(editor.store().sorted_child_ids(page), vec![a, b, c]);
    }

    #[test]
    fn test_page_switch_is_undoable() {
        let mut editor = Editor::new();
        let home = editor.current_page();
        let id = editor.create_shape(Point::ZERO, geo(10.0, 10.0)).unwrap();
        editor.select(vec![id]).unwrap();
        let second = editor.create_page("Page 2").unwrap();
        editor.set_current_page(second).unwrap();
        assert_eq!(editor.current_page(), second);
        assert!(editor.selected_shapes().is_empty());

        // New shapes land on the new page and only it is hit-tested.
        let other = editor.create_shape(Point::ZERO, geo(5.0, 5.0)).unwrap();
        assert_eq!(
            editor.store().get_shape(other).unwrap().parent,
            ParentId::Page(second)
        );
        assert_eq!(editor.shape_at_point(Point::new(2.0, 2.0)), Some(other));

        assert!(editor.undo());
        assert!(editor.undo());
        assert_eq!(editor.current_page(), home);
        assert_eq!(editor.selected_shapes(), vec![id]);
    }

    #[test]
    fn test_hit_test_topmost_and_locked_skip() {
        let mut editor = Editor::new();
        let under = editor.create_shape(Point::new(0.0, 0.0), geo(100.0, 100.0)).unwrap();
        let over = editor.create_shape(Point::new(25.0, 25.0), geo(50.0, 50.0)).unwrap();
        assert_eq!(editor.shape_at_point(Point::new(50.0, 50.0)), Some(over));
        assert_eq!(editor.shape_at_point(Point::new(5.0, 5.0)), Some(under));
        assert_eq!(editor.shape_at_point(Point::new(500.0, 500.0)), None);

        editor.update_shape(over, |s| s.is_locked = true).unwrap();
        assert_eq!(editor.shape_at_point(Point::new(50.0, 50.0)), Some(under));
    }

    #[test]
    fn test_undo_conflict_drops_stale_history() {
        let mut editor = Editor::new();
        let id = editor.create_shape(Point::ZERO, geo(10.0, 10.0)).unwrap();
        editor.update_shape(id, |s| s.x = 30.0).unwrap();
        // Mutate without leaving a history entry: the last entry's
        // `next` no longer matches the live record.
        editor
            .transact_ephemeral(|store| {
                let mut shape = store.get_shape(id).cloned().unwrap();
                shape.x = 99.0;
                store.update_records(vec![Record::Shape(shape)])
            })
            .unwrap();
        assert!(!editor.undo());
        // The stale span is gone; the store was not touched.
        assert!(!editor.can_undo());
        assert_eq!(editor.store().get_shape(id).unwrap().x, 99.0);
    }

    #[test]
    fn test_ephemeral_camera_moves_leave_no_history() {
        let mut editor = Editor::new();
        editor.pan_camera(Vec2::new(100.0, 0.0)).unwrap();
        editor.zoom_in().unwrap();
        assert!(!editor.can_undo());
        assert!(editor.camera().z > 1.0);
    }

    #[test]
    fn test_locked_camera_ignores_user_moves() {
        let mut editor = Editor::new();
        let mut options = CameraOptions::default();
        options.is_locked = true;
        editor.set_camera_options(options).unwrap();
        let before = editor.camera();
        editor.pan_camera(Vec2::new(100.0, 100.0)).unwrap();
        editor.zoom_camera(2.0, Point::ZERO).unwrap();
        assert_eq!(editor.camera(), before);
        // Reset bypasses the lock.
        editor.reset_camera().unwrap();
    }

    #[test]
    fn test_commit_after_undo_drops_redo() {
        let mut editor = Editor::new();
        let id = editor.create_shape(Point::ZERO, geo(10.0, 10.0)).unwrap();
        editor.update_shape(id, |s| s.x = 30.0).unwrap();
        assert!(editor.undo());
        assert!(editor.can_redo());
        editor.update_shape(id, |s| s.y = 70.0).unwrap();
        assert!(!editor.can_redo());
    }

    #[test]
    fn test_initial_camera_respects_constraints() {
        use crate::camera::{CameraConstraints, FitBehavior, ZoomPreset};

        let options = EditorOptions {
            camera: CameraOptions {
                constraints: Some(CameraConstraints {
                    bounds: Rect::new(0.0, 0.0, 400.0, 300.0),
                    padding: Vec2::new(32.0, 64.0),
                    origin: Point::new(0.5, 0.5),
                    initial_zoom: ZoomPreset::FitMax,
                    base_zoom: ZoomPreset::Default,
                    behavior: FitBehavior::Contain,
                }),
                ..CameraOptions::default()
            },
            viewport: Rect::new(0.0, 0.0, 800.0, 600.0),
            page_name: "Annotation".to_string(),
        };
        let editor = Editor::with_options(options);
        // Fit-max zoom: min(736/400, 472/300).
        assert!((editor.camera().z - 472.0 / 300.0).abs() < 1e-9);
        // The whole constrained region is on screen.
        let tl = editor.page_to_viewport(Point::new(0.0, 0.0));
        let br = editor.page_to_viewport(Point::new(400.0, 300.0));
        assert!(tl.x >= 0.0 && tl.y >= 0.0);
        assert!(br.x <= 800.0 && br.y <= 600.0);
    }

    #[test]
    fn test_locked_background_image_workflow() {
        use crate::id::AssetId;
        use crate::records::AssetRecord;

        let mut editor = Editor::new();
        let asset = AssetRecord {
            id: AssetId::new(),
            mime_type: "image/png".to_string(),
            src: "board.png".to_string(),
            w: 400.0,
            h: 300.0,
        };
        let asset_id = asset.id;
        editor.create_asset(asset).unwrap();
        let bg = editor
            .create_shape(
                Point::ZERO,
                ShapeProps::Image {
                    w: 400.0,
                    h: 300.0,
                    asset: asset_id,
                },
            )
            .unwrap();
        editor.update_shape(bg, |s| s.is_locked = true).unwrap();
        // Keep the background locked no matter what a write proposes.
        editor
            .side_effects()
            .register_before_change(RecordKind::Shape, move |_, _, mut next| {
                if let Record::Shape(shape) = &mut next {
                    if shape.id == bg {
                        shape.is_locked = true;
                    }
                }
                next
            });
        editor.clear_history();

        // Unlock-and-move is rewritten back to locked, then rejected.
        let err = editor.update_shape(bg, |s| {
            s.is_locked = false;
            s.x = 50.0;
        });
        assert!(err.is_err());
        assert_eq!(editor.store().get_shape(bg).unwrap().x, 0.0);

        // Hit-testing skips the background; annotations land above it.
        assert_eq!(editor.shape_at_point(Point::new(10.0, 10.0)), None);
        let note = editor.create_shape(Point::new(5.0, 5.0), geo(20.0, 20.0)).unwrap();
        assert_eq!(editor.shape_at_point(Point::new(10.0, 10.0)), Some(note));

        // The background survives deletion attempts.
        editor.delete_shapes(vec![bg]).unwrap();
        assert!(editor.store().get_shape(bg).is_some());
    }

    #[test]
    fn test_after_create_keeps_background_bottom_most() {
        use crate::id::AssetId;
        use crate::records::AssetRecord;

        let mut editor = Editor::new();
        let asset = AssetRecord {
            id: AssetId::new(),
            mime_type: "image/png".to_string(),
            src: "board.png".to_string(),
            w: 400.0,
            h: 300.0,
        };
        let asset_id = asset.id;
        editor.create_asset(asset).unwrap();
        let bg = editor
            .create_shape(
                Point::ZERO,
                ShapeProps::Image {
                    w: 400.0,
                    h: 300.0,
                    asset: asset_id,
                },
            )
            .unwrap();
        let page = editor.current_page();

        // Whenever another shape is created, sink the background back
        // below it.
        editor
            .side_effects()
            .register_after_create(RecordKind::Shape, move |store, record, fx| {
                let Some(created) = record.as_shape() else {
                    return;
                };
                if created.id == bg {
                    return;
                }
                let bottom = store.sorted_child_ids(ParentId::Page(page)).first().copied();
                if bottom == Some(bg) {
                    return;
                }
                let lowest = bottom
                    .and_then(|id| store.get_shape(id))
                    .map(|shape| shape.index.clone());
                if let Some(background) = store.get_shape(bg) {
                    let mut sunk = background.clone();
                    sunk.index = FracIndex::between(None, lowest.as_ref());
                    fx.update(Record::Shape(sunk));
                }
            });

        // A shape created with no explicit parent lands on the page,
        // above the background.
        let note = editor.create_shape(Point::new(5.0, 5.0), geo(10.0, 10.0)).unwrap();
        assert_eq!(
            editor.store().get_shape(note).unwrap().parent,
            ParentId::Page(page)
        );
        let order = editor.store().sorted_child_ids(ParentId::Page(page));
        assert_eq!(order.first(), Some(&bg));

        // Even a shape inserted below it gets leapfrogged by the hook.
        let bg_index = editor.store().get_shape(bg).unwrap().index.clone();
        let sneaky = editor
            .create_shape_with(ShapeRecord {
                id: ShapeId::new(),
                parent: ParentId::Page(page),
                index: FracIndex::between(None, Some(&bg_index)),
                x: 0.0,
                y: 0.0,
                is_locked: false,
                props: geo(5.0, 5.0),
            })
            .unwrap();
        let order = editor.store().sorted_child_ids(ParentId::Page(page));
        assert_eq!(order.first(), Some(&bg));
        assert!(order.contains(&sneaky));
        assert!(order.contains(&note));
    }

    #[test]
    fn test_listener_hears_undo_as_inverse_diff() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut editor = Editor::new();
        let id = editor.create_shape(Point::ZERO, geo(10.0, 10.0)).unwrap();
        let log: Rc<RefCell<Vec<String>>> = Rc::default();
        let log_in = log.clone();
        editor.listen(move |changes| {
            for (rid, _) in &changes.deleted {
                log_in.borrow_mut().push(format!("deleted {rid}"));
            }
        });
        assert!(editor.undo());
        let seen = log.borrow();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains(&id.to_string()));
    }
}

//! Quillboard Core Library
//!
//! Platform-agnostic editor core for the Quillboard canvas: the reactive
//! record store, side-effect hooks, diff-based undo history, the pointer
//! interaction machine and the constrained camera.

pub mod camera;
pub mod editor;
pub mod error;
pub mod history;
pub mod id;
pub mod input;
pub mod machine;
pub mod records;
pub mod side_effects;
pub mod store;

pub use camera::{
    Camera, CameraConstraints, CameraManager, CameraOptions, FitBehavior, ZoomPreset,
    page_to_viewport, viewport_to_page,
};
pub use editor::{Editor, EditorOptions};
pub use error::{EditorError, EditorResult, HistoryConflictError, SideEffectLoopError, StoreError};
pub use history::History;
pub use id::{AssetId, CameraId, InstanceId, PageId, RecordId, RecordKind, ShapeId};
pub use input::{InputEvent, Modifiers, PointerButton, PointerCapture, PointerId, PointerInput};
pub use machine::{InteractionState, Tool};
pub use records::{
    AssetRecord, CameraRecord, FracIndex, InstanceRecord, PageRecord, ParentId, Record,
    ShapeProps, ShapeRecord,
};
pub use side_effects::{Effects, HandlerId, SideEffectManager};
pub use store::{GeometryMut, ListenerId, RecordChanges, RecordOp, Store, StoreSnapshot};

//! Error taxonomy for the editor core.

use crate::id::{RecordId, ShapeId};
use crate::input::PointerId;
use thiserror::Error;

/// Structural store failures. Any of these aborts the whole transaction;
/// the store rolls back and no listener hears about the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("duplicate record id: {0}")]
    DuplicateId(RecordId),
    #[error("unknown record id: {0}")]
    UnknownId(RecordId),
    #[error("shape {0} would create a parent cycle")]
    ParentCycle(ShapeId),
    #[error("parent {0} does not exist")]
    MissingParent(RecordId),
    #[error("shape {0} is locked")]
    LockedShape(ShapeId),
}

/// A re-entrant side-effect cascade failed to converge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("side-effect cascade exceeded depth {depth}")]
pub struct SideEffectLoopError {
    pub depth: usize,
}

/// An undo/redo diff no longer applies because the store diverged from
/// the state the entry was recorded against.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("history entry no longer applies to record {id}")]
pub struct HistoryConflictError {
    pub id: RecordId,
}

/// A pointer was rejected by input admission. Never user-visible; the
/// event is simply dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pointer {pointer:?} rejected while another pointer is captured")]
pub struct InputAdmissionError {
    pub pointer: PointerId,
}

/// Umbrella error for transactional operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    SideEffectLoop(#[from] SideEffectLoopError),
    #[error(transparent)]
    HistoryConflict(#[from] HistoryConflictError),
}

/// Result type for editor operations.
pub type EditorResult<T> = Result<T, EditorError>;

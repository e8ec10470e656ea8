//! Before/after hooks on record lifecycle events.
//!
//! Collaborators register handlers per (record kind, event). Before
//! handlers run inside the transaction and may rewrite the proposed
//! record (or veto a delete); after handlers run once the store state is
//! updated, before the history entry is finalized, and may enqueue
//! follow-up mutations via [`Effects`]. Handlers for the same key run in
//! registration order so invariants are reproducible.

use crate::id::{RecordId, RecordKind};
use crate::records::Record;
use crate::store::{RecordOp, Store};
use std::collections::HashMap;

/// Token returned on registration; removing by token is the only way to
/// unregister, so callers must hold on to it for teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Follow-up mutations queued by after handlers; applied re-entrantly
/// inside the same transaction.
#[derive(Default)]
pub struct Effects {
    pub(crate) ops: Vec<RecordOp>,
}

impl Effects {
    pub fn create(&mut self, record: Record) {
        self.ops.push(RecordOp::Create(record));
    }

    pub fn update(&mut self, record: Record) {
        self.ops.push(RecordOp::Update(record));
    }

    pub fn delete(&mut self, id: RecordId) {
        self.ops.push(RecordOp::Delete(id));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

type BeforeCreateFn = Box<dyn FnMut(&Store, Record) -> Record>;
type BeforeChangeFn = Box<dyn FnMut(&Store, &Record, Record) -> Record>;
type BeforeDeleteFn = Box<dyn FnMut(&Store, &Record) -> bool>;
type AfterCreateFn = Box<dyn FnMut(&Store, &Record, &mut Effects)>;
type AfterChangeFn = Box<dyn FnMut(&Store, &Record, &Record, &mut Effects)>;
type AfterDeleteFn = Box<dyn FnMut(&Store, &Record, &mut Effects)>;

/// Registry of lifecycle handlers keyed by record kind.
#[derive(Default)]
pub struct SideEffectManager {
    next_id: u64,
    before_create: HashMap<RecordKind, Vec<(HandlerId, BeforeCreateFn)>>,
    before_change: HashMap<RecordKind, Vec<(HandlerId, BeforeChangeFn)>>,
    before_delete: HashMap<RecordKind, Vec<(HandlerId, BeforeDeleteFn)>>,
    after_create: HashMap<RecordKind, Vec<(HandlerId, AfterCreateFn)>>,
    after_change: HashMap<RecordKind, Vec<(HandlerId, AfterChangeFn)>>,
    after_delete: HashMap<RecordKind, Vec<(HandlerId, AfterDeleteFn)>>,
}

impl std::fmt::Debug for SideEffectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideEffectManager")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl SideEffectManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> HandlerId {
        self.next_id += 1;
        HandlerId(self.next_id)
    }

    /// Runs before a record is created; may replace the proposed record.
    pub fn register_before_create(
        &mut self,
        kind: RecordKind,
        handler: impl FnMut(&Store, Record) -> Record + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.before_create
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Runs before a record is replaced; receives `(prev, next)` and
    /// returns the record that will actually be committed.
    pub fn register_before_change(
        &mut self,
        kind: RecordKind,
        handler: impl FnMut(&Store, &Record, Record) -> Record + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.before_change
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Runs before a record is deleted; returning `false` vetoes that
    /// delete (the rest of the transaction proceeds).
    pub fn register_before_delete(
        &mut self,
        kind: RecordKind,
        handler: impl FnMut(&Store, &Record) -> bool + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.before_delete
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Runs after a record was created, before history is finalized.
    pub fn register_after_create(
        &mut self,
        kind: RecordKind,
        handler: impl FnMut(&Store, &Record, &mut Effects) + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.after_create
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Runs after a record was replaced; receives `(prev, next)`.
    pub fn register_after_change(
        &mut self,
        kind: RecordKind,
        handler: impl FnMut(&Store, &Record, &Record, &mut Effects) + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.after_change
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Runs after a record was deleted.
    pub fn register_after_delete(
        &mut self,
        kind: RecordKind,
        handler: impl FnMut(&Store, &Record, &mut Effects) + 'static,
    ) -> HandlerId {
        let id = self.next_id();
        self.after_delete
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Remove a handler by its registration token.
    pub fn remove(&mut self, id: HandlerId) {
        for handlers in self.before_create.values_mut() {
            handlers.retain(|(h, _)| *h != id);
        }
        for handlers in self.before_change.values_mut() {
            handlers.retain(|(h, _)| *h != id);
        }
        for handlers in self.before_delete.values_mut() {
            handlers.retain(|(h, _)| *h != id);
        }
        for handlers in self.after_create.values_mut() {
            handlers.retain(|(h, _)| *h != id);
        }
        for handlers in self.after_change.values_mut() {
            handlers.retain(|(h, _)| *h != id);
        }
        for handlers in self.after_delete.values_mut() {
            handlers.retain(|(h, _)| *h != id);
        }
    }

    pub(crate) fn run_before_create(&mut self, store: &Store, mut record: Record) -> Record {
        if let Some(handlers) = self.before_create.get_mut(&record.kind()) {
            for (_, handler) in handlers.iter_mut() {
                record = handler(store, record);
            }
        }
        record
    }

    pub(crate) fn run_before_change(
        &mut self,
        store: &Store,
        prev: &Record,
        mut next: Record,
    ) -> Record {
        if let Some(handlers) = self.before_change.get_mut(&next.kind()) {
            for (_, handler) in handlers.iter_mut() {
                next = handler(store, prev, next);
            }
        }
        next
    }

    pub(crate) fn run_before_delete(&mut self, store: &Store, record: &Record) -> bool {
        let mut allowed = true;
        if let Some(handlers) = self.before_delete.get_mut(&record.kind()) {
            for (_, handler) in handlers.iter_mut() {
                allowed &= handler(store, record);
            }
        }
        allowed
    }

    pub(crate) fn run_after_create(&mut self, store: &Store, record: &Record, fx: &mut Effects) {
        if let Some(handlers) = self.after_create.get_mut(&record.kind()) {
            for (_, handler) in handlers.iter_mut() {
                handler(store, record, fx);
            }
        }
    }

    pub(crate) fn run_after_change(
        &mut self,
        store: &Store,
        prev: &Record,
        next: &Record,
        fx: &mut Effects,
    ) {
        if let Some(handlers) = self.after_change.get_mut(&next.kind()) {
            for (_, handler) in handlers.iter_mut() {
                handler(store, prev, next, fx);
            }
        }
    }

    pub(crate) fn run_after_delete(&mut self, store: &Store, record: &Record, fx: &mut Effects) {
        if let Some(handlers) = self.after_delete.get_mut(&record.kind()) {
            for (_, handler) in handlers.iter_mut() {
                handler(store, record, fx);
            }
        }
    }
}

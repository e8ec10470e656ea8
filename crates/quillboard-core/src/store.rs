//! The reactive record store.
//!
//! All document state lives here as typed records keyed by [`RecordId`].
//! Mutation happens through transactions: every write runs the
//! before-handlers, validates structural invariants, applies, runs the
//! after-handlers (which may cascade), and finally hands the caller a
//! [`RecordChanges`] diff to record in history and broadcast to
//! listeners. A failed write rolls the whole transaction back.
//!
//! A second, latency-critical write path ([`Store::poke_shape`] /
//! [`Store::fast_put`]) mutates live geometry directly with no hooks, no
//! history and no notifications. It is only legal inside a gesture that
//! snapshotted the store first and ends with one consolidating
//! transaction; see the interaction machine.

use crate::error::{EditorResult, HistoryConflictError, SideEffectLoopError, StoreError};
use crate::id::{RecordId, ShapeId};
use crate::records::{ParentId, Record, ShapeProps, ShapeRecord};
use crate::side_effects::{Effects, SideEffectManager};
use kurbo::{Point, Vec2};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::mem;

/// Cap on re-entrant side-effect cascades per transaction.
const MAX_EFFECT_DEPTH: usize = 8;

/// One primitive mutation.
#[derive(Debug, Clone)]
pub enum RecordOp {
    Create(Record),
    /// Whole-record replacement; the id comes from the record itself.
    Update(Record),
    Delete(RecordId),
}

/// The diff of one committed transaction: also the change-notification
/// payload and the history entry body. Maps are keyed deterministically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordChanges {
    pub created: BTreeMap<RecordId, Record>,
    /// `(prev, next)` pairs.
    pub updated: BTreeMap<RecordId, (Record, Record)>,
    pub deleted: BTreeMap<RecordId, Record>,
}

impl RecordChanges {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// The diff that exactly undoes this one.
    pub fn inverted(&self) -> RecordChanges {
        RecordChanges {
            created: self.deleted.clone(),
            deleted: self.created.clone(),
            updated: self
                .updated
                .iter()
                .map(|(id, (prev, next))| (*id, (next.clone(), prev.clone())))
                .collect(),
        }
    }

    fn record_created(&mut self, record: Record) {
        let id = record.id();
        // A delete followed by a create of the same id nets to an update.
        if let Some(prev) = self.deleted.remove(&id) {
            self.updated.insert(id, (prev, record));
        } else {
            self.created.insert(id, record);
        }
    }

    fn record_updated(&mut self, prev: Record, next: Record) {
        let id = next.id();
        if self.created.contains_key(&id) {
            self.created.insert(id, next);
        } else if let Some((first_prev, _)) = self.updated.remove(&id) {
            self.updated.insert(id, (first_prev, next));
        } else {
            self.updated.insert(id, (prev, next));
        }
    }

    fn record_deleted(&mut self, prev: Record) {
        let id = prev.id();
        if self.created.remove(&id).is_some() {
            // Created and deleted in the same transaction: net nothing.
        } else if let Some((first_prev, _)) = self.updated.remove(&id) {
            self.deleted.insert(id, first_prev);
        } else {
            self.deleted.insert(id, prev);
        }
    }
}

/// Token for removing a change listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&RecordChanges)>;

/// A full copy of the record set, used by gestures for cancel/restore.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    records: BTreeMap<RecordId, Record>,
}

/// Restricted mutable view handed out by [`Store::poke_shape`]: the fast
/// path may only touch whitelisted geometry, never lock/parent/index.
pub struct GeometryMut<'a> {
    shape: &'a mut ShapeRecord,
}

impl GeometryMut<'_> {
    pub fn position(&self) -> Point {
        Point::new(self.shape.x, self.shape.y)
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.shape.x += delta.x;
        self.shape.y += delta.y;
    }

    pub fn set_position(&mut self, point: Point) {
        self.shape.x = point.x;
        self.shape.y = point.y;
    }

    /// Append a stroke point (shape-relative). No-op for non-draw shapes.
    pub fn push_point(&mut self, point: Point) {
        if let ShapeProps::Draw { points } = &mut self.shape.props {
            points.push(point);
        }
    }
}

#[derive(Default)]
struct TxState {
    changes: RecordChanges,
}

/// The single shared mutable resource of the editor core.
#[derive(Default)]
pub struct Store {
    records: BTreeMap<RecordId, Record>,
    side_effects: SideEffectManager,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    tx: Option<TxState>,
    /// Memoized sorted-children query; `None` means stale.
    children: RefCell<Option<HashMap<ParentId, Vec<ShapeId>>>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("records", &self.records.len())
            .field("in_transaction", &self.tx.is_some())
            .finish_non_exhaustive()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn get_shape(&self, id: ShapeId) -> Option<&ShapeRecord> {
        match self.records.get(&RecordId::Shape(id)) {
            Some(Record::Shape(shape)) => Some(shape),
            _ => None,
        }
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn side_effects(&mut self) -> &mut SideEffectManager {
        &mut self.side_effects
    }

    /// Register a change-notification listener. Listeners fire once per
    /// committed transaction with the batched diff.
    pub fn listen(&mut self, listener: impl FnMut(&RecordChanges) + 'static) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unlisten(&mut self, id: ListenerId) {
        self.listeners.retain(|(listener, _)| *listener != id);
    }

    /// Run `f` inside a transaction and return its committed diff.
    ///
    /// Nested calls join the open transaction and return an empty diff;
    /// the outermost call gets the whole batch. On error every mutation
    /// made inside is reverted. The caller is responsible for recording
    /// the diff in history and then calling [`Store::notify`], in that
    /// order.
    pub fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Store) -> EditorResult<T>,
    ) -> EditorResult<(T, RecordChanges)> {
        if self.tx.is_some() {
            return f(self).map(|value| (value, RecordChanges::default()));
        }
        self.tx = Some(TxState::default());
        match f(self) {
            Ok(value) => {
                let tx = self.tx.take().unwrap_or_default();
                log::trace!(
                    "committed transaction: +{} ~{} -{}",
                    tx.changes.created.len(),
                    tx.changes.updated.len(),
                    tx.changes.deleted.len()
                );
                Ok((value, tx.changes))
            }
            Err(err) => {
                let tx = self.tx.take().unwrap_or_default();
                self.revert(&tx.changes);
                log::debug!("transaction aborted: {err}");
                Err(err)
            }
        }
    }

    /// Create records; an implicit transaction when none is open.
    pub fn create_records(&mut self, records: Vec<Record>) -> EditorResult<()> {
        self.run_ops(records.into_iter().map(RecordOp::Create).collect())
    }

    /// Replace records by id; an implicit transaction when none is open.
    pub fn update_records(&mut self, records: Vec<Record>) -> EditorResult<()> {
        self.run_ops(records.into_iter().map(RecordOp::Update).collect())
    }

    /// Delete records (shapes cascade to their descendants); an implicit
    /// transaction when none is open.
    pub fn delete_records(&mut self, ids: Vec<RecordId>) -> EditorResult<()> {
        let mut expanded = Vec::new();
        for id in ids {
            if let RecordId::Shape(shape_id) = id {
                self.collect_descendants(shape_id, &mut expanded);
            }
            expanded.push(id);
        }
        self.run_ops(expanded.into_iter().map(RecordOp::Delete).collect())
    }

    fn collect_descendants(&self, id: ShapeId, out: &mut Vec<RecordId>) {
        for child in self.sorted_child_ids(ParentId::Shape(id)) {
            self.collect_descendants(child, out);
            out.push(child.into());
        }
    }

    fn run_ops(&mut self, ops: Vec<RecordOp>) -> EditorResult<()> {
        if self.tx.is_some() {
            self.apply_ops(ops)
        } else {
            let ((), changes) = self.transact(move |store| store.apply_ops(ops))?;
            self.notify(&changes);
            Ok(())
        }
    }

    fn apply_ops(&mut self, ops: Vec<RecordOp>) -> EditorResult<()> {
        // The handler registry is taken out for the duration of the
        // dispatch so handlers can read the store while it is borrowed.
        let mut sfx = mem::take(&mut self.side_effects);
        let result = self.apply_ops_with(&mut sfx, ops, 0);
        self.side_effects = sfx;
        result
    }

    fn apply_ops_with(
        &mut self,
        sfx: &mut SideEffectManager,
        ops: Vec<RecordOp>,
        depth: usize,
    ) -> EditorResult<()> {
        if depth > MAX_EFFECT_DEPTH {
            return Err(SideEffectLoopError { depth }.into());
        }
        let mut fx = Effects::default();
        for op in ops {
            match op {
                RecordOp::Create(record) => {
                    let record = sfx.run_before_create(self, record);
                    let id = record.id();
                    if self.records.contains_key(&id) {
                        return Err(StoreError::DuplicateId(id).into());
                    }
                    self.validate_structure(&record)?;
                    self.records.insert(id, record.clone());
                    self.invalidate_children(&record);
                    self.record_change(|changes| changes.record_created(record.clone()));
                    sfx.run_after_create(self, &record, &mut fx);
                }
                RecordOp::Update(next) => {
                    let id = next.id();
                    let Some(prev) = self.records.get(&id).cloned() else {
                        return Err(StoreError::UnknownId(id).into());
                    };
                    let next = sfx.run_before_change(self, &prev, next);
                    if next == prev {
                        continue;
                    }
                    check_lock(&prev, &next)?;
                    self.validate_structure(&next)?;
                    self.records.insert(id, next.clone());
                    self.invalidate_children(&next);
                    self.record_change(|changes| {
                        changes.record_updated(prev.clone(), next.clone())
                    });
                    sfx.run_after_change(self, &prev, &next, &mut fx);
                }
                RecordOp::Delete(id) => {
                    let Some(prev) = self.records.get(&id).cloned() else {
                        log::trace!("delete of missing record {id} ignored");
                        continue;
                    };
                    if !sfx.run_before_delete(self, &prev) {
                        log::debug!("delete of {id} vetoed by side effect");
                        continue;
                    }
                    // A shape with surviving children (a cascade runs
                    // children first, so any left were vetoed) stays too;
                    // parent chains must keep terminating at a page.
                    if let Record::Shape(shape) = &prev {
                        if !self.sorted_child_ids(ParentId::Shape(shape.id)).is_empty() {
                            log::debug!("delete of {id} skipped: children remain");
                            continue;
                        }
                    }
                    self.records.remove(&id);
                    self.invalidate_children(&prev);
                    self.record_change(|changes| changes.record_deleted(prev.clone()));
                    sfx.run_after_delete(self, &prev, &mut fx);
                }
            }
        }
        if !fx.is_empty() {
            self.apply_ops_with(sfx, fx.ops, depth + 1)?;
        }
        Ok(())
    }

    fn record_change(&mut self, f: impl FnOnce(&mut RecordChanges)) {
        if let Some(tx) = self.tx.as_mut() {
            f(&mut tx.changes);
        }
    }

    /// Structural invariants checked on every write of a shape: the
    /// parent must exist and the parent chain must stay acyclic.
    fn validate_structure(&self, record: &Record) -> Result<(), StoreError> {
        let Record::Shape(shape) = record else {
            return Ok(());
        };
        let parent_id = RecordId::from(shape.parent);
        if !self.records.contains_key(&parent_id) {
            return Err(StoreError::MissingParent(parent_id));
        }
        let mut cursor = shape.parent;
        // The existing tree is acyclic, so this walk terminates.
        while let ParentId::Shape(ancestor) = cursor {
            if ancestor == shape.id {
                return Err(StoreError::ParentCycle(shape.id));
            }
            match self.get_shape(ancestor) {
                Some(parent_shape) => cursor = parent_shape.parent,
                None => break,
            }
        }
        Ok(())
    }

    fn invalidate_children(&self, record: &Record) {
        if matches!(record, Record::Shape(_)) {
            *self.children.borrow_mut() = None;
        }
    }

    fn revert(&mut self, changes: &RecordChanges) {
        for id in changes.created.keys() {
            self.records.remove(id);
        }
        for (id, (prev, _)) in &changes.updated {
            self.records.insert(*id, prev.clone());
        }
        for (id, prev) in &changes.deleted {
            self.records.insert(*id, prev.clone());
        }
        *self.children.borrow_mut() = None;
    }

    /// Broadcast a committed diff to listeners.
    pub fn notify(&mut self, changes: &RecordChanges) {
        if changes.is_empty() {
            return;
        }
        let mut listeners = mem::take(&mut self.listeners);
        for (_, listener) in &mut listeners {
            listener(changes);
        }
        // Keep any listeners registered during dispatch.
        listeners.append(&mut self.listeners);
        self.listeners = listeners;
    }

    /// Child shape ids of `parent`, sorted by fractional index
    /// (back-to-front). Memoized until the next shape write.
    pub fn sorted_child_ids(&self, parent: ParentId) -> Vec<ShapeId> {
        let mut cache = self.children.borrow_mut();
        let map = cache.get_or_insert_with(|| {
            let mut grouped: HashMap<ParentId, Vec<(crate::records::FracIndex, ShapeId)>> =
                HashMap::new();
            for record in self.records.values() {
                if let Record::Shape(shape) = record {
                    grouped
                        .entry(shape.parent)
                        .or_default()
                        .push((shape.index.clone(), shape.id));
                }
            }
            grouped
                .into_iter()
                .map(|(parent, mut children)| {
                    children.sort();
                    (parent, children.into_iter().map(|(_, id)| id).collect())
                })
                .collect()
        });
        map.get(&parent).cloned().unwrap_or_default()
    }

    /// Copy the whole record set (gesture start).
    pub fn snapshot(&self) -> StoreSnapshot {
        debug_assert!(self.tx.is_none(), "snapshot inside a transaction");
        StoreSnapshot {
            records: self.records.clone(),
        }
    }

    /// Silently replace the record set (gesture cancel/consolidation).
    /// No hooks, no history, no notifications.
    pub fn restore(&mut self, snapshot: StoreSnapshot) {
        debug_assert!(self.tx.is_none(), "restore inside a transaction");
        self.records = snapshot.records;
        *self.children.borrow_mut() = None;
    }

    /// Fast-path insert/replace of a whole record. Gesture-only; the
    /// gesture must have snapshotted the store and must end with a
    /// consolidating transaction.
    pub fn fast_put(&mut self, record: Record) {
        debug_assert!(self.tx.is_none(), "fast path inside a transaction");
        self.invalidate_children(&record);
        self.records.insert(record.id(), record);
    }

    /// Fast-path in-place geometry edit. Returns `false` for a missing
    /// or locked shape (locked shapes are never poked).
    pub fn poke_shape(&mut self, id: ShapeId, f: impl FnOnce(GeometryMut<'_>)) -> bool {
        debug_assert!(self.tx.is_none(), "fast path inside a transaction");
        match self.records.get_mut(&RecordId::Shape(id)) {
            Some(Record::Shape(shape)) if !shape.is_locked => {
                f(GeometryMut { shape });
                true
            }
            _ => false,
        }
    }

    /// Undo one recorded diff. Validates the whole entry against the
    /// current records first; a divergence reports a conflict and leaves
    /// the store untouched.
    pub fn apply_diff_backward(
        &mut self,
        changes: &RecordChanges,
    ) -> Result<(), HistoryConflictError> {
        for (id, record) in &changes.created {
            if self.records.get(id) != Some(record) {
                return Err(HistoryConflictError { id: *id });
            }
        }
        for (id, (_, next)) in &changes.updated {
            if self.records.get(id) != Some(next) {
                return Err(HistoryConflictError { id: *id });
            }
        }
        for (id, _) in &changes.deleted {
            if self.records.contains_key(id) {
                return Err(HistoryConflictError { id: *id });
            }
        }
        for id in changes.created.keys() {
            self.records.remove(id);
        }
        for (id, (prev, _)) in &changes.updated {
            self.records.insert(*id, prev.clone());
        }
        for (id, prev) in &changes.deleted {
            self.records.insert(*id, prev.clone());
        }
        *self.children.borrow_mut() = None;
        Ok(())
    }

    /// Redo one recorded diff; same conflict policy as
    /// [`Store::apply_diff_backward`].
    pub fn apply_diff_forward(
        &mut self,
        changes: &RecordChanges,
    ) -> Result<(), HistoryConflictError> {
        for (id, _) in &changes.created {
            if self.records.contains_key(id) {
                return Err(HistoryConflictError { id: *id });
            }
        }
        for (id, (prev, _)) in &changes.updated {
            if self.records.get(id) != Some(prev) {
                return Err(HistoryConflictError { id: *id });
            }
        }
        for (id, prev) in &changes.deleted {
            if self.records.get(id) != Some(prev) {
                return Err(HistoryConflictError { id: *id });
            }
        }
        for (id, record) in &changes.created {
            self.records.insert(*id, record.clone());
        }
        for (id, (_, next)) in &changes.updated {
            self.records.insert(*id, next.clone());
        }
        for id in changes.deleted.keys() {
            self.records.remove(id);
        }
        *self.children.borrow_mut() = None;
        Ok(())
    }

    /// Serialize the current record set for external exporters.
    pub fn export_snapshot(&self) -> serde_json::Result<String> {
        let records: Vec<&Record> = self.records.values().collect();
        serde_json::to_string_pretty(&records)
    }
}

/// Locked shapes reject every change while they stay locked; unlocking
/// (possibly combined with other edits) is allowed.
fn check_lock(prev: &Record, next: &Record) -> Result<(), StoreError> {
    if let (Record::Shape(prev_shape), Record::Shape(next_shape)) = (prev, next) {
        if prev_shape.is_locked && next_shape.is_locked {
            return Err(StoreError::LockedShape(prev_shape.id));
        }
    }
    Ok(())
}

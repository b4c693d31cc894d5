//! One undo step: an ordered, deduplicated list of records.

use hashbrown::{HashMap, HashSet};
use tracing::{debug, trace};

use crate::{
    object::{ElementOps, ReferenceCollector},
    types::{ArrayHandle, ArrayOp, Direction, ObjectRef},
};

use super::record::{ArrayRange, RecordKind, TransactionRecord, restore_at};

/// Title, originating system and headline object of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoSessionContext {
    /// Text shown next to the undo/redo menu entry.
    pub title: String,
    /// Name of the system that opened the transaction.
    pub context: String,
    /// Object the transaction is about, if any.
    pub primary_object: Option<ObjectRef>,
}

/// A set of captured, replayable changes to a set of objects.
#[derive(Debug)]
pub struct Transaction {
    records: Vec<TransactionRecord>,
    title: String,
    context: String,
    primary_object: Option<ObjectRef>,
    /// Save count per object with a whole-object snapshot.
    object_map: HashMap<ObjectRef, u32>,
    flip: bool,
    inc: Direction,
}

impl Transaction {
    /// Creates an empty transaction.
    ///
    /// With `flip` set, every [`Transaction::apply`] re-captures what it
    /// overwrote so the next apply reverses it.
    pub fn new(context: impl Into<String>, title: impl Into<String>, flip: bool) -> Self {
        Self {
            records: Vec::new(),
            title: title.into(),
            context: context.into(),
            primary_object: None,
            object_map: HashMap::new(),
            flip,
            inc: Direction::Backward,
        }
    }

    /// Snapshots `obj` unless it was already snapshotted by this transaction.
    pub fn save_object(&mut self, obj: &ObjectRef) {
        if !obj.borrow().is_transactable() {
            return;
        }
        if let Some(count) = self.object_map.get_mut(obj) {
            *count += 1;
            return;
        }
        self.object_map.insert(obj.clone(), 1);
        self.records
            .push(TransactionRecord::capture(obj.clone(), RecordKind::Object));
    }

    /// Captures a range of an array owned by `obj`.
    ///
    /// Call after inserting (or before, the range is only checked against
    /// the insert position) and before removing or modifying elements.
    pub fn save_array(
        &mut self,
        obj: &ObjectRef,
        handle: ArrayHandle,
        index: usize,
        count: usize,
        op: ArrayOp,
        element: ElementOps,
    ) {
        if !obj.borrow().is_transactable() {
            return;
        }
        assert!(element.element_size != 0, "array element size must be non-zero");
        {
            let mut owner = obj.borrow_mut();
            let name = owner.object_name();
            let Some(array) = owner.array_mut(handle) else {
                panic!("{name} has no array for {handle:?}");
            };
            let len = array.len();
            let Some(end) = index.checked_add(count) else {
                panic!("{name}: range {index} + {count} overflows");
            };
            match op {
                ArrayOp::Insert => assert!(index <= len, "{name}: insert at {index} past array of {len}"),
                ArrayOp::Remove | ArrayOp::Modify => {
                    assert!(end <= len, "{name}: range {index}..{end} outside array of {len}");
                }
            }
        }
        let range = ArrayRange {
            handle,
            index,
            count,
            op,
            element,
        };
        self.records
            .push(TransactionRecord::capture(obj.clone(), RecordKind::Array(range)));
    }

    /// Sets the headline object. Only the first call has an effect.
    pub fn set_primary_object(&mut self, obj: &ObjectRef) {
        if self.primary_object.is_none() {
            self.primary_object = Some(obj.clone());
        }
    }

    /// Restores every record in the current direction.
    ///
    /// Undo hooks run once per distinct object: all `pre_edit_undo` calls
    /// before the first record is restored, all `post_edit_undo` calls after
    /// the last.
    pub fn apply(&mut self) {
        let order: Vec<usize> = match self.inc {
            Direction::Forward => (0..self.records.len()).collect(),
            Direction::Backward => (0..self.records.len()).rev().collect(),
        };
        trace!(title = %self.title, records = order.len(), inc = ?self.inc, "applying transaction");

        let mut seen: HashSet<ObjectRef> = HashSet::new();
        let mut changed: Vec<ObjectRef> = Vec::new();
        for &idx in &order {
            let record = &mut self.records[idx];
            record.clear_restored();
            let obj = record.object();
            if seen.insert(obj.clone()) {
                if let Some(hooks) = obj.borrow_mut().undo_aware() {
                    hooks.pre_edit_undo();
                }
                changed.push(obj.clone());
            }
        }

        for &idx in &order {
            restore_at(&mut self.records, idx, self.flip);
        }

        for obj in &changed {
            if let Some(hooks) = obj.borrow_mut().undo_aware() {
                hooks.post_edit_undo();
            }
        }

        if self.flip {
            self.inc = self.inc.reversed();
        }
    }

    /// Total bytes captured by all records.
    pub fn data_size(&self) -> usize {
        self.records.iter().map(TransactionRecord::data_len).sum()
    }

    /// Records in capture order.
    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Descriptive title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Title, context and primary object together.
    pub fn context(&self) -> UndoSessionContext {
        UndoSessionContext {
            title: self.title.clone(),
            context: self.context.clone(),
            primary_object: self.primary_object.clone(),
        }
    }

    /// Headline object, if set.
    pub fn primary_object(&self) -> Option<&ObjectRef> {
        self.primary_object.as_ref()
    }

    /// How many times `obj` was passed to [`Transaction::save_object`].
    pub fn save_count(&self, obj: &ObjectRef) -> Option<u32> {
        self.object_map.get(obj).copied()
    }

    /// Direction the next [`Transaction::apply`] walks the records.
    pub fn direction(&self) -> Direction {
        self.inc
    }

    /// Distinct objects touched by any record, in first-touch order.
    pub fn objects(&self) -> Vec<ObjectRef> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .map(TransactionRecord::object)
            .filter(|obj| seen.insert((*obj).clone()))
            .cloned()
            .collect()
    }

    /// Drops the newest `count` records.
    pub fn remove_records(&mut self, count: usize) {
        if self.records.len() >= count {
            self.truncate_records(self.records.len() - count);
        }
    }

    /// Keeps only the first `len` records.
    pub fn truncate_records(&mut self, len: usize) {
        self.records.truncate(len);
        let survivors: HashSet<&ObjectRef> = self
            .records
            .iter()
            .filter(|r| r.is_object_snapshot())
            .map(TransactionRecord::object)
            .collect();
        self.object_map.retain(|obj, _| survivors.contains(&obj));
    }

    /// Logs the dedup map with save counts.
    pub fn dump_object_map(&self) {
        debug!(title = %self.title, "object map begin");
        for (obj, count) in &self.object_map {
            debug!(count, object = ?obj, "object map entry");
        }
        debug!(title = %self.title, "object map end");
    }

    /// Reports every object this transaction keeps alive.
    pub fn add_referenced_objects(&self, collector: &mut dyn ReferenceCollector) {
        for record in &self.records {
            record.add_referenced_objects(collector);
        }
        for obj in self.object_map.keys() {
            collector.add_referenced_object(obj);
        }
        if let Some(obj) = &self.primary_object {
            collector.add_referenced_object(obj);
        }
    }
}

//! Single captured object snapshot or array-range mutation.

use std::ops::Range;

use tracing::trace;

use crate::{
    archive::Archive,
    object::{ElementOps, ReferenceCollector},
    types::{ArrayHandle, ArrayOp, Name, ObjectRef},
};

use super::indices::ReferenceTable;

/// Captured bytes plus the reference tables the bytes index into.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordData {
    bytes: Vec<u8>,
    objects: ReferenceTable<ObjectRef>,
    names: ReferenceTable<Name>,
}

/// Addressed slice of an array owned by the record's object.
#[derive(Debug, Clone, Copy)]
pub struct ArrayRange {
    /// Array field inside the owning object.
    pub handle: ArrayHandle,
    /// First element of the range.
    pub index: usize,
    /// Number of elements in the range.
    pub count: usize,
    /// Mutation this range replays.
    pub op: ArrayOp,
    /// Element callbacks.
    pub element: ElementOps,
}

impl ArrayRange {
    fn span(&self) -> Range<usize> {
        self.index..self.index + self.count
    }
}

/// What a record captured.
#[derive(Debug, Clone, Copy)]
pub enum RecordKind {
    /// Whole-object snapshot.
    Object,
    /// Array-range mutation.
    Array(ArrayRange),
}

impl RecordKind {
    fn negated(self) -> Self {
        match self {
            Self::Object => Self::Object,
            Self::Array(range) => Self::Array(ArrayRange {
                op: range.op.negated(),
                ..range
            }),
        }
    }
}

/// One replayable capture inside a [`super::transaction::Transaction`].
#[derive(Debug)]
pub struct TransactionRecord {
    object: ObjectRef,
    kind: RecordKind,
    data: RecordData,
    restored: bool,
    binary: bool,
}

impl TransactionRecord {
    pub(crate) fn capture(object: ObjectRef, kind: RecordKind) -> Self {
        let binary = object.borrow().wants_binary_serialization();
        let mut data = RecordData::default();
        serialize_contents(&object, &kind, &mut RecordWriter::new(&mut data, binary));
        Self {
            object,
            kind,
            data,
            restored: false,
            binary,
        }
    }

    /// Object this record belongs to.
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    /// Snapshot or array-range details.
    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    /// True for whole-object snapshots.
    pub fn is_object_snapshot(&self) -> bool {
        matches!(self.kind, RecordKind::Object)
    }

    /// Size of the captured byte stream.
    pub fn data_len(&self) -> usize {
        self.data.bytes.len()
    }

    /// Objects referenced by the captured bytes, in table order.
    pub fn referenced_objects(&self) -> &[ObjectRef] {
        self.data.objects.as_slice()
    }

    /// Names referenced by the captured bytes, in table order.
    pub fn referenced_names(&self) -> &[Name] {
        self.data.names.as_slice()
    }

    /// True once restored during the current apply pass.
    pub fn is_restored(&self) -> bool {
        self.restored
    }

    /// True for compact binary capture, false for tagged capture.
    pub fn wants_binary(&self) -> bool {
        self.binary
    }

    pub(crate) fn clear_restored(&mut self) {
        self.restored = false;
    }

    pub(crate) fn add_referenced_objects(&self, collector: &mut dyn ReferenceCollector) {
        collector.add_referenced_object(&self.object);
        for obj in self.data.objects.as_slice() {
            collector.add_referenced_object(obj);
        }
    }
}

/// Restores `records[idx]`, capturing the replaced state first when `flip` is set.
///
/// A record restores at most once per apply pass; a second visit, whether
/// from iteration or from a preload request, is a no-op.
pub(crate) fn restore_at(records: &mut [TransactionRecord], idx: usize, flip: bool) {
    let record = &mut records[idx];
    if record.restored {
        return;
    }
    record.restored = true;

    let object = record.object.clone();
    let kind = record.kind;
    let binary = record.binary;

    let flipped = flip.then(|| {
        let reverse = kind.negated();
        let mut data = RecordData::default();
        serialize_contents(&object, &reverse, &mut RecordWriter::new(&mut data, binary));
        (reverse, data)
    });

    let data = std::mem::take(&mut record.data);
    trace!(?object, bytes = data.bytes.len(), flip, "restoring record");
    {
        let mut reader = RecordReader {
            owner: Some(&mut *records),
            flip,
            data: &data,
            offset: 0,
            binary,
        };
        serialize_contents(&object, &kind, &mut reader);
    }

    let record = &mut records[idx];
    match flipped {
        Some((reverse, flipped)) => {
            record.kind = reverse;
            record.data = flipped;
        }
        None => record.data = data,
    }
}

fn serialize_contents(object: &ObjectRef, kind: &RecordKind, ar: &mut dyn Archive) {
    match kind {
        RecordKind::Object => object.borrow_mut().serialize(ar),
        RecordKind::Array(range) => serialize_range(object, range, ar),
    }
}

fn serialize_range(object: &ObjectRef, range: &ArrayRange, ar: &mut dyn Archive) {
    assert!(range.element.element_size != 0, "array record with zero element size");

    let mut owner = object.borrow_mut();
    let name = owner.object_name();
    let Some(array) = owner.array_mut(range.handle) else {
        panic!("{name} has no array for {:?}", range.handle);
    };

    match range.op {
        ArrayOp::Insert => {
            // Capturing an insert stores nothing; replaying it removes the slice.
            if ar.is_loading() {
                assert!(
                    range.span().end <= array.len(),
                    "{name}: range {:?} outside array of {}",
                    range.span(),
                    array.len()
                );
                if let Some(destruct) = range.element.destruct {
                    for i in range.span() {
                        destruct(array.element_mut(i));
                    }
                }
                array.remove_range(range.index, range.count);
            }
        }
        ArrayOp::Remove | ArrayOp::Modify => {
            if range.op == ArrayOp::Remove && ar.is_loading() {
                assert!(
                    range.index <= array.len(),
                    "{name}: insert position {} past array of {}",
                    range.index,
                    array.len()
                );
                array.insert_defaults(range.index, range.count);
            }
            assert!(
                range.span().end <= array.len(),
                "{name}: range {:?} outside array of {}",
                range.span(),
                array.len()
            );
            for i in range.span() {
                (range.element.serialize)(ar, array.element_mut(i));
            }
        }
    }
}

/// Appends to a record's byte stream, interning references as it goes.
pub(crate) struct RecordWriter<'a> {
    data: &'a mut RecordData,
    binary: bool,
}

impl<'a> RecordWriter<'a> {
    pub(crate) fn new(data: &'a mut RecordData, binary: bool) -> Self {
        Self { data, binary }
    }

    fn write_index(&mut self, idx: u32) {
        self.data.bytes.extend_from_slice(&idx.to_le_bytes());
    }
}

impl Archive for RecordWriter<'_> {
    fn is_loading(&self) -> bool {
        false
    }

    fn wants_binary(&self) -> bool {
        self.binary
    }

    fn bytes(&mut self, data: &mut [u8]) {
        self.data.bytes.extend_from_slice(data);
    }

    fn object(&mut self, obj: &mut Option<ObjectRef>) {
        let idx = obj
            .as_ref()
            .map_or(0, |obj| self.data.objects.intern(obj) + 1);
        self.write_index(idx);
    }

    fn name(&mut self, name: &mut Name) {
        let idx = self.data.names.intern(name);
        self.write_index(idx);
    }

    fn tell(&self) -> usize {
        self.data.bytes.len()
    }
}

/// Reads a record's byte stream back, resolving table indices.
struct RecordReader<'a> {
    owner: Option<&'a mut [TransactionRecord]>,
    flip: bool,
    data: &'a RecordData,
    offset: usize,
    binary: bool,
}

impl RecordReader<'_> {
    fn read_index(&mut self) -> u32 {
        let mut raw = [0u8; 4];
        self.bytes(&mut raw);
        u32::from_le_bytes(raw)
    }
}

impl Archive for RecordReader<'_> {
    fn is_loading(&self) -> bool {
        true
    }

    fn wants_binary(&self) -> bool {
        self.binary
    }

    fn bytes(&mut self, data: &mut [u8]) {
        let end = self.offset + data.len();
        assert!(
            end <= self.data.bytes.len(),
            "record read past end: {end} > {}",
            self.data.bytes.len()
        );
        data.copy_from_slice(&self.data.bytes[self.offset..end]);
        self.offset = end;
    }

    fn object(&mut self, obj: &mut Option<ObjectRef>) {
        let idx = self.read_index();
        *obj = match idx {
            0 => None,
            n => match self.data.objects.get(n - 1) {
                Some(found) => Some(found.clone()),
                None => panic!("object index {} outside reference table", n - 1),
            },
        };
    }

    fn name(&mut self, name: &mut Name) {
        let idx = self.read_index();
        match self.data.names.get(idx) {
            Some(found) => *name = found.clone(),
            None => panic!("name index {idx} outside name table"),
        }
    }

    fn tell(&self) -> usize {
        self.offset
    }

    fn preload(&mut self, obj: &ObjectRef) {
        // A borrowed object is mid-restore further up the stack.
        if obj.is_borrowed() {
            return;
        }
        let flip = self.flip;
        let Some(records) = self.owner.as_deref_mut() else {
            return;
        };
        for idx in 0..records.len() {
            if records[idx].object == *obj {
                restore_at(records, idx, flip);
            }
        }
    }
}

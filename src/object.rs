//! Contracts that edited objects implement so the engine can capture them.

use std::{any::Any, borrow::Cow, mem};

use hashbrown::HashSet;

use crate::{
    archive::{Archive, Archived},
    types::{ArrayHandle, ObjectRef},
};

/// An object whose state can be captured into and restored from a record.
pub trait Transactable {
    /// Transfers every field through `ar`.
    ///
    /// The same body runs for capture and restore; [`Archive::is_loading`]
    /// tells the two apart.
    fn serialize(&mut self, ar: &mut dyn Archive);

    /// Resolves an array field for range records.
    fn array_mut(&mut self, _handle: ArrayHandle) -> Option<&mut dyn ScriptArray> {
        None
    }

    /// False for transient state that must never enter the undo history.
    fn is_transactable(&self) -> bool {
        true
    }

    /// Compact binary records when true, tagged records otherwise.
    fn wants_binary_serialization(&self) -> bool {
        true
    }

    /// Optional undo lifecycle hooks.
    fn undo_aware(&mut self) -> Option<&mut dyn UndoAware> {
        None
    }

    /// Label used in logs and debug output.
    fn object_name(&self) -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }
}

/// Hooks invoked once per distinct object around each transaction apply.
pub trait UndoAware {
    /// Called before any record touching the object is restored.
    fn pre_edit_undo(&mut self) {}
    /// Called after every record of the transaction has been restored.
    fn post_edit_undo(&mut self) {}
}

/// Type-erased growable array addressed by array-range records.
pub trait ScriptArray {
    /// Number of elements.
    fn len(&self) -> usize;

    /// True when the array holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `count` default elements before `index`.
    fn insert_defaults(&mut self, index: usize, count: usize);

    /// Drops `count` elements starting at `index`.
    fn remove_range(&mut self, index: usize, count: usize);

    /// Element at `index` as `Any` for the element serializer.
    fn element_mut(&mut self, index: usize) -> &mut dyn Any;
}

impl<T: Default + 'static> ScriptArray for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn insert_defaults(&mut self, index: usize, count: usize) {
        self.splice(index..index, std::iter::repeat_with(T::default).take(count));
    }

    fn remove_range(&mut self, index: usize, count: usize) {
        self.drain(index..index + count);
    }

    fn element_mut(&mut self, index: usize) -> &mut dyn Any {
        &mut self[index]
    }
}

/// Serializes one array element through an archive.
pub type ElementSerializer = fn(&mut dyn Archive, &mut dyn Any);
/// Releases resources held by one array element before removal.
pub type ElementDestructor = fn(&mut dyn Any);

/// Per-element callbacks for array-range records.
#[derive(Debug, Clone, Copy)]
pub struct ElementOps {
    /// Size of one element in bytes.
    pub element_size: usize,
    /// Element serializer, used for both directions.
    pub serialize: ElementSerializer,
    /// Optional destructor run on elements removed during replay.
    pub destruct: Option<ElementDestructor>,
}

impl ElementOps {
    /// Callbacks for elements of type `T`.
    pub fn of<T: Archived + 'static>() -> Self {
        Self {
            element_size: mem::size_of::<T>(),
            serialize: serialize_element::<T>,
            destruct: None,
        }
    }

    /// Replaces the element destructor.
    pub fn with_destructor(mut self, destruct: ElementDestructor) -> Self {
        self.destruct = Some(destruct);
        self
    }
}

fn serialize_element<T: Archived + 'static>(ar: &mut dyn Archive, elem: &mut dyn Any) {
    match elem.downcast_mut::<T>() {
        Some(value) => value.archive(ar),
        None => panic!(
            "array element is not a {}",
            std::any::type_name::<T>()
        ),
    }
}

/// Sink for the object references a transaction keeps alive.
pub trait ReferenceCollector {
    /// Reports one referenced object.
    fn add_referenced_object(&mut self, obj: &ObjectRef);
}

impl ReferenceCollector for HashSet<ObjectRef> {
    fn add_referenced_object(&mut self, obj: &ObjectRef) {
        if !self.contains(obj) {
            self.insert(obj.clone());
        }
    }
}

impl ReferenceCollector for Vec<ObjectRef> {
    fn add_referenced_object(&mut self, obj: &ObjectRef) {
        self.push(obj.clone());
    }
}

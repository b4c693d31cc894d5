//! Shared handle and enum types used across the transaction engine.

use std::{
    cell::{Ref, RefCell, RefMut},
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
};

use serde::{Deserialize, Serialize};

use crate::object::Transactable;

/// Shared, identity-compared handle to a transactable object.
///
/// Two handles are equal only when they point at the same allocation. The
/// engine never looks inside the object except through [`Transactable`].
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<dyn Transactable>>);

impl ObjectRef {
    /// Wraps `value` in a fresh shared allocation.
    pub fn new<T: Transactable + 'static>(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// Creates a handle sharing the allocation behind `rc`.
    pub fn from_rc<T: Transactable + 'static>(rc: &Rc<RefCell<T>>) -> Self {
        let shared: Rc<RefCell<dyn Transactable>> = rc.clone();
        Self(shared)
    }

    /// Immutably borrows the object.
    pub fn borrow(&self) -> Ref<'_, dyn Transactable> {
        self.0.borrow()
    }

    /// Mutably borrows the object.
    ///
    /// Panics if the object is already borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, dyn Transactable> {
        self.0.borrow_mut()
    }

    /// True while any borrow of the object is outstanding.
    pub fn is_borrowed(&self) -> bool {
        self.0.try_borrow_mut().is_err()
    }

    /// Number of strong handles keeping the object alive.
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// True when both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl<T: Transactable + 'static> From<&Rc<RefCell<T>>> for ObjectRef {
    fn from(value: &Rc<RefCell<T>>) -> Self {
        Self::from_rc(value)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(obj) => write!(f, "ObjectRef({}@{:#x})", obj.object_name(), self.addr()),
            Err(_) => write!(f, "ObjectRef(<borrowed>@{:#x})", self.addr()),
        }
    }
}

/// Interned-style identifier stored in a record's name table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name(String);

impl Name {
    /// Creates a name from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrows the name text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one array field inside its owning object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayHandle(pub u32);

/// Mutation recorded against an array range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrayOp {
    /// Elements were added at the range.
    Insert,
    /// Elements are about to be removed from the range.
    Remove,
    /// Elements in the range are about to change in place.
    Modify,
}

impl ArrayOp {
    /// Operation that reverses this one.
    pub fn negated(self) -> Self {
        match self {
            Self::Insert => Self::Remove,
            Self::Remove => Self::Insert,
            Self::Modify => Self::Modify,
        }
    }
}

/// Order in which a transaction walks its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Oldest record first (redo).
    Forward,
    /// Newest record first (undo).
    Backward,
}

impl Direction {
    /// The opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

//! Bidirectional archive used by object and element serializers.
//!
//! Binary archives store fixed-width little-endian values back to back.
//! Tagged archives prefix every value with a [`ValueTag`] byte that is
//! checked on read, so a serializer that drifted out of sync with the
//! captured bytes fails loudly instead of restoring garbage.

use serde::{Serialize, de::DeserializeOwned};

use crate::types::{Name, ObjectRef};

/// One-byte type marker written ahead of each value in tagged archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueTag {
    /// `bool`.
    Bool = 1,
    /// `u8`.
    U8 = 2,
    /// `u16`.
    U16 = 3,
    /// `u32`.
    U32 = 4,
    /// `u64`.
    U64 = 5,
    /// `i32`.
    I32 = 6,
    /// `i64`.
    I64 = 7,
    /// `f32`.
    F32 = 8,
    /// `f64`.
    F64 = 9,
    /// Length-prefixed UTF-8 text.
    Str = 10,
    /// Object reference slot.
    Object = 11,
    /// Name table slot.
    Name = 12,
    /// Length-prefixed sequence.
    Seq = 13,
}

/// Byte stream plus reference tables, either being written or read.
pub trait Archive {
    /// True when restoring from captured bytes.
    fn is_loading(&self) -> bool;

    /// True for compact binary records, false for tagged records.
    fn wants_binary(&self) -> bool;

    /// Writes `data` or fills it from the stream.
    fn bytes(&mut self, data: &mut [u8]);

    /// Transfers an object reference as an index into the record's object table.
    fn object(&mut self, obj: &mut Option<ObjectRef>);

    /// Transfers a name as an index into the record's name table.
    fn name(&mut self, name: &mut Name);

    /// Current offset in the byte stream.
    fn tell(&self) -> usize;

    /// Asks for `obj` to be in its restored state before reading continues.
    fn preload(&mut self, _obj: &ObjectRef) {}

    /// Emits or verifies a value tag. No-op for binary archives.
    fn value_tag(&mut self, tag: ValueTag) {
        if self.wants_binary() {
            return;
        }
        let mut raw = [tag as u8];
        self.bytes(&mut raw);
        if self.is_loading() {
            assert_eq!(
                raw[0], tag as u8,
                "tagged archive mismatch at offset {}: expected {tag:?}",
                self.tell() - 1
            );
        }
    }
}

/// A value that knows how to move itself through an [`Archive`].
pub trait Archived {
    /// Writes or reads `self`.
    fn archive(&mut self, ar: &mut dyn Archive);
}

macro_rules! archived_le {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl Archived for $ty {
                fn archive(&mut self, ar: &mut dyn Archive) {
                    ar.value_tag(ValueTag::$tag);
                    let mut raw = self.to_le_bytes();
                    ar.bytes(&mut raw);
                    if ar.is_loading() {
                        *self = <$ty>::from_le_bytes(raw);
                    }
                }
            }
        )*
    };
}

archived_le! {
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}

impl Archived for bool {
    fn archive(&mut self, ar: &mut dyn Archive) {
        ar.value_tag(ValueTag::Bool);
        let mut raw = [u8::from(*self)];
        ar.bytes(&mut raw);
        if ar.is_loading() {
            *self = raw[0] != 0;
        }
    }
}

fn archive_len(ar: &mut dyn Archive, len: usize) -> usize {
    let mut raw = u32::try_from(len)
        .unwrap_or_else(|_| panic!("length {len} does not fit a record"))
        .to_le_bytes();
    ar.bytes(&mut raw);
    u32::from_le_bytes(raw) as usize
}

impl Archived for String {
    fn archive(&mut self, ar: &mut dyn Archive) {
        ar.value_tag(ValueTag::Str);
        let len = archive_len(ar, self.len());
        if ar.is_loading() {
            let mut raw = vec![0u8; len];
            ar.bytes(&mut raw);
            *self = String::from_utf8_lossy(&raw).into_owned();
        } else {
            let mut raw = self.as_bytes().to_vec();
            ar.bytes(&mut raw);
        }
    }
}

impl Archived for Name {
    fn archive(&mut self, ar: &mut dyn Archive) {
        ar.value_tag(ValueTag::Name);
        ar.name(self);
    }
}

impl Archived for Option<ObjectRef> {
    fn archive(&mut self, ar: &mut dyn Archive) {
        ar.value_tag(ValueTag::Object);
        ar.object(self);
    }
}

impl Archived for ObjectRef {
    fn archive(&mut self, ar: &mut dyn Archive) {
        let mut slot = Some(self.clone());
        slot.archive(ar);
        match slot {
            Some(obj) => *self = obj,
            None => panic!("null object reference restored into a non-null slot"),
        }
    }
}

impl<T: Archived + Default> Archived for Vec<T> {
    fn archive(&mut self, ar: &mut dyn Archive) {
        ar.value_tag(ValueTag::Seq);
        let len = archive_len(ar, self.len());
        if ar.is_loading() {
            self.clear();
            self.resize_with(len, T::default);
        }
        for item in self.iter_mut() {
            item.archive(ar);
        }
    }
}

impl<T: Archived, const N: usize> Archived for [T; N] {
    fn archive(&mut self, ar: &mut dyn Archive) {
        for item in self.iter_mut() {
            item.archive(ar);
        }
    }
}

/// Moves any serde value through `ar` as a length-prefixed JSON blob.
///
/// Useful for fields whose types already derive serde traits and do not
/// hold object references.
pub fn archive_serde<T: Serialize + DeserializeOwned>(ar: &mut dyn Archive, value: &mut T) {
    let mut blob = if ar.is_loading() {
        Vec::new()
    } else {
        match serde_json::to_vec(value) {
            Ok(blob) => blob,
            Err(err) => panic!("value cannot be captured as JSON: {err}"),
        }
    };
    blob.archive(ar);
    if ar.is_loading() {
        match serde_json::from_slice(&blob) {
            Ok(restored) => *value = restored,
            Err(err) => panic!("captured JSON blob is unreadable: {err}"),
        }
    }
}

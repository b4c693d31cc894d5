use std::hash::Hash;

use hashbrown::HashMap;

/// Deduplicated, index-addressed table of references.
///
/// Records store only indices into these tables, never nested copies, so a
/// captured object graph with cycles stays flat.
#[derive(Debug, Clone)]
pub struct ReferenceTable<T> {
    items: Vec<T>,
    index: HashMap<T, u32>,
}

impl<T> Default for ReferenceTable<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> ReferenceTable<T> {
    /// Returns the index of `item`, appending it when first seen.
    pub fn intern(&mut self, item: &T) -> u32 {
        if let Some(idx) = self.index.get(item) {
            return *idx;
        }
        let idx = u32::try_from(self.items.len())
            .unwrap_or_else(|_| panic!("reference table overflow"));
        self.items.push(item.clone());
        self.index.insert(item.clone(), idx);
        idx
    }
}

impl<T> ReferenceTable<T> {
    /// Entry at `idx`.
    pub fn get(&self, idx: u32) -> Option<&T> {
        self.items.get(idx as usize)
    }

    /// Entries in first-seen order.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Number of distinct entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no entry was interned.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

//! Track which attributes of an instance currently hold loaded values.
//!
//! Indices follow the order of `Model::fields()`. An attribute that is not in
//! the set is "unloaded": reading it through the session fires the lazy
//! loader (or raises, for raise-mode attributes).

/// A compact bitset over attribute indices `0..len`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedSet {
    len: usize,
    bits: Box<[u64]>,
}

impl LoadedSet {
    /// Create an empty (nothing loaded) set for `len` attributes.
    #[must_use]
    pub fn empty(len: usize) -> Self {
        let words = len.div_ceil(64);
        Self {
            len,
            bits: vec![0u64; words].into_boxed_slice(),
        }
    }

    /// Create a full (everything loaded) set for `len` attributes.
    #[must_use]
    pub fn all(len: usize) -> Self {
        let mut s = Self::empty(len);
        for idx in 0..len {
            s.insert(idx);
        }
        s
    }

    /// Number of attributes represented by this set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if `len == 0`.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mark an attribute as loaded. Out-of-range indices are ignored.
    pub fn insert(&mut self, idx: usize) {
        if idx >= self.len {
            return;
        }
        if let Some(w) = self.bits.get_mut(idx / 64) {
            *w |= 1u64 << (idx % 64);
        }
    }

    /// Mark an attribute as unloaded (expired).
    pub fn remove(&mut self, idx: usize) {
        if idx >= self.len {
            return;
        }
        if let Some(w) = self.bits.get_mut(idx / 64) {
            *w &= !(1u64 << (idx % 64));
        }
    }

    /// Check whether an attribute is loaded.
    #[must_use]
    pub fn contains(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        self.bits
            .get(idx / 64)
            .is_some_and(|w| (w & (1u64 << (idx % 64))) != 0)
    }

    /// Number of loaded attributes.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Indices of loaded attributes, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|idx| self.contains(*idx))
    }
}

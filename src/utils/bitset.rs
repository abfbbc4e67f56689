//! Fixed-capacity bit set used by the data-flow analyses.
//!
//! Register liveness and phi placement work on dense sets of small integers (register
//! numbers and block indices). [`BitSet`] stores 64 members per word and reports whether a
//! mutating operation changed the set, which is what the fixed-point loops need to decide
//! when to stop.
//!
//! # Example
//!
//! ```rust,ignore
//! use dexscope::utils::BitSet;
//!
//! let mut live = BitSet::new(16);
//! live.insert(3);
//! live.insert(9);
//! assert!(live.contains(9));
//! assert_eq!(live.iter().collect::<Vec<_>>(), vec![3, 9]);
//! ```

use std::fmt;

/// A set of integers in `0..capacity` backed by a vector of words.
///
/// Indices at or beyond the capacity are never members: `insert` ignores them and
/// `contains` returns `false`, so malformed register numbers cannot panic an analysis.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitSet {
    words: Vec<u64>,
    capacity: usize,
}

impl BitSet {
    /// Creates an empty set able to hold `0..capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        BitSet {
            words: vec![0; capacity.div_ceil(64)],
            capacity,
        }
    }

    /// Returns the number of representable members.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if the set has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    /// Returns the number of members.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Adds `index`, returning `true` if it was not already present.
    pub fn insert(&mut self, index: usize) -> bool {
        if index >= self.capacity {
            return false;
        }
        let mask = 1u64 << (index % 64);
        let word = &mut self.words[index / 64];
        let added = *word & mask == 0;
        *word |= mask;
        added
    }

    /// Removes `index`, returning `true` if it was present.
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.capacity {
            return false;
        }
        let mask = 1u64 << (index % 64);
        let word = &mut self.words[index / 64];
        let removed = *word & mask != 0;
        *word &= !mask;
        removed
    }

    /// Returns `true` if `index` is a member.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index < self.capacity && self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Adds every member of `other`. Returns `true` if the set grew.
    pub fn union_with(&mut self, other: &BitSet) -> bool {
        let mut changed = false;
        for (word, &theirs) in self.words.iter_mut().zip(&other.words) {
            let merged = *word | theirs;
            changed |= merged != *word;
            *word = merged;
        }
        changed
    }

    /// Removes every member of `other`. Returns `true` if the set shrank.
    pub fn difference_with(&mut self, other: &BitSet) -> bool {
        let mut changed = false;
        for (word, &theirs) in self.words.iter_mut().zip(&other.words) {
            let kept = *word & !theirs;
            changed |= kept != *word;
            *word = kept;
        }
        changed
    }

    /// Iterates over the members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let mut remaining = word;
                std::iter::from_fn(move || {
                    if remaining == 0 {
                        return None;
                    }
                    let bit = remaining.trailing_zeros() as usize;
                    remaining &= remaining - 1;
                    Some(word_index * 64 + bit)
                })
            })
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let mut set = BitSet::new(130);
        assert!(set.is_empty());
        assert!(set.insert(0));
        assert!(set.insert(64));
        assert!(set.insert(129));
        assert!(!set.insert(64));
        assert_eq!(set.count(), 3);
        assert!(set.remove(64));
        assert!(!set.contains(64));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 129]);
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut set = BitSet::new(4);
        assert!(!set.insert(10));
        assert!(!set.contains(10));
        assert!(set.is_empty());
    }

    #[test]
    fn test_union_difference_report_change() {
        let mut a = BitSet::new(70);
        let mut b = BitSet::new(70);
        a.insert(1);
        b.insert(1);
        b.insert(69);

        assert!(a.union_with(&b));
        assert!(!a.union_with(&b));
        assert_eq!(a.count(), 2);

        let mut only = BitSet::new(70);
        only.insert(69);
        assert!(a.difference_with(&only));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(format!("{a:?}"), "{1}");
    }
}

use std::collections::HashMap;

use crate::name::Name;

/// Counted multiset of names.
#[derive(Debug, Clone, Default)]
pub struct NameMultiSet {
    counts: HashMap<Name, usize>,
    size: usize,
}

impl NameMultiSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct names.
    pub fn dimension(&self) -> usize {
        self.counts.len()
    }

    /// Total number of occurrences.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn count(&self, name: &Name) -> usize {
        self.counts.get(name).copied().unwrap_or(0)
    }

    /// Add one occurrence and return the count afterwards.
    pub fn add(&mut self, name: Name) -> usize {
        let n = self.counts.entry(name).or_insert(0);
        *n += 1;
        self.size += 1;
        *n
    }

    /// Remove one occurrence and return the count afterwards, or `None` if the
    /// name was not present.
    pub fn remove(&mut self, name: &Name) -> Option<usize> {
        let n = self.counts.get_mut(name)?;
        *n -= 1;
        self.size -= 1;
        let remaining = *n;
        if remaining == 0 {
            self.counts.remove(name);
        }
        Some(remaining)
    }

    pub fn multiplicities(&self) -> impl Iterator<Item = (&Name, usize)> {
        self.counts.iter().map(|(name, n)| (name, *n))
    }

    /// Remove everything, returning the distinct names that were present.
    pub fn drain_names(&mut self) -> Vec<Name> {
        self.size = 0;
        self.counts.drain().map(|(name, _)| name).collect()
    }
}

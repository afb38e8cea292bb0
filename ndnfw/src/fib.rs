use std::collections::{BTreeMap, HashMap};

use log::debug;
use ndnfw_core::{Name, NameComponent};

use crate::face::{FaceId, FwFace};

/// Forwarding Information Base.
///
/// Each prefix maps to the faces registered for it together with the
/// capture flag each face registered with.
#[derive(Debug, Default)]
pub struct Fib {
    entries: HashMap<Name, FibEntry>,
}

#[derive(Debug, Default)]
struct FibEntry {
    nexthops: HashMap<FaceId, (FwFace, bool)>,
}

impl FibEntry {
    fn capture(&self) -> bool {
        self.nexthops.values().any(|(_, capture)| *capture)
    }
}

impl Fib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `face` as a nexthop of `prefix`.
    ///
    /// # Panics
    ///
    /// Panics if the face is already a nexthop of `prefix`.
    pub fn insert(&mut self, face: &FwFace, prefix: Name, capture: bool) {
        debug!("FIB insert {} via {} capture={}", prefix, face, capture);
        let entry = self.entries.entry(prefix).or_default();
        let previous = entry.nexthops.insert(face.id(), (face.clone(), capture));
        assert!(previous.is_none(), "duplicate FIB nexthop for {}", face.id());
    }

    /// Remove `face` from the nexthops of `prefix`.
    ///
    /// # Panics
    ///
    /// Panics if there is no such nexthop.
    pub fn delete(&mut self, face: FaceId, prefix: &Name) {
        debug!("FIB delete {} via {}", prefix, face);
        let entry = self
            .entries
            .get_mut(prefix)
            .unwrap_or_else(|| panic!("FIB entry {} does not exist", prefix));
        let removed = entry.nexthops.remove(&face);
        assert!(removed.is_some(), "FIB nexthop {} of {} does not exist", face, prefix);
        if entry.nexthops.is_empty() {
            self.entries.remove(prefix);
        }
    }

    /// Longest prefix match.
    ///
    /// Nexthops accumulate from the longest matching prefix towards the root,
    /// stopping after the first entry where any nexthop captures.
    pub fn lookup(&self, name: &Name) -> Vec<FwFace> {
        let mut result = BTreeMap::new();
        for len in (0..=name.len()).rev() {
            let prefix: &[NameComponent] = &name.components[..len];
            let Some(entry) = self.entries.get(prefix) else {
                continue;
            };
            for (id, (face, _)) in &entry.nexthops {
                result.entry(*id).or_insert_with(|| face.clone());
            }
            if entry.capture() {
                break;
            }
        }
        result.into_values().collect()
    }

    /// Number of prefixes with at least one nexthop.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted `(prefix, [(face, capture)])` listing of the table.
    pub fn snapshot(&self) -> Vec<(Name, Vec<(FaceId, bool)>)> {
        let mut rows: Vec<_> = self
            .entries
            .iter()
            .map(|(prefix, entry)| {
                let mut nexthops: Vec<_> = entry
                    .nexthops
                    .iter()
                    .map(|(id, (_, capture))| (*id, *capture))
                    .collect();
                nexthops.sort();
                (prefix.clone(), nexthops)
            })
            .collect();
        rows.sort();
        rows
    }
}

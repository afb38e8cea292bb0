use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;

use ndnfw_core::Name;

use crate::events::{EventDispatcher, ForwarderEvent};
use crate::face::{FaceId, PrefixAnnouncement, PrefixAnnouncementObj};

/// Receiver of advertise/withdraw decisions, implemented by
/// [`crate::ReadvertiseDestination`].
pub(crate) trait Destination: Send + Sync {
    fn id(&self) -> usize;
    fn advertise(&self, name: &Name);
    fn withdraw(&self, name: &Name);
    fn disable(&self);
}

type FaceAnnouncements = Vec<Option<Arc<dyn PrefixAnnouncementObj>>>;

/// Tracks which prefixes are announced by the forwarder's faces and informs
/// each destination when a prefix starts or stops being announced.
pub struct Readvertise {
    /// Announced name => announcing face => announcements by that face.
    /// Neither the inner map nor the list may be empty.
    by_name: HashMap<Name, HashMap<FaceId, FaceAnnouncements>>,
    /// Announcing face => names it announces.
    by_face: HashMap<FaceId, HashSet<Name>>,
    destinations: Vec<Arc<dyn Destination>>,
    events: EventDispatcher<ForwarderEvent>,
}

impl Readvertise {
    pub(crate) fn new(events: EventDispatcher<ForwarderEvent>) -> Self {
        Self {
            by_name: HashMap::new(),
            by_face: HashMap::new(),
            destinations: Vec::new(),
            events,
        }
    }

    pub fn add_announcement(&mut self, face: FaceId, ann: PrefixAnnouncement) {
        let name = ann.name().clone();
        let name_faces = self.by_name.entry(name.clone()).or_default();
        let is_new_name = name_faces.is_empty();
        let face_anns = name_faces.entry(face).or_default();
        if face_anns.is_empty() {
            self.by_face.entry(face).or_default().insert(name.clone());
        }
        face_anns.push(ann.object());

        if !is_new_name {
            return;
        }
        debug!("announce {}", name);
        self.events.emit(ForwarderEvent::AnnouncementAdded(name.clone()));
        for dest in &self.destinations {
            dest.advertise(&name);
        }
    }

    /// Remove one announcement of `face`. An object announcement removes the
    /// same object if present; otherwise an arbitrary announcement of the
    /// name is removed.
    pub fn remove_announcement(&mut self, face: FaceId, ann: &PrefixAnnouncement) {
        let target = ann.object();
        self.remove_impl(face, ann.name(), |face_anns| {
            let index = face_anns
                .iter()
                .position(|item| match (item, &target) {
                    (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                    (None, None) => true,
                    _ => false,
                })
                .unwrap_or(0);
            face_anns.remove(index);
        });
    }

    /// Remove all announcements made by `face`.
    pub fn clear_face(&mut self, face: FaceId) {
        let Some(names) = self.by_face.get(&face).cloned() else {
            return;
        };
        for name in names {
            self.remove_impl(face, &name, |face_anns| face_anns.clear());
        }
        assert!(
            !self.by_face.contains_key(&face),
            "readvertise still lists announcements of face {}",
            face
        );
    }

    fn remove_impl(
        &mut self,
        face: FaceId,
        name: &Name,
        remove: impl FnOnce(&mut FaceAnnouncements),
    ) {
        let Some(name_faces) = self.by_name.get_mut(name) else {
            return;
        };
        let Some(face_anns) = name_faces.get_mut(&face) else {
            return;
        };
        remove(face_anns);
        if !face_anns.is_empty() {
            return;
        }

        let face_names = self
            .by_face
            .get_mut(&face)
            .unwrap_or_else(|| panic!("readvertise has no index for face {}", face));
        face_names.remove(name);
        if face_names.is_empty() {
            self.by_face.remove(&face);
        }

        name_faces.remove(&face);
        if !name_faces.is_empty() {
            return;
        }
        self.by_name.remove(name);

        debug!("withdraw {}", name);
        self.events.emit(ForwarderEvent::AnnouncementRemoved(name.clone()));
        for dest in &self.destinations {
            dest.withdraw(name);
        }
    }

    pub fn is_announced(&self, name: &Name) -> bool {
        self.by_name.contains_key(name)
    }

    /// Currently announced names, sorted.
    pub fn announced_names(&self) -> Vec<Name> {
        let mut names: Vec<_> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Application-supplied announcement objects for `name`.
    pub fn list_announcement_objs(&self, name: &Name) -> Vec<Arc<dyn PrefixAnnouncementObj>> {
        self.by_name
            .get(name)
            .into_iter()
            .flat_map(|faces| faces.values())
            .flat_map(|anns| anns.iter().flatten().cloned())
            .collect()
    }

    pub(crate) fn add_destination(&mut self, dest: Arc<dyn Destination>) {
        self.destinations.push(dest);
    }

    pub(crate) fn remove_destination(&mut self, id: usize) {
        self.destinations.retain(|dest| dest.id() != id);
    }

    pub(crate) fn take_destinations(&mut self) -> Vec<Arc<dyn Destination>> {
        std::mem::take(&mut self.destinations)
    }

    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }
}

impl std::fmt::Debug for Readvertise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Readvertise")
            .field("names", &self.by_name.len())
            .field("faces", &self.by_face.len())
            .field("destinations", &self.destinations.len())
            .finish()
    }
}

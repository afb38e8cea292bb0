use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::{debug, info};
use tokio::sync::broadcast;

use ndnfw_core::{Interest, Name};

use crate::config::ForwarderOptions;
use crate::error::FaceError;
use crate::events::{EventDispatcher, ForwarderEvent};
use crate::face::{FaceAttributes, FaceId, FwFace, PrefixAnnouncementObj};
use crate::fib::Fib;
use crate::packet::FwPacket;
use crate::pit::{DownstreamInfo, ExpireHook, Pit, PitKey};
use crate::readvertise::Readvertise;
use crate::transport::FaceTransport;
use crate::util::lock;

/// Forwarding state, mutated only while the lock is held.
///
/// Lock order: this state, then a face's tables or queue, then a
/// destination's table.
pub(crate) struct ForwarderState {
    pub(crate) fib: Fib,
    pub(crate) pit: Pit,
    pub(crate) readvertise: Readvertise,
    pub(crate) faces: BTreeMap<FaceId, FwFace>,
}

pub(crate) struct ForwarderInner {
    options: ForwarderOptions,
    pub(crate) state: Mutex<ForwarderState>,
    pub(crate) events: EventDispatcher<ForwarderEvent>,
    next_face_id: AtomicU32,
    closed: AtomicBool,
}

impl ForwarderInner {
    /// Name used for the FIB lookup: the first forwarding hint delegation,
    /// unless it covers one of this node's names.
    fn fib_name<'a>(&self, interest: &'a Interest) -> &'a Name {
        match interest.fw_hint.first() {
            Some(delegation)
                if !self
                    .options
                    .node_names
                    .iter()
                    .any(|node| delegation.is_prefix_of(node)) =>
            {
                delegation
            }
            _ => &interest.name,
        }
    }

    pub(crate) fn process_interest(&self, face: &FwFace, pkt: &FwPacket) {
        let Some(interest) = pkt.interest() else {
            return;
        };
        let mut state = lock(&self.state);
        let Some(key) = state.pit.lookup(interest, true) else {
            return;
        };
        state.pit.receive_interest(&key, face, pkt);

        let nexthops = state.fib.lookup(self.fib_name(interest));
        for nexthop in nexthops.iter().filter(|nexthop| *nexthop != face) {
            state.pit.forward_interest(&key, nexthop);
        }
    }

    pub(crate) fn cancel_interest(&self, face: &FwFace, pkt: &FwPacket) {
        let Some(interest) = pkt.interest() else {
            return;
        };
        let mut state = lock(&self.state);
        if let Some(key) = state.pit.lookup(interest, false) {
            state.pit.cancel_interest(&key, face);
        }
    }

    pub(crate) fn process_data(&self, face: &FwFace, pkt: &FwPacket) -> bool {
        let satisfied = lock(&self.state).pit.satisfy(face, pkt);
        if !satisfied {
            debug!("unsolicited {} from {}", pkt, face);
        }
        satisfied
    }

    pub(crate) fn process_nack(&self, face: &FwFace, pkt: &FwPacket) {
        debug!("{} from {} dropped", pkt, face);
    }
}

/// The forwarding plane: a face set plus the FIB, PIT and readvertise hub
/// shared by those faces.
///
/// Cloning yields another handle to the same forwarder.
#[derive(Clone)]
pub struct Forwarder {
    pub(crate) inner: Arc<ForwarderInner>,
}

impl Forwarder {
    pub fn create(options: ForwarderOptions) -> Self {
        let events = EventDispatcher::new(options.event_capacity);
        let inner = Arc::new_cyclic(|weak: &Weak<ForwarderInner>| {
            let weak = weak.clone();
            let on_expire: ExpireHook = Arc::new(move |key: PitKey, seq: u64| {
                if let Some(fw) = weak.upgrade() {
                    lock(&fw.state).pit.expire(&key, seq);
                }
            });
            ForwarderInner {
                state: Mutex::new(ForwarderState {
                    fib: Fib::new(),
                    pit: Pit::new(options.data_no_token_match, on_expire),
                    readvertise: Readvertise::new(events.clone()),
                    faces: BTreeMap::new(),
                }),
                events,
                options,
                next_face_id: AtomicU32::new(1),
                closed: AtomicBool::new(false),
            }
        });
        Self { inner }
    }

    pub fn options(&self) -> &ForwarderOptions {
        &self.inner.options
    }

    /// Attach a face. Must be called inside a tokio runtime.
    pub fn add_face(
        &self,
        transport: FaceTransport,
        attributes: FaceAttributes,
    ) -> Result<FwFace, FaceError> {
        if self.is_closed() {
            return Err(FaceError::ForwarderClosed);
        }
        let id = FaceId(self.inner.next_face_id.fetch_add(1, Ordering::Relaxed));
        FwFace::attach(&self.inner, id, transport, attributes)
    }

    /// Observe forwarder events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<ForwarderEvent> {
        self.inner.events.subscribe()
    }

    pub fn process_interest(&self, face: &FwFace, pkt: &FwPacket) {
        self.inner.process_interest(face, pkt);
    }

    pub fn cancel_interest(&self, face: &FwFace, pkt: &FwPacket) {
        self.inner.cancel_interest(face, pkt);
    }

    /// Returns false if the Data satisfied nothing.
    pub fn process_data(&self, face: &FwFace, pkt: &FwPacket) -> bool {
        self.inner.process_data(face, pkt)
    }

    /// Nacks are not forwarded.
    pub fn process_nack(&self, face: &FwFace, pkt: &FwPacket) {
        self.inner.process_nack(face, pkt);
    }

    pub fn faces(&self) -> Vec<FwFace> {
        lock(&self.inner.state).faces.values().cloned().collect()
    }

    pub fn fib_lookup(&self, name: &Name) -> Vec<FwFace> {
        lock(&self.inner.state).fib.lookup(name)
    }

    pub fn fib_snapshot(&self) -> Vec<(Name, Vec<(FaceId, bool)>)> {
        lock(&self.inner.state).fib.snapshot()
    }

    pub fn pit_len(&self) -> usize {
        lock(&self.inner.state).pit.len()
    }

    /// Downstream records of the PIT entry `interest` would join.
    pub fn pit_downstreams(&self, interest: &Interest) -> Option<Vec<DownstreamInfo>> {
        lock(&self.inner.state)
            .pit
            .downstreams(&PitKey::of(interest))
    }

    pub fn pit_token(&self, interest: &Interest) -> Option<u32> {
        lock(&self.inner.state).pit.token_of(&PitKey::of(interest))
    }

    pub fn announced_names(&self) -> Vec<Name> {
        lock(&self.inner.state).readvertise.announced_names()
    }

    pub fn list_announcement_objs(&self, name: &Name) -> Vec<Arc<dyn PrefixAnnouncementObj>> {
        lock(&self.inner.state)
            .readvertise
            .list_announcement_objs(name)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close every face, cancel PIT timers and disable every readvertise
    /// destination.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for face in self.faces() {
            face.close();
        }
        let destinations = {
            let mut state = lock(&self.inner.state);
            state.pit.close();
            state.readvertise.take_destinations()
        };
        for dest in destinations {
            dest.disable();
        }
        info!("forwarder closed");
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("Forwarder")
            .field("faces", &state.faces.len())
            .field("fib", &state.fib.len())
            .field("pit", &state.pit)
            .field("readvertise", &state.readvertise)
            .field("closed", &self.is_closed())
            .finish()
    }
}

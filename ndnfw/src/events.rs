use tokio::sync::broadcast;

use ndnfw_core::Name;

use crate::face::FwFace;
use crate::packet::FwPacket;

/// Notifications published by a [`crate::Forwarder`].
///
/// These are informational. Nothing in the forwarding path waits on a
/// subscriber, and a lagging subscriber only loses events.
#[derive(Debug, Clone)]
pub enum ForwarderEvent {
    /// Emitted before the face joins the face set.
    FaceAdded(FwFace),
    /// Emitted after the face has been removed.
    FaceRemoved(FwFace),
    PrefixAdded { face: FwFace, prefix: Name },
    PrefixRemoved { face: FwFace, prefix: Name },
    AnnouncementAdded(Name),
    AnnouncementRemoved(Name),
    PacketReceived { face: FwFace, packet: FwPacket },
    PacketSent { face: FwFace, packet: FwPacket },
}

/// Face-level notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceEvent {
    /// Lower layer reports the link is usable.
    Up,
    /// Lower layer reports the link is down; the face stays open.
    Down,
    Closed,
}

/// Fan-out of events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventDispatcher<E: Clone> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventDispatcher<E> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Having no subscriber is not an error.
    pub fn emit(&self, event: E) {
        let _ = self.sender.send(event);
    }

    /// Start receiving events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

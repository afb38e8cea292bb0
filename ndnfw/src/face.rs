use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use ndnfw_core::{Name, NameMultiSet};

use crate::error::FaceError;
use crate::events::{EventDispatcher, FaceEvent, ForwarderEvent};
use crate::forwarder::ForwarderInner;
use crate::packet::{FwPacket, L3Packet};
use crate::transport::{FaceTransport, PacketStream, TransportEvent};
use crate::util::lock;

/// Numeric face identifier, unique within one forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId(pub(crate) u32);

impl FaceId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Face attributes. Unset fields fall back to the transport's value, then
/// to the documented default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceAttributes {
    /// Short label used in logs.
    pub describe: Option<String>,
    /// Whether the face leads to a local application. Default false.
    pub local: Option<bool>,
    /// Whether prefix announcements on this face are readvertised. Default true.
    pub advertise_from: Option<bool>,
    /// Whether routes on this face capture shorter prefixes. Default true.
    pub route_capture: Option<bool>,
    /// Attributes the forwarder does not interpret.
    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl FaceAttributes {
    pub fn with_describe(mut self, describe: impl Into<String>) -> Self {
        self.describe = Some(describe.into());
        self
    }

    pub fn with_local(mut self, local: bool) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_advertise_from(mut self, advertise_from: bool) -> Self {
        self.advertise_from = Some(advertise_from);
        self
    }

    pub fn with_route_capture(mut self, route_capture: bool) -> Self {
        self.route_capture = Some(route_capture);
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(mut self, other: FaceAttributes) -> Self {
        self.describe = other.describe.or(self.describe);
        self.local = other.local.or(self.local);
        self.advertise_from = other.advertise_from.or(self.advertise_from);
        self.route_capture = other.route_capture.or(self.route_capture);
        self.extensions.extend(other.extensions);
        self
    }

    pub fn is_local(&self) -> bool {
        self.local.unwrap_or(false)
    }

    pub fn advertises(&self) -> bool {
        self.advertise_from.unwrap_or(true)
    }

    pub fn captures(&self) -> bool {
        self.route_capture.unwrap_or(true)
    }
}

/// How `add_route` derives a prefix announcement from the route name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RouteAnnouncement {
    /// No announcement.
    Off,
    /// Announce the route name itself.
    #[default]
    Route,
    /// Announce a prefix of the route name; negative values drop components
    /// from the end.
    Prefix(isize),
    /// Announce this name.
    Name(Name),
}

impl RouteAnnouncement {
    pub fn resolve(&self, route: &Name) -> Option<Name> {
        match self {
            RouteAnnouncement::Off => None,
            RouteAnnouncement::Route => Some(route.clone()),
            RouteAnnouncement::Prefix(n) => Some(route.get_prefix(*n)),
            RouteAnnouncement::Name(name) => Some(name.clone()),
        }
    }
}

impl From<bool> for RouteAnnouncement {
    fn from(announce: bool) -> Self {
        if announce {
            RouteAnnouncement::Route
        } else {
            RouteAnnouncement::Off
        }
    }
}

impl From<isize> for RouteAnnouncement {
    fn from(n: isize) -> Self {
        RouteAnnouncement::Prefix(n)
    }
}

impl From<Name> for RouteAnnouncement {
    fn from(name: Name) -> Self {
        RouteAnnouncement::Name(name)
    }
}

/// Application-defined announcement object, e.g. a signed prefix announcement.
pub trait PrefixAnnouncementObj: fmt::Debug + Send + Sync {
    fn announced(&self) -> &Name;
}

#[derive(Debug, Clone)]
pub enum PrefixAnnouncement {
    Name(Name),
    Object(Arc<dyn PrefixAnnouncementObj>),
}

impl PrefixAnnouncement {
    pub fn name(&self) -> &Name {
        match self {
            PrefixAnnouncement::Name(name) => name,
            PrefixAnnouncement::Object(obj) => obj.announced(),
        }
    }

    pub(crate) fn object(&self) -> Option<Arc<dyn PrefixAnnouncementObj>> {
        match self {
            PrefixAnnouncement::Name(_) => None,
            PrefixAnnouncement::Object(obj) => Some(Arc::clone(obj)),
        }
    }
}

impl From<Name> for PrefixAnnouncement {
    fn from(name: Name) -> Self {
        PrefixAnnouncement::Name(name)
    }
}

impl From<Arc<dyn PrefixAnnouncementObj>> for PrefixAnnouncement {
    fn from(obj: Arc<dyn PrefixAnnouncementObj>) -> Self {
        PrefixAnnouncement::Object(obj)
    }
}

#[derive(Default)]
struct FaceTables {
    routes: NameMultiSet,
    announcements: NameMultiSet,
}

pub(crate) struct FaceInner {
    id: FaceId,
    attributes: FaceAttributes,
    fw: Weak<ForwarderInner>,
    running: AtomicBool,
    tables: Mutex<FaceTables>,
    tx: Mutex<Option<mpsc::UnboundedSender<FwPacket>>>,
    events: EventDispatcher<FaceEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// A logical face attached to a [`crate::Forwarder`].
///
/// Cloning yields another handle to the same face.
#[derive(Clone)]
pub struct FwFace {
    inner: Arc<FaceInner>,
}

impl FwFace {
    /// Construct the face, register it and start its packet pipeline.
    pub(crate) fn attach(
        fw: &Arc<ForwarderInner>,
        id: FaceId,
        transport: FaceTransport,
        attributes: FaceAttributes,
    ) -> Result<FwFace, FaceError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| FaceError::NoRuntime)?;
        let FaceTransport {
            rxtx,
            attributes: transport_attributes,
            events,
        } = transport;

        let (tx, rx) = mpsc::unbounded_channel();
        let face = FwFace {
            inner: Arc::new(FaceInner {
                id,
                attributes: transport_attributes.merge(attributes),
                fw: Arc::downgrade(fw),
                running: AtomicBool::new(true),
                tables: Mutex::new(FaceTables::default()),
                tx: Mutex::new(Some(tx)),
                events: EventDispatcher::new(16),
                tasks: Mutex::new(Vec::new()),
            }),
        };

        fw.events.emit(ForwarderEvent::FaceAdded(face.clone()));
        lock(&fw.state).faces.insert(id, face.clone());

        let weak_face = Arc::downgrade(&face.inner);
        let weak_fw = Arc::downgrade(fw);
        let outbound = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|pkt| (pkt, rx))
        })
        .inspect(move |pkt| {
            if let (Some(fw), Some(inner)) = (weak_fw.upgrade(), weak_face.upgrade()) {
                if fw.events.subscriber_count() > 0 {
                    fw.events.emit(ForwarderEvent::PacketSent {
                        face: FwFace { inner },
                        packet: pkt.clone(),
                    });
                }
            }
        })
        .boxed();

        let mut tasks = lock(&face.inner.tasks);
        let inbound = rxtx.into_duplex()(outbound);
        tasks.push(runtime.spawn(rx_loop(face.clone(), inbound)));
        if let Some(events) = events {
            tasks.push(runtime.spawn(lower_loop(Arc::downgrade(&face.inner), events)));
        }
        drop(tasks);

        debug!("face {} ({}) attached", id, face);
        Ok(face)
    }

    pub fn id(&self) -> FaceId {
        self.inner.id
    }

    pub fn attributes(&self) -> &FaceAttributes {
        &self.inner.attributes
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Face-level notifications: lower layer up/down and close.
    pub fn subscribe(&self) -> broadcast::Receiver<FaceEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn forwarder(&self) -> Option<Arc<ForwarderInner>> {
        self.inner.fw.upgrade()
    }

    pub fn has_route(&self, name: &Name) -> bool {
        lock(&self.inner.tables).routes.count(name) > 0
    }

    /// Register `name` for forwarding through this face, optionally announcing
    /// a prefix derived from it.
    pub fn add_route(&self, name: Name, announcement: impl Into<RouteAnnouncement>) {
        if !self.is_running() {
            return;
        }
        let Some(fw) = self.forwarder() else {
            return;
        };

        fw.events.emit(ForwarderEvent::PrefixAdded {
            face: self.clone(),
            prefix: name.clone(),
        });
        {
            let mut state = lock(&fw.state);
            let mut tables = lock(&self.inner.tables);
            if tables.routes.add(name.clone()) == 1 {
                state.fib.insert(self, name.clone(), self.inner.attributes.captures());
            }
        }

        if let Some(ann) = announcement.into().resolve(&name) {
            self.add_announcement(ann);
        }
    }

    pub fn remove_route(&self, name: &Name, announcement: impl Into<RouteAnnouncement>) {
        if !self.is_running() {
            return;
        }
        let Some(fw) = self.forwarder() else {
            return;
        };

        if let Some(ann) = announcement.into().resolve(name) {
            self.remove_announcement(ann);
        }

        {
            let mut state = lock(&fw.state);
            let mut tables = lock(&self.inner.tables);
            match tables.routes.remove(name) {
                Some(0) => state.fib.delete(self.id(), name),
                Some(_) => {}
                None => {
                    debug!("face {} has no route {}", self, name);
                    return;
                }
            }
        }
        fw.events.emit(ForwarderEvent::PrefixRemoved {
            face: self.clone(),
            prefix: name.clone(),
        });
    }

    /// Announce a prefix for readvertising. No effect unless the face
    /// advertises.
    pub fn add_announcement(&self, ann: impl Into<PrefixAnnouncement>) {
        if !self.inner.attributes.advertises() || !self.is_running() {
            return;
        }
        let Some(fw) = self.forwarder() else {
            return;
        };
        let ann = ann.into();

        let mut state = lock(&fw.state);
        let mut tables = lock(&self.inner.tables);
        if tables.announcements.add(ann.name().clone()) == 1 {
            state.readvertise.add_announcement(self.id(), ann);
        }
    }

    pub fn remove_announcement(&self, ann: impl Into<PrefixAnnouncement>) {
        if !self.inner.attributes.advertises() || !self.is_running() {
            return;
        }
        let Some(fw) = self.forwarder() else {
            return;
        };
        let ann = ann.into();

        let mut state = lock(&fw.state);
        let mut tables = lock(&self.inner.tables);
        if tables.announcements.remove(ann.name()) == Some(0) {
            state.readvertise.remove_announcement(self.id(), &ann);
        }
    }

    /// Queue a packet for transmission. Dropped once the face is closing.
    pub fn send(&self, pkt: FwPacket) {
        if !self.is_running() {
            return;
        }
        if let Some(tx) = lock(&self.inner.tx).as_ref() {
            let _ = tx.send(pkt);
        }
    }

    /// Close the face. Calling this more than once has no further effect.
    pub fn close(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let tasks: Vec<_> = lock(&self.inner.tasks).drain(..).collect();
        let fw = self.forwarder();

        if let Some(fw) = &fw {
            let mut state = lock(&fw.state);
            state.faces.remove(&self.id());
            let mut tables = lock(&self.inner.tables);
            for name in tables.routes.drain_names() {
                state.fib.delete(self.id(), &name);
            }
            tables.announcements.drain_names();
            state.readvertise.clear_face(self.id());
            state.pit.remove_face(self.id());
        }

        // Ends the outbound stream, which transports read as the face closing.
        lock(&self.inner.tx).take();
        self.inner.events.emit(FaceEvent::Closed);
        if let Some(fw) = &fw {
            fw.events.emit(ForwarderEvent::FaceRemoved(self.clone()));
        }
        for task in tasks {
            task.abort();
        }
        debug!("face {} ({}) closed", self.id(), self);
    }

    /// Hand an inbound packet to the forwarder.
    fn dispatch(&self, pkt: FwPacket) {
        let Some(fw) = self.forwarder() else {
            return;
        };
        if fw.events.subscriber_count() > 0 {
            fw.events.emit(ForwarderEvent::PacketReceived {
                face: self.clone(),
                packet: pkt.clone(),
            });
        }

        match &pkt.l3 {
            L3Packet::Interest(_) if pkt.cancel => fw.cancel_interest(self, &pkt),
            L3Packet::Interest(_) => fw.process_interest(self, &pkt),
            L3Packet::Data(_) => {
                fw.process_data(self, &pkt);
            }
            L3Packet::Nack(_) => fw.process_nack(self, &pkt),
        }
    }
}

async fn rx_loop(face: FwFace, mut inbound: PacketStream) {
    while let Some(pkt) = inbound.next().await {
        if !face.is_running() {
            break;
        }
        face.dispatch(pkt);
    }
    trace!("face {} inbound stream ended", face.id());
    face.close();
}

async fn lower_loop(face: Weak<FaceInner>, mut events: BoxStream<'static, TransportEvent>) {
    while let Some(event) = events.next().await {
        let Some(inner) = face.upgrade() else {
            break;
        };
        inner.events.emit(match event {
            TransportEvent::Up => FaceEvent::Up,
            TransportEvent::Down => FaceEvent::Down,
        });
    }
}

impl PartialEq for FwFace {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for FwFace {}

impl Hash for FwFace {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Display for FwFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.inner.attributes.describe.as_deref().unwrap_or("FwFace"))
    }
}

impl fmt::Debug for FwFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FwFace")
            .field("id", &self.inner.id)
            .field("describe", &self.inner.attributes.describe)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder::Forwarder;
    use futures::stream::BoxStream;
    use ndnfw_core::Interest;
    use tokio::sync::mpsc;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[test]
    fn test_attribute_merge() {
        let transport = FaceAttributes::default()
            .with_describe("udp")
            .with_local(true)
            .with_extension("mtu", serde_json::json!(1500));
        let caller = FaceAttributes::default()
            .with_describe("app")
            .with_route_capture(false);
        let merged = transport.merge(caller);

        assert_eq!(merged.describe.as_deref(), Some("app"));
        assert!(merged.is_local());
        assert!(merged.advertises());
        assert!(!merged.captures());
        assert_eq!(merged.extensions["mtu"], serde_json::json!(1500));

        let defaults = FaceAttributes::default();
        assert!(!defaults.is_local());
        assert!(defaults.advertises());
        assert!(defaults.captures());
    }

    #[test]
    fn test_route_announcement_resolve() {
        let route = name("/N/A/1");
        assert_eq!(RouteAnnouncement::from(false).resolve(&route), None);
        assert_eq!(RouteAnnouncement::from(true).resolve(&route), Some(route.clone()));
        assert_eq!(RouteAnnouncement::from(2isize).resolve(&route), Some(name("/N/A")));
        assert_eq!(RouteAnnouncement::from(-1isize).resolve(&route), Some(name("/N/A")));
        assert_eq!(
            RouteAnnouncement::from(name("/M")).resolve(&route),
            Some(name("/M"))
        );
    }

    #[tokio::test]
    async fn test_route_refcount() {
        let fw = Forwarder::create(Default::default());
        let face = fw
            .add_face(FaceTransport::idle(), FaceAttributes::default())
            .unwrap();

        face.add_route(name("/a"), false);
        face.add_route(name("/a"), false);
        assert!(face.has_route(&name("/a")));
        assert_eq!(fw.fib_lookup(&name("/a/b")), vec![face.clone()]);

        face.remove_route(&name("/a"), false);
        assert!(face.has_route(&name("/a")));
        assert_eq!(fw.fib_lookup(&name("/a/b")).len(), 1);

        face.remove_route(&name("/a"), false);
        assert!(!face.has_route(&name("/a")));
        assert!(fw.fib_lookup(&name("/a/b")).is_empty());

        face.remove_route(&name("/a"), false);
        assert!(fw.fib_lookup(&name("/a/b")).is_empty());
    }

    #[tokio::test]
    async fn test_advertise_from_false() {
        let fw = Forwarder::create(Default::default());
        let face = fw
            .add_face(
                FaceTransport::idle(),
                FaceAttributes::default().with_advertise_from(false),
            )
            .unwrap();
        face.add_route(name("/a"), true);
        assert!(face.has_route(&name("/a")));
        assert!(fw.announced_names().is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_retracts() {
        let fw = Forwarder::create(Default::default());
        let face = fw
            .add_face(FaceTransport::idle(), FaceAttributes::default().with_describe("f"))
            .unwrap();
        let mut events = face.subscribe();
        face.add_route(name("/a"), true);
        assert_eq!(fw.faces().len(), 1);
        assert_eq!(fw.announced_names(), vec![name("/a")]);

        face.close();
        face.close();
        assert!(!face.is_running());
        assert!(fw.faces().is_empty());
        assert!(fw.fib_lookup(&name("/a")).is_empty());
        assert!(fw.announced_names().is_empty());
        assert_eq!(events.recv().await.unwrap(), FaceEvent::Closed);
        assert!(events.try_recv().is_err());

        face.add_route(name("/b"), false);
        assert!(fw.fib_lookup(&name("/b")).is_empty());
    }

    #[tokio::test]
    async fn test_lower_events_reemitted() {
        let fw = Forwarder::create(Default::default());
        let (lower_tx, mut lower_rx) = mpsc::unbounded_channel();
        let lower: BoxStream<'static, TransportEvent> =
            stream::poll_fn(move |cx| lower_rx.poll_recv(cx)).boxed();
        let face = fw
            .add_face(FaceTransport::idle().with_events(lower), FaceAttributes::default())
            .unwrap();
        let mut events = face.subscribe();

        lower_tx.send(TransportEvent::Down).unwrap();
        lower_tx.send(TransportEvent::Up).unwrap();
        assert_eq!(events.recv().await.unwrap(), FaceEvent::Down);
        assert_eq!(events.recv().await.unwrap(), FaceEvent::Up);
        assert!(face.is_running());
    }

    #[tokio::test]
    async fn test_inbound_end_closes_face() {
        let fw = Forwarder::create(Default::default());
        let (transport, peer) = FaceTransport::channel();
        let face = fw.add_face(transport, FaceAttributes::default()).unwrap();
        let mut events = face.subscribe();

        drop(peer);
        assert_eq!(events.recv().await.unwrap(), FaceEvent::Closed);
        assert!(!face.is_running());
        assert!(fw.faces().is_empty());
    }

    #[tokio::test]
    async fn test_send_after_close_is_dropped() {
        let fw = Forwarder::create(Default::default());
        let (transport, mut peer) = FaceTransport::channel();
        let face = fw.add_face(transport, FaceAttributes::default()).unwrap();

        face.send(FwPacket::new(Interest::new(name("/x")), None));
        assert_eq!(peer.recv().await.unwrap().l3.name(), &name("/x"));

        face.close();
        face.send(FwPacket::new(Interest::new(name("/y")), None));
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_ends_outbound_stream() {
        let fw = Forwarder::create(Default::default());
        let (ended_tx, ended_rx) = tokio::sync::oneshot::channel();
        let transport = FaceTransport::duplex(move |outbound| {
            tokio::spawn(async move {
                let sent = outbound.count().await;
                let _ = ended_tx.send(sent);
            });
            stream::pending().boxed()
        });
        let face = fw.add_face(transport, FaceAttributes::default()).unwrap();
        face.send(FwPacket::new(Interest::new(name("/x")), None));

        face.close();
        assert_eq!(ended_rx.await.unwrap(), 1);
    }
}

//! In-process NDN forwarding plane.
//!
//! A [`Forwarder`] switches Interest, Data and Nack envelopes among attached
//! faces using a FIB and a PIT, and mirrors the prefixes announced by its
//! faces into any number of [`ReadvertiseDestination`]s.

pub mod config;
pub mod destination;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod face;
pub mod fib;
pub mod forwarder;
pub mod packet;
pub mod pit;
pub mod readvertise;
mod retry;
pub mod tap_face;
pub mod tracer;
pub mod transport;
mod util;

pub use config::{ForwarderOptions, RetryOptions};
pub use destination::{AdvertiseBackend, AnnouncementSource, DestinationStatus, ReadvertiseDestination};
pub use endpoint::{Canceller, Consumer, Endpoint, Producer, ProducerOptions};
pub use error::{ConfigError, EndpointError, FaceError};
pub use events::{EventDispatcher, FaceEvent, ForwarderEvent};
pub use face::{FaceAttributes, FaceId, FwFace, PrefixAnnouncement, PrefixAnnouncementObj, RouteAnnouncement};
pub use forwarder::Forwarder;
pub use packet::{FwPacket, L3Packet, PitToken, RejectReason};
pub use pit::{DownstreamInfo, PitKey};
pub use tap_face::TapFace;
pub use tracer::{FwTracer, TracerOptions};
pub use transport::{ChannelPeer, FaceTransport, PacketStream, RxTx, TransportEvent};

pub use ndnfw_core::{Data, Interest, Nack, NackReason, Name, NameComponent};

//! Contract between a face and whatever moves its packets.
//!
//! A transport is given the face's outbound packet stream and hands back its
//! inbound packet stream. Transports that put packets on a wire must skip
//! envelopes whose [`FwPacket::is_encodable`] is false.
//!
//! The outbound stream ends only when the face closes. A transport seeing it
//! end must treat the face as gone and release the underlying link; nothing
//! further will be sent. Ending the inbound stream closes the face.

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

use crate::face::FaceAttributes;
use crate::packet::FwPacket;

pub type PacketStream = BoxStream<'static, FwPacket>;

/// Signal from the layer below a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Up,
    Down,
}

type TxFn = Box<dyn FnOnce(PacketStream) + Send>;
type DuplexFn = Box<dyn FnOnce(PacketStream) -> PacketStream + Send>;

/// The two shapes a transport may take.
pub enum RxTx {
    /// An inbound stream plus a sink that consumes the outbound stream.
    Split { rx: PacketStream, tx: TxFn },
    /// A function turning the outbound stream into the inbound stream.
    Duplex(DuplexFn),
}

impl RxTx {
    /// Normalize to duplex form.
    pub(crate) fn into_duplex(self) -> DuplexFn {
        match self {
            RxTx::Duplex(f) => f,
            RxTx::Split { rx, tx } => Box::new(move |outbound| {
                tx(outbound);
                rx
            }),
        }
    }
}

impl std::fmt::Debug for RxTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RxTx::Split { .. } => f.write_str("RxTx::Split"),
            RxTx::Duplex(_) => f.write_str("RxTx::Duplex"),
        }
    }
}

/// A transport ready to be attached with [`crate::Forwarder::add_face`].
pub struct FaceTransport {
    pub(crate) rxtx: RxTx,
    pub(crate) attributes: FaceAttributes,
    pub(crate) events: Option<BoxStream<'static, TransportEvent>>,
}

impl std::fmt::Debug for FaceTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceTransport")
            .field("rxtx", &self.rxtx)
            .field("attributes", &self.attributes)
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl FaceTransport {
    pub fn split<F>(rx: PacketStream, tx: F) -> Self
    where
        F: FnOnce(PacketStream) + Send + 'static,
    {
        Self::new(RxTx::Split {
            rx,
            tx: Box::new(tx),
        })
    }

    pub fn duplex<F>(f: F) -> Self
    where
        F: FnOnce(PacketStream) -> PacketStream + Send + 'static,
    {
        Self::new(RxTx::Duplex(Box::new(f)))
    }

    pub fn new(rxtx: RxTx) -> Self {
        Self {
            rxtx,
            attributes: FaceAttributes::default(),
            events: None,
        }
    }

    /// Transport that never receives and discards everything sent to it.
    pub fn idle() -> Self {
        Self::duplex(|outbound| {
            tokio::spawn(outbound.for_each(|_| async {}));
            stream::pending().boxed()
        })
    }

    /// In-memory transport whose other end is returned as a [`ChannelPeer`].
    ///
    /// The face closes once every clone of the peer's inbound sender is dropped.
    pub fn channel() -> (Self, ChannelPeer) {
        let (in_tx, mut in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let rx = stream::poll_fn(move |cx| in_rx.poll_recv(cx)).boxed();
        let transport = Self::split(rx, move |mut outbound| {
            tokio::spawn(async move {
                while let Some(pkt) = outbound.next().await {
                    if out_tx.send(pkt).is_err() {
                        break;
                    }
                }
            });
        });
        let peer = ChannelPeer {
            inbound: in_tx,
            outbound: out_rx,
        };
        (transport, peer)
    }

    /// Attributes suggested by the transport. Caller attributes take precedence.
    pub fn with_attributes(mut self, attributes: FaceAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Lower layer signals, re-emitted as face events.
    pub fn with_events(mut self, events: BoxStream<'static, TransportEvent>) -> Self {
        self.events = Some(events);
        self
    }
}

/// Far end of a [`FaceTransport::channel`].
#[derive(Debug)]
pub struct ChannelPeer {
    /// Packets pushed here are received by the face.
    pub inbound: mpsc::UnboundedSender<FwPacket>,
    /// Packets the face sends.
    pub outbound: mpsc::UnboundedReceiver<FwPacket>,
}

impl ChannelPeer {
    /// Deliver a packet to the face. Returns false if the face is gone.
    pub fn push(&self, pkt: FwPacket) -> bool {
        self.inbound.send(pkt).is_ok()
    }

    pub async fn recv(&mut self) -> Option<FwPacket> {
        self.outbound.recv().await
    }

    /// Packets already sent by the face, without waiting.
    pub fn drain(&mut self) -> Vec<FwPacket> {
        let mut pkts = Vec::new();
        while let Ok(pkt) = self.outbound.try_recv() {
            pkts.push(pkt);
        }
        pkts
    }
}

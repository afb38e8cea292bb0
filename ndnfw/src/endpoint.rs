//! Minimal consumer and producer built directly on forwarder faces.

use std::future::Future;

use futures::stream::StreamExt;
use log::debug;
use tokio::sync::mpsc;

use ndnfw_core::{Data, Interest, Name};

use crate::error::{ConfigError, EndpointError};
use crate::face::{FaceAttributes, FwFace, RouteAnnouncement};
use crate::forwarder::Forwarder;
use crate::packet::{FwPacket, L3Packet};
use crate::transport::{ChannelPeer, FaceTransport};

#[derive(Debug, Clone)]
pub struct Endpoint {
    fw: Forwarder,
}

impl Endpoint {
    pub fn new(fw: &Forwarder) -> Self {
        Self { fw: fw.clone() }
    }

    /// Express `interest` through a dedicated face.
    pub fn consume(&self, interest: Interest) -> Result<Consumer, EndpointError> {
        let (transport, peer) = FaceTransport::channel();
        let attributes = FaceAttributes::default()
            .with_describe(format!("consume({})", interest.name))
            .with_local(true);
        let face = self.fw.add_face(transport, attributes)?;
        peer.push(FwPacket::new(interest.clone(), None));
        Ok(Consumer {
            interest,
            peer,
            face,
        })
    }

    /// Serve Interests under `prefix` with `handler`. Handlers returning
    /// `None` send no reply.
    pub fn produce<H, Fut>(
        &self,
        prefix: Name,
        handler: H,
        options: ProducerOptions,
    ) -> Result<Producer, EndpointError>
    where
        H: Fn(Interest) -> Fut + Send + 'static,
        Fut: Future<Output = Option<Data>> + Send + 'static,
    {
        if options.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency.into());
        }
        let concurrency = options.concurrency;
        let transport = FaceTransport::duplex(move |outbound| {
            outbound
                .filter_map(|pkt| async move {
                    if !pkt.is_encodable() {
                        return None;
                    }
                    match pkt.l3 {
                        L3Packet::Interest(interest) => Some((interest, pkt.token)),
                        _ => None,
                    }
                })
                .map(move |(interest, token)| {
                    let reply = handler(interest);
                    async move { reply.await.map(|data| FwPacket::new(data, token)) }
                })
                .buffer_unordered(concurrency)
                .filter_map(|reply| async move { reply })
                .boxed()
        });

        let mut attributes = FaceAttributes::default()
            .with_describe(
                options
                    .describe
                    .unwrap_or_else(|| format!("produce({})", prefix)),
            )
            .with_local(true);
        attributes.route_capture = options.route_capture;
        let face = self.fw.add_face(transport, attributes)?;
        face.add_route(prefix.clone(), options.announcement);
        debug!("producer {} serving {}", face.id(), prefix);
        Ok(Producer { face, prefix })
    }
}

/// A pending Interest.
#[derive(Debug)]
pub struct Consumer {
    interest: Interest,
    peer: ChannelPeer,
    face: FwFace,
}

impl Consumer {
    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    /// Withdraw the Interest. The response then resolves to a cancel rejection
    /// unless Data arrived first.
    pub fn cancel(&self) {
        self.canceller().cancel();
    }

    /// Handle that cancels while [`Consumer::response`] is awaited.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            interest: self.interest.clone(),
            inbound: self.peer.inbound.clone(),
        }
    }

    /// Wait for Data or a rejection, then detach the face.
    pub async fn response(mut self) -> Result<Data, EndpointError> {
        let result = loop {
            let Some(pkt) = self.peer.recv().await else {
                break Err(EndpointError::FaceClosed);
            };
            if let Some(reason) = pkt.reject {
                break Err(EndpointError::Rejected(reason));
            }
            if let L3Packet::Data(data) = pkt.l3 {
                break Ok(data);
            }
        };
        self.face.close();
        result
    }
}

#[derive(Debug, Clone)]
pub struct Canceller {
    interest: Interest,
    inbound: mpsc::UnboundedSender<FwPacket>,
}

impl Canceller {
    pub fn cancel(&self) {
        let _ = self
            .inbound
            .send(FwPacket::cancel_interest(self.interest.clone(), None));
    }
}

#[derive(Debug, Clone)]
pub struct ProducerOptions {
    /// Maximum number of handler invocations in flight.
    pub concurrency: usize,
    pub announcement: RouteAnnouncement,
    /// Overrides the default route capture attribute.
    pub route_capture: Option<bool>,
    pub describe: Option<String>,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            announcement: RouteAnnouncement::Route,
            route_capture: None,
            describe: None,
        }
    }
}

#[derive(Debug)]
pub struct Producer {
    face: FwFace,
    prefix: Name,
}

impl Producer {
    pub fn face(&self) -> &FwFace {
        &self.face
    }

    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    /// Detach the producer face, retracting its route.
    pub fn close(&self) {
        self.face.close();
    }
}

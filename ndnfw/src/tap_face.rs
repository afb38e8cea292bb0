//! Secondary faces sharing the transport of an existing face.
//!
//! A tap lives on its own [`Forwarder`] with independent FIB and PIT. It sees
//! every packet the primary face receives, and sends through the primary
//! face. The primary forwarder keeps seeing the received packets but not the
//! tap's transmissions. Useful for talking to one specific neighbor, e.g.
//! management commands, without touching the primary forwarding state.

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use tokio::sync::broadcast::error::RecvError;

use crate::config::ForwarderOptions;
use crate::error::FaceError;
use crate::events::ForwarderEvent;
use crate::face::FwFace;
use crate::forwarder::Forwarder;
use crate::transport::FaceTransport;

/// A face on a private forwarder, tapped into a primary face.
#[derive(Debug)]
pub struct TapFace {
    fw: Forwarder,
    face: FwFace,
}

impl TapFace {
    /// Create a new forwarder and attach a tap of `primary` to it.
    ///
    /// The tap closes when `primary` is removed from its forwarder.
    pub fn create(primary: &FwFace) -> Result<TapFace, FaceError> {
        Self::create_with(primary, ForwarderOptions::default())
    }

    pub fn create_with(primary: &FwFace, options: ForwarderOptions) -> Result<TapFace, FaceError> {
        let primary_fw = primary.forwarder().ok_or(FaceError::ForwarderClosed)?;
        let events = primary_fw.events.subscribe();
        if !primary.is_running() {
            return Err(FaceError::Closed);
        }

        let rx = stream::unfold((events, primary.clone()), |(mut events, primary)| async move {
            loop {
                match events.recv().await {
                    Ok(ForwarderEvent::PacketReceived { face, packet }) if face == primary => {
                        return Some((packet, (events, primary)));
                    }
                    Ok(ForwarderEvent::FaceRemoved(face)) if face == primary => return None,
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        warn!("tap({}) missed {} events", primary, n);
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed();

        let sender = primary.clone();
        let transport = FaceTransport::split(rx, move |outbound| {
            tokio::spawn(
                outbound
                    .filter(|pkt| std::future::ready(pkt.is_encodable()))
                    .for_each(move |pkt| {
                        sender.send(pkt);
                        std::future::ready(())
                    }),
            );
        });

        let fw = Forwarder::create(options);
        let mut attributes = primary.attributes().clone();
        attributes.describe = Some(format!("tap({})", primary));
        let face = fw.add_face(transport, attributes)?;
        debug!("{} attached", face);
        Ok(TapFace { fw, face })
    }

    pub fn face(&self) -> &FwFace {
        &self.face
    }

    /// The private forwarder holding the tap.
    pub fn forwarder(&self) -> &Forwarder {
        &self.fw
    }

    /// Detach the tap and close its forwarder. The primary face is unaffected.
    pub fn close(&self) {
        self.fw.close();
    }
}

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::events::ForwarderEvent;
use crate::forwarder::Forwarder;

/// Which event groups the tracer logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerOptions {
    pub face: bool,
    pub prefix: bool,
    pub ann: bool,
    pub pkt: bool,
}

impl Default for TracerOptions {
    fn default() -> Self {
        Self {
            face: true,
            prefix: true,
            ann: true,
            pkt: true,
        }
    }
}

/// Logs forwarder events at debug level.
#[derive(Debug)]
pub struct FwTracer {
    task: JoinHandle<()>,
}

impl FwTracer {
    /// Start tracing `fw`. Must be called inside a tokio runtime.
    pub fn enable(fw: &Forwarder, options: TracerOptions) -> Self {
        let mut events = fw.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(line) = format_event(&options, &event) {
                            debug!(target: "ndnfw::tracer", "{}", line);
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(target: "ndnfw::tracer", "tracer missed {} events", n);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { task }
    }

    pub fn disable(self) {
        self.task.abort();
    }
}

/// Render one event, or `None` if its group is disabled.
pub fn format_event(options: &TracerOptions, event: &ForwarderEvent) -> Option<String> {
    let line = match event {
        ForwarderEvent::FaceAdded(face) if options.face => format!("+Face {}", face),
        ForwarderEvent::FaceRemoved(face) if options.face => format!("-Face {}", face),
        ForwarderEvent::PrefixAdded { face, prefix } if options.prefix => {
            format!("{} +Prefix {}", face, prefix)
        }
        ForwarderEvent::PrefixRemoved { face, prefix } if options.prefix => {
            format!("{} -Prefix {}", face, prefix)
        }
        ForwarderEvent::AnnouncementAdded(name) if options.ann => format!("+Announcement {}", name),
        ForwarderEvent::AnnouncementRemoved(name) if options.ann => {
            format!("-Announcement {}", name)
        }
        ForwarderEvent::PacketReceived { face, packet } if options.pkt => {
            format!("{} >{}", face, packet)
        }
        ForwarderEvent::PacketSent { face, packet } if options.pkt => format!("{} <{}", face, packet),
        _ => return None,
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::FaceAttributes;
    use crate::packet::{FwPacket, RejectReason};
    use crate::transport::FaceTransport;
    use ndnfw_core::{Data, Interest, Name};

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[tokio::test]
    async fn test_format_events() {
        let fw = Forwarder::create(Default::default());
        let face = fw
            .add_face(FaceTransport::idle(), FaceAttributes::default().with_describe("f"))
            .unwrap();
        let all = TracerOptions::default();

        let event = ForwarderEvent::FaceAdded(face.clone());
        assert_eq!(format_event(&all, &event).as_deref(), Some("+Face f"));

        let event = ForwarderEvent::PrefixAdded {
            face: face.clone(),
            prefix: name("/a"),
        };
        assert_eq!(format_event(&all, &event).as_deref(), Some("f +Prefix /a"));

        let event = ForwarderEvent::AnnouncementRemoved(name("/a"));
        assert_eq!(format_event(&all, &event).as_deref(), Some("-Announcement /a"));

        let interest = Interest::new(name("/a"))
            .with_can_be_prefix(true)
            .with_must_be_fresh(true);
        let event = ForwarderEvent::PacketReceived {
            face: face.clone(),
            packet: FwPacket::new(interest.clone(), None),
        };
        assert_eq!(format_event(&all, &event).as_deref(), Some("f >I /a[P][F]"));

        let event = ForwarderEvent::PacketSent {
            face: face.clone(),
            packet: FwPacket::reject_interest(RejectReason::Expire, interest, None),
        };
        assert_eq!(format_event(&all, &event).as_deref(), Some("f <Reject(expire) /a[P][F]"));

        let event = ForwarderEvent::PacketSent {
            face: face.clone(),
            packet: FwPacket::new(Data::new(name("/a/1"), Vec::new()), None),
        };
        assert_eq!(format_event(&all, &event).as_deref(), Some("f <D /a/1"));

        let quiet = TracerOptions {
            pkt: false,
            ..TracerOptions::default()
        };
        assert_eq!(format_event(&quiet, &event), None);
    }

    #[tokio::test]
    async fn test_enable_disable() {
        let fw = Forwarder::create(Default::default());
        let tracer = FwTracer::enable(&fw, TracerOptions::default());
        let face = fw.add_face(FaceTransport::idle(), FaceAttributes::default()).unwrap();
        face.add_route(name("/t"), true);
        tokio::task::yield_now().await;
        tracer.disable();
        face.close();
        assert!(fw.faces().is_empty());
    }
}

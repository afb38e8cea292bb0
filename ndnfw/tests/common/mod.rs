#![allow(dead_code)]

use std::time::Duration;

use ndnfw::{ChannelPeer, FaceAttributes, FaceTransport, Forwarder, FwFace, FwPacket, Name};

pub fn name(uri: &str) -> Name {
    uri.parse().unwrap()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Face backed by an in-memory channel.
pub fn channel_face(fw: &Forwarder, describe: &str) -> (FwFace, ChannelPeer) {
    init_logging();
    let (transport, peer) = FaceTransport::channel();
    let face = fw
        .add_face(transport, FaceAttributes::default().with_describe(describe))
        .unwrap();
    (face, peer)
}

/// Next packet sent by the face, or `None` if nothing arrives within `wait`.
pub async fn recv_within(peer: &mut ChannelPeer, wait: Duration) -> Option<FwPacket> {
    tokio::time::timeout(wait, peer.recv()).await.ok().flatten()
}

/// Let spawned tasks run. Under a paused clock this also advances time by 1ms.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

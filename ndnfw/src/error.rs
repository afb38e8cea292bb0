//! Error types for the forwarding plane.
//!
//! Forwarding outcomes such as unsolicited Data, expired or cancelled
//! Interests are not errors and never appear here.

use crate::packet::RejectReason;

#[derive(Debug, thiserror::Error)]
pub enum FaceError {
    #[error("forwarder is closed")]
    ForwarderClosed,

    #[error("face is closed")]
    Closed,

    #[error("face pipeline requires a tokio runtime")]
    NoRuntime,
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Interest rejected: {0}")]
    Rejected(RejectReason),

    #[error("face closed before a response arrived")]
    FaceClosed,

    #[error("face error: {0}")]
    Face(#[from] FaceError),

    #[error("invalid endpoint options: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid retry options: {0}")]
    InvalidRetry(&'static str),

    #[error("event capacity must be positive")]
    ZeroEventCapacity,

    #[error("producer concurrency must be positive")]
    ZeroConcurrency,
}

use std::fmt;

use ndnfw_core::{Data, Interest, Nack, Name};

/// Network layer packet carried by a [`FwPacket`].
#[derive(Debug, Clone, PartialEq)]
pub enum L3Packet {
    Interest(Interest),
    Data(Data),
    Nack(Nack),
}

impl L3Packet {
    pub fn name(&self) -> &Name {
        match self {
            L3Packet::Interest(interest) => &interest.name,
            L3Packet::Data(data) => &data.name,
            L3Packet::Nack(nack) => &nack.interest.name,
        }
    }
}

impl From<Interest> for L3Packet {
    fn from(interest: Interest) -> Self {
        L3Packet::Interest(interest)
    }
}

impl From<Data> for L3Packet {
    fn from(data: Data) -> Self {
        L3Packet::Data(data)
    }
}

impl From<Nack> for L3Packet {
    fn from(nack: Nack) -> Self {
        L3Packet::Nack(nack)
    }
}

/// Hop-by-hop correlation token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PitToken {
    /// Token assigned by this forwarder's PIT.
    Numeric(u32),
    /// Token chosen by a downstream, returned verbatim.
    Opaque(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Cancel,
    Expire,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Cancel => write!(f, "cancel"),
            RejectReason::Expire => write!(f, "expire"),
        }
    }
}

/// Packet envelope exchanged between faces and the forwarder.
#[derive(Debug, Clone, PartialEq)]
pub struct FwPacket {
    pub l3: L3Packet,
    pub token: Option<PitToken>,
    pub congestion_mark: Option<u8>,
    /// Set on Interests the forwarder gives up on.
    pub reject: Option<RejectReason>,
    /// Set on Interests a downstream withdraws.
    pub cancel: bool,
}

impl FwPacket {
    pub fn new(l3: impl Into<L3Packet>, token: Option<PitToken>) -> Self {
        Self {
            l3: l3.into(),
            token,
            congestion_mark: None,
            reject: None,
            cancel: false,
        }
    }

    /// Request from a downstream to withdraw a pending Interest.
    pub fn cancel_interest(interest: Interest, token: Option<PitToken>) -> Self {
        Self {
            cancel: true,
            ..Self::new(interest, token)
        }
    }

    /// Notification to a downstream that its pending Interest was dropped.
    pub fn reject_interest(
        reason: RejectReason,
        interest: Interest,
        token: Option<PitToken>,
    ) -> Self {
        Self {
            reject: Some(reason),
            ..Self::new(interest, token)
        }
    }

    pub fn with_congestion_mark(mut self, mark: u8) -> Self {
        self.congestion_mark = Some(mark);
        self
    }

    /// Whether this envelope may be handed to a wire codec.
    pub fn is_encodable(&self) -> bool {
        self.reject.is_none() && !self.cancel
    }

    pub fn interest(&self) -> Option<&Interest> {
        match &self.l3 {
            L3Packet::Interest(interest) => Some(interest),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&Data> {
        match &self.l3 {
            L3Packet::Data(data) => Some(data),
            _ => None,
        }
    }
}

impl fmt::Display for FwPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.l3 {
            L3Packet::Interest(interest) => {
                if let Some(reason) = self.reject {
                    write!(f, "Reject({}) {}", reason, interest)
                } else if self.cancel {
                    write!(f, "Cancel {}", interest)
                } else {
                    write!(f, "I {}", interest)
                }
            }
            L3Packet::Data(data) => write!(f, "D {}", data.name),
            L3Packet::Nack(nack) => write!(f, "N {}~{}", nack.interest, nack.reason),
        }
    }
}

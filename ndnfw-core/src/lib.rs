//! Packet model shared by the forwarding plane: names, Interest, Data and Nack.

pub mod multiset;
pub mod name;
pub mod packets;

pub use multiset::NameMultiSet;
pub use name::{ComponentType, Name, NameComponent, NameParseError};
pub use packets::{
    generate_nonce, ContentType, Data, Interest, Nack, NackReason, DEFAULT_INTEREST_LIFETIME,
};

use crate::name::{ComponentType, Name, NameComponent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default InterestLifetime when the field is omitted.
pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_millis(4000);

/// Generate a random 32-bit Interest nonce.
pub fn generate_nonce() -> u32 {
    rand::random()
}

/// Interest packet structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
    /// Forwarding hint delegations, in preference order.
    pub fw_hint: Vec<Name>,
    pub nonce: Option<u32>,
    pub lifetime: Duration,
    pub hop_limit: Option<u8>,
    pub application_parameters: Option<Vec<u8>>,
}

impl Interest {
    /// Create a new Interest with the given name
    pub fn new(name: Name) -> Self {
        Self {
            name,
            can_be_prefix: false,
            must_be_fresh: false,
            fw_hint: Vec::new(),
            nonce: None,
            lifetime: DEFAULT_INTEREST_LIFETIME,
            hop_limit: None,
            application_parameters: None,
        }
    }

    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }

    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    pub fn with_fw_hint(mut self, delegations: Vec<Name>) -> Self {
        self.fw_hint = delegations;
        self
    }

    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = Some(hop_limit);
        self
    }

    pub fn with_application_parameters(mut self, params: Vec<u8>) -> Self {
        self.application_parameters = Some(params);
        self
    }

    /// Generate a random nonce if none is set
    pub fn ensure_nonce(&mut self) {
        if self.nonce.is_none() {
            self.nonce = Some(generate_nonce());
        }
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.can_be_prefix {
            f.write_str("[P]")?;
        }
        if self.must_be_fresh {
            f.write_str("[F]")?;
        }
        Ok(())
    }
}

/// Content type for Data packets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    #[default]
    Blob,
    Link,
    Key,
    Nack,
}

/// Data packet structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub name: Name,
    pub content_type: ContentType,
    pub freshness_period: Duration,
    pub content: Vec<u8>,
    /// SHA-256 of the encoded packet, known once the wire codec has seen it.
    pub implicit_digest: Option<[u8; 32]>,
}

impl Data {
    pub fn new(name: Name, content: Vec<u8>) -> Self {
        Self {
            name,
            content_type: ContentType::Blob,
            freshness_period: Duration::ZERO,
            content,
            implicit_digest: None,
        }
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_freshness_period(mut self, freshness_period: Duration) -> Self {
        self.freshness_period = freshness_period;
        self
    }

    pub fn with_implicit_digest(mut self, digest: [u8; 32]) -> Self {
        self.implicit_digest = Some(digest);
        self
    }

    /// Name plus implicit digest component, when the digest is known.
    pub fn full_name(&self) -> Option<Name> {
        self.implicit_digest
            .map(|digest| self.name.append(NameComponent::implicit_digest(digest)))
    }

    /// Determine whether this Data satisfies `interest`.
    pub fn can_satisfy(&self, interest: &Interest) -> bool {
        if interest.must_be_fresh && self.freshness_period.is_zero() {
            return false;
        }

        if interest.name == self.name
            || (interest.can_be_prefix && interest.name.is_prefix_of(&self.name))
        {
            return true;
        }

        let ends_with_digest = interest
            .name
            .last()
            .is_some_and(|c| c.is_type(ComponentType::ImplicitSha256DigestComponent));
        if !ends_with_digest {
            return false;
        }
        self.full_name()
            .is_some_and(|full_name| interest.name == full_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NackReason {
    Congestion,
    Duplicate,
    NoRoute,
    Unspecified,
}

impl fmt::Display for NackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NackReason::Congestion => write!(f, "Congestion"),
            NackReason::Duplicate => write!(f, "Duplicate"),
            NackReason::NoRoute => write!(f, "NoRoute"),
            NackReason::Unspecified => write!(f, "Unspecified"),
        }
    }
}

/// Nack packet: a reason attached to the Interest it rejects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nack {
    pub reason: NackReason,
    pub interest: Interest,
}

impl Nack {
    pub fn new(interest: Interest, reason: NackReason) -> Self {
        Self { reason, interest }
    }
}

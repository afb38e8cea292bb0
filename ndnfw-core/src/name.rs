use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Name component kinds, following the NDN naming conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentType {
    Generic,
    ImplicitSha256DigestComponent,
    ParametersSha256DigestComponent,
    KeywordNameComponent,
    SegmentNameComponent,
    ByteOffsetNameComponent,
    VersionNameComponent,
    TimestampNameComponent,
    SequenceNumNameComponent,
}

impl ComponentType {
    /// TLV-TYPE number of this component kind.
    pub fn tlv_type(self) -> u16 {
        match self {
            ComponentType::ImplicitSha256DigestComponent => 0x01,
            ComponentType::ParametersSha256DigestComponent => 0x02,
            ComponentType::Generic => 0x08,
            ComponentType::KeywordNameComponent => 0x20,
            ComponentType::SegmentNameComponent => 0x32,
            ComponentType::ByteOffsetNameComponent => 0x34,
            ComponentType::VersionNameComponent => 0x36,
            ComponentType::TimestampNameComponent => 0x38,
            ComponentType::SequenceNumNameComponent => 0x3A,
        }
    }

    fn uri_label(self) -> Option<&'static str> {
        match self {
            ComponentType::Generic => None,
            ComponentType::ImplicitSha256DigestComponent => Some("sha256digest"),
            ComponentType::ParametersSha256DigestComponent => Some("params-sha256"),
            ComponentType::KeywordNameComponent => Some("32"),
            ComponentType::SegmentNameComponent => Some("seg"),
            ComponentType::ByteOffsetNameComponent => Some("off"),
            ComponentType::VersionNameComponent => Some("v"),
            ComponentType::TimestampNameComponent => Some("t"),
            ComponentType::SequenceNumNameComponent => Some("seq"),
        }
    }

    fn from_uri_label(label: &str) -> Option<Self> {
        Some(match label {
            "sha256digest" => ComponentType::ImplicitSha256DigestComponent,
            "params-sha256" => ComponentType::ParametersSha256DigestComponent,
            "32" => ComponentType::KeywordNameComponent,
            "seg" => ComponentType::SegmentNameComponent,
            "off" => ComponentType::ByteOffsetNameComponent,
            "v" => ComponentType::VersionNameComponent,
            "t" => ComponentType::TimestampNameComponent,
            "seq" => ComponentType::SequenceNumNameComponent,
            _ => return None,
        })
    }

    fn is_digest(self) -> bool {
        matches!(
            self,
            ComponentType::ImplicitSha256DigestComponent
                | ComponentType::ParametersSha256DigestComponent
        )
    }

    fn is_numeric(self) -> bool {
        matches!(
            self,
            ComponentType::SegmentNameComponent
                | ComponentType::ByteOffsetNameComponent
                | ComponentType::VersionNameComponent
                | ComponentType::TimestampNameComponent
                | ComponentType::SequenceNumNameComponent
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameComponent {
    pub value: Vec<u8>,
    pub component_type: ComponentType,
}

impl NameComponent {
    pub fn new(value: Vec<u8>) -> Self {
        Self {
            value,
            component_type: ComponentType::Generic,
        }
    }

    pub fn with_type(value: Vec<u8>, component_type: ComponentType) -> Self {
        Self {
            value,
            component_type,
        }
    }

    /// Create a numeric component (segment, version, ...) holding `n` as a NonNegativeInteger.
    pub fn number(component_type: ComponentType, n: u64) -> Self {
        let bytes = if n <= 0xFF {
            vec![n as u8]
        } else if n <= 0xFFFF {
            (n as u16).to_be_bytes().to_vec()
        } else if n <= 0xFFFF_FFFF {
            (n as u32).to_be_bytes().to_vec()
        } else {
            n.to_be_bytes().to_vec()
        };
        Self::with_type(bytes, component_type)
    }

    pub fn segment(n: u64) -> Self {
        Self::number(ComponentType::SegmentNameComponent, n)
    }

    pub fn version(n: u64) -> Self {
        Self::number(ComponentType::VersionNameComponent, n)
    }

    pub fn implicit_digest(digest: [u8; 32]) -> Self {
        Self::with_type(digest.to_vec(), ComponentType::ImplicitSha256DigestComponent)
    }

    /// Interpret the value as a NonNegativeInteger.
    pub fn as_number(&self) -> Option<u64> {
        match self.value.len() {
            1 | 2 | 4 | 8 => Some(self.value.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.value)
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn is_type(&self, component_type: ComponentType) -> bool {
        self.component_type == component_type
    }

    fn parse_uri(part: &str) -> Result<Self, NameParseError> {
        if let Some((label, rest)) = part.split_once('=') {
            if let Some(component_type) = ComponentType::from_uri_label(label) {
                if component_type.is_digest() {
                    let digest = decode_hex(rest).ok_or(NameParseError::InvalidComponent)?;
                    if digest.len() != 32 {
                        return Err(NameParseError::InvalidComponent);
                    }
                    return Ok(Self::with_type(digest, component_type));
                }
                if component_type.is_numeric() {
                    let n = rest.parse::<u64>().map_err(|_| NameParseError::InvalidComponent)?;
                    return Ok(Self::number(component_type, n));
                }
                return Ok(Self::with_type(unescape(rest)?, component_type));
            }
        }

        let mut value = unescape(part)?;
        if !value.is_empty() && value.iter().all(|b| *b == b'.') {
            if value.len() < 3 {
                return Err(NameParseError::InvalidComponent);
            }
            value.truncate(value.len() - 3);
        }
        Ok(Self::new(value))
    }
}

impl From<&str> for NameComponent {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}

impl PartialOrd for NameComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Canonical order: TLV-TYPE, then TLV-LENGTH, then TLV-VALUE bytes.
impl Ord for NameComponent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.component_type
            .tlv_type()
            .cmp(&other.component_type.tlv_type())
            .then(self.value.len().cmp(&other.value.len()))
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.component_type.uri_label();
        if let Some(label) = label {
            write!(f, "{}=", label)?;
            if self.component_type.is_digest() {
                for b in &self.value {
                    write!(f, "{:02x}", b)?;
                }
                return Ok(());
            }
            if self.component_type.is_numeric() {
                if let Some(n) = self.as_number() {
                    return write!(f, "{}", n);
                }
            }
        }

        if label.is_none() && self.value.iter().all(|b| *b == b'.') {
            f.write_str("...")?;
        }
        for b in &self.value {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                write!(f, "{}", *b as char)?;
            } else {
                write!(f, "%{:02X}", b)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name {
    pub components: Vec<NameComponent>,
}

impl Name {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    pub fn from_components(components: Vec<NameComponent>) -> Self {
        Self { components }
    }

    pub fn push(&mut self, component: NameComponent) {
        self.components.push(component);
    }

    /// Return a copy of this name with one more component.
    pub fn append(&self, component: impl Into<NameComponent>) -> Name {
        let mut name = self.clone();
        name.push(component.into());
        name
    }

    pub fn get_component(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    pub fn last(&self) -> Option<&NameComponent> {
        self.components.last()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Return the first `length` components. A negative `length` drops that many
    /// components from the end.
    pub fn get_prefix(&self, length: isize) -> Name {
        let end = if length < 0 {
            self.len().saturating_sub(length.unsigned_abs())
        } else {
            std::cmp::min(length as usize, self.len())
        };
        Self {
            components: self.components[..end].to_vec(),
        }
    }

    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.len() <= other.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(a, b)| a == b)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NameComponent> {
        self.components.iter()
    }

    pub fn to_uri(&self) -> String {
        if self.components.is_empty() {
            return "/".to_string();
        }

        let mut uri = String::new();
        for component in &self.components {
            uri.push('/');
            uri.push_str(&component.to_string());
        }
        uri
    }
}

/// Lets maps keyed by [`Name`] be queried with a component slice, so a
/// prefix lookup does not allocate.
impl Borrow<[NameComponent]> for Name {
    fn borrow(&self) -> &[NameComponent] {
        &self.components
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl FromStr for Name {
    type Err = NameParseError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let path = uri.strip_prefix("ndn:").unwrap_or(uri);
        let path = path.strip_prefix('/').unwrap_or(path);

        let mut components = Vec::new();
        for part in path.split('/') {
            if part.is_empty() {
                continue;
            }
            components.push(NameComponent::parse_uri(part)?);
        }
        Ok(Self { components })
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_uri())
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let uri = String::deserialize(deserializer)?;
        uri.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameParseError {
    InvalidFormat,
    InvalidComponent,
    EncodingError,
}

impl fmt::Display for NameParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameParseError::InvalidFormat => write!(f, "Invalid name format"),
            NameParseError::InvalidComponent => write!(f, "Invalid name component"),
            NameParseError::EncodingError => write!(f, "Name encoding error"),
        }
    }
}

impl std::error::Error for NameParseError {}

fn unescape(s: &str) -> Result<Vec<u8>, NameParseError> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3).ok_or(NameParseError::EncodingError)?;
            let hex = std::str::from_utf8(hex).map_err(|_| NameParseError::EncodingError)?;
            out.push(u8::from_str_radix(hex, 16).map_err(|_| NameParseError::EncodingError)?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

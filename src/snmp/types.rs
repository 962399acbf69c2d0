use super::oid::Oid;
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Per-item failure reported back to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PollError {
    /// Unparseable OID or malformed item key. Never retried.
    #[error("{0}")]
    Config(String),
    /// Connect failure, timeout at batch size 1, open/send failure.
    #[error("{0}")]
    Network(String),
    /// Exception values, loops, protocol violations, missing index.
    #[error("{0}")]
    NotSupported(String),
}

impl PollError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::ConfigError,
            Self::Network(_) => ErrorKind::NetworkError,
            Self::NotSupported(_) => ErrorKind::NotSupported,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Config(msg) | Self::Network(msg) | Self::NotSupported(msg) => msg,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "CONFIG_ERROR")]
    ConfigError,
    #[serde(rename = "NETWORK_ERROR")]
    NetworkError,
    #[serde(rename = "NOTSUPPORTED")]
    NotSupported,
}

/// Variable-binding value as delivered by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectIdentifier(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Unsigned32(u32),
    Timeticks(u32),
    Counter64(u64),
    Opaque(Vec<u8>),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
    /// Anything the session could not map; carries the BER tag.
    Unsupported(u8),
}

impl Value {
    /// Convenience for building string values in tests and mocks.
    pub fn string(s: &str) -> Self {
        Self::OctetString(s.as_bytes().to_vec())
    }

    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView
        )
    }
}

/// Typed result of a successfully decoded item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValue {
    Text(String),
    Uint64(u64),
    Double(f64),
}

impl fmt::Display for ItemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Uint64(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{:.6}", v),
        }
    }
}

impl Serialize for ItemValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(s) => serializer.serialize_str(s),
            Self::Uint64(v) => serializer.serialize_u64(*v),
            Self::Double(v) => serializer.serialize_f64(*v),
        }
    }
}

/// One item to poll on a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRequest {
    pub id: String,
    /// Raw OID expression: plain, `base[index,ref,value]` or `discovery[...]`.
    pub oid: String,
}

impl ItemRequest {
    pub fn new(id: impl Into<String>, oid: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            oid: oid.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemResult {
    pub id: String,
    pub outcome: Result<ItemValue, PollError>,
}

impl ItemResult {
    pub fn new(id: &str, outcome: Result<ItemValue, PollError>) -> Self {
        Self {
            id: id.to_string(),
            outcome,
        }
    }

    pub fn value(&self) -> Option<&ItemValue> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&PollError> {
        self.outcome.as_ref().err()
    }
}

//! Request/response seam between the engine and an SNMP implementation.

pub mod mock;
mod net;

pub use net::NetConnector;

use super::oid::Oid;
use super::target::Target;
use super::types::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    Get,
    GetNext,
    GetBulk { non_repeaters: u32, max_repetitions: u32 },
}

/// One outgoing PDU.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub kind: PduKind,
    pub oids: Vec<Oid>,
    /// Extra attempts after a timeout, handled by the session.
    pub retries: u32,
}

impl Request {
    pub fn get(oids: Vec<Oid>, retries: u32) -> Self {
        Self {
            kind: PduKind::Get,
            oids,
            retries,
        }
    }

    pub fn get_next(oid: Oid, retries: u32) -> Self {
        Self {
            kind: PduKind::GetNext,
            oids: vec![oid],
            retries,
        }
    }

    pub fn get_bulk(oid: Oid, max_repetitions: u32, retries: u32) -> Self {
        Self {
            kind: PduKind::GetBulk {
                non_repeaters: 0,
                max_repetitions,
            },
            oids: vec![oid],
            retries,
        }
    }
}

/// PDU error-status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    NoError,
    TooBig,
    NoSuchName,
    GenErr,
    Other(u32),
}

impl ErrorStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::NoError,
            1 => Self::TooBig,
            2 => Self::NoSuchName,
            5 => Self::GenErr,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::NoError => 0,
            Self::TooBig => 1,
            Self::NoSuchName => 2,
            Self::GenErr => 5,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self.code() {
            0 => "(noError) No Error",
            1 => "(tooBig) Response message would have been too large.",
            2 => "(noSuchName) There is no such variable name in this MIB.",
            3 => "(badValue) The value given has the wrong type or length.",
            4 => "(readOnly) The two parties used do not have access to use the specified SNMP PDU.",
            5 => "(genError) A general failure occured",
            6 => "noAccess",
            7 => "wrongType (The set datatype does not match the data type the agent expects)",
            8 => "wrongLength (The set value has an illegal length from what the agent expects)",
            9 => "wrongEncoding",
            10 => "wrongValue (The set value is illegal or unsupported in some way)",
            11 => "noCreation (That table does not support row creation or that object can not ever be created)",
            12 => "inconsistentValue (The set value is illegal or unsupported in some way)",
            13 => "resourceUnavailable (This is likely a out-of-memory failure within the agent)",
            14 => "commitFailed",
            15 => "undoFailed",
            16 => "authorizationError (access denied to that object)",
            17 => "notWritable (That object does not support modification)",
            18 => "inconsistentName (That object can not currently be created)",
            other => return write!(f, "Unknown Error {}", other),
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub error_status: ErrorStatus,
    /// 1-based position of the offending binding, 0 if none.
    pub error_index: u32,
    pub varbinds: Vec<(Oid, Value)>,
}

impl Response {
    pub fn ok(varbinds: Vec<(Oid, Value)>) -> Self {
        Self {
            error_status: ErrorStatus::NoError,
            error_index: 0,
            varbinds,
        }
    }

    pub fn error(error_status: ErrorStatus, error_index: u32) -> Self {
        Self {
            error_status,
            error_index,
            varbinds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("timeout")]
    Timeout,
    /// Request would not fit in one datagram.
    #[error("message too long")]
    TooLong,
    #[error("authentication failure")]
    AuthFailure,
    #[error("{0}")]
    Other(String),
}

/// An open SNMP session. Dropping it closes it.
pub trait Session {
    fn send(&mut self, request: &Request) -> Result<Response, TransportError>;
}

/// Opens sessions for targets.
pub trait Connector: Send + Sync {
    /// One-time library setup, run before the first session is opened.
    fn initialize(&self) {}

    fn open(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError>;
}

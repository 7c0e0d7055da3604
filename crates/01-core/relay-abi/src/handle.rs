//! Client-side handles a caller binds to receive responses and indications.

use thiserror::Error;

use crate::ids::Serial;
use crate::spec::{IndicationKind, RequestKind};
use crate::status::Status;
use crate::version::ProtocolVersion;

/// Returned by a handle when the remote endpoint behind it no longer exists.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("remote endpoint is gone")]
pub struct RemoteGone;

/// Body of a response: either one payload in exactly one revision's shape, or
/// nothing (error-only responses are understood by every revision).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseBody {
    /// Payload encoded in the shape defined by `revision`.
    Shaped {
        /// Revision whose shape `payload` follows.
        revision: ProtocolVersion,
        /// Result bytes produced by the backing system.
        payload: Vec<u8>,
    },
    /// Status only.
    Empty,
}

/// Correlated response delivered for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// Serial the caller dispatched with.
    pub serial: Serial,
    /// Kind of the originating request.
    pub kind: RequestKind,
    /// Completion status.
    pub status: Status,
    /// Result body.
    pub body: ResponseBody,
}

impl Response {
    /// Builds an error-only response.
    pub fn failure(serial: Serial, kind: RequestKind, status: Status) -> Self {
        Self {
            serial,
            kind,
            status,
            body: ResponseBody::Empty,
        }
    }
}

/// Unsolicited event pushed to a bound client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Indication {
    /// Indication tag.
    pub kind: IndicationKind,
    /// Revision whose shape `payload` follows.
    pub revision: ProtocolVersion,
    /// Event bytes produced by the backing system.
    pub payload: Vec<u8>,
}

/// Receives correlated responses for a bound client.
pub trait ResponseSink: Send + Sync {
    /// Delivers one response. Returning [`RemoteGone`] tears the binding down.
    fn on_response(&self, response: &Response) -> Result<(), RemoteGone>;
}

/// Receives indications for a bound client.
pub trait IndicationSink: Send + Sync {
    /// Delivers one indication. Returning [`RemoteGone`] tears the binding down.
    fn on_indication(&self, indication: &Indication) -> Result<(), RemoteGone>;
}

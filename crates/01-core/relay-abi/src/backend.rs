//! Downstream seam toward the backing vendor system.

use thiserror::Error;

use crate::ids::{Token, TransportId};
use crate::spec::{IndicationKind, RequestKind};
use crate::status::Status;

/// Reasons the backing system can refuse a submission synchronously.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// The backing system could not allocate resources for the request.
    #[error("backing system out of memory")]
    AllocationFailed,
    /// The backing system is shut down or otherwise refuses work.
    #[error("backing system closed")]
    Closed,
}

/// Non-blocking submit interface implemented by backing systems.
///
/// `payload` is only borrowed for the duration of the call; a backing system
/// that needs the bytes later copies them before returning. Every accepted
/// submission is answered with exactly one [`CompletionSink::complete`] call
/// carrying the same `token`, possibly before `submit` itself returns.
pub trait Backend: Send + Sync {
    /// Hands one marshalled request to the backing system.
    fn submit(&self, kind: RequestKind, payload: &[u8], token: Token) -> Result<(), SubmitError>;
}

/// Upstream seam the backing system calls from its own threads.
pub trait CompletionSink: Send + Sync {
    /// Reports the completion of a previously submitted request.
    fn complete(&self, token: Token, status: Status, result: Vec<u8>);

    /// Pushes an unsolicited event toward the client bound on `transport`.
    fn indicate(&self, transport: TransportId, kind: IndicationKind, payload: Vec<u8>);
}

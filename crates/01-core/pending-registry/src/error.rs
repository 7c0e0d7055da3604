use relay_abi::{Serial, Token, TransportId};
use thiserror::Error;

/// Convenience result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors surfaced by the pending-request registry.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The lane already tracks its configured maximum of in-flight requests.
    #[error("{transport}: {limit} requests already in flight")]
    Exhausted {
        /// Transport whose lane is full.
        transport: TransportId,
        /// Configured limit.
        limit: usize,
    },

    /// A live request already uses this serial.
    #[error("{transport}: serial {serial} already in flight")]
    DuplicateSerial {
        /// Transport the serial was reused on.
        transport: TransportId,
        /// Offending serial.
        serial: Serial,
    },

    /// The request was already failed by channel loss; the backing system
    /// completed it afterwards.
    #[error("late completion for abandoned request {0:?}")]
    Abandoned(Token),

    /// The token matches no live or abandoned request.
    #[error("double completion detected for {0:?}")]
    DoubleCompletion(Token),
}

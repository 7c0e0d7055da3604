use pending_registry::RegistryError;
use relay_abi::{ErrorClass, ProtocolVersion, RequestKind, Serial, Status, TransportId};
use thiserror::Error;

/// Why a dispatch did not reach the backing system.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The kind is not in the catalog.
    #[error("request kind {0:?} is not in the catalog")]
    UnknownKind(RequestKind),

    /// Arguments do not match the kind's declared shape.
    #[error("arguments do not match the shape declared for {0}")]
    MalformedArgument(&'static str),

    /// Buffer or registry slot could not be allocated.
    #[error("allocation failed")]
    AllocationFailed,

    /// A string argument would have been truncated on the wire.
    #[error("argument {index} would be truncated")]
    MarshallingTruncated {
        /// Position of the offending argument.
        index: usize,
    },

    /// The bound client predates every revision of the kind.
    #[error("{kind} needs protocol {required}, client is bound at {bound}")]
    UnsupportedForProtocolVersion {
        /// Kind name.
        kind: &'static str,
        /// Minimum version able to understand the response.
        required: ProtocolVersion,
        /// Currently bound version.
        bound: ProtocolVersion,
    },

    /// No client is bound on the transport.
    #[error("no client bound on {0}")]
    ChannelGone(TransportId),

    /// The serial is already in flight on this transport.
    #[error("serial {0} is already in flight")]
    DuplicateSerial(Serial),

    /// The backing system refuses work.
    #[error("backing system closed")]
    BackendClosed,

    /// The registry reported a lifecycle violation.
    #[error(transparent)]
    Registry(RegistryError),
}

impl DispatchError {
    /// Error class shared with the rest of the relay.
    pub fn class(&self) -> ErrorClass {
        match self {
            DispatchError::UnknownKind(_)
            | DispatchError::MalformedArgument(_)
            | DispatchError::MarshallingTruncated { .. }
            | DispatchError::DuplicateSerial(_) => ErrorClass::MalformedArgument,
            DispatchError::AllocationFailed => ErrorClass::AllocationFailure,
            DispatchError::UnsupportedForProtocolVersion { .. } => {
                ErrorClass::UnsupportedForProtocolVersion
            }
            DispatchError::ChannelGone(_) | DispatchError::BackendClosed => ErrorClass::ChannelGone,
            DispatchError::Registry(_) => ErrorClass::DoubleCompletionDetected,
        }
    }

    /// Status carried by the failure response synthesized for this error.
    pub fn status(&self) -> Status {
        self.class().status()
    }

    /// Whether a failure response is synthesized toward the client.
    ///
    /// Nothing is sent when no client is bound, or when the serial belongs to
    /// a request that is still live.
    pub fn synthesizes_response(&self) -> bool {
        !matches!(
            self,
            DispatchError::ChannelGone(_) | DispatchError::DuplicateSerial(_)
        )
    }
}

impl From<RegistryError> for DispatchError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Exhausted { .. } => DispatchError::AllocationFailed,
            RegistryError::DuplicateSerial { serial, .. } => DispatchError::DuplicateSerial(serial),
            other => DispatchError::Registry(other),
        }
    }
}

/// Result alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

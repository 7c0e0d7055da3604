use serde::Serialize;

/// Typed completion status carried by every response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    /// Operation succeeded.
    Success,
    /// Buffer or registry allocation failed; retry after backpressure.
    NoMemory,
    /// Arguments did not match the declared shape or could not be marshalled.
    InvalidArguments,
    /// The bound protocol version cannot express this operation.
    RequestNotSupported,
    /// The client channel vanished while the request was in flight.
    ChannelGone,
    /// The relay itself broke a lifecycle rule, such as completing a request twice.
    InternalError,
    /// Backing-system specific failure code.
    Backend(i32),
}

impl Status {
    /// Returns `true` for [`Status::Success`].
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }
}

/// Error taxonomy shared by every layer of the relay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorClass {
    /// Recoverable by the caller after backpressure.
    AllocationFailure,
    /// Permanent caller error.
    MalformedArgument,
    /// Permanent under the current binding; may resolve after a rebind.
    UnsupportedForProtocolVersion,
    /// Remote endpoint vanished.
    ChannelGone,
    /// Lifecycle corruption; never silently swallowed.
    DoubleCompletionDetected,
}

impl ErrorClass {
    /// Whether a caller may reasonably retry the same operation unchanged.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorClass::AllocationFailure | ErrorClass::UnsupportedForProtocolVersion
        )
    }

    /// Status synthesized toward the client for a locally detected failure.
    pub fn status(self) -> Status {
        match self {
            ErrorClass::AllocationFailure => Status::NoMemory,
            ErrorClass::MalformedArgument => Status::InvalidArguments,
            ErrorClass::UnsupportedForProtocolVersion => Status::RequestNotSupported,
            ErrorClass::ChannelGone => Status::ChannelGone,
            ErrorClass::DoubleCompletionDetected => Status::InternalError,
        }
    }
}

use std::fmt;

use crate::version::ProtocolVersion;

/// Caller-chosen correlation id for one in-flight request on one transport.
pub type Serial = i32;

/// Per-lane sequence number distinguishing successive registrations that reuse a serial.
pub type Ticket = u64;

/// Identifies one logical client-facing connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(pub u16);

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport#{}", self.0)
    }
}

/// Correlation context handed to the backing system at submit time and
/// returned verbatim with the completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    /// Transport the request was dispatched on.
    pub transport: TransportId,
    /// Caller-chosen serial.
    pub serial: Serial,
    /// Registration ticket issued by the pending-request registry.
    pub ticket: Ticket,
}

/// Monotonic counter marking successive channel bindings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl Generation {
    /// Returns the generation that follows this one.
    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

/// Binding state observed when a request was dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingSnapshot {
    /// Channel generation at dispatch time.
    pub generation: Generation,
    /// Protocol version bound at dispatch time.
    pub version: ProtocolVersion,
}

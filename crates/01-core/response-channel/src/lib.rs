//! Per-transport response channel and version selection.
//!
//! * [`ResponseChannel`] – the bound response/indication handle pair plus the
//!   protocol version, guarded by one reader/writer lock and a monotonic
//!   [`Generation`](relay_abi::Generation).
//! * [`GenerationGuard`] – the generation counter and its re-check rule.
//! * [`VersionedResponseSelector`] – picks the single shape a bound client can
//!   understand, or the kind's drop/fail policy when none fits.

#![deny(missing_docs)]

mod channel;
mod guard;
mod select;

pub use channel::{Binding, ChannelView, ResponseChannel};
pub use guard::GenerationGuard;
pub use select::{Admission, Selection, VersionedResponseSelector};

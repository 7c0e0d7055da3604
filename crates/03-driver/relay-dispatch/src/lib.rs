//! Per-transport request dispatch and completion routing.
//!
//! A [`TransportEndpoint`] owns one transport's [`ResponseChannel`] and drives
//! the full request lifecycle:
//!
//! 1. `dispatch` validates the arguments against the kind's declared shape,
//!    registers a pending entry under the channel's read lock, marshals into
//!    an owned buffer, and submits it to the [`Backend`].
//! 2. `complete` removes the entry, releases the buffer, selects the response
//!    shape from the dispatch-time and current versions, and calls the bound
//!    handle.
//! 3. A handle reporting [`RemoteGone`] invalidates the binding it was read
//!    from and fails every request dispatched under it, one by one.
//!
//! Local failures are answered with a synthesized error-only response so
//! callers never wait on a request that will not complete.
//!
//! [`ResponseChannel`]: response_channel::ResponseChannel
//! [`Backend`]: relay_abi::Backend
//! [`RemoteGone`]: relay_abi::RemoteGone

#![deny(missing_docs)]

mod config;
mod endpoint;
mod error;
mod stats;

pub use config::SurfaceConfig;
pub use endpoint::TransportEndpoint;
pub use error::{DispatchError, DispatchResult};
pub use stats::{DispatchStatsSnapshot, LifecycleObserver, Terminal};

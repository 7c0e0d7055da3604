//! Correlation registry for in-flight requests.
//!
//! Requests are tracked per transport in independent lanes so completions for
//! one transport never contend with dispatches on another:
//! * [`PendingRequestRegistry`] – lane table plus register/complete/find.
//! * [`PendingRequest`] – the single owner of a request's marshalled payload
//!   from submission until completion.
//! * [`RegistryError`] – exhaustion, duplicate serials, late and duplicate
//!   completions.

#![deny(missing_docs)]

mod error;
mod lane;
mod registry;

pub use error::{RegistryError, RegistryResult};
pub use lane::{LaneConfig, PendingInfo, PendingRequest};
pub use registry::{LaneStats, PendingRequestRegistry};

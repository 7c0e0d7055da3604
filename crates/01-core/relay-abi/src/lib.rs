//! Relay ABI types shared by the dispatcher, the response channel, and backing
//! systems.
//!
//! This crate defines the protocol boundary between the caller-facing surface
//! (layer 05), the dispatch driver (layer 03), and backing implementations
//! (layer 04). It carries no locking or threading of its own:
//! * [`RequestKind`] / [`KindSpec`] – static description of each operation.
//! * [`Args`] – typed argument vectors, one variant per payload shape.
//! * [`OwnedPayload`] – move-only marshalled buffer with a one-shot release.
//! * [`Backend`] / [`CompletionSink`] – downstream submit and completion seams.
//! * [`ResponseSink`] / [`IndicationSink`] – upstream client handles.

#![deny(missing_docs)]

mod args;
mod backend;
mod handle;
mod ids;
pub mod kinds;
mod payload;
mod spec;
mod status;
mod version;

pub use args::{Args, Value};
pub use backend::{Backend, CompletionSink, SubmitError};
pub use handle::{Indication, IndicationSink, RemoteGone, Response, ResponseBody, ResponseSink};
pub use ids::{BindingSnapshot, Generation, Serial, Ticket, Token, TransportId};
pub use payload::{OwnedPayload, ReleaseFn, Released};
pub use spec::{
    ArgShape, CatalogError, FieldKind, IndicationKind, IndicationSpec, KindCatalog, KindSpec,
    RequestKind, VersionPolicy,
};
pub use status::{ErrorClass, Status};
pub use version::ProtocolVersion;

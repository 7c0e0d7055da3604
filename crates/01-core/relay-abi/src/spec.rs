//! Static per-kind descriptions consulted by the dispatcher and the selector.

use std::collections::HashMap;

use thiserror::Error;

use crate::args::{Args, Value};
use crate::version::ProtocolVersion;

/// Opaque tag identifying a request/response operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKind(pub u16);

/// Opaque tag identifying an unsolicited indication.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndicationKind(pub u16);

/// Type of one field inside a structured record argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Signed integer.
    Int,
    /// Boolean flag.
    Bool,
    /// Nullable string.
    Text,
    /// Opaque bytes.
    Bytes,
}

/// Declared argument shape for a request kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgShape {
    /// No arguments.
    Void,
    /// Exactly `n` nullable strings.
    Strings(u8),
    /// Exactly `n` 32-bit integers.
    Ints(u8),
    /// One opaque byte blob.
    Raw,
    /// One structured record with the listed field types, in order.
    Record(&'static [FieldKind]),
}

impl ArgShape {
    /// Returns `true` when `args` has this shape's arity and element types.
    pub fn accepts(&self, args: &Args) -> bool {
        match (self, args) {
            (ArgShape::Void, Args::Void) => true,
            (ArgShape::Strings(n), Args::Strings(values)) => values.len() == *n as usize,
            (ArgShape::Ints(n), Args::Ints(values)) => values.len() == *n as usize,
            (ArgShape::Raw, Args::Raw(_)) => true,
            (ArgShape::Record(fields), Args::Record(values)) => {
                fields.len() == values.len()
                    && fields
                        .iter()
                        .zip(values.iter())
                        .all(|(field, value)| field_matches(*field, value))
            }
            _ => false,
        }
    }
}

fn field_matches(field: FieldKind, value: &Value) -> bool {
    matches!(
        (field, value),
        (FieldKind::Int, Value::Int(_))
            | (FieldKind::Bool, Value::Bool(_))
            | (FieldKind::Text, Value::Text(_))
            | (FieldKind::Bytes, Value::Bytes(_))
    )
}

/// What to do with an event when the bound client is older than every
/// revision that defines a shape for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionPolicy {
    /// Optional or cosmetic: log and drop.
    Drop,
    /// Request/response pair: fail the originating request.
    Fail,
}

/// Static description of a request kind.
#[derive(Clone, Copy, Debug)]
pub struct KindSpec {
    /// Tag the spec describes.
    pub kind: RequestKind,
    /// Diagnostic name.
    pub name: &'static str,
    /// Argument shape accepted at dispatch.
    pub args: ArgShape,
    /// Ascending revisions that each define a response shape. The first entry
    /// is the minimum version able to understand the response.
    pub revisions: &'static [ProtocolVersion],
    /// Policy applied when the bound version predates `revisions[0]`.
    pub policy: VersionPolicy,
}

impl KindSpec {
    /// Minimum bound version for this kind.
    pub fn min_version(&self) -> ProtocolVersion {
        self.revisions
            .first()
            .copied()
            .unwrap_or(ProtocolVersion::V1_0)
    }
}

/// Static description of an indication kind. Indications have no originating
/// request, so an unsupported indication is always dropped.
#[derive(Clone, Copy, Debug)]
pub struct IndicationSpec {
    /// Tag the spec describes.
    pub kind: IndicationKind,
    /// Diagnostic name.
    pub name: &'static str,
    /// Ascending revisions that each define a payload shape.
    pub revisions: &'static [ProtocolVersion],
}

/// Errors raised while assembling a [`KindCatalog`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// The revision list is empty.
    #[error("kind {0} declares no revisions")]
    EmptyRevisions(&'static str),

    /// Revisions are not strictly ascending.
    #[error("kind {0} declares revisions out of order")]
    UnsortedRevisions(&'static str),

    /// The tag is already present.
    #[error("kind {0} registered twice")]
    Duplicate(&'static str),
}

/// Lookup table of every request and indication kind a surface understands.
#[derive(Clone, Debug, Default)]
pub struct KindCatalog {
    requests: HashMap<RequestKind, KindSpec>,
    indications: HashMap<IndicationKind, IndicationSpec>,
}

impl KindCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a request kind, validating its revision list.
    pub fn with_request(mut self, spec: KindSpec) -> Result<Self, CatalogError> {
        check_revisions(spec.name, spec.revisions)?;
        if self.requests.insert(spec.kind, spec).is_some() {
            return Err(CatalogError::Duplicate(spec.name));
        }
        Ok(self)
    }

    /// Adds an indication kind, validating its revision list.
    pub fn with_indication(mut self, spec: IndicationSpec) -> Result<Self, CatalogError> {
        check_revisions(spec.name, spec.revisions)?;
        if self.indications.insert(spec.kind, spec).is_some() {
            return Err(CatalogError::Duplicate(spec.name));
        }
        Ok(self)
    }

    /// Looks up a request kind.
    pub fn request(&self, kind: RequestKind) -> Option<&KindSpec> {
        self.requests.get(&kind)
    }

    /// Looks up an indication kind.
    pub fn indication(&self, kind: IndicationKind) -> Option<&IndicationSpec> {
        self.indications.get(&kind)
    }

    /// Number of request kinds registered.
    pub fn request_count(&self) -> usize {
        self.requests.len()
    }
}

fn check_revisions(name: &'static str, revisions: &[ProtocolVersion]) -> Result<(), CatalogError> {
    if revisions.is_empty() {
        return Err(CatalogError::EmptyRevisions(name));
    }
    if revisions.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(CatalogError::UnsortedRevisions(name));
    }
    Ok(())
}

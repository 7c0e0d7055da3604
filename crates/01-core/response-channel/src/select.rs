use std::sync::Arc;

use log::{debug, trace};
use relay_abi::{IndicationKind, KindCatalog, ProtocolVersion, RequestKind, VersionPolicy};

/// Outcome of shaping one event for a bound client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    /// Deliver the payload in the shape defined by this revision.
    Deliver(ProtocolVersion),
    /// The client cannot understand any shape; discard quietly.
    Drop,
    /// The client cannot understand any shape; deliver an error-only response.
    Fail,
}

/// Dispatch-time verdict for a request kind under the bound version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Submit normally.
    Accept,
    /// The kind's policy is `Fail` and the bound version predates it.
    Reject,
}

/// Picks the single highest compatible revision for an event.
#[derive(Clone, Debug)]
pub struct VersionedResponseSelector {
    catalog: Arc<KindCatalog>,
}

impl VersionedResponseSelector {
    /// Creates a selector over `catalog`.
    pub fn new(catalog: Arc<KindCatalog>) -> Self {
        Self { catalog }
    }

    /// Catalog this selector consults.
    pub fn catalog(&self) -> &Arc<KindCatalog> {
        &self.catalog
    }

    /// Decides whether a request of `kind` may be submitted while `bound` is
    /// the negotiated version. `Drop`-policy kinds are always accepted; their
    /// response is discarded later if it cannot be shaped.
    pub fn admit(&self, kind: RequestKind, bound: ProtocolVersion) -> Admission {
        match self.catalog.request(kind) {
            Some(spec) if spec.policy == VersionPolicy::Fail && bound < spec.min_version() => {
                Admission::Reject
            }
            _ => Admission::Accept,
        }
    }

    /// Selects the response shape for a request dispatched under `dispatched`
    /// and delivered while `bound` is current. Uses the lower of the two so a
    /// rebind to an older client never receives a shape it cannot parse.
    pub fn response(
        &self,
        kind: RequestKind,
        dispatched: ProtocolVersion,
        bound: ProtocolVersion,
    ) -> Selection {
        let effective = dispatched.min(bound);
        let Some(spec) = self.catalog.request(kind) else {
            debug!("select::response unknown kind {}", kind.0);
            return Selection::Fail;
        };
        match highest_revision(spec.revisions, effective) {
            Some(revision) => {
                trace!("select::response {} -> {revision} (effective {effective})", spec.name);
                Selection::Deliver(revision)
            }
            None => match spec.policy {
                VersionPolicy::Drop => Selection::Drop,
                VersionPolicy::Fail => Selection::Fail,
            },
        }
    }

    /// Selects the indication shape for `bound`. Indications have no caller to
    /// fail, so anything unsupported is dropped.
    pub fn indication(&self, kind: IndicationKind, bound: ProtocolVersion) -> Selection {
        let Some(spec) = self.catalog.indication(kind) else {
            debug!("select::indication unknown kind {}", kind.0);
            return Selection::Drop;
        };
        match highest_revision(spec.revisions, bound) {
            Some(revision) => Selection::Deliver(revision),
            None => Selection::Drop,
        }
    }
}

fn highest_revision(
    revisions: &[ProtocolVersion],
    effective: ProtocolVersion,
) -> Option<ProtocolVersion> {
    revisions
        .iter()
        .rev()
        .find(|revision| **revision <= effective)
        .copied()
}

use std::sync::atomic::{AtomicU64, Ordering};

use relay_abi::{ErrorClass, Released, Serial, Status, Token, TransportId};
use serde::Serialize;

/// Final state reached by one dispatch attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Terminal {
    /// The backing completion was delivered to the bound client.
    Delivered(Status),
    /// A locally detected failure was synthesized as an error-only response.
    Failed(ErrorClass),
    /// The response was discarded because the client cannot parse any shape.
    Dropped,
    /// The dispatch was refused and nothing was sent to the client.
    Refused(ErrorClass),
}

/// Diagnostic hook notified as requests finish.
///
/// Both methods may run on backing worker threads and must not block.
pub trait LifecycleObserver: Send + Sync {
    /// Called exactly once per dispatch attempt.
    fn on_terminal(&self, _transport: TransportId, _serial: Serial, _terminal: Terminal) {}

    /// Called exactly once per marshalled buffer, after it is freed.
    fn on_release(&self, _token: Token, _released: Released) {}
}

#[derive(Default)]
pub(crate) struct DispatchStats {
    dispatched: AtomicU64,
    submitted: AtomicU64,
    delivered: AtomicU64,
    synthesized: AtomicU64,
    refused: AtomicU64,
    version_dropped: AtomicU64,
    channel_gone: AtomicU64,
    released: AtomicU64,
    double_completions: AtomicU64,
    late_completions: AtomicU64,
    indications_delivered: AtomicU64,
    indications_dropped: AtomicU64,
}

impl DispatchStats {
    pub(crate) fn dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn released(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn double_completion(&self) {
        self.double_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn late_completion(&self) {
        self.late_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn indication(&self, delivered: bool) {
        if delivered {
            self.indications_delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.indications_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record(&self, terminal: Terminal) {
        let counter = match terminal {
            Terminal::Delivered(_) => &self.delivered,
            Terminal::Failed(ErrorClass::ChannelGone) => &self.channel_gone,
            Terminal::Failed(_) => &self.synthesized,
            Terminal::Dropped => &self.version_dropped,
            Terminal::Refused(_) => &self.refused,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            synthesized: self.synthesized.load(Ordering::Relaxed),
            refused: self.refused.load(Ordering::Relaxed),
            version_dropped: self.version_dropped.load(Ordering::Relaxed),
            channel_gone: self.channel_gone.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            double_completions: self.double_completions.load(Ordering::Relaxed),
            late_completions: self.late_completions.load(Ordering::Relaxed),
            indications_delivered: self.indications_delivered.load(Ordering::Relaxed),
            indications_dropped: self.indications_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a transport's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStatsSnapshot {
    /// Calls to `dispatch`.
    pub dispatched: u64,
    /// Requests accepted by the backing system.
    pub submitted: u64,
    /// Responses delivered to a client.
    pub delivered: u64,
    /// Locally synthesized failures other than channel loss.
    pub synthesized: u64,
    /// Dispatches refused without a response.
    pub refused: u64,
    /// Responses dropped by version policy.
    pub version_dropped: u64,
    /// Requests failed because the client went away.
    pub channel_gone: u64,
    /// Buffers freed.
    pub released: u64,
    /// Completions for tokens that were never live or already completed.
    pub double_completions: u64,
    /// Completions that arrived after channel loss already failed the request.
    pub late_completions: u64,
    /// Indications delivered.
    pub indications_delivered: u64,
    /// Indications dropped by version policy, surface switch, or missing binding.
    pub indications_dropped: u64,
}

impl DispatchStatsSnapshot {
    /// Dispatch attempts that reached a terminal state.
    pub fn terminals(&self) -> u64 {
        self.delivered
            + self.synthesized
            + self.refused
            + self.version_dropped
            + self.channel_gone
    }
}

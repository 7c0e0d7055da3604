use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;
use relay_abi::{
    BindingSnapshot, Generation, IndicationSink, ProtocolVersion, ResponseSink, TransportId,
};

use crate::guard::GenerationGuard;

/// Handles registered by a connected client. Both handles are always present
/// together; an unbound channel holds no `Binding` at all.
#[derive(Clone)]
pub struct Binding {
    /// Version negotiated by the client.
    pub version: ProtocolVersion,
    /// Receives correlated responses.
    pub response: Arc<dyn ResponseSink>,
    /// Receives unsolicited indications.
    pub indication: Arc<dyn IndicationSink>,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

struct ChannelState {
    guard: GenerationGuard,
    binding: Option<Binding>,
}

/// Shared view handed to [`ResponseChannel::with_read_access`] callers.
#[derive(Clone, Copy, Debug)]
pub struct ChannelView<'a> {
    generation: Generation,
    binding: Option<&'a Binding>,
}

impl<'a> ChannelView<'a> {
    /// Generation observed while the read lock is held. Pass it to
    /// [`ResponseChannel::invalidate_if_stale`] if a call through this view fails.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Current binding, if any.
    pub fn binding(&self) -> Option<&'a Binding> {
        self.binding
    }

    /// Bound protocol version, if any.
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.binding.map(|binding| binding.version)
    }

    /// Generation and version pair for requests dispatched under this view.
    pub fn snapshot(&self) -> Option<BindingSnapshot> {
        self.binding.map(|binding| BindingSnapshot {
            generation: self.generation,
            version: binding.version,
        })
    }
}

/// Per-transport response channel.
///
/// Deliveries take the lock shared and run in parallel; `bind`,
/// `invalidate_if_stale`, and `unbind` take it exclusively. Transports never
/// share a channel, so they never contend with each other.
pub struct ResponseChannel {
    transport: TransportId,
    state: RwLock<ChannelState>,
}

impl ResponseChannel {
    /// Creates an unbound channel at generation zero.
    pub fn new(transport: TransportId) -> Self {
        Self {
            transport,
            state: RwLock::new(ChannelState {
                guard: GenerationGuard::new(),
                binding: None,
            }),
        }
    }

    /// Transport this channel belongs to.
    pub fn transport(&self) -> TransportId {
        self.transport
    }

    /// Installs a new handle pair, fully superseding any previous binding.
    /// Returns the generation of the new binding.
    pub fn bind(
        &self,
        version: ProtocolVersion,
        response: Arc<dyn ResponseSink>,
        indication: Arc<dyn IndicationSink>,
    ) -> Generation {
        let (generation, previous) = {
            let mut state = self.state.write();
            let previous = state.binding.replace(Binding {
                version,
                response,
                indication,
            });
            (state.guard.advance(), previous)
        };
        debug!(
            "channel::bind {} version={version} generation={} rebind={}",
            self.transport,
            generation.0,
            previous.is_some()
        );
        generation
    }

    /// Clears the binding if no bind happened since `observed` was read.
    ///
    /// Returns `true` when this call tore the binding down, `false` when a
    /// newer binding already superseded the failed one (or the channel was
    /// already unbound at that generation).
    pub fn invalidate_if_stale(&self, observed: Generation) -> bool {
        self.invalidate_if_stale_with(observed, |_| ()).is_some()
    }

    /// Like [`invalidate_if_stale`](Self::invalidate_if_stale), but runs
    /// `on_cleared` with the new generation while the write lock is still
    /// held. No bind and no reader can observe the channel between the
    /// teardown and `on_cleared`.
    pub fn invalidate_if_stale_with<R>(
        &self,
        observed: Generation,
        on_cleared: impl FnOnce(Generation) -> R,
    ) -> Option<R> {
        let cleared = {
            let mut state = self.state.write();
            if !state.guard.is_current(observed) {
                None
            } else {
                match state.binding.take() {
                    Some(binding) => {
                        let generation = state.guard.advance();
                        Some((binding, on_cleared(generation)))
                    }
                    None => None,
                }
            }
        };
        match cleared {
            Some((binding, outcome)) => {
                warn!(
                    "channel::invalidate {} version={} observed_generation={}",
                    self.transport, binding.version, observed.0
                );
                Some(outcome)
            }
            None => {
                debug!(
                    "channel::invalidate {} skipped, generation {} superseded",
                    self.transport, observed.0
                );
                None
            }
        }
    }

    /// Unconditionally clears the binding. Returns the new generation when a
    /// binding was present.
    pub fn unbind(&self) -> Option<Generation> {
        self.unbind_with(|generation| generation)
    }

    /// Clears the binding and runs `on_cleared` under the write lock. It
    /// receives the new generation, or `None` when nothing was bound.
    pub fn unbind_with<R>(&self, on_cleared: impl FnOnce(Option<Generation>) -> R) -> R {
        let (outcome, previous) = {
            let mut state = self.state.write();
            let previous = state.binding.take();
            let generation = previous.as_ref().map(|_| state.guard.advance());
            (on_cleared(generation), previous)
        };
        if let Some(previous) = previous {
            debug!(
                "channel::unbind {} version={}",
                self.transport, previous.version
            );
        }
        outcome
    }

    /// Runs `f` under shared access with a consistent view of the binding.
    ///
    /// `f` must not call into the client handles or back into this channel:
    /// a writer queued behind the lock would block a nested reader.
    pub fn with_read_access<R>(&self, f: impl FnOnce(ChannelView<'_>) -> R) -> R {
        let state = self.state.read();
        f(ChannelView {
            generation: state.guard.current(),
            binding: state.binding.as_ref(),
        })
    }

    /// Clones the current binding out of the lock together with the
    /// generation it belongs to. Client handles are called through the
    /// clone, so a handle may re-enter the relay freely.
    pub fn current_binding(&self) -> Option<(Generation, Binding)> {
        let state = self.state.read();
        let binding = state.binding.clone()?;
        Some((state.guard.current(), binding))
    }

    /// Current generation and version, or `None` while unbound.
    pub fn snapshot(&self) -> Option<BindingSnapshot> {
        self.with_read_access(|view| view.snapshot())
    }

    /// Current generation.
    pub fn generation(&self) -> Generation {
        self.state.read().guard.current()
    }

    /// Whether a client is currently bound.
    pub fn is_bound(&self) -> bool {
        self.state.read().binding.is_some()
    }
}

impl fmt::Debug for ResponseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("ResponseChannel")
            .field("transport", &self.transport)
            .field("generation", &state.guard.current())
            .field("binding", &state.binding)
            .finish()
    }
}

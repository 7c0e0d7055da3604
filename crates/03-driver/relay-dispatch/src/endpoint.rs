use std::fmt;
use std::sync::Arc;

use log::{debug, error, trace, warn};
use pending_registry::{
    LaneStats, PendingInfo, PendingRequest, PendingRequestRegistry, RegistryError,
};
use relay_abi::{
    Args, Backend, CompletionSink, ErrorClass, Generation, Indication, IndicationKind,
    IndicationSink, KindCatalog, ProtocolVersion, ReleaseFn, RemoteGone, RequestKind, Response,
    ResponseBody, ResponseSink, Serial, Status, SubmitError, Token, TransportId,
};
use relay_codec::{marshal, CodecError};
use response_channel::{Admission, ResponseChannel, Selection, VersionedResponseSelector};

use crate::config::SurfaceConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::stats::{DispatchStats, DispatchStatsSnapshot, LifecycleObserver, Terminal};

/// One client-facing transport: its response channel, its registry lane, and
/// the dispatch and completion paths that connect them to the backing system.
pub struct TransportEndpoint {
    transport: TransportId,
    config: SurfaceConfig,
    channel: ResponseChannel,
    registry: Arc<PendingRequestRegistry>,
    selector: VersionedResponseSelector,
    backend: Arc<dyn Backend>,
    stats: Arc<DispatchStats>,
    observer: Option<Arc<dyn LifecycleObserver>>,
}

impl TransportEndpoint {
    /// Creates an unbound endpoint and opens its registry lane.
    pub fn new(
        transport: TransportId,
        config: SurfaceConfig,
        registry: Arc<PendingRequestRegistry>,
        catalog: Arc<KindCatalog>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        registry.open_lane(transport, config.lane_config());
        Self {
            transport,
            config,
            channel: ResponseChannel::new(transport),
            registry,
            selector: VersionedResponseSelector::new(catalog),
            backend,
            stats: Arc::new(DispatchStats::default()),
            observer: None,
        }
    }

    /// Installs a lifecycle observer.
    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Transport id.
    pub fn transport(&self) -> TransportId {
        self.transport
    }

    /// Surface options in effect.
    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    /// Response channel of this transport.
    pub fn channel(&self) -> &ResponseChannel {
        &self.channel
    }

    /// Counter snapshot.
    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Registry occupancy for this transport.
    pub fn lane_stats(&self) -> LaneStats {
        self.registry.lane_stats(self.transport)
    }

    /// Looks up a live request by serial.
    pub fn find_pending(&self, serial: Serial) -> Option<PendingInfo> {
        self.registry.find_by_serial(self.transport, serial)
    }

    /// Binds a client. Requests already in flight stay in flight and are
    /// answered through the new handles.
    pub fn bind(
        &self,
        version: ProtocolVersion,
        response: Arc<dyn ResponseSink>,
        indication: Arc<dyn IndicationSink>,
    ) -> Generation {
        self.channel.bind(version, response, indication)
    }

    /// Tears the binding down and fails every request dispatched under it.
    /// Returns the number of requests failed.
    pub fn unbind(&self) -> usize {
        let abandoned = self.channel.unbind_with(|cleared| {
            cleared.map(|generation| self.registry.abandon_before(self.transport, generation))
        });
        abandoned.map_or(0, |abandoned| self.fail_abandoned(abandoned))
    }

    /// Tears the binding down if it is still the one observed at
    /// `observed`, failing requests dispatched under it or earlier.
    ///
    /// The affected requests leave the registry before the write lock is
    /// released, so neither a rebind nor a racing completion can still
    /// deliver them.
    pub fn invalidate_if_stale(&self, observed: Generation) -> bool {
        let abandoned = self.channel.invalidate_if_stale_with(observed, |cleared| {
            self.registry.abandon_before(self.transport, cleared)
        });
        match abandoned {
            Some(abandoned) => {
                self.fail_abandoned(abandoned);
                true
            }
            None => false,
        }
    }

    /// Unbinds and fails every request still pending on this transport.
    pub fn shutdown(&self) -> usize {
        let abandoned = self
            .channel
            .unbind_with(|_| self.registry.abandon_all(self.transport));
        self.fail_abandoned(abandoned)
    }

    /// Validates, registers, marshals, and submits one request.
    ///
    /// Never waits for completion. Every call reaches exactly one terminal
    /// state: a delivered or synthesized response, a policy drop, or a
    /// refusal reported only through the returned error.
    pub fn dispatch(&self, serial: Serial, kind: RequestKind, args: &Args) -> DispatchResult<()> {
        self.stats.dispatched();
        let result = self.try_dispatch(serial, kind, args);
        if let Err(err) = &result {
            debug!(
                "endpoint::dispatch {} serial={serial} kind={}: {err}",
                self.transport, kind.0
            );
        }
        result
    }

    fn try_dispatch(&self, serial: Serial, kind: RequestKind, args: &Args) -> DispatchResult<()> {
        let Some(spec) = self.selector.catalog().request(kind).copied() else {
            return Err(self.reject(serial, kind, DispatchError::UnknownKind(kind)));
        };
        if !spec.args.accepts(args) {
            return Err(self.reject(serial, kind, DispatchError::MalformedArgument(spec.name)));
        }

        // Registration happens under the read lock so a concurrent
        // invalidation either sees this request or rejects it here.
        let registered = self.channel.with_read_access(|view| {
            let snapshot = view
                .snapshot()
                .ok_or(DispatchError::ChannelGone(self.transport))?;
            if self.selector.admit(kind, snapshot.version) == Admission::Reject {
                return Err(DispatchError::UnsupportedForProtocolVersion {
                    kind: spec.name,
                    required: spec.min_version(),
                    bound: snapshot.version,
                });
            }
            Ok(self.registry.register(self.transport, serial, kind, snapshot)?)
        });
        let token = match registered {
            Ok(token) => token,
            Err(err) => return Err(self.reject(serial, kind, err)),
        };

        let payload = match marshal(spec.args, args, &self.config.marshal_options()) {
            Ok(payload) => payload.with_release(self.release_hook(token)),
            Err(err) => return Err(self.fail_registered(token, kind, codec_error(err, spec.name))),
        };
        trace!(
            "endpoint::dispatch {} serial={serial} {} bytes={}",
            self.transport,
            spec.name,
            payload.len()
        );

        match self.backend.submit(kind, payload.as_bytes(), token) {
            Ok(()) => {
                self.stats.submitted();
                if let Err(payload) = self.registry.attach(token, payload) {
                    // Completed before submit returned.
                    payload.release();
                }
                Ok(())
            }
            Err(err) => {
                payload.release();
                let err = match err {
                    SubmitError::AllocationFailed => DispatchError::AllocationFailed,
                    SubmitError::Closed => DispatchError::BackendClosed,
                };
                Err(self.fail_registered(token, kind, err))
            }
        }
    }

    /// Routes a backing completion to the bound client.
    pub fn complete(&self, token: Token, status: Status, result: Vec<u8>) {
        let mut request = match self.registry.complete(token) {
            Ok(request) => request,
            Err(RegistryError::Abandoned(_)) => {
                self.stats.late_completion();
                return;
            }
            Err(_) => {
                self.stats.double_completion();
                return;
            }
        };
        request.release_payload();
        let serial = request.serial;
        let kind = request.kind;
        let dispatched = request.version();
        drop(request);

        let Some((observed, binding)) = self.channel.current_binding() else {
            self.finish(serial, Terminal::Failed(ErrorClass::ChannelGone));
            return;
        };
        let (response, terminal) = match self.selector.response(kind, dispatched, binding.version)
        {
            Selection::Deliver(revision) => (
                Response {
                    serial,
                    kind,
                    status,
                    body: response_body(revision, status, result),
                },
                Terminal::Delivered(status),
            ),
            Selection::Fail => (
                Response::failure(serial, kind, Status::RequestNotSupported),
                Terminal::Failed(ErrorClass::UnsupportedForProtocolVersion),
            ),
            Selection::Drop => {
                debug!(
                    "endpoint::complete {} serial={serial} dropped for {}",
                    self.transport, binding.version
                );
                self.finish(serial, Terminal::Dropped);
                return;
            }
        };
        let delivered = binding.response.on_response(&response);
        drop(binding);
        match delivered {
            Ok(()) => self.finish(serial, terminal),
            Err(RemoteGone) => {
                self.finish(serial, Terminal::Failed(ErrorClass::ChannelGone));
                self.invalidate_if_stale(observed);
            }
        }
    }

    /// Routes an unsolicited event to the bound client.
    pub fn indicate(&self, kind: IndicationKind, payload: Vec<u8>) {
        if !self.config.indications_enabled {
            self.stats.indication(false);
            trace!(
                "endpoint::indicate {} kind={} disabled on {}",
                self.transport,
                kind.0,
                self.config.name
            );
            return;
        }
        let (delivered, lost) = match self.channel.current_binding() {
            None => (false, None),
            Some((observed, binding)) => match self.selector.indication(kind, binding.version) {
                Selection::Deliver(revision) => {
                    let indication = Indication {
                        kind,
                        revision,
                        payload,
                    };
                    match binding.indication.on_indication(&indication) {
                        Ok(()) => (true, None),
                        Err(RemoteGone) => (false, Some(observed)),
                    }
                }
                Selection::Drop | Selection::Fail => (false, None),
            },
        };
        self.stats.indication(delivered);
        if !delivered {
            debug!("endpoint::indicate {} kind={} dropped", self.transport, kind.0);
        }
        if let Some(observed) = lost {
            self.invalidate_if_stale(observed);
        }
    }

    fn reject(&self, serial: Serial, kind: RequestKind, err: DispatchError) -> DispatchError {
        // A live request already owns this serial's one response.
        if err.synthesizes_response() && self.find_pending(serial).is_none() {
            self.synthesize(serial, kind, err.class());
        } else {
            self.finish(serial, Terminal::Refused(err.class()));
        }
        err
    }

    fn fail_registered(
        &self,
        token: Token,
        kind: RequestKind,
        err: DispatchError,
    ) -> DispatchError {
        match self.registry.complete(token) {
            Ok(request) => {
                drop(request);
                self.synthesize(token.serial, kind, err.class());
            }
            // Channel loss already failed this request.
            Err(RegistryError::Abandoned(_)) => {}
            Err(_) => self.stats.double_completion(),
        }
        err
    }

    fn synthesize(&self, serial: Serial, kind: RequestKind, class: ErrorClass) {
        let response = Response::failure(serial, kind, class.status());
        let (sent, lost) = match self.channel.current_binding() {
            None => (false, None),
            Some((observed, binding)) => match binding.response.on_response(&response) {
                Ok(()) => (true, None),
                Err(RemoteGone) => (false, Some(observed)),
            },
        };
        trace!(
            "endpoint::synthesize {} serial={serial} {:?} sent={sent}",
            self.transport,
            response.status
        );
        self.finish(serial, Terminal::Failed(class));
        if let Some(observed) = lost {
            self.invalidate_if_stale(observed);
        }
    }

    fn fail_abandoned(&self, abandoned: impl IntoIterator<Item = PendingRequest>) -> usize {
        let mut count = 0;
        for mut request in abandoned {
            request.release_payload();
            self.finish(request.serial, Terminal::Failed(ErrorClass::ChannelGone));
            count += 1;
        }
        if count > 0 {
            warn!(
                "endpoint::channel_lost {} failed {count} pending requests",
                self.transport
            );
        }
        count
    }

    fn finish(&self, serial: Serial, terminal: Terminal) {
        self.stats.record(terminal);
        if let Some(observer) = &self.observer {
            observer.on_terminal(self.transport, serial, terminal);
        }
    }

    fn release_hook(&self, token: Token) -> ReleaseFn {
        let stats = Arc::clone(&self.stats);
        let observer = self.observer.clone();
        Box::new(move |released| {
            stats.released();
            if let Some(observer) = observer {
                observer.on_release(token, released);
            }
        })
    }
}

impl CompletionSink for TransportEndpoint {
    fn complete(&self, token: Token, status: Status, result: Vec<u8>) {
        if token.transport != self.transport {
            error!(
                "endpoint::complete {} received token for {}",
                self.transport, token.transport
            );
            return;
        }
        TransportEndpoint::complete(self, token, status, result);
    }

    fn indicate(&self, transport: TransportId, kind: IndicationKind, payload: Vec<u8>) {
        if transport != self.transport {
            error!(
                "endpoint::indicate {} received indication for {transport}",
                self.transport
            );
            return;
        }
        TransportEndpoint::indicate(self, kind, payload);
    }
}

impl fmt::Debug for TransportEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEndpoint")
            .field("transport", &self.transport)
            .field("surface", &self.config.name)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

fn response_body(revision: ProtocolVersion, status: Status, payload: Vec<u8>) -> ResponseBody {
    if payload.is_empty() && !status.is_success() {
        ResponseBody::Empty
    } else {
        ResponseBody::Shaped { revision, payload }
    }
}

fn codec_error(err: CodecError, kind: &'static str) -> DispatchError {
    match err {
        CodecError::AllocationFailed { .. } => DispatchError::AllocationFailed,
        CodecError::Truncated { index, .. } => DispatchError::MarshallingTruncated { index },
        CodecError::ShapeMismatch | CodecError::Malformed { .. } => {
            DispatchError::MalformedArgument(kind)
        }
    }
}

//! Multi-transport relay hub.
//!
//! Owns one [`TransportEndpoint`] per client-facing transport, the shared
//! [`PendingRequestRegistry`], and the backing system. The hub is also the
//! [`CompletionSink`] the backing system reports to; completions are routed by
//! the transport carried in their token.

#![deny(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use arc_swap::ArcSwap;
use log::{debug, error};
use parking_lot::Mutex;
use pending_registry::PendingRequestRegistry;
use relay_abi::{
    Args, Backend, CompletionSink, Generation, IndicationKind, IndicationSink, KindCatalog,
    ProtocolVersion, RequestKind, ResponseSink, Serial, Status, Token, TransportId,
};
pub use relay_dispatch::{
    DispatchError, DispatchResult, DispatchStatsSnapshot, LifecycleObserver, SurfaceConfig,
    Terminal, TransportEndpoint,
};
use thiserror::Error;

type EndpointTable = HashMap<TransportId, Arc<TransportEndpoint>>;

/// Errors from hub-level transport management.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum HubError {
    /// No endpoint exists for the transport.
    #[error("unknown {0}")]
    UnknownTransport(TransportId),
    /// An endpoint already exists for the transport.
    #[error("{0} already exists")]
    DuplicateTransport(TransportId),
}

/// Routes requests, completions, and indications across transports.
pub struct RelayHub {
    registry: Arc<PendingRequestRegistry>,
    catalog: Arc<KindCatalog>,
    backend: Arc<dyn Backend>,
    default_surface: SurfaceConfig,
    observer: Option<Arc<dyn LifecycleObserver>>,
    endpoints: ArcSwap<EndpointTable>,
    add_lock: Mutex<()>,
}

impl RelayHub {
    /// Creates a new builder.
    pub fn builder() -> RelayHubBuilder {
        RelayHubBuilder::new()
    }

    /// Creates an endpoint for `transport`. Uses the hub's default surface
    /// when `surface` is `None`.
    pub fn add_transport(
        &self,
        transport: TransportId,
        surface: Option<SurfaceConfig>,
    ) -> Result<Arc<TransportEndpoint>, HubError> {
        let _guard = self.add_lock.lock();
        if self.endpoints.load().contains_key(&transport) {
            return Err(HubError::DuplicateTransport(transport));
        }
        let surface = surface.unwrap_or_else(|| self.default_surface.clone());
        debug!("hub::add_transport {transport} surface={}", surface.name);
        let mut endpoint = TransportEndpoint::new(
            transport,
            surface,
            Arc::clone(&self.registry),
            Arc::clone(&self.catalog),
            Arc::clone(&self.backend),
        );
        if let Some(observer) = &self.observer {
            endpoint = endpoint.with_observer(Arc::clone(observer));
        }
        let endpoint = Arc::new(endpoint);
        let mut table = EndpointTable::clone(&self.endpoints.load());
        table.insert(transport, Arc::clone(&endpoint));
        self.endpoints.store(Arc::new(table));
        Ok(endpoint)
    }

    /// Endpoint for `transport`.
    pub fn transport(&self, transport: TransportId) -> Option<Arc<TransportEndpoint>> {
        self.endpoints.load().get(&transport).cloned()
    }

    /// Known transports, in ascending order.
    pub fn transports(&self) -> Vec<TransportId> {
        let mut ids: Vec<_> = self.endpoints.load().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Dispatches on `transport`. An unknown transport has no channel and is
    /// reported as [`DispatchError::ChannelGone`].
    pub fn dispatch(
        &self,
        serial: Serial,
        transport: TransportId,
        kind: RequestKind,
        args: &Args,
    ) -> DispatchResult<()> {
        match self.transport(transport) {
            Some(endpoint) => endpoint.dispatch(serial, kind, args),
            None => Err(DispatchError::ChannelGone(transport)),
        }
    }

    /// Binds a client on `transport`.
    pub fn bind(
        &self,
        transport: TransportId,
        version: ProtocolVersion,
        response: Arc<dyn ResponseSink>,
        indication: Arc<dyn IndicationSink>,
    ) -> Result<Generation, HubError> {
        let endpoint = self
            .transport(transport)
            .ok_or(HubError::UnknownTransport(transport))?;
        Ok(endpoint.bind(version, response, indication))
    }

    /// Client death notice for `transport`. Returns the number of requests
    /// failed.
    pub fn unbind(&self, transport: TransportId) -> Result<usize, HubError> {
        let endpoint = self
            .transport(transport)
            .ok_or(HubError::UnknownTransport(transport))?;
        Ok(endpoint.unbind())
    }

    /// Counters for `transport`.
    pub fn stats(&self, transport: TransportId) -> Option<DispatchStatsSnapshot> {
        self.transport(transport).map(|endpoint| endpoint.stats())
    }

    /// Unbinds every transport and fails everything still pending. Returns
    /// the number of requests failed.
    pub fn shutdown(&self) -> usize {
        let failed: usize = self
            .endpoints
            .load()
            .values()
            .map(|endpoint| endpoint.shutdown())
            .sum();
        debug!("hub::shutdown failed {failed} pending requests");
        failed
    }
}

impl CompletionSink for RelayHub {
    fn complete(&self, token: Token, status: Status, result: Vec<u8>) {
        match self.transport(token.transport) {
            Some(endpoint) => endpoint.complete(token, status, result),
            None => error!("hub::complete no endpoint for {token:?}"),
        }
    }

    fn indicate(&self, transport: TransportId, kind: IndicationKind, payload: Vec<u8>) {
        match self.transport(transport) {
            Some(endpoint) => endpoint.indicate(kind, payload),
            None => debug!("hub::indicate no endpoint for {transport}"),
        }
    }
}

/// Builder for [`RelayHub`].
pub struct RelayHubBuilder {
    backend: Option<Arc<dyn Backend>>,
    catalog: Option<Arc<KindCatalog>>,
    registry: Option<Arc<PendingRequestRegistry>>,
    default_surface: SurfaceConfig,
    observer: Option<Arc<dyn LifecycleObserver>>,
    transports: Vec<(TransportId, Option<SurfaceConfig>)>,
}

impl RelayHubBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            backend: None,
            catalog: None,
            registry: None,
            default_surface: SurfaceConfig::base(),
            observer: None,
            transports: Vec::new(),
        }
    }

    /// Sets the backing system.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the kind catalog.
    pub fn catalog(mut self, catalog: KindCatalog) -> Self {
        self.catalog = Some(Arc::new(catalog));
        self
    }

    /// Shares an existing registry instead of creating one.
    pub fn registry(mut self, registry: Arc<PendingRequestRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Surface used by transports added without explicit options.
    pub fn default_surface(mut self, surface: SurfaceConfig) -> Self {
        self.default_surface = surface;
        self
    }

    /// Installs a lifecycle observer on every endpoint.
    pub fn observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Adds a transport at build time.
    pub fn transport(mut self, transport: TransportId, surface: Option<SurfaceConfig>) -> Self {
        self.transports.push((transport, surface));
        self
    }

    /// Builds the hub, returning an error if the backend or catalog is missing
    /// or a transport is declared twice.
    pub fn build(self) -> Result<Arc<RelayHub>> {
        let hub = Arc::new(RelayHub {
            registry: self.registry.unwrap_or_default(),
            catalog: self.catalog.ok_or_else(|| anyhow!("missing kind catalog"))?,
            backend: self.backend.ok_or_else(|| anyhow!("missing backing system"))?,
            default_surface: self.default_surface,
            observer: self.observer,
            endpoints: ArcSwap::from_pointee(HashMap::new()),
            add_lock: Mutex::new(()),
        });
        for (transport, surface) in self.transports {
            if hub.add_transport(transport, surface).is_err() {
                bail!("{transport} declared twice");
            }
        }
        Ok(hub)
    }
}

impl Default for RelayHubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

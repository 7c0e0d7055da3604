//! Shared clients, observers, and hub assembly for the scenarios.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use relay_abi::{
    kinds, Indication, IndicationSink, ProtocolVersion, Released, RemoteGone, Response,
    ResponseSink, Serial, Token, TransportId,
};
use relay_hub::{LifecycleObserver, RelayHub, SurfaceConfig, Terminal};
use relay_native::{echo_responder, Job, NativeBackend, NativeBackendBuilder, Responder};

/// Client that records everything it receives and can simulate death.
#[derive(Default)]
pub struct TestClient {
    responses: Mutex<Vec<Response>>,
    indications: Mutex<Vec<Indication>>,
    gone: AtomicBool,
}

impl TestClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn responses(&self) -> Vec<Response> {
        self.responses.lock().clone()
    }

    pub fn indications(&self) -> Vec<Indication> {
        self.indications.lock().clone()
    }

    pub fn die(&self) {
        self.gone.store(true, Ordering::SeqCst);
    }
}

impl ResponseSink for TestClient {
    fn on_response(&self, response: &Response) -> Result<(), RemoteGone> {
        if self.gone.load(Ordering::SeqCst) {
            return Err(RemoteGone);
        }
        self.responses.lock().push(response.clone());
        Ok(())
    }
}

impl IndicationSink for TestClient {
    fn on_indication(&self, indication: &Indication) -> Result<(), RemoteGone> {
        if self.gone.load(Ordering::SeqCst) {
            return Err(RemoteGone);
        }
        self.indications.lock().push(indication.clone());
        Ok(())
    }
}

/// Counts terminal states and releases per request.
#[derive(Default)]
pub struct Ledger {
    terminals: Mutex<HashMap<(TransportId, Serial), Vec<Terminal>>>,
    releases: Mutex<HashMap<Token, Vec<Released>>>,
}

impl Ledger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn terminals(&self, transport: TransportId, serial: Serial) -> Vec<Terminal> {
        self.terminals
            .lock()
            .get(&(transport, serial))
            .cloned()
            .unwrap_or_default()
    }

    pub fn terminal_count(&self) -> usize {
        self.terminals.lock().values().map(Vec::len).sum()
    }

    pub fn release_count(&self) -> usize {
        self.releases.lock().values().map(Vec::len).sum()
    }

    pub fn releases_for(&self, transport: TransportId, serial: Serial) -> Vec<Released> {
        self.releases
            .lock()
            .iter()
            .filter(|(token, _)| token.transport == transport && token.serial == serial)
            .flat_map(|(_, released)| released.iter().copied())
            .collect()
    }

    /// Tokens released more than once.
    pub fn double_releases(&self) -> Vec<Token> {
        self.releases
            .lock()
            .iter()
            .filter(|(_, released)| released.len() > 1)
            .map(|(token, _)| *token)
            .collect()
    }
}

impl LifecycleObserver for Ledger {
    fn on_terminal(&self, transport: TransportId, serial: Serial, terminal: Terminal) {
        self.terminals
            .lock()
            .entry((transport, serial))
            .or_default()
            .push(terminal);
    }

    fn on_release(&self, token: Token, released: Released) {
        self.releases.lock().entry(token).or_default().push(released);
    }
}

pub struct Harness {
    pub hub: Arc<RelayHub>,
    pub backend: Arc<NativeBackend>,
    pub ledger: Arc<Ledger>,
}

impl Harness {
    /// Hub over `transports` base-surface transports and a started backend.
    pub fn start(transports: u16, backend: NativeBackendBuilder) -> Self {
        Self::start_with(transports, SurfaceConfig::base(), backend)
    }

    pub fn start_with(
        transports: u16,
        surface: SurfaceConfig,
        backend: NativeBackendBuilder,
    ) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = backend.build();
        let ledger = Ledger::new();
        let mut builder = RelayHub::builder()
            .backend(backend.clone())
            .catalog(kinds::standard().expect("catalog"))
            .default_surface(surface)
            .observer(ledger.clone());
        for id in 0..transports {
            builder = builder.transport(TransportId(id), None);
        }
        let hub = builder.build().expect("hub");
        backend.start(hub.clone()).expect("start workers");
        Self {
            hub,
            backend,
            ledger,
        }
    }

    pub fn bind(&self, transport: TransportId, version: ProtocolVersion) -> Arc<TestClient> {
        let client = TestClient::new();
        self.hub
            .bind(transport, version, client.clone(), client.clone())
            .expect("bind");
        client
    }

    /// Drains the backend and fails whatever is still pending.
    pub fn stop(&self) {
        self.backend.shutdown();
        self.hub.shutdown();
    }
}

/// Echo responder that waits for one token on `gate` per job. A closed gate
/// lets every job through.
pub fn gated(gate: Receiver<()>) -> Responder {
    let echo = echo_responder();
    Arc::new(move |job: &Job| {
        let _ = gate.recv();
        echo(job)
    })
}

pub fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::yield_now();
    }
}

//! Threaded in-process backing system.
//!
//! Accepted submissions are copied into a bounded queue and answered by a
//! pool of worker threads through a [`CompletionSink`]. Used by integration
//! tests and demos in place of a vendor library; the responder and admission
//! hooks let a test script outcomes and inject allocation failures.

#![deny(missing_docs)]

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use relay_abi::{
    Backend, CompletionSink, IndicationKind, KindCatalog, RequestKind, Status, SubmitError, Token,
    TransportId,
};
use relay_codec::{marshal, unmarshal, MarshalOptions};

/// One accepted submission as seen by a worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    /// Request kind.
    pub kind: RequestKind,
    /// Correlation token to complete.
    pub token: Token,
    /// Copy of the marshalled request.
    pub payload: Vec<u8>,
}

/// Produces the completion for a job.
pub type Responder = Arc<dyn Fn(&Job) -> (Status, Vec<u8>) + Send + Sync>;

/// Decides synchronously whether a submission is accepted.
pub type AdmissionFn = Arc<dyn Fn(RequestKind, &[u8]) -> Result<(), SubmitError> + Send + Sync>;

/// Worker pool sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeBackendConfig {
    /// Worker threads.
    pub workers: usize,
    /// Submissions queued before `submit` reports allocation failure.
    pub queue_depth: usize,
}

impl Default for NativeBackendConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_depth: 256,
        }
    }
}

enum Message {
    Request(Job),
    Indication {
        transport: TransportId,
        kind: IndicationKind,
        payload: Vec<u8>,
    },
}

/// In-process backing system answered by worker threads.
pub struct NativeBackend {
    config: NativeBackendConfig,
    tx: Mutex<Option<Sender<Message>>>,
    rx: Receiver<Message>,
    responder: Responder,
    admission: Option<AdmissionFn>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl NativeBackend {
    /// Creates a new builder.
    pub fn builder() -> NativeBackendBuilder {
        NativeBackendBuilder::new()
    }

    /// Spawns the worker pool. Completions and indications go to `sink`.
    /// Submissions accepted before this call wait in the queue.
    pub fn start(&self, sink: Arc<dyn CompletionSink>) -> std::io::Result<()> {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            warn!("native::start called twice; ignoring");
            return Ok(());
        }
        for index in 0..self.config.workers.max(1) {
            let rx = self.rx.clone();
            let sink = Arc::clone(&sink);
            let responder = Arc::clone(&self.responder);
            let handle = thread::Builder::new()
                .name(format!("relay-native-{index}"))
                .spawn(move || worker_loop(rx, sink, responder))?;
            workers.push(handle);
        }
        debug!("native::start workers={}", workers.len());
        Ok(())
    }

    /// Queues an unsolicited event for `transport`.
    pub fn inject_indication(
        &self,
        transport: TransportId,
        kind: IndicationKind,
        payload: Vec<u8>,
    ) -> Result<(), SubmitError> {
        self.enqueue(Message::Indication {
            transport,
            kind,
            payload,
        })
    }

    /// Submissions waiting for a worker.
    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    /// Stops accepting work, lets the workers drain the queue, and joins them.
    pub fn shutdown(&self) {
        drop(self.tx.lock().take());
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let count = workers.len();
        for handle in workers {
            if handle.join().is_err() {
                warn!("native::shutdown worker panicked");
            }
        }
        debug!("native::shutdown joined {count} workers");
    }

    fn enqueue(&self, message: Message) -> Result<(), SubmitError> {
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            return Err(SubmitError::Closed);
        };
        match tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SubmitError::AllocationFailed),
            Err(TrySendError::Disconnected(_)) => Err(SubmitError::Closed),
        }
    }
}

impl Backend for NativeBackend {
    fn submit(&self, kind: RequestKind, payload: &[u8], token: Token) -> Result<(), SubmitError> {
        if let Some(admission) = &self.admission {
            admission(kind, payload)?;
        }
        trace!("native::submit {token:?} kind={} bytes={}", kind.0, payload.len());
        self.enqueue(Message::Request(Job {
            kind,
            token,
            payload: payload.to_vec(),
        }))
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        // Workers exit once the queue disconnects; they are not joined here
        // because the last reference may be dropped on a worker thread.
        self.tx.get_mut().take();
    }
}

impl fmt::Debug for NativeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBackend")
            .field("config", &self.config)
            .field("queued", &self.rx.len())
            .finish_non_exhaustive()
    }
}

fn worker_loop(rx: Receiver<Message>, sink: Arc<dyn CompletionSink>, responder: Responder) {
    for message in rx.iter() {
        match message {
            Message::Request(job) => {
                let (status, result) = responder(&job);
                sink.complete(job.token, status, result);
            }
            Message::Indication {
                transport,
                kind,
                payload,
            } => sink.indicate(transport, kind, payload),
        }
    }
}

/// Answers every job with `Success` and the request bytes.
pub fn echo_responder() -> Responder {
    Arc::new(|job: &Job| (Status::Success, job.payload.clone()))
}

/// Decodes each request with the shape declared in `catalog` and answers with
/// the re-encoded arguments, or `InvalidArguments` when decoding fails.
pub fn decoding_responder(catalog: Arc<KindCatalog>) -> Responder {
    Arc::new(move |job: &Job| {
        let Some(spec) = catalog.request(job.kind) else {
            return (Status::RequestNotSupported, Vec::new());
        };
        let decoded = unmarshal(spec.args, &job.payload)
            .and_then(|args| marshal(spec.args, &args, &MarshalOptions::default()));
        match decoded {
            Ok(payload) => (Status::Success, payload.as_bytes().to_vec()),
            Err(err) => {
                warn!("native::decode {:?}: {err}", job.token);
                (Status::InvalidArguments, Vec::new())
            }
        }
    })
}

/// Builder for [`NativeBackend`].
pub struct NativeBackendBuilder {
    config: NativeBackendConfig,
    responder: Option<Responder>,
    admission: Option<AdmissionFn>,
}

impl NativeBackendBuilder {
    /// Creates a builder with default sizing and the echo responder.
    pub fn new() -> Self {
        Self {
            config: NativeBackendConfig::default(),
            responder: None,
            admission: None,
        }
    }

    /// Replaces the sizing.
    pub fn config(mut self, config: NativeBackendConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of worker threads.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Queue depth.
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.config.queue_depth = depth;
        self
    }

    /// Sets the responder.
    pub fn responder(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Sets the admission hook.
    pub fn admission(mut self, admission: AdmissionFn) -> Self {
        self.admission = Some(admission);
        self
    }

    /// Builds the backend. Workers start with [`NativeBackend::start`].
    pub fn build(self) -> Arc<NativeBackend> {
        let (tx, rx) = bounded(self.config.queue_depth.max(1));
        Arc::new(NativeBackend {
            config: self.config,
            tx: Mutex::new(Some(tx)),
            rx,
            responder: self.responder.unwrap_or_else(echo_responder),
            admission: self.admission,
            workers: Mutex::new(Vec::new()),
        })
    }
}

impl Default for NativeBackendBuilder {
    fn default() -> Self {
        Self::new()
    }
}

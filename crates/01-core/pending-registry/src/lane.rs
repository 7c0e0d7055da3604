//! Per-transport lane holding live and abandoned requests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use relay_abi::{
    BindingSnapshot, Generation, OwnedPayload, ProtocolVersion, RequestKind, Serial, Ticket,
    Token, TransportId,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{RegistryError, RegistryResult};

/// Capacity limits for one transport's lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneConfig {
    /// Maximum number of live requests; registration beyond it is exhaustion.
    pub max_in_flight: usize,
    /// How many abandoned tickets to remember for late-completion detection.
    pub max_abandoned: usize,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 512,
            max_abandoned: 1024,
        }
    }
}

/// One in-flight request. Owns the marshalled payload once submission has
/// handed it over; dropping the request releases the payload.
#[derive(Debug)]
pub struct PendingRequest {
    /// Caller-chosen serial.
    pub serial: Serial,
    /// Transport the request belongs to.
    pub transport: TransportId,
    /// Kind of the request.
    pub kind: RequestKind,
    /// Registration ticket.
    pub ticket: Ticket,
    /// Binding observed at dispatch time.
    pub snapshot: BindingSnapshot,
    /// Registration instant.
    pub created_at: Instant,
    payload: Option<OwnedPayload>,
}

impl PendingRequest {
    /// Correlation token for this request.
    pub fn token(&self) -> Token {
        Token {
            transport: self.transport,
            serial: self.serial,
            ticket: self.ticket,
        }
    }

    /// Protocol version captured at dispatch.
    pub fn version(&self) -> ProtocolVersion {
        self.snapshot.version
    }

    /// Time since registration.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Length of the owned payload, if one has been attached.
    pub fn payload_len(&self) -> Option<usize> {
        self.payload.as_ref().map(OwnedPayload::len)
    }

    /// Releases the owned payload now. A no-op when none is attached.
    pub fn release_payload(&mut self) {
        if let Some(payload) = self.payload.take() {
            payload.release();
        }
    }

    fn info(&self) -> PendingInfo {
        PendingInfo {
            token: self.token(),
            kind: self.kind,
            snapshot: self.snapshot,
            created_at: self.created_at,
            payload_len: self.payload_len(),
        }
    }
}

/// Read-only copy of a pending request's bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingInfo {
    /// Correlation token.
    pub token: Token,
    /// Kind of the request.
    pub kind: RequestKind,
    /// Binding observed at dispatch time.
    pub snapshot: BindingSnapshot,
    /// Registration instant.
    pub created_at: Instant,
    /// Length of the owned payload, if attached.
    pub payload_len: Option<usize>,
}

pub(crate) struct Lane {
    transport: TransportId,
    config: LaneConfig,
    next_ticket: Ticket,
    live: HashMap<Serial, PendingRequest>,
    abandoned: HashSet<Ticket>,
    abandoned_order: VecDeque<Ticket>,
}

impl Lane {
    pub(crate) fn new(transport: TransportId, config: LaneConfig) -> Self {
        Self {
            transport,
            config,
            next_ticket: 1,
            live: HashMap::new(),
            abandoned: HashSet::new(),
            abandoned_order: VecDeque::new(),
        }
    }

    pub(crate) fn register(
        &mut self,
        serial: Serial,
        kind: RequestKind,
        snapshot: BindingSnapshot,
    ) -> RegistryResult<Token> {
        if self.live.contains_key(&serial) {
            return Err(RegistryError::DuplicateSerial {
                transport: self.transport,
                serial,
            });
        }
        if self.live.len() >= self.config.max_in_flight {
            return Err(RegistryError::Exhausted {
                transport: self.transport,
                limit: self.config.max_in_flight,
            });
        }
        if self.live.try_reserve(1).is_err() {
            return Err(RegistryError::Exhausted {
                transport: self.transport,
                limit: self.live.len(),
            });
        }

        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        let request = PendingRequest {
            serial,
            transport: self.transport,
            kind,
            ticket,
            snapshot,
            created_at: Instant::now(),
            payload: None,
        };
        let token = request.token();
        self.live.insert(serial, request);
        Ok(token)
    }

    pub(crate) fn attach(
        &mut self,
        token: Token,
        payload: OwnedPayload,
    ) -> Result<(), OwnedPayload> {
        match self.live.get_mut(&token.serial) {
            Some(request) if request.ticket == token.ticket && request.payload.is_none() => {
                request.payload = Some(payload);
                Ok(())
            }
            _ => Err(payload),
        }
    }

    pub(crate) fn complete(&mut self, token: Token) -> RegistryResult<PendingRequest> {
        let matches = self
            .live
            .get(&token.serial)
            .is_some_and(|request| request.ticket == token.ticket);
        if matches {
            if let Some(request) = self.live.remove(&token.serial) {
                return Ok(request);
            }
        }
        if self.abandoned.remove(&token.ticket) {
            self.abandoned_order.retain(|ticket| *ticket != token.ticket);
            return Err(RegistryError::Abandoned(token));
        }
        Err(RegistryError::DoubleCompletion(token))
    }

    pub(crate) fn find(&self, serial: Serial) -> Option<PendingInfo> {
        self.live.get(&serial).map(PendingRequest::info)
    }

    pub(crate) fn abandon_before(
        &mut self,
        cutoff: Option<Generation>,
    ) -> SmallVec<[PendingRequest; 8]> {
        let serials: SmallVec<[Serial; 8]> = self
            .live
            .iter()
            .filter(|(_, request)| {
                cutoff.map_or(true, |cutoff| request.snapshot.generation < cutoff)
            })
            .map(|(serial, _)| *serial)
            .collect();
        let mut drained = SmallVec::new();
        for serial in serials {
            if let Some(request) = self.live.remove(&serial) {
                self.remember_abandoned(request.ticket);
                drained.push(request);
            }
        }
        drained
    }

    fn remember_abandoned(&mut self, ticket: Ticket) {
        if self.config.max_abandoned == 0 {
            return;
        }
        while self.abandoned_order.len() >= self.config.max_abandoned {
            if let Some(oldest) = self.abandoned_order.pop_front() {
                self.abandoned.remove(&oldest);
            }
        }
        self.abandoned.insert(ticket);
        self.abandoned_order.push_back(ticket);
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.live.len()
    }

    pub(crate) fn abandoned(&self) -> usize {
        self.abandoned.len()
    }
}

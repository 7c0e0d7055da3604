use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use log::{debug, error};
use parking_lot::Mutex;
use relay_abi::{
    BindingSnapshot, Generation, OwnedPayload, RequestKind, Serial, Token, TransportId,
};
use serde::Serialize;
use smallvec::SmallVec;

use crate::error::{RegistryError, RegistryResult};
use crate::lane::{Lane, LaneConfig, PendingInfo, PendingRequest};

type LaneTable = HashMap<TransportId, Arc<Mutex<Lane>>>;

/// Occupancy of one transport's lane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LaneStats {
    /// Live requests awaiting completion.
    pub in_flight: usize,
    /// Tickets remembered for late-completion detection.
    pub abandoned: usize,
}

/// Tracks in-flight requests keyed by `(transport, serial)`.
///
/// Each transport gets its own lane behind its own lock. The lane table is
/// published through an [`ArcSwap`], so looking up a lane never blocks and
/// adding one never stalls traffic on the others.
pub struct PendingRequestRegistry {
    config: LaneConfig,
    lanes: ArcSwap<LaneTable>,
}

impl PendingRequestRegistry {
    /// Creates an empty registry whose lanes use `config`.
    pub fn new(config: LaneConfig) -> Self {
        Self {
            config,
            lanes: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Registers a new in-flight request and returns its correlation token.
    ///
    /// [`RegistryError::Exhausted`] must be handled exactly like an
    /// allocation failure: the caller never submits without a token.
    pub fn register(
        &self,
        transport: TransportId,
        serial: Serial,
        kind: RequestKind,
        snapshot: BindingSnapshot,
    ) -> RegistryResult<Token> {
        let lane = self.lane(transport);
        let token = lane.lock().register(serial, kind, snapshot)?;
        debug!(
            "registry::register {transport} serial={serial} ticket={} kind={}",
            token.ticket, kind.0
        );
        Ok(token)
    }

    /// Hands the submitted payload to the pending request it belongs to.
    ///
    /// Returns the payload back when the request has already completed, in
    /// which case the caller owns it and must release it.
    pub fn attach(&self, token: Token, payload: OwnedPayload) -> Result<(), OwnedPayload> {
        match self.existing_lane(token.transport) {
            Some(lane) => lane.lock().attach(token, payload),
            None => Err(payload),
        }
    }

    /// Removes and returns the request identified by `token`.
    ///
    /// An unknown token is a lifecycle violation and is reported as
    /// [`RegistryError::DoubleCompletion`]; a token that was failed by channel
    /// loss yields [`RegistryError::Abandoned`].
    pub fn complete(&self, token: Token) -> RegistryResult<PendingRequest> {
        let Some(lane) = self.existing_lane(token.transport) else {
            error!("registry::complete unknown transport for {token:?}");
            return Err(RegistryError::DoubleCompletion(token));
        };
        let result = lane.lock().complete(token);
        match &result {
            Ok(_) => {}
            Err(RegistryError::Abandoned(_)) => {
                debug!("registry::complete late completion for abandoned {token:?}");
            }
            Err(err) => {
                error!("registry::complete {err}");
            }
        }
        result
    }

    /// Looks up a live request by serial.
    pub fn find_by_serial(&self, transport: TransportId, serial: Serial) -> Option<PendingInfo> {
        self.existing_lane(transport)?.lock().find(serial)
    }

    /// Removes every live request on `transport`, remembering their tickets so
    /// later completions are recognised as late rather than duplicate.
    pub fn abandon_all(&self, transport: TransportId) -> SmallVec<[PendingRequest; 8]> {
        self.abandon(transport, None)
    }

    /// Like [`abandon_all`](Self::abandon_all), but only for requests
    /// dispatched under a binding older than `cutoff`. Requests registered
    /// after a rebind keep running.
    pub fn abandon_before(
        &self,
        transport: TransportId,
        cutoff: Generation,
    ) -> SmallVec<[PendingRequest; 8]> {
        self.abandon(transport, Some(cutoff))
    }

    fn abandon(
        &self,
        transport: TransportId,
        cutoff: Option<Generation>,
    ) -> SmallVec<[PendingRequest; 8]> {
        let abandoned = match self.existing_lane(transport) {
            Some(lane) => lane.lock().abandon_before(cutoff),
            None => SmallVec::new(),
        };
        if !abandoned.is_empty() {
            debug!("registry::abandon {transport} count={}", abandoned.len());
        }
        abandoned
    }

    /// Creates the lane for `transport` with its own limits. Returns `false`
    /// when the lane already existed, in which case its limits are unchanged.
    pub fn open_lane(&self, transport: TransportId, config: LaneConfig) -> bool {
        let mut created = false;
        self.lanes.rcu(|table| {
            let mut table = LaneTable::clone(table);
            created = !table.contains_key(&transport);
            if created {
                table.insert(transport, Arc::new(Mutex::new(Lane::new(transport, config))));
            }
            table
        });
        created
    }

    /// Occupancy of `transport`'s lane.
    pub fn lane_stats(&self, transport: TransportId) -> LaneStats {
        match self.existing_lane(transport) {
            Some(lane) => {
                let lane = lane.lock();
                LaneStats {
                    in_flight: lane.in_flight(),
                    abandoned: lane.abandoned(),
                }
            }
            None => LaneStats::default(),
        }
    }

    fn existing_lane(&self, transport: TransportId) -> Option<Arc<Mutex<Lane>>> {
        self.lanes.load().get(&transport).cloned()
    }

    fn lane(&self, transport: TransportId) -> Arc<Mutex<Lane>> {
        let config = self.config;
        loop {
            if let Some(lane) = self.existing_lane(transport) {
                return lane;
            }
            self.lanes.rcu(|table| {
                let mut table = LaneTable::clone(table);
                table
                    .entry(transport)
                    .or_insert_with(|| Arc::new(Mutex::new(Lane::new(transport, config))));
                table
            });
        }
    }
}

impl Default for PendingRequestRegistry {
    fn default() -> Self {
        Self::new(LaneConfig::default())
    }
}

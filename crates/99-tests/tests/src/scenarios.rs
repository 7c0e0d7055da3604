//! Scripted end-to-end scenarios through the hub and the native backend.

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use relay_abi::{
    kinds, ArgShape, Args, ErrorClass, FieldKind, Indication, IndicationSink, ProtocolVersion,
    RemoteGone, RequestKind, Response, ResponseBody, ResponseSink, Serial, Status, SubmitError,
    TransportId, Value,
};
use relay_codec::unmarshal;
use relay_hub::{DispatchError, DispatchResult, RelayHub, SurfaceConfig, Terminal};
use relay_native::{decoding_responder, AdmissionFn, NativeBackend};
use response_channel::ResponseChannel;

use crate::support::{gated, wait_until, Harness, TestClient};

const T0: TransportId = TransportId(0);

fn gated_harness() -> (Harness, Sender<()>) {
    let (open, gate) = unbounded();
    let harness = Harness::start(1, NativeBackend::builder().workers(1).responder(gated(gate)));
    (harness, open)
}

#[test]
fn dispatch_without_a_binding_is_refused() {
    let harness = Harness::start(1, NativeBackend::builder());
    assert_eq!(
        harness
            .hub
            .dispatch(7, T0, kinds::GET_ICC_CARD_STATUS, &Args::Void),
        Err(DispatchError::ChannelGone(T0))
    );
    assert_eq!(
        harness.ledger.terminals(T0, 7),
        vec![Terminal::Refused(ErrorClass::ChannelGone)]
    );
    let endpoint = harness.hub.transport(T0).expect("endpoint");
    assert_eq!(endpoint.lane_stats().in_flight, 0);
    assert!(endpoint.find_pending(7).is_none());
    assert_eq!(harness.ledger.release_count(), 0);
    assert_eq!(endpoint.stats().submitted, 0);
    harness.stop();
}

#[test]
fn backend_allocation_failure_is_synthesized_and_cleaned_up() {
    let refuse_sms: AdmissionFn = Arc::new(|kind: RequestKind, _: &[u8]| {
        if kind == kinds::SEND_SMS {
            Err(SubmitError::AllocationFailed)
        } else {
            Ok(())
        }
    });
    let harness = Harness::start(1, NativeBackend::builder().admission(refuse_sms));
    let client = harness.bind(T0, ProtocolVersion::V1_4);

    assert_eq!(
        harness
            .hub
            .dispatch(12, T0, kinds::SEND_SMS, &Args::strings(["a", "b"])),
        Err(DispatchError::AllocationFailed)
    );
    assert!(DispatchError::AllocationFailed.class().is_retryable());
    assert_eq!(
        client.responses(),
        vec![Response::failure(12, kinds::SEND_SMS, Status::NoMemory)]
    );
    assert_eq!(
        harness.ledger.terminals(T0, 12),
        vec![Terminal::Failed(ErrorClass::AllocationFailure)]
    );
    assert_eq!(harness.ledger.releases_for(T0, 12).len(), 1);
    let endpoint = harness.hub.transport(T0).expect("endpoint");
    assert_eq!(endpoint.lane_stats().in_flight, 0);
    assert!(endpoint.find_pending(12).is_none());

    // The serial is free again once the failure is reported.
    harness
        .hub
        .dispatch(12, T0, kinds::HANGUP, &Args::ints([1]))
        .expect("retry with another kind");
    wait_until("retry response", || client.responses().len() == 2);
    assert_eq!(client.responses()[1].status, Status::Success);
    harness.stop();
}

#[test]
fn stale_invalidation_never_clears_a_newer_binding() {
    let _ = env_logger::builder().is_test(true).try_init();
    for _ in 0..200 {
        let channel = Arc::new(ResponseChannel::new(T0));
        let first = TestClient::new();
        let observed = channel.bind(ProtocolVersion::V1_2, first.clone(), first);

        let rebinder = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                let second = TestClient::new();
                channel.bind(ProtocolVersion::V1_5, second.clone(), second)
            })
        };
        let invalidated = channel.invalidate_if_stale(observed);
        let rebound = rebinder.join().expect("rebinder");

        assert!(channel.is_bound());
        if invalidated {
            assert_eq!(rebound, observed.next().next());
        } else {
            assert_eq!(rebound, observed.next());
        }
        assert_eq!(
            channel.snapshot().map(|snapshot| snapshot.version),
            Some(ProtocolVersion::V1_5)
        );
    }
}

#[test]
fn stale_invalidation_keeps_requests_in_flight() {
    let (harness, open) = gated_harness();
    let endpoint = harness.hub.transport(T0).expect("endpoint");
    let old = harness.bind(T0, ProtocolVersion::V1_2);
    let observed = endpoint.channel().generation();
    harness
        .hub
        .dispatch(1, T0, kinds::HANGUP, &Args::ints([1]))
        .expect("dispatch");

    let new = harness.bind(T0, ProtocolVersion::V1_6);
    assert!(!endpoint.invalidate_if_stale(observed));
    assert!(endpoint.find_pending(1).is_some());

    open.send(()).expect("gate");
    wait_until("response on new binding", || new.responses().len() == 1);
    assert!(old.responses().is_empty());
    assert_eq!(
        harness.ledger.terminals(T0, 1),
        vec![Terminal::Delivered(Status::Success)]
    );
    harness.stop();
}

#[test]
fn response_shaped_for_version_at_dispatch_after_upgrade() {
    let (harness, open) = gated_harness();
    let old = harness.bind(T0, ProtocolVersion::V1_2);
    harness
        .hub
        .dispatch(3, T0, kinds::GET_ICC_CARD_STATUS, &Args::Void)
        .expect("dispatch");

    let new = harness.bind(T0, ProtocolVersion::V1_5);
    open.send(()).expect("gate");
    wait_until("response", || new.responses().len() == 1);

    let response = &new.responses()[0];
    assert_eq!(response.serial, 3);
    assert_eq!(
        response.body,
        ResponseBody::Shaped {
            revision: ProtocolVersion::V1_2,
            payload: Vec::new(),
        }
    );
    assert!(old.responses().is_empty());

    // A request dispatched under the new binding gets the newest shape.
    harness
        .hub
        .dispatch(4, T0, kinds::GET_ICC_CARD_STATUS, &Args::Void)
        .expect("dispatch");
    open.send(()).expect("gate");
    wait_until("second response", || new.responses().len() == 2);
    assert!(matches!(
        new.responses()[1].body,
        ResponseBody::Shaped {
            revision: ProtocolVersion::V1_5,
            ..
        }
    ));
    harness.stop();
}

#[test]
fn downgrade_caps_shape_at_bound_version() {
    let (harness, open) = gated_harness();
    harness.bind(T0, ProtocolVersion::V1_6);
    harness
        .hub
        .dispatch(1, T0, kinds::GET_CELL_INFO_LIST, &Args::Void)
        .expect("dispatch");
    let older = harness.bind(T0, ProtocolVersion::V1_4);
    open.send(()).expect("gate");
    wait_until("response", || older.responses().len() == 1);
    assert!(matches!(
        older.responses()[0].body,
        ResponseBody::Shaped {
            revision: ProtocolVersion::V1_4,
            ..
        }
    ));
    harness.stop();
}

#[test]
fn remote_death_fails_everything_dispatched_under_it() {
    let (harness, open) = gated_harness();
    let client = harness.bind(T0, ProtocolVersion::V1_4);
    for serial in 1..=3 {
        harness
            .hub
            .dispatch(serial, T0, kinds::HANGUP, &Args::ints([serial]))
            .expect("dispatch");
    }
    client.die();
    open.send(()).expect("gate");
    let endpoint = harness.hub.transport(T0).expect("endpoint");
    wait_until("all requests failed", || {
        (1..=3).all(|serial| !harness.ledger.terminals(T0, serial).is_empty())
    });
    assert!(!endpoint.channel().is_bound());

    for serial in 1..=3 {
        assert_eq!(
            harness.ledger.terminals(T0, serial),
            vec![Terminal::Failed(ErrorClass::ChannelGone)],
            "serial {serial}"
        );
    }
    assert_eq!(endpoint.lane_stats().in_flight, 0);

    for _ in 0..2 {
        open.send(()).expect("gate");
    }
    wait_until("late completions", || endpoint.stats().late_completions == 2);
    assert_eq!(harness.ledger.release_count(), 3);
    assert!(harness.ledger.double_releases().is_empty());
    assert_eq!(endpoint.stats().double_completions, 0);

    // A fresh client sees none of the failed requests.
    let fresh = harness.bind(T0, ProtocolVersion::V1_4);
    harness
        .hub
        .dispatch(9, T0, kinds::HANGUP, &Args::ints([9]))
        .expect("dispatch");
    open.send(()).expect("gate");
    wait_until("fresh response", || fresh.responses().len() == 1);
    assert_eq!(fresh.responses()[0].serial, 9);
    harness.stop();
}

#[test]
fn unbind_fails_pending_requests_once() {
    let (harness, open) = gated_harness();
    harness.bind(T0, ProtocolVersion::V1_4);
    for serial in 1..=2 {
        harness
            .hub
            .dispatch(serial, T0, kinds::HANGUP, &Args::ints([serial]))
            .expect("dispatch");
    }
    assert_eq!(harness.hub.unbind(T0).expect("unbind"), 2);
    let next = harness.bind(T0, ProtocolVersion::V1_4);
    for _ in 0..2 {
        open.send(()).expect("gate");
    }
    let endpoint = harness.hub.transport(T0).expect("endpoint");
    wait_until("late completions", || endpoint.stats().late_completions == 2);
    assert!(next.responses().is_empty());
    for serial in 1..=2 {
        assert_eq!(
            harness.ledger.terminals(T0, serial),
            vec![Terminal::Failed(ErrorClass::ChannelGone)]
        );
    }
    harness.stop();
}

/// Client that answers its first response with another request while a
/// second client is taking over the transport.
#[derive(Default)]
struct ChattyClient {
    hub: Mutex<Weak<RelayHub>>,
    seen: Mutex<Vec<Serial>>,
    successor: Mutex<Option<JoinHandle<Arc<TestClient>>>>,
    follow_up: Mutex<Option<DispatchResult<()>>>,
}

impl ResponseSink for ChattyClient {
    fn on_response(&self, response: &Response) -> Result<(), RemoteGone> {
        self.seen.lock().push(response.serial);
        let hub = self.hub.lock().upgrade();
        if let (1, Some(hub)) = (response.serial, hub) {
            let rebinding = Arc::clone(&hub);
            *self.successor.lock() = Some(thread::spawn(move || {
                let client = TestClient::new();
                rebinding
                    .bind(T0, ProtocolVersion::V1_4, client.clone(), client.clone())
                    .expect("rebind");
                client
            }));
            thread::sleep(Duration::from_millis(50));
            let result = hub.dispatch(2, T0, kinds::HANGUP, &Args::ints([2]));
            *self.follow_up.lock() = Some(result);
        }
        Ok(())
    }
}

impl IndicationSink for ChattyClient {
    fn on_indication(&self, _indication: &Indication) -> Result<(), RemoteGone> {
        Ok(())
    }
}

#[test]
fn follow_up_dispatch_from_a_response_survives_a_rebind() {
    let harness = Harness::start(1, NativeBackend::builder().workers(1));
    let client = Arc::new(ChattyClient::default());
    *client.hub.lock() = Arc::downgrade(&harness.hub);
    harness
        .hub
        .bind(T0, ProtocolVersion::V1_4, client.clone(), client.clone())
        .expect("bind");
    harness
        .hub
        .dispatch(1, T0, kinds::HANGUP, &Args::ints([1]))
        .expect("dispatch");

    wait_until("follow-up terminal", || {
        !harness.ledger.terminals(T0, 2).is_empty()
    });
    let successor = client
        .successor
        .lock()
        .take()
        .expect("rebind started")
        .join()
        .expect("rebind");
    assert_eq!(client.follow_up.lock().take(), Some(Ok(())));
    assert_eq!(
        harness.ledger.terminals(T0, 2),
        vec![Terminal::Delivered(Status::Success)]
    );
    // Serial 2 reaches whichever client was bound when it completed.
    let seen = client.seen.lock().clone();
    let delivered_to_successor = successor.responses().len();
    assert_eq!(seen.len() + delivered_to_successor, 2, "{seen:?}");
    assert_eq!(seen[0], 1);
    harness.stop();
}

#[test]
fn every_shape_survives_the_backend_round_trip() {
    let catalog = Arc::new(kinds::standard().expect("catalog"));
    let harness = Harness::start(
        1,
        NativeBackend::builder().responder(decoding_responder(catalog)),
    );
    let client = harness.bind(T0, ProtocolVersion::V1_6);

    const DIAL: &[FieldKind] = &[FieldKind::Text, FieldKind::Int, FieldKind::Bool];
    let cases: Vec<(RequestKind, ArgShape, Args)> = vec![
        (kinds::GET_CELL_INFO_LIST, ArgShape::Void, Args::Void),
        (
            kinds::SUPPLY_ICC_PIN,
            ArgShape::Strings(2),
            Args::Strings([Some("1234".to_owned()), None].into_iter().collect()),
        ),
        (kinds::HANGUP, ArgShape::Ints(1), Args::ints([-42])),
        (
            kinds::OEM_HOOK_RAW,
            ArgShape::Raw,
            Args::Raw(vec![0, 0xff, 0x10, 0]),
        ),
        (
            kinds::DIAL,
            ArgShape::Record(DIAL),
            Args::Record(vec![
                Value::Text(Some("+15551234567".to_owned())),
                Value::Int(0),
                Value::Bool(true),
            ]),
        ),
    ];
    for (serial, (kind, _, args)) in cases.iter().enumerate() {
        harness
            .hub
            .dispatch(serial as i32, T0, *kind, args)
            .expect("dispatch");
    }
    wait_until("all responses", || client.responses().len() == cases.len());

    let mut responses = client.responses();
    responses.sort_by_key(|response| response.serial);
    for (response, (kind, shape, args)) in responses.iter().zip(&cases) {
        assert_eq!(response.kind, *kind);
        assert_eq!(response.status, Status::Success);
        let ResponseBody::Shaped { payload, .. } = &response.body else {
            panic!("unshaped body for {kind:?}");
        };
        assert_eq!(unmarshal(*shape, payload).as_ref(), Ok(args));
    }
    harness.stop();
}

#[test]
fn unmarshallable_strings_never_reach_the_backend() {
    let harness = Harness::start_with(
        1,
        SurfaceConfig::diagnostic(),
        NativeBackend::builder(),
    );
    let client = harness.bind(T0, ProtocolVersion::V1_4);

    assert_eq!(
        harness
            .hub
            .dispatch(1, T0, kinds::SEND_SMS, &Args::strings(["+1555", "hi\0there"])),
        Err(DispatchError::MarshallingTruncated { index: 1 })
    );
    let long = "x".repeat(2048);
    assert_eq!(
        harness
            .hub
            .dispatch(2, T0, kinds::SEND_SMS, &Args::strings([long.as_str(), "hi"])),
        Err(DispatchError::MarshallingTruncated { index: 0 })
    );

    let statuses: Vec<_> = client.responses().iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![Status::InvalidArguments; 2]);
    assert_eq!(harness.ledger.release_count(), 0);
    assert_eq!(harness.backend.queued(), 0);
    harness.stop();
}

#[test]
fn unsupported_and_dropped_kinds_follow_policy() {
    let harness = Harness::start(1, NativeBackend::builder());
    let client = harness.bind(T0, ProtocolVersion::V1_1);

    // Fail policy: refused at dispatch with a synthesized response.
    let err = harness
        .hub
        .dispatch(1, T0, kinds::GET_MODEM_STACK_STATUS, &Args::Void)
        .expect_err("too old");
    assert!(matches!(
        err,
        DispatchError::UnsupportedForProtocolVersion {
            required: ProtocolVersion::V1_3,
            bound: ProtocolVersion::V1_1,
            ..
        }
    ));

    // Drop policy: executed, response discarded.
    harness
        .hub
        .dispatch(2, T0, kinds::SET_SIGNAL_REPORTING_CRITERIA, &Args::ints([1, 2, 3, 4]))
        .expect("dispatch");
    wait_until("drop terminal", || {
        !harness.ledger.terminals(T0, 2).is_empty()
    });
    assert_eq!(harness.ledger.terminals(T0, 2), vec![Terminal::Dropped]);
    assert_eq!(
        client.responses(),
        vec![Response::failure(
            1,
            kinds::GET_MODEM_STACK_STATUS,
            Status::RequestNotSupported
        )]
    );
    harness.stop();
}

#[test]
fn indications_follow_binding_and_surface() {
    let harness = Harness::start(1, NativeBackend::builder());
    let diagnostic = harness
        .hub
        .add_transport(TransportId(1), Some(SurfaceConfig::diagnostic()))
        .expect("add");
    let client = harness.bind(T0, ProtocolVersion::V1_3);
    let quiet = harness.bind(diagnostic.transport(), ProtocolVersion::V1_6);

    for transport in [T0, diagnostic.transport()] {
        harness
            .backend
            .inject_indication(transport, kinds::SIGNAL_STRENGTH, vec![0x2a])
            .expect("inject");
    }
    wait_until("indication", || client.indications().len() == 1);
    assert_eq!(client.indications()[0].revision, ProtocolVersion::V1_2);
    wait_until("diagnostic drop", || {
        diagnostic.stats().indications_dropped == 1
    });
    assert!(quiet.indications().is_empty());
    harness.stop();
}

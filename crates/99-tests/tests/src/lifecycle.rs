//! Buffer ownership and registry limits observed from outside the hub.

use crossbeam_channel::unbounded;
use relay_abi::{kinds, Args, ErrorClass, ProtocolVersion, Status, TransportId};
use relay_hub::{DispatchError, SurfaceConfig, Terminal};
use relay_native::NativeBackend;

use crate::support::{gated, wait_until, Harness};

const T0: TransportId = TransportId(0);

#[test]
fn extended_surface_erases_buffers_on_release() {
    let harness = Harness::start_with(1, SurfaceConfig::extended(), NativeBackend::builder());
    let client = harness.bind(T0, ProtocolVersion::V1_6);
    harness
        .hub
        .dispatch(1, T0, kinds::SUPPLY_ICC_PIN, &Args::strings(["0000", "A000"]))
        .expect("dispatch");
    wait_until("response", || client.responses().len() == 1);
    assert_eq!(client.responses()[0].status, Status::Success);
    wait_until("release", || harness.ledger.release_count() == 1);

    let released = harness.ledger.releases_for(T0, 1);
    assert_eq!(released.len(), 1);
    assert!(released[0].erased);
    assert!(released[0].len > 0);
    harness.stop();
}

#[test]
fn base_surface_releases_without_erasing() {
    let harness = Harness::start(1, NativeBackend::builder());
    harness.bind(T0, ProtocolVersion::V1_6);
    harness
        .hub
        .dispatch(1, T0, kinds::HANGUP, &Args::ints([1]))
        .expect("dispatch");
    wait_until("release", || harness.ledger.release_count() == 1);
    assert!(!harness.ledger.releases_for(T0, 1)[0].erased);
    harness.stop();
}

#[test]
fn serial_reuse_is_refused_while_pending() {
    let (open, gate) = unbounded();
    let harness = Harness::start(1, NativeBackend::builder().workers(1).responder(gated(gate)));
    let client = harness.bind(T0, ProtocolVersion::V1_4);
    harness
        .hub
        .dispatch(5, T0, kinds::HANGUP, &Args::ints([1]))
        .expect("dispatch");
    assert_eq!(
        harness.hub.dispatch(5, T0, kinds::HANGUP, &Args::ints([2])),
        Err(DispatchError::DuplicateSerial(5))
    );
    assert_eq!(
        harness.hub.dispatch(5, T0, kinds::HANGUP, &Args::strings(["x"])),
        Err(DispatchError::MalformedArgument("hangup"))
    );
    assert!(client.responses().is_empty());

    open.send(()).expect("gate");
    wait_until("response", || client.responses().len() == 1);
    assert_eq!(client.responses()[0].status, Status::Success);
    assert_eq!(
        harness.ledger.terminals(T0, 5),
        vec![
            Terminal::Refused(ErrorClass::MalformedArgument),
            Terminal::Refused(ErrorClass::MalformedArgument),
            Terminal::Delivered(Status::Success),
        ]
    );
    harness
        .hub
        .dispatch(5, T0, kinds::HANGUP, &Args::ints([3]))
        .expect("serial free again");
    open.send(()).expect("gate");
    wait_until("second response", || client.responses().len() == 2);
    harness.stop();
}

#[test]
fn exhausted_lane_reports_no_memory() {
    let (open, gate) = unbounded();
    let harness = Harness::start_with(
        1,
        SurfaceConfig::base().with_max_in_flight(2),
        NativeBackend::builder().workers(1).responder(gated(gate)),
    );
    let client = harness.bind(T0, ProtocolVersion::V1_4);
    for serial in 1..=2 {
        harness
            .hub
            .dispatch(serial, T0, kinds::HANGUP, &Args::ints([serial]))
            .expect("dispatch");
    }
    assert_eq!(
        harness.hub.dispatch(3, T0, kinds::HANGUP, &Args::ints([3])),
        Err(DispatchError::AllocationFailed)
    );
    assert_eq!(client.responses()[0].status, Status::NoMemory);
    assert_eq!(client.responses()[0].serial, 3);

    open.send(()).expect("gate");
    wait_until("capacity back", || {
        harness.hub.transport(T0).expect("endpoint").lane_stats().in_flight < 2
    });
    harness
        .hub
        .dispatch(3, T0, kinds::HANGUP, &Args::ints([3]))
        .expect("retry");
    for _ in 0..2 {
        open.send(()).expect("gate");
    }
    wait_until("all answered", || client.responses().len() == 4);
    harness.stop();
}

#[test]
fn shutdown_fails_requests_the_backend_never_answered() {
    let (open, gate) = unbounded();
    let harness = Harness::start(2, NativeBackend::builder().workers(1).responder(gated(gate)));
    harness.bind(T0, ProtocolVersion::V1_4);
    harness.bind(TransportId(1), ProtocolVersion::V1_4);
    for transport in [T0, TransportId(1)] {
        harness
            .hub
            .dispatch(1, transport, kinds::HANGUP, &Args::ints([1]))
            .expect("dispatch");
    }

    assert_eq!(harness.hub.shutdown(), 2);
    drop(open);
    harness.backend.shutdown();

    for transport in [T0, TransportId(1)] {
        assert_eq!(
            harness.ledger.terminals(transport, 1),
            vec![Terminal::Failed(ErrorClass::ChannelGone)]
        );
        let stats = harness.hub.stats(transport).expect("stats");
        assert_eq!(stats.late_completions, 1);
        assert_eq!(stats.released, 1);
    }
    assert!(harness.ledger.double_releases().is_empty());
}

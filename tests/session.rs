mod common;

use std::time::Duration;

use common::*;
use ptpcam_rs::{
    consts,
    endpoints::{Endpoint, EndpointSet},
    ptp::ResponseCode,
    session::{Session, SessionConfig},
    stall::{self, PipeStatus},
    CamError,
};

#[test]
fn close_releases_exactly_once() {
    init_logger();
    let (session, usb, cam) = open_session();

    assert_eq!(cam.borrow().sessions_opened, vec![consts::DEFAULT_SESSION_ID]);

    session.close();

    assert_eq!(cam.borrow().sessions_closed, 1);
    assert_eq!(usb.borrow().releases, 1);
}

#[test]
fn drop_closes_the_session() {
    init_logger();
    let (session, usb, cam) = open_session();

    drop(session);

    assert_eq!(cam.borrow().sessions_closed, 1);
    assert_eq!(usb.borrow().releases, 1);
}

#[test]
fn failed_close_still_releases() {
    init_logger();
    let (session, usb, cam) = open_session();
    cam.borrow_mut().close_fails = Some(Fail::Response(ResponseCode::GENERAL_ERROR.0));

    session.close();

    assert_eq!(usb.borrow().releases, 1);
}

#[test]
fn refused_open_is_fatal_and_releases() {
    init_logger();
    let (transport, usb) = MockTransport::new();
    let (camera, cam) = MockCamera::new();
    cam.borrow_mut().open_fails = Some(Fail::Response(ResponseCode::GENERAL_ERROR.0));

    let result = Session::open(transport, camera, SessionConfig::default());

    assert!(matches!(result, Err(CamError::SessionOpen(_))));
    assert_eq!(usb.borrow().releases, 1);
    assert_eq!(cam.borrow().sessions_closed, 0);
}

#[test]
fn errors_during_the_session_do_not_change_teardown() {
    init_logger();
    let (mut session, usb, cam) = open_session();
    cam.borrow_mut().handles_fail = Some(Fail::Io);

    assert!(session.object_handles().is_err());
    assert!(session.object_info(0x1234).is_err());

    drop(session);

    assert_eq!(cam.borrow().sessions_closed, 1);
    assert_eq!(usb.borrow().releases, 1);
}

#[test]
fn teardown_clears_halted_bulk_pipes() {
    init_logger();
    let (session, usb, _cam) = open_session();
    usb.borrow_mut().halted.extend([BULK_IN, BULK_OUT, INTERRUPT_IN]);

    drop(session);

    let usb = usb.borrow();
    assert_eq!(usb.cleared_halts(), vec![u16::from(BULK_IN), u16::from(BULK_OUT)]);
    assert!(usb.halted.contains(&INTERRUPT_IN));
}

#[test]
fn stall_recovery_never_escalates() {
    init_logger();
    let (mut session, usb, _cam) = open_session();
    usb.borrow_mut().controls_fail = true;

    let report = session.clear_stall();

    assert_eq!(report.failure_count(), 2);
    assert!(report.pipes.iter().all(|(_, s)| *s == PipeStatus::QueryFailed));

    drop(session);
    assert_eq!(usb.borrow().releases, 1);
}

#[test]
fn stall_recovery_skips_unresolved_endpoints() {
    init_logger();
    let endpoints = EndpointSet {
        bulk_out: Endpoint::BulkOut(0),
        ..camera_endpoints()
    };
    let (mut transport, usb) = MockTransport::with_endpoints(endpoints);
    usb.borrow_mut().halted.insert(BULK_IN);

    let report = stall::clear_stall(&mut transport);

    assert_eq!(
        report.pipes,
        vec![
            (Endpoint::BulkIn(BULK_IN), PipeStatus::Reset),
            (Endpoint::BulkOut(0), PipeStatus::Skipped),
        ]
    );
    assert_eq!(usb.borrow().control_in.len(), 1);
}

#[test]
fn recovery_only_follows_transport_errors() {
    init_logger();
    let (mut session, usb, _cam) = open_session();
    usb.borrow_mut().halted.insert(BULK_IN);

    session.recover(&Fail::Response(ResponseCode::GENERAL_ERROR.0).error());
    assert!(usb.borrow().cleared_halts().is_empty());

    session.recover(&Fail::Io.error());
    assert_eq!(usb.borrow().cleared_halts(), vec![u16::from(BULK_IN)]);
}

#[test]
fn timeout_override_is_scoped() {
    init_logger();
    let (mut session, usb, _cam) = open_session();
    let longer = Duration::from_secs(30);

    {
        let mut session = session.override_timeout(longer);
        assert_eq!(session.timeout(), longer);
        session.device_info().unwrap();
    }

    assert_eq!(session.timeout(), consts::DEFAULT_TIMEOUT);
    session.device_info().unwrap();

    let timeouts = usb.borrow().timeouts.clone();
    assert!(timeouts.contains(&longer));
    assert_eq!(timeouts.last(), Some(&consts::DEFAULT_TIMEOUT));
}

#[test]
fn transaction_ids_start_at_zero() {
    init_logger();
    let (mut session, usb, cam) = open_session();

    session.device_info().unwrap();
    session.object_handles().unwrap();

    assert_eq!(cam.borrow().transaction_ids, vec![0, 1, 2]);
    assert_eq!(usb.borrow().bulk_writes.len(), 3);
}

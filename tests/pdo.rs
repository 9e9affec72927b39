mod common;

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
    };
use futures_concurrency::future::Join;
use coeaxis::{
    AxisError, PduData,
    PdoIn, PdoOut, PdoSession,
    cia402::{DriveState, OperationMode, Transition},
    };
use common::*;


const PERIOD: Duration = Duration::from_millis(2);

/// stub drive answering every frame with its current state
fn drive(initial: DriveState) -> Arc<StubSocket> {
    let state = Mutex::new(initial);
    Arc::new(StubSocket::new(move |frame| {
        let out = PdoOut::unpack(frame).unwrap();
        let mut state = state.lock().unwrap();
        *state = react(*state, u16::from(out.control_word), false);
        Some(answer(status_of(*state)))
    }))
}
/// stub drive never changing its status
fn frozen(status: u16) -> Arc<StubSocket> {
    Arc::new(StubSocket::new(move |_| Some(answer(status))))
}
fn answer(status: u16) -> Vec<u8> {
    let input = PdoIn {
        status_word: status.into(),
        .. PdoIn::default()
    };
    let mut frame = vec![0; PdoIn::LEN];
    input.pack(&mut frame).unwrap();
    frame
}

#[test]
fn frame_layout() {
    let out = PdoOut {
        control_word: 0x000fu16.into(),
        operation_mode: OperationMode::SynchronousPosition,
        target_velocity: -1,
        target_position: 1000,
        target_torque: 300,
    };
    let mut frame = [0; PdoOut::LEN];
    out.pack(&mut frame).unwrap();
    assert_eq!(frame, [
        0x0f, 0x00,
        0x08,
        0xff, 0xff, 0xff, 0xff,
        0xe8, 0x03, 0x00, 0x00,
        0x2c, 0x01,
        ]);
    assert_eq!(PdoOut::unpack(&frame).unwrap(), out);

    let frame = [0x27, 0x00, 0x08, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0x10, 0x23];
    let input = PdoIn::unpack(&frame).unwrap();
    assert_eq!(DriveState::from(input.status_word), DriveState::OperationEnabled);
    assert_eq!(input.operation_mode_display, 8);
    assert_eq!((input.actual_velocity, input.actual_position, input.actual_torque), (1, 2, 3));
    assert_eq!(input.error_code, 0x2310);

    assert!(PdoIn::unpack(&frame[.. 14]).is_err());
}

#[tokio::test]
async fn bring_up_transitions() {
    init_logging();
    let session = PdoSession::new(drive(DriveState::Fault), PERIOD);
    let timeout = Duration::from_millis(500);

    assert_eq!(session.request_transition_and_wait(Transition::ResetFault, timeout).await.unwrap(), DriveState::SwitchOnDisabled);
    assert_eq!(session.request_transition_and_wait(Transition::Shutdown, timeout).await.unwrap(), DriveState::ReadyToSwitchOn);
    assert_eq!(session.request_transition_and_wait(Transition::SwitchOn, timeout).await.unwrap(), DriveState::SwitchedOn);
    assert_eq!(session.request_transition_and_wait(Transition::EnableOperation, timeout).await.unwrap(), DriveState::OperationEnabled);
    assert_eq!(session.status_word(), 0x0027);
    assert_eq!(session.state(), DriveState::OperationEnabled);
    assert!(session.check_for_exception().is_ok());
    session.close();
}

#[tokio::test]
async fn switch_on_accepts_direct_enable() {
    init_logging();
    // some drives skip SwitchedOn and enable the operation as soon as they are switched on
    let state = Mutex::new(DriveState::ReadyToSwitchOn);
    let socket = Arc::new(StubSocket::new(move |frame| {
        let out = PdoOut::unpack(frame).unwrap();
        let mut state = state.lock().unwrap();
        *state = match (*state, u16::from(out.control_word)) {
            (DriveState::ReadyToSwitchOn, 0x0007) => DriveState::OperationEnabled,
            (state, _) => state,
        };
        Some(answer(status_of(*state)))
    }));
    let session = PdoSession::new(socket, PERIOD);

    let reached = session.request_transition_and_wait(Transition::SwitchOn, Duration::from_millis(500)).await.unwrap();
    assert_eq!(reached, DriveState::OperationEnabled);
    assert_eq!(session.status_word(), 0x0027);
    session.close();
}

#[tokio::test]
async fn targets_are_sent() {
    init_logging();
    let socket = drive(DriveState::SwitchOnDisabled);
    let session = PdoSession::new(socket.clone(), PERIOD);
    session.set_operation_mode(OperationMode::SynchronousVelocity);
    session.set_velocity(-500);
    session.set_torque(12);

    // wait a few cycles so that the targets are sent
    let start = session.cycles();
    while session.cycles() < start + 3 {
        tokio::time::sleep(PERIOD).await;
    }
    let last = PdoOut::unpack(socket.sent().last().unwrap()).unwrap();
    assert_eq!(last.operation_mode, OperationMode::SynchronousVelocity);
    assert_eq!(last.target_velocity, -500);
    assert_eq!(last.target_torque, 12);
    assert_eq!(session.output(), last);
    session.close();
}

#[tokio::test]
async fn transition_times_out() {
    init_logging();
    let session = PdoSession::new(frozen(0x0040), PERIOD);
    let timeout = Duration::from_millis(100);

    let start = Instant::now();
    let result = session.request_transition_and_wait(Transition::EnableOperation, timeout).await;
    let elapsed = start.elapsed();

    match result {
        Err(AxisError::Timeout {transition, last}) => {
            assert_eq!(transition, Transition::EnableOperation.label());
            assert_eq!(last, DriveState::SwitchOnDisabled);
        },
        other => panic!("unexpected result {:?}", other),
    }
    assert!(elapsed >= timeout, "gave up after {:?}", elapsed);
    assert!(elapsed < timeout * 5, "gave up after {:?}", elapsed);
    session.close();
}

#[tokio::test]
async fn malformed_frame_is_reported() {
    init_logging();
    let session = PdoSession::new(Arc::new(StubSocket::new(|_| Some(vec![0x40, 0x00, 0x08]))), PERIOD);

    let result = session.request_transition_and_wait(Transition::Shutdown, Duration::from_millis(500)).await;
    assert!(matches!(result, Err(AxisError::Protocol(_))), "{:?}", result);
    session.close();
}

#[tokio::test]
async fn close_wakes_waiters() {
    init_logging();
    let session = PdoSession::new(frozen(0x0040), PERIOD);

    let start = Instant::now();
    let (result, _) = (
        session.request_transition_and_wait(Transition::EnableOperation, Duration::from_secs(10)),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            session.close();
        },
        ).join().await;

    assert!(matches!(result, Err(AxisError::Closed)), "{:?}", result);
    assert!(start.elapsed() < Duration::from_secs(1));
    // closing again is harmless and later calls keep failing
    session.close();
    assert!(matches!(session.check_for_exception(), Err(AxisError::Closed)));
}

#[tokio::test]
async fn silent_drive_keeps_cycling() {
    init_logging();
    let socket = Arc::new(StubSocket::silent());
    let session = PdoSession::new(socket.clone(), PERIOD);

    while session.cycles() < 3 {
        tokio::time::sleep(PERIOD).await;
    }
    // lost frames are not errors, the status stays the initial one
    assert!(session.check_for_exception().is_ok());
    assert_eq!(session.state(), DriveState::NotReadyToSwitchOn);
    assert!(socket.sends() >= 3);
    session.close();
}

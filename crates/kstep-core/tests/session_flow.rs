mod common;

use std::thread;
use std::time::Duration;

use common::*;
use kstep_core::protocol::constants::*;
use kstep_core::{
    Command, DeviceFault, DeviceType, LogLevel, Response, SessionState, StepError, StepEvent,
};

#[test]
fn test_connect_handshake() {
    let sim = SimPrinter::new();
    let (printer, recorder) = printer(&sim);
    assert_eq!(printer.current_state(), SessionState::Disconnected);

    let info = printer.connect().unwrap();
    assert_eq!(info.battery_level, 80);
    assert_eq!(info.auto_power_off, 5);
    assert_eq!(info.paper_count, 10);
    assert_eq!(info.mac_string(), "A4:C1:38:00:11:22");
    assert_eq!(printer.current_state(), SessionState::Connected);
    assert_eq!(
        recorder.states(),
        vec![SessionState::Connecting, SessionState::Connected]
    );

    let writes = sim.mock.get_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(&writes[0][..8], &[0x1B, 0x2A, 0x43, 0x41, 0x00, 0x00, 0x01, 0x00]);
}

#[test]
fn test_connect_twice_is_invalid() {
    let sim = SimPrinter::new();
    let (printer, _) = printer(&sim);
    printer.connect().unwrap();
    let err = printer.connect().unwrap_err();
    assert!(matches!(
        err,
        StepError::InvalidState {
            state: SessionState::Connected,
            ..
        }
    ));
}

#[test]
fn test_handshake_device_error() {
    let sim = SimPrinter::new();
    sim.set(|b| b.handshake_error = DeviceFault::CoverOpen as u8);
    let (printer, _) = printer(&sim);

    let err = printer.connect().unwrap_err();
    assert_eq!(
        err.device_code().and_then(|c| c.fault()),
        Some(DeviceFault::CoverOpen)
    );
    assert_eq!(printer.current_state(), SessionState::Disconnected);
}

#[test]
fn test_handshake_timeout() {
    let sim = SimPrinter::new();
    sim.set(|b| {
        b.silent.insert((0x01, ACCESSORY_INFO));
    });
    let mut config = fast_config(DeviceType::Standard);
    config.operation_timeout_ms = 100;
    let (printer, recorder) = printer_with(&sim, config);

    let err = printer.connect().unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(printer.current_state(), SessionState::Disconnected);
    assert_eq!(
        recorder.states(),
        vec![SessionState::Connecting, SessionState::Disconnected]
    );
}

#[test]
fn test_queries_standard() {
    let sim = SimPrinter::new();
    let (printer, _) = printer(&sim);
    printer.connect().unwrap();

    assert_eq!(printer.get_battery_level().unwrap(), 77);
    assert_eq!(printer.get_paper_type().unwrap(), 1);
    assert_eq!(printer.get_auto_power_off().unwrap(), 10);
    printer.set_auto_power_off(3).unwrap();
    assert_eq!(printer.get_device_name().unwrap(), "STEP-A1B2");

    let version = printer.get_firmware_version().unwrap();
    assert_eq!(version.printer_version, 3);
    assert_eq!(version.firmware.to_string(), "1.2.3");
    assert_eq!(version.cnx.to_string(), "4.5.6");
    assert_eq!(version.tmd.to_string(), "7.8.9");

    let set = sim.written(0x0C, AUTO_POWER_OFF_SET);
    assert_eq!(set.len(), 1);
    assert_eq!(set[0][8], 3);
}

#[test]
fn test_slim_layout() {
    let sim = SimPrinter::with_behaviour(Behaviour {
        device: DeviceType::Slim,
        ..Default::default()
    });
    let (printer, _) = printer_with(&sim, fast_config(DeviceType::Slim));
    printer.connect().unwrap();

    let version = printer.get_firmware_minor_version().unwrap();
    assert_eq!(version.printer_version, 3);
    assert_eq!(version.firmware.to_string(), "1.2.3");
    assert_eq!(version.tmd.to_string(), "7.8.9");

    // Requests carry the SLIM device byte.
    assert!(sim.mock.get_writes().iter().all(|w| w[5] == DEVICE_TYPE_SLIM));
}

#[test]
fn test_query_device_error_stays_connected() {
    let sim = SimPrinter::new();
    let (printer, recorder) = printer(&sim);
    printer.connect().unwrap();

    sim.set(|b| b.query_error = DeviceFault::BatteryLow as u8);
    let err = printer.get_battery_level().unwrap_err();
    assert_eq!(err.device_code().map(|c| c.code()), Some(8));
    assert_eq!(printer.current_state(), SessionState::Connected);
    assert!(
        recorder
            .events()
            .iter()
            .any(|e| matches!(e, StepEvent::DeviceError { code } if code.code() == 8))
    );
}

#[test]
fn test_raw_send() {
    let sim = SimPrinter::new();
    let (printer, _) = printer(&sim);
    printer.connect().unwrap();

    let resp = printer.send(Command::BatteryLevel, GET, &[]).unwrap();
    assert!(matches!(resp, Response::BatteryLevel { level: 77, .. }));

    let err = printer.send(Command::BatteryLevel, GET, &[0u8; 27]).unwrap_err();
    assert!(matches!(err, StepError::InvalidInput(_)));
}

#[test]
fn test_second_request_for_pair_rejected() {
    let sim = SimPrinter::new();
    let (printer, _) = printer(&sim);
    printer.connect().unwrap();
    sim.set(|b| {
        b.silent.insert((0x0B, GET));
    });

    thread::scope(|s| {
        let first = s.spawn(|| printer.get_battery_level());
        assert!(eventually(|| sim.written(0x0B, GET).len() == 1));

        let err = printer.get_battery_level().unwrap_err();
        assert!(matches!(
            err,
            StepError::RequestAlreadyPending {
                command: Command::BatteryLevel,
                sub_command: 0
            }
        ));
        // Rejected before any I/O.
        assert_eq!(sim.written(0x0B, GET).len(), 1);

        // A different pair is unaffected.
        assert_eq!(printer.get_paper_type().unwrap(), 1);

        assert!(first.join().unwrap().unwrap_err().is_timeout());
    });
}

#[test]
fn test_timeout_keeps_session_connected() {
    let sim = SimPrinter::new();
    let mut config = fast_config(DeviceType::Standard);
    config.operation_timeout_ms = 100;
    let (printer, _) = printer_with(&sim, config);
    printer.connect().unwrap();

    sim.set(|b| {
        b.silent.insert((0x0A, GET));
    });
    let err = printer.get_paper_type().unwrap_err();
    assert!(matches!(err, StepError::Timeout { .. }));
    assert_eq!(printer.current_state(), SessionState::Connected);
    assert_eq!(printer.get_battery_level().unwrap(), 77);
}

#[test]
fn test_late_response_not_given_to_next_request() {
    let sim = SimPrinter::new();
    let mut config = fast_config(DeviceType::Standard);
    config.operation_timeout_ms = 100;
    config.late_frame_window_ms = 2_000;
    let (printer, recorder) = printer_with(&sim, config);
    printer.connect().unwrap();

    sim.set(|b| {
        b.silent.insert((0x0B, GET));
    });
    assert!(printer.get_battery_level().unwrap_err().is_timeout());

    // The answer to the abandoned request arrives just ahead of the answer
    // to the next one.
    let late = sim.frame(0x0B, GET, &[0, 11]);
    let fresh = sim.frame(0x0B, GET, &[0, 55]);
    sim.mock.set_responder(move |data| {
        if data.len() >= FRAME_LEN && data[6] == 0x0B {
            vec![late.as_bytes().to_vec(), fresh.as_bytes().to_vec()]
        } else {
            Vec::new()
        }
    });
    assert_eq!(printer.get_battery_level().unwrap(), 55);
    assert!(recorder.events().iter().any(|e| matches!(
        e,
        StepEvent::Log {
            level: LogLevel::Warn,
            ..
        }
    )));
}

#[test]
fn test_response_illegal_in_state_rejected() {
    let sim = SimPrinter::new();
    let (printer, recorder) = printer(&sim);
    printer.connect().unwrap();

    // An upgrade status report only makes sense while Upgrading.
    let status = sim.frame(0x03, UPGRADE_STATUS, &[0]);
    sim.mock.set_responder(move |data| {
        if data.len() >= FRAME_LEN && data[6] == 0x03 && data[7] == UPGRADE_STATUS {
            vec![status.as_bytes().to_vec()]
        } else {
            Vec::new()
        }
    });

    let err = printer.send(Command::Upgrade, UPGRADE_STATUS, &[]).unwrap_err();
    assert!(matches!(err, StepError::ProtocolViolation(_)));
    assert_eq!(printer.current_state(), SessionState::Connected);
    assert!(recorder.events().iter().any(|e| matches!(
        e,
        StepEvent::Log {
            level: LogLevel::Warn,
            ..
        }
    )));
    assert_eq!(
        recorder.states(),
        vec![SessionState::Connecting, SessionState::Connected]
    );
}

#[test]
fn test_unsolicited_frames_dropped() {
    let sim = SimPrinter::new();
    let (printer, recorder) = printer(&sim);
    printer.connect().unwrap();

    sim.mock.queue_frame(&sim.frame(0x00, PRINT_FINISHED, &[0]));
    sim.mock.queue_frame(&sim.frame(0x05, NOTIFY, &[42]));
    sim.mock.queue_frame(&sim.frame(0x04, NOTIFY, &[DeviceFault::HighTemperature as u8]));

    assert!(eventually(|| {
        recorder
            .events()
            .iter()
            .filter(|e| matches!(e, StepEvent::Unsolicited { .. }))
            .count()
            == 3
    }));
    assert_eq!(printer.current_state(), SessionState::Connected);
    assert!(
        recorder
            .events()
            .iter()
            .any(|e| matches!(e, StepEvent::DeviceError { code } if code.code() == 10))
    );
    assert_eq!(printer.get_battery_level().unwrap(), 77);
}

#[test]
fn test_framing_error_closes_session() {
    let sim = SimPrinter::new();
    let (printer, _) = printer(&sim);
    printer.connect().unwrap();

    sim.mock.queue_bytes(&[0x1B, 0x2A, 0x00, 0x00]);
    assert!(eventually(|| printer.current_state() == SessionState::Disconnected));

    let err = printer.get_battery_level().unwrap_err();
    assert!(matches!(err, StepError::InvalidState { .. }));
}

#[test]
fn test_transport_loss_disconnects() {
    let sim = SimPrinter::new();
    let (printer, recorder) = printer(&sim);
    printer.connect().unwrap();

    sim.mock.disconnect();
    assert!(eventually(|| printer.current_state() == SessionState::Disconnected));
    assert_eq!(recorder.states().last(), Some(&SessionState::Disconnected));

    sim.mock.reconnect();
    printer.connect().unwrap();
    assert_eq!(printer.get_paper_type().unwrap(), 1);
}

#[test]
fn test_disconnect_and_reconnect() {
    let sim = SimPrinter::new();
    let (printer, _) = printer(&sim);
    printer.connect().unwrap();

    printer.disconnect();
    assert_eq!(printer.current_state(), SessionState::Disconnected);
    assert!(matches!(
        printer.get_paper_type(),
        Err(StepError::InvalidState { .. })
    ));

    printer.connect().unwrap();
    assert_eq!(printer.current_state(), SessionState::Connected);
    assert_eq!(printer.get_battery_level().unwrap(), 77);
}

#[test]
fn test_pending_request_fails_on_disconnect() {
    let sim = SimPrinter::new();
    let (printer, _) = printer(&sim);
    printer.connect().unwrap();
    sim.set(|b| {
        b.silent.insert((0x0B, GET));
    });

    thread::scope(|s| {
        let waiter = s.spawn(|| printer.get_battery_level());
        assert!(eventually(|| sim.written(0x0B, GET).len() == 1));
        thread::sleep(Duration::from_millis(20));
        printer.disconnect();
        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, StepError::SessionClosed(_)));
    });
}

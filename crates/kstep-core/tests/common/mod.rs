//! Simulated printer behind a `MockTransport`.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use kstep_core::protocol::constants::*;
use kstep_core::{
    DeviceType, Frame, MockTransport, SessionConfig, SessionState, StepEvent, StepObserver,
    StepPrinter,
};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Knobs for the simulated printer. Change them through [`SimPrinter::set`].
#[derive(Debug, Clone)]
pub struct Behaviour {
    pub device: DeviceType,
    pub max_payload: u16,
    pub handshake_error: u8,
    pub ready_error: u8,
    /// Overrides the transfer type echoed in ready acknowledgments.
    pub ready_type: Option<u8>,
    pub finish_error: u8,
    /// Added to the received count reported on completion.
    pub received_skew: i64,
    pub battery_level: u8,
    pub query_error: u8,
    /// Pairs the printer never answers.
    pub silent: HashSet<(u8, u8)>,
    /// Do not report completion of any transfer.
    pub silent_completion: bool,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            device: DeviceType::Standard,
            max_payload: 120,
            handshake_error: 0,
            ready_error: 0,
            ready_type: None,
            finish_error: 0,
            received_skew: 0,
            battery_level: 77,
            query_error: 0,
            silent: HashSet::new(),
            silent_completion: false,
        }
    }
}

#[derive(Debug, Default)]
struct Upload {
    transfer_type: u8,
    expected: u32,
    received: u32,
}

#[derive(Debug, Default)]
struct SimState {
    behaviour: Behaviour,
    upload: Option<Upload>,
}

/// Answers requests the way a KODAK STEP printer does.
pub struct SimPrinter {
    pub mock: MockTransport,
    state: Arc<Mutex<SimState>>,
}

impl SimPrinter {
    pub fn new() -> Self {
        Self::with_behaviour(Behaviour::default())
    }

    pub fn with_behaviour(behaviour: Behaviour) -> Self {
        let mock = MockTransport::new();
        let state = Arc::new(Mutex::new(SimState {
            behaviour,
            upload: None,
        }));
        let shared = Arc::clone(&state);
        mock.set_responder(move |data| respond(&mut shared.lock().unwrap(), data));
        Self { mock, state }
    }

    pub fn set(&self, f: impl FnOnce(&mut Behaviour)) {
        f(&mut self.state.lock().unwrap().behaviour);
    }

    /// Frame the printer would send, for queuing unsolicited traffic.
    pub fn frame(&self, cmd: u8, sub: u8, payload: &[u8]) -> Frame {
        let device = self.state.lock().unwrap().behaviour.device;
        Frame::encode(cmd, sub, device, payload).unwrap()
    }

    /// Frames written by the host with the given key.
    pub fn written(&self, cmd: u8, sub: u8) -> Vec<Vec<u8>> {
        self.mock
            .get_writes()
            .into_iter()
            .filter(|w| w.len() >= FRAME_LEN && w[6] == cmd && w[7] == sub && w[..4] == MAGIC)
            .collect()
    }
}

fn reply(device: DeviceType, cmd: u8, sub: u8, payload: &[u8]) -> Vec<u8> {
    Frame::encode(cmd, sub, device, payload)
        .unwrap()
        .as_bytes()
        .to_vec()
}

fn ready_ack(b: &Behaviour, cmd: u8, sub: u8, transfer_type: u8) -> Vec<u8> {
    let ty = b.ready_type.unwrap_or(transfer_type);
    let m = b.max_payload.to_be_bytes();
    reply(b.device, cmd, sub, &[b.ready_error, ty, m[0], m[1]])
}

fn size_at(frame: &Frame, offset: usize) -> u32 {
    let b = frame.as_bytes();
    ((b[offset] as u32) << 16) | ((b[offset + 1] as u32) << 8) | b[offset + 2] as u32
}

fn respond(sim: &mut SimState, data: &[u8]) -> Vec<Vec<u8>> {
    let b = sim.behaviour.clone();
    let Ok(frame) = Frame::decode(data) else {
        // Raw image bytes.
        return receive(sim, data.len(), &b);
    };
    if b.silent.contains(&frame.key()) {
        return Vec::new();
    }

    let d = b.device;
    let ok = |cmd, sub, payload: &[u8]| vec![reply(d, cmd, sub, payload)];
    match frame.key() {
        (0x01, ACCESSORY_INFO) => ok(
            0x01,
            ACCESSORY_INFO,
            &[b.handshake_error, 80, 5, 0x00, 0x0A, 0xA4, 0xC1, 0x38, 0x00, 0x11, 0x22],
        ),
        (0x00, PRINT_READY) => {
            start_upload(sim, TRANSFER_IMAGE, size_at(&frame, 8), &b);
            vec![ready_ack(&b, 0x00, PRINT_READY, TRANSFER_IMAGE)]
        }
        (0x00, PRINT_CANCEL) => {
            sim.upload = None;
            ok(0x00, PRINT_CANCEL, &[0])
        }
        (0x03, UPGRADE_ENTER_UPDATE_MODE) => ok(0x03, UPGRADE_ENTER_UPDATE_MODE, &[0]),
        (0x03, UPGRADE_READY) => {
            start_upload(sim, TRANSFER_FIRMWARE, size_at(&frame, 8), &b);
            vec![ready_ack(&b, 0x03, UPGRADE_READY, TRANSFER_FIRMWARE)]
        }
        (0x08, STICKER_READY) => {
            start_upload(sim, TRANSFER_STICKER, size_at(&frame, 8), &b);
            vec![ready_ack(&b, 0x08, STICKER_READY, TRANSFER_STICKER)]
        }
        (0x09, BORDER_READY) => {
            start_upload(sim, TRANSFER_BORDER, size_at(&frame, 8), &b);
            vec![ready_ack(&b, 0x09, BORDER_READY, TRANSFER_BORDER)]
        }
        (0x07, DEVICE_NAME_READY) => {
            start_upload(sim, TRANSFER_DEVICE_NAME, size_at(&frame, 8), &b);
            vec![ready_ack(&b, 0x07, DEVICE_NAME_READY, TRANSFER_DEVICE_NAME)]
        }
        (0x07, DEVICE_NAME_GET) => ok(0x07, DEVICE_NAME_GET, b"STEP-A1B2"),
        (0x0D, UPLOAD_CHUNK) => receive(sim, data.len() - FRAME_LEN, &b),
        (0x0B, GET) => ok(0x0B, GET, &[b.query_error, b.battery_level]),
        (0x0A, GET) => ok(0x0A, GET, &[b.query_error, 1]),
        (0x0C, GET) => ok(0x0C, GET, &[b.query_error, 10]),
        (0x0C, AUTO_POWER_OFF_SET) => ok(0x0C, AUTO_POWER_OFF_SET, &[b.query_error]),
        (0x02, sub @ (FIRMWARE_VERSION | FIRMWARE_MINOR_VERSION)) => {
            let mut bytes = *Frame::encode(0x02, sub, d, &[]).unwrap().as_bytes();
            let base = match d {
                DeviceType::Standard => {
                    bytes[8] = 3;
                    9
                }
                DeviceType::Slim => {
                    bytes[5] = 3;
                    8
                }
            };
            bytes[base..base + 9].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
            vec![bytes.to_vec()]
        }
        _ => Vec::new(),
    }
}

fn start_upload(sim: &mut SimState, transfer_type: u8, expected: u32, b: &Behaviour) {
    sim.upload = (b.ready_error == 0).then_some(Upload {
        transfer_type,
        expected,
        received: 0,
    });
}

fn receive(sim: &mut SimState, len: usize, b: &Behaviour) -> Vec<Vec<u8>> {
    let Some(upload) = sim.upload.as_mut() else {
        return Vec::new();
    };
    upload.received += len as u32;
    if upload.received < upload.expected || b.silent_completion {
        return Vec::new();
    }
    let Some(done) = sim.upload.take() else {
        return Vec::new();
    };
    let d = b.device;
    match done.transfer_type {
        TRANSFER_IMAGE => vec![reply(d, 0x00, PRINT_FINISHED, &[b.finish_error])],
        TRANSFER_FIRMWARE => vec![reply(d, 0x03, UPGRADE_STATUS, &[b.finish_error])],
        ty => {
            let received = (done.received as i64 + b.received_skew) as u32;
            let r = received.to_be_bytes();
            vec![reply(
                d,
                0x0D,
                UPLOAD_COMPLETE,
                &[b.finish_error, ty, r[1], r[2], r[3]],
            )]
        }
    }
}

/// Observer that keeps every event.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<StepEvent>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<StepEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StepEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }
}

impl StepObserver for Recorder {
    fn on_event(&self, event: &StepEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub fn fast_config(device: DeviceType) -> SessionConfig {
    SessionConfig {
        operation_timeout_ms: 2_000,
        print_timeout_ms: 1_000,
        pacing_delay_ms: 1,
        late_frame_window_ms: 500,
        ..SessionConfig::for_device(device)
    }
}

pub fn printer(sim: &SimPrinter) -> (StepPrinter<MockTransport, Recorder>, Arc<Recorder>) {
    printer_with(sim, fast_config(DeviceType::Standard))
}

pub fn printer_with(
    sim: &SimPrinter,
    config: SessionConfig,
) -> (StepPrinter<MockTransport, Recorder>, Arc<Recorder>) {
    init_tracing();
    let recorder = Arc::new(Recorder::default());
    let printer = StepPrinter::with_observer(sim.mock.clone(), config, Arc::clone(&recorder));
    (printer, recorder)
}

/// Poll until `f` holds or a second passes.
pub fn eventually(mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    f()
}

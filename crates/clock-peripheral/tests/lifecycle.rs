//! Lifecycle manager behavior against the simulated transport.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ble_api::{BleTransport, PeerAddress};
use ble_sim::{SimCall, SimOp, SimTransport};
use clock_peripheral::{BleProcess, GreetingLink, PeripheralState, ProcessConfig, GREETING};
use equeue::EventQueue;

const PEER: PeerAddress = PeerAddress([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);

fn setup() -> (Arc<EventQueue>, Arc<SimTransport>, Arc<BleProcess>) {
    let queue = EventQueue::new();
    let transport = SimTransport::new(queue.clone());
    let process = BleProcess::new(
        transport.clone() as Arc<dyn BleTransport>,
        queue.clone(),
        ProcessConfig::default(),
    );
    (queue, transport, process)
}

#[derive(Default)]
struct RecordingLink {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl GreetingLink for RecordingLink {
    fn send_greeting(&self, payload: &[u8]) -> io::Result<()> {
        self.sent.lock().unwrap().push(payload.to_vec());
        Ok(())
    }
}

struct BrokenLink;

impl GreetingLink for BrokenLink {
    fn send_greeting(&self, _payload: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "link down"))
    }
}

#[test]
fn start_configures_advertising_and_activates_once() {
    let (queue, transport, process) = setup();

    let activations = Arc::new(AtomicUsize::new(0));
    let probe = activations.clone();
    process.on_ready(move |_, _| {
        probe.fetch_add(1, Ordering::SeqCst);
    });

    assert!(process.start());
    assert_eq!(process.state(), PeripheralState::Initializing);
    assert_eq!(activations.load(Ordering::SeqCst), 0, "completion not pumped yet");

    queue.advance(0);
    assert_eq!(process.state(), PeripheralState::Advertising);
    assert!(transport.is_advertising());
    assert_eq!(activations.load(Ordering::SeqCst), 1);

    assert_eq!(
        transport.calls(),
        vec![
            SimCall::Init,
            SimCall::SetAdvertisingParameters,
            SimCall::SetAdvertisingPayload {
                local_name: "ble-clock".to_owned()
            },
            SimCall::StartAdvertising,
        ]
    );
}

#[test]
fn starting_twice_fails_without_further_transport_calls() {
    let (queue, transport, process) = setup();

    assert!(process.start());
    queue.advance(0);
    transport.take_calls();

    assert!(!process.start());
    assert!(transport.calls().is_empty());
    assert_eq!(process.state(), PeripheralState::Advertising);
}

#[test]
fn rejected_init_call_fails_the_start() {
    let (queue, transport, process) = setup();
    transport.fail_next(SimOp::Init, 5);

    assert!(!process.start());
    assert_eq!(process.state(), PeripheralState::Failed);

    queue.advance(0);
    assert_eq!(transport.calls(), vec![SimCall::Init]);
}

#[test]
fn init_error_delivery_halts_all_setup() {
    let (queue, transport, process) = setup();
    transport.fail_init_delivery(9);

    let activations = Arc::new(AtomicUsize::new(0));
    let probe = activations.clone();
    process.on_ready(move |_, _| {
        probe.fetch_add(1, Ordering::SeqCst);
    });

    assert!(process.start());
    queue.advance(0);

    assert_eq!(process.state(), PeripheralState::Failed);
    assert_eq!(activations.load(Ordering::SeqCst), 0);
    assert_eq!(transport.calls(), vec![SimCall::Init]);
}

#[test]
fn parameter_failure_aborts_the_remaining_steps() {
    let (queue, transport, process) = setup();
    transport.fail_next(SimOp::SetAdvertisingParameters, 3);

    let activations = Arc::new(AtomicUsize::new(0));
    let probe = activations.clone();
    process.on_ready(move |_, _| {
        probe.fetch_add(1, Ordering::SeqCst);
    });

    assert!(process.start());
    queue.advance(0);

    // No payload call, no advertising call, no activation.
    assert_eq!(
        transport.calls(),
        vec![SimCall::Init, SimCall::SetAdvertisingParameters]
    );
    assert!(!transport.is_advertising());
    assert_eq!(activations.load(Ordering::SeqCst), 0);
    assert_eq!(process.state(), PeripheralState::Failed);
}

#[test]
fn advertising_start_failure_suppresses_activation() {
    let (queue, transport, process) = setup();
    transport.fail_next(SimOp::StartAdvertising, 8);

    let activations = Arc::new(AtomicUsize::new(0));
    let probe = activations.clone();
    process.on_ready(move |_, _| {
        probe.fetch_add(1, Ordering::SeqCst);
    });

    assert!(process.start());
    queue.advance(0);

    assert_eq!(process.state(), PeripheralState::Failed);
    assert_eq!(activations.load(Ordering::SeqCst), 0);
    assert!(!transport.is_advertising());
}

#[test]
fn disconnection_restarts_advertising() {
    let (queue, transport, process) = setup();
    assert!(process.start());
    queue.advance(0);

    transport.connect(PEER);
    assert_eq!(process.state(), PeripheralState::Connected);
    transport.take_calls();

    transport.disconnect();
    let calls = transport.calls();
    assert_eq!(calls.first(), Some(&SimCall::StartAdvertising));
    assert_eq!(process.state(), PeripheralState::Advertising);
    assert!(transport.is_advertising());
}

#[test]
fn connection_sends_the_fixed_greeting() {
    let (queue, transport, process) = setup();
    let link = Arc::new(RecordingLink::default());
    process.set_greeting(link.clone());

    assert!(process.start());
    queue.advance(0);
    transport.connect(PEER);

    assert_eq!(*link.sent.lock().unwrap(), vec![GREETING.to_vec()]);
}

#[test]
fn greeting_failure_is_not_fatal() {
    let (queue, transport, process) = setup();
    process.set_greeting(Arc::new(BrokenLink));

    assert!(process.start());
    queue.advance(0);
    transport.connect(PEER);

    assert_eq!(process.state(), PeripheralState::Connected);
    transport.take_calls();
    transport.disconnect();
    assert_eq!(process.state(), PeripheralState::Advertising);
}

#[test]
fn stop_shuts_the_transport_down_once() {
    let (queue, transport, process) = setup();
    assert!(process.start());
    queue.advance(0);
    transport.take_calls();

    process.stop();
    assert_eq!(transport.calls(), vec![SimCall::Shutdown]);

    process.stop();
    assert_eq!(transport.calls(), vec![SimCall::Shutdown], "stop is idempotent");
}

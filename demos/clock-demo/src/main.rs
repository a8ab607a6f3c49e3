//! BLE clock peripheral wired to the simulated transport.
//!
//! Runs the full lifecycle (init, advertising setup, service registration,
//! one-second ticks) and scripts a small central-side session against the
//! sim: connect, subscribe to the second characteristic, set the minute.
//! Set `RUST_LOG=info` (or `debug`) to watch it.

use std::sync::Arc;

use clap::Parser;
use log::{info, warn};

use ble_api::{BleTransport, PeerAddress};
use ble_sim::SimTransport;
use clock_peripheral::{BleProcess, ClockService, ProcessConfig, TcpGreeting};
use equeue::EventQueue;

#[derive(Parser)]
#[command(name = "clock-demo", version, about)]
struct Args {
    /// Advertised device name.
    #[arg(long, default_value = "ble-clock")]
    name: String,

    /// TCP address greeted on connection, e.g. 127.0.0.1:8002.
    #[arg(long)]
    greet: Option<String>,

    /// Connection attempts for the greeting link.
    #[arg(long, default_value_t = 10)]
    trials: u32,

    /// Stop after this many seconds instead of running forever.
    #[arg(long)]
    run_for: Option<u64>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let queue = EventQueue::new();
    let transport = SimTransport::new(queue.clone());
    let process = BleProcess::new(
        transport.clone() as Arc<dyn BleTransport>,
        queue.clone(),
        ProcessConfig {
            device_name: args.name,
        },
    );

    if let Some(addr) = args.greet.as_deref() {
        match TcpGreeting::connect(addr, args.trials) {
            Ok(link) => process.set_greeting(Arc::new(link)),
            Err(err) => warn!("no greeting link, continuing without one: {err}"),
        }
    }

    let service = ClockService::new();
    let activated = service.clone();
    process.on_ready(move |transport, queue| activated.start(transport, &queue));

    if !process.start() {
        return;
    }

    script_central(&queue, &transport, &service);

    let clock = service.clone();
    let store = transport.clone();
    queue.call_every(5_000, move || {
        if let Some(handles) = clock.handles() {
            let hour = store.peek_attribute(handles.hour).unwrap_or(0);
            let minute = store.peek_attribute(handles.minute).unwrap_or(0);
            let second = store.peek_attribute(handles.second).unwrap_or(0);
            info!("time {hour:02}:{minute:02}:{second:02}");
        }
    });

    if let Some(seconds) = args.run_for {
        let stopper = queue.clone();
        queue.call_in(seconds * 1_000, move || stopper.break_dispatch());
    }

    queue.dispatch_forever();
    process.stop();
}

/// Scripted central-side session against the sim transport.
fn script_central(
    queue: &Arc<EventQueue>,
    transport: &Arc<SimTransport>,
    service: &Arc<ClockService>,
) {
    let sim = transport.clone();
    queue.call_in(2_000, move || {
        sim.connect(PeerAddress([0xc0, 0xff, 0xee, 0x00, 0x00, 0x01]));
    });

    let sim = transport.clone();
    let clock = service.clone();
    queue.call_in(3_000, move || {
        if let Some(handles) = clock.handles() {
            sim.subscribe(handles.second, true);
        }
    });

    let sim = transport.clone();
    let clock = service.clone();
    queue.call_in(4_000, move || {
        if let Some(handles) = clock.handles() {
            sim.client_write(handles.minute, 0, &[30]);
        }
    });
}

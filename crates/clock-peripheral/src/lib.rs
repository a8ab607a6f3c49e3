//! # clock-peripheral
//!
//! Control core of a BLE peripheral that exposes an hour/minute/second clock
//! over GATT. Two tightly coupled components share one cooperative event
//! queue:
//!
//! - [`process::BleProcess`] owns the transport lifecycle: the one-shot
//!   initialization handshake, advertising setup, and connection handling.
//!   After a fully successful setup it fires a registered activation
//!   callback exactly once.
//! - [`clock::ClockService`] registers the three clock characteristics,
//!   gates client writes, and advances the time by one second per queue
//!   tick, carrying wraps from seconds into minutes and hours.
//!
//! Everything runs serialized on the queue; no handler preempts another,
//! which is what makes the multi-attribute tick cascade safe without extra
//! locking.

pub mod clock;
pub mod greeting;
pub mod process;

pub use clock::{ClockField, ClockHandles, ClockService, TICK_PERIOD_MS};
pub use greeting::{GreetingLink, TcpGreeting, GREETING};
pub use process::{BleProcess, PeripheralState, ProcessConfig};

//! Peripheral lifecycle: initialization handshake, advertising setup,
//! connection handling.

use core::fmt;
use std::sync::{Arc, Weak};

use log::{error, info, warn};
use parking_lot::Mutex;

use ble_api::{
    AdvertisingParameters, AdvertisingPayload, BleError, BleTransport, ConnectionObserver,
    PeerAddress,
};
use equeue::EventQueue;

use crate::greeting::{GreetingLink, GREETING};

/// Lifecycle state of the one live peripheral instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralState {
    Uninitialized,
    Initializing,
    Advertising,
    Connected,
    /// Terminal for this run; no retry, no rollback.
    Failed,
}

impl fmt::Display for PeripheralState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Advertising => "advertising",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Peripheral configuration, passed by value at construction.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Human-readable device name carried in the advertising payload.
    pub device_name: String,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            device_name: "ble-clock".to_owned(),
        }
    }
}

type ActivationCallback = Box<dyn FnOnce(Arc<dyn BleTransport>, Arc<EventQueue>) + Send>;

/// Owns the transport's advertise/connect/disconnect lifecycle.
///
/// `start()` kicks off asynchronous initialization; once the completion
/// arrives through the queue the process configures advertising and, if
/// every step succeeded, hands the transport and queue to the registered
/// activation callback.
pub struct BleProcess {
    me: Weak<Self>,
    transport: Arc<dyn BleTransport>,
    queue: Arc<EventQueue>,
    config: ProcessConfig,
    greeting: Mutex<Option<Arc<dyn GreetingLink>>>,
    state: Mutex<PeripheralState>,
    on_ready: Mutex<Option<ActivationCallback>>,
}

impl BleProcess {
    pub fn new(
        transport: Arc<dyn BleTransport>,
        queue: Arc<EventQueue>,
        config: ProcessConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            transport,
            queue,
            config,
            greeting: Mutex::new(None),
            state: Mutex::new(PeripheralState::Uninitialized),
            on_ready: Mutex::new(None),
        })
    }

    fn me(&self) -> Arc<Self> {
        // Always valid while a method runs on the owning Arc.
        self.me.upgrade().expect("process still allocated")
    }

    /// Attaches the optional network greeting link used on connection.
    pub fn set_greeting(&self, link: Arc<dyn GreetingLink>) {
        *self.greeting.lock() = Some(link);
    }

    /// Registers the activation callback invoked once advertising is fully
    /// set up. Fires at most once.
    pub fn on_ready<F>(&self, callback: F)
    where
        F: FnOnce(Arc<dyn BleTransport>, Arc<EventQueue>) + Send + 'static,
    {
        *self.on_ready.lock() = Some(Box::new(callback));
    }

    pub fn state(&self) -> PeripheralState {
        *self.state.lock()
    }

    /// Initializes the transport. Returns `false` if the transport was
    /// already initialized or rejected the call; `true` means the request
    /// was accepted, with completion delivered later through the queue.
    pub fn start(&self) -> bool {
        info!("ble process started");

        if self.transport.is_initialized() {
            error!("the transport instance has already been initialized");
            return false;
        }

        *self.state.lock() = PeripheralState::Initializing;

        let process = self.me();
        if let Err(err) = self
            .transport
            .init(Box::new(move |result| process.when_init_complete(result)))
        {
            error!("error {} returned by transport init", err.code());
            *self.state.lock() = PeripheralState::Failed;
            return false;
        }

        true
    }

    /// Shuts the transport down if it is up. Idempotent; also runs on drop.
    pub fn stop(&self) {
        if self.transport.is_initialized() {
            self.transport.shutdown();
            info!("ble process stopped");
        }
    }

    /// Sets up advertising and hands off to the activation callback.
    ///
    /// Invoked at most once, from the queue. Each configuration step fails
    /// independently; the first failure aborts the remaining steps and the
    /// callback never fires.
    fn when_init_complete(&self, result: Result<(), BleError>) {
        if let Err(err) = result {
            error!("error {} during the initialization", err.code());
            *self.state.lock() = PeripheralState::Failed;
            return;
        }
        info!("transport instance initialized");

        self.transport
            .register_connection_observer(self.me() as Arc<dyn ConnectionObserver>);

        if !self.set_advertising_parameters()
            || !self.set_advertising_payload()
            || !self.start_advertising()
        {
            *self.state.lock() = PeripheralState::Failed;
            return;
        }

        *self.state.lock() = PeripheralState::Advertising;

        if let Some(callback) = self.on_ready.lock().take() {
            callback(Arc::clone(&self.transport), Arc::clone(&self.queue));
        }
    }

    fn set_advertising_parameters(&self) -> bool {
        if let Err(err) = self
            .transport
            .set_advertising_parameters(&AdvertisingParameters::default())
        {
            error!("set_advertising_parameters failed with error {}", err.code());
            return false;
        }
        true
    }

    fn set_advertising_payload(&self) -> bool {
        let payload = match AdvertisingPayload::builder()
            .with_local_name(self.config.device_name.clone())
            .build()
        {
            Ok(payload) => payload,
            Err(err) => {
                error!("building advertising payload failed with error {}", err.code());
                return false;
            }
        };

        if let Err(err) = self.transport.set_advertising_payload(&payload) {
            error!("set_advertising_payload failed with error {}", err.code());
            return false;
        }
        true
    }

    fn start_advertising(&self) -> bool {
        match self.transport.start_advertising() {
            Ok(()) => {
                info!("advertising started");
                true
            }
            Err(err) => {
                error!("start_advertising failed with error {}", err.code());
                false
            }
        }
    }
}

impl ConnectionObserver for BleProcess {
    fn on_connection(&self, peer: PeerAddress) {
        info!("connected to {peer}");
        *self.state.lock() = PeripheralState::Connected;

        let link = self.greeting.lock().clone();
        if let Some(link) = link {
            // A greeting failure is reported but never fatal.
            if let Err(err) = link.send_greeting(GREETING) {
                warn!("failed to send greeting: {err}");
            }
        }
    }

    fn on_disconnection(&self) {
        info!("disconnected");
        if self.start_advertising() {
            *self.state.lock() = PeripheralState::Advertising;
        }
    }
}

impl Drop for BleProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

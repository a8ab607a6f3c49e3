//! # ble-sim
//!
//! Host-side stand-in for the wireless transport stack: an in-memory
//! attribute store behind the [`BleTransport`] trait, with the client side
//! of the link driven programmatically.
//!
//! Every mutating transport call is recorded in an inspectable log and can
//! be made to fail on demand, which is what the lifecycle and service test
//! suites are built on. Initialization completion is delivered through the
//! shared event queue, matching the asynchronous contract of the real
//! stack.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;

use ble_api::{
    AdvertisingParameters, AdvertisingPayload, AttributeHandle, AttributeObserver, AuthorizeReply,
    BleError, BleTransport, ConnectionObserver, InitCallback, PeerAddress, ReadEvent,
    ServiceDescriptor, ServiceHandle, WriteAuthorizer, WriteEvent, WriteRequest,
};
use equeue::EventQueue;

/// Connection handle reported in attribute events while a peer is connected.
const SIM_CONNECTION: u16 = 1;

/// Operations that can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SimOp {
    Init,
    SetAdvertisingParameters,
    SetAdvertisingPayload,
    StartAdvertising,
    RegisterService,
    ReadAttribute,
    WriteAttribute,
}

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCall {
    Init,
    SetAdvertisingParameters,
    SetAdvertisingPayload { local_name: String },
    StartAdvertising,
    RegisterService,
    ReadAttribute(AttributeHandle),
    WriteAttribute {
        handle: AttributeHandle,
        value: u8,
        local_only: bool,
    },
    Shutdown,
}

struct Planned {
    skip: u32,
    code: u32,
}

#[derive(Default)]
struct Inner {
    initialized: bool,
    advertising: bool,
    connected: bool,
    attrs: BTreeMap<AttributeHandle, u8>,
    subscriptions: BTreeSet<AttributeHandle>,
    next_handle: u16,
    connection_observer: Option<Arc<dyn ConnectionObserver>>,
    attribute_observer: Option<Arc<dyn AttributeObserver>>,
    authorizers: BTreeMap<AttributeHandle, Arc<dyn WriteAuthorizer>>,
    calls: Vec<SimCall>,
    failures: BTreeMap<SimOp, Planned>,
    fail_init_delivery: Option<u32>,
}

/// Simulated transport. Construct with the queue the peripheral runs on.
pub struct SimTransport {
    queue: Arc<EventQueue>,
    inner: Mutex<Inner>,
}

impl SimTransport {
    pub fn new(queue: Arc<EventQueue>) -> Arc<Self> {
        Arc::new(Self {
            queue,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Makes the next call of `op` fail with `code`.
    pub fn fail_next(&self, op: SimOp, code: u32) {
        self.fail_after(op, 0, code);
    }

    /// Makes the call of `op` after `skip` further successful ones fail.
    pub fn fail_after(&self, op: SimOp, skip: u32, code: u32) {
        self.inner.lock().failures.insert(op, Planned { skip, code });
    }

    /// Makes the *delivered* init completion carry an error, while the init
    /// call itself is accepted.
    pub fn fail_init_delivery(&self, code: u32) {
        self.inner.lock().fail_init_delivery = Some(code);
    }

    pub fn calls(&self) -> Vec<SimCall> {
        self.inner.lock().calls.clone()
    }

    /// Returns the recorded calls and clears the log.
    pub fn take_calls(&self) -> Vec<SimCall> {
        std::mem::take(&mut self.inner.lock().calls)
    }

    pub fn is_advertising(&self) -> bool {
        self.inner.lock().advertising
    }

    /// Reads an attribute without going through the transport interface or
    /// the call log.
    pub fn peek_attribute(&self, handle: AttributeHandle) -> Option<u8> {
        self.inner.lock().attrs.get(&handle).copied()
    }

    /// Client-initiated write: consults the registered authorization gate,
    /// commits only on acceptance and then reports the committed write.
    pub fn client_write(
        &self,
        handle: AttributeHandle,
        offset: u16,
        data: &[u8],
    ) -> AuthorizeReply {
        let authorizer = self.inner.lock().authorizers.get(&handle).cloned();
        let reply = match authorizer {
            Some(gate) => gate.authorize_write(&WriteRequest {
                handle,
                offset,
                data,
            }),
            None => AuthorizeReply::Accepted,
        };
        trace!("client write on {handle}: {reply:?}");
        if !reply.is_accepted() {
            return reply;
        }

        let observer = {
            let mut inner = self.inner.lock();
            if let Some(value) = data.first() {
                inner.attrs.insert(handle, *value);
            }
            inner.attribute_observer.clone()
        };
        if let Some(observer) = observer {
            observer.on_data_written(&WriteEvent {
                connection: SIM_CONNECTION,
                handle,
                offset,
                data: data.to_vec(),
            });
        }
        reply
    }

    /// Client-initiated read; reports the read and returns the stored value.
    pub fn client_read(&self, handle: AttributeHandle) -> Option<u8> {
        let (value, observer) = {
            let inner = self.inner.lock();
            (inner.attrs.get(&handle).copied(), inner.attribute_observer.clone())
        };
        if value.is_some() {
            if let Some(observer) = observer {
                observer.on_data_read(&ReadEvent {
                    connection: SIM_CONNECTION,
                    handle,
                });
            }
        }
        value
    }

    /// Simulates a central connecting. Advertising stops, as it would on a
    /// single advertising set.
    pub fn connect(&self, peer: PeerAddress) {
        let observer = {
            let mut inner = self.inner.lock();
            inner.connected = true;
            inner.advertising = false;
            inner.connection_observer.clone()
        };
        if let Some(observer) = observer {
            observer.on_connection(peer);
        }
    }

    pub fn disconnect(&self) {
        let observer = {
            let mut inner = self.inner.lock();
            inner.connected = false;
            inner.connection_observer.clone()
        };
        if let Some(observer) = observer {
            observer.on_disconnection();
        }
    }

    /// Toggles the client's notification/indication subscription on a value
    /// handle.
    pub fn subscribe(&self, handle: AttributeHandle, enabled: bool) {
        let observer = {
            let mut inner = self.inner.lock();
            if enabled {
                inner.subscriptions.insert(handle);
            } else {
                inner.subscriptions.remove(&handle);
            }
            inner.attribute_observer.clone()
        };
        if let Some(observer) = observer {
            if enabled {
                observer.on_updates_enabled(handle);
            } else {
                observer.on_updates_disabled(handle);
            }
        }
    }

    /// Simulates an indication confirmation from the client.
    pub fn confirm(&self, handle: AttributeHandle) {
        let observer = self.inner.lock().attribute_observer.clone();
        if let Some(observer) = observer {
            observer.on_confirmation_received(handle);
        }
    }
}

impl SimTransport {
    fn planned_failure(inner: &mut Inner, op: SimOp) -> Option<u32> {
        let planned = inner.failures.get_mut(&op)?;
        if planned.skip > 0 {
            planned.skip -= 1;
            return None;
        }
        let code = planned.code;
        inner.failures.remove(&op);
        Some(code)
    }
}

impl BleTransport for SimTransport {
    fn is_initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    fn init(&self, on_complete: InitCallback) -> Result<(), BleError> {
        let delivery = {
            let mut inner = self.inner.lock();
            inner.calls.push(SimCall::Init);
            if let Some(code) = Self::planned_failure(&mut inner, SimOp::Init) {
                return Err(BleError::OperationFailed(code));
            }
            if inner.initialized {
                return Err(BleError::AlreadyInitialized);
            }
            inner.initialized = true;
            inner.fail_init_delivery.take()
        };

        let result = match delivery {
            Some(code) => Err(BleError::OperationFailed(code)),
            None => Ok(()),
        };
        debug!("init accepted, completion queued ({result:?})");
        self.queue.call(move || on_complete(result));
        Ok(())
    }

    fn set_advertising_parameters(&self, _params: &AdvertisingParameters) -> Result<(), BleError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SimCall::SetAdvertisingParameters);
        if let Some(code) = Self::planned_failure(&mut inner, SimOp::SetAdvertisingParameters) {
            return Err(BleError::OperationFailed(code));
        }
        Ok(())
    }

    fn set_advertising_payload(&self, payload: &AdvertisingPayload) -> Result<(), BleError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SimCall::SetAdvertisingPayload {
            local_name: payload.local_name().to_owned(),
        });
        if let Some(code) = Self::planned_failure(&mut inner, SimOp::SetAdvertisingPayload) {
            return Err(BleError::OperationFailed(code));
        }
        Ok(())
    }

    fn start_advertising(&self) -> Result<(), BleError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SimCall::StartAdvertising);
        if let Some(code) = Self::planned_failure(&mut inner, SimOp::StartAdvertising) {
            return Err(BleError::OperationFailed(code));
        }
        if !inner.initialized {
            return Err(BleError::NotInitialized);
        }
        // Re-starting an already-advertising set is a no-op success.
        inner.advertising = true;
        Ok(())
    }

    fn register_connection_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.inner.lock().connection_observer = Some(observer);
    }

    fn register_service(&self, service: &ServiceDescriptor) -> Result<ServiceHandle, BleError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SimCall::RegisterService);
        if let Some(code) = Self::planned_failure(&mut inner, SimOp::RegisterService) {
            return Err(BleError::OperationFailed(code));
        }

        inner.next_handle += 1;
        let declaration = AttributeHandle(inner.next_handle);
        let mut value_handles = Vec::with_capacity(service.characteristics.len());
        for characteristic in &service.characteristics {
            inner.next_handle += 2;
            let handle = AttributeHandle(inner.next_handle);
            inner.attrs.insert(handle, characteristic.initial_value);
            value_handles.push(handle);
        }
        debug!(
            "registered service {} at {declaration} with {} characteristics",
            service.uuid,
            value_handles.len()
        );
        Ok(ServiceHandle {
            service: declaration,
            value_handles,
        })
    }

    fn read_attribute(&self, handle: AttributeHandle) -> Result<u8, BleError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SimCall::ReadAttribute(handle));
        if let Some(code) = Self::planned_failure(&mut inner, SimOp::ReadAttribute) {
            return Err(BleError::OperationFailed(code));
        }
        inner.attrs.get(&handle).copied().ok_or(BleError::InvalidHandle)
    }

    fn write_attribute(
        &self,
        handle: AttributeHandle,
        value: u8,
        local_only: bool,
    ) -> Result<(), BleError> {
        let observer = {
            let mut inner = self.inner.lock();
            inner.calls.push(SimCall::WriteAttribute {
                handle,
                value,
                local_only,
            });
            if let Some(code) = Self::planned_failure(&mut inner, SimOp::WriteAttribute) {
                return Err(BleError::OperationFailed(code));
            }
            if !inner.attrs.contains_key(&handle) {
                return Err(BleError::InvalidHandle);
            }
            inner.attrs.insert(handle, value);
            if !local_only && inner.connected && inner.subscriptions.contains(&handle) {
                inner.attribute_observer.clone()
            } else {
                None
            }
        };
        if let Some(observer) = observer {
            observer.on_data_sent(1);
        }
        Ok(())
    }

    fn register_attribute_observer(&self, observer: Arc<dyn AttributeObserver>) {
        self.inner.lock().attribute_observer = Some(observer);
    }

    fn register_write_authorizer(
        &self,
        handle: AttributeHandle,
        authorizer: Arc<dyn WriteAuthorizer>,
    ) {
        self.inner.lock().authorizers.insert(handle, authorizer);
    }

    fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.calls.push(SimCall::Shutdown);
        inner.initialized = false;
        inner.advertising = false;
        inner.connected = false;
    }
}

#[cfg(test)]
mod tests;

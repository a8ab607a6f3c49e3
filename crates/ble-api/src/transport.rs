//! The transport trait and the handler capabilities it calls back into.

use core::fmt;
use std::sync::Arc;

use crate::advertising::{AdvertisingParameters, AdvertisingPayload};
use crate::error::BleError;
use crate::gatt::{
    AttributeHandle, AuthorizeReply, ReadEvent, ServiceDescriptor, ServiceHandle, WriteEvent,
    WriteRequest,
};

/// Public address of a connecting peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddress(pub [u8; 6]);

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Completion of the asynchronous transport initialization, delivered at
/// most once through the event queue.
pub type InitCallback = Box<dyn FnOnce(Result<(), BleError>) + Send>;

/// Connection lifecycle observer.
pub trait ConnectionObserver: Send + Sync {
    fn on_connection(&self, peer: PeerAddress);
    fn on_disconnection(&self);
}

/// Purely observational attribute event handler; never mutates state and
/// never rejects anything. All methods default to no-ops so implementors
/// subscribe only to what they report on.
pub trait AttributeObserver: Send + Sync {
    /// A batch of notifications or indications went out.
    fn on_data_sent(&self, _count: usize) {}
    fn on_data_written(&self, _event: &WriteEvent) {}
    fn on_data_read(&self, _event: &ReadEvent) {}
    fn on_updates_enabled(&self, _handle: AttributeHandle) {}
    fn on_updates_disabled(&self, _handle: AttributeHandle) {}
    fn on_confirmation_received(&self, _handle: AttributeHandle) {}
}

/// Write-authorization gate, consulted synchronously before a client write
/// is committed. The reply is its only effect.
pub trait WriteAuthorizer: Send + Sync {
    fn authorize_write(&self, request: &WriteRequest<'_>) -> AuthorizeReply;
}

/// Narrow interface to the wireless transport stack.
///
/// Calls that could block on the radio are asynchronous: they return once
/// the request is accepted and deliver their outcome as a later event on
/// the shared queue. The attribute store behind `read_attribute` /
/// `write_attribute` is the single source of truth for attribute values.
pub trait BleTransport: Send + Sync {
    fn is_initialized(&self) -> bool;

    /// Starts transport initialization. The completion is reported once via
    /// `on_complete`, never synchronously.
    fn init(&self, on_complete: InitCallback) -> Result<(), BleError>;

    fn set_advertising_parameters(&self, params: &AdvertisingParameters) -> Result<(), BleError>;
    fn set_advertising_payload(&self, payload: &AdvertisingPayload) -> Result<(), BleError>;
    /// Idempotent: starting an already-advertising set succeeds.
    fn start_advertising(&self) -> Result<(), BleError>;

    fn register_connection_observer(&self, observer: Arc<dyn ConnectionObserver>);

    fn register_service(&self, service: &ServiceDescriptor) -> Result<ServiceHandle, BleError>;
    fn read_attribute(&self, handle: AttributeHandle) -> Result<u8, BleError>;
    /// Writes an attribute value; with `local_only == false` the change is
    /// also pushed to subscribed clients.
    fn write_attribute(
        &self,
        handle: AttributeHandle,
        value: u8,
        local_only: bool,
    ) -> Result<(), BleError>;

    fn register_attribute_observer(&self, observer: Arc<dyn AttributeObserver>);
    fn register_write_authorizer(
        &self,
        handle: AttributeHandle,
        authorizer: Arc<dyn WriteAuthorizer>,
    );

    fn shutdown(&self);
}

//! Clock GATT service: registration, write authorization, tick cascade.

use std::sync::{Arc, Weak};

use log::{debug, error, info};
use parking_lot::Mutex;
use uuid::Uuid;

use ble_api::{
    AttributeHandle, AttributeObserver, AuthorizeReply, BleTransport, CharacteristicDescriptor,
    Properties, ReadEvent, ServiceDescriptor, WriteAuthorizer, WriteEvent, WriteRequest,
};
use equeue::EventQueue;

pub const CLOCK_SERVICE_UUID: Uuid = Uuid::from_u128(0x51311102_030e_485f_b122_f8f381aa84ed);
pub const HOUR_CHAR_UUID: Uuid = Uuid::from_u128(0x485f4145_52b9_4644_af1f_7a6b9322490f);
pub const MINUTE_CHAR_UUID: Uuid = Uuid::from_u128(0x0a924ca7_87cd_4699_a3bd_abdcd9cf126a);
pub const SECOND_CHAR_UUID: Uuid = Uuid::from_u128(0x8dd6a1b7_bc75_4741_8a26_264af75807de);

/// Period of the clock tick.
pub const TICK_PERIOD_MS: u64 = 1000;

/// The three exposed time fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockField {
    Hour,
    Minute,
    Second,
}

impl ClockField {
    /// Exclusive upper bound of the field's value range.
    pub const fn modulus(self) -> u8 {
        match self {
            Self::Hour => 24,
            Self::Minute | Self::Second => 60,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
        }
    }
}

/// Value handles assigned to the three characteristics at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockHandles {
    pub hour: AttributeHandle,
    pub minute: AttributeHandle,
    pub second: AttributeHandle,
}

impl ClockHandles {
    pub fn field_of(&self, handle: AttributeHandle) -> Option<ClockField> {
        if handle == self.hour {
            Some(ClockField::Hour)
        } else if handle == self.minute {
            Some(ClockField::Minute)
        } else if handle == self.second {
            Some(ClockField::Second)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct Inner {
    transport: Option<Arc<dyn BleTransport>>,
    handles: Option<ClockHandles>,
}

/// GATT service exposing hour/minute/second as single-byte characteristics.
///
/// The transport's attribute store is authoritative for the three values;
/// every get and set goes through it. The service itself is the write
/// authorizer of its characteristics and a purely observational attribute
/// event handler.
pub struct ClockService {
    me: Weak<Self>,
    inner: Mutex<Inner>,
}

impl ClockService {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            inner: Mutex::new(Inner::default()),
        })
    }

    fn me(&self) -> Arc<Self> {
        // Always valid while a method runs on the owning Arc.
        self.me.upgrade().expect("service still allocated")
    }

    /// Registers the service and arms the one-second tick. Idempotent: a
    /// second call returns immediately. A failed registration is logged and
    /// leaves the service unregistered; there is no retry.
    pub fn start(&self, transport: Arc<dyn BleTransport>, queue: &Arc<EventQueue>) {
        if self.inner.lock().transport.is_some() {
            return;
        }

        let descriptor = ServiceDescriptor {
            uuid: CLOCK_SERVICE_UUID,
            characteristics: [HOUR_CHAR_UUID, MINUTE_CHAR_UUID, SECOND_CHAR_UUID]
                .into_iter()
                .map(|uuid| CharacteristicDescriptor {
                    uuid,
                    initial_value: 0,
                    properties: Properties::READ
                        | Properties::WRITE
                        | Properties::NOTIFY
                        | Properties::INDICATE,
                })
                .collect(),
        };

        let registered = match transport.register_service(&descriptor) {
            Ok(registered) => registered,
            Err(err) => {
                error!("error {} during clock service registration", err.code());
                return;
            }
        };
        let handles = match registered.value_handles[..] {
            [hour, minute, second] => ClockHandles {
                hour,
                minute,
                second,
            },
            _ => {
                error!(
                    "transport returned {} value handles, expected 3",
                    registered.value_handles.len()
                );
                return;
            }
        };

        {
            let mut inner = self.inner.lock();
            inner.transport = Some(Arc::clone(&transport));
            inner.handles = Some(handles);
        }

        transport.register_attribute_observer(self.me() as Arc<dyn AttributeObserver>);
        for handle in [handles.hour, handles.minute, handles.second] {
            transport.register_write_authorizer(handle, self.me() as Arc<dyn WriteAuthorizer>);
        }

        info!("clock service registered");
        info!("service handle: {}", registered.service);
        info!("  hour characteristic value handle {}", handles.hour);
        info!("  minute characteristic value handle {}", handles.minute);
        info!("  second characteristic value handle {}", handles.second);

        let service = self.me();
        queue.call_every(TICK_PERIOD_MS, move || service.increment_second());
    }

    /// Value handles of the registered characteristics, if started.
    pub fn handles(&self) -> Option<ClockHandles> {
        self.inner.lock().handles
    }

    /// Advances the second, cascading a wrap into the minute. Failures are
    /// logged and abort the rest of this tick's cascade; the next tick
    /// resumes from the then-current stored values.
    fn increment_second(&self) {
        let Some((transport, handles)) = self.context() else {
            return;
        };

        let second = match transport.read_attribute(handles.second) {
            Ok(value) => value,
            Err(err) => {
                error!("read of the second value returned error {}", err.code());
                return;
            }
        };

        let second = (second + 1) % 60;

        if let Err(err) = transport.write_attribute(handles.second, second, false) {
            error!("write of the second value returned error {}", err.code());
            return;
        }

        if second == 0 {
            self.increment_minute(&transport, handles);
        }
    }

    fn increment_minute(&self, transport: &Arc<dyn BleTransport>, handles: ClockHandles) {
        let minute = match transport.read_attribute(handles.minute) {
            Ok(value) => value,
            Err(err) => {
                error!("read of the minute value returned error {}", err.code());
                return;
            }
        };

        let minute = (minute + 1) % 60;

        if let Err(err) = transport.write_attribute(handles.minute, minute, false) {
            error!("write of the minute value returned error {}", err.code());
            return;
        }

        if minute == 0 {
            self.increment_hour(transport, handles);
        }
    }

    fn increment_hour(&self, transport: &Arc<dyn BleTransport>, handles: ClockHandles) {
        let hour = match transport.read_attribute(handles.hour) {
            Ok(value) => value,
            Err(err) => {
                error!("read of the hour value returned error {}", err.code());
                return;
            }
        };

        let hour = (hour + 1) % 24;

        if let Err(err) = transport.write_attribute(handles.hour, hour, false) {
            error!("write of the hour value returned error {}", err.code());
        }
    }

    fn context(&self) -> Option<(Arc<dyn BleTransport>, ClockHandles)> {
        let inner = self.inner.lock();
        Some((inner.transport.clone()?, inner.handles?))
    }

    fn field_name(&self, handle: AttributeHandle) -> &'static str {
        self.inner
            .lock()
            .handles
            .and_then(|handles| handles.field_of(handle))
            .map(ClockField::name)
            .unwrap_or("unknown")
    }
}

impl WriteAuthorizer for ClockService {
    /// Sole gate between client writes and the attribute store: a pure
    /// range check whose only effect is the reply code. Rejections are the
    /// intended outcome of invalid input, not errors.
    fn authorize_write(&self, request: &WriteRequest<'_>) -> AuthorizeReply {
        debug!("characteristic {} write authorization", request.handle);

        if request.offset != 0 {
            debug!("rejecting write with offset {}", request.offset);
            return AuthorizeReply::InvalidOffset;
        }

        if request.data.len() != 1 {
            debug!("rejecting write of {} bytes", request.data.len());
            return AuthorizeReply::InvalidAttributeLength;
        }

        let value = request.data[0];
        let hour_handle = self.inner.lock().handles.map(|handles| handles.hour);
        if value >= 60 || (value >= 24 && Some(request.handle) == hour_handle) {
            debug!("rejecting out-of-range value {value}");
            return AuthorizeReply::WriteNotPermitted;
        }

        AuthorizeReply::Accepted
    }
}

impl AttributeObserver for ClockService {
    fn on_data_sent(&self, count: usize) {
        info!("sent {count} updates");
    }

    fn on_data_written(&self, event: &WriteEvent) {
        info!(
            "data written to handle {} ({} characteristic), connection {}, offset {}, {} bytes",
            event.handle,
            self.field_name(event.handle),
            event.connection,
            event.offset,
            event.data.len()
        );
    }

    fn on_data_read(&self, event: &ReadEvent) {
        info!(
            "data read from handle {} ({} characteristic), connection {}",
            event.handle,
            self.field_name(event.handle),
            event.connection
        );
    }

    fn on_updates_enabled(&self, handle: AttributeHandle) {
        info!("updates enabled on handle {handle} ({})", self.field_name(handle));
    }

    fn on_updates_disabled(&self, handle: AttributeHandle) {
        info!("updates disabled on handle {handle} ({})", self.field_name(handle));
    }

    fn on_confirmation_received(&self, handle: AttributeHandle) {
        info!("confirmation received on handle {handle} ({})", self.field_name(handle));
    }
}

//! Advertising configuration.

use crate::error::BleError;

/// Maximum size of a legacy advertising payload in bytes.
pub const LEGACY_ADVERTISING_MAX_SIZE: usize = 31;

/// Flags AD structure: length + type + value.
const FLAGS_FIELD_SIZE: usize = 3;
/// Local name AD structure overhead: length + type.
const NAME_FIELD_OVERHEAD: usize = 2;

/// LE General Discoverable + BR/EDR not supported.
pub const FLAGS_GENERAL_DISCOVERABLE: u8 = 0x06;

/// Advertising parameters, immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingParameters {
    pub connectable: bool,
    pub discoverable: bool,
}

impl Default for AdvertisingParameters {
    fn default() -> Self {
        Self {
            connectable: true,
            discoverable: true,
        }
    }
}

/// Advertising payload: a flags field plus a human-readable device name.
///
/// Built once during advertising setup; the builder rejects a name that
/// would not fit the legacy payload budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingPayload {
    flags: u8,
    local_name: String,
}

impl AdvertisingPayload {
    pub fn builder() -> AdvertisingPayloadBuilder {
        AdvertisingPayloadBuilder::default()
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }
}

#[derive(Debug, Default)]
pub struct AdvertisingPayloadBuilder {
    flags: Option<u8>,
    local_name: String,
}

impl AdvertisingPayloadBuilder {
    /// Sets the flags field; without an explicit value the payload carries
    /// [`FLAGS_GENERAL_DISCOVERABLE`].
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = name.into();
        self
    }

    pub fn build(self) -> Result<AdvertisingPayload, BleError> {
        let used = FLAGS_FIELD_SIZE + NAME_FIELD_OVERHEAD + self.local_name.len();
        if used > LEGACY_ADVERTISING_MAX_SIZE {
            return Err(BleError::BufferOverflow);
        }
        Ok(AdvertisingPayload {
            flags: self.flags.unwrap_or(FLAGS_GENERAL_DISCOVERABLE),
            local_name: self.local_name,
        })
    }
}

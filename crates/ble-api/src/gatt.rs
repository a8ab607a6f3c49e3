//! GATT service descriptors, attribute events and authorization replies.

use core::fmt;
use core::ops::BitOr;

use uuid::Uuid;

/// Handle of an attribute in the transport's attribute store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeHandle(pub u16);

impl fmt::Display for AttributeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Characteristic property bit set (GATT declaration bit values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Properties(u8);

impl Properties {
    pub const READ: Self = Self(0x02);
    pub const WRITE: Self = Self(0x08);
    pub const NOTIFY: Self = Self(0x10);
    pub const INDICATE: Self = Self(0x20);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Properties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Single-byte characteristic to register with the transport.
#[derive(Debug, Clone)]
pub struct CharacteristicDescriptor {
    pub uuid: Uuid,
    pub initial_value: u8,
    pub properties: Properties,
}

/// Service to register with the transport: a UUID plus an ordered list of
/// characteristics.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicDescriptor>,
}

/// Handles assigned by the transport at registration time.
///
/// `value_handles[i]` belongs to `characteristics[i]` of the descriptor; the
/// handles are distinct and stable for the lifetime of the registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    pub service: AttributeHandle,
    pub value_handles: Vec<AttributeHandle>,
}

/// A client write proposed to the authorization gate.
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub handle: AttributeHandle,
    pub offset: u16,
    pub data: &'a [u8],
}

/// Reply of the write-authorization gate, evaluated synchronously before the
/// transport commits a client write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizeReply {
    Accepted,
    InvalidOffset,
    InvalidAttributeLength,
    WriteNotPermitted,
}

impl AuthorizeReply {
    /// ATT error code carried back to the client (0 on success).
    pub fn att_code(&self) -> u8 {
        match self {
            Self::Accepted => 0x00,
            Self::WriteNotPermitted => 0x03,
            Self::InvalidOffset => 0x07,
            Self::InvalidAttributeLength => 0x0d,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Committed client write, reported after the fact.
#[derive(Debug, Clone)]
pub struct WriteEvent {
    pub connection: u16,
    pub handle: AttributeHandle,
    pub offset: u16,
    pub data: Vec<u8>,
}

/// Client read, reported after the fact.
#[derive(Debug, Clone, Copy)]
pub struct ReadEvent {
    pub connection: u16,
    pub handle: AttributeHandle,
}

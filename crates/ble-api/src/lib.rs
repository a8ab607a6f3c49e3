//! # ble-api
//!
//! Interface contracts between the peripheral core and the underlying
//! wireless transport stack. The radio itself lives behind the
//! [`BleTransport`] trait; this crate only defines the calls the core makes
//! into it and the events it receives back.
//!
//! ## Module Overview
//! - [`error`]       – Transport error type with stable numeric codes.
//! - [`advertising`] – Advertising parameters and payload builder.
//! - [`gatt`]        – Service/characteristic descriptors, attribute events
//!                     and write-authorization replies.
//! - [`transport`]   – The [`BleTransport`] trait and handler capabilities.

pub mod advertising;
pub mod error;
pub mod gatt;
pub mod transport;

pub use advertising::{AdvertisingParameters, AdvertisingPayload, LEGACY_ADVERTISING_MAX_SIZE};
pub use error::BleError;
pub use gatt::{
    AttributeHandle, AuthorizeReply, CharacteristicDescriptor, Properties, ReadEvent,
    ServiceDescriptor, ServiceHandle, WriteEvent, WriteRequest,
};
pub use transport::{
    AttributeObserver, BleTransport, ConnectionObserver, InitCallback, PeerAddress,
    WriteAuthorizer,
};

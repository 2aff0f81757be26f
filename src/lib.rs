#![warn(missing_docs)]

//! Minible is a cross-platform [Bluetooth Low Energy] (BLE) peripheral manager for [Rust], in the GAP Central and
//! GATT Client roles.
//!
//! It sits between an application and a platform radio backend. The application scans, connects, and reads or writes
//! characteristics through a [`Manager`]; the backend performs the radio I/O and reports results back from its own
//! threads. In between, Minible keeps a bounded registry of [`Peripheral`]s and the GATT tree ([`Service`]s and
//! [`Characteristic`]s) of each, and keeps both consistent under rediscovery, disconnection and release.
//!
//! [Rust]: https://www.rust-lang.org/
//! [Bluetooth Low Energy]: https://www.bluetooth.com/specifications/specs/
//!
//! # Usage
//!
//! ```rust,no_run
//!# use minible::{ChannelSink, Config, Manager, PeripheralEvent};
//!# #[tokio::main]
//!# async fn main() {
//!let manager = Manager::init(Config::default());
//!let (sink, mut events) = ChannelSink::new();
//!manager.set_callbacks(sink);
//!
//!manager.scan(None);
//!while let Some(event) = events.next_event().await {
//!    if let PeripheralEvent::Discovered(peripheral) = event {
//!        println!("{} ({}dBm)", peripheral, peripheral.rssi());
//!    }
//!}
//!# }
//! ```
//!
//! # Overview
//!
//! - Peripheral registry:
//!   - Peripherals are registered by the backend on first sight, keyed by an opaque [`Cookie`]
//!   - At most [`Config::max_peripherals`] (48 by default) are registered at once
//!   - [Releasing][Manager::release_peripheral] a peripheral drops its GATT tree and removes it from the registry
//! - GATT tree:
//!   - Discovery is two-phase: the backend first allocates empty slots
//!     ([`begin_service_discovery`][Manager::begin_service_discovery]) and then fills them
//!     ([`fill_service`][Manager::fill_service])
//!   - Rediscovery replaces the previous services or characteristics wholesale; stale handles report
//!     [`is_valid`][Service::is_valid] `== false`
//!   - Lookup is by exact UUID string
//! - Backends:
//!   - The [`Backend`][backend::Backend] trait has a no-op default for every operation, so a backend only implements
//!     what its platform supports
//!   - One backend is chosen when the manager is created, from a priority-ordered list of
//!     [`BackendBootstrap`][backend::BackendBootstrap]s
//! - Notifications:
//!   - An [`EventSink`] receives discovery, disconnect and release events synchronously on the producing thread
//!   - [`ChannelSink`] turns them into an async [`EventStream`]
//!
//! # Handles
//!
//! [`Peripheral`], [`Service`] and [`Characteristic`] are cheap handles. Clones refer to the same record and compare
//! equal. The registry alone decides when a record dies: a handle kept past release or rediscovery stays safe to use
//! but reports the record as released or invalid, and backend writes through it fail with
//! [`ErrorKind::Released`][error::ErrorKind::Released] or [`ErrorKind::Invalidated`][error::ErrorKind::Invalidated].
//!
//! # Feature flags
//!
//! The `serde` feature enables serializing/deserializing [`Config`], [`Cookie`], [`MacAddr`] and [`GattUuid`].
//!
//! The `simulated` feature adds the [simulated backend][backend::simulated] to the default candidate list on every
//! platform. It is always included on Windows.
//!
//! # Examples
//!
//! Demos of basic usage are available in the `demos` folder.

pub mod backend;
pub mod btuuid;
mod characteristic;
mod config;
pub mod error;
mod gatt_tree;
mod manager;
mod peripheral;
mod registry;
mod service;
mod sink;
mod types;

pub use btuuid::GattUuid;
pub use characteristic::Characteristic;
pub use config::{Config, DEFAULT_MAX_PERIPHERALS};
pub use error::Error;
pub use manager::{Manager, WeakManager};
pub use peripheral::Peripheral;
pub use service::Service;
pub use sink::{ChannelSink, EventSink, EventStream, PeripheralEvent};
pub use types::{AuthorizationStatus, Cookie, MacAddr, ManufacturerData};
pub use uuid::Uuid;

/// Convenience alias for a result with [`Error`]
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// GATT characteristic properties as defined in the Bluetooth Core Specification, Vol 3, Part G, §3.3.1.1.
#[allow(missing_docs)]
#[non_exhaustive]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CharacteristicProperties {
    pub broadcast: bool,
    pub read: bool,
    pub write_without_response: bool,
    pub write: bool,
    pub notify: bool,
    pub indicate: bool,
    pub authenticated_signed_writes: bool,
    pub extended_properties: bool,
}

impl CharacteristicProperties {
    /// Converts the raw property byte (as a [`u32`]). Unknown bits are ignored.
    pub fn from_bits(bits: u32) -> Self {
        CharacteristicProperties {
            broadcast: (bits & (1 << 0)) != 0,
            read: (bits & (1 << 1)) != 0,
            write_without_response: (bits & (1 << 2)) != 0,
            write: (bits & (1 << 3)) != 0,
            notify: (bits & (1 << 4)) != 0,
            indicate: (bits & (1 << 5)) != 0,
            authenticated_signed_writes: (bits & (1 << 6)) != 0,
            extended_properties: (bits & (1 << 7)) != 0,
        }
    }

    /// Converts back to the raw property byte.
    pub fn to_bits(self) -> u32 {
        u32::from(self.broadcast)
            | (u32::from(self.read) << 1)
            | (u32::from(self.write_without_response) << 2)
            | (u32::from(self.write) << 3)
            | (u32::from(self.notify) << 4)
            | (u32::from(self.indicate) << 5)
            | (u32::from(self.authenticated_signed_writes) << 6)
            | (u32::from(self.extended_properties) << 7)
    }

    /// Whether the value may be read
    pub fn is_readable(self) -> bool {
        self.read
    }

    /// Whether the value may be written, with or without response
    pub fn is_writable(self) -> bool {
        self.write || self.write_without_response || self.authenticated_signed_writes
    }

    /// Whether the peripheral can push value changes, by notification or indication
    pub fn is_notifiable(self) -> bool {
        self.notify || self.indicate
    }
}

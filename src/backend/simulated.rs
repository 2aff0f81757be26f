//! A radio-less backend for development and tests.
//!
//! Scanning reports four fixed peripherals. Connections are bookkeeping only, and every connected peripheral exposes
//! the same small GATT database (Device Information and Battery), so the whole discovery protocol can run without
//! hardware.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::{Backend, BackendBootstrap};
use crate::btuuid::{characteristics, services};
use crate::manager::{Manager, WeakManager};
use crate::{Characteristic, CharacteristicProperties, Cookie, MacAddr, Peripheral, Result, Service};

struct Advertiser {
    cookie: u64,
    name: Option<&'static str>,
    rssi: i16,
}

const ADVERTISERS: [Advertiser; 4] = [
    Advertiser {
        cookie: 0x1000,
        name: None,
        rssi: -79,
    },
    Advertiser {
        cookie: 0x1001,
        name: Some("Thermometer"),
        rssi: 81,
    },
    Advertiser {
        cookie: 0x1002,
        name: Some("Sesame_HTS"),
        rssi: -82,
    },
    Advertiser {
        cookie: 0x1003,
        name: Some("Three"),
        rssi: 83,
    },
];

const READ: u32 = 1 << 1;
const NOTIFY: u32 = 1 << 4;

/// `(service, [(characteristic, properties)])`
const DATABASE: [(&str, &[(&str, u32)]); 2] = [
    (
        services::DEVICE_INFORMATION,
        &[
            (characteristics::MANUFACTURER_NAME_STRING, READ),
            (characteristics::MODEL_NUMBER_STRING, READ),
        ],
    ),
    (services::BATTERY, &[(characteristics::BATTERY_LEVEL, READ | NOTIFY)]),
];

/// Advertisers share the address prefix `12:34:56:78:9A` and differ in the last octet.
fn address_of(cookie: u64) -> MacAddr {
    MacAddr([0x12, 0x34, 0x56, 0x78, 0x9a, ((cookie as u8) & 0x0f) | 0x10])
}

/// Attribute cookies extend their parent's cookie by one byte, so they stay unique across the whole database.
fn child_cookie(parent: Cookie, slot: usize) -> Cookie {
    Cookie::new((parent.as_u64() << 8) | (slot as u64 + 1))
}

/// The simulated backend
#[derive(Debug)]
pub struct SimulatedBackend {
    manager: WeakManager,
    connected: Mutex<HashSet<Cookie>>,
    /// `(peripheral, characteristic)` cookies
    notifying: Mutex<HashSet<(Cookie, Cookie)>>,
}

impl SimulatedBackend {
    /// Creates a backend reporting to `manager`.
    pub fn new(manager: WeakManager) -> Self {
        SimulatedBackend {
            manager,
            connected: Mutex::new(HashSet::new()),
            notifying: Mutex::new(HashSet::new()),
        }
    }

    fn manager(&self) -> Option<Manager> {
        let manager = self.manager.upgrade();
        if manager.is_none() {
            debug!("manager dropped, ignoring request");
        }
        manager
    }

    fn connected(&self) -> MutexGuard<'_, HashSet<Cookie>> {
        self.connected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notifying(&self) -> MutexGuard<'_, HashSet<(Cookie, Cookie)>> {
        self.notifying.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether [`set_notify`][Backend::set_notify] has been requested for `characteristic`
    pub fn is_notifying(&self, peripheral: &Peripheral, characteristic: &Characteristic) -> bool {
        characteristic
            .cookie()
            .is_some_and(|x| self.notifying().contains(&(peripheral.cookie(), x)))
    }

    fn advertise(&self, manager: &Manager, advertiser: &Advertiser) -> Result<()> {
        let peripheral = manager.discover_or_get(Cookie::new(advertiser.cookie), advertiser.name)?;
        peripheral.set_address(address_of(advertiser.cookie))?;
        manager.note_advertisement(&peripheral, advertiser.rssi)
    }

    fn discover_services(&self, manager: &Manager, peripheral: &Peripheral) -> Result<()> {
        manager.begin_service_discovery(peripheral, DATABASE.len())?;
        for (slot, (uuid, _)) in DATABASE.iter().enumerate() {
            manager.fill_service(peripheral, slot, *uuid, child_cookie(peripheral.cookie(), slot))?;
        }
        Ok(())
    }

    fn discover_characteristics(&self, manager: &Manager, peripheral: &Peripheral, service_uuid: &str) -> Result<()> {
        let Some((_, attributes)) = DATABASE.iter().find(|(uuid, _)| *uuid == service_uuid) else {
            return Ok(());
        };
        let Some(service) = manager.begin_characteristic_discovery(peripheral, service_uuid, attributes.len())? else {
            return Ok(());
        };
        let Some(service_cookie) = service.cookie() else {
            return Ok(());
        };
        for (slot, (uuid, properties)) in attributes.iter().enumerate() {
            manager.fill_characteristic(
                peripheral,
                &service,
                slot,
                *uuid,
                child_cookie(service_cookie, slot),
                CharacteristicProperties::from_bits(*properties),
            )?;
        }
        Ok(())
    }
}

impl Backend for SimulatedBackend {
    fn scan(&self, _uuid_filter: Option<&str>) {
        let Some(manager) = self.manager() else { return };
        for advertiser in &ADVERTISERS {
            if let Err(err) = self.advertise(&manager, advertiser) {
                warn!("dropping advertisement from {:#x}: {}", advertiser.cookie, err);
            }
        }
    }

    fn connect(&self, peripheral: &Peripheral) {
        self.connected().insert(peripheral.cookie());
        debug!("connected to {}", peripheral);
    }

    fn disconnect(&self, peripheral: &Peripheral) {
        let Some(manager) = self.manager() else { return };
        if self.connected().remove(&peripheral.cookie()) {
            self.notifying().retain(|(x, _)| *x != peripheral.cookie());
            manager.peripheral_disconnected(peripheral, 0);
        }
    }

    fn get_services(&self, peripheral: &Peripheral) {
        if !self.is_connected(peripheral) {
            warn!("service discovery requested on {} without a connection", peripheral);
            return;
        }
        let Some(manager) = self.manager() else { return };
        if let Err(err) = self.discover_services(&manager, peripheral) {
            warn!("service discovery on {} failed: {}", peripheral, err);
        }
    }

    fn get_characteristics(&self, peripheral: &Peripheral, service: &Service) {
        if !self.is_connected(peripheral) {
            warn!("characteristic discovery requested on {} without a connection", peripheral);
            return;
        }
        let Some(uuid) = service.uuid() else {
            debug!("characteristic discovery on an unfilled service slot");
            return;
        };
        let Some(manager) = self.manager() else { return };
        if let Err(err) = self.discover_characteristics(&manager, peripheral, uuid.as_str()) {
            warn!("characteristic discovery on {} failed: {}", peripheral, err);
        }
    }

    fn read_characteristic(&self, peripheral: &Peripheral, characteristic: &Characteristic) {
        debug!("read {:?} on {}", characteristic.uuid(), peripheral);
    }

    fn set_notify(&self, peripheral: &Peripheral, characteristic: &Characteristic) {
        if !characteristic.properties().notify {
            debug!("{:?} does not support notifications", characteristic.uuid());
            return;
        }
        if let Some(cookie) = characteristic.cookie() {
            self.notifying().insert((peripheral.cookie(), cookie));
        }
    }

    fn write_characteristic(&self, peripheral: &Peripheral, characteristic: &Characteristic, data: &[u8]) {
        debug!("write {} bytes to {:?} on {}", data.len(), characteristic.uuid(), peripheral);
    }

    fn authorization_status(&self) -> i32 {
        3
    }

    fn is_connected(&self, peripheral: &Peripheral) -> bool {
        self.connected().contains(&peripheral.cookie())
    }

    fn release_cookie(&self, peripheral: &Peripheral) {
        self.connected().remove(&peripheral.cookie());
        self.notifying().retain(|(x, _)| *x != peripheral.cookie());
    }
}

/// Bootstrap for [`SimulatedBackend`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedBootstrap;

/// The simulated candidate, for use with [`Manager::with_bootstraps`]
pub static BOOTSTRAP: SimulatedBootstrap = SimulatedBootstrap;

impl BackendBootstrap for SimulatedBootstrap {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn available(&self) -> bool {
        true
    }

    fn create(&self, manager: WeakManager) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(SimulatedBackend::new(manager)))
    }
}

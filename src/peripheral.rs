use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::error::ErrorKind;
use crate::{Cookie, GattUuid, MacAddr, ManufacturerData, Result, Service};

/// A Bluetooth LE peripheral known to a [`Manager`][crate::Manager]
///
/// `Peripheral` is a cheap handle: clones refer to the same record and compare equal. The registry alone decides
/// when the record is released; a handle kept past that point stays valid to hold but reports
/// [`is_released`][Peripheral::is_released], and every field fill through it fails with
/// [`ErrorKind::Released`].
#[derive(Clone)]
pub struct Peripheral(pub(crate) Arc<PeripheralInner>);

pub(crate) struct PeripheralInner {
    cookie: Cookie,
    /// Set under the registry lock by the one caller allowed to tear this record down.
    pub(crate) releasing: AtomicBool,
    data: Mutex<PeripheralData>,
}

pub(crate) struct PeripheralData {
    pub(crate) released: bool,
    pub(crate) name: String,
    pub(crate) address: MacAddr,
    pub(crate) rssi: i16,
    pub(crate) last_advertisement: Option<Instant>,
    pub(crate) advertised_uuid: Option<GattUuid>,
    pub(crate) manufacturer_data: Option<ManufacturerData>,
    /// `None` until service discovery begins; `Some(vec![])` after discovering zero services.
    pub(crate) services: Option<Vec<Service>>,
}

impl Peripheral {
    pub(crate) fn new(cookie: Cookie, name: &str) -> Self {
        Peripheral(Arc::new(PeripheralInner {
            cookie,
            releasing: AtomicBool::new(false),
            data: Mutex::new(PeripheralData {
                released: false,
                name: name.to_owned(),
                address: MacAddr::default(),
                rssi: 0,
                last_advertisement: None,
                advertised_uuid: None,
                manufacturer_data: None,
                services: None,
            }),
        }))
    }

    /// The backend cookie this peripheral was registered with
    ///
    /// After release the cookie no longer resolves through [`Manager::find_by_cookie`][crate::Manager::find_by_cookie].
    pub fn cookie(&self) -> Cookie {
        self.0.cookie
    }

    /// The advertised or OS-assigned name, empty if the device did not provide one
    pub fn name(&self) -> String {
        self.0.lock().name.clone()
    }

    /// The hardware address, all zeroes until the backend fills it in
    pub fn address(&self) -> MacAddr {
        self.0.lock().address
    }

    /// The signal strength in dBm of the most recent advertisement
    pub fn rssi(&self) -> i16 {
        self.0.lock().rssi
    }

    /// When the most recent advertisement was received
    pub fn last_advertisement(&self) -> Option<Instant> {
        self.0.lock().last_advertisement
    }

    /// The service UUID included in the advertisement, if any
    pub fn advertised_uuid(&self) -> Option<GattUuid> {
        self.0.lock().advertised_uuid.clone()
    }

    /// Manufacturer specific advertisement data, if any
    pub fn manufacturer_data(&self) -> Option<ManufacturerData> {
        self.0.lock().manufacturer_data.clone()
    }

    /// The services found by the latest service discovery
    ///
    /// Returns `None` if no discovery has started since the peripheral was registered or last disconnected. Slots
    /// whose bottom half has not arrived yet are included with an unset [`uuid`][Service::uuid].
    pub fn services(&self) -> Option<Vec<Service>> {
        self.0.lock().services.clone()
    }

    /// Whether this peripheral has been released from its registry
    pub fn is_released(&self) -> bool {
        self.0.lock().released
    }

    /// Sets the display name.
    pub fn set_name(&self, name: &str) -> Result<()> {
        self.0.update(|data| data.name = name.to_owned())
    }

    /// Sets the hardware address.
    pub fn set_address(&self, address: MacAddr) -> Result<()> {
        self.0.update(|data| data.address = address)
    }

    /// Sets the service UUID carried by the advertisement.
    pub fn set_advertised_uuid(&self, uuid: Option<GattUuid>) -> Result<()> {
        self.0.update(|data| data.advertised_uuid = uuid)
    }

    /// Sets the manufacturer specific advertisement data.
    pub fn set_manufacturer_data(&self, data: Option<ManufacturerData>) -> Result<()> {
        self.0.update(|fields| fields.manufacturer_data = data)
    }
}

impl PeripheralInner {
    pub(crate) fn lock(&self) -> MutexGuard<'_, PeripheralData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the record for a bottom-half write, failing once its release has begun.
    ///
    /// Reads go through [`lock`][PeripheralInner::lock] so fields stay readable during the release notification.
    pub(crate) fn lock_live(&self) -> Result<MutexGuard<'_, PeripheralData>> {
        let data = self.lock();
        if data.released || self.is_releasing() {
            Err(ErrorKind::Released.into())
        } else {
            Ok(data)
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut PeripheralData) -> R) -> Result<R> {
        let mut data = self.lock_live()?;
        Ok(f(&mut data))
    }

    pub(crate) fn is_releasing(&self) -> bool {
        self.releasing.load(Ordering::Acquire)
    }

    /// Whether release has begun or finished. Nothing may be reported for such a peripheral any more.
    pub(crate) fn is_retired(&self) -> bool {
        self.is_releasing() || self.lock().released
    }
}

impl PartialEq for Peripheral {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Peripheral {}

impl std::hash::Hash for Peripheral {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl std::fmt::Debug for Peripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.0.lock();
        f.debug_struct("Peripheral")
            .field("cookie", &self.0.cookie)
            .field("name", &data.name)
            .field("rssi", &data.rssi)
            .field("released", &data.released)
            .finish()
    }
}

impl std::fmt::Display for Peripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.0.lock();
        if data.name.is_empty() {
            write!(f, "{}", self.0.cookie)
        } else {
            write!(f, "{} ({})", data.name, self.0.cookie)
        }
    }
}

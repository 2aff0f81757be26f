use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use crate::peripheral::PeripheralInner;
use crate::{Characteristic, Cookie, GattUuid, Peripheral};

/// A Bluetooth GATT service
///
/// Services are owned by their [`Peripheral`]. A new service discovery replaces the peripheral's whole service list,
/// after which handles to the old services report [`is_valid`][Service::is_valid] `== false` and no longer hold any
/// characteristics.
#[derive(Clone)]
pub struct Service(pub(crate) Arc<ServiceInner>);

pub(crate) struct ServiceInner {
    slot: usize,
    pub(crate) peripheral: Weak<PeripheralInner>,
    valid: AtomicBool,
    pub(crate) ident: OnceLock<(GattUuid, Cookie)>,
    characteristics: Mutex<Option<Vec<Characteristic>>>,
}

impl Service {
    pub(crate) fn empty(peripheral: &Peripheral, slot: usize) -> Self {
        Service(Arc::new(ServiceInner {
            slot,
            peripheral: Arc::downgrade(&peripheral.0),
            valid: AtomicBool::new(true),
            ident: OnceLock::new(),
            characteristics: Mutex::new(None),
        }))
    }

    /// The UUID of this service, or `None` while its discovery slot has not been filled
    pub fn uuid(&self) -> Option<&GattUuid> {
        self.0.ident.get().map(|(uuid, _)| uuid)
    }

    /// The backend cookie of this service, or `None` while its discovery slot has not been filled
    pub fn cookie(&self) -> Option<Cookie> {
        self.0.ident.get().map(|(_, cookie)| *cookie)
    }

    /// The position of this service in its peripheral's service list
    pub fn slot(&self) -> usize {
        self.0.slot
    }

    /// Whether this service still belongs to its peripheral's current service list
    pub fn is_valid(&self) -> bool {
        self.0.valid.load(Ordering::Acquire)
    }

    /// The peripheral owning this service, unless it has been dropped entirely
    pub fn peripheral(&self) -> Option<Peripheral> {
        self.0.peripheral.upgrade().map(Peripheral)
    }

    /// The characteristics found by the latest characteristic discovery on this service
    ///
    /// Returns `None` if characteristic discovery has not started for this service.
    pub fn characteristics(&self) -> Option<Vec<Characteristic>> {
        self.0.characteristics().clone()
    }

    /// Finds a discovered characteristic by exact UUID match
    pub fn find_characteristic(&self, uuid: &str) -> Option<Characteristic> {
        self.0
            .characteristics()
            .iter()
            .flatten()
            .find(|x| x.uuid().is_some_and(|x| x == uuid))
            .cloned()
    }
}

impl ServiceInner {
    pub(crate) fn characteristics(&self) -> MutexGuard<'_, Option<Vec<Characteristic>>> {
        self.characteristics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Detaches this service and its characteristics from the tree.
    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
        if let Some(characteristics) = self.characteristics().take() {
            for characteristic in characteristics {
                characteristic.0.invalidate();
            }
        }
    }

    pub(crate) fn is_owned_by(&self, peripheral: &Peripheral) -> bool {
        std::ptr::eq(self.peripheral.as_ptr(), Arc::as_ptr(&peripheral.0))
    }
}

impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Service {}

impl std::hash::Hash for Service {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("slot", &self.0.slot)
            .field("uuid", &self.uuid())
            .field("cookie", &self.cookie())
            .field("valid", &self.is_valid())
            .finish()
    }
}

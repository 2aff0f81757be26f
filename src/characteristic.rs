use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use crate::error::ErrorKind;
use crate::service::ServiceInner;
use crate::{CharacteristicProperties, Cookie, GattUuid, Result, Service};

/// A Bluetooth GATT characteristic
///
/// Characteristics are owned by their [`Service`]; [`service`][Characteristic::service] is a non-owning
/// back-reference.
#[derive(Clone)]
pub struct Characteristic(pub(crate) Arc<CharacteristicInner>);

pub(crate) struct CharacteristicInner {
    slot: usize,
    service: Weak<ServiceInner>,
    valid: AtomicBool,
    pub(crate) ident: OnceLock<(GattUuid, Cookie)>,
    properties: AtomicU32,
}

impl Characteristic {
    pub(crate) fn empty(service: &Service, slot: usize) -> Self {
        Characteristic(Arc::new(CharacteristicInner {
            slot,
            service: Arc::downgrade(&service.0),
            valid: AtomicBool::new(true),
            ident: OnceLock::new(),
            properties: AtomicU32::new(0),
        }))
    }

    /// The UUID of this characteristic, or `None` while its discovery slot has not been filled
    pub fn uuid(&self) -> Option<&GattUuid> {
        self.0.ident.get().map(|(uuid, _)| uuid)
    }

    /// The backend cookie of this characteristic, or `None` while its discovery slot has not been filled
    pub fn cookie(&self) -> Option<Cookie> {
        self.0.ident.get().map(|(_, cookie)| *cookie)
    }

    /// The position of this characteristic in its service's characteristic list
    pub fn slot(&self) -> usize {
        self.0.slot
    }

    /// The properties of this characteristic.
    ///
    /// Characteristic properties indicate which operations (e.g. read, write, notify, etc) may be performed on this
    /// characteristic. They are set together with the UUID, so a filled characteristic never reports empty
    /// properties it did not have.
    pub fn properties(&self) -> CharacteristicProperties {
        CharacteristicProperties::from_bits(self.0.properties.load(Ordering::Acquire))
    }

    /// Replaces the properties after a later backend notification.
    pub fn set_properties(&self, properties: CharacteristicProperties) -> Result<()> {
        if !self.is_valid() {
            return Err(ErrorKind::Invalidated.into());
        }
        self.0.properties.store(properties.to_bits(), Ordering::Release);
        Ok(())
    }

    /// Whether this characteristic still belongs to its service's current characteristic list
    pub fn is_valid(&self) -> bool {
        self.0.valid.load(Ordering::Acquire)
    }

    /// The service owning this characteristic
    pub fn service(&self) -> Option<Service> {
        self.0.service.upgrade().map(Service)
    }
}

impl CharacteristicInner {
    /// Fills the slot. The properties are stored before the identity is published.
    pub(crate) fn fill(&self, uuid: GattUuid, cookie: Cookie, properties: CharacteristicProperties) -> bool {
        if self.ident.get().is_some() {
            return false;
        }
        self.properties.store(properties.to_bits(), Ordering::Release);
        self.ident.set((uuid, cookie)).is_ok()
    }

    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl PartialEq for Characteristic {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Characteristic {}

impl std::hash::Hash for Characteristic {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl std::fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Characteristic")
            .field("slot", &self.0.slot)
            .field("uuid", &self.uuid())
            .field("cookie", &self.cookie())
            .field("properties", &self.properties())
            .field("valid", &self.is_valid())
            .finish()
    }
}

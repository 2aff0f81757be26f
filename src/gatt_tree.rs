//! Construction and replacement of the service / characteristic tree owned by each peripheral.
//!
//! Discovery is two-phase. The upper half (`begin_*`) drops the previous array and allocates empty slots as soon as
//! the backend knows how many attributes it found; the bottom half (`fill_*`) publishes each slot's UUID and cookie.
//! Every write takes the peripheral lock and checks liveness first, which is the same lock release takes before
//! tearing the tree down.

use tracing::debug;

use crate::error::ErrorKind;
use crate::{Characteristic, CharacteristicProperties, Cookie, Error, GattUuid, Peripheral, Result, Service};

fn alloc_slots<T>(count: usize, what: &str, make: impl FnMut(usize) -> T) -> Result<Vec<T>> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(count)
        .map_err(|err| Error::out_of_memory(err, what))?;
    slots.extend((0..count).map(make));
    Ok(slots)
}

pub(crate) fn invalidate_services(services: Option<Vec<Service>>) {
    for service in services.into_iter().flatten() {
        service.0.invalidate();
    }
}

pub(crate) fn begin_service_discovery(peripheral: &Peripheral, count: usize) -> Result<()> {
    let mut data = peripheral.0.lock_live()?;
    invalidate_services(data.services.take());
    data.services = Some(alloc_slots(count, "service slots", |slot| {
        Service::empty(peripheral, slot)
    })?);
    debug!("{} service slots allocated for {}", count, peripheral.cookie());
    Ok(())
}

/// Drops the service tree without starting a new discovery. Used when the connection it belonged to goes away.
pub(crate) fn clear_services(peripheral: &Peripheral) {
    let services = peripheral.0.lock().services.take();
    invalidate_services(services);
}

pub(crate) fn fill_service(peripheral: &Peripheral, slot: usize, uuid: GattUuid, cookie: Cookie) -> Result<Service> {
    let data = peripheral.0.lock_live()?;
    let services = data
        .services
        .as_ref()
        .ok_or_else(|| Error::new(ErrorKind::InvalidParameter, None, "service discovery has not begun"))?;
    let service = services.get(slot).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidParameter,
            None,
            format!("service slot {slot} out of range (0..{})", services.len()),
        )
    })?;
    service.0.ident.set((uuid, cookie)).map_err(|(uuid, _)| {
        Error::new(
            ErrorKind::InvalidParameter,
            None,
            format!("service slot {slot} already filled, cannot store {uuid}"),
        )
    })?;
    Ok(service.clone())
}

pub(crate) fn begin_characteristic_discovery(
    peripheral: &Peripheral,
    service_uuid: &str,
    count: usize,
) -> Result<Option<Service>> {
    let data = peripheral.0.lock_live()?;
    let Some(service) = find_in(data.services.as_deref(), service_uuid) else {
        debug!("{} has no service {}", peripheral.cookie(), service_uuid);
        return Ok(None);
    };

    let mut characteristics = service.0.characteristics();
    if let Some(old) = characteristics.take() {
        for characteristic in old {
            characteristic.0.invalidate();
        }
    }
    *characteristics = Some(alloc_slots(count, "characteristic slots", |slot| {
        Characteristic::empty(&service, slot)
    })?);
    drop(characteristics);

    debug!(
        "{} characteristic slots allocated for {} on {}",
        count,
        service_uuid,
        peripheral.cookie()
    );
    Ok(Some(service))
}

pub(crate) fn fill_characteristic(
    peripheral: &Peripheral,
    service: &Service,
    slot: usize,
    uuid: GattUuid,
    cookie: Cookie,
    properties: CharacteristicProperties,
) -> Result<Characteristic> {
    let _data = peripheral.0.lock_live()?;
    if !service.0.is_owned_by(peripheral) {
        return Err(Error::new(
            ErrorKind::InvalidParameter,
            None,
            "service belongs to another peripheral",
        ));
    }
    if !service.is_valid() {
        return Err(ErrorKind::Invalidated.into());
    }

    let characteristics = service.0.characteristics();
    let slots = characteristics
        .as_ref()
        .ok_or_else(|| Error::new(ErrorKind::InvalidParameter, None, "characteristic discovery has not begun"))?;
    let characteristic = slots.get(slot).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidParameter,
            None,
            format!("characteristic slot {slot} out of range (0..{})", slots.len()),
        )
    })?;
    if !characteristic.0.fill(uuid, cookie, properties) {
        return Err(Error::new(
            ErrorKind::InvalidParameter,
            None,
            format!("characteristic slot {slot} already filled"),
        ));
    }
    Ok(characteristic.clone())
}

fn find_in(services: Option<&[Service]>, uuid: &str) -> Option<Service> {
    services?
        .iter()
        .find(|x| x.uuid().is_some_and(|x| x == uuid))
        .cloned()
}

pub(crate) fn find_service(peripheral: &Peripheral, uuid: &str) -> Option<Service> {
    find_in(peripheral.0.lock().services.as_deref(), uuid)
}

pub(crate) fn find_characteristic(peripheral: &Peripheral, service_uuid: &str, uuid: &str) -> Option<Characteristic> {
    let data = peripheral.0.lock();
    find_in(data.services.as_deref(), service_uuid)?.find_characteristic(uuid)
}

pub(crate) fn find_characteristic_by_cookie(peripheral: &Peripheral, cookie: Cookie) -> Option<Characteristic> {
    let data = peripheral.0.lock();
    data.services.iter().flatten().find_map(|service| {
        service
            .0
            .characteristics()
            .iter()
            .flatten()
            .find(|x| x.cookie() == Some(cookie))
            .cloned()
    })
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::backend::{self, Backend, BackendBootstrap};
use crate::error::ErrorKind;
use crate::registry::Registry;
use crate::sink::EventSink;
use crate::{
    gatt_tree, AuthorizationStatus, Characteristic, CharacteristicProperties, Config, Cookie, GattUuid, MacAddr,
    Error, Peripheral, Result, Service,
};

/// The entry point: owns the peripheral registry, the active backend and the application's event sink.
///
/// `Manager` is a cheap handle; clones share the same state. Application-facing methods (`scan`, `connect`,
/// `read_characteristic`, ...) only forward a request to the backend and return immediately. Results arrive later
/// through the [`EventSink`] installed with [`set_callbacks`][Manager::set_callbacks], or show up in the GATT tree of
/// the affected [`Peripheral`].
///
/// Backends drive the other half of the API: [`discover_or_get`][Manager::discover_or_get] and the `begin_*` methods
/// are the upper halves that locate or allocate records, [`note_advertisement`][Manager::note_advertisement] and the
/// `fill_*` methods are the bottom halves that complete them.
#[derive(Clone)]
pub struct Manager(Arc<ManagerInner>);

/// A non-owning reference to a [`Manager`], held by backends.
#[derive(Clone, Default)]
pub struct WeakManager(Weak<ManagerInner>);

struct ManagerInner {
    config: Config,
    registry: Mutex<Registry>,
    backend: RwLock<Option<ActiveBackend>>,
    sink: RwLock<Option<Arc<dyn EventSink>>>,
    quit: AtomicBool,
}

struct ActiveBackend {
    name: &'static str,
    backend: Arc<dyn Backend>,
}

impl WeakManager {
    /// Returns the manager unless it has been dropped.
    pub fn upgrade(&self) -> Option<Manager> {
        self.0.upgrade().map(Manager)
    }
}

impl std::fmt::Debug for WeakManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WeakManager").field(&self.0.as_ptr()).finish()
    }
}

impl Manager {
    /// Creates a manager using the first available backend for this platform.
    pub fn init(config: Config) -> Self {
        Self::with_bootstraps(config, &backend::default_bootstraps())
    }

    /// Creates a manager using the first available backend in `bootstraps`.
    ///
    /// Candidates are tried in order. Only the first available one is created; if there is none, or creating it
    /// fails, the manager runs without a backend and every forwarded request is a no-op.
    pub fn with_bootstraps(config: Config, bootstraps: &[&dyn BackendBootstrap]) -> Self {
        let manager = Manager(Arc::new(ManagerInner {
            config,
            registry: Mutex::new(Registry::new(config.max_peripherals)),
            backend: RwLock::new(None),
            sink: RwLock::new(None),
            quit: AtomicBool::new(false),
        }));

        let Some(bootstrap) = bootstraps.iter().find(|x| x.available()) else {
            warn!("no Bluetooth LE backend available, requests will be ignored");
            return manager;
        };
        match bootstrap.create(manager.downgrade()) {
            Ok(backend) => {
                info!("using {} backend", bootstrap.name());
                *manager.0.backend.write().unwrap_or_else(PoisonError::into_inner) = Some(ActiveBackend {
                    name: bootstrap.name(),
                    backend,
                });
            }
            Err(err) => warn!("failed to create {} backend: {}", bootstrap.name(), err),
        }
        manager
    }

    /// Returns a non-owning reference to this manager.
    pub fn downgrade(&self) -> WeakManager {
        WeakManager(Arc::downgrade(&self.0))
    }

    /// The configuration this manager was created with
    pub fn config(&self) -> Config {
        self.0.config
    }

    /// The name of the active backend, if any
    pub fn backend_name(&self) -> Option<&'static str> {
        self.0
            .backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|x| x.name)
    }

    fn backend(&self) -> Option<Arc<dyn Backend>> {
        self.0
            .backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|x| x.backend.clone())
    }

    fn sink(&self) -> Option<Arc<dyn EventSink>> {
        self.0.sink.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.0.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The backend for a request about `peripheral`, or `None` if it should be skipped.
    fn backend_for(&self, peripheral: &Peripheral, request: &str) -> Option<Arc<dyn Backend>> {
        if peripheral.0.is_retired() {
            debug!("skipping {} for released peripheral {}", request, peripheral.cookie());
            return None;
        }
        self.backend()
    }

    /// Installs the application's event sink, replacing any previous one.
    pub fn set_callbacks<S: EventSink + 'static>(&self, sink: S) {
        *self.0.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(sink));
    }

    /// Removes the event sink. Events produced afterwards are dropped.
    pub fn clear_callbacks(&self) {
        self.0.sink.write().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Starts scanning for advertisements, optionally only from devices advertising `uuid_filter`.
    ///
    /// Discovered devices are reported through [`EventSink::discover_peripheral`]. Ignored once
    /// [`shutdown`][Manager::shutdown] has started.
    pub fn scan(&self, uuid_filter: Option<&str>) {
        if self.0.quit.load(Ordering::Acquire) {
            debug!("ignoring scan request during shutdown");
            return;
        }
        if let Some(backend) = self.backend() {
            backend.scan(uuid_filter);
        }
    }

    /// Asks the backend to stop scanning. There is no acknowledgement.
    pub fn stop_scan(&self) {
        if let Some(backend) = self.backend() {
            backend.stop_scan();
        }
    }

    /// Starts advertising this device.
    pub fn start_advertise(&self) {
        if let Some(backend) = self.backend() {
            backend.start_advertise();
        }
    }

    /// Connects to `peripheral`.
    pub fn connect(&self, peripheral: &Peripheral) {
        if let Some(backend) = self.backend_for(peripheral, "connect") {
            backend.connect(peripheral);
        }
    }

    /// Disconnects from `peripheral`. Completion is reported through [`EventSink::disconnect_peripheral`].
    pub fn disconnect(&self, peripheral: &Peripheral) {
        if let Some(backend) = self.backend_for(peripheral, "disconnect") {
            backend.disconnect(peripheral);
        }
    }

    /// Starts service discovery on `peripheral`.
    pub fn get_services(&self, peripheral: &Peripheral) {
        if let Some(backend) = self.backend_for(peripheral, "service discovery") {
            backend.get_services(peripheral);
        }
    }

    /// Starts characteristic discovery on `service`.
    pub fn get_characteristics(&self, peripheral: &Peripheral, service: &Service) {
        if let Some(backend) = self.backend_for(peripheral, "characteristic discovery") {
            backend.get_characteristics(peripheral, service);
        }
    }

    /// Requests the value of `characteristic`.
    pub fn read_characteristic(&self, peripheral: &Peripheral, characteristic: &Characteristic) {
        if let Some(backend) = self.backend_for(peripheral, "read") {
            backend.read_characteristic(peripheral, characteristic);
        }
    }

    /// Subscribes to notifications from `characteristic`.
    pub fn set_notify(&self, peripheral: &Peripheral, characteristic: &Characteristic) {
        if let Some(backend) = self.backend_for(peripheral, "notify") {
            backend.set_notify(peripheral, characteristic);
        }
    }

    /// Writes `data` to `characteristic`.
    pub fn write_characteristic(&self, peripheral: &Peripheral, characteristic: &Characteristic, data: &[u8]) {
        if let Some(backend) = self.backend_for(peripheral, "write") {
            backend.write_characteristic(peripheral, characteristic, data);
        }
    }

    /// Starts descriptor discovery on `characteristic`.
    pub fn discover_descriptors(&self, peripheral: &Peripheral, characteristic: &Characteristic) {
        if let Some(backend) = self.backend_for(peripheral, "descriptor discovery") {
            backend.discover_descriptors(peripheral, characteristic);
        }
    }

    /// The application's Bluetooth permission
    pub fn authorization_status(&self) -> AuthorizationStatus {
        let raw = self.backend().map_or(0, |x| x.authorization_status());
        AuthorizationStatus::from(raw)
    }

    /// Finds a discovered service of `peripheral` by exact UUID match.
    pub fn find_service(&self, peripheral: &Peripheral, uuid: &str) -> Option<Service> {
        gatt_tree::find_service(peripheral, uuid)
    }

    /// Finds a discovered characteristic by exact service and characteristic UUID match.
    pub fn find_characteristic(
        &self,
        peripheral: &Peripheral,
        service_uuid: &str,
        uuid: &str,
    ) -> Option<Characteristic> {
        gatt_tree::find_characteristic(peripheral, service_uuid, uuid)
    }

    /// Finds a discovered characteristic of `peripheral` by the cookie its backend assigned.
    pub fn find_characteristic_by_cookie(&self, peripheral: &Peripheral, cookie: Cookie) -> Option<Characteristic> {
        gatt_tree::find_characteristic_by_cookie(peripheral, cookie)
    }

    /// Finds the live peripheral registered under `cookie`.
    pub fn find_by_cookie(&self, cookie: Cookie) -> Option<Peripheral> {
        self.registry().find_by_cookie(cookie).cloned()
    }

    /// A snapshot of the registered peripherals, in registration order
    pub fn peripherals(&self) -> Vec<Peripheral> {
        self.registry().iter().cloned().collect()
    }

    /// The peripheral at `index` in registration order
    pub fn peripheral_at(&self, index: usize) -> Option<Peripheral> {
        self.registry().get(index).cloned()
    }

    /// The number of registered peripherals
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    /// Whether no peripherals are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the peripheral registered under `cookie`, registering a new one if there is none.
    ///
    /// An existing peripheral is returned unchanged; `name` only applies to a new registration. Fails with
    /// [`ErrorKind::RegistryFull`][crate::error::ErrorKind::RegistryFull] when a new peripheral would exceed
    /// [`Config::max_peripherals`], leaving the registry as it was.
    ///
    /// A cookie stays taken until its peripheral has left the registry: while a release of that peripheral is
    /// underway this fails with [`ErrorKind::Released`][crate::error::ErrorKind::Released].
    pub fn discover_or_get(&self, cookie: Cookie, name: Option<&str>) -> Result<Peripheral> {
        let mut registry = self.registry();
        if let Some(peripheral) = registry.holder_of(cookie) {
            if peripheral.0.is_releasing() {
                return Err(Error::new(
                    ErrorKind::Released,
                    None,
                    format!("cookie {cookie} is still being released"),
                ));
            }
            return Ok(peripheral.clone());
        }

        let peripheral = Peripheral::new(cookie, name.unwrap_or_default());
        if let Err(err) = registry.push(peripheral.clone()) {
            drop(registry);
            warn!("{}", err);
            return Err(err);
        }
        drop(registry);

        debug!("registered {}", peripheral);
        Ok(peripheral)
    }

    /// Records an advertisement from `peripheral` and reports it through [`EventSink::discover_peripheral`].
    pub fn note_advertisement(&self, peripheral: &Peripheral, rssi: i16) -> Result<()> {
        {
            let mut data = peripheral.0.lock_live()?;
            data.rssi = rssi;
            data.last_advertisement = Some(Instant::now());
        }
        if let Some(sink) = self.sink() {
            sink.discover_peripheral(peripheral);
        }
        Ok(())
    }

    /// Reports that the connection to `peripheral` is gone.
    ///
    /// The GATT tree belongs to the connection and is dropped. The sink receives
    /// [`disconnect_peripheral`][EventSink::disconnect_peripheral]; if `error` is not `0` the connection was lost
    /// rather than closed, and the peripheral is released as well.
    pub fn peripheral_disconnected(&self, peripheral: &Peripheral, error: i32) {
        if peripheral.0.is_retired() {
            debug!("ignoring disconnect of released peripheral {}", peripheral.cookie());
            return;
        }
        gatt_tree::clear_services(peripheral);
        debug!("{} disconnected (error {})", peripheral, error);

        if let Some(sink) = self.sink() {
            sink.disconnect_peripheral(peripheral, error);
        }
        if error != 0 {
            self.release_peripheral(peripheral);
        }
    }

    /// Releases `peripheral` and removes it from the registry. Does nothing if it is not registered.
    ///
    /// A connected peripheral is reported disconnected (with error `0`) first; the backend is not asked to
    /// disconnect. The sink then receives [`release_peripheral`][EventSink::release_peripheral] while the
    /// peripheral's fields are still readable. Afterwards the GATT tree is dropped, the backend frees its cookie, and
    /// the remaining registry entries keep their relative order.
    pub fn release_peripheral(&self, peripheral: &Peripheral) {
        {
            let registry = self.registry();
            if registry.position(peripheral).is_none() {
                return;
            }
            if peripheral.0.releasing.swap(true, Ordering::AcqRel) {
                return;
            }
        }

        let backend = self.backend();
        let sink = self.sink();
        let connected = backend.as_ref().is_some_and(|x| x.is_connected(peripheral));
        if let Some(sink) = &sink {
            if connected {
                sink.disconnect_peripheral(peripheral, 0);
            }
            sink.release_peripheral(peripheral);
        }

        let services = {
            let mut data = peripheral.0.lock();
            data.released = true;
            data.name = String::new();
            data.address = MacAddr::default();
            data.advertised_uuid = None;
            data.manufacturer_data = None;
            data.services.take()
        };
        gatt_tree::invalidate_services(services);

        if let Some(backend) = &backend {
            backend.release_cookie(peripheral);
        }

        let mut registry = self.registry();
        if let Some(index) = registry.position(peripheral) {
            registry.remove(index);
        }
        drop(registry);
        debug!("released {}", peripheral.cookie());
    }

    /// Releases every registered peripheral.
    ///
    /// Peripherals another caller is already releasing are left to that caller, so the registry may still hold
    /// them when this returns. It is empty once those releases complete.
    pub fn release_all(&self) {
        loop {
            let next = self.registry().iter().find(|x| !x.0.is_releasing()).cloned();
            match next {
                Some(peripheral) => self.release_peripheral(&peripheral),
                None => break,
            }
        }
    }

    /// Stops accepting scans, releases every peripheral and drops the backend.
    ///
    /// See [`release_all`][Manager::release_all] for releases running concurrently on other threads.
    pub fn shutdown(&self) {
        self.0.quit.store(true, Ordering::Release);
        self.release_all();
        let active = self.0.backend.write().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(active) = active {
            info!("{} backend shut down", active.name);
        }
    }

    /// Upper half of service discovery: drops the whole GATT tree of `peripheral` and allocates `count` empty
    /// service slots.
    pub fn begin_service_discovery(&self, peripheral: &Peripheral, count: usize) -> Result<()> {
        gatt_tree::begin_service_discovery(peripheral, count)
    }

    /// Bottom half of service discovery: sets the UUID and cookie of service `slot`.
    pub fn fill_service(
        &self,
        peripheral: &Peripheral,
        slot: usize,
        uuid: impl Into<GattUuid>,
        cookie: Cookie,
    ) -> Result<Service> {
        let service = gatt_tree::fill_service(peripheral, slot, uuid.into(), cookie)?;
        debug!("{} service {}: {:?}", peripheral.cookie(), slot, service.uuid());
        Ok(service)
    }

    /// Upper half of characteristic discovery: drops the characteristics of the service with `service_uuid` and
    /// allocates `count` empty slots.
    ///
    /// Returns `Ok(None)` without allocating anything if `peripheral` has no such service.
    pub fn begin_characteristic_discovery(
        &self,
        peripheral: &Peripheral,
        service_uuid: &str,
        count: usize,
    ) -> Result<Option<Service>> {
        gatt_tree::begin_characteristic_discovery(peripheral, service_uuid, count)
    }

    /// Bottom half of characteristic discovery: sets the UUID, cookie and properties of characteristic `slot` of
    /// `service`.
    pub fn fill_characteristic(
        &self,
        peripheral: &Peripheral,
        service: &Service,
        slot: usize,
        uuid: impl Into<GattUuid>,
        cookie: Cookie,
        properties: CharacteristicProperties,
    ) -> Result<Characteristic> {
        let characteristic =
            gatt_tree::fill_characteristic(peripheral, service, slot, uuid.into(), cookie, properties)?;
        debug!(
            "{} characteristic {}: {:?} {:?}",
            peripheral.cookie(),
            slot,
            characteristic.uuid(),
            properties
        );
        Ok(characteristic)
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("backend", &self.backend_name())
            .field("peripherals", &self.len())
            .finish()
    }
}

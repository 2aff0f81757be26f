//! The platform backend contract.
//!
//! A backend performs the radio work: it turns [`Manager`][crate::Manager] requests into platform calls and reports
//! results back through the manager's upper-half / bottom-half methods ([`discover_or_get`], [`note_advertisement`],
//! [`begin_service_discovery`], [`fill_service`], ...). Every [`Backend`] method has a default that does nothing,
//! so a backend only implements the capabilities its platform has. The manager cannot tell an unimplemented request
//! from one that succeeded; neither can the application.
//!
//! Backends are chosen once, when the manager is created, from a priority-ordered list of [`BackendBootstrap`]s.
//!
//! [`discover_or_get`]: crate::Manager::discover_or_get
//! [`note_advertisement`]: crate::Manager::note_advertisement
//! [`begin_service_discovery`]: crate::Manager::begin_service_discovery
//! [`fill_service`]: crate::Manager::fill_service

use std::sync::Arc;

use crate::manager::WeakManager;
use crate::{Characteristic, Peripheral, Result, Service};

pub mod simulated;

/// Operations a platform backend may support
///
/// Calls are fire-and-forget requests. They must not block on radio I/O; results arrive later through the manager.
/// A backend is shared between the application's threads and its own callback threads, hence `Send + Sync`.
#[allow(unused_variables)]
pub trait Backend: Send + Sync {
    /// Starts scanning for advertisements, optionally only from devices advertising `uuid_filter`.
    fn scan(&self, uuid_filter: Option<&str>) {}

    /// Stops scanning. There is no acknowledgement.
    fn stop_scan(&self) {}

    /// Starts advertising this device.
    fn start_advertise(&self) {}

    /// Connects to `peripheral`.
    fn connect(&self, peripheral: &Peripheral) {}

    /// Disconnects from `peripheral`. The backend reports completion with
    /// [`Manager::peripheral_disconnected`][crate::Manager::peripheral_disconnected].
    fn disconnect(&self, peripheral: &Peripheral) {}

    /// Discovers the services of `peripheral`.
    fn get_services(&self, peripheral: &Peripheral) {}

    /// Discovers the characteristics of `service`.
    fn get_characteristics(&self, peripheral: &Peripheral, service: &Service) {}

    /// Reads the value of `characteristic`.
    fn read_characteristic(&self, peripheral: &Peripheral, characteristic: &Characteristic) {}

    /// Subscribes to notifications from `characteristic`.
    fn set_notify(&self, peripheral: &Peripheral, characteristic: &Characteristic) {}

    /// Writes `data` to `characteristic`.
    fn write_characteristic(&self, peripheral: &Peripheral, characteristic: &Characteristic, data: &[u8]) {}

    /// Discovers the descriptors of `characteristic`.
    fn discover_descriptors(&self, peripheral: &Peripheral, characteristic: &Characteristic) {}

    /// The application's Bluetooth permission as a raw platform value. See
    /// [`AuthorizationStatus`][crate::AuthorizationStatus].
    fn authorization_status(&self) -> i32 {
        0
    }

    /// Whether `peripheral` currently has a connection.
    fn is_connected(&self, peripheral: &Peripheral) -> bool {
        false
    }

    /// Frees whatever platform state the backend keeps for `peripheral`'s cookie.
    ///
    /// Called exactly once, while the peripheral is being released.
    fn release_cookie(&self, peripheral: &Peripheral) {}
}

/// A candidate backend
pub trait BackendBootstrap: Sync {
    /// A short name for logging
    fn name(&self) -> &'static str;

    /// Whether this backend can run in the current process
    fn available(&self) -> bool;

    /// Creates the backend.
    ///
    /// The backend keeps `manager` to report results; it must not upgrade it before `create` returns.
    fn create(&self, manager: WeakManager) -> Result<Arc<dyn Backend>>;
}

/// The candidate backends for this platform, highest priority first.
pub fn default_bootstraps() -> Vec<&'static dyn BackendBootstrap> {
    #[allow(unused_mut)]
    let mut bootstraps: Vec<&'static dyn BackendBootstrap> = Vec::new();
    #[cfg(any(target_os = "windows", feature = "simulated"))]
    bootstraps.push(&simulated::BOOTSTRAP);
    bootstraps
}

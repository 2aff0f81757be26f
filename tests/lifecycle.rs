use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};

use minible::backend::{Backend, BackendBootstrap};
use minible::error::ErrorKind;
use minible::*;

#[derive(Default)]
struct MockBackend {
    calls: Mutex<Vec<String>>,
    connected: Mutex<HashSet<Cookie>>,
}

impl MockBackend {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Backend for MockBackend {
    fn scan(&self, uuid_filter: Option<&str>) {
        self.record(format!("scan {uuid_filter:?}"));
    }

    fn connect(&self, peripheral: &Peripheral) {
        self.record(format!("connect {}", peripheral.cookie()));
        self.connected.lock().unwrap().insert(peripheral.cookie());
    }

    fn disconnect(&self, peripheral: &Peripheral) {
        self.record(format!("disconnect {}", peripheral.cookie()));
    }

    fn authorization_status(&self) -> i32 {
        2
    }

    fn is_connected(&self, peripheral: &Peripheral) -> bool {
        self.connected.lock().unwrap().contains(&peripheral.cookie())
    }

    fn release_cookie(&self, peripheral: &Peripheral) {
        self.record(format!("release_cookie {}", peripheral.cookie()));
        self.connected.lock().unwrap().remove(&peripheral.cookie());
    }
}

struct MockBootstrap {
    available: bool,
    fail: bool,
    backend: Arc<MockBackend>,
}

impl MockBootstrap {
    fn new() -> Self {
        MockBootstrap {
            available: true,
            fail: false,
            backend: Arc::new(MockBackend::default()),
        }
    }
}

impl BackendBootstrap for MockBootstrap {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        self.available
    }

    fn create(&self, _manager: WeakManager) -> Result<Arc<dyn Backend>> {
        if self.fail {
            return Err(Error::new(ErrorKind::Other, None, "no adapter"));
        }
        Ok(self.backend.clone())
    }
}

/// `(event, cookie, name at the time of the event)`
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(String, Cookie, String)>>,
}

impl Recorder {
    fn events(&self) -> Vec<(String, Cookie, String)> {
        self.events.lock().unwrap().clone()
    }

    fn kinds(&self) -> Vec<String> {
        self.events().into_iter().map(|(kind, _, _)| kind).collect()
    }
}

impl EventSink for Recorder {
    fn discover_peripheral(&self, peripheral: &Peripheral) {
        let event = ("discover".to_owned(), peripheral.cookie(), peripheral.name());
        self.events.lock().unwrap().push(event);
    }

    fn disconnect_peripheral(&self, peripheral: &Peripheral, error: i32) {
        let event = (format!("disconnect {error}"), peripheral.cookie(), peripheral.name());
        self.events.lock().unwrap().push(event);
    }

    fn release_peripheral(&self, peripheral: &Peripheral) {
        let event = ("release".to_owned(), peripheral.cookie(), peripheral.name());
        self.events.lock().unwrap().push(event);
    }
}

fn setup() -> (Manager, Arc<MockBackend>, Arc<Recorder>) {
    let bootstrap = MockBootstrap::new();
    let manager = Manager::with_bootstraps(Config::default(), &[&bootstrap]);
    let recorder = Arc::new(Recorder::default());
    manager.set_callbacks(recorder.clone());
    (manager, bootstrap.backend, recorder)
}

fn cookies(manager: &Manager) -> Vec<u64> {
    manager.peripherals().iter().map(|x| x.cookie().as_u64()).collect()
}

fn advertise(manager: &Manager, cookie: u64, name: Option<&str>, rssi: i16) -> Peripheral {
    let peripheral = manager.discover_or_get(Cookie::new(cookie), name).unwrap();
    manager.note_advertisement(&peripheral, rssi).unwrap();
    peripheral
}

#[test]
fn scan_reports_each_advertisement() {
    let (manager, backend, recorder) = setup();
    manager.scan(None);
    assert_eq!(backend.calls(), vec!["scan None"]);

    let first = advertise(&manager, 0x1000, None, -79);
    let second = advertise(&manager, 0x1001, Some("Thermometer"), 81);

    assert_eq!(manager.len(), 2);
    assert_eq!(first.name(), "");
    assert_eq!(first.rssi(), -79);
    assert_eq!(second.name(), "Thermometer");
    assert_eq!(second.rssi(), 81);
    assert!(second.last_advertisement().is_some());
    assert_eq!(
        recorder.events(),
        vec![
            ("discover".to_owned(), Cookie::new(0x1000), String::new()),
            ("discover".to_owned(), Cookie::new(0x1001), "Thermometer".to_owned()),
        ]
    );
}

#[test]
fn rediscovering_a_cookie_returns_the_same_peripheral() {
    let (manager, _, recorder) = setup();
    let first = advertise(&manager, 0x1001, Some("Thermometer"), 81);
    let again = advertise(&manager, 0x1001, Some("Renamed"), 70);

    assert_eq!(first, again);
    assert_eq!(manager.len(), 1);
    assert_eq!(again.name(), "Thermometer");
    assert_eq!(again.rssi(), 70);
    assert_eq!(recorder.kinds(), vec!["discover", "discover"]);
}

#[test]
fn gatt_tree_discovery_and_rediscovery() {
    let (manager, _, _) = setup();
    let p = advertise(&manager, 0x1000, None, -79);

    manager.begin_service_discovery(&p, 2).unwrap();
    manager.fill_service(&p, 0, "180A", Cookie::new(0xa)).unwrap();
    manager.fill_service(&p, 1, "180F", Cookie::new(0xf)).unwrap();

    let props = CharacteristicProperties::from_bits(0x02);
    let info = manager.begin_characteristic_discovery(&p, "180A", 2).unwrap().unwrap();
    manager.fill_characteristic(&p, &info, 0, "2A29", Cookie::new(0xa1), props).unwrap();
    manager.fill_characteristic(&p, &info, 1, "2A24", Cookie::new(0xa2), props).unwrap();
    let battery = manager.begin_characteristic_discovery(&p, "180F", 1).unwrap().unwrap();
    let level = manager
        .fill_characteristic(&p, &battery, 0, "2A19", Cookie::new(0xf1), CharacteristicProperties::from_bits(0x12))
        .unwrap();

    assert_eq!(manager.find_characteristic(&p, "180F", "2A19"), Some(level.clone()));
    assert_eq!(level.service(), Some(battery.clone()));
    assert!(level.properties().notify);
    assert_eq!(manager.find_characteristic_by_cookie(&p, Cookie::new(0xa2)).unwrap().slot(), 1);
    assert!(manager.find_service(&p, "1809").is_none());
    assert!(manager.find_characteristic(&p, "180A", "2A19").is_none());

    // unknown service: nothing allocated, nothing dropped
    assert!(manager.begin_characteristic_discovery(&p, "1809", 3).unwrap().is_none());
    assert_eq!(p.services().map(|x| x.len()), Some(2));

    manager.begin_service_discovery(&p, 1).unwrap();
    assert!(!info.is_valid());
    assert!(!battery.is_valid());
    assert!(!level.is_valid());
    assert_eq!(battery.characteristics(), None);
    assert!(manager.find_service(&p, "180F").is_none());
    assert_eq!(p.services().map(|x| x.len()), Some(1));
    assert_eq!(p.services().unwrap()[0].uuid(), None);
}

#[test]
fn release_of_connected_peripheral_reports_disconnect_first() {
    let (manager, backend, recorder) = setup();
    let p = advertise(&manager, 0x1002, Some("Sesame_HTS"), -82);
    manager.connect(&p);
    manager.release_peripheral(&p);

    assert_eq!(
        recorder.events()[1..],
        [
            ("disconnect 0".to_owned(), Cookie::new(0x1002), "Sesame_HTS".to_owned()),
            ("release".to_owned(), Cookie::new(0x1002), "Sesame_HTS".to_owned()),
        ]
    );
    // the backend is never asked to disconnect, only to forget the cookie
    assert_eq!(backend.calls(), vec!["connect 0x1002", "release_cookie 0x1002"]);
    assert!(manager.is_empty());
    assert!(p.is_released());
    assert_eq!(p.name(), "");
}

#[test]
fn release_of_idle_peripheral_skips_disconnect() {
    let (manager, backend, recorder) = setup();
    let p = advertise(&manager, 0x1003, Some("Three"), 83);
    manager.release_peripheral(&p);
    assert_eq!(recorder.kinds(), vec!["discover", "release"]);
    assert_eq!(backend.calls(), vec!["release_cookie 0x1003"]);
}

#[test]
fn registry_rejects_peripherals_past_capacity() {
    let (manager, _, recorder) = setup();
    for cookie in 0..48 {
        advertise(&manager, cookie, None, -50);
    }
    let before = cookies(&manager);

    let err = manager.discover_or_get(Cookie::new(48), Some("one too many")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RegistryFull);
    assert_eq!(cookies(&manager), before);
    assert_eq!(recorder.events().len(), 48);

    // an existing cookie still resolves when full
    assert!(manager.discover_or_get(Cookie::new(47), None).is_ok());

    manager.release_peripheral(&manager.peripheral_at(0).unwrap());
    assert!(manager.discover_or_get(Cookie::new(48), None).is_ok());
    assert_eq!(manager.len(), 48);
}

#[test]
fn configured_capacity_is_honored() {
    let manager = Manager::with_bootstraps(Config::default().with_max_peripherals(2), &[]);
    manager.discover_or_get(Cookie::new(1), None).unwrap();
    manager.discover_or_get(Cookie::new(2), None).unwrap();
    let err = manager.discover_or_get(Cookie::new(3), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RegistryFull);
}

#[test]
fn release_preserves_registry_order() {
    let (manager, _, _) = setup();
    for cookie in 1..=5 {
        advertise(&manager, cookie, None, -50);
    }
    manager.release_peripheral(&manager.find_by_cookie(Cookie::new(2)).unwrap());
    assert_eq!(cookies(&manager), vec![1, 3, 4, 5]);
    manager.release_peripheral(&manager.peripheral_at(3).unwrap());
    assert_eq!(cookies(&manager), vec![1, 3, 4]);
}

#[test]
fn releasing_an_unregistered_peripheral_does_nothing() {
    let (manager, backend, recorder) = setup();
    advertise(&manager, 1, None, -50);

    let (other, _, _) = setup();
    let stranger = other.discover_or_get(Cookie::new(1), None).unwrap();
    manager.release_peripheral(&stranger);

    assert_eq!(manager.len(), 1);
    assert!(!stranger.is_released());
    assert_eq!(recorder.kinds(), vec!["discover"]);
    assert!(backend.calls().is_empty());

    let p = manager.find_by_cookie(Cookie::new(1)).unwrap();
    manager.release_peripheral(&p);
    manager.release_peripheral(&p);
    assert_eq!(recorder.kinds(), vec!["discover", "release"]);
    assert_eq!(backend.calls(), vec!["release_cookie 0x1"]);
}

#[test]
fn disconnect_with_error_releases_the_peripheral() {
    let (manager, _, recorder) = setup();
    let p = advertise(&manager, 0x1001, Some("Thermometer"), 81);
    manager.begin_service_discovery(&p, 1).unwrap();

    manager.peripheral_disconnected(&p, 19);
    assert_eq!(recorder.kinds(), vec!["discover", "disconnect 19", "release"]);
    assert!(manager.is_empty());
    assert!(p.is_released());
}

#[test]
fn orderly_disconnect_keeps_the_peripheral() {
    let (manager, _, recorder) = setup();
    let p = advertise(&manager, 0x1001, Some("Thermometer"), 81);
    manager.begin_service_discovery(&p, 1).unwrap();
    let service = manager.fill_service(&p, 0, "1809", Cookie::new(2)).unwrap();

    manager.peripheral_disconnected(&p, 0);
    assert_eq!(recorder.kinds(), vec!["discover", "disconnect 0"]);
    assert_eq!(manager.len(), 1);
    assert_eq!(p.services(), None);
    assert!(!service.is_valid());
}

#[test]
fn released_peripheral_rejects_late_bottom_halves() {
    let (manager, backend, _) = setup();
    let p = advertise(&manager, 1, None, -50);
    manager.begin_service_discovery(&p, 1).unwrap();
    manager.release_peripheral(&p);

    assert_eq!(manager.fill_service(&p, 0, "180F", Cookie::new(2)).unwrap_err().kind(), ErrorKind::Released);
    assert_eq!(manager.note_advertisement(&p, -40).unwrap_err().kind(), ErrorKind::Released);
    assert_eq!(p.set_name("late").unwrap_err().kind(), ErrorKind::Released);
    assert_eq!(p.services(), None);

    // forwarded requests are skipped as well
    manager.connect(&p);
    assert_eq!(backend.calls(), vec!["release_cookie 0x1"]);
}

#[test]
fn shutdown_releases_everything_and_stops_scanning() {
    let (manager, backend, recorder) = setup();
    for cookie in 1..=3 {
        advertise(&manager, cookie, None, -50);
    }
    manager.shutdown();

    assert!(manager.is_empty());
    assert_eq!(recorder.kinds().iter().filter(|x| *x == "release").count(), 3);
    manager.scan(None);
    assert!(!backend.calls().iter().any(|x| x.starts_with("scan")));
    assert_eq!(manager.backend_name(), None);
}

#[test]
fn manager_without_backend_ignores_requests() {
    let manager = Manager::with_bootstraps(Config::default(), &[]);
    assert_eq!(manager.backend_name(), None);
    assert_eq!(manager.authorization_status(), AuthorizationStatus::NotDetermined);

    let p = manager.discover_or_get(Cookie::new(1), Some("no radio")).unwrap();
    manager.scan(None);
    manager.connect(&p);
    manager.get_services(&p);
    manager.release_peripheral(&p);
    assert!(manager.is_empty());
}

#[test]
fn first_available_bootstrap_wins() {
    let unavailable = MockBootstrap {
        available: false,
        ..MockBootstrap::new()
    };
    let chosen = MockBootstrap::new();
    let manager = Manager::with_bootstraps(Config::default(), &[&unavailable, &chosen]);
    assert_eq!(manager.backend_name(), Some("mock"));
    assert_eq!(manager.authorization_status(), AuthorizationStatus::Denied);

    manager.scan(Some("180F"));
    assert!(unavailable.backend.calls().is_empty());
    assert_eq!(chosen.backend.calls(), vec!["scan Some(\"180F\")"]);
}

#[test]
fn failed_backend_creation_leaves_no_backend() {
    let failing = MockBootstrap {
        fail: true,
        ..MockBootstrap::new()
    };
    let fallback = MockBootstrap::new();
    let manager = Manager::with_bootstraps(Config::default(), &[&failing, &fallback]);
    assert_eq!(manager.backend_name(), None);
    manager.scan(None);
    assert!(fallback.backend.calls().is_empty());
}

#[test]
fn unsupported_capabilities_are_silent() {
    let (manager, _, recorder) = setup();
    let p = advertise(&manager, 1, None, -50);
    manager.start_advertise();
    manager.stop_scan();
    manager.get_services(&p);
    assert_eq!(p.services(), None);
    assert_eq!(recorder.kinds(), vec!["discover"]);
}

#[test]
fn set_callbacks_replaces_the_sink() {
    let (manager, _, first) = setup();
    let second = Arc::new(Recorder::default());
    manager.set_callbacks(second.clone());
    advertise(&manager, 1, None, -50);
    assert!(first.events().is_empty());
    assert_eq!(second.kinds(), vec!["discover"]);

    manager.clear_callbacks();
    advertise(&manager, 1, None, -50);
    assert_eq!(second.kinds(), vec!["discover"]);
}

/// Connects to every peripheral as soon as it is discovered.
#[derive(Default)]
struct AutoConnect {
    manager: OnceLock<WeakManager>,
}

impl EventSink for AutoConnect {
    fn discover_peripheral(&self, peripheral: &Peripheral) {
        if let Some(manager) = self.manager.get().and_then(|x| x.upgrade()) {
            manager.connect(peripheral);
            assert_eq!(manager.find_by_cookie(peripheral.cookie()).as_ref(), Some(peripheral));
        }
    }

    fn release_peripheral(&self, peripheral: &Peripheral) {
        if let Some(manager) = self.manager.get().and_then(|x| x.upgrade()) {
            assert!(manager.find_by_cookie(peripheral.cookie()).is_none());
            assert_eq!(manager.len(), 1);
        }
    }
}

#[test]
fn sinks_may_call_back_into_the_manager() {
    let bootstrap = MockBootstrap::new();
    let manager = Manager::with_bootstraps(Config::default(), &[&bootstrap]);
    let sink = Arc::new(AutoConnect::default());
    let _ = sink.manager.set(manager.downgrade());
    manager.set_callbacks(sink);

    let p = advertise(&manager, 7, None, -50);
    assert!(bootstrap.backend.is_connected(&p));
    manager.release_peripheral(&p);
    assert!(manager.is_empty());
}

#[test]
fn concurrent_releases_notify_once() {
    let (manager, backend, recorder) = setup();
    let p = advertise(&manager, 1, None, -50);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| manager.release_peripheral(&p));
        }
    });

    assert_eq!(recorder.kinds(), vec!["discover", "release"]);
    assert_eq!(backend.calls(), vec!["release_cookie 0x1"]);
    assert!(manager.is_empty());
}

#[test]
fn concurrent_discovery_respects_capacity() {
    let manager = Manager::with_bootstraps(Config::default(), &[]);
    std::thread::scope(|s| {
        for thread in 0..4u64 {
            let manager = &manager;
            s.spawn(move || {
                for cookie in 0..20 {
                    let _ = manager.discover_or_get(Cookie::new(thread * 100 + cookie), None);
                }
            });
        }
    });
    assert_eq!(manager.len(), DEFAULT_MAX_PERIPHERALS);
}

type ReleaseHook = Box<dyn Fn(&Manager, &Peripheral) -> String + Send + Sync>;

/// Records like [`Recorder`] and calls back into the manager from inside `release_peripheral`. The hook's result
/// is recorded as an event of its own.
struct CallsBackOnRelease {
    recorder: Recorder,
    manager: OnceLock<WeakManager>,
    hook: ReleaseHook,
}

impl EventSink for CallsBackOnRelease {
    fn discover_peripheral(&self, peripheral: &Peripheral) {
        self.recorder.discover_peripheral(peripheral);
    }

    fn disconnect_peripheral(&self, peripheral: &Peripheral, error: i32) {
        self.recorder.disconnect_peripheral(peripheral, error);
    }

    fn release_peripheral(&self, peripheral: &Peripheral) {
        self.recorder.release_peripheral(peripheral);
        if let Some(manager) = self.manager.get().and_then(|x| x.upgrade()) {
            let outcome = (self.hook)(&manager, peripheral);
            let event = (outcome, peripheral.cookie(), peripheral.name());
            self.recorder.events.lock().unwrap().push(event);
        }
    }
}

fn setup_with_release_hook(
    hook: impl Fn(&Manager, &Peripheral) -> String + Send + Sync + 'static,
) -> (Manager, Arc<MockBackend>, Arc<CallsBackOnRelease>) {
    let bootstrap = MockBootstrap::new();
    let manager = Manager::with_bootstraps(Config::default(), &[&bootstrap]);
    let sink = Arc::new(CallsBackOnRelease {
        recorder: Recorder::default(),
        manager: OnceLock::new(),
        hook: Box::new(hook),
    });
    let _ = sink.manager.set(manager.downgrade());
    manager.set_callbacks(sink.clone());
    (manager, bootstrap.backend, sink)
}

#[test]
fn nothing_is_reported_after_release_begins() {
    let (manager, backend, sink) = setup_with_release_hook(|manager, p| {
        let noted = manager.note_advertisement(p, -10).is_ok();
        manager.peripheral_disconnected(p, 19);
        let discovering = manager.begin_service_discovery(p, 1).is_ok();
        manager.connect(p);
        format!("note_advertisement -> {noted}, begin_service_discovery -> {discovering}")
    });
    let p = advertise(&manager, 1, Some("One"), -50);
    manager.release_peripheral(&p);

    assert_eq!(
        sink.recorder.events(),
        vec![
            ("discover".to_owned(), Cookie::new(1), "One".to_owned()),
            ("release".to_owned(), Cookie::new(1), "One".to_owned()),
            (
                "note_advertisement -> false, begin_service_discovery -> false".to_owned(),
                Cookie::new(1),
                "One".to_owned()
            ),
        ]
    );
    assert_eq!(p.rssi(), -50);
    assert_eq!(backend.calls(), vec!["release_cookie 0x1"]);
    assert!(manager.is_empty());
}

#[test]
fn cookie_stays_taken_until_release_completes() {
    let (manager, backend, sink) = setup_with_release_hook(|manager, p| {
        match manager.discover_or_get(p.cookie(), Some("again")) {
            Ok(_) => "rediscover -> ok".to_owned(),
            Err(err) => format!("rediscover -> {:?}", err.kind()),
        }
    });
    let p = advertise(&manager, 1, Some("One"), -50);
    manager.connect(&p);
    manager.release_peripheral(&p);

    assert_eq!(
        sink.recorder.kinds(),
        vec!["discover", "disconnect 0", "release", "rediscover -> Released"]
    );
    assert!(manager.is_empty());

    // once the old record is gone the cookie registers afresh, and its backend state survives
    let fresh = advertise(&manager, 1, Some("Fresh"), -40);
    manager.connect(&fresh);
    assert_ne!(fresh, p);
    assert_eq!(fresh.name(), "Fresh");
    assert!(backend.is_connected(&fresh));
    assert_eq!(manager.len(), 1);
    assert_eq!(backend.calls(), vec!["connect 0x1", "release_cookie 0x1", "connect 0x1"]);
}

#[test]
fn release_all_from_a_release_callback_finishes() {
    let (manager, backend, sink) = setup_with_release_hook(|manager, _| {
        manager.release_all();
        format!("remaining {}", manager.len())
    });
    for cookie in 1..=3 {
        advertise(&manager, cookie, None, -50);
    }
    manager.release_peripheral(&manager.peripheral_at(0).unwrap());

    assert!(manager.is_empty());
    assert_eq!(sink.recorder.kinds().iter().filter(|x| *x == "release").count(), 3);
    assert_eq!(
        backend.calls(),
        vec!["release_cookie 0x3", "release_cookie 0x2", "release_cookie 0x1"]
    );
}

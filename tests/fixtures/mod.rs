//! Test fixtures for geotrack.
//!
//! Provides:
//! - Real Las Vegas locations
//! - Recording fakes for the channel, geocoder, clock, and store

#![allow(dead_code)]

pub mod las_vegas_locations;

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use geotrack::error::{ChannelError, GeocodeError, StoreError};
use geotrack::events::TrackingEvent;
use geotrack::model::{GeofenceArea, TrackingSession};
use geotrack::store::InMemoryStore;
use geotrack::traits::{Clock, Geocoder, PersistenceStore, PubSubChannel};
use geotrack::tracker::{TrackingConfig, TrackingSessionManager};

// ============================================================================
// Gates
// ============================================================================

/// Test-side ends of a held call: `entered` fires as soon as the call
/// starts, and the call returns once something is sent on `release`.
pub struct Gate {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

/// Collaborator-side ends of a [`Gate`].
pub struct Held {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl Held {
    pub fn pair() -> (Self, Gate) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let held = Self {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        let gate = Gate {
            entered: entered_rx,
            release: release_tx,
        };
        (held, gate)
    }

    pub fn wait(&self) {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Keeps every published (topic, event) pair in order.
#[derive(Default)]
pub struct RecordingChannel {
    published: Mutex<Vec<(String, TrackingEvent)>>,
    failing: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<(String, TrackingEvent)> {
        self.published.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|(_, event)| event.name()).collect()
    }

    /// Names excluding `location.updated`, which most tests don't care about.
    pub fn notable(&self) -> Vec<&'static str> {
        self.names()
            .into_iter()
            .filter(|name| *name != "location.updated")
            .collect()
    }

    pub fn topics(&self) -> Vec<String> {
        self.events().into_iter().map(|(topic, _)| topic).collect()
    }

    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

impl PubSubChannel for RecordingChannel {
    fn publish(&self, topic: &str, event: &TrackingEvent) -> Result<(), ChannelError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::PublishFailed {
                topic: topic.to_string(),
                reason: "broker offline".to_string(),
            });
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), event.clone()));
        Ok(())
    }
}

// ============================================================================
// Geocoder
// ============================================================================

/// Answers every lookup with a numbered street address, or fails on demand.
#[derive(Default)]
pub struct FakeGeocoder {
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FakeGeocoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let geocoder = Self::default();
        geocoder.failing.store(true, Ordering::SeqCst);
        Arc::new(geocoder)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Geocoder for FakeGeocoder {
    fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Result<Option<String>, GeocodeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(GeocodeError::Service("rate limited".to_string()));
        }
        Ok(Some(format!("{} Fixture St ({:.4}, {:.4})", call, latitude, longitude)))
    }
}

/// Holds every lookup until the test releases it.
pub struct GatedGeocoder {
    held: Held,
}

impl GatedGeocoder {
    pub fn new() -> (Arc<Self>, Gate) {
        let (held, gate) = Held::pair();
        (Arc::new(Self { held }), gate)
    }
}

impl Geocoder for GatedGeocoder {
    fn reverse_geocode(&self, _latitude: f64, _longitude: f64) -> Result<Option<String>, GeocodeError> {
        self.held.wait();
        Ok(Some("late address".to_string()))
    }
}

// ============================================================================
// Clock
// ============================================================================

pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn at(now_ms: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(now_ms)))
    }

    pub fn advance(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Store
// ============================================================================

/// [`InMemoryStore`] with switchable failures.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
    held_load: Mutex<Option<Held>>,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_saves(&self, failing: bool) {
        self.fail_saves.store(failing, Ordering::SeqCst);
    }

    pub fn fail_loads(&self, failing: bool) {
        self.fail_loads.store(failing, Ordering::SeqCst);
    }

    /// Hold the next geofence load until released, then fail it.
    pub fn hold_next_load(&self) -> Gate {
        let (held, gate) = Held::pair();
        *self.held_load.lock().unwrap() = Some(held);
        gate
    }
}

impl PersistenceStore for FlakyStore {
    fn save_session(&self, session: &TrackingSession) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.save_session(session)
    }

    fn load_geofences(&self, scope: Option<&str>) -> Result<Vec<GeofenceArea>, StoreError> {
        let held = self.held_load.lock().unwrap().take();
        if let Some(held) = held {
            held.wait();
            return Err(StoreError::Unavailable("timeout".to_string()));
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("timeout".to_string()));
        }
        self.inner.load_geofences(scope)
    }

    fn get_containment_state(&self, actor_id: &str, fence_id: &str) -> Result<Option<bool>, StoreError> {
        self.inner.get_containment_state(actor_id, fence_id)
    }

    fn set_containment_state(&self, actor_id: &str, fence_id: &str, inside: bool) -> Result<(), StoreError> {
        self.inner.set_containment_state(actor_id, fence_id, inside)
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Default config without the idle watchdog, so tests stay deterministic.
pub fn quiet_config() -> TrackingConfig {
    TrackingConfig {
        locator_timeout: None,
        ..TrackingConfig::default()
    }
}

pub fn manager_with(
    store: Arc<dyn PersistenceStore + Send + Sync>,
    channel: Arc<dyn PubSubChannel + Send + Sync>,
) -> TrackingSessionManager {
    TrackingSessionManager::new(quiet_config(), store, channel).with_clock(FixedClock::at(1_700_000_000_000))
}

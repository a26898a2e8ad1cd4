//! Collaborator interfaces.
//!
//! The tracker performs no I/O of its own. Positioning, geocoding,
//! persistence, and event delivery are all reached through these traits so
//! hosts can plug in their own backends.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ChannelError, GeocodeError, LocatorError, StoreError};
use crate::events::TrackingEvent;
use crate::model::{GeofenceArea, LocationSample, TrackingSession};

/// A lazy, unbounded stream of device positions.
///
/// Any iterator over sample results is a locator; the tracker consumes
/// whatever arrives and never asks for a cadence.
pub trait Locator: Iterator<Item = Result<LocationSample, LocatorError>> {}

impl<T> Locator for T where T: Iterator<Item = Result<LocationSample, LocatorError>> {}

/// Reverse geocoding. Best effort; callers treat errors as "no address".
pub trait Geocoder {
    /// `Ok(None)` when the service has no address for the point.
    fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Result<Option<String>, GeocodeError>;
}

/// Key-based storage for sessions, geofences, and containment state.
///
/// Only per-key atomicity is assumed.
pub trait PersistenceStore {
    fn save_session(&self, session: &TrackingSession) -> Result<(), StoreError>;

    /// Fences scoped to a correlation id, or unscoped fences when `None`.
    fn load_geofences(&self, scope: Option<&str>) -> Result<Vec<GeofenceArea>, StoreError>;

    /// Last known "inside" flag; `None` if never recorded.
    fn get_containment_state(&self, actor_id: &str, fence_id: &str) -> Result<Option<bool>, StoreError>;

    fn set_containment_state(&self, actor_id: &str, fence_id: &str, inside: bool) -> Result<(), StoreError>;
}

/// At-most-once publish to subscribers of a topic.
pub trait PubSubChannel {
    fn publish(&self, topic: &str, event: &TrackingEvent) -> Result<(), ChannelError>;
}

/// Wall clock in unix epoch milliseconds.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

/// [`Clock`] backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or_default()
    }
}

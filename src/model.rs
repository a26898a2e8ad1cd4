//! Data model shared by the tracker, geofence engine, and route optimizer.
//!
//! Timestamps are unix epoch milliseconds.

use serde::{Deserialize, Serialize};

use crate::error::InvalidSample;
use crate::haversine::{self, Coordinate};

/// One instantaneous position reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Estimated horizontal error in meters.
    pub accuracy: f64,
    pub altitude: Option<f64>,
    /// Degrees clockwise from true north, [0, 360).
    pub heading: Option<f64>,
    /// Meters per second.
    pub speed: Option<f64>,
    pub timestamp_ms: i64,
    /// Filled in lazily by reverse geocoding.
    pub address: Option<String>,
}

impl LocationSample {
    /// A bare sample with zero accuracy and no optional attributes.
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: 0.0,
            altitude: None,
            heading: None,
            speed: None,
            timestamp_ms,
            address: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    pub fn validate(&self) -> Result<(), InvalidSample> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(InvalidSample::Latitude(self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(InvalidSample::Longitude(self.longitude));
        }
        if !self.accuracy.is_finite() || self.accuracy < 0.0 {
            return Err(InvalidSample::Accuracy(self.accuracy));
        }
        if let Some(heading) = self.heading {
            if !(0.0..360.0).contains(&heading) {
                return Err(InvalidSample::Heading(heading));
            }
        }
        if let Some(speed) = self.speed {
            if !speed.is_finite() || speed < 0.0 {
                return Err(InvalidSample::Speed(speed));
            }
        }
        Ok(())
    }
}

/// What the tracked actor is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Delivery,
    Service,
    Customer,
    Business,
}

/// One actor's tracking over one activity.
///
/// While active the manager holds the live state; this is the finalized
/// record handed to persistence on stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSession {
    pub id: String,
    pub actor_id: String,
    pub activity_kind: ActivityKind,
    pub correlation_id: Option<String>,
    pub started_at_ms: i64,
    pub ended_at_ms: Option<i64>,
    pub is_active: bool,
    /// The most recent retained samples, oldest first.
    pub trajectory: Vec<LocationSample>,
    /// Over every accepted sample, including evicted ones.
    pub total_distance_meters: f64,
    pub total_duration_millis: i64,
}

/// Purpose of a geofence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceKind {
    Pickup,
    Delivery,
    ServiceLocation,
    ServiceArea,
    DeliveryZone,
    RestrictedZone,
}

/// A named circular region of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceArea {
    pub id: String,
    pub name: String,
    pub center: Coordinate,
    pub radius_meters: f64,
    pub kind: GeofenceKind,
    pub owner_correlation_id: Option<String>,
    pub is_active: bool,
}

impl GeofenceArea {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        center: Coordinate,
        radius_meters: f64,
        kind: GeofenceKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            center,
            radius_meters,
            kind,
            owner_correlation_id: None,
            is_active: true,
        }
    }

    pub fn owned_by(mut self, correlation_id: impl Into<String>) -> Self {
        self.owner_correlation_id = Some(correlation_id.into());
        self
    }

    pub fn contains(&self, point: Coordinate) -> bool {
        haversine::distance_meters(point, self.center) <= self.radius_meters
    }

    /// Signed distance to the boundary: negative inside, positive outside.
    pub fn distance_to_boundary_meters(&self, point: Coordinate) -> f64 {
        haversine::distance_meters(point, self.center) - self.radius_meters
    }
}

/// A pending destination to visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStop {
    pub correlation_id: String,
    pub location: Coordinate,
    /// Earliest/latest arrival, epoch ms. Not used by the heuristic yet.
    pub time_window: Option<(i64, i64)>,
    /// Higher is more urgent. Not used by the heuristic yet.
    pub priority: i32,
    pub estimated_service_duration_millis: i64,
}

impl RouteStop {
    pub fn new(correlation_id: impl Into<String>, location: Coordinate) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            location,
            time_window: None,
            priority: 0,
            estimated_service_duration_millis: 0,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn time_window(mut self, start_ms: i64, end_ms: i64) -> Self {
        self.time_window = Some((start_ms, end_ms));
        self
    }

    pub fn service_duration(mut self, millis: i64) -> Self {
        self.estimated_service_duration_millis = millis;
        self
    }
}

/// One stop in a computed plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStop {
    pub stop_id: String,
    pub sequence_index: usize,
    pub estimated_arrival_ms: i64,
    /// Travel time from the previous position.
    pub travel_time_millis: i64,
    /// Distance from the previous position.
    pub distance_meters: f64,
}

/// Visiting order and ETAs for a set of stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub stops: Vec<PlannedStop>,
    pub total_distance_meters: f64,
    pub total_time_millis: i64,
}

impl RoutePlan {
    pub fn stop_ids(&self) -> Vec<&str> {
        self.stops.iter().map(|stop| stop.stop_id.as_str()).collect()
    }
}

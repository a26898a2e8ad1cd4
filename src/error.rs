//! Error types for tracking, routing, and the external collaborators.

use thiserror::Error;

use crate::model::TrackingSession;

/// Caller-facing failures of the session manager.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// `start()` for an actor that already has an active session.
    #[error("actor {actor_id} already has an active tracking session")]
    SessionAlreadyActive { actor_id: String },

    /// `ingest()`/`stop()` for an actor without an active session.
    #[error("actor {actor_id} has no active tracking session")]
    NoActiveSession { actor_id: String },

    /// The actor has an active session but no accepted sample yet.
    #[error("actor {actor_id} has no known position yet")]
    NoPosition { actor_id: String },

    #[error(transparent)]
    Route(#[from] RouteError),

    /// Sample failed range validation.
    #[error("invalid location sample: {0}")]
    InvalidSample(#[from] InvalidSample),

    /// The session was finalized but could not be saved.
    ///
    /// The finalized session is returned so the caller can retry.
    #[error("failed to persist session {}: {source}", .session.id)]
    Persistence {
        session: Box<TrackingSession>,
        source: StoreError,
    },
}

/// Route optimization failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    #[error("cannot optimize an empty stop set")]
    EmptyStopSet,

    #[error("travel speed must be finite and positive, got {speed_kmh} km/h")]
    InvalidSpeed { speed_kmh: f64 },
}

/// A sample older than the last accepted one. Not a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stale sample at {timestamp_ms} ms, last accepted {last_accepted_ms} ms")]
pub struct StaleSample {
    pub timestamp_ms: i64,
    pub last_accepted_ms: i64,
}

/// Range validation failures for a [`LocationSample`](crate::model::LocationSample).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidSample {
    #[error("latitude {0} outside [-90, 90]")]
    Latitude(f64),

    #[error("longitude {0} outside [-180, 180]")]
    Longitude(f64),

    #[error("accuracy {0} must be a non-negative number of meters")]
    Accuracy(f64),

    #[error("heading {0} outside [0, 360)")]
    Heading(f64),

    #[error("speed {0} must be non-negative")]
    Speed(f64),
}

/// Persistence collaborator failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rejected {key}: {reason}")]
    Rejected { key: String, reason: String },
}

/// Reverse geocoding failure. Always absorbed.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("geocoder error: {0}")]
    Service(String),
}

/// Publish/subscribe channel failure. Logged only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,

    #[error("publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },
}

/// Device positioning failure, surfaced as a `tracking.error` event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("location services unavailable: {0}")]
    Unavailable(String),

    #[error("location permission denied")]
    PermissionDenied,
}

//! geotrack core
//!
//! Live location tracking for couriers, technicians, and customers:
//! bounded trajectories, edge-triggered geofences, and nearest-neighbor
//! route plans with ETAs. Storage, geocoding, and event delivery are
//! injected through the interfaces in [`traits`].

pub mod error;
pub mod events;
pub mod geofence;
pub mod haversine;
pub mod model;
pub mod nominatim;
pub mod polyline;
pub mod solver;
pub mod store;
pub mod tracker;
pub mod traits;
pub mod trajectory;
pub mod watchdog;

pub use error::{RouteError, StaleSample, TrackingError};
pub use events::{EventBroadcaster, InMemoryChannel, Subscription, TrackingEvent};
pub use geofence::{Crossing, GeofenceEngine, GeofenceEvent};
pub use haversine::{Coordinate, bearing_degrees, distance_meters};
pub use model::{
    ActivityKind, GeofenceArea, GeofenceKind, LocationSample, PlannedStop, RoutePlan, RouteStop,
    TrackingSession,
};
pub use solver::{OptimizeOptions, RouteOptimizer};
pub use store::InMemoryStore;
pub use tracker::{CancelToken, IngestOutcome, TrackingConfig, TrackingSessionManager};
pub use trajectory::{TrajectoryBuffer, TrajectorySnapshot};

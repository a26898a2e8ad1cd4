//! Tracking session manager.
//!
//! One active session per actor. Each sample flows through validation, the
//! trajectory window, geofence evaluation, optional reverse geocoding, and
//! finally out to subscribers as events. All I/O goes through the injected
//! collaborators.
//!
//! Sessions for different actors are independent and may be driven from
//! different threads. Samples for one actor are serialized by that actor's
//! session lock; callers are still expected to feed them in arrival order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{LocatorError, StaleSample, StoreError, TrackingError};
use crate::events::{ErrorKind, EventBroadcaster, TrackingEvent};
use crate::geofence::{GeofenceEngine, GeofenceEvent};
use crate::haversine::{self, Coordinate};
use crate::model::{ActivityKind, GeofenceArea, LocationSample, RoutePlan, RouteStop, TrackingSession};
use crate::solver::RouteOptimizer;
use crate::traits::{Clock, Geocoder, Locator, PersistenceStore, PubSubChannel, SystemClock};
use crate::trajectory::{DEFAULT_WINDOW_SIZE, TrajectoryBuffer, TrajectorySnapshot};
use crate::watchdog::IdleWatchdog;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Samples retained per session.
    pub window_size: usize,
    /// Minimum movement since the last address lookup before another one.
    pub geocode_threshold_meters: f64,
    /// Publish a `tracking.error` when the locator is silent this long.
    pub locator_timeout: Option<Duration>,
    /// Ignore samples whose accuracy is worse than this.
    pub max_accuracy_meters: Option<f64>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            geocode_threshold_meters: 100.0,
            locator_timeout: Some(Duration::from_secs(120)),
            max_accuracy_meters: None,
        }
    }
}

/// Result of feeding one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Accepted(IngestReport),
    /// Older than the last accepted sample; nothing changed.
    Stale(StaleSample),
    /// Accuracy worse than the configured limit; nothing changed.
    LowAccuracy { accuracy: f64 },
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub session_id: String,
    /// Distance from the previous accepted sample.
    pub step_meters: f64,
    pub total_distance_meters: f64,
    pub total_duration_millis: i64,
    pub crossings: Vec<GeofenceEvent>,
    pub address: Option<String>,
}

/// Counts from [`TrackingSessionManager::follow`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowSummary {
    pub accepted: usize,
    pub dropped: usize,
    pub locator_errors: usize,
    pub cancelled: bool,
    /// The session was stopped while following.
    pub session_ended: bool,
}

/// Cooperative cancellation for [`TrackingSessionManager::follow`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct ActiveSession {
    id: String,
    actor_id: String,
    activity_kind: ActivityKind,
    correlation_id: Option<String>,
    started_at_ms: i64,
    trajectory: TrajectoryBuffer,
    fences: Vec<GeofenceArea>,
    last_lookup: Option<Coordinate>,
    watchdog: Option<IdleWatchdog>,
    finished: bool,
}

impl ActiveSession {
    fn view(&self) -> TrackingSession {
        let snapshot = self.trajectory.snapshot();
        TrackingSession {
            id: self.id.clone(),
            actor_id: self.actor_id.clone(),
            activity_kind: self.activity_kind,
            correlation_id: self.correlation_id.clone(),
            started_at_ms: self.started_at_ms,
            ended_at_ms: None,
            is_active: !self.finished,
            trajectory: snapshot.samples,
            total_distance_meters: snapshot.total_distance_meters,
            total_duration_millis: snapshot.total_duration_millis,
        }
    }

    /// Reserve an address lookup if the actor moved far enough.
    fn claim_lookup(&mut self, point: Coordinate, threshold_meters: f64) -> bool {
        let due = match self.last_lookup {
            None => true,
            Some(previous) => haversine::distance_meters(previous, point) > threshold_meters,
        };
        if due {
            self.last_lookup = Some(point);
        }
        due
    }
}

pub struct TrackingSessionManager {
    config: TrackingConfig,
    store: Arc<dyn PersistenceStore + Send + Sync>,
    geocoder: Option<Arc<dyn Geocoder + Send + Sync>>,
    clock: Arc<dyn Clock + Send + Sync>,
    broadcaster: Arc<EventBroadcaster>,
    geofences: GeofenceEngine,
    sessions: Mutex<HashMap<String, Arc<Mutex<ActiveSession>>>>,
}

impl std::fmt::Debug for TrackingSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingSessionManager")
            .field("config", &self.config)
            .field("active_sessions", &self.sessions().len())
            .field("geocoding", &self.geocoder.is_some())
            .finish()
    }
}

impl TrackingSessionManager {
    /// A manager without geocoding, on the system clock.
    pub fn new(
        config: TrackingConfig,
        store: Arc<dyn PersistenceStore + Send + Sync>,
        channel: Arc<dyn PubSubChannel + Send + Sync>,
    ) -> Self {
        Self {
            config,
            geofences: GeofenceEngine::new(store.clone()),
            store,
            geocoder: None,
            clock: Arc::new(SystemClock),
            broadcaster: Arc::new(EventBroadcaster::new(channel)),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder + Send + Sync>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    pub fn geofence_engine(&self) -> &GeofenceEngine {
        &self.geofences
    }

    /// Begin tracking an actor.
    ///
    /// Loads the geofences relevant to `correlation_id`. If they cannot be
    /// loaded the session still starts, without fences, and a
    /// `tracking.error` is published.
    pub fn start(
        &self,
        actor_id: &str,
        activity_kind: ActivityKind,
        correlation_id: Option<&str>,
    ) -> Result<TrackingSession, TrackingError> {
        if self.sessions().contains_key(actor_id) {
            return Err(TrackingError::SessionAlreadyActive {
                actor_id: actor_id.to_string(),
            });
        }

        let (fences, load_failure) = match self.load_fences(actor_id, correlation_id) {
            Ok(fences) => (fences, None),
            Err(err) => (Vec::new(), Some(err)),
        };
        let session = ActiveSession {
            id: uuid::Uuid::new_v4().to_string(),
            actor_id: actor_id.to_string(),
            activity_kind,
            correlation_id: correlation_id.map(str::to_string),
            started_at_ms: self.clock.now_ms(),
            trajectory: TrajectoryBuffer::new(self.config.window_size),
            fences,
            last_lookup: None,
            watchdog: None,
            finished: false,
        };

        let view = {
            let mut sessions = self.sessions();
            // Another thread may have started this actor while fences loaded.
            if sessions.contains_key(actor_id) {
                return Err(TrackingError::SessionAlreadyActive {
                    actor_id: actor_id.to_string(),
                });
            }
            let view = session.view();
            let session = Arc::new(Mutex::new(session));
            lock(&session).watchdog = self.spawn_watchdog(actor_id, correlation_id);
            sessions.insert(actor_id.to_string(), session);
            view
        };
        // Only the call that actually started the session reports this.
        if let Some(err) = load_failure {
            self.report_fence_failure(actor_id, correlation_id, &err);
        }

        info!(
            actor_id,
            session_id = %view.id,
            ?activity_kind,
            correlation_id,
            "tracking session started"
        );
        Ok(view)
    }

    /// Feed one sample for an actor.
    pub fn ingest(&self, actor_id: &str, sample: LocationSample) -> Result<IngestOutcome, TrackingError> {
        sample.validate()?;
        let session = self.active(actor_id)?;
        let point = sample.coordinate();

        let (session_id, correlation_id, crossings, totals, lookup) = {
            let mut active = lock(&session);
            if active.finished {
                return Err(TrackingError::NoActiveSession {
                    actor_id: actor_id.to_string(),
                });
            }

            if let Some(max_accuracy) = self.config.max_accuracy_meters {
                if sample.accuracy > max_accuracy {
                    debug!(actor_id, accuracy = sample.accuracy, "low accuracy sample ignored");
                    return Ok(IngestOutcome::LowAccuracy {
                        accuracy: sample.accuracy,
                    });
                }
            }

            let step = match active.trajectory.append(sample.clone()) {
                Ok(step) => step,
                Err(stale) => {
                    debug!(actor_id, %stale, "stale sample dropped");
                    return Ok(IngestOutcome::Stale(stale));
                }
            };
            if let Some(watchdog) = &active.watchdog {
                watchdog.rearm();
            }

            let crossings = self.geofences.evaluate(actor_id, point, &active.fences);
            // Published under the session lock so each fence's crossings
            // leave in the order they happened.
            for crossing in &crossings {
                self.broadcaster.publish(&TrackingEvent::geofence(
                    actor_id,
                    active.correlation_id.as_deref(),
                    crossing.clone(),
                ));
            }

            let lookup = self.geocoder.is_some()
                && sample.address.is_none()
                && active.claim_lookup(point, self.config.geocode_threshold_meters);

            (
                active.id.clone(),
                active.correlation_id.clone(),
                crossings,
                (
                    step,
                    active.trajectory.total_distance_meters(),
                    active.trajectory.total_duration_millis(),
                ),
                lookup,
            )
        };

        // Geocoding runs outside the lock so stop() never waits on it.
        let mut sample = sample;
        if lookup {
            if let Some(address) = self.lookup_address(actor_id, point) {
                let mut active = lock(&session);
                if !active.finished {
                    active.trajectory.set_address(sample.timestamp_ms, address.clone());
                }
                sample.address = Some(address);
            }
        }

        let (step_meters, total_distance_meters, total_duration_millis) = totals;
        self.broadcaster.publish(&TrackingEvent::LocationUpdated {
            actor_id: actor_id.to_string(),
            session_id: session_id.clone(),
            correlation_id,
            sample: sample.clone(),
            total_distance_meters,
            total_duration_millis,
        });

        Ok(IngestOutcome::Accepted(IngestReport {
            session_id,
            step_meters,
            total_distance_meters,
            total_duration_millis,
            crossings,
            address: sample.address,
        }))
    }

    /// Finish an actor's session and hand it to persistence.
    ///
    /// If saving fails the session is still stopped; the finalized record
    /// comes back inside [`TrackingError::Persistence`].
    pub fn stop(&self, actor_id: &str) -> Result<TrackingSession, TrackingError> {
        let session = self
            .sessions()
            .remove(actor_id)
            .ok_or_else(|| TrackingError::NoActiveSession {
                actor_id: actor_id.to_string(),
            })?;

        let finished = {
            let mut active = lock(&session);
            active.finished = true;
            if let Some(watchdog) = active.watchdog.take() {
                watchdog.cancel();
            }
            let mut finished = active.view();
            finished.ended_at_ms = Some(self.clock.now_ms().max(active.started_at_ms));
            finished.is_active = false;
            finished
        };
        self.geofences.forget(actor_id);

        match self.store.save_session(&finished) {
            Ok(()) => {
                info!(
                    actor_id,
                    session_id = %finished.id,
                    total_distance_meters = finished.total_distance_meters,
                    total_duration_millis = finished.total_duration_millis,
                    "tracking session stopped"
                );
                Ok(finished)
            }
            Err(source) => {
                error!(actor_id, session_id = %finished.id, error = %source, "failed to persist session");
                self.broadcaster.publish(&TrackingEvent::error(
                    actor_id,
                    finished.correlation_id.as_deref(),
                    ErrorKind::PersistenceFailed,
                    source.to_string(),
                ));
                Err(TrackingError::Persistence {
                    session: Box::new(finished),
                    source,
                })
            }
        }
    }

    /// Feed a mixed batch. Each actor's samples keep their order; different
    /// actors are processed in parallel. Groups come back in first-seen order.
    pub fn ingest_batch(
        &self,
        batch: Vec<(String, LocationSample)>,
    ) -> Vec<(String, Vec<Result<IngestOutcome, TrackingError>>)> {
        let mut order: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(String, Vec<LocationSample>)> = Vec::new();
        for (actor_id, sample) in batch {
            match order.get(&actor_id) {
                Some(&index) => groups[index].1.push(sample),
                None => {
                    order.insert(actor_id.clone(), groups.len());
                    groups.push((actor_id, vec![sample]));
                }
            }
        }

        groups
            .into_par_iter()
            .map(|(actor_id, samples)| {
                let results = samples
                    .into_iter()
                    .map(|sample| self.ingest(&actor_id, sample))
                    .collect();
                (actor_id, results)
            })
            .collect()
    }

    /// Drain a locator into [`ingest`](Self::ingest).
    ///
    /// Stops when the stream ends, the token is cancelled, or the session is
    /// stopped elsewhere. Locator errors are published and tracking goes on.
    pub fn follow<L: Locator>(
        &self,
        actor_id: &str,
        mut locator: L,
        cancel: &CancelToken,
    ) -> Result<FollowSummary, TrackingError> {
        self.active(actor_id)?;
        let mut summary = FollowSummary::default();

        loop {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let Some(item) = locator.next() else {
                break;
            };
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            match item {
                Ok(sample) => match self.ingest(actor_id, sample) {
                    Ok(outcome) if outcome.is_accepted() => summary.accepted += 1,
                    Ok(_) => summary.dropped += 1,
                    Err(TrackingError::InvalidSample(err)) => {
                        warn!(actor_id, error = %err, "invalid sample from locator");
                        summary.dropped += 1;
                    }
                    Err(TrackingError::NoActiveSession { .. }) => {
                        summary.session_ended = true;
                        break;
                    }
                    Err(err) => return Err(err),
                },
                Err(err) => {
                    summary.locator_errors += 1;
                    if self.report_locator_error(actor_id, &err).is_err() {
                        summary.session_ended = true;
                        break;
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Publish a locator failure as `tracking.error`. The session stays active.
    pub fn report_locator_error(&self, actor_id: &str, error: &LocatorError) -> Result<(), TrackingError> {
        let session = self.active(actor_id)?;
        let correlation_id = lock(&session).correlation_id.clone();
        warn!(actor_id, %error, "locator unavailable");
        self.broadcaster.publish(&TrackingEvent::error(
            actor_id,
            correlation_id.as_deref(),
            ErrorKind::LocatorUnavailable,
            error.to_string(),
        ));
        Ok(())
    }

    /// Plan the remaining stops from the actor's last known position and
    /// publish the plan as `route.updated`.
    pub fn replan(
        &self,
        actor_id: &str,
        optimizer: &RouteOptimizer,
        stops: &[RouteStop],
    ) -> Result<RoutePlan, TrackingError> {
        let session = self.active(actor_id)?;
        let (start, correlation_id) = {
            let active = lock(&session);
            let start = active
                .trajectory
                .last()
                .map(LocationSample::coordinate)
                .ok_or_else(|| TrackingError::NoPosition {
                    actor_id: actor_id.to_string(),
                })?;
            (start, active.correlation_id.clone())
        };

        let plan = optimizer.optimize(start, stops, self.clock.now_ms())?;
        self.broadcaster.route_updated(correlation_id.as_deref(), &plan);
        Ok(plan)
    }

    /// Reload fences for an active session. Returns the number now in use.
    ///
    /// On a store failure the previous fences stay in place.
    pub fn reload_geofences(&self, actor_id: &str) -> Result<usize, TrackingError> {
        let session = self.active(actor_id)?;
        let correlation_id = lock(&session).correlation_id.clone();
        let loaded = self.load_fences(actor_id, correlation_id.as_deref());

        let mut active = lock(&session);
        match loaded {
            Ok(fences) => active.fences = fences,
            Err(err) => self.report_fence_failure(actor_id, correlation_id.as_deref(), &err),
        }
        Ok(active.fences.len())
    }

    pub fn snapshot(&self, actor_id: &str) -> Result<TrajectorySnapshot, TrackingError> {
        let session = self.active(actor_id)?;
        let snapshot = lock(&session).trajectory.snapshot();
        Ok(snapshot)
    }

    /// Current state of an active session.
    pub fn session(&self, actor_id: &str) -> Result<TrackingSession, TrackingError> {
        let session = self.active(actor_id)?;
        let view = lock(&session).view();
        Ok(view)
    }

    pub fn last_position(&self, actor_id: &str) -> Result<Option<LocationSample>, TrackingError> {
        let session = self.active(actor_id)?;
        let last = lock(&session).trajectory.last().cloned();
        Ok(last)
    }

    pub fn is_active(&self, actor_id: &str) -> bool {
        self.sessions().contains_key(actor_id)
    }

    /// Actors with an active session, sorted.
    pub fn active_actors(&self) -> Vec<String> {
        let mut actors: Vec<String> = self.sessions().keys().cloned().collect();
        actors.sort();
        actors
    }

    fn active(&self, actor_id: &str) -> Result<Arc<Mutex<ActiveSession>>, TrackingError> {
        self.sessions()
            .get(actor_id)
            .cloned()
            .ok_or_else(|| TrackingError::NoActiveSession {
                actor_id: actor_id.to_string(),
            })
    }

    fn load_fences(&self, actor_id: &str, correlation_id: Option<&str>) -> Result<Vec<GeofenceArea>, StoreError> {
        let fences = self.store.load_geofences(correlation_id)?;
        debug!(actor_id, count = fences.len(), "geofences loaded");
        Ok(fences)
    }

    fn report_fence_failure(&self, actor_id: &str, correlation_id: Option<&str>, err: &StoreError) {
        warn!(actor_id, error = %err, "failed to load geofences");
        self.broadcaster.publish(&TrackingEvent::error(
            actor_id,
            correlation_id,
            ErrorKind::GeofencesUnavailable,
            err.to_string(),
        ));
    }

    fn lookup_address(&self, actor_id: &str, point: Coordinate) -> Option<String> {
        let geocoder = self.geocoder.as_ref()?;
        match geocoder.reverse_geocode(point.latitude, point.longitude) {
            Ok(address) => address,
            Err(err) => {
                warn!(actor_id, error = %err, "reverse geocoding failed");
                None
            }
        }
    }

    fn spawn_watchdog(&self, actor_id: &str, correlation_id: Option<&str>) -> Option<IdleWatchdog> {
        let timeout = self.config.locator_timeout?;
        let broadcaster = self.broadcaster.clone();
        let actor = actor_id.to_string();
        let correlation = correlation_id.map(str::to_string);

        let spawned = IdleWatchdog::spawn(actor_id, timeout, move || {
            warn!(actor_id = %actor, ?timeout, "no location update received");
            broadcaster.publish(&TrackingEvent::error(
                &actor,
                correlation.as_deref(),
                ErrorKind::LocatorUnavailable,
                format!("no location update for {} s", timeout.as_secs()),
            ));
        });

        match spawned {
            Ok(watchdog) => Some(watchdog),
            Err(err) => {
                warn!(actor_id, error = %err, "failed to start idle watchdog");
                None
            }
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<ActiveSession>>>> {
        lock(&self.sessions)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

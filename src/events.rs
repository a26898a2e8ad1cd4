//! Event payloads, topics, and the broadcaster that publishes them.
//!
//! Topics are `<name>/<key>` where the key is the correlation id (e.g. an
//! order id) or, for uncorrelated sessions, `actor:<actor id>`. Subscribers
//! can listen to one event kind for one order (`geofence.entered/o-42`) or
//! to everything for an order by matching on the key instead.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::geofence::{Crossing, GeofenceEvent};
use crate::haversine::Coordinate;
use crate::model::{GeofenceArea, LocationSample, RoutePlan};
use crate::traits::PubSubChannel;

pub const LOCATION_UPDATED: &str = "location.updated";
pub const GEOFENCE_ENTERED: &str = "geofence.entered";
pub const GEOFENCE_EXITED: &str = "geofence.exited";
pub const ROUTE_UPDATED: &str = "route.updated";
pub const TRACKING_ERROR: &str = "tracking.error";

/// Category carried by `tracking.error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The device stopped producing positions.
    LocatorUnavailable,
    /// Geofences for the session could not be loaded.
    GeofencesUnavailable,
    /// The finished session could not be saved.
    PersistenceFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingEvent {
    LocationUpdated {
        actor_id: String,
        session_id: String,
        correlation_id: Option<String>,
        sample: LocationSample,
        total_distance_meters: f64,
        total_duration_millis: i64,
    },
    GeofenceEntered {
        actor_id: String,
        correlation_id: Option<String>,
        fence: GeofenceArea,
        point: Coordinate,
    },
    GeofenceExited {
        actor_id: String,
        correlation_id: Option<String>,
        fence: GeofenceArea,
        point: Coordinate,
    },
    RouteUpdated {
        correlation_id: Option<String>,
        plan: RoutePlan,
    },
    TrackingError {
        actor_id: String,
        correlation_id: Option<String>,
        kind: ErrorKind,
        message: String,
    },
}

impl TrackingEvent {
    pub fn geofence(actor_id: &str, correlation_id: Option<&str>, event: GeofenceEvent) -> Self {
        let actor_id = actor_id.to_string();
        let correlation_id = correlation_id.map(str::to_string);
        match event.crossing {
            Crossing::Entered => Self::GeofenceEntered {
                actor_id,
                correlation_id,
                fence: event.fence,
                point: event.point,
            },
            Crossing::Exited => Self::GeofenceExited {
                actor_id,
                correlation_id,
                fence: event.fence,
                point: event.point,
            },
        }
    }

    pub fn error(actor_id: &str, correlation_id: Option<&str>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::TrackingError {
            actor_id: actor_id.to_string(),
            correlation_id: correlation_id.map(str::to_string),
            kind,
            message: message.into(),
        }
    }

    /// Event name, e.g. `geofence.entered`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LocationUpdated { .. } => LOCATION_UPDATED,
            Self::GeofenceEntered { .. } => GEOFENCE_ENTERED,
            Self::GeofenceExited { .. } => GEOFENCE_EXITED,
            Self::RouteUpdated { .. } => ROUTE_UPDATED,
            Self::TrackingError { .. } => TRACKING_ERROR,
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::LocationUpdated { correlation_id, .. }
            | Self::GeofenceEntered { correlation_id, .. }
            | Self::GeofenceExited { correlation_id, .. }
            | Self::RouteUpdated { correlation_id, .. }
            | Self::TrackingError { correlation_id, .. } => correlation_id.as_deref(),
        }
    }

    fn actor_id(&self) -> Option<&str> {
        match self {
            Self::LocationUpdated { actor_id, .. }
            | Self::GeofenceEntered { actor_id, .. }
            | Self::GeofenceExited { actor_id, .. }
            | Self::TrackingError { actor_id, .. } => Some(actor_id.as_str()),
            Self::RouteUpdated { .. } => None,
        }
    }

    pub fn topic(&self) -> Topic {
        let key = match (self.correlation_id(), self.actor_id()) {
            (Some(correlation_id), _) => correlation_id.to_string(),
            (None, Some(actor_id)) => format!("actor:{}", actor_id),
            (None, None) => "global".to_string(),
        };
        Topic {
            name: self.name(),
            key,
        }
    }
}

/// Where an event is published.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    pub name: &'static str,
    pub key: String,
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.key)
    }
}

/// Fire-and-forget publisher in front of a [`PubSubChannel`].
///
/// Failures are logged and counted, never returned: a broadcast hiccup must
/// not interrupt tracking.
pub struct EventBroadcaster {
    channel: Arc<dyn PubSubChannel + Send + Sync>,
    published: AtomicU64,
    failed: AtomicU64,
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("published", &self.published_count())
            .field("failed", &self.failed_count())
            .finish()
    }
}

impl EventBroadcaster {
    pub fn new(channel: Arc<dyn PubSubChannel + Send + Sync>) -> Self {
        Self {
            channel,
            published: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: &TrackingEvent) {
        let topic = event.topic().to_string();
        match self.channel.publish(&topic, event) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                debug!(%topic, "event published");
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(%topic, error = %err, "broadcast failed");
            }
        }
    }

    pub fn route_updated(&self, correlation_id: Option<&str>, plan: &RoutePlan) {
        self.publish(&TrackingEvent::RouteUpdated {
            correlation_id: correlation_id.map(str::to_string),
            plan: plan.clone(),
        });
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// A delivered event with the topic it was published on.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub event: TrackingEvent,
}

struct Subscriber {
    id: u64,
    prefix: String,
    sender: Sender<Published>,
}

/// In-process [`PubSubChannel`] with prefix subscriptions.
#[derive(Default)]
pub struct InMemoryChannel {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl std::fmt::Debug for InMemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChannel")
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl InMemoryChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Receive every event whose topic starts with `prefix`.
    ///
    /// The subscription is released when the handle is dropped.
    pub fn subscribe(self: &Arc<Self>, prefix: impl Into<String>) -> Subscription {
        let (sender, receiver) = mpsc::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers().push(Subscriber {
            id,
            prefix: prefix.into(),
            sender,
        });
        Subscription {
            id,
            receiver,
            channel: Arc::downgrade(self),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Refuse further publishes.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.subscribers().clear();
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers().retain(|subscriber| subscriber.id != id);
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PubSubChannel for InMemoryChannel {
    fn publish(&self, topic: &str, event: &TrackingEvent) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(ChannelError::Closed);
        }
        // Receivers that went away without releasing are pruned here.
        self.subscribers().retain(|subscriber| {
            if !topic.starts_with(&subscriber.prefix) {
                return true;
            }
            subscriber
                .sender
                .send(Published {
                    topic: topic.to_string(),
                    event: event.clone(),
                })
                .is_ok()
        });
        Ok(())
    }
}

/// Handle for an [`InMemoryChannel`] subscription.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: Receiver<Published>,
    channel: Weak<InMemoryChannel>,
}

impl Subscription {
    pub fn try_next(&self) -> Option<Published> {
        match self.receiver.try_recv() {
            Ok(published) => Some(published),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn next_timeout(&self, timeout: Duration) -> Option<Published> {
        match self.receiver.recv_timeout(timeout) {
            Ok(published) => Some(published),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything delivered so far.
    pub fn drain(&self) -> Vec<Published> {
        self.receiver.try_iter().collect()
    }

    /// Unsubscribe now. Dropping the handle does the same.
    pub fn release(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.unsubscribe(self.id);
        }
    }
}

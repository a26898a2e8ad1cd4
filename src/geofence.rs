//! Edge-triggered geofence evaluation.
//!
//! The engine remembers, per (actor, fence), whether the actor was last seen
//! inside. Events fire only when that flag flips, so a long stay inside a
//! fence produces one entry and nothing else until the actor leaves.
//!
//! The flag is written through to the [`PersistenceStore`] so a restarted
//! process does not replay a stale entry. An in-memory cache sits in front of
//! the store; the design assumes a single writer per actor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::haversine::Coordinate;
use crate::model::GeofenceArea;
use crate::traits::PersistenceStore;

/// Direction of a boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crossing {
    Entered,
    Exited,
}

/// A single boundary crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceEvent {
    pub crossing: Crossing,
    pub fence: GeofenceArea,
    pub point: Coordinate,
}

type ContainmentKey = (String, String);

pub struct GeofenceEngine {
    store: Arc<dyn PersistenceStore + Send + Sync>,
    containment: Mutex<HashMap<ContainmentKey, bool>>,
}

impl std::fmt::Debug for GeofenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeofenceEngine")
            .field("cached_states", &self.cache().len())
            .finish()
    }
}

impl GeofenceEngine {
    pub fn new(store: Arc<dyn PersistenceStore + Send + Sync>) -> Self {
        Self {
            store,
            containment: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate a point against every active fence.
    ///
    /// Fences are independent; each may emit at most one event per call.
    /// Inactive fences are skipped and keep their last state.
    pub fn evaluate(&self, actor_id: &str, point: Coordinate, fences: &[GeofenceArea]) -> Vec<GeofenceEvent> {
        let mut events = Vec::new();

        for fence in fences.iter().filter(|fence| fence.is_active) {
            let inside = fence.contains(point);
            let was_inside = self.was_inside(actor_id, &fence.id);
            if was_inside == inside {
                continue;
            }

            let crossing = if inside { Crossing::Entered } else { Crossing::Exited };
            info!(
                actor_id,
                fence_id = %fence.id,
                fence = %fence.name,
                ?crossing,
                "geofence crossing"
            );

            self.cache().insert((actor_id.to_string(), fence.id.clone()), inside);
            if let Err(err) = self.store.set_containment_state(actor_id, &fence.id, inside) {
                // The cache still holds the new state, so this process will
                // not fire the same crossing twice.
                warn!(actor_id, fence_id = %fence.id, error = %err, "failed to persist containment state");
            }

            events.push(GeofenceEvent {
                crossing,
                fence: fence.clone(),
                point,
            });
        }

        events
    }

    /// Active fences containing `point`. Does not touch containment state.
    pub fn containing<'a>(&self, point: Coordinate, fences: &'a [GeofenceArea]) -> Vec<&'a GeofenceArea> {
        fences
            .iter()
            .filter(|fence| fence.is_active && fence.contains(point))
            .collect()
    }

    /// Last known containment for (actor, fence), if any.
    pub fn is_inside(&self, actor_id: &str, fence_id: &str) -> Option<bool> {
        self.cache()
            .get(&(actor_id.to_string(), fence_id.to_string()))
            .copied()
    }

    /// Drop cached state for an actor. Durable state is left in the store.
    pub fn forget(&self, actor_id: &str) {
        self.cache().retain(|(actor, _), _| actor != actor_id);
    }

    fn was_inside(&self, actor_id: &str, fence_id: &str) -> bool {
        let key = (actor_id.to_string(), fence_id.to_string());
        if let Some(inside) = self.cache().get(&key) {
            return *inside;
        }

        let inside = match self.store.get_containment_state(actor_id, fence_id) {
            Ok(state) => state.unwrap_or(false),
            Err(err) => {
                warn!(actor_id, fence_id, error = %err, "containment state unavailable, assuming outside");
                false
            }
        };
        self.cache().insert(key, inside);
        inside
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<ContainmentKey, bool>> {
        self.containment
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//! In-process [`PersistenceStore`].
//!
//! Useful for tests and for hosts that keep everything in memory. Nothing
//! survives the process; the containment map survives engine restarts as
//! long as the store instance is shared.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::model::{GeofenceArea, TrackingSession};
use crate::traits::PersistenceStore;

#[derive(Debug, Default)]
struct StoreState {
    sessions: HashMap<String, TrackingSession>,
    geofences: Vec<GeofenceArea>,
    containment: HashMap<(String, String), bool>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geofences(geofences: Vec<GeofenceArea>) -> Self {
        let store = Self::default();
        store.state().geofences = geofences;
        store
    }

    /// Add or replace a fence by id.
    pub fn upsert_geofence(&self, fence: GeofenceArea) {
        let mut state = self.state();
        match state.geofences.iter_mut().find(|existing| existing.id == fence.id) {
            Some(existing) => *existing = fence,
            None => state.geofences.push(fence),
        }
    }

    /// Mark a fence inactive. Returns false if it does not exist.
    pub fn deactivate_geofence(&self, fence_id: &str) -> bool {
        let mut state = self.state();
        match state.geofences.iter_mut().find(|fence| fence.id == fence_id) {
            Some(fence) => {
                fence.is_active = false;
                true
            }
            None => false,
        }
    }

    pub fn session(&self, session_id: &str) -> Option<TrackingSession> {
        self.state().sessions.get(session_id).cloned()
    }

    /// Saved sessions for an actor, oldest start first.
    pub fn sessions_for(&self, actor_id: &str) -> Vec<TrackingSession> {
        let mut sessions: Vec<TrackingSession> = self
            .state()
            .sessions
            .values()
            .filter(|session| session.actor_id == actor_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|session| session.started_at_ms);
        sessions
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PersistenceStore for InMemoryStore {
    fn save_session(&self, session: &TrackingSession) -> Result<(), StoreError> {
        self.state()
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    /// Unscoped fences always apply; scoped fences only to their owner.
    fn load_geofences(&self, scope: Option<&str>) -> Result<Vec<GeofenceArea>, StoreError> {
        Ok(self
            .state()
            .geofences
            .iter()
            .filter(|fence| match fence.owner_correlation_id.as_deref() {
                None => true,
                Some(owner) => Some(owner) == scope,
            })
            .cloned()
            .collect())
    }

    fn get_containment_state(&self, actor_id: &str, fence_id: &str) -> Result<Option<bool>, StoreError> {
        Ok(self
            .state()
            .containment
            .get(&(actor_id.to_string(), fence_id.to_string()))
            .copied())
    }

    fn set_containment_state(&self, actor_id: &str, fence_id: &str, inside: bool) -> Result<(), StoreError> {
        self.state()
            .containment
            .insert((actor_id.to_string(), fence_id.to_string()), inside);
        Ok(())
    }
}

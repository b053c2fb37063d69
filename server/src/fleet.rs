//! Fleet state store: latest reported state and last-contact time per drone

use fleet_shared::{now_ms, DroneState, DroneStatus, Position};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;

/// In-memory store of the latest known state of every drone
///
/// State is kept for the process lifetime; entries are never deleted. Both
/// maps live behind a single lock so register/ingest/snapshot are each one
/// critical section. The lock is never held across I/O.
pub struct FleetStore {
    inner: RwLock<FleetInner>,
}

#[derive(Default)]
struct FleetInner {
    drones: HashMap<String, DroneState>,
    last_seen: HashMap<String, Instant>,
}

impl FleetStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(FleetInner::default()),
        }
    }

    /// Register a drone, creating default state iff it is not already known
    ///
    /// Idempotent: existing state is left untouched. Last-contact time is
    /// refreshed either way.
    pub async fn register(&self, drone_id: &str) {
        let mut inner = self.inner.write().await;

        inner
            .drones
            .entry(drone_id.to_string())
            .or_insert_with(|| DroneState {
                drone_id: drone_id.to_string(),
                position: Some(Position::default()),
                battery: 100.0,
                status: DroneStatus::Idle.into(),
                updated_at_unix_ms: now_ms(),
            });

        inner.last_seen.insert(drone_id.to_string(), Instant::now());
    }

    /// Fold one telemetry report into the store
    ///
    /// Replaces the stored state wholesale (no field-level merge) and stamps
    /// it with the server receipt time. Two ingests racing for the same id
    /// resolve by arrival order at the lock.
    pub async fn ingest(&self, mut state: DroneState) {
        state.updated_at_unix_ms = now_ms();

        let mut inner = self.inner.write().await;
        inner.last_seen.insert(state.drone_id.clone(), Instant::now());
        inner.drones.insert(state.drone_id.clone(), state);
    }

    /// All current drone states, unordered
    pub async fn snapshot(&self) -> Vec<DroneState> {
        let inner = self.inner.read().await;
        inner.drones.values().cloned().collect()
    }

    /// Last contact time for a drone, if it has ever been seen
    ///
    /// Read side of the last-contact map for operator tooling and health
    /// checks; the dispatch paths only write it.
    pub async fn last_seen(&self, drone_id: &str) -> Option<Instant> {
        let inner = self.inner.read().await;
        inner.last_seen.get(drone_id).copied()
    }
}

impl Default for FleetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_creates_default_state() {
        let store = FleetStore::new();
        store.register("d1").await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 1);

        let state = &snapshot[0];
        assert_eq!(state.drone_id, "d1");
        assert_eq!(state.battery, 100.0);
        assert_eq!(state.status(), DroneStatus::Idle);
        assert_eq!(state.position, Some(Position::default()));
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let store = FleetStore::new();
        store.register("d1").await;

        store
            .ingest(DroneState {
                drone_id: "d1".into(),
                position: Some(Position {
                    x: 5.0,
                    y: 6.0,
                    z: 7.0,
                }),
                battery: 42.0,
                status: DroneStatus::EnRoute.into(),
                updated_at_unix_ms: 0,
            })
            .await;

        // A second register must not reset the reported state
        store.register("d1").await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].battery, 42.0);
        assert_eq!(snapshot[0].status(), DroneStatus::EnRoute);
    }

    #[tokio::test]
    async fn ingest_replaces_wholesale_and_stamps_receipt_time() {
        let store = FleetStore::new();

        store
            .ingest(DroneState {
                drone_id: "d1".into(),
                position: Some(Position {
                    x: 1.0,
                    y: 1.0,
                    z: 1.0,
                }),
                battery: 90.0,
                status: DroneStatus::EnRoute.into(),
                updated_at_unix_ms: 12345,
            })
            .await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        // Receipt time overwrites whatever the agent claimed
        assert!(snapshot[0].updated_at_unix_ms > 12345);
    }

    #[tokio::test]
    async fn last_seen_refreshed_by_register() {
        let store = FleetStore::new();
        assert!(store.last_seen("d1").await.is_none());

        store.register("d1").await;
        let first = store.last_seen("d1").await.expect("seen after register");

        store.register("d1").await;
        let second = store.last_seen("d1").await.expect("seen after re-register");
        assert!(second >= first);
    }
}

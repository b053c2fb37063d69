//! Control service: the operations composing the fleet store and sessions
//!
//! This is the transport-independent half of the service surface. The
//! per-connection wire handling lives in [`crate::connection`].

use crate::fleet::FleetStore;
use crate::ids::{MissionIdGen, RandMissionIds};
use crate::session::{SenderLease, SessionRegistry};
use fleet_shared::{command, Command, DroneState, Mission, Position};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Outcome of a mission assignment
///
/// A mission id is generated even when nothing was enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionAssignment {
    pub mission_id: String,
    pub pushed: bool,
}

/// Coordinates fleet state and command dispatch
pub struct ControlService {
    fleet: FleetStore,
    sessions: SessionRegistry,
    mission_ids: Arc<dyn MissionIdGen>,
    sequence_id: Arc<AtomicU64>,
}

impl ControlService {
    pub fn new() -> Self {
        Self::with_mission_ids(Arc::new(RandMissionIds))
    }

    pub fn with_mission_ids(mission_ids: Arc<dyn MissionIdGen>) -> Self {
        Self {
            fleet: FleetStore::new(),
            sessions: SessionRegistry::new(),
            mission_ids,
            sequence_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a drone. Idempotent; no id validation (historical asymmetry
    /// with the streaming operations, kept deliberately).
    pub async fn register(&self, drone_id: &str) {
        self.fleet.register(drone_id).await;
        info!(drone_id, "drone registered");
    }

    /// Take over (or create) the drone's session for a new command stream
    ///
    /// The returned lease binds exactly one sender loop to the session's new
    /// generation; any previous generation is retired on the way.
    pub async fn begin_subscription(&self, drone_id: &str) -> Result<SenderLease, ControlError> {
        if drone_id.is_empty() {
            return Err(ControlError::InvalidArgument("drone_id required"));
        }
        let lease = self.sessions.begin_generation(drone_id).await;
        info!(drone_id, generation = lease.generation, "command stream opened");
        Ok(lease)
    }

    /// Retire `generation` if it is still live; called when its transport ends
    pub async fn end_subscription(&self, drone_id: &str, generation: u64) {
        if self.sessions.finish_generation(drone_id, generation).await {
            info!(drone_id, generation, "command stream closed");
        }
    }

    /// Assign a mission: generate an id and fire-and-forget into the mailbox
    ///
    /// `pushed` is false when no session exists or the mailbox is full; the
    /// command is simply dropped in either case. No retry, no queuing for
    /// later.
    pub async fn assign_mission(
        &self,
        drone_id: &str,
        waypoints: Vec<Position>,
    ) -> Result<MissionAssignment, ControlError> {
        if drone_id.is_empty() {
            return Err(ControlError::InvalidArgument("drone_id required"));
        }

        let mission_id = self.mission_ids.mission_id();

        let Some(sender) = self.sessions.sender(drone_id).await else {
            return Ok(MissionAssignment {
                mission_id,
                pushed: false,
            });
        };

        let command = Command {
            payload: Some(command::Payload::AssignMission(Mission {
                mission_id: mission_id.clone(),
                waypoints,
            })),
        };

        let pushed = match sender.try_send(command) {
            Ok(()) => {
                info!(drone_id, %mission_id, "mission enqueued");
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(drone_id, %mission_id, "mailbox full, dropping command");
                false
            }
            Err(TrySendError::Closed(_)) => {
                // Sessions are never destroyed, so this should not happen.
                warn!(drone_id, %mission_id, "mailbox closed, dropping command");
                false
            }
        };

        Ok(MissionAssignment { mission_id, pushed })
    }

    /// Fold one telemetry report into the fleet store
    pub async fn ingest(&self, state: DroneState) {
        self.fleet.ingest(state).await;
    }

    /// All current drone states, unordered
    pub async fn list_drones(&self) -> Vec<DroneState> {
        self.fleet.snapshot().await
    }

    /// Shared sequence counter for server-originated frames
    pub fn sequence_ids(&self) -> Arc<AtomicU64> {
        self.sequence_id.clone()
    }

    pub fn next_sequence_id(&self) -> u64 {
        self.sequence_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for ControlService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MAILBOX_CAPACITY;
    use fleet_shared::DroneStatus;

    struct FixedIds(&'static str);

    impl MissionIdGen for FixedIds {
        fn mission_id(&self) -> String {
            self.0.to_string()
        }
    }

    fn report(drone_id: &str, x: f64, battery: f64) -> DroneState {
        DroneState {
            drone_id: drone_id.into(),
            position: Some(Position { x, y: 0.0, z: 0.0 }),
            battery,
            status: DroneStatus::EnRoute.into(),
            updated_at_unix_ms: 0,
        }
    }

    #[tokio::test]
    async fn register_twice_keeps_reported_state() {
        let control = ControlService::new();
        control.register("d1").await;
        control.ingest(report("d1", 3.0, 70.0)).await;
        control.register("d1").await;

        let drones = control.list_drones().await;
        assert_eq!(drones.len(), 1);
        assert_eq!(drones[0].battery, 70.0);
    }

    #[tokio::test]
    async fn assign_before_subscribe_is_not_pushed() {
        let control = ControlService::new();
        control.register("d1").await;

        let assignment = control
            .assign_mission("d1", vec![Position::default()])
            .await
            .unwrap();
        assert!(!assignment.pushed);

        // A mission id is generated regardless of delivery
        assert_eq!(assignment.mission_id.len(), 10);
        assert!(assignment.mission_id.starts_with("m_"));
        assert!(assignment.mission_id[2..]
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
    }

    #[tokio::test]
    async fn assign_with_empty_id_is_rejected() {
        let control = ControlService::new();
        let err = control.assign_mission("", vec![]).await.unwrap_err();
        assert!(matches!(err, ControlError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn subscribe_with_empty_id_is_rejected() {
        let control = ControlService::new();
        assert!(control.begin_subscription("").await.is_err());
    }

    #[tokio::test]
    async fn assign_after_subscribe_enqueues() {
        let control = ControlService::with_mission_ids(Arc::new(FixedIds("m_fixed123")));
        let lease = control.begin_subscription("d1").await.unwrap();

        let assignment = control
            .assign_mission("d1", vec![Position { x: 1.0, y: 1.0, z: 1.0 }])
            .await
            .unwrap();
        assert!(assignment.pushed);
        assert_eq!(assignment.mission_id, "m_fixed123");

        let mut mailbox = lease.mailbox.lock().await;
        let cmd = mailbox.try_recv().expect("command in mailbox");
        match cmd.payload {
            Some(command::Payload::AssignMission(m)) => {
                assert_eq!(m.mission_id, "m_fixed123");
                assert_eq!(m.waypoints, vec![Position { x: 1.0, y: 1.0, z: 1.0 }]);
            }
            None => panic!("empty command"),
        }
    }

    #[tokio::test]
    async fn mailbox_saturation_reports_unpushed() {
        let control = ControlService::new();
        // Session exists but nothing drains the mailbox
        control.begin_subscription("d1").await.unwrap();

        for i in 0..MAILBOX_CAPACITY {
            let assignment = control.assign_mission("d1", vec![]).await.unwrap();
            assert!(assignment.pushed, "enqueue {i} should fit");
        }

        let overflow = control.assign_mission("d1", vec![]).await.unwrap();
        assert!(!overflow.pushed);
        assert!(!overflow.mission_id.is_empty());
    }

    #[tokio::test]
    async fn telemetry_last_write_wins() {
        let control = ControlService::new();
        control.ingest(report("d1", 1.0, 99.0)).await;
        control.ingest(report("d1", 2.0, 98.0)).await;
        control.ingest(report("d1", 3.0, 97.0)).await;

        let drones = control.list_drones().await;
        assert_eq!(drones.len(), 1);
        assert_eq!(drones[0].position.as_ref().unwrap().x, 3.0);
        assert_eq!(drones[0].battery, 97.0);
    }

    #[tokio::test]
    async fn list_drones_one_entry_per_registered_id() {
        let control = ControlService::new();
        control.register("a").await;
        control.register("b").await;

        let mut ids: Vec<_> = control
            .list_drones()
            .await
            .into_iter()
            .map(|d| d.drone_id)
            .collect();
        ids.sort();
        assert_eq!(ids, ["a", "b"]);
    }
}

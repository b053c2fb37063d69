//! Local motion simulation: waypoint interpolation and battery decay

use fleet_shared::{DroneState, DroneStatus, Mission, Position};

/// Distance covered per simulation tick
pub const STEP_DISTANCE: f64 = 3.0;

/// Battery drained per tick while en route
pub const BATTERY_DRAIN: f64 = 0.3;

/// The mission currently being flown
#[derive(Debug, Clone)]
pub struct ActiveMission {
    pub mission_id: String,
    pub waypoints: Vec<Position>,
    pub next: usize,
}

impl From<Mission> for ActiveMission {
    fn from(mission: Mission) -> Self {
        Self {
            mission_id: mission.mission_id,
            waypoints: mission.waypoints,
            next: 0,
        }
    }
}

/// Move `pos` up to `step` toward `target`; returns true when the target is
/// reached this tick
pub fn step_toward(pos: &mut Position, target: &Position, step: f64) -> bool {
    let (dx, dy, dz) = (target.x - pos.x, target.y - pos.y, target.z - pos.z);
    let dist = (dx * dx + dy * dy + dz * dz).sqrt();

    if dist < 0.01 {
        pos.x = target.x;
        pos.y = target.y;
        pos.z = target.z;
        return true;
    }

    let step = step.min(dist);
    pos.x += dx / dist * step;
    pos.y += dy / dist * step;
    pos.z += dz / dist * step;
    step >= dist
}

/// Advance the drone one tick: fly toward the current waypoint if a mission
/// is active, otherwise sit idle
pub fn tick(state: &mut DroneState, mission: &mut Option<ActiveMission>) {
    let target = mission
        .as_ref()
        .and_then(|m| m.waypoints.get(m.next))
        .cloned();

    match target {
        Some(target) => {
            state.status = DroneStatus::EnRoute.into();
            let pos = state.position.get_or_insert_with(Position::default);
            if step_toward(pos, &target, STEP_DISTANCE) {
                if let Some(m) = mission.as_mut() {
                    m.next += 1;
                }
            }
            state.battery = (state.battery - BATTERY_DRAIN).max(0.0);
        }
        None => {
            state.status = DroneStatus::Idle.into();
        }
    }
}

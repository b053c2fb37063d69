mod client;
mod sim;

use anyhow::{Context, Result};
use fleet_shared::{command, DroneState, DroneStatus, Position};
use rand::Rng;
use sim::ActiveMission;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let control = std::env::var("CONTROL_ADDR").context("CONTROL_ADDR must be set")?;
    let drone_id =
        std::env::var("DRONE_ID").unwrap_or_else(|_| format!("drone-{}", random_suffix(4)));

    info!(%drone_id, %control, "drone agent starting");

    client::register(&control, &drone_id).await?;

    let mut commands = client::CommandStream::open(&control, &drone_id).await?;
    let mut telemetry = client::TelemetryStream::open(&control, &drone_id).await?;

    let mut state = DroneState {
        drone_id: drone_id.clone(),
        position: Some(random_position(50.0)),
        battery: 100.0,
        status: DroneStatus::Idle.into(),
        updated_at_unix_ms: 0,
    };

    let current: Arc<Mutex<Option<ActiveMission>>> = Arc::new(Mutex::new(None));

    // Command reader: each assignment replaces the current mission
    let mission_slot = current.clone();
    tokio::spawn(async move {
        loop {
            match commands.next().await {
                Ok(Some(cmd)) => {
                    if let Some(command::Payload::AssignMission(mission)) = cmd.payload {
                        info!(mission_id = %mission.mission_id, "mission received");
                        *mission_slot.lock().await = Some(ActiveMission::from(mission));
                    }
                }
                Ok(None) => {
                    warn!("command stream closed by server");
                    return;
                }
                Err(e) => {
                    warn!("command stream failed: {e}");
                    return;
                }
            }
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;

        {
            let mut mission = current.lock().await;
            sim::tick(&mut state, &mut mission);
        }

        state.updated_at_unix_ms = fleet_shared::now_ms();
        if let Err(e) = telemetry.send(state.clone()).await {
            warn!("telemetry send failed: {e}");
        }

        let pos = state.position.clone().unwrap_or_default();
        info!(
            %drone_id,
            "pos=({:.1}, {:.1}, {:.1}) batt={:.1}",
            pos.x,
            pos.y,
            pos.z,
            state.battery
        );
    }
}

fn random_position(range: f64) -> Position {
    let mut rng = rand::thread_rng();
    Position {
        x: rng.gen::<f64>() * range,
        y: rng.gen::<f64>() * range,
        z: rng.gen::<f64>() * range,
    }
}

fn random_suffix(n: usize) -> String {
    const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

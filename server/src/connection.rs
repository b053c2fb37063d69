//! Per-connection protocol handling
//!
//! Each TCP connection carries one operation, selected by the first frame:
//! unary requests (register, assign-mission, list) get one reply and the
//! connection closes; a subscribe request turns the connection into a
//! command stream; a telemetry frame turns it into an ingest stream that is
//! acknowledged when the client half-closes.

use crate::control::{ControlError, ControlService};
use crate::session::sender_loop;
use anyhow::Result;
use fleet_shared::{
    codec::{self, FrameDecoder},
    envelope, DroneList, Envelope, ErrorReply, Header, MissionAck, RegisterAck, Telemetry,
    TelemetryAck,
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

/// Accept connections forever, one task per connection
pub async fn serve(listener: TcpListener, service: Arc<ControlService>) -> Result<()> {
    info!("control listening on {}", listener.local_addr()?);

    loop {
        let (socket, addr) = listener.accept().await?;
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, service).await {
                debug!(%addr, "connection ended with error: {e:#}");
            }
        });
    }
}

/// Reads frames from `reader` into `decoder`, yielding one envelope at a time
async fn next_envelope<R>(
    reader: &mut R,
    decoder: &mut FrameDecoder,
) -> Result<Option<Envelope>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        if let Some(envelope) = decoder.decode_next()? {
            return Ok(Some(envelope));
        }
        match reader.read(&mut buf).await? {
            0 => return Ok(None),
            n => decoder.extend(&buf[..n]),
        }
    }
}

async fn handle_connection(stream: TcpStream, service: Arc<ControlService>) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = FrameDecoder::new();

    let Some(first) = next_envelope(&mut reader, &mut decoder).await? else {
        return Ok(()); // closed before any request
    };

    match first.payload {
        Some(envelope::Payload::Register(req)) => {
            service.register(&req.drone_id).await;
            reply(
                &mut writer,
                &service,
                envelope::Payload::RegisterAck(RegisterAck { ok: true }),
            )
            .await
        }
        Some(envelope::Payload::Subscribe(req)) => {
            handle_subscribe(&req.drone_id, reader, writer, service).await
        }
        Some(envelope::Payload::Telemetry(report)) => {
            handle_telemetry(report, reader, writer, decoder, service).await
        }
        Some(envelope::Payload::AssignMission(req)) => {
            match service.assign_mission(&req.drone_id, req.waypoints).await {
                Ok(assignment) => {
                    reply(
                        &mut writer,
                        &service,
                        envelope::Payload::MissionAck(MissionAck {
                            mission_id: assignment.mission_id,
                            pushed: assignment.pushed,
                        }),
                    )
                    .await
                }
                Err(e) => reject(&mut writer, &service, e).await,
            }
        }
        Some(envelope::Payload::ListDrones(_)) => {
            let drones = service.list_drones().await;
            reply(
                &mut writer,
                &service,
                envelope::Payload::DroneList(DroneList { drones }),
            )
            .await
        }
        other => {
            debug!("unexpected first payload: {other:?}");
            reply(
                &mut writer,
                &service,
                envelope::Payload::Error(ErrorReply {
                    code: fleet_shared::ErrorCode::Unknown.into(),
                    message: "unsupported request".into(),
                }),
            )
            .await
        }
    }
}

/// Long-lived command stream: one invocation per agent connection lifetime
async fn handle_subscribe<R, W>(
    drone_id: &str,
    mut reader: R,
    mut writer: W,
    service: Arc<ControlService>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let lease = match service.begin_subscription(drone_id).await {
        Ok(lease) => lease,
        Err(e) => return reject(&mut writer, &service, e).await,
    };
    let generation = lease.generation;

    tokio::spawn(sender_loop(
        drone_id.to_string(),
        lease,
        service.sequence_ids(),
        writer,
    ));

    // Park here for the connection's lifetime. The client is not expected
    // to send anything further; EOF or a read error is the transport-side
    // cancellation signal.
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {} // ignore stray bytes
        }
    }

    // If this generation is still the live one, make sure its sender exits.
    // Redundant when a takeover already retired it.
    service.end_subscription(drone_id, generation).await;
    Ok(())
}

/// Client-to-server telemetry stream, acknowledged with a count on half-close
async fn handle_telemetry<R, W>(
    first: Telemetry,
    mut reader: R,
    mut writer: W,
    mut decoder: FrameDecoder,
    service: Arc<ControlService>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut received: u64 = 0;

    let mut report = Some(first);
    loop {
        if let Some(report) = report.take() {
            received += 1;
            if let Some(state) = report.state {
                service.ingest(state).await;
            }
        }

        match next_envelope(&mut reader, &mut decoder).await? {
            Some(envelope) => match envelope.payload {
                Some(envelope::Payload::Telemetry(next)) => report = Some(next),
                other => debug!("ignoring non-telemetry frame on ingest stream: {other:?}"),
            },
            None => break,
        }
    }

    reply(
        &mut writer,
        &service,
        envelope::Payload::TelemetryAck(TelemetryAck { received }),
    )
    .await
}

async fn reply<W>(
    writer: &mut W,
    service: &ControlService,
    payload: envelope::Payload,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let envelope = Envelope::new(Header::new("control", service.next_sequence_id()), payload);
    let encoded = codec::encode(&envelope)?;
    writer.write_all(&encoded).await?;
    Ok(())
}

async fn reject<W>(writer: &mut W, service: &ControlService, error: ControlError) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let ControlError::InvalidArgument(message) = error;
    reply(
        writer,
        service,
        envelope::Payload::Error(ErrorReply::invalid_argument(message)),
    )
    .await
}

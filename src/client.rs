//! Client-side plumbing for talking to the control server
//!
//! Each operation opens its own TCP connection, mirroring the server's
//! one-operation-per-connection protocol.

use anyhow::{anyhow, Context, Result};
use fleet_shared::{
    codec::{self, FrameDecoder},
    envelope, Command, DroneState, Envelope, Header, RegisterRequest, SubscribeRequest, Telemetry,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

struct Connection {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    decoder: FrameDecoder,
    device_id: String,
    sequence: u64,
}

impl Connection {
    async fn open(addr: &str, device_id: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connecting to control at {addr}"))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader,
            writer,
            decoder: FrameDecoder::new(),
            device_id: device_id.to_string(),
            sequence: 0,
        })
    }

    async fn send(&mut self, payload: envelope::Payload) -> Result<()> {
        self.sequence += 1;
        let envelope = Envelope::new(Header::new(&self.device_id, self.sequence), payload);
        let encoded = codec::encode(&envelope)?;
        self.writer.write_all(&encoded).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Envelope>> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(envelope) = self.decoder.decode_next()? {
                return Ok(Some(envelope));
            }
            match self.reader.read(&mut buf).await? {
                0 => return Ok(None),
                n => self.decoder.extend(&buf[..n]),
            }
        }
    }
}

/// Register this drone with the control server (unary)
pub async fn register(addr: &str, drone_id: &str) -> Result<()> {
    let mut conn = Connection::open(addr, drone_id).await?;
    conn.send(envelope::Payload::Register(RegisterRequest {
        drone_id: drone_id.to_string(),
    }))
    .await?;

    match conn.recv().await? {
        Some(Envelope {
            payload: Some(envelope::Payload::RegisterAck(ack)),
            ..
        }) if ack.ok => Ok(()),
        Some(Envelope {
            payload: Some(envelope::Payload::Error(err)),
            ..
        }) => Err(anyhow!("register rejected: {}", err.message)),
        other => Err(anyhow!("unexpected register reply: {other:?}")),
    }
}

/// Long-lived server-to-client command stream
pub struct CommandStream {
    conn: Connection,
}

impl CommandStream {
    pub async fn open(addr: &str, drone_id: &str) -> Result<Self> {
        let mut conn = Connection::open(addr, drone_id).await?;
        conn.send(envelope::Payload::Subscribe(SubscribeRequest {
            drone_id: drone_id.to_string(),
        }))
        .await?;
        Ok(Self { conn })
    }

    /// Next command from the server; None when the stream ends
    pub async fn next(&mut self) -> Result<Option<Command>> {
        loop {
            match self.conn.recv().await? {
                Some(Envelope {
                    payload: Some(envelope::Payload::Command(cmd)),
                    ..
                }) => return Ok(Some(cmd)),
                Some(Envelope {
                    payload: Some(envelope::Payload::Error(err)),
                    ..
                }) => return Err(anyhow!("subscription rejected: {}", err.message)),
                Some(_) => {} // ignore anything else
                None => return Ok(None),
            }
        }
    }
}

/// Long-lived client-to-server telemetry stream
pub struct TelemetryStream {
    conn: Connection,
}

impl TelemetryStream {
    pub async fn open(addr: &str, drone_id: &str) -> Result<Self> {
        let conn = Connection::open(addr, drone_id).await?;
        Ok(Self { conn })
    }

    pub async fn send(&mut self, state: DroneState) -> Result<()> {
        self.conn
            .send(envelope::Payload::Telemetry(Telemetry { state: Some(state) }))
            .await
    }
}

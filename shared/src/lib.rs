//! Fleet Control Shared Protocol Types
//!
//! This crate provides the wire message types and frame codec for
//! communication between drone agents, operator tools, and the control
//! server. Messages are hand-written prost structs; framing is
//! length-prefixed protobuf over TCP (see [`codec`]).

pub mod codec;

use prost::Message;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A point in 3-D space (meters, local frame)
#[derive(Clone, PartialEq, Message)]
pub struct Position {
    #[prost(double, tag = "1")]
    pub x: f64,

    #[prost(double, tag = "2")]
    pub y: f64,

    #[prost(double, tag = "3")]
    pub z: f64,
}

/// Operational status of a drone
///
/// `Returning` is reserved for a future return-to-base command and is never
/// produced by the current agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum DroneStatus {
    Unspecified = 0,
    Idle = 1,
    EnRoute = 2,
    Returning = 3,
}

/// Latest reported state of a drone
#[derive(Clone, PartialEq, Message)]
pub struct DroneState {
    #[prost(string, tag = "1")]
    pub drone_id: String,

    #[prost(message, optional, tag = "2")]
    pub position: Option<Position>,

    #[prost(double, tag = "3")]
    pub battery: f64,

    #[prost(enumeration = "DroneStatus", tag = "4")]
    pub status: i32,

    /// Server-assigned on ingest; agents may leave this zero.
    #[prost(uint64, tag = "5")]
    pub updated_at_unix_ms: u64,
}

/// An ordered list of waypoints with a server-assigned identifier
#[derive(Clone, PartialEq, Message)]
pub struct Mission {
    #[prost(string, tag = "1")]
    pub mission_id: String,

    #[prost(message, repeated, tag = "2")]
    pub waypoints: Vec<Position>,
}

/// Command pushed from the control server to a drone
///
/// Open tagged union: new variants (recall-to-base, config update) can be
/// added without breaking delivery.
#[derive(Clone, PartialEq, Message)]
pub struct Command {
    #[prost(oneof = "command::Payload", tags = "1")]
    pub payload: Option<command::Payload>,
}

pub mod command {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        AssignMission(super::Mission),
    }
}

/// Envelope header carried on every frame
#[derive(Clone, PartialEq, Message)]
pub struct Header {
    /// Sender identity ("control" for server-originated frames).
    #[prost(string, tag = "1")]
    pub device_id: String,

    #[prost(uint64, tag = "2")]
    pub sequence_id: u64,

    #[prost(uint64, tag = "3")]
    pub timestamp_ms: u64,
}

impl Header {
    /// Create a new header with the given device ID
    pub fn new(device_id: impl Into<String>, sequence_id: u64) -> Self {
        Self {
            device_id: device_id.into(),
            sequence_id,
            timestamp_ms: now_ms(),
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct RegisterRequest {
    #[prost(string, tag = "1")]
    pub drone_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct RegisterAck {
    #[prost(bool, tag = "1")]
    pub ok: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct SubscribeRequest {
    #[prost(string, tag = "1")]
    pub drone_id: String,
}

/// One telemetry report on a client-to-server stream
#[derive(Clone, PartialEq, Message)]
pub struct Telemetry {
    #[prost(message, optional, tag = "1")]
    pub state: Option<DroneState>,
}

/// Acknowledgment sent when a telemetry stream ends
#[derive(Clone, PartialEq, Message)]
pub struct TelemetryAck {
    #[prost(uint64, tag = "1")]
    pub received: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct AssignMissionRequest {
    #[prost(string, tag = "1")]
    pub drone_id: String,

    #[prost(message, repeated, tag = "2")]
    pub waypoints: Vec<Position>,
}

/// Reply to an AssignMission request
///
/// `pushed` reports whether the command made it into the target drone's
/// mailbox. The mission id is generated either way.
#[derive(Clone, PartialEq, Message)]
pub struct MissionAck {
    #[prost(string, tag = "1")]
    pub mission_id: String,

    #[prost(bool, tag = "2")]
    pub pushed: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListDronesRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct DroneList {
    #[prost(message, repeated, tag = "1")]
    pub drones: Vec<DroneState>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum ErrorCode {
    Unknown = 0,
    InvalidArgument = 1,
}

/// Error reply for rejected requests
#[derive(Clone, PartialEq, Message)]
pub struct ErrorReply {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub code: i32,

    #[prost(string, tag = "2")]
    pub message: String,
}

impl ErrorReply {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidArgument.into(),
            message: message.into(),
        }
    }
}

/// Top-level frame exchanged on every connection
///
/// Each TCP connection carries exactly one operation; the first payload
/// selects it. Unary requests get one reply and the connection closes.
/// `SubscribeRequest` turns the connection into a server-to-client stream of
/// `Command` frames; `Telemetry` turns it into a client-to-server stream
/// acknowledged with `TelemetryAck` on half-close.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,

    #[prost(oneof = "envelope::Payload", tags = "2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12")]
    pub payload: Option<envelope::Payload>,
}

pub mod envelope {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "2")]
        Register(super::RegisterRequest),
        #[prost(message, tag = "3")]
        RegisterAck(super::RegisterAck),
        #[prost(message, tag = "4")]
        Subscribe(super::SubscribeRequest),
        #[prost(message, tag = "5")]
        Command(super::Command),
        #[prost(message, tag = "6")]
        Telemetry(super::Telemetry),
        #[prost(message, tag = "7")]
        TelemetryAck(super::TelemetryAck),
        #[prost(message, tag = "8")]
        AssignMission(super::AssignMissionRequest),
        #[prost(message, tag = "9")]
        MissionAck(super::MissionAck),
        #[prost(message, tag = "10")]
        ListDrones(super::ListDronesRequest),
        #[prost(message, tag = "11")]
        DroneList(super::DroneList),
        #[prost(message, tag = "12")]
        Error(super::ErrorReply),
    }
}

impl Envelope {
    /// Build an envelope from a header and payload
    pub fn new(header: Header, payload: envelope::Payload) -> Self {
        Self {
            header: Some(header),
            payload: Some(payload),
        }
    }
}

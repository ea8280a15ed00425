//! Envelope and payload types for the TAK radio serial protocol.
//!
//! Envelopes carry a numeric correlation id next to an externally-tagged
//! payload, e.g. `{"packet_id":7,"ping":{"destination":"NODE_B"}}` outbound
//! and `{"request_id":7,"result":{"success":true}}` inbound. Whether an
//! inbound envelope is a response or an event is decided by the correlation
//! engine, never by a field here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Outbound envelope
// ============================================================================

/// One outbound envelope: correlation id plus exactly one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandFrame {
    pub packet_id: u32,
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the radio understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    GetInfo {},
    GetGps {},
    GetNeighbors {},
    GetRoutes {},
    GetRoster {},
    GetStats {},
    SetGps {
        position: GpsCoordinate,
        use_static: bool,
    },
    SetNodeId {
        node_id: String,
    },
    SendMessage {
        destination: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<MessagePriority>,
    },
    SendGps {},
    SendEmergency {
        emergency_type: EmergencyType,
        description: String,
    },
    Ping {
        destination: String,
    },
    Discover {},
    Join {},
}

impl Command {
    /// Wire tag of this command, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetInfo {} => "get_info",
            Command::GetGps {} => "get_gps",
            Command::GetNeighbors {} => "get_neighbors",
            Command::GetRoutes {} => "get_routes",
            Command::GetRoster {} => "get_roster",
            Command::GetStats {} => "get_stats",
            Command::SetGps { .. } => "set_gps",
            Command::SetNodeId { .. } => "set_node_id",
            Command::SendMessage { .. } => "send_message",
            Command::SendGps {} => "send_gps",
            Command::SendEmergency { .. } => "send_emergency",
            Command::Ping { .. } => "ping",
            Command::Discover {} => "discover",
            Command::Join {} => "join",
        }
    }
}

// ============================================================================
// Inbound envelope
// ============================================================================

/// One inbound envelope: the id of the request it answers (0 for unsolicited
/// events) plus exactly one payload variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFrame {
    #[serde(default)]
    pub request_id: u32,
    #[serde(flatten)]
    pub payload: DevicePayload,
}

/// Everything the radio can send up: command results, query responses, and
/// unsolicited events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePayload {
    // Responses
    Result(CommandResult),
    Info(DeviceInfo),
    Gps(GpsStatus),
    Neighbors(NeighborList),
    Routes(RouteList),
    Roster(RosterList),
    Stats(DeviceStats),

    // Events
    MessageReceived(MessageReceived),
    GpsReceived(GpsReceived),
    NeighborChanged(NeighborChanged),
    EmergencyReceived(EmergencyReceived),
    Log(LogMessage),
}

impl DevicePayload {
    /// Wire tag of this payload, for logging and mismatch errors.
    pub fn name(&self) -> &'static str {
        match self {
            DevicePayload::Result(_) => "result",
            DevicePayload::Info(_) => "info",
            DevicePayload::Gps(_) => "gps",
            DevicePayload::Neighbors(_) => "neighbors",
            DevicePayload::Routes(_) => "routes",
            DevicePayload::Roster(_) => "roster",
            DevicePayload::Stats(_) => "stats",
            DevicePayload::MessageReceived(_) => "message_received",
            DevicePayload::GpsReceived(_) => "gps_received",
            DevicePayload::NeighborChanged(_) => "neighbor_changed",
            DevicePayload::EmergencyReceived(_) => "emergency_received",
            DevicePayload::Log(_) => "log",
        }
    }

    /// Converts an event payload into its [`Event`]; responses return `None`.
    pub fn into_event(self) -> Option<Event> {
        match self {
            DevicePayload::MessageReceived(ev) => Some(Event::Message(ev)),
            DevicePayload::GpsReceived(ev) => Some(Event::Gps(ev)),
            DevicePayload::NeighborChanged(ev) => Some(Event::Neighbor(ev)),
            DevicePayload::EmergencyReceived(ev) => Some(Event::Emergency(ev)),
            DevicePayload::Log(ev) => Some(Event::Log(ev)),
            _ => None,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// An unsolicited event, ready for the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message(MessageReceived),
    Gps(GpsReceived),
    Neighbor(NeighborChanged),
    Emergency(EmergencyReceived),
    Log(LogMessage),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Message(_) => EventKind::Message,
            Event::Gps(_) => EventKind::Gps,
            Event::Neighbor(_) => EventKind::Neighbor,
            Event::Emergency(_) => EventKind::Emergency,
            Event::Log(_) => EventKind::Log,
        }
    }
}

/// The five event kinds a handler can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Gps,
    Neighbor,
    Emergency,
    Log,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Message => "message",
            EventKind::Gps => "gps",
            EventKind::Neighbor => "neighbor",
            EventKind::Emergency => "emergency",
            EventKind::Log => "log",
        };
        f.write_str(name)
    }
}

/// A text message received from the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReceived {
    pub source: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<MessagePriority>,
    #[serde(default)]
    pub hop_count: u32,
    #[serde(default)]
    pub rssi: i16,
    #[serde(default)]
    pub timestamp: u64,
}

/// A position broadcast received from another node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsReceived {
    pub source: String,
    pub position: GpsCoordinate,
    #[serde(default)]
    pub rssi: i16,
}

/// A change in the direct-neighbor set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborChanged {
    pub node: NodeInfo,
    pub change: NeighborChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborChange {
    Discovered,
    Updated,
    Lost,
}

/// An emergency alert relayed through the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyReceived {
    pub source: String,
    pub emergency_type: EmergencyType,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<GpsCoordinate>,
    #[serde(default)]
    pub timestamp: u64,
}

/// A log line forwarded from the firmware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

// ============================================================================
// Responses
// ============================================================================

/// Generic success/failure result for action commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// Device identity and mesh summary, response to `get_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub node_info: NodeInfo,
    pub firmware_version: String,
    pub protocol_version: String,
    pub mesh_version: u32,
    pub neighbor_count: u32,
    pub route_count: u32,
    pub uptime_ms: u64,
}

/// Current GPS fix, response to `get_gps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsStatus {
    pub position: GpsCoordinate,
    pub has_fix: bool,
    #[serde(default)]
    pub satellites: u32,
    #[serde(default)]
    pub hdop: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborList {
    pub neighbors: Vec<NodeInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteList {
    pub routes: Vec<RouteEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterList {
    pub roster: Vec<RosterEntry>,
}

/// Message counters and uptime, response to `get_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_forwarded: u64,
    pub messages_dropped: u64,
    pub route_discoveries: u64,
    pub route_errors: u64,
    pub mesh_version: u32,
    pub uptime_ms: u64,
}

impl DeviceStats {
    pub fn uptime(&self) -> Duration {
        Duration::from_millis(self.uptime_ms)
    }
}

// ============================================================================
// Shared business types
// ============================================================================

/// Identity and last-known state of a mesh node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<GpsCoordinate>,
    #[serde(default)]
    pub battery_level: u8,
    #[serde(default)]
    pub rssi: i16,
    #[serde(default)]
    pub last_seen: u64,
}

/// A GPS coordinate with motion and accuracy data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinate {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
    #[serde(default)]
    pub accuracy: f32,
    #[serde(default)]
    pub speed: f32,
    #[serde(default)]
    pub bearing: f32,
    #[serde(default)]
    pub timestamp: u64,
}

impl GpsCoordinate {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            ..Self::default()
        }
    }
}

/// One routing-table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub destination: String,
    pub next_hop: String,
    pub hop_count: u32,
    pub rssi: i16,
    pub last_update: u64,
}

/// One team-roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub node: NodeInfo,
    pub is_self: bool,
    pub is_active: bool,
}

/// Outbound message priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Category of an emergency alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyType {
    Medical,
    Fire,
    Security,
    Evacuation,
    #[default]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_frame_wire_shape() {
        let frame = CommandFrame {
            packet_id: 3,
            command: Command::GetInfo {},
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""packet_id":3"#));
        assert!(json.contains(r#""get_info":{}"#));
    }

    #[test]
    fn test_command_frame_roundtrip() {
        let frame = CommandFrame {
            packet_id: 42,
            command: Command::SendMessage {
                destination: String::new(),
                text: "hello mesh".to_string(),
                priority: Some(MessagePriority::High),
            },
        };
        let json = serde_json::to_vec(&frame).unwrap();
        let parsed: CommandFrame = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_device_frame_parse() {
        let json = r#"{"request_id":9,"result":{"success":true,"message":"ok"}}"#;
        let frame: DeviceFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.request_id, 9);
        assert!(matches!(
            frame.payload,
            DevicePayload::Result(CommandResult { success: true, .. })
        ));
    }

    #[test]
    fn test_request_id_defaults_to_zero() {
        let json = r#"{"log":{"level":"info","message":"boot"}}"#;
        let frame: DeviceFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.request_id, 0);
    }

    #[test]
    fn test_event_classification() {
        let event = DevicePayload::MessageReceived(MessageReceived {
            source: "NODE_A".to_string(),
            text: "hi".to_string(),
            priority: None,
            hop_count: 1,
            rssi: -80,
            timestamp: 0,
        });
        assert_eq!(
            event.into_event().map(|e| e.kind()),
            Some(EventKind::Message)
        );

        let response = DevicePayload::Result(CommandResult {
            success: true,
            message: String::new(),
        });
        assert!(response.into_event().is_none());
    }

    #[test]
    fn test_priority_wire_names() {
        let json = serde_json::to_string(&MessagePriority::Critical).unwrap();
        assert_eq!(json, r#""critical""#);
        let parsed: MessagePriority = serde_json::from_str(r#""normal""#).unwrap();
        assert_eq!(parsed, MessagePriority::Normal);
    }

    #[test]
    fn test_stats_uptime() {
        let stats = DeviceStats {
            messages_sent: 1,
            messages_received: 2,
            messages_forwarded: 0,
            messages_dropped: 0,
            route_discoveries: 0,
            route_errors: 0,
            mesh_version: 1,
            uptime_ms: 90_500,
        };
        assert_eq!(stats.uptime(), Duration::from_millis(90_500));
    }

    #[test]
    fn test_unknown_payload_tag_fails() {
        let json = r#"{"request_id":1,"bogus":{}}"#;
        assert!(serde_json::from_str::<DeviceFrame>(json).is_err());
    }
}

//! # meshtak-protocol
//!
//! Wire protocol implementation for LoRa mesh TAK radios.
//!
//! This crate provides:
//! - RFC 1055 SLIP framing over the serial link
//! - Incremental frame reassembly from an arbitrary byte stream
//! - Command/response/event envelope types with JSON serialization
//! - Protocol error types

pub mod codec;
pub mod error;
pub mod message;
pub mod slip;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use message::{
    Command, CommandFrame, CommandResult, DeviceFrame, DeviceInfo, DevicePayload, DeviceStats,
    EmergencyReceived, EmergencyType, Event, EventKind, GpsCoordinate, GpsReceived, GpsStatus,
    LogLevel, LogMessage, MessagePriority, MessageReceived, NeighborChange, NeighborChanged,
    NodeInfo, RosterEntry, RouteEntry,
};

/// Default serial baud rate for TAK radios.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Maximum serialized envelope size accepted on either direction (4 KiB).
///
/// Anything larger mid-reassembly is treated as line noise and discarded.
pub const MAX_FRAME_SIZE: usize = 4 * 1024;

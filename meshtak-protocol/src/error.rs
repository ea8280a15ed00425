//! Protocol error types.

use thiserror::Error;

/// Errors that can occur during framing or envelope handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("truncated escape sequence at end of frame")]
    TrailingEscape,

    #[error("invalid escape sequence: 0xDB 0x{0:02X}")]
    InvalidEscape(u8),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

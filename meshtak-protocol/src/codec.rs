//! Encoder and decoder for SLIP-framed envelopes.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::message::{CommandFrame, DeviceFrame};
use crate::{slip, MAX_FRAME_SIZE};

/// Encodes envelopes into SLIP frames ready for the wire.
pub struct Encoder;

impl Encoder {
    /// Encodes an outbound command envelope.
    pub fn encode_command(frame: &CommandFrame) -> Result<BytesMut, ProtocolError> {
        Self::encode_payload(&serde_json::to_vec(frame)?)
    }

    /// Encodes an inbound envelope. Used by test doubles and bridges that
    /// stand in for the device.
    pub fn encode_device(frame: &DeviceFrame) -> Result<BytesMut, ProtocolError> {
        Self::encode_payload(&serde_json::to_vec(frame)?)
    }

    fn encode_payload(payload: &[u8]) -> Result<BytesMut, ProtocolError> {
        if payload.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(slip::encode(payload))
    }
}

/// Incremental frame reassembler.
///
/// Feed it bytes as they arrive off the serial port; it hands back complete,
/// de-escaped frames in FIFO order. Corrupt frames are discarded and the
/// stream continues, so line noise never wedges the reader. Behaves
/// identically whether fed one byte at a time or in arbitrary chunks.
pub struct Decoder {
    buf: BytesMut,
    in_frame: bool,
    ready: VecDeque<Bytes>,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            in_frame: false,
            ready: VecDeque::new(),
        }
    }

    /// Appends raw bytes from the stream, extracting any frames they
    /// complete. Bytes seen before the first delimiter are discarded.
    pub fn extend(&mut self, data: &[u8]) {
        // Worst case every payload byte is escaped, so the raw buffer may
        // legitimately grow to twice the decoded limit.
        const MAX_RAW_SIZE: usize = MAX_FRAME_SIZE * 2;

        for &byte in data {
            if byte == slip::END {
                if self.in_frame && !self.buf.is_empty() {
                    match slip::decode(&self.buf) {
                        Ok(frame) if frame.len() <= MAX_FRAME_SIZE => {
                            self.ready.push_back(Bytes::from(frame));
                        }
                        _ => {} // line noise or runaway frame, drop it
                    }
                }
                self.in_frame = true;
                self.buf.clear();
            } else if self.in_frame {
                if self.buf.len() >= MAX_RAW_SIZE {
                    // Runaway frame: discard and resync on the next delimiter.
                    self.in_frame = false;
                    self.buf.clear();
                } else {
                    self.buf.put_u8(byte);
                }
            }
        }
    }

    /// Returns whether at least one complete frame is ready.
    pub fn has_frame(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Pops the next complete frame, oldest first.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        self.ready.pop_front()
    }

    /// Number of bytes buffered for the in-progress frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discards all buffered and queued state. Used on reconnect so no
    /// partially-decoded frame survives the boundary.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.ready.clear();
        self.in_frame = false;
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

//! Voice packet types and classification.
//!
//! The transport delivers one interleaved packet sequence; every packet
//! carries the source tag of the participant it belongs to plus an opaque
//! Opus payload. Classification runs on every packet on the hot ingestion
//! path, so it is O(1) and allocation-free.

use crate::defaults::SILENCE_SENTINEL;

/// One unit of audio from the live transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPacket {
    /// Stable per-participant identifier for this call.
    pub source_tag: u32,
    /// Transport sequence number.
    pub sequence: u16,
    /// Presentation timestamp in sample-rate units (48kHz ticks).
    pub timestamp: u32,
    /// Opaque encoded payload bytes.
    pub payload: Vec<u8>,
}

impl AudioPacket {
    pub fn new(source_tag: u32, sequence: u16, timestamp: u32, payload: Vec<u8>) -> Self {
        Self {
            source_tag,
            sequence,
            timestamp,
            payload,
        }
    }

    /// Classifies this packet without touching the payload beyond a
    /// fixed-size comparison.
    pub fn classify(&self) -> PacketClass {
        if self.payload.is_empty() {
            PacketClass::Empty
        } else if self.payload.len() == SILENCE_SENTINEL.len()
            && self.payload[..] == SILENCE_SENTINEL
        {
            // A 3-byte voice payload colliding with the sentinel is
            // indistinguishable from silence; accepted, not worked around.
            PacketClass::Silence
        } else {
            PacketClass::Voice
        }
    }
}

/// Result of classifying a single inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketClass {
    /// Payload matches the transport's explicit silence sentinel.
    Silence,
    /// Zero-length payload; dropped.
    Empty,
    /// Anything else: buffer it for transcription.
    Voice,
}

/// An immutable snapshot of one source's buffered packets, taken at flush
/// time and handed to exactly one dispatcher invocation.
#[derive(Debug, Clone)]
pub struct FlushBatch {
    pub source_tag: u32,
    pub packets: Vec<AudioPacket>,
}

impl FlushBatch {
    /// Total payload bytes across the batch.
    pub fn payload_bytes(&self) -> usize {
        self.packets.iter().map(|p| p.payload.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }
}

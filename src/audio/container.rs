//! Self-describing Ogg/Opus containers for voice segments.
//!
//! Each flushed batch is wrapped into one contiguous Ogg stream carrying
//! its own OpusHead/OpusTags headers, so the recognizer can consume the
//! buffer standalone without side-channel format information. The same
//! writer backs the per-source archive files.
//!
//! Packets are written in the order received. The transport is assumed to
//! deliver in order per source; out-of-order arrival is not re-sequenced
//! here, so reconstruction order would be wrong in that case.

use crate::audio::packet::{AudioPacket, FlushBatch};
use crate::defaults::SAMPLES_PER_PACKET;
use crate::error::{Result, TablescribeError};
use ogg::writing::{PacketWriteEndInfo, PacketWriter};
use std::io::Write;

/// Format metadata stamped into the container headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u8,
}

/// Logical bitstream serial shared by all segment containers. Every
/// container is a standalone single-stream file, so a fixed serial is fine.
const STREAM_SERIAL: u32 = 0x5453_4352;

/// Timestamp jumps larger than this (10s at 48kHz) are treated as clock
/// discontinuities and fall back to the nominal packet duration.
const MAX_TIMESTAMP_ADVANCE: u64 = 480_000;

/// Incremental Ogg/Opus writer.
///
/// Headers are written eagerly on construction so that even a stream that
/// never sees a packet is a valid, self-describing container. Audio packets
/// go out one page each; the last packet is flagged end-of-stream at
/// finalize time.
pub struct OggOpusWriter<W: Write> {
    writer: PacketWriter<'static, W>,
    granule: u64,
    last_timestamp: Option<u32>,
    // Held back one packet so finalize can mark the true last page EOS.
    pending: Option<(Vec<u8>, u64)>,
    packets_written: u64,
    payload_bytes: u64,
}

impl<W: Write> OggOpusWriter<W> {
    /// Opens a new container over `writer` and emits the Opus headers.
    pub fn new(writer: W, info: StreamInfo) -> Result<Self> {
        let mut writer = PacketWriter::new(writer);
        writer.write_packet(
            opus_head(info),
            STREAM_SERIAL,
            PacketWriteEndInfo::EndPage,
            0,
        )?;
        writer.write_packet(
            opus_tags(),
            STREAM_SERIAL,
            PacketWriteEndInfo::EndPage,
            0,
        )?;
        Ok(Self {
            writer,
            granule: 0,
            last_timestamp: None,
            pending: None,
            packets_written: 0,
            payload_bytes: 0,
        })
    }

    /// Appends one voice packet.
    ///
    /// The granule position advances by the presentation-timestamp delta
    /// (already in 48kHz units), falling back to the nominal 20ms frame
    /// size for the first packet or on discontinuities.
    pub fn write_packet(&mut self, packet: &AudioPacket) -> Result<()> {
        let advance = match self.last_timestamp {
            Some(prev) => {
                let delta = u64::from(packet.timestamp.wrapping_sub(prev));
                if delta == 0 || delta > MAX_TIMESTAMP_ADVANCE {
                    SAMPLES_PER_PACKET
                } else {
                    delta
                }
            }
            None => SAMPLES_PER_PACKET,
        };
        self.granule += advance;
        self.last_timestamp = Some(packet.timestamp);

        if let Some((data, granule)) = self.pending.take() {
            self.writer
                .write_packet(data, STREAM_SERIAL, PacketWriteEndInfo::EndPage, granule)?;
        }
        self.pending = Some((packet.payload.clone(), self.granule));
        self.packets_written += 1;
        self.payload_bytes += packet.payload.len() as u64;
        Ok(())
    }

    /// Number of audio packets accepted so far.
    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    /// Total opaque payload bytes accepted so far.
    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes
    }

    /// Flags the last packet end-of-stream, flushes, and returns the
    /// underlying writer.
    pub fn finalize(mut self) -> Result<W> {
        if let Some((data, granule)) = self.pending.take() {
            self.writer.write_packet(
                data,
                STREAM_SERIAL,
                PacketWriteEndInfo::EndStream,
                granule,
            )?;
        }
        let mut inner = self.writer.into_inner();
        inner.flush()?;
        Ok(inner)
    }
}

/// Encodes a flushed batch into one self-contained container buffer.
pub fn encode_batch(batch: &FlushBatch, info: StreamInfo) -> Result<Vec<u8>> {
    let wrap = |e: TablescribeError| TablescribeError::ContainerWrite {
        source_tag: batch.source_tag,
        message: e.to_string(),
    };

    let mut writer = OggOpusWriter::new(Vec::new(), info).map_err(wrap)?;
    for packet in &batch.packets {
        writer.write_packet(packet).map_err(wrap)?;
    }
    writer.finalize().map_err(wrap)
}

/// OpusHead identification header (RFC 7845 §5.1).
fn opus_head(info: StreamInfo) -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1); // version
    head.push(info.channels);
    head.extend_from_slice(&0u16.to_le_bytes()); // pre-skip
    head.extend_from_slice(&info.sample_rate.to_le_bytes());
    head.extend_from_slice(&0u16.to_le_bytes()); // output gain
    head.push(0); // channel mapping family
    head
}

/// OpusTags comment header (RFC 7845 §5.2), vendor string only.
fn opus_tags() -> Vec<u8> {
    let vendor = b"tablescribe";
    let mut tags = Vec::with_capacity(8 + 4 + vendor.len() + 4);
    tags.extend_from_slice(b"OpusTags");
    tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    tags.extend_from_slice(vendor);
    tags.extend_from_slice(&0u32.to_le_bytes()); // comment count
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> StreamInfo {
        StreamInfo {
            sample_rate: 48_000,
            channels: 2,
        }
    }

    fn packet(sequence: u16, timestamp: u32, payload: &[u8]) -> AudioPacket {
        AudioPacket::new(1, sequence, timestamp, payload.to_vec())
    }

    fn batch(packets: Vec<AudioPacket>) -> FlushBatch {
        FlushBatch {
            source_tag: 1,
            packets,
        }
    }

    #[test]
    fn container_starts_with_ogg_capture_pattern() {
        let bytes = encode_batch(&batch(vec![packet(0, 0, &[1, 2, 3, 4])]), info()).unwrap();
        assert_eq!(&bytes[..4], b"OggS");
        // First page carries the beginning-of-stream flag.
        assert_eq!(bytes[5] & 0x02, 0x02);
    }

    #[test]
    fn container_carries_opus_headers() {
        let bytes = encode_batch(&batch(vec![packet(0, 0, &[9, 9])]), info()).unwrap();
        // OpusHead payload begins right after the first 28-byte page header
        // (27 bytes fixed + 1 segment table entry).
        assert_eq!(&bytes[28..36], b"OpusHead");
        assert_eq!(bytes[37], 2); // channel count
        assert_eq!(&bytes[40..44], &48_000u32.to_le_bytes());

        let tags_pos = bytes
            .windows(8)
            .position(|w| w == b"OpusTags")
            .expect("OpusTags header present");
        assert!(tags_pos > 36);
    }

    #[test]
    fn empty_batch_yields_headers_only_stream() {
        let bytes = encode_batch(&batch(vec![]), info()).unwrap();
        assert_eq!(&bytes[..4], b"OggS");
        assert_eq!(&bytes[28..36], b"OpusHead");
    }

    #[test]
    fn payload_bytes_survive_encoding_in_order() {
        let first = [0x10u8, 0x11, 0x12, 0x13, 0x14];
        let second = [0x20u8, 0x21, 0x22];
        let bytes = encode_batch(
            &batch(vec![packet(0, 0, &first), packet(1, 960, &second)]),
            info(),
        )
        .unwrap();

        let first_pos = bytes
            .windows(first.len())
            .position(|w| w == first)
            .expect("first payload present");
        let second_pos = bytes
            .windows(second.len())
            .position(|w| w == second)
            .expect("second payload present");
        assert!(first_pos < second_pos);
    }

    #[test]
    fn writer_tracks_packet_and_byte_counts() {
        let mut writer = OggOpusWriter::new(Vec::new(), info()).unwrap();
        writer.write_packet(&packet(0, 0, &[1, 2, 3])).unwrap();
        writer.write_packet(&packet(1, 960, &[4, 5])).unwrap();
        assert_eq!(writer.packets_written(), 2);
        assert_eq!(writer.payload_bytes(), 5);
        let bytes = writer.finalize().unwrap();
        assert_eq!(&bytes[..4], b"OggS");
    }

    #[test]
    fn final_page_is_marked_end_of_stream() {
        let bytes = encode_batch(
            &batch(vec![packet(0, 0, &[1]), packet(1, 960, &[2])]),
            info(),
        )
        .unwrap();

        // Scan page headers for the EOS flag (bit 2 of the header type byte).
        let mut saw_eos = false;
        let mut i = 0;
        while i + 27 <= bytes.len() {
            if &bytes[i..i + 4] == b"OggS" {
                if bytes[i + 5] & 0x04 != 0 {
                    saw_eos = true;
                }
                let segs = bytes[i + 26] as usize;
                let body: usize = bytes[i + 27..i + 27 + segs]
                    .iter()
                    .map(|&b| b as usize)
                    .sum();
                i += 27 + segs + body;
            } else {
                i += 1;
            }
        }
        assert!(saw_eos, "no end-of-stream page found");
    }

    #[test]
    fn timestamp_discontinuity_falls_back_to_nominal_frame() {
        let mut writer = OggOpusWriter::new(Vec::new(), info()).unwrap();
        writer.write_packet(&packet(0, 0, &[1])).unwrap();
        // A wild timestamp jump should not explode the granule position.
        writer.write_packet(&packet(1, u32::MAX - 10, &[2])).unwrap();
        assert_eq!(writer.packets_written(), 2);
        writer.finalize().unwrap();
    }
}

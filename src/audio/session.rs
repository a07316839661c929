//! Per-source session store.
//!
//! One session per active source tag: a pending packet buffer, the
//! last-activity instant, and an optional archive container writer. The
//! map is the only structure touched by more than one task and every
//! mutation happens under its single lock. Nothing network- or
//! encode-shaped ever runs inside the critical section; batches leave it
//! as copies.

use crate::audio::container::{OggOpusWriter, StreamInfo};
use crate::audio::packet::{AudioPacket, FlushBatch};
use crate::audio::stats::Counters;
use crate::error::{Result, TablescribeError};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Persistent per-source recording, kept open for the whole call.
struct Archive {
    writer: OggOpusWriter<BufWriter<File>>,
    path: PathBuf,
}

/// State for one active source tag.
struct SourceSession {
    buffer: Vec<AudioPacket>,
    last_voice: Instant,
    archive: Option<Archive>,
}

/// Concurrency-safe mapping from source tag to session state.
///
/// Shared between the ingestion loop (append) and the silence detector
/// (snapshot and clear); a single coarse lock is enough because per-packet
/// critical sections are tiny.
pub struct SessionStore {
    sessions: Mutex<HashMap<u32, SourceSession>>,
    info: StreamInfo,
    recordings_dir: Option<PathBuf>,
    counters: Arc<Counters>,
}

impl SessionStore {
    pub fn new(
        info: StreamInfo,
        recordings_dir: Option<PathBuf>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            info,
            recordings_dir,
            counters,
        }
    }

    /// Appends a voice packet to its source's buffer, creating the session
    /// (and archive writer) lazily on first sight of the tag.
    ///
    /// If the archive writer cannot be opened the session is not created
    /// and the packet is skipped; the next packet for the tag retries.
    pub fn append(&self, packet: AudioPacket) -> Result<()> {
        use std::collections::hash_map::Entry;

        let tag = packet.source_tag;
        let mut sessions = self.lock();

        let session = match sessions.entry(tag) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let archive = match &self.recordings_dir {
                    Some(dir) => Some(open_archive(dir, tag, self.info)?),
                    None => None,
                };
                if let Some(archive) = &archive {
                    info!(source_tag = tag, path = %archive.path.display(), "opened archive");
                }
                debug!(source_tag = tag, "created session");
                entry.insert(SourceSession {
                    buffer: Vec::new(),
                    last_voice: Instant::now(),
                    archive,
                })
            }
        };

        if let Some(archive) = &mut session.archive {
            // Buffered file write; archive failures must not cost us the
            // packet, it still goes to the transcription buffer.
            if let Err(e) = archive.writer.write_packet(&packet) {
                warn!(source_tag = tag, error = %e, "archive write failed");
            } else {
                self.counters.record_archived_bytes(packet.payload.len() as u64);
            }
        }

        session.last_voice = Instant::now();
        session.buffer.push(packet);
        Ok(())
    }

    /// Atomically copies and clears a source's buffer.
    ///
    /// Returns `None` for unknown tags or empty buffers. The last-activity
    /// instant is refreshed so an overlapping detector tick cannot flush
    /// the same threshold crossing twice.
    pub fn snapshot_and_clear(&self, tag: u32) -> Option<FlushBatch> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(&tag)?;
        if session.buffer.is_empty() {
            return None;
        }

        let packets = std::mem::take(&mut session.buffer);
        session.last_voice = Instant::now();
        Some(FlushBatch {
            source_tag: tag,
            packets,
        })
    }

    /// Source tags whose last activity is older than `threshold` and whose
    /// buffer holds packets. Empty buffers are skipped; a no-op flush is
    /// wasted work and noise.
    pub fn stale_tags(&self, threshold: Duration) -> Vec<u32> {
        let sessions = self.lock();
        sessions
            .iter()
            .filter(|(_, s)| !s.buffer.is_empty() && s.last_voice.elapsed() > threshold)
            .map(|(&tag, _)| tag)
            .collect()
    }

    /// Final forced flush of every session, for shutdown.
    pub fn drain_all(&self) -> Vec<FlushBatch> {
        let mut sessions = self.lock();
        let mut batches = Vec::new();
        for (&tag, session) in sessions.iter_mut() {
            if session.buffer.is_empty() {
                continue;
            }
            let packets = std::mem::take(&mut session.buffer);
            batches.push(FlushBatch {
                source_tag: tag,
                packets,
            });
        }
        batches
    }

    /// Tears down every session and finalizes all archive writers.
    ///
    /// Called exactly once, at processing shutdown. Individual archive
    /// failures are logged and do not abort the teardown of the rest.
    pub fn close_all(&self) {
        let sessions = std::mem::take(&mut *self.lock());
        for (tag, session) in sessions {
            let Some(archive) = session.archive else {
                continue;
            };
            let path = archive.path;
            match archive.writer.finalize() {
                Ok(_) => info!(source_tag = tag, path = %path.display(), "closed archive"),
                Err(e) => {
                    warn!(source_tag = tag, path = %path.display(), error = %e, "failed to finalize archive")
                }
            }
        }
    }

    /// Tags with a live session, in no particular order.
    pub fn active_tags(&self) -> Vec<u32> {
        self.lock().keys().copied().collect()
    }

    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, SourceSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn open_archive(dir: &Path, tag: u32, info: StreamInfo) -> Result<Archive> {
    fs::create_dir_all(dir).map_err(|e| TablescribeError::ContainerOpen {
        source_tag: tag,
        message: e.to_string(),
    })?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("audio_{timestamp}_{tag}.ogg"));
    let file = File::create(&path).map_err(|e| TablescribeError::ContainerOpen {
        source_tag: tag,
        message: e.to_string(),
    })?;
    let writer = OggOpusWriter::new(BufWriter::new(file), info).map_err(|e| {
        TablescribeError::ContainerOpen {
            source_tag: tag,
            message: e.to_string(),
        }
    })?;
    Ok(Archive { writer, path })
}

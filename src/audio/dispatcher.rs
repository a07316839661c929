//! Per-source segment dispatch.
//!
//! One long-lived worker per source tag, fed through a bounded queue.
//! Submission never blocks: a full queue drops the batch and bumps a
//! counter, because live capture continuity outranks transcription
//! coverage. All encoding and network suspension happens here, never on
//! the ingestion path.

use crate::audio::container::{self, StreamInfo};
use crate::audio::packet::FlushBatch;
use crate::audio::stats::Counters;
use crate::error::Result;
use crate::sink::TranscriptSink;
use crate::stt::recognizer::{AudioMetadata, Recognizer};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Dispatch configuration, fixed for the lifetime of a processing run.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub info: StreamInfo,
    pub language: String,
    pub queue_depth: usize,
    pub diagnostics_dir: PathBuf,
}

impl DispatcherConfig {
    fn metadata(&self) -> AudioMetadata {
        AudioMetadata::ogg_opus(self.info.sample_rate, self.info.channels, &self.language)
    }
}

struct Worker {
    queue: mpsc::Sender<FlushBatch>,
    handle: JoinHandle<()>,
}

/// Routes flush batches to per-source workers.
pub struct SegmentDispatcher {
    workers: Mutex<HashMap<u32, Worker>>,
    recognizer: Arc<dyn Recognizer>,
    sink: Arc<dyn TranscriptSink>,
    counters: Arc<Counters>,
    config: DispatcherConfig,
}

impl SegmentDispatcher {
    pub fn new(
        config: DispatcherConfig,
        recognizer: Arc<dyn Recognizer>,
        sink: Arc<dyn TranscriptSink>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            recognizer,
            sink,
            counters,
            config,
        }
    }

    /// Submits a batch to its source's worker, spawning the worker on
    /// first sight of the tag. Never blocks; a full queue drops the batch.
    pub fn submit(&self, batch: FlushBatch) {
        if batch.is_empty() {
            return;
        }
        let tag = batch.source_tag;
        let mut workers = self.lock();
        let worker = workers.entry(tag).or_insert_with(|| self.spawn_worker(tag));

        match worker.queue.try_send(batch) {
            Ok(()) => {
                self.counters.record_segment_dispatched();
                debug!(source_tag = tag, "batch queued for recognition");
            }
            Err(TrySendError::Full(batch)) => {
                self.counters.record_batch_dropped();
                warn!(
                    source_tag = tag,
                    packets = batch.len(),
                    "dispatch queue full, dropping batch"
                );
            }
            Err(TrySendError::Closed(_)) => {
                warn!(source_tag = tag, "dispatch queue closed, dropping batch");
            }
        }
    }

    /// Closes every queue and waits for the workers to drain and exit.
    ///
    /// At most one recognizer call per source is outstanding at this
    /// point; it is awaited, never cancelled.
    pub async fn shutdown(&self) {
        let workers = std::mem::take(&mut *self.lock());
        for (tag, worker) in workers {
            drop(worker.queue);
            if let Err(e) = worker.handle.await {
                warn!(source_tag = tag, error = %e, "dispatcher worker panicked");
            }
        }
    }

    fn spawn_worker(&self, tag: u32) -> Worker {
        let (queue, rx) = mpsc::channel(self.config.queue_depth);
        let recognizer = Arc::clone(&self.recognizer);
        let sink = Arc::clone(&self.sink);
        let counters = Arc::clone(&self.counters);
        let info = self.config.info;
        let metadata = self.config.metadata();
        let diagnostics_dir = self.config.diagnostics_dir.clone();

        debug!(source_tag = tag, "spawning dispatcher worker");
        let handle = tokio::spawn(run_worker(
            tag,
            rx,
            recognizer,
            sink,
            counters,
            info,
            metadata,
            diagnostics_dir,
        ));
        Worker { queue, handle }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, Worker>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Worker loop: encode, recognize, route the outcome. Exits when the
/// queue is closed at shutdown.
#[allow(clippy::too_many_arguments)]
async fn run_worker(
    tag: u32,
    mut rx: mpsc::Receiver<FlushBatch>,
    recognizer: Arc<dyn Recognizer>,
    sink: Arc<dyn TranscriptSink>,
    counters: Arc<Counters>,
    info: StreamInfo,
    metadata: AudioMetadata,
    diagnostics_dir: PathBuf,
) {
    while let Some(batch) = rx.recv().await {
        let encoded = match container::encode_batch(&batch, info) {
            Ok(bytes) => bytes,
            Err(e) => {
                // Encoding failure discards the batch; the worker moves on.
                warn!(source_tag = tag, error = %e, "failed to encode segment");
                continue;
            }
        };

        match recognizer.recognize(&encoded, &metadata).await {
            Ok(recognition) => {
                info!(
                    source_tag = tag,
                    confidence = recognition.confidence,
                    transcript = %recognition.transcript,
                    "segment recognized"
                );
                sink.on_transcript(tag, &recognition.transcript, recognition.confidence);
            }
            Err(e) => {
                counters.record_recognition_failed();
                warn!(source_tag = tag, backend = recognizer.name(), error = %e, "recognition failed");
                // No retry; keep the bytes around for offline diagnosis.
                if let Err(e) = persist_failed_segment(&diagnostics_dir, tag, &encoded) {
                    warn!(source_tag = tag, error = %e, "failed to persist diagnostics file");
                }
            }
        }
    }
    debug!(source_tag = tag, "dispatcher worker exited");
}

fn persist_failed_segment(dir: &Path, tag: u32, encoded: &[u8]) -> Result<()> {
    fs::create_dir_all(dir)?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("failed_{timestamp}_{tag}.ogg"));
    fs::write(&path, encoded)?;
    info!(source_tag = tag, path = %path.display(), bytes = encoded.len(), "persisted failed segment");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::packet::AudioPacket;
    use crate::sink::CollectorSink;
    use crate::stt::recognizer::MockRecognizer;

    fn config(queue_depth: usize, diagnostics_dir: PathBuf) -> DispatcherConfig {
        DispatcherConfig {
            info: StreamInfo {
                sample_rate: 48_000,
                channels: 2,
            },
            language: "en-US".to_string(),
            queue_depth,
            diagnostics_dir,
        }
    }

    fn batch(tag: u32, payload_len: usize) -> FlushBatch {
        FlushBatch {
            source_tag: tag,
            packets: vec![AudioPacket::new(tag, 0, 0, vec![0xAB; payload_len])],
        }
    }

    #[tokio::test]
    async fn dispatches_batch_to_recognizer_and_sink() {
        let recognizer = Arc::new(MockRecognizer::new().with_response("hello there"));
        let sink = Arc::new(CollectorSink::new());
        let counters = Arc::new(Counters::default());
        let dispatcher = SegmentDispatcher::new(
            config(10, PathBuf::from("unused")),
            recognizer.clone(),
            sink.clone(),
            counters.clone(),
        );

        dispatcher.submit(batch(3, 16));
        dispatcher.shutdown().await;

        assert_eq!(recognizer.call_count(), 1);
        let received = sink.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, 3);
        assert_eq!(received[0].1, "hello there");
        assert_eq!(counters.snapshot().segments_dispatched, 1);
    }

    #[tokio::test]
    async fn empty_batch_is_ignored() {
        let recognizer = Arc::new(MockRecognizer::new());
        let sink = Arc::new(CollectorSink::new());
        let dispatcher = SegmentDispatcher::new(
            config(10, PathBuf::from("unused")),
            recognizer.clone(),
            sink.clone(),
            Arc::new(Counters::default()),
        );

        dispatcher.submit(FlushBatch {
            source_tag: 1,
            packets: vec![],
        });
        dispatcher.shutdown().await;
        assert_eq!(recognizer.call_count(), 0);
    }

    #[tokio::test]
    async fn full_queue_drops_batch_and_counts_it() {
        let recognizer = Arc::new(MockRecognizer::new());
        let sink = Arc::new(CollectorSink::new());
        let counters = Arc::new(Counters::default());
        let dispatcher = SegmentDispatcher::new(
            config(1, PathBuf::from("unused")),
            recognizer.clone(),
            sink.clone(),
            counters.clone(),
        );

        // No await between submits on a current-thread runtime, so the
        // worker cannot drain the queue in between: capacity one means the
        // second and third batch are dropped.
        dispatcher.submit(batch(1, 8));
        dispatcher.submit(batch(1, 8));
        dispatcher.submit(batch(1, 8));

        let snap = counters.snapshot();
        assert_eq!(snap.segments_dispatched, 1);
        assert_eq!(snap.batches_dropped, 2);

        dispatcher.shutdown().await;
        assert_eq!(recognizer.call_count(), 1);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn failed_recognition_persists_diagnostics_file() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = Arc::new(MockRecognizer::new().with_failure());
        let sink = Arc::new(CollectorSink::new());
        let counters = Arc::new(Counters::default());
        let dispatcher = SegmentDispatcher::new(
            config(10, dir.path().to_path_buf()),
            recognizer.clone(),
            sink.clone(),
            counters.clone(),
        );

        dispatcher.submit(batch(9, 32));
        dispatcher.shutdown().await;

        assert!(sink.is_empty());
        assert_eq!(counters.snapshot().recognitions_failed, 1);

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].as_ref().unwrap().file_name();
        let name = name.to_string_lossy();
        assert!(name.starts_with("failed_"));
        assert!(name.ends_with("_9.ogg"));
    }

    #[tokio::test]
    async fn batches_for_one_source_are_processed_in_flush_order() {
        let recognizer = Arc::new(MockRecognizer::new());
        let sink = Arc::new(CollectorSink::new());
        let dispatcher = SegmentDispatcher::new(
            config(10, PathBuf::from("unused")),
            recognizer.clone(),
            sink.clone(),
            Arc::new(Counters::default()),
        );

        dispatcher.submit(batch(1, 10));
        dispatcher.submit(batch(1, 100));
        dispatcher.submit(batch(1, 300));
        dispatcher.shutdown().await;

        // Encoded size grows with payload size, so the received sizes
        // reveal the processing order.
        let sizes = recognizer.received_sizes();
        assert_eq!(sizes.len(), 3);
        assert!(sizes[0] < sizes[1] && sizes[1] < sizes[2]);
    }

    #[tokio::test]
    async fn independent_sources_get_independent_workers() {
        let recognizer = Arc::new(MockRecognizer::new());
        let sink = Arc::new(CollectorSink::new());
        let dispatcher = SegmentDispatcher::new(
            config(10, PathBuf::from("unused")),
            recognizer.clone(),
            sink.clone(),
            Arc::new(Counters::default()),
        );

        dispatcher.submit(batch(1, 8));
        dispatcher.submit(batch(2, 8));
        dispatcher.shutdown().await;

        let mut tags: Vec<u32> = sink.received().iter().map(|(tag, _, _)| *tag).collect();
        tags.sort_unstable();
        assert_eq!(tags, vec![1, 2]);
    }
}

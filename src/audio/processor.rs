//! Audio processing orchestration.
//!
//! Wires the ingestion loop, session store, silence detector, and
//! per-source dispatchers together and owns their lifecycle. The live
//! transport is consumed as the receiving half of a channel; a closed
//! channel is end-of-stream.

use crate::audio::container::StreamInfo;
use crate::audio::dispatcher::{DispatcherConfig, SegmentDispatcher};
use crate::audio::packet::{AudioPacket, PacketClass};
use crate::audio::session::SessionStore;
use crate::audio::silence::SilenceDetector;
use crate::audio::stats::{Counters, CountersSnapshot};
use crate::config::{AudioConfig, SpeechConfig};
use crate::sink::TranscriptSink;
use crate::stt::recognizer::Recognizer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything the processor needs to know up front.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub info: StreamInfo,
    pub language: String,
    pub silence_threshold: Duration,
    pub detector_tick: Duration,
    pub dispatch_queue_depth: usize,
    pub recordings_dir: Option<PathBuf>,
    pub diagnostics_dir: PathBuf,
}

impl ProcessorConfig {
    pub fn from_config(audio: &AudioConfig, speech: &SpeechConfig) -> Self {
        Self {
            info: StreamInfo {
                sample_rate: audio.sample_rate,
                channels: audio.channels,
            },
            language: speech.language.clone(),
            silence_threshold: audio.silence_threshold(),
            detector_tick: audio.detector_tick(),
            dispatch_queue_depth: audio.dispatch_queue_depth,
            recordings_dir: audio.recordings_dir.clone(),
            diagnostics_dir: audio.diagnostics_dir.clone(),
        }
    }
}

/// Builds and starts the processing pipeline.
pub struct AudioProcessor {
    config: ProcessorConfig,
    recognizer: Arc<dyn Recognizer>,
    sink: Arc<dyn TranscriptSink>,
}

impl AudioProcessor {
    pub fn new(
        config: ProcessorConfig,
        recognizer: Arc<dyn Recognizer>,
        sink: Arc<dyn TranscriptSink>,
    ) -> Self {
        Self {
            config,
            recognizer,
            sink,
        }
    }

    /// Starts processing packets from `packets` and returns a handle for
    /// shutdown. The caller keeps the sending half; dropping it signals
    /// end-of-stream.
    pub fn start(self, packets: mpsc::Receiver<AudioPacket>) -> ProcessorHandle {
        let counters = Arc::new(Counters::default());
        let store = Arc::new(SessionStore::new(
            self.config.info,
            self.config.recordings_dir.clone(),
            counters.clone(),
        ));
        let dispatcher = Arc::new(SegmentDispatcher::new(
            DispatcherConfig {
                info: self.config.info,
                language: self.config.language.clone(),
                queue_depth: self.config.dispatch_queue_depth,
                diagnostics_dir: self.config.diagnostics_dir.clone(),
            },
            self.recognizer,
            self.sink,
            counters.clone(),
        ));

        let (stop_tx, stop_rx) = watch::channel(false);

        let detector = SilenceDetector::new(
            store.clone(),
            dispatcher.clone(),
            self.config.silence_threshold,
            self.config.detector_tick,
        );
        let detector_task = tokio::spawn(detector.run(stop_rx.clone()));

        let ingest_task = tokio::spawn(run_ingestion(
            packets,
            store.clone(),
            counters.clone(),
            stop_rx,
        ));

        info!(
            sample_rate = self.config.info.sample_rate,
            channels = self.config.info.channels,
            threshold_ms = self.config.silence_threshold.as_millis() as u64,
            "audio processing started"
        );

        ProcessorHandle {
            stop_tx,
            ingest_task,
            detector_task,
            store,
            dispatcher,
            counters,
        }
    }
}

/// Running pipeline handle. Consumed by [`ProcessorHandle::stop`].
pub struct ProcessorHandle {
    stop_tx: watch::Sender<bool>,
    ingest_task: JoinHandle<()>,
    detector_task: JoinHandle<()>,
    store: Arc<SessionStore>,
    dispatcher: Arc<SegmentDispatcher>,
    counters: Arc<Counters>,
}

impl ProcessorHandle {
    /// Point-in-time view of the processing counters.
    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    /// Stops processing: halts ingestion and detection, forces one final
    /// flush per source, drains the dispatchers, and finalizes every
    /// archive writer. In-flight recognizer calls are awaited, not
    /// cancelled.
    pub async fn stop(self) -> CountersSnapshot {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.ingest_task.await {
            warn!(error = %e, "ingestion task panicked");
        }
        if let Err(e) = self.detector_task.await {
            warn!(error = %e, "silence detector task panicked");
        }

        for batch in self.store.drain_all() {
            debug!(
                source_tag = batch.source_tag,
                packets = batch.len(),
                "final forced flush"
            );
            self.dispatcher.submit(batch);
        }
        self.dispatcher.shutdown().await;
        self.store.close_all();

        let snapshot = self.counters.snapshot();
        info!(
            packets = snapshot.packets_received,
            silence_markers = snapshot.silence_markers,
            segments = snapshot.segments_dispatched,
            dropped = snapshot.batches_dropped,
            "audio processing stopped"
        );
        snapshot
    }
}

/// Single consumer of the live packet stream.
///
/// Never blocks on I/O: classification and buffer appends only. Encoding
/// and recognition live in the dispatcher workers.
async fn run_ingestion(
    mut packets: mpsc::Receiver<AudioPacket>,
    store: Arc<SessionStore>,
    counters: Arc<Counters>,
    mut stop: watch::Receiver<bool>,
) {
    debug!("ingestion loop started");
    loop {
        tokio::select! {
            received = packets.recv() => {
                let Some(packet) = received else {
                    debug!("packet stream closed");
                    break;
                };
                handle_packet(packet, &store, &counters);
            }
            _ = stop.changed() => {
                if *stop.borrow() {
                    break;
                }
            }
        }
    }
    debug!("ingestion loop stopped");
}

fn handle_packet(packet: AudioPacket, store: &SessionStore, counters: &Counters) {
    counters.record_packet();
    match packet.classify() {
        PacketClass::Silence => {
            // Bookkeeping only; silence markers are never buffered.
            counters.record_silence_marker();
        }
        PacketClass::Empty => {
            counters.record_empty_packet();
        }
        PacketClass::Voice => {
            let tag = packet.source_tag;
            if let Err(e) = store.append(packet) {
                // Session setup failed; the next packet for this tag retries.
                warn!(source_tag = tag, error = %e, "failed to buffer packet");
            }
        }
    }
}

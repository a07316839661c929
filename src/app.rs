//! Application entry point.
//!
//! Wires config, recognizer, conversation assistant, and the audio
//! processor together, and owns the start/stop lifecycle.

use crate::assistant::{AssistantClient, ConversationLog, ConversationSink};
use crate::audio::{AudioPacket, AudioProcessor, CountersSnapshot, ProcessorConfig, ProcessorHandle};
use crate::config::Config;
use crate::error::{Result, TablescribeError};
use crate::stt::GoogleRecognizer;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::info;

/// Depth of the inbound packet channel between the transport and the
/// ingestion loop.
const PACKET_CHANNEL_DEPTH: usize = 256;

struct Running {
    packets: mpsc::Sender<AudioPacket>,
    handle: ProcessorHandle,
}

/// Live transcription session manager.
pub struct App {
    config: Config,
    conversation: Arc<ConversationLog>,
    running: Mutex<Option<Running>>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let client = AssistantClient::new(&config.assistant)?;
        let conversation = Arc::new(ConversationLog::new(client, &config.assistant));
        Ok(Self {
            config,
            conversation,
            running: Mutex::new(None),
        })
    }

    /// Starts the processing pipeline and returns the packet sender the
    /// transport feeds.
    pub fn start(&self) -> Result<mpsc::Sender<AudioPacket>> {
        let mut running = self.lock_running();
        if running.is_some() {
            return Err(TablescribeError::AlreadyProcessing);
        }

        let recognizer = Arc::new(GoogleRecognizer::new(&self.config.speech));
        let sink = Arc::new(ConversationSink::new(Arc::clone(&self.conversation)));
        let processor_config =
            ProcessorConfig::from_config(&self.config.audio, &self.config.speech);
        let processor = AudioProcessor::new(processor_config, recognizer, sink);

        let (tx, rx) = mpsc::channel(PACKET_CHANNEL_DEPTH);
        let handle = processor.start(rx);
        info!("processing started");

        *running = Some(Running {
            packets: tx.clone(),
            handle,
        });
        Ok(tx)
    }

    /// Stops the pipeline, flushing buffered audio first.
    pub async fn stop(&self) -> Result<CountersSnapshot> {
        let running = self
            .lock_running()
            .take()
            .ok_or(TablescribeError::NotProcessing)?;
        drop(running.packets);
        let snapshot = running.handle.stop().await;
        self.conversation.flush_pending();
        info!("processing stopped");
        Ok(snapshot)
    }

    pub fn is_processing(&self) -> bool {
        self.lock_running().is_some()
    }

    /// Asks the assistant a question in the context of the transcribed
    /// conversation.
    pub async fn ask(&self, question: &str) -> Result<String> {
        self.conversation.ask(question).await
    }

    pub fn counters(&self) -> Option<CountersSnapshot> {
        self.lock_running().as_ref().map(|r| r.handle.counters())
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//! Persisted conversation log feeding the assistant.
//!
//! Transcript lines accumulate in a pending buffer and are folded into a
//! single user message the next time a question is asked, so the assistant
//! sees table chatter as context rather than as individual turns.

use crate::assistant::client::{AssistantClient, ChatMessage};
use crate::config::AssistantConfig;
use crate::error::{Result, TablescribeError};
use crate::sink::TranscriptSink;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, info, warn};

const DATA_VERSION: &str = "1";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant sitting in on a \
tabletop roleplaying session. Lines prefixed with [voice] are live transcripts of the \
players speaking, attributed by numeric source tag. Use them as context. Answer rules \
questions and recap events concisely; do not narrate on behalf of the players.";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMessage {
    role: String,
    content: String,
    timestamp: SystemTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConversationData {
    version: String,
    system_prompt: String,
    messages: Vec<StoredMessage>,
    last_saved: SystemTime,
}

struct State {
    messages: Vec<StoredMessage>,
    pending: Vec<String>,
}

/// Conversation history shared between the transcript pipeline and the
/// question-answering path.
pub struct ConversationLog {
    client: AssistantClient,
    path: PathBuf,
    history_limit: usize,
    system_prompt: String,
    state: Mutex<State>,
}

impl ConversationLog {
    pub fn new(client: AssistantClient, config: &AssistantConfig) -> Self {
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let log = Self {
            client,
            path: config.conversation_path.clone(),
            history_limit: config.history_limit,
            system_prompt,
            state: Mutex::new(State {
                messages: Vec::new(),
                pending: Vec::new(),
            }),
        };
        if let Err(e) = log.load() {
            debug!(path = %log.path.display(), error = %e, "no conversation restored");
        }
        log
    }

    /// Buffers one transcript line for the next question.
    pub fn add_transcript(&self, source_tag: u32, text: &str) {
        let line = format!("[voice] source {source_tag}: {text}");
        self.lock().pending.push(line);
    }

    /// Folds buffered transcript lines into a single user message.
    pub fn flush_pending(&self) {
        {
            let mut state = self.lock();
            if state.pending.is_empty() {
                return;
            }
            let content = state.pending.join("\n");
            state.pending.clear();
            state.messages.push(StoredMessage {
                role: "user".to_string(),
                content,
                timestamp: SystemTime::now(),
            });
            Self::trim(&mut state.messages, self.history_limit);
        }
        if let Err(e) = self.save() {
            warn!(error = %e, "failed to persist conversation");
        }
    }

    /// Sends the conversation plus `question` to the assistant and records
    /// the reply.
    pub async fn ask(&self, question: &str) -> Result<String> {
        let api_messages = {
            let mut state = self.lock();
            if !state.pending.is_empty() {
                let content = state.pending.join("\n");
                state.pending.clear();
                state.messages.push(StoredMessage {
                    role: "user".to_string(),
                    content,
                    timestamp: SystemTime::now(),
                });
            }
            state.messages.push(StoredMessage {
                role: "user".to_string(),
                content: question.to_string(),
                timestamp: SystemTime::now(),
            });
            Self::trim(&mut state.messages, self.history_limit);
            state
                .messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect::<Vec<_>>()
        };

        let reply = self
            .client
            .send(&api_messages, Some(&self.system_prompt))
            .await?;

        {
            let mut state = self.lock();
            state.messages.push(StoredMessage {
                role: "assistant".to_string(),
                content: reply.clone(),
                timestamp: SystemTime::now(),
            });
            Self::trim(&mut state.messages, self.history_limit);
        }
        if let Err(e) = self.save() {
            warn!(error = %e, "failed to persist conversation");
        }
        info!(chars = reply.len(), "assistant replied");
        Ok(reply)
    }

    pub fn message_count(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    fn trim(messages: &mut Vec<StoredMessage>, limit: usize) {
        if messages.len() > limit {
            let excess = messages.len() - limit;
            messages.drain(..excess);
        }
    }

    fn save(&self) -> Result<()> {
        let data = {
            let state = self.lock();
            ConversationData {
                version: DATA_VERSION.to_string(),
                system_prompt: self.system_prompt.clone(),
                messages: state.messages.clone(),
                last_saved: SystemTime::now(),
            }
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| self.persist_error(e))?;
        }
        let json = serde_json::to_string_pretty(&data)
            .map_err(|e| TablescribeError::ConversationPersist {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        fs::write(&self.path, json).map_err(|e| self.persist_error(e))?;
        Ok(())
    }

    fn load(&self) -> Result<()> {
        let raw = fs::read_to_string(&self.path).map_err(|e| self.persist_error(e))?;
        let data: ConversationData =
            serde_json::from_str(&raw).map_err(|e| TablescribeError::ConversationPersist {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        if data.version != DATA_VERSION {
            warn!(
                found = %data.version,
                expected = DATA_VERSION,
                "conversation file version mismatch, starting fresh"
            );
            return Ok(());
        }
        let count = data.messages.len();
        self.lock().messages = data.messages;
        info!(messages = count, path = %self.path.display(), "conversation restored");
        Ok(())
    }

    fn persist_error(&self, e: std::io::Error) -> TablescribeError {
        TablescribeError::ConversationPersist {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Routes recognized transcripts into the conversation log.
pub struct ConversationSink {
    log: Arc<ConversationLog>,
}

impl ConversationSink {
    pub fn new(log: Arc<ConversationLog>) -> Self {
        Self { log }
    }
}

impl TranscriptSink for ConversationSink {
    fn on_transcript(&self, source_tag: u32, transcript: &str, _confidence: f32) {
        self.log.add_transcript(source_tag, transcript);
    }

    fn name(&self) -> &'static str {
        "conversation"
    }
}

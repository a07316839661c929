//! Conversation assistant: a persisted transcript-aware chat log backed by a
//! messages-style HTTP API.

mod client;
mod conversation;

pub use client::{AssistantClient, ChatMessage};
pub use conversation::{ConversationLog, ConversationSink};

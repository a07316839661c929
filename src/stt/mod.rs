//! Speech-to-text backends.

pub mod google;
pub mod recognizer;

pub use google::GoogleRecognizer;
pub use recognizer::{AudioMetadata, MockRecognizer, Recognition, Recognizer};

//! Live audio stream processing.
//!
//! One interleaved packet stream in, bounded per-speaker transcription
//! segments out: classify → buffer per source → flush on silence →
//! encode → recognize.

pub mod container;
pub mod dispatcher;
pub mod packet;
pub mod processor;
pub mod session;
pub mod silence;
pub mod stats;

pub use container::{OggOpusWriter, StreamInfo, encode_batch};
pub use dispatcher::{DispatcherConfig, SegmentDispatcher};
pub use packet::{AudioPacket, FlushBatch, PacketClass};
pub use processor::{AudioProcessor, ProcessorConfig, ProcessorHandle};
pub use session::SessionStore;
pub use silence::SilenceDetector;
pub use stats::{Counters, CountersSnapshot};

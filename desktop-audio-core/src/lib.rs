//! # desktop-audio-core
//!
//! Platform-agnostic half of getdesktopaudio.
//!
//! Turns loopback packets into normalized stereo amplitude records and
//! writes them as JSON lines. Platform backends (Windows WASAPI) implement
//! the `PacketStream` trait and plug into the generic `CaptureLoop`.
//!
//! ## Architecture
//!
//! ```text
//! desktop-audio-core (this crate)
//! ├── traits/       ← PacketStream, LoopDelegate
//! ├── models/       ← FeedError, FeedConfiguration, LoopState, RawPacket, ChannelSamples
//! ├── processing/   ← frame reader (PacketGuard), extractor, SpectralCompressor
//! ├── output/       ← RecordEmitter
//! └── session/      ← CaptureLoop (polling driver) and LoopHandle
//! ```

pub mod models;
pub mod output;
pub mod processing;
pub mod session;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use models::config::FeedConfiguration;
pub use models::error::FeedError;
pub use models::packet::{PacketHeader, RawPacket, SampleFormat};
pub use models::record::{ChannelSamples, OutputFormat};
pub use models::state::{LoopDiagnostics, LoopState};
pub use output::emitter::RecordEmitter;
pub use processing::compressor::SpectralCompressor;
pub use processing::frame_reader::{poll_packet, PacketGuard};
pub use session::capture_loop::{CaptureLoop, LoopHandle};
pub use traits::loop_delegate::LoopDelegate;
pub use traits::packet_stream::PacketStream;

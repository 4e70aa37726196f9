//! # desktop-audio-windows
//!
//! Windows WASAPI backend for getdesktopaudio.
//!
//! Provides:
//! - `ComApartment`: process-scoped COM initialization guard
//! - `WasapiLoopbackStream`: `PacketStream` over a loopback capture of the
//!   default render endpoint
//!
//! ## Usage
//! ```ignore
//! use desktop_audio_core::{CaptureLoop, FeedConfiguration, RecordEmitter};
//! use desktop_audio_windows::{ComApartment, WasapiLoopbackStream};
//!
//! let com = ComApartment::initialize()?;
//! let stream = WasapiLoopbackStream::open_default(&com)?;
//! let config = FeedConfiguration::default();
//! let emitter = RecordEmitter::stdout(config.output_format);
//! CaptureLoop::new(stream, emitter, config)?.run()?;
//! ```

#[cfg(target_os = "windows")]
pub mod com;
#[cfg(target_os = "windows")]
pub mod wasapi_loopback;

#[cfg(target_os = "windows")]
pub use com::ComApartment;
#[cfg(target_os = "windows")]
pub use wasapi_loopback::WasapiLoopbackStream;

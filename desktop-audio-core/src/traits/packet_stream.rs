use crate::models::error::FeedError;
use crate::models::packet::PacketHeader;

/// Interface for a platform loopback capture stream.
///
/// Implemented by `WasapiLoopbackStream` (Windows). The stream is owned by
/// a single capture loop and is never shared across threads; dropping it
/// releases the underlying OS handles.
///
/// Packets follow a strict acquire/release protocol: after
/// `acquire_packet` returns `Some`, the bytes stay valid until
/// `release_packet` is called with the same frame count, and no other
/// packet may be acquired before that. Use
/// [`frame_reader::poll_packet`](crate::processing::frame_reader::poll_packet)
/// rather than calling these directly.
pub trait PacketStream {
    /// Human-readable name of the endpoint being captured.
    fn device_name(&self) -> &str;

    /// Begin delivering packets.
    fn start(&mut self) -> Result<(), FeedError>;

    /// Stop delivering packets. Called once when the loop exits.
    fn stop(&mut self) -> Result<(), FeedError>;

    /// Non-blocking: acquire the next pending packet, if any.
    fn acquire_packet(&mut self) -> Result<Option<PacketHeader>, FeedError>;

    /// Bytes of the currently acquired packet. Empty when none is held.
    fn packet_bytes(&self) -> &[u8];

    /// Hand the acquired packet back to the source.
    fn release_packet(&mut self, frames: u32) -> Result<(), FeedError>;
}

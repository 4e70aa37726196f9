//! Polling side of the acquire/release packet protocol.
//!
//! [`poll_packet`] hands out a [`PacketGuard`] that mutably borrows the
//! stream, so a second packet cannot be requested while one is held, and
//! the guard releases its packet exactly once on every exit path.

use crate::models::error::FeedError;
use crate::models::packet::{PacketHeader, RawPacket};
use crate::traits::packet_stream::PacketStream;

/// Non-blocking poll. `Ok(None)` means nothing is pending.
pub fn poll_packet<S: PacketStream + ?Sized>(stream: &mut S) -> Result<Option<PacketGuard<'_, S>>, FeedError> {
    let Some(header) = stream.acquire_packet()? else {
        return Ok(None);
    };
    Ok(Some(PacketGuard {
        stream,
        header,
        released: false,
    }))
}

/// An acquired packet. Released on [`release`](Self::release) or on drop.
pub struct PacketGuard<'s, S: PacketStream + ?Sized> {
    stream: &'s mut S,
    header: PacketHeader,
    released: bool,
}

impl<S: PacketStream + ?Sized> PacketGuard<'_, S> {
    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    /// Typed view over the packet bytes, validated against the header.
    pub fn packet(&self) -> Result<RawPacket<'_>, FeedError> {
        RawPacket::new(self.stream.packet_bytes(), self.header)
    }

    /// Release now and report the outcome.
    pub fn release(mut self) -> Result<(), FeedError> {
        self.released = true;
        self.stream.release_packet(self.header.frames)
    }
}

impl<S: PacketStream + ?Sized> Drop for PacketGuard<'_, S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.stream.release_packet(self.header.frames) {
            log::warn!("Failed to release {} frame packet: {}", self.header.frames, e);
        }
    }
}

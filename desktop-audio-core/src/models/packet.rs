use super::error::FeedError;

/// Sample encoding of a packet as delivered by the stream source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// 32-bit IEEE float, the WASAPI shared-mode mix format.
    Float32,
    /// 16-bit signed PCM, converted to float at read time.
    Int16,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Int16 => 2,
        }
    }
}

/// Describes the packet currently acquired from a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub frames: u32,
    pub channels: u16,
    pub format: SampleFormat,
    /// The source marked the packet as silence; its bytes are ignored.
    pub silent: bool,
    /// The source dropped data before this packet (overrun/glitch).
    pub discontinuity: bool,
}

impl PacketHeader {
    pub fn float_stereo(frames: u32) -> Self {
        Self {
            frames,
            channels: 2,
            format: SampleFormat::Float32,
            silent: false,
            discontinuity: false,
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }
}

/// Typed, bounds-checked view over the interleaved bytes of one packet.
///
/// Frames are read as `(left, right)` pairs regardless of the source
/// layout: mono is duplicated, channels past the second are ignored.
#[derive(Debug, Clone, Copy)]
pub struct RawPacket<'a> {
    bytes: &'a [u8],
    header: PacketHeader,
}

impl<'a> RawPacket<'a> {
    /// Validate `bytes` against the frame count claimed by `header`.
    ///
    /// Silent packets carry no meaningful bytes and are never rejected.
    pub fn new(bytes: &'a [u8], header: PacketHeader) -> Result<Self, FeedError> {
        if header.silent {
            return Ok(Self { bytes: &[], header });
        }
        if header.frames > 0 && header.channels == 0 {
            return Err(FeedError::MalformedPacket(format!(
                "{} frames with zero channels",
                header.frames
            )));
        }

        let required = header.frames as usize * header.bytes_per_frame();
        if bytes.len() < required {
            return Err(FeedError::MalformedPacket(format!(
                "{} frames need {} bytes, buffer has {}",
                header.frames,
                required,
                bytes.len()
            )));
        }

        Ok(Self {
            bytes: &bytes[..required],
            header,
        })
    }

    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    pub fn frame_count(&self) -> usize {
        self.header.frames as usize
    }

    pub fn is_empty(&self) -> bool {
        self.header.frames == 0
    }

    /// Left and right samples of frame `index`, or `None` past the end.
    pub fn frame(&self, index: usize) -> Option<(f32, f32)> {
        if index >= self.frame_count() {
            return None;
        }
        if self.header.silent {
            return Some((0.0, 0.0));
        }

        let left = self.sample(index, 0);
        let right = if self.header.channels >= 2 {
            self.sample(index, 1)
        } else {
            left
        };
        Some((left, right))
    }

    fn sample(&self, frame: usize, channel: usize) -> f32 {
        let width = self.header.format.bytes_per_sample();
        let offset = frame * self.header.bytes_per_frame() + channel * width;
        let raw = &self.bytes[offset..offset + width];
        match self.header.format {
            SampleFormat::Float32 => f32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]),
            SampleFormat::Int16 => i16::from_ne_bytes([raw[0], raw[1]]) as f32 / 32768.0,
        }
    }
}

#[cfg(test)]
pub(crate) fn float_bytes(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
}

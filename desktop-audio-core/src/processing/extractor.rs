use crate::models::packet::RawPacket;
use crate::models::record::ChannelSamples;

/// Convert a packet into rectified per-channel amplitudes.
///
/// `sample_budget` caps the total across both channels, so at most
/// `sample_budget / 2` frames are read. Output is truncated to the frames
/// actually available and never padded.
pub fn extract(packet: &RawPacket<'_>, sample_budget: u32) -> ChannelSamples {
    let frames = packet.frame_count().min(sample_budget as usize / 2);
    let mut samples = ChannelSamples::with_capacity(frames);

    for (left, right) in (0..frames).filter_map(|i| packet.frame(i)) {
        samples.left.push(amplitude(left));
        samples.right.push(amplitude(right));
    }
    samples
}

/// `|x|` clamped to `[0, 1]`. Float mixes can exceed unity; NaN reads as silence.
pub fn amplitude(sample: f32) -> f32 {
    if sample.is_nan() {
        return 0.0;
    }
    sample.abs().min(1.0)
}

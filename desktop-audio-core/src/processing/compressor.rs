//! Frequency-domain soft-knee compression.
//!
//! Each channel window is transformed with an N-point FFT. Bins whose
//! magnitude exceeds the threshold have the excess divided by the ratio,
//! keeping their phase, and the window is transformed back. Spreading the
//! gain reduction over the whole window smooths transient spikes in the
//! visual trace instead of flattening single samples.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::models::error::FeedError;
use crate::models::record::ChannelSamples;
use crate::processing::extractor::amplitude;

/// Bin magnitude above which compression applies.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Divisor applied to the magnitude excess over the threshold.
pub const DEFAULT_RATIO: f32 = 4.0;

pub struct SpectralCompressor {
    threshold: f32,
    ratio: f32,
    planner: FftPlanner<f32>,
}

impl SpectralCompressor {
    pub fn new(threshold: f32, ratio: f32) -> Result<Self, FeedError> {
        if !(threshold >= 0.0 && threshold.is_finite()) {
            return Err(FeedError::InvalidConfiguration(format!(
                "compressor threshold must be finite and non-negative, got {threshold}"
            )));
        }
        if !(ratio >= 1.0 && ratio.is_finite()) {
            return Err(FeedError::InvalidConfiguration(format!(
                "compressor ratio must be finite and at least 1, got {ratio}"
            )));
        }
        Ok(Self {
            threshold,
            ratio,
            planner: FftPlanner::new(),
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Compress one real-valued window. An empty window is returned as is.
    ///
    /// Output is not clamped; use [`compress_channels`](Self::compress_channels)
    /// for record-ready amplitudes.
    pub fn compress(&mut self, samples: &[f32]) -> Vec<f32> {
        let n = samples.len();
        if n == 0 {
            return Vec::new();
        }

        let mut spectrum: Vec<Complex<f32>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
        self.planner.plan_fft_forward(n).process(&mut spectrum);

        for bin in spectrum.iter_mut() {
            let magnitude = bin.norm();
            if magnitude > self.threshold {
                let compressed = self.threshold + (magnitude - self.threshold) / self.ratio;
                *bin = *bin * (compressed / magnitude);
            }
        }

        // rustfft's inverse is unnormalized
        self.planner.plan_fft_inverse(n).process(&mut spectrum);
        let scale = 1.0 / n as f32;
        spectrum.iter().map(|c| c.re * scale).collect()
    }

    /// Compress left and right independently, then re-rectify into `[0, 1]`.
    pub fn compress_channels(&mut self, samples: &ChannelSamples) -> ChannelSamples {
        ChannelSamples {
            left: self.compress(&samples.left).into_iter().map(amplitude).collect(),
            right: self.compress(&samples.right).into_iter().map(amplitude).collect(),
        }
    }
}

impl Default for SpectralCompressor {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            ratio: DEFAULT_RATIO,
            planner: FftPlanner::new(),
        }
    }
}

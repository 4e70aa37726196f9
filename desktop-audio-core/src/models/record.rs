use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Per-channel amplitude sequences extracted from one packet.
///
/// Both sequences always have the same length, and every value is in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSamples {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl ChannelSamples {
    pub fn with_capacity(frames: usize) -> Self {
        Self {
            left: Vec::with_capacity(frames),
            right: Vec::with_capacity(frames),
        }
    }

    /// Number of frames (values per channel).
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Alternating `[l0, r0, l1, r1, ...]`.
    pub fn interleaved(&self) -> Vec<f32> {
        self.left
            .iter()
            .zip(&self.right)
            .flat_map(|(&l, &r)| [l, r])
            .collect()
    }
}

/// The record shape written for the default channel-object format.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord<'a> {
    pub left_samples: &'a [f32],
    pub right_samples: &'a [f32],
}

impl<'a> From<&'a ChannelSamples> for ChannelRecord<'a> {
    fn from(samples: &'a ChannelSamples) -> Self {
        Self {
            left_samples: &samples.left,
            right_samples: &samples.right,
        }
    }
}

/// Shape of each emitted line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `{"leftSamples":[...],"rightSamples":[...]}`
    Channels,
    /// `[l0,r0,l1,r1,...]`
    Interleaved,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channels => f.write_str("channels"),
            Self::Interleaved => f.write_str("interleaved"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "channels" => Ok(Self::Channels),
            "interleaved" => Ok(Self::Interleaved),
            other => Err(format!("unknown output format '{other}' (expected 'channels' or 'interleaved')")),
        }
    }
}

use std::ffi::OsString;

use clap::Parser;

use desktop_audio_core::models::config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_SAMPLE_BUDGET};
use desktop_audio_core::{FeedConfiguration, OutputFormat};

/// Long options that may also be spelled with a single dash (`-samples 64`).
const SINGLE_DASH_LONG_FLAGS: [&str; 5] = ["samples", "interval", "compress", "format", "verbose"];

#[derive(Debug, Parser)]
#[command(name = "getdesktopaudio", version)]
#[command(about = "Stream the default output device's loopback amplitudes as JSON lines on stdout")]
pub struct Args {
    /// Total amplitude values per record, split evenly between left and right
    #[arg(long, default_value_t = DEFAULT_SAMPLE_BUDGET, value_parser = clap::value_parser!(u32).range(1..))]
    pub samples: u32,

    /// Milliseconds to wait before polling again when no audio is pending
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Smooth each channel with a spectral soft-knee compressor
    #[arg(long)]
    pub compress: bool,

    /// Record shape: "channels" ({"leftSamples":[..],"rightSamples":[..]})
    /// or "interleaved" ([l0,r0,l1,r1,..])
    #[arg(long, default_value_t = OutputFormat::Channels)]
    pub format: OutputFormat,

    /// Log debug output to stderr (RUST_LOG overrides)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn configuration(&self) -> FeedConfiguration {
        FeedConfiguration {
            sample_budget: self.samples,
            poll_interval_ms: self.interval,
            compression: self.compress,
            output_format: self.format,
        }
    }
}

/// Rewrite `-samples`, `-interval=15` etc. into their `--` forms for clap.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| match arg.to_str() {
            Some(text) if i > 0 && is_single_dash_long(text) => OsString::from(format!("-{}", text)),
            _ => arg,
        })
        .collect()
}

fn is_single_dash_long(arg: &str) -> bool {
    let Some(rest) = arg.strip_prefix('-') else {
        return false;
    };
    if rest.starts_with('-') {
        return false;
    }
    let name = rest.split('=').next().unwrap_or(rest);
    SINGLE_DASH_LONG_FLAGS.contains(&name)
}

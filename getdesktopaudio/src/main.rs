mod cli;

use anyhow::{Context, Result};
use clap::Parser;

use desktop_audio_core::FeedConfiguration;

fn main() -> Result<()> {
    let args = cli::Args::parse_from(cli::normalize_args(std::env::args_os()));
    init_logging(args.verbose);

    let config = args.configuration();
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    run(config)
}

/// Logs go to stderr; stdout carries the records.
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();
}

#[cfg(target_os = "windows")]
fn run(config: FeedConfiguration) -> Result<()> {
    use desktop_audio_core::{CaptureLoop, RecordEmitter};
    use desktop_audio_windows::{ComApartment, WasapiLoopbackStream};

    // Declared first so COM outlives the stream
    let com = ComApartment::initialize().context("failed to initialize COM")?;
    let stream =
        WasapiLoopbackStream::open_default(&com).context("failed to open loopback capture on the default output device")?;

    let emitter = RecordEmitter::stdout(config.output_format);
    let capture = CaptureLoop::new(stream, emitter, config)?;

    let handle = capture.handle();
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, stopping capture");
        handle.request_stop();
    })
    .context("failed to set Ctrl+C handler")?;

    let diagnostics = capture.run().context("loopback capture ended with an error")?;
    log::debug!("Final diagnostics: {:?}", diagnostics);
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn run(_config: FeedConfiguration) -> Result<()> {
    anyhow::bail!("loopback capture requires Windows")
}

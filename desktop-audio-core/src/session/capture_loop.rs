use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::config::FeedConfiguration;
use crate::models::error::FeedError;
use crate::models::state::{LoopDiagnostics, LoopState};
use crate::output::emitter::RecordEmitter;
use crate::processing::compressor::SpectralCompressor;
use crate::processing::extractor::extract;
use crate::processing::frame_reader::poll_packet;
use crate::traits::loop_delegate::LoopDelegate;
use crate::traits::packet_stream::PacketStream;

/// State shared between the loop thread and its handles.
struct SharedState {
    state: LoopState,
    diagnostics: LoopDiagnostics,
}

/// Cloneable control handle for a [`CaptureLoop`].
///
/// Safe to use from any thread, including a Ctrl+C handler.
#[derive(Clone)]
pub struct LoopHandle {
    stop: Arc<AtomicBool>,
    shared: Arc<Mutex<SharedState>>,
}

impl LoopHandle {
    fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            shared: Arc::new(Mutex::new(SharedState {
                state: LoopState::Idle,
                diagnostics: LoopDiagnostics::default(),
            })),
        }
    }

    /// Ask the loop to stop. Takes effect within one poll interval.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> LoopState {
        self.shared.lock().state.clone()
    }

    pub fn diagnostics(&self) -> LoopDiagnostics {
        self.shared.lock().diagnostics.clone()
    }

    fn set_state(&self, state: LoopState) {
        self.shared.lock().state = state;
    }

    fn update(&self, f: impl FnOnce(&mut LoopDiagnostics)) {
        f(&mut self.shared.lock().diagnostics);
    }
}

enum PollOutcome {
    /// A record went out; more packets may be queued.
    Emitted,
    /// Nothing pending, or nothing to emit from what was pending.
    Idle,
}

/// Drives a [`PacketStream`] through extraction, optional compression and
/// emission until stopped.
///
/// Data flow per packet:
/// ```text
/// [PacketStream] → [PacketGuard] → extract → (SpectralCompressor) → [RecordEmitter]
/// ```
///
/// The loop owns the stream. Stop is issued once when the loop leaves the
/// running state, and the stream is dropped when `run` returns.
pub struct CaptureLoop<S: PacketStream, W: Write> {
    stream: S,
    emitter: RecordEmitter<W>,
    config: FeedConfiguration,
    compressor: Option<SpectralCompressor>,
    handle: LoopHandle,
    delegate: Option<Arc<dyn LoopDelegate>>,
}

impl<S: PacketStream, W: Write> CaptureLoop<S, W> {
    pub fn new(stream: S, emitter: RecordEmitter<W>, config: FeedConfiguration) -> Result<Self, FeedError> {
        config.validate().map_err(FeedError::InvalidConfiguration)?;

        if config.frames_per_record() == 0 {
            log::warn!(
                "Sample budget {} leaves no room for a stereo frame; no records will be emitted",
                config.sample_budget
            );
        }

        let compressor = config.compression.then(SpectralCompressor::default);

        Ok(Self {
            stream,
            emitter,
            config,
            compressor,
            handle: LoopHandle::new(),
            delegate: None,
        })
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn LoopDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> LoopState {
        self.handle.state()
    }

    /// Run until a stop request or a fatal error.
    ///
    /// Transitions: idle → running → stopped, or → failed on a fatal error.
    /// Returns the final counters on a clean stop.
    pub fn run(mut self) -> Result<LoopDiagnostics, FeedError> {
        if self.handle.is_stop_requested() {
            self.set_state(LoopState::Stopped);
            return Ok(self.handle.diagnostics());
        }

        log::info!(
            "Starting loopback capture on {} (budget {}, interval {}ms, compression {})",
            self.stream.device_name(),
            self.config.sample_budget,
            self.config.poll_interval_ms,
            if self.compressor.is_some() { "on" } else { "off" },
        );

        if let Err(e) = self.stream.start() {
            self.notify_error(&e);
            self.set_state(LoopState::Failed(e.clone()));
            return Err(e);
        }
        self.set_state(LoopState::Running);

        let outcome = self.capture();

        if let Err(e) = self.stream.stop() {
            log::warn!("Failed to stop loopback stream: {}", e);
            self.notify_error(&e);
        }

        let diagnostics = self.handle.diagnostics();
        match outcome {
            Ok(()) => {
                log::info!(
                    "Capture stopped: {} records from {} packets ({} skipped, {} transient errors)",
                    diagnostics.records_emitted,
                    diagnostics.packets,
                    diagnostics.packets_skipped,
                    diagnostics.transient_errors,
                );
                self.set_state(LoopState::Stopped);
                Ok(diagnostics)
            }
            Err(e) => {
                log::error!("Capture failed after {} records: {}", diagnostics.records_emitted, e);
                self.set_state(LoopState::Failed(e.clone()));
                Err(e)
            }
        }
    }

    // --- Internal helpers ---

    fn capture(&mut self) -> Result<(), FeedError> {
        let interval = self.config.poll_interval();

        while !self.handle.is_stop_requested() {
            match self.poll_once() {
                // Drain queued packets without sleeping
                Ok(PollOutcome::Emitted) => continue,
                Ok(PollOutcome::Idle) => {}
                Err(e) if e.is_fatal() => {
                    self.notify_error(&e);
                    return Err(e);
                }
                Err(e) => {
                    log::warn!("Skipping packet: {}", e);
                    self.handle.update(|d| d.transient_errors += 1);
                    self.notify_error(&e);
                }
            }

            if self.handle.is_stop_requested() {
                break;
            }
            thread::sleep(interval);
        }
        Ok(())
    }

    /// One poll: acquire, extract, release, then compress and emit.
    fn poll_once(&mut self) -> Result<PollOutcome, FeedError> {
        self.handle.update(|d| d.polls += 1);

        let Some(guard) = poll_packet(&mut self.stream)? else {
            return Ok(PollOutcome::Idle);
        };

        let header = *guard.header();
        self.handle.update(|d| {
            d.packets += 1;
            d.frames_captured += header.frames as u64;
            if header.discontinuity {
                d.discontinuities += 1;
            }
        });
        if header.discontinuity {
            log::debug!("Data discontinuity before {}-frame packet", header.frames);
        }

        if header.frames == 0 {
            self.handle.update(|d| d.empty_packets += 1);
            guard.release()?;
            return Ok(PollOutcome::Idle);
        }

        // The guard releases on every early return below
        let samples = match guard.packet() {
            Ok(packet) => extract(&packet, self.config.sample_budget),
            Err(e) => {
                self.handle.update(|d| d.packets_skipped += 1);
                return Err(e);
            }
        };
        guard
            .release()
            .inspect_err(|_| self.handle.update(|d| d.packets_skipped += 1))?;

        if samples.is_empty() {
            return Ok(PollOutcome::Idle);
        }

        let samples = match self.compressor.as_mut() {
            Some(compressor) => compressor.compress_channels(&samples),
            None => samples,
        };

        self.emitter
            .emit(&samples)
            .inspect_err(|_| self.handle.update(|d| d.packets_skipped += 1))?;
        self.handle.update(|d| d.records_emitted += 1);
        Ok(PollOutcome::Emitted)
    }

    fn set_state(&self, state: LoopState) {
        self.handle.set_state(state.clone());
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(&state);
        }
    }

    fn notify_error(&self, error: &FeedError) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::models::record::OutputFormat;
    use crate::testing::{FailingWriter, ScriptedStream, SharedBuffer, Step};

    fn config(sample_budget: u32, poll_interval_ms: u64) -> FeedConfiguration {
        FeedConfiguration {
            sample_budget,
            poll_interval_ms,
            ..Default::default()
        }
    }

    /// Build a loop that stops itself once the script runs out.
    fn scripted_loop<W: Write>(
        steps: Vec<Step>,
        writer: W,
        config: FeedConfiguration,
    ) -> (CaptureLoop<ScriptedStream, W>, Arc<Mutex<crate::testing::StreamLog>>) {
        let (stream, log) = ScriptedStream::new(steps);
        let emitter = RecordEmitter::new(writer, config.output_format);
        let capture = CaptureLoop::new(stream, emitter, config).unwrap();
        log.lock().stop_when_exhausted = Some(capture.handle());
        (capture, log)
    }

    #[derive(Default)]
    struct RecordingDelegate {
        states: Mutex<Vec<LoopState>>,
        errors: Mutex<Vec<FeedError>>,
    }

    impl LoopDelegate for RecordingDelegate {
        fn on_state_changed(&self, state: &LoopState) {
            self.states.lock().push(state.clone());
        }

        fn on_error(&self, error: &FeedError) {
            self.errors.lock().push(error.clone());
        }
    }

    #[test]
    fn budget_four_packet_end_to_end() {
        let out = SharedBuffer::default();
        let (capture, log) = scripted_loop(
            vec![Step::stereo(&[0.2, -0.3, 0.9, -1.2, -0.05, 0.05])],
            out.clone(),
            config(4, 1),
        );

        let diagnostics = capture.run().unwrap();

        let lines = out.lines();
        assert_eq!(lines.len(), 1);
        let record: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        let left: Vec<f64> = record["leftSamples"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect();
        let right: Vec<f64> = record["rightSamples"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect();
        assert_eq!(left, vec![0.2, 0.9]);
        assert_eq!(right, vec![0.3, 1.0]);

        assert_eq!(diagnostics.records_emitted, 1);
        assert_eq!(diagnostics.frames_captured, 3);
        assert_eq!(log.lock().releases, vec![3]);
    }

    #[test]
    fn empty_packets_emit_nothing() {
        let out = SharedBuffer::default();
        let (capture, log) = scripted_loop(vec![Step::empty(), Step::Nothing, Step::empty()], out.clone(), config(64, 1));

        let diagnostics = capture.run().unwrap();

        assert!(out.lines().is_empty());
        assert_eq!(diagnostics.empty_packets, 2);
        assert_eq!(diagnostics.records_emitted, 0);
        assert_eq!(log.lock().releases, vec![0, 0]);
    }

    #[test]
    fn budget_below_one_frame_emits_nothing() {
        let out = SharedBuffer::default();
        let (capture, log) = scripted_loop(vec![Step::stereo(&[0.5, 0.5])], out.clone(), config(1, 1));

        capture.run().unwrap();

        assert!(out.lines().is_empty());
        assert_eq!(log.lock().releases, vec![1]);
    }

    #[test]
    fn every_acquired_packet_is_released_once_despite_errors() {
        let out = SharedBuffer::default();
        let (capture, log) = scripted_loop(
            vec![
                Step::stereo(&[0.1, 0.1]),
                Step::Malformed { frames: 8 },
                Step::stereo(&[0.2, 0.2]),
                Step::Fail(FeedError::PacketTransfer("GetBuffer failed".into())),
                Step::stereo(&[0.3, 0.3]),
            ],
            out.clone(),
            config(64, 1),
        );

        let diagnostics = capture.run().unwrap();

        let log = log.lock();
        assert_eq!(log.releases, vec![1, 8, 1, 1]);
        assert!(!log.protocol_violation);
        assert_eq!(out.lines().len(), 3);
        assert_eq!(diagnostics.transient_errors, 2);
        assert_eq!(diagnostics.packets_skipped, 1);
    }

    #[test]
    fn release_failure_is_transient() {
        let out = SharedBuffer::default();
        let (capture, log) = scripted_loop(
            vec![Step::stereo(&[0.1, 0.1]), Step::stereo(&[0.2, 0.2])],
            out.clone(),
            config(64, 1),
        );
        log.lock().fail_next_release = Some(FeedError::PacketTransfer("ReleaseBuffer failed".into()));

        let diagnostics = capture.run().unwrap();

        assert_eq!(log.lock().releases, vec![1, 1]);
        assert_eq!(out.lines().len(), 1);
        assert_eq!(diagnostics.transient_errors, 1);
    }

    #[test]
    fn emit_errors_do_not_abort_the_loop() {
        let (capture, log) = scripted_loop(
            vec![Step::stereo(&[0.1, 0.1]), Step::stereo(&[0.2, 0.2])],
            FailingWriter(io::ErrorKind::Other),
            config(64, 1),
        );

        let diagnostics = capture.run().unwrap();

        assert_eq!(log.lock().releases, vec![1, 1]);
        assert_eq!(diagnostics.records_emitted, 0);
        assert_eq!(diagnostics.transient_errors, 2);
    }

    #[test]
    fn device_invalidation_stops_and_releases_once() {
        let out = SharedBuffer::default();
        let (mut capture, log) = scripted_loop(
            vec![
                Step::stereo(&[0.1, 0.1]),
                Step::Fail(FeedError::DeviceInvalidated),
                Step::stereo(&[0.2, 0.2]),
            ],
            out.clone(),
            config(64, 1),
        );
        let delegate = Arc::new(RecordingDelegate::default());
        capture.set_delegate(delegate.clone());
        let handle = capture.handle();

        assert_eq!(capture.run().unwrap_err(), FeedError::DeviceInvalidated);

        let log = log.lock();
        assert_eq!(log.acquires, 2);
        assert_eq!(log.stops, 1);
        assert_eq!(log.drops, 1);
        assert_eq!(out.lines().len(), 1);
        assert_eq!(handle.state(), LoopState::Failed(FeedError::DeviceInvalidated));
        assert_eq!(*delegate.errors.lock(), vec![FeedError::DeviceInvalidated]);
    }

    #[test]
    fn closed_consumer_is_fatal() {
        let (capture, log) = scripted_loop(
            vec![Step::stereo(&[0.1, 0.1]), Step::stereo(&[0.2, 0.2])],
            FailingWriter(io::ErrorKind::BrokenPipe),
            config(64, 1),
        );

        assert_eq!(capture.run().unwrap_err(), FeedError::ConsumerClosed);

        let log = log.lock();
        assert_eq!(log.releases, vec![1]);
        assert_eq!(log.stops, 1);
        assert_eq!(log.drops, 1);
    }

    #[test]
    fn state_moves_idle_running_stopped() {
        let (mut capture, log) = scripted_loop(vec![Step::Nothing], SharedBuffer::default(), config(64, 1));
        let delegate = Arc::new(RecordingDelegate::default());
        capture.set_delegate(delegate.clone());
        assert!(capture.state().is_idle());
        let handle = capture.handle();

        capture.run().unwrap();

        assert_eq!(*delegate.states.lock(), vec![LoopState::Running, LoopState::Stopped]);
        assert!(handle.state().is_terminal());
        let log = log.lock();
        assert_eq!((log.starts, log.stops, log.drops), (1, 1, 1));
    }

    #[test]
    fn start_failure_fails_without_stop() {
        let (capture, log) = scripted_loop(vec![], SharedBuffer::default(), config(64, 1));
        log.lock().fail_start = Some(FeedError::DeviceNotAvailable);
        let handle = capture.handle();

        assert_eq!(capture.run().unwrap_err(), FeedError::DeviceNotAvailable);

        assert_eq!(handle.state(), LoopState::Failed(FeedError::DeviceNotAvailable));
        let log = log.lock();
        assert_eq!((log.starts, log.stops, log.drops), (1, 0, 1));
    }

    #[test]
    fn stop_before_run_never_starts_stream() {
        let (capture, log) = scripted_loop(vec![Step::stereo(&[0.1, 0.1])], SharedBuffer::default(), config(64, 1));
        let handle = capture.handle();
        handle.request_stop();

        capture.run().unwrap();

        assert_eq!(handle.state(), LoopState::Stopped);
        let log = log.lock();
        assert_eq!((log.starts, log.acquires, log.drops), (0, 0, 1));
    }

    #[test]
    fn queued_packets_drain_without_sleeping() {
        let out = SharedBuffer::default();
        let (capture, _log) = scripted_loop(
            vec![
                Step::stereo(&[0.1, 0.1]),
                Step::stereo(&[0.2, 0.2]),
                Step::stereo(&[0.3, 0.3]),
            ],
            out.clone(),
            config(64, 5_000),
        );

        let started = Instant::now();
        capture.run().unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(out.lines().len(), 3);
    }

    #[test]
    fn stop_request_ends_loop_within_one_interval() {
        let (stream, log) = ScriptedStream::new(vec![]);
        let emitter = RecordEmitter::new(SharedBuffer::default(), OutputFormat::Channels);
        let capture = CaptureLoop::new(stream, emitter, config(64, 20)).unwrap();
        let handle = capture.handle();

        let worker = thread::spawn(move || capture.run());
        thread::sleep(Duration::from_millis(60));
        assert!(handle.state().is_running());

        let requested = Instant::now();
        handle.request_stop();
        let diagnostics = worker.join().unwrap().unwrap();

        assert!(requested.elapsed() < Duration::from_millis(500));
        assert!(diagnostics.polls >= 2);
        assert_eq!(handle.state(), LoopState::Stopped);
        let log = log.lock();
        assert_eq!((log.stops, log.drops), (1, 1));
        assert!(log.releases.is_empty());
    }

    #[test]
    fn compression_is_applied_when_enabled() {
        let out = SharedBuffer::default();
        let config = FeedConfiguration {
            sample_budget: 16,
            poll_interval_ms: 1,
            compression: true,
            output_format: OutputFormat::Interleaved,
        };
        let (capture, _log) = scripted_loop(vec![Step::stereo(&[0.9; 16])], out.clone(), config);

        capture.run().unwrap();

        let lines = out.lines();
        assert_eq!(lines.len(), 1);
        let values: Vec<f32> = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(values.len(), 16);
        for value in values {
            approx::assert_relative_eq!(value, 2.175 / 8.0, max_relative = 1e-4);
        }
    }

    #[test]
    fn rejects_invalid_configuration() {
        let (stream, _log) = ScriptedStream::new(vec![]);
        let emitter = RecordEmitter::new(SharedBuffer::default(), OutputFormat::Channels);

        let result = CaptureLoop::new(stream, emitter, config(64, 0));

        assert!(matches!(result, Err(FeedError::InvalidConfiguration(_))));
    }
}

//! WASAPI loopback stream for the default render endpoint.
//!
//! Captures the mix going to the default output device using
//! `AUDCLNT_STREAMFLAGS_LOOPBACK` in shared mode. No special permissions
//! are needed on Windows. DRM-protected audio is silenced by the OS.
//!
//! The stream is polled, not event driven: `GetNextPacketSize` tells us
//! whether a packet is pending, `GetBuffer`/`ReleaseBuffer` bracket each
//! packet.

use std::marker::PhantomData;
use std::ptr;

use windows::core::{GUID, PCWSTR};
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use desktop_audio_core::models::error::FeedError;
use desktop_audio_core::models::packet::{PacketHeader, SampleFormat};
use desktop_audio_core::traits::packet_stream::PacketStream;

use crate::com::ComApartment;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Engine buffer requested at initialize: 100ms in 100ns units.
const BUFFER_DURATION_HNS: i64 = 1_000_000;

/// Mix format allocated by `GetMixFormat`, freed with `CoTaskMemFree`.
struct MixFormat(*mut WAVEFORMATEX);

impl Drop for MixFormat {
    fn drop(&mut self) {
        unsafe {
            CoTaskMemFree(Some(self.0 as *const _));
        }
    }
}

/// Packet currently held between `GetBuffer` and `ReleaseBuffer`.
struct HeldPacket {
    data: *const u8,
    len: usize,
}

/// Loopback capture stream on the default render device.
///
/// Borrows the [`ComApartment`] it was opened under so it cannot outlive
/// COM. Dropping the stream stops it if needed, releases any held packet
/// and frees the COM interfaces and mix format.
pub struct WasapiLoopbackStream<'com> {
    device_name: String,
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    _mix_format: MixFormat,
    channels: u16,
    format: SampleFormat,
    sample_rate: u32,
    started: bool,
    mmcss: Option<HANDLE>,
    held: Option<HeldPacket>,
    _com: PhantomData<&'com ComApartment>,
}

impl<'com> WasapiLoopbackStream<'com> {
    /// Open a loopback stream on the default render endpoint in its mix format.
    ///
    /// Sequence:
    /// 1. Get default render endpoint (not capture: loopback reads from render)
    /// 2. Activate IAudioClient
    /// 3. Read and validate the mix format
    /// 4. Initialize with LOOPBACK flag in shared mode
    /// 5. Get IAudioCaptureClient
    pub fn open_default(_com: &'com ComApartment) -> Result<Self, FeedError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(|e| {
                    FeedError::ConfigurationFailed(format!("failed to create device enumerator: {}", e))
                })?;

            let device = enumerator
                .GetDefaultAudioEndpoint(eRender, eConsole)
                .map_err(|_| FeedError::DeviceNotAvailable)?;

            let device_id = match device.GetId() {
                Ok(id) => {
                    let text = id.to_string().unwrap_or_default();
                    CoTaskMemFree(Some(id.0 as *const _));
                    text
                }
                Err(e) => {
                    log::warn!("Could not read endpoint id: {}", e);
                    String::new()
                }
            };

            let audio_client: IAudioClient = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| FeedError::ConfigurationFailed(format!("Activate failed: {}", e)))?;

            let mix_format = MixFormat(
                audio_client
                    .GetMixFormat()
                    .map_err(|e| FeedError::ConfigurationFailed(format!("GetMixFormat failed: {}", e)))?,
            );

            let (channels, sample_rate, format) = describe_mix_format(mix_format.0)?;

            audio_client
                .Initialize(
                    AUDCLNT_SHAREMODE_SHARED,
                    AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
                    BUFFER_DURATION_HNS,
                    0,
                    mix_format.0,
                    None,
                )
                .map_err(|e| {
                    FeedError::ConfigurationFailed(format!("IAudioClient::Initialize (loopback) failed: {}", e))
                })?;

            let capture_client: IAudioCaptureClient = audio_client
                .GetService()
                .map_err(|e| FeedError::ConfigurationFailed(format!("GetService failed: {}", e)))?;

            log::info!(
                "Opened loopback on {} ({} Hz, {} ch, {:?})",
                if device_id.is_empty() { "default render endpoint" } else { device_id.as_str() },
                sample_rate,
                channels,
                format
            );

            Ok(Self {
                device_name: "System Audio (Loopback)".into(),
                audio_client,
                capture_client,
                _mix_format: mix_format,
                channels,
                format,
                sample_rate,
                started: false,
                mmcss: None,
                held: None,
                _com: PhantomData,
            })
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.format
    }
}

impl PacketStream for WasapiLoopbackStream<'_> {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn start(&mut self) -> Result<(), FeedError> {
        if self.started {
            return Err(FeedError::ConfigurationFailed("loopback stream already started".into()));
        }

        unsafe {
            // MMCSS registration for real-time priority, best effort
            let mut task_index: u32 = 0;
            let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
            match AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index) {
                Ok(handle) => self.mmcss = Some(handle),
                Err(e) => log::debug!("MMCSS registration failed: {}", e),
            }

            if let Err(e) = self.audio_client.Start() {
                if let Some(handle) = self.mmcss.take() {
                    let _ = AvRevertMmThreadCharacteristics(handle);
                }
                return Err(stream_error("IAudioClient::Start", e));
            }
        }
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), FeedError> {
        if !self.started {
            return Ok(());
        }
        self.started = false;

        unsafe {
            if let Some(handle) = self.mmcss.take() {
                let _ = AvRevertMmThreadCharacteristics(handle);
            }
            self.audio_client
                .Stop()
                .map_err(|e| stream_error("IAudioClient::Stop", e))
        }
    }

    fn acquire_packet(&mut self) -> Result<Option<PacketHeader>, FeedError> {
        if self.held.is_some() {
            return Err(FeedError::PacketTransfer("previous packet was not released".into()));
        }

        unsafe {
            let pending = self
                .capture_client
                .GetNextPacketSize()
                .map_err(|e| stream_error("GetNextPacketSize", e))?;
            if pending == 0 {
                return Ok(None);
            }

            let mut buffer_ptr: *mut u8 = ptr::null_mut();
            let mut num_frames: u32 = 0;
            let mut flags: u32 = 0;

            self.capture_client
                .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                .map_err(|e| stream_error("GetBuffer", e))?;

            let header = PacketHeader {
                frames: num_frames,
                channels: self.channels,
                format: self.format,
                silent: flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0,
                discontinuity: flags & (AUDCLNT_BUFFERFLAGS_DATA_DISCONTINUITY.0 as u32) != 0,
            };

            let len = if buffer_ptr.is_null() {
                0
            } else {
                num_frames as usize * header.bytes_per_frame()
            };
            self.held = Some(HeldPacket {
                data: buffer_ptr,
                len,
            });

            Ok(Some(header))
        }
    }

    fn packet_bytes(&self) -> &[u8] {
        match &self.held {
            // SAFETY: the buffer stays valid until ReleaseBuffer, and release
            // needs `&mut self`, which cannot coexist with this borrow.
            Some(held) if held.len > 0 => unsafe { std::slice::from_raw_parts(held.data, held.len) },
            _ => &[],
        }
    }

    fn release_packet(&mut self, frames: u32) -> Result<(), FeedError> {
        self.held = None;
        unsafe {
            self.capture_client
                .ReleaseBuffer(frames)
                .map_err(|e| stream_error("ReleaseBuffer", e))
        }
    }
}

impl Drop for WasapiLoopbackStream<'_> {
    fn drop(&mut self) {
        if self.held.is_some() {
            log::warn!("Dropping loopback stream with a packet still held");
            self.held = None;
        }
        if self.started {
            if let Err(e) = self.stop() {
                log::warn!("Failed to stop loopback stream on drop: {}", e);
            }
        }
        log::debug!("Loopback stream released");
    }
}

/// Map a capture call failure, singling out device loss.
fn stream_error(operation: &str, e: windows::core::Error) -> FeedError {
    if e.code() == AUDCLNT_E_DEVICE_INVALIDATED {
        FeedError::DeviceInvalidated
    } else {
        FeedError::PacketTransfer(format!("{} failed: {}", operation, e))
    }
}

/// Channels, sample rate and sample format of a mix format.
unsafe fn describe_mix_format(format_ptr: *const WAVEFORMATEX) -> Result<(u16, u32, SampleFormat), FeedError> {
    let format = &*format_ptr;
    let channels = format.nChannels;
    let sample_rate = format.nSamplesPerSec;
    let bits = format.wBitsPerSample;
    let mut tag = format.wFormatTag;

    if tag == WAVE_FORMAT_EXTENSIBLE && format.cbSize >= 22 {
        let extensible = format_ptr as *const WAVEFORMATEXTENSIBLE;
        let sub_format: GUID = ptr::addr_of!((*extensible).SubFormat).read_unaligned();
        tag = subformat_tag(&sub_format);
    }

    Ok((channels, sample_rate, sample_format(tag, bits)?))
}

/// KSDATAFORMAT_SUBTYPE_* GUIDs embed the plain format tag in `data1`.
fn subformat_tag(sub_format: &GUID) -> u16 {
    sub_format.data1 as u16
}

fn sample_format(tag: u16, bits: u16) -> Result<SampleFormat, FeedError> {
    match (tag, bits) {
        (WAVE_FORMAT_IEEE_FLOAT, 32) => Ok(SampleFormat::Float32),
        (WAVE_FORMAT_PCM, 16) => Ok(SampleFormat::Int16),
        _ => Err(FeedError::UnsupportedFormat(format!(
            "format tag {:#06x} with {} bits per sample",
            tag, bits
        ))),
    }
}

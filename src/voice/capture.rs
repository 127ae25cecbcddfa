//! Microphone capture.
//!
//! [`AudioCapture`] is the seam the orchestrator drives; [`CpalCapture`] is
//! the device implementation. The cpal stream is `!Send`, so it lives on a
//! dedicated thread that owns it until told to stop.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::error::{VoiceError, VoiceResult};
use super::pcm::{AudioFrame, Resampler};

/// A source of microphone frames.
pub trait AudioCapture: Send {
    /// Take exclusive hold of the input device.
    fn acquire(&mut self) -> VoiceResult<()>;

    /// Start pushing frames into `frames`. Requires a prior [`acquire`](Self::acquire).
    fn start(&mut self, frames: mpsc::UnboundedSender<AudioFrame>) -> VoiceResult<()>;

    /// Release the device. Calling it again, or without a prior acquire, is a no-op.
    fn stop(&mut self) -> VoiceResult<()>;
}

/// Capture configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Rate of the frames handed to the transport.
    pub sample_rate: u32,
    /// Samples per emitted frame.
    pub block_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: super::SAMPLE_RATE,
            block_size: super::BLOCK_SIZE,
        }
    }
}

type FrameSlot = Arc<Mutex<Option<mpsc::UnboundedSender<AudioFrame>>>>;

/// Cuts mono f32 input into fixed-size PCM16 frames at the target rate.
struct FrameAssembler {
    resampler: Resampler,
    scratch: Vec<f32>,
    pending: Vec<f32>,
    block_size: usize,
    sample_rate: u32,
}

impl FrameAssembler {
    fn new(device_rate: u32, config: &CaptureConfig) -> Self {
        Self {
            resampler: Resampler::new(device_rate, config.sample_rate),
            scratch: Vec::new(),
            pending: Vec::with_capacity(config.block_size * 2),
            block_size: config.block_size.max(1),
            sample_rate: config.sample_rate,
        }
    }

    fn push(&mut self, mono: &[f32], mut emit: impl FnMut(AudioFrame)) {
        self.scratch.clear();
        self.resampler.process(mono, &mut self.scratch);
        self.pending.extend_from_slice(&self.scratch);

        while self.pending.len() >= self.block_size {
            let block: Vec<f32> = self.pending.drain(..self.block_size).collect();
            emit(AudioFrame::from_f32(&block, self.sample_rate));
        }
    }
}

struct CaptureThread {
    stop_tx: std_mpsc::Sender<()>,
    slot: FrameSlot,
    thread: Option<JoinHandle<()>>,
}

/// Default-input-device capture via cpal.
pub struct CpalCapture {
    config: CaptureConfig,
    running: Option<CaptureThread>,
}

impl CpalCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            running: None,
        }
    }

    /// Names of all input devices on the default host.
    pub fn list_input_devices() -> VoiceResult<Vec<String>> {
        let host = cpal::default_host();
        Ok(host
            .input_devices()?
            .filter_map(|device| device.name().ok())
            .collect())
    }
}

impl AudioCapture for CpalCapture {
    fn acquire(&mut self) -> VoiceResult<()> {
        if self.running.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<VoiceResult<()>>();
        let slot: FrameSlot = Arc::new(Mutex::new(None));
        let thread_slot = Arc::clone(&slot);
        let config = self.config.clone();

        let thread = std::thread::Builder::new()
            .name("suzanne-capture".into())
            .spawn(move || {
                let stream = match open_input_stream(&config, thread_slot) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive until stop; it is dropped on exit.
                match stop_rx.recv() {
                    Ok(()) => debug!("capture thread received stop signal"),
                    Err(_) => debug!("capture stop channel closed"),
                }
                drop(stream);
                info!("microphone released");
            })
            .map_err(|e| VoiceError::DeviceUnavailable(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                return Err(VoiceError::DeviceUnavailable(
                    "capture thread exited before the stream opened".into(),
                ))
            }
        }

        self.running = Some(CaptureThread {
            stop_tx,
            slot,
            thread: Some(thread),
        });
        Ok(())
    }

    fn start(&mut self, frames: mpsc::UnboundedSender<AudioFrame>) -> VoiceResult<()> {
        let running = self.running.as_ref().ok_or_else(|| {
            VoiceError::DeviceUnavailable("microphone not acquired".into())
        })?;
        *running.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(frames);
        info!(
            sample_rate = self.config.sample_rate,
            block_size = self.config.block_size,
            "microphone streaming"
        );
        Ok(())
    }

    fn stop(&mut self) -> VoiceResult<()> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };

        running
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if running.stop_tx.send(()).is_err() {
            // Thread already gone: the stream died on its own.
            warn!("capture thread exited before stop");
        }
        // The thread only waits on the stop channel, so this join is short.
        if let Some(thread) = running.thread.take() {
            if thread.join().is_err() {
                return Err(VoiceError::DeviceUnavailable("capture thread panicked".into()));
            }
        }
        Ok(())
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn open_input_stream(config: &CaptureConfig, slot: FrameSlot) -> VoiceResult<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| VoiceError::DeviceUnavailable("no input device available".into()))?;

    info!(
        device = %device.name().unwrap_or_else(|_| "unknown".into()),
        "using input device"
    );

    let supported = device.default_input_config()?;
    let sample_format = supported.sample_format();
    let stream_config: StreamConfig = supported.into();

    macro_rules! build {
        ($sample:ty, $convert:expr) => {
            build_input_stream::<$sample, _>(&device, &stream_config, config, slot, $convert)
        };
    }

    let stream = match sample_format {
        SampleFormat::F32 => build!(f32, |s: f32| s),
        SampleFormat::I16 => build!(i16, |s: i16| s as f32 / i16::MAX as f32),
        SampleFormat::I32 => build!(i32, |s: i32| s as f32 / i32::MAX as f32),
        SampleFormat::U16 => build!(u16, |s: u16| (s as f32 - 32768.0) / 32767.0),
        other => Err(VoiceError::DeviceUnavailable(format!(
            "unsupported input sample format: {other:?}"
        ))),
    }?;

    stream.play()?;
    Ok(stream)
}

fn build_input_stream<T, F>(
    device: &cpal::Device,
    stream_config: &StreamConfig,
    config: &CaptureConfig,
    slot: FrameSlot,
    convert: F,
) -> VoiceResult<cpal::Stream>
where
    T: SizedSample + Send + 'static,
    F: Fn(T) -> f32 + Send + 'static,
{
    let channels = stream_config.channels.max(1) as usize;
    let mut assembler = FrameAssembler::new(stream_config.sample_rate.0, config);
    let mut mono = Vec::new();

    let stream = device.build_input_stream(
        stream_config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(frames) = guard.as_ref() else {
                // Acquired but not streaming yet.
                return;
            };

            mono.clear();
            mono.extend(data.chunks(channels).map(|frame| convert(frame[0])));
            assembler.push(&mono, |frame| {
                if frames.send(frame).is_err() {
                    debug!("frame receiver dropped");
                }
            });
        },
        |err| error!(error = %err, "input stream error"),
        None,
    )?;

    Ok(stream)
}

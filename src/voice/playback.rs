//! Ordered playback of model audio.
//!
//! [`PlaybackQueue`] plays chunks strictly in arrival order, one at a time,
//! and can be flushed mid-stream when the user barges in. The actual output
//! goes through an [`AudioSink`]; [`CpalSink`] drives the default speaker.

use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use super::error::{VoiceError, VoiceResult};
use super::pcm::{PlaybackChunk, Resampler};

/// Somewhere to send decoded audio. `play` resolves once the sink has
/// taken the whole chunk and is ready for the next one.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, samples: Vec<f32>, sample_rate: u32) -> VoiceResult<()>;
}

struct QueueState {
    pending: VecDeque<PlaybackChunk>,
    playing: bool,
    /// Bumped on every flush. A drain task only plays while its generation
    /// is current.
    generation: u64,
}

struct QueueShared {
    sink: Arc<dyn AudioSink>,
    state: Mutex<QueueState>,
    /// Held for the duration of one `sink.play`. At most one chunk sounds at a time.
    gate: tokio::sync::Mutex<()>,
    playing_tx: watch::Sender<bool>,
}

/// FIFO of model audio with a single drain task.
#[derive(Clone)]
pub struct PlaybackQueue {
    shared: Arc<QueueShared>,
}

impl PlaybackQueue {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        let (playing_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(QueueShared {
                sink,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    playing: false,
                    generation: 0,
                }),
                gate: tokio::sync::Mutex::new(()),
                playing_tx,
            }),
        }
    }

    /// Append a chunk. Starts the drain task if nothing is playing.
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, chunk: PlaybackChunk) {
        if chunk.is_empty() {
            return;
        }

        let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending.push_back(chunk);
        if state.playing {
            return;
        }

        state.playing = true;
        self.shared.playing_tx.send_replace(true);
        let generation = state.generation;
        drop(state);

        tokio::spawn(drain_loop(Arc::clone(&self.shared), generation));
    }

    /// Drop everything not yet played and return how many chunks were dropped.
    /// The chunk currently sounding, if any, is allowed to finish.
    pub fn flush(&self) -> usize {
        let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.pending.is_empty() && !state.playing {
            return 0;
        }

        let dropped = state.pending.len();
        state.pending.clear();
        state.playing = false;
        state.generation = state.generation.wrapping_add(1);
        self.shared.playing_tx.send_replace(false);
        drop(state);

        debug!(dropped, "playback flushed");
        dropped
    }

    pub fn is_playing(&self) -> bool {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .playing
    }

    /// Chunks waiting behind the one currently playing.
    pub fn pending(&self) -> usize {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }

    /// Resolve once the queue has drained or been flushed.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.playing_tx.subscribe();
        // Sender lives in `shared`, which we hold, so this cannot fail.
        let _ = rx.wait_for(|playing| !*playing).await;
    }
}

async fn drain_loop(shared: Arc<QueueShared>, generation: u64) {
    loop {
        let chunk = {
            let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.generation != generation {
                return;
            }
            match state.pending.pop_front() {
                Some(chunk) => chunk,
                None => {
                    state.playing = false;
                    shared.playing_tx.send_replace(false);
                    return;
                }
            }
        };

        let _gate = shared.gate.lock().await;

        // A flush may have landed while we waited for the previous chunk.
        let current = shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generation;
        if current != generation {
            return;
        }

        if let Err(e) = shared.sink.play(chunk.to_f32(), chunk.sample_rate()).await {
            warn!(error = %e, samples = chunk.len(), "failed to play chunk");
        }
    }
}

/// Extra wait beyond the nominal chunk length before giving up on the device.
const PLAYBACK_MARGIN: Duration = Duration::from_secs(2);

struct FeedChunk {
    samples: Vec<f32>,
    cursor: usize,
    done: Option<oneshot::Sender<()>>,
}

/// Samples waiting for the output callback, already at the device rate.
/// Chunks are consumed back to back; silence fills the gaps between them.
#[derive(Default)]
struct OutputFeed {
    chunks: VecDeque<FeedChunk>,
}

impl OutputFeed {
    fn push(&mut self, samples: Vec<f32>, done: oneshot::Sender<()>) {
        self.chunks.push_back(FeedChunk {
            samples,
            cursor: 0,
            done: Some(done),
        });
    }

    /// Next sample for the device. A chunk is acknowledged as soon as its
    /// last sample is handed out; chunks nobody waits for are skipped.
    fn next_sample(&mut self) -> f32 {
        loop {
            let Some(front) = self.chunks.front_mut() else {
                return 0.0;
            };
            let abandoned = front.done.as_ref().map_or(true, |tx| tx.is_closed());
            if abandoned || front.cursor >= front.samples.len() {
                if let Some(mut chunk) = self.chunks.pop_front() {
                    if let Some(done) = chunk.done.take() {
                        let _ = done.send(());
                    }
                }
                continue;
            }

            let value = front.samples[front.cursor];
            front.cursor += 1;
            if front.cursor == front.samples.len() {
                if let Some(done) = front.done.take() {
                    let _ = done.send(());
                }
                self.chunks.pop_front();
            }
            return value;
        }
    }
}

type SharedFeed = Arc<Mutex<OutputFeed>>;

/// Default-output-device sink via cpal. One output stream stays open for
/// the life of the sink, owned by a dedicated thread because cpal streams
/// are `!Send`.
pub struct CpalSink {
    device_rate: u32,
    feed: SharedFeed,
    stop_tx: Mutex<Option<std_mpsc::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CpalSink {
    pub fn open() -> VoiceResult<Self> {
        let feed: SharedFeed = Arc::new(Mutex::new(OutputFeed::default()));
        let thread_feed = Arc::clone(&feed);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<VoiceResult<u32>>();

        let thread = std::thread::Builder::new()
            .name("suzanne-playback".into())
            .spawn(move || {
                let (stream, device_rate) = match open_output_stream(thread_feed) {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(device_rate));

                // Runs until the sink is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                debug!("output stream closed");
            })
            .map_err(|e| VoiceError::DeviceUnavailable(format!("failed to spawn playback thread: {e}")))?;

        let device_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                return Err(VoiceError::DeviceUnavailable(
                    "playback thread exited before the stream opened".into(),
                ))
            }
        };

        Ok(Self {
            device_rate,
            feed,
            stop_tx: Mutex::new(Some(stop_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Names of all output devices on the default host.
    pub fn list_output_devices() -> VoiceResult<Vec<String>> {
        let host = cpal::default_host();
        Ok(host
            .output_devices()?
            .filter_map(|device| device.name().ok())
            .collect())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                warn!("playback thread panicked");
            }
        }
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    /// Resolves once the device has taken the chunk's last sample. The
    /// stream keeps running afterwards, so the tail is never cut off and
    /// the next chunk follows without reopening the device.
    async fn play(&self, samples: Vec<f32>, sample_rate: u32) -> VoiceResult<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut resampled = Vec::with_capacity(samples.len());
        Resampler::new(sample_rate, self.device_rate).process(&samples, &mut resampled);
        let expected =
            Duration::from_secs_f64(resampled.len() as f64 / self.device_rate.max(1) as f64);

        let (done_tx, done_rx) = oneshot::channel();
        self.feed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(resampled, done_tx);

        match tokio::time::timeout(expected + PLAYBACK_MARGIN, done_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(VoiceError::Playback("output stream closed".into())),
            // Dropping `done_rx` makes the callback skip the rest of the chunk.
            Err(_) => Err(VoiceError::Playback("output device stalled".into())),
        }
    }
}

fn open_output_stream(feed: SharedFeed) -> VoiceResult<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| VoiceError::DeviceUnavailable("no output device available".into()))?;
    let supported = device.default_output_config()?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    info!(
        device = %device.name().unwrap_or_else(|_| "unknown".into()),
        format = ?sample_format,
        sample_rate = config.sample_rate.0,
        "using output device"
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_output_stream::<f32>(&device, &config, feed),
        SampleFormat::I16 => build_output_stream::<i16>(&device, &config, feed),
        SampleFormat::I32 => build_output_stream::<i32>(&device, &config, feed),
        SampleFormat::U16 => build_output_stream::<u16>(&device, &config, feed),
        other => Err(VoiceError::DeviceUnavailable(format!(
            "unsupported output sample format: {other:?}"
        ))),
    }?;

    stream.play()?;
    Ok((stream, config.sample_rate.0))
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    feed: SharedFeed,
) -> VoiceResult<cpal::Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels.max(1) as usize;

    let stream = device.build_output_stream(
        config,
        move |out: &mut [T], _: &cpal::OutputCallbackInfo| {
            let mut feed = feed.lock().unwrap_or_else(PoisonError::into_inner);
            for frame in out.chunks_mut(channels) {
                let value = T::from_sample(feed.next_sample());
                for slot in frame.iter_mut() {
                    *slot = value;
                }
            }
        },
        |err| error!(error = %err, "output stream error"),
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(feed: &mut OutputFeed, n: usize) -> Vec<f32> {
        (0..n).map(|_| feed.next_sample()).collect()
    }

    #[test]
    fn feed_plays_chunks_back_to_back() {
        let mut feed = OutputFeed::default();
        let (a_tx, _a_rx) = oneshot::channel();
        let (b_tx, _b_rx) = oneshot::channel();
        feed.push(vec![0.1, 0.2], a_tx);
        feed.push(vec![0.3], b_tx);

        assert_eq!(drain(&mut feed, 5), vec![0.1, 0.2, 0.3, 0.0, 0.0]);
    }

    #[test]
    fn feed_acknowledges_on_last_sample() {
        let mut feed = OutputFeed::default();
        let (tx, mut rx) = oneshot::channel();
        feed.push(vec![0.5, 0.5, 0.5], tx);

        drain(&mut feed, 2);
        assert!(rx.try_recv().is_err(), "acknowledged before the last sample");
        drain(&mut feed, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn feed_skips_abandoned_chunks() {
        let mut feed = OutputFeed::default();
        let (stale_tx, stale_rx) = oneshot::channel();
        let (live_tx, _live_rx) = oneshot::channel();
        feed.push(vec![0.9; 4], stale_tx);
        feed.push(vec![0.1], live_tx);

        assert_eq!(feed.next_sample(), 0.9);
        drop(stale_rx);
        assert_eq!(drain(&mut feed, 2), vec![0.1, 0.0]);
    }
}

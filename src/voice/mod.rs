//! Realtime voice calls.
//!
//! Microphone frames go out over a live session; model audio comes back and
//! is played in order, flushed whenever the user interrupts.

pub mod capture;
pub mod error;
pub mod gemini_live;
pub mod orchestrator;
pub mod pcm;
pub mod playback;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

pub use capture::{AudioCapture, CaptureConfig, CpalCapture};
pub use error::{VoiceError, VoiceResult};
pub use gemini_live::GeminiLiveTransport;
pub use orchestrator::{CallCallbacks, CallOrchestrator, CallState};
pub use pcm::{AudioFrame, PlaybackChunk};
pub use playback::{AudioSink, CpalSink, PlaybackQueue};
pub use transport::{LiveSession, LiveSetup, SessionHandle, Transport, TransportEvent};

use crate::config::SuzanneConfig;

/// Capture and wire sample rate.
pub const SAMPLE_RATE: u32 = 16000;
/// Samples per outbound frame.
pub const BLOCK_SIZE: usize = 4096;

/// Session parameters for a call, with the persona and known facts as the
/// system instruction.
pub fn live_setup(config: &SuzanneConfig, facts: &[String]) -> LiveSetup {
    LiveSetup {
        model: config.voice.live_model.clone(),
        system_instruction: crate::llm::prompt::system_instruction(
            &config.model.persona,
            facts,
            crate::llm::prompt::Difficulty::default(),
        ),
        voice_name: config.voice.voice_name.clone(),
        input_sample_rate: config.voice.sample_rate,
    }
}

/// An orchestrator wired to the default microphone, the default speaker and
/// the Gemini Live endpoint.
pub fn live_call(config: &SuzanneConfig, facts: &[String]) -> anyhow::Result<CallOrchestrator> {
    let api_key = config.require_api_key()?;
    let connect_timeout = Duration::from_secs(config.voice.connect_timeout_secs);

    let transport = GeminiLiveTransport::new(&config.voice.live_url, api_key, connect_timeout);
    let capture = CpalCapture::new(CaptureConfig {
        sample_rate: config.voice.sample_rate,
        block_size: config.voice.block_size,
    });
    let sink = CpalSink::open()?;

    Ok(CallOrchestrator::new(
        Arc::new(transport),
        Box::new(capture),
        Arc::new(sink),
        live_setup(config, facts),
        connect_timeout,
    ))
}

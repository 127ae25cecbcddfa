//! PCM16 sample conversion and wire framing.
//!
//! Outbound [`AudioFrame`]s and inbound [`PlaybackChunk`]s both travel as
//! little-endian signed 16-bit samples, base64-encoded, tagged with a
//! `audio/pcm;rate=N` MIME type.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::error::{VoiceError, VoiceResult};

/// Full-scale value used in both directions.
pub const PCM_SCALE: f32 = 32767.0;

/// Clamp to [-1.0, 1.0], scale by 32767 and truncate toward zero.
pub fn float_to_pcm16(sample: f32) -> i16 {
    // `as` truncates toward zero and maps NaN to 0.
    (sample.clamp(-1.0, 1.0) * PCM_SCALE) as i16
}

pub fn pcm16_to_float(sample: i16) -> f32 {
    sample as f32 / PCM_SCALE
}

/// MIME type for raw PCM16 at `sample_rate`.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Extract `rate=N` from a MIME type such as `audio/pcm;rate=24000`.
pub fn parse_rate(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse().ok())
}

/// One block of captured microphone audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        Self::new(samples.iter().copied().map(float_to_pcm16).collect(), sample_rate)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn mime_type(&self) -> String {
        pcm_mime_type(self.sample_rate)
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_le_bytes())
    }
}

/// One block of model audio waiting to be played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackChunk {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl PlaybackChunk {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Decode little-endian PCM16. A trailing odd byte is ignored.
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::new(samples, sample_rate)
    }

    pub fn from_base64(data: &str, sample_rate: u32) -> VoiceResult<Self> {
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|e| VoiceError::Transport(format!("invalid base64 audio: {e}")))?;
        Ok(Self::from_le_bytes(&bytes, sample_rate))
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().copied().map(pcm16_to_float).collect()
    }

    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Streaming linear-interpolation resampler. Keeps the last input sample
/// between calls so consecutive buffers join without a discontinuity.
#[derive(Debug, Clone)]
pub struct Resampler {
    step: f64,
    pos: f64,
    prev: f32,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            step: from_rate as f64 / to_rate.max(1) as f64,
            pos: 0.0,
            prev: 0.0,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.step == 1.0
    }

    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        if input.is_empty() {
            return;
        }
        if self.is_passthrough() {
            out.extend_from_slice(input);
            return;
        }

        let prev = self.prev;
        let at = |i: isize| if i < 0 { prev } else { input[i as usize] };
        let last = (input.len() - 1) as f64;

        // pos is relative to input[0]; -1 addresses the carried sample
        while self.pos <= last {
            let base = self.pos.floor();
            let frac = (self.pos - base) as f32;
            let i = base as isize;
            let a = at(i);
            let b = if frac == 0.0 { a } else { at(i + 1) };
            out.push(a + (b - a) * frac);
            self.pos += self.step;
        }

        self.pos -= input.len() as f64;
        self.prev = input[input.len() - 1];
    }
}

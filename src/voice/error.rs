//! Error types for realtime voice calls.

use thiserror::Error;

pub type VoiceResult<T> = Result<T, VoiceError>;

/// Everything that can go wrong during a call. Every variant is scoped to a
/// single call; none leaves the orchestrator unusable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    /// Microphone or speaker missing, or permission denied.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The remote session could not be opened.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Socket or protocol fault in an open session.
    #[error("transport error: {0}")]
    Transport(String),

    /// `connect()` called while a call is connecting or active.
    #[error("a call is already connecting or active")]
    AlreadyConnected,

    #[error("playback error: {0}")]
    Playback(String),
}

impl From<cpal::DevicesError> for VoiceError {
    fn from(err: cpal::DevicesError) -> Self {
        VoiceError::DeviceUnavailable(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::DeviceUnavailable(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoiceError::DeviceUnavailable(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::DeviceUnavailable(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VoiceError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        VoiceError::Transport(err.to_string())
    }
}

//! The seam between the call orchestrator and a remote live-audio service.
//!
//! A [`Transport`] opens a [`LiveSession`]: an outbound frame channel plus
//! an inbound stream of [`TransportEvent`]s. The wire format is entirely
//! the transport's business; the orchestrator only sees frames and events.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::error::{VoiceError, VoiceResult};
use super::pcm::{AudioFrame, PlaybackChunk};

/// Parameters sent once when a session opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSetup {
    pub model: String,
    pub system_instruction: String,
    pub voice_name: String,
    /// Rate of the outbound PCM frames.
    pub input_sample_rate: u32,
}

/// What the remote side can tell us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Model speech to play.
    AudioChunk(PlaybackChunk),
    /// The user barged in; queued model audio is stale.
    Interrupted,
    /// The model finished its turn.
    TurnComplete,
    /// The remote closed the session.
    Closed,
    /// The session failed.
    Error(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a session and complete the setup handshake.
    async fn connect(&self, setup: &LiveSetup) -> VoiceResult<LiveSession>;
}

/// Outbound half of a session: frame sender plus shutdown trigger.
#[derive(Debug)]
pub struct SessionHandle {
    frames: Option<mpsc::UnboundedSender<AudioFrame>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl SessionHandle {
    /// Queue a frame for sending.
    pub fn send(&self, frame: AudioFrame) -> VoiceResult<()> {
        let frames = self
            .frames
            .as_ref()
            .ok_or_else(|| VoiceError::Transport("session closed".into()))?;
        frames
            .send(frame)
            .map_err(|_| VoiceError::Transport("session writer has stopped".into()))
    }

    /// A clonable sender for producers such as microphone capture.
    pub fn frame_sender(&self) -> Option<mpsc::UnboundedSender<AudioFrame>> {
        self.frames.clone()
    }

    /// Ask the writer to close the socket. Closing twice is a no-op; an
    /// error means the writer had already exited.
    pub fn close(&mut self) -> VoiceResult<()> {
        self.frames = None;
        let Some(shutdown) = self.shutdown.take() else {
            return Ok(());
        };
        debug!("closing live session");
        shutdown
            .send(())
            .map_err(|_| VoiceError::Transport("session writer already gone".into()))
    }

    pub fn is_open(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// An open live session.
#[derive(Debug)]
pub struct LiveSession {
    handle: SessionHandle,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl LiveSession {
    /// Wrap the channels of a session pump. Dropping `shutdown_tx`'s receiver
    /// marks the session closed.
    pub fn new(
        frames: mpsc::UnboundedSender<AudioFrame>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        shutdown: oneshot::Sender<()>,
    ) -> Self {
        Self {
            handle: SessionHandle {
                frames: Some(frames),
                shutdown: Some(shutdown),
            },
            events,
        }
    }

    pub fn send(&self, frame: AudioFrame) -> VoiceResult<()> {
        self.handle.send(frame)
    }

    /// Next inbound event, or `None` once the pump has exited.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    pub fn close(&mut self) -> VoiceResult<()> {
        self.handle.close()
    }

    pub fn split(self) -> (SessionHandle, mpsc::UnboundedReceiver<TransportEvent>) {
        (self.handle, self.events)
    }
}

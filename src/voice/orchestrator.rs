//! Call lifecycle.
//!
//! [`CallOrchestrator`] owns at most one call at a time and drives it
//! through `Idle → Connecting → Active → Idle`, or `Connecting → Failed →
//! Idle` when the microphone or the remote session can't be opened. All
//! inbound session events are handled by one consumer task per call.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::capture::AudioCapture;
use super::error::{VoiceError, VoiceResult};
use super::playback::{AudioSink, PlaybackQueue};
use super::transport::{LiveSetup, SessionHandle, Transport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Connecting,
    Active,
    Failed,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Idle => "idle",
            CallState::Connecting => "connecting",
            CallState::Active => "active",
            CallState::Failed => "failed",
        };
        f.write_str(s)
    }
}

type CloseCallback = Box<dyn Fn() + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&VoiceError) + Send + Sync>;

/// Host notifications for one call.
pub struct CallCallbacks {
    on_close: CloseCallback,
    on_error: ErrorCallback,
}

impl CallCallbacks {
    pub fn new(
        on_close: impl Fn() + Send + Sync + 'static,
        on_error: impl Fn(&VoiceError) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_close: Box::new(on_close),
            on_error: Box::new(on_error),
        }
    }

    pub fn noop() -> Self {
        Self::new(|| {}, |_| {})
    }
}

struct CallInner {
    state: CallState,
    /// Bumped whenever a call starts or is torn down, so late events from
    /// an old call can be recognized and ignored.
    call_id: u64,
    capture: Box<dyn AudioCapture>,
    session: Option<SessionHandle>,
    playback: Option<PlaybackQueue>,
    events_task: Option<JoinHandle<()>>,
}

/// Ties capture, transport and playback together for one call at a time.
pub struct CallOrchestrator {
    transport: Arc<dyn Transport>,
    sink: Arc<dyn AudioSink>,
    setup: LiveSetup,
    connect_timeout: Duration,
    inner: Arc<Mutex<CallInner>>,
}

fn lock(inner: &Mutex<CallInner>) -> MutexGuard<'_, CallInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CallOrchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        capture: Box<dyn AudioCapture>,
        sink: Arc<dyn AudioSink>,
        setup: LiveSetup,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            sink,
            setup,
            connect_timeout,
            inner: Arc::new(Mutex::new(CallInner {
                state: CallState::Idle,
                call_id: 0,
                capture,
                session: None,
                playback: None,
                events_task: None,
            })),
        }
    }

    pub fn state(&self) -> CallState {
        lock(&self.inner).state
    }

    pub fn is_active(&self) -> bool {
        self.state() == CallState::Active
    }

    /// Start a call. On failure the error is returned, `on_error` fires once
    /// and the orchestrator is back to `Idle`. A second call while one is
    /// connecting or active fails with [`VoiceError::AlreadyConnected`] and
    /// touches nothing.
    pub async fn connect(&self, callbacks: CallCallbacks) -> VoiceResult<()> {
        let callbacks = Arc::new(callbacks);

        let call_id = {
            let mut inner = lock(&self.inner);
            if inner.state != CallState::Idle {
                return Err(VoiceError::AlreadyConnected);
            }
            inner.call_id += 1;
            inner.state = CallState::Connecting;
            info!(call_id = inner.call_id, "call connecting");

            // Microphone first: no remote session is opened without it.
            if let Err(e) = inner.capture.acquire() {
                drop(inner);
                self.fail_connect(&callbacks, &e);
                return Err(e);
            }
            inner.call_id
        };
        let guard = ConnectGuard {
            inner: Arc::clone(&self.inner),
            call_id,
            armed: true,
        };

        let session = match tokio::time::timeout(
            self.connect_timeout,
            self.transport.connect(&self.setup),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                guard.disarm();
                return Err(self.abort_connect(call_id, &callbacks, e));
            }
            Err(_) => {
                guard.disarm();
                let e = VoiceError::ConnectFailed(format!(
                    "timed out after {}s",
                    self.connect_timeout.as_secs()
                ));
                return Err(self.abort_connect(call_id, &callbacks, e));
            }
        };
        // No await past this point, so the attempt can no longer be abandoned.
        guard.disarm();

        let (mut handle, events) = session.split();
        let mut inner = lock(&self.inner);

        if inner.call_id != call_id || inner.state != CallState::Connecting {
            // disconnect() ran while we were waiting on the transport
            drop(inner);
            if let Err(e) = handle.close() {
                debug!(error = %e, "session for cancelled call already closed");
            }
            return Err(VoiceError::ConnectFailed("call cancelled".into()));
        }

        let Some(frames) = handle.frame_sender() else {
            drop(inner);
            let e = VoiceError::Transport("session closed before capture started".into());
            return Err(self.abort_connect(call_id, &callbacks, e));
        };
        if let Err(e) = inner.capture.start(frames) {
            drop(inner);
            let _ = handle.close();
            return Err(self.abort_connect(call_id, &callbacks, e));
        }

        let playback = PlaybackQueue::new(Arc::clone(&self.sink));
        inner.events_task = Some(tokio::spawn(run_event_loop(
            Arc::clone(&self.inner),
            call_id,
            events,
            playback.clone(),
            Arc::clone(&callbacks),
        )));
        inner.session = Some(handle);
        inner.playback = Some(playback);
        inner.state = CallState::Active;
        info!(call_id, "call active");
        Ok(())
    }

    /// End the current call, if any. Each teardown step is attempted even if
    /// an earlier one fails; the orchestrator is `Idle` afterwards.
    pub fn disconnect(&self) {
        let mut inner = lock(&self.inner);
        if inner.state == CallState::Idle && inner.session.is_none() {
            debug!("disconnect with no call in progress");
            return;
        }

        if let Some(task) = inner.events_task.take() {
            task.abort();
        }
        if let Some(mut session) = inner.session.take() {
            if let Err(e) = session.close() {
                warn!(error = %e, "failed to close live session");
            }
        }
        if let Err(e) = inner.capture.stop() {
            warn!(error = %e, "failed to stop microphone");
        }
        if let Some(playback) = inner.playback.take() {
            playback.flush();
        }

        inner.call_id += 1;
        inner.state = CallState::Idle;
        info!("call disconnected");
    }

    fn fail_connect(&self, callbacks: &CallCallbacks, err: &VoiceError) {
        lock(&self.inner).state = CallState::Failed;
        error!(error = %err, "call failed to connect");
        (callbacks.on_error)(err);
        lock(&self.inner).state = CallState::Idle;
    }

    /// Undo a connect attempt that got past device acquisition. If the call
    /// was cancelled in the meantime, nothing is reported.
    fn abort_connect(&self, call_id: u64, callbacks: &CallCallbacks, err: VoiceError) -> VoiceError {
        {
            let mut inner = lock(&self.inner);
            if inner.call_id != call_id {
                return err;
            }
            if let Err(e) = inner.capture.stop() {
                warn!(error = %e, "failed to release microphone after connect failure");
            }
        }
        self.fail_connect(callbacks, &err);
        err
    }
}

/// Rolls a connect attempt back to `Idle` if its future is dropped while
/// waiting on the transport, so the microphone is not left held.
struct ConnectGuard {
    inner: Arc<Mutex<CallInner>>,
    call_id: u64,
    armed: bool,
}

impl ConnectGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = lock(&self.inner);
        if inner.call_id != self.call_id || inner.state != CallState::Connecting {
            return;
        }
        if let Err(e) = inner.capture.stop() {
            warn!(error = %e, "failed to release microphone after abandoned connect");
        }
        inner.call_id += 1;
        inner.state = CallState::Idle;
        info!(call_id = self.call_id, "abandoned connect rolled back");
    }
}

impl Drop for CallOrchestrator {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Tear down a call that ended on its own. Returns false if the call was
/// already replaced or disconnected.
fn end_call(inner: &Mutex<CallInner>, call_id: u64) -> bool {
    let mut inner = lock(inner);
    if inner.call_id != call_id || inner.state != CallState::Active {
        return false;
    }

    if let Some(mut session) = inner.session.take() {
        // The pump has usually exited already.
        let _ = session.close();
    }
    if let Err(e) = inner.capture.stop() {
        warn!(error = %e, "failed to stop microphone");
    }
    if let Some(playback) = inner.playback.take() {
        playback.flush();
    }
    inner.events_task = None;
    inner.call_id += 1;
    inner.state = CallState::Idle;
    true
}

async fn run_event_loop(
    inner: Arc<Mutex<CallInner>>,
    call_id: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    playback: PlaybackQueue,
    callbacks: Arc<CallCallbacks>,
) {
    loop {
        match events.recv().await {
            Some(TransportEvent::AudioChunk(chunk)) => playback.enqueue(chunk),
            Some(TransportEvent::Interrupted) => {
                let dropped = playback.flush();
                debug!(call_id, dropped, "model interrupted");
            }
            Some(TransportEvent::TurnComplete) => debug!(call_id, "model turn complete"),
            Some(TransportEvent::Closed) | None => {
                if end_call(&inner, call_id) {
                    info!(call_id, "call closed by remote");
                    (callbacks.on_close)();
                }
                return;
            }
            Some(TransportEvent::Error(message)) => {
                if end_call(&inner, call_id) {
                    let err = VoiceError::Transport(message);
                    error!(call_id, error = %err, "call ended by transport error");
                    (callbacks.on_error)(&err);
                }
                return;
            }
        }
    }
}

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use suzanne::db;
use suzanne::llm::{ChatModel, GenerateRequest, GenerateResponse, LlmError, LlmResult};
use suzanne::voice::{
    AudioCapture, AudioFrame, AudioSink, LiveSession, LiveSetup, Transport, TransportEvent,
    VoiceError, VoiceResult,
};
use tokio::sync::{mpsc, oneshot, Notify, Semaphore};

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

pub fn shared_db() -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(test_db()))
}

pub fn test_setup() -> LiveSetup {
    LiveSetup {
        model: "test-live".into(),
        system_instruction: "be brief".into(),
        voice_name: "Kore".into(),
        input_sample_rate: 16000,
    }
}

/// Poll `cond` until it holds or a second passes.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

// ── Transport ───────────────────────────────────────────────────────────

/// The far end of a fake session, as seen by a test.
pub struct FakeRemote {
    pub frames: mpsc::UnboundedReceiver<AudioFrame>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub shutdown: oneshot::Receiver<()>,
}

pub enum ConnectBehavior {
    Accept,
    Fail(VoiceError),
    /// Never answer; exercises the connect timeout.
    Hang,
    /// Wait for the notify, then accept.
    Held(Arc<Notify>),
}

pub struct FakeTransport {
    behavior: Mutex<ConnectBehavior>,
    attempts: AtomicUsize,
    remotes: Mutex<VecDeque<FakeRemote>>,
}

impl FakeTransport {
    pub fn new(behavior: ConnectBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            attempts: AtomicUsize::new(0),
            remotes: Mutex::new(VecDeque::new()),
        })
    }

    pub fn accepting() -> Arc<Self> {
        Self::new(ConnectBehavior::Accept)
    }

    pub fn set_behavior(&self, behavior: ConnectBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Take the remote end of the oldest accepted session.
    pub fn take_remote(&self) -> FakeRemote {
        self.remotes
            .lock()
            .unwrap()
            .pop_front()
            .expect("no accepted session")
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _setup: &LiveSetup) -> VoiceResult<LiveSession> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let release = match &*self.behavior.lock().unwrap() {
            ConnectBehavior::Accept => None,
            ConnectBehavior::Fail(e) => return Err(e.clone()),
            // Nobody ever notifies this one.
            ConnectBehavior::Hang => Some(Arc::new(Notify::new())),
            ConnectBehavior::Held(release) => Some(Arc::clone(release)),
        };
        if let Some(release) = release {
            release.notified().await;
        }

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.remotes.lock().unwrap().push_back(FakeRemote {
            frames: frames_rx,
            events: events_tx,
            shutdown: shutdown_rx,
        });
        Ok(LiveSession::new(frames_tx, events_rx, shutdown_tx))
    }
}

// ── Capture ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct CaptureLog {
    pub acquired: bool,
    pub acquire_calls: usize,
    pub stop_calls: usize,
    pub fail_acquire: bool,
    pub fail_stop: bool,
    pub sender: Option<mpsc::UnboundedSender<AudioFrame>>,
    /// Runs inside `stop`, before the microphone is marked released.
    pub on_stop: Option<Box<dyn FnMut() + Send>>,
}

/// Capture double whose state stays inspectable after it is boxed.
#[derive(Clone, Default)]
pub struct FakeCapture {
    pub log: Arc<Mutex<CaptureLog>>,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_acquire() -> Self {
        let capture = Self::default();
        capture.log.lock().unwrap().fail_acquire = true;
        capture
    }

    /// Push a frame as if the microphone produced it.
    pub fn emit(&self, frame: AudioFrame) -> bool {
        match &self.log.lock().unwrap().sender {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.log.lock().unwrap().sender.is_some()
    }

    pub fn is_acquired(&self) -> bool {
        self.log.lock().unwrap().acquired
    }

    pub fn stop_calls(&self) -> usize {
        self.log.lock().unwrap().stop_calls
    }

    pub fn on_stop(&self, hook: impl FnMut() + Send + 'static) {
        self.log.lock().unwrap().on_stop = Some(Box::new(hook));
    }
}

impl AudioCapture for FakeCapture {
    fn acquire(&mut self) -> VoiceResult<()> {
        let mut log = self.log.lock().unwrap();
        log.acquire_calls += 1;
        if log.fail_acquire {
            return Err(VoiceError::DeviceUnavailable("permission denied".into()));
        }
        log.acquired = true;
        Ok(())
    }

    fn start(&mut self, frames: mpsc::UnboundedSender<AudioFrame>) -> VoiceResult<()> {
        let mut log = self.log.lock().unwrap();
        if !log.acquired {
            return Err(VoiceError::DeviceUnavailable("not acquired".into()));
        }
        log.sender = Some(frames);
        Ok(())
    }

    fn stop(&mut self) -> VoiceResult<()> {
        let mut log = self.log.lock().unwrap();
        if let Some(hook) = log.on_stop.as_mut() {
            hook();
        }
        log.stop_calls += 1;
        log.sender = None;
        log.acquired = false;
        if log.fail_stop {
            return Err(VoiceError::DeviceUnavailable("device vanished".into()));
        }
        Ok(())
    }
}

// ── Sink ────────────────────────────────────────────────────────────────

/// What one `play` call received.
#[derive(Debug, Clone, PartialEq)]
pub struct Played {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Sink that records every chunk. When gated, each `play` waits for a
/// permit from [`RecordingSink::release`] before it completes.
pub struct RecordingSink {
    pub started: Mutex<Vec<Played>>,
    pub finished: Mutex<Vec<Played>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    gate: Option<Semaphore>,
    delay: Duration,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Self::build(None, Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Self::build(None, delay)
    }

    pub fn gated() -> Arc<Self> {
        Self::build(Some(Semaphore::new(0)), Duration::ZERO)
    }

    fn build(gate: Option<Semaphore>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            started: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            gate,
            delay,
        })
    }

    /// Let `n` gated plays complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn started_count(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn finished_count(&self) -> usize {
        self.finished.lock().unwrap().len()
    }

    pub fn finished_firsts(&self) -> Vec<f32> {
        self.finished
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.samples[0])
            .collect()
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, samples: Vec<f32>, sample_rate: u32) -> VoiceResult<()> {
        let played = Played {
            samples,
            sample_rate,
        };
        self.started.lock().unwrap().push(played.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| VoiceError::Playback(e.to_string()))?
                .forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().unwrap().push(played);
        Ok(())
    }
}

// ── Chat model ──────────────────────────────────────────────────────────

/// Model double that replays canned JSON responses and records requests.
pub struct FakeChatModel {
    responses: Mutex<VecDeque<LlmResult<GenerateResponse>>>,
    pub requests: Mutex<Vec<GenerateRequest>>,
}

impl FakeChatModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Queue a response given as raw `generateContent` JSON.
    pub fn respond_json(&self, body: &str) {
        let response: GenerateResponse = serde_json::from_str(body).unwrap();
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn respond_text(&self, text: &str) {
        let body = serde_json::json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
        });
        self.respond_json(&body.to_string());
    }

    pub fn fail(&self, status: u16) {
        self.responses.lock().unwrap().push_back(Err(LlmError::Api {
            status,
            body: "upstream failure".into(),
        }));
    }

    pub fn last_request(&self) -> GenerateRequest {
        self.requests.lock().unwrap().last().cloned().expect("no request made")
    }
}

#[async_trait]
impl ChatModel for FakeChatModel {
    async fn generate(&self, request: &GenerateRequest) -> LlmResult<GenerateResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(GenerateResponse::default()))
    }
}

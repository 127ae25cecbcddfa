//! Gemini Live websocket transport.
//!
//! One socket per call. After the handshake a pump task owns the socket:
//! it writes queued [`AudioFrame`]s as `realtimeInput` messages and turns
//! inbound `serverContent` into [`TransportEvent`]s.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::error::{VoiceError, VoiceResult};
use super::pcm::{parse_rate, AudioFrame, PlaybackChunk};
use super::transport::{LiveSession, LiveSetup, Transport, TransportEvent};

// ── Wire types ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupMessage<'a> {
    setup: Setup<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup<'a> {
    model: String,
    generation_config: GenerationConfig<'a>,
    system_instruction: SystemInstruction<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputMessage {
    realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
struct RealtimeInput {
    audio: Blob,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
    go_away: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<ServerPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerPart {
    inline_data: Option<Blob>,
}

/// Serialize the session setup message.
pub fn encode_setup(setup: &LiveSetup) -> VoiceResult<String> {
    let model = if setup.model.starts_with("models/") {
        setup.model.clone()
    } else {
        format!("models/{}", setup.model)
    };

    let message = SetupMessage {
        setup: Setup {
            model,
            generation_config: GenerationConfig {
                response_modalities: ["AUDIO"],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: &setup.voice_name,
                        },
                    },
                },
            },
            system_instruction: SystemInstruction {
                parts: [TextPart {
                    text: &setup.system_instruction,
                }],
            },
        },
    };

    serde_json::to_string(&message)
        .map_err(|e| VoiceError::Transport(format!("failed to encode setup: {e}")))
}

/// Serialize one outbound audio frame.
pub fn encode_audio_frame(frame: &AudioFrame) -> VoiceResult<String> {
    let message = RealtimeInputMessage {
        realtime_input: RealtimeInput {
            audio: Blob {
                mime_type: frame.mime_type(),
                data: frame.to_base64(),
            },
        },
    };
    serde_json::to_string(&message)
        .map_err(|e| VoiceError::Transport(format!("failed to encode audio frame: {e}")))
}

/// Decode one server message into events: audio chunks first, then an
/// interruption, then turn completion. Chunks without a `rate=` parameter
/// are assumed to be at `default_rate`.
pub fn decode_server_message(payload: &str, default_rate: u32) -> VoiceResult<Vec<TransportEvent>> {
    let message: ServerMessage = serde_json::from_str(payload)
        .map_err(|e| VoiceError::Transport(format!("malformed server message: {e}")))?;

    let mut events = Vec::new();

    if message.go_away.is_some() {
        warn!("server announced it will close the session soon");
    }

    let Some(content) = message.server_content else {
        return Ok(events);
    };

    if let Some(turn) = content.model_turn {
        for part in turn.parts {
            let Some(blob) = part.inline_data else {
                continue;
            };
            if !blob.mime_type.is_empty() && !blob.mime_type.starts_with("audio/pcm") {
                debug!(mime_type = %blob.mime_type, "skipping non-PCM inline data");
                continue;
            }
            let rate = parse_rate(&blob.mime_type).unwrap_or(default_rate);
            let chunk = PlaybackChunk::from_base64(&blob.data, rate)?;
            if !chunk.is_empty() {
                events.push(TransportEvent::AudioChunk(chunk));
            }
        }
    }

    if content.interrupted {
        events.push(TransportEvent::Interrupted);
    }
    if content.turn_complete {
        events.push(TransportEvent::TurnComplete);
    }

    Ok(events)
}

fn is_setup_complete(payload: &str) -> bool {
    serde_json::from_str::<ServerMessage>(payload)
        .map(|m| m.setup_complete.is_some())
        .unwrap_or(false)
}

fn payload_text(message: &WsMessage) -> Option<String> {
    match message {
        WsMessage::Text(text) => Some(text.clone()),
        WsMessage::Binary(bytes) => String::from_utf8(bytes.clone()).ok(),
        _ => None,
    }
}

/// Live transport over `wss://…BidiGenerateContent`.
pub struct GeminiLiveTransport {
    url: String,
    api_key: String,
    connect_timeout: Duration,
}

impl GeminiLiveTransport {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            connect_timeout,
        }
    }

    fn endpoint(&self) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", self.url, sep, self.api_key)
    }
}

#[async_trait]
impl Transport for GeminiLiveTransport {
    async fn connect(&self, setup: &LiveSetup) -> VoiceResult<LiveSession> {
        let handshake = async {
            let (ws_stream, _) = tokio_tungstenite::connect_async(self.endpoint())
                .await
                .map_err(|e| VoiceError::ConnectFailed(e.to_string()))?;
            let (mut write, mut read) = ws_stream.split();

            write
                .send(WsMessage::Text(encode_setup(setup)?))
                .await
                .map_err(|e| VoiceError::ConnectFailed(format!("failed to send setup: {e}")))?;

            loop {
                match read.next().await {
                    Some(Ok(msg)) => {
                        if let Some(text) = payload_text(&msg) {
                            if is_setup_complete(&text) {
                                break;
                            }
                            debug!("ignoring message before setup completed");
                        } else if let WsMessage::Close(frame) = msg {
                            let reason = frame
                                .map(|f| f.reason.to_string())
                                .unwrap_or_else(|| "no reason given".into());
                            return Err(VoiceError::ConnectFailed(format!(
                                "server closed during setup: {reason}"
                            )));
                        }
                    }
                    Some(Err(e)) => return Err(VoiceError::ConnectFailed(e.to_string())),
                    None => {
                        return Err(VoiceError::ConnectFailed(
                            "socket ended during setup".into(),
                        ))
                    }
                }
            }
            Ok((write, read))
        };

        let (write, read) = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| {
                VoiceError::ConnectFailed(format!(
                    "no setup acknowledgement within {}s",
                    self.connect_timeout.as_secs()
                ))
            })??;

        info!(model = %setup.model, voice = %setup.voice_name, "live session open");

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(pump(
            write,
            read,
            frames_rx,
            events_tx,
            shutdown_rx,
            setup.input_sample_rate,
        ));

        Ok(LiveSession::new(frames_tx, events_rx, shutdown_tx))
    }
}

async fn pump<W, R>(
    mut write: W,
    mut read: R,
    mut frames_rx: mpsc::UnboundedReceiver<AudioFrame>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
    default_rate: u32,
) where
    W: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    R: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut frames_open = true;

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("live session shutdown requested");
                let _ = write.send(WsMessage::Close(None)).await;
                break;
            }
            frame = frames_rx.recv(), if frames_open => {
                match frame {
                    Some(frame) => {
                        let payload = match encode_audio_frame(&frame) {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(error = %e, "dropping unencodable frame");
                                continue;
                            }
                        };
                        if let Err(e) = write.send(WsMessage::Text(payload)).await {
                            let _ = events_tx.send(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    None => frames_open = false,
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = write.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        debug!(reason = ?frame.map(|f| f.reason.to_string()), "server closed live session");
                        let _ = events_tx.send(TransportEvent::Closed);
                        break;
                    }
                    Some(Ok(msg)) => {
                        let Some(text) = payload_text(&msg) else { continue };
                        match decode_server_message(&text, default_rate) {
                            Ok(events) => {
                                for event in events {
                                    if events_tx.send(event).is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(e) => warn!(error = %e, "skipping undecodable server message"),
                        }
                    }
                    Some(Err(e)) => {
                        let _ = events_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                    None => {
                        let _ = events_tx.send(TransportEvent::Closed);
                        break;
                    }
                }
            }
        }
    }

    debug!("live session pump exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    fn setup() -> LiveSetup {
        LiveSetup {
            model: "gemini-live".into(),
            system_instruction: "be kind".into(),
            voice_name: "Kore".into(),
            input_sample_rate: 16000,
        }
    }

    #[test]
    fn setup_message_shape() {
        let json: serde_json::Value = serde_json::from_str(&encode_setup(&setup()).unwrap()).unwrap();
        let setup = &json["setup"];
        assert_eq!(setup["model"], "models/gemini-live");
        assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Kore"
        );
        assert_eq!(setup["systemInstruction"]["parts"][0]["text"], "be kind");
    }

    #[test]
    fn prefixed_model_is_kept() {
        let mut s = setup();
        s.model = "models/already".into();
        let json: serde_json::Value = serde_json::from_str(&encode_setup(&s).unwrap()).unwrap();
        assert_eq!(json["setup"]["model"], "models/already");
    }

    #[test]
    fn audio_frame_is_tagged_with_rate() {
        let frame = AudioFrame::new(vec![1, -1], 16000);
        let json: serde_json::Value =
            serde_json::from_str(&encode_audio_frame(&frame).unwrap()).unwrap();
        let audio = &json["realtimeInput"]["audio"];
        assert_eq!(audio["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(
            STANDARD.decode(audio["data"].as_str().unwrap()).unwrap(),
            vec![0x01, 0x00, 0xFF, 0xFF]
        );
    }

    #[test]
    fn decodes_audio_parts_in_order() {
        let a = STANDARD.encode([1u8, 0, 2, 0]);
        let b = STANDARD.encode([3u8, 0]);
        let payload = format!(
            r#"{{"serverContent":{{"modelTurn":{{"parts":[
                {{"inlineData":{{"mimeType":"audio/pcm;rate=24000","data":"{a}"}}}},
                {{"text":"ignored"}},
                {{"inlineData":{{"mimeType":"audio/pcm","data":"{b}"}}}}
            ]}}}}}}"#
        );

        let events = decode_server_message(&payload, 16000).unwrap();
        assert_eq!(
            events,
            vec![
                TransportEvent::AudioChunk(PlaybackChunk::new(vec![1, 2], 24000)),
                TransportEvent::AudioChunk(PlaybackChunk::new(vec![3], 16000)),
            ]
        );
    }

    #[test]
    fn decodes_interruption_and_turn_complete() {
        let events =
            decode_server_message(r#"{"serverContent":{"interrupted":true}}"#, 16000).unwrap();
        assert_eq!(events, vec![TransportEvent::Interrupted]);

        let events =
            decode_server_message(r#"{"serverContent":{"turnComplete":true}}"#, 16000).unwrap();
        assert_eq!(events, vec![TransportEvent::TurnComplete]);
    }

    #[test]
    fn control_messages_produce_no_events() {
        assert!(decode_server_message(r#"{"setupComplete":{}}"#, 16000).unwrap().is_empty());
        assert!(decode_server_message(r#"{"goAway":{"timeLeft":"5s"}}"#, 16000).unwrap().is_empty());
        assert!(is_setup_complete(r#"{"setupComplete":{}}"#));
        assert!(!is_setup_complete(r#"{"serverContent":{}}"#));
    }

    #[test]
    fn malformed_payload_is_transport_error() {
        assert!(matches!(
            decode_server_message("not json", 16000),
            Err(VoiceError::Transport(_))
        ));
    }

    #[test]
    fn endpoint_appends_key() {
        let t = GeminiLiveTransport::new("wss://host/ws", "k", Duration::from_secs(1));
        assert_eq!(t.endpoint(), "wss://host/ws?key=k");
        let t = GeminiLiveTransport::new("wss://host/ws?alt=1", "k", Duration::from_secs(1));
        assert_eq!(t.endpoint(), "wss://host/ws?alt=1&key=k");
    }
}

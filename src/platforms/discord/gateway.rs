// src/platforms/discord/gateway.rs - Gateway sessions with heartbeat, resume and reconnect

use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Duration, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::DiscordMessage;
use crate::types::ChatMessage;

const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
const GATEWAY_QUERY: &str = "/?v=10&encoding=json";

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RESUME: u8 = 6;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

/// GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
const GATEWAY_INTENTS: u64 = (1 << 9) | (1 << 12) | (1 << 15);

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsReader = SplitStream<WsStream>;
pub(super) type SharedWriter = Arc<RwLock<Option<SplitSink<WsStream, Message>>>>;

/// Gateway frame envelope
#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Option<serde_json::Value>,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadyEvent {
    session_id: String,
    #[serde(default)]
    resume_gateway_url: Option<String>,
}

/// Everything needed to resume a session
#[derive(Debug, Default, Clone)]
struct SessionState {
    session_id: Option<String>,
    resume_url: Option<String>,
    sequence: Option<u64>,
    ack_pending: bool,
}

/// What to do once a gateway session has ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NextStep {
    Resume,
    Identify,
    Stop,
}

/// Close codes after which reconnecting cannot succeed
fn is_fatal_close(code: u16) -> bool {
    matches!(code, 4004 | 4010 | 4011 | 4012 | 4013 | 4014)
}

fn step_after_close(code: Option<u16>) -> NextStep {
    match code {
        Some(code) if is_fatal_close(code) => NextStep::Stop,
        // invalid sequence, session timed out, or a normal close: the session is gone
        Some(4007) | Some(4009) | Some(1000) | Some(1001) => NextStep::Identify,
        _ => NextStep::Resume,
    }
}

fn step_after_invalid_session(resumable: bool) -> NextStep {
    if resumable {
        NextStep::Resume
    } else {
        NextStep::Identify
    }
}

fn heartbeat_frame(sequence: Option<u64>) -> Message {
    Message::Text(json!({ "op": OP_HEARTBEAT, "d": sequence }).to_string())
}

async fn send_frame(writer: &SharedWriter, frame: Message) -> Result<()> {
    match writer.write().await.as_mut() {
        Some(sink) => sink.send(frame).await.context("Failed to write gateway frame"),
        None => Err(anyhow::anyhow!("Gateway socket is not open")),
    }
}

/// Owns the broadcast sender for one Discord connection. When the gateway
/// stops for good the sender is dropped and receivers observe `Closed`.
pub(super) struct Gateway {
    token: String,
    sender: broadcast::Sender<ChatMessage>,
    writer: SharedWriter,
    session: Arc<RwLock<SessionState>>,
    is_connected: Arc<RwLock<bool>>,
    shutdown_requested: Arc<RwLock<bool>>,
}

impl Gateway {
    pub(super) fn new(
        token: String,
        sender: broadcast::Sender<ChatMessage>,
        writer: SharedWriter,
        is_connected: Arc<RwLock<bool>>,
        shutdown_requested: Arc<RwLock<bool>>,
    ) -> Self {
        Self {
            token,
            sender,
            writer,
            session: Arc::new(RwLock::new(SessionState::default())),
            is_connected,
            shutdown_requested,
        }
    }

    fn identify_frame(&self) -> Message {
        Message::Text(
            json!({
                "op": OP_IDENTIFY,
                "d": {
                    "token": self.token,
                    "intents": GATEWAY_INTENTS,
                    "properties": {
                        "os": env::consts::OS,
                        "browser": "chatwarden",
                        "device": "chatwarden"
                    }
                }
            })
            .to_string(),
        )
    }

    fn resume_frame(&self, session_id: &str, sequence: Option<u64>) -> Message {
        Message::Text(
            json!({
                "op": OP_RESUME,
                "d": {
                    "token": self.token,
                    "session_id": session_id,
                    "seq": sequence
                }
            })
            .to_string(),
        )
    }

    /// Open a socket, wait for Hello, then Identify or Resume and start heartbeating
    pub(super) async fn open(&self, resume: bool) -> Result<(WsReader, JoinHandle<()>)> {
        let session = self.session.read().await.clone();
        let resume_with = match (&session.session_id, resume) {
            (Some(session_id), true) => Some(session_id.clone()),
            _ => None,
        };

        let address = match (&resume_with, &session.resume_url) {
            (Some(_), Some(resume_url)) => format!("{}{}", resume_url.trim_end_matches('/'), GATEWAY_QUERY),
            _ => GATEWAY_URL.to_string(),
        };
        let url = Url::parse(&address)
            .with_context(|| format!("Failed to parse Discord gateway URL {}", address))?;

        let (ws_stream, _) = connect_async(url)
            .await
            .context("Failed to connect to Discord gateway")?;
        let (write, mut read) = ws_stream.split();

        // The first frame must be Hello with the heartbeat interval
        let heartbeat_interval_ms = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let payload: GatewayPayload = serde_json::from_str(&text)
                        .context("Invalid Discord gateway frame")?;
                    if payload.op == OP_HELLO {
                        break payload
                            .d
                            .and_then(|d| d.get("heartbeat_interval")?.as_u64())
                            .context("Discord Hello frame without heartbeat_interval")?;
                    }
                    debug!("Ignoring gateway op {} before Hello", payload.op);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e).context("Discord gateway error before Hello"),
                None => return Err(anyhow::anyhow!("Discord gateway closed before Hello")),
            }
        };

        *self.writer.write().await = Some(write);

        let frame = match &resume_with {
            Some(session_id) => {
                info!("Resuming Discord session {}", session_id);
                self.session.write().await.ack_pending = false;
                self.resume_frame(session_id, session.sequence)
            }
            None => {
                *self.session.write().await = SessionState::default();
                self.identify_frame()
            }
        };
        send_frame(&self.writer, frame).await?;

        *self.is_connected.write().await = true;
        let heartbeat = self.spawn_heartbeat(Duration::from_millis(heartbeat_interval_ms));
        Ok((read, heartbeat))
    }

    fn spawn_heartbeat(&self, period: Duration) -> JoinHandle<()> {
        let writer = Arc::clone(&self.writer);
        let session = Arc::clone(&self.session);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;

                let sequence = {
                    let mut state = session.write().await;
                    if state.ack_pending {
                        warn!("Heartbeat not acknowledged, closing gateway socket");
                        let _ = send_frame(&writer, Message::Close(None)).await;
                        break;
                    }
                    state.ack_pending = true;
                    state.sequence
                };

                if let Err(e) = send_frame(&writer, heartbeat_frame(sequence)).await {
                    error!("Failed to send heartbeat: {}", e);
                    break;
                }
                debug!("Heartbeat sent");
            }
        })
    }

    /// Handle one text frame. Returns a step when the session must end.
    async fn handle_text(&self, text: &str) -> Option<NextStep> {
        let payload: GatewayPayload = match serde_json::from_str(text) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Unparseable gateway frame: {}", e);
                return None;
            }
        };

        if let Some(s) = payload.s {
            self.session.write().await.sequence = Some(s);
        }

        match payload.op {
            OP_DISPATCH => {
                self.handle_dispatch(payload.t.as_deref(), payload.d).await;
                None
            }
            OP_HEARTBEAT => {
                let sequence = self.session.read().await.sequence;
                if let Err(e) = send_frame(&self.writer, heartbeat_frame(sequence)).await {
                    error!("Failed to answer heartbeat request: {}", e);
                }
                None
            }
            OP_HEARTBEAT_ACK => {
                self.session.write().await.ack_pending = false;
                debug!("Heartbeat acknowledged");
                None
            }
            OP_RECONNECT => {
                info!("Discord requested a reconnect");
                Some(NextStep::Resume)
            }
            OP_INVALID_SESSION => {
                let resumable = payload.d.and_then(|d| d.as_bool()).unwrap_or(false);
                warn!("Discord invalidated the session (resumable: {})", resumable);
                Some(step_after_invalid_session(resumable))
            }
            other => {
                debug!("Ignoring gateway op {}", other);
                None
            }
        }
    }

    async fn handle_dispatch(&self, event: Option<&str>, data: Option<serde_json::Value>) {
        match (event, data) {
            (Some("MESSAGE_CREATE"), Some(data)) => {
                if let Some(chat_msg) = DiscordMessage::parse_event(data) {
                    debug!("Message {} from {} in {}", chat_msg.id, chat_msg.author_id, chat_msg.channel_id);
                    if let Err(e) = self.sender.send(chat_msg) {
                        warn!("Failed to broadcast message: {}", e);
                    }
                }
            }
            (Some("READY"), Some(data)) => match serde_json::from_value::<ReadyEvent>(data) {
                Ok(ready) => {
                    info!("Discord session {} ready", ready.session_id);
                    let mut session = self.session.write().await;
                    session.session_id = Some(ready.session_id);
                    session.resume_url = ready.resume_gateway_url;
                }
                Err(e) => warn!("Unparseable READY event: {}", e),
            },
            (Some("RESUMED"), _) => info!("Discord session resumed"),
            (event, _) => debug!("Ignoring dispatch {:?}", event),
        }
    }

    /// Read frames until the session ends
    async fn read_session(&self, reader: &mut WsReader) -> NextStep {
        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(step) = self.handle_text(&text).await {
                        return step;
                    }
                }
                Some(Ok(Message::Close(close_frame))) => {
                    info!("Discord gateway closed: {:?}", close_frame);
                    return step_after_close(close_frame.map(|frame| u16::from(frame.code)));
                }
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = send_frame(&self.writer, Message::Pong(payload)).await {
                        error!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Discord gateway error: {}", e);
                    return NextStep::Resume;
                }
                None => {
                    warn!("Discord gateway stream ended");
                    return NextStep::Resume;
                }
            }
        }
    }

    /// Keep a session alive across reconnects until shutdown or a fatal close
    pub(super) async fn run(self, mut reader: WsReader, mut heartbeat: JoinHandle<()>) {
        info!("Discord gateway reader started");

        'sessions: loop {
            let step = self.read_session(&mut reader).await;
            heartbeat.abort();
            *self.is_connected.write().await = false;
            *self.writer.write().await = None;

            if *self.shutdown_requested.read().await {
                break;
            }

            let mut resume = match step {
                NextStep::Stop => {
                    error!("Discord closed the gateway with a fatal code, not reconnecting");
                    break;
                }
                NextStep::Resume => true,
                NextStep::Identify => false,
            };

            let mut delay = Duration::from_secs(1);
            loop {
                sleep(delay).await;
                if *self.shutdown_requested.read().await {
                    break 'sessions;
                }

                match self.open(resume).await {
                    Ok((next_reader, next_heartbeat)) => {
                        reader = next_reader;
                        heartbeat = next_heartbeat;
                        info!("Reconnected to Discord gateway");
                        break;
                    }
                    Err(e) => {
                        delay = (delay * 2).min(MAX_RECONNECT_DELAY);
                        resume = false;
                        warn!("Discord reconnect failed, retrying in {:?}: {}", delay, e);
                    }
                }
            }
        }

        heartbeat.abort();
        *self.is_connected.write().await = false;
        warn!("Discord gateway stopped");
    }
}

//! Realtime change feed over the Phoenix channel protocol.
//!
//! The socket runs in a dedicated tokio task that joins the message-table
//! topic, keeps the connection alive with heartbeats and forwards decoded
//! row changes through an mpsc channel. Dropped connections are retried
//! until the receiving [`Subscription`] goes away.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use kinfolk_shared::constants::{
    MESSAGES_TABLE, REALTIME_HEARTBEAT_SECS, REALTIME_RECONNECT_SECS,
};
use kinfolk_shared::{ChangeEvent, Message, MessageId};

use crate::error::{BackendError, Result};
use crate::rest::BackendConfig;
use crate::Subscription;

const EVENT_BUFFER: usize = 256;

/// Reason a socket session ended.
enum Closed {
    /// The subscriber is gone; stop for good.
    Unsubscribed,
    /// The server or network dropped us; reconnect.
    Dropped,
}

pub struct RealtimeFeed {
    socket_url: String,
    topic: String,
    access_token: Option<String>,
}

impl RealtimeFeed {
    pub fn new(config: &BackendConfig, access_token: Option<String>) -> Self {
        Self {
            socket_url: socket_url(config),
            topic: format!("realtime:public:{MESSAGES_TABLE}"),
            access_token,
        }
    }

    /// Start the socket task and hand back the receiving end.
    pub fn spawn(self) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(self.run(tx));
        Ok(Subscription::new(rx, task))
    }

    async fn run(self, tx: mpsc::Sender<ChangeEvent>) {
        loop {
            match self.session(&tx).await {
                Ok(Closed::Unsubscribed) => break,
                Ok(Closed::Dropped) => info!(topic = %self.topic, "realtime connection closed"),
                Err(e) => warn!(topic = %self.topic, error = %e, "realtime connection failed"),
            }
            if tx.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(REALTIME_RECONNECT_SECS)).await;
            debug!(topic = %self.topic, "reconnecting realtime socket");
        }
        info!(topic = %self.topic, "realtime task terminated");
    }

    async fn session(&self, tx: &mpsc::Sender<ChangeEvent>) -> Result<Closed> {
        let (ws, _) = tokio_tungstenite::connect_async(self.socket_url.as_str())
            .await
            .map_err(|e| BackendError::Realtime(format!("connect failed: {e}")))?;
        let (mut sink, mut stream) = ws.split();

        let mut next_ref: u64 = 1;
        let join = join_frame(&self.topic, self.access_token.as_deref(), next_ref);
        sink.send(WsMessage::text(join.to_string()))
            .await
            .map_err(|e| BackendError::Realtime(format!("join failed: {e}")))?;
        info!(topic = %self.topic, "realtime channel joining");

        let mut heartbeat = tokio::time::interval(Duration::from_secs(REALTIME_HEARTBEAT_SECS));
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    next_ref += 1;
                    sink.send(WsMessage::text(heartbeat_frame(next_ref).to_string()))
                        .await
                        .map_err(|e| BackendError::Realtime(format!("heartbeat failed: {e}")))?;
                }
                _ = tx.closed() => return Ok(Closed::Unsubscribed),
                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(WsMessage::Text(text))) => text,
                        Some(Ok(WsMessage::Close(_))) | None => return Ok(Closed::Dropped),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(BackendError::Realtime(e.to_string())),
                    };
                    let text: &str = &text;
                    if let Some(event) = decode_frame(text) {
                        debug!(msg_id = %event.message_id(), "change received");
                        if tx.send(event).await.is_err() {
                            return Ok(Closed::Unsubscribed);
                        }
                    } else {
                        log_control_frame(text);
                    }
                }
            }
        }
    }
}

/// `wss://<host>/realtime/v1/websocket?apikey=<key>&vsn=1.0.0`
pub fn socket_url(config: &BackendConfig) -> String {
    let base = config.endpoint("realtime/v1/websocket");
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base
    };
    format!("{base}?apikey={}&vsn=1.0.0", config.public_key)
}

fn join_frame(topic: &str, access_token: Option<&str>, msg_ref: u64) -> Value {
    let change = |event: &str| json!({ "event": event, "schema": "public", "table": MESSAGES_TABLE });
    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [change("INSERT"), change("DELETE")],
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = json!(token);
    }
    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": payload,
        "ref": msg_ref.to_string(),
    })
}

fn heartbeat_frame(msg_ref: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
}

/// Decode a `postgres_changes` frame into a row change. Anything else
/// (replies, presence, system messages) yields `None`.
pub fn decode_frame(text: &str) -> Option<ChangeEvent> {
    let frame: Value = serde_json::from_str(text).ok()?;
    if frame.get("event")?.as_str()? != "postgres_changes" {
        return None;
    }
    let data = frame.get("payload")?.get("data")?;
    match data.get("type")?.as_str()? {
        "INSERT" => {
            let record = data.get("record")?.clone();
            match serde_json::from_value::<Message>(record) {
                Ok(message) => Some(ChangeEvent::Insert(message)),
                Err(e) => {
                    warn!(error = %e, "undecodable insert record");
                    None
                }
            }
        }
        "DELETE" => {
            let id = data.get("old_record")?.get("id")?.clone();
            serde_json::from_value::<MessageId>(id)
                .ok()
                .map(ChangeEvent::Delete)
        }
        _ => None,
    }
}

fn log_control_frame(text: &str) {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        return;
    };
    let event = frame.get("event").and_then(Value::as_str).unwrap_or_default();
    let status = frame
        .get("payload")
        .and_then(|p| p.get("status"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    match (event, status) {
        ("phx_reply", "error") => warn!(payload = %frame["payload"], "realtime join rejected"),
        ("phx_error", _) => warn!("realtime channel error"),
        ("system", _) => debug!(payload = %frame["payload"], "realtime system message"),
        _ => {}
    }
}

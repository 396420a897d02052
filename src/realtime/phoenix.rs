//! Supabase Realtime client (Phoenix channel protocol, `vsn=1.0.0`).
//!
//! One WebSocket per subscription. The background task joins a
//! `postgres_changes` channel, heartbeats every 30 s, and reconnects with
//! capped exponential backoff until the subscriber goes away.

use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::config::StoreConfig;
use crate::error::RealtimeError;
use crate::leads::collection::ChangeEvent;
use crate::leads::record::Lead;
use crate::realtime::{ChangeFeed, ChangeFilter, Subscription};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Phoenix wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    pub fn join(
        topic: &str,
        table: &str,
        filter: &ChangeFilter,
        token: &str,
        msg_ref: &str,
    ) -> Self {
        let mut change = serde_json::json!({
            "event": if filter.updates_only { "UPDATE" } else { "*" },
            "schema": "public",
            "table": table,
        });
        if let Some(lead_id) = &filter.lead_id {
            change["filter"] = serde_json::json!(format!("lead_id=eq.{lead_id}"));
        }
        Self {
            topic: topic.to_string(),
            event: "phx_join".to_string(),
            payload: serde_json::json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [change],
                },
                "access_token": token,
            }),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: Some(msg_ref.to_string()),
        }
    }

    pub fn heartbeat(msg_ref: &str) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: serde_json::json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    /// `phx_reply` status (`"ok"` or `"error"`).
    fn reply_status(&self) -> Option<&str> {
        self.payload.get("status").and_then(|s| s.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct PostgresChangesPayload {
    data: PostgresChange,
}

#[derive(Debug, Deserialize)]
struct PostgresChange {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Option<serde_json::Value>,
    #[serde(default)]
    old_record: Option<serde_json::Value>,
}

fn decode_err(e: impl std::fmt::Display) -> RealtimeError {
    RealtimeError::Decode(e.to_string())
}

/// Map a `postgres_changes` payload to a [`ChangeEvent`]. Unknown change
/// types yield `Ok(None)`.
pub fn decode_change(payload: &serde_json::Value) -> Result<Option<ChangeEvent>, RealtimeError> {
    let PostgresChangesPayload { data } =
        PostgresChangesPayload::deserialize(payload).map_err(decode_err)?;

    let lead = |record: Option<serde_json::Value>| -> Result<Lead, RealtimeError> {
        let record = record.ok_or_else(|| decode_err("change has no record"))?;
        serde_json::from_value(record).map_err(decode_err)
    };

    match data.kind.as_str() {
        "INSERT" => Ok(Some(ChangeEvent::Insert(lead(data.record)?))),
        "UPDATE" => Ok(Some(ChangeEvent::Update(lead(data.record)?))),
        "DELETE" => {
            let lead_id = data
                .old_record
                .as_ref()
                .and_then(|old| old.get("lead_id"))
                .and_then(|id| id.as_str())
                .ok_or_else(|| decode_err("DELETE without old_record.lead_id"))?;
            Ok(Some(ChangeEvent::Delete {
                lead_id: lead_id.to_string(),
            }))
        }
        other => {
            tracing::debug!("Ignoring postgres change of type {}", other);
            Ok(None)
        }
    }
}

/// WebSocket endpoint for a project URL: `wss://<host>/realtime/v1/websocket`.
pub fn socket_url(base: &Url, api_key: &str) -> Result<Url, RealtimeError> {
    let mut url = base.clone();
    let scheme = if base.scheme() == "http" { "ws" } else { "wss" };
    url.set_scheme(scheme).map_err(|()| {
        RealtimeError::NotConfigured(format!("cannot derive socket URL from {base}"))
    })?;
    url.set_path("realtime/v1/websocket");
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", api_key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

fn topic_for(table: &str, filter: &ChangeFilter) -> String {
    match &filter.lead_id {
        Some(lead_id) => format!("realtime:lead_{lead_id}"),
        None => format!("realtime:{table}_changes"),
    }
}

struct ClientInner {
    socket_url: Url,
    access_token: SecretString,
    table: String,
}

/// [`ChangeFeed`] backed by Supabase Realtime.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("table", &self.inner.table)
            .finish_non_exhaustive()
    }
}

impl RealtimeClient {
    pub fn new(config: &StoreConfig) -> Result<Self, RealtimeError> {
        let base = config
            .url
            .as_ref()
            .ok_or_else(|| RealtimeError::NotConfigured("SUPABASE_URL is not set".to_string()))?;
        let key = config.anon_key.clone().ok_or_else(|| {
            RealtimeError::NotConfigured("SUPABASE_ANON_KEY is not set".to_string())
        })?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                socket_url: socket_url(base, key.expose_secret())?,
                access_token: key,
                table: config.table.clone(),
            }),
        })
    }

    async fn run(self, filter: ChangeFilter, tx: mpsc::UnboundedSender<ChangeEvent>) {
        let topic = topic_for(&self.inner.table, &filter);
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let mut joined = false;
            match self.session(&topic, &filter, &tx, &mut joined).await {
                Ok(()) => {
                    tracing::debug!(topic = %topic, "Subscriber gone, leaving channel");
                    return;
                }
                Err(e) => tracing::warn!(topic = %topic, "Realtime channel dropped: {}", e),
            }
            if tx.is_closed() {
                return;
            }
            if joined {
                backoff = INITIAL_BACKOFF;
            }
            tracing::debug!(topic = %topic, "Reconnecting in {:?}", backoff);
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// One connection's lifetime. `Ok` means the subscriber dropped.
    async fn session(
        &self,
        topic: &str,
        filter: &ChangeFilter,
        tx: &mpsc::UnboundedSender<ChangeEvent>,
        joined: &mut bool,
    ) -> Result<(), RealtimeError> {
        let (ws, _response) = tokio_tungstenite::connect_async(self.inner.socket_url.as_str())
            .await
            .map_err(|e| RealtimeError::Socket(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let mut next_ref: u64 = 1;
        let join_ref = next_ref.to_string();
        send(
            &mut sink,
            &PhoenixMessage::join(
                topic,
                &self.inner.table,
                filter,
                self.inner.access_token.expose_secret(),
                &join_ref,
            ),
        )
        .await?;

        let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
        let mut pending_heartbeat: Option<String> = None;

        loop {
            tokio::select! {
                _ = tx.closed() => return Ok(()),
                _ = heartbeat.tick() => {
                    if pending_heartbeat.is_some() {
                        return Err(RealtimeError::HeartbeatTimeout(HEARTBEAT_INTERVAL));
                    }
                    next_ref += 1;
                    let msg_ref = next_ref.to_string();
                    send(&mut sink, &PhoenixMessage::heartbeat(&msg_ref)).await?;
                    pending_heartbeat = Some(msg_ref);
                }
                frame = stream.next() => {
                    let frame = frame
                        .ok_or_else(|| RealtimeError::Socket("connection closed".to_string()))?
                        .map_err(|e| RealtimeError::Socket(e.to_string()))?;
                    let text = match frame {
                        Message::Text(text) => text.to_string(),
                        Message::Close(_) => {
                            return Err(RealtimeError::Socket(
                                "server closed connection".to_string(),
                            ));
                        }
                        _ => continue,
                    };
                    let message: PhoenixMessage = match serde_json::from_str(&text) {
                        Ok(message) => message,
                        Err(e) => {
                            tracing::warn!("Skipping malformed realtime frame: {}", e);
                            continue;
                        }
                    };

                    match message.event.as_str() {
                        "phx_reply"
                            if pending_heartbeat.is_some()
                                && message.msg_ref == pending_heartbeat =>
                        {
                            pending_heartbeat = None;
                        }
                        "phx_reply" if message.msg_ref.as_deref() == Some(join_ref.as_str()) => {
                            if message.reply_status() != Some("ok") {
                                return Err(RealtimeError::JoinRefused {
                                    topic: topic.to_string(),
                                    reason: message
                                        .payload
                                        .get("response")
                                        .map(|r| r.to_string())
                                        .unwrap_or_default(),
                                });
                            }
                            tracing::debug!(topic, "Joined realtime channel");
                            *joined = true;
                        }
                        "postgres_changes" if message.topic == topic => {
                            match decode_change(&message.payload) {
                                Ok(Some(event)) if filter.accepts(&event) => {
                                    if tx.send(event).is_err() {
                                        return Ok(());
                                    }
                                }
                                Ok(_) => {}
                                Err(e) => tracing::warn!(topic, "Dropping realtime change: {}", e),
                            }
                        }
                        "phx_error" | "phx_close" if message.topic == topic => {
                            return Err(RealtimeError::Socket(format!(
                                "channel {} by server",
                                message.event
                            )));
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

async fn send<S>(sink: &mut S, message: &PhoenixMessage) -> Result<(), RealtimeError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = serde_json::to_string(message).map_err(decode_err)?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| RealtimeError::Socket(e.to_string()))
}

impl ChangeFeed for RealtimeClient {
    fn subscribe(&self, filter: ChangeFilter) -> Result<Subscription, RealtimeError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.clone().run(filter, tx));
        Ok(Subscription::new(rx, Some(task)))
    }
}

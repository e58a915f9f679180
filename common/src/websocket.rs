//! Node websocket notifications.
//!
//! Only the client side is implemented: subscribe to a topic, optionally
//! filtered on a set of accounts, then read decoded events.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};

use crate::crypto::{Address, Hash};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("Cannot connect to websocket '{url}': {reason}")]
    Connect { url: String, reason: String },

    #[error("Cannot send websocket message: {0}")]
    Send(String),

    #[error("Websocket read failed: {0}")]
    Receive(String),

    #[error("Websocket closed by the node")]
    Closed,

    #[error("Invalid notification: {0}")]
    InvalidMessage(String),
}

/// Notification topics the benchmark knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Topic {
    Confirmation,
    StoppedElection,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SubscribeOptions {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<Address>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

/// Outgoing control message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    pub action: SubscriptionAction,
    pub topic: Topic,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ack: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<SubscribeOptions>,
}

impl SubscriptionRequest {
    pub fn subscribe(topic: Topic, accounts: Vec<Address>) -> Self {
        let options = (!accounts.is_empty()).then(|| SubscribeOptions { accounts });
        Self {
            action: SubscriptionAction::Subscribe,
            topic,
            ack: true,
            options,
        }
    }

    pub fn unsubscribe(topic: Topic) -> Self {
        Self {
            action: SubscriptionAction::Unsubscribe,
            topic,
            ack: false,
            options: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct EventMessage {
    pub hash: Hash,
    #[serde(default)]
    pub account: Option<Address>,
}

/// Inbound `{topic, message}` event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub topic: String,
    pub message: EventMessage,
}

impl Event {
    /// `None` for topics this client does not know.
    pub fn topic(&self) -> Option<Topic> {
        self.topic.parse().ok()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// Node acknowledged a control message, e.g. `{"ack": "subscribe"}`
    Ack(String),
    Event(Event),
}

impl Notification {
    pub fn parse(text: &str) -> Result<Self, NotificationError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| NotificationError::InvalidMessage(e.to_string()))?;

        if let Some(ack) = value.get("ack").and_then(Value::as_str) {
            return Ok(Self::Ack(ack.to_string()));
        }

        let topic = value
            .get("topic")
            .and_then(Value::as_str)
            .ok_or_else(|| NotificationError::InvalidMessage("missing topic".to_string()))?
            .to_string();
        let message = value
            .get("message")
            .cloned()
            .ok_or_else(|| NotificationError::InvalidMessage(format!("missing message for topic {}", topic)))?;
        let message: EventMessage = serde_json::from_value(message)
            .map_err(|e| NotificationError::InvalidMessage(e.to_string()))?;

        Ok(Self::Event(Event { topic, message }))
    }
}

/// Decoded notification feed.
#[async_trait]
pub trait NotificationStream: Send {
    async fn send(&mut self, request: &SubscriptionRequest) -> Result<(), NotificationError>;

    /// Next decoded notification, `Ok(None)` once the transport is closed.
    async fn next_notification(&mut self) -> Result<Option<Notification>, NotificationError>;

    async fn close(&mut self) -> Result<(), NotificationError>;
}

pub struct WebsocketClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebsocketClient {
    pub async fn connect(url: &str) -> Result<Self, NotificationError> {
        debug!("Connecting to websocket {}", url);
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| NotificationError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { stream })
    }
}

#[async_trait]
impl NotificationStream for WebsocketClient {
    async fn send(&mut self, request: &SubscriptionRequest) -> Result<(), NotificationError> {
        let text = serde_json::to_string(request).map_err(|e| NotificationError::Send(e.to_string()))?;
        trace!("websocket >> {}", text);
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| NotificationError::Send(e.to_string()))
    }

    async fn next_notification(&mut self) -> Result<Option<Notification>, NotificationError> {
        while let Some(message) = self.stream.next().await {
            let message = message.map_err(|e| NotificationError::Receive(e.to_string()))?;
            let text = match message {
                Message::Text(text) => text.as_str().to_string(),
                Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => text.to_string(),
                    Err(_) => continue,
                },
                Message::Close(frame) => {
                    debug!("Websocket closed: {:?}", frame);
                    return Ok(None);
                }
                _ => continue,
            };
            trace!("websocket << {}", text);
            return Notification::parse(&text).map(Some);
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), NotificationError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| NotificationError::Send(e.to_string()))
    }
}

//! WebSocket stub configuration.
//!
//! Only the configuration model and message lookup live here. The socket
//! transport is provided by whoever embeds the repository.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How a server response is delivered to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebSocketPolicy {
    /// Send one message
    Once,
    /// Send the message repeatedly, every `delay`
    Push,
    /// Send the message split into frames
    Fragmentation,
    /// Send a ping frame carrying the body
    Ping,
    /// Close the connection
    Disconnect,
}

impl FromStr for WebSocketPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "once" => Ok(WebSocketPolicy::Once),
            "push" => Ok(WebSocketPolicy::Push),
            "fragmentation" => Ok(WebSocketPolicy::Fragmentation),
            "ping" => Ok(WebSocketPolicy::Ping),
            "disconnect" => Ok(WebSocketPolicy::Disconnect),
            other => Err(format!("unknown web-socket policy '{other}'")),
        }
    }
}

impl fmt::Display for WebSocketPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WebSocketPolicy::Once => "once",
            WebSocketPolicy::Push => "push",
            WebSocketPolicy::Fragmentation => "fragmentation",
            WebSocketPolicy::Ping => "ping",
            WebSocketPolicy::Disconnect => "disconnect",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Binary,
}

/// A message the server sends.
#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketServerResponse {
    pub policy: WebSocketPolicy,
    pub message_type: MessageType,
    /// Inline body, or file contents when `file` was configured
    pub body: Bytes,
    pub delay: Duration,
}

impl WebSocketServerResponse {
    pub fn new(policy: WebSocketPolicy, body: impl Into<Bytes>) -> Self {
        Self {
            policy,
            message_type: MessageType::Text,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A message expected from the client.
#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketClientRequest {
    pub message_type: MessageType,
    pub body: Bytes,
}

/// Client message paired with the server's answer to it.
#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketOnMessage {
    pub client_request: WebSocketClientRequest,
    pub server_response: WebSocketServerResponse,
}

/// One `web-socket` entry of the stubs file.
#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketConfig {
    pub url: String,
    pub sub_protocols: Vec<String>,
    pub on_open: Option<WebSocketServerResponse>,
    pub on_message: Vec<WebSocketOnMessage>,
    pub description: Option<String>,
    pub uuid: Option<String>,
    pub complete_yaml: String,
}

impl WebSocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sub_protocols: Vec::new(),
            on_open: None,
            on_message: Vec::new(),
            description: None,
            uuid: None,
            complete_yaml: String::new(),
        }
    }

    /// Split a comma-separated `sub-protocols` value.
    pub fn parse_sub_protocols(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Whether a client offering `protocol` may connect.
    ///
    /// A config without sub-protocols accepts any client.
    pub fn supports_sub_protocol(&self, protocol: &str) -> bool {
        self.sub_protocols.is_empty()
            || self
                .sub_protocols
                .iter()
                .any(|p| p.eq_ignore_ascii_case(protocol.trim()))
    }

    /// Answer for an incoming client message. The first exact body match wins.
    pub fn on_message_response(&self, message: &[u8]) -> Option<&WebSocketServerResponse> {
        self.on_message
            .iter()
            .find(|entry| entry.client_request.body.as_ref() == message)
            .map(|entry| &entry.server_response)
    }
}

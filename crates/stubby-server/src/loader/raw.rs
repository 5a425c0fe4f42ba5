//! Serde shapes of the stubs YAML file.
//!
//! These mirror the file format one-to-one. Conversion into compiled stub
//! entities happens in the parent module.

use crate::stubs::{MessageType, WebSocketPolicy};
use serde::Deserialize;
use std::collections::BTreeMap;

/// A YAML scalar accepted wherever the format expects text.
///
/// Lets `page: 1` and `enabled: true` be written without quotes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    pub fn into_text(self) -> String {
        match self {
            Scalar::Text(text) => text,
            Scalar::Integer(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// `method: GET` or `method: [GET, HEAD]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => value
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect(),
            OneOrMany::Many(values) => values,
        }
    }
}

/// A main file that only lists other stubs files.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawIncludes {
    pub includes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStubEntry {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    pub request: RawRequest,
    /// A mapping, or a list of mappings for a sequence
    #[serde(default)]
    pub response: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRequest {
    pub url: String,
    #[serde(default)]
    pub method: Option<OneOrMany>,
    #[serde(default)]
    pub post: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    /// JSON text, or the pattern written inline as YAML
    #[serde(default)]
    pub json: Option<serde_yaml::Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, Scalar>,
    #[serde(default)]
    pub query: BTreeMap<String, Scalar>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawResponse {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, Scalar>,
    #[serde(default)]
    pub latency: Option<u64>,
    #[serde(default)]
    pub record: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawWebSocketEntry {
    #[serde(rename = "web-socket")]
    pub web_socket: RawWebSocket,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RawWebSocket {
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub sub_protocols: Option<String>,
    #[serde(default)]
    pub on_open: Option<RawServerResponse>,
    #[serde(default)]
    pub on_message: Vec<RawOnMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RawOnMessage {
    pub client_request: RawClientRequest,
    pub server_response: RawServerResponse,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RawClientRequest {
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RawServerResponse {
    pub policy: WebSocketPolicy,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub delay: Option<u64>,
}

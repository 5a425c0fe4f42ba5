//! YAML stubs loader.
//!
//! Turns a stubs file into compiled lifecycles and web-socket configs.
//! Everything that can fail does so here, at load time: malformed YAML,
//! unknown properties, unreadable `file` references, invalid JSON patterns,
//! duplicate uuids or web-socket URLs and empty response sequences. Matching
//! never fails afterwards.
//!
//! `file` paths are resolved against the directory of the stubs file and read
//! eagerly, so serving a request never touches the disk.
//!
//! The root is either a list of stubs or an `includes:` mapping naming other
//! stubs files, also relative to the main file. Included lists are joined in
//! the order given, so entry indices run across the whole set.

mod raw;

use crate::predicate::PatternError;
use crate::stubs::{
    StubHttpLifecycle, StubRequest, StubResponse, StubResponses, WebSocketClientRequest,
    WebSocketConfig, WebSocketOnMessage, WebSocketServerResponse,
};
use bytes::Bytes;
use raw::{
    RawClientRequest, RawIncludes, RawRequest, RawResponse, RawServerResponse, RawStubEntry, RawWebSocket,
    RawWebSocketEntry,
};
use serde_yaml::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read stubs file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed stubs YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("included stubs file {path}: {source}")]
    Include {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("entry #{index}: {source}")]
    Entry {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("entry #{index}: referenced file {path} could not be read: {source}")]
    MissingFile {
        index: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("entry #{index}: {source}")]
    Pattern {
        index: usize,
        #[source]
        source: PatternError,
    },

    #[error("entry #{index}: {message}")]
    Invalid { index: usize, message: String },
}

/// The result of loading one stubs document.
#[derive(Debug, Default)]
pub struct LoadedConfig {
    pub lifecycles: Vec<StubHttpLifecycle>,
    pub web_sockets: Vec<WebSocketConfig>,
}

/// Loads stubs documents relative to a base directory.
#[derive(Debug, Clone)]
pub struct StubLoader {
    base_dir: PathBuf,
}

impl StubLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// A loader resolving `file` references next to `config_path`.
    pub fn for_file(config_path: &Path) -> Self {
        let base_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(base_dir)
    }

    pub fn load_file(&self, path: &Path) -> Result<LoadedConfig, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let loaded = self.load_str(&contents)?;
        debug!(
            "Parsed {} stubs and {} web-socket configs from {}",
            loaded.lifecycles.len(),
            loaded.web_sockets.len(),
            path.display()
        );
        Ok(loaded)
    }

    /// Parse a stubs document: a sequence of stubs, an `includes:` mapping,
    /// or nothing at all.
    pub fn load_str(&self, yaml: &str) -> Result<LoadedConfig, ConfigError> {
        let items = match parse_root(yaml)? {
            Root::Stubs(items) => items,
            Root::Includes(includes) => {
                let mut items = Vec::new();
                for include in &includes {
                    items.extend(self.included_items(include)?);
                }
                items
            }
        };
        self.load_items(items)
    }

    /// Absolute locations of the files an `includes:` root names.
    pub fn resolve_includes(&self, yaml: &str) -> Result<Vec<PathBuf>, ConfigError> {
        Ok(match parse_root(yaml)? {
            Root::Stubs(_) => Vec::new(),
            Root::Includes(includes) => includes
                .iter()
                .map(|include| self.base_dir.join(include))
                .collect(),
        })
    }

    fn included_items(&self, include: &str) -> Result<Vec<Value>, ConfigError> {
        let path = self.base_dir.join(include);
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        let items = serde_yaml::from_str::<Option<Vec<Value>>>(&contents)
            .map_err(|source| ConfigError::Include {
                path: path.clone(),
                source,
            })?
            .unwrap_or_default();
        debug!("Included {} entries from {}", items.len(), path.display());
        Ok(items)
    }

    fn load_items(&self, items: Vec<Value>) -> Result<LoadedConfig, ConfigError> {
        let mut loaded = LoadedConfig::default();
        let mut uuids = HashSet::new();
        let mut urls = HashSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let complete_yaml = serde_yaml::to_string(&Value::Sequence(vec![item.clone()]))?;

            if is_web_socket(&item) {
                let entry: RawWebSocketEntry = serde_yaml::from_value(item)
                    .map_err(|source| ConfigError::Entry { index, source })?;
                let mut config = self.web_socket(index, entry.web_socket)?;
                if !urls.insert(config.url.clone()) {
                    return Err(invalid(index, format!("duplicate web-socket url '{}'", config.url)));
                }
                config.complete_yaml = complete_yaml;
                loaded.web_sockets.push(config);
            } else {
                let entry: RawStubEntry = serde_yaml::from_value(item)
                    .map_err(|source| ConfigError::Entry { index, source })?;
                if let Some(uuid) = &entry.uuid {
                    if !uuids.insert(uuid.clone()) {
                        return Err(invalid(index, format!("duplicate stub uuid '{uuid}'")));
                    }
                }
                let lifecycle = self.lifecycle(index, entry)?.with_complete_yaml(complete_yaml);
                loaded.lifecycles.push(lifecycle);
            }
        }

        Ok(loaded)
    }

    fn lifecycle(&self, index: usize, entry: RawStubEntry) -> Result<StubHttpLifecycle, ConfigError> {
        let request = self.request(index, entry.request)?;
        let responses = self.responses(index, entry.response)?;

        let mut lifecycle = StubHttpLifecycle::new(request, responses);
        if let Some(description) = entry.description {
            lifecycle = lifecycle.with_description(description);
        }
        if let Some(uuid) = entry.uuid {
            lifecycle = lifecycle.with_uuid(uuid);
        }
        Ok(lifecycle)
    }

    fn request(&self, index: usize, raw: RawRequest) -> Result<StubRequest, ConfigError> {
        let mut builder = StubRequest::builder(raw.url);

        for method in raw.method.map(|m| m.into_vec()).unwrap_or_default() {
            builder = builder.method(method);
        }
        for (name, value) in raw.headers {
            builder = builder.header(name, value.into_text());
        }
        for (name, value) in raw.query {
            builder = builder.query(name, value.into_text());
        }

        // `file` stands in for `post`
        match (raw.file, raw.post) {
            (Some(file), _) => {
                let bytes = self.read(index, &file)?;
                builder = builder.post(String::from_utf8_lossy(&bytes).into_owned());
            }
            (None, Some(post)) => builder = builder.post(post),
            (None, None) => {}
        }

        if let Some(json) = raw.json {
            builder = builder.json(json_pattern_text(index, json)?);
        }

        builder
            .build()
            .map_err(|source| ConfigError::Pattern { index, source })
    }

    fn responses(&self, index: usize, raw: Option<Value>) -> Result<StubResponses, ConfigError> {
        match raw {
            None | Some(Value::Null) => Ok(StubResponses::Single(StubResponse::default())),
            Some(Value::Sequence(items)) => {
                if items.is_empty() {
                    return Err(invalid(index, "response sequence is empty".to_string()));
                }
                let responses = items
                    .into_iter()
                    .map(|item| {
                        let raw: RawResponse = serde_yaml::from_value(item)
                            .map_err(|source| ConfigError::Entry { index, source })?;
                        self.response(index, raw)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(StubResponses::Sequence(responses))
            }
            Some(value) => {
                let raw: RawResponse = serde_yaml::from_value(value)
                    .map_err(|source| ConfigError::Entry { index, source })?;
                Ok(StubResponses::Single(self.response(index, raw)?))
            }
        }
    }

    fn response(&self, index: usize, raw: RawResponse) -> Result<StubResponse, ConfigError> {
        let mut response = StubResponse::default()
            .with_status(raw.status.unwrap_or(200))
            .with_record(raw.record);

        if let Some(body) = raw.body {
            response = response.with_body(body);
        }
        if let Some(file) = raw.file {
            response = response.with_file(self.read(index, &file)?);
        }
        for (name, value) in raw.headers {
            response = response.with_header(name, value.into_text());
        }
        if let Some(latency) = raw.latency {
            response = response.with_latency(latency);
        }
        Ok(response)
    }

    fn web_socket(&self, index: usize, raw: RawWebSocket) -> Result<WebSocketConfig, ConfigError> {
        let mut config = WebSocketConfig::new(raw.url);
        config.description = raw.description;
        config.uuid = raw.uuid;
        config.sub_protocols = raw
            .sub_protocols
            .as_deref()
            .map(WebSocketConfig::parse_sub_protocols)
            .unwrap_or_default();
        config.on_open = raw
            .on_open
            .map(|on_open| self.server_response(index, on_open))
            .transpose()?;
        config.on_message = raw
            .on_message
            .into_iter()
            .map(|entry| -> Result<WebSocketOnMessage, ConfigError> {
                Ok(WebSocketOnMessage {
                    client_request: self.client_request(index, entry.client_request)?,
                    server_response: self.server_response(index, entry.server_response)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(config)
    }

    fn client_request(
        &self,
        index: usize,
        raw: RawClientRequest,
    ) -> Result<WebSocketClientRequest, ConfigError> {
        Ok(WebSocketClientRequest {
            message_type: raw.message_type,
            body: self.body_or_file(index, raw.body, raw.file)?,
        })
    }

    fn server_response(
        &self,
        index: usize,
        raw: RawServerResponse,
    ) -> Result<WebSocketServerResponse, ConfigError> {
        Ok(
            WebSocketServerResponse::new(raw.policy, self.body_or_file(index, raw.body, raw.file)?)
                .with_message_type(raw.message_type)
                .with_delay(Duration::from_millis(raw.delay.unwrap_or(0))),
        )
    }

    fn body_or_file(
        &self,
        index: usize,
        body: Option<String>,
        file: Option<String>,
    ) -> Result<Bytes, ConfigError> {
        match (file, body) {
            (Some(file), _) => self.read(index, &file),
            (None, Some(body)) => Ok(Bytes::from(body)),
            (None, None) => Ok(Bytes::new()),
        }
    }

    fn read(&self, index: usize, file: &str) -> Result<Bytes, ConfigError> {
        let path = self.base_dir.join(file);
        std::fs::read(&path)
            .map(Bytes::from)
            .map_err(|source| ConfigError::MissingFile {
                index,
                path,
                source,
            })
    }
}

/// Load a stubs file, resolving `file` references next to it.
pub fn load_file(path: &Path) -> Result<LoadedConfig, ConfigError> {
    StubLoader::for_file(path).load_file(path)
}

/// The files included by the stubs file at `path`. Empty unless its root is
/// an `includes:` mapping.
pub fn included_files(path: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    StubLoader::for_file(path).resolve_includes(&contents)
}

enum Root {
    Stubs(Vec<Value>),
    Includes(Vec<String>),
}

fn parse_root(yaml: &str) -> Result<Root, ConfigError> {
    if yaml.trim().is_empty() {
        return Ok(Root::Stubs(Vec::new()));
    }
    match serde_yaml::from_str::<Value>(yaml)? {
        Value::Null => Ok(Root::Stubs(Vec::new())),
        Value::Mapping(root) if root.contains_key("includes") => {
            let raw: RawIncludes = serde_yaml::from_value(Value::Mapping(root))?;
            Ok(Root::Includes(raw.includes))
        }
        other => Ok(Root::Stubs(serde_yaml::from_value(other)?)),
    }
}

fn is_web_socket(item: &Value) -> bool {
    item.as_mapping()
        .is_some_and(|m| m.contains_key("web-socket"))
}

/// `json` is either JSON text or a YAML structure describing the pattern.
fn json_pattern_text(index: usize, value: Value) -> Result<String, ConfigError> {
    match value {
        Value::String(text) => Ok(text),
        other => serde_json::to_string(&other).map_err(|e| {
            invalid(index, format!("json pattern cannot be expressed as JSON: {e}"))
        }),
    }
}

fn invalid(index: usize, message: String) -> ConfigError {
    ConfigError::Invalid { index, message }
}

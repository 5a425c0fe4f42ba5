//! Validation of a parsed stubs document.
//!
//! The checks mirror what the server's loader enforces (errors) and add
//! heuristics for configurations that load but are probably mistakes
//! (warnings).

use crate::types::{LintIssue, LintOptions, LintResult};
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const ENTRY_KEYS: &[&str] = &["description", "uuid", "request", "response"];
const REQUEST_KEYS: &[&str] = &["url", "method", "post", "file", "json", "headers", "query"];
const RESPONSE_KEYS: &[&str] = &["status", "body", "file", "headers", "latency", "record"];
const WEB_SOCKET_ENTRY_KEYS: &[&str] = &["web-socket"];
const WEB_SOCKET_KEYS: &[&str] = &[
    "url",
    "description",
    "uuid",
    "sub-protocols",
    "on-open",
    "on-message",
];
const ON_MESSAGE_KEYS: &[&str] = &["client-request", "server-response"];
const CLIENT_REQUEST_KEYS: &[&str] = &["message-type", "body", "file"];
const SERVER_RESPONSE_KEYS: &[&str] = &["policy", "message-type", "body", "file", "delay"];

const POLICIES: &[&str] = &["once", "push", "fragmentation", "ping", "disconnect"];
const MESSAGE_TYPES: &[&str] = &["text", "binary"];
const HTTP_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "TRACE", "CONNECT",
];
const REDIRECT_STATUSES: &[u64] = &[301, 302, 303, 307, 308];
const AUTHORIZATION_SHORTHANDS: &[&str] = &[
    "authorization",
    "authorization-basic",
    "authorization-bearer",
    "authorization-custom",
];

/// Latency above which a warning is raised, in milliseconds
const LATENCY_WARN_MS: u64 = 30_000;

/// Shared context for one document.
struct Checker<'a> {
    file: &'a Path,
    /// Directory `file` references resolve against; `None` skips the checks
    base_dir: Option<&'a Path>,
    options: &'a LintOptions,
}

impl Checker<'_> {
    fn error(&self, code: &'static str, message: impl Into<String>, location: &str) -> LintIssue {
        LintIssue::error(code, message, self.file).with_location(location)
    }

    fn warning(&self, code: &'static str, message: impl Into<String>, location: &str) -> LintIssue {
        LintIssue::warning(code, message, self.file).with_location(location)
    }

    fn check_keys(&self, map: &Mapping, allowed: &[&str], location: &str, result: &mut LintResult) {
        for key in map.keys() {
            let name = key.as_str().unwrap_or("<non-string key>");
            if !allowed.contains(&name) {
                result.add_issue(
                    self.error("E006", format!("Unknown property '{name}'"), location)
                        .with_suggestion(format!("Allowed here: {}", allowed.join(", "))),
                );
            }
        }
    }

    fn check_file(&self, value: &Value, location: &str, result: &mut LintResult) {
        let Some(name) = expect_str(self, value, location, result) else {
            return;
        };
        if self.options.skip_file_checks {
            return;
        }
        if let Some(base_dir) = self.base_dir {
            let path = base_dir.join(name);
            if !path.is_file() {
                result.add_issue(
                    self.error(
                        "E012",
                        format!("Referenced file '{}' does not exist", path.display()),
                        location,
                    )
                    .with_suggestion("Paths are resolved relative to the stubs file"),
                );
            }
        }
    }

    fn check_pattern(&self, pattern: &str, location: &str, result: &mut LintResult) {
        if let Err(e) = Regex::new(pattern) {
            let issue = self
                .error("E019", format!("'{pattern}' is not a valid regex"), location)
                .with_suggestion(match e {
                    regex::Error::CompiledTooBig(_) => {
                        "Simplify the pattern; it exceeds the regex size limit".to_string()
                    }
                    _ => "Escape regex metacharacters to match them literally".to_string(),
                });
            result.add_issue(issue);
        }
    }
}

fn expect_str<'v>(
    checker: &Checker<'_>,
    value: &'v Value,
    location: &str,
    result: &mut LintResult,
) -> Option<&'v str> {
    match value.as_str() {
        Some(s) => Some(s),
        None => {
            result.add_issue(checker.error("E008", "Expected a string", location));
            None
        }
    }
}

/// Scalars accepted where text is expected (`page: 1`, `enabled: true`).
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Validate a whole stubs document.
///
/// `base_dir` is where `file` references are looked up; pass `None` to skip
/// those checks.
pub fn validate_document(
    file: &Path,
    base_dir: Option<&Path>,
    document: &Value,
    result: &mut LintResult,
    options: &LintOptions,
) {
    let checker = Checker {
        file,
        base_dir,
        options,
    };

    let entries = match document {
        Value::Null => return,
        Value::Sequence(entries) => entries,
        _ => {
            result.add_issue(
                LintIssue::error("E003", "Document root must be a list of stubs", file)
                    .with_suggestion("Start every stub with '- request:' or '- web-socket:'"),
            );
            return;
        }
    };

    let mut uuids: HashMap<String, usize> = HashMap::new();
    let mut socket_urls: HashSet<String> = HashSet::new();
    let mut requests: HashMap<&Value, usize> = HashMap::new();

    for (idx, entry) in entries.iter().enumerate() {
        let location = format!("[{idx}]");
        let Some(map) = entry.as_mapping() else {
            result.add_issue(checker.error("E004", "Entry must be a mapping", &location));
            continue;
        };

        if let Some(socket) = map.get("web-socket") {
            checker.check_keys(map, WEB_SOCKET_ENTRY_KEYS, &location, result);
            validate_web_socket(&checker, socket, idx, &mut socket_urls, result);
            continue;
        }

        let Some(request) = map.get("request") else {
            result.add_issue(
                checker
                    .error("E005", "Entry has neither 'request' nor 'web-socket'", &location)
                    .with_suggestion("Add a 'request' with at least a 'url'"),
            );
            continue;
        };

        checker.check_keys(map, ENTRY_KEYS, &location, result);
        check_uuid(&checker, map.get("uuid"), idx, &location, &mut uuids, result);
        validate_request(&checker, request, &format!("{location}.request"), result);

        match map.get("response") {
            None | Some(Value::Null) => {}
            Some(response) => {
                validate_responses(&checker, response, &format!("{location}.response"), result)
            }
        }

        if let Some(first) = requests.get(request) {
            result.add_issue(
                checker
                    .warning(
                        "W005",
                        format!("Request is identical to entry [{first}] and will never match"),
                        &location,
                    )
                    .with_suggestion("Stubs are matched in order; remove or change one of them"),
            );
        } else {
            requests.insert(request, idx);
        }

        if options.verbose && map.get("uuid").is_none() {
            result.add_issue(
                LintIssue::info("I001", "Stub has no uuid; it can only be addressed by index", file)
                    .with_location(&location),
            );
        }
    }
}

fn check_uuid(
    checker: &Checker<'_>,
    uuid: Option<&Value>,
    idx: usize,
    location: &str,
    seen: &mut HashMap<String, usize>,
    result: &mut LintResult,
) {
    let Some(uuid) = uuid else {
        return;
    };
    let location = format!("{location}.uuid");
    let Some(uuid) = expect_str(checker, uuid, &location, result) else {
        return;
    };
    if let Some(first) = seen.insert(uuid.to_string(), idx) {
        result.add_issue(checker.error(
            "E013",
            format!("Duplicate uuid '{uuid}', first used by entry [{first}]"),
            &location,
        ));
    }
}

/// Validate the `request` section of a stub.
fn validate_request(
    checker: &Checker<'_>,
    request: &Value,
    location: &str,
    result: &mut LintResult,
) {
    let Some(map) = request.as_mapping() else {
        result.add_issue(checker.error("E008", "'request' must be a mapping", location));
        return;
    };
    checker.check_keys(map, REQUEST_KEYS, location, result);

    match map.get("url") {
        None => result.add_issue(
            checker
                .error("E007", "Request is missing 'url'", location)
                .with_suggestion("Add 'url: /path' or a regex such as 'url: ^/items/\\d+$'"),
        ),
        Some(url) => {
            let url_location = format!("{location}.url");
            if let Some(url) = expect_str(checker, url, &url_location, result) {
                checker.check_pattern(url, &url_location, result);
            }
        }
    }

    if let Some(method) = map.get("method") {
        validate_methods(checker, method, &format!("{location}.method"), result);
    }

    if let Some(post) = map.get("post") {
        let post_location = format!("{location}.post");
        if let Some(post) = expect_str(checker, post, &post_location, result) {
            checker.check_pattern(post, &post_location, result);
        }
    }
    if let Some(file) = map.get("file") {
        checker.check_file(file, &format!("{location}.file"), result);
    }
    if let Some(json) = map.get("json") {
        validate_json_pattern(checker, json, &format!("{location}.json"), result);
        if map.contains_key("post") || map.contains_key("file") {
            result.add_issue(checker.warning(
                "W001",
                "Both 'json' and 'post'/'file' are set; only 'json' is used",
                location,
            ));
        }
    }

    for section in ["headers", "query"] {
        if let Some(fields) = map.get(section) {
            validate_fields(checker, fields, section, &format!("{location}.{section}"), result);
        }
    }
}

fn validate_methods(checker: &Checker<'_>, method: &Value, location: &str, result: &mut LintResult) {
    let methods: Vec<String> = match method {
        Value::String(s) => s.split(',').map(|m| m.trim().to_string()).collect(),
        Value::Sequence(items) => items
            .iter()
            .filter_map(|item| expect_str(checker, item, location, result))
            .map(str::to_string)
            .collect(),
        _ => {
            result.add_issue(checker.error(
                "E008",
                "'method' must be a string or a list of strings",
                location,
            ));
            return;
        }
    };

    for method in methods.iter().filter(|m| !m.is_empty()) {
        if !HTTP_METHODS.contains(&method.to_uppercase().as_str()) {
            result.add_issue(checker.warning(
                "W003",
                format!("Unusual HTTP method '{method}'"),
                location,
            ));
        }
    }
}

fn validate_json_pattern(checker: &Checker<'_>, json: &Value, location: &str, result: &mut LintResult) {
    let parsed = match json {
        Value::String(text) => serde_json::from_str::<serde_json::Value>(text),
        Value::Mapping(_) | Value::Sequence(_) => serde_json::to_value(json),
        _ => {
            result.add_issue(checker.error(
                "E008",
                "'json' must be JSON text or a YAML mapping/list",
                location,
            ));
            return;
        }
    };

    match parsed {
        Ok(pattern) => check_json_leaves(checker, &pattern, location, result),
        Err(e) => result.add_issue(
            checker
                .error("E011", format!("Invalid JSON pattern: {e}"), location)
                .with_suggestion("Quote the pattern as JSON text or write it as YAML"),
        ),
    }
}

/// String leaves of a JSON pattern are regexes.
fn check_json_leaves(
    checker: &Checker<'_>,
    pattern: &serde_json::Value,
    location: &str,
    result: &mut LintResult,
) {
    match pattern {
        serde_json::Value::String(text) => checker.check_pattern(text, location, result),
        serde_json::Value::Array(items) => {
            for item in items {
                check_json_leaves(checker, item, location, result);
            }
        }
        serde_json::Value::Object(fields) => {
            for value in fields.values() {
                check_json_leaves(checker, value, location, result);
            }
        }
        _ => {}
    }
}

fn validate_fields(
    checker: &Checker<'_>,
    fields: &Value,
    section: &str,
    location: &str,
    result: &mut LintResult,
) {
    let Some(map) = fields.as_mapping() else {
        result.add_issue(checker.error("E008", format!("'{section}' must be a mapping"), location));
        return;
    };

    for (name, value) in map {
        let name = name.as_str().unwrap_or("<non-string key>");
        let field_location = format!("{location}.{name}");
        let Some(text) = scalar_text(value) else {
            result.add_issue(checker.error("E008", "Expected a scalar value", &field_location));
            continue;
        };
        let is_shorthand =
            section == "headers" && AUTHORIZATION_SHORTHANDS.contains(&name.to_lowercase().as_str());
        if !is_shorthand {
            checker.check_pattern(&text, &field_location, result);
        }
    }
}

/// Validate a single response or a response sequence.
fn validate_responses(
    checker: &Checker<'_>,
    response: &Value,
    location: &str,
    result: &mut LintResult,
) {
    match response {
        Value::Sequence(items) => {
            if items.is_empty() {
                result.add_issue(checker.error("E010", "Response sequence is empty", location));
            }
            for (idx, item) in items.iter().enumerate() {
                validate_response(checker, item, &format!("{location}[{idx}]"), result);
            }
        }
        _ => validate_response(checker, response, location, result),
    }
}

fn validate_response(checker: &Checker<'_>, response: &Value, location: &str, result: &mut LintResult) {
    let Some(map) = response.as_mapping() else {
        result.add_issue(checker.error("E008", "Response must be a mapping", location));
        return;
    };
    checker.check_keys(map, RESPONSE_KEYS, location, result);

    let status_location = format!("{location}.status");
    let status = match map.get("status") {
        None => Some(200),
        Some(value) => match value.as_u64() {
            Some(status) if status <= u64::from(u16::MAX) => {
                if !(100..=599).contains(&status) {
                    result.add_issue(
                        checker
                            .warning(
                                "W007",
                                format!("Status {status} is not a standard HTTP status"),
                                &status_location,
                            )
                            .with_suggestion("Statuses below 100 are served as 500"),
                    );
                }
                Some(status)
            }
            _ => {
                result.add_issue(checker.error(
                    "E009",
                    format!("Invalid status code {}", scalar_text(value).unwrap_or_default()),
                    &status_location,
                ));
                None
            }
        },
    };

    if let Some(file) = map.get("file") {
        checker.check_file(file, &format!("{location}.file"), result);
        if map.contains_key("body") {
            result.add_issue(checker.warning(
                "W002",
                "Both 'body' and 'file' are set; 'file' wins",
                location,
            ));
        }
    }

    if let Some(latency) = map.get("latency") {
        match latency.as_u64() {
            Some(ms) if ms > LATENCY_WARN_MS => result.add_issue(checker.warning(
                "W006",
                format!("Latency of {ms}ms will likely trip client timeouts"),
                &format!("{location}.latency"),
            )),
            Some(_) => {}
            None => result.add_issue(checker.error(
                "E008",
                "'latency' must be a non-negative number of milliseconds",
                &format!("{location}.latency"),
            )),
        }
    }

    let headers_location = format!("{location}.headers");
    let mut has_location = false;
    if let Some(headers) = map.get("headers") {
        match headers.as_mapping() {
            Some(headers) => {
                for (name, value) in headers {
                    let name = name.as_str().unwrap_or("<non-string key>");
                    if scalar_text(value).is_none() {
                        result.add_issue(checker.error(
                            "E008",
                            "Expected a scalar value",
                            &format!("{headers_location}.{name}"),
                        ));
                    }
                    has_location |= name.eq_ignore_ascii_case("location");
                }
            }
            None => result.add_issue(checker.error(
                "E008",
                "'headers' must be a mapping",
                &headers_location,
            )),
        }
    }

    if let Some(status) = status {
        if has_location && !REDIRECT_STATUSES.contains(&status) {
            result.add_issue(
                checker
                    .warning(
                        "W004",
                        format!("Response has a 'location' header but status {status}; it is sent as 302"),
                        location,
                    )
                    .with_suggestion("Use one of 301, 302, 303, 307 or 308"),
            );
        }
    }
}

fn validate_web_socket(
    checker: &Checker<'_>,
    socket: &Value,
    idx: usize,
    urls: &mut HashSet<String>,
    result: &mut LintResult,
) {
    let location = format!("[{idx}].web-socket");
    let Some(map) = socket.as_mapping() else {
        result.add_issue(checker.error("E008", "'web-socket' must be a mapping", &location));
        return;
    };
    checker.check_keys(map, WEB_SOCKET_KEYS, &location, result);
    if let Some(uuid) = map.get("uuid") {
        expect_str(checker, uuid, &format!("{location}.uuid"), result);
    }

    match map.get("url") {
        None => result.add_issue(checker.error("E017", "Web-socket is missing 'url'", &location)),
        Some(url) => {
            let url_location = format!("{location}.url");
            if let Some(url) = expect_str(checker, url, &url_location, result) {
                if !urls.insert(url.to_string()) {
                    result.add_issue(checker.error(
                        "E014",
                        format!("Duplicate web-socket url '{url}'"),
                        &url_location,
                    ));
                }
            }
        }
    }

    if let Some(on_open) = map.get("on-open") {
        validate_server_response(checker, on_open, &format!("{location}.on-open"), result);
    }

    if let Some(on_message) = map.get("on-message") {
        let on_message_location = format!("{location}.on-message");
        let Some(items) = on_message.as_sequence() else {
            result.add_issue(checker.error("E008", "'on-message' must be a list", &on_message_location));
            return;
        };
        for (i, item) in items.iter().enumerate() {
            let item_location = format!("{on_message_location}[{i}]");
            let Some(item) = item.as_mapping() else {
                result.add_issue(checker.error("E008", "Expected a mapping", &item_location));
                continue;
            };
            checker.check_keys(item, ON_MESSAGE_KEYS, &item_location, result);

            match item.get("client-request") {
                Some(request) => validate_client_request(
                    checker,
                    request,
                    &format!("{item_location}.client-request"),
                    result,
                ),
                None => result.add_issue(checker.error(
                    "E018",
                    "Missing 'client-request'",
                    &item_location,
                )),
            }
            match item.get("server-response") {
                Some(response) => validate_server_response(
                    checker,
                    response,
                    &format!("{item_location}.server-response"),
                    result,
                ),
                None => result.add_issue(checker.error(
                    "E018",
                    "Missing 'server-response'",
                    &item_location,
                )),
            }
        }
    }
}

fn validate_client_request(
    checker: &Checker<'_>,
    request: &Value,
    location: &str,
    result: &mut LintResult,
) {
    let Some(map) = request.as_mapping() else {
        result.add_issue(checker.error("E008", "Expected a mapping", location));
        return;
    };
    checker.check_keys(map, CLIENT_REQUEST_KEYS, location, result);
    check_message_type(checker, map, location, result);
    if let Some(file) = map.get("file") {
        checker.check_file(file, &format!("{location}.file"), result);
    }
}

fn validate_server_response(
    checker: &Checker<'_>,
    response: &Value,
    location: &str,
    result: &mut LintResult,
) {
    let Some(map) = response.as_mapping() else {
        result.add_issue(checker.error("E008", "Expected a mapping", location));
        return;
    };
    checker.check_keys(map, SERVER_RESPONSE_KEYS, location, result);
    check_message_type(checker, map, location, result);

    match map.get("policy").and_then(Value::as_str) {
        None => result.add_issue(
            checker
                .error("E018", "Missing 'policy'", location)
                .with_suggestion(format!("Use one of: {}", POLICIES.join(", "))),
        ),
        Some(policy) if !POLICIES.contains(&policy) => result.add_issue(
            checker
                .error(
                    "E015",
                    format!("Unknown policy '{policy}'"),
                    &format!("{location}.policy"),
                )
                .with_suggestion(format!("Use one of: {}", POLICIES.join(", "))),
        ),
        Some(_) => {}
    }

    if let Some(file) = map.get("file") {
        checker.check_file(file, &format!("{location}.file"), result);
    }
    if let Some(delay) = map.get("delay") {
        if delay.as_u64().is_none() {
            result.add_issue(checker.error(
                "E008",
                "'delay' must be a non-negative number of milliseconds",
                &format!("{location}.delay"),
            ));
        }
    }
}

fn check_message_type(checker: &Checker<'_>, map: &Mapping, location: &str, result: &mut LintResult) {
    if let Some(kind) = map.get("message-type") {
        match kind.as_str() {
            Some(kind) if MESSAGE_TYPES.contains(&kind) => {}
            _ => result.add_issue(checker.error(
                "E016",
                format!(
                    "Unknown message-type '{}'",
                    scalar_text(kind).unwrap_or_default()
                ),
                &format!("{location}.message-type"),
            )),
        }
    }
}

//! Offline linting of Stubby stubs files.
//!
//! The checks follow what the server's loader accepts, so a file that lints
//! without errors loads without errors. Warnings flag stubs that load but
//! likely misbehave, such as requests shadowed by an earlier identical stub.
//!
//! A main file whose root is an `includes:` mapping is linted by linting each
//! included file, plus uuid and web-socket URL clashes between them.
//!
//! # Example
//!
//! ```no_run
//! use stubby_lint::{lint_file, LintOptions};
//! use std::path::Path;
//!
//! let result = lint_file(Path::new("stubs.yaml"), &LintOptions::default());
//! if result.has_errors() {
//!     eprintln!("Found {} errors", result.errors);
//! }
//! ```

mod types;
mod validator;

use serde_yaml::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

pub use types::{LintIssue, LintOptions, LintResult, Severity};
pub use validator::validate_document;

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

/// Lint a single stubs file. `file` references resolve against its directory.
pub fn lint_file(path: &Path, options: &LintOptions) -> LintResult {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            let mut result = LintResult::new();
            result.files_checked = 1;
            result.add_issue(LintIssue::error(
                "E001",
                format!("Failed to read file: {e}"),
                path,
            ));
            return result;
        }
    };

    lint_document(&content, path, path.parent(), options)
}

/// Lint every `.yaml`/`.yml` file in a directory (non-recursive).
pub fn lint_directory(path: &Path, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();

    let entries = match std::fs::read_dir(path) {
        Ok(e) => e,
        Err(e) => {
            result.add_issue(LintIssue::error(
                "E001",
                format!("Failed to read directory: {e}"),
                path,
            ));
            return result;
        }
    };

    let mut files: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && is_yaml(p))
        .collect();
    files.sort();

    for file in files {
        result.merge(lint_file(&file, options));
    }
    result
}

/// Lint YAML held in memory. File references are not checked.
pub fn lint_yaml(yaml: &str, source_name: &str, options: &LintOptions) -> LintResult {
    lint_document(yaml, Path::new(source_name), None, options)
}

fn lint_document(
    content: &str,
    path: &Path,
    base_dir: Option<&Path>,
    options: &LintOptions,
) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;

    let document: serde_yaml::Value = match serde_yaml::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            result.add_issue(
                LintIssue::error("E002", format!("Invalid YAML: {e}"), path)
                    .with_suggestion("Check indentation and quoting"),
            );
            return result;
        }
    };

    if is_includes_root(&document) {
        lint_includes(path, base_dir, &document, &mut result, options);
        return result;
    }

    validate_document(path, base_dir, &document, &mut result, options);
    result
}

fn is_includes_root(document: &Value) -> bool {
    document
        .as_mapping()
        .is_some_and(|root| root.contains_key("includes"))
}

fn lint_includes(
    path: &Path,
    base_dir: Option<&Path>,
    document: &Value,
    result: &mut LintResult,
    options: &LintOptions,
) {
    let Some(root) = document.as_mapping() else {
        return;
    };
    for name in root.keys().filter_map(Value::as_str) {
        if name != "includes" {
            result.add_issue(
                LintIssue::error("E006", format!("Unknown property '{name}'"), path)
                    .with_location(name)
                    .with_suggestion("A main file holds only 'includes'"),
            );
        }
    }

    let includes: Vec<&str> = match root.get("includes") {
        Some(Value::Sequence(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    let well_formed = matches!(
        root.get("includes"),
        Some(Value::Sequence(items)) if items.len() == includes.len()
    );
    if !well_formed {
        result.add_issue(
            LintIssue::error("E008", "'includes' must be a list of file paths", path)
                .with_location("includes"),
        );
        return;
    }
    let Some(base_dir) = base_dir else {
        return;
    };

    let mut uuids: HashMap<String, PathBuf> = HashMap::new();
    let mut socket_urls: HashMap<String, PathBuf> = HashMap::new();

    for (idx, include) in includes.into_iter().enumerate() {
        let include_path = base_dir.join(include);
        let Ok(content) = std::fs::read_to_string(&include_path) else {
            result.add_issue(
                LintIssue::error(
                    "E012",
                    format!("Included file '{}' does not exist", include_path.display()),
                    path,
                )
                .with_location(format!("includes[{idx}]"))
                .with_suggestion("Paths are resolved relative to the main stubs file"),
            );
            continue;
        };

        result.files_checked += 1;
        let included: Value = match serde_yaml::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                result.add_issue(LintIssue::error(
                    "E002",
                    format!("Invalid YAML: {e}"),
                    &include_path,
                ));
                continue;
            }
        };
        if is_includes_root(&included) {
            result.add_issue(
                LintIssue::error("E003", "Included files must hold a list of stubs", &include_path)
                    .with_suggestion("Includes do not nest"),
            );
            continue;
        }

        validate_document(&include_path, Some(base_dir), &included, result, options);

        let (file_uuids, file_urls) = identities(&included);
        for uuid in file_uuids {
            if let Some(other) = uuids.get(&uuid) {
                result.add_issue(LintIssue::error(
                    "E013",
                    format!("Duplicate uuid '{uuid}', also used in {}", other.display()),
                    &include_path,
                ));
            } else {
                uuids.insert(uuid, include_path.clone());
            }
        }
        for url in file_urls {
            if let Some(other) = socket_urls.get(&url) {
                result.add_issue(LintIssue::error(
                    "E014",
                    format!("Duplicate web-socket url '{url}', also used in {}", other.display()),
                    &include_path,
                ));
            } else {
                socket_urls.insert(url, include_path.clone());
            }
        }
    }
}

/// HTTP stub uuids and web-socket URLs declared by one stubs list.
fn identities(document: &Value) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut uuids = BTreeSet::new();
    let mut urls = BTreeSet::new();
    let entries = document.as_sequence().map(Vec::as_slice).unwrap_or_default();
    for entry in entries.iter().filter_map(Value::as_mapping) {
        if let Some(socket) = entry.get("web-socket") {
            if let Some(url) = socket.get("url").and_then(Value::as_str) {
                urls.insert(url.to_string());
            }
        } else if let Some(uuid) = entry.get("uuid").and_then(Value::as_str) {
            uuids.insert(uuid.to_string());
        }
    }
    (uuids, urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lint_yaml_reports_parse_errors() {
        let result = lint_yaml("- request: [unclosed", "inline", &LintOptions::default());
        assert_eq!(result.codes(), vec!["E002"]);
        assert_eq!(result.files_checked, 1);
    }

    #[test]
    fn test_lint_yaml_empty_document_is_valid() {
        let result = lint_yaml("", "inline", &LintOptions::default());
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_lint_file_missing() {
        let dir = TempDir::new().unwrap();
        let result = lint_file(&dir.path().join("absent.yaml"), &LintOptions::default());
        assert_eq!(result.codes(), vec!["E001"]);
    }

    #[test]
    fn test_lint_file_resolves_files_next_to_it() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("body.json"), "{}").unwrap();
        let stubs = dir.path().join("stubs.yaml");
        std::fs::write(&stubs, "- request: {url: /a}\n  response: {file: body.json}\n").unwrap();

        let result = lint_file(&stubs, &LintOptions::default());
        assert!(result.issues.is_empty(), "{:?}", result.issues);
    }

    #[test]
    fn test_lint_file_follows_includes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("a.yaml"),
            "- uuid: shared\n  request: {url: /a}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.yaml"),
            "- uuid: shared\n  request: {url: /b}\n- request: {uri: /c}\n",
        )
        .unwrap();
        let main = dir.path().join("main.yaml");
        std::fs::write(&main, "includes:\n  - a.yaml\n  - b.yaml\n  - gone.yaml\n").unwrap();

        let result = lint_file(&main, &LintOptions::default());
        assert_eq!(result.files_checked, 3);
        assert_eq!(result.codes(), vec!["E006", "E007", "E013", "E012"]);
        assert!(result.issues[2].file.ends_with("b.yaml"));
        assert!(result.issues[3].file.ends_with("main.yaml"));
    }

    #[test]
    fn test_includes_shape() {
        let result = lint_yaml("includes: a.yaml\nextra: 1\n", "inline", &LintOptions::default());
        assert_eq!(result.codes(), vec!["E006", "E008"]);

        let result = lint_yaml("includes: [a.yaml]\n", "inline", &LintOptions::default());
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_lint_directory_only_reads_yaml() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.yaml"), "- request: {url: /a}\n").unwrap();
        std::fs::write(dir.path().join("b.yml"), "- response: {}\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not yaml: [").unwrap();

        let result = lint_directory(dir.path(), &LintOptions::default());
        assert_eq!(result.files_checked, 2);
        assert_eq!(result.codes(), vec!["E005"]);
        assert!(result.issues[0].file.ends_with("b.yml"));
    }
}

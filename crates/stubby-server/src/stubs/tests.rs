//! Scenario tests for the stubs module.
//!
//! This module covers:
//! - End-to-end resolution through the repository
//! - Sequenced responses
//! - Match cache hits and invalidation on every mutation
//! - Index and uuid based administration
//! - Subset matching properties for headers and query parameters

use super::*;
use crate::cache::{MatchCacheConfig, NoOpMatchCache, TtlMatchCache};
use crate::recording::RequestRecorder;
use bytes::Bytes;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn stub(url: &str, body: &str) -> StubHttpLifecycle {
    StubHttpLifecycle::new(
        StubRequest::builder(url).build().unwrap(),
        StubResponse::default().with_body(body),
    )
}

fn repository_with(lifecycles: Vec<StubHttpLifecycle>) -> StubRepository {
    let repository = StubRepository::new(
        Arc::new(TtlMatchCache::new(MatchCacheConfig::default())),
        Arc::new(RequestRecorder::default()),
    );
    repository.replace_all(lifecycles).unwrap();
    repository
}

fn get(path: &str) -> ObservedRequest {
    ObservedRequest::new("GET", path)
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_literal_match_returns_default() {
    let repository = repository_with(vec![stub("/hello", "world")]);

    let resolved = repository.resolve(&get("/hello"));
    assert_eq!(resolved.outcome, ResponseOutcome::Default);
    assert_eq!(resolved.status, 200);
    assert_eq!(resolved.body, Bytes::from_static(b"world"));
    assert_eq!(resolved.header(RESOURCE_ID_HEADER), Some("0"));
}

#[test]
fn test_no_match_returns_not_found() {
    let repository = repository_with(vec![stub("/hello", "world")]);

    let resolved = repository.resolve(&ObservedRequest::new("DELETE", "/nowhere"));
    assert_eq!(resolved.outcome, ResponseOutcome::NotFound);
    assert_eq!(resolved.status, 404);
    let text = resolved.body_text();
    assert!(text.contains("DELETE"));
    assert!(text.contains("/nowhere"));
}

#[test]
fn test_invoice_scenario() {
    let invoice = StubHttpLifecycle::new(
        StubRequest::builder(r"^/invoice/(\d+)$")
            .method("GET")
            .query("status", "active")
            .header("content-type", "application/json")
            .build()
            .unwrap(),
        StubResponse::default()
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": <% url.1 %>, "status": "<% query.status.0 %>"}"#),
    );
    let repository = repository_with(vec![invoice]);

    let observed = get("/invoice/123")
        .with_query_string(Some("status=active&page=1"))
        .with_header("Content-Type", "application/json")
        .with_header("User-Agent", "test");
    let resolved = repository.resolve(&observed);

    assert_eq!(resolved.outcome, ResponseOutcome::Default);
    assert_eq!(
        resolved.body_text(),
        r#"{"id": 123, "status": "active"}"#
    );
    assert_eq!(resolved.header("content-type"), Some("application/json"));

    let wrong_status = get("/invoice/123")
        .with_query("status", "archived")
        .with_header("content-type", "application/json");
    assert_eq!(
        repository.resolve(&wrong_status).outcome,
        ResponseOutcome::NotFound
    );
}

#[test]
fn test_authorization_scenario() {
    let secured = StubHttpLifecycle::new(
        StubRequest::builder("/secure")
            .header("authorization-basic", "bob:secret")
            .build()
            .unwrap(),
        StubResponse::default().with_body("welcome"),
    );
    let repository = repository_with(vec![secured]);

    let ok = get("/secure").with_header("Authorization", "Basic Ym9iOnNlY3JldA==");
    assert_eq!(repository.resolve(&ok).outcome, ResponseOutcome::Default);

    let missing = repository.resolve(&get("/secure"));
    assert_eq!(missing.outcome, ResponseOutcome::Unauthorized);
    assert_eq!(missing.status, 401);

    let wrong = get("/secure").with_header("authorization", "Basic Ym9iOndyb25n");
    let resolved = repository.resolve(&wrong);
    assert_eq!(resolved.outcome, ResponseOutcome::Unauthorized);
    assert!(resolved.body_text().contains("'Basic Ym9iOndyb25n'"));
    assert!(resolved.body_text().contains("'bob:wrong'"));
}

#[test]
fn test_order_first_configured_wins() {
    let repository = repository_with(vec![
        stub(r"^/orders/.*$", "catch-all"),
        stub("/orders/1", "specific"),
    ]);

    let resolved = repository.resolve(&get("/orders/1"));
    assert_eq!(resolved.body_text(), "catch-all");
    assert_eq!(resolved.lifecycle_index, Some(0));
}

#[test]
fn test_sequence_repeats_last_response() {
    let sequenced = StubHttpLifecycle::new(
        StubRequest::builder("/poll").build().unwrap(),
        vec![
            StubResponse::default().with_status(202).with_body("pending"),
            StubResponse::default().with_status(200).with_body("done"),
        ],
    );
    let repository = repository_with(vec![sequenced]);

    let statuses: Vec<u16> = (0..4).map(|_| repository.resolve(&get("/poll")).status).collect();
    assert_eq!(statuses, vec![202, 200, 200, 200]);
}

#[test]
fn test_sequence_advances_through_cache_hits() {
    let sequenced = StubHttpLifecycle::new(
        StubRequest::builder("/poll").build().unwrap(),
        vec![
            StubResponse::default().with_body("1"),
            StubResponse::default().with_body("2"),
            StubResponse::default().with_body("3"),
        ],
    );
    let repository = repository_with(vec![sequenced]);

    let bodies: Vec<String> = (0..3)
        .map(|_| repository.resolve(&get("/poll")).body_text())
        .collect();
    assert_eq!(bodies, vec!["1", "2", "3"]);
    assert_eq!(repository.scans(), 1);
}

#[test]
fn test_latency_is_returned_not_slept() {
    let slow = StubHttpLifecycle::new(
        StubRequest::builder("/slow").build().unwrap(),
        StubResponse::default().with_latency(250),
    );
    let repository = repository_with(vec![slow]);

    let started = std::time::Instant::now();
    let resolved = repository.resolve(&get("/slow"));
    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(resolved.latency, Some(Duration::from_millis(250)));
}

// ============================================================================
// Match cache
// ============================================================================

#[test]
fn test_cache_hit_skips_scan() {
    let repository = repository_with(vec![stub("/a", "a"), stub("/b", "b")]);

    repository.resolve(&get("/b"));
    repository.resolve(&get("/b"));
    repository.resolve(&get("/b"));

    assert_eq!(repository.scans(), 1);
    let metrics = repository.cache_metrics();
    assert_eq!(metrics.hits, 2);
    assert_eq!(metrics.inserts, 1);
}

#[test]
fn test_cache_keeps_captures() {
    let repository = repository_with(vec![StubHttpLifecycle::new(
        StubRequest::builder(r"^/users/(\w+)$").build().unwrap(),
        StubResponse::default().with_body("user <% url.1 %>"),
    )]);

    assert_eq!(repository.resolve(&get("/users/ann")).body_text(), "user ann");
    assert_eq!(repository.resolve(&get("/users/ann")).body_text(), "user ann");
    assert_eq!(repository.scans(), 1);
}

#[test]
fn test_not_found_is_never_cached() {
    let repository = repository_with(vec![stub("/a", "a")]);

    repository.resolve(&get("/missing"));
    repository.resolve(&get("/missing"));

    assert_eq!(repository.scans(), 2);
    assert_eq!(repository.cache_metrics().inserts, 0);
}

#[test]
fn test_replace_all_invalidates_cache() {
    let repository = repository_with(vec![stub("/a", "old")]);
    assert_eq!(repository.resolve(&get("/a")).body_text(), "old");

    repository.replace_all(vec![stub("/a", "new")]).unwrap();
    assert_eq!(repository.resolve(&get("/a")).body_text(), "new");
    assert_eq!(repository.scans(), 2);
}

#[test]
fn test_update_invalidates_cache() {
    let repository = repository_with(vec![stub("/a", "old"), stub("/b", "b")]);
    repository.resolve(&get("/a"));

    repository.update_by_index(0, stub("/a", "updated")).unwrap();
    assert_eq!(repository.resolve(&get("/a")).body_text(), "updated");
    assert_eq!(repository.cache_metrics().invalidations, 2);
}

#[test]
fn test_delete_invalidates_cache() {
    let repository = repository_with(vec![stub("/a", "a"), stub("/b", "b")]);
    repository.resolve(&get("/b"));

    repository.delete_by_index(0).unwrap();
    let resolved = repository.resolve(&get("/b"));
    assert_eq!(resolved.body_text(), "b");
    assert_eq!(resolved.header(RESOURCE_ID_HEADER), Some("0"));
}

#[test]
fn test_noop_cache_always_scans() {
    let repository = StubRepository::new(Arc::new(NoOpMatchCache), Arc::new(RequestRecorder::default()));
    repository.replace_all(vec![stub("/a", "a")]).unwrap();

    for _ in 0..3 {
        repository.resolve(&get("/a"));
    }
    assert_eq!(repository.scans(), 3);
}

// ============================================================================
// Administration
// ============================================================================

#[test]
fn test_delete_by_index_reindexes() {
    let repository = repository_with(vec![stub("/0", "0"), stub("/1", "1"), stub("/2", "2")]);

    let removed = repository.delete_by_index(1).unwrap();
    assert_eq!(removed.request.url.source(), "/1");
    assert_eq!(repository.count(), 2);

    let moved = repository.get_by_index(1).unwrap();
    assert_eq!(moved.index, 1);
    assert_eq!(moved.request.url.source(), "/2");
    assert!(!repository.exists_by_index(2));
}

#[test]
fn test_index_errors() {
    let repository = repository_with(vec![stub("/a", "a")]);

    assert_eq!(
        repository.get_by_index(5).unwrap_err(),
        RepositoryError::IndexNotFound(5)
    );
    assert_eq!(
        repository.delete_by_index(1).unwrap_err(),
        RepositoryError::IndexNotFound(1)
    );
    assert_eq!(
        repository.update_by_index(3, stub("/x", "x")).unwrap_err(),
        RepositoryError::IndexNotFound(3)
    );
    assert_eq!(repository.count(), 1);
}

#[test]
fn test_update_keeps_other_indices_and_resets_sequence() {
    let sequenced = StubHttpLifecycle::new(
        StubRequest::builder("/seq").build().unwrap(),
        vec![
            StubResponse::default().with_body("first"),
            StubResponse::default().with_body("second"),
        ],
    );
    let repository = repository_with(vec![stub("/a", "a"), sequenced]);
    repository.resolve(&get("/seq"));

    let replacement = StubHttpLifecycle::new(
        StubRequest::builder("/seq").build().unwrap(),
        vec![
            StubResponse::default().with_body("fresh"),
            StubResponse::default().with_body("later"),
        ],
    );
    repository.update_by_index(1, replacement).unwrap();

    assert_eq!(repository.get_by_index(0).unwrap().request.url.source(), "/a");
    assert_eq!(repository.resolve(&get("/seq")).body_text(), "fresh");
}

#[test]
fn test_sequence_survives_reindexing() {
    let sequenced = StubHttpLifecycle::new(
        StubRequest::builder("/seq").build().unwrap(),
        vec![
            StubResponse::default().with_body("first"),
            StubResponse::default().with_body("second"),
        ],
    );
    let repository = repository_with(vec![stub("/a", "a"), sequenced]);
    assert_eq!(repository.resolve(&get("/seq")).body_text(), "first");

    repository.delete_by_index(0).unwrap();
    assert_eq!(repository.resolve(&get("/seq")).body_text(), "second");
}

#[test]
fn test_uuid_operations() {
    let repository = repository_with(vec![
        stub("/a", "a").with_uuid("uuid-a"),
        stub("/b", "b").with_uuid("uuid-b").with_complete_yaml("- request:\n    url: /b\n"),
    ]);

    assert_eq!(repository.get_by_uuid("uuid-b").unwrap().index, 1);
    assert_eq!(
        repository.marshalled_text_by_uuid("uuid-b").unwrap(),
        "- request:\n    url: /b\n"
    );

    repository
        .update_by_uuid("uuid-a", stub("/a2", "a2").with_uuid("uuid-a"))
        .unwrap();
    assert_eq!(repository.resolve(&get("/a2")).body_text(), "a2");

    let removed = repository.delete_by_uuid("uuid-a").unwrap();
    assert_eq!(removed.request.url.source(), "/a2");
    assert_eq!(repository.get_by_uuid("uuid-b").unwrap().index, 0);

    assert_eq!(
        repository.get_by_uuid("uuid-a").unwrap_err(),
        RepositoryError::UuidNotFound("uuid-a".to_string())
    );
}

#[test]
fn test_invalid_replacement_keeps_previous_stubs() {
    let repository = repository_with(vec![stub("/a", "a")]);

    let duplicate = vec![stub("/x", "x").with_uuid("same"), stub("/y", "y").with_uuid("same")];
    assert!(matches!(
        repository.replace_all(duplicate),
        Err(RepositoryError::Invalid(_))
    ));

    let empty_sequence = vec![StubHttpLifecycle::new(
        StubRequest::builder("/z").build().unwrap(),
        Vec::<StubResponse>::new(),
    )];
    assert!(repository.replace_all(empty_sequence).is_err());

    assert_eq!(repository.count(), 1);
    assert_eq!(repository.resolve(&get("/a")).body_text(), "a");
}

#[test]
fn test_append_and_delete_all() {
    let repository = repository_with(vec![stub("/a", "a")]);
    repository.append(vec![stub("/b", "b")]).unwrap();

    assert_eq!(repository.count(), 2);
    assert_eq!(repository.get_by_index(1).unwrap().index, 1);

    repository.delete_all();
    assert_eq!(repository.count(), 0);
    assert_eq!(repository.resolve(&get("/a")).outcome, ResponseOutcome::NotFound);
}

#[test]
fn test_dump_complete_yaml_and_stats() {
    let repository = repository_with(vec![
        stub("/a", "a").with_complete_yaml("- request:\n    url: /a\n"),
        stub("/b", "b").with_complete_yaml("- request:\n    url: /b\n"),
    ]);
    repository.resolve(&get("/b"));
    repository.resolve(&get("/b"));

    assert_eq!(
        repository.dump_complete_yaml(),
        "- request:\n    url: /a\n\n- request:\n    url: /b\n\n"
    );
    assert_eq!(repository.marshalled_text_by_index(0).unwrap(), "- request:\n    url: /a\n");

    let stats = repository.resource_stats();
    assert_eq!(stats[0].hits, 0);
    assert_eq!(stats[1].hits, 2);
    assert_eq!(stats[1].url, "/b");
}

#[test]
fn test_web_socket_lookup() {
    let repository = StubRepository::default();
    let mut chat = WebSocketConfig::new("/chat");
    chat.sub_protocols = vec!["echo".to_string()];

    repository
        .replace_all_with_web_sockets(vec![stub("/a", "a")], vec![chat, WebSocketConfig::new("/feed")])
        .unwrap();

    assert_eq!(repository.web_sockets().len(), 2);
    assert!(repository
        .web_socket_by_url("/chat")
        .unwrap()
        .supports_sub_protocol("echo"));
    assert!(repository.web_socket_by_url("/none").is_none());

    // HTTP-only replacement keeps web-socket configs
    repository.replace_all(vec![stub("/b", "b")]).unwrap();
    assert_eq!(repository.web_sockets().len(), 2);

    let duplicate = repository.replace_all_with_web_sockets(
        vec![],
        vec![WebSocketConfig::new("/x"), WebSocketConfig::new("/x")],
    );
    assert!(matches!(duplicate, Err(RepositoryError::Invalid(_))));
}

#[test]
fn test_concurrent_resolve_and_replace() {
    let repository = Arc::new(repository_with(vec![stub("/a", "a")]));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let repository = Arc::clone(&repository);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let resolved = repository.resolve(&get("/a"));
                    assert!(matches!(resolved.body_text().as_str(), "a" | "b"));
                }
            })
        })
        .collect();

    for i in 0..50 {
        let body = if i % 2 == 0 { "b" } else { "a" };
        repository.replace_all(vec![stub("/a", body)]).unwrap();
    }
    for reader in readers {
        reader.join().unwrap();
    }

    repository.replace_all(vec![stub("/a", "final")]).unwrap();
    assert_eq!(repository.resolve(&get("/a")).body_text(), "final");
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_extra_headers_and_query_never_break_a_match(
        extra_headers in proptest::collection::btree_map("x-[a-z]{1,8}", "[a-zA-Z0-9]{0,12}", 0..6),
        extra_query in proptest::collection::btree_map("[a-z]{1,8}", "[a-zA-Z0-9]{0,12}", 0..6),
    ) {
        let request = StubRequest::builder("/search")
            .header("accept", "application/json")
            .query("q", "rust")
            .build()
            .unwrap();

        let mut observed = get("/search")
            .with_header("Accept", "application/json");
        for (name, value) in &extra_headers {
            observed = observed.with_header(name.clone(), value.clone());
        }
        for (name, value) in &extra_query {
            if name != "q" {
                observed = observed.with_query(name.clone(), value.clone());
            }
        }
        observed = observed.with_query("q", "rust");

        prop_assert!(request.matches(&observed).is_some());
    }

    #[test]
    fn prop_missing_expected_header_never_matches(
        other in proptest::collection::btree_map("x-[a-z]{1,8}", "[a-z]{0,8}", 0..6),
    ) {
        let request = StubRequest::builder("/search")
            .header("accept", "application/json")
            .build()
            .unwrap();

        let mut observed = get("/search");
        for (name, value) in &other {
            observed = observed.with_header(name.clone(), value.clone());
        }

        prop_assert!(request.matches(&observed).is_none());
    }
}

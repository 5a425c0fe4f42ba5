//! The active stub set.
//!
//! Readers clone the current [`Snapshot`] under a short read lock and match
//! without holding any lock. Writers serialize on a mutex, build a new snapshot,
//! swap it in and clear the match cache before releasing the mutex.
//!
//! Every snapshot carries a generation number. Cache entries remember the
//! generation they were computed against, so a put that races with a swap can
//! only ever produce a miss.

use super::matcher::{find_match, LifecycleMatch};
use super::resolver::{resolve_outcome, ResolvedResponse};
use super::types::{ObservedRequest, StubHttpLifecycle};
use super::websocket::WebSocketConfig;
use crate::cache::{create_match_cache, CacheMetrics, CachedMatch, MatchCache, MatchCacheConfig};
use crate::recording::RequestRecorder;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("stub at index {0} does not exist")]
    IndexNotFound(usize),

    #[error("stub with uuid '{0}' does not exist")]
    UuidNotFound(String),

    #[error("invalid stub configuration: {0}")]
    Invalid(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Immutable view of the configured stubs.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub generation: u64,
    pub lifecycles: Vec<Arc<StubHttpLifecycle>>,
    pub web_sockets: Vec<Arc<WebSocketConfig>>,
}

impl Snapshot {
    fn validate(&self) -> RepositoryResult<()> {
        let mut uuids = HashSet::new();
        for lifecycle in &self.lifecycles {
            if lifecycle.request.methods.is_empty() {
                return Err(RepositoryError::Invalid(format!(
                    "stub for '{}' accepts no HTTP method",
                    lifecycle.request.url.source()
                )));
            }
            if lifecycle.responses.is_empty() {
                return Err(RepositoryError::Invalid(format!(
                    "stub for '{}' has an empty response sequence",
                    lifecycle.request.url.source()
                )));
            }
            if let Some(uuid) = &lifecycle.uuid {
                if !uuids.insert(uuid.as_str()) {
                    return Err(RepositoryError::Invalid(format!("duplicate stub uuid '{uuid}'")));
                }
            }
        }

        let mut urls = HashSet::new();
        for web_socket in &self.web_sockets {
            if !urls.insert(web_socket.url.as_str()) {
                return Err(RepositoryError::Invalid(format!(
                    "duplicate web-socket url '{}'",
                    web_socket.url
                )));
            }
        }
        Ok(())
    }

    fn position_of_uuid(&self, uuid: &str) -> RepositoryResult<usize> {
        self.lifecycles
            .iter()
            .position(|l| l.uuid.as_deref() == Some(uuid))
            .ok_or_else(|| RepositoryError::UuidNotFound(uuid.to_string()))
    }
}

/// Hit counter for one stub, reported by the admin status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStat {
    pub resource_id: usize,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub hits: u64,
}

pub struct StubRepository {
    snapshot: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
    cache: Arc<dyn MatchCache>,
    recorder: Arc<RequestRecorder>,
    scans: AtomicU64,
}

impl Default for StubRepository {
    fn default() -> Self {
        Self::new(
            create_match_cache(&MatchCacheConfig::default()),
            Arc::new(RequestRecorder::default()),
        )
    }
}

impl StubRepository {
    pub fn new(cache: Arc<dyn MatchCache>, recorder: Arc<RequestRecorder>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            writer: Mutex::new(()),
            cache,
            recorder,
            scans: AtomicU64::new(0),
        }
    }

    /// Current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn recorder(&self) -> &Arc<RequestRecorder> {
        &self.recorder
    }

    // ------------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------------

    /// Match `observed` and build the response to send.
    pub fn resolve(&self, observed: &ObservedRequest) -> ResolvedResponse {
        let snapshot = self.snapshot();
        let matched = self.find(&snapshot, observed);

        let selected = matched.as_ref().map(|m| {
            let lifecycle = &snapshot.lifecycles[m.index];
            lifecycle.record_hit();
            (lifecycle.as_ref(), &m.captures)
        });
        resolve_outcome(observed, selected, &self.recorder)
    }

    fn find(&self, snapshot: &Snapshot, observed: &ObservedRequest) -> Option<LifecycleMatch> {
        let fingerprint = observed.fingerprint();
        if let Some(hit) = self.cache.get(fingerprint) {
            if hit.generation == snapshot.generation && hit.index < snapshot.lifecycles.len() {
                trace!("Serving {} {} from match cache", observed.method, observed.path);
                return Some(LifecycleMatch {
                    index: hit.index,
                    captures: hit.captures,
                });
            }
        }

        self.scans.fetch_add(1, Ordering::Relaxed);
        let matched = find_match(observed, &snapshot.lifecycles)?;
        self.cache.put(
            fingerprint,
            CachedMatch {
                generation: snapshot.generation,
                index: matched.index,
                captures: matched.captures.clone(),
            },
        );
        Some(matched)
    }

    /// Number of full list scans performed so far.
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    pub fn cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Build and install a new snapshot from the current one.
    ///
    /// `change` returns the new lifecycle and web-socket lists. The result is
    /// re-indexed and validated; on error the current snapshot stays active.
    fn mutate<T, F>(&self, change: F) -> RepositoryResult<T>
    where
        F: FnOnce(&Snapshot) -> RepositoryResult<(Vec<Arc<StubHttpLifecycle>>, Vec<Arc<WebSocketConfig>>, T)>,
    {
        let _writer = self.writer.lock();
        let current = self.snapshot();
        let (lifecycles, web_sockets, output) = change(&current)?;

        let next = Snapshot {
            generation: current.generation + 1,
            lifecycles: reindex(lifecycles),
            web_sockets,
        };
        next.validate()?;

        let count = next.lifecycles.len();
        *self.snapshot.write() = Arc::new(next);
        self.cache.invalidate_all();
        debug!("Installed stub snapshot with {} stubs", count);
        Ok(output)
    }

    /// Replace every HTTP stub. Web-socket configs are kept.
    pub fn replace_all(&self, lifecycles: Vec<StubHttpLifecycle>) -> RepositoryResult<()> {
        self.mutate(|current| {
            Ok((
                lifecycles.into_iter().map(Arc::new).collect(),
                current.web_sockets.clone(),
                (),
            ))
        })
    }

    /// Replace HTTP stubs and web-socket configs together.
    pub fn replace_all_with_web_sockets(
        &self,
        lifecycles: Vec<StubHttpLifecycle>,
        web_sockets: Vec<WebSocketConfig>,
    ) -> RepositoryResult<()> {
        let stubs = lifecycles.len();
        let sockets = web_sockets.len();
        self.mutate(|_| {
            Ok((
                lifecycles.into_iter().map(Arc::new).collect(),
                web_sockets.into_iter().map(Arc::new).collect(),
                (),
            ))
        })?;
        info!("Loaded {} stubs and {} web-socket configs", stubs, sockets);
        Ok(())
    }

    /// Add stubs after the existing ones.
    pub fn append(&self, lifecycles: Vec<StubHttpLifecycle>) -> RepositoryResult<()> {
        self.mutate(|current| {
            let mut next = current.lifecycles.clone();
            next.extend(lifecycles.into_iter().map(Arc::new));
            Ok((next, current.web_sockets.clone(), ()))
        })
    }

    pub fn update_by_index(&self, index: usize, lifecycle: StubHttpLifecycle) -> RepositoryResult<()> {
        self.mutate(|current| {
            if index >= current.lifecycles.len() {
                return Err(RepositoryError::IndexNotFound(index));
            }
            let mut next = current.lifecycles.clone();
            next[index] = Arc::new(lifecycle);
            Ok((next, current.web_sockets.clone(), ()))
        })
    }

    pub fn update_by_uuid(&self, uuid: &str, lifecycle: StubHttpLifecycle) -> RepositoryResult<()> {
        self.mutate(|current| {
            let index = current.position_of_uuid(uuid)?;
            let mut next = current.lifecycles.clone();
            next[index] = Arc::new(lifecycle);
            Ok((next, current.web_sockets.clone(), ()))
        })
    }

    /// Remove one stub. Later stubs move down by one.
    pub fn delete_by_index(&self, index: usize) -> RepositoryResult<Arc<StubHttpLifecycle>> {
        self.mutate(|current| {
            if index >= current.lifecycles.len() {
                return Err(RepositoryError::IndexNotFound(index));
            }
            let mut next = current.lifecycles.clone();
            let removed = next.remove(index);
            Ok((next, current.web_sockets.clone(), removed))
        })
    }

    pub fn delete_by_uuid(&self, uuid: &str) -> RepositoryResult<Arc<StubHttpLifecycle>> {
        self.mutate(|current| {
            let index = current.position_of_uuid(uuid)?;
            let mut next = current.lifecycles.clone();
            let removed = next.remove(index);
            Ok((next, current.web_sockets.clone(), removed))
        })
    }

    /// Remove every HTTP stub and web-socket config.
    pub fn delete_all(&self) {
        // An empty snapshot always validates
        let _ = self.mutate(|_| Ok((Vec::new(), Vec::new(), ())));
        info!("Deleted all stubs");
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn count(&self) -> usize {
        self.snapshot().lifecycles.len()
    }

    pub fn exists_by_index(&self, index: usize) -> bool {
        index < self.count()
    }

    pub fn get_by_index(&self, index: usize) -> RepositoryResult<Arc<StubHttpLifecycle>> {
        self.snapshot()
            .lifecycles
            .get(index)
            .cloned()
            .ok_or(RepositoryError::IndexNotFound(index))
    }

    pub fn get_by_uuid(&self, uuid: &str) -> RepositoryResult<Arc<StubHttpLifecycle>> {
        let snapshot = self.snapshot();
        let index = snapshot.position_of_uuid(uuid)?;
        Ok(Arc::clone(&snapshot.lifecycles[index]))
    }

    /// The YAML fragment stub `index` was loaded from.
    pub fn marshalled_text_by_index(&self, index: usize) -> RepositoryResult<String> {
        self.get_by_index(index).map(|l| l.complete_yaml.clone())
    }

    pub fn marshalled_text_by_uuid(&self, uuid: &str) -> RepositoryResult<String> {
        self.get_by_uuid(uuid).map(|l| l.complete_yaml.clone())
    }

    /// Every loaded fragment, HTTP stubs first, separated by blank lines.
    pub fn dump_complete_yaml(&self) -> String {
        let snapshot = self.snapshot();
        snapshot
            .lifecycles
            .iter()
            .map(|l| l.complete_yaml.trim_end())
            .chain(snapshot.web_sockets.iter().map(|w| w.complete_yaml.trim_end()))
            .filter(|fragment| !fragment.is_empty())
            .map(|fragment| format!("{fragment}\n\n"))
            .collect()
    }

    pub fn resource_stats(&self) -> Vec<ResourceStat> {
        self.snapshot()
            .lifecycles
            .iter()
            .map(|l| ResourceStat {
                resource_id: l.index,
                url: l.request.url.source().to_string(),
                uuid: l.uuid.clone(),
                hits: l.hit_count(),
            })
            .collect()
    }

    pub fn web_sockets(&self) -> Vec<Arc<WebSocketConfig>> {
        self.snapshot().web_sockets.clone()
    }

    /// Config for an upgrade request to `url`, for the embedding socket transport.
    pub fn web_socket_by_url(&self, url: &str) -> Option<Arc<WebSocketConfig>> {
        self.snapshot()
            .web_sockets
            .iter()
            .find(|w| w.url == url)
            .cloned()
    }
}

/// Make `index` match list position, keeping shared per-stub state.
fn reindex(lifecycles: Vec<Arc<StubHttpLifecycle>>) -> Vec<Arc<StubHttpLifecycle>> {
    lifecycles
        .into_iter()
        .enumerate()
        .map(|(position, lifecycle)| {
            if lifecycle.index == position {
                lifecycle
            } else {
                Arc::new(lifecycle.reindexed(position))
            }
        })
        .collect()
}

//! Reloading the stubs file.
//!
//! [`reload`] is shared by the admin `/refresh` endpoint and [`StubsWatcher`],
//! which polls the modification times of the main file and of every file its
//! `includes:` root names. A file that fails to load leaves the active stubs
//! untouched.

use crate::loader;
use crate::stubs::StubRepository;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Load `path` and install its contents. Returns the number of HTTP stubs.
pub fn reload(repository: &StubRepository, path: &Path) -> Result<usize, anyhow::Error> {
    let result = loader::load_file(path)
        .with_context(|| format!("Failed to load stubs from {}", path.display()))
        .and_then(|loaded| {
            let count = loaded.lifecycles.len();
            repository
                .replace_all_with_web_sockets(loaded.lifecycles, loaded.web_sockets)
                .context("Stubs file rejected")?;
            Ok(count)
        });

    if let Err(e) = &result {
        warn!("reload aborted, previous stubs untouched: {:#}", e);
    }
    result
}

/// Polls a stubs file, plus any files it includes, and reloads whenever a
/// modification time changes.
pub struct StubsWatcher {
    path: PathBuf,
    interval: Duration,
    repository: Arc<StubRepository>,
}

impl StubsWatcher {
    pub fn new(path: PathBuf, interval: Duration, repository: Arc<StubRepository>) -> Self {
        Self {
            path,
            interval,
            repository,
        }
    }

    /// Watch until the task is dropped.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let mut files = self.watched_files();
        info!(
            "Watching {} file(s) from {} for changes every {:?}",
            files.len(),
            self.path.display(),
            self.interval
        );

        let mut last_seen = stamps(&files);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let current = stamps(&files);
            if current == last_seen {
                continue;
            }
            last_seen = current;

            if let Some(missing) = files.iter().find(|file| modified(file).is_none()) {
                debug!("{} is not readable, keeping current stubs", missing.display());
                continue;
            }

            info!("{} changed, reloading stubs", self.path.display());
            if let Ok(count) = reload(&self.repository, &self.path) {
                info!("Reloaded {} stubs from {}", count, self.path.display());
            }

            // The main file may now name a different set of includes.
            let refreshed = self.watched_files();
            if refreshed != files {
                debug!("Now watching {} file(s)", refreshed.len());
                files = refreshed;
                last_seen = stamps(&files);
            }
        }
    }

    fn watched_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.path.clone()];
        match loader::included_files(&self.path) {
            Ok(includes) => files.extend(includes),
            Err(e) => debug!("Includes of {} unavailable: {}", self.path.display(), e),
        }
        files
    }
}

fn stamps(files: &[PathBuf]) -> Vec<Option<SystemTime>> {
    files.iter().map(|file| modified(file)).collect()
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

//! Admin portal for inspecting and changing the loaded stubs at runtime.
//!
//! Endpoints:
//! - `GET /` dumps every loaded YAML fragment
//! - `GET|PUT|DELETE /{index|uuid}` reads, replaces or removes one stub
//! - `POST /` replaces the stubs with a YAML payload (`?append=true` extends them)
//! - `DELETE /` removes everything
//! - `GET /status` reports counts, match-cache metrics and per-stub hits
//! - `POST /refresh` reloads the stubs file given at startup
//! - `GET|DELETE /recorded` and `GET /recorded/{correlation id}` expose recorded requests
//!
//! Errors use the body `{"errors": [{"code": "...", "message": "..."}]}`.

mod handlers;
mod router;
mod server;
mod types;

pub use server::AdminApiServer;

use crate::loader::StubLoader;
use crate::stubs::StubRepository;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared state behind every admin request.
pub struct AdminState {
    pub repository: Arc<StubRepository>,
    /// Stubs file given at startup, reloaded by `/refresh`
    pub data_file: Option<PathBuf>,
}

impl AdminState {
    pub fn new(repository: Arc<StubRepository>, data_file: Option<PathBuf>) -> Self {
        Self {
            repository,
            data_file,
        }
    }

    /// Loader for posted payloads. `file` references resolve next to the stubs file.
    fn loader(&self) -> StubLoader {
        match &self.data_file {
            Some(path) => StubLoader::for_file(path),
            None => StubLoader::new("."),
        }
    }
}

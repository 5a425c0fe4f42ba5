use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stubby_server::admin_api::{AdminApiServer, AdminState};
use stubby_server::config::ServerConfig;
use stubby_server::server::StubsServer;
use stubby_server::watcher::StubsWatcher;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// HTTP stub server driven by a YAML stubs file
#[derive(Parser, Debug)]
#[command(name = "stubby")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server settings file (YAML). Flags below override its values.
    #[arg(long, env = "STUBBY_CONFIG")]
    config: Option<PathBuf>,

    /// Stubs YAML file to load at startup
    #[arg(short, long, env = "STUBBY_DATA")]
    data: Option<PathBuf>,

    /// Interface to bind both listeners to
    #[arg(short, long, env = "STUBBY_LOCATION")]
    location: Option<String>,

    /// Port of the stubs listener
    #[arg(short, long, env = "STUBBY_STUBS_PORT")]
    stubs_port: Option<u16>,

    /// Port of the admin portal
    #[arg(short, long, env = "STUBBY_ADMIN_PORT")]
    admin_port: Option<u16>,

    /// Reload the stubs file when it changes
    #[arg(short, long, env = "STUBBY_WATCH")]
    watch: bool,

    /// Polling interval of the file watcher
    #[arg(long, env = "STUBBY_WATCH_INTERVAL_MS")]
    watch_interval_ms: Option<u64>,

    /// Scan the stub list on every request
    #[arg(long, env = "STUBBY_DISABLE_MATCH_CACHE")]
    disable_match_cache: bool,

    /// Lifetime of a cached match
    #[arg(long, env = "STUBBY_CACHE_TTL_SECONDS")]
    cache_ttl_seconds: Option<u64>,

    /// Maximum number of cached matches
    #[arg(long, env = "STUBBY_CACHE_MAX_SIZE")]
    cache_max_size: Option<usize>,

    /// Maximum number of recorded requests kept in memory
    #[arg(long, env = "STUBBY_RECORDER_CAPACITY")]
    recorder_capacity: Option<usize>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", env = "STUBBY_LOG_FORMAT")]
    log_format: LogFormat,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, anyhow::Error> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(data) = self.data {
            config.data = Some(data);
        }
        if let Some(location) = self.location {
            config.location = location;
        }
        if let Some(port) = self.stubs_port {
            config.stubs_port = port;
        }
        if let Some(port) = self.admin_port {
            config.admin_port = port;
        }
        if self.watch {
            config.watch = true;
        }
        if let Some(interval) = self.watch_interval_ms {
            config.watch_interval_ms = interval;
        }
        if self.disable_match_cache {
            config.match_cache.enabled = false;
        }
        if let Some(ttl) = self.cache_ttl_seconds {
            config.match_cache.ttl_seconds = ttl;
        }
        if let Some(max_size) = self.cache_max_size {
            config.match_cache.max_size = max_size;
        }
        if let Some(capacity) = self.recorder_capacity {
            config.recorder_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_logging(args.log_format);

    let config = args.into_config()?;
    let repository = stubby_server::build_repository(&config)?;

    let stubs = StubsServer::new(config.stubs_addr()?, Arc::clone(&repository));
    let admin = AdminApiServer::new(
        config.admin_addr()?,
        Arc::new(AdminState::new(Arc::clone(&repository), config.data.clone())),
    );

    let watcher = async {
        match (&config.data, config.watch) {
            (Some(path), true) => {
                StubsWatcher::new(
                    path.clone(),
                    Duration::from_millis(config.watch_interval_ms),
                    Arc::clone(&repository),
                )
                .run()
                .await
            }
            _ => std::future::pending().await,
        }
    };

    info!(
        "Stubby {} started with {} stubs",
        env!("CARGO_PKG_VERSION"),
        repository.count()
    );

    tokio::select! {
        result = stubs.run() => result.context("Stubs listener failed")?,
        result = admin.run() => result.context("Admin listener failed")?,
        result = watcher => result.context("File watcher failed")?,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        }
    }
    Ok(())
}

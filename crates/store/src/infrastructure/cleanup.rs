//! Periodic Token Cleanup Task
//!
//! Drives `TokenStore::prune_expired` on a fixed interval, removing tokens
//! past the configured minimum lifespan.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use oidstore_config::CleanupConfig;
use oidstore_errors::StoreResult;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::stores::TokenStore;

pub struct TokenCleanupTask {
    store: Arc<TokenStore>,
    options: CleanupConfig,
}

impl TokenCleanupTask {
    pub fn new(store: Arc<TokenStore>, options: CleanupConfig) -> Self {
        Self { store, options }
    }

    /// Spawn the background task, or return `None` when token cleanup is
    /// disabled by configuration. The task stops when `shutdown` fires; a
    /// failed sweep is logged and the task keeps ticking.
    pub fn start(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if !self.options.is_token_cleanup_enabled {
            info!("Token cleanup task disabled by configuration");
            return None;
        }

        Some(tokio::spawn(async move {
            info!("Token cleanup task started");
            let mut ticker = interval(Duration::from_secs(self.options.interval_secs));

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.run_sweep(&shutdown).await {
                            Ok(()) => {}
                            Err(e) if e.is_cancelled() => break,
                            Err(e) => error!(error = %e, "Token cleanup sweep failed"),
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("Token cleanup task received shutdown signal");
                        break;
                    }
                }
            }
            info!("Token cleanup task stopped");
        }))
    }

    async fn run_sweep(&self, cancel: &CancellationToken) -> StoreResult<()> {
        let threshold =
            Utc::now() - chrono::Duration::seconds(self.options.minimum_token_lifespan_secs as i64);

        self.store.prune_expired(threshold, cancel).await
    }
}

//! Background token refresher
//!
//! Scans stored tokens on a fixed interval and renews any inside the
//! background refresh buffer, with bounded retry per user. A cycle never
//! takes the process down: exhausted retries are logged and the token is
//! revisited on the next tick. Users flagged for re-authorization are
//! skipped until they complete consent again.

use crate::auth::manager::AuthManager;
use crate::config::AuthConfig;
use crate::retry::{retry_async, RetryPolicy};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info};

/// Outcome of one refresher pass over the token store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshCycleStats {
    /// Tokens checked
    pub checked: usize,
    /// Tokens successfully renewed
    pub refreshed: usize,
    /// Tokens whose refresh failed after all attempts
    pub failed: usize,
    /// Tokens skipped because the user must re-authorize
    pub skipped: usize,
}

/// Periodic refresh task over all stored tokens
pub struct BackgroundRefresher {
    manager: Arc<AuthManager>,
    config: AuthConfig,
    running: Arc<RwLock<bool>>,
}

impl BackgroundRefresher {
    pub fn new(manager: Arc<AuthManager>, config: AuthConfig) -> Self {
        Self {
            manager,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Spawn the interval loop; idempotent
    pub async fn start(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                return;
            }
            *running = true;
        }

        info!(
            interval = ?self.config.refresh_check_interval,
            buffer = ?self.config.refresh_buffer,
            "starting background token refresher"
        );

        let manager = self.manager.clone();
        let config = self.config.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            let mut ticker = interval(config.refresh_check_interval);
            // The first tick fires immediately; skip it so startup is quiet
            ticker.tick().await;

            while *running.read().await {
                ticker.tick().await;
                if !*running.read().await {
                    break;
                }
                let stats = Self::run_cycle(&manager, &config).await;
                debug!(
                    checked = stats.checked,
                    refreshed = stats.refreshed,
                    failed = stats.failed,
                    skipped = stats.skipped,
                    "refresh cycle complete"
                );
            }
        });
    }

    /// Signal the loop to exit after its current tick
    pub async fn stop(&self) {
        info!("stopping background token refresher");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// One pass over every stored token; also callable directly by tests
    /// and shutdown hooks
    pub async fn run_cycle(manager: &AuthManager, config: &AuthConfig) -> RefreshCycleStats {
        let mut stats = RefreshCycleStats::default();

        let tokens = match manager.stored_tokens().await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!(error = %e, "cannot list stored tokens, skipping cycle");
                return stats;
            }
        };

        let policy = RetryPolicy {
            max_attempts: config.max_refresh_attempts,
            initial_backoff: config.refresh_backoff_initial,
            max_backoff: config.refresh_backoff_initial * 8,
            jitter: false,
        };

        for (user_id, token) in tokens {
            stats.checked += 1;

            if !token.should_refresh(config.refresh_buffer) {
                continue;
            }
            if manager.needs_reauthorization(&user_id).await {
                stats.skipped += 1;
                continue;
            }

            let outcome = retry_async(&policy, "token_refresh", || {
                manager.ensure_fresh(&user_id, config.refresh_buffer)
            })
            .await;

            match outcome {
                Ok(_) => stats.refreshed += 1,
                Err(e) if e.is_auth_error() => {
                    // Fatal: refresh token dead, user flagged inside the manager
                    error!(user = user_id, error = %e, "refresh token invalid, user must re-authorize");
                    stats.failed += 1;
                }
                Err(e) => {
                    error!(
                        user = user_id,
                        attempts = policy.max_attempts,
                        error = %e,
                        "token refresh failed, will retry next cycle"
                    );
                    stats.failed += 1;
                }
            }
        }

        stats
    }
}

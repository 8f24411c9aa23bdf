//! Request-path token authenticator with single-flight refresh
//!
//! `access_token` is called before every outbound platform request. When a
//! token is inside the refresh buffer, exactly one caller performs the
//! refresh; concurrent callers for the same user queue on a per-user lock
//! and observe the winner's result through a re-check against the store.

use crate::auth::models::{AuthorizationRequest, TokenSet};
use crate::auth::oauth::OAuthFlow;
use crate::auth::store::TokenStore;
use crate::config::AuthConfig;
use crate::error::{Result, UnihomeError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Coordinates token storage, refresh and re-authorization state
pub struct AuthManager {
    flow: OAuthFlow,
    store: Arc<dyn TokenStore>,
    access_buffer: Duration,

    /// Per-user refresh locks; held across the refresh HTTP call and
    /// dropped when the user is revoked
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,

    /// Users whose refresh token was rejected; cleared by re-authorization
    needs_reauth: RwLock<HashSet<String>>,

    /// Successful refresh calls, for health reporting and tests
    refreshes: AtomicU64,
}

impl AuthManager {
    pub fn new(flow: OAuthFlow, store: Arc<dyn TokenStore>, config: &AuthConfig) -> Self {
        Self {
            flow,
            store,
            access_buffer: config.access_refresh_buffer,
            locks: Mutex::new(HashMap::new()),
            needs_reauth: RwLock::new(HashSet::new()),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Begin the consent flow for a new user
    pub fn authorization_request(&self) -> Result<AuthorizationRequest> {
        self.flow.authorization_request()
    }

    /// Complete the consent flow: exchange the callback code and persist
    pub async fn authorize_user(&self, user_id: &str, code: &str) -> Result<TokenSet> {
        let token = self.flow.exchange_code(user_id, code).await?;
        self.store.save(&token).await?;
        self.needs_reauth.write().await.remove(user_id);
        info!(user = user_id, "user authorized");
        Ok(token)
    }

    /// A valid bearer token for the user, refreshing first when due
    pub async fn access_token(&self, user_id: &str) -> Result<String> {
        // Fast path: fresh token, no lock taken
        let token = self.load_required(user_id).await?;
        if !token.should_refresh(self.access_buffer) {
            return Ok(token.access_token);
        }
        let token = self.ensure_fresh(user_id, self.access_buffer).await?;
        Ok(token.access_token)
    }

    /// Refresh the user's token if it is inside `buffer`, serialized per user
    ///
    /// Callers arriving while a refresh is in flight block on the user lock
    /// and find the already-refreshed token on re-check, so a burst of N
    /// concurrent callers produces exactly one provider call.
    pub async fn ensure_fresh(&self, user_id: &str, buffer: Duration) -> Result<TokenSet> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let token = self.load_required(user_id).await?;
        if !token.should_refresh(buffer) {
            return Ok(token);
        }

        if self.needs_reauth.read().await.contains(user_id) {
            return Err(UnihomeError::authentication(format!(
                "user {user_id} must re-authorize before tokens can be issued"
            )));
        }

        match self.flow.refresh(&token).await {
            Ok(refreshed) => {
                self.store.save(&refreshed).await?;
                self.refreshes.fetch_add(1, Ordering::Relaxed);
                Ok(refreshed)
            }
            Err(e) if e.is_auth_error() => {
                self.needs_reauth.write().await.insert(user_id.to_string());
                warn!(user = user_id, "marking user for re-authorization");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Revoke and forget the user's tokens
    pub async fn revoke_user(&self, user_id: &str) -> Result<()> {
        if let Some(token) = self.store.load(user_id).await? {
            self.flow.revoke(&token).await?;
        }
        self.store.remove(user_id).await?;
        self.needs_reauth.write().await.remove(user_id);
        self.locks.lock().await.remove(user_id);
        info!(user = user_id, "user tokens revoked");
        Ok(())
    }

    /// Whether the user's refresh token was rejected and consent must be redone
    pub async fn needs_reauthorization(&self, user_id: &str) -> bool {
        self.needs_reauth.read().await.contains(user_id)
    }

    /// All stored token sets, keyed by user id
    pub async fn stored_tokens(&self) -> Result<HashMap<String, TokenSet>> {
        self.store.load_all().await
    }

    /// Successful refresh calls since construction
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    async fn load_required(&self, user_id: &str) -> Result<TokenSet> {
        self.store.load(user_id).await?.ok_or_else(|| {
            UnihomeError::authentication(format!(
                "no tokens stored for user {user_id}; authorize first"
            ))
        })
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::OAuthConfig;
    use crate::auth::store::MemoryTokenStore;
    use crate::types::Platform;
    use chrono::Utc;

    fn fresh_token(user_id: &str) -> TokenSet {
        TokenSet {
            user_id: user_id.to_string(),
            platform: Platform::SmartThings,
            access_token: format!("at-{user_id}"),
            refresh_token: Some(format!("rt-{user_id}")),
            token_type: "bearer".to_string(),
            scope: None,
            obtained_at: Utc::now(),
            expires_at: Some(Utc::now() + chrono::Duration::hours(24)),
        }
    }

    #[tokio::test]
    async fn revocation_drops_the_per_user_lock() {
        let store = Arc::new(MemoryTokenStore::new());
        store.save(&fresh_token("alice")).await.unwrap();
        let manager = AuthManager::new(
            OAuthFlow::new(
                OAuthConfig::smartthings("client-1", "secret-1", "https://example.com/callback"),
                reqwest::Client::new(),
            ),
            store,
            &AuthConfig::default(),
        );

        // A day from expiry: the lock entry appears without a provider call
        manager
            .ensure_fresh("alice", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(manager.locks.lock().await.len(), 1);

        // SmartThings has no revocation endpoint, so this is store-only
        manager.revoke_user("alice").await.unwrap();
        assert!(manager.locks.lock().await.is_empty());
    }
}

//! Token persistence backends
//!
//! Tokens are keyed by user id. Updates replace the whole token set in one
//! write, so the store never holds a half-updated access/refresh pair. The
//! file backend writes atomically (temp file then rename) and keeps the
//! store owner-readable only on Unix.

use crate::auth::models::TokenSet;
use crate::error::{Result, UnihomeError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Storage backend for OAuth token sets
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load all stored tokens, keyed by user id
    async fn load_all(&self) -> Result<HashMap<String, TokenSet>>;

    /// Load the token for one user
    async fn load(&self, user_id: &str) -> Result<Option<TokenSet>>;

    /// Insert or replace the token for a user
    async fn save(&self, token: &TokenSet) -> Result<()>;

    /// Remove the token for a user; removing a missing token is not an error
    async fn remove(&self, user_id: &str) -> Result<()>;
}

/// JSON-file-backed token store
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store at an explicit path; parent directories are created on first save
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the default location under the platform config directory
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir().ok_or_else(|| {
            UnihomeError::configuration("no config directory available on this system")
        })?;
        Ok(Self::new(dir.join("unihome").join("tokens.json")))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn read_map(&self) -> Result<HashMap<String, TokenSet>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            UnihomeError::configuration(format!(
                "cannot read token store {}: {e}",
                self.path.display()
            ))
        })?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| UnihomeError::configuration(format!("corrupt token store: {e}")))
    }

    async fn write_map(&self, tokens: &HashMap<String, TokenSet>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                UnihomeError::configuration(format!(
                    "cannot create token store directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(tokens)?;

        // Temp file then rename keeps the store readable at every instant
        let temp = self.path.with_extension("tmp");
        fs::write(&temp, json)
            .await
            .map_err(|e| UnihomeError::configuration(format!("cannot write token store: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = fs::set_permissions(&temp, perms).await {
                warn!(path = %temp.display(), error = %e, "cannot restrict token store permissions");
            }
        }

        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| UnihomeError::configuration(format!("cannot replace token store: {e}")))?;

        debug!(path = %self.path.display(), count = tokens.len(), "token store written");
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load_all(&self) -> Result<HashMap<String, TokenSet>> {
        self.read_map().await
    }

    async fn load(&self, user_id: &str) -> Result<Option<TokenSet>> {
        Ok(self.read_map().await?.remove(user_id))
    }

    async fn save(&self, token: &TokenSet) -> Result<()> {
        let mut tokens = self.read_map().await?;
        tokens.insert(token.user_id.clone(), token.clone());
        self.write_map(&tokens).await
    }

    async fn remove(&self, user_id: &str) -> Result<()> {
        let mut tokens = self.read_map().await?;
        if tokens.remove(user_id).is_some() {
            self.write_map(&tokens).await?;
        }
        Ok(())
    }
}

/// In-memory token store for tests and ephemeral setups
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Arc<RwLock<HashMap<String, TokenSet>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load_all(&self) -> Result<HashMap<String, TokenSet>> {
        Ok(self.tokens.read().await.clone())
    }

    async fn load(&self, user_id: &str) -> Result<Option<TokenSet>> {
        Ok(self.tokens.read().await.get(user_id).cloned())
    }

    async fn save(&self, token: &TokenSet) -> Result<()> {
        self.tokens
            .write()
            .await
            .insert(token.user_id.clone(), token.clone());
        Ok(())
    }

    async fn remove(&self, user_id: &str) -> Result<()> {
        self.tokens.write().await.remove(user_id);
        Ok(())
    }
}

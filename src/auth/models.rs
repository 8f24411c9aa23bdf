//! OAuth token and provider models

use crate::types::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OAuth provider endpoints and client credentials for one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Platform this configuration authenticates against
    pub platform: Platform,

    pub client_id: String,
    pub client_secret: String,

    /// Authorization endpoint (user-facing consent page)
    pub authorize_url: String,

    /// Token endpoint (code exchange and refresh)
    pub token_url: String,

    /// Revocation endpoint, for providers that have one
    #[serde(default)]
    pub revoke_url: Option<String>,

    /// Registered redirect URI
    pub redirect_uri: String,

    /// Scopes requested during authorization
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// SmartThings OAuth endpoints with the standard device scopes
    pub fn smartthings(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            platform: Platform::SmartThings,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_url: "https://api.smartthings.com/oauth/authorize".to_string(),
            token_url: "https://auth-global.api.smartthings.com/oauth/token".to_string(),
            revoke_url: None,
            redirect_uri: redirect_uri.into(),
            scopes: vec![
                "r:devices:*".to_string(),
                "x:devices:*".to_string(),
                "r:locations:*".to_string(),
                "r:scenes:*".to_string(),
                "x:scenes:*".to_string(),
            ],
        }
    }
}

/// Wire shape of an OAuth token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Lifetime in seconds, when the provider reports one
    #[serde(default)]
    pub expires_in: Option<u64>,

    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// A stored access/refresh token pair for one authorized user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    /// User the pair was issued to; the token store key
    pub user_id: String,

    pub platform: Platform,

    pub access_token: String,

    /// Absent for providers issuing non-refreshable tokens
    #[serde(default)]
    pub refresh_token: Option<String>,

    pub token_type: String,

    #[serde(default)]
    pub scope: Option<String>,

    /// When the token pair was obtained or last refreshed
    pub obtained_at: DateTime<Utc>,

    /// Access token expiry; `None` means the provider reported no lifetime
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Build a token set from a token endpoint response
    ///
    /// `expires_at` is computed against the local clock at call time. An
    /// `expires_in` too large to represent as a timestamp leaves the token
    /// without an expiry.
    pub fn from_response(
        platform: Platform,
        user_id: impl Into<String>,
        response: TokenResponse,
    ) -> Self {
        let obtained_at = Utc::now();
        let expires_at = response.expires_in.and_then(|secs| {
            let lifetime = chrono::Duration::try_seconds(i64::try_from(secs).ok()?)?;
            obtained_at.checked_add_signed(lifetime)
        });
        Self {
            user_id: user_id.into(),
            platform,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type,
            scope: response.scope,
            obtained_at,
            expires_at,
        }
    }

    /// Whether the access token is past its expiry
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at,
            None => false,
        }
    }

    /// Whether the token is inside the refresh buffer before expiry
    ///
    /// Tokens without a reported lifetime are never proactively refreshed.
    pub fn should_refresh(&self, buffer: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let buffer = chrono::Duration::from_std(buffer)
                    .unwrap_or_else(|_| chrono::Duration::seconds(0));
                Utc::now() >= expires_at - buffer
            }
            None => false,
        }
    }

    /// Remaining lifetime, when known and not yet expired
    pub fn remaining(&self) -> Option<chrono::Duration> {
        self.expires_at.map(|at| at - Utc::now()).filter(|d| *d > chrono::Duration::zero())
    }

    /// `Authorization` header value for platform calls
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Whether this token can be refreshed at all
    pub fn refreshable(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Pending authorization started by [`OAuthFlow::authorization_request`]
///
/// The `state` value must round-trip through the provider and be checked
/// on callback before the code is exchanged.
///
/// [`OAuthFlow::authorization_request`]: crate::auth::OAuthFlow::authorization_request
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Fully composed consent URL to open in a browser
    pub url: String,

    /// CSRF state embedded in the URL
    pub state: String,
}

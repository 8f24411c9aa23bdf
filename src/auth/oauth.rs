//! OAuth 2.0 authorization-code flow against a platform provider
//!
//! All token endpoint calls POST form-encoded bodies with HTTP Basic
//! client credentials. Refresh rejections (`invalid_grant`, 400, 401) are
//! fatal authentication failures that require the user to re-authorize;
//! transport problems stay retryable.

use crate::auth::models::{AuthorizationRequest, OAuthConfig, TokenResponse, TokenSet};
use crate::error::{Result, UnihomeError};
use crate::logging::redact;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Stateless OAuth client for one provider
pub struct OAuthFlow {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl OAuthFlow {
    pub fn new(config: OAuthConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Compose the consent URL with a fresh CSRF state
    ///
    /// The caller must verify the returned `state` against the callback
    /// before exchanging the code.
    pub fn authorization_request(&self) -> Result<AuthorizationRequest> {
        let state = Uuid::new_v4().simple().to_string();
        let mut url = Url::parse(&self.config.authorize_url).map_err(|e| {
            UnihomeError::configuration(format!(
                "invalid authorize url '{}': {e}",
                self.config.authorize_url
            ))
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", &state);

        Ok(AuthorizationRequest {
            url: url.to_string(),
            state,
        })
    }

    /// Exchange an authorization code for the initial token pair
    pub async fn exchange_code(&self, user_id: &str, code: &str) -> Result<TokenSet> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &self.config.client_id),
            ("redirect_uri", &self.config.redirect_uri),
        ];
        let response = self.token_request(&params).await?;
        let token = TokenSet::from_response(self.config.platform, user_id, response);
        info!(
            platform = %token.platform,
            user = user_id,
            token = %redact(&token.access_token),
            expires_at = ?token.expires_at,
            "authorization code exchanged"
        );
        Ok(token)
    }

    /// Exchange a refresh token for a new access/refresh pair
    ///
    /// The returned set keeps the previous refresh token when the provider
    /// omits one from the response.
    pub async fn refresh(&self, token: &TokenSet) -> Result<TokenSet> {
        let refresh_token = token.refresh_token.as_deref().ok_or_else(|| {
            UnihomeError::authentication(format!(
                "no refresh token stored for user {}; re-authorization required",
                token.user_id
            ))
        })?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.config.client_id),
        ];
        let response = match self.token_request(&params).await {
            Ok(response) => response,
            Err(e) if refresh_rejected(&e) => {
                warn!(user = token.user_id, "refresh token rejected by provider");
                return Err(UnihomeError::authentication(format!(
                    "refresh token for user {} invalid or revoked; re-authorization required",
                    token.user_id
                )));
            }
            Err(e) => return Err(e),
        };

        let mut refreshed = TokenSet::from_response(self.config.platform, &token.user_id, response);
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = token.refresh_token.clone();
        }
        debug!(
            user = token.user_id,
            token = %redact(&refreshed.access_token),
            expires_at = ?refreshed.expires_at,
            "access token refreshed"
        );
        Ok(refreshed)
    }

    /// Best-effort token revocation
    ///
    /// A 404 from the provider means the token is already gone and counts
    /// as success. Providers without a revocation endpoint are a no-op.
    pub async fn revoke(&self, token: &TokenSet) -> Result<()> {
        let revoke_url = match &self.config.revoke_url {
            Some(url) => url,
            None => {
                debug!(platform = %self.config.platform, "provider has no revocation endpoint");
                return Ok(());
            }
        };

        let response = self
            .http
            .post(revoke_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("token", token.access_token.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status.as_u16() == 404 {
            debug!(user = token.user_id, status = status.as_u16(), "token revoked");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(UnihomeError::from_status(
            status.as_u16(),
            format!("token revocation failed: {body}"),
        ))
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = format!("token endpoint returned {status}: {body}");
            // At the token endpoint 400/401 always mean the grant or the
            // client credentials are bad, not a malformed request
            return Err(match status.as_u16() {
                400 | 401 => UnihomeError::authentication(detail),
                code => UnihomeError::from_status(code, detail),
            });
        }

        Ok(response.json::<TokenResponse>().await?)
    }
}

/// Whether a token endpoint failure means the refresh token itself is dead
fn refresh_rejected(error: &UnihomeError) -> bool {
    if error.is_auth_error() {
        return true;
    }
    let text = error.to_string().to_lowercase();
    text.contains("invalid_grant") || text.contains("invalid_token")
}

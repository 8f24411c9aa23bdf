//! OAuth token lifecycle
//!
//! Two cooperating halves keep platform credentials usable: the
//! request-path [`AuthManager`] refreshes tokens just-in-time with
//! single-flight deduplication, and the [`BackgroundRefresher`] renews
//! everything in the store ahead of expiry on a fixed interval.

pub mod manager;
pub mod models;
pub mod oauth;
pub mod refresher;
pub mod store;

pub use manager::AuthManager;
pub use models::{AuthorizationRequest, OAuthConfig, TokenResponse, TokenSet};
pub use oauth::OAuthFlow;
pub use refresher::{BackgroundRefresher, RefreshCycleStats};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};

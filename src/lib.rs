//! Unified smart-home device control across cloud platforms
//!
//! This crate puts heterogeneous smart-home clouds (SmartThings, Tuya,
//! Lutron) behind one adapter contract and routes device operations
//! through a single registry, so callers address every device by a
//! `platform:deviceId` universal id and never touch platform SDKs.
//!
//! # Features
//!
//! - One [`adapter::DeviceAdapter`] trait per platform, with capability
//!   mapping between platform codes and the unified model
//! - [`registry::PlatformRegistry`] routing, fan-out aggregation, and
//!   graceful degradation across platforms
//! - [`history::HistoryEngine`] time-range event queries with retention
//!   clamping and connectivity gap detection
//! - OAuth token lifecycle with single-flight refresh and a background
//!   refresher ([`auth`])
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use unihome::adapters::{SmartThingsAdapter, SmartThingsConfig};
//! use unihome::auth::{AuthManager, FileTokenStore, OAuthConfig, OAuthFlow};
//! use unihome::registry::PlatformRegistry;
//! use unihome::types::Platform;
//! use unihome::UnihomeConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = UnihomeConfig::load()?;
//!     let http = reqwest::Client::new();
//!
//!     let oauth = OAuthConfig::smartthings("client-id", "client-secret", "https://app/callback");
//!     let store = Arc::new(FileTokenStore::default_location()?);
//!     let auth = Arc::new(AuthManager::new(
//!         OAuthFlow::new(oauth, http.clone()),
//!         store,
//!         &config.auth,
//!     ));
//!
//!     let registry = Arc::new(PlatformRegistry::new(config.registry.clone()));
//!     let adapter = SmartThingsAdapter::new(SmartThingsConfig::default(), auth, http)?;
//!     registry
//!         .register_adapter(Platform::SmartThings, Arc::new(adapter))
//!         .await?;
//!
//!     let devices = registry.list_all_devices(&Default::default()).await?;
//!     println!("{} devices", devices.len());
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod adapters;
pub mod auth;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod registry;
pub mod retry;
pub mod types;

// Re-export main types
pub use crate::{
    adapter::{BatchCommand, BatchMode, BatchOptions, CommandOptions, DeviceAdapter, DeviceFilters},
    config::UnihomeConfig,
    error::{ErrorKind, Result, UnihomeError},
    history::{DeviceEventHistory, DeviceEventQuery, HistoryEngine},
    registry::{PlatformRegistry, RegistryHealth},
    types::{
        CommandResult, DeviceCapability, DeviceCommand, DeviceState, Platform, UnifiedDevice,
        UniversalDeviceId,
    },
};

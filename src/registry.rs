//! Platform registry
//!
//! Owns every registered [`DeviceAdapter`], routes universal device ids to
//! the adapter behind them, and fans aggregate operations out across
//! platforms. Adapter events are re-emitted on a single broadcast channel
//! tagged with their platform.

use crate::adapter::{CommandOptions, DeviceAdapter, DeviceFilters};
use crate::config::RegistryConfig;
use crate::error::{Result, UnihomeError};
use crate::types::{
    AdapterEvent, AdapterHealthStatus, CommandResult, DeviceCommand, DeviceState, Platform,
    RegistryEvent, UnifiedDevice, UniversalDeviceId,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// An adapter slot together with its event forwarding task
struct RegisteredAdapter {
    adapter: Arc<dyn DeviceAdapter>,
    forwarder: JoinHandle<()>,
}

/// Resolution of a universal device id to its owning adapter
pub struct DeviceRoute {
    pub platform: Platform,
    /// Platform-local device id, as the adapter expects it
    pub device_id: String,
    pub adapter: Arc<dyn DeviceAdapter>,
}

impl std::fmt::Debug for DeviceRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRoute")
            .field("platform", &self.platform)
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

/// Aggregate health across all registered adapters
///
/// The registry counts as healthy while at least one adapter is.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryHealth {
    pub healthy: bool,
    pub adapters: Vec<AdapterHealthStatus>,
}

/// Routing and aggregation layer over all platform adapters
pub struct PlatformRegistry {
    config: RegistryConfig,
    adapters: Arc<RwLock<HashMap<Platform, RegisteredAdapter>>>,

    /// Universal id string to owning platform; purely a fast path, routing
    /// resolves correctly with it disabled
    routing_cache: Arc<RwLock<HashMap<String, Platform>>>,

    events: broadcast::Sender<RegistryEvent>,

    /// Serializes register/unregister process-wide; a second concurrent
    /// attempt fails fast instead of queuing
    registration_gate: Mutex<()>,
}

impl PlatformRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            config,
            adapters: Arc::new(RwLock::new(HashMap::new())),
            routing_cache: Arc::new(RwLock::new(HashMap::new())),
            events,
            registration_gate: Mutex::new(()),
        }
    }

    /// Receiver for platform-tagged adapter events
    pub fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Register and initialize an adapter for a platform
    ///
    /// The adapter is initialized before it becomes visible, so a
    /// registered adapter is always a usable one. Rejects when the platform
    /// already has an adapter or when the adapter claims a different
    /// platform than the registration key.
    pub async fn register_adapter(
        &self,
        platform: Platform,
        adapter: Arc<dyn DeviceAdapter>,
    ) -> Result<()> {
        let _gate = self.registration_gate.try_lock().map_err(|_| {
            UnihomeError::configuration("adapter registration already in progress")
        })?;

        if adapter.platform() != platform {
            return Err(UnihomeError::configuration(format!(
                "adapter reports platform '{}' but was registered as '{platform}'",
                adapter.platform()
            )));
        }
        if self.adapters.read().await.contains_key(&platform) {
            return Err(UnihomeError::configuration(format!(
                "platform '{platform}' is already registered"
            )));
        }

        adapter.initialize().await?;

        let forwarder = self.spawn_forwarder(platform, adapter.subscribe_events());
        self.adapters
            .write()
            .await
            .insert(platform, RegisteredAdapter { adapter, forwarder });
        info!(platform = %platform, "adapter registered");
        Ok(())
    }

    /// Shut an adapter down and remove it, purging its routing entries
    pub async fn unregister_adapter(&self, platform: Platform) -> Result<()> {
        let _gate = self.registration_gate.try_lock().map_err(|_| {
            UnihomeError::configuration("adapter registration already in progress")
        })?;

        let Some(slot) = self.adapters.write().await.remove(&platform) else {
            return Err(UnihomeError::configuration(format!(
                "platform '{platform}' is not registered"
            )));
        };

        slot.forwarder.abort();
        if let Err(e) = slot.adapter.shutdown().await {
            warn!(platform = %platform, error = %e, "adapter shutdown failed");
        }

        // No stale route may survive the adapter
        self.routing_cache
            .write()
            .await
            .retain(|_, cached| *cached != platform);
        info!(platform = %platform, "adapter unregistered");
        Ok(())
    }

    /// Unregister every adapter, logging failures rather than stopping
    pub async fn shutdown_all(&self) {
        for platform in self.platforms().await {
            if let Err(e) = self.unregister_adapter(platform).await {
                warn!(platform = %platform, error = %e, "unregister during shutdown failed");
            }
        }
    }

    pub async fn platforms(&self) -> Vec<Platform> {
        self.adapters.read().await.keys().copied().collect()
    }

    pub async fn adapter(&self, platform: Platform) -> Option<Arc<dyn DeviceAdapter>> {
        self.adapters
            .read()
            .await
            .get(&platform)
            .map(|slot| slot.adapter.clone())
    }

    /// Resolve a universal device id to the adapter that owns it
    ///
    /// A cache hit skips id validation entirely; a stale hit on a removed
    /// adapter evicts the entry and re-resolves.
    pub async fn adapter_for_device(&self, id: &str) -> Result<DeviceRoute> {
        if self.config.routing_cache {
            let cached = self.routing_cache.read().await.get(id).copied();
            if let Some(platform) = cached {
                let local = id
                    .strip_prefix(platform.as_str())
                    .and_then(|rest| rest.strip_prefix(':'));
                let adapter = self.adapter(platform).await;
                match (local, adapter) {
                    (Some(local), Some(adapter)) => {
                        return Ok(DeviceRoute {
                            platform,
                            device_id: local.to_string(),
                            adapter,
                        });
                    }
                    _ => {
                        debug!(device = id, "evicting stale routing-cache entry");
                        self.routing_cache.write().await.remove(id);
                    }
                }
            }
        }

        let parsed = UniversalDeviceId::parse(id)?;
        let adapter = self.adapter(parsed.platform()).await.ok_or_else(|| {
            UnihomeError::device_not_found(format!(
                "no adapter registered for platform '{}' (device '{id}')",
                parsed.platform()
            ))
        })?;

        if self.config.routing_cache {
            self.routing_cache
                .write()
                .await
                .insert(id.to_string(), parsed.platform());
        }
        Ok(DeviceRoute {
            platform: parsed.platform(),
            device_id: parsed.device_id().to_string(),
            adapter,
        })
    }

    pub async fn get_device(&self, id: &str) -> Result<UnifiedDevice> {
        let route = self.adapter_for_device(id).await?;
        route.adapter.get_device(&route.device_id).await
    }

    pub async fn get_device_state(&self, id: &str) -> Result<DeviceState> {
        let route = self.adapter_for_device(id).await?;
        route.adapter.get_device_state(&route.device_id).await
    }

    pub async fn refresh_device_state(&self, id: &str) -> Result<DeviceState> {
        let route = self.adapter_for_device(id).await?;
        route.adapter.refresh_device_state(&route.device_id).await
    }

    pub async fn execute_command(
        &self,
        id: &str,
        command: &DeviceCommand,
        options: &CommandOptions,
    ) -> Result<CommandResult> {
        let route = self.adapter_for_device(id).await?;
        route
            .adapter
            .execute_command(&route.device_id, command, options)
            .await
    }

    /// Devices across every platform, merged
    ///
    /// All adapters are queried concurrently. Under graceful degradation a
    /// failing platform contributes nothing but an error event; otherwise
    /// its failure fails the whole call once every task has completed.
    pub async fn list_all_devices(&self, filters: &DeviceFilters) -> Result<Vec<UnifiedDevice>> {
        let snapshot = self.adapter_snapshot().await;
        let tasks: Vec<_> = snapshot
            .iter()
            .map(|(platform, adapter)| async move {
                (*platform, adapter.list_devices(filters).await)
            })
            .collect();

        let mut devices = Vec::new();
        for (platform, result) in futures::future::join_all(tasks).await {
            match result {
                Ok(mut platform_devices) => devices.append(&mut platform_devices),
                Err(e) if self.config.graceful_degradation => {
                    self.emit_fanout_error(platform, "list_all_devices", &e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(devices)
    }

    /// Re-run initialization on every adapter concurrently
    pub async fn initialize_all(&self) -> Result<()> {
        let snapshot = self.adapter_snapshot().await;
        let tasks: Vec<_> = snapshot
            .iter()
            .map(|(platform, adapter)| async move { (*platform, adapter.initialize().await) })
            .collect();

        for (platform, result) in futures::future::join_all(tasks).await {
            match result {
                Ok(()) => {}
                Err(e) if self.config.graceful_degradation => {
                    self.emit_fanout_error(platform, "initialize_all", &e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Probe every adapter concurrently, bounded per adapter
    pub async fn health_check(&self) -> RegistryHealth {
        let snapshot = self.adapter_snapshot().await;
        let timeout = self.config.health_check_timeout;
        let tasks: Vec<_> = snapshot
            .iter()
            .map(|(platform, adapter)| async move {
                match tokio::time::timeout(timeout, adapter.health_check()).await {
                    Ok(status) => status,
                    Err(_) => AdapterHealthStatus::unhealthy(*platform, "health check timed out"),
                }
            })
            .collect();

        let adapters = futures::future::join_all(tasks).await;
        RegistryHealth {
            healthy: adapters.iter().any(|status| status.healthy),
            adapters,
        }
    }

    /// Snapshot of the routing cache, for diagnostics
    pub async fn routing_cache_entries(&self) -> HashMap<String, Platform> {
        self.routing_cache.read().await.clone()
    }

    async fn adapter_snapshot(&self) -> Vec<(Platform, Arc<dyn DeviceAdapter>)> {
        self.adapters
            .read()
            .await
            .iter()
            .map(|(platform, slot)| (*platform, slot.adapter.clone()))
            .collect()
    }

    fn emit_fanout_error(&self, platform: Platform, operation: &str, error: &UnihomeError) {
        warn!(platform = %platform, operation, error = %error, "adapter failed during fan-out");
        let _ = self.events.send(RegistryEvent {
            platform,
            event: AdapterEvent::Error {
                message: error.to_string(),
                context: operation.to_string(),
                timestamp: Utc::now(),
            },
        });
    }

    fn spawn_forwarder(
        &self,
        platform: Platform,
        mut rx: broadcast::Receiver<AdapterEvent>,
    ) -> JoinHandle<()> {
        let cache = self.routing_cache.clone();
        let cache_enabled = self.config.routing_cache;
        let events = self.events.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if cache_enabled {
                            if let Some(id) = event.device_id() {
                                cache.write().await.insert(id.to_string(), platform);
                            }
                        }
                        let _ = events.send(RegistryEvent { platform, event });
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(platform = %platform, missed, "event forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

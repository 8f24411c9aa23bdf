//! SmartThings platform adapter
//!
//! Reference implementation of [`DeviceAdapter`] over the SmartThings
//! cloud REST API. Commands and state ride the unified model; the mapping
//! tables live in [`capability`], the HTTP plumbing in [`api`].

pub mod api;
pub mod capability;

use crate::adapter::{CommandOptions, DeviceAdapter, DeviceFilters};
use crate::auth::AuthManager;
use crate::error::{Result, UnihomeError};
use crate::retry::RetryPolicy;
use crate::types::{
    AdapterEvent, AdapterHealthStatus, CommandResult, DeviceCapability, DeviceCommand, DeviceEvent,
    DeviceState, Location, Platform, Room, Scene, TimeWindow, UnifiedDevice, UniversalDeviceId,
};
use api::{SmartThingsApi, StCommandEntry, StDevice, StDeviceStatus, StHistoryEvent};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// SmartThings adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartThingsConfig {
    /// Token store key of the authorized user
    pub user_id: String,

    /// API base; overridable for tests
    pub base_url: String,

    /// How far back SmartThings retains device events
    #[serde(with = "humantime_serde")]
    pub history_retention: Duration,

    /// Capacity of the adapter event channel
    pub event_buffer: usize,
}

impl Default for SmartThingsConfig {
    fn default() -> Self {
        Self {
            user_id: "default".to_string(),
            base_url: api::DEFAULT_BASE_URL.to_string(),
            history_retention: Duration::from_secs(30 * 24 * 3600),
            event_buffer: 64,
        }
    }
}

/// [`DeviceAdapter`] implementation for SmartThings
pub struct SmartThingsAdapter {
    api: SmartThingsApi,
    config: SmartThingsConfig,
    initialized: RwLock<bool>,
    events: broadcast::Sender<AdapterEvent>,

    /// Last state per device, for change detection on refresh
    last_states: RwLock<HashMap<String, DeviceState>>,

    error_count: AtomicU64,
    last_success: RwLock<Option<chrono::DateTime<Utc>>>,
}

impl SmartThingsAdapter {
    pub fn new(
        config: SmartThingsConfig,
        auth: std::sync::Arc<AuthManager>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let api = SmartThingsApi::new(
            http,
            &config.base_url,
            auth,
            config.user_id.clone(),
            RetryPolicy::default(),
        )?;
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Ok(Self {
            api,
            config,
            initialized: RwLock::new(false),
            events,
            last_states: RwLock::new(HashMap::new()),
            error_count: AtomicU64::new(0),
            last_success: RwLock::new(None),
        })
    }

    async fn record_success(&self) {
        *self.last_success.write().await = Some(Utc::now());
    }

    fn record_failure(&self, context: &str, error: &UnihomeError) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        let _ = self.events.send(AdapterEvent::Error {
            message: error.to_string(),
            context: context.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Reachability of one device, best-effort
    ///
    /// SmartThings reports health on a separate endpoint; a probe failure
    /// leaves the device marked online rather than failing the lookup.
    async fn device_online(&self, device_id: &str) -> bool {
        match self.api.device_health(device_id).await {
            Ok(health) => health.online(),
            Err(e) => {
                debug!(device = device_id, error = %e, "health probe failed, assuming online");
                true
            }
        }
    }
}

/// Capabilities from live component data, with category fallback
fn extract_capabilities(device: &StDevice) -> Vec<DeviceCapability> {
    let mut capabilities: Vec<DeviceCapability> = device
        .components
        .iter()
        .flat_map(|component| component.capabilities.iter())
        .filter_map(|cap| capability::platform_to_unified(&cap.id))
        .collect();

    if capabilities.is_empty() {
        capabilities = device
            .components
            .iter()
            .flat_map(|component| component.categories.iter())
            .flat_map(|category| capability::capabilities_for_category(&category.name))
            .collect();
    }

    capabilities.sort();
    capabilities.dedup();
    capabilities
}

fn convert_device(device: StDevice, online: bool) -> Result<UnifiedDevice> {
    let id = UniversalDeviceId::new(Platform::SmartThings, device.device_id.clone())?;
    let capabilities = extract_capabilities(&device);
    let raw = serde_json::to_value(&device)?;
    Ok(UnifiedDevice {
        id,
        platform: Platform::SmartThings,
        platform_device_id: device.device_id,
        name: device.name,
        label: device.label,
        manufacturer: device.manufacturer_name,
        model: device.device_type_name,
        location_id: device.location_id,
        room_id: device.room_id,
        capabilities,
        online,
        raw,
    })
}

/// Main-component status into the unified `capability.attribute` key space
///
/// Non-main components and capabilities outside the unified set are
/// dropped; null attribute values are skipped.
fn convert_status(id: UniversalDeviceId, status: &StDeviceStatus) -> DeviceState {
    let mut state = DeviceState::new(id);
    if let Some(main) = status.components.get("main") {
        for (code, attributes) in main {
            let Some(unified) = capability::platform_to_unified(code) else {
                continue;
            };
            for (attribute, cell) in attributes {
                if cell.value.is_null() {
                    continue;
                }
                state.set(unified, attribute, cell.value.clone());
            }
        }
    }
    state
}

fn convert_history_event(event: StHistoryEvent) -> Result<DeviceEvent> {
    let id = UniversalDeviceId::new(Platform::SmartThings, event.device_id)?;
    let time = Utc
        .timestamp_millis_opt(event.epoch)
        .single()
        .ok_or_else(|| {
            UnihomeError::command_execution(format!(
                "event for {id} carries unrepresentable epoch {}",
                event.epoch
            ))
        })?;
    Ok(DeviceEvent {
        device_id: id,
        location_id: event.location_id,
        time,
        epoch: event.epoch,
        component: event.component,
        capability: event.capability,
        attribute: event.attribute,
        value: event.value,
        unit: event.unit,
    })
}

#[async_trait]
impl DeviceAdapter for SmartThingsAdapter {
    fn platform(&self) -> Platform {
        Platform::SmartThings
    }

    async fn initialize(&self) -> Result<()> {
        {
            let initialized = self.initialized.read().await;
            if *initialized {
                warn!("SmartThings adapter already initialized, ignoring");
                return Ok(());
            }
        }

        // Credential check: the cheapest authenticated call
        let locations = self.api.locations().await?;
        info!(
            user = self.api.user_id(),
            locations = locations.len(),
            "SmartThings adapter initialized"
        );
        self.record_success().await;
        *self.initialized.write().await = true;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let mut initialized = self.initialized.write().await;
        if *initialized {
            debug!("SmartThings adapter shut down");
        }
        *initialized = false;
        self.last_states.write().await.clear();
        Ok(())
    }

    async fn list_devices(&self, filters: &DeviceFilters) -> Result<Vec<UnifiedDevice>> {
        let capability_code = filters
            .capability
            .and_then(capability::unified_to_platform);
        let devices = self
            .api
            .devices(filters.location_id.as_deref(), capability_code)
            .await?;
        self.record_success().await;

        let mut unified = Vec::with_capacity(devices.len());
        for device in devices {
            // Health is a separate endpoint per device; only pay for it
            // when the caller filters on reachability
            let online = if filters.online_only {
                self.device_online(&device.device_id).await
            } else {
                true
            };
            unified.push(convert_device(device, online)?);
        }
        Ok(unified.into_iter().filter(|d| filters.matches(d)).collect())
    }

    async fn get_device(&self, device_id: &str) -> Result<UnifiedDevice> {
        let device = self.api.device(device_id).await?;
        let online = self.device_online(device_id).await;
        self.record_success().await;
        convert_device(device, online)
    }

    async fn get_device_state(&self, device_id: &str) -> Result<DeviceState> {
        let status = self.api.device_status(device_id).await?;
        self.record_success().await;
        let id = UniversalDeviceId::new(Platform::SmartThings, device_id)?;
        let state = convert_status(id, &status);
        self.last_states
            .write()
            .await
            .insert(device_id.to_string(), state.clone());
        Ok(state)
    }

    async fn refresh_device_state(&self, device_id: &str) -> Result<DeviceState> {
        let status = self.api.device_status(device_id).await?;
        self.record_success().await;
        let id = UniversalDeviceId::new(Platform::SmartThings, device_id)?;
        let fresh = convert_status(id, &status);

        let previous = self
            .last_states
            .write()
            .await
            .insert(device_id.to_string(), fresh.clone());

        let changed = previous
            .as_ref()
            .map(|p| p.values != fresh.values)
            .unwrap_or(false);
        if changed {
            match self.get_device(device_id).await {
                Ok(device) => {
                    let _ = self.events.send(AdapterEvent::StateChange {
                        device,
                        old_state: previous,
                        new_state: fresh.clone(),
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    debug!(device = device_id, error = %e, "state changed but device fetch failed, event skipped");
                }
            }
        }
        Ok(fresh)
    }

    async fn get_device_capabilities(&self, device_id: &str) -> Result<Vec<DeviceCapability>> {
        let device = self.api.device(device_id).await?;
        self.record_success().await;
        Ok(extract_capabilities(&device))
    }

    fn map_platform_capability(&self, code: &str) -> Option<DeviceCapability> {
        capability::platform_to_unified(code)
    }

    fn map_unified_capability(&self, capability: DeviceCapability) -> Option<&'static str> {
        capability::unified_to_platform(capability)
    }

    async fn execute_command(
        &self,
        device_id: &str,
        command: &DeviceCommand,
        options: &CommandOptions,
    ) -> Result<CommandResult> {
        let Some(mapped) = capability::map_command(command) else {
            let error = UnihomeError::capability_not_supported(format!(
                "SmartThings has no mapping for {}::{}",
                command.capability, command.command
            ));
            return Ok(CommandResult::failed(command.clone(), &error));
        };

        let entry = StCommandEntry {
            component: "main".to_string(),
            capability: mapped.capability.to_string(),
            command: mapped.command,
            arguments: mapped.arguments,
        };

        if let Err(e) = self.api.execute_commands(device_id, &[entry]).await {
            self.record_failure("execute_command", &e);
            return Ok(CommandResult::failed(command.clone(), &e));
        }
        self.record_success().await;

        // Confirmation re-query is best-effort; its failure never fails
        // the command
        let new_state = if options.confirm_state {
            tokio::time::sleep(options.confirmation_delay).await;
            match self.get_device_state(device_id).await {
                Ok(state) => Some(state),
                Err(e) => {
                    debug!(device = device_id, error = %e, "confirmation re-query failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(CommandResult::succeeded(command.clone(), new_state))
    }

    async fn health_check(&self) -> AdapterHealthStatus {
        match self.api.locations().await {
            Ok(_) => {
                self.record_success().await;
                AdapterHealthStatus {
                    platform: Platform::SmartThings,
                    healthy: true,
                    reachable: true,
                    authenticated: true,
                    error_count: self.error_count.load(Ordering::Relaxed),
                    last_success: *self.last_success.read().await,
                    message: None,
                }
            }
            Err(e) => {
                self.record_failure("health_check", &e);
                AdapterHealthStatus {
                    platform: Platform::SmartThings,
                    healthy: false,
                    // An auth rejection proves the platform answered
                    reachable: e.is_auth_error(),
                    authenticated: false,
                    error_count: self.error_count.load(Ordering::Relaxed),
                    last_success: *self.last_success.read().await,
                    message: Some(e.to_string()),
                }
            }
        }
    }

    fn subscribe_events(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events.subscribe()
    }

    async fn list_locations(&self) -> Result<Vec<Location>> {
        let locations = self.api.locations().await?;
        self.record_success().await;
        Ok(locations
            .into_iter()
            .map(|l| Location {
                id: l.location_id,
                name: l.name,
                platform: Platform::SmartThings,
            })
            .collect())
    }

    async fn list_rooms(&self, location_id: Option<&str>) -> Result<Vec<Room>> {
        let location_ids: Vec<String> = match location_id {
            Some(id) => vec![id.to_string()],
            None => self
                .api
                .locations()
                .await?
                .into_iter()
                .map(|l| l.location_id)
                .collect(),
        };

        let mut rooms = Vec::new();
        for location_id in location_ids {
            for room in self.api.rooms(&location_id).await? {
                rooms.push(Room {
                    id: room.room_id,
                    name: room.name.unwrap_or_default(),
                    location_id: room.location_id,
                });
            }
        }
        self.record_success().await;
        Ok(rooms)
    }

    fn supports_scenes(&self) -> bool {
        true
    }

    async fn list_scenes(&self, location_id: Option<&str>) -> Result<Vec<Scene>> {
        let scenes = self.api.scenes(location_id).await?;
        self.record_success().await;
        Ok(scenes
            .into_iter()
            .map(|s| Scene {
                id: s.scene_id,
                name: s.scene_name,
                location_id: s.location_id,
            })
            .collect())
    }

    async fn execute_scene(&self, scene_id: &str) -> Result<()> {
        self.api.execute_scene(scene_id).await?;
        self.record_success().await;
        Ok(())
    }

    async fn list_device_events(
        &self,
        device_id: &str,
        location_id: &str,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<Vec<DeviceEvent>> {
        let events = self
            .api
            .device_history(device_id, location_id, window, limit)
            .await?;
        self.record_success().await;
        events.into_iter().map(convert_history_event).collect()
    }

    fn history_retention(&self) -> Option<Duration> {
        Some(self.config.history_retention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device_json(capabilities: &[&str], categories: &[&str]) -> StDevice {
        let caps: Vec<_> = capabilities.iter().map(|id| json!({ "id": id })).collect();
        let cats: Vec<_> = categories.iter().map(|name| json!({ "name": name })).collect();
        serde_json::from_value(json!({
            "deviceId": "d1",
            "name": "Desk Lamp",
            "label": "Office Desk Lamp",
            "manufacturerName": "Signify",
            "deviceTypeName": "Hue Bulb",
            "locationId": "loc-1",
            "roomId": "room-1",
            "components": [{
                "id": "main",
                "capabilities": caps,
                "categories": cats,
            }],
        }))
        .unwrap()
    }

    #[test]
    fn converts_device_with_live_capabilities() {
        let device = device_json(&["switch", "switchLevel", "fancyVendorThing"], &[]);
        let unified = convert_device(device, true).unwrap();

        assert_eq!(unified.id.to_string(), "smartthings:d1");
        assert_eq!(unified.platform_device_id, "d1");
        assert_eq!(
            unified.capabilities,
            vec![DeviceCapability::Switch, DeviceCapability::Dimmer]
        );
        assert_eq!(unified.location_id.as_deref(), Some("loc-1"));
        assert!(unified.raw.get("deviceId").is_some());
    }

    #[test]
    fn falls_back_to_category_when_no_capabilities_map() {
        let device = device_json(&["fancyVendorThing"], &["Light"]);
        let unified = convert_device(device, true).unwrap();
        assert_eq!(
            unified.capabilities,
            vec![DeviceCapability::Switch, DeviceCapability::Dimmer]
        );

        let unknown = device_json(&[], &["EspressoMachine"]);
        let unified = convert_device(unknown, true).unwrap();
        assert!(unified.capabilities.is_empty());
    }

    #[test]
    fn converts_status_dropping_nulls_and_foreign_capabilities() {
        let status: StDeviceStatus = serde_json::from_value(json!({
            "components": {
                "main": {
                    "switch": { "switch": { "value": "on" } },
                    "switchLevel": { "level": { "value": 75, "unit": "%" } },
                    "battery": { "battery": { "value": null } },
                    "vendorExtension": { "weird": { "value": 1 } },
                },
                "outlet2": {
                    "switch": { "switch": { "value": "off" } },
                },
            },
        }))
        .unwrap();

        let id = UniversalDeviceId::new(Platform::SmartThings, "d1").unwrap();
        let state = convert_status(id, &status);

        assert_eq!(state.get(DeviceCapability::Switch, "switch"), Some(&json!("on")));
        assert_eq!(state.get(DeviceCapability::Dimmer, "level"), Some(&json!(75)));
        assert!(state.get(DeviceCapability::Battery, "battery").is_none());
        assert_eq!(state.values.len(), 2);
    }

    #[test]
    fn converts_history_event_epoch() {
        let event: StHistoryEvent = serde_json::from_value(json!({
            "deviceId": "d1",
            "locationId": "loc-1",
            "epoch": 1_700_000_000_000_i64,
            "capability": "switch",
            "attribute": "switch",
            "value": "on",
        }))
        .unwrap();
        let converted = convert_history_event(event).unwrap();
        assert_eq!(converted.epoch, 1_700_000_000_000);
        assert_eq!(converted.time.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(converted.component, "main");
    }
}

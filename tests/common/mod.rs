//! Shared test fixtures
//!
//! Provides a scriptable in-memory [`DeviceAdapter`] plus fixture
//! constructors used across the integration test suite.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock as StdRwLock;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use unihome::adapter::{CommandOptions, DeviceAdapter, DeviceFilters};
use unihome::error::{Result, UnihomeError};
use unihome::types::{
    AdapterEvent, AdapterHealthStatus, CommandResult, DeviceCapability, DeviceCommand, DeviceEvent,
    DeviceState, Platform, TimeWindow, UnifiedDevice, UniversalDeviceId,
};

/// Runs an async test body with logging wired to the test writer
#[macro_export]
macro_rules! async_test {
    ($test_name:ident, $test_body:block) => {
        #[tokio::test]
        async fn $test_name() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter("debug")
                .with_test_writer()
                .try_init();

            $test_body
        }
    };
}

/// Arguments of the last `list_device_events` call, for verification
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct RecordedHistoryQuery {
    pub device_id: String,
    pub location_id: String,
    pub window: TimeWindow,
    pub limit: usize,
}

/// Scriptable adapter backed by in-memory maps
///
/// Failure simulation is per concern: `fail_all` breaks every platform
/// call, `init_failure` only initialization, and `failing_commands` marks
/// device ids whose commands come back as failed results.
#[allow(dead_code)]
pub struct MockAdapter {
    pub platform: Platform,
    pub devices: RwLock<HashMap<String, UnifiedDevice>>,
    pub states: RwLock<HashMap<String, DeviceState>>,
    pub history: RwLock<Vec<DeviceEvent>>,
    pub command_history: RwLock<Vec<(String, DeviceCommand)>>,
    pub last_history_query: RwLock<Option<RecordedHistoryQuery>>,

    pub initialized: RwLock<bool>,
    pub init_count: AtomicUsize,
    pub shutdown_count: AtomicUsize,

    pub fail_all: RwLock<bool>,
    pub init_failure: RwLock<bool>,
    pub failing_commands: RwLock<HashSet<String>>,
    pub init_delay: RwLock<Option<Duration>>,

    // Read from a sync trait method, so not a tokio lock
    pub retention: StdRwLock<Option<Duration>>,

    pub events: broadcast::Sender<AdapterEvent>,
}

impl MockAdapter {
    #[allow(dead_code)]
    pub fn new(platform: Platform) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            platform,
            devices: RwLock::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::new()),
            command_history: RwLock::new(Vec::new()),
            last_history_query: RwLock::new(None),
            initialized: RwLock::new(false),
            init_count: AtomicUsize::new(0),
            shutdown_count: AtomicUsize::new(0),
            fail_all: RwLock::new(false),
            init_failure: RwLock::new(false),
            failing_commands: RwLock::new(HashSet::new()),
            init_delay: RwLock::new(None),
            retention: StdRwLock::new(None),
            events,
        }
    }

    #[allow(dead_code)]
    pub async fn add_device(&self, device: UnifiedDevice) {
        self.devices
            .write()
            .await
            .insert(device.platform_device_id.clone(), device);
    }

    #[allow(dead_code)]
    pub async fn add_history_event(&self, event: DeviceEvent) {
        self.history.write().await.push(event);
    }

    #[allow(dead_code)]
    pub async fn set_fail_all(&self, enabled: bool) {
        *self.fail_all.write().await = enabled;
    }

    #[allow(dead_code)]
    pub async fn set_init_failure(&self, enabled: bool) {
        *self.init_failure.write().await = enabled;
    }

    #[allow(dead_code)]
    pub async fn fail_commands_on(&self, device_id: &str) {
        self.failing_commands
            .write()
            .await
            .insert(device_id.to_string());
    }

    #[allow(dead_code)]
    pub async fn set_init_delay(&self, delay: Duration) {
        *self.init_delay.write().await = Some(delay);
    }

    #[allow(dead_code)]
    pub fn set_retention(&self, retention: Option<Duration>) {
        *self.retention.write().unwrap() = retention;
    }

    /// Emit an adapter event as if the platform pushed it
    #[allow(dead_code)]
    pub fn emit(&self, event: AdapterEvent) {
        let _ = self.events.send(event);
    }

    #[allow(dead_code)]
    pub async fn executed_commands(&self) -> Vec<(String, DeviceCommand)> {
        self.command_history.read().await.clone()
    }

    #[allow(dead_code)]
    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn shutdown_count(&self) -> usize {
        self.shutdown_count.load(Ordering::SeqCst)
    }

    fn simulated_failure(&self, operation: &str) -> UnihomeError {
        UnihomeError::network(format!("simulated {operation} failure on {}", self.platform))
    }
}

#[async_trait]
impl DeviceAdapter for MockAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn initialize(&self) -> Result<()> {
        self.init_count.fetch_add(1, Ordering::SeqCst);
        let delay = *self.init_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_all.read().await || *self.init_failure.read().await {
            return Err(self.simulated_failure("initialize"));
        }
        *self.initialized.write().await = true;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown_count.fetch_add(1, Ordering::SeqCst);
        *self.initialized.write().await = false;
        Ok(())
    }

    async fn list_devices(&self, filters: &DeviceFilters) -> Result<Vec<UnifiedDevice>> {
        if *self.fail_all.read().await {
            return Err(self.simulated_failure("list_devices"));
        }
        let mut devices: Vec<UnifiedDevice> = self
            .devices
            .read()
            .await
            .values()
            .filter(|d| filters.matches(d))
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.platform_device_id.cmp(&b.platform_device_id));
        Ok(devices)
    }

    async fn get_device(&self, device_id: &str) -> Result<UnifiedDevice> {
        if *self.fail_all.read().await {
            return Err(self.simulated_failure("get_device"));
        }
        self.devices
            .read()
            .await
            .get(device_id)
            .cloned()
            .ok_or_else(|| {
                UnihomeError::device_not_found(format!(
                    "no device '{device_id}' on {}",
                    self.platform
                ))
            })
    }

    async fn get_device_state(&self, device_id: &str) -> Result<DeviceState> {
        let device = self.get_device(device_id).await?;
        let state = self.states.read().await.get(device_id).cloned();
        Ok(state.unwrap_or_else(|| DeviceState::new(device.id)))
    }

    async fn refresh_device_state(&self, device_id: &str) -> Result<DeviceState> {
        self.get_device_state(device_id).await
    }

    async fn get_device_capabilities(&self, device_id: &str) -> Result<Vec<DeviceCapability>> {
        Ok(self.get_device(device_id).await?.capabilities)
    }

    fn map_platform_capability(&self, code: &str) -> Option<DeviceCapability> {
        match code {
            "switch" => Some(DeviceCapability::Switch),
            "switchLevel" => Some(DeviceCapability::Dimmer),
            _ => None,
        }
    }

    fn map_unified_capability(&self, capability: DeviceCapability) -> Option<&'static str> {
        match capability {
            DeviceCapability::Switch => Some("switch"),
            DeviceCapability::Dimmer => Some("switchLevel"),
            _ => None,
        }
    }

    async fn execute_command(
        &self,
        device_id: &str,
        command: &DeviceCommand,
        _options: &CommandOptions,
    ) -> Result<CommandResult> {
        self.command_history
            .write()
            .await
            .push((device_id.to_string(), command.clone()));

        let should_fail = *self.fail_all.read().await
            || self.failing_commands.read().await.contains(device_id);
        if should_fail {
            let error =
                UnihomeError::command_execution(format!("simulated failure on '{device_id}'"));
            return Ok(CommandResult::failed(command.clone(), &error));
        }
        Ok(CommandResult::succeeded(command.clone(), None))
    }

    async fn health_check(&self) -> AdapterHealthStatus {
        let failing = *self.fail_all.read().await;
        AdapterHealthStatus {
            platform: self.platform,
            healthy: !failing,
            reachable: !failing,
            authenticated: !failing,
            error_count: 0,
            last_success: None,
            message: failing.then(|| "simulated failure".to_string()),
        }
    }

    fn subscribe_events(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events.subscribe()
    }

    async fn list_device_events(
        &self,
        device_id: &str,
        location_id: &str,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<Vec<DeviceEvent>> {
        if *self.fail_all.read().await {
            return Err(self.simulated_failure("list_device_events"));
        }
        *self.last_history_query.write().await = Some(RecordedHistoryQuery {
            device_id: device_id.to_string(),
            location_id: location_id.to_string(),
            window: *window,
            limit,
        });

        let mut events: Vec<DeviceEvent> = self
            .history
            .read()
            .await
            .iter()
            .filter(|e| {
                e.device_id.device_id() == device_id && e.time >= window.start && e.time <= window.end
            })
            .cloned()
            .collect();
        events.sort_by(|a, b| b.epoch.cmp(&a.epoch));
        events.truncate(limit);
        Ok(events)
    }

    fn history_retention(&self) -> Option<Duration> {
        *self.retention.read().unwrap()
    }
}

/// Device fixture with a location and room preset
#[allow(dead_code)]
pub fn test_device(
    platform: Platform,
    device_id: &str,
    name: &str,
    capabilities: Vec<DeviceCapability>,
) -> UnifiedDevice {
    UnifiedDevice {
        id: UniversalDeviceId::new(platform, device_id).unwrap(),
        platform,
        platform_device_id: device_id.to_string(),
        name: name.to_string(),
        label: Some(format!("{name} Label")),
        manufacturer: Some("Acme".to_string()),
        model: Some("Model-1".to_string()),
        location_id: Some("loc-1".to_string()),
        room_id: Some("room-1".to_string()),
        capabilities,
        online: true,
        raw: serde_json::Value::Null,
    }
}

/// History event fixture at a fixed epoch
#[allow(dead_code)]
pub fn history_event(
    platform: Platform,
    device_id: &str,
    epoch: i64,
    capability: &str,
    attribute: &str,
    value: serde_json::Value,
) -> DeviceEvent {
    DeviceEvent {
        device_id: UniversalDeviceId::new(platform, device_id).unwrap(),
        location_id: "loc-1".to_string(),
        time: Utc.timestamp_millis_opt(epoch).unwrap(),
        epoch,
        component: "main".to_string(),
        capability: capability.to_string(),
        attribute: attribute.to_string(),
        value,
        unit: None,
    }
}

//! Platform adapter contract
//!
//! Every platform integration implements [`DeviceAdapter`]. The registry
//! only ever talks to `Arc<dyn DeviceAdapter>`, so the trait must stay
//! object-safe. Platform-native device ids cross this boundary; universal
//! ids are composed and split by the registry.

use crate::error::{Result, UnihomeError};
use crate::types::{
    AdapterEvent, AdapterHealthStatus, CommandResult, DeviceCapability, DeviceCommand, DeviceEvent,
    DeviceState, Location, Platform, Room, Scene, TimeWindow, UnifiedDevice,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;

/// Filters applied to device listing
///
/// Adapters push filters down to the platform API where it supports them
/// and apply the rest client-side via [`DeviceFilters::matches`].
#[derive(Debug, Clone, Default)]
pub struct DeviceFilters {
    /// Only devices exposing this capability
    pub capability: Option<DeviceCapability>,

    /// Only devices in this platform location
    pub location_id: Option<String>,

    /// Only devices in this room
    pub room_id: Option<String>,

    /// Case-insensitive substring match on name and label
    pub name_contains: Option<String>,

    /// Drop devices the platform reports unreachable
    pub online_only: bool,
}

impl DeviceFilters {
    pub fn with_capability(mut self, capability: DeviceCapability) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn with_location(mut self, location_id: impl Into<String>) -> Self {
        self.location_id = Some(location_id.into());
        self
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn with_name(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }

    /// Client-side filter check against a unified device
    pub fn matches(&self, device: &UnifiedDevice) -> bool {
        if let Some(capability) = self.capability {
            if !device.capabilities.contains(&capability) {
                return false;
            }
        }
        if let Some(location_id) = &self.location_id {
            if device.location_id.as_deref() != Some(location_id.as_str()) {
                return false;
            }
        }
        if let Some(room_id) = &self.room_id {
            if device.room_id.as_deref() != Some(room_id.as_str()) {
                return false;
            }
        }
        if let Some(fragment) = &self.name_contains {
            let fragment = fragment.to_lowercase();
            let name_hit = device.name.to_lowercase().contains(&fragment);
            let label_hit = device
                .label
                .as_deref()
                .map(|l| l.to_lowercase().contains(&fragment))
                .unwrap_or(false);
            if !name_hit && !label_hit {
                return false;
            }
        }
        if self.online_only && !device.online {
            return false;
        }
        true
    }
}

/// Options for single command execution
#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Re-query device state after execution and attach it to the result
    ///
    /// The re-query is best-effort: its failure never fails the command.
    pub confirm_state: bool,

    /// Settle time before the confirmation re-query
    pub confirmation_delay: Duration,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            confirm_state: false,
            confirmation_delay: Duration::from_secs(1),
        }
    }
}

/// One entry in a batch submission
#[derive(Debug, Clone)]
pub struct BatchCommand {
    /// Platform-native device id
    pub device_id: String,
    pub command: DeviceCommand,
}

/// How a batch walks its commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// One command at a time, in submission order
    #[default]
    Sequential,

    /// All commands started before any completes; always runs to the end,
    /// each entry independently error-wrapped
    Parallel,
}

/// Options for batch execution
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub mode: BatchMode,

    /// Sequential mode only: keep executing after a command fails. The
    /// failure is recorded in its result slot either way
    pub continue_on_error: bool,

    /// Sequential mode only: pause between consecutive commands, for
    /// rate-limited platforms
    pub inter_command_delay: Duration,

    /// Per-command options
    pub command_options: CommandOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            mode: BatchMode::Sequential,
            continue_on_error: true,
            inter_command_delay: Duration::ZERO,
            command_options: CommandOptions::default(),
        }
    }
}

/// Contract implemented by every platform integration
///
/// Implementations must be safe to share behind `Arc` and call
/// concurrently; the registry never serializes access.
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// The platform this adapter serves
    fn platform(&self) -> Platform;

    /// Validate credentials and warm internal caches
    ///
    /// Called before the adapter is routed to. A second call is a warning
    /// and a no-op, never an error.
    async fn initialize(&self) -> Result<()>;

    /// Release platform resources; idempotent
    async fn shutdown(&self) -> Result<()>;

    /// List devices visible to the configured credential
    async fn list_devices(&self, filters: &DeviceFilters) -> Result<Vec<UnifiedDevice>>;

    /// Fetch a single device by platform-native id
    async fn get_device(&self, device_id: &str) -> Result<UnifiedDevice>;

    /// Fetch the current state of a device
    async fn get_device_state(&self, device_id: &str) -> Result<DeviceState>;

    /// Fetch the current state, bypassing any adapter-side cache
    ///
    /// Emits a `StateChange` event when the fresh state differs from the
    /// last one the adapter observed.
    async fn refresh_device_state(&self, device_id: &str) -> Result<DeviceState>;

    /// Capability set for one device
    ///
    /// Falls back to the platform's device-category table when the device
    /// reports no live capability data.
    async fn get_device_capabilities(&self, device_id: &str) -> Result<Vec<DeviceCapability>>;

    /// Map a platform-native capability code to the unified set
    ///
    /// Pure and total: unknown codes map to `None`, never an error.
    fn map_platform_capability(&self, code: &str) -> Option<DeviceCapability>;

    /// Map a unified capability to its canonical platform code
    ///
    /// Pure and total: capabilities the platform cannot express map to
    /// `None`, never an error.
    fn map_unified_capability(&self, capability: DeviceCapability) -> Option<&'static str>;

    /// Execute one command against a device
    ///
    /// Unsupported capability mappings fail with
    /// [`UnihomeError::CapabilityNotSupported`] before any platform call.
    async fn execute_command(
        &self,
        device_id: &str,
        command: &DeviceCommand,
        options: &CommandOptions,
    ) -> Result<CommandResult>;

    /// Execute a batch of commands, one result per executed command in order
    ///
    /// The default implementation drives [`execute_command`]. Sequential
    /// mode stops at the first failed command unless `continue_on_error`
    /// is set, so later commands are never attempted. Parallel mode starts
    /// every command before awaiting any and always yields a full result
    /// vector.
    ///
    /// Per-command errors become failed results in their slot; the batch
    /// call itself only fails on conditions outside any single command.
    ///
    /// [`execute_command`]: DeviceAdapter::execute_command
    async fn execute_batch(
        &self,
        commands: &[BatchCommand],
        options: &BatchOptions,
    ) -> Result<Vec<CommandResult>> {
        match options.mode {
            BatchMode::Parallel => {
                let futures: Vec<_> = commands
                    .iter()
                    .map(|entry| {
                        self.execute_command(
                            &entry.device_id,
                            &entry.command,
                            &options.command_options,
                        )
                    })
                    .collect();
                let outcomes = futures::future::join_all(futures).await;
                Ok(outcomes
                    .into_iter()
                    .zip(commands)
                    .map(|(outcome, entry)| match outcome {
                        Ok(result) => result,
                        Err(e) => CommandResult::failed(entry.command.clone(), &e),
                    })
                    .collect())
            }
            BatchMode::Sequential => {
                let mut results = Vec::with_capacity(commands.len());
                for (index, entry) in commands.iter().enumerate() {
                    if index > 0 && !options.inter_command_delay.is_zero() {
                        tokio::time::sleep(options.inter_command_delay).await;
                    }
                    let result = match self
                        .execute_command(&entry.device_id, &entry.command, &options.command_options)
                        .await
                    {
                        Ok(result) => result,
                        Err(e) => CommandResult::failed(entry.command.clone(), &e),
                    };
                    let failed = !result.success;
                    results.push(result);
                    if failed && !options.continue_on_error {
                        break;
                    }
                }
                Ok(results)
            }
        }
    }

    /// Probe platform reachability and credential validity
    ///
    /// Never fails: probe errors are captured into the returned status
    /// with `healthy` false and `message` set.
    async fn health_check(&self) -> AdapterHealthStatus;

    /// Subscribe to asynchronous adapter events
    fn subscribe_events(&self) -> broadcast::Receiver<AdapterEvent>;

    /// List platform locations
    async fn list_locations(&self) -> Result<Vec<Location>> {
        Err(UnihomeError::capability_not_supported(format!(
            "{} does not expose locations",
            self.platform()
        )))
    }

    /// List rooms, optionally narrowed to one location
    async fn list_rooms(&self, _location_id: Option<&str>) -> Result<Vec<Room>> {
        Err(UnihomeError::capability_not_supported(format!(
            "{} does not expose rooms",
            self.platform()
        )))
    }

    /// Whether the platform exposes scenes at all
    ///
    /// Callers must check this before using scene operations; scene calls
    /// on a platform reporting `false` are a caller error, not guarded here.
    fn supports_scenes(&self) -> bool {
        false
    }

    /// List scenes, optionally narrowed to one location
    async fn list_scenes(&self, _location_id: Option<&str>) -> Result<Vec<Scene>> {
        Err(UnihomeError::capability_not_supported(format!(
            "{} does not expose scenes",
            self.platform()
        )))
    }

    /// Execute a platform scene
    async fn execute_scene(&self, _scene_id: &str) -> Result<()> {
        Err(UnihomeError::capability_not_supported(format!(
            "{} does not support scene execution",
            self.platform()
        )))
    }

    /// Fetch historical events for a device within a time window
    ///
    /// `limit` is a hard cap on returned events; implementations return the
    /// most recent events first.
    async fn list_device_events(
        &self,
        _device_id: &str,
        _location_id: &str,
        _window: &TimeWindow,
        _limit: usize,
    ) -> Result<Vec<DeviceEvent>> {
        Err(UnihomeError::capability_not_supported(format!(
            "{} does not expose event history",
            self.platform()
        )))
    }

    /// How far back the platform retains device events, when known
    fn history_retention(&self) -> Option<Duration> {
        None
    }
}

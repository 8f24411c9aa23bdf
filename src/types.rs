//! Unified data model shared by every platform adapter
//!
//! These types are the lingua franca of the crate: adapters translate
//! platform-native payloads into them, and the registry, history engine and
//! callers only ever see these shapes.

use crate::error::{ErrorKind, Result, UnihomeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Supported smart-home cloud platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    SmartThings,
    Tuya,
    Lutron,
}

impl Platform {
    /// Stable tag used inside universal device ids
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::SmartThings => "smartthings",
            Platform::Tuya => "tuya",
            Platform::Lutron => "lutron",
        }
    }

    /// All known platforms, in routing order
    pub fn all() -> &'static [Platform] {
        &[Platform::SmartThings, Platform::Tuya, Platform::Lutron]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnihomeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "smartthings" => Ok(Platform::SmartThings),
            "tuya" => Ok(Platform::Tuya),
            "lutron" => Ok(Platform::Lutron),
            other => Err(UnihomeError::configuration(format!(
                "unknown platform tag '{other}'"
            ))),
        }
    }
}

/// Composite device identifier of the form `platform:platformDeviceId`
///
/// Routing works off this id alone, so constructing and parsing must
/// round-trip exactly: `parse(format(p, r)) == (p, r)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct UniversalDeviceId {
    platform: Platform,
    device_id: String,
}

impl UniversalDeviceId {
    /// Build an id from its parts
    ///
    /// Fails on an empty platform-device id; the colon separator inside the
    /// remainder is allowed (only the first colon splits).
    pub fn new(platform: Platform, device_id: impl Into<String>) -> Result<Self> {
        let device_id = device_id.into();
        if device_id.is_empty() {
            return Err(UnihomeError::configuration(
                "universal device id requires a non-empty platform device id",
            ));
        }
        Ok(Self {
            platform,
            device_id,
        })
    }

    /// Parse a `platform:platformDeviceId` string
    pub fn parse(raw: &str) -> Result<Self> {
        let (tag, rest) = raw.split_once(':').ok_or_else(|| {
            UnihomeError::configuration(format!(
                "invalid universal device id '{raw}': expected 'platform:deviceId'"
            ))
        })?;
        let platform = Platform::from_str(tag)?;
        Self::new(platform, rest)
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The platform-native half of the id
    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

impl fmt::Display for UniversalDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.device_id)
    }
}

impl From<UniversalDeviceId> for String {
    fn from(id: UniversalDeviceId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for UniversalDeviceId {
    type Error = UnihomeError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

/// Closed set of device capabilities shared across platforms
///
/// Adapters map platform-native capability identifiers (SmartThings
/// capability names, Tuya data-point codes, …) onto this enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceCapability {
    Switch,
    Dimmer,
    ColorControl,
    ColorTemperature,
    MotionSensor,
    ContactSensor,
    TemperatureSensor,
    HumiditySensor,
    IlluminanceSensor,
    PresenceSensor,
    Battery,
    Lock,
    Thermostat,
    WindowShade,
    Button,
    PowerMeter,
    EnergyMeter,
}

impl DeviceCapability {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCapability::Switch => "switch",
            DeviceCapability::Dimmer => "dimmer",
            DeviceCapability::ColorControl => "colorControl",
            DeviceCapability::ColorTemperature => "colorTemperature",
            DeviceCapability::MotionSensor => "motionSensor",
            DeviceCapability::ContactSensor => "contactSensor",
            DeviceCapability::TemperatureSensor => "temperatureSensor",
            DeviceCapability::HumiditySensor => "humiditySensor",
            DeviceCapability::IlluminanceSensor => "illuminanceSensor",
            DeviceCapability::PresenceSensor => "presenceSensor",
            DeviceCapability::Battery => "battery",
            DeviceCapability::Lock => "lock",
            DeviceCapability::Thermostat => "thermostat",
            DeviceCapability::WindowShade => "windowShade",
            DeviceCapability::Button => "button",
            DeviceCapability::PowerMeter => "powerMeter",
            DeviceCapability::EnergyMeter => "energyMeter",
        }
    }
}

impl fmt::Display for DeviceCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of a device as seen by its owning adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedDevice {
    /// Universal identifier (`platform:platformDeviceId`)
    pub id: UniversalDeviceId,

    /// Owning platform
    pub platform: Platform,

    /// Platform-native device id
    pub platform_device_id: String,

    /// Device name as configured on the platform
    pub name: String,

    /// User-facing label, if distinct from the name
    pub label: Option<String>,

    pub manufacturer: Option<String>,
    pub model: Option<String>,

    /// Platform location housing the device
    pub location_id: Option<String>,

    /// Room assignment within the location
    pub room_id: Option<String>,

    /// Ordered, deduplicated capability set
    pub capabilities: Vec<DeviceCapability>,

    /// Whether the platform currently reports the device reachable
    pub online: bool,

    /// Opaque platform-specific payload, passed through untouched
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Point-in-time state of a device
///
/// Keys are `capability.attribute` (e.g. `switch.switch`, `dimmer.level`).
/// Produced fresh per query; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub device_id: UniversalDeviceId,
    pub timestamp: DateTime<Utc>,
    pub values: HashMap<String, serde_json::Value>,
}

impl DeviceState {
    pub fn new(device_id: UniversalDeviceId) -> Self {
        Self {
            device_id,
            timestamp: Utc::now(),
            values: HashMap::new(),
        }
    }

    /// Insert a `capability.attribute` value
    pub fn set(
        &mut self,
        capability: DeviceCapability,
        attribute: &str,
        value: serde_json::Value,
    ) {
        self.values
            .insert(format!("{}.{attribute}", capability.as_str()), value);
    }

    /// Look up a `capability.attribute` value
    pub fn get(&self, capability: DeviceCapability, attribute: &str) -> Option<&serde_json::Value> {
        self.values
            .get(&format!("{}.{attribute}", capability.as_str()))
    }
}

/// A unified command addressed at one device capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCommand {
    /// Capability the command belongs to
    pub capability: DeviceCapability,

    /// Command name within the capability (e.g. `on`, `setLevel`)
    pub command: String,

    /// Positional command arguments
    #[serde(default)]
    pub parameters: Vec<serde_json::Value>,
}

impl DeviceCommand {
    pub fn new(capability: DeviceCapability, command: impl Into<String>) -> Self {
        Self {
            capability,
            command: command.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, value: serde_json::Value) -> Self {
        self.parameters.push(value);
        self
    }
}

/// Serializable failure attached to an unsuccessful [`CommandResult`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl CommandFailure {
    pub fn from_error(error: &UnihomeError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of a single command execution
///
/// Command execution never silently discards failure: every attempt yields a
/// result (with `error` set on failure) or errors out before one exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,

    /// Echo of the executed command
    pub command: DeviceCommand,

    pub executed_at: DateTime<Utc>,

    /// Fresh state after execution, when confirmation was requested and the
    /// re-query succeeded
    pub new_state: Option<DeviceState>,

    pub error: Option<CommandFailure>,
}

impl CommandResult {
    pub fn succeeded(command: DeviceCommand, new_state: Option<DeviceState>) -> Self {
        Self {
            success: true,
            command,
            executed_at: Utc::now(),
            new_state,
            error: None,
        }
    }

    pub fn failed(command: DeviceCommand, error: &UnihomeError) -> Self {
        Self {
            success: false,
            command,
            executed_at: Utc::now(),
            new_state: None,
            error: Some(CommandFailure::from_error(error)),
        }
    }
}

/// Health snapshot returned by an adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterHealthStatus {
    pub platform: Platform,
    pub healthy: bool,

    /// Whether the platform API answered at all
    pub reachable: bool,

    /// Whether the credential in use was accepted
    pub authenticated: bool,

    /// Rolling count of failed platform calls since initialization
    pub error_count: u64,

    /// Timestamp of the most recent successful platform call
    pub last_success: Option<DateTime<Utc>>,

    pub message: Option<String>,
}

impl AdapterHealthStatus {
    /// Status for an adapter whose platform call failed
    pub fn unhealthy(platform: Platform, message: impl Into<String>) -> Self {
        Self {
            platform,
            healthy: false,
            reachable: false,
            authenticated: false,
            error_count: 0,
            last_success: None,
            message: Some(message.into()),
        }
    }
}

/// A platform location (home, site)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub name: String,
    pub platform: Platform,
}

/// A room within a location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub location_id: String,
}

/// A scene defined on the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub name: String,
    pub location_id: Option<String>,
}

/// One historical device event in unified shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEvent {
    pub device_id: UniversalDeviceId,
    pub location_id: String,

    /// Event time as reported by the platform
    pub time: DateTime<Utc>,

    /// Epoch milliseconds, kept alongside `time` for cheap delta math
    pub epoch: i64,

    /// Device component the event originated from (`main` for most devices)
    pub component: String,

    pub capability: String,
    pub attribute: String,
    pub value: serde_json::Value,
    pub unit: Option<String>,
}

/// Inclusive time window for history queries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Asynchronous notifications emitted by adapters
///
/// A typed channel instead of stringly-named emitter events: the registry
/// re-emits these wrapped in [`RegistryEvent`] with the owning platform tag.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// A device's state changed
    StateChange {
        device: UnifiedDevice,
        old_state: Option<DeviceState>,
        new_state: DeviceState,
        timestamp: DateTime<Utc>,
    },
    /// A device appeared on the platform
    DeviceAdded {
        device: UnifiedDevice,
        timestamp: DateTime<Utc>,
    },
    /// A device disappeared from the platform
    DeviceRemoved {
        device_id: UniversalDeviceId,
        timestamp: DateTime<Utc>,
    },
    /// A device's reachability flipped
    DeviceOnlineChange {
        device_id: UniversalDeviceId,
        online: bool,
        timestamp: DateTime<Utc>,
    },
    /// An adapter-internal failure worth surfacing
    Error {
        message: String,
        context: String,
        timestamp: DateTime<Utc>,
    },
}

impl AdapterEvent {
    /// The universal device id this event concerns, when it has one
    pub fn device_id(&self) -> Option<&UniversalDeviceId> {
        match self {
            AdapterEvent::StateChange { device, .. } | AdapterEvent::DeviceAdded { device, .. } => {
                Some(&device.id)
            }
            AdapterEvent::DeviceRemoved { device_id, .. }
            | AdapterEvent::DeviceOnlineChange { device_id, .. } => Some(device_id),
            AdapterEvent::Error { .. } => None,
        }
    }
}

/// Adapter event re-emitted by the registry, tagged with the owning platform
#[derive(Debug, Clone)]
pub struct RegistryEvent {
    pub platform: Platform,
    pub event: AdapterEvent,
}

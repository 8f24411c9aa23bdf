//! SmartThings capability mapping tables
//!
//! Pure, total translation between SmartThings capability identifiers and
//! the unified capability set. One canonical platform code per unified
//! capability; multi-code capabilities (multi-gang switches) collapse to
//! their primary code. Unknown inputs map to `None`, never an error.

use crate::types::DeviceCapability;
use serde_json::Value;

/// SmartThings capability id to unified capability
pub fn platform_to_unified(code: &str) -> Option<DeviceCapability> {
    match code {
        "switch" => Some(DeviceCapability::Switch),
        "switchLevel" => Some(DeviceCapability::Dimmer),
        "colorControl" => Some(DeviceCapability::ColorControl),
        "colorTemperature" => Some(DeviceCapability::ColorTemperature),
        "motionSensor" => Some(DeviceCapability::MotionSensor),
        "contactSensor" => Some(DeviceCapability::ContactSensor),
        "temperatureMeasurement" => Some(DeviceCapability::TemperatureSensor),
        "relativeHumidityMeasurement" => Some(DeviceCapability::HumiditySensor),
        "illuminanceMeasurement" => Some(DeviceCapability::IlluminanceSensor),
        "presenceSensor" => Some(DeviceCapability::PresenceSensor),
        "battery" => Some(DeviceCapability::Battery),
        "lock" => Some(DeviceCapability::Lock),
        "thermostat" => Some(DeviceCapability::Thermostat),
        "windowShade" => Some(DeviceCapability::WindowShade),
        "button" => Some(DeviceCapability::Button),
        "powerMeter" => Some(DeviceCapability::PowerMeter),
        "energyMeter" => Some(DeviceCapability::EnergyMeter),
        _ => None,
    }
}

/// Unified capability to its canonical SmartThings capability id
pub fn unified_to_platform(capability: DeviceCapability) -> Option<&'static str> {
    match capability {
        DeviceCapability::Switch => Some("switch"),
        DeviceCapability::Dimmer => Some("switchLevel"),
        DeviceCapability::ColorControl => Some("colorControl"),
        DeviceCapability::ColorTemperature => Some("colorTemperature"),
        DeviceCapability::MotionSensor => Some("motionSensor"),
        DeviceCapability::ContactSensor => Some("contactSensor"),
        DeviceCapability::TemperatureSensor => Some("temperatureMeasurement"),
        DeviceCapability::HumiditySensor => Some("relativeHumidityMeasurement"),
        DeviceCapability::IlluminanceSensor => Some("illuminanceMeasurement"),
        DeviceCapability::PresenceSensor => Some("presenceSensor"),
        DeviceCapability::Battery => Some("battery"),
        DeviceCapability::Lock => Some("lock"),
        DeviceCapability::Thermostat => Some("thermostat"),
        DeviceCapability::WindowShade => Some("windowShade"),
        DeviceCapability::Button => Some("button"),
        DeviceCapability::PowerMeter => Some("powerMeter"),
        DeviceCapability::EnergyMeter => Some("energyMeter"),
    }
}

/// Best-guess capability set from the SmartThings device category
///
/// Used when a device reports no live component status. Unlisted
/// categories get an empty set, not an error.
pub fn capabilities_for_category(category: &str) -> Vec<DeviceCapability> {
    match category {
        "Light" => vec![DeviceCapability::Switch, DeviceCapability::Dimmer],
        "Switch" => vec![DeviceCapability::Switch],
        "SmartPlug" => vec![DeviceCapability::Switch, DeviceCapability::PowerMeter],
        "MotionSensor" => vec![DeviceCapability::MotionSensor, DeviceCapability::Battery],
        "ContactSensor" => vec![DeviceCapability::ContactSensor, DeviceCapability::Battery],
        "MultiFunctionalSensor" => vec![
            DeviceCapability::ContactSensor,
            DeviceCapability::TemperatureSensor,
            DeviceCapability::Battery,
        ],
        "Thermostat" => vec![
            DeviceCapability::Thermostat,
            DeviceCapability::TemperatureSensor,
        ],
        "SmartLock" => vec![DeviceCapability::Lock, DeviceCapability::Battery],
        "Blind" => vec![DeviceCapability::WindowShade, DeviceCapability::Battery],
        "Button" => vec![DeviceCapability::Button, DeviceCapability::Battery],
        _ => Vec::new(),
    }
}

/// A command in SmartThings wire shape
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformCommand {
    /// SmartThings capability id
    pub capability: &'static str,

    /// SmartThings command name
    pub command: String,

    /// Positional arguments, passed through from the unified command
    pub arguments: Vec<Value>,
}

/// Commands SmartThings accepts per unified capability
fn known_commands(capability: DeviceCapability) -> &'static [&'static str] {
    match capability {
        DeviceCapability::Switch => &["on", "off"],
        DeviceCapability::Dimmer => &["setLevel"],
        DeviceCapability::ColorControl => &["setColor", "setHue", "setSaturation"],
        DeviceCapability::ColorTemperature => &["setColorTemperature"],
        DeviceCapability::Lock => &["lock", "unlock"],
        DeviceCapability::Thermostat => &[
            "setHeatingSetpoint",
            "setCoolingSetpoint",
            "setThermostatMode",
            "setThermostatFanMode",
        ],
        DeviceCapability::WindowShade => &["open", "close", "pause"],
        // Sensor capabilities are read-only
        DeviceCapability::MotionSensor
        | DeviceCapability::ContactSensor
        | DeviceCapability::TemperatureSensor
        | DeviceCapability::HumiditySensor
        | DeviceCapability::IlluminanceSensor
        | DeviceCapability::PresenceSensor
        | DeviceCapability::Battery
        | DeviceCapability::Button
        | DeviceCapability::PowerMeter
        | DeviceCapability::EnergyMeter => &[],
    }
}

/// Translate a unified command into SmartThings wire shape
///
/// `None` when the capability has no platform code or the command is not
/// one the capability accepts; callers turn that into a failed result.
pub fn map_command(command: &crate::types::DeviceCommand) -> Option<PlatformCommand> {
    let capability = unified_to_platform(command.capability)?;
    if !known_commands(command.capability).contains(&command.command.as_str()) {
        return None;
    }
    Some(PlatformCommand {
        capability,
        command: command.command.clone(),
        arguments: command.parameters.clone(),
    })
}

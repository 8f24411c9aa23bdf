//! Platform adapters
//!
//! Each submodule implements [`crate::adapter::DeviceAdapter`] for one
//! platform. SmartThings ships here; Tuya and Lutron integrations plug in
//! through the same trait from their own crates.

pub mod smartthings;

pub use smartthings::{SmartThingsAdapter, SmartThingsConfig};

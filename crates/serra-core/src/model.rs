//! # Home Model
//!
//! Plain records for the physical side of the system: zones, the devices
//! and outlets that live in them, sensors and their readings, plus the
//! kill switch and audit trail.

use crate::{AuditId, DeviceId, OutletId, ReadingId, SensorId, Timestamp, ZoneId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// ZONES
// =============================================================================

/// How a zone is currently driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneMode {
    /// Outlets are only switched by hand.
    #[default]
    Manual,
    /// An automation session is running; the scheduler evaluates scenes.
    Automatic,
}

impl fmt::Display for ZoneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("manual"),
            Self::Automatic => f.write_str("automatic"),
        }
    }
}

/// A physical area with its own outlets and sensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    /// Unique short name ("serra", "terrario").
    pub slug: String,
    pub name: String,
    pub mode: ZoneMode,
    pub active: bool,
}

// =============================================================================
// DEVICES & OUTLETS
// =============================================================================

/// A switchable device, usually a multi-outlet power strip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub zone: ZoneId,
    /// Vendor family the bridge speaks to ("tuya").
    pub provider: String,
    /// Identifier of the device on the vendor side.
    pub provider_device_id: String,
    pub name: String,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

/// One channel of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outlet {
    pub id: OutletId,
    pub device: DeviceId,
    /// Vendor channel code ("switch_1").
    pub channel: String,
    /// What is plugged in ("heating", "lighting", ...).
    pub role: Option<String>,
    pub custom_name: Option<String>,
    pub enabled: bool,
    /// Last state we know the outlet to be in.
    pub last_state: bool,
    pub manual_override: bool,
    pub manual_override_until: Option<Timestamp>,
}

impl Outlet {
    /// Create an enabled, switched-off outlet.
    #[must_use]
    pub fn new(id: OutletId, device: DeviceId, channel: impl Into<String>) -> Self {
        Self {
            id,
            device,
            channel: channel.into(),
            role: None,
            custom_name: None,
            enabled: true,
            last_state: false,
            manual_override: false,
            manual_override_until: None,
        }
    }

    /// The user-facing name, falling back to the channel code.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.channel)
    }

    /// Whether a manual override is holding the outlet at `now`.
    ///
    /// An override without an end time holds until cleared.
    #[must_use]
    pub fn override_active(&self, now: Timestamp) -> bool {
        self.manual_override && self.manual_override_until.is_none_or(|until| until > now)
    }
}

// =============================================================================
// SENSORS & READINGS
// =============================================================================

/// The environmental quantities rules can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    Humidity,
}

impl Metric {
    /// All metrics in evaluation order.
    pub const ALL: [Metric; 2] = [Metric::Temperature, Metric::Humidity];

    /// Display unit of the metric.
    #[must_use]
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temperature => f.write_str("temperature"),
            Self::Humidity => f.write_str("humidity"),
        }
    }
}

/// A sensor attached to a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: SensorId,
    pub zone: ZoneId,
    pub provider: String,
    pub provider_sensor_id: String,
    /// "temperature_humidity", "temperature", ...
    pub kind: String,
    pub name: String,
}

/// A single observed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: ReadingId,
    pub sensor: SensorId,
    pub metric: Metric,
    pub value: f64,
    pub observed_at: Timestamp,
}

// =============================================================================
// KILL SWITCH & AUDIT
// =============================================================================

/// Global emergency stop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitch {
    pub active: bool,
    pub reason: Option<String>,
    pub activated_at: Option<Timestamp>,
    pub deactivated_at: Option<Timestamp>,
}

/// A record of something the system did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    pub action: String,
    pub details: BTreeMap<String, String>,
    pub at: Timestamp,
}

// =============================================================================
// TESTS
// =============================================================================

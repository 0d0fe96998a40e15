//! Shared types for the trackbee decoding engine.
//!
//! The canonical output of every vendor decoder is a [`Position`]: one
//! normalized location/telemetry observation. Everything a protocol reports
//! beyond the fixed fields goes into the open [`Attributes`] map under the
//! well-known keys in [`attr`].

use std::{
    collections::BTreeMap,
    fmt::{
        Debug,
        Display,
    },
};

use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Opaque stable identifier of a logical device.
///
/// Resolved from a vendor-supplied unique string (IMEI, serial, ICCID, …) by
/// the identifier-resolution collaborator. The engine never interprets it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

impl Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

/// One normalized location/telemetry observation.
///
/// Ownership passes to the persistence collaborator immediately after
/// creation; the engine never mutates a forwarded position.
#[derive(Clone, Debug, Serialize)]
pub struct Position {
    pub device_id: DeviceId,
    pub protocol: &'static str,
    /// Device-reported fix time. `None` for messages that carry no clock.
    pub fix_time: Option<DateTime<Utc>>,
    /// Time the server decoded the message.
    pub server_time: DateTime<Utc>,
    /// GPS fix validity. When `false` the coordinates may still hold the
    /// last known fix and must not be treated as live by consumers.
    pub valid: bool,
    /// Signed decimal degrees, in `[-90, 90]`.
    pub latitude: f64,
    /// Signed decimal degrees, in `[-180, 180]`.
    pub longitude: f64,
    /// Speed in knots.
    pub speed: f64,
    /// Course over ground in degrees.
    pub course: f64,
    /// Altitude in meters.
    pub altitude: f64,
    pub attributes: Attributes,
}

impl Position {
    pub fn new(device_id: DeviceId, protocol: &'static str) -> Self {
        Self {
            device_id,
            protocol,
            fix_time: None,
            server_time: Utc::now(),
            valid: false,
            latitude: 0.0,
            longitude: 0.0,
            speed: 0.0,
            course: 0.0,
            altitude: 0.0,
            attributes: Attributes::default(),
        }
    }

    /// Checks the coordinate invariant.
    ///
    /// Decoders normally produce in-range values through the codec toolkit;
    /// the dispatcher re-checks before forwarding so a buggy module can't
    /// push impossible coordinates downstream.
    pub fn check_coordinates(&self) -> Result<(), CoordinateRangeError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(CoordinateRangeError {
                axis: "latitude",
                value: self.latitude,
            });
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(CoordinateRangeError {
                axis: "longitude",
                value: self.longitude,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("{axis} out of range: {value}")]
pub struct CoordinateRangeError {
    pub axis: &'static str,
    pub value: f64,
}

/// Open string-keyed map for protocol-specific telemetry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(pub BTreeMap<String, serde_json::Value>);

impl Attributes {
    pub fn set(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.0.insert(key.to_owned(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Well-known attribute keys.
///
/// Protocol modules are free to add keys of their own; these are the ones
/// shared across modules so downstream consumers can rely on the spelling.
pub mod attr {
    /// Battery voltage in volts.
    pub const BATTERY: &str = "battery";
    /// Battery charge in percent.
    pub const BATTERY_LEVEL: &str = "batteryLevel";
    /// Total odometer in meters.
    pub const ODOMETER: &str = "odometer";
    pub const SATELLITES: &str = "satellites";
    /// GSM signal strength indicator, unit per protocol.
    pub const RSSI: &str = "rssi";
    pub const ALARM: &str = "alarm";
    pub const IGNITION: &str = "ignition";
    /// External power connected.
    pub const CHARGE: &str = "charge";
    pub const MCC: &str = "mcc";
    pub const MNC: &str = "mnc";
    pub const LAC: &str = "lac";
    pub const CID: &str = "cid";
    /// Monotonic index of an archived record.
    pub const ARCHIVE_INDEX: &str = "archiveIndex";
    pub const EVENT: &str = "event";
    pub const ADC1: &str = "adc1";
    /// Digital input states as a bitmask.
    pub const INPUT: &str = "input";
    /// Digital output states as a bitmask.
    pub const OUTPUT: &str = "output";
}

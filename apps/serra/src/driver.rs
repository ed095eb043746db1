//! # Outlet Drivers
//!
//! The bridge between decisions and hardware.
//!
//! ```text
//! ┌──────────────┐   POST /devices/{id}/switch    ┌──────────────────┐
//! │  serra       │ ─────────────────────────────► │  device bridge   │
//! │  executor    │   GET  /sensors/{id}           │  (vendor clouds) │
//! └──────────────┘ ◄───────────────────────────── └──────────────────┘
//! ```
//!
//! Without a bridge the simulated driver accepts every command and keeps a
//! log of what it was asked to do.

use serde::{Deserialize, Serialize};
use serra_core::{Device, Outlet, Sensor};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors talking to a device.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The bridge could not be reached or answered with an error status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The bridge answered, but the device refused the command.
    #[error("device rejected command: {0}")]
    Rejected(String),

    /// The bridge answered with something unexpected.
    #[error("unexpected bridge response: {0}")]
    Decode(String),
}

/// A switch command as sent to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchCommand {
    pub provider_device_id: String,
    pub channel: String,
    pub state: bool,
}

#[derive(Debug, Serialize)]
struct SwitchRequest<'a> {
    channel: &'a str,
    state: bool,
}

#[derive(Debug, Deserialize)]
struct SwitchResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Values read from a sensor through the bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorPayload {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
}

/// How outlets are actually switched.
#[derive(Debug)]
pub enum OutletDriver {
    /// Accepts every command and records it.
    Simulated { log: Mutex<Vec<SwitchCommand>> },
    /// Forwards commands to an HTTP device bridge.
    HttpBridge {
        base_url: String,
        client: reqwest::Client,
    },
}

impl OutletDriver {
    #[must_use]
    pub fn simulated() -> Self {
        Self::Simulated {
            log: Mutex::new(Vec::new()),
        }
    }

    /// A driver talking to the bridge at `base_url`.
    pub fn http_bridge(base_url: impl Into<String>) -> Result<Self, DriverError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::HttpBridge {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// The bridge driver when a URL is configured, the simulator otherwise.
    pub fn from_bridge_url(url: Option<&str>) -> Result<Self, DriverError> {
        match url {
            Some(url) => Self::http_bridge(url),
            None => Ok(Self::simulated()),
        }
    }

    /// Driver name for logs and health output.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Simulated { .. } => "simulated",
            Self::HttpBridge { .. } => "http_bridge",
        }
    }

    /// Whether sensors can be polled through this driver.
    #[must_use]
    pub fn can_poll_sensors(&self) -> bool {
        matches!(self, Self::HttpBridge { .. })
    }

    /// Switch one outlet of `device`.
    pub async fn switch(
        &self,
        device: &Device,
        outlet: &Outlet,
        state: bool,
    ) -> Result<(), DriverError> {
        match self {
            Self::Simulated { log } => {
                info!(
                    device = %device.provider_device_id,
                    channel = %outlet.channel,
                    state,
                    "SIMULATION: switching outlet"
                );
                if let Ok(mut log) = log.lock() {
                    log.push(SwitchCommand {
                        provider_device_id: device.provider_device_id.clone(),
                        channel: outlet.channel.clone(),
                        state,
                    });
                }
                Ok(())
            }
            Self::HttpBridge { base_url, client } => {
                let url = format!("{base_url}/devices/{}/switch", device.provider_device_id);
                debug!(%url, channel = %outlet.channel, state, "bridge switch");
                let resp: SwitchResponse = client
                    .post(&url)
                    .json(&SwitchRequest {
                        channel: &outlet.channel,
                        state,
                    })
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await
                    .map_err(|e| DriverError::Decode(e.to_string()))?;
                if resp.success {
                    Ok(())
                } else {
                    Err(DriverError::Rejected(
                        resp.error.unwrap_or_else(|| "no reason given".to_string()),
                    ))
                }
            }
        }
    }

    /// Read a sensor through the bridge. The simulator has nothing to read.
    pub async fn read_sensor(&self, sensor: &Sensor) -> Result<Option<SensorPayload>, DriverError> {
        match self {
            Self::Simulated { .. } => Ok(None),
            Self::HttpBridge { base_url, client } => {
                let url = format!("{base_url}/sensors/{}", sensor.provider_sensor_id);
                let payload = client
                    .get(&url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<SensorPayload>()
                    .await
                    .map_err(|e| DriverError::Decode(e.to_string()))?;
                Ok(Some(payload))
            }
        }
    }

    /// Commands the simulator received, oldest first. Empty for the bridge.
    #[must_use]
    pub fn simulated_log(&self) -> Vec<SwitchCommand> {
        match self {
            Self::Simulated { log } => log.lock().map(|l| l.clone()).unwrap_or_default(),
            Self::HttpBridge { .. } => Vec::new(),
        }
    }
}

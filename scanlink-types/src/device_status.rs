//! Device status snapshot

use std::fmt;

use chrono::{DateTime, Utc};

/// Last known status reported by a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Device type (e.g. "Scanner", "Printer")
    pub device_type: String,
    
    /// Device name
    pub device_name: String,
    
    /// Device firmware version
    pub device_version: String,
    
    /// Free-form status string (e.g. "idle", "marking")
    pub device_status: String,
    
    /// When the status was received
    pub observed_at: DateTime<Utc>,
}

impl DeviceStatus {
    pub fn new(
        device_type: impl Into<String>,
        device_name: impl Into<String>,
        device_version: impl Into<String>,
        device_status: impl Into<String>,
    ) -> Self {
        Self {
            device_type: device_type.into(),
            device_name: device_name.into(),
            device_version: device_version.into(),
            device_status: device_status.into(),
            observed_at: Utc::now(),
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{} v{}: {}]",
            self.device_type, self.device_name, self.device_version, self.device_status
        )
    }
}

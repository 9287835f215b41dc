//! Identity a device announces when it logs in

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Device identity
///
/// Populated exactly once per connection, from the first LoginRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Device name (the key the controller accepts devices under)
    pub device_name: String,

    /// Name of the firmware application running on the device
    pub application_name: String,

    /// Firmware application version
    pub application_version: String,

    /// When the login was accepted
    pub logged_in_at: DateTime<Utc>,
}

impl DeviceIdentity {
    /// Create a new identity stamped with the current time
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `device_name` is empty.
    pub fn new(
        device_name: impl Into<String>,
        application_name: impl Into<String>,
        application_version: impl Into<String>,
    ) -> Result<Self> {
        let device_name = device_name.into();
        if device_name.is_empty() {
            return Err(Error::Validation("device name must not be empty".into()));
        }

        Ok(Self {
            device_name,
            application_name: application_name.into(),
            application_version: application_version.into(),
            logged_in_at: Utc::now(),
        })
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device[{}, App: {} {}]",
            self.device_name, self.application_name, self.application_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_new() {
        let identity = DeviceIdentity::new("dev1", "ctrl", "1.0").unwrap();
        assert_eq!(identity.device_name, "dev1");
        assert_eq!(identity.to_string(), "Device[dev1, App: ctrl 1.0]");
    }

    #[test]
    fn test_identity_rejects_empty_name() {
        assert!(matches!(
            DeviceIdentity::new("", "ctrl", "1.0"),
            Err(Error::Validation(_))
        ));
    }
}

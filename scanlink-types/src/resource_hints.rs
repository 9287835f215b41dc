//! Hints attached to an accepted device

use std::net::IpAddr;

use crate::error::{Error, Result};

/// Resource hints supplied when a device is accepted
///
/// Hints can be updated by re-accepting the same device name; an already
/// logged-in connection keeps running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceHints {
    /// If set, logins for this device are only accepted from this address
    pub address: Option<IpAddr>,

    /// Human-readable description (e.g. "line 3 marking laser")
    pub description: Option<String>,
}

impl ResourceHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict logins to the given address
    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    /// Restrict logins to an address given as text
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if `address` is not an IP address.
    pub fn with_address_str(self, address: &str) -> Result<Self> {
        let parsed = address
            .parse::<IpAddr>()
            .map_err(|e| Error::Parse(format!("{}: {}", address, e)))?;
        Ok(self.with_address(parsed))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check whether a peer address satisfies these hints
    pub fn permits(&self, peer: IpAddr) -> bool {
        self.address.is_none_or(|expected| expected == peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints_default_permit_any() {
        let hints = ResourceHints::new();
        assert!(hints.permits("10.0.0.7".parse().unwrap()));
    }

    #[test]
    fn test_hints_address_restricts() {
        let hints = ResourceHints::new().with_address_str("10.0.0.7").unwrap();
        assert!(hints.permits("10.0.0.7".parse().unwrap()));
        assert!(!hints.permits("10.0.0.8".parse().unwrap()));
    }

    #[test]
    fn test_hints_bad_address() {
        let result = ResourceHints::new().with_address_str("not-an-ip");
        assert!(matches!(result, Err(Error::Parse(_))));
    }
}

//! Server configuration

use std::time::Duration;

use scanlink_core::constants::DEFAULT_REQUEST_TIMEOUT;
use scanlink_core::SessionConfig;

/// Server configuration
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use scanlink::ServerConfig;
///
/// let config = ServerConfig::default()
///     .with_request_timeout(Duration::from_secs(2))
///     .with_heartbeat_interval(Duration::from_secs(10));
/// assert_eq!(config.heartbeat_interval, Some(Duration::from_secs(10)));
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Applied to every accepted connection
    pub session: SessionConfig,
    
    /// Timeout for commands dispatched to devices
    pub request_timeout: Duration,
    
    /// Status polling period; `None` disables polling
    pub heartbeat_interval: Option<Duration>,
}

impl ServerConfig {
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
    
    /// Set command timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
    
    /// Enable heartbeat status polling
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            heartbeat_interval: None,
        }
    }
}

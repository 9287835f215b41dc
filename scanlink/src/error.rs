//! High-level error types

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] scanlink_core::Error),
    
    #[error("Transport error: {0}")]
    Transport(#[from] scanlink_transport::Error),
    
    #[error("Type error: {0}")]
    Types(#[from] scanlink_types::Error),
    
    #[error("Device not connected: {0}")]
    DeviceNotConnected(String),
    
    #[error("Device not accepted: {0}")]
    DeviceNotAccepted(String),
    
    #[error("Secure transport is not supported")]
    SecureTransportUnsupported,
    
    #[error("Server already started")]
    AlreadyStarted,
    
    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Check if the failed operation may succeed when retried
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Core(e) => e.is_recoverable(),
            Self::DeviceNotConnected(_) => true,
            _ => false,
        }
    }
}

//! Type definitions for scanlink

pub mod device_identity;
pub mod device_status;
pub mod error;
pub mod resource_hints;

pub use device_identity::DeviceIdentity;
pub use device_status::DeviceStatus;
pub use error::{Error, Result};
pub use resource_hints::ResourceHints;

//! Device-side endpoint
//!
//! Connects to a controller, logs in, answers requests and pushes
//! unsolicited status or error reports. Everything the device sends on its
//! own initiative carries [`UNSOLICITED_SEQUENCE_NUMBER`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace};

use scanlink_core::constants::{DEFAULT_REQUEST_TIMEOUT, UNSOLICITED_SEQUENCE_NUMBER};
use scanlink_core::{
    DeviceStatusBody, ErrorBody, LoginRequest, Message, MessageBody, MessageRegistry,
};
use scanlink_transport::{TcpTransport, Transport};

use crate::error::Result;

/// Device endpoint talking to a controller
///
/// # Examples
///
/// ```no_run
/// use scanlink::{DeviceClient, DeviceStatusBody, LoginRequest, MessageBody};
///
/// #[tokio::main]
/// async fn main() -> scanlink::Result<()> {
///     let login = LoginRequest::new("scanner-1", "scanctl", "2.1")?;
///     let mut device = DeviceClient::new("192.168.1.20", 5000, login);
///     
///     device.connect().await?;
///     
///     let request = device.next_message().await?;
///     if let MessageBody::DeviceStatusRequest(_) = request.body {
///         let status = DeviceStatusBody::new("scanner", "scanner-1", "2.1", "idle")?;
///         device.reply(&request, MessageBody::DeviceStatusReply(status)).await?;
///     }
///     
///     device.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct DeviceClient {
    transport: Box<dyn Transport>,
    registry: Arc<MessageRegistry>,
    timeout: Duration,
    login: LoginRequest,
}

impl DeviceClient {
    /// Create a device endpoint (TCP transport)
    pub fn new(ip: impl Into<String>, port: u16, login: LoginRequest) -> Self {
        Self::with_transport(Box::new(TcpTransport::new(ip, port)), login)
    }
    
    /// Create a device endpoint over any transport
    pub fn with_transport(transport: Box<dyn Transport>, login: LoginRequest) -> Self {
        Self {
            transport,
            registry: MessageRegistry::standard(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            login,
        }
    }
    
    /// Set read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
    
    /// Use a custom decoder registry
    pub fn with_registry(mut self, registry: Arc<MessageRegistry>) -> Self {
        self.registry = registry;
        self
    }
    
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
    
    pub fn device_name(&self) -> &str {
        &self.login.device_name
    }
    
    /// Connect and send the LoginRequest
    ///
    /// The controller does not acknowledge a login. A rejection arrives as
    /// an ErrorMessage followed by a close.
    pub async fn connect(&mut self) -> Result<()> {
        info!("Connecting to {}...", self.transport.remote_addr());
        
        self.transport.connect().await?;
        
        let body = MessageBody::LoginRequest(self.login.clone());
        self.send(body).await?;
        
        info!("Logged in as {}", self.login.device_name);
        Ok(())
    }
    
    pub async fn disconnect(&mut self) -> Result<()> {
        info!("Disconnecting...");
        self.transport.disconnect().await?;
        Ok(())
    }
    
    /// Wait for the next complete message from the controller
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Nothing arrives within the timeout
    /// - The controller closes the connection
    /// - The frame cannot be decoded
    pub async fn next_message(&mut self) -> Result<Message> {
        let frame = self.transport.receive_frame(self.timeout).await?;
        let message = self.registry.decode_frame(&frame)?;
        
        trace!("Received: {}", message);
        Ok(message)
    }
    
    /// Answer a controller request, echoing its sequence number
    pub async fn reply(&mut self, request: &Message, body: MessageBody) -> Result<()> {
        let message = Message::new(request.sequence_number, body);
        self.write_message(&message).await
    }
    
    /// Send an unsolicited message
    pub async fn send(&mut self, body: MessageBody) -> Result<()> {
        let message = Message::new(UNSOLICITED_SEQUENCE_NUMBER, body);
        self.write_message(&message).await
    }
    
    /// Report status without being asked
    pub async fn push_status(&mut self, status: DeviceStatusBody) -> Result<()> {
        self.send(MessageBody::DeviceStatusReply(status)).await
    }
    
    /// Report a device-side error
    pub async fn push_error(&mut self, text: impl Into<String>) -> Result<()> {
        let body = ErrorBody::new(text)?;
        self.send(MessageBody::ErrorMessage(body)).await
    }
    
    async fn write_message(&mut self, message: &Message) -> Result<()> {
        let frame = self.registry.encode_frame(message)?;
        
        debug!("Sending: {}", frame);
        self.transport.send_frame(&frame).await?;
        Ok(())
    }
}

impl std::fmt::Debug for DeviceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceClient")
            .field("remote", &self.transport.remote_addr())
            .field("device_name", &self.login.device_name)
            .field("connected", &self.transport.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    
    fn login() -> LoginRequest {
        LoginRequest::new("scanner-1", "scanctl", "2.1").unwrap()
    }
    
    #[test]
    fn test_device_create() {
        let device = DeviceClient::new("127.0.0.1", 5000, login());
        assert!(!device.is_connected());
        assert_eq!(device.device_name(), "scanner-1");
    }
    
    #[tokio::test]
    async fn test_send_without_connection() {
        let mut device = DeviceClient::new("127.0.0.1", 5000, login());
        let result = device.push_error("laser fault").await;
        assert!(matches!(
            result,
            Err(Error::Transport(scanlink_transport::Error::NotConnected))
        ));
    }
    
    #[tokio::test]
    async fn test_push_error_too_long() {
        let mut device = DeviceClient::new("127.0.0.1", 5000, login());
        let result = device.push_error("x".repeat(257)).await;
        assert!(matches!(
            result,
            Err(Error::Core(scanlink_core::Error::StringExceedsCharacterLimit { .. }))
        ));
    }
}

//! Controller-side server registry
//!
//! Tracks which devices may connect, which connection each logged-in device
//! is bound to, and routes commands to the bound session.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use scanlink_core::{Session, SessionEvent, SessionId};
use scanlink_transport::{
    ConnectionHandle, ConnectionHandler, ConnectionId, Disposition, ListenerHandle, TcpAcceptor,
};
use scanlink_types::{DeviceIdentity, DeviceStatus, ResourceHints};

use crate::command::{CommandOutcome, DeviceCommand};
use crate::config::ServerConfig;
use crate::error::{Error, Result};

struct DeviceEntry {
    hints: ResourceHints,
    connection: Option<ConnectionId>,
    last_status: Option<DeviceStatus>,
}

struct Connection {
    session: Session,
    peer: SocketAddr,
}

#[derive(Default)]
struct Registry {
    devices: HashMap<String, DeviceEntry>,
    connections: BTreeMap<ConnectionId, Connection>,
}

/// Controller server
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use scanlink::{DeviceCommand, ResourceHints, Server, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> scanlink::Result<()> {
///     let server = Arc::new(Server::new(ServerConfig::default()));
///     server.accept_device("scanner-1", ResourceHints::default());
///     
///     let addr = server.start("0.0.0.0", 5000, false).await?;
///     println!("Listening on {}", addr);
///     
///     let outcome = server.dispatch("scanner-1", DeviceCommand::RequestStatus).await?;
///     println!("{:?}", outcome);
///     
///     server.stop().await;
///     Ok(())
/// }
/// ```
pub struct Server {
    config: ServerConfig,
    registry: Mutex<Registry>,
    next_session_id: AtomicU64,
    listener: Mutex<Option<ListenerHandle>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Mutex::new(Registry::default()),
            next_session_id: AtomicU64::new(1),
            listener: Mutex::new(None),
            heartbeat: Mutex::new(None),
        }
    }
    
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
    
    /// Allow a device name to log in
    ///
    /// Calling it again for a known device replaces its hints and keeps any
    /// live binding.
    pub fn accept_device(&self, device_name: impl Into<String>, hints: ResourceHints) {
        let device_name = device_name.into();
        let mut registry = self.registry.lock();
        
        match registry.devices.get_mut(&device_name) {
            Some(entry) => {
                debug!("Updating hints for {}", device_name);
                entry.hints = hints;
            }
            None => {
                info!("Accepting device {}", device_name);
                registry.devices.insert(
                    device_name,
                    DeviceEntry { hints, connection: None, last_status: None },
                );
            }
        }
    }
    
    /// Names of all accepted devices, sorted
    pub fn accepted_devices(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.lock().devices.keys().cloned().collect();
        names.sort();
        names
    }
    
    /// Bind and start accepting device connections
    ///
    /// Returns the bound address. `secure` must be false; encrypted transport
    /// is not available.
    pub async fn start(
        self: &Arc<Self>,
        bind_address: &str,
        port: u16,
        secure: bool,
    ) -> Result<SocketAddr> {
        if secure {
            return Err(Error::SecureTransportUnsupported);
        }
        if self.listener.lock().is_some() {
            return Err(Error::AlreadyStarted);
        }
        
        let acceptor = TcpAcceptor::bind(bind_address, port).await?;
        let handler: Arc<dyn ConnectionHandler> = self.clone();
        let handle = acceptor.spawn(handler)?;
        let local_addr = handle.local_addr();
        
        let raced = {
            let mut listener = self.listener.lock();
            if listener.is_some() {
                Some(handle)
            } else {
                *listener = Some(handle);
                None
            }
        };
        if let Some(handle) = raced {
            handle.shutdown().await;
            return Err(Error::AlreadyStarted);
        }
        
        if let Some(interval) = self.config.heartbeat_interval {
            let task = self.spawn_heartbeat(interval);
            if let Some(previous) = self.heartbeat.lock().replace(task) {
                previous.abort();
            }
        }
        
        info!("Server listening on {}", local_addr);
        Ok(local_addr)
    }
    
    /// Stop listening and disconnect every session
    pub async fn stop(&self) {
        if let Some(task) = self.heartbeat.lock().take() {
            task.abort();
        }
        
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.shutdown().await;
        }
        
        for session in self.list_connections() {
            session.disconnect();
        }
        
        info!("Server stopped");
    }
    
    /// Snapshot of every live session, in accept order
    pub fn list_connections(&self) -> Vec<Session> {
        self.registry
            .lock()
            .connections
            .values()
            .map(|connection| connection.session.clone())
            .collect()
    }
    
    /// Logged-in session bound to an accepted device
    pub fn session_for(&self, device_name: &str) -> Option<Session> {
        let registry = self.registry.lock();
        let id = registry.devices.get(device_name)?.connection?;
        registry
            .connections
            .get(&id)
            .map(|connection| connection.session.clone())
            .filter(Session::is_logged_in)
    }
    
    /// Last status reported by a device, polled or pushed
    pub fn device_status(&self, device_name: &str) -> Option<DeviceStatus> {
        self.registry
            .lock()
            .devices
            .get(device_name)
            .and_then(|entry| entry.last_status.clone())
    }
    
    /// Send a command to a device and wait for its reply
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The device is not accepted or has no logged-in session
    /// - The device does not answer within the request timeout
    /// - The device answers with an ErrorMessage
    pub async fn dispatch(&self, device_name: &str, command: DeviceCommand) -> Result<CommandOutcome> {
        let session = self
            .session_for(device_name)
            .ok_or_else(|| Error::DeviceNotConnected(device_name.to_string()))?;
        
        let (body, expected) = command.into_request()?;
        debug!("Dispatching {} to {}", body.message_type(), device_name);
        
        let reply = session
            .send_request(body, expected, self.config.request_timeout)
            .await?;
        let outcome = CommandOutcome::try_from(reply)?;
        
        if let CommandOutcome::Status(status) = &outcome {
            if let Some(entry) = self.registry.lock().devices.get_mut(device_name) {
                entry.last_status = Some(status.clone());
            }
        }
        
        Ok(outcome)
    }
    
    /// Poll the status of every bound device once
    pub async fn poll_statuses(&self) {
        let bound: Vec<String> = {
            let registry = self.registry.lock();
            registry
                .devices
                .iter()
                .filter(|(_, entry)| entry.connection.is_some())
                .map(|(name, _)| name.clone())
                .collect()
        };
        
        for name in bound {
            match self.dispatch(&name, DeviceCommand::RequestStatus).await {
                Ok(_) => debug!("Status refreshed for {}", name),
                Err(e) => warn!("Status poll of {} failed: {}", name, e),
            }
        }
    }
    
    /// Poll statuses every `interval` until the server is dropped
    pub fn spawn_heartbeat(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let server: Weak<Self> = Arc::downgrade(self);
        
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            
            loop {
                ticker.tick().await;
                
                let Some(server) = server.upgrade() else {
                    break;
                };
                server.poll_statuses().await;
            }
        })
    }
    
    /// Keep a pushed status if the connection is still bound to its device
    fn record_status(&self, connection_id: ConnectionId, status: DeviceStatus) {
        let mut registry = self.registry.lock();
        let bound = registry
            .devices
            .values_mut()
            .find(|entry| entry.connection == Some(connection_id));
        
        match bound {
            Some(entry) => {
                debug!("{} pushed status: {}", connection_id, status);
                entry.last_status = Some(status);
            }
            None => debug!("Ignoring status from unbound {}", connection_id),
        }
    }
    
    /// Bind a freshly logged-in session to its device entry
    ///
    /// Returns the session it replaces, if any.
    fn bind_login(
        &self,
        connection_id: ConnectionId,
        identity: &DeviceIdentity,
    ) -> Result<Option<Session>> {
        let mut registry = self.registry.lock();
        let Registry { devices, connections } = &mut *registry;
        
        let peer = connections
            .get(&connection_id)
            .map(|connection| connection.peer)
            .ok_or_else(|| Error::DeviceNotConnected(connection_id.to_string()))?;
        
        let entry = devices
            .get_mut(&identity.device_name)
            .ok_or_else(|| Error::DeviceNotAccepted(identity.device_name.clone()))?;
        
        if !entry.hints.permits(peer.ip()) {
            return Err(Error::DeviceNotAccepted(format!(
                "{} from {}",
                identity.device_name,
                peer.ip()
            )));
        }
        
        let replaced = entry
            .connection
            .replace(connection_id)
            .filter(|previous| *previous != connection_id)
            .and_then(|previous| connections.get(&previous))
            .map(|connection| connection.session.clone());
        
        Ok(replaced)
    }
}

impl ConnectionHandler for Server {
    fn on_connection_accepted(&self, connection: ConnectionHandle) -> u64 {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let connection_id = connection.id();
        let peer = connection.peer_addr();
        
        let session = Session::new(
            SessionId(session_id),
            Arc::new(connection),
            self.config.session.clone(),
        );
        
        debug!("{} from {} wrapped in session {}", connection_id, peer, session.id());
        self.registry
            .lock()
            .connections
            .insert(connection_id, Connection { session, peer });
        
        session_id
    }
    
    fn on_bytes_received(&self, connection_id: ConnectionId, bytes: &[u8]) -> Disposition {
        let session = match self.registry.lock().connections.get(&connection_id) {
            Some(connection) => connection.session.clone(),
            None => return Disposition::Close,
        };
        
        for event in session.on_bytes_received(bytes) {
            match event {
                SessionEvent::LoggedIn(identity) => match self.bind_login(connection_id, &identity) {
                    Ok(replaced) => {
                        info!("{} bound to session {}", identity, session.id());
                        if let Some(old) = replaced {
                            info!("Session {} replaced by {}", old.id(), session.id());
                            old.disconnect();
                        }
                    }
                    Err(e) => {
                        warn!("Rejecting login on {}: {}", connection_id, e);
                        session.reject_login(&e.to_string());
                    }
                },
                SessionEvent::StatusReported(status) => self.record_status(connection_id, status),
                SessionEvent::DecodeFailed(e) => {
                    debug!("{} dropped a frame: {}", connection_id, e);
                }
                SessionEvent::Closed(reason) => {
                    debug!("{} session closed: {}", connection_id, reason);
                }
            }
        }
        
        if session.is_closed() {
            Disposition::Close
        } else {
            Disposition::Continue
        }
    }
    
    fn on_connection_closed(&self, connection_id: ConnectionId) {
        let removed = {
            let mut registry = self.registry.lock();
            let removed = registry.connections.remove(&connection_id);
            for entry in registry.devices.values_mut() {
                if entry.connection == Some(connection_id) {
                    entry.connection = None;
                }
            }
            removed
        };
        
        if let Some(connection) = removed {
            debug!("{} from {} closed", connection_id, connection.peer);
            connection.session.on_connection_closed();
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("Server")
            .field("devices", &registry.devices.len())
            .field("connections", &registry.connections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    
    #[test]
    fn test_accept_device_is_idempotent() {
        let server = Server::new(ServerConfig::default());
        server.accept_device("scanner-1", ResourceHints::default());
        server.accept_device(
            "scanner-1",
            ResourceHints::default().with_description("bench"),
        );
        server.accept_device("laser-1", ResourceHints::default());
        
        assert_eq!(server.accepted_devices(), vec!["laser-1".to_string(), "scanner-1".to_string()]);
        assert!(server.list_connections().is_empty());
    }
    
    #[tokio::test]
    async fn test_dispatch_to_unknown_device() {
        let server = Server::new(ServerConfig::default());
        server.accept_device("scanner-1", ResourceHints::default());
        
        let result = server.dispatch("scanner-1", DeviceCommand::StopFirmware).await;
        assert!(matches!(result, Err(Error::DeviceNotConnected(name)) if name == "scanner-1"));
        
        let result = server.dispatch("nobody", DeviceCommand::RequestStatus).await;
        assert!(matches!(result, Err(Error::DeviceNotConnected(_))));
        assert_eq!(server.device_status("scanner-1"), None);
    }
    
    #[tokio::test]
    async fn test_secure_start_rejected() {
        let server = Arc::new(Server::new(ServerConfig::default()));
        let result = server.start("127.0.0.1", 0, true).await;
        assert!(matches!(result, Err(Error::SecureTransportUnsupported)));
    }
    
    #[tokio::test]
    async fn test_start_twice() {
        let server = Arc::new(Server::new(ServerConfig::default()));
        let addr = server.start("127.0.0.1", 0, false).await.unwrap();
        assert_ne!(addr.port(), 0);
        
        let result = server.start("127.0.0.1", 0, false).await;
        assert!(matches!(result, Err(Error::AlreadyStarted)));
        
        server.stop().await;
    }
}

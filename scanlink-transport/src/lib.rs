//! Transport layer for scanlink
//!
//! The protocol core never opens sockets. This crate supplies the two sides
//! that do: a TCP acceptor that feeds accepted connections into a
//! [`ConnectionHandler`], and a framed TCP client used by device-side
//! endpoints.

pub mod error;
pub mod listener;
pub mod tcp;

pub use error::{Error, Result};
pub use listener::{ConnectionHandle, ListenerHandle, TcpAcceptor};
pub use tcp::TcpTransport;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use scanlink_core::Frame;

/// Framed transport for the connecting side
///
/// Implementations own the stream framing: `receive_frame` keeps partial
/// frames buffered across calls and only hands back complete ones.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection
    async fn connect(&mut self) -> Result<()>;
    
    /// Close the connection, dropping any partial frame
    async fn disconnect(&mut self) -> Result<()>;
    
    fn is_connected(&self) -> bool;
    
    /// Write one frame
    async fn send_frame(&mut self, frame: &Frame) -> Result<()>;
    
    /// Wait up to `timeout` for the next complete frame
    async fn receive_frame(&mut self, timeout: Duration) -> Result<Frame>;
    
    fn remote_addr(&self) -> String;
}

/// Identifier the acceptor assigns to each connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Whether the read loop should keep going after a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Close,
}

/// Callbacks the acceptor drives for every connection
///
/// Called from the connection's own read task; implementations must not
/// block.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// A connection was accepted; returns the id of the session wrapping it
    fn on_connection_accepted(&self, connection: ConnectionHandle) -> u64;
    
    /// Bytes arrived on a connection
    fn on_bytes_received(&self, connection_id: ConnectionId, bytes: &[u8]) -> Disposition;
    
    /// The connection is gone (remote close, read error, or local close)
    fn on_connection_closed(&self, connection_id: ConnectionId);
}

//! Framed TCP client (connecting side)
//!
//! Reads go through a [`FrameCodec`]: bytes accumulate in a per-connection
//! buffer until a whole frame is present. A framing error leaves the stream
//! unusable, so the connection is dropped with it.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use scanlink_core::{Frame, FrameCodec};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, trace, warn};

use crate::{error::*, Transport};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_CHUNK: usize = 4096;

/// Live connection state
struct Link {
    peer: SocketAddr,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    pending: BytesMut,
}

/// TCP transport used by device-side endpoints to reach the controller
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    codec: FrameCodec,
    link: Option<Link>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            codec: FrameCodec::default(),
            link: None,
        }
    }
    
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
    
    /// Cap inbound and outbound payloads
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.codec = FrameCodec::new(max_payload_size);
        self
    }
    
    /// Bytes received that do not yet form a frame
    pub fn pending_bytes(&self) -> usize {
        self.link.as_ref().map_or(0, |link| link.pending.len())
    }
    
    fn link_mut(&mut self) -> Result<&mut Link> {
        self.link.as_mut().ok_or(Error::NotConnected)
    }
}

/// Resolve `host:port` to the first socket address
pub(crate) async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let target = format!("{}:{}", host, port);
    
    let mut addrs = tokio::net::lookup_host(&target)
        .await
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", target, e)))?;
    
    addrs
        .next()
        .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", target)))
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.link.is_some() {
            return Err(Error::AlreadyConnected);
        }
        
        let peer = resolve(&self.host, self.port).await?;
        let stream = timeout(self.connect_timeout, TcpStream::connect(peer))
            .await
            .map_err(|_| Error::ConnectionTimeout)??;
        stream.set_nodelay(true)?;
        
        let (reader, writer) = stream.into_split();
        self.link = Some(Link {
            peer,
            reader,
            writer,
            pending: BytesMut::with_capacity(READ_CHUNK),
        });
        
        debug!("Connected to {}", peer);
        Ok(())
    }
    
    async fn disconnect(&mut self) -> Result<()> {
        let Some(mut link) = self.link.take() else {
            return Ok(());
        };
        
        if !link.pending.is_empty() {
            debug!("Discarding {} unframed bytes from {}", link.pending.len(), link.peer);
        }
        if let Err(e) = link.writer.shutdown().await {
            debug!("Shutdown of {} failed: {}", link.peer, e);
        }
        Ok(())
    }
    
    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
    
    async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        let bytes = self.codec.write_frame(frame)?;
        let link = self.link_mut()?;
        
        trace!("Sending {} to {}", frame, link.peer);
        link.writer.write_all(&bytes).await?;
        Ok(())
    }
    
    async fn receive_frame(&mut self, wait: Duration) -> Result<Frame> {
        let deadline = Instant::now() + wait;
        let codec = self.codec;
        
        loop {
            let link = self.link_mut()?;
            
            match codec.try_read_frame(&mut link.pending) {
                Ok(Some(frame)) => {
                    trace!("Received {} from {}", frame, link.peer);
                    return Ok(frame);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Dropping connection to {}: {}", link.peer, e);
                    self.link = None;
                    return Err(e.into());
                }
            }
            
            link.pending.reserve(READ_CHUNK);
            let read = timeout_at(deadline, link.reader.read_buf(&mut link.pending))
                .await
                .map_err(|_| Error::ReadTimeout)??;
            
            if read == 0 {
                debug!("{} closed the connection", link.peer);
                self.link = None;
                return Err(Error::ConnectionClosed);
            }
        }
    }
    
    fn remote_addr(&self) -> String {
        match &self.link {
            Some(link) => link.peer.to_string(),
            None => format!("{}:{}", self.host, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanlink_core::MessageType;
    use tokio::net::TcpListener;
    
    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }
    
    #[test]
    fn test_tcp_transport_create() {
        let transport = TcpTransport::new("127.0.0.1", 4000);
        assert!(!transport.is_connected());
        assert_eq!(transport.remote_addr(), "127.0.0.1:4000");
        assert_eq!(transport.pending_bytes(), 0);
    }
    
    #[tokio::test]
    async fn test_tcp_transport_invalid_address() {
        let mut transport = TcpTransport::new("invalid..address", 4000)
            .with_connect_timeout(Duration::from_millis(100));
        
        assert!(transport.connect().await.is_err());
        assert!(!transport.is_connected());
    }
    
    #[tokio::test]
    async fn test_send_before_connect() {
        let mut transport = TcpTransport::new("127.0.0.1", 4000);
        let frame = Frame::new(1, MessageType::ErrorMessage, vec![0u8; 4]);
        
        assert!(matches!(transport.send_frame(&frame).await, Err(Error::NotConnected)));
        assert!(matches!(
            transport.receive_frame(Duration::from_millis(10)).await,
            Err(Error::NotConnected)
        ));
    }
    
    #[tokio::test]
    async fn test_frame_split_across_writes() {
        let (listener, port) = listener().await;
        let outgoing = Frame::new(7, MessageType::DeviceStatusRequest, vec![1, 0, 0, 0, 0, 0, 0, 0]);
        let encoded = outgoing.encode();
        
        let peer = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            
            let mut header = [0u8; Frame::HEADER_SIZE];
            socket.read_exact(&mut header).await.unwrap();
            assert_eq!(&header[..4], &[3, 0, 0, 0]);
            
            socket.write_all(&encoded[..5]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            socket.write_all(&encoded[5..]).await.unwrap();
            socket
        });
        
        let mut transport = TcpTransport::new("127.0.0.1", port);
        transport.connect().await.unwrap();
        assert!(matches!(transport.connect().await, Err(Error::AlreadyConnected)));
        
        transport
            .send_frame(&Frame::new(3, MessageType::ErrorMessage, Vec::new()))
            .await
            .unwrap();
        
        let received = transport.receive_frame(Duration::from_secs(2)).await.unwrap();
        assert_eq!(received, Frame::new(7, MessageType::DeviceStatusRequest, vec![1, 0, 0, 0, 0, 0, 0, 0]));
        assert_eq!(transport.pending_bytes(), 0);
        
        let socket = peer.await.unwrap();
        drop(socket);
        
        assert!(matches!(
            transport.receive_frame(Duration::from_secs(2)).await,
            Err(Error::ConnectionClosed)
        ));
        assert!(!transport.is_connected());
    }
    
    #[tokio::test]
    async fn test_oversized_frame_drops_connection() {
        let (listener, port) = listener().await;
        
        let peer = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // seq 1, ErrorMessage, payload length 1000
            socket
                .write_all(&[1, 0, 0, 0, 3, 0, 0, 0, 0xE8, 0x03, 0, 0])
                .await
                .unwrap();
            socket
        });
        
        let mut transport = TcpTransport::new("127.0.0.1", port).with_max_payload_size(64);
        transport.connect().await.unwrap();
        
        let result = transport.receive_frame(Duration::from_secs(2)).await;
        assert!(matches!(
            result,
            Err(Error::Framing(scanlink_core::Error::FrameTooLarge { size: 1000, max: 64 }))
        ));
        assert!(!transport.is_connected());
        
        let _socket = peer.await.unwrap();
    }
    
    #[tokio::test]
    async fn test_receive_timeout_keeps_partial_frame() {
        let (listener, port) = listener().await;
        
        let peer = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&[9, 0, 0, 0, 3, 0]).await.unwrap();
            socket
        });
        
        let mut transport = TcpTransport::new("127.0.0.1", port);
        transport.connect().await.unwrap();
        
        let result = transport.receive_frame(Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::ReadTimeout)));
        assert!(transport.is_connected());
        assert_eq!(transport.pending_bytes(), 6);
        
        let _socket = peer.await.unwrap();
        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }
}

//! TCP acceptor (controller side)
//!
//! Each accepted connection gets a read task that forwards bytes to the
//! [`ConnectionHandler`] and a write task that drains the connection's
//! outbound queue, so a slow peer never stalls the reader.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use scanlink_core::Outbound;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::{error::*, tcp::resolve, ConnectionHandler, ConnectionId, Disposition};

enum Outgoing {
    Bytes(Bytes),
    Close,
}

/// Write side of one accepted connection
///
/// Cloneable; every clone feeds the same outbound queue.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
    
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

impl Outbound for ConnectionHandle {
    fn send_bytes(&self, bytes: Bytes) -> scanlink_core::Result<()> {
        self.tx
            .send(Outgoing::Bytes(bytes))
            .map_err(|_| scanlink_core::Error::WriteFailed(format!("{} is closed", self.id)))
    }
    
    fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }
}

/// Bound listening socket
pub struct TcpAcceptor {
    listener: TcpListener,
    next_id: AtomicU64,
}

impl TcpAcceptor {
    /// Bind to `addr:port` (port 0 picks a free port)
    pub async fn bind(addr: &str, port: u16) -> Result<Self> {
        let socket_addr = resolve(addr, port).await?;
        
        let listener = TcpListener::bind(socket_addr)
            .await
            .map_err(|source| Error::Bind {
                addr: socket_addr,
                source,
            })?;
        
        info!("Listening on {}", listener.local_addr()?);
        
        Ok(Self {
            listener,
            next_id: AtomicU64::new(1),
        })
    }
    
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
    
    /// Run the accept loop on a background task
    pub fn spawn(self, handler: Arc<dyn ConnectionHandler>) -> Result<ListenerHandle> {
        let local_addr = self.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        
        let task = tokio::spawn(self.accept_loop(handler, shutdown_rx));
        
        Ok(ListenerHandle {
            local_addr,
            shutdown: shutdown_tx,
            task,
        })
    }
    
    async fn accept_loop(
        self,
        handler: Arc<dyn ConnectionHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(connection = %id, error = %e, "Could not set TCP_NODELAY");
                        }
                        tokio::spawn(serve_connection(
                            id,
                            peer,
                            stream,
                            Arc::clone(&handler),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
                _ = shutdown.changed() => break,
            }
        }
        
        debug!("Accept loop stopped");
    }
}

async fn serve_connection(
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
    handler: Arc<dyn ConnectionHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer_done = Arc::new(Notify::new());
    
    let handle = ConnectionHandle { id, peer, tx };
    
    tokio::spawn(write_loop(id, writer, rx, Arc::clone(&writer_done)));
    
    let session_id = handler.on_connection_accepted(handle.clone());
    info!(connection = %id, session_id, "Accepted connection from {}", peer);
    
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        buf.clear();
        
        tokio::select! {
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => {
                    debug!(connection = %id, "Closed by remote");
                    break;
                }
                Ok(n) => {
                    trace!(connection = %id, "Received {} bytes", n);
                    if handler.on_bytes_received(id, &buf) == Disposition::Close {
                        break;
                    }
                }
                Err(e) => {
                    warn!(connection = %id, error = %e, "Read failed");
                    break;
                }
            },
            _ = writer_done.notified() => break,
            _ = shutdown.changed() => break,
        }
    }
    
    handler.on_connection_closed(id);
    handle.close();
    info!(connection = %id, "Connection closed");
}

async fn write_loop(
    id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    done: Arc<Notify>,
) {
    while let Some(outgoing) = rx.recv().await {
        match outgoing {
            Outgoing::Bytes(bytes) => {
                if let Err(e) = writer.write_all(&bytes).await {
                    warn!(connection = %id, error = %e, "Write failed");
                    break;
                }
            }
            Outgoing::Close => break,
        }
    }
    
    let _ = writer.shutdown().await;
    done.notify_one();
}

/// Running accept loop
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
    
    /// Stop accepting and close every connection this listener opened
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Accept loop ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    
    /// Handler that echoes bytes back and records closes
    #[derive(Default)]
    struct EchoHandler {
        handles: Mutex<Vec<ConnectionHandle>>,
        closed: Mutex<Vec<ConnectionId>>,
    }
    
    impl ConnectionHandler for EchoHandler {
        fn on_connection_accepted(&self, connection: ConnectionHandle) -> u64 {
            let id = connection.id().0;
            self.handles.lock().unwrap().push(connection);
            id
        }
        
        fn on_bytes_received(&self, connection_id: ConnectionId, bytes: &[u8]) -> Disposition {
            if bytes == b"bye" {
                return Disposition::Close;
            }
            let handles = self.handles.lock().unwrap();
            let handle = handles.iter().find(|h| h.id() == connection_id).unwrap();
            handle.send_bytes(Bytes::copy_from_slice(bytes)).unwrap();
            Disposition::Continue
        }
        
        fn on_connection_closed(&self, connection_id: ConnectionId) {
            self.closed.lock().unwrap().push(connection_id);
        }
    }
    
    #[tokio::test]
    async fn test_accept_echo_and_close() {
        let handler = Arc::new(EchoHandler::default());
        let acceptor = TcpAcceptor::bind("127.0.0.1", 0).await.unwrap();
        let listener = acceptor.spawn(handler.clone()).unwrap();
        
        let mut client = TcpStream::connect(listener.local_addr()).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        
        let mut echoed = [0u8; 4];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"ping");
        
        client.write_all(b"bye").await.unwrap();
        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        
        tokio::time::timeout(Duration::from_secs(5), async {
            while handler.closed.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        
        listener.shutdown().await;
    }
    
    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle {
            id: ConnectionId(9),
            peer: "127.0.0.1:1".parse().unwrap(),
            tx,
        };
        drop(rx);
        
        assert!(matches!(
            handle.send_bytes(Bytes::from_static(b"x")),
            Err(scanlink_core::Error::WriteFailed(_))
        ));
    }
}

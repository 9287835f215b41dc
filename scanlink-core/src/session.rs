//! Session management for the device-control protocol
//!
//! A session represents one device connection and tracks:
//! - Login state and the identity the device announced
//! - Requests awaiting a reply, keyed by sequence number
//! - Unsolicited messages waiting to be read by the application
//!
//! The transport feeds raw bytes in with [`Session::on_bytes_received`];
//! outbound frames leave through the [`Outbound`] the session was built with.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};
use scanlink_types::{DeviceIdentity, DeviceStatus};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, trace, warn};

use crate::{
    buffer::BufferedQueue,
    constants::{
        message_types, DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_PAYLOAD_SIZE,
        INITIAL_SEQUENCE_NUMBER, UNSOLICITED_SEQUENCE_NUMBER,
    },
    error::{Error, Result},
    frame::{Frame, FrameCodec},
    message::{ErrorBody, LoginRequest, Message, MessageBody},
    message_type::MessageType,
    registry::MessageRegistry,
};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport accepted, waiting for LoginRequest
    Connected,
    
    /// Login received, ready for requests
    LoggedIn,
    
    /// Terminal
    Closed,
}

/// What to do with a frame whose payload is malformed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Reject the frame, keep the session
    DropFrame,
    
    /// Treat the stream as desynchronized and close
    #[default]
    CloseSession,
}

/// Per-session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_payload_size: usize,
    pub buffer_capacity: usize,
    pub decode_policy: DecodePolicy,
}

impl SessionConfig {
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }
    
    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }
    
    pub fn with_decode_policy(mut self, decode_policy: DecodePolicy) -> Self {
        self.decode_policy = decode_policy;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            decode_policy: DecodePolicy::default(),
        }
    }
}

/// Session identifier, unique per process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a session closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Disconnected,
    TransportClosed,
    ProtocolViolation(String),
    LoginRejected(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::TransportClosed => write!(f, "transport closed"),
            Self::ProtocolViolation(e) => write!(f, "protocol violation: {}", e),
            Self::LoginRejected(e) => write!(f, "login rejected: {}", e),
        }
    }
}

/// Things the owner of a session needs to react to
#[derive(Debug)]
pub enum SessionEvent {
    /// First valid LoginRequest accepted
    LoggedIn(DeviceIdentity),
    
    /// A frame was rejected
    DecodeFailed(Error),
    
    /// The device pushed a status report nobody asked for
    StatusReported(DeviceStatus),
    
    /// The session reached its terminal state
    Closed(CloseReason),
}

/// Outbound half of the transport
#[cfg_attr(test, mockall::automock)]
pub trait Outbound: Send + Sync {
    /// Queue bytes for the connection
    fn send_bytes(&self, bytes: Bytes) -> Result<()>;
    
    /// Close the connection once queued bytes are written
    fn close(&self);
}

struct PendingRequest {
    expected: MessageType,
    reply_tx: oneshot::Sender<Result<Message>>,
}

/// Device session
///
/// Cheap to clone (Arc internally). The read path and any number of
/// concurrent [`send_request`](Self::send_request) callers share it.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: SessionId,
    config: SessionConfig,
    codec: FrameCodec,
    registry: Arc<MessageRegistry>,
    outbound: Arc<dyn Outbound>,
    
    state: RwLock<SessionState>,
    identity: RwLock<Option<DeviceIdentity>>,
    next_sequence: AtomicU32,
    
    pending: Mutex<HashMap<u32, PendingRequest>>,
    buffered: Mutex<BufferedQueue>,
    buffered_notify: Notify,
    
    /// Bytes received but not yet framed
    read_buffer: Mutex<BytesMut>,
    decode_failures: AtomicU64,
}

/// Removes a pending entry when the waiting call ends, however it ends
struct PendingGuard<'a> {
    inner: &'a SessionInner,
    sequence: u32,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.pending.lock().remove(&self.sequence);
    }
}

impl Session {
    /// Create a session in the `Connected` state
    pub fn new(id: SessionId, outbound: Arc<dyn Outbound>, config: SessionConfig) -> Self {
        Self::with_registry(id, outbound, config, MessageRegistry::standard())
    }
    
    /// Create a session decoding through a custom registry
    pub fn with_registry(
        id: SessionId,
        outbound: Arc<dyn Outbound>,
        config: SessionConfig,
        registry: Arc<MessageRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                codec: FrameCodec::new(config.max_payload_size),
                buffered: Mutex::new(BufferedQueue::new(config.buffer_capacity)),
                config,
                registry,
                outbound,
                state: RwLock::new(SessionState::Connected),
                identity: RwLock::new(None),
                next_sequence: AtomicU32::new(INITIAL_SEQUENCE_NUMBER),
                pending: Mutex::new(HashMap::new()),
                buffered_notify: Notify::new(),
                read_buffer: Mutex::new(BytesMut::new()),
                decode_failures: AtomicU64::new(0),
            }),
        }
    }
    
    pub fn id(&self) -> SessionId {
        self.inner.id
    }
    
    /// Get current state
    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }
    
    pub fn is_logged_in(&self) -> bool {
        self.state() == SessionState::LoggedIn
    }
    
    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }
    
    /// Identity from the login, once logged in
    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.inner.identity.read().clone()
    }
    
    pub fn device_name(&self) -> Option<String> {
        self.inner.identity.read().as_ref().map(|i| i.device_name.clone())
    }
    
    /// Get next sequence number
    ///
    /// Skips [`UNSOLICITED_SEQUENCE_NUMBER`] when the counter wraps.
    pub fn next_sequence_number(&self) -> u32 {
        loop {
            let sequence = self.inner.next_sequence.fetch_add(1, Ordering::AcqRel);
            if sequence != UNSOLICITED_SEQUENCE_NUMBER {
                return sequence;
            }
        }
    }
    
    /// Number of requests awaiting a reply
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }
    
    pub fn buffered_len(&self) -> usize {
        self.inner.buffered.lock().len()
    }
    
    /// Unsolicited messages lost to buffer overflow
    pub fn dropped_messages(&self) -> u64 {
        self.inner.buffered.lock().dropped()
    }
    
    /// Frames rejected by the decoder
    pub fn decode_failures(&self) -> u64 {
        self.inner.decode_failures.load(Ordering::Relaxed)
    }
    
    /// Feed bytes from the transport
    ///
    /// Extracts every complete frame, decodes it and routes it. Partial
    /// frames stay buffered for the next call.
    pub fn on_bytes_received(&self, bytes: &[u8]) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        
        if self.is_closed() {
            trace!(session_id = %self.id(), len = bytes.len(), "Ignoring bytes on closed session");
            return events;
        }
        
        let (frames, framing_error) = {
            let mut buf = self.inner.read_buffer.lock();
            buf.extend_from_slice(bytes);
            
            let mut frames = Vec::new();
            let framing_error = loop {
                match self.inner.codec.try_read_frame(&mut buf) {
                    Ok(Some(frame)) => frames.push(frame),
                    Ok(None) => break None,
                    Err(e) => break Some(e),
                }
            };
            (frames, framing_error)
        };
        
        for frame in frames {
            if self.is_closed() {
                break;
            }
            self.handle_frame(frame, &mut events);
        }
        
        if let Some(err) = framing_error {
            warn!(session_id = %self.id(), error = %err, "Framing error");
            self.close_with(CloseReason::ProtocolViolation(err.to_string()), &mut events);
            events.push(SessionEvent::DecodeFailed(err));
        }
        
        events
    }
    
    fn handle_frame(&self, frame: Frame, events: &mut Vec<SessionEvent>) {
        trace!(session_id = %self.id(), "Received: {}", frame);
        
        let logged_in = match self.state() {
            SessionState::Closed => return,
            SessionState::Connected => false,
            SessionState::LoggedIn => true,
        };
        
        if !logged_in && frame.message_type != message_types::LOGIN_REQUEST {
            let err = Error::NotLoggedIn {
                message_type: frame.message_type,
            };
            warn!(session_id = %self.id(), error = %err, "Closing session");
            self.close_with(CloseReason::ProtocolViolation(err.to_string()), events);
            return;
        }
        
        let message = match self.inner.registry.decode_frame(&frame) {
            Ok(message) => message,
            Err(err) => {
                self.inner.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    session_id = %self.id(),
                    sequence = frame.sequence_number,
                    error = %err,
                    "Rejected frame"
                );
                
                // Without a login there is nothing left to do on this connection
                if !logged_in || err.closes_session(self.inner.config.decode_policy) {
                    self.close_with(CloseReason::ProtocolViolation(err.to_string()), events);
                }
                events.push(SessionEvent::DecodeFailed(err));
                return;
            }
        };
        
        match message.body {
            MessageBody::LoginRequest(login) if !logged_in => self.complete_login(login, events),
            MessageBody::LoginRequest(_) => {
                warn!(session_id = %self.id(), "Ignoring repeated LoginRequest");
            }
            _ => self.route(message, events),
        }
    }
    
    fn complete_login(&self, login: LoginRequest, events: &mut Vec<SessionEvent>) {
        let identity = match login.identity() {
            Ok(identity) => identity,
            Err(err) => {
                warn!(session_id = %self.id(), error = %err, "Invalid login");
                self.close_with(CloseReason::ProtocolViolation(err.to_string()), events);
                return;
            }
        };
        
        {
            let mut state = self.inner.state.write();
            if *state != SessionState::Connected {
                return;
            }
            *self.inner.identity.write() = Some(identity.clone());
            *state = SessionState::LoggedIn;
        }
        
        info!(session_id = %self.id(), "Logged in: {}", identity);
        events.push(SessionEvent::LoggedIn(identity));
    }
    
    /// Resolve a pending request or buffer the message
    ///
    /// Frames numbered [`UNSOLICITED_SEQUENCE_NUMBER`] are never replies.
    fn route(&self, message: Message, events: &mut Vec<SessionEvent>) {
        let message_type = message.message_type();
        let correlates = message.sequence_number != UNSOLICITED_SEQUENCE_NUMBER
            && (message_type.is_reply() || message_type == MessageType::ErrorMessage);
        
        let pending = if correlates {
            self.inner.pending.lock().remove(&message.sequence_number)
        } else {
            None
        };
        
        match pending {
            Some(request) => {
                debug!(
                    session_id = %self.id(),
                    sequence = message.sequence_number,
                    "Resolved request with {}",
                    message_type
                );
                
                let outcome = if message_type == request.expected {
                    Ok(message)
                } else if let MessageBody::ErrorMessage(error) = message.body {
                    Err(Error::Remote(error.text))
                } else {
                    Err(Error::UnexpectedReply {
                        expected: request.expected,
                        actual: message_type,
                    })
                };
                
                // The caller may have given up already
                let _ = request.reply_tx.send(outcome);
            }
            None if message_type.requires_request() => {
                warn!(
                    session_id = %self.id(),
                    sequence = message.sequence_number,
                    "Discarding {} with no pending request",
                    message_type
                );
            }
            None => {
                if let MessageBody::DeviceStatusReply(status) = &message.body {
                    events.push(SessionEvent::StatusReported(status.clone().into()));
                }
                self.push_buffered(message);
            }
        }
    }
    
    /// Send a request and wait for its reply
    ///
    /// Exactly one outcome is delivered: the reply, [`Error::Timeout`],
    /// [`Error::SessionClosed`], or an error reply from the device. The
    /// pending entry is removed on every path.
    pub async fn send_request(
        &self,
        body: MessageBody,
        expected: MessageType,
        timeout: Duration,
    ) -> Result<Message> {
        self.ensure_logged_in()?;
        
        let sequence = self.next_sequence_number();
        let message = Message::new(sequence, body);
        let (reply_tx, reply_rx) = oneshot::channel();
        
        self.inner
            .pending
            .lock()
            .insert(sequence, PendingRequest { expected, reply_tx });
        let _guard = PendingGuard {
            inner: &self.inner,
            sequence,
        };
        
        // Close drains the table after flipping state; catch a close that
        // slipped in between the check above and the insert
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        
        self.write_message(&message)?;
        debug!(session_id = %self.id(), sequence, "Sent {}, awaiting {}", message.message_type(), expected);
        
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::SessionClosed),
            Err(_) => {
                warn!(session_id = %self.id(), sequence, "Request timed out after {:?}", timeout);
                Err(Error::Timeout { sequence, timeout })
            }
        }
    }
    
    /// Send a message without waiting for a reply
    ///
    /// Returns the sequence number used.
    pub fn send(&self, body: MessageBody) -> Result<u32> {
        self.ensure_logged_in()?;
        
        let sequence = self.next_sequence_number();
        self.write_message(&Message::new(sequence, body))?;
        Ok(sequence)
    }
    
    /// Answer a request, echoing its sequence number
    pub fn reply(&self, request: &Message, body: MessageBody) -> Result<()> {
        self.ensure_logged_in()?;
        self.write_message(&Message::new(request.sequence_number, body))
    }
    
    /// Reject the login: tell the device why, then close
    pub fn reject_login(&self, reason: &str) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        
        match ErrorBody::new(reason) {
            Ok(body) => {
                let message = Message::new(self.next_sequence_number(), MessageBody::ErrorMessage(body));
                if let Err(e) = self.write_message(&message) {
                    debug!(session_id = %self.id(), error = %e, "Could not send login rejection");
                }
            }
            Err(e) => debug!(session_id = %self.id(), error = %e, "Rejection text too long to send"),
        }
        
        self.close_with(CloseReason::LoginRejected(reason.to_string()), &mut events);
        events
    }
    
    /// Queue an unsolicited message for the application
    ///
    /// Safe to call from any task.
    pub fn push_buffered(&self, message: Message) {
        let evicted = self.inner.buffered.lock().push(message);
        if let Some(lost) = evicted {
            warn!(session_id = %self.id(), "Buffer full, dropped {}", lost);
        }
        self.inner.buffered_notify.notify_waiters();
    }
    
    /// Take the oldest unsolicited message, if any
    pub fn poll_buffered(&self) -> Option<Message> {
        self.inner.buffered.lock().pop()
    }
    
    /// Wait for the next unsolicited message
    ///
    /// Returns `None` once the session is closed and the buffer is drained.
    pub async fn recv_buffered(&self) -> Option<Message> {
        loop {
            let notified = self.inner.buffered_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            
            if let Some(message) = self.poll_buffered() {
                return Some(message);
            }
            if self.is_closed() {
                return None;
            }
            
            notified.await;
        }
    }
    
    /// Close the session on request of the application
    pub fn disconnect(&self) {
        self.close(CloseReason::Disconnected);
    }
    
    /// Close the session because the transport went away
    pub fn on_connection_closed(&self) {
        self.close(CloseReason::TransportClosed);
    }
    
    fn close_with(&self, reason: CloseReason, events: &mut Vec<SessionEvent>) {
        if self.close(reason.clone()) {
            events.push(SessionEvent::Closed(reason));
        }
    }
    
    /// Move to `Closed`, failing every pending request
    ///
    /// Returns false if the session was already closed.
    fn close(&self, reason: CloseReason) -> bool {
        {
            let mut state = self.inner.state.write();
            if *state == SessionState::Closed {
                return false;
            }
            *state = SessionState::Closed;
        }
        
        let pending: Vec<PendingRequest> = self
            .inner
            .pending
            .lock()
            .drain()
            .map(|(_, request)| request)
            .collect();
        
        for request in pending {
            let _ = request.reply_tx.send(Err(Error::SessionClosed));
        }
        
        self.inner.outbound.close();
        self.inner.buffered_notify.notify_waiters();
        
        info!(session_id = %self.id(), "Session closed ({})", reason);
        true
    }
    
    fn ensure_logged_in(&self) -> Result<()> {
        match self.state() {
            SessionState::LoggedIn => Ok(()),
            SessionState::Closed => Err(Error::SessionClosed),
            SessionState::Connected => Err(Error::InvalidSessionState(
                "device has not logged in".into(),
            )),
        }
    }
    
    fn write_message(&self, message: &Message) -> Result<()> {
        let frame = self.inner.registry.encode_frame(message)?;
        let bytes = self.inner.codec.write_frame(&frame)?;
        trace!(session_id = %self.id(), "Sending: {}", frame);
        self.inner.outbound.send_bytes(bytes.freeze())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("device", &self.device_name())
            .field("pending", &self.pending_requests())
            .field("buffered", &self.buffered_len())
            .finish()
    }
}

//! A single multiplexed connection to an OrientDB server.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use orientdb_core::protocol::{self, STATUS_ERROR, STATUS_OK};
use orientdb_core::record::{FormatRegistry, RecordFormat};
use orientdb_core::{DataOutput, ObjectDataOutput, OrientError, Result};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::reader::{read_exceptions, ReadHalf, ResponseReader, WriteHalf};
use super::session::{Delivery, Session, SessionRegistry};
use crate::config::{ClientConfig, ProtocolConfig};

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a new unique connection ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Picks the protocol version to speak with a server announcing `server`.
pub(crate) fn negotiate(server: i16, protocol: &ProtocolConfig) -> Result<i16> {
    if server < protocol.min_version() || server > protocol.max_version() {
        return Err(OrientError::VersionMismatch {
            server,
            min: protocol.min_version(),
            max: protocol.max_version(),
        });
    }
    if server < protocol.min_binary_serializer_version() {
        return Err(OrientError::VersionMismatch {
            server,
            min: protocol.min_binary_serializer_version(),
            max: protocol.max_version(),
        });
    }
    Ok(server.min(protocol.max_version()))
}

struct Inner {
    id: ConnectionId,
    address: String,
    protocol_version: i16,
    format: Arc<dyn RecordFormat>,
    writer: tokio::sync::Mutex<WriteHalf>,
    sessions: SessionRegistry,
    /// `Some(reason)` once the connection is unusable.
    state: watch::Sender<Option<String>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    session_wait: Duration,
}

impl Inner {
    fn mark_broken(&self, reason: String) {
        let changed = self.state.send_if_modified(|state| {
            if state.is_none() {
                *state = Some(reason.clone());
                true
            } else {
                false
            }
        });
        if changed {
            warn!(
                connection = %self.id,
                address = %self.address,
                reason = %reason,
                "connection broken"
            );
        }
    }

    /// Marks the connection broken and stops the reader task.
    fn abort(&self, reason: String) {
        self.mark_broken(reason);
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
    }

    fn broken_error(&self) -> OrientError {
        let reason = self
            .state
            .borrow()
            .clone()
            .unwrap_or_else(|| "connection closed".to_string());
        OrientError::ConnectionBroken(reason)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state.borrow().is_some() {
            return Err(self.broken_error());
        }
        Ok(())
    }

    /// Hands a response to its session and waits for the session to accept it.
    async fn deliver(&self, session_id: i32, payload: Result<ResponseReader>) -> Result<()> {
        let session = self.sessions.get_or_create(session_id);
        let (accepted, on_accept) = oneshot::channel();
        let handoff = async {
            session
                .sender()
                .send(Delivery { payload, accepted })
                .await
                .ok()?;
            on_accept.await.ok()
        };

        match timeout(self.session_wait, handoff).await {
            Ok(Some(())) => Ok(()),
            _ => Err(OrientError::Protocol(format!(
                "response for untracked session {}",
                session_id
            ))),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Reads frames until the stream ends or misbehaves, then breaks the connection.
async fn run(inner: Weak<Inner>, stream: ReadHalf) {
    let reason = match read_frames(&inner, stream).await {
        Ok(()) => "server closed the connection".to_string(),
        Err(e) => e.to_string(),
    };
    if let Some(inner) = inner.upgrade() {
        inner.mark_broken(reason);
    }
}

async fn read_frames(inner: &Weak<Inner>, mut stream: ReadHalf) -> Result<()> {
    loop {
        let status = match stream.read_u8().await {
            Ok(status) => status,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let session_id = stream.read_i32().await?;
        let Some(conn) = inner.upgrade() else {
            return Ok(());
        };

        match status {
            STATUS_OK => {
                debug!(session_id, "response frame");
                let (release, released) = oneshot::channel();
                let reader =
                    ResponseReader::new(stream, release, session_id, conn.protocol_version);
                conn.deliver(session_id, Ok(reader)).await?;
                drop(conn);

                let released = released.await.map_err(|_| {
                    OrientError::Protocol(format!("response body for session {} lost", session_id))
                })?;
                if released.poisoned {
                    return Err(OrientError::Protocol(format!(
                        "response body for session {} was not fully read",
                        session_id
                    )));
                }
                stream = released.stream;
            }
            STATUS_ERROR => {
                let error = read_exceptions(&mut stream).await?;
                debug!(session_id, error = %error, "error frame");
                conn.deliver(session_id, Err(OrientError::from_server(error)))
                    .await?;
            }
            other => {
                return Err(OrientError::Protocol(format!(
                    "unsupported response status {} for session {}",
                    other, session_id
                )));
            }
        }
    }
}

/// Tears the connection down if dropped between writing a request and
/// receiving its response, since the response would reach the next caller.
struct InFlight<'a>(Option<&'a Inner>);

impl InFlight<'_> {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(inner) = self.0 {
            inner.abort("request abandoned before its response arrived".to_string());
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// One TCP connection carrying any number of sessions.
///
/// A single background task reads the socket and routes each response to the
/// session it names. Callers on different sessions only contend on the write
/// lock; callers on the same session queue behind each other.
///
/// Cloning is cheap and yields a handle to the same connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Connects to the configured server and performs the handshake.
    #[instrument(name = "connection.connect", skip(config, formats), fields(address = %config.network().address()))]
    pub async fn connect(config: &ClientConfig, formats: &FormatRegistry) -> Result<Self> {
        let network = config.network();
        let address = network.address();

        let stream = timeout(network.connection_timeout(), TcpStream::connect(address))
            .await
            .map_err(|_| {
                OrientError::Timeout(format!(
                    "connecting to {} timed out after {:?}",
                    address,
                    network.connection_timeout()
                ))
            })?
            .map_err(|e| {
                OrientError::Connection(format!("failed to connect to {}: {}", address, e))
            })?;

        stream.set_nodelay(network.tcp_nodelay()).map_err(|e| {
            OrientError::Connection(format!("failed to set TCP_NODELAY: {}", e))
        })?;

        let (read, write) = stream.into_split();
        Self::establish(address, read, write, config, formats).await
    }

    /// Performs the handshake over an already connected stream and starts the
    /// reader task.
    pub async fn establish<R, W>(
        address: impl Into<String>,
        read: R,
        write: W,
        config: &ClientConfig,
        formats: &FormatRegistry,
    ) -> Result<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let address = address.into();
        let format = formats.by_name(config.protocol().serialization_format())?;

        let read: Box<dyn AsyncRead + Send + Unpin> = Box::new(read);
        let mut stream = BufReader::new(read);
        let handshake = config.network().handshake_timeout();
        let server_version = timeout(handshake, stream.read_i16())
            .await
            .map_err(|_| {
                OrientError::Timeout(format!(
                    "server {} sent no protocol version within {:?}",
                    address, handshake
                ))
            })??;
        let protocol_version = negotiate(server_version, config.protocol())?;

        let (state, _) = watch::channel(None);
        let write: WriteHalf = Box::new(write);
        let inner = Arc::new(Inner {
            id: ConnectionId::new(),
            address,
            protocol_version,
            format,
            writer: tokio::sync::Mutex::new(write),
            sessions: SessionRegistry::new(),
            state,
            reader_task: Mutex::new(None),
            session_wait: config.network().session_wait(),
        });

        let task = tokio::spawn(run(Arc::downgrade(&inner), stream));
        *inner.reader_task.lock() = Some(task);

        info!(
            connection = %inner.id,
            address = %inner.address,
            server_version,
            protocol_version,
            "connected"
        );
        Ok(Self { inner })
    }

    /// Returns the connection's unique identifier.
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns the server address.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Returns the negotiated protocol version.
    pub fn protocol_version(&self) -> i16 {
        self.inner.protocol_version
    }

    /// Returns the record format selected for this connection.
    pub fn record_format(&self) -> Arc<dyn RecordFormat> {
        Arc::clone(&self.inner.format)
    }

    /// Returns `true` once the connection can no longer be used.
    pub fn is_broken(&self) -> bool {
        self.inner.state.borrow().is_some()
    }

    /// Returns the session for `id`, creating it if needed.
    pub fn new_session(&self, id: i32) -> Arc<Session> {
        self.inner.sessions.get_or_create(id)
    }

    /// Forgets a session. Clears the active database session if it matches.
    pub fn close_session(&self, id: i32) {
        if self.inner.sessions.remove(id).is_some() {
            debug!(connection = %self.inner.id, session_id = id, "session closed");
        }
    }

    /// Returns the id of the session of the currently open database.
    pub fn active_session(&self) -> Option<i32> {
        self.inner.sessions.active()
    }

    pub(crate) fn set_active_session(&self, id: i32) {
        self.inner.sessions.set_active(id);
    }

    /// Sends a request on `session` and decodes its response with `read_body`.
    ///
    /// `write_body` appends the request payload after the opcode and session
    /// id. `read_body` must consume the whole response body: the reader task
    /// does not look at the next frame until it returns. Server exceptions are
    /// returned as errors and leave the connection usable.
    ///
    /// The connection is torn down if either callback panics, if `read_body`
    /// fails, or if this future is dropped after the request was written,
    /// because the stream can no longer be trusted to be aligned on a frame.
    ///
    /// Opcodes the server never answers, such as a database close, return as
    /// soon as the request is written; `read_body` then sees an empty body.
    ///
    /// # Errors
    ///
    /// Returns [`OrientError::ConnectionBroken`] once the connection is
    /// unusable.
    pub async fn send_cmd<T, W, R>(
        &self,
        session: &Session,
        opcode: u8,
        write_body: W,
        read_body: R,
    ) -> Result<T>
    where
        W: FnOnce(&mut ObjectDataOutput) -> Result<()>,
        R: for<'a> FnOnce(&'a mut ResponseReader) -> BoxFuture<'a, Result<T>>,
    {
        if protocol::expects_no_response(opcode) {
            self.send_no_response(session, opcode, write_body).await?;
            let (release, _) = oneshot::channel();
            let body: Box<dyn AsyncRead + Send + Unpin> = Box::new(tokio::io::empty());
            let mut empty = ResponseReader::new(
                BufReader::new(body),
                release,
                session.id(),
                self.inner.protocol_version,
            );
            let value = read_body(&mut empty).await;
            empty.complete();
            return value;
        }
        self.inner.ensure_open()?;

        let mut inbox = session.inbox().lock().await;
        let frame = self.build_frame(session.id(), opcode, write_body)?;
        let mut in_flight = InFlight(Some(&self.inner));
        self.write_frame(&frame).await?;
        debug!(
            connection = %self.inner.id,
            session_id = session.id(),
            opcode = protocol::opcode_name(opcode),
            "request sent"
        );

        let mut closed = self.inner.state.subscribe();
        let delivery = tokio::select! {
            biased;
            delivery = inbox.recv() => delivery,
            _ = closed.wait_for(Option::is_some) => None,
        };
        let Some(Delivery { payload, accepted }) = delivery else {
            return Err(self.inner.broken_error());
        };
        if accepted.send(()).is_err() {
            return Err(self.inner.broken_error());
        }
        in_flight.disarm();

        let mut reader = payload?;
        let result = AssertUnwindSafe(async { read_body(&mut reader).await })
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(value)) => {
                reader.complete();
                Ok(value)
            }
            Ok(Err(e)) => {
                reader.poison();
                self.inner.abort(format!(
                    "failed to read {} response: {}",
                    protocol::opcode_name(opcode),
                    e
                ));
                Err(e)
            }
            Err(panic) => {
                reader.poison();
                let message = panic_message(&*panic);
                self.inner.abort(format!(
                    "{} response handler panicked: {}",
                    protocol::opcode_name(opcode),
                    message
                ));
                Err(OrientError::Protocol(format!(
                    "response handler panicked: {}",
                    message
                )))
            }
        }
    }

    /// Sends a request the server does not answer, such as a database close.
    ///
    /// Opcodes that get a response are rejected with [`OrientError::Protocol`].
    pub async fn send_no_response<W>(
        &self,
        session: &Session,
        opcode: u8,
        write_body: W,
    ) -> Result<()>
    where
        W: FnOnce(&mut ObjectDataOutput) -> Result<()>,
    {
        if !protocol::expects_no_response(opcode) {
            return Err(OrientError::Protocol(format!(
                "{} expects a response, use send_cmd",
                protocol::opcode_name(opcode)
            )));
        }
        self.inner.ensure_open()?;

        let _inbox = session.inbox().lock().await;
        let frame = self.build_frame(session.id(), opcode, write_body)?;
        self.write_frame(&frame).await?;
        debug!(
            connection = %self.inner.id,
            session_id = session.id(),
            opcode = protocol::opcode_name(opcode),
            "request sent, no response expected"
        );
        Ok(())
    }

    fn build_frame<W>(&self, session_id: i32, opcode: u8, write_body: W) -> Result<Vec<u8>>
    where
        W: FnOnce(&mut ObjectDataOutput) -> Result<()>,
    {
        let mut out = ObjectDataOutput::with_capacity(64);
        out.write_byte(opcode as i8)?;
        out.write_int(session_id)?;
        match std::panic::catch_unwind(AssertUnwindSafe(|| write_body(&mut out))) {
            Ok(result) => result?,
            Err(panic) => {
                let message = panic_message(&*panic);
                self.inner.abort(format!(
                    "{} request builder panicked: {}",
                    protocol::opcode_name(opcode),
                    message
                ));
                return Err(OrientError::Protocol(format!(
                    "request builder panicked: {}",
                    message
                )));
            }
        }
        Ok(out.into_bytes())
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut writer = self.inner.writer.lock().await;
        let written = async {
            writer.write_all(frame).await?;
            writer.flush().await
        }
        .await;

        written.map_err(|e| {
            self.inner.abort(format!("write failed: {}", e));
            OrientError::Connection(format!("failed to write to {}: {}", self.inner.address, e))
        })
    }

    /// Closes the connection. Pending and later requests fail with
    /// [`OrientError::ConnectionBroken`].
    pub async fn close(&self) {
        self.inner.abort("connection closed by client".to_string());
        let _ = self.inner.writer.lock().await.shutdown().await;
        info!(connection = %self.inner.id, address = %self.inner.address, "connection closed");
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("address", &self.inner.address)
            .field("protocol_version", &self.inner.protocol_version)
            .field("broken", &self.is_broken())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol() -> ProtocolConfig {
        ProtocolConfig::default()
    }

    #[test]
    fn test_connection_id_uniqueness() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("conn-"));
    }

    #[test]
    fn test_negotiate_accepts_supported_versions() {
        assert_eq!(negotiate(22, &protocol()).unwrap(), 22);
        assert_eq!(negotiate(26, &protocol()).unwrap(), 26);
        assert_eq!(negotiate(28, &protocol()).unwrap(), 28);
    }

    #[test]
    fn test_negotiate_rejects_out_of_range() {
        for version in [0, 20, 29, 36, -1] {
            assert!(
                matches!(
                    negotiate(version, &protocol()),
                    Err(OrientError::VersionMismatch { min: 21, max: 28, .. })
                ),
                "version {}",
                version
            );
        }
    }

    #[test]
    fn test_negotiate_rejects_pre_binary_serializer() {
        assert!(matches!(
            negotiate(21, &protocol()),
            Err(OrientError::VersionMismatch {
                server: 21,
                min: 22,
                ..
            })
        ));
    }

    #[test]
    fn test_negotiate_honours_narrowed_range() {
        let narrowed = crate::config::ProtocolConfigBuilder::new()
            .version_range(24, 26)
            .build()
            .unwrap();
        assert_eq!(negotiate(25, &narrowed).unwrap(), 25);
        assert!(negotiate(27, &narrowed).is_err());
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}

//! Scripted mock server used by the connection and client tests.

#![allow(dead_code)]

use std::time::Duration;

use orientdb_client::{ClientConfig, Connection};
use orientdb_core::record::FormatRegistry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config(address: &str) -> ClientConfig {
    ClientConfig::builder()
        .address(address)
        .network(|n| {
            n.handshake_timeout(Duration::from_millis(500))
                .session_wait(Duration::from_millis(500))
        })
        .build()
        .expect("failed to build config")
}

/// A listener on an ephemeral local port.
pub struct MockServer {
    listener: TcpListener,
}

impl MockServer {
    pub async fn start() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock server");
        Self { listener }
    }

    pub fn address(&self) -> String {
        self.listener
            .local_addr()
            .expect("mock server has no address")
            .to_string()
    }

    /// Accepts a client without sending anything.
    pub async fn accept_silently(&self) -> TcpStream {
        let (stream, _) = self.listener.accept().await.expect("accept failed");
        stream
    }

    /// Accepts a client and announces `protocol_version`.
    pub async fn accept(&self, protocol_version: i16) -> ServerSide {
        let mut stream = self.accept_silently().await;
        stream
            .write_all(&protocol_version.to_be_bytes())
            .await
            .expect("failed to send protocol version");
        ServerSide { stream }
    }
}

/// Connects a client to `server`, which announces `protocol_version`.
pub async fn connect(server: &MockServer, protocol_version: i16) -> (Connection, ServerSide) {
    connect_with(server, protocol_version, config(&server.address())).await
}

pub async fn connect_with(
    server: &MockServer,
    protocol_version: i16,
    config: ClientConfig,
) -> (Connection, ServerSide) {
    let formats = FormatRegistry::new();
    let (connection, side) = tokio::join!(
        Connection::connect(&config, &formats),
        server.accept(protocol_version)
    );
    (connection.expect("connect failed"), side)
}

/// The server end of an accepted connection.
pub struct ServerSide {
    stream: TcpStream,
}

impl ServerSide {
    /// Reads a request header: opcode and session id.
    pub async fn read_header(&mut self) -> (u8, i32) {
        let opcode = self.read_u8().await;
        let session_id = self.read_i32().await;
        (opcode, session_id)
    }

    pub async fn read_u8(&mut self) -> u8 {
        self.stream.read_u8().await.expect("read u8")
    }

    pub async fn read_i16(&mut self) -> i16 {
        self.stream.read_i16().await.expect("read i16")
    }

    pub async fn read_i32(&mut self) -> i32 {
        self.stream.read_i32().await.expect("read i32")
    }

    pub async fn read_i64(&mut self) -> i64 {
        self.stream.read_i64().await.expect("read i64")
    }

    pub async fn read_bytes(&mut self) -> Option<Vec<u8>> {
        let len = self.read_i32().await;
        if len < 0 {
            return None;
        }
        let mut buf = vec![0u8; len as usize];
        self.stream.read_exact(&mut buf).await.expect("read bytes");
        Some(buf)
    }

    pub async fn read_string(&mut self) -> Option<String> {
        self.read_bytes()
            .await
            .map(|b| String::from_utf8(b).expect("request string is not UTF-8"))
    }

    pub async fn send(&mut self, frame: Frame) {
        self.send_raw(&frame.into_bytes()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write failed");
        self.stream.flush().await.expect("flush failed");
    }

    /// Keeps the connection open until the client goes away.
    pub async fn hold(mut self) {
        let mut buf = [0u8; 64];
        while matches!(self.stream.read(&mut buf).await, Ok(n) if n > 0) {}
    }

    /// Asserts the client sends nothing for `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(wait, self.stream.read(&mut buf)).await;
        assert!(read.is_err(), "client sent unexpected data");
    }
}

/// A response frame under construction.
pub struct Frame {
    buf: Vec<u8>,
}

impl Frame {
    pub fn status(status: u8, session_id: i32) -> Self {
        let mut buf = vec![status];
        buf.extend_from_slice(&session_id.to_be_bytes());
        Self { buf }
    }

    pub fn ok(session_id: i32) -> Self {
        Self::status(0, session_id)
    }

    /// An error frame carrying `(class, message)` exceptions in order.
    pub fn error(session_id: i32, exceptions: &[(&str, &str)]) -> Self {
        let mut frame = Self::status(1, session_id);
        for (class, message) in exceptions {
            frame = frame.byte(1).string(class).string(message);
        }
        frame.byte(0).bytes(&[0xCA, 0xFE, 0xBA, 0xBE])
    }

    pub fn byte(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn short(mut self, v: i16) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn int(mut self, v: i32) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn long(mut self, v: i64) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn bytes(self, v: &[u8]) -> Self {
        let mut frame = self.int(v.len() as i32);
        frame.buf.extend_from_slice(v);
        frame
    }

    pub fn null(self) -> Self {
        self.int(-1)
    }

    pub fn string(self, v: &str) -> Self {
        self.bytes(v.as_bytes())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

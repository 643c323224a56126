//! Async frame primitives over the socket's read half.

use orientdb_core::{OrientError, Result, ServerError, ServerException};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::sync::oneshot;

/// Buffered read half owned by the reader task between frames.
pub(crate) type ReadHalf = BufReader<Box<dyn AsyncRead + Send + Unpin>>;

/// Write half guarded by the connection's write lock.
pub(crate) type WriteHalf = Box<dyn AsyncWrite + Send + Unpin>;

/// Largest buffer reserved up front for a length read off the wire.
const MAX_PREALLOCATION: usize = 64 * 1024;

/// The read half handed back to the reader task once a body is released.
pub(crate) struct Released {
    pub(crate) stream: ReadHalf,
    pub(crate) poisoned: bool,
}

/// Reads an i32-length-prefixed byte array; a length of -1 is null.
pub(crate) async fn read_nullable_bytes<R>(stream: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let len = stream.read_i32().await?;
    if len == -1 {
        return Ok(None);
    }
    if len < 0 {
        return Err(OrientError::CorruptStream(format!(
            "negative byte array length {}",
            len
        )));
    }
    read_len(stream, len as usize).await.map(Some)
}

/// Reads exactly `len` bytes. The buffer grows as data arrives, so a corrupt
/// length fails at end of stream instead of reserving it all up front.
async fn read_len<R>(stream: &mut R, len: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(len.min(MAX_PREALLOCATION));
    (&mut *stream).take(len as u64).read_to_end(&mut buf).await?;
    if buf.len() < len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, stream ended after {}", len, buf.len()),
        )
        .into());
    }
    Ok(buf)
}

/// Reads an i32-length-prefixed UTF-8 string; a length of -1 is null.
pub(crate) async fn read_nullable_string<R>(stream: &mut R) -> Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    match read_nullable_bytes(stream).await? {
        Some(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| OrientError::Serialization(format!("invalid UTF-8 string: {}", e))),
        None => Ok(None),
    }
}

/// Reads the exception chain of an error frame.
///
/// Entries are `(marker, class, message)` until a zero marker, followed by a
/// serialized exception blob that is read and discarded.
pub(crate) async fn read_exceptions<R>(stream: &mut R) -> Result<ServerError>
where
    R: AsyncRead + Unpin,
{
    let mut exceptions = Vec::new();
    while stream.read_u8().await? != 0 {
        let class_name = read_nullable_string(stream).await?.unwrap_or_default();
        let message = read_nullable_string(stream).await?.unwrap_or_default();
        exceptions.push(ServerException::new(class_name, message));
    }
    read_nullable_bytes(stream).await?;
    Ok(ServerError::new(exceptions))
}

/// A response body positioned just after the frame header.
///
/// The reader owns the connection's read half for as long as it lives. The
/// reader task resumes only once it is dropped, so a body must be consumed
/// promptly. Dropping a reader that was not [completed](Self::complete) marks
/// the stream as misaligned and the connection is torn down.
pub struct ResponseReader {
    stream: Option<ReadHalf>,
    release: Option<oneshot::Sender<Released>>,
    session_id: i32,
    protocol_version: i16,
    poisoned: bool,
}

impl ResponseReader {
    pub(crate) fn new(
        stream: ReadHalf,
        release: oneshot::Sender<Released>,
        session_id: i32,
        protocol_version: i16,
    ) -> Self {
        Self {
            stream: Some(stream),
            release: Some(release),
            session_id,
            protocol_version,
            poisoned: true,
        }
    }

    /// Returns the session id from the frame header.
    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    /// Returns the negotiated protocol version.
    pub fn protocol_version(&self) -> i16 {
        self.protocol_version
    }

    fn stream(&mut self) -> Result<&mut ReadHalf> {
        self.stream
            .as_mut()
            .ok_or_else(|| OrientError::ConnectionBroken("response body released".to_string()))
    }

    /// Reads a signed byte.
    pub async fn read_byte(&mut self) -> Result<i8> {
        Ok(self.stream()?.read_i8().await?)
    }

    /// Reads an unsigned byte.
    pub async fn read_u8(&mut self) -> Result<u8> {
        Ok(self.stream()?.read_u8().await?)
    }

    /// Reads a boolean byte.
    pub async fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8().await? != 0)
    }

    /// Reads a big-endian i16.
    pub async fn read_short(&mut self) -> Result<i16> {
        Ok(self.stream()?.read_i16().await?)
    }

    /// Reads a big-endian i32.
    pub async fn read_int(&mut self) -> Result<i32> {
        Ok(self.stream()?.read_i32().await?)
    }

    /// Reads a big-endian i64.
    pub async fn read_long(&mut self) -> Result<i64> {
        Ok(self.stream()?.read_i64().await?)
    }

    /// Reads exactly `len` bytes.
    pub async fn read_raw(&mut self, len: usize) -> Result<Vec<u8>> {
        read_len(self.stream()?, len).await
    }

    /// Reads an i32-length-prefixed byte array; null reads as empty.
    pub async fn read_bytes(&mut self) -> Result<Vec<u8>> {
        Ok(self.read_nullable_bytes().await?.unwrap_or_default())
    }

    /// Reads an i32-length-prefixed byte array.
    pub async fn read_nullable_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        read_nullable_bytes(self.stream()?).await
    }

    /// Reads an i32-length-prefixed string; null reads as empty.
    pub async fn read_string(&mut self) -> Result<String> {
        Ok(self.read_nullable_string().await?.unwrap_or_default())
    }

    /// Reads an i32-length-prefixed string.
    pub async fn read_nullable_string(&mut self) -> Result<Option<String>> {
        read_nullable_string(self.stream()?).await
    }

    /// Marks the body as fully consumed, so the next frame can be read.
    pub fn complete(&mut self) {
        self.poisoned = false;
    }

    /// Marks the body as not fully consumed.
    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }
}

impl Drop for ResponseReader {
    fn drop(&mut self) {
        if let (Some(stream), Some(release)) = (self.stream.take(), self.release.take()) {
            let _ = release.send(Released {
                stream,
                poisoned: self.poisoned,
            });
        }
    }
}

impl std::fmt::Debug for ResponseReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseReader")
            .field("session_id", &self.session_id)
            .field("protocol_version", &self.protocol_version)
            .field("released", &self.stream.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(s: &str) -> Vec<u8> {
        let mut out = (s.len() as i32).to_be_bytes().to_vec();
        out.extend_from_slice(s.as_bytes());
        out
    }

    fn boxed(data: Vec<u8>) -> ReadHalf {
        let inner: Box<dyn AsyncRead + Send + Unpin> = Box::new(std::io::Cursor::new(data));
        BufReader::new(inner)
    }

    #[tokio::test]
    async fn test_read_exceptions_in_order() {
        let mut frame = vec![1];
        frame.extend(string("Blarg"));
        frame.extend(string("boom"));
        frame.push(1);
        frame.extend(string("Wobble"));
        frame.extend((-1i32).to_be_bytes());
        frame.push(0);
        frame.extend(3i32.to_be_bytes());
        frame.extend([9, 9, 9]);
        frame.push(0x42);

        let mut stream = boxed(frame);
        let error = read_exceptions(&mut stream).await.unwrap();
        assert_eq!(
            error.exceptions(),
            &[
                ServerException::new("Blarg", "boom"),
                ServerException::new("Wobble", ""),
            ]
        );
        assert_eq!(stream.read_u8().await.unwrap(), 0x42);
    }

    #[tokio::test]
    async fn test_nullable_bytes() {
        let mut data = (-1i32).to_be_bytes().to_vec();
        data.extend((-2i32).to_be_bytes());
        let mut stream = boxed(data);
        assert_eq!(read_nullable_bytes(&mut stream).await.unwrap(), None);
        assert!(matches!(
            read_nullable_bytes(&mut stream).await,
            Err(OrientError::CorruptStream(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_length_fails_at_end_of_stream() {
        let mut data = i32::MAX.to_be_bytes().to_vec();
        data.extend([1, 2, 3]);
        let mut stream = boxed(data);
        match read_nullable_bytes(&mut stream).await {
            Err(OrientError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected end of stream, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_raw_exact_length() {
        let (tx, _rx) = oneshot::channel();
        let mut reader = ResponseReader::new(boxed(vec![1, 2, 3, 4]), tx, 4, 28);
        assert_eq!(reader.read_raw(3).await.unwrap(), vec![1, 2, 3]);
        assert!(matches!(reader.read_raw(2).await, Err(OrientError::Io(_))));
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let mut data = 7i32.to_be_bytes().to_vec();
        data.extend(string("hi"));
        let (tx, rx) = oneshot::channel();
        let mut reader = ResponseReader::new(boxed(data), tx, 4, 28);

        assert_eq!(reader.read_int().await.unwrap(), 7);
        assert_eq!(reader.read_string().await.unwrap(), "hi");
        reader.complete();
        drop(reader);

        let released = rx.await.unwrap();
        assert!(!released.poisoned);
    }

    #[tokio::test]
    async fn test_incomplete_reader_is_poisoned() {
        let (tx, rx) = oneshot::channel();
        let reader = ResponseReader::new(boxed(vec![0; 4]), tx, 4, 28);
        drop(reader);
        assert!(rx.await.unwrap().poisoned);
    }

    #[tokio::test]
    async fn test_truncated_body_is_io_error() {
        let (tx, _rx) = oneshot::channel();
        let mut reader = ResponseReader::new(boxed(vec![0, 1]), tx, 4, 28);
        assert!(matches!(reader.read_int().await, Err(OrientError::Io(_))));
    }
}

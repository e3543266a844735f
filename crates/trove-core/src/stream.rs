//! Scoped stream handles returned by the streaming [`FileStorage`] operations.
//!
//! Readers release their backend handle when dropped. Writers must be
//! finished with `close()`, which flushes buffered data and shuts the stream
//! down; a writer dropped without `close()` still releases its handle but
//! buffered data may not have reached the backend, and a warning is logged.
//!
//! [`FileStorage`]: crate::storage::FileStorage

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tracing::warn;

use crate::error::TroveError;
use crate::types::TextEncoding;
use crate::Result;

/// Boxed async reader supplied by a backend.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed async writer supplied by a backend.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A readable byte stream over one storage entry.
pub struct ByteReadStream {
    path: String,
    inner: BoxedReader,
}

impl ByteReadStream {
    pub fn new(path: impl Into<String>, inner: BoxedReader) -> Self {
        Self {
            path: path.into(),
            inner,
        }
    }

    /// The storage path this stream reads from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read up to `buf.len()` bytes. Returns 0 at end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner
            .read(buf)
            .await
            .map_err(|e| TroveError::from_io(e, &self.path))
    }

    /// Read the remainder of the stream.
    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        let mut data = Vec::new();
        self.inner
            .read_to_end(&mut data)
            .await
            .map_err(|e| TroveError::from_io(e, &self.path))?;
        Ok(Bytes::from(data))
    }
}

impl AsyncRead for ByteReadStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// A writable byte stream over one storage entry.
pub struct ByteWriteStream {
    path: String,
    inner: BoxedWriter,
    closed: bool,
}

impl ByteWriteStream {
    pub fn new(path: impl Into<String>, inner: BoxedWriter) -> Self {
        Self {
            path: path.into(),
            inner,
            closed: false,
        }
    }

    /// The storage path this stream writes to.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.inner
            .write_all(data)
            .await
            .map_err(|e| TroveError::from_io(e, &self.path))
    }

    /// Flush and shut down the stream, committing the content to the backend.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        self.inner
            .flush()
            .await
            .map_err(|e| TroveError::from_io(e, &self.path))?;
        self.inner
            .shutdown()
            .await
            .map_err(|e| TroveError::from_io(e, &self.path))
    }
}

impl Drop for ByteWriteStream {
    fn drop(&mut self) {
        if !self.closed {
            warn!(path = %self.path, "Write stream dropped without close, content may be incomplete");
        }
    }
}

/// A readable text stream over one storage entry.
pub struct TextReadStream {
    path: String,
    encoding: TextEncoding,
    inner: BufReader<ByteReadStream>,
}

impl TextReadStream {
    pub fn new(stream: ByteReadStream, encoding: TextEncoding) -> Self {
        Self {
            path: stream.path().to_string(),
            encoding,
            inner: BufReader::new(stream),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Read one line, including its terminator, appending it to `line`.
    /// Returns the number of bytes read, 0 at end of stream.
    pub async fn read_line(&mut self, line: &mut String) -> Result<usize> {
        match self.encoding {
            TextEncoding::Utf8 => self.inner.read_line(line).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    TroveError::access(format!("Content of {} is not valid UTF-8", self.path), e)
                } else {
                    TroveError::from_io(e, &self.path)
                }
            }),
        }
    }

    /// Read and decode the remainder of the stream.
    pub async fn read_to_string(&mut self) -> Result<String> {
        let mut data = Vec::new();
        self.inner
            .read_to_end(&mut data)
            .await
            .map_err(|e| TroveError::from_io(e, &self.path))?;
        self.encoding.decode(data, &self.path)
    }
}

/// A writable text stream over one storage entry.
pub struct TextWriteStream {
    encoding: TextEncoding,
    inner: ByteWriteStream,
}

impl TextWriteStream {
    pub fn new(stream: ByteWriteStream, encoding: TextEncoding) -> Self {
        Self {
            encoding,
            inner: stream,
        }
    }

    pub fn path(&self) -> &str {
        self.inner.path()
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub async fn write_str(&mut self, text: &str) -> Result<()> {
        let encoded = self.encoding.encode(text);
        self.inner.write_all(&encoded).await
    }

    /// Flush and shut down the stream, committing the content to the backend.
    pub async fn close(self) -> Result<()> {
        self.inner.close().await
    }
}

//! Request body streaming.

use std::fmt;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

/// A boxed stream of body chunks, as delivered by the HTTP layer.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static>>;

/// An inbound request body handed to operation handlers.
///
/// Bodies are never buffered by the HTTP layer; handlers that need the whole
/// payload (XML bodies, form uploads) call [`collect`](Self::collect), while
/// the upload paths consume the stream incrementally.
pub struct StreamingBlob {
    /// The underlying chunk stream.
    pub stream: ByteStream,
    /// The declared `Content-Length`, if the request carried one.
    pub content_length: Option<u64>,
}

impl StreamingBlob {
    /// Wrap a chunk stream with an optional declared length.
    #[must_use]
    pub fn new(
        stream: impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
        content_length: Option<u64>,
    ) -> Self {
        Self {
            stream: Box::pin(stream),
            content_length,
        }
    }

    /// An empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(futures::stream::empty(), Some(0))
    }

    /// A body backed by an in-memory buffer (used by tests and form uploads).
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len() as u64;
        Self::new(futures::stream::once(async move { Ok(data) }), Some(len))
    }

    /// Drain the stream into a single buffer.
    ///
    /// # Errors
    ///
    /// Returns the first read error encountered on the stream.
    pub async fn collect(mut self) -> Result<Bytes, std::io::Error> {
        let mut buf = BytesMut::with_capacity(
            self.content_length
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(0),
        );
        while let Some(chunk) = self.stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for StreamingBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingBlob")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl From<Bytes> for StreamingBlob {
    fn from(data: Bytes) -> Self {
        Self::from_bytes(data)
    }
}

impl From<Vec<u8>> for StreamingBlob {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_should_collect_chunked_stream() {
        let chunks = vec![Ok(Bytes::from("hello ")), Ok(Bytes::from("world"))];
        let blob = StreamingBlob::new(futures::stream::iter(chunks), None);
        let collected = blob.collect().await.expect("collect should succeed");
        assert_eq!(collected.as_ref(), b"hello world");
    }

    #[tokio::test]
    async fn test_should_surface_read_error_on_collect() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from("partial")),
            Err(std::io::Error::other("stream reset")),
        ];
        let blob = StreamingBlob::new(futures::stream::iter(chunks), None);
        assert!(blob.collect().await.is_err());
    }

    #[tokio::test]
    async fn test_should_report_length_of_buffered_body() {
        let blob = StreamingBlob::from_bytes(Bytes::from("abc"));
        assert_eq!(blob.content_length, Some(3));
        assert_eq!(blob.collect().await.expect("collect").as_ref(), b"abc");
    }

    #[tokio::test]
    async fn test_should_collect_empty_body() {
        let blob = StreamingBlob::empty();
        assert!(blob.collect().await.expect("collect").is_empty());
    }
}

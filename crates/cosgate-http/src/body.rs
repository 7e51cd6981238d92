//! Response body types supporting buffered, streaming, and empty modes.
//!
//! [`ResponseBody`] is the HTTP response body used throughout the proxy:
//!
//! - **Buffered**: XML payloads and error envelopes.
//! - **Streaming**: object downloads passed through from the backend.
//! - **Empty**: 204 responses (deletes, aborts).

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::TryStreamExt;
use http_body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{Full, StreamBody};

use cosgate_model::request::StreamingBlob;

/// Response body supporting buffered, streaming, and empty modes.
///
/// Implements [`http_body::Body`] so it can be used directly with hyper.
/// The streaming variant is `Send` but not `Sync` (it wraps the backend's
/// boxed chunk stream), hence the unsync boxed body.
#[derive(Debug, Default)]
pub enum ResponseBody {
    /// Buffered body for small responses: XML payloads, error envelopes.
    Buffered(Full<Bytes>),
    /// Streaming body for object downloads.
    Streaming(UnsyncBoxBody<Bytes, std::io::Error>),
    /// Empty body for 204 responses.
    #[default]
    Empty,
}

impl ResponseBody {
    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create a buffered body from a UTF-8 string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self::Buffered(Full::new(Bytes::from(s.into())))
    }

    /// Create a buffered body from an XML byte vector.
    #[must_use]
    pub fn from_xml(xml: Vec<u8>) -> Self {
        Self::Buffered(Full::new(Bytes::from(xml)))
    }

    /// Create a streaming body from a request-body stream.
    #[must_use]
    pub fn from_blob(blob: StreamingBlob) -> Self {
        let frames = blob.stream.map_ok(Frame::data);
        Self::Streaming(UnsyncBoxBody::new(StreamBody::new(frames)))
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }
}

impl http_body::Body for ResponseBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Streaming(body) => Pin::new(body).poll_frame(cx),
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::Streaming(body) => body.is_end_stream(),
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::Streaming(body) => body.size_hint(),
            Self::Empty => http_body::SizeHint::with_exact(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body::Body;
    use http_body_util::BodyExt;

    use super::*;

    #[test]
    fn test_should_report_empty_body_as_end_of_stream() {
        let body = ResponseBody::empty();
        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
    }

    #[test]
    fn test_should_create_buffered_body_from_bytes() {
        let body = ResponseBody::from_bytes(Bytes::from("hello"));
        assert!(!body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(5));
    }

    #[test]
    fn test_should_create_buffered_body_from_xml() {
        let body = ResponseBody::from_xml(b"<Root/>".to_vec());
        assert!(!body.is_end_stream());
    }

    #[tokio::test]
    async fn test_should_stream_blob_body() {
        let chunks = vec![Ok(Bytes::from("ab")), Ok(Bytes::from("cd"))];
        let blob = StreamingBlob::new(futures::stream::iter(chunks), Some(4));
        let body = ResponseBody::from_blob(blob);

        let collected = body.collect().await.expect("collect").to_bytes();
        assert_eq!(collected.as_ref(), b"abcd");
    }

    #[test]
    fn test_should_default_to_empty() {
        assert!(ResponseBody::default().is_end_stream());
    }
}

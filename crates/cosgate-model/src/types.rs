//! Wire types shared between the XML layer, the handlers, and the HTTP layer.

use serde::{Deserialize, Serialize};

use crate::request::StreamingBlob;

/// One entry of a multipart completion manifest: `(PartNumber, ETag)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    /// The 1-based part sequence number.
    pub part_number: i32,
    /// The part's ETag. Unquoted on the backend side of the boundary; quoted
    /// in everything emitted to S3 clients.
    pub e_tag: String,
}

impl CompletedPart {
    /// Create a completed part entry.
    #[must_use]
    pub fn new(part_number: i32, e_tag: impl Into<String>) -> Self {
        Self {
            part_number,
            e_tag: e_tag.into(),
        }
    }
}

/// The part list of a `CompleteMultipartUpload` request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedMultipartUpload {
    /// The `(PartNumber, ETag)` entries in document order.
    pub parts: Vec<CompletedPart>,
}

/// Success payload of `CreateMultipartUpload`, serialized as
/// `<InitiateMultipartUploadResult>{Bucket, Key, UploadId}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateMultipartUploadResult {
    /// The bucket the upload targets.
    pub bucket: String,
    /// The object key the upload targets.
    pub key: String,
    /// The backend-assigned upload session identifier.
    pub upload_id: String,
}

/// Success payload of `CompleteMultipartUpload`, serialized as
/// `<CompleteMultipartUploadResult>{Location, Bucket, Key, ETag}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteMultipartUploadResult {
    /// The final object location reported by the backend.
    pub location: String,
    /// The bucket the object was written to.
    pub bucket: String,
    /// The object key.
    pub key: String,
    /// The final object ETag (quoted when emitted to clients).
    pub e_tag: String,
}

/// Result of a simple object write.
///
/// The ETag, when present, is already quoted for the S3 surface.
#[derive(Debug, Clone, Default)]
pub struct PutObjectOutput {
    /// The stored object's ETag, quoted.
    pub e_tag: Option<String>,
}

/// Result of uploading a single part.
#[derive(Debug, Clone)]
pub struct UploadPartOutput {
    /// The part's ETag, quoted.
    pub e_tag: String,
}

/// A retrieved object, streamed through from the backend.
#[derive(Debug)]
pub struct GetObjectOutput {
    /// The backend's HTTP status (200, or 206 for range responses).
    pub status: http::StatusCode,
    /// Backend response headers passed through to the client.
    pub headers: http::HeaderMap,
    /// The object body stream.
    pub body: StreamingBlob,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_construct_completed_part() {
        let part = CompletedPart::new(3, "abc123");
        assert_eq!(part.part_number, 3);
        assert_eq!(part.e_tag, "abc123");
    }
}

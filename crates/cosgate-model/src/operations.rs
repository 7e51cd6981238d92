//! The closed set of operations the proxy accepts on its S3-compatible surface.

use std::fmt;

/// An operation identified from an inbound request.
///
/// Classification happens exactly once per request, in the router, following
/// a fixed precedence: the `uploads` marker, then the `uploadId` marker, then
/// the HTTP method alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyOperation {
    /// Retrieve an object (`GET /{bucket}/{key}`), Range passthrough.
    GetObject,
    /// Store an object (`PUT /{bucket}/{key}`); large or unsized bodies are
    /// transparently uploaded through the multipart coordinator.
    PutObject,
    /// Browser form upload (`POST /{bucket}` with `multipart/form-data`).
    PostObject,
    /// Delete an object (`DELETE /{bucket}/{key}`); always 204.
    DeleteObject,
    /// Start a multipart upload (`POST /{bucket}/{key}?uploads`).
    CreateMultipartUpload,
    /// Upload one part (`PUT /{bucket}/{key}?partNumber=N&uploadId=ID`).
    UploadPart,
    /// Finalize a multipart upload (`POST /{bucket}/{key}?uploadId=ID`).
    CompleteMultipartUpload,
    /// Discard a multipart upload (`DELETE /{bucket}/{key}?uploadId=ID`).
    AbortMultipartUpload,
}

impl ProxyOperation {
    /// Returns the operation name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetObject => "GetObject",
            Self::PutObject => "PutObject",
            Self::PostObject => "PostObject",
            Self::DeleteObject => "DeleteObject",
            Self::CreateMultipartUpload => "CreateMultipartUpload",
            Self::UploadPart => "UploadPart",
            Self::CompleteMultipartUpload => "CompleteMultipartUpload",
            Self::AbortMultipartUpload => "AbortMultipartUpload",
        }
    }

    /// Whether the operation mutates remote state (used by the allow-list).
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::GetObject)
    }
}

impl fmt::Display for ProxyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_format_operation_names() {
        assert_eq!(ProxyOperation::GetObject.as_str(), "GetObject");
        assert_eq!(
            ProxyOperation::CompleteMultipartUpload.to_string(),
            "CompleteMultipartUpload"
        );
    }

    #[test]
    fn test_should_classify_mutating_operations() {
        assert!(!ProxyOperation::GetObject.is_mutating());
        assert!(ProxyOperation::PutObject.is_mutating());
        assert!(ProxyOperation::DeleteObject.is_mutating());
        assert!(ProxyOperation::AbortMultipartUpload.is_mutating());
    }
}

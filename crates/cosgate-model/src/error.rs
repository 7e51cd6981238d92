//! The proxy error taxonomy.
//!
//! Three kinds of failure leave this system:
//!
//! - [`ProxyError::Client`]: the inbound request is unacceptable (4xx, never
//!   forwarded to the backend).
//! - [`ProxyError::Backend`]: the backend rejected the operation; its code,
//!   message, request id, and original HTTP status are preserved and mapped
//!   into the S3 error envelope.
//! - [`ProxyError::Transport`]: anything else (network, I/O, internal);
//!   rendered as a generic `InternalError` with status 500.

use std::fmt;

/// Client-side error codes emitted on the S3-compatible surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ClientErrorCode {
    /// AccessDenied error.
    AccessDenied,
    /// InvalidArgument error.
    InvalidArgument,
    /// InvalidRequest error.
    InvalidRequest,
    /// MalformedXML error.
    MalformedXML,
    /// MethodNotAllowed error.
    MethodNotAllowed,
    /// MissingContentLength error.
    MissingContentLength,
}

impl ClientErrorCode {
    /// Returns the error code as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidRequest => "InvalidRequest",
            Self::MalformedXML => "MalformedXML",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::MissingContentLength => "MissingContentLength",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        match self {
            Self::AccessDenied => http::StatusCode::FORBIDDEN,
            Self::InvalidArgument | Self::InvalidRequest | Self::MalformedXML => {
                http::StatusCode::BAD_REQUEST
            }
            Self::MethodNotAllowed => http::StatusCode::METHOD_NOT_ALLOWED,
            Self::MissingContentLength => http::StatusCode::LENGTH_REQUIRED,
        }
    }

    /// Returns the default message for this error.
    #[must_use]
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::AccessDenied => "Access Denied",
            Self::InvalidArgument => "Invalid Argument",
            Self::InvalidRequest => "Invalid Request",
            Self::MalformedXML => "The XML you provided was not well-formed",
            Self::MethodNotAllowed => "The specified method is not allowed against this resource",
            Self::MissingContentLength => "You must provide the Content-Length HTTP header",
        }
    }
}

impl fmt::Display for ClientErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by the backend storage service.
///
/// Carries the backend's own error code, message, request identifier, and the
/// HTTP status it answered with. All four are surfaced to the client inside
/// the S3 error envelope, with the original status preserved.
#[derive(Debug, Clone)]
pub struct BackendError {
    /// The backend's error code (e.g. `NoSuchKey`).
    pub code: String,
    /// The backend's human-readable message.
    pub message: String,
    /// The backend's request identifier, if one was returned.
    pub request_id: Option<String>,
    /// The HTTP status the backend answered with.
    pub status: http::StatusCode,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backend error {} ({}): {}", self.code, self.status, self.message)
    }
}

impl std::error::Error for BackendError {}

/// The error type used throughout the proxy.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The inbound request is unacceptable; never forwarded to the backend.
    #[error("{code}: {message}")]
    Client {
        /// The S3-style error code.
        code: ClientErrorCode,
        /// The human-readable message.
        message: String,
    },

    /// The backend rejected the operation.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A network or internal failure with no backend envelope.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ProxyError {
    /// Create a client error with the code's default message.
    #[must_use]
    pub fn client(code: ClientErrorCode) -> Self {
        Self::Client {
            message: code.default_message().to_owned(),
            code,
        }
    }

    /// Create a client error with a custom message.
    #[must_use]
    pub fn client_with_message(code: ClientErrorCode, message: impl Into<String>) -> Self {
        Self::Client {
            code,
            message: message.into(),
        }
    }

    /// Create an `InvalidRequest` client error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::client_with_message(ClientErrorCode::InvalidRequest, message)
    }

    /// Create an `InvalidArgument` client error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::client_with_message(ClientErrorCode::InvalidArgument, message)
    }

    /// Create a `MalformedXML` client error.
    #[must_use]
    pub fn malformed_xml(message: impl Into<String>) -> Self {
        Self::client_with_message(ClientErrorCode::MalformedXML, message)
    }

    /// Create a `MethodNotAllowed` client error naming the offending method.
    #[must_use]
    pub fn method_not_allowed(method: impl fmt::Display) -> Self {
        Self::client_with_message(
            ClientErrorCode::MethodNotAllowed,
            format!("method {method} is not allowed against this resource"),
        )
    }

    /// Create a `MissingContentLength` client error.
    #[must_use]
    pub fn missing_content_length() -> Self {
        Self::client(ClientErrorCode::MissingContentLength)
    }

    /// Create an `AccessDenied` client error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::client_with_message(ClientErrorCode::AccessDenied, message)
    }

    /// Wrap an arbitrary failure as a transport error.
    pub fn transport(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(source))
    }

    /// The HTTP status this error is answered with.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        match self {
            Self::Client { code, .. } => code.status_code(),
            Self::Backend(err) => err.status,
            Self::Transport(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The error code string placed in the `<Code>` element of the envelope.
    #[must_use]
    pub fn error_code(&self) -> &str {
        match self {
            Self::Client { code, .. } => code.as_str(),
            Self::Backend(err) => &err.code,
            Self::Transport(_) => "InternalError",
        }
    }

    /// The message placed in the `<Message>` element of the envelope.
    #[must_use]
    pub fn error_message(&self) -> String {
        match self {
            Self::Client { message, .. } => message.clone(),
            Self::Backend(err) => err.message.clone(),
            Self::Transport(source) => source.to_string(),
        }
    }

    /// The backend request id, if this error carries one.
    #[must_use]
    pub fn backend_request_id(&self) -> Option<&str> {
        match self {
            Self::Backend(err) => err.request_id.as_deref(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}

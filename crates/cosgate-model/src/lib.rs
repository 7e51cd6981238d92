//! Shared model types for the cosgate S3-compatible proxy.
//!
//! This crate defines the wire-facing vocabulary used by every other layer:
//!
//! - [`ProxyOperation`]: the closed set of operations the proxy accepts.
//! - [`error`]: the proxy error taxonomy (client / backend / transport).
//! - [`types`]: multipart envelope types shared between the XML layer and the
//!   operation handlers.
//! - [`request`]: the [`StreamingBlob`](request::StreamingBlob) request body
//!   wrapper used to hand inbound bodies to handlers without buffering.

// ProxyError is the pervasive domain error type used as Result<T, ProxyError>
// throughout the workspace. Its size comes from the embedded BackendError
// fields; boxing it everywhere would add indirection for no measurable gain.
#![allow(clippy::result_large_err)]

pub mod error;
pub mod operations;
pub mod request;
pub mod types;

pub use error::{BackendError, ClientErrorCode, ProxyError};
pub use operations::ProxyOperation;
pub use request::StreamingBlob;

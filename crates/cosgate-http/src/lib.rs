//! HTTP layer for the cosgate S3-compatible proxy.
//!
//! This crate handles everything between the TCP connection and the typed
//! operation handlers:
//!
//! - **Routing** ([`router`]): resolves bucket/key from virtual-hosted or
//!   path-style addressing and classifies each request into exactly one
//!   [`ProxyOperation`](cosgate_model::ProxyOperation) using a fixed
//!   precedence over the `uploads`/`uploadId` query markers.
//!
//! - **Dispatch** ([`dispatch`]): the [`ProxyHandler`](dispatch::ProxyHandler)
//!   trait connecting the HTTP layer to the operation handlers. Bodies are
//!   handed over as streams, never pre-buffered.
//!
//! - **Response** ([`response`]): converts typed outputs and errors into HTTP
//!   responses; errors become the S3 `<Error>` envelope.
//!
//! - **Body** ([`body`]): the [`ResponseBody`](body::ResponseBody) type with
//!   buffered, streaming, and empty modes.
//!
//! - **Form parsing** ([`multipart`]): `multipart/form-data` parsing for
//!   browser-based POST uploads.
//!
//! - **Service** ([`service`]): the hyper `Service` tying request ids,
//!   credential stripping, the IP allow-list, routing, and dispatch together.

// ProxyError is the pervasive domain error type used as Result<T, ProxyError>.
// See cosgate-model for the sizing rationale.
#![allow(clippy::result_large_err)]

pub mod body;
pub mod dispatch;
pub mod multipart;
pub mod response;
pub mod router;
pub mod service;

pub use body::ResponseBody;
pub use dispatch::ProxyHandler;
pub use response::{IntoProxyResponse, error_to_response};
pub use router::{Router, RoutingContext};
pub use service::{ProxyHttpConfig, ProxyHttpService};

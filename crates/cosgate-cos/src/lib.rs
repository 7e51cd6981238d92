//! Tencent COS backend client for cosgate.
//!
//! Implements the [`ObjectStore`](cosgate_core::ObjectStore) capability
//! against the COS REST API:
//!
//! - [`auth`]: the COS `q-sign-algorithm=sha1` request signature (HMAC-SHA1
//!   over a canonical request description).
//! - [`error`]: COS error envelope parsing into
//!   [`BackendError`](cosgate_model::BackendError), preserving the original
//!   code, message, request id, and HTTP status.
//! - [`client`]: the [`CosClient`](client::CosClient) itself, streaming
//!   bodies in both directions with reqwest.

// ProxyError is the pervasive domain error type used as Result<T, ProxyError>.
// See cosgate-model for the sizing rationale.
#![allow(clippy::result_large_err)]

pub mod auth;
pub mod client;
pub mod error;

pub use auth::CosCredentials;
pub use client::CosClient;

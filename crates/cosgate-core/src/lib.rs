//! Core proxy logic for cosgate.
//!
//! This crate holds everything between the HTTP surface and the backend
//! client:
//!
//! - [`config`]: the environment-driven [`ProxyConfig`](config::ProxyConfig),
//!   constructed once at startup and passed in explicitly.
//! - [`store`]: the [`ObjectStore`](store::ObjectStore) capability trait —
//!   the six backend operations any concrete backend implements.
//! - [`translate`]: the protocol translation helpers (metadata prefix
//!   rewriting, ETag quoting, content-type fallbacks).
//! - [`multipart`]: the [`MultipartUploader`](multipart::MultipartUploader)
//!   coordinator turning one inbound byte stream into a committed remote
//!   object via bounded-concurrency part uploads.
//! - [`proxy`]: the [`CosProxy`](proxy::CosProxy) operation handlers.

// ProxyError is the pervasive domain error type used as Result<T, ProxyError>.
// See cosgate-model for the sizing rationale.
#![allow(clippy::result_large_err)]

pub mod config;
pub mod multipart;
pub mod proxy;
pub mod store;
pub mod translate;

pub use config::{ProxyConfig, StreamingPutPolicy};
pub use multipart::MultipartUploader;
pub use proxy::CosProxy;
pub use store::ObjectStore;

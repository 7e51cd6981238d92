//! Wire-dialect translation between the S3 surface and the COS backend.
//!
//! Three small, heavily-exercised concerns live here:
//!
//! - metadata header prefix rewriting (`x-amz-meta-*` → `x-cos-meta-*`),
//! - ETag quoting: the backend side of the boundary is unquoted, the client
//!   side is quoted, each conversion applied exactly once,
//! - content-type fallbacks for uploads.

use std::collections::HashMap;

/// Metadata header prefix on the inbound S3 surface.
pub const SOURCE_METADATA_PREFIX: &str = "x-amz-meta-";

/// Metadata header prefix the backend expects.
pub const BACKEND_METADATA_PREFIX: &str = "x-cos-meta-";

/// Rewrite client metadata headers into the backend's dialect.
///
/// Header names matching the source prefix (header names are already
/// lowercase in the `http` crate, so the match is case-insensitive by
/// construction) are renamed to the backend prefix with the key suffix kept
/// verbatim. When a header repeats, the first value wins. Values that are not
/// valid UTF-8 are dropped.
#[must_use]
pub fn rewrite_metadata(headers: &http::HeaderMap) -> HashMap<String, String> {
    let mut metadata = HashMap::new();

    for name in headers.keys() {
        let Some(suffix) = name.as_str().strip_prefix(SOURCE_METADATA_PREFIX) else {
            continue;
        };
        // `HeaderMap::get` returns the first value of a repeated header.
        let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        metadata.insert(
            format!("{BACKEND_METADATA_PREFIX}{suffix}"),
            value.to_owned(),
        );
    }

    metadata
}

/// Wrap an ETag in double quotes for the S3 surface.
///
/// Already-quoted values are passed through unchanged, so the conversion is
/// idempotent at the boundary.
#[must_use]
pub fn quote_etag(etag: &str) -> String {
    if etag.len() >= 2 && etag.starts_with('"') && etag.ends_with('"') {
        etag.to_owned()
    } else {
        format!("\"{etag}\"")
    }
}

/// Strip surrounding double quotes from a client-supplied ETag.
#[must_use]
pub fn unquote_etag(etag: &str) -> &str {
    etag.trim_matches('"')
}

/// Resolve the Content-Type for an upload, defaulting to octet-stream.
#[must_use]
pub fn default_content_type(provided: Option<&str>) -> String {
    match provided {
        Some(ct) if !ct.is_empty() => ct.to_owned(),
        _ => "application/octet-stream".to_owned(),
    }
}

/// Guess a Content-Type from a file name's extension.
///
/// Covers the media types the proxy's form-upload clients actually send;
/// everything else falls back to octet-stream at the caller.
#[must_use]
pub fn guess_content_type(file_name: &str) -> Option<&'static str> {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".webm") {
        Some("audio/webm")
    } else if lower.ends_with(".mp3") {
        Some("audio/mpeg")
    } else if lower.ends_with(".wav") {
        Some("audio/wav")
    } else if lower.ends_with(".mp4") {
        Some("video/mp4")
    } else {
        None
    }
}

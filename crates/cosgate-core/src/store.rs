//! The backend storage capability.
//!
//! [`ObjectStore`] is the injected interface between the proxy and whatever
//! actually holds the bytes. It exposes exactly the operations the proxy
//! needs; the concrete COS client lives in `cosgate-cos`, and tests inject
//! recording mocks. All ETags crossing this boundary are unquoted — quoting
//! for the S3 surface happens exactly once, in the translation layer.

use std::collections::HashMap;

use async_trait::async_trait;

use cosgate_model::error::ProxyError;
use cosgate_model::request::StreamingBlob;
use cosgate_model::types::CompletedPart;

/// Options for object writes (simple put and multipart initiation).
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// The object's Content-Type.
    pub content_type: Option<String>,
    /// Backend-dialect metadata headers (already prefix-rewritten),
    /// name → value.
    pub metadata: HashMap<String, String>,
}

/// Options for object reads.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// An HTTP `Range` header value forwarded verbatim.
    pub range: Option<String>,
}

/// Result of a simple object write.
#[derive(Debug, Clone)]
pub struct PutResult {
    /// The stored object's ETag, unquoted.
    pub e_tag: String,
}

/// A retrieved object streamed from the backend.
#[derive(Debug)]
pub struct ObjectDownload {
    /// The backend's HTTP status (200, or 206 for range reads).
    pub status: http::StatusCode,
    /// The backend's response headers.
    pub headers: http::HeaderMap,
    /// The object body stream.
    pub body: StreamingBlob,
}

/// Result of finalizing a multipart upload.
#[derive(Debug, Clone)]
pub struct CompletedUpload {
    /// The final object location reported by the backend.
    pub location: String,
    /// The final object ETag, unquoted.
    pub e_tag: String,
}

/// The backend storage operations the proxy depends on.
///
/// Every call observes the caller's cancellation: dropping the returned
/// future abandons the backend request.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Store an object in one request.
    async fn put(
        &self,
        key: &str,
        body: StreamingBlob,
        opts: PutOptions,
    ) -> Result<PutResult, ProxyError>;

    /// Retrieve an object, optionally a byte range of it.
    async fn get(&self, key: &str, opts: GetOptions) -> Result<ObjectDownload, ProxyError>;

    /// Delete an object. Succeeds whether or not the object existed.
    async fn delete(&self, key: &str) -> Result<(), ProxyError>;

    /// Request a new multipart upload session, returning its upload id.
    async fn initiate_multipart_upload(
        &self,
        key: &str,
        opts: PutOptions,
    ) -> Result<String, ProxyError>;

    /// Upload one part of a session, returning the part's ETag.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: StreamingBlob,
    ) -> Result<String, ProxyError>;

    /// Finalize a session with the given completion manifest.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompletedUpload, ProxyError>;

    /// Discard a session and any parts uploaded under it.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), ProxyError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! A recording mock backend shared by the coordinator and handler tests.

    use std::sync::Mutex;
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;

    /// A call observed by the mock, in arrival order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RecordedCall {
        Put { key: String, body_len: usize },
        Get { key: String },
        Delete { key: String },
        Initiate { key: String },
        UploadPart { part_number: i32, body_len: usize },
        Complete { parts: Vec<CompletedPart> },
        Abort { upload_id: String },
    }

    /// An `ObjectStore` that records calls and injects failures on demand.
    #[derive(Debug, Default)]
    pub struct MockStore {
        /// Every observed call, in order.
        pub calls: Mutex<Vec<RecordedCall>>,
        /// Recorded put options, in order.
        pub put_options: Mutex<Vec<PutOptions>>,
        /// Fail `initiate_multipart_upload` when set.
        pub fail_initiate: bool,
        /// Fail `upload_part` for this part number.
        pub fail_part: Option<i32>,
        /// Fail `abort_multipart_upload` when set.
        pub fail_abort: bool,
        /// Delay `upload_part` for this part number, to force out-of-order
        /// completions.
        pub delay_part: Option<(i32, Duration)>,
    }

    impl MockStore {
        pub fn record(&self, call: RecordedCall) {
            self.calls.lock().expect("mock lock").push(call);
        }

        pub fn recorded(&self) -> Vec<RecordedCall> {
            self.calls.lock().expect("mock lock").clone()
        }

        pub fn count_aborts(&self) -> usize {
            self.recorded()
                .iter()
                .filter(|c| matches!(c, RecordedCall::Abort { .. }))
                .count()
        }

        pub fn completed_manifests(&self) -> Vec<Vec<CompletedPart>> {
            self.recorded()
                .into_iter()
                .filter_map(|c| match c {
                    RecordedCall::Complete { parts } => Some(parts),
                    _ => None,
                })
                .collect()
        }

        pub fn uploaded_part_sizes(&self) -> Vec<(i32, usize)> {
            let mut sizes: Vec<(i32, usize)> = self
                .recorded()
                .into_iter()
                .filter_map(|c| match c {
                    RecordedCall::UploadPart {
                        part_number,
                        body_len,
                    } => Some((part_number, body_len)),
                    _ => None,
                })
                .collect();
            sizes.sort_unstable();
            sizes
        }

        fn transport_failure(detail: &str) -> ProxyError {
            ProxyError::transport(std::io::Error::other(detail.to_owned()))
        }
    }

    #[async_trait]
    impl ObjectStore for MockStore {
        async fn put(
            &self,
            key: &str,
            body: StreamingBlob,
            opts: PutOptions,
        ) -> Result<PutResult, ProxyError> {
            let data = body.collect().await?;
            self.record(RecordedCall::Put {
                key: key.to_owned(),
                body_len: data.len(),
            });
            self.put_options.lock().expect("mock lock").push(opts);
            Ok(PutResult {
                e_tag: "put-etag".to_owned(),
            })
        }

        async fn get(&self, key: &str, _opts: GetOptions) -> Result<ObjectDownload, ProxyError> {
            self.record(RecordedCall::Get {
                key: key.to_owned(),
            });
            Ok(ObjectDownload {
                status: http::StatusCode::OK,
                headers: http::HeaderMap::new(),
                body: StreamingBlob::from_bytes(Bytes::from("object-data")),
            })
        }

        async fn delete(&self, key: &str) -> Result<(), ProxyError> {
            self.record(RecordedCall::Delete {
                key: key.to_owned(),
            });
            Ok(())
        }

        async fn initiate_multipart_upload(
            &self,
            key: &str,
            opts: PutOptions,
        ) -> Result<String, ProxyError> {
            if self.fail_initiate {
                return Err(Self::transport_failure("initiate failed"));
            }
            self.record(RecordedCall::Initiate {
                key: key.to_owned(),
            });
            self.put_options.lock().expect("mock lock").push(opts);
            Ok("upload-1".to_owned())
        }

        async fn upload_part(
            &self,
            _key: &str,
            _upload_id: &str,
            part_number: i32,
            body: StreamingBlob,
        ) -> Result<String, ProxyError> {
            if let Some((delayed, duration)) = self.delay_part {
                if delayed == part_number {
                    tokio::time::sleep(duration).await;
                }
            }
            if self.fail_part == Some(part_number) {
                return Err(Self::transport_failure("part upload failed"));
            }
            let data = body.collect().await?;
            self.record(RecordedCall::UploadPart {
                part_number,
                body_len: data.len(),
            });
            Ok(format!("etag-{part_number}"))
        }

        async fn complete_multipart_upload(
            &self,
            key: &str,
            _upload_id: &str,
            parts: &[CompletedPart],
        ) -> Result<CompletedUpload, ProxyError> {
            self.record(RecordedCall::Complete {
                parts: parts.to_vec(),
            });
            Ok(CompletedUpload {
                location: format!("https://bucket.cos.example/{key}"),
                e_tag: "final-etag".to_owned(),
            })
        }

        async fn abort_multipart_upload(
            &self,
            _key: &str,
            upload_id: &str,
        ) -> Result<(), ProxyError> {
            self.record(RecordedCall::Abort {
                upload_id: upload_id.to_owned(),
            });
            if self.fail_abort {
                return Err(Self::transport_failure("abort failed"));
            }
            Ok(())
        }
    }
}

//! Operation handlers: the proxy's behavior for each classified operation.
//!
//! [`CosProxy`] owns the injected [`ObjectStore`] and the startup
//! configuration and implements the semantics of every operation on the
//! S3-compatible surface. Inputs are already routed and (for query/body
//! payloads) extracted by the HTTP layer; validation that belongs to the
//! protocol (empty keys, part-number ranges, required lengths, XML bodies)
//! happens here.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use cosgate_model::error::ProxyError;
use cosgate_model::request::StreamingBlob;
use cosgate_model::types::{
    CompleteMultipartUploadResult, CompletedMultipartUpload, CompletedPart, GetObjectOutput,
    InitiateMultipartUploadResult, PutObjectOutput, UploadPartOutput,
};
use cosgate_xml::from_xml;

use crate::config::{ProxyConfig, StreamingPutPolicy};
use crate::multipart::MultipartUploader;
use crate::store::{GetOptions, ObjectStore, PutOptions};
use crate::translate::{
    default_content_type, guess_content_type, quote_etag, rewrite_metadata, unquote_etag,
};

/// Part numbers accepted on the S3 surface.
const MAX_PART_NUMBER: i32 = 10_000;

/// The proxy's operation handlers.
#[derive(Clone)]
pub struct CosProxy {
    store: Arc<dyn ObjectStore>,
    config: Arc<ProxyConfig>,
    uploader: MultipartUploader,
}

impl std::fmt::Debug for CosProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosProxy")
            .field("config", &self.config)
            .field("uploader", &self.uploader)
            .finish_non_exhaustive()
    }
}

impl CosProxy {
    /// Create the handler set over an injected backend and configuration.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, config: Arc<ProxyConfig>) -> Self {
        let uploader = MultipartUploader::new(config.part_size, config.upload_concurrency);
        Self {
            store,
            config,
            uploader,
        }
    }

    /// `GET /{bucket}/{key}`: stream the object through, forwarding `Range`.
    pub async fn get_object(
        &self,
        key: &str,
        range: Option<String>,
    ) -> Result<GetObjectOutput, ProxyError> {
        require_key(key)?;

        let download = self.store.get(key, GetOptions { range }).await?;
        Ok(GetObjectOutput {
            status: download.status,
            headers: download.headers,
            body: download.body,
        })
    }

    /// `PUT /{bucket}/{key}`: simple put for small sized bodies, multipart
    /// for large or unsized ones (per the configured policy).
    pub async fn put_object(
        &self,
        key: &str,
        headers: &http::HeaderMap,
        body: StreamingBlob,
    ) -> Result<PutObjectOutput, ProxyError> {
        require_key(key)?;

        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let opts = PutOptions {
            content_type: Some(default_content_type(content_type)),
            metadata: rewrite_metadata(headers),
        };

        let use_multipart = match body.content_length {
            Some(n) if n < self.config.simple_upload_threshold => false,
            Some(_) => true,
            None => match self.config.streaming_put_policy {
                StreamingPutPolicy::Multipart => true,
                StreamingPutPolicy::Reject => {
                    return Err(ProxyError::missing_content_length());
                }
            },
        };

        let e_tag = if use_multipart {
            debug!(key, content_length = ?body.content_length, "routing put through multipart upload");
            let completed = self
                .uploader
                .upload(Arc::clone(&self.store), key, opts, body)
                .await?;
            completed.e_tag
        } else {
            let result = self.store.put(key, body, opts).await?;
            result.e_tag
        };

        info!(key, "stored object");
        Ok(PutObjectOutput {
            e_tag: Some(quote_etag(&e_tag)),
        })
    }

    /// `DELETE /{bucket}/{key}`: always 204, whether or not the object
    /// previously existed.
    pub async fn delete_object(&self, key: &str) -> Result<(), ProxyError> {
        require_key(key)?;
        self.store.delete(key).await
    }

    /// `POST /{bucket}` form upload: the key comes from the form (with
    /// `${filename}` substituted), the data from the `file` field.
    pub async fn post_object(
        &self,
        key_template: &str,
        file_name: Option<&str>,
        file_content_type: Option<&str>,
        headers: &http::HeaderMap,
        data: Bytes,
    ) -> Result<PutObjectOutput, ProxyError> {
        if key_template.is_empty() {
            return Err(ProxyError::invalid_request("form field 'key' is required"));
        }

        let key = key_template.replace("${filename}", file_name.unwrap_or_default());

        let content_type = match file_content_type.filter(|ct| !ct.is_empty()) {
            Some(ct) => ct.to_owned(),
            None => file_name
                .and_then(guess_content_type)
                .unwrap_or("application/octet-stream")
                .to_owned(),
        };

        info!(
            key = %key,
            file_name = ?file_name,
            content_type = %content_type,
            size = data.len(),
            "form upload"
        );

        let opts = PutOptions {
            content_type: Some(content_type),
            metadata: rewrite_metadata(headers),
        };
        let result = self.store.put(&key, StreamingBlob::from_bytes(data), opts).await?;

        Ok(PutObjectOutput {
            e_tag: Some(quote_etag(&result.e_tag)),
        })
    }

    /// `POST /{bucket}/{key}?uploads`: open a session for a client-driven
    /// multipart upload.
    pub async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        headers: &http::HeaderMap,
    ) -> Result<InitiateMultipartUploadResult, ProxyError> {
        require_key(key)?;

        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let opts = PutOptions {
            content_type: Some(default_content_type(content_type)),
            metadata: rewrite_metadata(headers),
        };

        let upload_id = self.store.initiate_multipart_upload(key, opts).await?;
        info!(key, upload_id = %upload_id, "initiated client-driven multipart upload");

        Ok(InitiateMultipartUploadResult {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            upload_id,
        })
    }

    /// `PUT /{bucket}/{key}?partNumber=N&uploadId=ID`: stream one part
    /// through. `Content-Length` is required.
    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: Option<&str>,
        body: StreamingBlob,
    ) -> Result<UploadPartOutput, ProxyError> {
        require_key(key)?;
        require_upload_id(upload_id)?;

        let part_number = part_number
            .ok_or_else(|| ProxyError::invalid_request("partNumber is required"))?
            .parse::<i32>()
            .map_err(|_| ProxyError::invalid_argument("partNumber must be an integer"))?;
        if !(1..=MAX_PART_NUMBER).contains(&part_number) {
            return Err(ProxyError::invalid_argument(format!(
                "partNumber must be between 1 and {MAX_PART_NUMBER}"
            )));
        }

        if body.content_length.is_none() {
            return Err(ProxyError::missing_content_length());
        }

        let e_tag = self
            .store
            .upload_part(key, upload_id, part_number, body)
            .await?;

        Ok(UploadPartOutput {
            e_tag: quote_etag(&e_tag),
        })
    }

    /// `POST /{bucket}/{key}?uploadId=ID`: parse the part list, unquote the
    /// client-supplied ETags, and forward the completion.
    pub async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        body: Bytes,
    ) -> Result<CompleteMultipartUploadResult, ProxyError> {
        require_key(key)?;
        require_upload_id(upload_id)?;

        let request: CompletedMultipartUpload =
            from_xml(&body).map_err(|e| ProxyError::malformed_xml(e.to_string()))?;

        // Clients send ETags quoted per the S3 convention; the backend wants
        // them raw.
        let parts: Vec<CompletedPart> = request
            .parts
            .iter()
            .map(|p| CompletedPart::new(p.part_number, unquote_etag(&p.e_tag)))
            .collect();

        let completed = self
            .store
            .complete_multipart_upload(key, upload_id, &parts)
            .await?;
        info!(key, upload_id, parts = parts.len(), "completed client-driven multipart upload");

        Ok(CompleteMultipartUploadResult {
            location: completed.location,
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            e_tag: quote_etag(&completed.e_tag),
        })
    }

    /// `DELETE /{bucket}/{key}?uploadId=ID`: discard the session; 204.
    pub async fn abort_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<(), ProxyError> {
        require_key(key)?;
        require_upload_id(upload_id)?;
        self.store.abort_multipart_upload(key, upload_id).await
    }
}

/// Operations that act on an object reject an empty key.
fn require_key(key: &str) -> Result<(), ProxyError> {
    if key.is_empty() {
        return Err(ProxyError::invalid_request(
            "object key is missing in the request path",
        ));
    }
    Ok(())
}

fn require_upload_id(upload_id: &str) -> Result<(), ProxyError> {
    if upload_id.is_empty() {
        return Err(ProxyError::invalid_request("uploadId is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use cosgate_model::error::ClientErrorCode;

    use crate::store::testing::{MockStore, RecordedCall};

    use super::*;

    fn proxy_with(store: Arc<MockStore>, config: ProxyConfig) -> CosProxy {
        CosProxy::new(store as Arc<dyn ObjectStore>, Arc::new(config))
    }

    fn small_config() -> ProxyConfig {
        // Tiny sizes so tests exercise both upload paths with a few bytes.
        ProxyConfig::builder()
            .part_size(4)
            .upload_concurrency(2)
            .simple_upload_threshold(8)
            .build()
    }

    fn body_of(len: usize, sized: bool) -> StreamingBlob {
        let data = Bytes::from(vec![1u8; len]);
        let mut blob = StreamingBlob::from_bytes(data);
        if !sized {
            blob.content_length = None;
        }
        blob
    }

    // --- put object routing ---

    #[tokio::test]
    async fn test_should_use_simple_put_below_threshold() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store.clone(), small_config());

        let output = proxy
            .put_object("k", &http::HeaderMap::new(), body_of(5, true))
            .await
            .expect("put should succeed");

        assert_eq!(output.e_tag.as_deref(), Some("\"put-etag\""));
        let calls = store.recorded();
        assert!(matches!(calls[0], RecordedCall::Put { body_len: 5, .. }));
        assert_eq!(store.completed_manifests().len(), 0);
    }

    #[tokio::test]
    async fn test_should_use_multipart_at_threshold_and_above() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store.clone(), small_config());

        let output = proxy
            .put_object("k", &http::HeaderMap::new(), body_of(10, true))
            .await
            .expect("put should succeed");

        assert_eq!(output.e_tag.as_deref(), Some("\"final-etag\""));
        assert_eq!(store.uploaded_part_sizes(), vec![(1, 4), (2, 4), (3, 2)]);
        assert_eq!(store.completed_manifests().len(), 1);
    }

    #[tokio::test]
    async fn test_should_use_multipart_for_unsized_body_by_default() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store.clone(), small_config());

        proxy
            .put_object("k", &http::HeaderMap::new(), body_of(6, false))
            .await
            .expect("put should succeed");

        assert_eq!(store.completed_manifests().len(), 1);
    }

    #[tokio::test]
    async fn test_should_reject_unsized_body_under_reject_policy() {
        let store = Arc::new(MockStore::default());
        let config = ProxyConfig::builder()
            .part_size(4)
            .simple_upload_threshold(8)
            .streaming_put_policy(StreamingPutPolicy::Reject)
            .build();
        let proxy = proxy_with(store.clone(), config);

        let err = proxy
            .put_object("k", &http::HeaderMap::new(), body_of(6, false))
            .await
            .expect_err("put should be rejected");

        assert!(matches!(
            err,
            ProxyError::Client {
                code: ClientErrorCode::MissingContentLength,
                ..
            }
        ));
        assert!(store.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_should_translate_metadata_on_put() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store.clone(), small_config());

        let mut headers = http::HeaderMap::new();
        headers.insert("x-amz-meta-owner", "alice".parse().expect("valid"));
        headers.insert("content-type", "image/png".parse().expect("valid"));

        proxy
            .put_object("k", &headers, body_of(2, true))
            .await
            .expect("put should succeed");

        let opts = store.put_options.lock().expect("lock").clone();
        assert_eq!(opts[0].content_type.as_deref(), Some("image/png"));
        assert_eq!(
            opts[0].metadata.get("x-cos-meta-owner").map(String::as_str),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn test_should_reject_put_with_empty_key() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store, small_config());

        let err = proxy
            .put_object("", &http::HeaderMap::new(), body_of(2, true))
            .await
            .expect_err("empty key must be rejected");
        assert_eq!(err.error_code(), "InvalidRequest");
    }

    // --- get / delete ---

    #[tokio::test]
    async fn test_should_stream_get_through() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store.clone(), small_config());

        let output = proxy
            .get_object("k", Some("bytes=0-3".to_owned()))
            .await
            .expect("get should succeed");

        assert_eq!(output.status, http::StatusCode::OK);
        let data = output.body.collect().await.expect("collect");
        assert_eq!(data.as_ref(), b"object-data");
    }

    #[tokio::test]
    async fn test_should_delete_and_report_nothing() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store.clone(), small_config());

        proxy.delete_object("k").await.expect("delete should succeed");
        assert!(matches!(store.recorded()[0], RecordedCall::Delete { .. }));
    }

    // --- form upload ---

    #[tokio::test]
    async fn test_should_substitute_filename_placeholder() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store.clone(), small_config());

        proxy
            .post_object(
                "uploads/${filename}",
                Some("clip.webm"),
                None,
                &http::HeaderMap::new(),
                Bytes::from_static(b"abc"),
            )
            .await
            .expect("post should succeed");

        let calls = store.recorded();
        assert!(
            matches!(&calls[0], RecordedCall::Put { key, .. } if key == "uploads/clip.webm")
        );
        let opts = store.put_options.lock().expect("lock").clone();
        assert_eq!(opts[0].content_type.as_deref(), Some("audio/webm"));
    }

    #[tokio::test]
    async fn test_should_prefer_file_part_content_type() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store.clone(), small_config());

        proxy
            .post_object(
                "k.bin",
                Some("clip.webm"),
                Some("application/custom"),
                &http::HeaderMap::new(),
                Bytes::from_static(b"abc"),
            )
            .await
            .expect("post should succeed");

        let opts = store.put_options.lock().expect("lock").clone();
        assert_eq!(opts[0].content_type.as_deref(), Some("application/custom"));
    }

    #[tokio::test]
    async fn test_should_reject_post_without_key_field() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store, small_config());

        let err = proxy
            .post_object("", None, None, &http::HeaderMap::new(), Bytes::new())
            .await
            .expect_err("missing key must be rejected");
        assert_eq!(err.error_code(), "InvalidRequest");
    }

    // --- client-driven multipart protocol ---

    #[tokio::test]
    async fn test_should_initiate_and_echo_bucket_and_key() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store, small_config());

        let result = proxy
            .create_multipart_upload("media", "videos/a.mp4", &http::HeaderMap::new())
            .await
            .expect("initiate should succeed");

        assert_eq!(result.bucket, "media");
        assert_eq!(result.key, "videos/a.mp4");
        assert_eq!(result.upload_id, "upload-1");
    }

    #[tokio::test]
    async fn test_should_quote_upload_part_etag() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store, small_config());

        let output = proxy
            .upload_part("k", "upload-1", Some("2"), body_of(4, true))
            .await
            .expect("upload part should succeed");

        assert_eq!(output.e_tag, "\"etag-2\"");
    }

    #[tokio::test]
    async fn test_should_require_content_length_for_upload_part() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store, small_config());

        let err = proxy
            .upload_part("k", "upload-1", Some("1"), body_of(4, false))
            .await
            .expect_err("missing length must be rejected");
        assert!(matches!(
            err,
            ProxyError::Client {
                code: ClientErrorCode::MissingContentLength,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_should_validate_part_number() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store, small_config());

        for bad in [None, Some("zero"), Some("0"), Some("-1"), Some("10001")] {
            let err = proxy
                .upload_part("k", "upload-1", bad, body_of(4, true))
                .await
                .expect_err("invalid part number must be rejected");
            assert!(
                matches!(err, ProxyError::Client { .. }),
                "expected client error for {bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_should_unquote_etags_before_forwarding_completion() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store.clone(), small_config());

        let body = Bytes::from_static(
            br#"<CompleteMultipartUpload>
                <Part><PartNumber>1</PartNumber><ETag>"abc123"</ETag></Part>
                <Part><PartNumber>2</PartNumber><ETag>"def456"</ETag></Part>
            </CompleteMultipartUpload>"#,
        );

        let result = proxy
            .complete_multipart_upload("media", "k", "upload-1", body)
            .await
            .expect("complete should succeed");

        let manifests = store.completed_manifests();
        assert_eq!(
            manifests[0],
            vec![
                CompletedPart::new(1, "abc123"),
                CompletedPart::new(2, "def456"),
            ],
            "quotes stripped before forwarding"
        );
        assert_eq!(result.e_tag, "\"final-etag\"", "outward ETag quoted");
        assert_eq!(result.bucket, "media");
    }

    #[tokio::test]
    async fn test_should_reject_malformed_completion_body() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store.clone(), small_config());

        let err = proxy
            .complete_multipart_upload("b", "k", "upload-1", Bytes::from_static(b"not xml"))
            .await
            .expect_err("malformed body must be rejected");

        assert!(matches!(
            err,
            ProxyError::Client {
                code: ClientErrorCode::MalformedXML,
                ..
            }
        ));
        assert!(
            store.completed_manifests().is_empty(),
            "nothing forwarded to the backend"
        );
    }

    #[tokio::test]
    async fn test_should_abort_client_driven_upload() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store.clone(), small_config());

        proxy
            .abort_multipart_upload("k", "upload-1")
            .await
            .expect("abort should succeed");
        assert_eq!(store.count_aborts(), 1);
    }

    #[tokio::test]
    async fn test_should_require_upload_id_for_session_calls() {
        let store = Arc::new(MockStore::default());
        let proxy = proxy_with(store, small_config());

        let err = proxy
            .abort_multipart_upload("k", "")
            .await
            .expect_err("empty upload id must be rejected");
        assert_eq!(err.error_code(), "InvalidRequest");
    }
}

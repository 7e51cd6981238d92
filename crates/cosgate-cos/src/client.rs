//! The COS REST client.
//!
//! [`CosClient`] implements the proxy's [`ObjectStore`] capability against a
//! single configured COS bucket URL. Request bodies are streamed out and
//! object downloads streamed back; nothing is buffered beyond what the
//! individual operation requires. Every request carries a freshly computed
//! COS signature.

use async_trait::async_trait;
use futures::TryStreamExt;
use url::Url;

use cosgate_core::config::ProxyConfig;
use cosgate_core::store::{
    CompletedUpload, GetOptions, ObjectDownload, ObjectStore, PutOptions, PutResult,
};
use cosgate_core::translate::unquote_etag;
use cosgate_model::error::ProxyError;
use cosgate_model::request::StreamingBlob;
use cosgate_model::types::{
    CompleteMultipartUploadResult, CompletedMultipartUpload, CompletedPart,
    InitiateMultipartUploadResult,
};
use cosgate_xml::{from_xml, to_xml};

use crate::auth::{CosCredentials, sign_request};
use crate::error::parse_backend_error;

/// Allowance for clock skew between the proxy and COS, in seconds.
const SIGN_CLOCK_SKEW: i64 = 60;

/// How long each computed signature stays valid, in seconds.
const SIGN_VALIDITY: i64 = 3600;

/// A COS backend bound to one bucket URL.
#[derive(Debug, Clone)]
pub struct CosClient {
    http: reqwest::Client,
    bucket_url: Url,
    host: String,
    credentials: CosCredentials,
}

impl CosClient {
    /// Create a client for the given bucket URL and credentials.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the bucket URL does not parse or the
    /// HTTP client cannot be constructed.
    pub fn new(bucket_url: &str, credentials: CosCredentials) -> Result<Self, ProxyError> {
        let bucket_url = Url::parse(bucket_url).map_err(ProxyError::transport)?;
        let host = match (bucket_url.host_str(), bucket_url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_owned(),
            (None, _) => {
                return Err(ProxyError::transport(std::io::Error::other(
                    "bucket URL has no host",
                )));
            }
        };
        let http = reqwest::Client::builder()
            .build()
            .map_err(ProxyError::transport)?;

        Ok(Self {
            http,
            bucket_url,
            host,
            credentials,
        })
    }

    /// Create a client from the proxy configuration.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the configured bucket URL is invalid.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ProxyError> {
        Self::new(
            &config.cos_bucket_url,
            CosCredentials::new(config.cos_secret_id.clone(), config.cos_secret_key.clone()),
        )
    }

    /// Build the object URL for a key and query pairs.
    fn object_url(&self, key: &str, query: &[(String, String)]) -> Url {
        let mut url = self.bucket_url.clone();
        url.set_path(&format!("/{key}"));
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                if v.is_empty() {
                    pairs.append_key_only(k);
                } else {
                    pairs.append_pair(k, v);
                }
            }
        }
        url
    }

    /// Compute the `Authorization` value for one request.
    fn authorization(
        &self,
        method: &http::Method,
        url: &Url,
        query: &[(String, String)],
    ) -> String {
        let now = chrono::Utc::now().timestamp();
        sign_request(
            &self.credentials,
            method,
            url.path(),
            query,
            &self.host,
            now - SIGN_CLOCK_SKEW,
            now + SIGN_VALIDITY,
        )
    }

    /// Send a request and turn a non-success response into the proxy error
    /// taxonomy: a parseable COS error envelope keeps its code, message,
    /// request id, and status; anything else is a transport failure.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ProxyError> {
        let response = request.send().await.map_err(ProxyError::transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        match parse_backend_error(status, &body) {
            Some(backend_err) => {
                tracing::warn!(
                    code = %backend_err.code,
                    status = %status,
                    request_id = ?backend_err.request_id,
                    "backend rejected request"
                );
                Err(ProxyError::Backend(backend_err))
            }
            None => Err(ProxyError::transport(std::io::Error::other(format!(
                "backend returned {status} with an unrecognized body"
            )))),
        }
    }

    /// Apply write options (content type and metadata headers) to a request.
    fn apply_put_options(
        mut request: reqwest::RequestBuilder,
        opts: &PutOptions,
    ) -> reqwest::RequestBuilder {
        if let Some(ct) = &opts.content_type {
            request = request.header(http::header::CONTENT_TYPE, ct);
        }
        for (name, value) in &opts.metadata {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }
}

/// Extract the unquoted ETag from backend response headers.
fn etag_from_headers(headers: &http::HeaderMap) -> Result<String, ProxyError> {
    headers
        .get(http::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|etag| unquote_etag(etag).to_owned())
        .ok_or_else(|| {
            ProxyError::transport(std::io::Error::other("backend response is missing an ETag"))
        })
}

#[async_trait]
impl ObjectStore for CosClient {
    async fn put(
        &self,
        key: &str,
        body: StreamingBlob,
        opts: PutOptions,
    ) -> Result<PutResult, ProxyError> {
        let query: Vec<(String, String)> = Vec::new();
        let url = self.object_url(key, &query);
        let auth = self.authorization(&http::Method::PUT, &url, &query);

        let mut request = self
            .http
            .put(url)
            .header(http::header::AUTHORIZATION, auth);
        request = Self::apply_put_options(request, &opts);
        if let Some(len) = body.content_length {
            request = request.header(http::header::CONTENT_LENGTH, len);
        }

        let response = self
            .execute(request.body(reqwest::Body::wrap_stream(body.stream)))
            .await?;
        let e_tag = etag_from_headers(response.headers())?;
        Ok(PutResult { e_tag })
    }

    async fn get(&self, key: &str, opts: GetOptions) -> Result<ObjectDownload, ProxyError> {
        let query: Vec<(String, String)> = Vec::new();
        let url = self.object_url(key, &query);
        let auth = self.authorization(&http::Method::GET, &url, &query);

        let mut request = self
            .http
            .get(url)
            .header(http::header::AUTHORIZATION, auth);
        if let Some(range) = &opts.range {
            request = request.header(http::header::RANGE, range);
        }

        let response = self.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let content_length = response.content_length();
        let body = StreamingBlob::new(
            response.bytes_stream().map_err(std::io::Error::other),
            content_length,
        );

        Ok(ObjectDownload {
            status,
            headers,
            body,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), ProxyError> {
        let query: Vec<(String, String)> = Vec::new();
        let url = self.object_url(key, &query);
        let auth = self.authorization(&http::Method::DELETE, &url, &query);

        self.execute(
            self.http
                .delete(url)
                .header(http::header::AUTHORIZATION, auth),
        )
        .await?;
        Ok(())
    }

    async fn initiate_multipart_upload(
        &self,
        key: &str,
        opts: PutOptions,
    ) -> Result<String, ProxyError> {
        let query = vec![("uploads".to_owned(), String::new())];
        let url = self.object_url(key, &query);
        let auth = self.authorization(&http::Method::POST, &url, &query);

        let mut request = self
            .http
            .post(url)
            .header(http::header::AUTHORIZATION, auth);
        request = Self::apply_put_options(request, &opts);

        let response = self.execute(request).await?;
        let data = response.bytes().await.map_err(ProxyError::transport)?;
        let parsed: InitiateMultipartUploadResult =
            from_xml(&data).map_err(ProxyError::transport)?;
        Ok(parsed.upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: StreamingBlob,
    ) -> Result<String, ProxyError> {
        let query = vec![
            ("partNumber".to_owned(), part_number.to_string()),
            ("uploadId".to_owned(), upload_id.to_owned()),
        ];
        let url = self.object_url(key, &query);
        let auth = self.authorization(&http::Method::PUT, &url, &query);

        let mut request = self
            .http
            .put(url)
            .header(http::header::AUTHORIZATION, auth);
        if let Some(len) = body.content_length {
            request = request.header(http::header::CONTENT_LENGTH, len);
        }

        let response = self
            .execute(request.body(reqwest::Body::wrap_stream(body.stream)))
            .await?;
        etag_from_headers(response.headers())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompletedUpload, ProxyError> {
        let query = vec![("uploadId".to_owned(), upload_id.to_owned())];
        let url = self.object_url(key, &query);
        let auth = self.authorization(&http::Method::POST, &url, &query);

        let manifest = CompletedMultipartUpload {
            parts: parts.to_vec(),
        };
        let body = to_xml("CompleteMultipartUpload", &manifest).map_err(ProxyError::transport)?;

        let response = self
            .execute(
                self.http
                    .post(url)
                    .header(http::header::AUTHORIZATION, auth)
                    .header(http::header::CONTENT_TYPE, "application/xml")
                    .body(body),
            )
            .await?;
        let data = response.bytes().await.map_err(ProxyError::transport)?;
        let parsed: CompleteMultipartUploadResult =
            from_xml(&data).map_err(ProxyError::transport)?;

        Ok(CompletedUpload {
            location: parsed.location,
            e_tag: unquote_etag(&parsed.e_tag).to_owned(),
        })
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), ProxyError> {
        let query = vec![("uploadId".to_owned(), upload_id.to_owned())];
        let url = self.object_url(key, &query);
        let auth = self.authorization(&http::Method::DELETE, &url, &query);

        self.execute(
            self.http
                .delete(url)
                .header(http::header::AUTHORIZATION, auth),
        )
        .await?;
        Ok(())
    }
}

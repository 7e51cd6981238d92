//! Typed output to HTTP response conversion.
//!
//! [`IntoProxyResponse`] turns the operation handlers' typed outputs into
//! HTTP responses. ETag values arriving here are already quoted for the S3
//! surface; this layer only places them. Errors are rendered into the S3
//! `<Error>` envelope by [`error_to_response`].

use bytes::Bytes;
use http::header::HeaderValue;

use cosgate_model::error::ProxyError;
use cosgate_model::types::{
    CompleteMultipartUploadResult, GetObjectOutput, InitiateMultipartUploadResult,
    PutObjectOutput, UploadPartOutput,
};
use cosgate_xml::{S3Serialize, to_xml};

use crate::body::ResponseBody;

/// Trait for converting a typed operation output into an HTTP response.
pub trait IntoProxyResponse {
    /// Convert this output into an HTTP response.
    ///
    /// # Errors
    ///
    /// Returns a `ProxyError` if the response cannot be constructed (e.g.
    /// serialization failure or an invalid header value).
    fn into_proxy_response(self) -> Result<http::Response<ResponseBody>, ProxyError>;
}

/// Build a 200 response with an XML body.
fn xml_response<T: S3Serialize>(
    root: &str,
    value: &T,
) -> Result<http::Response<ResponseBody>, ProxyError> {
    let xml = to_xml(root, value).map_err(ProxyError::transport)?;
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header("Content-Type", "application/xml")
        .body(ResponseBody::from_xml(xml))
        .map_err(ProxyError::transport)
}

/// Build an empty 204 response.
fn no_content_response() -> Result<http::Response<ResponseBody>, ProxyError> {
    http::Response::builder()
        .status(http::StatusCode::NO_CONTENT)
        .body(ResponseBody::empty())
        .map_err(ProxyError::transport)
}

impl IntoProxyResponse for PutObjectOutput {
    fn into_proxy_response(self) -> Result<http::Response<ResponseBody>, ProxyError> {
        let mut builder = http::Response::builder().status(http::StatusCode::OK);
        if let Some(etag) = &self.e_tag {
            if let Ok(hv) = HeaderValue::from_str(etag) {
                builder = builder.header("ETag", hv);
            }
        }
        builder
            .body(ResponseBody::empty())
            .map_err(ProxyError::transport)
    }
}

impl IntoProxyResponse for UploadPartOutput {
    fn into_proxy_response(self) -> Result<http::Response<ResponseBody>, ProxyError> {
        let hv = HeaderValue::from_str(&self.e_tag)
            .map_err(|_| ProxyError::transport(std::io::Error::other("invalid ETag header")))?;
        http::Response::builder()
            .status(http::StatusCode::OK)
            .header("ETag", hv)
            .body(ResponseBody::empty())
            .map_err(ProxyError::transport)
    }
}

impl IntoProxyResponse for GetObjectOutput {
    fn into_proxy_response(self) -> Result<http::Response<ResponseBody>, ProxyError> {
        let mut response = http::Response::builder()
            .status(self.status)
            .body(ResponseBody::from_blob(self.body))
            .map_err(ProxyError::transport)?;
        *response.headers_mut() = self.headers;
        Ok(response)
    }
}

impl IntoProxyResponse for InitiateMultipartUploadResult {
    fn into_proxy_response(self) -> Result<http::Response<ResponseBody>, ProxyError> {
        xml_response("InitiateMultipartUploadResult", &self)
    }
}

impl IntoProxyResponse for CompleteMultipartUploadResult {
    fn into_proxy_response(self) -> Result<http::Response<ResponseBody>, ProxyError> {
        xml_response("CompleteMultipartUploadResult", &self)
    }
}

/// 204 No Content, used by delete and abort.
impl IntoProxyResponse for () {
    fn into_proxy_response(self) -> Result<http::Response<ResponseBody>, ProxyError> {
        no_content_response()
    }
}

/// Render an error into the S3 `<Error>` envelope response.
///
/// Backend errors keep their original status and request id; everything else
/// carries the proxy's own request id.
#[must_use]
pub fn error_to_response(err: &ProxyError, request_id: &str) -> http::Response<ResponseBody> {
    let request_id = err.backend_request_id().unwrap_or(request_id);
    let xml = cosgate_xml::error_to_xml(err.error_code(), &err.error_message(), Some(request_id));

    http::Response::builder()
        .status(err.status_code())
        .header("Content-Type", "application/xml; charset=utf-8")
        .body(ResponseBody::from_bytes(Bytes::from(xml)))
        .unwrap_or_else(|_| {
            http::Response::builder()
                .status(http::StatusCode::INTERNAL_SERVER_ERROR)
                .body(ResponseBody::empty())
                .expect("static response should be valid")
        })
}

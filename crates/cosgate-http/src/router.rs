//! Request routing: address resolution and operation classification.
//!
//! The [`Router`] maps an incoming HTTP request to exactly one
//! [`ProxyOperation`] by examining, in fixed precedence order:
//!
//! 1. The `uploads` query marker (initiate a multipart upload)
//! 2. The `uploadId` query marker (part upload / complete / abort, by method)
//! 3. The HTTP method alone (get / put / form post / delete)
//!
//! The precedence is load-bearing: a PUT that carries `uploadId` is always an
//! `UploadPart`, never a simple object write.
//!
//! Addressing supports both styles: virtual-hosted (`bucket.<base-domain>`,
//! the whole path is the key) and path-style (`/bucket/key...`). The resolver
//! performs no validation; operations that require an object reject an empty
//! key themselves.

use http::Method;
use percent_encoding::percent_decode_str;

use cosgate_model::error::ProxyError;
use cosgate_model::operations::ProxyOperation;

/// Configuration for request routing.
#[derive(Debug, Clone, Default)]
pub struct Router {
    /// The base domain for virtual-hosted-style addressing, e.g.
    /// `proxy.example.com`. When unset, only path-style addressing applies.
    pub base_domain: Option<String>,
}

/// The result of routing an HTTP request.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    /// The resolved bucket name (may be empty for form posts to `/`).
    pub bucket: String,
    /// The resolved object key (may be empty; form posts carry the key in a
    /// form field instead).
    pub key: String,
    /// The identified operation.
    pub operation: ProxyOperation,
    /// Parsed query parameters from the request URI.
    pub query_params: Vec<(String, String)>,
}

impl RoutingContext {
    /// Look up a query parameter by name.
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<&str> {
        query_value(&self.query_params, name)
    }
}

impl Router {
    /// Create a router with the given virtual-hosting base domain.
    #[must_use]
    pub fn new(base_domain: Option<String>) -> Self {
        // An empty domain means virtual hosting is off.
        let base_domain = base_domain.filter(|d| !d.is_empty());
        Self { base_domain }
    }

    /// Resolve an HTTP request to a routing context.
    ///
    /// # Errors
    ///
    /// Returns a client error if the method cannot be classified (unsupported
    /// method, or an upload-session marker combined with a method that has no
    /// multipart meaning).
    pub fn resolve<B>(&self, req: &http::Request<B>) -> Result<RoutingContext, ProxyError> {
        let query_params = parse_query_params(req.uri().query().unwrap_or(""));

        let host = req
            .headers()
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let (bucket, key) = self.resolve_address(host, req.uri().path());

        let operation = classify_operation(req.method(), &query_params)?;

        Ok(RoutingContext {
            bucket,
            key,
            operation,
            query_params,
        })
    }

    /// Derive `(bucket, key)` from host and path.
    ///
    /// Virtual-hosted style wins when the host (minus any port) ends with
    /// `"." + base_domain`; the bucket is the stripped prefix and the key is
    /// the path without its leading slash. Otherwise the first path segment
    /// is the bucket and the remainder (possibly empty) is the key.
    #[must_use]
    pub fn resolve_address(&self, host: &str, path: &str) -> (String, String) {
        if let Some(domain) = &self.base_domain {
            let host_without_port = host.split(':').next().unwrap_or(host);
            let suffix = format!(".{domain}");
            if host_without_port.ends_with(&suffix) && host_without_port.len() > suffix.len() {
                let bucket = &host_without_port[..host_without_port.len() - suffix.len()];
                let key = path.strip_prefix('/').unwrap_or(path);
                return (bucket.to_owned(), decode_uri_component(key));
            }
        }

        // Path-style: first segment is the bucket, remainder is the key.
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        match trimmed.split_once('/') {
            Some((bucket, key)) => (decode_uri_component(bucket), decode_uri_component(key)),
            None => (decode_uri_component(trimmed), String::new()),
        }
    }
}

/// Decode a percent-encoded URI component.
fn decode_uri_component(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Parse a query string into key-value pairs.
fn parse_query_params(query: &str) -> Vec<(String, String)> {
    if query.is_empty() {
        return Vec::new();
    }

    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            if let Some(pos) = pair.find('=') {
                let key = decode_uri_component(&pair[..pos]);
                let value = decode_uri_component(&pair[pos + 1..]);
                (key, value)
            } else {
                (decode_uri_component(pair), String::new())
            }
        })
        .collect()
}

/// Check whether a query parameter is present (with or without a value).
fn query_has_key(params: &[(String, String)], key: &str) -> bool {
    params.iter().any(|(k, _)| k == key)
}

/// Get the value of a query parameter by name.
fn query_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Classify the request into exactly one operation.
fn classify_operation(
    method: &Method,
    params: &[(String, String)],
) -> Result<ProxyOperation, ProxyError> {
    // 1. Initiate marker takes precedence over everything else.
    if query_has_key(params, "uploads") {
        return Ok(ProxyOperation::CreateMultipartUpload);
    }

    // 2. An upload-session marker binds PUT/POST/DELETE to the multipart
    //    protocol; any other method with the marker is a client error.
    if query_has_key(params, "uploadId") {
        return match *method {
            Method::PUT => Ok(ProxyOperation::UploadPart),
            Method::POST => Ok(ProxyOperation::CompleteMultipartUpload),
            Method::DELETE => Ok(ProxyOperation::AbortMultipartUpload),
            _ => Err(ProxyError::invalid_request(format!(
                "method {method} is not valid for an upload session"
            ))),
        };
    }

    // 3. Plain single-object operations by method.
    match *method {
        Method::GET => Ok(ProxyOperation::GetObject),
        Method::PUT => Ok(ProxyOperation::PutObject),
        Method::POST => Ok(ProxyOperation::PostObject),
        Method::DELETE => Ok(ProxyOperation::DeleteObject),
        _ => Err(ProxyError::method_not_allowed(method)),
    }
}

#[cfg(test)]
mod tests {
    use cosgate_model::error::ClientErrorCode;
    use http::Request;

    use super::*;

    fn router() -> Router {
        Router::new(Some("example.com".to_owned()))
    }

    fn path_style_router() -> Router {
        Router::new(None)
    }

    fn request(method: Method, host: &str, uri: &str) -> Request<()> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Host", host)
            .body(())
            .expect("valid request")
    }

    // --- Address resolution ---

    #[test]
    fn test_should_resolve_virtual_hosted_address() {
        let (bucket, key) = router().resolve_address("mybucket.example.com", "/a/b.txt");
        assert_eq!(bucket, "mybucket");
        assert_eq!(key, "a/b.txt");
    }

    #[test]
    fn test_should_strip_port_before_matching_domain() {
        let (bucket, key) = router().resolve_address("mybucket.example.com:8080", "/a/b.txt");
        assert_eq!(bucket, "mybucket");
        assert_eq!(key, "a/b.txt");
    }

    #[test]
    fn test_should_fall_back_to_path_style() {
        let (bucket, key) = router().resolve_address("other-host", "/mybucket/a/b.txt");
        assert_eq!(bucket, "mybucket");
        assert_eq!(key, "a/b.txt");
    }

    #[test]
    fn test_should_resolve_path_style_without_domain() {
        let (bucket, key) = path_style_router().resolve_address("anything", "/mybucket/a/b.txt");
        assert_eq!(bucket, "mybucket");
        assert_eq!(key, "a/b.txt");
    }

    #[test]
    fn test_should_allow_empty_key_in_path_style() {
        let (bucket, key) = path_style_router().resolve_address("h", "/mybucket");
        assert_eq!(bucket, "mybucket");
        assert_eq!(key, "");
    }

    #[test]
    fn test_should_not_treat_bare_domain_as_bucket() {
        // Host equals the base domain itself: no bucket prefix to strip.
        let (bucket, key) = router().resolve_address("example.com", "/mybucket/k");
        assert_eq!(bucket, "mybucket");
        assert_eq!(key, "k");
    }

    #[test]
    fn test_should_decode_percent_encoded_key() {
        let (_, key) = path_style_router().resolve_address("h", "/b/my%20key%2Bx");
        assert_eq!(key, "my key+x");
    }

    #[test]
    fn test_should_keep_empty_virtual_hosted_key() {
        let (bucket, key) = router().resolve_address("mybucket.example.com", "/");
        assert_eq!(bucket, "mybucket");
        assert_eq!(key, "");
    }

    // --- Operation classification precedence ---

    #[test]
    fn test_should_classify_initiate_before_method() {
        let req = request(Method::POST, "h", "/b/k?uploads");
        let ctx = path_style_router().resolve(&req).expect("should resolve");
        assert_eq!(ctx.operation, ProxyOperation::CreateMultipartUpload);
    }

    #[test]
    fn test_should_classify_put_with_upload_id_as_upload_part() {
        let req = request(Method::PUT, "h", "/b/k?partNumber=2&uploadId=abc");
        let ctx = path_style_router().resolve(&req).expect("should resolve");
        assert_eq!(ctx.operation, ProxyOperation::UploadPart);
        assert_eq!(ctx.query_value("partNumber"), Some("2"));
        assert_eq!(ctx.query_value("uploadId"), Some("abc"));
    }

    #[test]
    fn test_should_classify_post_with_upload_id_as_complete() {
        let req = request(Method::POST, "h", "/b/k?uploadId=abc");
        let ctx = path_style_router().resolve(&req).expect("should resolve");
        assert_eq!(ctx.operation, ProxyOperation::CompleteMultipartUpload);
    }

    #[test]
    fn test_should_classify_delete_with_upload_id_as_abort() {
        let req = request(Method::DELETE, "h", "/b/k?uploadId=abc");
        let ctx = path_style_router().resolve(&req).expect("should resolve");
        assert_eq!(ctx.operation, ProxyOperation::AbortMultipartUpload);
    }

    #[test]
    fn test_should_reject_get_with_upload_id() {
        let req = request(Method::GET, "h", "/b/k?uploadId=abc");
        let err = path_style_router().resolve(&req).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Client {
                code: ClientErrorCode::InvalidRequest,
                ..
            }
        ));
    }

    #[test]
    fn test_should_classify_plain_methods() {
        let router = path_style_router();
        for (method, expected) in [
            (Method::GET, ProxyOperation::GetObject),
            (Method::PUT, ProxyOperation::PutObject),
            (Method::POST, ProxyOperation::PostObject),
            (Method::DELETE, ProxyOperation::DeleteObject),
        ] {
            let req = request(method, "h", "/b/k");
            let ctx = router.resolve(&req).expect("should resolve");
            assert_eq!(ctx.operation, expected);
        }
    }

    #[test]
    fn test_should_reject_unsupported_method() {
        let req = request(Method::PATCH, "h", "/b/k");
        let err = path_style_router().resolve(&req).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Client {
                code: ClientErrorCode::MethodNotAllowed,
                ..
            }
        ));
    }

    #[test]
    fn test_should_resolve_virtual_hosted_upload_part() {
        let req = request(
            Method::PUT,
            "media.example.com",
            "/videos/a.mp4?partNumber=1&uploadId=u1",
        );
        let ctx = router().resolve(&req).expect("should resolve");
        assert_eq!(ctx.bucket, "media");
        assert_eq!(ctx.key, "videos/a.mp4");
        assert_eq!(ctx.operation, ProxyOperation::UploadPart);
    }

    // --- Query parsing ---

    #[test]
    fn test_should_parse_query_params() {
        let params = parse_query_params("partNumber=3&uploadId=u%201&uploads");
        assert_eq!(query_value(&params, "partNumber"), Some("3"));
        assert_eq!(query_value(&params, "uploadId"), Some("u 1"));
        assert!(query_has_key(&params, "uploads"));
        assert_eq!(query_value(&params, "uploads"), Some(""));
    }

    #[test]
    fn test_should_handle_empty_query_string() {
        assert!(parse_query_params("").is_empty());
    }
}

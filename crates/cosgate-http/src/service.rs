//! The main proxy HTTP service implementing hyper's `Service` trait.
//!
//! [`ProxyHttpService`] ties the pipeline together for every connection:
//!
//! 1. Health check interception (`GET /_health`)
//! 2. Client credential stripping (any `Authorization` header is discarded;
//!    trust is established out-of-band)
//! 3. IP allow-list enforcement for mutating methods
//! 4. Routing and operation classification via [`Router`]
//! 5. Dispatch to the [`ProxyHandler`] with the body as a stream
//! 6. Common response headers (`x-amz-request-id`, `Server`)
//! 7. Error envelope formatting

use std::collections::HashSet;
use std::convert::Infallible;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use hyper::body::Incoming;
use hyper::service::Service;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cosgate_model::error::ProxyError;
use cosgate_model::request::StreamingBlob;

use crate::body::ResponseBody;
use crate::dispatch::{ProxyHandler, dispatch_operation};
use crate::response::error_to_response;
use crate::router::Router;

/// Configuration for the proxy HTTP service.
#[derive(Debug, Clone, Default)]
pub struct ProxyHttpConfig {
    /// Base domain for virtual-hosted-style addressing, if any.
    pub base_domain: Option<String>,
    /// IPs allowed to perform mutating operations. An empty set disables the
    /// allow-list entirely.
    pub allowed_ips: HashSet<String>,
}

/// The proxy HTTP service.
///
/// One clone serves each connection; the accept loop attaches the peer
/// address via [`with_peer_ip`](Self::with_peer_ip) so the allow-list can
/// fall back to it when no `X-Real-IP` header is present.
#[derive(Debug)]
pub struct ProxyHttpService<H: ProxyHandler> {
    handler: Arc<H>,
    router: Router,
    config: Arc<ProxyHttpConfig>,
    peer_ip: Option<IpAddr>,
}

impl<H: ProxyHandler> ProxyHttpService<H> {
    /// Create a new service with the given handler and configuration.
    #[must_use]
    pub fn new(handler: H, config: ProxyHttpConfig) -> Self {
        Self::from_shared(Arc::new(handler), config)
    }

    /// Create a new service from a shared handler.
    #[must_use]
    pub fn from_shared(handler: Arc<H>, config: ProxyHttpConfig) -> Self {
        let router = Router::new(config.base_domain.clone());
        Self {
            handler,
            router,
            config: Arc::new(config),
            peer_ip: None,
        }
    }

    /// Attach the remote peer's address for this connection.
    #[must_use]
    pub fn with_peer_ip(&self, peer_ip: IpAddr) -> Self {
        Self {
            peer_ip: Some(peer_ip),
            ..self.clone()
        }
    }
}

impl<H: ProxyHandler> Clone for ProxyHttpService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            router: self.router.clone(),
            config: Arc::clone(&self.config),
            peer_ip: self.peer_ip,
        }
    }
}

impl<H: ProxyHandler> Service<http::Request<Incoming>> for ProxyHttpService<H> {
    type Response = http::Response<ResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        let router = self.router.clone();
        let config = Arc::clone(&self.config);
        let peer_ip = self.peer_ip;

        Box::pin(async move {
            let request_id = Uuid::new_v4().to_string();
            let response =
                process_request(req, handler.as_ref(), &router, &config, peer_ip, &request_id)
                    .await;
            Ok(add_common_headers(response, &request_id))
        })
    }
}

/// Process one request through the proxy pipeline.
async fn process_request<H: ProxyHandler>(
    mut req: http::Request<Incoming>,
    handler: &H,
    router: &Router,
    config: &ProxyHttpConfig,
    peer_ip: Option<IpAddr>,
    request_id: &str,
) -> http::Response<ResponseBody> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    debug!(%method, %uri, request_id, "processing request");

    // 1. Health check interception.
    if method == http::Method::GET && uri.path() == "/_health" {
        return health_check_response();
    }

    // 2. Client credentials are discarded by design; the backend request is
    //    signed with the proxy's own credentials.
    req.headers_mut().remove(http::header::AUTHORIZATION);

    // 3. Allow-list check for mutating methods.
    if let Err(err) = check_allow_list(&config.allowed_ips, &method, req.headers(), peer_ip) {
        warn!(%method, %uri, request_id, "rejected by allow-list");
        return error_to_response(&err, request_id);
    }

    // 4. Route and classify.
    let ctx = match router.resolve(&req) {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!(%method, %uri, error = %err, request_id, "failed to route request");
            return error_to_response(&err, request_id);
        }
    };

    info!(
        operation = %ctx.operation,
        bucket = %ctx.bucket,
        key = %ctx.key,
        request_id,
        "routed request"
    );

    // 5. Hand the body over as a stream; handlers collect it only when they
    //    need the whole payload.
    let content_length = req
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
    let (parts, incoming) = req.into_parts();
    let body = incoming_to_blob(incoming, content_length);

    // 6. Dispatch.
    match dispatch_operation(handler, parts, body, ctx).await {
        Ok(response) => response,
        Err(err) => {
            debug!(error = %err, request_id, "operation returned error");
            error_to_response(&err, request_id)
        }
    }
}

/// Convert a hyper body into the handler-facing stream wrapper.
fn incoming_to_blob(incoming: Incoming, content_length: Option<u64>) -> StreamingBlob {
    let stream = http_body_util::BodyStream::new(incoming).map(|result| match result {
        // Trailer frames carry no data and collapse to empty chunks.
        Ok(frame) => Ok(frame.into_data().unwrap_or_default()),
        Err(e) => Err(std::io::Error::other(e)),
    });
    StreamingBlob::new(stream, content_length)
}

/// Enforce the IP allow-list.
///
/// Read-only methods always pass. Mutating methods require the client IP
/// (the `X-Real-IP` header set by the fronting proxy, falling back to the
/// connection's peer address) to be present in the configured set. An empty
/// set disables enforcement.
fn check_allow_list(
    allowed_ips: &HashSet<String>,
    method: &http::Method,
    headers: &http::HeaderMap,
    peer_ip: Option<IpAddr>,
) -> Result<(), ProxyError> {
    if allowed_ips.is_empty() {
        return Ok(());
    }
    if *method == http::Method::GET || *method == http::Method::HEAD {
        return Ok(());
    }

    let client_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .or_else(|| peer_ip.map(|ip| ip.to_string()));

    match client_ip {
        Some(ip) if allowed_ips.contains(&ip) => Ok(()),
        Some(ip) => Err(ProxyError::access_denied(format!(
            "IP {ip} is not allowed to perform {method}"
        ))),
        None => Err(ProxyError::access_denied(
            "could not determine client IP for a mutating request",
        )),
    }
}

/// Produce the health check response.
fn health_check_response() -> http::Response<ResponseBody> {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(ResponseBody::from_string(
            r#"{"status":"running","service":"cosgate"}"#,
        ))
        .expect("static health response should be valid")
}

/// Add common response headers to every response.
fn add_common_headers(
    mut response: http::Response<ResponseBody>,
    request_id: &str,
) -> http::Response<ResponseBody> {
    let headers = response.headers_mut();

    if let Ok(hv) = http::header::HeaderValue::from_str(request_id) {
        headers.insert("x-amz-request-id", hv);
    }
    headers.insert("Server", http::header::HeaderValue::from_static("cosgate"));

    response
}

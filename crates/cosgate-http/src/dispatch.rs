//! Operation dispatch: the boundary between the HTTP layer and the handlers.
//!
//! [`ProxyHandler`] is implemented by the application over the core proxy
//! logic. The HTTP service resolves and classifies each request, then hands
//! the raw parts, the body stream, and the routing context to the handler.
//! Bodies are never buffered here: the upload paths consume them chunk by
//! chunk, and only handlers that need a whole payload collect it.

use std::future::Future;
use std::pin::Pin;

use cosgate_model::error::ProxyError;
use cosgate_model::operations::ProxyOperation;
use cosgate_model::request::StreamingBlob;

use crate::body::ResponseBody;
use crate::router::RoutingContext;

/// Trait the operation handler implements.
///
/// Uses boxed futures so the service can hold the handler behind `Arc<H>`
/// without generic future plumbing.
pub trait ProxyHandler: Send + Sync + 'static {
    /// Handle a classified operation and produce an HTTP response.
    fn handle_operation(
        &self,
        op: ProxyOperation,
        parts: http::request::Parts,
        body: StreamingBlob,
        ctx: RoutingContext,
    ) -> Pin<Box<dyn Future<Output = Result<http::Response<ResponseBody>, ProxyError>> + Send>>;
}

/// Dispatch a routed request to the handler.
pub async fn dispatch_operation<H: ProxyHandler>(
    handler: &H,
    parts: http::request::Parts,
    body: StreamingBlob,
    ctx: RoutingContext,
) -> Result<http::Response<ResponseBody>, ProxyError> {
    let op = ctx.operation;
    tracing::debug!(operation = %op, bucket = %ctx.bucket, key = %ctx.key, "dispatching operation");
    handler.handle_operation(op, parts, body, ctx).await
}

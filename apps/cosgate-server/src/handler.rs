//! Operation handler implementation bridging the HTTP layer to [`CosProxy`].
//!
//! Each classified operation is dispatched to the corresponding `CosProxy`
//! method: query markers and headers are extracted here, typed outputs are
//! serialized via [`IntoProxyResponse`]. Only the operations that need a
//! whole payload (form posts, completion bodies) collect the body stream.

use std::future::Future;
use std::pin::Pin;

use cosgate_core::CosProxy;
use cosgate_http::body::ResponseBody;
use cosgate_http::dispatch::ProxyHandler;
use cosgate_http::multipart::{extract_boundary, parse_multipart};
use cosgate_http::response::IntoProxyResponse;
use cosgate_http::router::RoutingContext;
use cosgate_model::ProxyOperation;
use cosgate_model::error::ProxyError;
use cosgate_model::request::StreamingBlob;

/// Wrapper implementing [`ProxyHandler`] by delegating to [`CosProxy`].
#[derive(Debug, Clone)]
pub struct CosgateHandler(pub CosProxy);

impl ProxyHandler for CosgateHandler {
    fn handle_operation(
        &self,
        op: ProxyOperation,
        parts: http::request::Parts,
        body: StreamingBlob,
        ctx: RoutingContext,
    ) -> Pin<Box<dyn Future<Output = Result<http::Response<ResponseBody>, ProxyError>> + Send>>
    {
        let proxy = self.0.clone();
        Box::pin(async move {
            match op {
                ProxyOperation::GetObject => {
                    let range = header_str(&parts, http::header::RANGE);
                    proxy
                        .get_object(&ctx.key, range)
                        .await?
                        .into_proxy_response()
                }

                ProxyOperation::PutObject => proxy
                    .put_object(&ctx.key, &parts.headers, body)
                    .await?
                    .into_proxy_response(),

                ProxyOperation::DeleteObject => {
                    proxy.delete_object(&ctx.key).await?;
                    ().into_proxy_response()
                }

                ProxyOperation::PostObject => {
                    let content_type =
                        header_str(&parts, http::header::CONTENT_TYPE).ok_or_else(|| {
                            ProxyError::invalid_request("POST upload requires a Content-Type")
                        })?;
                    let boundary = extract_boundary(&content_type)?;
                    let data = body.collect().await?;
                    let form = parse_multipart(&data, &boundary)?;
                    let key = form.fields.get("key").cloned().unwrap_or_default();

                    proxy
                        .post_object(
                            &key,
                            form.file_name.as_deref(),
                            form.file_content_type.as_deref(),
                            &parts.headers,
                            form.file_data,
                        )
                        .await?
                        .into_proxy_response()
                }

                ProxyOperation::CreateMultipartUpload => proxy
                    .create_multipart_upload(&ctx.bucket, &ctx.key, &parts.headers)
                    .await?
                    .into_proxy_response(),

                ProxyOperation::UploadPart => {
                    let upload_id = ctx.query_value("uploadId").unwrap_or_default().to_owned();
                    let part_number = ctx.query_value("partNumber").map(ToOwned::to_owned);
                    proxy
                        .upload_part(&ctx.key, &upload_id, part_number.as_deref(), body)
                        .await?
                        .into_proxy_response()
                }

                ProxyOperation::CompleteMultipartUpload => {
                    let upload_id = ctx.query_value("uploadId").unwrap_or_default().to_owned();
                    let data = body.collect().await?;
                    proxy
                        .complete_multipart_upload(&ctx.bucket, &ctx.key, &upload_id, data)
                        .await?
                        .into_proxy_response()
                }

                ProxyOperation::AbortMultipartUpload => {
                    let upload_id = ctx.query_value("uploadId").unwrap_or_default().to_owned();
                    proxy.abort_multipart_upload(&ctx.key, &upload_id).await?;
                    ().into_proxy_response()
                }
            }
        })
    }
}

/// Extract a header value as an owned string.
fn header_str(parts: &http::request::Parts, name: http::header::HeaderName) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
}

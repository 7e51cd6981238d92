//! cosgate server — S3-compatible reverse proxy for Tencent COS.
//!
//! Exposes the S3 wire dialect to clients and forwards operations to a
//! configured COS bucket, translating addressing styles, metadata headers,
//! ETag quoting, XML envelopes, and error shapes in both directions. Large
//! and unsized PUT bodies are uploaded through a bounded-concurrency
//! multipart pipeline.
//!
//! # Usage
//!
//! ```text
//! COS_BUCKET_URL=https://media-125….myqcloud.com \
//! COS_SECRET_ID=… COS_SECRET_KEY=… cosgate-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LISTEN` | `0.0.0.0:8080` | Bind address |
//! | `COS_BUCKET_URL` | *(required)* | Backend bucket URL |
//! | `COS_SECRET_ID` | *(required)* | Backend secret id |
//! | `COS_SECRET_KEY` | *(required)* | Backend secret key |
//! | `BASE_DOMAIN` | *(unset)* | Virtual-hosted addressing domain |
//! | `PART_SIZE` | `8388608` | Multipart part size in bytes |
//! | `UPLOAD_CONCURRENCY` | `5` | Part upload worker count |
//! | `SIMPLE_UPLOAD_THRESHOLD` | `5242880` | Simple-put cutoff in bytes |
//! | `STREAMING_PUT_POLICY` | `multipart` | `multipart` or `reject` |
//! | `WHITELIST_IPS` | *(empty)* | Comma-separated write allow-list |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained filter (overrides `LOG_LEVEL`) |

mod handler;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cosgate_core::{CosProxy, ObjectStore, ProxyConfig};
use cosgate_cos::CosClient;
use cosgate_http::service::{ProxyHttpConfig, ProxyHttpService};

use crate::handler::CosgateHandler;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config
/// value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Build the HTTP service configuration from the proxy configuration.
fn build_http_config(config: &ProxyConfig) -> ProxyHttpConfig {
    ProxyHttpConfig {
        base_domain: config.base_domain.clone(),
        allowed_ips: config.whitelist_ips.iter().cloned().collect(),
    }
}

/// Run the accept loop, serving connections until a shutdown signal arrives.
async fn serve(
    listener: TcpListener,
    service: ProxyHttpService<CosgateHandler>,
) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.with_peer_ip(peer_addr.ip());
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    // Wait for in-flight requests to complete.
    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ProxyConfig::from_env();

    init_tracing(&config.log_level)?;

    if config.cos_bucket_url.is_empty()
        || config.cos_secret_id.is_empty()
        || config.cos_secret_key.is_empty()
    {
        anyhow::bail!(
            "missing required environment variables: COS_BUCKET_URL, COS_SECRET_ID, COS_SECRET_KEY"
        );
    }

    info!(
        listen = %config.listen,
        cos_bucket_url = %config.cos_bucket_url,
        base_domain = ?config.base_domain,
        part_size = config.part_size,
        upload_concurrency = config.upload_concurrency,
        whitelist_ips = config.whitelist_ips.len(),
        version = VERSION,
        "starting cosgate server",
    );

    let config = Arc::new(config);
    let store: Arc<dyn ObjectStore> = Arc::new(
        CosClient::from_config(&config)
            .map_err(|e| anyhow::anyhow!("failed to build COS client: {e}"))?,
    );
    let proxy = CosProxy::new(store, Arc::clone(&config));
    let handler = CosgateHandler(proxy);
    let service = ProxyHttpService::new(handler, build_http_config(&config));

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve(listener, service).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_build_http_config_from_proxy_config() {
        let config = ProxyConfig::builder()
            .base_domain(Some("proxy.example.com".to_owned()))
            .whitelist_ips(vec!["10.0.0.1".to_owned(), "10.0.0.2".to_owned()])
            .build();
        let http_config = build_http_config(&config);

        assert_eq!(http_config.base_domain.as_deref(), Some("proxy.example.com"));
        assert_eq!(http_config.allowed_ips.len(), 2);
        assert!(http_config.allowed_ips.contains("10.0.0.1"));
    }
}

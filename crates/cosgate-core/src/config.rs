//! Proxy configuration.
//!
//! All configuration is environment-driven and loaded once at startup; the
//! resulting [`ProxyConfig`] value is passed into the dispatcher explicitly —
//! there is no global mutable state.

use std::fmt;
use std::str::FromStr;

use typed_builder::TypedBuilder;

/// Default part size for coordinator-driven multipart uploads: 8 MiB.
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Default worker count for concurrent part uploads.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 5;

/// Default threshold below which a sized PUT body goes through a single
/// backend put instead of the multipart path: 5 MiB.
pub const DEFAULT_SIMPLE_UPLOAD_THRESHOLD: u64 = 5 * 1024 * 1024;

/// What to do with a PUT body whose length is unknown (chunked transfer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamingPutPolicy {
    /// Transparently fall back to the multipart upload path.
    #[default]
    Multipart,
    /// Reject the request with `411 MissingContentLength`.
    Reject,
}

impl FromStr for StreamingPutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "multipart" => Ok(Self::Multipart),
            "reject" => Ok(Self::Reject),
            other => Err(format!("invalid streaming put policy: {other}")),
        }
    }
}

/// Proxy configuration.
///
/// Construct via [`ProxyConfig::from_env`] in the binary, or via the builder
/// in tests.
#[derive(Clone, TypedBuilder)]
pub struct ProxyConfig {
    /// Bind address for the proxy listener.
    #[builder(default = String::from("0.0.0.0:8080"))]
    pub listen: String,

    /// Base URL of the backend COS bucket, e.g.
    /// `https://media-1250000000.cos.ap-guangzhou.myqcloud.com`.
    #[builder(default)]
    pub cos_bucket_url: String,

    /// COS secret id used to sign backend requests.
    #[builder(default)]
    pub cos_secret_id: String,

    /// COS secret key used to sign backend requests.
    #[builder(default)]
    pub cos_secret_key: String,

    /// Base domain for virtual-hosted-style addressing. Empty disables it.
    #[builder(default)]
    pub base_domain: Option<String>,

    /// Part size for coordinator-driven multipart uploads, in bytes.
    #[builder(default = DEFAULT_PART_SIZE)]
    pub part_size: u64,

    /// Worker count for concurrent part uploads.
    #[builder(default = DEFAULT_UPLOAD_CONCURRENCY)]
    pub upload_concurrency: usize,

    /// Sized PUT bodies below this many bytes use a single backend put.
    #[builder(default = DEFAULT_SIMPLE_UPLOAD_THRESHOLD)]
    pub simple_upload_threshold: u64,

    /// Policy for PUT bodies with unknown length.
    #[builder(default)]
    pub streaming_put_policy: StreamingPutPolicy,

    /// IPs allowed to perform mutating operations; empty disables the check.
    #[builder(default)]
    pub whitelist_ips: Vec<String>,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("listen", &self.listen)
            .field("cos_bucket_url", &self.cos_bucket_url)
            .field("cos_secret_id", &self.cos_secret_id)
            .field("cos_secret_key", &"[REDACTED]")
            .field("base_domain", &self.base_domain)
            .field("part_size", &self.part_size)
            .field("upload_concurrency", &self.upload_concurrency)
            .field("simple_upload_threshold", &self.simple_upload_threshold)
            .field("streaming_put_policy", &self.streaming_put_policy)
            .field("whitelist_ips", &self.whitelist_ips)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl ProxyConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `LISTEN` | `0.0.0.0:8080` |
    /// | `COS_BUCKET_URL` | *(empty; required to start)* |
    /// | `COS_SECRET_ID` | *(empty; required to start)* |
    /// | `COS_SECRET_KEY` | *(empty; required to start)* |
    /// | `BASE_DOMAIN` | *(unset; path-style only)* |
    /// | `PART_SIZE` | `8388608` |
    /// | `UPLOAD_CONCURRENCY` | `5` |
    /// | `SIMPLE_UPLOAD_THRESHOLD` | `5242880` |
    /// | `STREAMING_PUT_POLICY` | `multipart` |
    /// | `WHITELIST_IPS` | *(empty; allow-list disabled)* |
    /// | `LOG_LEVEL` | `info` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("LISTEN") {
            config.listen = v;
        }
        if let Ok(v) = std::env::var("COS_BUCKET_URL") {
            config.cos_bucket_url = v;
        }
        if let Ok(v) = std::env::var("COS_SECRET_ID") {
            config.cos_secret_id = v;
        }
        if let Ok(v) = std::env::var("COS_SECRET_KEY") {
            config.cos_secret_key = v;
        }
        if let Ok(v) = std::env::var("BASE_DOMAIN") {
            config.base_domain = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = std::env::var("PART_SIZE") {
            if let Ok(n) = v.parse::<u64>() {
                config.part_size = n;
            }
        }
        if let Ok(v) = std::env::var("UPLOAD_CONCURRENCY") {
            if let Ok(n) = v.parse::<usize>() {
                config.upload_concurrency = n;
            }
        }
        if let Ok(v) = std::env::var("SIMPLE_UPLOAD_THRESHOLD") {
            if let Ok(n) = v.parse::<u64>() {
                config.simple_upload_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("STREAMING_PUT_POLICY") {
            if let Ok(policy) = v.parse() {
                config.streaming_put_policy = policy;
            }
        }
        if let Ok(v) = std::env::var("WHITELIST_IPS") {
            config.whitelist_ips = parse_ip_list(&v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }
}

/// Parse a comma-separated IP list, trimming whitespace and dropping empties.
fn parse_ip_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert_eq!(config.part_size, 8 * 1024 * 1024);
        assert_eq!(config.upload_concurrency, 5);
        assert_eq!(config.simple_upload_threshold, 5 * 1024 * 1024);
        assert_eq!(config.streaming_put_policy, StreamingPutPolicy::Multipart);
        assert!(config.whitelist_ips.is_empty());
        assert!(config.base_domain.is_none());
    }

    #[test]
    fn test_should_build_with_typed_builder() {
        let config = ProxyConfig::builder()
            .listen("127.0.0.1:9999".into())
            .part_size(1024)
            .upload_concurrency(2)
            .streaming_put_policy(StreamingPutPolicy::Reject)
            .build();

        assert_eq!(config.listen, "127.0.0.1:9999");
        assert_eq!(config.part_size, 1024);
        assert_eq!(config.upload_concurrency, 2);
        assert_eq!(config.streaming_put_policy, StreamingPutPolicy::Reject);
    }

    #[test]
    fn test_should_parse_streaming_put_policy() {
        assert_eq!(
            "multipart".parse::<StreamingPutPolicy>(),
            Ok(StreamingPutPolicy::Multipart)
        );
        assert_eq!(
            "Reject".parse::<StreamingPutPolicy>(),
            Ok(StreamingPutPolicy::Reject)
        );
        assert!("drop".parse::<StreamingPutPolicy>().is_err());
    }

    #[test]
    fn test_should_parse_ip_list() {
        let ips = parse_ip_list(" 10.0.0.1, 10.0.0.2 ,,192.168.1.5 ");
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2", "192.168.1.5"]);
        assert!(parse_ip_list("").is_empty());
    }

    #[test]
    fn test_should_redact_secret_key_in_debug_output() {
        let config = ProxyConfig::builder()
            .cos_secret_key("very-secret".into())
            .build();
        let debug_str = format!("{config:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("very-secret"));
    }
}

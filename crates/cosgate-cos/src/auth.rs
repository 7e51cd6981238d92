//! COS request signing.
//!
//! COS authenticates requests with an HMAC-SHA1 scheme. The `Authorization`
//! header has the format:
//!
//! ```text
//! q-sign-algorithm=sha1&q-ak=<SecretId>&q-sign-time=<start;end>
//! &q-key-time=<start;end>&q-header-list=<headers>&q-url-param-list=<params>
//! &q-signature=<signature>
//! ```
//!
//! Where:
//!
//! ```text
//! SignKey      = HexHMAC-SHA1(SecretKey, KeyTime)
//! HttpString   = Method + "\n" + UriPathname + "\n" + HttpParameters + "\n"
//!                + HttpHeaders + "\n"
//! StringToSign = "sha1\n" + KeyTime + "\n" + SHA1-Hex(HttpString) + "\n"
//! Signature    = HexHMAC-SHA1(SignKey, StringToSign)
//! ```
//!
//! Parameter and header names are lowercased and sorted; values are
//! RFC 3986 percent-encoded.

use std::fmt;

use hmac::{Hmac, KeyInit, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha1::{Digest, Sha1};

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters stay literal; everything else is encoded.
const SIGN_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// COS API credentials.
#[derive(Clone)]
pub struct CosCredentials {
    /// The COS secret id (`q-ak`).
    pub secret_id: String,
    /// The COS secret key used for signing.
    pub secret_key: String,
}

impl CosCredentials {
    /// Create a credential pair.
    #[must_use]
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for CosCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosCredentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Build the `Authorization` header value for one COS request.
///
/// `path` is the request's URI pathname as sent on the wire; `query` are the
/// raw query pairs; `host` is signed as the only header. The signature is
/// valid for the `[start, end]` unix-timestamp window.
#[must_use]
pub fn sign_request(
    credentials: &CosCredentials,
    method: &http::Method,
    path: &str,
    query: &[(String, String)],
    host: &str,
    start: i64,
    end: i64,
) -> String {
    let key_time = format!("{start};{end}");
    let sign_key = hmac_sha1_hex(credentials.secret_key.as_bytes(), key_time.as_bytes());

    let (param_list, param_string) = canonicalize(query);
    let headers = [("host".to_owned(), host.to_owned())];
    let (header_list, header_string) = canonicalize(&headers);

    let http_string = format!(
        "{}\n{}\n{}\n{}\n",
        method.as_str().to_ascii_lowercase(),
        path,
        param_string,
        header_string,
    );
    let string_to_sign = format!(
        "sha1\n{key_time}\n{}\n",
        hex::encode(Sha1::digest(http_string.as_bytes()))
    );
    let signature = hmac_sha1_hex(sign_key.as_bytes(), string_to_sign.as_bytes());

    format!(
        "q-sign-algorithm=sha1&q-ak={}&q-sign-time={key_time}&q-key-time={key_time}\
         &q-header-list={header_list}&q-url-param-list={param_list}&q-signature={signature}",
        credentials.secret_id,
    )
}

/// Lowercase, encode, and sort pairs into the `k1;k2` list and the
/// `k1=v1&k2=v2` canonical string.
fn canonicalize(pairs: &[(String, String)]) -> (String, String) {
    let mut encoded: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (encode(&k.to_ascii_lowercase()), encode(v)))
        .collect();
    encoded.sort();

    let list = encoded
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    (list, string)
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, SIGN_ENCODE_SET).to_string()
}

fn hmac_sha1_hex(key: &[u8], data: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

//! COS error envelope parsing.
//!
//! COS answers failed requests with an XML body:
//!
//! ```xml
//! <Error>
//!   <Code>NoSuchKey</Code>
//!   <Message>The specified key does not exist.</Message>
//!   <Resource>examplebucket.cos.ap-guangzhou.myqcloud.com/missing</Resource>
//!   <RequestId>NjFkN2VhMDJfMjZiMjU4NjRfOD=</RequestId>
//! </Error>
//! ```
//!
//! A parsed envelope becomes a [`BackendError`] carrying the original HTTP
//! status; an unparseable failure body is left to the caller to wrap as a
//! transport error.

use quick_xml::Reader;
use quick_xml::events::Event;

use cosgate_model::error::BackendError;
use cosgate_xml::{S3Deserialize, XmlError, from_xml};

/// The fields cosgate cares about from a COS `<Error>` document.
#[derive(Debug, Clone, Default)]
pub struct CosErrorResponse {
    /// The COS error code.
    pub code: String,
    /// The COS error message.
    pub message: String,
    /// The COS request id.
    pub request_id: Option<String>,
}

impl S3Deserialize for CosErrorResponse {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut code = None;
        let mut message = None;
        let mut request_id = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = e.name();
                    let tag_name = std::str::from_utf8(name.as_ref())
                        .map_err(|e| XmlError::ParseError(e.to_string()))?;
                    match tag_name {
                        "Code" => code = Some(read_text(reader)?),
                        "Message" => message = Some(read_text(reader)?),
                        "RequestId" => request_id = Some(read_text(reader)?),
                        _ => skip(reader)?,
                    }
                }
                Event::End(_) => break,
                Event::Eof => {
                    return Err(XmlError::UnexpectedElement(
                        "unexpected EOF in Error".to_string(),
                    ));
                }
                _ => {}
            }
        }

        Ok(CosErrorResponse {
            code: code.ok_or_else(|| XmlError::MissingElement("Code".to_string()))?,
            message: message.unwrap_or_default(),
            request_id,
        })
    }
}

fn read_text(reader: &mut Reader<&[u8]>) -> Result<String, XmlError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                let unescaped = quick_xml::escape::unescape(&decoded)
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::End(_) => return Ok(text),
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while reading text content".to_string(),
                ));
            }
            _ => {}
        }
    }
}

fn skip(reader: &mut Reader<&[u8]>) -> Result<(), XmlError> {
    let mut depth: u32 = 1;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while skipping element".to_string(),
                ));
            }
            _ => {}
        }
    }
}

/// Parse a failed COS response body into a [`BackendError`] with the
/// response's HTTP status. Returns `None` when the body is not a COS error
/// document.
#[must_use]
pub fn parse_backend_error(status: http::StatusCode, body: &[u8]) -> Option<BackendError> {
    let parsed: CosErrorResponse = from_xml(body).ok()?;
    Some(BackendError {
        code: parsed.code,
        message: parsed.message,
        request_id: parsed.request_id,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parse_cos_error_document() {
        let body = br#"<?xml version="1.0" encoding="UTF-8"?>
        <Error>
            <Code>NoSuchKey</Code>
            <Message>The specified key does not exist.</Message>
            <Resource>bucket.cos.example/missing</Resource>
            <RequestId>NjFkN2VhMDJf</RequestId>
            <TraceId>OGVmYzZiMmQyMzdh</TraceId>
        </Error>"#;

        let err =
            parse_backend_error(http::StatusCode::NOT_FOUND, body).expect("should parse");
        assert_eq!(err.code, "NoSuchKey");
        assert_eq!(err.message, "The specified key does not exist.");
        assert_eq!(err.request_id.as_deref(), Some("NjFkN2VhMDJf"));
        assert_eq!(err.status, http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_should_reject_body_without_code() {
        let body = br"<Error><Message>m</Message></Error>";
        assert!(parse_backend_error(http::StatusCode::BAD_REQUEST, body).is_none());
    }

    #[test]
    fn test_should_reject_non_xml_body() {
        assert!(parse_backend_error(http::StatusCode::BAD_GATEWAY, b"upstream down").is_none());
    }
}

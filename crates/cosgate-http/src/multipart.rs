//! Multipart form data parser for browser-based POST uploads.
//!
//! Parses `multipart/form-data` bodies into named fields and a single file
//! payload. The proxy needs the uploaded file's name (for `${filename}`
//! substitution in the `key` field) and its Content-Type in addition to the
//! raw data. Works on the already-collected body bytes.

use std::collections::HashMap;

use bytes::Bytes;

use cosgate_model::error::ProxyError;

/// A parsed multipart form-data submission.
#[derive(Debug)]
pub struct MultipartForm {
    /// Non-file form fields (name → first value).
    pub fields: HashMap<String, String>,
    /// The `file` field content (the uploaded object data).
    pub file_data: Bytes,
    /// The uploaded file's name from the Content-Disposition header.
    pub file_name: Option<String>,
    /// The Content-Type of the file part, if specified.
    pub file_content_type: Option<String>,
}

/// Extract the boundary from a `Content-Type: multipart/form-data; boundary=…`
/// header value.
///
/// # Errors
///
/// Returns a client error if the Content-Type is missing the multipart type
/// or the boundary parameter.
pub fn extract_boundary(content_type: &str) -> Result<String, ProxyError> {
    if !content_type
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
    {
        return Err(ProxyError::invalid_request(format!(
            "POST requires Content-Type multipart/form-data, got: {content_type}"
        )));
    }

    for part in content_type.split(';') {
        let trimmed = part.trim();
        if let Some(val) = trimmed.strip_prefix("boundary=") {
            let boundary = val.trim_matches('"').to_owned();
            if boundary.is_empty() {
                return Err(ProxyError::invalid_request(
                    "empty boundary in Content-Type",
                ));
            }
            return Ok(boundary);
        }
    }

    Err(ProxyError::invalid_request(
        "missing boundary in Content-Type",
    ))
}

/// Parse a multipart/form-data body into form fields and file data.
///
/// A part is treated as the file when its field name is `file` or it carries
/// a filename parameter; all other parts are stored as string fields, first
/// value winning on repeats.
///
/// # Errors
///
/// Returns a client error if the body cannot be parsed or the file part is
/// missing.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<MultipartForm, ProxyError> {
    let delimiter = format!("--{boundary}");
    let end_delimiter = format!("--{boundary}--");

    let mut fields: HashMap<String, String> = HashMap::new();
    let mut file_data: Option<Bytes> = None;
    let mut file_name: Option<String> = None;
    let mut file_content_type: Option<String> = None;

    for part_bytes in split_parts(body, delimiter.as_bytes(), end_delimiter.as_bytes()) {
        let Some((headers_section, part_body)) = split_headers_body(part_bytes) else {
            continue;
        };

        let disposition = parse_content_disposition(headers_section);
        let Some(field_name) = disposition.name else {
            continue;
        };

        if field_name == "file" || disposition.filename.is_some() {
            file_name = disposition.filename;
            file_content_type = parse_part_content_type(headers_section);
            file_data = Some(Bytes::copy_from_slice(part_body));
        } else {
            let value = String::from_utf8_lossy(part_body).into_owned();
            fields.entry(field_name).or_insert(value);
        }
    }

    let file_data = file_data
        .ok_or_else(|| ProxyError::invalid_request("missing file field in multipart form data"))?;

    Ok(MultipartForm {
        fields,
        file_data,
        file_name,
        file_content_type,
    })
}

/// Split the multipart body into individual parts by boundary.
fn split_parts<'a>(body: &'a [u8], delimiter: &[u8], end_delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();

    // Skip the preamble (everything before the first delimiter).
    let Some(pos) = find_bytes(body, delimiter) else {
        return parts;
    };
    let mut remaining = skip_crlf(&body[pos + delimiter.len()..]);

    loop {
        if remaining.starts_with(end_delimiter)
            || remaining
                .strip_prefix(b"\r\n")
                .is_some_and(|r| r.starts_with(end_delimiter))
        {
            break;
        }

        if let Some(pos) = find_bytes(remaining, delimiter) {
            parts.push(strip_trailing_crlf(&remaining[..pos]));
            remaining = skip_crlf(&remaining[pos + delimiter.len()..]);
        } else {
            // No more delimiters — treat the rest as the last part.
            let part = strip_trailing_crlf(remaining);
            if !part.is_empty() {
                parts.push(part);
            }
            break;
        }
    }

    parts
}

/// Split a part into its headers section and body at the first `\r\n\r\n`.
fn split_headers_body(part: &[u8]) -> Option<(&[u8], &[u8])> {
    let separator = b"\r\n\r\n";
    find_bytes(part, separator).map(|pos| (&part[..pos], &part[pos + separator.len()..]))
}

/// Parsed Content-Disposition parameters.
struct ContentDisposition {
    name: Option<String>,
    filename: Option<String>,
}

/// Parse the Content-Disposition header of a part.
fn parse_content_disposition(headers: &[u8]) -> ContentDisposition {
    let headers_str = String::from_utf8_lossy(headers);
    let mut name = None;
    let mut filename = None;

    for line in headers_str.split("\r\n") {
        if !line
            .to_ascii_lowercase()
            .starts_with("content-disposition:")
        {
            continue;
        }
        if let Some(n) = extract_quoted_param(line, "name") {
            name = Some(n);
        }
        if let Some(f) = extract_quoted_param(line, "filename") {
            filename = Some(f);
        }
    }

    ContentDisposition { name, filename }
}

/// Extract the Content-Type from a part's headers section.
fn parse_part_content_type(headers: &[u8]) -> Option<String> {
    let headers_str = String::from_utf8_lossy(headers);
    for line in headers_str.split("\r\n") {
        let lower = line.to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("content-type:") {
            return Some(rest.trim().to_owned());
        }
    }
    None
}

/// Extract a `param="value"` (or unquoted `param=value`) from a header line.
fn extract_quoted_param(header_line: &str, param_name: &str) -> Option<String> {
    let quoted_pattern = format!("{param_name}=\"");
    let unquoted_pattern = format!("{param_name}=");

    let lower_line = header_line.to_ascii_lowercase();

    if let Some(pos) = lower_line.find(&quoted_pattern) {
        let start = pos + quoted_pattern.len();
        let rest = &header_line[start..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_owned());
        }
    }

    if let Some(pos) = lower_line.find(&unquoted_pattern) {
        let start = pos + unquoted_pattern.len();
        let rest = &header_line[start..];
        let end = rest.find(';').unwrap_or(rest.len());
        let val = rest[..end].trim().to_owned();
        if !val.is_empty() {
            return Some(val);
        }
    }

    None
}

/// Find the position of a needle in a haystack.
fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Skip leading `\r\n`.
fn skip_crlf(data: &[u8]) -> &[u8] {
    data.strip_prefix(b"\r\n").unwrap_or(data)
}

/// Strip trailing `\r\n`.
fn strip_trailing_crlf(data: &[u8]) -> &[u8] {
    data.strip_suffix(b"\r\n").unwrap_or(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_extract_boundary() {
        let ct = "multipart/form-data; boundary=----WebKitFormBoundary7MA4YWxkTrZu0gW";
        let b = extract_boundary(ct).expect("should extract boundary");
        assert_eq!(b, "----WebKitFormBoundary7MA4YWxkTrZu0gW");
    }

    #[test]
    fn test_should_extract_quoted_boundary() {
        let ct = r#"multipart/form-data; boundary="abc123""#;
        let b = extract_boundary(ct).expect("should extract boundary");
        assert_eq!(b, "abc123");
    }

    #[test]
    fn test_should_reject_non_multipart_content_type() {
        assert!(extract_boundary("application/json").is_err());
    }

    #[test]
    fn test_should_parse_key_and_file_with_filename() {
        let boundary = "xyzzy";
        let body = "--xyzzy\r\n\
             Content-Disposition: form-data; name=\"key\"\r\n\
             \r\n\
             uploads/${filename}\r\n\
             --xyzzy\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"clip.webm\"\r\n\
             Content-Type: audio/webm\r\n\
             \r\n\
             \x01\x02\x03\r\n\
             --xyzzy--\r\n";

        let form = parse_multipart(body.as_bytes(), boundary).expect("should parse");
        assert_eq!(
            form.fields.get("key").map(String::as_str),
            Some("uploads/${filename}")
        );
        assert_eq!(form.file_name.as_deref(), Some("clip.webm"));
        assert_eq!(form.file_content_type.as_deref(), Some("audio/webm"));
        assert_eq!(form.file_data.as_ref(), b"\x01\x02\x03");
    }

    #[test]
    fn test_should_keep_first_value_of_repeated_field() {
        let boundary = "b";
        let body = "--b\r\n\
             Content-Disposition: form-data; name=\"key\"\r\n\
             \r\n\
             first\r\n\
             --b\r\n\
             Content-Disposition: form-data; name=\"key\"\r\n\
             \r\n\
             second\r\n\
             --b\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"f\"\r\n\
             \r\n\
             data\r\n\
             --b--\r\n";

        let form = parse_multipart(body.as_bytes(), boundary).expect("should parse");
        assert_eq!(form.fields.get("key").map(String::as_str), Some("first"));
    }

    #[test]
    fn test_should_reject_form_without_file() {
        let boundary = "abc";
        let body = "--abc\r\n\
                     Content-Disposition: form-data; name=\"key\"\r\n\
                     \r\n\
                     test\r\n\
                     --abc--\r\n";

        assert!(parse_multipart(body.as_bytes(), boundary).is_err());
    }

    #[test]
    fn test_should_ignore_preamble_before_first_boundary() {
        let boundary = "zz";
        let body = "preamble noise\r\n--zz\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"a.bin\"\r\n\
             \r\n\
             ok\r\n\
             --zz--\r\n";

        let form = parse_multipart(body.as_bytes(), boundary).expect("should parse");
        assert_eq!(form.file_data.as_ref(), b"ok");
    }
}

//! XML serialization: converting proxy types to S3-compatible XML.
//!
//! Serialization follows the RestXml conventions shared by the S3 surface and
//! the COS backend:
//!
//! - Namespace: `http://s3.amazonaws.com/doc/2006-03-01/`
//! - Fixed field order per envelope
//! - XML declaration: `<?xml version="1.0" encoding="UTF-8"?>`

use std::io::{self, Write};

use quick_xml::Writer;
use quick_xml::events::{BytesText, Event};

use cosgate_model::types::{
    CompleteMultipartUploadResult, CompletedMultipartUpload, CompletedPart,
    InitiateMultipartUploadResult,
};

use crate::error::XmlError;

/// The S3 XML namespace, used on both sides of the proxy.
pub const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Trait for serializing proxy types to XML.
///
/// Implementors write their content as child elements inside the current XML
/// context. The root element name and namespace are handled by the top-level
/// [`to_xml`] function.
///
/// Uses `io::Result` because `quick_xml::Writer` closures require
/// `io::Result<()>`.
pub trait S3Serialize {
    /// Serialize this value as XML child elements into the given writer.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if writing to the underlying writer fails.
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()>;
}

/// Serialize a value as a complete XML document with declaration and namespace.
///
/// # Errors
///
/// Returns `XmlError` if serialization fails.
pub fn to_xml<T: S3Serialize>(root_element: &str, value: &T) -> Result<Vec<u8>, XmlError> {
    let mut buf = Vec::with_capacity(512);
    let mut writer = Writer::new(&mut buf);

    writer.write_event(Event::Decl(quick_xml::events::BytesDecl::new(
        "1.0",
        Some("UTF-8"),
        None,
    )))?;

    writer
        .create_element(root_element)
        .with_attribute(("xmlns", S3_NAMESPACE))
        .write_inner_content(|w| value.serialize_xml(w))?;

    Ok(buf)
}

/// Write a simple `<tag>text</tag>` element.
fn write_text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> io::Result<()> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

impl S3Serialize for InitiateMultipartUploadResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Bucket", &self.bucket)?;
        write_text_element(writer, "Key", &self.key)?;
        write_text_element(writer, "UploadId", &self.upload_id)?;
        Ok(())
    }
}

impl S3Serialize for CompleteMultipartUploadResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Location", &self.location)?;
        write_text_element(writer, "Bucket", &self.bucket)?;
        write_text_element(writer, "Key", &self.key)?;
        write_text_element(writer, "ETag", &self.e_tag)?;
        Ok(())
    }
}

impl S3Serialize for CompletedPart {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "PartNumber", &self.part_number.to_string())?;
        write_text_element(writer, "ETag", &self.e_tag)?;
        Ok(())
    }
}

impl S3Serialize for CompletedMultipartUpload {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        for part in &self.parts {
            writer
                .create_element("Part")
                .write_inner_content(|w| part.serialize_xml(w))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_serialize_initiate_result_in_fixed_order() {
        let result = InitiateMultipartUploadResult {
            bucket: "media".to_owned(),
            key: "videos/a.mp4".to_owned(),
            upload_id: "upload-123".to_owned(),
        };
        let xml = to_xml("InitiateMultipartUploadResult", &result).expect("serialize");
        let s = String::from_utf8(xml).expect("valid utf-8");

        assert!(s.contains(
            "<InitiateMultipartUploadResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">"
        ));
        let bucket_pos = s.find("<Bucket>").expect("bucket element");
        let key_pos = s.find("<Key>").expect("key element");
        let upload_pos = s.find("<UploadId>").expect("upload id element");
        assert!(bucket_pos < key_pos && key_pos < upload_pos);
    }

    #[test]
    fn test_should_serialize_complete_result_in_fixed_order() {
        let result = CompleteMultipartUploadResult {
            location: "https://media.cos.example/videos/a.mp4".to_owned(),
            bucket: "media".to_owned(),
            key: "videos/a.mp4".to_owned(),
            e_tag: "\"abc123\"".to_owned(),
        };
        let xml = to_xml("CompleteMultipartUploadResult", &result).expect("serialize");
        let s = String::from_utf8(xml).expect("valid utf-8");

        let location_pos = s.find("<Location>").expect("location element");
        let etag_pos = s.find("<ETag>").expect("etag element");
        assert!(location_pos < etag_pos);
        assert!(s.contains("<ETag>&quot;abc123&quot;</ETag>"));
    }

    #[test]
    fn test_should_escape_key_values() {
        let result = InitiateMultipartUploadResult {
            bucket: "b".to_owned(),
            key: "a&b<c>.txt".to_owned(),
            upload_id: "u".to_owned(),
        };
        let xml = to_xml("InitiateMultipartUploadResult", &result).expect("serialize");
        let s = String::from_utf8(xml).expect("valid utf-8");
        assert!(s.contains("<Key>a&amp;b&lt;c&gt;.txt</Key>"));
    }

    #[test]
    fn test_should_serialize_part_list_for_forwarding() {
        let upload = CompletedMultipartUpload {
            parts: vec![CompletedPart::new(1, "e1"), CompletedPart::new(2, "e2")],
        };
        let xml = to_xml("CompleteMultipartUpload", &upload).expect("serialize");
        let s = String::from_utf8(xml).expect("valid utf-8");

        assert!(s.contains("<Part><PartNumber>1</PartNumber><ETag>e1</ETag></Part>"));
        assert!(s.contains("<Part><PartNumber>2</PartNumber><ETag>e2</ETag></Part>"));
    }
}

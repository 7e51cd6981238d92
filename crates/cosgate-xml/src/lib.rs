//! S3 XML serialization/deserialization for cosgate.
//!
//! Both sides of the proxy speak the RestXml dialect: the inbound S3 surface
//! and the COS backend use the same envelope shapes, so one XML layer serves
//! both directions.
//!
//! # Key components
//!
//! - [`S3Serialize`] trait and [`to_xml`] for building XML response bodies
//! - [`S3Deserialize`] trait and [`from_xml`] for parsing XML request bodies
//! - [`error_to_xml`] for the `{Code, Message, RequestId}` error envelope
//!
//! # Conventions
//!
//! - Namespace: `http://s3.amazonaws.com/doc/2006-03-01/`
//! - Fixed field order per envelope
//! - XML declaration: `<?xml version="1.0" encoding="UTF-8"?>`
//! - All text values escaped

pub mod deserialize;
pub mod error;
pub mod serialize;

pub use deserialize::{S3Deserialize, from_xml};
pub use error::{XmlError, error_to_xml};
pub use serialize::{S3_NAMESPACE, S3Serialize, to_xml};

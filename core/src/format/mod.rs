//! Wire-format codecs.
//!
//! # Design
//! [`Format`] is a closed strategy value chosen once, at adapter setup, and
//! injected into the connection. Each variant supplies the `Content-Type` /
//! `Accept` pair, the URL extension token, and the conversion between a
//! payload and [`AttributeMap`]s typed by a [`Schema`]. Codecs hold no state.
//!
//! Wire field names are normalized before schema lookup: hyphens become
//! underscores. The XML serializer writes hyphenated names, the JSON one
//! writes the schema's names unchanged.

mod json;
mod xml;

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{AttributeMap, Schema, Value};

/// Supported wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Xml,
    Json,
}

impl Format {
    pub fn mime_type(self) -> &'static str {
        match self {
            Format::Xml => "application/xml",
            Format::Json => "application/json",
        }
    }

    /// Headers sent with every request in this format.
    pub fn headers(self) -> [(&'static str, &'static str); 2] {
        [
            ("Content-Type", self.mime_type()),
            ("Accept", self.mime_type()),
        ]
    }

    /// Token appended to request paths when extension mode is on.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Xml => "xml",
            Format::Json => "json",
        }
    }

    /// Parse a single resource named after the schema's resource name.
    pub fn parse_one(self, payload: &str, schema: &Schema) -> Result<AttributeMap> {
        match self {
            Format::Xml => xml::parse_one(payload, schema),
            Format::Json => json::parse_one(payload, schema),
        }
    }

    /// Parse every resource in a collection payload, in document order.
    pub fn parse_many(self, payload: &str, schema: &Schema) -> Result<Vec<AttributeMap>> {
        match self {
            Format::Xml => xml::parse_many(payload, schema),
            Format::Json => json::parse_many(payload, schema),
        }
    }

    /// Render one record as a complete document.
    pub fn serialize_one(self, record: &Record) -> Result<String> {
        match self {
            Format::Xml => xml::serialize_one(record),
            Format::Json => json::serialize_one(record),
        }
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "xml" => Ok(Format::Xml),
            "json" => Ok(Format::Json),
            other => Err(Error::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Wire field name to schema field name.
fn normalize_field(name: &str) -> String {
    name.replace('-', "_")
}

/// A field that fails to typecast keeps its raw text instead of failing the
/// whole document.
fn typecast_or_raw(field: &str, cast: Result<Value>, raw: &str) -> Value {
    cast.unwrap_or_else(|err| {
        warn!(field, error = %err, "keeping uncastable value as text");
        Value::String(raw.to_string())
    })
}

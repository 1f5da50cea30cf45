//! XML codec.
//!
//! A resource is a root element named after the singular resource name with
//! one child element per field; a collection is a root named after the plural
//! collection name holding repeated resource elements:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <books type="array">
//!   <book>
//!     <id type="integer">1</id>
//!     <in-print type="boolean">true</in-print>
//!     <published-on nil="true"/>
//!   </book>
//! </books>
//! ```
//!
//! Attributes other than `nil="true"` are ignored. Field elements with nested
//! children carry no scalar value and are skipped.

use std::io;

use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::{normalize_field, typecast_or_raw};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{AttributeMap, Schema, Value};

pub(super) fn parse_one(payload: &str, schema: &Schema) -> Result<AttributeMap> {
    let mut reader = Reader::from_str(payload);

    match next_root(&mut reader)? {
        Some((name, false)) if name == schema.resource_name() => read_resource(&mut reader, schema),
        Some((name, true)) if name == schema.resource_name() => Ok(AttributeMap::new()),
        _ => Err(Error::MissingRoot {
            resource: schema.resource_name().to_string(),
        }),
    }
}

pub(super) fn parse_many(payload: &str, schema: &Schema) -> Result<Vec<AttributeMap>> {
    let mut reader = Reader::from_str(payload);
    let mut records = Vec::new();

    match next_root(&mut reader)? {
        Some((name, false)) if name == schema.collection_name() => {}
        _ => return Ok(records),
    }

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if element_name(&e)? == schema.resource_name() {
                    records.push(read_resource(&mut reader, schema)?);
                } else {
                    skip_element(&mut reader)?;
                }
            }
            Event::Empty(e) => {
                if element_name(&e)? == schema.resource_name() {
                    records.push(AttributeMap::new());
                }
            }
            Event::End(_) => return Ok(records),
            Event::Eof => {
                return Err(Error::Xml(format!(
                    "unexpected EOF in {}",
                    schema.collection_name()
                )));
            }
            _ => {}
        }
    }
}

pub(super) fn serialize_one(record: &Record) -> Result<String> {
    let mut buf = Vec::with_capacity(256);
    write_record(&mut buf, record).map_err(|e| Error::Xml(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| Error::Xml(e.to_string()))
}

fn write_record(buf: &mut Vec<u8>, record: &Record) -> io::Result<()> {
    let mut writer = Writer::new(buf);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let schema = record.schema();
    writer
        .create_element(schema.resource_name())
        .write_inner_content(|w| {
            for property in schema.properties() {
                let Some(value) = record.get(&property.name) else {
                    continue;
                };
                let tag = property.name.replace('_', "-");
                if value.is_null() {
                    w.create_element(tag)
                        .with_attribute(("nil", "true"))
                        .write_empty()?;
                } else {
                    w.create_element(tag)
                        .write_text_content(BytesText::new(&value.to_param()))?;
                }
            }
            Ok(())
        })?;

    Ok(())
}

/// Advance to the document's root element. Returns its name and whether it
/// was self-closing, or `None` for a document with no elements.
fn next_root(reader: &mut Reader<&[u8]>) -> Result<Option<(String, bool)>> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => return Ok(Some((element_name(&e)?, false))),
            Event::Empty(e) => return Ok(Some((element_name(&e)?, true))),
            Event::Eof => return Ok(None),
            // declaration, comments, doctype, whitespace
            _ => {}
        }
    }
}

/// Read the field elements of one resource through its end tag.
fn read_resource(reader: &mut Reader<&[u8]>, schema: &Schema) -> Result<AttributeMap> {
    let mut attributes = AttributeMap::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let field = normalize_field(&element_name(&e)?);
                let nil = is_nil(&e)?;
                let text = read_text_content(reader)?;
                let Some(property) = schema.get(&field) else {
                    continue;
                };
                let value = match text {
                    _ if nil => Value::Null,
                    Some(text) => typecast_or_raw(&field, property.typecast_str(&text), &text),
                    None => continue,
                };
                attributes.insert(field, value);
            }
            Event::Empty(e) => {
                let field = normalize_field(&element_name(&e)?);
                let Some(property) = schema.get(&field) else {
                    continue;
                };
                let value = if is_nil(&e)? {
                    Value::Null
                } else {
                    typecast_or_raw(&field, property.typecast_str(""), "")
                };
                attributes.insert(field, value);
            }
            Event::End(_) => return Ok(attributes),
            Event::Eof => {
                return Err(Error::Xml(format!(
                    "unexpected EOF in {}",
                    schema.resource_name()
                )));
            }
            _ => {}
        }
    }
}

/// Read the text of the current element and consume its end tag. Returns
/// `None` when the element holds child elements instead of text.
fn read_text_content(reader: &mut Reader<&[u8]>) -> Result<Option<String>> {
    let mut text = String::new();
    let mut nested = false;

    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let decoded = e.decode().map_err(|err| Error::Xml(err.to_string()))?;
                text.push_str(&decoded);
            }
            Event::GeneralRef(e) => {
                let name = e.decode().map_err(|err| Error::Xml(err.to_string()))?;
                let char_ref = e
                    .resolve_char_ref()
                    .map_err(|err| Error::Xml(err.to_string()))?;
                if let Some(ch) = char_ref {
                    text.push(ch);
                } else if let Some(resolved) = quick_xml::escape::resolve_predefined_entity(&name)
                {
                    text.push_str(resolved);
                } else {
                    return Err(Error::Xml(format!("unknown entity &{name};")));
                }
            }
            Event::CData(e) => {
                let raw = std::str::from_utf8(&e).map_err(|err| Error::Xml(err.to_string()))?;
                text.push_str(raw);
            }
            Event::Start(_) => {
                nested = true;
                skip_element(reader)?;
            }
            Event::End(_) => return Ok((!nested).then_some(text)),
            Event::Eof => {
                return Err(Error::Xml(
                    "unexpected EOF while reading text content".to_string(),
                ));
            }
            _ => {}
        }
    }
}

/// Skip over an element and all its children.
fn skip_element(reader: &mut Reader<&[u8]>) -> Result<()> {
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
                return Err(Error::Xml(
                    "unexpected EOF while skipping element".to_string(),
                ));
            }
            _ => {}
        }
    }
}

fn element_name(e: &BytesStart<'_>) -> Result<String> {
    let name = e.name();
    std::str::from_utf8(name.as_ref())
        .map(str::to_string)
        .map_err(|err| Error::Xml(err.to_string()))
}

fn is_nil(e: &BytesStart<'_>) -> Result<bool> {
    Ok(e
        .try_get_attribute("nil")?
        .is_some_and(|attr| attr.value.as_ref() == b"true"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::schema::tests::book_schema;

    const BOOK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<book>
  <id type="integer">1</id>
  <title>Dune</title>
  <author>Frank Herbert</author>
  <in-print type="boolean">true</in-print>
  <isbn>0441013597</isbn>
</book>"#;

    #[test]
    fn parse_one_typecasts_known_fields_and_drops_unknown() {
        let attrs = parse_one(BOOK, &book_schema()).unwrap();
        assert_eq!(attrs.get("id"), Some(&Value::Integer(1)));
        assert_eq!(attrs.get("title"), Some(&Value::from("Dune")));
        assert_eq!(attrs.get("in_print"), Some(&Value::Boolean(true)));
        assert!(!attrs.contains("isbn"));
        assert!(!attrs.contains("pages"));
        let fields: Vec<_> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(fields, vec!["id", "title", "author", "in_print"]);
    }

    #[test]
    fn parse_one_requires_matching_root() {
        let err = parse_one("<author><id>1</id></author>", &book_schema()).unwrap_err();
        assert!(matches!(err, Error::MissingRoot { ref resource } if resource == "book"));

        let err = parse_one("", &book_schema()).unwrap_err();
        assert!(matches!(err, Error::MissingRoot { .. }));
    }

    #[test]
    fn parse_one_handles_entities_and_cdata() {
        let xml = "<book><title>War &amp; Peace &#33;</title>\
                   <author><![CDATA[Leo <T>]]></author></book>";
        let attrs = parse_one(xml, &book_schema()).unwrap();
        assert_eq!(attrs.get("title"), Some(&Value::from("War & Peace !")));
        assert_eq!(attrs.get("author"), Some(&Value::from("Leo <T>")));
    }

    #[test]
    fn parse_one_skips_nested_elements() {
        let xml = "<book><id>2</id><title><en>Dune</en></title><pages>100</pages></book>";
        let attrs = parse_one(xml, &book_schema()).unwrap();
        assert!(!attrs.contains("title"));
        assert_eq!(attrs.get("pages"), Some(&Value::Integer(100)));
    }

    #[test]
    fn parse_one_reads_nil_and_empty_elements() {
        let xml = r#"<book><pages nil="true"/><title/><published-on></published-on></book>"#;
        let attrs = parse_one(xml, &book_schema()).unwrap();
        assert_eq!(attrs.get("pages"), Some(&Value::Null));
        assert_eq!(attrs.get("title"), Some(&Value::String(String::new())));
        assert_eq!(attrs.get("published_on"), Some(&Value::Null));
    }

    #[test]
    fn parse_many_reads_in_document_order() {
        let xml = r#"<?xml version="1.0"?>
<books type="array">
  <book><id>1</id><title>One</title></book>
  <magazine><id>9</id></magazine>
  <book><id>2</id><title>Two</title></book>
  <book><id>3</id><title>Three</title></book>
</books>"#;
        let records = parse_many(xml, &book_schema()).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.get("id").cloned()).collect();
        assert_eq!(
            ids,
            vec![
                Some(Value::Integer(1)),
                Some(Value::Integer(2)),
                Some(Value::Integer(3))
            ]
        );
    }

    #[test]
    fn parse_many_yields_nothing_for_empty_or_foreign_roots() {
        let schema = book_schema();
        assert!(parse_many(r#"<books type="array"/>"#, &schema).unwrap().is_empty());
        assert!(parse_many("<books></books>", &schema).unwrap().is_empty());
        assert!(parse_many("<shelves><book/></shelves>", &schema).unwrap().is_empty());
        assert!(parse_many("", &schema).unwrap().is_empty());
    }

    #[test]
    fn parse_many_keeps_uncastable_values_as_text() {
        let xml = "<books><book><id>1</id><pages>n/a</pages></book><book><id>2</id></book></books>";
        let records = parse_many(xml, &book_schema()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("pages"), Some(&Value::from("n/a")));
        assert_eq!(records[1].get("id"), Some(&Value::Integer(2)));
    }

    #[test]
    fn parse_many_rejects_truncated_collections() {
        let schema = book_schema();
        let err = parse_many("<books><book><id>1</id></book>", &schema).unwrap_err();
        assert!(matches!(err, Error::Xml(ref message) if message.contains("books")));
        assert!(parse_many("<books><book><id>1</id>", &schema).is_err());
    }

    #[test]
    fn serialize_uses_hyphenated_names() {
        let mut record = Record::new(Arc::new(book_schema()));
        record.set("id", 5_i64).unwrap();
        record.set("in_print", false).unwrap();
        record.set("pages", Value::Null).unwrap();

        let xml = serialize_one(&record).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains("<book><id>5</id>"));
        assert!(xml.contains(r#"<pages nil="true"/>"#));
        assert!(xml.contains("<in-print>false</in-print>"));
        assert!(xml.ends_with("</book>"));
    }

    #[test]
    fn serialize_escapes_text() {
        let mut record = Record::new(Arc::new(book_schema()));
        record.set("title", "Fish & <Chips>").unwrap();
        let xml = serialize_one(&record).unwrap();
        assert!(xml.contains("<title>Fish &amp; &lt;Chips&gt;</title>"));
    }
}

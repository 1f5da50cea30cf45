//! Wire encoding for books.
//!
//! XML documents follow the Rails layout the adapter expects: hyphenated
//! element names, `nil="true"` for absent values and a `type="array"`
//! collection root. JSON goes through serde.

use std::io;

use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
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

    /// Format named by a path extension (`books.json`, `1.xml`).
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "xml" => Some(Format::Xml),
            "json" => Some(Format::Json),
            _ => None,
        }
    }

    /// Format named by a media type header; XML unless it mentions JSON.
    pub fn from_media_type(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.contains("json") => Format::Json,
            _ => Format::Xml,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    pub pages: Option<i64>,
    pub in_print: Option<bool>,
}

/// Fields accepted on create and update. Absent fields stay untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BookInput {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub pages: Option<i64>,
    pub in_print: Option<bool>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct DecodeError(pub String);

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn decode_error(err: impl std::fmt::Display) -> DecodeError {
    DecodeError(err.to_string())
}

pub fn encode_book(format: Format, book: &Book) -> String {
    match format {
        Format::Json => serde_json::to_string(book).unwrap_or_default(),
        Format::Xml => xml_document(|w| write_book(w, book)),
    }
}

pub fn encode_books(format: Format, books: &[Book]) -> String {
    match format {
        Format::Json => serde_json::to_string(books).unwrap_or_default(),
        Format::Xml => xml_document(|w| {
            w.create_element("books")
                .with_attribute(("type", "array"))
                .write_inner_content(|w| {
                    for book in books {
                        write_book(w, book)?;
                    }
                    Ok(())
                })?;
            Ok(())
        }),
    }
}

/// Validation failure body, e.g. `<errors><error>title can't be blank</error></errors>`.
pub fn encode_errors(format: Format, messages: &[&str]) -> String {
    match format {
        Format::Json => serde_json::json!({ "errors": messages }).to_string(),
        Format::Xml => xml_document(|w| {
            w.create_element("errors").write_inner_content(|w| {
                for message in messages {
                    w.create_element("error")
                        .write_text_content(BytesText::new(message))?;
                }
                Ok(())
            })?;
            Ok(())
        }),
    }
}

pub fn decode_input(format: Format, body: &str) -> Result<BookInput, DecodeError> {
    match format {
        Format::Json => serde_json::from_str(body).map_err(decode_error),
        Format::Xml => decode_xml_input(body),
    }
}

fn xml_document(write: impl FnOnce(&mut Writer<Vec<u8>>) -> io::Result<()>) -> String {
    let mut writer = Writer::new(Vec::new());
    let written = writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .and_then(|()| write(&mut writer));
    match written {
        Ok(()) => String::from_utf8(writer.into_inner()).unwrap_or_default(),
        Err(_) => String::new(),
    }
}

fn write_book(w: &mut Writer<Vec<u8>>, book: &Book) -> io::Result<()> {
    w.create_element("book").write_inner_content(|w| {
        typed_element(w, "id", Some("integer"), Some(book.id.to_string()))?;
        typed_element(w, "title", None, Some(book.title.clone()))?;
        typed_element(w, "author", None, book.author.clone())?;
        typed_element(w, "pages", Some("integer"), book.pages.map(|p| p.to_string()))?;
        typed_element(w, "in-print", Some("boolean"), book.in_print.map(|b| b.to_string()))?;
        Ok(())
    })?;
    Ok(())
}

fn typed_element(
    w: &mut Writer<Vec<u8>>,
    name: &str,
    kind: Option<&str>,
    value: Option<String>,
) -> io::Result<()> {
    let mut element = w.create_element(name);
    if let Some(kind) = kind {
        element = element.with_attribute(("type", kind));
    }
    match value {
        Some(text) => {
            element.write_text_content(BytesText::new(&text))?;
        }
        None => {
            element.with_attribute(("nil", "true")).write_empty()?;
        }
    }
    Ok(())
}

fn decode_xml_input(body: &str) -> Result<BookInput, DecodeError> {
    let mut reader = Reader::from_str(body);
    let mut input = BookInput::default();

    loop {
        match reader.read_event().map_err(decode_error)? {
            Event::Start(e) if e.name().as_ref() == b"book" => break,
            Event::Empty(e) if e.name().as_ref() == b"book" => return Ok(input),
            Event::Start(_) | Event::Empty(_) | Event::Eof => {
                return Err(DecodeError("expected <book> root".to_string()));
            }
            _ => {}
        }
    }

    loop {
        match reader.read_event().map_err(decode_error)? {
            Event::Start(e) => {
                let name = element_name(&e)?;
                let text = read_text(&mut reader)?;
                set_field(&mut input, &name, (!is_nil(&e)).then_some(text))?;
            }
            Event::Empty(e) => {
                let name = element_name(&e)?;
                let text = (!is_nil(&e)).then(String::new);
                set_field(&mut input, &name, text)?;
            }
            Event::End(_) => return Ok(input),
            Event::Eof => return Err(DecodeError("unexpected EOF in <book>".to_string())),
            _ => {}
        }
    }
}

fn set_field(input: &mut BookInput, name: &str, text: Option<String>) -> Result<(), DecodeError> {
    match name {
        "id" => input.id = text.map(|t| t.trim().parse()).transpose().map_err(decode_error)?,
        "title" => input.title = text,
        "author" => input.author = text,
        "pages" => input.pages = text.map(|t| t.trim().parse()).transpose().map_err(decode_error)?,
        "in-print" | "in_print" => {
            input.in_print = text.map(|t| t.trim().parse()).transpose().map_err(decode_error)?;
        }
        // unknown fields are ignored
        _ => {}
    }
    Ok(())
}

fn read_text(reader: &mut Reader<&[u8]>) -> Result<String, DecodeError> {
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(decode_error)? {
            Event::Text(e) => text.push_str(&e.decode().map_err(decode_error)?),
            Event::GeneralRef(e) => {
                let name = e.decode().map_err(decode_error)?;
                if let Some(ch) = e.resolve_char_ref().map_err(decode_error)? {
                    text.push(ch);
                } else if let Some(resolved) = quick_xml::escape::resolve_predefined_entity(&name) {
                    text.push_str(resolved);
                }
            }
            Event::CData(e) => text.push_str(std::str::from_utf8(&e).map_err(decode_error)?),
            Event::End(_) => return Ok(text),
            Event::Start(_) => return Err(DecodeError("nested element in field".to_string())),
            Event::Eof => return Err(DecodeError("unexpected EOF in field".to_string())),
            _ => {}
        }
    }
}

fn element_name(e: &BytesStart<'_>) -> Result<String, DecodeError> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(decode_error)
}

fn is_nil(e: &BytesStart<'_>) -> bool {
    matches!(e.try_get_attribute("nil"), Ok(Some(attr)) if attr.value.as_ref() == b"true")
}

//! Applies attributes echoed by the server back onto a written record.
//!
//! Only fields present in the response are assigned; everything else on the
//! record is left as it was.

use tracing::trace;

use crate::error::Result;
use crate::format::Format;
use crate::http::HttpResponse;
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceMapper {
    format: Format,
}

impl ResourceMapper {
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    /// Returns `true` when the response body was applied. Non-2xx responses
    /// and blank bodies are ignored.
    pub fn apply(&self, record: &mut Record, response: &HttpResponse) -> Result<bool> {
        if !response.is_success() || response.is_blank() {
            return Ok(false);
        }

        let schema = record.schema().clone();
        let attributes = self.format.parse_one(&response.body, &schema)?;
        trace!(
            resource = schema.resource_name(),
            fields = attributes.len(),
            "applying response attributes"
        );
        for (field, value) in attributes {
            if schema.get(&field).is_some() {
                record.set(&field, value)?;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::Error;
    use crate::schema::tests::book_schema;
    use crate::schema::Value;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn draft() -> Record {
        let mut record = Record::new(Arc::new(book_schema()));
        record.set("title", "Draft").unwrap();
        record.set("author", "Ann").unwrap();
        record
    }

    #[test]
    fn echoed_fields_overwrite_and_others_survive() {
        let mut record = draft();
        let applied = ResourceMapper::new(Format::Xml)
            .apply(
                &mut record,
                &response(201, "<book><id>7</id><title>Final</title></book>"),
            )
            .unwrap();
        assert!(applied);
        assert_eq!(record.get("id"), Some(&Value::Integer(7)));
        assert_eq!(record.get("title"), Some(&Value::from("Final")));
        assert_eq!(record.get("author"), Some(&Value::from("Ann")));
    }

    #[test]
    fn blank_or_unsuccessful_responses_are_ignored() {
        let mapper = ResourceMapper::new(Format::Json);
        let mut record = draft();
        assert!(!mapper.apply(&mut record, &response(200, "  ")).unwrap());
        assert!(!mapper
            .apply(&mut record, &response(304, r#"{"id":1}"#))
            .unwrap());
        assert_eq!(record, draft());
    }

    #[test]
    fn unparseable_success_bodies_fail() {
        let mut record = draft();
        let err = ResourceMapper::new(Format::Xml)
            .apply(&mut record, &response(200, "<author/>"))
            .unwrap_err();
        assert!(matches!(err, Error::MissingRoot { .. }));
    }
}

//! In-memory records bound to a schema.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::{AttributeMap, Schema, Value};

/// A record: a shared schema plus the attribute values set so far.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<Schema>,
    attributes: AttributeMap,
}

impl Record {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            attributes: AttributeMap::new(),
        }
    }

    /// Builds a record from parsed attributes, dropping fields the schema
    /// does not declare.
    pub fn from_attributes(schema: Arc<Schema>, attributes: AttributeMap) -> Self {
        let mut record = Self::new(schema);
        for (field, value) in attributes {
            if record.schema.get(&field).is_some() {
                record.attributes.insert(field, value);
            }
        }
        record
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        if self.schema.get(field).is_none() {
            return Err(Error::UnknownField {
                resource: self.schema.resource_name().to_string(),
                field: field.to_string(),
            });
        }
        self.attributes.insert(field, value.into());
        Ok(())
    }

    /// The key as used in resource paths: the key-field values concatenated
    /// in schema order. `None` while any key field is unset or null.
    pub fn key_string(&self) -> Option<String> {
        let mut key = String::new();
        let mut any = false;
        for property in self.schema.key() {
            match self.attributes.get(&property.name) {
                Some(value) if !value.is_null() => key.push_str(&value.to_param()),
                _ => return None,
            }
            any = true;
        }
        any.then_some(key)
    }

    pub(crate) fn require_key(&self) -> Result<String> {
        self.key_string().ok_or_else(|| Error::MissingKey {
            resource: self.schema.resource_name().to_string(),
        })
    }
}

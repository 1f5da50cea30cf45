//! Record schemas, typed values and attribute maps.
//!
//! # Design
//! A `Schema` is the read-only description of one record type: its singular
//! and plural names and an ordered, closed list of properties. Each property
//! carries a `PropertyType` tag that knows how to typecast a raw wire value
//! (XML text or a JSON scalar) into a [`Value`]. Schemas are built once and
//! shared behind an `Arc`.
//!
//! Field names are canonical snake_case. Codecs are responsible for mapping
//! wire names (e.g. `in-print`) onto them.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{Error, Result};

/// The closed set of property types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    /// Auto-incrementing integer key.
    Serial,
    Integer,
    Float,
    String,
    Text,
    Boolean,
    Date,
    DateTime,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::Serial => "serial",
            PropertyType::Integer => "integer",
            PropertyType::Float => "float",
            PropertyType::String => "string",
            PropertyType::Text => "text",
            PropertyType::Boolean => "boolean",
            PropertyType::Date => "date",
            PropertyType::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

/// A typecast field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text form used in XML bodies, URL paths and query strings.
    /// `Null` renders as the empty string.
    pub fn to_param(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.to_rfc3339(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Date(_) | Value::DateTime(_) => serde_json::Value::String(self.to_param()),
        }
    }

    /// Ordering between values of the same kind; `None` across kinds.
    pub fn partial_cmp_value(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.partial_cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.partial_cmp(b),
            (Value::Null, Value::Null) => Some(std::cmp::Ordering::Equal),
            _ => None,
        }
    }

    /// Total order used for sorting: `Null` first, numbers compared across
    /// integer and float, other kinds grouped by a fixed rank.
    pub fn total_cmp(&self, other: &Value) -> std::cmp::Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Date(_) => 4,
            Value::DateTime(_) => 5,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_param())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

/// One declared field of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub kind: PropertyType,
    pub key: bool,
}

impl Property {
    pub fn new(name: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            name: name.into(),
            kind,
            key: false,
        }
    }

    pub fn key(name: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            name: name.into(),
            kind,
            key: true,
        }
    }

    fn typecast_error(&self, value: impl fmt::Display) -> Error {
        Error::Typecast {
            field: self.name.clone(),
            kind: self.kind,
            value: value.to_string(),
        }
    }

    /// Typecast raw XML text. Blank text is `Null` for every non-textual type.
    pub fn typecast_str(&self, raw: &str) -> Result<Value> {
        let trimmed = raw.trim();
        match self.kind {
            PropertyType::String | PropertyType::Text => Ok(Value::String(raw.to_string())),
            _ if trimmed.is_empty() => Ok(Value::Null),
            PropertyType::Serial | PropertyType::Integer => trimmed
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| self.typecast_error(trimmed)),
            PropertyType::Float => trimmed
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| self.typecast_error(trimmed)),
            PropertyType::Boolean => match trimmed {
                "true" | "t" | "1" => Ok(Value::Boolean(true)),
                "false" | "f" | "0" => Ok(Value::Boolean(false)),
                _ => Err(self.typecast_error(trimmed)),
            },
            PropertyType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| self.typecast_error(trimmed)),
            PropertyType::DateTime => parse_datetime(trimmed)
                .map(Value::DateTime)
                .ok_or_else(|| self.typecast_error(trimmed)),
        }
    }

    /// Typecast a JSON scalar. Objects and arrays are rejected.
    pub fn typecast_json(&self, raw: &serde_json::Value) -> Result<Value> {
        use serde_json::Value as Json;

        match raw {
            Json::Null => Ok(Value::Null),
            Json::String(s) => self.typecast_str(s),
            Json::Bool(b) => match self.kind {
                PropertyType::Boolean => Ok(Value::Boolean(*b)),
                PropertyType::String | PropertyType::Text => Ok(Value::String(b.to_string())),
                _ => Err(self.typecast_error(b)),
            },
            Json::Number(n) => match self.kind {
                PropertyType::Serial | PropertyType::Integer => n
                    .as_i64()
                    .map(Value::Integer)
                    .ok_or_else(|| self.typecast_error(n)),
                PropertyType::Float => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| self.typecast_error(n)),
                PropertyType::Boolean => match n.as_i64() {
                    Some(1) => Ok(Value::Boolean(true)),
                    Some(0) => Ok(Value::Boolean(false)),
                    _ => Err(self.typecast_error(n)),
                },
                PropertyType::String | PropertyType::Text => Ok(Value::String(n.to_string())),
                PropertyType::Date | PropertyType::DateTime => Err(self.typecast_error(n)),
            },
            Json::Array(_) | Json::Object(_) => Err(self.typecast_error(raw)),
        }
    }
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}

/// Read-only description of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    resource_name: String,
    collection_name: String,
    properties: Vec<Property>,
}

impl Schema {
    /// `resource_name` is the singular element name (`book`),
    /// `collection_name` the plural one used for paths and collection roots.
    pub fn new(resource_name: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            collection_name: collection_name.into(),
            properties: Vec::new(),
        }
    }

    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn get(&self, field: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == field)
    }

    pub fn key(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter().filter(|p| p.key)
    }

    pub fn is_key(&self, field: &str) -> bool {
        self.get(field).is_some_and(|p| p.key)
    }
}

/// Ordered mapping from field name to typecast value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap {
    entries: Vec<(String, Value)>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced entry keeps its position.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        let field = field.into();
        match self.entries.iter_mut().find(|(k, _)| *k == field) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == field).map(|(_, v)| v)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut map = AttributeMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for AttributeMap {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn book_schema() -> Schema {
        Schema::new("book", "books")
            .property(Property::key("id", PropertyType::Serial))
            .property(Property::new("title", PropertyType::String))
            .property(Property::new("author", PropertyType::String))
            .property(Property::new("pages", PropertyType::Integer))
            .property(Property::new("in_print", PropertyType::Boolean))
            .property(Property::new("published_on", PropertyType::Date))
    }

    #[test]
    fn typecast_integer_from_text_and_json() {
        let prop = Property::new("pages", PropertyType::Integer);
        assert_eq!(prop.typecast_str(" 42 ").unwrap(), Value::Integer(42));
        assert_eq!(prop.typecast_str("").unwrap(), Value::Null);
        assert_eq!(
            prop.typecast_json(&serde_json::json!(7)).unwrap(),
            Value::Integer(7)
        );
        assert_eq!(
            prop.typecast_json(&serde_json::json!("8")).unwrap(),
            Value::Integer(8)
        );
    }

    #[test]
    fn typecast_rejects_garbage() {
        let prop = Property::new("pages", PropertyType::Integer);
        let err = prop.typecast_str("many").unwrap_err();
        assert!(matches!(err, Error::Typecast { ref field, .. } if field == "pages"));
        assert!(prop.typecast_json(&serde_json::json!([1])).is_err());
    }

    #[test]
    fn typecast_keeps_textual_whitespace() {
        let prop = Property::new("title", PropertyType::String);
        assert_eq!(
            prop.typecast_str(" spaced ").unwrap(),
            Value::String(" spaced ".to_string())
        );
        assert_eq!(prop.typecast_str("").unwrap(), Value::String(String::new()));
        assert_eq!(
            prop.typecast_json(&serde_json::json!(12)).unwrap(),
            Value::String("12".to_string())
        );
    }

    #[test]
    fn typecast_booleans() {
        let prop = Property::new("in_print", PropertyType::Boolean);
        assert_eq!(prop.typecast_str("true").unwrap(), Value::Boolean(true));
        assert_eq!(prop.typecast_str("f").unwrap(), Value::Boolean(false));
        assert_eq!(
            prop.typecast_json(&serde_json::json!(1)).unwrap(),
            Value::Boolean(true)
        );
        assert!(prop.typecast_str("maybe").is_err());
    }

    #[test]
    fn typecast_dates() {
        let date = Property::new("published_on", PropertyType::Date);
        assert_eq!(
            date.typecast_str("2009-05-01").unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2009, 5, 1).unwrap())
        );

        let stamp = Property::new("updated_at", PropertyType::DateTime);
        let parsed = stamp.typecast_str("2009-05-01T10:00:00+02:00").unwrap();
        assert_eq!(parsed.to_param(), "2009-05-01T08:00:00+00:00");
        assert!(stamp.typecast_str("2009-05-01 08:00:00").is_ok());
    }

    #[test]
    fn schema_lookup_and_key() {
        let schema = book_schema();
        assert_eq!(schema.resource_name(), "book");
        assert_eq!(schema.collection_name(), "books");
        assert!(schema.is_key("id"));
        assert!(!schema.is_key("title"));
        assert!(!schema.is_key("missing"));
        assert_eq!(schema.key().count(), 1);
    }

    #[test]
    fn total_cmp_ranks_mixed_kinds() {
        use std::cmp::Ordering;

        assert_eq!(Value::Null.total_cmp(&Value::Integer(-5)), Ordering::Less);
        assert_eq!(Value::Integer(2).total_cmp(&Value::Float(1.5)), Ordering::Greater);
        assert_eq!(Value::Float(2.0).total_cmp(&Value::Integer(2)), Ordering::Equal);
        assert_eq!(Value::from("a").total_cmp(&Value::Integer(9)), Ordering::Greater);
        assert_eq!(Value::Boolean(true).total_cmp(&Value::Integer(0)), Ordering::Less);

        let mut values = vec![
            Value::from("b"),
            Value::Integer(3),
            Value::Null,
            Value::Float(1.5),
            Value::from("a"),
            Value::Null,
        ];
        values.sort_by(Value::total_cmp);
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Null,
                Value::Float(1.5),
                Value::Integer(3),
                Value::from("a"),
                Value::from("b"),
            ]
        );
    }

    #[test]
    fn attribute_map_replaces_in_place() {
        let mut map = AttributeMap::new();
        map.insert("id", Value::Integer(1));
        map.insert("title", Value::from("Old"));
        map.insert("id", Value::Integer(2));

        let fields: Vec<_> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(fields, vec!["id", "title"]);
        assert_eq!(map.get("id"), Some(&Value::Integer(2)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn value_json_and_param_forms() {
        assert_eq!(Value::Null.to_json(), serde_json::Value::Null);
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(Value::from(true).to_param(), "true");
        assert_eq!(
            Value::Date(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()).to_json(),
            serde_json::json!("2020-01-02")
        );
    }
}

//! JSON codec.
//!
//! A resource is an object keyed by field name; a collection is a top-level
//! array of such objects. Root-wrapped payloads (`{"book": {...}}` and
//! `{"books": [...]}`) are unwrapped first.

use serde_json::{Map, Value as Json};

use super::{normalize_field, typecast_or_raw};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{AttributeMap, Schema};

pub(super) fn parse_one(payload: &str, schema: &Schema) -> Result<AttributeMap> {
    let missing_root = || Error::MissingRoot {
        resource: schema.resource_name().to_string(),
    };

    if payload.trim().is_empty() {
        return Err(missing_root());
    }
    let document: Json = serde_json::from_str(payload)?;
    let Json::Object(object) = document else {
        return Err(missing_root());
    };

    match unwrap_root(&object, schema.resource_name()) {
        Some(Json::Object(inner)) => resource_from_json(inner, schema),
        Some(_) => Err(missing_root()),
        None => resource_from_json(&object, schema),
    }
}

pub(super) fn parse_many(payload: &str, schema: &Schema) -> Result<Vec<AttributeMap>> {
    if payload.trim().is_empty() {
        return Ok(Vec::new());
    }
    let document: Json = serde_json::from_str(payload)?;

    let elements = match &document {
        Json::Array(elements) => elements,
        Json::Object(object) => match unwrap_root(object, schema.collection_name()) {
            Some(Json::Array(elements)) => elements,
            _ => return Ok(Vec::new()),
        },
        _ => return Ok(Vec::new()),
    };

    elements
        .iter()
        .filter_map(Json::as_object)
        .map(|object| resource_from_json(object, schema))
        .collect()
}

pub(super) fn serialize_one(record: &Record) -> Result<String> {
    let mut object = Map::new();
    for property in record.schema().properties() {
        if let Some(value) = record.get(&property.name) {
            object.insert(property.name.clone(), value.to_json());
        }
    }
    Ok(serde_json::to_string(&Json::Object(object))?)
}

/// The wrapped value when `object` is exactly `{ root: ... }`.
fn unwrap_root<'a>(object: &'a Map<String, Json>, root: &str) -> Option<&'a Json> {
    if object.len() == 1 {
        object.get(root)
    } else {
        None
    }
}

fn resource_from_json(object: &Map<String, Json>, schema: &Schema) -> Result<AttributeMap> {
    let mut attributes = AttributeMap::new();
    for (key, raw) in object {
        let field = normalize_field(key);
        if let Some(property) = schema.get(&field) {
            let text = raw.as_str().map_or_else(|| raw.to_string(), str::to_string);
            let value = typecast_or_raw(&field, property.typecast_json(raw), &text);
            attributes.insert(field, value);
        }
    }
    Ok(attributes)
}

//! Create/read/update/delete over REST.
//!
//! # Design
//! `RestAdapter` ties the pieces together:
//!
//! - `read` asks the [`Query`] for a [`ReadPlan`], issues one GET, parses the
//!   payload and re-filters the records client-side;
//! - `create` POSTs to `{collection}`, `update` PUTs to `{collection}/{key}`
//!   and `delete` DELETEs `{collection}/{key}`, where the key always comes
//!   from the record itself.
//!
//! Bulk writes run strictly in order, one request per record. Errors are not
//! caught: the first failing record aborts the rest of the batch.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::AdapterConfig;
use crate::connection::Connection;
use crate::endpoint::path_segment;
use crate::error::Result;
use crate::format::Format;
use crate::http::{Transport, UreqTransport};
use crate::mapper::ResourceMapper;
use crate::query::{Query, ReadPlan};
use crate::record::Record;
use crate::schema::{AttributeMap, Schema};

/// REST-backed data-access adapter.
#[derive(Debug, Clone)]
pub struct RestAdapter<T = UreqTransport> {
    connection: Connection<T>,
}

impl RestAdapter<UreqTransport> {
    /// Build an adapter over `ureq`; fails on an unknown format name.
    pub fn new(config: &AdapterConfig) -> Result<Self> {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T: Transport> RestAdapter<T> {
    pub fn with_transport(config: &AdapterConfig, transport: T) -> Result<Self> {
        let format = config.format()?;
        Ok(Self::from_connection(Connection::with_transport(
            config.endpoint(),
            format,
            config.extension,
            transport,
        )))
    }

    pub fn from_connection(connection: Connection<T>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection<T> {
        &self.connection
    }

    fn format(&self) -> Format {
        self.connection.format()
    }

    /// Plural name used for collection paths and collection roots.
    pub fn collection_name<'a>(&self, schema: &'a Schema) -> &'a str {
        schema.collection_name()
    }

    /// Singular name used for resource roots.
    pub fn resource_name<'a>(&self, schema: &'a Schema) -> &'a str {
        schema.resource_name()
    }

    fn resource_path(&self, schema: &Schema, key: &str) -> String {
        format!("{}/{}", self.collection_name(schema), path_segment(key))
    }

    /// POST every record; returns how many were sent.
    pub fn create(&self, records: &mut [Record]) -> Result<usize> {
        let mapper = ResourceMapper::new(self.format());
        for record in records.iter_mut() {
            let schema = Arc::clone(record.schema());
            let body = self.format().serialize_one(record)?;
            let response = self
                .connection
                .http_post(self.collection_name(&schema), Some(&body))?;
            mapper.apply(record, &response)?;
        }
        Ok(records.len())
    }

    /// Fetch the records matching `query`.
    pub fn read(&self, query: &Query) -> Result<Vec<AttributeMap>> {
        let schema = query.schema();

        let records = match query.plan() {
            ReadPlan::Resource { key } => {
                debug!(resource = schema.resource_name(), %key, "reading single resource");
                let path = self.resource_path(schema, &key);
                match self.connection.http_get(&path, None) {
                    Ok(response) => vec![self.format().parse_one(&response.body, schema)?],
                    Err(err) if err.is_not_found() => Vec::new(),
                    Err(err) => return Err(err),
                }
            }
            ReadPlan::Collection { params } => {
                debug!(
                    collection = schema.collection_name(),
                    params = %params.to_query_string(),
                    "reading collection"
                );
                let response = self
                    .connection
                    .http_get(self.collection_name(schema), Some(&params))?;
                self.format().parse_many(&response.body, schema)?
            }
        };
        trace!(fetched = records.len(), "parsed records");

        Ok(query.filter_records(records))
    }

    /// `read`, with each attribute map bound to the query's schema.
    pub fn read_records(&self, query: &Query) -> Result<Vec<Record>> {
        let schema = query.schema();
        Ok(self
            .read(query)?
            .into_iter()
            .map(|attributes| Record::from_attributes(Arc::clone(schema), attributes))
            .collect())
    }

    /// Assign `dirty` onto every record and PUT it; returns how many
    /// requests completed.
    pub fn update(&self, dirty: &AttributeMap, records: &mut [Record]) -> Result<usize> {
        let mapper = ResourceMapper::new(self.format());
        let mut updated = 0;
        for record in records.iter_mut() {
            let schema = Arc::clone(record.schema());
            let key = record.require_key()?;

            for (field, value) in dirty.iter() {
                record.set(field, value.clone())?;
            }

            let body = self.format().serialize_one(record)?;
            let response = self
                .connection
                .http_put(&self.resource_path(&schema, &key), Some(&body))?;
            mapper.apply(record, &response)?;
            updated += 1;
        }
        Ok(updated)
    }

    /// DELETE every record; returns how many deletions got a 2xx.
    pub fn delete(&self, records: &[Record]) -> Result<usize> {
        let mut deleted = 0;
        for record in records {
            let key = record.require_key()?;
            let response = self
                .connection
                .http_delete(&self.resource_path(record.schema(), &key), None)?;
            if response.is_success() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
